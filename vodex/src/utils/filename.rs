//! Filename sanitization for artifact directories.
//!
//! Media titles become on-disk directory names, so anything invalid on
//! Windows, Linux or macOS has to go while CJK and other Unicode text is
//! preserved.

/// Characters that are invalid in Windows filenames.
const INVALID_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// Sanitize a media title for use as a directory name.
///
/// Control characters and Windows-invalid characters are replaced with a
/// single underscore (consecutive replacements collapse), leading/trailing
/// spaces and dots are trimmed, and an empty result falls back to
/// `"untitled"`.
pub fn sanitize_title(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut last_was_replacement = false;

    for c in input.chars() {
        if c.is_control() || INVALID_CHARS.contains(&c) {
            if !last_was_replacement {
                result.push('_');
                last_was_replacement = true;
            }
        } else {
            result.push(c);
            last_was_replacement = false;
        }
    }

    let trimmed = result.trim_matches(|c| c == ' ' || c == '.');
    if trimmed.is_empty() {
        "untitled".to_string()
    } else {
        trimmed.to_string()
    }
}
