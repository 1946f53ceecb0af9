//! Streaming HTTP download building block for producer implementations.

use std::path::Path;
use std::time::Duration;

use futures::StreamExt;
use reqwest::Client;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::utils::fs;
use crate::{Error, Result};

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
    AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Build the shared HTTP client used by platform producers.
pub fn build_client(referer: Option<&str>) -> Result<Client> {
    let mut headers = reqwest::header::HeaderMap::new();
    if let Some(referer) = referer {
        headers.insert(
            reqwest::header::REFERER,
            referer
                .parse()
                .map_err(|_| Error::config(format!("invalid referer: {referer}")))?,
        );
    }
    let client = Client::builder()
        .user_agent(DEFAULT_USER_AGENT)
        .default_headers(headers)
        .connect_timeout(CONNECT_TIMEOUT)
        .build()?;
    Ok(client)
}

/// Stream a URL to a local file, returning the number of bytes written.
///
/// A partial file is removed on any failure, including a short read against
/// an announced `Content-Length`, so a `completed` resource status always
/// corresponds to a whole artifact on disk.
pub async fn download_file(
    client: &Client,
    url: &str,
    cookie: Option<&str>,
    dest: &Path,
) -> Result<u64> {
    fs::ensure_parent_dir(dest).await?;

    let mut request = client.get(url);
    if let Some(cookie) = cookie.filter(|c| !c.trim().is_empty()) {
        request = request.header(reqwest::header::COOKIE, cookie);
    }

    let response = request.send().await?.error_for_status()?;
    let expected = response.content_length();
    debug!(url, expected, dest = %dest.display(), "Download started");

    let result = write_body(response, dest).await;
    match result {
        Ok(written) => {
            if let Some(expected) = expected
                && written != expected
            {
                warn!(url, written, expected, "Short read, discarding partial file");
                remove_partial(dest).await;
                return Err(Error::Other(format!(
                    "incomplete download: {written} of {expected} bytes"
                )));
            }
            info!(url, bytes = written, dest = %dest.display(), "Download finished");
            Ok(written)
        }
        Err(e) => {
            remove_partial(dest).await;
            Err(e)
        }
    }
}

async fn write_body(response: reqwest::Response, dest: &Path) -> Result<u64> {
    let mut file = tokio::fs::File::create(dest)
        .await
        .map_err(|e| Error::io_path("create", dest, e))?;
    let mut stream = response.bytes_stream();
    let mut written: u64 = 0;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        file.write_all(&chunk)
            .await
            .map_err(|e| Error::io_path("write", dest, e))?;
        written += chunk.len() as u64;
    }
    file.flush()
        .await
        .map_err(|e| Error::io_path("flush", dest, e))?;
    Ok(written)
}

async fn remove_partial(dest: &Path) {
    if let Err(e) = tokio::fs::remove_file(dest).await
        && e.kind() != std::io::ErrorKind::NotFound
    {
        warn!(path = %dest.display(), error = %e, "Failed to remove partial download");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt as _};
    use tokio::net::TcpListener;

    #[test]
    fn test_build_client_rejects_bad_referer() {
        assert!(build_client(Some("bad\nreferer")).is_err());
        assert!(build_client(Some("https://example.com")).is_ok());
        assert!(build_client(None).is_ok());
    }

    /// Serve one canned HTTP response on a loopback socket.
    async fn serve_once(response: &'static [u8]) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            if let Ok((mut socket, _)) = listener.accept().await {
                let mut buf = [0u8; 1024];
                let _ = socket.read(&mut buf).await;
                let _ = socket.write_all(response).await;
                let _ = socket.shutdown().await;
            }
        });
        format!("http://{addr}/artifact.bin")
    }

    #[tokio::test]
    async fn test_download_file_writes_whole_body() {
        let url = serve_once(
            b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\nConnection: close\r\n\r\nhello",
        )
        .await;
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("nested").join("artifact.bin");
        let client = build_client(None).unwrap();

        let written = download_file(&client, &url, None, &dest).await.unwrap();
        assert_eq!(written, 5);
        assert_eq!(tokio::fs::read(&dest).await.unwrap(), b"hello");
    }

    #[tokio::test]
    async fn test_short_body_discards_partial_file() {
        // Announces 10 bytes but delivers 2 before closing.
        let url = serve_once(
            b"HTTP/1.1 200 OK\r\nContent-Length: 10\r\nConnection: close\r\n\r\nhi",
        )
        .await;
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("artifact.bin");
        let client = build_client(None).unwrap();

        let result = download_file(&client, &url, None, &dest).await;
        assert!(result.is_err());
        assert!(!dest.exists());
    }

    #[tokio::test]
    async fn test_error_status_fails_without_writing() {
        let url = serve_once(
            b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
        )
        .await;
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("artifact.bin");
        let client = build_client(None).unwrap();

        assert!(download_file(&client, &url, None, &dest).await.is_err());
        assert!(!dest.exists());
    }
}
