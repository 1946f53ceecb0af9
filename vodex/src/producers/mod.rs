//! Artifact producers.
//!
//! The trait seams live in [`traits`]; concrete implementations cover the
//! ffmpeg-based derivations and the streaming download building block.
//! [`mock`] holds scripted producers used by the pipeline tests.

mod traits;

pub mod audio;
pub mod download;
pub mod index;
pub mod mock;

pub use audio::FfmpegSecondaryProducer;
pub use index::FfmpegIndexProducer;
pub use traits::{
    AiConfig, IndexProducer, MetadataProducer, PrimaryProducer, Producers, SecondaryProducer,
    SummaryProducer, TranscriptProducer,
};
