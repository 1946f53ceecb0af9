//! vodex: asynchronous media artifact derivation engine.
//!
//! A submission names a media identifier and a set of artifacts to derive
//! (the media itself, extracted audio, transcript, AI summary, seek index).
//! Submissions become durable task records, flow through a bounded work
//! queue into a single worker, and the resource pipeline runs the stages in
//! dependency order while recording per-resource progress that polling
//! clients read back.
//!
//! Entry points:
//! - [`service::TaskService`] to submit and query tasks
//! - [`producers`] for the artifact producer seams and implementations
//! - [`store::TaskStore`] for the persisted task document

pub mod config;
pub mod error;
pub mod layout;
pub mod logging;
pub mod pipeline;
pub mod producers;
pub mod queue;
pub mod retention;
pub mod service;
pub mod store;
pub mod task;
pub mod utils;
pub mod worker;

pub use error::{Error, Result};
pub use service::TaskService;
