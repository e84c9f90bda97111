//! Tubefetch - Core Library
//!
//! Orchestration around two external collaborators: the `yt-dlp` extractor
//! and the `ffmpeg` conversion binary. The library exposes the batch
//! orchestrator, the local web server and the launcher lifecycle manager;
//! the binary wires them to a terminal front end.

pub mod cli;
pub mod core;
pub mod launcher;
pub mod server;
pub mod utils;

// Re-export commonly used types
pub use crate::core::{
    config::AppConfig,
    extractor::Extractor,
    manager::DownloadManager,
    models::{AppError, AppResult, BatchReport, DownloadTask, OutputKind, TaskStatus},
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
