//! Archive ingestion: turn an uploaded archive into a classified workspace.
//!
//! ```text
//! extract → classify → screen → provision
//! ```
//! Each step works on a plain directory; the orchestration layer owns the
//! workspace lifetime.

pub mod extract;
pub mod classify;
pub mod screen;
pub mod provision;

pub use extract::*;
pub use classify::*;
pub use screen::*;
pub use provision::*;

use std::path::PathBuf;

use thiserror::Error;

/// File extension (compared case-insensitively) of processable files.
pub const EXPECTED_EXTENSION: &str = "csv";

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Archive file is missing or empty: {}", .path.display())]
    ArchiveMissingOrEmpty { path: PathBuf },

    #[error("Archive contains no entries")]
    ArchiveEmpty,

    #[error("Unsupported archive format: {0}")]
    UnsupportedArchive(String),

    #[error("Archive entry escapes the extraction root: {0}")]
    UnsafeEntryPath(String),

    #[error("Corrupt archive: {0}")]
    CorruptArchive(#[source] std::io::Error),

    #[error("Corrupt ZIP archive: {0}")]
    Zip(#[from] zip::result::ZipError),
}
