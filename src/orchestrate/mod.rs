//! Archive validation orchestration.
//!
//! One session per interaction:
//! ```text
//! engine.session() → SessionBuilder::build() → engine.orchestrate() → engine.clear()
//! ```
//! - `workspace`: per-interaction directory guard, removed on every exit path
//! - `validator`: the external validation collaborator seam
//! - `dispatch`: bounded-parallel, one validator call per processable file
//! - `aggregate`: the structured response document

pub mod workspace;
pub mod validator;
pub mod session;
pub mod dispatch;
pub mod aggregate;
pub mod engine;
pub mod archival;

pub use workspace::*;
pub use validator::*;
pub use session::*;
pub use dispatch::*;
pub use aggregate::*;
pub use engine::*;
pub use archival::*;

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum OrchestrationError {
    #[error("Invalid session configuration: {0}")]
    InvalidSessionConfig(String),

    #[error("Workspace unreachable: {}", .path.display())]
    WorkspaceUnreachable { path: PathBuf },

    #[error("Session is {actual}, expected {expected}")]
    InvalidState {
        expected: SessionState,
        actual: SessionState,
    },

    #[error("Dispatch failed: {0}")]
    Dispatch(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for OrchestrationError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}
