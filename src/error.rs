//! Interaction-level errors and the structured error document returned
//! when an interaction is rejected before a session can be built.

use serde::Serialize;
use thiserror::Error;

use crate::config::ConfigError;
use crate::ids::InteractionId;
use crate::ingest::IngestError;
use crate::orchestrate::OrchestrationError;

#[derive(Error, Debug)]
pub enum InteractionError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Ingest(#[from] IngestError),

    #[error(transparent)]
    Orchestration(#[from] OrchestrationError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Staging task failed: {0}")]
    Staging(String),
}

/// Whether the submission itself was at fault or the system failed to process it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCategory {
    ValidationFailure,
    ProcessingFailure,
}

/// Error document for a rejected interaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub interaction_id: InteractionId,
    pub code: &'static str,
    pub category: ErrorCategory,
    pub message: String,
}

impl ErrorResponse {
    pub fn from_error(interaction_id: InteractionId, error: &InteractionError) -> Self {
        let (category, code, message) = classify(error);
        Self {
            interaction_id,
            code,
            category,
            message,
        }
    }
}

fn classify(error: &InteractionError) -> (ErrorCategory, &'static str, String) {
    use ErrorCategory::*;

    match error {
        InteractionError::Ingest(e) => match e {
            IngestError::ArchiveEmpty => (
                ValidationFailure,
                "ARCHIVE_EMPTY",
                "Uploaded archive contains no entries".to_string(),
            ),
            IngestError::ArchiveMissingOrEmpty { .. } => (
                ValidationFailure,
                "ARCHIVE_MISSING_OR_EMPTY",
                "Uploaded archive is missing or empty".to_string(),
            ),
            IngestError::UnsupportedArchive(detail) => (
                ValidationFailure,
                "UNSUPPORTED_ARCHIVE",
                format!("Unsupported archive format: {detail}"),
            ),
            IngestError::UnsafeEntryPath(entry) => (
                ValidationFailure,
                "UNSAFE_ARCHIVE_ENTRY",
                format!("Archive entry escapes the extraction root: {entry}"),
            ),
            IngestError::CorruptArchive(detail) => (
                ValidationFailure,
                "CORRUPT_ARCHIVE",
                format!("Archive could not be read: {detail}"),
            ),
            IngestError::Zip(detail) => (
                ValidationFailure,
                "CORRUPT_ARCHIVE",
                format!("Archive could not be read: {detail}"),
            ),
            IngestError::Io(detail) => (ProcessingFailure, "IO_ERROR", detail.to_string()),
        },
        InteractionError::Orchestration(e) => {
            let code = match e {
                OrchestrationError::InvalidSessionConfig(_) => "INVALID_SESSION_CONFIG",
                OrchestrationError::WorkspaceUnreachable { .. } => "WORKSPACE_UNREACHABLE",
                OrchestrationError::InvalidState { .. } => "INVALID_SESSION_STATE",
                OrchestrationError::Dispatch(_) => "DISPATCH_FAILED",
                OrchestrationError::Serialization(_) => "SERIALIZATION_ERROR",
            };
            (ProcessingFailure, code, e.to_string())
        }
        InteractionError::Io(e) => (ProcessingFailure, "IO_ERROR", e.to_string()),
        InteractionError::Config(e) => (ProcessingFailure, "CONFIG_ERROR", e.to_string()),
        InteractionError::Staging(detail) => (
            ProcessingFailure,
            "STAGING_FAILED",
            format!("Archive staging did not complete: {detail}"),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_archive_is_a_validation_failure() {
        let id = InteractionId::new();
        let response = ErrorResponse::from_error(id, &IngestError::ArchiveEmpty.into());
        assert_eq!(response.code, "ARCHIVE_EMPTY");
        assert_eq!(response.category, ErrorCategory::ValidationFailure);

        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["interactionId"], id.to_string());
        assert_eq!(json["code"], "ARCHIVE_EMPTY");
        assert_eq!(json["category"], "VALIDATION_FAILURE");
    }

    #[test]
    fn unreadable_tar_gz_is_a_corrupt_archive() {
        let cause = std::io::Error::new(std::io::ErrorKind::InvalidInput, "corrupt deflate stream");
        let error: InteractionError = IngestError::CorruptArchive(cause).into();
        let response = ErrorResponse::from_error(InteractionId::new(), &error);
        assert_eq!(response.code, "CORRUPT_ARCHIVE");
        assert_eq!(response.category, ErrorCategory::ValidationFailure);
        assert!(response.message.contains("corrupt deflate stream"));
    }

    #[test]
    fn orchestration_faults_are_processing_failures() {
        let error: InteractionError =
            OrchestrationError::InvalidSessionConfig("tenant id is required".into()).into();
        let response = ErrorResponse::from_error(InteractionId::new(), &error);
        assert_eq!(response.code, "INVALID_SESSION_CONFIG");
        assert_eq!(response.category, ErrorCategory::ProcessingFailure);
        assert!(response.message.contains("tenant id is required"));
    }

    #[test]
    fn io_errors_keep_their_message() {
        let error: InteractionError =
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only volume").into();
        let response = ErrorResponse::from_error(InteractionId::new(), &error);
        assert_eq!(response.code, "IO_ERROR");
        assert_eq!(response.message, "read-only volume");
    }

    #[test]
    fn aborted_staging_is_a_processing_failure() {
        let error = InteractionError::Staging("task panicked".into());
        let response = ErrorResponse::from_error(InteractionId::new(), &error);
        assert_eq!(response.code, "STAGING_FAILED");
        assert_eq!(response.category, ErrorCategory::ProcessingFailure);
        assert!(response.message.contains("task panicked"));
    }

    #[test]
    fn transparent_errors_display_inner_message() {
        let error: InteractionError = IngestError::ArchiveEmpty.into();
        assert_eq!(error.to_string(), "Archive contains no entries");
    }
}
