use thiserror::Error;

use crate::ids::InteractionId;
use crate::upload::UploadedArchive;

#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Archive storage unavailable: {0}")]
    Unavailable(String),
}

/// Storage collaborator that records the raw archive of an interaction.
///
/// Called once per interaction before extraction. Failures are logged by the
/// caller and never abort the interaction.
pub trait InteractionArchive: Send + Sync {
    fn save_archive_interaction(
        &self,
        interaction_id: &InteractionId,
        upload: &UploadedArchive,
    ) -> Result<(), ArchiveError>;
}

/// Archive that stores nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopInteractionArchive;

impl InteractionArchive for NoopInteractionArchive {
    fn save_archive_interaction(
        &self,
        interaction_id: &InteractionId,
        upload: &UploadedArchive,
    ) -> Result<(), ArchiveError> {
        tracing::trace!(
            interaction_id = %interaction_id,
            file = %upload.name(),
            "Archive interaction not persisted"
        );
        Ok(())
    }
}
