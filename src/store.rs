use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::config::OrchestratorConfig;
use crate::fs_helpers::{ensure_writable_dir, sanitize_file_name};
use crate::ids::InteractionId;
use crate::orchestrate::{Workspace, INGRESS_DIR_NAME};
use crate::upload::{UploadedArchive, DEFAULT_UPLOAD_NAME};

/// Filesystem layout for inbound uploads and per-interaction workspaces.
///
/// ```text
/// <inbound>/<interactionId>_<fileName>
/// <ingress-home>/<interactionId>/ingress/
/// ```
#[derive(Debug, Clone)]
pub struct ArchiveStore {
    inbound_root: PathBuf,
    ingress_root: PathBuf,
}

impl ArchiveStore {
    pub fn new(inbound_root: impl Into<PathBuf>, ingress_root: impl Into<PathBuf>) -> Self {
        Self {
            inbound_root: inbound_root.into(),
            ingress_root: ingress_root.into(),
        }
    }

    pub fn from_config(config: &OrchestratorConfig) -> Self {
        Self::new(&config.inbound_path, &config.ingress_home_path)
    }

    pub fn inbound_root(&self) -> &Path {
        &self.inbound_root
    }

    pub fn ingress_root(&self) -> &Path {
        &self.ingress_root
    }

    pub fn interaction_root(&self, id: &InteractionId) -> PathBuf {
        self.ingress_root.join(id.to_string())
    }

    pub fn workspace_path(&self, id: &InteractionId) -> PathBuf {
        self.interaction_root(id).join(INGRESS_DIR_NAME)
    }

    pub fn inbound_path(&self, id: &InteractionId, file_name: &str) -> PathBuf {
        let name = sanitize_file_name(file_name, DEFAULT_UPLOAD_NAME);
        self.inbound_root.join(format!("{id}_{name}"))
    }

    /// Persist the upload under the inbound folder.
    ///
    /// Written to a temp file in the same folder and renamed into place, so a
    /// partially written upload is never visible under its final name.
    pub fn save_upload(
        &self,
        id: &InteractionId,
        upload: &UploadedArchive,
    ) -> io::Result<PathBuf> {
        ensure_writable_dir(&self.inbound_root)?;
        let destination = self.inbound_path(id, upload.name());

        let mut tmp = tempfile::NamedTempFile::new_in(&self.inbound_root)?;
        io::copy(&mut upload.open_stream(), &mut tmp)?;
        tmp.flush()?;
        tmp.persist(&destination).map_err(|e| e.error)?;

        tracing::debug!(
            interaction_id = %id,
            path = %destination.display(),
            size = upload.size(),
            "Upload persisted"
        );
        Ok(destination)
    }

    /// Create the exclusive workspace for an interaction.
    pub fn acquire_workspace(&self, id: &InteractionId) -> io::Result<Workspace> {
        Workspace::create(&self.ingress_root, id)
    }
}
