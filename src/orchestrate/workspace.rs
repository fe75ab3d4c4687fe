use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::fs_helpers::{count_dir_contents, ensure_writable_dir};
use crate::ids::InteractionId;

/// Name of the staging directory inside an interaction root.
pub const INGRESS_DIR_NAME: &str = "ingress";

/// Exclusive per-interaction directory `<ingress-home>/<interactionId>/ingress`.
///
/// Dropping the guard removes the interaction root and the persisted inbound
/// upload, so every exit path releases the workspace. [`Workspace::release`]
/// does the same eagerly and reports failures.
#[derive(Debug)]
pub struct Workspace {
    interaction_id: InteractionId,
    root: PathBuf,
    dir: PathBuf,
    inbound_file: Option<PathBuf>,
    released: bool,
}

impl Workspace {
    /// Create the workspace for `interaction_id` under `ingress_home`.
    ///
    /// Fails with `AlreadyExists` if the interaction root is already present:
    /// two interactions never share a directory.
    pub fn create(ingress_home: &Path, interaction_id: &InteractionId) -> io::Result<Self> {
        ensure_writable_dir(ingress_home)?;
        let root = ingress_home.join(interaction_id.to_string());
        fs::create_dir(&root)?;

        let dir = root.join(INGRESS_DIR_NAME);
        if let Err(e) = fs::create_dir(&dir) {
            let _ = fs::remove_dir_all(&root);
            return Err(e);
        }

        tracing::debug!(
            interaction_id = %interaction_id,
            workspace = %dir.display(),
            "Workspace created"
        );
        Ok(Self {
            interaction_id: *interaction_id,
            root,
            dir,
            inbound_file: None,
            released: false,
        })
    }

    pub fn interaction_id(&self) -> &InteractionId {
        &self.interaction_id
    }

    /// Staging directory that holds the extracted files and assets.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Interaction root (parent of [`Self::dir`]).
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn inbound_file(&self) -> Option<&Path> {
        self.inbound_file.as_deref()
    }

    /// Tie the persisted upload to this workspace so it is removed with it.
    pub fn attach_inbound_file(&mut self, path: PathBuf) {
        self.inbound_file = Some(path);
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    /// Remove the workspace and the attached inbound file. Idempotent.
    pub fn release(&mut self) -> io::Result<()> {
        if self.released {
            return Ok(());
        }
        self.released = true;

        let (files, bytes) = count_dir_contents(&self.root);
        let mut first_error = None;
        if let Err(e) = remove_dir_if_present(&self.root) {
            first_error = Some(e);
        }
        if let Some(inbound) = self.inbound_file.take() {
            if let Err(e) = remove_file_if_present(&inbound) {
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => {
                tracing::warn!(
                    interaction_id = %self.interaction_id,
                    workspace = %self.root.display(),
                    error = %e,
                    "Workspace cleanup incomplete"
                );
                Err(e)
            }
            None => {
                tracing::debug!(
                    interaction_id = %self.interaction_id,
                    workspace = %self.root.display(),
                    files,
                    bytes,
                    "Workspace released"
                );
                Ok(())
            }
        }
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        let _ = self.release();
    }
}

fn remove_dir_if_present(path: &Path) -> io::Result<()> {
    match fs::remove_dir_all(path) {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

fn remove_file_if_present(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}
