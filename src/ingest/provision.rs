use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::fs_helpers::ensure_writable_dir;

/// A single asset that could not be copied into the workspace.
#[derive(Error, Debug)]
#[error("Failed to copy {} to {}: {cause}", .asset.display(), .destination.display())]
pub struct AssetCopyError {
    pub asset: PathBuf,
    pub destination: PathBuf,
    #[source]
    pub cause: io::Error,
}

/// Serializable form of an [`AssetCopyError`] for the response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetDiagnostic {
    pub asset: String,
    pub destination: String,
    pub message: String,
}

impl From<&AssetCopyError> for AssetDiagnostic {
    fn from(e: &AssetCopyError) -> Self {
        Self {
            asset: e.asset.display().to_string(),
            destination: e.destination.display().to_string(),
            message: e.cause.to_string(),
        }
    }
}

#[derive(Debug, Default)]
pub struct ProvisionReport {
    /// Destination paths of the assets copied successfully.
    pub provisioned: Vec<PathBuf>,
    pub errors: Vec<AssetCopyError>,
}

impl ProvisionReport {
    pub fn is_complete(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn diagnostics(&self) -> Vec<AssetDiagnostic> {
        self.errors.iter().map(AssetDiagnostic::from).collect()
    }
}

/// Copy each asset into `target_dir`, replacing any file of the same name.
///
/// Copies are independent: one failure is recorded and the rest still run.
pub fn provision(assets: &[PathBuf], target_dir: &Path) -> ProvisionReport {
    let mut report = ProvisionReport::default();

    if let Err(e) = ensure_writable_dir(target_dir) {
        // Nothing can be copied; record one error per asset
        for asset in assets {
            report.errors.push(AssetCopyError {
                asset: asset.clone(),
                destination: destination_for(asset, target_dir),
                cause: io::Error::new(e.kind(), e.to_string()),
            });
        }
        return report;
    }

    for asset in assets {
        let destination = destination_for(asset, target_dir);
        match copy_replacing(asset, &destination) {
            Ok(bytes) => {
                tracing::debug!(
                    asset = %asset.display(),
                    destination = %destination.display(),
                    bytes,
                    "Asset provisioned"
                );
                report.provisioned.push(destination);
            }
            Err(cause) => {
                tracing::error!(
                    asset = %asset.display(),
                    destination = %destination.display(),
                    error = %cause,
                    "Asset copy failed"
                );
                report.errors.push(AssetCopyError {
                    asset: asset.clone(),
                    destination,
                    cause,
                });
            }
        }
    }

    report
}

fn destination_for(asset: &Path, target_dir: &Path) -> PathBuf {
    match asset.file_name() {
        Some(name) => target_dir.join(name),
        None => target_dir.to_path_buf(),
    }
}

fn copy_replacing(asset: &Path, destination: &Path) -> io::Result<u64> {
    if !asset.is_file() {
        return Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("asset not found: {}", asset.display()),
        ));
    }
    // fs::copy truncates an existing destination
    fs::copy(asset, destination)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn asset(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn copies_all_assets() {
        let src = tempfile::tempdir().unwrap();
        let dst = tempfile::tempdir().unwrap();
        let package = asset(src.path(), "datapackage.json", "{}");
        let script = asset(src.path(), "validate.py", "print('ok')");

        let report = provision(&[package, script], dst.path());
        assert!(report.is_complete());
        assert_eq!(
            report.provisioned,
            vec![dst.path().join("datapackage.json"), dst.path().join("validate.py")]
        );
        assert_eq!(fs::read_to_string(dst.path().join("validate.py")).unwrap(), "print('ok')");
    }

    #[test]
    fn replaces_existing_destination() {
        let src = tempfile::tempdir().unwrap();
        let dst = tempfile::tempdir().unwrap();
        let package = asset(src.path(), "datapackage.json", "{\"v\":2}");
        fs::write(dst.path().join("datapackage.json"), "stale content that is longer").unwrap();

        let report = provision(&[package], dst.path());
        assert!(report.is_complete());
        assert_eq!(
            fs::read_to_string(dst.path().join("datapackage.json")).unwrap(),
            "{\"v\":2}"
        );
    }

    #[test]
    fn missing_asset_does_not_stop_others() {
        let src = tempfile::tempdir().unwrap();
        let dst = tempfile::tempdir().unwrap();
        let missing = src.path().join("missing.json");
        let script = asset(src.path(), "validate.py", "x");

        let report = provision(&[missing.clone(), script], dst.path());
        assert!(!report.is_complete());
        assert_eq!(report.provisioned, vec![dst.path().join("validate.py")]);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].asset, missing);
        assert_eq!(report.errors[0].destination, dst.path().join("missing.json"));

        let diagnostics = report.diagnostics();
        assert!(diagnostics[0].message.contains("asset not found"));
        assert!(diagnostics[0].asset.ends_with("missing.json"));
    }

    #[test]
    fn creates_target_directory() {
        let src = tempfile::tempdir().unwrap();
        let dst = tempfile::tempdir().unwrap();
        let target = dst.path().join("a").join("ingress");
        let script = asset(src.path(), "validate.py", "x");

        let report = provision(&[script], &target);
        assert!(report.is_complete());
        assert!(target.join("validate.py").is_file());
    }

    #[test]
    fn diagnostic_serializes_camel_case() {
        let err = AssetCopyError {
            asset: PathBuf::from("/assets/validate.py"),
            destination: PathBuf::from("/ws/validate.py"),
            cause: io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        };
        let json = serde_json::to_value(AssetDiagnostic::from(&err)).unwrap();
        assert_eq!(json["asset"], "/assets/validate.py");
        assert_eq!(json["destination"], "/ws/validate.py");
        assert_eq!(json["message"], "denied");
        assert!(err.to_string().starts_with("Failed to copy /assets/validate.py"));
    }
}
