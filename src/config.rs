use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Application-level constants
pub const APP_NAME: &str = "flatfile-ingress";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Schema package the validator script reads next to the data files.
pub const DEFAULT_PACKAGE_FILE: &str = "datapackage-nyher-fhir-ig-equivalent.json";
/// Validator script executed once per CSV file.
pub const DEFAULT_SCRIPT_FILE: &str = "validate-nyher-fhir-ig-equivalent.py";
pub const DEFAULT_INTERPRETER: &str = "python3";

pub const ENV_INBOUND_PATH: &str = "FLATFILE_INBOUND_PATH";
pub const ENV_INGRESS_HOME: &str = "FLATFILE_INGRESS_HOME";
pub const ENV_PACKAGE_PATH: &str = "FLATFILE_PACKAGE_PATH";
pub const ENV_SCRIPT_PATH: &str = "FLATFILE_SCRIPT_PATH";
pub const ENV_INTERPRETER: &str = "FLATFILE_INTERPRETER";
pub const ENV_MAX_CONCURRENCY: &str = "FLATFILE_MAX_CONCURRENCY";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("I/O error reading configuration: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid configuration JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid value for {key}: {value:?}")]
    InvalidValue { key: &'static str, value: String },
}

/// Default tracing filter when `RUST_LOG` is unset.
pub fn default_log_filter() -> &'static str {
    "info,flatfile_ingress=debug"
}

/// Get the application data directory.
/// ~/flatfile-ingress/ when a home directory is known, the system temp dir otherwise.
pub fn app_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(APP_NAME)
}

/// Where uploaded archives are persisted before extraction
pub fn inbound_dir() -> PathBuf {
    app_data_dir().join("inbound")
}

/// Parent of all per-interaction workspaces
pub fn ingress_home_dir() -> PathBuf {
    app_data_dir().join("ingress")
}

/// Validation assets (schema package + validator script)
pub fn assets_dir() -> PathBuf {
    app_data_dir().join("assets")
}

/// Static paths and tenancy-independent settings for the orchestrator.
///
/// Read-only once constructed; the engine shares it behind an `Arc`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OrchestratorConfig {
    pub inbound_path: PathBuf,
    pub ingress_home_path: PathBuf,
    pub package_path: PathBuf,
    pub script_path: PathBuf,
    pub interpreter: String,
    /// Upper bound on validator calls running at once within one interaction.
    pub max_concurrent_validations: usize,
    /// Reject CSVs with invalid characters before they reach the validator.
    pub screen_content: bool,
    /// Capture per-file payloads for the audit pairs in the response.
    pub generate_bundle: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        let assets = assets_dir();
        Self {
            inbound_path: inbound_dir(),
            ingress_home_path: ingress_home_dir(),
            package_path: assets.join(DEFAULT_PACKAGE_FILE),
            script_path: assets.join(DEFAULT_SCRIPT_FILE),
            interpreter: DEFAULT_INTERPRETER.into(),
            max_concurrent_validations: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
            screen_content: true,
            generate_bundle: true,
        }
    }
}

impl OrchestratorConfig {
    /// Defaults, then the optional JSON file, then environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let base = match path {
            Some(p) => Self::from_json_file(p)?,
            None => Self::default(),
        };
        base.with_overrides(|key| std::env::var(key).ok())
    }

    /// Read a JSON config file. Missing keys fall back to defaults.
    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let data = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&data)?;
        tracing::debug!(path = %path.display(), "Loaded orchestrator configuration");
        Ok(config)
    }

    /// Apply overrides from a key lookup (the process environment in production).
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup(ENV_INBOUND_PATH) {
            self.inbound_path = PathBuf::from(v);
        }
        if let Some(v) = lookup(ENV_INGRESS_HOME) {
            self.ingress_home_path = PathBuf::from(v);
        }
        if let Some(v) = lookup(ENV_PACKAGE_PATH) {
            self.package_path = PathBuf::from(v);
        }
        if let Some(v) = lookup(ENV_SCRIPT_PATH) {
            self.script_path = PathBuf::from(v);
        }
        if let Some(v) = lookup(ENV_INTERPRETER) {
            if v.trim().is_empty() {
                return Err(ConfigError::InvalidValue {
                    key: ENV_INTERPRETER,
                    value: v,
                });
            }
            self.interpreter = v;
        }
        if let Some(v) = lookup(ENV_MAX_CONCURRENCY) {
            self.max_concurrent_validations = match v.trim().parse::<usize>() {
                Ok(n) if n > 0 => n,
                _ => {
                    return Err(ConfigError::InvalidValue {
                        key: ENV_MAX_CONCURRENCY,
                        value: v,
                    })
                }
            };
        }
        Ok(self)
    }

    /// Concurrency limit actually used by the dispatcher (never zero).
    pub fn concurrency_limit(&self) -> usize {
        self.max_concurrent_validations.max(1)
    }

    /// Assets copied into every workspace, in copy order.
    pub fn asset_paths(&self) -> Vec<PathBuf> {
        vec![self.package_path.clone(), self.script_path.clone()]
    }

    /// File names the assets take inside a workspace.
    pub fn asset_file_names(&self) -> Vec<String> {
        self.asset_paths()
            .iter()
            .filter_map(|p| p.file_name())
            .map(|n| n.to_string_lossy().into_owned())
            .collect()
    }

    pub fn package_file_name(&self) -> String {
        file_name_or(&self.package_path, DEFAULT_PACKAGE_FILE)
    }

    pub fn script_file_name(&self) -> String {
        file_name_or(&self.script_path, DEFAULT_SCRIPT_FILE)
    }
}

fn file_name_or(path: &Path, fallback: &str) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| fallback.to_string())
}
