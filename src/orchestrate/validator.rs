use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::config::OrchestratorConfig;
use crate::ids::InteractionId;
use crate::ingest::display_name;

pub type ParameterMap = BTreeMap<String, String>;

#[derive(Error, Debug)]
pub enum ValidatorError {
    #[error("Failed to launch validator: {0}")]
    Launch(#[from] std::io::Error),

    #[error("Validator exited with {}: {stderr}", .code.map_or("signal".to_string(), |c| format!("code {c}")))]
    NonZeroExit { code: Option<i32>, stderr: String },

    #[error("Validator rejected request: {0}")]
    Rejected(String),
}

/// Everything the validator needs to evaluate one file.
#[derive(Debug, Clone)]
pub struct ValidationRequest {
    pub interaction_id: InteractionId,
    pub session_id: String,
    pub tenant_id: String,
    /// Absolute path of the CSV inside the workspace.
    pub file: PathBuf,
    pub workspace: PathBuf,
    pub request_parameters: Arc<ParameterMap>,
    pub header_parameters: Arc<ParameterMap>,
}

impl ValidationRequest {
    pub fn file_name(&self) -> String {
        display_name(&self.file)
    }
}

/// Result of a validator run that completed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationOutcome {
    pub valid: bool,
    pub report: Value,
}

impl ValidationOutcome {
    /// Wrap a structured report, deriving `valid` from its content.
    pub fn from_report(report: Value) -> Self {
        Self {
            valid: report_is_valid(&report),
            report,
        }
    }

    /// Parse validator stdout. Output that is not JSON is kept verbatim
    /// and counts as invalid.
    pub fn from_stdout(stdout: &str) -> Self {
        match serde_json::from_str::<Value>(stdout.trim()) {
            Ok(report) => Self::from_report(report),
            Err(_) => Self {
                valid: false,
                report: Value::String(stdout.to_string()),
            },
        }
    }
}

/// A report is valid when `report.valid` is `true` and `errorsSummary`
/// is absent or empty.
pub fn report_is_valid(report: &Value) -> bool {
    let has_errors = report
        .get("errorsSummary")
        .and_then(Value::as_array)
        .is_some_and(|errors| !errors.is_empty());
    if has_errors {
        return false;
    }
    report
        .get("report")
        .and_then(|r| r.get("valid"))
        .and_then(Value::as_bool)
        .unwrap_or(false)
}

/// External validation collaborator. Evaluates one file per call.
///
/// Implementations are called from blocking worker threads, possibly
/// several at once within one interaction.
pub trait ValidationEngine: Send + Sync {
    fn validate(&self, request: &ValidationRequest) -> Result<ValidationOutcome, ValidatorError>;

    /// Short descriptor recorded in the response provenance.
    fn agent(&self) -> String {
        "validation-engine".to_string()
    }
}

/// Runs the provisioned validator script through an interpreter:
/// `<interpreter> <script> <package> <file>` with the workspace as working
/// directory. The script and package are resolved by file name, so they
/// must have been provisioned into the workspace.
#[derive(Debug, Clone)]
pub struct ScriptValidationEngine {
    interpreter: String,
    script_file: String,
    package_file: String,
}

impl ScriptValidationEngine {
    pub fn new(
        interpreter: impl Into<String>,
        script_file: impl Into<String>,
        package_file: impl Into<String>,
    ) -> Self {
        Self {
            interpreter: interpreter.into(),
            script_file: script_file.into(),
            package_file: package_file.into(),
        }
    }

    pub fn from_config(config: &OrchestratorConfig) -> Self {
        Self::new(
            config.interpreter.clone(),
            config.script_file_name(),
            config.package_file_name(),
        )
    }

    pub fn command_line(&self, file_name: &str) -> Vec<String> {
        vec![
            self.interpreter.clone(),
            self.script_file.clone(),
            self.package_file.clone(),
            file_name.to_string(),
        ]
    }

    fn ensure_provisioned(&self, workspace: &Path) -> Result<(), ValidatorError> {
        let script = workspace.join(&self.script_file);
        if !script.is_file() {
            return Err(ValidatorError::Rejected(format!(
                "validator script {} not present in workspace",
                self.script_file
            )));
        }
        Ok(())
    }
}

impl ValidationEngine for ScriptValidationEngine {
    fn validate(&self, request: &ValidationRequest) -> Result<ValidationOutcome, ValidatorError> {
        self.ensure_provisioned(&request.workspace)?;
        let file_name = request.file_name();

        tracing::debug!(
            interaction_id = %request.interaction_id,
            file = %file_name,
            command = %self.command_line(&file_name).join(" "),
            "Executing validator"
        );

        let output = Command::new(&self.interpreter)
            .arg(&self.script_file)
            .arg(&self.package_file)
            .arg(&file_name)
            .current_dir(&request.workspace)
            .output()?;

        if !output.status.success() {
            return Err(ValidatorError::NonZeroExit {
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(ValidationOutcome::from_stdout(&String::from_utf8_lossy(
            &output.stdout,
        )))
    }

    fn agent(&self) -> String {
        format!("{} {}", self.interpreter, self.script_file)
    }
}
