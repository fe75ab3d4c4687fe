use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::session::{OrchestrationSession, SessionState};
use super::validator::{ValidationOutcome, ValidatorError};
use super::OrchestrationError;
use crate::ids::InteractionId;
use crate::ingest::{AssetDiagnostic, NotProcessedFile};

pub const RESOURCE_TYPE: &str = "OperationOutcome";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeStatus {
    Passed,
    Failed,
}

/// Validation outcome of one processable file.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileOutcome {
    pub status: OutcomeStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

impl FileOutcome {
    pub fn from_result(
        result: Result<ValidationOutcome, ValidatorError>,
        started_at: DateTime<Utc>,
    ) -> Self {
        let completed_at = Utc::now();
        match result {
            Ok(outcome) => Self {
                status: if outcome.valid {
                    OutcomeStatus::Passed
                } else {
                    OutcomeStatus::Failed
                },
                report: Some(outcome.report),
                error: None,
                started_at,
                completed_at,
            },
            Err(e) => Self::failed(e.to_string(), started_at),
        }
    }

    pub fn failed(error: impl Into<String>, started_at: DateTime<Utc>) -> Self {
        Self {
            status: OutcomeStatus::Failed,
            report: None,
            error: Some(error.into()),
            started_at,
            completed_at: Utc::now(),
        }
    }

    pub fn passed(&self) -> bool {
        self.status == OutcomeStatus::Passed
    }
}

/// Audit pair: a file's captured content with its outcome.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PayloadAndOutcome {
    pub file: String,
    pub content: Option<String>,
    pub outcome: FileOutcome,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Provenance {
    pub initiated_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub validated_files: Vec<String>,
    pub agent: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
}

/// The structured result of one interaction.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResponse {
    pub resource_type: &'static str,
    pub interaction_id: InteractionId,
    pub session_id: String,
    pub tenant_id: String,
    pub original_file_name: Option<String>,
    pub archive_size_bytes: Option<u64>,
    /// At least one file was validated and every validated file passed.
    pub valid: bool,
    pub validation_results: BTreeMap<String, FileOutcome>,
    pub files_not_processed: Vec<NotProcessedFile>,
    pub payload_and_validation_outcomes: Vec<PayloadAndOutcome>,
    pub asset_diagnostics: Vec<AssetDiagnostic>,
    pub provenance: Provenance,
}

impl ValidationResponse {
    pub fn to_json(&self) -> Result<Value, OrchestrationError> {
        Ok(serde_json::to_value(self)?)
    }

    pub fn to_json_pretty(&self) -> Result<String, OrchestrationError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn failed_files(&self) -> Vec<&str> {
        self.validation_results
            .iter()
            .filter(|(_, o)| !o.passed())
            .map(|(name, _)| name.as_str())
            .collect()
    }
}

/// Combine the session's outcomes and not-processed list into the response.
///
/// Fails only when captured content cannot be rendered as text; a response
/// where every file failed is still a successful aggregate.
pub fn aggregate(session: &OrchestrationSession) -> Result<ValidationResponse, OrchestrationError> {
    session.ensure_state(SessionState::Orchestrated)?;
    let results = session.validation_results().clone();

    let mut pairs = Vec::with_capacity(session.payloads().len());
    for payload in session.payloads() {
        let content = match &payload.content {
            Some(bytes) => Some(String::from_utf8(bytes.clone()).map_err(|_| {
                OrchestrationError::Serialization(format!(
                    "captured content of {} is not valid UTF-8",
                    payload.file_name
                ))
            })?),
            None => None,
        };
        let outcome = results.get(&payload.file_name).cloned().ok_or_else(|| {
            OrchestrationError::Serialization(format!(
                "no outcome recorded for {}",
                payload.file_name
            ))
        })?;
        pairs.push(PayloadAndOutcome {
            file: payload.file_name.clone(),
            content,
            outcome,
        });
    }

    let valid = !results.is_empty() && results.values().all(FileOutcome::passed);
    let completed_at = session.completed_at().unwrap_or_else(Utc::now);

    Ok(ValidationResponse {
        resource_type: RESOURCE_TYPE,
        interaction_id: *session.master_interaction_id(),
        session_id: session.session_id().to_string(),
        tenant_id: session.tenant_id().to_string(),
        original_file_name: session.file().map(|f| f.name().to_string()),
        archive_size_bytes: session.file().map(|f| f.size()),
        valid,
        provenance: Provenance {
            initiated_at: session.initiated_at(),
            completed_at,
            validated_files: results.keys().cloned().collect(),
            agent: session.agent().unwrap_or("unknown").to_string(),
            sha256: session.file().map(|f| f.sha256_hex()),
        },
        validation_results: results,
        files_not_processed: session.files_not_processed().to_vec(),
        payload_and_validation_outcomes: pairs,
        asset_diagnostics: session.asset_diagnostics().to_vec(),
    })
}
