use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::aggregate::FileOutcome;
use super::validator::{ParameterMap, ValidationRequest};
use super::workspace::Workspace;
use super::OrchestrationError;
use crate::config::OrchestratorConfig;
use crate::ids::InteractionId;
use crate::ingest::{display_name, AssetDiagnostic, NotProcessedFile};
use crate::upload::UploadedArchive;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SessionState {
    Created,
    Built,
    Orchestrated,
    Cleared,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Created => "created",
            Self::Built => "built",
            Self::Orchestrated => "orchestrated",
            Self::Cleared => "cleared",
        };
        f.write_str(s)
    }
}

/// Accumulates session parameters. Obtained from
/// [`OrchestrationEngine::session`](super::OrchestrationEngine::session),
/// which pre-loads the engine-level config and request/header parameters.
///
/// Has no filesystem side effects; everything is checked in [`Self::build`].
pub struct SessionBuilder {
    config: Arc<OrchestratorConfig>,
    request_parameters: Arc<ParameterMap>,
    header_parameters: Arc<ParameterMap>,
    master_interaction_id: Option<InteractionId>,
    session_id: Option<String>,
    tenant_id: Option<String>,
    generate_bundle: Option<bool>,
    csv_files: Option<Vec<PathBuf>>,
    files_not_processed: Vec<NotProcessedFile>,
    file: Option<UploadedArchive>,
    workspace: Option<Workspace>,
    asset_diagnostics: Vec<AssetDiagnostic>,
}

impl SessionBuilder {
    pub(crate) fn new(
        config: Arc<OrchestratorConfig>,
        request_parameters: Arc<ParameterMap>,
        header_parameters: Arc<ParameterMap>,
    ) -> Self {
        Self {
            config,
            request_parameters,
            header_parameters,
            master_interaction_id: None,
            session_id: None,
            tenant_id: None,
            generate_bundle: None,
            csv_files: None,
            files_not_processed: Vec::new(),
            file: None,
            workspace: None,
            asset_diagnostics: Vec::new(),
        }
    }

    pub fn state(&self) -> SessionState {
        SessionState::Created
    }

    pub fn with_master_interaction_id(mut self, id: InteractionId) -> Self {
        self.master_interaction_id = Some(id);
        self
    }

    pub fn with_session_id(mut self, id: impl Into<String>) -> Self {
        self.session_id = Some(id.into());
        self
    }

    pub fn with_tenant_id(mut self, id: impl Into<String>) -> Self {
        self.tenant_id = Some(id.into());
        self
    }

    /// Overrides the engine default (`generateBundle` in the config).
    pub fn with_generate_bundle(mut self, generate: bool) -> Self {
        self.generate_bundle = Some(generate);
        self
    }

    /// Processable files, validated in the given order. An empty list is a
    /// valid file list.
    pub fn with_csv_file_list(mut self, files: Vec<PathBuf>) -> Self {
        self.csv_files = Some(files);
        self
    }

    pub fn with_files_not_processed(mut self, files: Vec<NotProcessedFile>) -> Self {
        self.files_not_processed = files;
        self
    }

    pub fn with_file(mut self, file: UploadedArchive) -> Self {
        self.file = Some(file);
        self
    }

    /// Hand the workspace guard to the session; it is released on clear.
    pub fn with_workspace(mut self, workspace: Workspace) -> Self {
        self.workspace = Some(workspace);
        self
    }

    pub fn with_asset_diagnostics(mut self, diagnostics: Vec<AssetDiagnostic>) -> Self {
        self.asset_diagnostics = diagnostics;
        self
    }

    /// Per-request parameters, merged over the engine's.
    pub fn with_request_parameters(mut self, params: ParameterMap) -> Self {
        if !params.is_empty() {
            let mut merged = (*self.request_parameters).clone();
            merged.extend(params);
            self.request_parameters = Arc::new(merged);
        }
        self
    }

    /// Per-request header parameters, merged over the engine's.
    pub fn with_header_parameters(mut self, params: ParameterMap) -> Self {
        if !params.is_empty() {
            let mut merged = (*self.header_parameters).clone();
            merged.extend(params);
            self.header_parameters = Arc::new(merged);
        }
        self
    }

    pub fn build(self) -> Result<OrchestrationSession, OrchestrationError> {
        let master_interaction_id = self.master_interaction_id.ok_or_else(|| {
            OrchestrationError::InvalidSessionConfig("master interaction id is required".into())
        })?;
        let session_id = required(self.session_id, "session id")?;
        let tenant_id = required(self.tenant_id, "tenant id")?;
        if self.csv_files.is_none() && self.file.is_none() {
            return Err(OrchestrationError::InvalidSessionConfig(
                "either a CSV file list or an uploaded file is required".into(),
            ));
        }
        // Results are keyed by file name
        if let Some(files) = &self.csv_files {
            let mut names = HashSet::new();
            for path in files {
                let name = display_name(path);
                if !names.insert(name.clone()) {
                    return Err(OrchestrationError::InvalidSessionConfig(format!(
                        "duplicate file name in CSV file list: {name}"
                    )));
                }
            }
        }

        Ok(OrchestrationSession {
            master_interaction_id,
            session_id,
            tenant_id,
            generate_bundle: self.generate_bundle.unwrap_or(self.config.generate_bundle),
            csv_files: self.csv_files.unwrap_or_default(),
            files_not_processed: self.files_not_processed,
            file: self.file,
            workspace: self.workspace,
            asset_diagnostics: self.asset_diagnostics,
            request_parameters: self.request_parameters,
            header_parameters: self.header_parameters,
            state: SessionState::Built,
            initiated_at: Utc::now(),
            completed_at: None,
            agent: None,
            results: BTreeMap::new(),
            payloads: Vec::new(),
        })
    }
}

fn required(value: Option<String>, what: &str) -> Result<String, OrchestrationError> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        Some(_) => Err(OrchestrationError::InvalidSessionConfig(format!("{what} is blank"))),
        None => Err(OrchestrationError::InvalidSessionConfig(format!("{what} is required"))),
    }
}

/// Captured file content paired with its outcome, in file-list order.
#[derive(Debug, Clone)]
pub struct CapturedPayload {
    pub file_name: String,
    pub content: Option<Vec<u8>>,
}

/// One orchestration unit: identifiers, file lists and the result
/// accumulator. The accumulator is only written by the dispatcher.
#[derive(Debug)]
pub struct OrchestrationSession {
    master_interaction_id: InteractionId,
    session_id: String,
    tenant_id: String,
    generate_bundle: bool,
    csv_files: Vec<PathBuf>,
    files_not_processed: Vec<NotProcessedFile>,
    file: Option<UploadedArchive>,
    workspace: Option<Workspace>,
    asset_diagnostics: Vec<AssetDiagnostic>,
    request_parameters: Arc<ParameterMap>,
    header_parameters: Arc<ParameterMap>,
    state: SessionState,
    initiated_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
    agent: Option<String>,
    results: BTreeMap<String, FileOutcome>,
    payloads: Vec<CapturedPayload>,
}

impl OrchestrationSession {
    pub fn master_interaction_id(&self) -> &InteractionId {
        &self.master_interaction_id
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn tenant_id(&self) -> &str {
        &self.tenant_id
    }

    pub fn generate_bundle(&self) -> bool {
        self.generate_bundle
    }

    pub fn csv_files(&self) -> &[PathBuf] {
        &self.csv_files
    }

    pub fn files_not_processed(&self) -> &[NotProcessedFile] {
        &self.files_not_processed
    }

    pub fn file(&self) -> Option<&UploadedArchive> {
        self.file.as_ref()
    }

    pub fn asset_diagnostics(&self) -> &[AssetDiagnostic] {
        &self.asset_diagnostics
    }

    pub fn request_parameters(&self) -> &ParameterMap {
        &self.request_parameters
    }

    pub fn header_parameters(&self) -> &ParameterMap {
        &self.header_parameters
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn initiated_at(&self) -> DateTime<Utc> {
        self.initiated_at
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    pub fn agent(&self) -> Option<&str> {
        self.agent.as_deref()
    }

    /// Per-file outcomes keyed by file name.
    pub fn validation_results(&self) -> &BTreeMap<String, FileOutcome> {
        &self.results
    }

    pub fn payloads(&self) -> &[CapturedPayload] {
        &self.payloads
    }

    pub fn workspace(&self) -> Option<&Workspace> {
        self.workspace.as_ref()
    }

    /// Directory the validator runs in: the attached workspace, or else the
    /// common parent of the file list.
    pub fn workspace_dir(&self) -> Option<PathBuf> {
        if let Some(ws) = &self.workspace {
            return Some(ws.dir().to_path_buf());
        }
        self.csv_files
            .first()
            .and_then(|f| f.parent())
            .map(Path::to_path_buf)
    }

    pub(crate) fn request_for(&self, file: PathBuf, workspace: PathBuf) -> ValidationRequest {
        ValidationRequest {
            interaction_id: self.master_interaction_id,
            session_id: self.session_id.clone(),
            tenant_id: self.tenant_id.clone(),
            file,
            workspace,
            request_parameters: Arc::clone(&self.request_parameters),
            header_parameters: Arc::clone(&self.header_parameters),
        }
    }

    pub(crate) fn ensure_state(&self, expected: SessionState) -> Result<(), OrchestrationError> {
        if self.state != expected {
            return Err(OrchestrationError::InvalidState {
                expected,
                actual: self.state,
            });
        }
        Ok(())
    }

    pub(crate) fn set_agent(&mut self, agent: String) {
        self.agent = Some(agent);
    }

    pub(crate) fn record(&mut self, file_name: String, outcome: FileOutcome, content: Option<Vec<u8>>) {
        if self.generate_bundle {
            self.payloads.push(CapturedPayload {
                file_name: file_name.clone(),
                content,
            });
        }
        self.results.insert(file_name, outcome);
    }

    pub(crate) fn mark_orchestrated(&mut self) {
        self.completed_at = Some(Utc::now());
        self.state = SessionState::Orchestrated;
    }

    /// Release the workspace and move to `Cleared`. Only the engine calls this.
    pub(crate) fn release(&mut self) -> std::io::Result<()> {
        self.state = SessionState::Cleared;
        match self.workspace.as_mut() {
            Some(ws) => ws.release(),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn builder() -> SessionBuilder {
        SessionBuilder::new(
            Arc::new(OrchestratorConfig::default()),
            Arc::default(),
            Arc::default(),
        )
    }

    fn complete() -> SessionBuilder {
        builder()
            .with_master_interaction_id(InteractionId::new())
            .with_session_id("s-1")
            .with_tenant_id("tenant-a")
            .with_csv_file_list(vec![PathBuf::from("/ws/a.csv")])
    }

    fn invalid_config_message(result: Result<OrchestrationSession, OrchestrationError>) -> String {
        match result {
            Err(OrchestrationError::InvalidSessionConfig(msg)) => msg,
            other => panic!("expected InvalidSessionConfig, got {other:?}"),
        }
    }

    #[test]
    fn duplicate_file_names_are_rejected() {
        let msg = invalid_config_message(
            complete()
                .with_csv_file_list(vec![PathBuf::from("/a/x.csv"), PathBuf::from("/b/x.csv")])
                .build(),
        );
        assert!(msg.contains("x.csv"), "{msg}");
    }

    #[test]
    fn distinct_file_names_are_accepted() {
        let session = complete()
            .with_csv_file_list(vec![PathBuf::from("/a/x.csv"), PathBuf::from("/a/y.csv")])
            .build()
            .unwrap();
        assert_eq!(session.csv_files().len(), 2);
    }

    #[test]
    fn builds_with_required_fields() {
        let id = InteractionId::new();
        let session = complete().with_master_interaction_id(id).build().unwrap();
        assert_eq!(session.state(), SessionState::Built);
        assert_eq!(session.master_interaction_id(), &id);
        assert_eq!(session.session_id(), "s-1");
        assert_eq!(session.tenant_id(), "tenant-a");
        assert_eq!(session.csv_files(), &[PathBuf::from("/ws/a.csv")]);
        assert!(session.validation_results().is_empty());
        assert!(session.completed_at().is_none());
    }

    #[test]
    fn builder_starts_in_created_state() {
        assert_eq!(builder().state(), SessionState::Created);
    }

    #[test]
    fn missing_tenant_is_rejected() {
        let result = builder()
            .with_master_interaction_id(InteractionId::new())
            .with_session_id("s-1")
            .with_csv_file_list(vec![])
            .build();
        assert!(invalid_config_message(result).contains("tenant id"));
    }

    #[test]
    fn blank_session_id_is_rejected() {
        let result = complete().with_session_id("   ").build();
        assert!(invalid_config_message(result).contains("session id is blank"));
    }

    #[test]
    fn missing_master_interaction_id_is_rejected() {
        let result = builder()
            .with_session_id("s-1")
            .with_tenant_id("t")
            .with_csv_file_list(vec![])
            .build();
        assert!(invalid_config_message(result).contains("master interaction id"));
    }

    #[test]
    fn neither_file_list_nor_file_is_rejected() {
        let result = builder()
            .with_master_interaction_id(InteractionId::new())
            .with_session_id("s-1")
            .with_tenant_id("t")
            .build();
        assert!(invalid_config_message(result).contains("file"));
    }

    #[test]
    fn raw_file_alone_is_enough() {
        let session = builder()
            .with_master_interaction_id(InteractionId::new())
            .with_session_id("s-1")
            .with_tenant_id("t")
            .with_file(UploadedArchive::new("batch.zip", b"PK".to_vec()))
            .build()
            .unwrap();
        assert!(session.csv_files().is_empty());
        assert_eq!(session.file().map(|f| f.name()), Some("batch.zip"));
    }

    #[test]
    fn empty_file_list_is_valid() {
        let session = complete().with_csv_file_list(vec![]).build().unwrap();
        assert!(session.csv_files().is_empty());
    }

    #[test]
    fn generate_bundle_defaults_to_config() {
        let mut config = OrchestratorConfig::default();
        config.generate_bundle = false;
        let b = SessionBuilder::new(Arc::new(config), Arc::default(), Arc::default())
            .with_master_interaction_id(InteractionId::new())
            .with_session_id("s")
            .with_tenant_id("t")
            .with_csv_file_list(vec![]);
        assert!(!b.build().unwrap().generate_bundle());

        let session = complete().with_generate_bundle(false).build().unwrap();
        assert!(!session.generate_bundle());
    }

    #[test]
    fn workspace_dir_falls_back_to_file_parent() {
        let session = complete().build().unwrap();
        assert_eq!(session.workspace_dir(), Some(PathBuf::from("/ws")));
    }

    #[test]
    fn state_check_reports_expected_and_actual() {
        let session = complete().build().unwrap();
        assert!(session.ensure_state(SessionState::Built).is_ok());
        let err = session.ensure_state(SessionState::Orchestrated).unwrap_err();
        assert_eq!(err.to_string(), "Session is built, expected orchestrated");
    }

    #[test]
    fn request_carries_session_identity() {
        let mut params = ParameterMap::new();
        params.insert("origin".into(), "http".into());
        let session = SessionBuilder::new(
            Arc::new(OrchestratorConfig::default()),
            Arc::new(params),
            Arc::default(),
        )
        .with_master_interaction_id(InteractionId::new())
        .with_session_id("s-9")
        .with_tenant_id("tenant-z")
        .with_csv_file_list(vec![])
        .build()
        .unwrap();

        let request = session.request_for(PathBuf::from("/ws/a.csv"), PathBuf::from("/ws"));
        assert_eq!(request.tenant_id, "tenant-z");
        assert_eq!(request.session_id, "s-9");
        assert_eq!(request.request_parameters.get("origin").map(String::as_str), Some("http"));
        assert_eq!(request.file_name(), "a.csv");
    }

    #[test]
    fn request_parameters_merge_over_engine_defaults() {
        let mut defaults = ParameterMap::new();
        defaults.insert("origin".into(), "http".into());
        defaults.insert("source".into(), "mirth".into());
        let mut overrides = ParameterMap::new();
        overrides.insert("origin".into(), "sftp".into());

        let session = SessionBuilder::new(
            Arc::new(OrchestratorConfig::default()),
            Arc::new(defaults),
            Arc::default(),
        )
        .with_request_parameters(overrides)
        .with_master_interaction_id(InteractionId::new())
        .with_session_id("s")
        .with_tenant_id("t")
        .with_csv_file_list(vec![])
        .build()
        .unwrap();

        let params = session.request_parameters();
        assert_eq!(params.get("origin").map(String::as_str), Some("sftp"));
        assert_eq!(params.get("source").map(String::as_str), Some("mirth"));
    }
}
