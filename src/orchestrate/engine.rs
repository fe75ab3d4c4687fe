use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use super::dispatch::dispatch;
use super::session::{OrchestrationSession, SessionBuilder, SessionState};
use super::validator::{ParameterMap, ValidationEngine};
use super::OrchestrationError;
use crate::config::OrchestratorConfig;

/// Creates, runs and clears orchestration sessions.
///
/// Shared across interactions. The registry only tracks which sessions are
/// live; sessions themselves never share state.
pub struct OrchestrationEngine {
    config: Arc<OrchestratorConfig>,
    validator: Arc<dyn ValidationEngine>,
    request_parameters: Arc<ParameterMap>,
    header_parameters: Arc<ParameterMap>,
    registry: Mutex<HashMap<String, Option<PathBuf>>>,
}

impl OrchestrationEngine {
    pub fn new(config: Arc<OrchestratorConfig>, validator: Arc<dyn ValidationEngine>) -> Self {
        Self {
            config,
            validator,
            request_parameters: Arc::default(),
            header_parameters: Arc::default(),
            registry: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_request_parameters(mut self, params: ParameterMap) -> Self {
        self.request_parameters = Arc::new(params);
        self
    }

    pub fn with_header_parameters(mut self, params: ParameterMap) -> Self {
        self.header_parameters = Arc::new(params);
        self
    }

    pub fn config(&self) -> &Arc<OrchestratorConfig> {
        &self.config
    }

    /// A builder pre-loaded with this engine's config and parameters.
    pub fn session(&self) -> SessionBuilder {
        SessionBuilder::new(
            Arc::clone(&self.config),
            Arc::clone(&self.request_parameters),
            Arc::clone(&self.header_parameters),
        )
    }

    /// Validate every processable file of a built session.
    ///
    /// Per-file failures are recorded in the session; only orchestration
    /// faults are returned as errors.
    pub async fn orchestrate(&self, session: &mut OrchestrationSession) -> Result<(), OrchestrationError> {
        session.ensure_state(SessionState::Built)?;
        self.register(session);

        tracing::info!(
            interaction_id = %session.master_interaction_id(),
            session_id = %session.session_id(),
            tenant_id = %session.tenant_id(),
            files = session.csv_files().len(),
            not_processed = session.files_not_processed().len(),
            "Orchestration started"
        );

        session.set_agent(self.validator.agent());
        dispatch(session, Arc::clone(&self.validator), self.config.concurrency_limit()).await?;
        session.mark_orchestrated();
        Ok(())
    }

    /// Release the session's workspace and registry entry.
    ///
    /// Consumes the session, so a session is cleared at most once.
    pub fn clear(&self, mut session: OrchestrationSession) -> std::io::Result<()> {
        if let Ok(mut registry) = self.registry.lock() {
            registry.remove(session.session_id());
        }
        let result = session.release();
        tracing::info!(
            interaction_id = %session.master_interaction_id(),
            session_id = %session.session_id(),
            state = %session.state(),
            "Session cleared"
        );
        result
    }

    /// Session ids currently between orchestration and clear, sorted.
    pub fn active_sessions(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .registry
            .lock()
            .map(|r| r.keys().cloned().collect())
            .unwrap_or_default();
        ids.sort();
        ids
    }

    /// Workspace directory registered for a live session.
    pub fn workspace_of(&self, session_id: &str) -> Option<PathBuf> {
        self.registry
            .lock()
            .ok()
            .and_then(|r| r.get(session_id).cloned().flatten())
    }

    fn register(&self, session: &OrchestrationSession) {
        if let Ok(mut registry) = self.registry.lock() {
            registry.insert(session.session_id().to_string(), session.workspace_dir());
        }
    }
}
