//! End-to-end processing of one inbound archive.
//!
//! ```text
//! persist upload → extract → classify → screen → provision
//!     → build session → orchestrate → aggregate → clear
//! ```
//! The staging steps up to provisioning are blocking and run on a
//! `spawn_blocking` thread. The workspace guard is acquired before
//! extraction. Every exit path after that point releases it, either through
//! `engine.clear` or by dropping the guard.

use std::sync::Arc;

use serde::Serialize;
use tracing::Instrument;

use crate::config::OrchestratorConfig;
use crate::error::{ErrorResponse, InteractionError};
use crate::ids::{new_session_id, InteractionId};
use crate::ingest::{
    classify_reserving, extract, provision, screen, Classification, ProvisionReport,
};
use crate::orchestrate::{
    aggregate, InteractionArchive, NoopInteractionArchive, OrchestrationEngine, ParameterMap,
    ValidationEngine, ValidationResponse, Workspace,
};
use crate::store::ArchiveStore;
use crate::upload::UploadedArchive;

/// One inbound submission.
#[derive(Debug, Clone)]
pub struct InteractionRequest {
    pub tenant_id: String,
    pub upload: UploadedArchive,
    pub request_parameters: ParameterMap,
    pub header_parameters: ParameterMap,
}

impl InteractionRequest {
    pub fn new(tenant_id: impl Into<String>, upload: UploadedArchive) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            upload,
            request_parameters: ParameterMap::new(),
            header_parameters: ParameterMap::new(),
        }
    }

    pub fn with_request_parameter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.request_parameters.insert(key.into(), value.into());
        self
    }

    pub fn with_header_parameter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.header_parameters.insert(key.into(), value.into());
        self
    }
}

/// Either the aggregated validation result or a structured rejection.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum InteractionOutcome {
    Completed(ValidationResponse),
    Rejected(ErrorResponse),
}

impl InteractionOutcome {
    pub fn interaction_id(&self) -> &InteractionId {
        match self {
            Self::Completed(r) => &r.interaction_id,
            Self::Rejected(r) => &r.interaction_id,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed(_))
    }

    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// Entry point wiring the store, the orchestration engine and the archive
/// collaborator. Shared across concurrent interactions.
pub struct Ingress {
    config: Arc<OrchestratorConfig>,
    store: ArchiveStore,
    engine: OrchestrationEngine,
    archive: Arc<dyn InteractionArchive>,
}

impl Ingress {
    pub fn new(config: OrchestratorConfig, validator: Arc<dyn ValidationEngine>) -> Self {
        let config = Arc::new(config);
        Self {
            store: ArchiveStore::from_config(&config),
            engine: OrchestrationEngine::new(Arc::clone(&config), validator),
            archive: Arc::new(NoopInteractionArchive),
            config,
        }
    }

    pub fn with_archive(mut self, archive: Arc<dyn InteractionArchive>) -> Self {
        self.archive = archive;
        self
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn store(&self) -> &ArchiveStore {
        &self.store
    }

    pub fn engine(&self) -> &OrchestrationEngine {
        &self.engine
    }

    /// Process one submission under a freshly minted interaction id.
    ///
    /// Every failure is reported as [`InteractionOutcome::Rejected`] carrying
    /// that id; nothing is silently dropped.
    pub async fn run_interaction(&self, request: InteractionRequest) -> InteractionOutcome {
        let interaction_id = InteractionId::new();
        let span = tracing::info_span!(
            "interaction",
            interaction_id = %interaction_id,
            tenant_id = %request.tenant_id
        );

        match self.process(interaction_id, request).instrument(span).await {
            Ok(response) => InteractionOutcome::Completed(response),
            Err(e) => {
                tracing::error!(interaction_id = %interaction_id, error = %e, "Interaction rejected");
                InteractionOutcome::Rejected(ErrorResponse::from_error(interaction_id, &e))
            }
        }
    }

    async fn process(
        &self,
        interaction_id: InteractionId,
        request: InteractionRequest,
    ) -> Result<ValidationResponse, InteractionError> {
        let InteractionRequest {
            tenant_id,
            upload,
            request_parameters,
            header_parameters,
        } = request;

        tracing::info!(
            file = %upload.name(),
            size_bytes = upload.size(),
            "Interaction received"
        );

        if let Err(e) = self.archive.save_archive_interaction(&interaction_id, &upload) {
            tracing::warn!(error = %e, "Archive interaction not saved");
        }

        // Filesystem staging runs on a dedicated thread
        let store = self.store.clone();
        let config = Arc::clone(&self.config);
        let span = tracing::Span::current();
        let staged = tokio::task::spawn_blocking(move || {
            let _entered = span.enter();
            stage(&store, &config, interaction_id, upload)
        })
        .await
        .map_err(|e| InteractionError::Staging(e.to_string()))??;

        let Staged {
            workspace,
            upload,
            classification,
            assets,
        } = staged;

        let mut session = self
            .engine
            .session()
            .with_request_parameters(request_parameters)
            .with_header_parameters(header_parameters)
            .with_master_interaction_id(interaction_id)
            .with_session_id(new_session_id())
            .with_tenant_id(tenant_id)
            .with_csv_file_list(classification.processable)
            .with_files_not_processed(classification.not_processed)
            .with_asset_diagnostics(assets.diagnostics())
            .with_file(upload)
            .with_workspace(workspace)
            .build()?;

        let result = match self.engine.orchestrate(&mut session).await {
            Ok(()) => aggregate(&session),
            Err(e) => Err(e),
        };

        if let Err(e) = self.engine.clear(session) {
            tracing::warn!(error = %e, "Workspace cleanup failed");
        }

        let response = result?;
        tracing::info!(
            valid = response.valid,
            validated = response.validation_results.len(),
            not_processed = response.files_not_processed.len(),
            "Interaction completed"
        );
        Ok(response)
    }
}

/// Workspace contents ready for a session.
struct Staged {
    workspace: Workspace,
    upload: UploadedArchive,
    classification: Classification,
    assets: ProvisionReport,
}

/// Persist the upload, then extract, classify, screen and provision it.
///
/// Blocking. Dropping the guard on any early return removes the workspace.
fn stage(
    store: &ArchiveStore,
    config: &OrchestratorConfig,
    interaction_id: InteractionId,
    upload: UploadedArchive,
) -> Result<Staged, InteractionError> {
    let mut workspace = store.acquire_workspace(&interaction_id)?;
    let inbound = store.save_upload(&interaction_id, &upload)?;
    workspace.attach_inbound_file(inbound.clone());

    extract(&inbound, workspace.dir(), &interaction_id)?;

    let mut classification = classify_reserving(workspace.dir(), &config.asset_file_names())?;
    if config.screen_content {
        classification = screen(classification);
    }

    let assets = provision(&config.asset_paths(), workspace.dir());
    if !assets.is_complete() {
        tracing::warn!(
            failed = assets.errors.len(),
            "Validation assets incomplete; validating anyway"
        );
    }

    Ok(Staged {
        workspace,
        upload,
        classification,
        assets,
    })
}
