use std::any::Any;
use std::fs;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Semaphore;

use super::aggregate::FileOutcome;
use super::session::OrchestrationSession;
use super::validator::{ValidationEngine, ValidationRequest};
use super::OrchestrationError;
use crate::ingest::display_name;

struct FileRun {
    outcome: FileOutcome,
    content: Option<Vec<u8>>,
}

/// Validate every processable file of the session.
///
/// At most `concurrency` validator calls run at once, each on a blocking
/// worker. Results land in one slot per file index, so the outcome of a
/// file never depends on scheduling order. A validator error or panic
/// becomes a failed outcome for that file only.
pub async fn dispatch(
    session: &mut OrchestrationSession,
    engine: Arc<dyn ValidationEngine>,
    concurrency: usize,
) -> Result<(), OrchestrationError> {
    let files = session.csv_files().to_vec();
    if files.is_empty() {
        tracing::info!(
            interaction_id = %session.master_interaction_id(),
            "No processable files; nothing to dispatch"
        );
        return Ok(());
    }

    let workspace = session
        .workspace_dir()
        .ok_or_else(|| OrchestrationError::Dispatch("session has no workspace".into()))?;
    if !workspace.is_dir() {
        return Err(OrchestrationError::WorkspaceUnreachable { path: workspace });
    }

    let capture = session.generate_bundle();
    let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
    let mut handles = Vec::with_capacity(files.len());

    for file in &files {
        let permit = semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| OrchestrationError::Dispatch(e.to_string()))?;
        let request = session.request_for(file.clone(), workspace.clone());
        let engine = Arc::clone(&engine);
        let started_at = Utc::now();

        let handle = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            run_one(engine.as_ref(), &request, capture)
        });
        handles.push((started_at, handle));
    }

    let mut slots: Vec<Option<FileRun>> = (0..files.len()).map(|_| None).collect();
    for (index, (started_at, handle)) in handles.into_iter().enumerate() {
        let run = match handle.await {
            Ok(run) => run,
            Err(e) => {
                let reason = if e.is_panic() {
                    format!("Validator panicked: {}", panic_message(e.into_panic()))
                } else {
                    format!("Validator task cancelled: {e}")
                };
                tracing::error!(
                    interaction_id = %session.master_interaction_id(),
                    file = %display_name(&files[index]),
                    error = %reason,
                    "Validation task aborted"
                );
                FileRun {
                    outcome: FileOutcome::failed(reason, started_at),
                    content: None,
                }
            }
        };
        slots[index] = Some(run);
    }

    let mut failed = 0usize;
    for (file, slot) in files.iter().zip(slots) {
        let Some(run) = slot else { continue };
        if !run.outcome.passed() {
            failed += 1;
        }
        session.record(display_name(file), run.outcome, run.content);
    }

    tracing::info!(
        interaction_id = %session.master_interaction_id(),
        session_id = %session.session_id(),
        files = files.len(),
        failed,
        "Dispatch complete"
    );
    Ok(())
}

fn run_one(engine: &dyn ValidationEngine, request: &ValidationRequest, capture: bool) -> FileRun {
    let started_at = Utc::now();
    let content = if capture {
        match fs::read(&request.file) {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                tracing::warn!(file = %request.file_name(), error = %e, "Payload capture failed");
                None
            }
        }
    } else {
        None
    };

    let result = engine.validate(request);
    if let Err(e) = &result {
        tracing::warn!(
            interaction_id = %request.interaction_id,
            file = %request.file_name(),
            error = %e,
            "Validator reported failure"
        );
    }

    FileRun {
        outcome: FileOutcome::from_result(result, started_at),
        content,
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        return s.to_string();
    }
    if let Some(s) = payload.downcast_ref::<String>() {
        return s.clone();
    }
    "unknown panic".to_string()
}
