pub mod config;
pub mod error;
pub mod fs_helpers;
pub mod ids;
pub mod ingest;
pub mod interaction;
pub mod orchestrate;
pub mod store;
pub mod upload;

#[cfg(test)]
mod test_support;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

pub use error::{ErrorResponse, InteractionError};
pub use interaction::{Ingress, InteractionOutcome, InteractionRequest};
pub use orchestrate::{ScriptValidationEngine, ValidationEngine, ValidationResponse};
pub use upload::UploadedArchive;

#[derive(Parser)]
#[command(name = "flatfile-ingress")]
#[command(about = "Validate the CSV files of an uploaded archive", long_about = None)]
#[command(version)]
struct Cli {
    /// Archive to validate (ZIP or tar.gz)
    archive: PathBuf,

    /// Tenant the submission belongs to
    #[arg(long)]
    tenant: String,

    /// JSON configuration file; environment overrides still apply
    #[arg(long)]
    config: Option<PathBuf>,

    /// Request metadata carrying the upload name, e.g. a Content-Disposition header
    #[arg(long)]
    metadata: Option<String>,

    /// Extra request parameter as key=value (repeatable)
    #[arg(long = "param", value_parser = parse_key_value)]
    params: Vec<(String, String)>,

    /// Log only warnings and errors (stdout is reserved for JSON)
    #[arg(long)]
    quiet: bool,
}

fn parse_key_value(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .filter(|(k, _)| !k.is_empty())
        .ok_or_else(|| format!("expected key=value, got `{raw}`"))
}

/// Exit codes: 0 valid, 1 validated with failures, 2 rejected, 3 setup error.
pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let default_filter = if cli.quiet {
        "warn"
    } else {
        config::default_log_filter()
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .init();

    tracing::info!("{} starting v{}", config::APP_NAME, config::APP_VERSION);

    match execute(cli) {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(error = %e, "Ingress setup failed");
            eprintln!("error: {e}");
            ExitCode::from(3)
        }
    }
}

fn execute(cli: Cli) -> Result<ExitCode, InteractionError> {
    let config = config::OrchestratorConfig::load(cli.config.as_deref())?;
    let bytes = std::fs::read(&cli.archive)?;

    let upload = match &cli.metadata {
        Some(metadata) => UploadedArchive::from_request(metadata, bytes),
        None => {
            let name = cli
                .archive
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            UploadedArchive::new(&name, bytes)
        }
    };

    let mut request = InteractionRequest::new(cli.tenant, upload);
    for (key, value) in cli.params {
        request = request.with_request_parameter(key, value);
    }

    let validator = Arc::new(ScriptValidationEngine::from_config(&config));
    let ingress = Ingress::new(config, validator);

    let runtime = tokio::runtime::Runtime::new()?;
    let outcome = runtime.block_on(ingress.run_interaction(request));

    let rendered = outcome
        .to_json_pretty()
        .map_err(orchestrate::OrchestrationError::from)?;
    println!("{rendered}");

    Ok(match &outcome {
        InteractionOutcome::Completed(r) if r.valid => ExitCode::SUCCESS,
        InteractionOutcome::Completed(_) => ExitCode::from(1),
        InteractionOutcome::Rejected(_) => ExitCode::from(2),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses_params_and_tenant() {
        let cli = Cli::try_parse_from([
            "flatfile-ingress",
            "batch.zip",
            "--tenant",
            "tenant-a",
            "--param",
            "origin=http",
            "--param",
            "source = mirth",
        ])
        .unwrap();
        assert_eq!(cli.archive, PathBuf::from("batch.zip"));
        assert_eq!(cli.tenant, "tenant-a");
        assert_eq!(
            cli.params,
            vec![
                ("origin".to_string(), "http".to_string()),
                ("source".to_string(), "mirth".to_string())
            ]
        );
        assert!(!cli.quiet);
    }

    #[test]
    fn cli_requires_tenant() {
        assert!(Cli::try_parse_from(["flatfile-ingress", "batch.zip"]).is_err());
    }

    #[test]
    fn key_value_parser_rejects_missing_separator() {
        assert!(parse_key_value("origin").is_err());
        assert!(parse_key_value("=x").is_err());
        assert_eq!(parse_key_value("a=b=c").unwrap(), ("a".into(), "b=c".into()));
    }
}
