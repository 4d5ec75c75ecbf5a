mod cli;

use anyhow::Result;
use clap::Parser;
use cli::Cli;
use fiche_workflow::config::{ServiceConfig, CONFIG_FILE_NAME};
use fiche_workflow::domain::errors::CoreError;
use fiche_workflow::service::WorkflowService;
use serde_json::json;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// Exit status for a request the workflow refused.
const EXIT_REFUSED: u8 = 2;

fn init_tracing() {
    let filter = EnvFilter::try_from_env("FICHES_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

fn load_config(cli: &Cli) -> Result<ServiceConfig> {
    let mut config = match (&cli.config, &cli.data_dir) {
        (Some(path), _) => ServiceConfig::load(path)?,
        (None, Some(dir)) if dir.join(CONFIG_FILE_NAME).exists() => {
            ServiceConfig::load(&dir.join(CONFIG_FILE_NAME))?
        }
        (None, _) => ServiceConfig::resolve(None)?,
    };
    if let Some(dir) = &cli.data_dir {
        config.data_dir = Some(dir.clone());
    }
    Ok(config)
}

async fn run(cli: Cli) -> Result<serde_json::Value> {
    let config = load_config(&cli)?;
    let service = WorkflowService::from_config(&config)?;
    tracing::debug!(
        data_dir = %config.data_dir()?.display(),
        git_sha = env!("FICHES_GIT_SHA"),
        built_at = env!("FICHES_BUILD_TIMESTAMP"),
        "service ready"
    );
    cli::run(&cli, &service).await
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    match run(cli).await {
        Ok(value) => match serde_json::to_string_pretty(&value) {
            Ok(text) => {
                println!("{}", text);
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("[fiches] Error: {}", e);
                ExitCode::FAILURE
            }
        },
        Err(err) => match err.downcast_ref::<CoreError>() {
            Some(core) => {
                let body = json!({
                    "error": core.kind(),
                    "message": core.to_string(),
                    "retryable": core.is_retryable(),
                });
                eprintln!("{}", body);
                ExitCode::from(EXIT_REFUSED)
            }
            None => {
                eprintln!("[fiches] Error: {:#}", err);
                ExitCode::FAILURE
            }
        },
    }
}
