//! Autoduck service
//!
//! Without arguments this process is the supervisor: it loads the config and
//! keeps a worker process alive. With the hidden `worker` argument it is that
//! worker, running the polling loop until Ctrl+C.

use anyhow::{Context, Result};
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use autoduck::{
    config::{Config, WORKER_CONFIG_ENV},
    constants::WORKER_ARG,
    platform,
    supervisor::{ChildProcessLauncher, Supervisor},
    worker::{self, WorkerExit},
};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<ExitCode> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    if std::env::args().nth(1).as_deref() == Some(WORKER_ARG) {
        Ok(run_worker().await)
    } else {
        run_supervisor().await
    }
}

async fn run_supervisor() -> Result<ExitCode> {
    tracing::info!("Starting Autoduck {}", env!("CARGO_PKG_VERSION"));

    let config = Config::load().context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;
    tracing::info!(
        "Ducking {} (session '{}'), threshold {}, ignoring {:?}",
        config.target_process,
        config.target_app_id,
        config.peak_threshold,
        config.ignore_processes
    );

    let launcher = ChildProcessLauncher::current_exe(&config)
        .context("Failed to prepare worker launcher")?;
    let outcome = Supervisor::new(&config, launcher)
        .run(platform::ctrl_c())
        .await;

    tracing::info!("Supervisor finished: {:?}", outcome);
    Ok(if outcome.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

async fn run_worker() -> ExitCode {
    let config = match worker_config() {
        Ok(config) => config,
        Err(e) => {
            // The same config would fail again on restart
            tracing::error!("Worker config unusable: {:#}", e);
            return exit_code(WorkerExit::CapabilityUnavailable);
        }
    };

    exit_code(worker::run_native(&config).await)
}

/// The supervisor's config if handed over, else load our own
fn worker_config() -> Result<Config> {
    match std::env::var(WORKER_CONFIG_ENV) {
        Ok(text) => Config::from_toml(&text).context("Malformed config from supervisor"),
        Err(_) => Config::load().context("Failed to load configuration"),
    }
}

fn exit_code(exit: WorkerExit) -> ExitCode {
    ExitCode::from(exit.code() as u8)
}
