//! Worker supervision
//!
//! The native audio and media bindings can leave process-wide state broken
//! when they fail, so recovery means a brand new worker process rather than a
//! retry in place. The supervisor launches a worker, waits for its exit
//! status, and decides:
//!
//! | worker exit              | supervisor                                   |
//! |--------------------------|----------------------------------------------|
//! | `Clean`                  | stop, success                                |
//! | `CapabilityUnavailable`  | stop, failure (restarting cannot fix it)     |
//! | `Fault`                  | back off, relaunch; give up after too many   |

use futures_util::future::{FutureExt, LocalBoxFuture};
use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::Instant;

use crate::config::{Config, WORKER_CONFIG_ENV};
use crate::constants::WORKER_ARG;
use crate::error::Result;
use crate::worker::WorkerExit;

/// How long an interrupted worker gets to shut itself down
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Starts one isolated worker and reports how it ended
pub trait Launcher {
    fn launch(&mut self) -> LocalBoxFuture<'_, WorkerExit>;
}

/// Launches the current executable in worker mode
pub struct ChildProcessLauncher {
    program: PathBuf,
    config_toml: String,
}

impl ChildProcessLauncher {
    pub fn new(program: PathBuf, config: &Config) -> Result<Self> {
        Ok(Self {
            program,
            config_toml: config.to_toml()?,
        })
    }

    /// Re-run this binary as the worker
    pub fn current_exe(config: &Config) -> Result<Self> {
        Self::new(std::env::current_exe()?, config)
    }
}

impl Launcher for ChildProcessLauncher {
    fn launch(&mut self) -> LocalBoxFuture<'_, WorkerExit> {
        async move {
            let status = Command::new(&self.program)
                .arg(WORKER_ARG)
                .env(WORKER_CONFIG_ENV, &self.config_toml)
                .kill_on_drop(true)
                .status()
                .await;

            match status {
                Ok(status) => {
                    tracing::debug!("Worker process exited: {}", status);
                    WorkerExit::from_code(status.code())
                }
                Err(e) => {
                    tracing::error!("Failed to launch worker {}: {}", self.program.display(), e);
                    WorkerExit::Fault
                }
            }
        }
        .boxed_local()
    }
}

/// Why supervision ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorOutcome {
    /// The worker exited cleanly on its own
    Stopped,
    /// Ctrl+C reached the supervisor
    Interrupted,
    /// The worker cannot run on this host
    CapabilityUnavailable,
    /// Too many consecutive faults
    GaveUp { faults: u32 },
}

impl SupervisorOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, SupervisorOutcome::Stopped | SupervisorOutcome::Interrupted)
    }
}

/// Doubling restart delay with a cap and a consecutive-fault budget
#[derive(Debug, Clone)]
struct Backoff {
    base: Duration,
    max: Duration,
    budget: u32,
    stable_run: Duration,
    faults: u32,
    delay: Duration,
}

impl Backoff {
    fn new(config: &Config) -> Self {
        Self {
            base: config.restart_delay(),
            max: config.restart_backoff_max(),
            budget: config.max_restarts,
            stable_run: config.stable_run(),
            faults: 0,
            delay: config.restart_delay(),
        }
    }

    /// Record a fault after a worker ran for `ran`. Returns the delay before
    /// the next launch, or `None` once the budget is spent.
    fn on_fault(&mut self, ran: Duration) -> Option<Duration> {
        if ran >= self.stable_run {
            self.faults = 0;
            self.delay = self.base;
        }
        self.faults += 1;
        if self.budget > 0 && self.faults > self.budget {
            return None;
        }
        let delay = self.delay;
        self.delay = self.delay.saturating_mul(2).min(self.max);
        Some(delay)
    }
}

pub struct Supervisor<'a, L> {
    config: &'a Config,
    launcher: L,
    launches: u64,
}

impl<'a, L: Launcher> Supervisor<'a, L> {
    pub fn new(config: &'a Config, launcher: L) -> Self {
        Self {
            config,
            launcher,
            launches: 0,
        }
    }

    /// Supervise until a worker exits cleanly, a permanent failure occurs,
    /// the fault budget runs out, or `shutdown` resolves.
    pub async fn run<S>(&mut self, shutdown: S) -> SupervisorOutcome
    where
        S: Future<Output = ()>,
    {
        tracing::info!("Supervisor starting worker with automatic restart");
        tokio::pin!(shutdown);
        let mut backoff = Backoff::new(self.config);

        loop {
            self.launches += 1;
            let started = Instant::now();
            tracing::info!("Launching worker #{}", self.launches);

            let (exit, interrupted) = {
                let worker = self.launcher.launch();
                tokio::pin!(worker);
                tokio::select! {
                    exit = &mut worker => (exit, false),
                    _ = &mut shutdown => {
                        tracing::info!("Interrupt received, waiting for worker to stop");
                        match tokio::time::timeout(SHUTDOWN_GRACE, &mut worker).await {
                            Ok(exit) => (exit, true),
                            Err(_) => {
                                tracing::warn!("Worker did not stop within {:?}, killing it", SHUTDOWN_GRACE);
                                (WorkerExit::Fault, true)
                            }
                        }
                    }
                }
            };

            if interrupted {
                tracing::info!("Worker ended with {:?}; supervisor exiting", exit);
                return SupervisorOutcome::Interrupted;
            }

            match exit {
                WorkerExit::Clean => {
                    tracing::info!("Worker exited cleanly; supervisor exiting");
                    return SupervisorOutcome::Stopped;
                }
                WorkerExit::CapabilityUnavailable => {
                    tracing::error!(
                        "Worker cannot access the native audio/media bindings; not restarting"
                    );
                    return SupervisorOutcome::CapabilityUnavailable;
                }
                WorkerExit::Fault => {
                    let Some(delay) = backoff.on_fault(started.elapsed()) else {
                        tracing::error!(
                            "Worker crashed {} times in a row; giving up",
                            backoff.faults
                        );
                        return SupervisorOutcome::GaveUp {
                            faults: backoff.faults,
                        };
                    };

                    tracing::warn!(
                        "Worker crashed ({} in a row), restarting in {:?}",
                        backoff.faults,
                        delay
                    );
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = &mut shutdown => {
                            tracing::info!("Interrupt received during restart delay");
                            return SupervisorOutcome::Interrupted;
                        }
                    }
                }
            }
        }
    }

    pub fn launches(&self) -> u64 {
        self.launches
    }

    pub fn launcher(&self) -> &L {
        &self.launcher
    }
}
