//! Service configuration
//!
//! One immutable [`Config`] is built at supervisor start and shared by
//! reference with every component. Workers receive the supervisor's exact
//! value through their environment, so every worker generation runs with the
//! same thresholds.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::constants::*;
use crate::error::ConfigError;

/// Environment variable pointing at an explicit config file
pub const CONFIG_PATH_ENV: &str = "AUTODUCK_CONFIG";

/// Environment variable carrying the serialized config into a worker process
pub const WORKER_CONFIG_ENV: &str = "AUTODUCK_WORKER_CONFIG";

/// File name looked up in the platform config directory
pub const CONFIG_FILE_NAME: &str = "autoduck.toml";

/// Thresholds, intervals and identities for one supervisor run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Process name of the player whose own audio is excluded, e.g. `spotify.exe`
    pub target_process: String,

    /// Substring matched against media session application identities
    pub target_app_id: String,

    /// Processes whose audio never counts as external
    pub ignore_processes: BTreeSet<String>,

    /// Peak level at or above which a session counts as audible
    pub peak_threshold: f32,

    /// Fraction of `peak_threshold` applied to the endpoint fallback
    pub endpoint_fallback_ratio: f32,

    pub active_debounce_secs: f64,
    pub inactive_debounce_secs: f64,
    pub poll_interval_secs: f64,
    pub heartbeat_interval_secs: f64,

    /// Delay before the first restart after a worker fault
    pub restart_delay_secs: f64,

    /// Upper bound for the doubling restart delay
    pub restart_backoff_max_secs: f64,

    /// Consecutive faults tolerated before the supervisor gives up; 0 restarts forever
    pub max_restarts: u32,

    /// A worker alive this long resets the consecutive fault counter
    pub stable_run_secs: f64,

    /// Number of external sessions listed in diagnostics
    pub diagnostics_top_n: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            target_process: DEFAULT_TARGET_PROCESS.to_string(),
            target_app_id: DEFAULT_TARGET_APP_ID.to_string(),
            ignore_processes: DEFAULT_IGNORE_PROCESSES
                .iter()
                .map(|s| s.to_string())
                .collect(),
            peak_threshold: DEFAULT_PEAK_THRESHOLD,
            endpoint_fallback_ratio: DEFAULT_ENDPOINT_FALLBACK_RATIO,
            active_debounce_secs: DEFAULT_ACTIVE_DEBOUNCE_SECS,
            inactive_debounce_secs: DEFAULT_INACTIVE_DEBOUNCE_SECS,
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
            heartbeat_interval_secs: DEFAULT_HEARTBEAT_INTERVAL_SECS,
            restart_delay_secs: DEFAULT_RESTART_DELAY_SECS,
            restart_backoff_max_secs: DEFAULT_RESTART_BACKOFF_MAX_SECS,
            max_restarts: DEFAULT_MAX_RESTARTS,
            stable_run_secs: DEFAULT_STABLE_RUN_SECS,
            diagnostics_top_n: DEFAULT_DIAGNOSTICS_TOP_N,
        }
    }
}

impl Config {
    /// Load from `$AUTODUCK_CONFIG`, else the platform config directory.
    /// A missing file yields the defaults.
    pub fn load() -> Result<Self, ConfigError> {
        match Self::config_path() {
            Some(path) if path.exists() => Self::from_file(&path),
            Some(path) => {
                tracing::debug!("No config at {}, using defaults", path.display());
                Ok(Self::default().normalized())
            }
            None => Ok(Self::default().normalized()),
        }
    }

    /// Resolve the config file location
    pub fn config_path() -> Option<PathBuf> {
        if let Ok(explicit) = std::env::var(CONFIG_PATH_ENV) {
            return Some(PathBuf::from(explicit));
        }
        directories::ProjectDirs::from("", "", "autoduck")
            .map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
    }

    /// Read and validate a TOML file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let config = Self::from_toml(&text)?;
        tracing::info!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Parse, normalize and validate a TOML document
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(text)?;
        let config = config.normalized();
        config.validate()?;
        Ok(config)
    }

    /// Serialize for hand-off to a worker process
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string(self)?)
    }

    /// Lowercase every name so lookups are case-insensitive
    pub fn normalized(mut self) -> Self {
        self.target_process = self.target_process.to_lowercase();
        self.target_app_id = self.target_app_id.to_lowercase();
        self.ignore_processes = self
            .ignore_processes
            .into_iter()
            .map(|p| p.to_lowercase())
            .collect();
        self
    }

    /// Reject values the control loop cannot work with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.peak_threshold > 0.0 && self.peak_threshold <= 1.0) {
            return Err(invalid("peak_threshold", "must be within (0, 1]"));
        }
        if !(self.endpoint_fallback_ratio > 0.0 && self.endpoint_fallback_ratio <= 1.0) {
            return Err(invalid("endpoint_fallback_ratio", "must be within (0, 1]"));
        }
        for (field, secs) in [
            ("poll_interval_secs", self.poll_interval_secs),
            ("heartbeat_interval_secs", self.heartbeat_interval_secs),
        ] {
            match Duration::try_from_secs_f64(secs) {
                Ok(d) if !d.is_zero() => {}
                _ => return Err(invalid(field, "must be a positive, representable number of seconds")),
            }
        }
        for (field, secs) in [
            ("active_debounce_secs", self.active_debounce_secs),
            ("inactive_debounce_secs", self.inactive_debounce_secs),
            ("restart_delay_secs", self.restart_delay_secs),
            ("restart_backoff_max_secs", self.restart_backoff_max_secs),
            ("stable_run_secs", self.stable_run_secs),
        ] {
            if Duration::try_from_secs_f64(secs).is_err() {
                return Err(invalid(field, "must be zero or more representable seconds"));
            }
        }
        if self.restart_backoff_max_secs < self.restart_delay_secs {
            return Err(invalid(
                "restart_backoff_max_secs",
                "must not be below restart_delay_secs",
            ));
        }
        if self.target_process.is_empty() {
            return Err(invalid("target_process", "must not be empty"));
        }
        if self.target_app_id.is_empty() {
            return Err(invalid("target_app_id", "must not be empty"));
        }
        Ok(())
    }

    /// Threshold used against `endpoint - target`
    pub fn endpoint_fallback_threshold(&self) -> f32 {
        self.peak_threshold * self.endpoint_fallback_ratio
    }

    pub fn active_debounce(&self) -> Duration {
        Duration::from_secs_f64(self.active_debounce_secs)
    }

    pub fn inactive_debounce(&self) -> Duration {
        Duration::from_secs_f64(self.inactive_debounce_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs_f64(self.poll_interval_secs)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs_f64(self.heartbeat_interval_secs)
    }

    pub fn restart_delay(&self) -> Duration {
        Duration::from_secs_f64(self.restart_delay_secs)
    }

    pub fn restart_backoff_max(&self) -> Duration {
        Duration::from_secs_f64(self.restart_backoff_max_secs)
    }

    pub fn stable_run(&self) -> Duration {
        Duration::from_secs_f64(self.stable_run_secs)
    }

    /// Whether `process` is the player itself (`process` already lowercase)
    pub fn is_target(&self, process: &str) -> bool {
        process == self.target_process
    }

    /// Whether `process` is excluded from detection (`process` already lowercase)
    pub fn is_ignored(&self, process: &str) -> bool {
        self.ignore_processes.contains(process)
    }
}

fn invalid(field: &'static str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.to_string(),
    }
}
