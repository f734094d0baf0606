//! # Autoduck
//!
//! Pauses a media player while some other application on the machine is
//! audible, and resumes it once that competing audio has stopped.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────────┐
//! │                         SUPERVISOR PROCESS                               │
//! │   launch worker ──▶ wait for exit status ──▶ clean?  stop                │
//! │        ▲                                     fault?  back off, relaunch  │
//! │        └─────────────────────────────────────missing capability? give up │
//! └───────────────────────────────┬──────────────────────────────────────────┘
//!                                 │ exit status only
//! ┌───────────────────────────────▼──────────────────────────────────────────┐
//! │                           WORKER PROCESS                                 │
//! │                                                                          │
//! │  every poll interval (single thread, one tick at a time):                │
//! │                                                                          │
//! │  ┌──────────────┐   ┌──────────────┐   ┌──────────────┐                  │
//! │  │SessionLocator│   │ PeakSampler  │   │  Heartbeat   │                  │
//! │  │   (SMTC)     │   │  (WASAPI)    │   │              │                  │
//! │  └──────┬───────┘   └──────┬───────┘   └──────────────┘                  │
//! │         │ Option<session>  │ AudioReading                                │
//! │         │                  ▼                                             │
//! │         │          ┌──────────────┐                                      │
//! │         │          │  classifier  │ external audio active?               │
//! │         │          └──────┬───────┘                                      │
//! │         ▼                 ▼                                              │
//! │  ┌──────────────────────────────────┐    ┌──────────────────┐            │
//! │  │      DuckingStateMachine         │───▶│ MediaController  │            │
//! │  │ debounce active / inactive edges │    │  pause / resume  │            │
//! │  └──────────────────────────────────┘    └──────────────────┘            │
//! └──────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The native bindings are reached only through the capability traits in
//! [`audio::meter`] and [`media::session`]; everything above them is plain,
//! platform-independent logic.

pub mod audio;
pub mod config;
pub mod ducking;
pub mod error;
pub mod media;
pub mod platform;
pub mod supervisor;
pub mod worker;

#[cfg(test)]
pub(crate) mod testing;

pub use config::Config;
pub use error::{Error, Result};

/// Application-wide defaults
pub mod constants {
    /// Process name of the player being ducked
    pub const DEFAULT_TARGET_PROCESS: &str = "spotify.exe";

    /// Substring identifying the player's media session
    pub const DEFAULT_TARGET_APP_ID: &str = "spotify";

    /// Background processes that never pause the player
    pub const DEFAULT_IGNORE_PROCESSES: &[&str] = &["nvcontainer.exe", "discord.exe"];

    /// Peak level at which another session counts as audible
    pub const DEFAULT_PEAK_THRESHOLD: f32 = 0.01;

    /// The endpoint fallback triggers at this fraction of the peak threshold
    pub const DEFAULT_ENDPOINT_FALLBACK_RATIO: f32 = 0.8;

    /// External audio must persist this long before pausing
    pub const DEFAULT_ACTIVE_DEBOUNCE_SECS: f64 = 0.2;

    /// Silence must persist this long before resuming
    pub const DEFAULT_INACTIVE_DEBOUNCE_SECS: f64 = 1.0;

    pub const DEFAULT_POLL_INTERVAL_SECS: f64 = 0.25;

    pub const DEFAULT_HEARTBEAT_INTERVAL_SECS: f64 = 5.0;

    pub const DEFAULT_RESTART_DELAY_SECS: f64 = 0.1;

    pub const DEFAULT_RESTART_BACKOFF_MAX_SECS: f64 = 5.0;

    pub const DEFAULT_MAX_RESTARTS: u32 = 25;

    pub const DEFAULT_STABLE_RUN_SECS: f64 = 30.0;

    /// External sessions listed per diagnostics line
    pub const DEFAULT_DIAGNOSTICS_TOP_N: usize = 5;

    /// Hidden argument that makes the binary run as a worker
    pub const WORKER_ARG: &str = "worker";
}
