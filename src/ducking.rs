//! Debounced ducking state machine
//!
//! Peak meters are bursty, so the machine only acts on a *sustained* change:
//! external audio must stay active for the active debounce before the player
//! is paused, and stay silent for the inactive debounce before it is resumed.
//!
//! The phases are derived from three fields rather than stored:
//!
//! ```text
//!            ext active                       active >= debounce, session
//!   Idle ───────────────▶ ArmingActive ───────────────────────────────▶ Ducked
//!    ▲                        │ silent                                    │
//!    │◀───────────────────────┘                                  silent   │
//!    │   silent >= debounce, session                                      ▼
//!    └──────────────────────────────────────────────────────── ArmingInactive
//! ```
//!
//! `paused_by_us` is flipped when a command is *decided*, not when the player
//! acknowledges it, so a failing control surface is never hammered.

use std::time::Duration;
use tokio::time::Instant;

use crate::config::Config;

/// Transport command decided by a tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DuckCommand {
    Pause,
    Resume,
}

/// Derived view of [`DuckingState`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    ArmingActive,
    Ducked,
    ArmingInactive,
}

/// Timers and ownership flag. At most one of the two timers is set.
#[derive(Debug, Clone, PartialEq)]
pub struct DuckingState {
    pub active_since: Option<Instant>,
    pub inactive_since: Option<Instant>,
    /// Set only between a pause we issued and the matching resume
    pub paused_by_us: bool,
}

impl DuckingState {
    fn idle(now: Instant) -> Self {
        Self {
            active_since: None,
            inactive_since: Some(now),
            paused_by_us: false,
        }
    }

    pub fn phase(&self) -> Phase {
        match (self.paused_by_us, self.active_since, self.inactive_since) {
            (true, _, Some(_)) => Phase::ArmingInactive,
            (true, _, None) => Phase::Ducked,
            (false, Some(_), _) => Phase::ArmingActive,
            (false, None, _) => Phase::Idle,
        }
    }
}

pub struct DuckingStateMachine {
    state: DuckingState,
    active_debounce: Duration,
    inactive_debounce: Duration,
}

impl DuckingStateMachine {
    /// Start idle, counting silence from `now`
    pub fn new(config: &Config, now: Instant) -> Self {
        Self::with_debounce(config.active_debounce(), config.inactive_debounce(), now)
    }

    pub fn with_debounce(active_debounce: Duration, inactive_debounce: Duration, now: Instant) -> Self {
        Self {
            state: DuckingState::idle(now),
            active_debounce,
            inactive_debounce,
        }
    }

    /// Advance one tick. Returns the command to send, if any; the state
    /// already reflects it when this returns.
    pub fn tick(&mut self, now: Instant, ext_active: bool, session_present: bool) -> Option<DuckCommand> {
        let state = &mut self.state;

        if ext_active {
            state.inactive_since = None;
            let since = *state.active_since.get_or_insert(now);

            if now.saturating_duration_since(since) >= self.active_debounce
                && session_present
                && !state.paused_by_us
            {
                state.paused_by_us = true;
                return Some(DuckCommand::Pause);
            }
        } else {
            state.active_since = None;
            let since = *state.inactive_since.get_or_insert(now);

            if now.saturating_duration_since(since) >= self.inactive_debounce
                && session_present
                && state.paused_by_us
            {
                state.paused_by_us = false;
                return Some(DuckCommand::Resume);
            }
        }

        None
    }

    pub fn state(&self) -> &DuckingState {
        &self.state
    }

    pub fn phase(&self) -> Phase {
        self.state.phase()
    }

    pub fn paused_by_us(&self) -> bool {
        self.state.paused_by_us
    }
}
