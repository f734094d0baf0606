//! Best-effort pause/resume commands
//!
//! A failed or unacknowledged command is logged and otherwise ignored. The
//! caller has already recorded the transition, so a broken control surface is
//! not retried on every tick.

use crate::media::session::PausableSession;

/// Issues transport commands to a located session
pub struct MediaController {
    player: String,
}

impl MediaController {
    pub fn new(player: impl Into<String>) -> Self {
        Self {
            player: player.into(),
        }
    }

    /// Pause playback; returns whether the player acknowledged
    pub async fn pause(&self, session: &dyn PausableSession) -> bool {
        match session.pause().await {
            Ok(()) => {
                tracing::info!("Pause sent to {}", self.player);
                true
            }
            Err(e) => {
                tracing::error!("Pause of {} failed: {}", self.player, e);
                false
            }
        }
    }

    /// Resume playback; returns whether the player acknowledged
    pub async fn resume(&self, session: &dyn PausableSession) -> bool {
        match session.resume().await {
            Ok(()) => {
                tracing::info!("Resume sent to {}", self.player);
                true
            }
            Err(e) => {
                tracing::error!("Resume of {} failed: {}", self.player, e);
                false
            }
        }
    }
}
