//! Finding the player's media session
//!
//! The session is looked up fresh on every tick because players register and
//! drop their sessions as they start, stop and switch devices.

use crate::config::Config;
use crate::media::session::{MediaDirectory, PausableSession};

pub struct SessionLocator<'a> {
    directory: &'a dyn MediaDirectory,
    config: &'a Config,
}

impl<'a> SessionLocator<'a> {
    pub fn new(directory: &'a dyn MediaDirectory, config: &'a Config) -> Self {
        Self { directory, config }
    }

    /// Session whose application identity contains the target identity,
    /// case-insensitively. When several match, the last one in enumeration
    /// order wins. A failed directory query is logged and yields `None`.
    pub async fn locate(&self) -> Option<Box<dyn PausableSession>> {
        let sessions = match self.directory.sessions().await {
            Ok(sessions) => sessions,
            Err(e) => {
                tracing::error!("Media session query failed: {}", e);
                return None;
            }
        };

        tracing::debug!("Media sessions: {}", sessions.len());

        let mut matches = 0usize;
        let mut chosen = None;
        for session in sessions {
            let Some(app_id) = session.app_id() else {
                continue;
            };
            tracing::debug!("Media session: {}", app_id);
            if app_id.to_lowercase().contains(&self.config.target_app_id) {
                matches += 1;
                chosen = Some(session);
            }
        }

        if matches > 1 {
            tracing::debug!(
                "{} sessions match '{}', using the last one",
                matches,
                self.config.target_app_id
            );
        }
        if chosen.is_none() {
            tracing::debug!("No media session for '{}'", self.config.target_app_id);
        }

        chosen
    }
}
