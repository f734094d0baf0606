//! System Media Transport Controls adapter
//!
//! WinRT operations are awaited with a blocking `get()`. The worker thread
//! runs in the multithreaded apartment and does nothing else while a command
//! is in flight, so blocking here is the same as suspending the loop.

use futures_util::future::{FutureExt, LocalBoxFuture};
use windows::Media::Control::{
    GlobalSystemMediaTransportControlsSession as SmtcSession,
    GlobalSystemMediaTransportControlsSessionManager as SmtcManager,
};

use crate::error::MediaError;
use crate::media::session::{MediaDirectory, PausableSession};

impl From<windows::core::Error> for MediaError {
    fn from(e: windows::core::Error) -> Self {
        MediaError::Smtc(e.to_string())
    }
}

/// [`MediaDirectory`] backed by the SMTC session manager
pub struct SmtcDirectory {
    manager: SmtcManager,
}

impl SmtcDirectory {
    /// Request the session manager. Fails when SMTC is not available.
    pub fn new() -> Result<Self, MediaError> {
        let manager = SmtcManager::RequestAsync()?.get()?;
        Ok(Self { manager })
    }

    fn list(&self) -> Result<Vec<Box<dyn PausableSession>>, MediaError> {
        let view = self
            .manager
            .GetSessions()
            .map_err(|e| MediaError::Directory(e.to_string()))?;
        let count = view.Size()?;

        let mut sessions: Vec<Box<dyn PausableSession>> = Vec::with_capacity(count as usize);
        for i in 0..count {
            match view.GetAt(i) {
                Ok(session) => sessions.push(Box::new(SmtcPlayer { session })),
                Err(e) => tracing::error!("Failed to read media session {}: {}", i, e),
            }
        }
        Ok(sessions)
    }
}

impl MediaDirectory for SmtcDirectory {
    fn sessions(&self) -> LocalBoxFuture<'_, Result<Vec<Box<dyn PausableSession>>, MediaError>> {
        async move { self.list() }.boxed_local()
    }
}

struct SmtcPlayer {
    session: SmtcSession,
}

impl SmtcPlayer {
    fn acknowledge(accepted: bool) -> Result<(), MediaError> {
        if accepted {
            Ok(())
        } else {
            Err(MediaError::Rejected)
        }
    }
}

impl PausableSession for SmtcPlayer {
    fn app_id(&self) -> Option<String> {
        self.session
            .SourceAppUserModelId()
            .ok()
            .map(|id| id.to_string_lossy())
            .filter(|id| !id.is_empty())
    }

    fn pause(&self) -> LocalBoxFuture<'_, Result<(), MediaError>> {
        async move {
            let accepted = self
                .session
                .TryPauseAsync()
                .and_then(|op| op.get())
                .map_err(|e| MediaError::Command(e.to_string()))?;
            Self::acknowledge(accepted)
        }
        .boxed_local()
    }

    fn resume(&self) -> LocalBoxFuture<'_, Result<(), MediaError>> {
        async move {
            let accepted = self
                .session
                .TryPlayAsync()
                .and_then(|op| op.get())
                .map_err(|e| MediaError::Command(e.to_string()))?;
            Self::acknowledge(accepted)
        }
        .boxed_local()
    }
}
