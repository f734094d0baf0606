//! Media session capabilities
//!
//! Commands are explicit futures resolving to a result. They are local
//! (non-`Send`) futures because the worker drives them on its single thread
//! and native session objects need not be thread-safe.

use futures_util::future::LocalBoxFuture;

use crate::error::MediaError;

/// A controllable playback session belonging to some application
pub trait PausableSession {
    /// Application identity reported by the OS, e.g. `Spotify.exe`
    fn app_id(&self) -> Option<String>;

    fn pause(&self) -> LocalBoxFuture<'_, Result<(), MediaError>>;

    fn resume(&self) -> LocalBoxFuture<'_, Result<(), MediaError>>;
}

/// The OS directory of controllable media sessions
pub trait MediaDirectory {
    /// Current sessions in the directory's enumeration order
    fn sessions(&self) -> LocalBoxFuture<'_, Result<Vec<Box<dyn PausableSession>>, MediaError>>;
}
