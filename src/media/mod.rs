//! Media session control subsystem

pub mod controller;
pub mod locator;
pub mod session;

#[cfg(windows)]
pub mod smtc;

pub use controller::MediaController;
pub use locator::SessionLocator;
pub use session::{MediaDirectory, PausableSession};
