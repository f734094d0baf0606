//! Peak meter capabilities
//!
//! The sampler only ever talks to these traits. The WASAPI adapter in
//! [`super::wasapi`] implements them on Windows; tests use scripted fakes.

use crate::error::AudioError;

/// Anything that can report an instantaneous peak in `[0, 1]`
pub trait PeakReadable {
    fn peak(&self) -> Result<f32, AudioError>;
}

/// One audio session as reported by the session enumerator
pub struct AudioSessionEntry {
    /// Executable name of the owning process, if it could be resolved
    pub process_name: Option<String>,
    pub meter: Box<dyn PeakReadable>,
}

impl AudioSessionEntry {
    pub fn new(process_name: Option<String>, meter: Box<dyn PeakReadable>) -> Self {
        Self {
            process_name,
            meter,
        }
    }
}

/// Source of per-session and whole-endpoint peak levels
pub trait AudioBackend {
    /// Enumerate the sessions currently attached to the output endpoint
    fn sessions(&self) -> Result<Vec<AudioSessionEntry>, AudioError>;

    /// Peak of everything the output endpoint is rendering
    fn endpoint_peak(&self) -> Result<f32, AudioError>;
}

