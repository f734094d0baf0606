//! Audio metering subsystem

pub mod activity;
pub mod meter;
pub mod sampler;

#[cfg(windows)]
pub mod wasapi;

pub use activity::{classify, external_audio_active, Activity};
pub use meter::{AudioBackend, AudioSessionEntry, PeakReadable};
pub use sampler::{AudioReading, ExternalPeak, PeakSampler};
