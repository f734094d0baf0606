//! External-audio classification
//!
//! A reading counts as "someone else is making noise" when any external
//! session reaches the peak threshold, or when the endpoint carries more than
//! the player's own contribution by at least the scaled fallback threshold.
//! The fallback is scaled down because the endpoint and session meters are
//! read independently and never agree exactly.

use crate::audio::sampler::AudioReading;
use crate::config::Config;

/// Which rule, if any, flagged the reading as active
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Activity {
    Silent,
    /// An attributed external session crossed the threshold
    Session { peak: f32 },
    /// Only the endpoint surplus over the player crossed the fallback
    EndpointSurplus { surplus: f32 },
}

impl Activity {
    pub fn is_active(&self) -> bool {
        !matches!(self, Activity::Silent)
    }
}

/// Classify a reading against the configured thresholds
pub fn classify(reading: &AudioReading, config: &Config) -> Activity {
    if let Some(loudest) = reading
        .external_peaks
        .iter()
        .find(|e| e.peak >= config.peak_threshold)
    {
        return Activity::Session { peak: loudest.peak };
    }

    let surplus = (reading.endpoint_peak - reading.target_peak).max(0.0);
    let fallback = config.endpoint_fallback_threshold();
    if surplus >= fallback {
        tracing::debug!(
            "Endpoint fallback: surplus {:.3} >= {:.3}",
            surplus,
            fallback
        );
        return Activity::EndpointSurplus { surplus };
    }

    Activity::Silent
}

/// Shorthand for `classify(..).is_active()`
pub fn external_audio_active(reading: &AudioReading, config: &Config) -> bool {
    classify(reading, config).is_active()
}
