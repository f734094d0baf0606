//! Per-tick peak sampling
//!
//! Reads every audio session's instantaneous peak, attributes it to the
//! player, to an ignored process, or to an external source, and reads the
//! endpoint peak separately so that streams invisible to session enumeration
//! (exclusive mode, for one) are still noticed.

use tokio::time::Instant;

use crate::audio::meter::AudioBackend;
use crate::config::Config;

/// Label used for sessions whose owning process could not be resolved
pub const UNKNOWN_PROCESS: &str = "unknown";

/// Peak attributed to one non-player process
#[derive(Debug, Clone, PartialEq)]
pub struct ExternalPeak {
    pub process_name: String,
    pub peak: f32,
}

/// One tick's worth of meter readings
#[derive(Debug, Clone)]
pub struct AudioReading {
    /// Loudest session owned by the player
    pub target_peak: f32,
    /// Audible external sessions, loudest first, truncated for diagnostics.
    /// The head is the loudest external session overall.
    pub external_peaks: Vec<ExternalPeak>,
    pub endpoint_peak: f32,
    pub timestamp: Instant,
}

impl AudioReading {
    /// Loudest external session, or 0.0 when none was audible
    pub fn loudest_external(&self) -> f32 {
        self.external_peaks.first().map(|e| e.peak).unwrap_or(0.0)
    }
}

/// Samples peak levels through an [`AudioBackend`]
pub struct PeakSampler<'a> {
    backend: &'a dyn AudioBackend,
    config: &'a Config,
}

impl<'a> PeakSampler<'a> {
    pub fn new(backend: &'a dyn AudioBackend, config: &'a Config) -> Self {
        Self { backend, config }
    }

    /// Take a reading. Never fails: broken sessions read as silent and a
    /// failed enumeration yields no external peaks.
    pub fn sample(&self) -> AudioReading {
        let mut target_peak = 0.0f32;
        let mut externals = Vec::new();

        match self.backend.sessions() {
            Ok(sessions) => {
                for session in sessions {
                    let name = session
                        .process_name
                        .as_deref()
                        .map(str::to_lowercase);

                    let peak = match session.meter.peak() {
                        Ok(peak) => peak,
                        Err(e) => {
                            tracing::error!(
                                "Peak query failed for {}: {}",
                                name.as_deref().unwrap_or(UNKNOWN_PROCESS),
                                e
                            );
                            0.0
                        }
                    };

                    match name {
                        Some(ref n) if self.config.is_target(n) => {
                            target_peak = target_peak.max(peak);
                        }
                        Some(ref n) if self.config.is_ignored(n) => {}
                        _ if peak > 0.0 => externals.push(ExternalPeak {
                            process_name: session
                                .process_name
                                .unwrap_or_else(|| UNKNOWN_PROCESS.to_string()),
                            peak,
                        }),
                        _ => {}
                    }
                }
            }
            Err(e) => {
                tracing::error!("Session enumeration failed: {}", e);
            }
        }

        externals.sort_by(|a, b| b.peak.total_cmp(&a.peak));
        externals.truncate(self.config.diagnostics_top_n.max(1));

        if !externals.is_empty() {
            let top = externals
                .iter()
                .map(|e| format!("{}:{:.3}", e.process_name, e.peak))
                .collect::<Vec<_>>()
                .join(", ");
            tracing::debug!("Top external sessions: {}", top);
        }

        let endpoint_peak = match self.backend.endpoint_peak() {
            Ok(peak) => peak,
            Err(e) => {
                tracing::error!("Endpoint peak query failed: {}", e);
                0.0
            }
        };

        tracing::debug!(
            "Peaks: endpoint {:.3}, target {:.3}",
            endpoint_peak,
            target_peak
        );

        AudioReading {
            target_peak,
            external_peaks: externals,
            endpoint_peak,
            timestamp: Instant::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeAudio, FakeSession};

    fn sample(audio: &FakeAudio) -> AudioReading {
        let config = Config::default();
        PeakSampler::new(audio, &config).sample()
    }

    #[test]
    fn test_classifies_target_ignored_and_external() {
        let audio = FakeAudio::new(
            vec![
                FakeSession::named("Spotify.exe", 0.4),
                FakeSession::named("spotify.exe", 0.6),
                FakeSession::named("Discord.exe", 0.9),
                FakeSession::named("chrome.exe", 0.02),
                FakeSession::named("game.exe", 0.0),
            ],
            0.7,
        );

        let reading = sample(&audio);
        assert_eq!(reading.target_peak, 0.6);
        assert_eq!(
            reading.external_peaks,
            vec![ExternalPeak {
                process_name: "chrome.exe".into(),
                peak: 0.02
            }]
        );
        assert_eq!(reading.endpoint_peak, 0.7);
    }

    #[test]
    fn test_unknown_process_counts_as_external() {
        let audio = FakeAudio::new(vec![FakeSession::anonymous(0.3)], 0.0);

        let reading = sample(&audio);
        assert_eq!(reading.external_peaks[0].process_name, UNKNOWN_PROCESS);
        assert_eq!(reading.loudest_external(), 0.3);
    }

    #[test]
    fn test_externals_sorted_and_truncated_keeping_loudest() {
        let sessions = (1..=8)
            .map(|i| FakeSession::named(&format!("app{}.exe", i), i as f32 / 10.0))
            .collect();
        let audio = FakeAudio::new(sessions, 0.0);

        let reading = sample(&audio);
        assert_eq!(reading.external_peaks.len(), 5);
        assert_eq!(reading.external_peaks[0].process_name, "app8.exe");
        assert_eq!(reading.loudest_external(), 0.8);
        assert!(reading
            .external_peaks
            .windows(2)
            .all(|w| w[0].peak >= w[1].peak));
    }

    #[test]
    fn test_failed_session_meter_reads_as_silent() {
        let audio = FakeAudio::new(
            vec![
                FakeSession::failing("broken.exe"),
                FakeSession::named("chrome.exe", 0.05),
            ],
            0.1,
        );

        let reading = sample(&audio);
        assert_eq!(reading.external_peaks.len(), 1);
        assert_eq!(reading.external_peaks[0].process_name, "chrome.exe");
    }

    #[test]
    fn test_total_enumeration_failure_is_empty_reading() {
        let audio = FakeAudio::failing();

        let reading = sample(&audio);
        assert!(reading.external_peaks.is_empty());
        assert_eq!(reading.target_peak, 0.0);
        assert_eq!(reading.endpoint_peak, 0.0);
    }
}
