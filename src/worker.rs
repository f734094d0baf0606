//! One run of the polling loop
//!
//! A [`Worker`] ties the sampler, locator, state machine and controller
//! together and ticks them on a single thread until it is interrupted or
//! something in the loop panics. The outcome becomes the worker process's exit
//! status, which is all the supervisor ever sees.

use chrono::{DateTime, Local};
use futures_util::FutureExt;
use std::any::Any;
use std::convert::Infallible;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::Duration;
use tokio::time::Instant;
use tracing::Instrument;

use crate::audio::activity::{classify, Activity};
use crate::audio::meter::AudioBackend;
use crate::audio::sampler::PeakSampler;
use crate::config::Config;
use crate::ducking::{DuckCommand, DuckingStateMachine, Phase};
use crate::media::controller::MediaController;
use crate::media::locator::SessionLocator;
use crate::media::session::MediaDirectory;
use crate::platform;

/// How a worker run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerExit {
    /// Interrupted and shut down cleanly; do not restart
    Clean,
    /// The loop crashed; restart with a fresh process
    Fault,
    /// Native bindings could not be initialized; restarting will not help
    CapabilityUnavailable,
}

impl WorkerExit {
    pub fn code(self) -> i32 {
        match self {
            WorkerExit::Clean => 0,
            WorkerExit::Fault => 1,
            WorkerExit::CapabilityUnavailable => 2,
        }
    }

    /// Map a process exit code back. Killed processes have no code and
    /// count as faults, as does any code this crate does not produce.
    pub fn from_code(code: Option<i32>) -> Self {
        match code {
            Some(0) => WorkerExit::Clean,
            Some(2) => WorkerExit::CapabilityUnavailable,
            _ => WorkerExit::Fault,
        }
    }
}

/// Liveness log emitted at a fixed interval regardless of activity
struct Heartbeat {
    interval: Duration,
    started: Instant,
    started_at: DateTime<Local>,
    last: Option<Instant>,
    beats: u64,
}

impl Heartbeat {
    fn new(interval: Duration) -> Self {
        Self {
            interval,
            started: Instant::now(),
            started_at: Local::now(),
            last: None,
            beats: 0,
        }
    }

    fn maybe_beat(&mut self, now: Instant, ticks: u64, phase: Phase) {
        if let Some(last) = self.last {
            if now.saturating_duration_since(last) < self.interval {
                return;
            }
        }
        self.last = Some(now);
        self.beats += 1;
        tracing::info!(
            "Heartbeat: alive since {} ({}s), {} ticks, {:?}",
            self.started_at.format("%H:%M:%S"),
            now.saturating_duration_since(self.started).as_secs(),
            ticks,
            phase
        );
    }
}

/// The polling loop and the state it owns
pub struct Worker<'a> {
    config: &'a Config,
    audio: &'a dyn AudioBackend,
    media: &'a dyn MediaDirectory,
    controller: MediaController,
    machine: DuckingStateMachine,
    heartbeat: Heartbeat,
    session_seen: Option<bool>,
    audio_seen: Option<bool>,
    unconfirmed: u64,
    ticks: u64,
}

impl<'a> Worker<'a> {
    /// Create a worker starting in the idle phase
    pub fn new(config: &'a Config, audio: &'a dyn AudioBackend, media: &'a dyn MediaDirectory) -> Self {
        Self {
            config,
            audio,
            media,
            controller: MediaController::new(config.target_process.clone()),
            machine: DuckingStateMachine::new(config, Instant::now()),
            heartbeat: Heartbeat::new(config.heartbeat_interval()),
            session_seen: None,
            audio_seen: None,
            unconfirmed: 0,
            ticks: 0,
        }
    }

    /// Tick until `shutdown` resolves (clean) or the loop panics (fault).
    /// Dropping the loop at a suspension point is the cancellation path.
    pub async fn run<S>(&mut self, shutdown: S) -> WorkerExit
    where
        S: Future<Output = ()>,
    {
        tracing::info!(
            "Watching for audio besides {}, polling every {:?}",
            self.config.target_process,
            self.config.poll_interval()
        );

        let exit = tokio::select! {
            result = AssertUnwindSafe(self.run_loop()).catch_unwind() => match result {
                Ok(never) => match never {},
                Err(panic) => {
                    tracing::error!("Unhandled fault in worker loop: {}", panic_message(&panic));
                    WorkerExit::Fault
                }
            },
            _ = shutdown => {
                tracing::info!("Interrupt received, stopping cleanly");
                WorkerExit::Clean
            }
        };

        tracing::info!("Worker stopped after {} ticks ({:?})", self.ticks, exit);
        exit
    }

    async fn run_loop(&mut self) -> Infallible {
        loop {
            self.tick().await;
            tokio::time::sleep(self.config.poll_interval()).await;
        }
    }

    /// One pass: heartbeat, locate, sample, classify, decide, act
    pub async fn tick(&mut self) {
        let now = Instant::now();
        self.ticks += 1;
        self.heartbeat.maybe_beat(now, self.ticks, self.machine.phase());

        let session = SessionLocator::new(self.media, self.config).locate().await;
        let reading = PeakSampler::new(self.audio, self.config).sample();
        let activity = classify(&reading, self.config);
        tracing::debug!("External audio: {:?}", activity);

        if changed(&mut self.session_seen, session.is_some()) {
            if session.is_some() {
                tracing::info!("Media session for '{}' found", self.config.target_app_id);
            } else {
                tracing::info!("No media session for '{}'", self.config.target_app_id);
            }
        }
        if changed(&mut self.audio_seen, activity.is_active()) {
            tracing::info!("External audio: {}", describe(&activity));
        }

        let Some(command) = self.machine.tick(now, activity.is_active(), session.is_some()) else {
            return;
        };
        // The machine only decides a command when a session was present
        let Some(session) = session else {
            return;
        };

        match command {
            DuckCommand::Pause => {
                tracing::info!("{}, pausing {}", describe(&activity), self.config.target_process);
                if !self.controller.pause(session.as_ref()).await {
                    self.unconfirmed += 1;
                    tracing::warn!(
                        "Pause unconfirmed, still treating {} as paused",
                        self.config.target_process
                    );
                }
            }
            DuckCommand::Resume => {
                tracing::info!("External audio stopped, resuming {}", self.config.target_process);
                if !self.controller.resume(session.as_ref()).await {
                    self.unconfirmed += 1;
                    tracing::warn!(
                        "Resume unconfirmed, {} may stay paused",
                        self.config.target_process
                    );
                }
            }
        }
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Commands the player did not acknowledge
    pub fn unconfirmed_commands(&self) -> u64 {
        self.unconfirmed
    }

    pub fn heartbeats(&self) -> u64 {
        self.heartbeat.beats
    }

    pub fn phase(&self) -> Phase {
        self.machine.phase()
    }
}

/// Store `now` in `slot`, reporting whether it differs from the previous tick
fn changed(slot: &mut Option<bool>, now: bool) -> bool {
    slot.replace(now) != Some(now)
}

fn describe(activity: &Activity) -> String {
    match activity {
        Activity::Session { peak } => format!("External session at {:.3}", peak),
        Activity::EndpointSurplus { surplus } => format!("Endpoint surplus at {:.3}", surplus),
        Activity::Silent => "Silent".to_string(),
    }
}

fn panic_message(panic: &Box<dyn Any + Send>) -> &str {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s
    } else {
        "unknown panic"
    }
}

/// Worker process entry: bring up the native bindings, run until Ctrl+C,
/// and release the bindings before returning the exit status.
pub async fn run_native(config: &Config) -> WorkerExit {
    let span = tracing::info_span!("worker", pid = std::process::id());

    async {
        tracing::info!("Worker starting");

        let backends = match platform::init() {
            Ok(backends) => backends,
            Err(e) => {
                tracing::error!("Cannot start: {}", e);
                return WorkerExit::CapabilityUnavailable;
            }
        };

        let exit = Worker::new(config, backends.audio.as_ref(), backends.media.as_ref())
            .run(platform::ctrl_c())
            .await;

        drop(backends);
        exit
    }
    .instrument(span)
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeAudio, FakeDirectory, FakeSession};
    use tokio::time::sleep;

    fn loud() -> Vec<FakeSession> {
        vec![FakeSession::named("chrome.exe", 0.02)]
    }

    #[test]
    fn test_exit_codes_round_trip() {
        for exit in [WorkerExit::Clean, WorkerExit::Fault, WorkerExit::CapabilityUnavailable] {
            assert_eq!(WorkerExit::from_code(Some(exit.code())), exit);
        }
        assert_eq!(WorkerExit::from_code(None), WorkerExit::Fault);
        assert_eq!(WorkerExit::from_code(Some(101)), WorkerExit::Fault);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sustained_external_audio_pauses_once() {
        let config = Config::default();
        let audio = FakeAudio::new(loud(), 0.05);
        let media = FakeDirectory::player();

        let mut worker = Worker::new(&config, &audio, &media);
        let exit = worker.run(sleep(Duration::from_millis(600))).await;

        assert_eq!(exit, WorkerExit::Clean);
        assert_eq!(media.commands(), vec![DuckCommand::Pause]);
        assert_eq!(worker.ticks(), 3);
        assert_eq!(worker.phase(), Phase::Ducked);
    }

    #[tokio::test(start_paused = true)]
    async fn test_quiet_external_audio_never_pauses() {
        let config = Config::default();
        let audio = FakeAudio::new(vec![FakeSession::named("chrome.exe", 0.005)], 0.005);
        let media = FakeDirectory::player();

        let mut worker = Worker::new(&config, &audio, &media);
        worker.run(sleep(Duration::from_secs(10))).await;

        assert!(media.commands().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_silence_after_pause_resumes_once() {
        let config = Config::default();
        let audio = FakeAudio::scripted(vec![
            (Duration::ZERO, loud(), 0.05),
            (Duration::from_millis(500), Vec::new(), 0.0),
        ]);
        let media = FakeDirectory::player();

        let mut worker = Worker::new(&config, &audio, &media);
        worker.run(sleep(Duration::from_millis(1700))).await;

        assert_eq!(media.commands(), vec![DuckCommand::Pause, DuckCommand::Resume]);
        assert_eq!(worker.phase(), Phase::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_endpoint_only_audio_pauses() {
        let config = Config::default();
        // Player at 0.3, endpoint at 0.32: surplus 0.02 with no attributed session
        let audio = FakeAudio::new(vec![FakeSession::named("spotify.exe", 0.3)], 0.32);
        let media = FakeDirectory::player();

        let mut worker = Worker::new(&config, &audio, &media);
        worker.run(sleep(Duration::from_millis(600))).await;

        assert_eq!(media.commands(), vec![DuckCommand::Pause]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ignored_process_never_pauses() {
        let config = Config::default();
        let audio = FakeAudio::new(vec![FakeSession::named("Discord.exe", 0.9)], 0.0);
        let media = FakeDirectory::player();

        let mut worker = Worker::new(&config, &audio, &media);
        worker.run(sleep(Duration::from_secs(5))).await;

        assert!(media.commands().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_session_means_no_commands() {
        let config = Config::default();
        let audio = FakeAudio::scripted(vec![
            (Duration::ZERO, loud(), 0.05),
            (Duration::from_secs(3), Vec::new(), 0.0),
        ]);
        let media = FakeDirectory::empty();

        let mut worker = Worker::new(&config, &audio, &media);
        worker.run(sleep(Duration::from_secs(6))).await;

        assert!(media.commands().is_empty());
        assert!(worker.ticks() > 20);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_command_still_counts_as_paused() {
        let config = Config::default();
        let audio = FakeAudio::new(loud(), 0.05);
        let media = FakeDirectory::player();
        media.fail_commands(true);

        let mut worker = Worker::new(&config, &audio, &media);
        worker.run(sleep(Duration::from_secs(3))).await;

        assert_eq!(media.commands(), vec![DuckCommand::Pause]);
        assert_eq!(worker.phase(), Phase::Ducked);
        assert_eq!(worker.unconfirmed_commands(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_acknowledged_commands_are_confirmed() {
        let config = Config::default();
        let audio = FakeAudio::scripted(vec![
            (Duration::ZERO, loud(), 0.05),
            (Duration::from_millis(500), Vec::new(), 0.0),
        ]);
        let media = FakeDirectory::player();

        let mut worker = Worker::new(&config, &audio, &media);
        worker.run(sleep(Duration::from_millis(1700))).await;

        assert_eq!(media.commands().len(), 2);
        assert_eq!(worker.unconfirmed_commands(), 0);
    }

    #[test]
    fn test_transitions_reported_once() {
        let mut slot = None;
        assert!(changed(&mut slot, false));
        assert!(!changed(&mut slot, false));
        assert!(changed(&mut slot, true));
        assert!(!changed(&mut slot, true));
        assert!(changed(&mut slot, false));
    }

    #[tokio::test(start_paused = true)]
    async fn test_query_failures_read_as_silence() {
        let config = Config::default();
        let audio = FakeAudio::failing();
        let media = FakeDirectory::failing();

        let mut worker = Worker::new(&config, &audio, &media);
        let exit = worker.run(sleep(Duration::from_secs(2))).await;

        assert_eq!(exit, WorkerExit::Clean);
        assert_eq!(worker.phase(), Phase::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_independent_of_activity() {
        let config = Config::default();
        let audio = FakeAudio::new(Vec::new(), 0.0);
        let media = FakeDirectory::empty();

        let mut worker = Worker::new(&config, &audio, &media);
        worker.run(sleep(Duration::from_secs(12))).await;

        // t = 0, 5 and 10
        assert_eq!(worker.heartbeats(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_panic_in_loop_is_fault() {
        let config = Config::default();
        let audio = FakeAudio::new(loud(), 0.05).panicking_on_call(3);
        let media = FakeDirectory::player();

        let mut worker = Worker::new(&config, &audio, &media);
        let exit = worker.run(sleep(Duration::from_secs(60))).await;

        assert_eq!(exit, WorkerExit::Fault);
        assert_eq!(media.commands(), vec![DuckCommand::Pause]);
    }
}
