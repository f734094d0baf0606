//! Scripted stand-ins for the native collaborators

use futures_util::future::{FutureExt, LocalBoxFuture};
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;
use std::time::Duration;
use tokio::time::Instant;

use crate::audio::meter::{AudioBackend, AudioSessionEntry, PeakReadable};
use crate::ducking::DuckCommand;
use crate::error::{AudioError, MediaError};
use crate::media::session::{MediaDirectory, PausableSession};
use crate::supervisor::Launcher;
use crate::worker::WorkerExit;

/// Meter returning a fixed value, or failing when `None`
struct FakeMeter(Option<f32>);

impl PeakReadable for FakeMeter {
    fn peak(&self) -> Result<f32, AudioError> {
        self.0
            .ok_or_else(|| AudioError::PeakQuery("meter unavailable".into()))
    }
}

#[derive(Debug, Clone)]
pub struct FakeSession {
    process_name: Option<String>,
    peak: Option<f32>,
}

impl FakeSession {
    pub fn named(process_name: &str, peak: f32) -> Self {
        Self {
            process_name: Some(process_name.to_string()),
            peak: Some(peak),
        }
    }

    pub fn anonymous(peak: f32) -> Self {
        Self {
            process_name: None,
            peak: Some(peak),
        }
    }

    pub fn failing(process_name: &str) -> Self {
        Self {
            process_name: Some(process_name.to_string()),
            peak: None,
        }
    }

    fn entry(&self) -> AudioSessionEntry {
        AudioSessionEntry::new(self.process_name.clone(), Box::new(FakeMeter(self.peak)))
    }
}

/// Audio levels that change at fixed offsets from a starting instant
pub struct FakeAudio {
    origin: Instant,
    /// `(offset, sessions, endpoint)`, sorted by offset
    phases: Vec<(Duration, Vec<FakeSession>, f32)>,
    fail: bool,
    panic_on_call: Option<u32>,
    calls: Cell<u32>,
}

impl FakeAudio {
    pub fn new(sessions: Vec<FakeSession>, endpoint: f32) -> Self {
        Self::scripted(vec![(Duration::ZERO, sessions, endpoint)])
    }

    /// Levels switch to each phase once its offset from now has elapsed
    pub fn scripted(phases: Vec<(Duration, Vec<FakeSession>, f32)>) -> Self {
        Self {
            origin: Instant::now(),
            phases,
            fail: false,
            panic_on_call: None,
            calls: Cell::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new(Vec::new(), 0.0)
        }
    }

    /// Panic on the `n`th session enumeration (1-based)
    pub fn panicking_on_call(mut self, n: u32) -> Self {
        self.panic_on_call = Some(n);
        self
    }

    fn current(&self) -> (&[FakeSession], f32) {
        let elapsed = self.origin.elapsed();
        self.phases
            .iter()
            .rev()
            .find(|(offset, _, _)| *offset <= elapsed)
            .map(|(_, sessions, endpoint)| (sessions.as_slice(), *endpoint))
            .unwrap_or_default()
    }
}

impl AudioBackend for FakeAudio {
    fn sessions(&self) -> Result<Vec<AudioSessionEntry>, AudioError> {
        let call = self.calls.get() + 1;
        self.calls.set(call);
        if self.panic_on_call == Some(call) {
            panic!("native session enumerator crashed");
        }
        if self.fail {
            return Err(AudioError::Enumeration("enumerator gone".into()));
        }
        Ok(self.current().0.iter().map(FakeSession::entry).collect())
    }

    fn endpoint_peak(&self) -> Result<f32, AudioError> {
        if self.fail {
            return Err(AudioError::Endpoint("no default device".into()));
        }
        Ok(self.current().1)
    }
}

#[derive(Default)]
struct DirectoryState {
    apps: Vec<Option<String>>,
    fail_query: bool,
    fail_commands: Cell<bool>,
    commands: RefCell<Vec<DuckCommand>>,
}

/// Media directory recording every command sent to its sessions
#[derive(Clone, Default)]
pub struct FakeDirectory {
    state: Rc<DirectoryState>,
}

impl FakeDirectory {
    pub fn with_apps(apps: &[Option<&str>]) -> Self {
        Self {
            state: Rc::new(DirectoryState {
                apps: apps.iter().map(|a| a.map(str::to_string)).collect(),
                ..Default::default()
            }),
        }
    }

    /// Directory holding a single player session
    pub fn player() -> Self {
        Self::with_apps(&[Some("Spotify.exe")])
    }

    pub fn empty() -> Self {
        Self::with_apps(&[])
    }

    pub fn failing() -> Self {
        Self {
            state: Rc::new(DirectoryState {
                fail_query: true,
                ..Default::default()
            }),
        }
    }

    pub fn fail_commands(&self, fail: bool) {
        self.state.fail_commands.set(fail);
    }

    pub fn session(&self, index: usize) -> FakePlayer {
        FakePlayer {
            app_id: self.state.apps[index].clone(),
            state: self.state.clone(),
        }
    }

    pub fn commands(&self) -> Vec<DuckCommand> {
        self.state.commands.borrow().clone()
    }
}

impl MediaDirectory for FakeDirectory {
    fn sessions(&self) -> LocalBoxFuture<'_, Result<Vec<Box<dyn PausableSession>>, MediaError>> {
        async move {
            if self.state.fail_query {
                return Err(MediaError::Directory("manager unavailable".into()));
            }
            Ok((0..self.state.apps.len())
                .map(|i| Box::new(self.session(i)) as Box<dyn PausableSession>)
                .collect())
        }
        .boxed_local()
    }
}

pub struct FakePlayer {
    app_id: Option<String>,
    state: Rc<DirectoryState>,
}

impl FakePlayer {
    fn record(&self, command: DuckCommand) -> Result<(), MediaError> {
        self.state.commands.borrow_mut().push(command);
        if self.state.fail_commands.get() {
            Err(MediaError::Rejected)
        } else {
            Ok(())
        }
    }
}

impl PausableSession for FakePlayer {
    fn app_id(&self) -> Option<String> {
        self.app_id.clone()
    }

    fn pause(&self) -> LocalBoxFuture<'_, Result<(), MediaError>> {
        async move { self.record(DuckCommand::Pause) }.boxed_local()
    }

    fn resume(&self) -> LocalBoxFuture<'_, Result<(), MediaError>> {
        async move { self.record(DuckCommand::Resume) }.boxed_local()
    }
}

/// Launcher replaying `(run time, exit)` pairs, then exiting cleanly
pub struct ScriptedLauncher {
    script: VecDeque<(Duration, WorkerExit)>,
    pub launches: Vec<Instant>,
}

impl ScriptedLauncher {
    pub fn new(script: impl IntoIterator<Item = (Duration, WorkerExit)>) -> Self {
        Self {
            script: script.into_iter().collect(),
            launches: Vec::new(),
        }
    }
}

impl Launcher for ScriptedLauncher {
    fn launch(&mut self) -> LocalBoxFuture<'_, WorkerExit> {
        self.launches.push(Instant::now());
        let (run_time, exit) = self
            .script
            .pop_front()
            .unwrap_or((Duration::ZERO, WorkerExit::Clean));
        async move {
            tokio::time::sleep(run_time).await;
            exit
        }
        .boxed_local()
    }
}
