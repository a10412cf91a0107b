// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Scripted stand-ins for the system: commands, device nodes and time.

use std::{
    cell::{Cell, RefCell},
    os::unix::process::ExitStatusExt,
    path::{Path, PathBuf},
    process::ExitStatus,
    sync::Once,
    time::{Duration, Instant},
};

use crate::{
    casctl::{CasError, CasResult},
    engine::{
        cmd::{CmdLine, Executor, CASADM},
        config::{CacheDeclaration, CoreDeclaration},
        engine::{ActivationActions, Clock, DeviceFs, Prober},
        probe::RuntimeDeviceState,
        types::{CacheId, CoreId},
    },
};

pub const LISTING_HEADER: &str = "type,id,disk,status,write policy,device";

static LOGGER_INIT: Once = Once::new();

/// Initialize the logger once. More than one init() attempt returns
/// errors.
pub fn init_logger() {
    LOGGER_INIT.call_once(|| {
        let _ = env_logger::builder().is_test(true).try_init();
    });
}

/// The error a command exiting with status 1 produces.
pub fn command_failure(cmd: &CmdLine, stderr: &str) -> CasError {
    CasError::CommandFailure {
        cmd: cmd.to_string(),
        status: ExitStatus::from_raw(1 << 8),
        stderr: stderr.to_string(),
    }
}

type Handler = Box<dyn Fn(&CmdLine) -> CasResult<String>>;

/// Answers every command with the handler's result and records the
/// commands in the order received.
pub struct FakeExecutor {
    handler: Handler,
    calls: RefCell<Vec<CmdLine>>,
}

impl FakeExecutor {
    pub fn new<F>(handler: F) -> FakeExecutor
    where
        F: Fn(&CmdLine) -> CasResult<String> + 'static,
    {
        FakeExecutor {
            handler: Box::new(handler),
            calls: RefCell::new(Vec::new()),
        }
    }

    /// Every command succeeds with empty output.
    pub fn succeeding() -> FakeExecutor {
        FakeExecutor::new(|_| Ok(String::new()))
    }

    /// Every command fails with the given stderr.
    pub fn failing(stderr: &'static str) -> FakeExecutor {
        FakeExecutor::new(move |cmd| Err(command_failure(cmd, stderr)))
    }

    /// Listing caches prints output; every other command succeeds.
    pub fn listing(output: String) -> FakeExecutor {
        FakeExecutor::new(move |cmd| {
            if cmd.binary() == CASADM && cmd.has_arg("--list-caches") {
                Ok(output.clone())
            } else {
                Ok(String::new())
            }
        })
    }

    pub fn calls(&self) -> Vec<CmdLine> {
        self.calls.borrow().clone()
    }
}

impl Executor for FakeExecutor {
    fn execute(&self, cmd: &CmdLine) -> CasResult<String> {
        self.calls.borrow_mut().push(cmd.clone());
        (self.handler)(cmd)
    }
}

/// A clock which moves only when slept on or advanced.
pub struct ManualClock {
    start: Instant,
    now: Cell<Instant>,
    sleeps: Cell<usize>,
}

impl ManualClock {
    pub fn new() -> ManualClock {
        let start = Instant::now();
        ManualClock {
            start,
            now: Cell::new(start),
            sleeps: Cell::new(0),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.now.get() - self.start
    }

    pub fn advance(&self, duration: Duration) {
        self.now.set(self.now.get() + duration);
    }

    pub fn sleeps(&self) -> usize {
        self.sleeps.get()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.now.get()
    }

    fn sleep(&self, duration: Duration) {
        self.sleeps.set(self.sleeps.get() + 1);
        self.advance(duration);
    }
}

/// Device nodes which appear at fixed offsets from the clock's start.
pub struct FakeDeviceFs<'a> {
    clock: &'a ManualClock,
    devices: Vec<(PathBuf, Duration)>,
    settles: Cell<usize>,
}

impl<'a> FakeDeviceFs<'a> {
    pub fn new(clock: &'a ManualClock) -> FakeDeviceFs<'a> {
        FakeDeviceFs {
            clock,
            devices: Vec::new(),
            settles: Cell::new(0),
        }
    }

    /// The device at path exists once the clock has run for appears_after.
    pub fn with_device(mut self, path: &str, appears_after: Duration) -> Self {
        self.devices.push((PathBuf::from(path), appears_after));
        self
    }

    pub fn settles(&self) -> usize {
        self.settles.get()
    }
}

impl DeviceFs for FakeDeviceFs<'_> {
    fn settle(&self) -> CasResult<()> {
        self.settles.set(self.settles.get() + 1);
        Ok(())
    }

    fn exists(&self, path: &Path) -> bool {
        self.devices
            .iter()
            .any(|(p, after)| p == path && self.clock.elapsed() >= *after)
    }
}

/// Returns one listing per probe, repeating the last one when the script
/// runs out.
pub struct ScriptedProber {
    listings: Vec<String>,
    probes: Cell<usize>,
}

impl ScriptedProber {
    /// Each listing is given as rows without the header.
    pub fn new(listings: &[&str]) -> ScriptedProber {
        ScriptedProber {
            listings: listings
                .iter()
                .map(|rows| format!("{LISTING_HEADER}\n{rows}"))
                .collect(),
            probes: Cell::new(0),
        }
    }

    pub fn probes(&self) -> usize {
        self.probes.get()
    }
}

impl Prober for ScriptedProber {
    fn probe(&self) -> CasResult<RuntimeDeviceState> {
        let idx = self.probes.get();
        self.probes.set(idx + 1);
        let listing = self
            .listings
            .get(idx)
            .or_else(|| self.listings.last())
            .map(|l| l.as_str())
            .unwrap_or(LISTING_HEADER);
        RuntimeDeviceState::from_listing(listing)
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Activation {
    Cache { cache_id: CacheId, load: bool },
    Core { cache_id: CacheId, core_id: CoreId, try_add: bool },
}

/// Records activations; fails every one of them if told to.
#[derive(Default)]
pub struct RecordingActivator {
    failing: bool,
    calls: RefCell<Vec<Activation>>,
}

impl RecordingActivator {
    pub fn new() -> RecordingActivator {
        RecordingActivator::default()
    }

    pub fn failing() -> RecordingActivator {
        RecordingActivator {
            failing: true,
            ..RecordingActivator::default()
        }
    }

    pub fn calls(&self) -> Vec<Activation> {
        self.calls.borrow().clone()
    }

    fn record(&self, activation: Activation) -> CasResult<()> {
        self.calls.borrow_mut().push(activation);
        if self.failing {
            Err(CasError::Msg("device is not ready".into()))
        } else {
            Ok(())
        }
    }
}

impl ActivationActions for RecordingActivator {
    fn activate_cache(&self, decl: &CacheDeclaration, load: bool) -> CasResult<()> {
        self.record(Activation::Cache {
            cache_id: decl.cache_id,
            load,
        })
    }

    fn activate_core(&self, decl: &CoreDeclaration, try_add: bool) -> CasResult<()> {
        self.record(Activation::Core {
            cache_id: decl.cache_id,
            core_id: decl.core_id,
            try_add,
        })
    }
}
