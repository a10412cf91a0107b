// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use std::{
    path::Path,
    thread,
    time::{Duration, Instant},
};

use crate::{
    casctl::CasResult,
    engine::{
        cmd::{udev_settle, Executor},
        config::{CacheDeclaration, CoreDeclaration},
        probe::RuntimeDeviceState,
    },
};

/// Source of snapshots of the live caching subsystem.
pub trait Prober {
    /// Enumerate all caches, cores and core pool members. Every call
    /// returns a fresh snapshot. Return an error if the subsystem could not
    /// be enumerated.
    fn probe(&self) -> CasResult<RuntimeDeviceState>;
}

/// The two operations which bring a declared device up. Both may be
/// repeated safely; a failure means only that the device could not be
/// brought up at this time.
pub trait ActivationActions {
    /// Start the cache. If load is true, the cache is recovered from the
    /// metadata on its device rather than initialized.
    fn activate_cache(&self, decl: &CacheDeclaration, load: bool) -> CasResult<()>;

    /// Add the core to its cache. If try_add is true, the core is
    /// registered even if the cache or the device is not ready yet.
    fn activate_core(&self, decl: &CoreDeclaration, try_add: bool) -> CasResult<()>;
}

/// Wall clock and sleep, separated so that the polling loop can be driven
/// without waiting in real time.
pub trait Clock {
    fn now(&self) -> Instant;

    fn sleep(&self, duration: Duration);
}

/// The parts of the device namespace consulted while waiting for devices.
pub trait DeviceFs {
    /// Block until the device manager has processed all queued events.
    fn settle(&self) -> CasResult<()>;

    /// Whether a device node exists at the path right now.
    fn exists(&self, path: &Path) -> bool;
}

#[derive(Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) {
        thread::sleep(duration)
    }
}

/// The device namespace of the running system, settled with udevadm.
pub struct SystemDeviceFs<'a> {
    executor: &'a dyn Executor,
}

impl<'a> SystemDeviceFs<'a> {
    pub fn new(executor: &'a dyn Executor) -> Self {
        SystemDeviceFs { executor }
    }
}

impl DeviceFs for SystemDeviceFs<'_> {
    fn settle(&self) -> CasResult<()> {
        udev_settle(self.executor)
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }
}
