// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Drives the running subsystem toward the declared configuration while
//! devices are still being discovered at boot.
//!
//! No state is carried between polls except the deadline. Every poll takes
//! a fresh snapshot and derives the state of each declared device from it.
//! Declared devices whose node exists are activated; failures to activate
//! are expected while dependencies settle and are only logged. Devices
//! declared lazy are attempted but never waited for.

use std::{
    fmt::{self, Display},
    path::Path,
    time::Duration,
};

use crate::{
    casctl::CasResult,
    engine::{
        config::{CacheDeclaration, CoreDeclaration, TargetConfiguration},
        engine::{ActivationActions, Clock, DeviceFs, Prober},
        probe::RuntimeDeviceState,
        types::CoreStatus,
    },
};

/// A declared cache or core.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Declaration<'a> {
    Cache(&'a CacheDeclaration),
    Core(&'a CoreDeclaration),
}

impl Declaration<'_> {
    pub fn device(&self) -> &Path {
        match self {
            Declaration::Cache(cache) => &cache.device,
            Declaration::Core(core) => &core.device,
        }
    }

    pub fn is_lazy(&self) -> bool {
        match self {
            Declaration::Cache(cache) => cache.is_lazy(),
            Declaration::Core(core) => core.is_lazy(),
        }
    }
}

impl Display for Declaration<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Declaration::Cache(cache) => {
                write!(f, "cache {} ({})", cache.cache_id, cache.device.display())
            }
            Declaration::Core(core) => write!(
                f,
                "core {}-{} ({})",
                core.cache_id,
                core.core_id,
                core.device.display()
            ),
        }
    }
}

/// The state of a declared device, derived from one snapshot.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DeviceState {
    /// The subsystem does not know the device.
    Absent,
    /// The subsystem knows the device but it is not serving I/O.
    Inactive,
    Ready,
}

/// A declared device which is not ready.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Unsatisfied<'a> {
    pub decl: Declaration<'a>,
    pub state: DeviceState,
}

/// A cache is ready as soon as the subsystem lists it, whatever its status.
pub fn cache_state(state: &RuntimeDeviceState, decl: &CacheDeclaration) -> DeviceState {
    if state.has_cache(decl.cache_id) {
        DeviceState::Ready
    } else {
        DeviceState::Absent
    }
}

/// A core is ready only when it is attached and active.
pub fn core_state(state: &RuntimeDeviceState, decl: &CoreDeclaration) -> DeviceState {
    match state.cores.get(&(decl.cache_id, decl.core_id)) {
        Some(core) if core.status == CoreStatus::Active => DeviceState::Ready,
        Some(_) => DeviceState::Inactive,
        None if state.pooled_core(&decl.device).is_some() => DeviceState::Inactive,
        None => DeviceState::Absent,
    }
}

/// Every declared device which is not ready in the snapshot. Caches come
/// first, by id, followed by cores in declaration order.
pub fn classify<'a>(
    target: &'a TargetConfiguration,
    state: &RuntimeDeviceState,
) -> Vec<Unsatisfied<'a>> {
    let caches = target.caches().map(|cache| Unsatisfied {
        decl: Declaration::Cache(cache),
        state: cache_state(state, cache),
    });
    let cores = target.cores().iter().map(|core| Unsatisfied {
        decl: Declaration::Core(core),
        state: core_state(state, core),
    });
    caches
        .chain(cores)
        .filter(|u| u.state != DeviceState::Ready)
        .collect()
}

/// Everything reconciliation needs from the outside world.
pub struct ReconcilerContext<'a> {
    pub target: &'a TargetConfiguration,
    pub prober: &'a dyn Prober,
    pub activator: &'a dyn ActivationActions,
    pub clock: &'a dyn Clock,
    pub devices: &'a dyn DeviceFs,
}

impl<'a> ReconcilerContext<'a> {
    fn unsatisfied(&self) -> CasResult<Vec<Unsatisfied<'a>>> {
        let state = self.prober.probe()?;
        Ok(classify(self.target, &state))
    }

    /// Attempt to activate every unsatisfied device whose node exists,
    /// caches before cores. Caches are loaded from their metadata; cores
    /// are added with try-add.
    fn activate_present(&self, unsatisfied: &[Unsatisfied<'_>]) {
        let (caches, cores): (Vec<&Unsatisfied<'_>>, Vec<&Unsatisfied<'_>>) = unsatisfied
            .iter()
            .partition(|u| matches!(u.decl, Declaration::Cache(_)));

        for u in caches.into_iter().chain(cores) {
            if !self.devices.exists(u.decl.device()) {
                continue;
            }
            let result = match u.decl {
                Declaration::Cache(cache) => self.activator.activate_cache(cache, true),
                Declaration::Core(core) => self.activator.activate_core(core, true),
            };
            match result {
                Ok(()) => info!("Activated {}", u.decl),
                Err(err) => warn!("Unable to activate {}, will retry: {}", u.decl, err),
            }
        }
    }

    /// Bring up the declared devices, waiting up to timeout for devices
    /// which are not lazy, and polling every interval. Return the devices
    /// still not ready at the end. Only a failure to take a snapshot is an
    /// error. A timeout too large to form a deadline means no deadline.
    ///
    /// Every device whose node exists is attempted once right after the
    /// first snapshot, then again on every poll while some non-lazy device
    /// remains unsatisfied. Once only lazy devices remain, they get one
    /// more attempt only if some device came up since the previous pass.
    pub fn reconcile(
        &self,
        timeout: Duration,
        interval: Duration,
    ) -> CasResult<Vec<Unsatisfied<'a>>> {
        let deadline = self.clock.now().checked_add(timeout);

        let mut unsatisfied = self.unsatisfied()?;
        if unsatisfied.is_empty() {
            debug!("All declared devices are ready");
            return Ok(unsatisfied);
        }

        if let Err(err) = self.devices.settle() {
            warn!("Unable to wait for device events to settle: {err}");
        }

        self.activate_present(&unsatisfied);
        let mut last_pass = unsatisfied.len();

        loop {
            unsatisfied = self.unsatisfied()?;
            if unsatisfied.iter().all(|u| u.decl.is_lazy()) {
                // A lazy core may have been waiting on a cache that just
                // came up.
                if !unsatisfied.is_empty() && unsatisfied.len() < last_pass {
                    self.activate_present(&unsatisfied);
                    unsatisfied = self.unsatisfied()?;
                }
                break;
            }
            if deadline.is_some_and(|deadline| self.clock.now() >= deadline) {
                break;
            }
            self.activate_present(&unsatisfied);
            last_pass = unsatisfied.len();
            debug!(
                "{} declared devices not ready; polling again in {:?}",
                unsatisfied.len(),
                interval
            );
            self.clock.sleep(interval);
        }

        Ok(unsatisfied)
    }
}
