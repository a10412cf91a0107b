// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Tearing down every cache and core found running. One cache's exported
//! object may be the core device of another cache, so cores are detached
//! most dependent first. A failure to detach or stop one device does not
//! stop the others from being attempted; all failures are reported at the
//! end.

use std::collections::{HashMap, HashSet};

use crate::{
    casctl::{CasError, CasResult, CompoundError},
    engine::{
        casadm::Casadm,
        cmd::Executor,
        devices::backing_exported_object,
        engine::Prober,
        probe::RuntimeDeviceState,
        types::{CacheId, CoreId, CoreStatus, DetachAction},
    },
};

type CoreKey = (CacheId, CoreId);

/// Active cores and, for each, the active cores stacked directly on its
/// exported object.
struct DetachGraph<'a> {
    state: &'a RuntimeDeviceState,
    dependents: HashMap<CoreKey, Vec<CoreKey>>,
}

impl<'a> DetachGraph<'a> {
    fn new(state: &'a RuntimeDeviceState) -> DetachGraph<'a> {
        let mut dependents: HashMap<CoreKey, Vec<CoreKey>> = HashMap::new();
        for (key, core) in state.cores.iter() {
            if core.status != CoreStatus::Active {
                continue;
            }
            if let Some(base) = backing_exported_object(&core.device) {
                dependents.entry(base).or_default().push(*key);
            }
        }
        DetachGraph { state, dependents }
    }

    fn is_active(&self, key: CoreKey) -> bool {
        self.state
            .cores
            .get(&key)
            .map(|core| core.status == CoreStatus::Active)
            .unwrap_or(false)
    }

    /// Active cores in listing order.
    fn active(&self) -> impl Iterator<Item = CoreKey> + '_ {
        self.state
            .cores
            .keys()
            .copied()
            .filter(move |key| self.is_active(*key))
    }

    fn dependents_of(&self, key: CoreKey) -> impl Iterator<Item = CoreKey> + '_ {
        self.dependents.get(&key).into_iter().flatten().copied()
    }

    /// The core and everything stacked on it, each dependent before the
    /// core it depends on.
    fn detach_order(&self, root: CoreKey) -> Vec<CoreKey> {
        fn visit(
            graph: &DetachGraph<'_>,
            key: CoreKey,
            seen: &mut HashSet<CoreKey>,
            order: &mut Vec<CoreKey>,
        ) {
            if !seen.insert(key) {
                return;
            }
            for dependent in graph.dependents_of(key) {
                visit(graph, dependent, seen, order);
            }
            order.push(key);
        }

        let mut order = Vec::new();
        visit(self, root, &mut HashSet::new(), &mut order);
        order
    }

    fn device_name(&self, key: CoreKey) -> String {
        self.state
            .cores
            .get(&key)
            .map(|core| core.device.display().to_string())
            .unwrap_or_else(|| format!("{}-{}", key.0, key.1))
    }
}

pub struct Shutdown<'a> {
    casadm: Casadm<'a>,
    prober: &'a dyn Prober,
}

impl<'a> Shutdown<'a> {
    pub fn new(executor: &'a dyn Executor, prober: &'a dyn Prober) -> Self {
        Shutdown {
            casadm: Casadm::new(executor),
            prober,
        }
    }

    /// Detach the core, after first detaching every core stacked on its
    /// exported object. Stops at the first failure.
    pub fn detach_core_recursive(
        &self,
        cache_id: CacheId,
        core_id: CoreId,
        flush: bool,
    ) -> CasResult<DetachAction<CoreKey>> {
        let state = self.prober.probe()?;
        let graph = DetachGraph::new(&state);
        if !graph.is_active((cache_id, core_id)) {
            return Ok(DetachAction::Identity);
        }

        let order = graph.detach_order((cache_id, core_id));
        for (cache_id, core_id) in order.iter() {
            self.casadm.detach_core(*cache_id, *core_id, flush)?;
        }
        Ok(DetachAction::Detached(order))
    }

    /// Detach every active core. Every core is attempted; the failures are
    /// returned together. A core with a dependent which is still attached is
    /// left attached.
    pub fn detach_all_cores(&self, flush: bool) -> CasResult<DetachAction<CoreKey>> {
        let state = self.prober.probe()?;
        let graph = DetachGraph::new(&state);

        let mut attempted = HashSet::new();
        let mut kept = HashSet::new();
        let mut detached = Vec::new();
        let mut errors = CompoundError::new();

        for root in graph.active() {
            for key in graph.detach_order(root) {
                if !attempted.insert(key) {
                    continue;
                }
                if graph.dependents_of(key).any(|d| kept.contains(&d)) {
                    debug!(
                        "Leaving core {} attached, a core stacked on it is still attached",
                        graph.device_name(key)
                    );
                    kept.insert(key);
                    continue;
                }
                match self.casadm.detach_core(key.0, key.1, flush) {
                    Ok(()) => {
                        info!("Detached core {}", graph.device_name(key));
                        detached.push(key);
                    }
                    Err(err) => {
                        errors.add(CasError::Chained(
                            format!("Unable to detach core {}", graph.device_name(key)),
                            Box::new(err),
                        ));
                        kept.insert(key);
                    }
                }
            }
        }

        errors.into_result()?;
        Ok(if detached.is_empty() {
            DetachAction::Identity
        } else {
            DetachAction::Detached(detached)
        })
    }

    /// Stop every cache listed. Every cache is attempted; the failures are
    /// returned together.
    pub fn stop_all_caches(&self, flush: bool) -> CasResult<()> {
        let state = self.prober.probe()?;
        let mut errors = CompoundError::new();

        for (cache_id, cache) in state.caches.iter() {
            match self.casadm.stop_cache(*cache_id, flush) {
                Ok(()) => info!("Stopped cache {}", cache.device.display()),
                Err(err) => errors.add(CasError::Chained(
                    format!("Unable to stop cache {}", cache.device.display()),
                    Box::new(err),
                )),
            }
        }

        errors.into_result()
    }

    /// Detach all cores, then stop all caches. Data is flushed, if at all,
    /// when the cores are detached; caches are stopped without flushing.
    pub fn stop(&self, flush: bool) -> CasResult<()> {
        let mut errors = CompoundError::new();

        if let Err(err) = self.detach_all_cores(flush) {
            errors.add(err);
        }
        if let Err(err) = self.stop_all_caches(false) {
            errors.add(err);
        }

        errors.into_result()
    }
}
