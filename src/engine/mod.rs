// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

pub use self::{
    activate::CasadmActivator,
    casadm::{parse_version, Casadm, ParamNamespace, StartCache},
    cmd::{verify_binaries, CmdLine, Executor, SystemExecutor},
    config::{
        CacheDeclaration, CacheParams, CoreDeclaration, TargetConfiguration, DEFAULT_CONFIG_PATH,
    },
    devices::{exported_object_path, CAS_CTRL_PATH},
    engine::{ActivationActions, Clock, DeviceFs, Prober, SystemClock, SystemDeviceFs},
    probe::{
        is_cache_started, is_core_added, CacheEntry, CasadmProber, CoreEntry, DeviceRow,
        RuntimeDeviceState,
    },
    reconcile::{classify, Declaration, DeviceState, ReconcilerContext, Unsatisfied},
    shutdown::Shutdown,
    types::{
        CacheId, CacheLineSize, CacheMode, CacheStatus, CleaningPolicy, CoreId, CoreStatus,
        DetachAction, EngineAction, FailoverState, PromotionPolicy, StartAction,
    },
};

mod activate;
mod casadm;
mod cmd;
mod config;
mod devices;
#[allow(clippy::module_inception)]
mod engine;
mod probe;
mod reconcile;
mod shutdown;
mod types;

#[cfg(test)]
pub(crate) mod tests;
