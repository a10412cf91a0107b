// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The work behind each casctl subcommand.

use std::{path::Path, time::Duration};

use itertools::Itertools;
use retry::{delay::Fixed, retry_with_index};

use crate::{
    casctl::{CasError, CasResult},
    engine::{
        parse_version, Casadm, CasadmActivator, CasadmProber, Declaration, DeviceFs, Executor,
        Prober, ReconcilerContext, Shutdown, SystemClock, SystemDeviceFs, TargetConfiguration,
        Unsatisfied, CAS_CTRL_PATH,
    },
};

const CAS_CTRL_POLL_MILLIS: u64 = 1000;
const CAS_CTRL_RETRIES: usize = 30;

/// Wait for the control device of the kernel module to appear, checking
/// once a second.
pub fn wait_for_cas_ctrl(devices: &dyn DeviceFs) -> CasResult<()> {
    retry_with_index(
        Fixed::from_millis(CAS_CTRL_POLL_MILLIS).take(CAS_CTRL_RETRIES),
        |i| {
            trace!("Control device check attempt {i}");
            if devices.exists(Path::new(CAS_CTRL_PATH)) {
                Ok(())
            } else {
                Err(CasError::Msg(format!("{CAS_CTRL_PATH} does not exist")))
            }
        },
    )
    .map_err(|e| CasError::Msg(format!("Control device did not appear: {e}")))
}

/// Start every declared cache from scratch and add every declared core.
/// Devices already running are left alone.
pub fn init(executor: &dyn Executor, config_path: &Path, force: bool) -> CasResult<()> {
    let config = TargetConfiguration::load_from(config_path, false)?;
    config.validate(executor, force)?;

    let state = CasadmProber::new(executor).probe()?;
    let activator = CasadmActivator::new(executor);

    for cache in config.caches() {
        let action = activator.init_cache(&state, cache, force).map_err(|err| {
            CasError::Chained(
                format!("Unable to start {}", Declaration::Cache(cache)),
                Box::new(err),
            )
        })?;
        info!("{action}");
    }

    for core in config.cores() {
        let action = activator.init_core(&state, core).map_err(|err| {
            CasError::Chained(
                format!("Unable to add {}", Declaration::Core(core)),
                Box::new(err),
            )
        })?;
        info!("{action}");
    }

    Ok(())
}

/// Run reconciliation against the live system.
fn reconcile_system<T, F>(
    executor: &dyn Executor,
    config: &TargetConfiguration,
    f: F,
) -> CasResult<T>
where
    F: FnOnce(&ReconcilerContext<'_>) -> CasResult<T>,
{
    let prober = CasadmProber::new(executor);
    let activator = CasadmActivator::new(executor);
    let devices = SystemDeviceFs::new(executor);
    f(&ReconcilerContext {
        target: config,
        prober: &prober,
        activator: &activator,
        clock: &SystemClock,
        devices: &devices,
    })
}

/// Bring up whatever of the configuration is present at boot. Devices
/// which are not there yet are left to settle.
pub fn start(executor: &dyn Executor, config_path: &Path) -> CasResult<()> {
    let config = TargetConfiguration::load_from(config_path, true)?;
    wait_for_cas_ctrl(&SystemDeviceFs::new(executor))?;

    reconcile_system(executor, &config, |context| {
        for u in context.reconcile(Duration::ZERO, Duration::ZERO)? {
            info!("{} is not ready yet", u.decl);
        }
        Ok(())
    })
}

/// Fail if any device which is not lazy is still unsatisfied. Lazy devices
/// only produce a warning.
fn check_settled(unsatisfied: &[Unsatisfied<'_>]) -> CasResult<()> {
    let (lazy, required): (Vec<&Unsatisfied<'_>>, Vec<&Unsatisfied<'_>>) =
        unsatisfied.iter().partition(|u| u.decl.is_lazy());

    for u in lazy {
        warn!("Lazy {} is not ready", u.decl);
    }

    if required.is_empty() {
        Ok(())
    } else {
        Err(CasError::Msg(format!(
            "Devices not ready: {}",
            required.iter().map(|u| u.decl).join(", ")
        )))
    }
}

/// Wait up to timeout for every declared device to come up, polling every
/// interval.
pub fn settle(
    executor: &dyn Executor,
    config_path: &Path,
    timeout: Duration,
    interval: Duration,
) -> CasResult<()> {
    let config = TargetConfiguration::load_from(config_path, true)?;
    reconcile_system(executor, &config, |context| {
        check_settled(&context.reconcile(timeout, interval)?)
    })
}

/// Detach every core and stop every cache.
pub fn stop(executor: &dyn Executor, flush: bool) -> CasResult<()> {
    let prober = CasadmProber::new(executor);
    Shutdown::new(executor, &prober).stop(flush)
}

/// The running caches, cores and core pool as pretty printed JSON.
pub fn report(executor: &dyn Executor) -> CasResult<String> {
    let state = CasadmProber::new(executor).probe()?;
    Ok(serde_json::to_string_pretty(&state.to_json())?)
}

/// One line per installed component with its version.
pub fn version(executor: &dyn Executor) -> CasResult<String> {
    let output = Casadm::new(executor).version()?;
    Ok(parse_version(&output)?
        .into_iter()
        .map(|(component, version)| format!("{component}: {version}"))
        .join("\n"))
}
