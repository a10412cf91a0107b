// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use crate::{
    casctl::CasResult,
    engine::{
        casadm::{Casadm, ParamNamespace, StartCache},
        cmd::Executor,
        config::{CacheDeclaration, CoreDeclaration},
        engine::ActivationActions,
        probe::RuntimeDeviceState,
        types::{CacheId, CoreId, FailoverState, StartAction},
    },
};

/// Brings declared devices up with casadm.
pub struct CasadmActivator<'a> {
    casadm: Casadm<'a>,
}

impl<'a> CasadmActivator<'a> {
    pub fn new(executor: &'a dyn Executor) -> Self {
        CasadmActivator {
            casadm: Casadm::new(executor),
        }
    }

    /// Initialize a new cache instance on the declared device, overwriting
    /// any metadata found there if force is set.
    fn start_new_cache(&self, decl: &CacheDeclaration, force: bool) -> CasResult<()> {
        match decl.failover_state() {
            FailoverState::Standby => self.casadm.standby_init(
                &decl.device,
                decl.cache_id,
                decl.params.cache_line_size.unwrap_or_default(),
                force,
            ),
            FailoverState::Active => self.casadm.start_cache(
                &decl.device,
                StartCache::New {
                    cache_id: decl.cache_id,
                    cache_mode: decl.cache_mode,
                    cache_line_size: decl.params.cache_line_size,
                    force,
                },
            ),
        }
    }

    /// Apply the policies and the io class configuration declared for a
    /// running cache.
    pub fn configure_cache(&self, decl: &CacheDeclaration) -> CasResult<()> {
        if let Some(policy) = decl.params.cleaning_policy {
            self.casadm.set_param(
                ParamNamespace::Cleaning,
                decl.cache_id,
                None,
                &[("policy", policy.to_string())],
            )?;
        }
        if let Some(policy) = decl.params.promotion_policy {
            self.casadm.set_param(
                ParamNamespace::Promotion,
                decl.cache_id,
                None,
                &[("policy", policy.to_string())],
            )?;
        }
        if let Some(ref file) = decl.params.ioclass_file {
            self.casadm.io_class_load_config(decl.cache_id, file)?;
        }
        Ok(())
    }

    /// Start the cache from scratch and configure it, unless the state
    /// shows it running already.
    pub fn init_cache(
        &self,
        state: &RuntimeDeviceState,
        decl: &CacheDeclaration,
        force: bool,
    ) -> CasResult<StartAction<CacheId>> {
        if state.has_cache(decl.cache_id) {
            return Ok(StartAction::Identity);
        }
        self.start_new_cache(decl, force)?;
        if decl.failover_state() == FailoverState::Active {
            self.configure_cache(decl)?;
        }
        Ok(StartAction::Started(decl.cache_id))
    }

    /// Attach the core, unless the state shows it attached already.
    pub fn init_core(
        &self,
        state: &RuntimeDeviceState,
        decl: &CoreDeclaration,
    ) -> CasResult<StartAction<(CacheId, CoreId)>> {
        if state.has_core(decl.cache_id, decl.core_id) {
            return Ok(StartAction::Identity);
        }
        self.activate_core(decl, false)?;
        Ok(StartAction::Started((decl.cache_id, decl.core_id)))
    }
}

impl ActivationActions for CasadmActivator<'_> {
    fn activate_cache(&self, decl: &CacheDeclaration, load: bool) -> CasResult<()> {
        if !load {
            return self.start_new_cache(decl, false);
        }
        match decl.failover_state() {
            FailoverState::Standby => self.casadm.standby_load(&decl.device),
            FailoverState::Active => self.casadm.start_cache(&decl.device, StartCache::Load),
        }
    }

    fn activate_core(&self, decl: &CoreDeclaration, try_add: bool) -> CasResult<()> {
        self.casadm
            .add_core(&decl.device, decl.cache_id, Some(decl.core_id), try_add)
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use crate::engine::{
        config::CacheParams,
        tests::{FakeExecutor, LISTING_HEADER},
        types::{CacheLineSize, CacheMode, CleaningPolicy, EngineAction, PromotionPolicy},
    };

    use super::*;

    fn cache(failover: Option<FailoverState>) -> CacheDeclaration {
        CacheDeclaration {
            cache_id: CacheId::new(4).unwrap(),
            device: "/dev/nvme0n1".into(),
            cache_mode: CacheMode::Wb,
            params: CacheParams {
                cache_line_size: Some(CacheLineSize::Kib8),
                cleaning_policy: Some(CleaningPolicy::Acp),
                promotion_policy: Some(PromotionPolicy::Nhit),
                target_failover_state: failover,
                ..CacheParams::default()
            },
        }
    }

    fn commands(executor: &FakeExecutor) -> Vec<String> {
        executor.calls().iter().map(|c| c.to_string()).collect()
    }

    #[test]
    /// Loading takes everything but the device from the on-disk metadata.
    fn test_activate_cache() {
        let executor = FakeExecutor::succeeding();
        let activator = CasadmActivator::new(&executor);

        activator.activate_cache(&cache(None), true).unwrap();
        activator.activate_cache(&cache(None), false).unwrap();
        activator
            .activate_cache(&cache(Some(FailoverState::Standby)), true)
            .unwrap();
        activator
            .activate_cache(&cache(Some(FailoverState::Standby)), false)
            .unwrap();

        assert_eq!(
            commands(&executor),
            vec![
                "casadm --start-cache --cache-device /dev/nvme0n1 --load",
                "casadm --start-cache --cache-device /dev/nvme0n1 --cache-id 4 --cache-mode wb \
                 --cache-line-size 8",
                "casadm --standby --load --cache-device /dev/nvme0n1",
                "casadm --standby --init --cache-device /dev/nvme0n1 --cache-id 4 \
                 --cache-line-size 8",
            ]
        );
    }

    #[test]
    /// Standby init without a declared line size uses the smallest one.
    fn test_standby_default_line_size() {
        let executor = FakeExecutor::succeeding();
        let activator = CasadmActivator::new(&executor);
        let mut decl = cache(Some(FailoverState::Standby));
        decl.params.cache_line_size = None;

        activator.activate_cache(&decl, false).unwrap();
        assert_eq!(
            executor.calls()[0].value_of("--cache-line-size"),
            Some("4")
        );
    }

    #[test]
    fn test_activate_core() {
        let executor = FakeExecutor::succeeding();
        let activator = CasadmActivator::new(&executor);
        let decl = CoreDeclaration {
            cache_id: CacheId::new(4).unwrap(),
            core_id: CoreId::new(2).unwrap(),
            device: "/dev/sdb".into(),
            lazy_startup: None,
        };

        activator.activate_core(&decl, true).unwrap();
        assert_eq!(
            commands(&executor),
            vec!["casadm --script --add-core --core-device /dev/sdb --cache-id 4 --core-id 2 --try-add"]
        );
    }

    #[test]
    /// A fresh cache is started, then its policies and io classes are
    /// applied; a running one is left alone.
    fn test_init_cache() {
        let ioclass = tempfile::NamedTempFile::new().unwrap();
        let mut decl = cache(None);
        decl.params.ioclass_file = Some(ioclass.path().to_owned());

        let executor = FakeExecutor::succeeding();
        let activator = CasadmActivator::new(&executor);
        let action = activator
            .init_cache(&RuntimeDeviceState::default(), &decl, true)
            .unwrap();
        assert_eq!(action, StartAction::Started(decl.cache_id));

        let calls = executor.calls();
        assert_eq!(calls.len(), 4);
        assert!(calls[0].has_arg("--start-cache") && calls[0].has_arg("--force"));
        assert_eq!(calls[1].value_of("--name"), Some("cleaning"));
        assert_eq!(calls[1].value_of("--policy"), Some("acp"));
        assert_eq!(calls[2].value_of("--name"), Some("promotion"));
        assert_eq!(calls[2].value_of("--policy"), Some("nhit"));
        assert!(calls[3].has_arg("--io-class"));
        assert_eq!(
            calls[3].value_of("--file").map(Path::new),
            Some(ioclass.path())
        );

        let running = RuntimeDeviceState::from_listing(&format!(
            "{LISTING_HEADER}\ncache,4,/dev/nvme0n1,Running,wb,-\n"
        ))
        .unwrap();
        let executor = FakeExecutor::succeeding();
        let activator = CasadmActivator::new(&executor);
        let action = activator.init_cache(&running, &decl, false).unwrap();
        assert!(!action.is_changed());
        assert!(executor.calls().is_empty());
    }
}
