// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Invocations of the casadm management tool.

use std::path::Path;

use strum_macros::AsRefStr;

use crate::{
    casctl::CasResult,
    engine::{
        cmd::{CmdLine, Executor, CASADM},
        types::{CacheId, CacheLineSize, CacheMode, CoreId},
    },
};

/// How a cache is brought up by --start-cache.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum StartCache {
    /// Initialize a new cache instance on the device.
    New {
        cache_id: CacheId,
        cache_mode: CacheMode,
        cache_line_size: Option<CacheLineSize>,
        force: bool,
    },
    /// Recover the cache instance from the metadata on the device. The id,
    /// mode and line size come from the metadata and are not passed.
    Load,
}

/// Parameter namespaces of --set-param and --get-param.
#[derive(AsRefStr, Clone, Copy, Debug, Eq, PartialEq)]
#[strum(serialize_all = "kebab-case")]
pub enum ParamNamespace {
    SeqCutoff,
    Cleaning,
    CleaningAlru,
    CleaningAcp,
    Promotion,
    PromotionNhit,
}

/// Builds casadm command lines and runs them with the given executor.
pub struct Casadm<'a> {
    executor: &'a dyn Executor,
}

impl<'a> Casadm<'a> {
    pub fn new(executor: &'a dyn Executor) -> Self {
        Casadm { executor }
    }

    fn cmd() -> CmdLine {
        CmdLine::new(CASADM)
    }

    fn script() -> CmdLine {
        CmdLine::new(CASADM).arg("--script")
    }

    fn run(&self, cmd: &CmdLine) -> CasResult<String> {
        self.executor.execute(cmd)
    }

    pub fn version(&self) -> CasResult<String> {
        self.run(&Self::cmd().arg("--version").opt("--output-format", "csv"))
    }

    /// The listing of all caches, cores and the core pool as CSV.
    pub fn list_caches(&self) -> CasResult<String> {
        self.run(
            &Self::cmd()
                .arg("--list-caches")
                .opt("--output-format", "csv")
                .arg("--by-id-path"),
        )
    }

    pub fn check_cache_device(&self, device: &Path) -> CasResult<String> {
        self.run(
            &Self::script()
                .arg("--check-cache-device")
                .path_opt("--cache-device", device),
        )
    }

    pub fn start_cache(&self, device: &Path, start: StartCache) -> CasResult<()> {
        let mut cmd = Self::cmd()
            .arg("--start-cache")
            .path_opt("--cache-device", device);
        cmd = match start {
            StartCache::New {
                cache_id,
                cache_mode,
                cache_line_size,
                force,
            } => {
                cmd = cmd
                    .opt("--cache-id", cache_id)
                    .opt("--cache-mode", cache_mode);
                if let Some(size) = cache_line_size {
                    cmd = cmd.opt("--cache-line-size", size);
                }
                cmd.flag_if("--force", force)
            }
            StartCache::Load => cmd.arg("--load"),
        };
        self.run(&cmd).map(|_| ())
    }

    pub fn standby_init(
        &self,
        device: &Path,
        cache_id: CacheId,
        cache_line_size: CacheLineSize,
        force: bool,
    ) -> CasResult<()> {
        self.run(
            &Self::cmd()
                .arg("--standby")
                .arg("--init")
                .path_opt("--cache-device", device)
                .opt("--cache-id", cache_id)
                .opt("--cache-line-size", cache_line_size)
                .flag_if("--force", force),
        )
        .map(|_| ())
    }

    pub fn standby_load(&self, device: &Path) -> CasResult<()> {
        self.run(
            &Self::cmd()
                .arg("--standby")
                .arg("--load")
                .path_opt("--cache-device", device),
        )
        .map(|_| ())
    }

    pub fn standby_detach(&self, cache_id: CacheId) -> CasResult<()> {
        self.run(
            &Self::cmd()
                .arg("--standby")
                .arg("--detach")
                .opt("--cache-id", cache_id),
        )
        .map(|_| ())
    }

    pub fn standby_activate(&self, device: &Path, cache_id: CacheId) -> CasResult<()> {
        self.run(
            &Self::cmd()
                .arg("--standby")
                .arg("--activate")
                .path_opt("--cache-device", device)
                .opt("--cache-id", cache_id),
        )
        .map(|_| ())
    }

    pub fn stop_cache(&self, cache_id: CacheId, flush: bool) -> CasResult<()> {
        self.run(
            &Self::cmd()
                .arg("--stop-cache")
                .opt("--cache-id", cache_id)
                .flag_if("--no-data-flush", !flush),
        )
        .map(|_| ())
    }

    /// Attach a core. With try_add the core is registered with the cache
    /// even if its device is not present yet.
    pub fn add_core(
        &self,
        device: &Path,
        cache_id: CacheId,
        core_id: Option<CoreId>,
        try_add: bool,
    ) -> CasResult<()> {
        let mut cmd = Self::script()
            .arg("--add-core")
            .path_opt("--core-device", device)
            .opt("--cache-id", cache_id);
        if let Some(core_id) = core_id {
            cmd = cmd.opt("--core-id", core_id);
        }
        self.run(&cmd.flag_if("--try-add", try_add)).map(|_| ())
    }

    /// Remove a core from its cache, and from the cache's metadata.
    pub fn remove_core(&self, cache_id: CacheId, core_id: CoreId, force: bool) -> CasResult<()> {
        self.run(
            &Self::cmd()
                .arg("--remove-core")
                .opt("--cache-id", cache_id)
                .opt("--core-id", core_id)
                .flag_if("--force", force),
        )
        .map(|_| ())
    }

    /// Detach a core, keeping it in the cache's metadata, so that it is
    /// reattached when the cache is loaded.
    pub fn detach_core(&self, cache_id: CacheId, core_id: CoreId, flush: bool) -> CasResult<()> {
        self.run(
            &Self::script()
                .arg("--remove-core")
                .opt("--cache-id", cache_id)
                .opt("--core-id", core_id)
                .arg("--detach")
                .flag_if("--no-flush", !flush),
        )
        .map(|_| ())
    }

    pub fn set_param(
        &self,
        namespace: ParamNamespace,
        cache_id: CacheId,
        core_id: Option<CoreId>,
        params: &[(&str, String)],
    ) -> CasResult<()> {
        let mut cmd = Self::cmd()
            .arg("--set-param")
            .opt("--name", namespace.as_ref())
            .opt("--cache-id", cache_id);
        if let Some(core_id) = core_id {
            cmd = cmd.opt("--core-id", core_id);
        }
        for (name, value) in params {
            cmd = cmd.opt(&format!("--{}", name.replace('_', "-")), value);
        }
        self.run(&cmd).map(|_| ())
    }

    pub fn get_param(
        &self,
        namespace: ParamNamespace,
        cache_id: CacheId,
        core_id: Option<CoreId>,
    ) -> CasResult<String> {
        let mut cmd = Self::cmd()
            .arg("--get-param")
            .opt("--name", namespace.as_ref())
            .opt("--cache-id", cache_id);
        if let Some(core_id) = core_id {
            cmd = cmd.opt("--core-id", core_id);
        }
        self.run(&cmd.opt("--output-format", "csv"))
    }

    pub fn io_class_load_config(&self, cache_id: CacheId, file: &Path) -> CasResult<()> {
        self.run(
            &Self::cmd()
                .arg("--io-class")
                .arg("--load-config")
                .opt("--cache-id", cache_id)
                .path_opt("--file", file),
        )
        .map(|_| ())
    }

    pub fn zero_metadata(&self, device: &Path, force: bool) -> CasResult<()> {
        self.run(
            &Self::cmd()
                .arg("--zero-metadata")
                .path_opt("--device", device)
                .flag_if("--force", force),
        )
        .map(|_| ())
    }
}

/// Parse the CSV output of --version into (component, version) pairs.
/// The header line is skipped and records which are not pairs are ignored.
pub fn parse_version(output: &str) -> CasResult<Vec<(String, String)>> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(output.as_bytes());

    let mut versions = Vec::new();
    for record in reader.records() {
        let record = record?;
        if let (2, Some(component), Some(version)) = (record.len(), record.get(0), record.get(1)) {
            versions.push((component.to_string(), version.to_string()));
        }
    }
    Ok(versions)
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use crate::engine::tests::FakeExecutor;

    use super::*;

    fn last_cmd(executor: &FakeExecutor) -> String {
        executor
            .calls()
            .last()
            .map(|c| c.to_string())
            .unwrap_or_default()
    }

    #[test]
    /// A loaded cache is started with the device only.
    fn test_start_cache_arguments() {
        let executor = FakeExecutor::succeeding();
        let casadm = Casadm::new(&executor);
        let dev = PathBuf::from("/dev/sda");

        casadm.start_cache(&dev, StartCache::Load).unwrap();
        assert_eq!(
            last_cmd(&executor),
            "casadm --start-cache --cache-device /dev/sda --load"
        );

        casadm
            .start_cache(
                &dev,
                StartCache::New {
                    cache_id: CacheId::new(3).unwrap(),
                    cache_mode: CacheMode::Wb,
                    cache_line_size: Some(CacheLineSize::Kib16),
                    force: true,
                },
            )
            .unwrap();
        assert_eq!(
            last_cmd(&executor),
            "casadm --start-cache --cache-device /dev/sda --cache-id 3 --cache-mode wb \
             --cache-line-size 16 --force"
        );
    }

    #[test]
    fn test_core_arguments() {
        let executor = FakeExecutor::succeeding();
        let casadm = Casadm::new(&executor);
        let cache_id = CacheId::new(1).unwrap();
        let core_id = CoreId::new(0).unwrap();

        casadm
            .add_core(Path::new("/dev/sdb"), cache_id, Some(core_id), true)
            .unwrap();
        assert_eq!(
            last_cmd(&executor),
            "casadm --script --add-core --core-device /dev/sdb --cache-id 1 --core-id 0 --try-add"
        );

        casadm.detach_core(cache_id, core_id, false).unwrap();
        assert_eq!(
            last_cmd(&executor),
            "casadm --script --remove-core --cache-id 1 --core-id 0 --detach --no-flush"
        );

        casadm.stop_cache(cache_id, true).unwrap();
        assert_eq!(last_cmd(&executor), "casadm --stop-cache --cache-id 1");
    }

    #[test]
    fn test_standby_and_param_arguments() {
        let executor = FakeExecutor::succeeding();
        let casadm = Casadm::new(&executor);
        let cache_id = CacheId::new(5).unwrap();

        casadm
            .standby_init(Path::new("/dev/nvme0n1"), cache_id, CacheLineSize::Kib32, false)
            .unwrap();
        assert_eq!(
            last_cmd(&executor),
            "casadm --standby --init --cache-device /dev/nvme0n1 --cache-id 5 --cache-line-size 32"
        );

        casadm
            .set_param(
                ParamNamespace::CleaningAlru,
                cache_id,
                None,
                &[("wake_up", "20".to_string())],
            )
            .unwrap();
        assert_eq!(
            last_cmd(&executor),
            "casadm --set-param --name cleaning-alru --cache-id 5 --wake-up 20"
        );
    }

    #[test]
    fn test_cache_device_and_metadata_arguments() {
        let executor = FakeExecutor::succeeding();
        let casadm = Casadm::new(&executor);
        let dev = Path::new("/dev/nvme0n1");

        casadm.check_cache_device(dev).unwrap();
        assert_eq!(
            last_cmd(&executor),
            "casadm --script --check-cache-device --cache-device /dev/nvme0n1"
        );

        casadm.zero_metadata(dev, true).unwrap();
        assert_eq!(
            last_cmd(&executor),
            "casadm --zero-metadata --device /dev/nvme0n1 --force"
        );

        casadm
            .remove_core(CacheId::new(2).unwrap(), CoreId::new(7).unwrap(), false)
            .unwrap();
        assert_eq!(
            last_cmd(&executor),
            "casadm --remove-core --cache-id 2 --core-id 7"
        );
    }

    #[test]
    fn test_standby_transitions_and_get_param() {
        let executor = FakeExecutor::succeeding();
        let casadm = Casadm::new(&executor);
        let cache_id = CacheId::new(5).unwrap();

        casadm.standby_detach(cache_id).unwrap();
        assert_eq!(
            last_cmd(&executor),
            "casadm --standby --detach --cache-id 5"
        );

        casadm
            .standby_activate(Path::new("/dev/nvme1n1"), cache_id)
            .unwrap();
        assert_eq!(
            last_cmd(&executor),
            "casadm --standby --activate --cache-device /dev/nvme1n1 --cache-id 5"
        );

        casadm
            .get_param(
                ParamNamespace::SeqCutoff,
                cache_id,
                Some(CoreId::new(1).unwrap()),
            )
            .unwrap();
        assert_eq!(
            last_cmd(&executor),
            "casadm --get-param --name seq-cutoff --cache-id 5 --core-id 1 --output-format csv"
        );
    }

    #[test]
    fn test_parse_version() {
        let output = "Name,Version\nCAS Cache Kernel Module,22.12.0.0844.master\n\
                      \"CAS CLI Utility, casadm\",22.12.0.0844.master\nbroken line\n";
        assert_eq!(
            parse_version(output).unwrap(),
            vec![
                (
                    "CAS Cache Kernel Module".to_string(),
                    "22.12.0.0844.master".to_string()
                ),
                (
                    "CAS CLI Utility, casadm".to_string(),
                    "22.12.0.0844.master".to_string()
                ),
            ]
        );
    }
}
