// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The declared target state: which caches should run and which cores
//! should be attached to them. The configuration file looks like:
//!
//! ```text
//! version=19.3.0
//! [caches]
//! 1   /dev/disk/by-id/nvme-INTEL_SSD   wb   cleaning_policy=acp
//! [cores]
//! 1   1   /dev/disk/by-id/wwn-0x5000c500a   lazy_startup=true
//! ```

mod cache_decl;
mod core_decl;

use std::{
    collections::{btree_map, BTreeMap, HashSet},
    fmt, fs,
    io::Write,
    path::Path,
};

use tempfile::NamedTempFile;

pub use self::{
    cache_decl::{CacheDeclaration, CacheParams},
    core_decl::CoreDeclaration,
};
use crate::{
    casctl::{CasError, CasResult},
    engine::{
        cmd::Executor,
        devices::{normalize_device_path, parse_exported_object, same_device},
        types::CacheId,
    },
};

pub const DEFAULT_CONFIG_PATH: &str = "/etc/opencas/opencas.conf";

/// Split a comma separated list of key=value pairs. A key may occur only
/// once.
fn split_params<'a>(field: &'a str, kind: &str) -> CasResult<Vec<(&'a str, &'a str)>> {
    let mut seen = HashSet::new();
    field
        .split(',')
        .map(|param| match param.split('=').collect::<Vec<_>>().as_slice() {
            [name, value] => {
                if seen.insert(*name) {
                    Ok((*name, *value))
                } else {
                    Err(CasError::Invalid(format!(
                        "Invalid {kind} configuration (repeated parameter)"
                    )))
                }
            }
            _ => Err(CasError::Invalid(format!(
                "Invalid {kind} configuration (malformed parameter {param})"
            ))),
        })
        .collect()
}

fn parse_lazy(value: &str) -> CasResult<bool> {
    match value.to_lowercase().as_str() {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => Err(CasError::Invalid(format!(
            "{value} is invalid lazy_startup value"
        ))),
    }
}

/// Reject a device which is an exported object of the cache it is declared
/// for.
fn check_recursive(cache_id: CacheId, device: &Path) -> CasResult<()> {
    match parse_exported_object(device) {
        Some((device_cache_id, _)) if device_cache_id == u32::from(cache_id.as_u16()) => Err(
            CasError::Invalid("Recursive configuration detected".into()),
        ),
        _ => Ok(()),
    }
}

/// Prefix the line number to an error, keeping its kind.
fn at_line(err: CasError, line_no: usize) -> CasError {
    match err {
        CasError::Invalid(msg) => CasError::Invalid(format!("line {line_no}: {msg}")),
        CasError::Conflict(msg) => CasError::Conflict(format!("line {line_no}: {msg}")),
        CasError::AlreadyConfigured(msg) => {
            CasError::AlreadyConfigured(format!("line {line_no}: {msg}"))
        }
        err => CasError::Chained(format!("line {line_no}"), Box::new(err)),
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Section {
    None,
    Caches,
    Cores,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TargetConfiguration {
    version_tag: String,
    caches: BTreeMap<CacheId, CacheDeclaration>,
    cores: Vec<CoreDeclaration>,
}

impl TargetConfiguration {
    pub fn new(version_tag: &str) -> TargetConfiguration {
        TargetConfiguration {
            version_tag: version_tag.to_string(),
            caches: BTreeMap::new(),
            cores: Vec::new(),
        }
    }

    /// Read the configuration file at path. If allow_incomplete is true,
    /// declared devices need not exist.
    pub fn load_from(path: &Path, allow_incomplete: bool) -> CasResult<TargetConfiguration> {
        let contents = fs::read_to_string(path).map_err(|err| {
            CasError::Chained(
                format!("Couldn't open config file {}", path.display()),
                Box::new(CasError::Io(err)),
            )
        })?;
        TargetConfiguration::parse(&contents, allow_incomplete)
    }

    /// Parse the contents of a configuration file. Any invalid or
    /// conflicting line makes the whole configuration invalid.
    pub fn parse(contents: &str, allow_incomplete: bool) -> CasResult<TargetConfiguration> {
        let mut lines = contents.lines();

        let version_tag = match lines.next() {
            Some(line) if line.starts_with("version=") => line.trim_end(),
            _ => return Err(CasError::Invalid("No version tag found".into())),
        };

        let mut config = TargetConfiguration::new(version_tag);
        let mut section = Section::None;

        for (idx, line) in lines.enumerate() {
            let line_no = idx + 2;
            let line = line.split('#').next().unwrap_or_default().trim();
            if line.is_empty() {
                continue;
            }

            match (line, section) {
                ("[caches]", _) => section = Section::Caches,
                ("[cores]", _) => section = Section::Cores,
                (_, Section::Caches) => CacheDeclaration::from_line(line, allow_incomplete)
                    .and_then(|decl| config.insert_cache(decl))
                    .map_err(|err| at_line(err, line_no))?,
                (_, Section::Cores) => CoreDeclaration::from_line(line, allow_incomplete)
                    .and_then(|decl| config.insert_core(decl))
                    .map_err(|err| at_line(err, line_no))?,
                (_, Section::None) => {
                    warn!("Ignoring line {line_no} of configuration, which is outside of any section")
                }
            }
        }

        Ok(config)
    }

    /// Add a cache. Return Conflict if its id or device is already taken by
    /// a different declaration, AlreadyConfigured if the identical cache is
    /// already present.
    pub fn insert_cache(&mut self, mut decl: CacheDeclaration) -> CasResult<()> {
        if let Some(existing) = self.caches.get(&decl.cache_id) {
            return if same_device(&existing.device, &decl.device) {
                Err(CasError::AlreadyConfigured(format!(
                    "Cache {} already configured",
                    decl.cache_id
                )))
            } else {
                Err(CasError::Conflict(format!(
                    "Other cache device configured under id {}",
                    decl.cache_id
                )))
            };
        }

        if self
            .caches
            .values()
            .any(|cache| same_device(&cache.device, &decl.device))
        {
            return Err(CasError::Conflict(format!(
                "Device {} is already configured as a cache",
                decl.device.display()
            )));
        }

        if self
            .cores
            .iter()
            .any(|core| same_device(&core.device, &decl.device))
        {
            return Err(CasError::Conflict(format!(
                "Device {} is already configured as a core",
                decl.device.display()
            )));
        }

        decl.device = normalize_device_path(&decl.device);
        self.caches.insert(decl.cache_id, decl);
        Ok(())
    }

    /// Add a core. Its cache must already be declared.
    pub fn insert_core(&mut self, mut decl: CoreDeclaration) -> CasResult<()> {
        if !self.caches.contains_key(&decl.cache_id) {
            return Err(CasError::Invalid(format!(
                "Cache id {} doesn't exist",
                decl.cache_id
            )));
        }

        if self
            .caches
            .values()
            .any(|cache| same_device(&cache.device, &decl.device))
        {
            return Err(CasError::Conflict(format!(
                "Core device {} already configured as a cache",
                decl.device.display()
            )));
        }

        for core in &self.cores {
            let same = same_device(&core.device, &decl.device);
            if core.cache_id == decl.cache_id && core.core_id == decl.core_id {
                return if same {
                    Err(CasError::AlreadyConfigured(format!(
                        "Core {}-{} already configured",
                        decl.cache_id, decl.core_id
                    )))
                } else {
                    Err(CasError::Conflict(format!(
                        "Other core device configured under id {}-{}",
                        decl.cache_id, decl.core_id
                    )))
                };
            } else if same {
                return Err(CasError::Conflict(format!(
                    "Device {} is already configured as a core",
                    decl.device.display()
                )));
            }
        }

        decl.device = normalize_device_path(&decl.device);
        self.cores.push(decl);
        Ok(())
    }

    /// Check every cache against the devices present on the system. Unless
    /// force is set, partitioned cache devices are rejected.
    pub fn validate(&self, executor: &dyn Executor, force: bool) -> CasResult<()> {
        for cache in self.caches.values() {
            cache.validate_config(executor, force, false)?;
        }
        for core in &self.cores {
            core.validate_config(false)?;
        }
        Ok(())
    }

    /// Write the configuration to path, replacing any existing file.
    pub fn write(&self, path: &Path) -> CasResult<()> {
        let dir = match path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };
        let wrap = |err| {
            CasError::Chained(
                format!("Couldn't write config file {}", path.display()),
                Box::new(CasError::Io(err)),
            )
        };

        let mut file = NamedTempFile::new_in(dir).map_err(wrap)?;
        file.write_all(self.to_string().as_bytes())
            .and_then(|_| file.as_file().sync_all())
            .map_err(wrap)?;
        file.persist(path).map_err(|err| wrap(err.error))?;
        Ok(())
    }

    pub fn version_tag(&self) -> &str {
        &self.version_tag
    }

    pub fn caches(&self) -> btree_map::Values<'_, CacheId, CacheDeclaration> {
        self.caches.values()
    }

    pub fn cache(&self, cache_id: CacheId) -> Option<&CacheDeclaration> {
        self.caches.get(&cache_id)
    }

    pub fn cores(&self) -> &[CoreDeclaration] {
        &self.cores
    }

    pub fn is_empty(&self) -> bool {
        self.caches.is_empty() && self.cores.is_empty()
    }
}

impl fmt::Display for TargetConfiguration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.version_tag)?;
        writeln!(f, "# This config was automatically generated")?;
        writeln!(f, "[caches]")?;
        for cache in self.caches.values() {
            writeln!(f, "{}", cache.to_line())?;
        }
        writeln!(f)?;
        writeln!(f, "[cores]")?;
        for core in &self.cores {
            writeln!(f, "{}", core.to_line())?;
        }
        Ok(())
    }
}
