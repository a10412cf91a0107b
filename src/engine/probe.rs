// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Snapshots of the running caching subsystem, built from the CSV listing
//! printed by casadm. The listing is flat: each core row belongs to the
//! cache row most recently seen, except for the rows following the core
//! pool marker, which belong to no cache at all.

use std::{
    collections::{BTreeMap, HashMap},
    path::{Path, PathBuf},
};

use serde_json::{json, Value};

use crate::{
    casctl::{CasError, CasResult},
    engine::{
        casadm::Casadm,
        cmd::Executor,
        devices::resolve_path,
        engine::Prober,
        types::{CacheId, CacheStatus, CoreId, CoreStatus},
    },
};

/// One row of the listing.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum DeviceRow {
    Cache {
        id: CacheId,
        disk: PathBuf,
        status: CacheStatus,
    },
    Core {
        id: CoreId,
        disk: PathBuf,
        status: CoreStatus,
    },
    CorePoolMarker,
    CoreInPool {
        disk: PathBuf,
        status: CoreStatus,
    },
}

/// One record of the listing, by column name. The write policy and
/// exported object columns are not needed.
#[derive(Debug, Deserialize)]
struct ListingRecord {
    #[serde(rename = "type")]
    kind: String,
    id: String,
    disk: String,
    status: String,
}

impl ListingRecord {
    fn into_row(self, in_pool: &mut bool) -> CasResult<Option<DeviceRow>> {
        let row = match self.kind.as_str() {
            "cache" => {
                *in_pool = false;
                DeviceRow::Cache {
                    id: self.id.parse::<CacheId>()?,
                    disk: PathBuf::from(self.disk),
                    status: CacheStatus::from(self.status.as_str()),
                }
            }
            "core pool" => {
                *in_pool = true;
                DeviceRow::CorePoolMarker
            }
            "core" if *in_pool => DeviceRow::CoreInPool {
                disk: PathBuf::from(self.disk),
                status: CoreStatus::from(self.status.as_str()),
            },
            "core" => DeviceRow::Core {
                id: self.id.parse::<CoreId>()?,
                disk: PathBuf::from(self.disk),
                status: CoreStatus::from(self.status.as_str()),
            },
            kind => {
                debug!("Skipping cache listing row of unknown type \"{kind}\"");
                return Ok(None);
            }
        };
        Ok(Some(row))
    }
}

/// Parse the CSV listing into rows, in listing order. With nothing
/// running casadm prints a message instead of a header; output without a
/// type column is taken to list nothing.
pub fn parse_rows(output: &str) -> CasResult<Vec<DeviceRow>> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(output.as_bytes());

    if !reader.headers()?.iter().any(|name| name == "type") {
        debug!("No cache listing header in \"{}\"", output.trim());
        return Ok(Vec::new());
    }

    let mut rows = Vec::new();
    let mut in_pool = false;
    for record in reader.deserialize::<ListingRecord>() {
        if let Some(row) = record?.into_row(&mut in_pool)? {
            rows.push(row);
        }
    }
    Ok(rows)
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CacheEntry {
    pub device: PathBuf,
    pub status: CacheStatus,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CoreEntry {
    pub device: PathBuf,
    pub status: CoreStatus,
    /// The cache the core is attached to; None for core pool members.
    pub cache_id: Option<CacheId>,
}

/// What the subsystem reported at one instant. Never updated; a new
/// snapshot is taken instead.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct RuntimeDeviceState {
    /// Detached cores, keyed by resolved device path.
    pub core_pool: HashMap<PathBuf, CoreEntry>,
    pub caches: BTreeMap<CacheId, CacheEntry>,
    pub cores: BTreeMap<(CacheId, CoreId), CoreEntry>,
}

impl RuntimeDeviceState {
    pub fn from_rows(rows: Vec<DeviceRow>) -> RuntimeDeviceState {
        let mut state = RuntimeDeviceState::default();
        let mut current_cache = None;

        for row in rows {
            match row {
                DeviceRow::Cache { id, disk, status } => {
                    current_cache = Some(id);
                    state.caches.insert(
                        id,
                        CacheEntry {
                            device: disk,
                            status,
                        },
                    );
                }
                DeviceRow::CorePoolMarker => current_cache = None,
                DeviceRow::Core { id, disk, status } => match current_cache {
                    Some(cache_id) => {
                        state.cores.insert(
                            (cache_id, id),
                            CoreEntry {
                                device: disk,
                                status,
                                cache_id: Some(cache_id),
                            },
                        );
                    }
                    None => warn!(
                        "Core {} listed before any cache; ignoring it",
                        disk.display()
                    ),
                },
                DeviceRow::CoreInPool { disk, status } => {
                    state.core_pool.insert(
                        resolve_path(&disk),
                        CoreEntry {
                            device: disk,
                            status,
                            cache_id: None,
                        },
                    );
                }
            }
        }
        state
    }

    pub fn from_listing(output: &str) -> CasResult<RuntimeDeviceState> {
        Ok(RuntimeDeviceState::from_rows(parse_rows(output)?))
    }

    pub fn has_cache(&self, cache_id: CacheId) -> bool {
        self.caches.contains_key(&cache_id)
    }

    pub fn has_core(&self, cache_id: CacheId, core_id: CoreId) -> bool {
        self.cores.contains_key(&(cache_id, core_id))
    }

    /// The core pool member backed by the device at path, if any.
    pub fn pooled_core(&self, path: &Path) -> Option<&CoreEntry> {
        self.core_pool.get(&resolve_path(path))
    }

    pub fn to_json(&self) -> Value {
        json!({
            "caches": self.caches.iter().map(|(id, cache)| json!({
                "id": id,
                "device": cache.device,
                "status": cache.status,
            })).collect::<Vec<_>>(),
            "cores": self.cores.iter().map(|((cache_id, core_id), core)| json!({
                "cache_id": cache_id,
                "core_id": core_id,
                "device": core.device,
                "status": core.status,
            })).collect::<Vec<_>>(),
            "core_pool": self.core_pool.values().map(|core| json!({
                "device": core.device,
                "status": core.status,
            })).collect::<Vec<_>>(),
        })
    }
}

/// Takes snapshots by listing caches with casadm.
pub struct CasadmProber<'a> {
    casadm: Casadm<'a>,
}

impl<'a> CasadmProber<'a> {
    pub fn new(executor: &'a dyn Executor) -> Self {
        CasadmProber {
            casadm: Casadm::new(executor),
        }
    }
}

impl Prober for CasadmProber<'_> {
    fn probe(&self) -> CasResult<RuntimeDeviceState> {
        let output = self
            .casadm
            .list_caches()
            .map_err(|err| CasError::Chained("Unable to list caches".into(), Box::new(err)))?;
        let state = RuntimeDeviceState::from_listing(&output)?;
        debug!(
            "Found {} caches, {} attached cores and {} cores in the core pool",
            state.caches.len(),
            state.cores.len(),
            state.core_pool.len()
        );
        Ok(state)
    }
}

pub fn is_cache_started(prober: &dyn Prober, cache_id: CacheId) -> CasResult<bool> {
    Ok(prober.probe()?.has_cache(cache_id))
}

pub fn is_core_added(prober: &dyn Prober, cache_id: CacheId, core_id: CoreId) -> CasResult<bool> {
    Ok(prober.probe()?.has_core(cache_id, core_id))
}
