// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Block device paths: resolution, type checks, and the naming scheme of
//! exported objects.

use std::{
    path::{self, Path, PathBuf},
    sync::LazyLock,
};

use nix::sys::stat::{stat, SFlag};
use regex::Regex;

use crate::{
    casctl::{CasError, CasResult},
    engine::{
        cmd::{lsblk_names, Executor},
        types::{CacheId, CoreId},
    },
};

pub const EXP_OBJ_PREFIX: &str = "/dev/cas";

/// Path of the control device created when the kernel module is loaded.
pub const CAS_CTRL_PATH: &str = "/dev/cas_ctrl";

// Matches the name of an exported object anywhere in a path.
static EXP_OBJ_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"cas\d+-\d+").expect("regex is valid"));

// Matches an exported object node or one of its partitions.
static EXP_OBJ_PATH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^/dev/cas(?P<cache>\d+)-(?P<core>\d+)(?:p\d+)?$").expect("regex is valid")
});

/// The block device exposed for the given core.
pub fn exported_object_path(cache_id: CacheId, core_id: CoreId) -> PathBuf {
    PathBuf::from(format!("{EXP_OBJ_PREFIX}{cache_id}-{core_id}"))
}

pub fn is_exported_object_name(path: &Path) -> bool {
    EXP_OBJ_NAME.is_match(&path.to_string_lossy())
}

/// If the path is an exported object, or a partition of one, return the
/// raw cache and core ids it was exported for. The ids are not range
/// checked.
pub fn parse_exported_object(path: &Path) -> Option<(u32, u32)> {
    let path = path.to_string_lossy();
    let captures = EXP_OBJ_PATH.captures(&path)?;
    Some((
        captures["cache"].parse::<u32>().ok()?,
        captures["core"].parse::<u32>().ok()?,
    ))
}

/// The exported object a device path refers to. The literal path is tried
/// first, then its resolved form, so that by-id links to exported objects
/// are recognized.
pub fn backing_exported_object(path: &Path) -> Option<(CacheId, CoreId)> {
    parse_exported_object(path)
        .or_else(|| parse_exported_object(&resolve_path(path)))
        .and_then(|(cache, core)| Some((CacheId::new(cache).ok()?, CoreId::new(core).ok()?)))
}

/// Resolve symlinks in the path. If the path can not be resolved, e.g.,
/// because the device has not appeared yet, return the path unchanged.
pub fn resolve_path(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| path.to_owned())
}

/// True if both paths name the same device once symlinks are resolved.
pub fn same_device(left: &Path, right: &Path) -> bool {
    resolve_path(left) == resolve_path(right)
}

/// Make a declared path absolute if it refers to something that exists or
/// to an exported object which may appear later. Any other path is kept as
/// written.
pub fn normalize_device_path(path: &Path) -> PathBuf {
    if path.exists() || is_exported_object_name(path) {
        path::absolute(path).unwrap_or_else(|_| path.to_owned())
    } else {
        path.to_owned()
    }
}

/// Return an error unless the path is a block device. Exported objects that
/// do not exist yet are let through; they appear only once their cache is
/// started.
pub fn check_block_device(path: &Path) -> CasResult<()> {
    if !path.exists() && path.to_string_lossy().starts_with(EXP_OBJ_PREFIX) {
        return Ok(());
    }

    let st = stat(path).map_err(|err| {
        CasError::Chained(
            format!("{} not found", path.display()),
            Box::new(CasError::Nix(err)),
        )
    })?;

    if SFlag::from_bits_truncate(st.st_mode) & SFlag::S_IFMT == SFlag::S_IFBLK {
        Ok(())
    } else {
        Err(CasError::Invalid(format!(
            "{} is not block device",
            path.display()
        )))
    }
}

/// Return an error if the device carries partitions. A device which lsblk
/// can not probe is let through; it is most likely an atomic device.
pub fn check_device_empty(executor: &dyn Executor, path: &Path) -> CasResult<()> {
    match lsblk_names(executor, path) {
        Ok(names) if names.len() > 1 => Err(CasError::Invalid(format!(
            "Partitions found on device {}. Use force option to ignore",
            path.display()
        ))),
        Ok(_) => Ok(()),
        Err(err) => {
            debug!(
                "Unable to probe {} for partitions, assuming none: {}",
                path.display(),
                err
            );
            Ok(())
        }
    }
}
