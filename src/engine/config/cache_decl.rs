// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use std::{
    fmt::Display,
    path::PathBuf,
    str::FromStr,
};

use crate::{
    casctl::{CasError, CasResult},
    engine::{
        cmd::Executor,
        config::{check_recursive, parse_lazy, split_params},
        devices::{check_block_device, check_device_empty},
        types::{CacheId, CacheLineSize, CacheMode, CleaningPolicy, FailoverState, PromotionPolicy},
    },
};

/// Optional parameters of a cache line. None means the parameter was not
/// given and the subsystem default applies.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct CacheParams {
    pub cache_line_size: Option<CacheLineSize>,
    pub cleaning_policy: Option<CleaningPolicy>,
    pub promotion_policy: Option<PromotionPolicy>,
    pub ioclass_file: Option<PathBuf>,
    pub lazy_startup: Option<bool>,
    pub target_failover_state: Option<FailoverState>,
}

fn parse_value<T>(value: &str, what: &str) -> CasResult<T>
where
    T: FromStr,
{
    value
        .parse::<T>()
        .map_err(|_| CasError::Invalid(format!("{value} is invalid {what}")))
}

impl CacheParams {
    fn set(&mut self, name: &str, value: &str) -> CasResult<()> {
        match name {
            "cache_line_size" => {
                self.cache_line_size = Some(parse_value(value, "cache line size")?);
            }
            "cleaning_policy" => {
                self.cleaning_policy = Some(parse_value(value, "cleaning policy name")?);
            }
            "promotion_policy" => {
                self.promotion_policy = Some(parse_value(value, "promotion policy name")?);
            }
            "ioclass_file" => self.ioclass_file = Some(PathBuf::from(value)),
            "lazy_startup" => self.lazy_startup = Some(parse_lazy(value)?),
            "target_failover_state" => {
                self.target_failover_state =
                    Some(parse_value(value, "target failover state")?);
            }
            _ => {
                return Err(CasError::Invalid(format!(
                    "{name} is invalid parameter name"
                )))
            }
        }
        Ok(())
    }

    /// The parameters in key=value form, in a fixed order.
    fn to_pairs(&self) -> Vec<String> {
        fn pair(name: &str, value: Option<impl Display>) -> Option<String> {
            value.map(|v| format!("{name}={v}"))
        }

        [
            pair("cache_line_size", self.cache_line_size),
            pair("cleaning_policy", self.cleaning_policy),
            pair("promotion_policy", self.promotion_policy),
            pair(
                "ioclass_file",
                self.ioclass_file.as_ref().map(|p| p.display()),
            ),
            pair("lazy_startup", self.lazy_startup),
            pair("target_failover_state", self.target_failover_state),
        ]
        .into_iter()
        .flatten()
        .collect()
    }
}

/// A cache as declared in the [caches] section of the configuration.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CacheDeclaration {
    pub cache_id: CacheId,
    pub device: PathBuf,
    pub cache_mode: CacheMode,
    pub params: CacheParams,
}

impl CacheDeclaration {
    /// Parse a line of the form
    /// `<cache id> <device> <cache mode> [<param>=<value>[,...]]`.
    ///
    /// If allow_incomplete is true the device is not required to exist.
    pub fn from_line(line: &str, allow_incomplete: bool) -> CasResult<CacheDeclaration> {
        let values = line.split_whitespace().collect::<Vec<_>>();
        if values.len() < 3 {
            return Err(CasError::Invalid(
                "Invalid cache configuration (too few columns)".into(),
            ));
        } else if values.len() > 4 {
            return Err(CasError::Invalid(
                "Invalid cache configuration (too many columns)".into(),
            ));
        }

        let cache_id = values[0].parse::<CacheId>()?;
        let device = PathBuf::from(values[1]);
        let cache_mode = values[2]
            .parse::<CacheMode>()
            .map_err(|_| CasError::Invalid(format!("Invalid cache mode {}", values[2])))?;

        let mut params = CacheParams::default();
        if let Some(field) = values.get(3) {
            for (name, value) in split_params(field, "cache")? {
                params.set(name, value)?;
            }
        }

        let decl = CacheDeclaration {
            cache_id,
            device,
            cache_mode,
            params,
        };
        decl.check_static(allow_incomplete)?;
        Ok(decl)
    }

    /// Checks which need nothing but the filesystem.
    fn check_static(&self, allow_incomplete: bool) -> CasResult<()> {
        check_recursive(self.cache_id, &self.device)?;
        if let Some(ref file) = self.params.ioclass_file {
            if !file.exists() {
                return Err(CasError::Invalid(format!(
                    "Invalid path to io_class file {}",
                    file.display()
                )));
            }
        }
        if !allow_incomplete {
            check_block_device(&self.device)?;
        }
        Ok(())
    }

    /// Validate the declaration against the devices on the system. Unless
    /// force is set, a device carrying partitions is rejected.
    pub fn validate_config(
        &self,
        executor: &dyn Executor,
        force: bool,
        allow_incomplete: bool,
    ) -> CasResult<()> {
        self.check_static(allow_incomplete)?;
        if !allow_incomplete && !force {
            check_device_empty(executor, &self.device)?;
        }
        Ok(())
    }

    /// The configuration line for this cache, without a line terminator.
    pub fn to_line(&self) -> String {
        let mut line = format!(
            "{}\t{}\t{}",
            self.cache_id,
            self.device.display(),
            self.cache_mode
        );
        let pairs = self.params.to_pairs();
        if !pairs.is_empty() {
            line.push('\t');
            line.push_str(&pairs.join(","));
        }
        line
    }

    pub fn is_lazy(&self) -> bool {
        self.params.lazy_startup.unwrap_or(false)
    }

    pub fn failover_state(&self) -> FailoverState {
        self.params.target_failover_state.unwrap_or_default()
    }
}
