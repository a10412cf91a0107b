// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use std::path::PathBuf;

use crate::{
    casctl::{CasError, CasResult},
    engine::{
        config::{check_recursive, parse_lazy, split_params},
        devices::check_block_device,
        types::{CacheId, CoreId},
    },
};

/// A core as declared in the [cores] section of the configuration.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CoreDeclaration {
    pub cache_id: CacheId,
    pub core_id: CoreId,
    pub device: PathBuf,
    pub lazy_startup: Option<bool>,
}

impl CoreDeclaration {
    /// Parse a line of the form
    /// `<cache id> <core id> <device> [lazy_startup=<bool>]`.
    pub fn from_line(line: &str, allow_incomplete: bool) -> CasResult<CoreDeclaration> {
        let values = line.split_whitespace().collect::<Vec<_>>();
        if values.len() > 4 {
            return Err(CasError::Invalid(
                "Invalid core configuration (too many columns)".into(),
            ));
        } else if values.len() < 3 {
            return Err(CasError::Invalid(
                "Invalid core configuration (too few columns)".into(),
            ));
        }

        let cache_id = values[0].parse::<CacheId>()?;
        let core_id = values[1].parse::<CoreId>()?;
        let device = PathBuf::from(values[2]);

        let mut lazy_startup = None;
        if let Some(field) = values.get(3) {
            let field = field.to_lowercase();
            for (name, value) in split_params(&field, "core")? {
                match name {
                    "lazy_startup" => {
                        lazy_startup = Some(parse_lazy(value).map_err(|_| {
                            CasError::Invalid(format!(
                                "{value} is invalid value for '{name}' core param"
                            ))
                        })?)
                    }
                    _ => {
                        return Err(CasError::Invalid(format!(
                            "'{name}' is invalid core param name"
                        )))
                    }
                }
            }
        }

        let decl = CoreDeclaration {
            cache_id,
            core_id,
            device,
            lazy_startup,
        };
        decl.validate_config(allow_incomplete)?;
        Ok(decl)
    }

    pub fn validate_config(&self, allow_incomplete: bool) -> CasResult<()> {
        check_recursive(self.cache_id, &self.device)?;
        if !allow_incomplete {
            check_block_device(&self.device)?;
        }
        Ok(())
    }

    /// The configuration line for this core, without a line terminator.
    pub fn to_line(&self) -> String {
        let mut line = format!(
            "{}\t{}\t{}",
            self.cache_id,
            self.core_id,
            self.device.display()
        );
        if let Some(lazy) = self.lazy_startup {
            line.push_str(&format!("\tlazy_startup={lazy}"));
        }
        line
    }

    pub fn is_lazy(&self) -> bool {
        self.lazy_startup.unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_core_lines() {
        let decl = CoreDeclaration::from_line("1 0 /dev/sdb", true).unwrap();
        assert_eq!(decl.core_id, CoreId::new(0).unwrap());
        assert!(!decl.is_lazy());
        assert_eq!(decl.to_line(), "1\t0\t/dev/sdb");

        let decl = CoreDeclaration::from_line("1 4095 /dev/sdc LAZY_STARTUP=TRUE", true).unwrap();
        assert!(decl.is_lazy());
        assert_eq!(
            CoreDeclaration::from_line(&decl.to_line(), true).unwrap(),
            decl
        );

        // A core may be stacked on the exported object of another cache.
        assert_matches!(CoreDeclaration::from_line("2 1 /dev/cas1-1", true), Ok(_));

        for line in [
            "1 1",
            "1 1 /dev/sdb lazy_startup=true extra",
            "1 4096 /dev/sdb",
            "0 1 /dev/sdb",
            "1 1 /dev/sdb cache_mode=wt",
            "1 1 /dev/sdb lazy_startup=maybe",
            "1 1 /dev/sdb lazy_startup=true,lazy_startup=false",
            "1 1 /dev/cas1-2",
        ] {
            assert_matches!(
                CoreDeclaration::from_line(line, true),
                Err(CasError::Invalid(_)),
                "{line} was accepted"
            );
        }
    }
}
