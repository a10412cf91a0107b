// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use std::{
    fmt::{self, Display},
    str::FromStr,
};

use serde::{Serialize, Serializer};
use strum_macros::{AsRefStr, EnumString};

pub use crate::engine::types::actions::{DetachAction, EngineAction, StartAction};
use crate::casctl::{CasError, CasResult};

mod actions;

macro_rules! id {
    ($(#[$attr:meta])* $vis:vis $ident:ident, $min:expr, $max:expr, $what:expr) => {
        $(#[$attr])*
        #[derive(Copy, Clone, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize)]
        $vis struct $ident(u16);

        impl $ident {
            pub const MIN: u16 = $min;
            pub const MAX: u16 = $max;

            /// Return an error if id is outside the accepted range.
            pub fn new(id: u32) -> CasResult<Self> {
                match u16::try_from(id) {
                    Ok(id) if (Self::MIN..=Self::MAX).contains(&id) => Ok($ident(id)),
                    _ => Err(CasError::Invalid(format!("{} is invalid {}", id, $what))),
                }
            }

            pub fn as_u16(self) -> u16 {
                self.0
            }
        }

        impl FromStr for $ident {
            type Err = CasError;

            fn from_str(s: &str) -> CasResult<Self> {
                s.parse::<u32>()
                    .map_err(|_| CasError::Invalid(format!("{} is invalid {}", s, $what)))
                    .and_then($ident::new)
            }
        }

        impl Display for $ident {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                Display::fmt(&self.0, f)
            }
        }
    };
}

id!(
    /// Identifier of a cache instance.
    pub CacheId, 1, 16384, "cache id"
);

id!(
    /// Identifier of a core within its cache.
    pub CoreId, 0, 4095, "core id"
);

#[derive(AsRefStr, Clone, Copy, Debug, EnumString, Eq, Hash, PartialEq, Serialize)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum CacheMode {
    Wt,
    Wb,
    Wa,
    Pt,
    Wo,
}

/// Cache line size in KiB.
#[derive(AsRefStr, Clone, Copy, Debug, Default, EnumString, Eq, Hash, PartialEq)]
pub enum CacheLineSize {
    #[default]
    #[strum(serialize = "4")]
    Kib4,
    #[strum(serialize = "8")]
    Kib8,
    #[strum(serialize = "16")]
    Kib16,
    #[strum(serialize = "32")]
    Kib32,
    #[strum(serialize = "64")]
    Kib64,
}

#[derive(AsRefStr, Clone, Copy, Debug, EnumString, Eq, Hash, PartialEq)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum CleaningPolicy {
    Nop,
    Alru,
    Acp,
}

#[derive(AsRefStr, Clone, Copy, Debug, EnumString, Eq, Hash, PartialEq)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum PromotionPolicy {
    Always,
    Nhit,
}

/// The replication role a cache should take when it is brought up.
#[derive(AsRefStr, Clone, Copy, Debug, Default, EnumString, Eq, Hash, PartialEq)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum FailoverState {
    #[default]
    Active,
    Standby,
}

macro_rules! display_as_ref {
    ($($ident:ident),*) => {
        $(
            impl Display for $ident {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    f.write_str(self.as_ref())
                }
            }
        )*
    };
}

display_as_ref!(
    CacheMode,
    CacheLineSize,
    CleaningPolicy,
    PromotionPolicy,
    FailoverState
);

/// Status of a cache as reported by the listing command.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum CacheStatus {
    Running,
    Incomplete,
    Standby,
    StandbyDetached,
    Stopping,
    Initializing,
    Flushing,
    NotRunning,
    Unknown(String),
}

impl From<&str> for CacheStatus {
    fn from(s: &str) -> Self {
        match s.trim() {
            "Running" => CacheStatus::Running,
            "Incomplete" => CacheStatus::Incomplete,
            "Standby" => CacheStatus::Standby,
            "Standby detached" => CacheStatus::StandbyDetached,
            "Stopping" => CacheStatus::Stopping,
            "Initializing" => CacheStatus::Initializing,
            "Not running" => CacheStatus::NotRunning,
            s if s.starts_with("Flushing") => CacheStatus::Flushing,
            s => CacheStatus::Unknown(s.to_string()),
        }
    }
}

impl Display for CacheStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheStatus::Running => write!(f, "Running"),
            CacheStatus::Incomplete => write!(f, "Incomplete"),
            CacheStatus::Standby => write!(f, "Standby"),
            CacheStatus::StandbyDetached => write!(f, "Standby detached"),
            CacheStatus::Stopping => write!(f, "Stopping"),
            CacheStatus::Initializing => write!(f, "Initializing"),
            CacheStatus::Flushing => write!(f, "Flushing"),
            CacheStatus::NotRunning => write!(f, "Not running"),
            CacheStatus::Unknown(s) => write!(f, "{s}"),
        }
    }
}

/// Status of a core as reported by the listing command.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum CoreStatus {
    Active,
    Inactive,
    Detached,
    Flushing,
    Unknown(String),
}

impl From<&str> for CoreStatus {
    fn from(s: &str) -> Self {
        match s.trim() {
            "Active" => CoreStatus::Active,
            "Inactive" => CoreStatus::Inactive,
            "Detached" => CoreStatus::Detached,
            s if s.starts_with("Flushing") => CoreStatus::Flushing,
            s => CoreStatus::Unknown(s.to_string()),
        }
    }
}

impl Display for CoreStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoreStatus::Active => write!(f, "Active"),
            CoreStatus::Inactive => write!(f, "Inactive"),
            CoreStatus::Detached => write!(f, "Detached"),
            CoreStatus::Flushing => write!(f, "Flushing"),
            CoreStatus::Unknown(s) => write!(f, "{s}"),
        }
    }
}

macro_rules! serialize_as_display {
    ($($ident:ident),*) => {
        $(
            impl Serialize for $ident {
                fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
                where
                    S: Serializer,
                {
                    serializer.collect_str(self)
                }
            }
        )*
    };
}

serialize_as_display!(CacheStatus, CoreStatus);
