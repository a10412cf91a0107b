// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Contains types which encode the results of actions requested of the
//! caching subsystem. Each action type is designed to support idempotency.
//! In every case, the action type is used to indicate the effect of the
//! action at the time the action is requested. The action was completed
//! successfully; this type indicates what changes had to be made.

use std::fmt::{self, Display};

use crate::engine::types::{CacheId, CoreId};

/// A trait for a generic kind of action. Defines the type of the thing to
/// be changed, and also a method to indicate what changed.
pub trait EngineAction {
    type Return;

    /// Returns whether or not the action changed state.
    fn is_changed(&self) -> bool;

    /// Returns the thing or things changed.
    fn changed(self) -> Option<Self::Return>;
}

#[derive(Debug, PartialEq, Eq)]
/// Bringing up a cache or attaching a core.
pub enum StartAction<T> {
    /// The thing was already present.
    Identity,
    /// The thing was started.
    Started(T),
}

impl<T> EngineAction for StartAction<T> {
    type Return = T;

    fn is_changed(&self) -> bool {
        !matches!(*self, StartAction::Identity)
    }

    fn changed(self) -> Option<T> {
        match self {
            StartAction::Started(t) => Some(t),
            StartAction::Identity => None,
        }
    }
}

impl Display for StartAction<CacheId> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StartAction::Started(cache_id) => {
                write!(f, "Cache {cache_id} was started successfully")
            }
            StartAction::Identity => {
                write!(
                    f,
                    "The cache requested to be started is already present; no action taken"
                )
            }
        }
    }
}

impl Display for StartAction<(CacheId, CoreId)> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StartAction::Started((cache_id, core_id)) => {
                write!(
                    f,
                    "Core {core_id} was added to cache {cache_id} successfully"
                )
            }
            StartAction::Identity => {
                write!(
                    f,
                    "The core requested to be added is already active; no action taken"
                )
            }
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
/// Detaching one core and every core stacked on top of it.
pub enum DetachAction<T> {
    /// The core was not active; nothing was detached.
    Identity,
    /// The listed cores were detached, most dependent first.
    Detached(Vec<T>),
}

impl<T> EngineAction for DetachAction<T> {
    type Return = Vec<T>;

    fn is_changed(&self) -> bool {
        matches!(*self, DetachAction::Detached(_))
    }

    fn changed(self) -> Option<Vec<T>> {
        match self {
            DetachAction::Detached(t) => Some(t),
            DetachAction::Identity => None,
        }
    }
}

impl Display for DetachAction<(CacheId, CoreId)> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DetachAction::Detached(cores) => write!(
                f,
                "Cores {} were detached successfully",
                cores
                    .iter()
                    .map(|(cache_id, core_id)| format!("{cache_id}-{core_id}"))
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
            DetachAction::Identity => write!(
                f,
                "The core requested for detaching is not active; no action taken"
            ),
        }
    }
}
