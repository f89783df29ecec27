// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Run-scoped registry of materialized resources.
//!
//! Every resource registers its handle under its rendered name when it is
//! materialized. Later resources, in the same deployment unit or in a unit
//! that depends on it, look the handle up by name. A name can be registered
//! once per run.

use crate::resource::ResourceKind;
use serde::Serialize;
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use thiserror::Error;
use tracing::trace;

/// A materialized resource, as seen by its consumers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlatformHandle {
    pub kind: ResourceKind,
    /// Platform identifier of the resource.
    pub arn: String,
    /// Deployment unit that produced the resource.
    pub unit: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolutionError {
    /// Lookup of a name nobody has registered (yet).
    #[error("'{name}' has not been materialized")]
    Missing { name: String },

    /// Second registration of the same name.
    #[error("'{name}' was already materialized by unit '{unit}'")]
    Duplicate { name: String, unit: String },

    /// The handle exists but belongs to a unit the consumer does not depend on.
    #[error(
        "unit '{consumer}' references '{name}' from unit '{producer}' without depending on it"
    )]
    NotVisible {
        name: String,
        consumer: String,
        producer: String,
    },

    /// The handle exists but is not the kind of resource the consumer needs.
    #[error("'{name}' is a {actual}, expected a {expected}")]
    WrongKind {
        name: String,
        actual: ResourceKind,
        expected: ResourceKind,
    },
}

/// Name to handle mapping shared by all deployment units of one run.
#[derive(Debug, Default)]
pub struct ResolutionCache {
    handles: HashMap<String, PlatformHandle>,
}

impl ResolutionCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handle` under `name`. Fails if the name is already taken.
    pub fn put(
        &mut self,
        name: impl Into<String>,
        handle: PlatformHandle,
    ) -> Result<(), ResolutionError> {
        match self.handles.entry(name.into()) {
            Entry::Occupied(existing) => Err(ResolutionError::Duplicate {
                name: existing.key().clone(),
                unit: existing.get().unit.clone(),
            }),
            Entry::Vacant(slot) => {
                trace!(name = %slot.key(), kind = %handle.kind, unit = %handle.unit, "Registered handle");
                slot.insert(handle);
                Ok(())
            }
        }
    }

    /// Handle previously registered under `name`.
    pub fn get(&self, name: &str) -> Result<&PlatformHandle, ResolutionError> {
        self.handles.get(name).ok_or_else(|| ResolutionError::Missing {
            name: name.to_string(),
        })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handles.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}
