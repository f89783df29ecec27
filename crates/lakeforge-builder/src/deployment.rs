// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Deployment units and the plan that orders them.
//!
//! A unit is an independently provisioned group of resources. Units declare
//! which other units they depend on; the plan sorts them so that every unit is
//! materialized after all of its dependencies, then materializes each unit's
//! resources in list order. A unit may only resolve handles produced by itself
//! or by a unit it depends on, directly or transitively.

use crate::cache::{PlatformHandle, ResolutionCache, ResolutionError};
use crate::error::{BuildError, Result};
use crate::resource::{Resource, ResourceKind};
use lakeforge_dsl::{Name, Tags};
use serde::Serialize;
use serde_json::{Value, json};
use sha2::{Digest, Sha256};
use std::collections::{BTreeSet, HashMap, VecDeque};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlanError {
    #[error("deployment unit '{unit}' is declared twice")]
    DuplicateUnit { unit: String },

    #[error("deployment unit '{unit}' depends on unknown unit '{dependency}'")]
    UnknownDependency { unit: String, dependency: String },

    #[error("deployment units depend on each other in a cycle: {}", units.join(", "))]
    Cycle { units: Vec<String> },
}

// ============================================================================
// Manifest
// ============================================================================

/// One materialized resource, as written to a unit manifest.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ManifestEntry {
    pub logical_id: String,
    #[serde(rename = "Type")]
    pub resource_type: &'static str,
    #[serde(skip)]
    pub kind: ResourceKind,
    pub arn: String,
    pub properties: Value,
    #[serde(skip_serializing_if = "Tags::is_empty")]
    pub tags: Tags,
}

impl ManifestEntry {
    pub fn new(name: &Name, kind: ResourceKind, arn: impl Into<String>, properties: Value) -> Self {
        Self {
            logical_id: name.value(),
            resource_type: kind.resource_type(),
            kind,
            arn: arn.into(),
            properties,
            tags: Tags::new(),
        }
    }

    pub fn with_tags(mut self, tags: &Tags) -> Self {
        self.tags = tags.clone();
        self
    }
}

/// Serialized form of a materialized unit.
#[derive(Debug, Clone, Serialize)]
pub struct UnitManifest {
    pub unit: String,
    pub depends_on: Vec<String>,
    pub resources: Vec<ManifestEntry>,
    /// SHA-256 of the canonical JSON of the fields above.
    pub fingerprint: String,
}

// ============================================================================
// Units
// ============================================================================

/// A unit being (or having been) materialized.
#[derive(Debug)]
pub struct DeploymentUnit {
    name: String,
    depends_on: Vec<String>,
    visible: BTreeSet<String>,
    entries: Vec<ManifestEntry>,
}

impl DeploymentUnit {
    /// A unit that can see only its own handles.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            visible: BTreeSet::from([name.clone()]),
            name,
            depends_on: Vec::new(),
            entries: Vec::new(),
        }
    }

    fn with_dependencies(
        name: &str,
        depends_on: &[String],
        visible: BTreeSet<String>,
    ) -> Self {
        Self {
            name: name.to_string(),
            depends_on: depends_on.to_vec(),
            visible,
            entries: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn depends_on(&self) -> &[String] {
        &self.depends_on
    }

    pub fn entries(&self) -> &[ManifestEntry] {
        &self.entries
    }

    /// Find the entry for a rendered resource name.
    pub fn entry(&self, logical_id: &str) -> Option<&ManifestEntry> {
        self.entries.iter().find(|e| e.logical_id == logical_id)
    }

    /// Whether handles produced by `unit` may be resolved from this unit.
    pub fn can_see(&self, unit: &str) -> bool {
        self.visible.contains(unit)
    }

    /// Look up a handle this unit is allowed to reference.
    pub fn resolve(
        &self,
        cache: &ResolutionCache,
        name: &str,
        expected: ResourceKind,
    ) -> std::result::Result<PlatformHandle, ResolutionError> {
        let handle = cache.get(name)?;
        if !self.can_see(&handle.unit) {
            return Err(ResolutionError::NotVisible {
                name: name.to_string(),
                consumer: self.name.clone(),
                producer: handle.unit.clone(),
            });
        }
        if handle.kind != expected {
            return Err(ResolutionError::WrongKind {
                name: name.to_string(),
                actual: handle.kind,
                expected,
            });
        }
        Ok(handle.clone())
    }

    /// Register a materialized resource and record its manifest entry.
    pub fn emit(
        &mut self,
        cache: &mut ResolutionCache,
        entry: ManifestEntry,
    ) -> std::result::Result<(), ResolutionError> {
        cache.put(
            entry.logical_id.clone(),
            PlatformHandle {
                kind: entry.kind,
                arn: entry.arn.clone(),
                unit: self.name.clone(),
            },
        )?;
        debug!(unit = %self.name, resource = %entry.logical_id, kind = %entry.kind, "Materialized resource");
        self.entries.push(entry);
        Ok(())
    }

    /// Manifest with its fingerprint.
    pub fn manifest(&self) -> Result<UnitManifest> {
        let canonical = json!({
            "unit": self.name,
            "depends_on": self.depends_on,
            "resources": self.entries,
        });
        let bytes = serde_json::to_vec(&canonical).map_err(|source| BuildError::Serialize {
            what: format!("manifest of unit '{}'", self.name),
            source,
        })?;

        let mut hasher = Sha256::new();
        hasher.update(&bytes);
        let fingerprint = format!("{:x}", hasher.finalize());

        Ok(UnitManifest {
            unit: self.name.clone(),
            depends_on: self.depends_on.clone(),
            resources: self.entries.clone(),
            fingerprint,
        })
    }
}

// ============================================================================
// Plan
// ============================================================================

struct PlannedUnit {
    name: String,
    depends_on: Vec<String>,
    resources: Vec<Box<dyn Resource>>,
}

/// Units with their declared dependencies, in declaration order.
#[derive(Default)]
pub struct DeploymentPlan {
    units: Vec<PlannedUnit>,
}

impl DeploymentPlan {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a unit. Dependencies may name units declared later.
    pub fn add_unit(
        &mut self,
        name: impl Into<String>,
        depends_on: &[String],
        resources: Vec<Box<dyn Resource>>,
    ) -> std::result::Result<(), PlanError> {
        let name = name.into();
        if self.units.iter().any(|u| u.name == name) {
            return Err(PlanError::DuplicateUnit { unit: name });
        }

        let mut deps: Vec<String> = Vec::with_capacity(depends_on.len());
        for dep in depends_on {
            if !deps.contains(dep) {
                deps.push(dep.clone());
            }
        }

        self.units.push(PlannedUnit {
            name,
            depends_on: deps,
            resources,
        });
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// Unit names in materialization order.
    ///
    /// Kahn's algorithm; among units that are ready at the same time, the one
    /// declared first goes first.
    pub fn order(&self) -> std::result::Result<Vec<String>, PlanError> {
        Ok(self
            .sorted_indices()?
            .into_iter()
            .map(|i| self.units[i].name.clone())
            .collect())
    }

    fn sorted_indices(&self) -> std::result::Result<Vec<usize>, PlanError> {
        let index: HashMap<&str, usize> = self
            .units
            .iter()
            .enumerate()
            .map(|(i, u)| (u.name.as_str(), i))
            .collect();

        let mut in_degree = vec![0usize; self.units.len()];
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); self.units.len()];
        for (i, unit) in self.units.iter().enumerate() {
            for dep in &unit.depends_on {
                let &d = index
                    .get(dep.as_str())
                    .ok_or_else(|| PlanError::UnknownDependency {
                        unit: unit.name.clone(),
                        dependency: dep.clone(),
                    })?;
                in_degree[i] += 1;
                dependents[d].push(i);
            }
        }

        let mut queue: VecDeque<usize> = (0..self.units.len())
            .filter(|&i| in_degree[i] == 0)
            .collect();
        let mut sorted = Vec::with_capacity(self.units.len());

        while let Some(i) = queue.pop_front() {
            sorted.push(i);
            for &next in &dependents[i] {
                in_degree[next] -= 1;
                if in_degree[next] == 0 {
                    queue.push_back(next);
                }
            }
        }

        if sorted.len() != self.units.len() {
            let units = (0..self.units.len())
                .filter(|i| !sorted.contains(i))
                .map(|i| self.units[i].name.clone())
                .collect();
            return Err(PlanError::Cycle { units });
        }

        Ok(sorted)
    }

    /// Materialize every unit in dependency order.
    ///
    /// Stops at the first failure; units after the failing one are not
    /// touched.
    pub fn materialize(self, cache: &mut ResolutionCache) -> Result<Vec<DeploymentUnit>> {
        let order = self.sorted_indices()?;
        let mut slots: Vec<Option<PlannedUnit>> = self.units.into_iter().map(Some).collect();
        let mut visibility: HashMap<String, BTreeSet<String>> = HashMap::new();
        let mut built = Vec::with_capacity(order.len());

        for i in order {
            let Some(planned) = slots[i].take() else {
                continue;
            };

            let mut visible = BTreeSet::from([planned.name.clone()]);
            for dep in &planned.depends_on {
                if let Some(inherited) = visibility.get(dep) {
                    visible.extend(inherited.iter().cloned());
                }
            }
            visibility.insert(planned.name.clone(), visible.clone());

            let mut unit =
                DeploymentUnit::with_dependencies(&planned.name, &planned.depends_on, visible);
            for resource in &planned.resources {
                resource.materialize(&mut unit, cache)?;
            }

            info!(
                unit = %unit.name,
                resources = unit.entries.len(),
                depends_on = ?unit.depends_on,
                "Materialized deployment unit"
            );
            built.push(unit);
        }

        Ok(built)
    }
}
