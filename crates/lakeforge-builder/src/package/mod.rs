// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Lake compilation.
//!
//! [`compile_lake`] builds the shared datalake package, discovers and builds
//! every pipeline, then materializes everything as three tiers of deployment
//! units:
//!
//! ```text
//! lake-storage-stack-{env}            buckets
//!   └─ lake-shared-stack-{env}        topic, roles, databases, crawlers, network
//!        └─ lake-{pipeline}-stack-{env}   one per pipeline
//! ```

pub mod datalake;
pub mod pipeline;

pub use datalake::DatalakePackage;
pub use pipeline::PipelinePackage;

use crate::cache::ResolutionCache;
use crate::deployment::{DeploymentPlan, DeploymentUnit};
use crate::error::{BuildError, Result};
use crate::graph::StateMachineDefinition;
use crate::settings::{LakeDefinition, Settings};
use lakeforge_dsl::schema::Properties;
use lakeforge_dsl::{Environment, Name, PipelineConfig};
use serde::Serialize;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Label of the unit holding the storage buckets.
pub const STORAGE_UNIT: &str = "lake-storage-stack";

/// Label of the unit holding every other lake-wide resource.
pub const SHARED_UNIT: &str = "lake-shared-stack";

/// File that marks a directory as a pipeline.
pub const PIPELINE_CONFIG_FILE: &str = "config.yml";

/// Graph definition of one compiled pipeline.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineDefinition {
    pub pipeline: String,
    pub unit: String,
    pub definition: StateMachineDefinition,
}

/// Result of a compilation run.
#[derive(Debug)]
pub struct CompiledLake {
    /// Units in materialization order.
    pub units: Vec<DeploymentUnit>,
    /// Pipelines in discovery order.
    pub definitions: Vec<PipelineDefinition>,
}

impl CompiledLake {
    pub fn unit(&self, name: &str) -> Option<&DeploymentUnit> {
        self.units.iter().find(|u| u.name() == name)
    }

    /// Write one manifest per unit (prefixed with its position in the
    /// materialization order) and one graph definition per pipeline.
    pub fn write_outputs(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        fs::create_dir_all(dir).map_err(|e| BuildError::io(dir, e))?;
        let mut written = Vec::with_capacity(self.units.len() + self.definitions.len());

        for (i, unit) in self.units.iter().enumerate() {
            let path = dir.join(format!("{:02}-{}.manifest.json", i + 1, unit.name()));
            write_json(&path, &unit.manifest()?, &format!("manifest of unit '{}'", unit.name()))?;
            written.push(path);
        }

        for pipeline in &self.definitions {
            let path = dir.join(format!("{}.definition.json", pipeline.pipeline));
            write_json(
                &path,
                &pipeline.definition,
                &format!("definition of pipeline '{}'", pipeline.pipeline),
            )?;
            written.push(path);
        }

        info!(dir = %dir.display(), files = written.len(), "Wrote compilation outputs");
        Ok(written)
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T, what: &str) -> Result<()> {
    let mut text = serde_json::to_string_pretty(value).map_err(|source| BuildError::Serialize {
        what: what.to_string(),
        source,
    })?;
    text.push('\n');
    fs::write(path, text).map_err(|e| BuildError::io(path, e))
}

/// Compile a whole lake.
///
/// Every descriptor is built and validated before the first unit is
/// materialized, so a malformed pipeline fails the run without producing any
/// unit.
pub fn compile_lake(settings: &Settings, lake: &LakeDefinition) -> Result<CompiledLake> {
    let env = settings.environment;
    let mut datalake = DatalakePackage::build(settings, lake)?;

    let mut pipelines = Vec::new();
    for dir in discover_pipelines(&lake.pipelines_path)? {
        let config = load_pipeline(env, &dir)?;
        pipelines.push(PipelinePackage::build(&datalake, config, &dir)?);
    }

    let storage_unit = Name::new(STORAGE_UNIT, env).value();
    let shared_unit = Name::new(SHARED_UNIT, env).value();
    let (storage, shared) = datalake.take_resources();

    let mut plan = DeploymentPlan::new();
    plan.add_unit(storage_unit.clone(), &[], storage)?;
    plan.add_unit(shared_unit.clone(), &[storage_unit], shared)?;

    let mut definitions = Vec::with_capacity(pipelines.len());
    for package in pipelines {
        let pipeline = package.config().name.value();
        let (unit, resources, definition) = package.into_parts();
        plan.add_unit(unit.clone(), std::slice::from_ref(&shared_unit), resources)?;
        definitions.push(PipelineDefinition {
            pipeline,
            unit,
            definition,
        });
    }

    let mut cache = ResolutionCache::new();
    let units = plan.materialize(&mut cache)?;

    info!(
        lake = %lake.name,
        units = units.len(),
        pipelines = definitions.len(),
        handles = cache.len(),
        "Compiled lake"
    );

    Ok(CompiledLake { units, definitions })
}

/// Subdirectories of `path` that hold a pipeline configuration, sorted by
/// path. A missing pipelines directory yields no pipelines.
pub fn discover_pipelines(path: &Path) -> Result<Vec<PathBuf>> {
    if !path.is_dir() {
        warn!(path = %path.display(), "Pipelines directory not found, compiling lake without pipelines");
        return Ok(Vec::new());
    }

    let mut dirs = Vec::new();
    for entry in fs::read_dir(path).map_err(|e| BuildError::io(path, e))? {
        let entry = entry.map_err(|e| BuildError::io(path, e))?;
        let dir = entry.path();
        if dir.is_dir() && dir.join(PIPELINE_CONFIG_FILE).is_file() {
            dirs.push(dir);
        }
    }
    dirs.sort();
    Ok(dirs)
}

/// Read `dir/config.yml`.
pub fn load_pipeline(env: Environment, dir: &Path) -> Result<PipelineConfig> {
    let path = dir.join(PIPELINE_CONFIG_FILE);
    let text = fs::read_to_string(&path).map_err(|e| BuildError::io(&path, e))?;
    PipelineConfig::from_yaml_str(env, &text).map_err(|source| BuildError::Config { path, source })
}

pub(crate) fn props(value: Value) -> Properties {
    match value {
        Value::Object(map) => map,
        _ => Properties::new(),
    }
}
