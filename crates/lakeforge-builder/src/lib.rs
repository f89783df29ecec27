// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! lakeforge builder - compiles a lake into deployment manifests
//!
//! The builder turns a lake definition plus a directory of pipeline
//! configurations into deployment units (ordered resource manifests) and one
//! state-machine definition per pipeline.
//!
//! # Architecture
//!
//! ```text
//!     ┌─────────────┐      ┌─────────────┐      ┌─────────────┐
//!     │  lake.yml   │      │  Packages   │      │ Deployment  │
//!     │ config.yml  │─────▶│ (resource   │─────▶│    plan     │
//!     │  (per dir)  │      │ descriptors)│      │ (toposort)  │
//!     └─────────────┘      └─────────────┘      └─────────────┘
//!                                │                     │
//!                                ▼                     ▼
//!                         ┌─────────────┐      ┌─────────────┐
//!                         │ Step graph  │      │ Resolution  │
//!                         │ definition  │      │   cache     │
//!                         └─────────────┘      └─────────────┘
//! ```
//!
//! # Compilation
//!
//! 1. **Load**: read [`Settings`] from the environment and the
//!    [`LakeDefinition`] from `lake.yml`
//! 2. **Build**: validate every resource descriptor of the shared
//!    [`DatalakePackage`] and of each discovered [`PipelinePackage`]; pipeline
//!    steps are linked into a [`StepGraph`] first
//! 3. **Plan**: arrange the units storage → shared → pipelines and sort them
//! 4. **Materialize**: render each unit in order; references between
//!    resources go through the [`ResolutionCache`]
//!
//! # Usage
//!
//! ```ignore
//! use lakeforge_builder::{LakeDefinition, Settings, compile_lake};
//!
//! let settings = Settings::from_env()?;
//! let lake = LakeDefinition::from_file(Path::new("lake.yml"))?;
//! let compiled = compile_lake(&settings, &lake)?;
//! compiled.write_outputs(Path::new("build"))?;
//! ```

pub mod bucket;
pub mod cache;
pub mod deployment;
pub mod error;
pub mod graph;
pub mod package;
pub mod resource;
pub mod settings;

pub use bucket::{BucketSet, DatalakeBucket};
pub use cache::{PlatformHandle, ResolutionCache, ResolutionError};
pub use deployment::{DeploymentPlan, DeploymentUnit, ManifestEntry, PlanError, UnitManifest};
pub use error::{BuildError, ErrorCategory, Result};
pub use graph::{GraphError, StateMachineDefinition, StepGraph};
pub use package::{
    CompiledLake, DatalakePackage, PipelineDefinition, PipelinePackage, compile_lake,
    discover_pipelines,
};
pub use resource::{Resource, ResourceKind};
pub use settings::{LakeDefinition, Settings, SettingsError};
