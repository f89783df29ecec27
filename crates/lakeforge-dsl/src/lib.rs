// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! lakeforge DSL - pipeline configuration language
//!
//! This crate holds everything the builder needs to understand a pipeline
//! before any resource is generated:
//! - Leaf value objects: [`Environment`], [`Layer`], [`Name`], [`Tags`]
//! - The property-bag shape checker shared by configuration and resource
//!   descriptors ([`schema`])
//! - The pipeline document parser ([`PipelineConfig`])
//!
//! Documents are YAML (JSON is accepted as a YAML subset). Mapping order is
//! preserved, since step declaration order is part of the language.

mod environment;
mod name;
mod tags;

pub mod error;
pub mod pipeline;
pub mod schema;

pub use environment::{Environment, Layer};
pub use error::{DslError, Result};
pub use name::{Name, kebab_case};
pub use pipeline::{
    ChoiceBranch, ChoiceStepConfig, ContractArgument, EventRuleTriggerConfig, LayerPair,
    ObjectTriggerConfig, PipelineConfig, StepConfig, StepKind, TaskStepConfig, TriggerConfig,
    TriggerKind,
};
pub use schema::{FieldType, Properties, SchemaError, validate_properties};
pub use tags::{Tag, Tags};

/// Parse a YAML/JSON document into an order-preserving JSON value.
pub fn parse_document(text: &str) -> Result<serde_json::Value> {
    Ok(serde_yaml::from_str(text)?)
}
