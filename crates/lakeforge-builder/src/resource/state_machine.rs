// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! State machine running a pipeline's step graph.

use super::{Resource, ResourceKind, string, validated};
use crate::cache::ResolutionCache;
use crate::deployment::{DeploymentUnit, ManifestEntry};
use crate::error::Result;
use crate::graph::{StateMachineDefinition, StepGraph, TaskTarget};
use lakeforge_dsl::schema::{FieldType, Properties};
use lakeforge_dsl::{Name, Tags};
use serde_json::json;

const STATE_MACHINE_SCHEMA: &[(&str, FieldType)] = &[
    ("region", FieldType::String),
    ("account_id", FieldType::String),
    ("role", FieldType::String),
];

#[derive(Debug, Clone)]
pub struct StateMachineResource {
    name: Name,
    tags: Tags,
    region: String,
    account_id: String,
    role: String,
    graph: StepGraph,
}

impl StateMachineResource {
    /// `role` is the rendered name of the execution role.
    pub fn from_properties(
        name: Name,
        tags: Tags,
        props: &Properties,
        graph: StepGraph,
    ) -> Result<Self> {
        validated(ResourceKind::StateMachine, &name, STATE_MACHINE_SCHEMA, props)?;

        Ok(Self {
            region: string(props, "region"),
            account_id: string(props, "account_id"),
            role: string(props, "role"),
            graph,
            name,
            tags,
        })
    }

    pub fn arn(&self) -> String {
        state_machine_arn(&self.region, &self.account_id, &self.name.value())
    }

    pub fn graph(&self) -> &StepGraph {
        &self.graph
    }

    pub fn definition(&self) -> StateMachineDefinition {
        self.graph.definition()
    }
}

/// Identifier of the state machine named `name`.
pub fn state_machine_arn(region: &str, account_id: &str, name: &str) -> String {
    format!("arn:aws:states:{}:{}:stateMachine:{}", region, account_id, name)
}

impl Resource for StateMachineResource {
    fn name(&self) -> &Name {
        &self.name
    }

    fn kind(&self) -> ResourceKind {
        ResourceKind::StateMachine
    }

    /// Every function and job the graph invokes must already be materialized.
    fn materialize(&self, unit: &mut DeploymentUnit, cache: &mut ResolutionCache) -> Result<()> {
        let role = unit.resolve(cache, &self.role, ResourceKind::Role)?;
        unit.resolve(cache, self.graph.catch_function(), ResourceKind::Function)?;
        for target in self.graph.task_targets() {
            let kind = match target {
                TaskTarget::Function { .. } => ResourceKind::Function,
                TaskTarget::BatchJob { .. } => ResourceKind::BatchJob,
            };
            unit.resolve(cache, target.resource_name(), kind)?;
        }

        let entry = ManifestEntry::new(
            &self.name,
            self.kind(),
            self.arn(),
            json!({
                "StateMachineName": self.name.value(),
                "RoleArn": role.arn,
                "Definition": self.definition(),
            }),
        )
        .with_tags(&self.tags);
        unit.emit(cache, entry)?;
        Ok(())
    }
}
