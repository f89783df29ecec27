// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Resource descriptors.
//!
//! A descriptor is built by a validating `from_properties` factory and turned
//! into a manifest entry by [`Resource::materialize`]. Factories check the
//! property bag against a field schema and check preconditions (source
//! folders) before anything is materialized; materialization resolves the
//! descriptor's references through the [`ResolutionCache`] and registers the
//! descriptor's own handle.

mod catalog;
mod compute;
mod iam;
mod messaging;
mod network;
mod state_machine;
mod storage;

pub use catalog::{CatalogDatabaseResource, CrawlerResource};
pub use compute::{BatchJobResource, FunctionResource, function_arn};
pub use iam::{RoleResource, role_arn};
pub use messaging::{
    EventRuleResource, SUBSCRIPTION_PROTOCOLS, Subscription, TopicResource, topic_arn,
};
pub use network::{NetworkEndpointResource, NetworkResource};
pub use state_machine::{StateMachineResource, state_machine_arn};
pub use storage::{BucketNotificationResource, BucketResource, RemovalPolicy};

use crate::cache::ResolutionCache;
use crate::deployment::DeploymentUnit;
use crate::error::{BuildError, Result};
use lakeforge_dsl::schema::{FieldType, OPTIONAL_MARKER, Properties, validate_properties};
use lakeforge_dsl::Name;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::path::Path;
use tracing::warn;

/// Kinds of resources a lake is made of.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Bucket,
    Role,
    Function,
    BatchJob,
    CatalogDatabase,
    Crawler,
    Topic,
    BucketNotification,
    EventRule,
    StateMachine,
    Network,
    NetworkEndpoint,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Bucket => "bucket",
            ResourceKind::Role => "role",
            ResourceKind::Function => "function",
            ResourceKind::BatchJob => "batch job",
            ResourceKind::CatalogDatabase => "catalog database",
            ResourceKind::Crawler => "crawler",
            ResourceKind::Topic => "topic",
            ResourceKind::BucketNotification => "bucket notification",
            ResourceKind::EventRule => "event rule",
            ResourceKind::StateMachine => "state machine",
            ResourceKind::Network => "network",
            ResourceKind::NetworkEndpoint => "network endpoint",
        }
    }

    /// Provisioning type written into manifests.
    pub fn resource_type(&self) -> &'static str {
        match self {
            ResourceKind::Bucket => "AWS::S3::Bucket",
            ResourceKind::Role => "AWS::IAM::Role",
            ResourceKind::Function => "AWS::Lambda::Function",
            ResourceKind::BatchJob => "AWS::Glue::Job",
            ResourceKind::CatalogDatabase => "AWS::Glue::Database",
            ResourceKind::Crawler => "AWS::Glue::Crawler",
            ResourceKind::Topic => "AWS::SNS::Topic",
            ResourceKind::BucketNotification => "Custom::S3BucketNotifications",
            ResourceKind::EventRule => "AWS::Events::Rule",
            ResourceKind::StateMachine => "AWS::StepFunctions::StateMachine",
            ResourceKind::Network => "AWS::EC2::VPC",
            ResourceKind::NetworkEndpoint => "AWS::EC2::VPCEndpoint",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A validated resource descriptor.
pub trait Resource: fmt::Debug {
    fn name(&self) -> &Name;

    fn kind(&self) -> ResourceKind;

    /// Render the descriptor into `unit` and register its handle in `cache`.
    fn materialize(&self, unit: &mut DeploymentUnit, cache: &mut ResolutionCache) -> Result<()>;
}

// ============================================================================
// Factory helpers
// ============================================================================

fn validated(
    kind: ResourceKind,
    name: &Name,
    schema: &[(&str, FieldType)],
    props: &Properties,
) -> Result<()> {
    validate_properties(schema, props).map_err(|e| BuildError::schema(context(kind, name), e))?;

    for field in props.keys() {
        let known = schema
            .iter()
            .any(|(key, _)| key.trim_end_matches(OPTIONAL_MARKER) == field.as_str());
        if !known {
            warn!(resource = %name, kind = %kind, field = %field, "Ignoring unknown property");
        }
    }
    Ok(())
}

fn context(kind: ResourceKind, name: &Name) -> String {
    format!("{} '{}'", kind, name)
}

fn string(props: &Properties, field: &str) -> String {
    props
        .get(field)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn opt_string(props: &Properties, field: &str) -> Option<String> {
    props.get(field).and_then(Value::as_str).map(str::to_string)
}

fn integer_or(props: &Properties, field: &str, default: i64) -> i64 {
    props.get(field).and_then(Value::as_i64).unwrap_or(default)
}

fn strings(props: &Properties, field: &str) -> Vec<String> {
    props
        .get(field)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Reject a value outside `allowed`.
fn one_of(kind: ResourceKind, name: &Name, field: &str, value: &str, allowed: &[&str]) -> Result<()> {
    if allowed.contains(&value) {
        return Ok(());
    }
    Err(BuildError::schema(
        context(kind, name),
        lakeforge_dsl::SchemaError::invalid(
            field,
            format!("'{}' is not one of: {}", value, allowed.join(", ")),
        ),
    ))
}

fn require_dir(name: &Name, path: &Path) -> Result<()> {
    if path.is_dir() {
        Ok(())
    } else {
        Err(BuildError::precondition(
            name,
            format!("source folder {} does not exist", path.display()),
        ))
    }
}

fn require_file(name: &Name, path: &Path) -> Result<()> {
    if path.is_file() {
        Ok(())
    } else {
        Err(BuildError::precondition(
            name,
            format!("required file {} does not exist", path.display()),
        ))
    }
}

/// Environment variables are a flat string map.
fn string_map(kind: ResourceKind, name: &Name, field: &str, value: Option<&Value>) -> Result<Properties> {
    let Some(Value::Object(map)) = value else {
        return Ok(Properties::new());
    };
    for (key, entry) in map {
        if !entry.is_string() {
            return Err(BuildError::schema(
                context(kind, name),
                lakeforge_dsl::SchemaError::TypeMismatch {
                    field: format!("{}.{}", field, key),
                    actual: lakeforge_dsl::schema::value_type_name(entry),
                    expected: FieldType::String,
                },
            ));
        }
    }
    Ok(map.clone())
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_display_and_type() {
        assert_eq!(ResourceKind::BatchJob.to_string(), "batch job");
        assert_eq!(ResourceKind::StateMachine.resource_type(), "AWS::StepFunctions::StateMachine");
        assert_eq!(serde_json::to_value(ResourceKind::EventRule).unwrap(), "event_rule");
    }
}
