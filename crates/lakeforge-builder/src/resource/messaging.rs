// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Notification topics and event-bus rules.

use super::{Resource, ResourceKind, context, string, strings, validated};
use crate::cache::ResolutionCache;
use crate::deployment::{DeploymentUnit, ManifestEntry};
use crate::error::{BuildError, Result};
use lakeforge_dsl::schema::{
    FieldType, Properties, as_properties, required_str, validate_properties,
};
use lakeforge_dsl::{Name, SchemaError, Tags};
use serde::Serialize;
use serde_json::{Value, json};

const TOPIC_SCHEMA: &[(&str, FieldType)] = &[
    ("region", FieldType::String),
    ("account_id", FieldType::String),
    ("display_name", FieldType::String),
    ("subscriptions", FieldType::List),
];

const SUBSCRIPTION_SCHEMA: &[(&str, FieldType)] = &[
    ("protocol", FieldType::String),
    ("endpoint", FieldType::String),
];

const EVENT_RULE_SCHEMA: &[(&str, FieldType)] = &[
    ("region", FieldType::String),
    ("account_id", FieldType::String),
    ("targets", FieldType::List),
    ("event_pattern", FieldType::Map),
];

/// Delivery protocols a topic can fan out to.
pub const SUBSCRIPTION_PROTOCOLS: [&str; 5] = ["email", "lambda", "sms", "sqs", "url"];

/// One topic subscriber.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Subscription {
    pub protocol: String,
    pub endpoint: String,
}

impl Subscription {
    /// Parse `{protocol, endpoint}`; `field` locates the entry in errors.
    pub fn from_value(field: &str, value: &Value) -> std::result::Result<Self, SchemaError> {
        let props = as_properties(field, value)?;
        validate_properties(SUBSCRIPTION_SCHEMA, props).map_err(|e| e.within(field))?;

        let protocol = required_str(props, "protocol")?;
        if !SUBSCRIPTION_PROTOCOLS.contains(&protocol.as_str()) {
            return Err(SchemaError::invalid(
                format!("{}.protocol", field),
                format!(
                    "'{}' is not one of: {}",
                    protocol,
                    SUBSCRIPTION_PROTOCOLS.join(", ")
                ),
            ));
        }

        Ok(Self {
            protocol,
            endpoint: required_str(props, "endpoint")?,
        })
    }

    /// Wire protocol name.
    fn wire_protocol(&self) -> &str {
        match self.protocol.as_str() {
            "url" => "https",
            other => other,
        }
    }
}

// ============================================================================
// Topic
// ============================================================================

#[derive(Debug, Clone)]
pub struct TopicResource {
    name: Name,
    tags: Tags,
    region: String,
    account_id: String,
    display_name: String,
    subscriptions: Vec<Subscription>,
}

impl TopicResource {
    pub fn from_properties(name: Name, tags: Tags, props: &Properties) -> Result<Self> {
        let kind = ResourceKind::Topic;
        validated(kind, &name, TOPIC_SCHEMA, props)?;

        let subscriptions = props
            .get("subscriptions")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default()
            .iter()
            .enumerate()
            .map(|(i, entry)| Subscription::from_value(&format!("subscriptions[{}]", i), entry))
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| BuildError::schema(context(kind, &name), e))?;

        Ok(Self {
            region: string(props, "region"),
            account_id: string(props, "account_id"),
            display_name: string(props, "display_name"),
            subscriptions,
            name,
            tags,
        })
    }

    pub fn arn(&self) -> String {
        topic_arn(&self.region, &self.account_id, &self.name.value())
    }

    pub fn subscriptions(&self) -> &[Subscription] {
        &self.subscriptions
    }
}

/// Identifier of the topic named `topic_name`.
pub fn topic_arn(region: &str, account_id: &str, topic_name: &str) -> String {
    format!("arn:aws:sns:{}:{}:{}", region, account_id, topic_name)
}

impl Resource for TopicResource {
    fn name(&self) -> &Name {
        &self.name
    }

    fn kind(&self) -> ResourceKind {
        ResourceKind::Topic
    }

    fn materialize(&self, unit: &mut DeploymentUnit, cache: &mut ResolutionCache) -> Result<()> {
        let subscriptions: Vec<Value> = self
            .subscriptions
            .iter()
            .map(|s| json!({ "Protocol": s.wire_protocol(), "Endpoint": s.endpoint }))
            .collect();

        let entry = ManifestEntry::new(
            &self.name,
            self.kind(),
            self.arn(),
            json!({
                "TopicName": self.name.value(),
                "DisplayName": self.display_name,
                "Subscription": subscriptions,
            }),
        )
        .with_tags(&self.tags);
        unit.emit(cache, entry)?;
        Ok(())
    }
}

// ============================================================================
// Event rule
// ============================================================================

/// Routes matching bus events to functions.
#[derive(Debug, Clone)]
pub struct EventRuleResource {
    name: Name,
    tags: Tags,
    region: String,
    account_id: String,
    targets: Vec<String>,
    event_pattern: Properties,
}

impl EventRuleResource {
    /// `targets` are rendered function names.
    pub fn from_properties(name: Name, tags: Tags, props: &Properties) -> Result<Self> {
        validated(ResourceKind::EventRule, &name, EVENT_RULE_SCHEMA, props)?;

        let event_pattern = match props.get("event_pattern") {
            Some(Value::Object(map)) => map.clone(),
            _ => Properties::new(),
        };

        Ok(Self {
            region: string(props, "region"),
            account_id: string(props, "account_id"),
            targets: strings(props, "targets"),
            event_pattern,
            name,
            tags,
        })
    }
}

impl Resource for EventRuleResource {
    fn name(&self) -> &Name {
        &self.name
    }

    fn kind(&self) -> ResourceKind {
        ResourceKind::EventRule
    }

    fn materialize(&self, unit: &mut DeploymentUnit, cache: &mut ResolutionCache) -> Result<()> {
        let mut targets = Vec::with_capacity(self.targets.len());
        for (i, target) in self.targets.iter().enumerate() {
            let function = unit.resolve(cache, target, ResourceKind::Function)?;
            targets.push(json!({ "Id": format!("target-{}", i), "Arn": function.arn }));
        }

        let arn = format!(
            "arn:aws:events:{}:{}:rule/{}",
            self.region,
            self.account_id,
            self.name.value()
        );
        let entry = ManifestEntry::new(
            &self.name,
            self.kind(),
            arn,
            json!({
                "Name": self.name.value(),
                "EventPattern": self.event_pattern,
                "Targets": targets,
            }),
        )
        .with_tags(&self.tags);
        unit.emit(cache, entry)?;
        Ok(())
    }
}
