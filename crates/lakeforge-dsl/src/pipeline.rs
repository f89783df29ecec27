// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Pipeline configuration entities and the document parser.
//!
//! A pipeline document looks like:
//!
//! ```yaml
//! name: order_sync
//! domain: sales
//! layers: { origin: raw, target: trusted }
//! triggers:
//!   - s3: { prefix: orders/, suffix: .json }
//!   - event_rule: { source: aws.s3, detail_type: Object Created }
//! contract:
//!   origin_key: str
//! steps:
//!   Route:
//!     type: lambda
//!     properties: { module: route, next: Load, memory_size: 256 }
//!   Load:
//!     type: glue
//!     properties: { module: load, glue_version: pythonshell }
//! tags:
//!   team: data
//! ```
//!
//! Parsing aborts on the first violation; there is no partial result.

use crate::error::{DslError, Result};
use crate::schema::{
    FieldType, Properties, SchemaError, as_properties, required_str, string_or_list,
    validate_properties, value_type_name,
};
use crate::{Environment, Layer, Name, Tags};
use serde::Serialize;
use serde_json::{Value, json};
use strum::{Display, EnumIter, EnumString, IntoEnumIterator};
use tracing::warn;

const PIPELINE_SCHEMA: &[(&str, FieldType)] = &[
    ("name", FieldType::String),
    ("domain", FieldType::String),
    ("layers", FieldType::Map),
    ("triggers", FieldType::List),
    ("contract", FieldType::Map),
    ("steps", FieldType::Map),
    ("tags?", FieldType::Map),
];

const LAYERS_SCHEMA: &[(&str, FieldType)] = &[
    ("origin", FieldType::String),
    ("target", FieldType::String),
];

const OBJECT_TRIGGER_SCHEMA: &[(&str, FieldType)] = &[
    ("prefix", FieldType::String),
    ("suffix", FieldType::String),
];

const STEP_SCHEMA: &[(&str, FieldType)] = &[
    ("type", FieldType::String),
    ("properties", FieldType::Map),
];

const TASK_PROPERTIES_SCHEMA: &[(&str, FieldType)] = &[
    ("module", FieldType::String),
    ("next?", FieldType::String),
];

const CHOICE_PROPERTIES_SCHEMA: &[(&str, FieldType)] = &[("choices", FieldType::List)];

const CHOICE_BRANCH_SCHEMA: &[(&str, FieldType)] = &[
    ("variable", FieldType::String),
    ("equals", FieldType::String),
    ("next_step", FieldType::String),
];

/// Keys pulled out of step properties before the rest is passed through.
const RESERVED_STEP_KEYS: [&str; 3] = ["module", "next", "choices"];

// ============================================================================
// Entities
// ============================================================================

/// Layer a pipeline reads from and the layer it writes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LayerPair {
    pub origin: Layer,
    pub target: Layer,
}

/// Trigger kinds, keyed by their document key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, EnumIter)]
pub enum TriggerKind {
    #[strum(serialize = "s3")]
    ObjectCreated,
    #[strum(serialize = "event_rule")]
    EventRule,
}

/// Object-created notification on the origin-layer bucket.
///
/// Both keys are required; an empty string matches every key. At least one
/// of them must be non-empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ObjectTriggerConfig {
    pub prefix: String,
    pub suffix: String,
}

/// Event-bus rule matching on source and detail type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EventRuleTriggerConfig {
    pub source: Vec<String>,
    pub detail_type: Vec<String>,
}

impl EventRuleTriggerConfig {
    /// Event pattern in event-bus wire form.
    pub fn to_pattern(&self) -> Value {
        json!({
            "source": self.source,
            "detail-type": self.detail_type,
        })
    }
}

/// How a pipeline gets started.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TriggerConfig {
    ObjectCreated(ObjectTriggerConfig),
    EventRule(EventRuleTriggerConfig),
}

impl TriggerConfig {
    pub fn kind(&self) -> TriggerKind {
        match self {
            TriggerConfig::ObjectCreated(_) => TriggerKind::ObjectCreated,
            TriggerConfig::EventRule(_) => TriggerKind::EventRule,
        }
    }
}

/// One declared pipeline argument. The type name is a shape declaration only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContractArgument {
    pub name: String,
    pub type_name: String,
}

/// Step kinds, keyed by the document `type` value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, EnumIter)]
#[strum(serialize_all = "lowercase")]
pub enum StepKind {
    Lambda,
    Glue,
    Choice,
}

/// A function or batch-job step.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskStepConfig {
    pub step_name: String,
    /// Folder under the pipeline's `steps/` directory holding the step code.
    pub module: String,
    pub next_step: Option<String>,
    /// Everything in `properties` except the reserved keys.
    pub properties: Properties,
}

/// One branch of a choice step: `$.variable == equals` routes to `next_step`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChoiceBranch {
    pub variable: String,
    pub equals: String,
    pub next_step: String,
}

/// A branching step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChoiceStepConfig {
    pub step_name: String,
    pub choices: Vec<ChoiceBranch>,
}

/// A declared pipeline step.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StepConfig {
    Lambda(TaskStepConfig),
    Glue(TaskStepConfig),
    Choice(ChoiceStepConfig),
}

impl StepConfig {
    pub fn step_name(&self) -> &str {
        match self {
            StepConfig::Lambda(t) | StepConfig::Glue(t) => &t.step_name,
            StepConfig::Choice(c) => &c.step_name,
        }
    }

    pub fn kind(&self) -> StepKind {
        match self {
            StepConfig::Lambda(_) => StepKind::Lambda,
            StepConfig::Glue(_) => StepKind::Glue,
            StepConfig::Choice(_) => StepKind::Choice,
        }
    }

    /// Explicit successor of a task step. Choice steps have none.
    pub fn next_step(&self) -> Option<&str> {
        match self {
            StepConfig::Lambda(t) | StepConfig::Glue(t) => t.next_step.as_deref(),
            StepConfig::Choice(_) => None,
        }
    }
}

/// A fully parsed pipeline.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineConfig {
    pub name: Name,
    pub domain: String,
    pub layers: LayerPair,
    pub triggers: Vec<TriggerConfig>,
    pub contract: Vec<ContractArgument>,
    pub tags: Tags,
    pub steps: Vec<StepConfig>,
}

// ============================================================================
// Parsing
// ============================================================================

impl PipelineConfig {
    /// Parse a YAML or JSON pipeline document.
    pub fn from_yaml_str(env: Environment, text: &str) -> Result<Self> {
        let document = crate::parse_document(text)?;
        Self::from_value(env, &document)
    }

    /// Build a pipeline from an already-parsed document.
    pub fn from_value(env: Environment, document: &Value) -> Result<Self> {
        let props = as_properties("pipeline", document)?;
        validate_properties(PIPELINE_SCHEMA, props)?;

        let raw_name = required_str(props, "name")?;
        let domain = required_str(props, "domain")?;

        let mut tags = Tags::new();
        tags.add("pipeline", raw_name.as_str());
        tags.add("domain", domain.as_str());
        if let Some(Value::Object(extra)) = props.get("tags") {
            tags.extend_from_document(extra)?;
        }

        Ok(PipelineConfig {
            name: Name::new(raw_name, env),
            domain,
            layers: parse_layers(&props["layers"])?,
            triggers: parse_triggers(&props["triggers"])?,
            contract: parse_contract(&props["contract"])?,
            tags,
            steps: parse_steps(&props["steps"])?,
        })
    }

    /// Look up a step by name.
    pub fn step(&self, step_name: &str) -> Option<&StepConfig> {
        self.steps.iter().find(|s| s.step_name() == step_name)
    }

    /// Contract argument names in declaration order.
    pub fn argument_names(&self) -> Vec<String> {
        self.contract.iter().map(|a| a.name.clone()).collect()
    }
}

fn parse_layer(props: &Properties, field: &str) -> std::result::Result<Layer, SchemaError> {
    let raw = required_str(props, field)?;
    raw.parse().map_err(|_| {
        SchemaError::invalid(
            field,
            format!("unknown layer '{}', expected one of: {}", raw, Layer::names().join(", ")),
        )
    })
}

fn parse_layers(value: &Value) -> Result<LayerPair> {
    let props = as_properties("layers", value)?;
    validate_properties(LAYERS_SCHEMA, props).map_err(|e| e.within("layers"))?;

    Ok(LayerPair {
        origin: parse_layer(props, "origin").map_err(|e| e.within("layers"))?,
        target: parse_layer(props, "target").map_err(|e| e.within("layers"))?,
    })
}

fn parse_contract(value: &Value) -> Result<Vec<ContractArgument>> {
    let props = as_properties("contract", value)?;

    props
        .iter()
        .map(|(name, type_name)| -> Result<ContractArgument> {
            match type_name {
                Value::String(t) => Ok(ContractArgument {
                    name: name.clone(),
                    type_name: t.clone(),
                }),
                other => Err(SchemaError::TypeMismatch {
                    field: format!("contract.{}", name),
                    actual: value_type_name(other),
                    expected: FieldType::String,
                }
                .into()),
            }
        })
        .collect()
}

fn parse_triggers(value: &Value) -> Result<Vec<TriggerConfig>> {
    let entries = value.as_array().map(Vec::as_slice).unwrap_or_default();
    let mut triggers = Vec::with_capacity(entries.len());

    for (index, entry) in entries.iter().enumerate() {
        let field = format!("triggers[{}]", index);
        let map = as_properties(&field, entry)?;

        let (key, body) = match map.iter().next() {
            Some(first) if map.len() == 1 => first,
            _ => {
                return Err(DslError::MalformedTrigger {
                    index,
                    found: map.len(),
                });
            }
        };

        let kind: TriggerKind = key.parse().map_err(|_| DslError::UnknownTrigger {
            index,
            key: key.clone(),
            expected: TriggerKind::iter()
                .map(|k| k.to_string())
                .collect::<Vec<_>>()
                .join(", "),
        })?;

        let field = format!("{}.{}", field, key);
        let body = as_properties(&field, body)?;

        let trigger = match kind {
            TriggerKind::ObjectCreated => {
                validate_properties(OBJECT_TRIGGER_SCHEMA, body).map_err(|e| e.within(&field))?;
                let prefix = required_str(body, "prefix").map_err(|e| e.within(&field))?;
                let suffix = required_str(body, "suffix").map_err(|e| e.within(&field))?;
                if prefix.is_empty() && suffix.is_empty() {
                    return Err(SchemaError::invalid(
                        field,
                        "at least one of prefix or suffix must be given",
                    )
                    .into());
                }
                TriggerConfig::ObjectCreated(ObjectTriggerConfig { prefix, suffix })
            }
            TriggerKind::EventRule => {
                let source = body
                    .get("source")
                    .ok_or_else(|| SchemaError::MissingField {
                        field: format!("{}.source", field),
                        expected: FieldType::String,
                    })
                    .and_then(|v| string_or_list(&format!("{}.source", field), v))?;
                let detail_type = body
                    .get("detail_type")
                    .ok_or_else(|| SchemaError::MissingField {
                        field: format!("{}.detail_type", field),
                        expected: FieldType::String,
                    })
                    .and_then(|v| string_or_list(&format!("{}.detail_type", field), v))?;
                TriggerConfig::EventRule(EventRuleTriggerConfig {
                    source,
                    detail_type,
                })
            }
        };

        triggers.push(trigger);
    }

    Ok(triggers)
}

fn parse_steps(value: &Value) -> Result<Vec<StepConfig>> {
    let steps = as_properties("steps", value)?;
    steps
        .iter()
        .map(|(step_name, entry)| parse_step(step_name, entry))
        .collect()
}

fn parse_step(step_name: &str, entry: &Value) -> Result<StepConfig> {
    let field = format!("steps.{}", step_name);
    let entry = as_properties(&field, entry)?;
    validate_properties(STEP_SCHEMA, entry).map_err(|e| e.within(&field))?;

    let step_type = required_str(entry, "type").map_err(|e| e.within(&field))?;
    let kind: StepKind = step_type.parse().map_err(|_| DslError::UnknownStepType {
        step: step_name.to_string(),
        step_type: step_type.clone(),
        expected: StepKind::iter()
            .map(|k| k.to_string())
            .collect::<Vec<_>>()
            .join(", "),
    })?;

    let properties_field = format!("{}.properties", field);
    let mut properties = as_properties(
        &properties_field,
        entry.get("properties").unwrap_or(&Value::Null),
    )?
    .clone();

    let step = match kind {
        StepKind::Lambda | StepKind::Glue => {
            validate_properties(TASK_PROPERTIES_SCHEMA, &properties)
                .map_err(|e| e.within(&properties_field))?;
            let module = required_str(&properties, "module")?;
            let next_step = properties
                .get("next")
                .and_then(Value::as_str)
                .map(str::to_string);
            strip_reserved(step_name, &mut properties);

            let task = TaskStepConfig {
                step_name: step_name.to_string(),
                module,
                next_step,
                properties,
            };
            if kind == StepKind::Lambda {
                StepConfig::Lambda(task)
            } else {
                StepConfig::Glue(task)
            }
        }
        StepKind::Choice => {
            validate_properties(CHOICE_PROPERTIES_SCHEMA, &properties)
                .map_err(|e| e.within(&properties_field))?;
            let choices = parse_choices(&properties_field, &properties["choices"])?;
            strip_reserved(step_name, &mut properties);
            if !properties.is_empty() {
                warn!(
                    step = step_name,
                    keys = ?properties.keys().collect::<Vec<_>>(),
                    "Ignoring free-form properties on choice step"
                );
            }

            StepConfig::Choice(ChoiceStepConfig {
                step_name: step_name.to_string(),
                choices,
            })
        }
    };

    Ok(step)
}

fn strip_reserved(step_name: &str, properties: &mut Properties) {
    for key in RESERVED_STEP_KEYS {
        if properties.remove(key).is_some() {
            tracing::trace!(step = step_name, key, "Extracted reserved step property");
        }
    }
}

fn parse_choices(field: &str, value: &Value) -> Result<Vec<ChoiceBranch>> {
    let branches = value.as_array().map(Vec::as_slice).unwrap_or_default();

    branches
        .iter()
        .enumerate()
        .map(|(i, branch)| -> Result<ChoiceBranch> {
            let branch_field = format!("{}.choices[{}]", field, i);
            let props = as_properties(&branch_field, branch)?;
            validate_properties(CHOICE_BRANCH_SCHEMA, props).map_err(|e| e.within(&branch_field))?;
            Ok(ChoiceBranch {
                variable: required_str(props, "variable")?,
                equals: required_str(props, "equals")?,
                next_step: required_str(props, "next_step")?,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const EXAMPLE: &str = r#"
name: pipeline_example
domain: example
layers:
  origin: raw
  target: trusted
triggers:
  - s3:
      prefix: example/
      suffix: .json
  - event_rule:
      source: [aws.s3]
      detail_type: AWS API Call via CloudTrail
contract:
  origin_key: str
  route: str
steps:
  RouteFile:
    type: lambda
    properties:
      module: route_file
      next: RouteChoice
      memory_size: 128
  RouteChoice:
    type: choice
    properties:
      choices:
        - { variable: route, equals: type1, next_step: ProcessType1 }
        - { variable: route, equals: type2, next_step: AddToDatabase }
  ProcessType1:
    type: glue
    properties:
      module: process_type1
      glue_version: pythonshell
      next: AddToDatabase
  AddToDatabase:
    type: lambda
    properties:
      module: add_to_database
tags:
  version: 1.0.0
  Cost_Center: 42
"#;

    fn parse(text: &str) -> Result<PipelineConfig> {
        PipelineConfig::from_yaml_str(Environment::Test, text)
    }

    #[test]
    fn test_parse_example() {
        let config = parse(EXAMPLE).unwrap();

        assert_eq!(config.name.value(), "pipeline-example-test");
        assert_eq!(config.domain, "example");
        assert_eq!(
            config.layers,
            LayerPair {
                origin: Layer::Raw,
                target: Layer::Trusted
            }
        );
        assert_eq!(config.triggers.len(), 2);
        assert_eq!(config.triggers[0].kind(), TriggerKind::ObjectCreated);
        assert_eq!(config.argument_names(), vec!["origin_key", "route"]);
    }

    #[test]
    fn test_steps_keep_declaration_order() {
        let config = parse(EXAMPLE).unwrap();
        let names: Vec<&str> = config.steps.iter().map(|s| s.step_name()).collect();
        assert_eq!(
            names,
            vec!["RouteFile", "RouteChoice", "ProcessType1", "AddToDatabase"]
        );
    }

    #[test]
    fn test_reserved_keys_are_extracted() {
        let config = parse(EXAMPLE).unwrap();
        let StepConfig::Lambda(route) = config.step("RouteFile").unwrap() else {
            panic!("expected lambda step");
        };
        assert_eq!(route.module, "route_file");
        assert_eq!(route.next_step.as_deref(), Some("RouteChoice"));
        assert!(!route.properties.contains_key("module"));
        assert!(!route.properties.contains_key("next"));
        assert_eq!(route.properties["memory_size"], 128);
    }

    #[test]
    fn test_choice_branches() {
        let config = parse(EXAMPLE).unwrap();
        let StepConfig::Choice(choice) = config.step("RouteChoice").unwrap() else {
            panic!("expected choice step");
        };
        assert_eq!(choice.choices.len(), 2);
        assert_eq!(choice.choices[1].next_step, "AddToDatabase");
    }

    #[test]
    fn test_event_rule_accepts_string_or_list() {
        let config = parse(EXAMPLE).unwrap();
        let TriggerConfig::EventRule(rule) = &config.triggers[1] else {
            panic!("expected event rule");
        };
        assert_eq!(rule.source, vec!["aws.s3"]);
        assert_eq!(rule.detail_type, vec!["AWS API Call via CloudTrail"]);
        assert_eq!(rule.to_pattern()["detail-type"][0], "AWS API Call via CloudTrail");
    }

    #[test]
    fn test_implicit_tags_come_first() {
        let config = parse(EXAMPLE).unwrap();
        let keys: Vec<&str> = config.tags.items().iter().map(|t| t.key.as_str()).collect();
        assert_eq!(keys, vec!["pipeline", "domain", "version", "cost-center"]);
        assert_eq!(config.tags.get("cost_center"), Some("42"));
    }

    #[test]
    fn test_missing_field_aborts() {
        let err = parse("name: x\ndomain: y\n").unwrap_err();
        assert!(matches!(
            err,
            DslError::Schema(SchemaError::MissingField { ref field, .. }) if field == "layers"
        ));
    }

    #[test]
    fn test_mistyped_field_aborts() {
        let text = EXAMPLE.replace("domain: example", "domain: [example]");
        let err = parse(&text).unwrap_err();
        assert_eq!(
            err.to_string(),
            "schema error: invalid type for 'domain': list, expected string"
        );
    }

    #[test]
    fn test_unknown_layer() {
        let text = EXAMPLE.replace("target: trusted", "target: gold");
        let err = parse(&text).unwrap_err();
        assert!(err.to_string().contains("layers.target"));
    }

    #[test]
    fn test_unknown_step_type_is_fatal() {
        let text = EXAMPLE.replace("type: glue", "type: batch");
        let err = parse(&text).unwrap_err();
        assert!(err.is_referential());
        assert!(matches!(err, DslError::UnknownStepType { ref step, .. } if step == "ProcessType1"));
    }

    #[test]
    fn test_unknown_trigger_is_fatal() {
        let text = EXAMPLE.replace("  - s3:", "  - sqs:");
        let err = parse(&text).unwrap_err();
        assert!(matches!(err, DslError::UnknownTrigger { index: 0, ref key, .. } if key == "sqs"));
    }

    #[test]
    fn test_task_without_module_is_rejected() {
        let text = EXAMPLE.replace("      module: add_to_database\n", "      timeout: 3\n");
        let err = parse(&text).unwrap_err();
        assert!(err.to_string().contains("steps.AddToDatabase.properties.module"));
    }

    #[test]
    fn test_branch_equals_must_be_string() {
        let text = EXAMPLE.replace("equals: type1", "equals: 1");
        let err = parse(&text).unwrap_err();
        assert!(err.to_string().contains("choices[0].equals"));
    }

    #[test]
    fn test_object_trigger_needs_a_filter() {
        let text = EXAMPLE.replace(
            "      prefix: example/\n      suffix: .json\n",
            "      prefix: \"\"\n      suffix: \"\"\n",
        );
        let err = parse(&text).unwrap_err();
        assert!(err.to_string().contains("at least one of prefix or suffix"));
    }

    #[test]
    fn test_object_trigger_without_suffix_is_rejected() {
        let text = EXAMPLE.replace("      suffix: .json\n", "");
        let err = parse(&text).unwrap_err();
        assert!(matches!(
            err,
            DslError::Schema(SchemaError::MissingField { ref field, .. }) if field == "triggers[0].s3.suffix"
        ));
    }

    #[test]
    fn test_object_trigger_keeps_empty_suffix() {
        let text = EXAMPLE.replace("      suffix: .json\n", "      suffix: \"\"\n");
        let config = parse(&text).unwrap();
        let TriggerConfig::ObjectCreated(object) = &config.triggers[0] else {
            panic!("expected object trigger");
        };
        assert_eq!(object.prefix, "example/");
        assert_eq!(object.suffix, "");
    }

    #[test]
    fn test_step_without_properties_is_rejected() {
        let text = EXAMPLE.replace(
            "    type: lambda\n    properties:\n      module: add_to_database\n",
            "    type: lambda\n",
        );
        let err = parse(&text).unwrap_err();
        assert!(matches!(
            err,
            DslError::Schema(SchemaError::MissingField { ref field, .. }) if field == "steps.AddToDatabase.properties"
        ));
    }

    #[test]
    fn test_malformed_trigger() {
        let value = json!({
            "name": "p", "domain": "d",
            "layers": {"origin": "raw", "target": "raw"},
            "triggers": [{"s3": {"prefix": "a", "suffix": ""}, "event_rule": {}}],
            "contract": {}, "steps": {}
        });
        let err = PipelineConfig::from_value(Environment::Dev, &value).unwrap_err();
        assert!(matches!(err, DslError::MalformedTrigger { index: 0, found: 2 }));
    }
}
