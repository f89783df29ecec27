// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Resources of a single pipeline.
//!
//! A pipeline is deployed as: five purpose-scoped roles, a catch function
//! that reports failures to the lake topic, a trigger function that starts
//! the state machine, one notification per configured trigger, one function
//! or batch job per task step, and the state machine itself.

use super::datalake::DatalakePackage;
use super::props;
use crate::error::{BuildError, Result};
use crate::graph::{StateMachineDefinition, StepBody, StepGraph, StepSpec, TaskTarget};
use crate::resource::{
    BatchJobResource, BucketNotificationResource, EventRuleResource, FunctionResource, Resource,
    RoleResource, StateMachineResource, function_arn, state_machine_arn,
};
use lakeforge_dsl::schema::Properties;
use lakeforge_dsl::{Name, PipelineConfig, SchemaError, StepConfig, TaskStepConfig, TriggerConfig};
use serde_json::{Map, Value, json};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const LAMBDA_SERVICE: &str = "lambda.amazonaws.com";
const GLUE_SERVICE: &str = "glue.amazonaws.com";
const STATES_SERVICE: &str = "states.amazonaws.com";

const LAMBDA_MANAGED_POLICIES: &[&str] = &[
    "service-role/AWSLambdaBasicExecutionRole",
    "service-role/AWSLambdaVPCAccessExecutionRole",
];

const TASK_ROLE_ACTIONS: &[&str] = &[
    "s3:*",
    "glue:CreateTable",
    "glue:UpdateTable",
    "glue:GetTable",
    "glue:GetPartition",
    "glue:CreatePartition",
    "glue:UpdatePartition",
];

const BATCH_ROLE_ACTIONS: &[&str] = &[
    "glue:*",
    "s3:*",
    "ec2:DescribeVpcEndpoints",
    "ec2:DescribeRouteTables",
    "ec2:CreateNetworkInterface",
    "ec2:DeleteNetworkInterface",
    "ec2:DescribeNetworkInterfaces",
    "ec2:DescribeSecurityGroups",
    "ec2:DescribeSubnets",
    "ec2:DescribeVpcAttribute",
    "iam:ListRolePolicies",
    "iam:GetRole",
    "iam:GetRolePolicy",
    "cloudwatch:PutMetricData",
    "logs:CreateLogGroup",
    "logs:CreateLogStream",
    "logs:PutLogEvents",
];

const BATCH_ROLE_EXTRA_RESOURCES: &[&str] = &[
    "arn:aws:ec2:*",
    "arn:aws:iam:*",
    "arn:aws:logs:*",
    "arn:aws:cloudwatch:*",
];

const GRAPH_ROLE_ACTIONS: &[&str] = &[
    "lambda:InvokeFunction",
    "lambda:InvokeAsync",
    "glue:StartJobRun",
    "glue:GetJobRun",
    "glue:GetJobRuns",
    "glue:GetDatabase",
    "glue:GetTables",
    "glue:GetTable",
    "glue:GetPartitions",
    "glue:GetPartition",
    "glue:GetConnection",
    "glue:GetConnections",
];

/// Rendered names of the pipeline's roles.
#[derive(Debug, Clone)]
struct Roles {
    catch: Name,
    trigger: Name,
    task: Name,
    batch: Name,
    graph: Name,
}

/// A pipeline ready to be deployed as one unit.
#[derive(Debug)]
pub struct PipelinePackage {
    config: PipelineConfig,
    root: PathBuf,
    resources: Vec<Box<dyn Resource>>,
    definition: StateMachineDefinition,
}

impl PipelinePackage {
    /// Build every resource of `config`. `root` is the pipeline directory
    /// holding the `catch`, `trigger` and `steps/<module>` source folders.
    ///
    /// The step graph is built before any resource, so a dangling reference
    /// fails the pipeline without touching the file system.
    pub fn build(lake: &DatalakePackage, config: PipelineConfig, root: &Path) -> Result<Self> {
        let builder = Builder {
            lake,
            config: &config,
            root,
        };

        builder.check_domain()?;
        let graph = builder.step_graph()?;

        let roles = Roles {
            catch: config.name.add_suffix("role-catch"),
            trigger: config.name.add_suffix("role-trigger"),
            task: config.name.add_suffix("role-lambda"),
            batch: config.name.add_suffix("role-glue"),
            graph: config.name.add_suffix("role-sfn"),
        };

        let mut resources = builder.roles(&roles)?;
        resources.push(Box::new(builder.catch_function(&roles)?));
        let trigger = builder.trigger_function(&roles)?;
        let trigger_name = trigger.name().value();
        resources.push(Box::new(trigger));
        resources.extend(builder.notifications(&trigger_name)?);
        resources.extend(builder.tasks(&roles)?);

        let state_machine = StateMachineResource::from_properties(
            config.name.clone(),
            config.tags.clone(),
            &props(json!({
                "region": lake.region(),
                "account_id": lake.account_id(),
                "role": roles.graph.value(),
            })),
            graph,
        )?;
        let definition = state_machine.definition();
        resources.push(Box::new(state_machine));

        info!(
            pipeline = %config.name,
            domain = %config.domain,
            resources = resources.len(),
            "Built pipeline package"
        );

        Ok(Self {
            root: root.to_path_buf(),
            config,
            resources,
            definition,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Name of the deployment unit holding this pipeline.
    pub fn unit_name(&self) -> String {
        unit_name(&self.config.name)
    }

    pub fn resources(&self) -> &[Box<dyn Resource>] {
        &self.resources
    }

    pub fn definition(&self) -> &StateMachineDefinition {
        &self.definition
    }

    pub(crate) fn into_parts(self) -> (String, Vec<Box<dyn Resource>>, StateMachineDefinition) {
        (unit_name(&self.config.name), self.resources, self.definition)
    }
}

/// Deployment unit name of the pipeline called `name`.
pub fn unit_name(name: &Name) -> String {
    name.add_prefix("lake").add_suffix("stack").value()
}

// ============================================================================
// Builder
// ============================================================================

struct Builder<'a> {
    lake: &'a DatalakePackage,
    config: &'a PipelineConfig,
    root: &'a Path,
}

impl Builder<'_> {
    fn context(&self) -> String {
        format!("pipeline '{}'", self.config.name)
    }

    fn check_domain(&self) -> Result<()> {
        if self.lake.bucket_set().has_domain(&self.config.domain) {
            return Ok(());
        }
        Err(BuildError::schema(
            self.context(),
            SchemaError::invalid(
                "domain",
                format!("'{}' is not a domain of this lake", self.config.domain),
            ),
        ))
    }

    fn resource_name(&self, step: &TaskStepConfig) -> Name {
        self.config.name.add_suffix(&step.step_name)
    }

    fn step_graph(&self) -> Result<StepGraph> {
        let arguments = self.config.argument_names();
        let specs: Vec<StepSpec> = self
            .config
            .steps
            .iter()
            .map(|step| {
                let body = match step {
                    StepConfig::Lambda(task) => {
                        let name = self.resource_name(task).value();
                        StepBody::Task {
                            target: TaskTarget::Function {
                                arn: function_arn(self.lake.region(), self.lake.account_id(), &name),
                                name,
                            },
                            next_step: task.next_step.clone(),
                        }
                    }
                    StepConfig::Glue(task) => StepBody::Task {
                        target: TaskTarget::BatchJob {
                            name: self.resource_name(task).value(),
                            arguments: arguments.clone(),
                        },
                        next_step: task.next_step.clone(),
                    },
                    StepConfig::Choice(choice) => StepBody::Choice {
                        branches: choice.choices.clone(),
                    },
                };
                StepSpec {
                    step_name: step.step_name().to_string(),
                    body,
                }
            })
            .collect();

        let catch = self.config.name.add_suffix("catch").value();
        StepGraph::build(&catch, &specs).map_err(|source| BuildError::Graph {
            pipeline: self.config.name.value(),
            source,
        })
    }

    /// Buckets, objects, databases and tables of the pipeline's domain, plus
    /// the catalog itself.
    fn domain_resources(&self) -> Vec<String> {
        let bucket_set = self.lake.bucket_set();
        let mut resources = vec![bucket_set.catalog_arn()];
        for bucket in bucket_set.get(&[self.config.domain.as_str()], &[]) {
            resources.push(bucket.arn.clone());
            resources.push(bucket.objects_arn());
            resources.push(bucket.database_arn.clone());
            resources.push(bucket.tables_arn());
        }
        resources
    }

    fn role(
        &self,
        name: &Name,
        assumed_by: &str,
        actions: &[&str],
        resources: Option<Vec<String>>,
        managed_policies: &[&str],
    ) -> Result<RoleResource> {
        let mut properties = props(json!({
            "region": self.lake.region(),
            "account_id": self.lake.account_id(),
            "assumed_by": assumed_by,
            "effect": "allow",
            "actions": actions,
        }));
        if let Some(resources) = resources {
            properties.insert("resources".to_string(), json!(resources));
        }
        if !managed_policies.is_empty() {
            properties.insert("managed_policies".to_string(), json!(managed_policies));
        }
        RoleResource::from_properties(name.clone(), self.config.tags.clone(), &properties)
    }

    fn roles(&self, roles: &Roles) -> Result<Vec<Box<dyn Resource>>> {
        let domain = self.domain_resources();
        let state_machine = state_machine_arn(
            self.lake.region(),
            self.lake.account_id(),
            &self.config.name.value(),
        );
        let mut batch_resources = domain.clone();
        batch_resources.extend(BATCH_ROLE_EXTRA_RESOURCES.iter().map(|r| r.to_string()));

        Ok(vec![
            Box::new(self.role(
                &roles.catch,
                LAMBDA_SERVICE,
                &["sns:Publish"],
                Some(vec![self.lake.topic_arn().to_string()]),
                LAMBDA_MANAGED_POLICIES,
            )?),
            Box::new(self.role(
                &roles.trigger,
                LAMBDA_SERVICE,
                &["states:StartExecution"],
                Some(vec![state_machine]),
                LAMBDA_MANAGED_POLICIES,
            )?),
            Box::new(self.role(
                &roles.task,
                LAMBDA_SERVICE,
                TASK_ROLE_ACTIONS,
                Some(domain),
                LAMBDA_MANAGED_POLICIES,
            )?),
            Box::new(self.role(
                &roles.batch,
                GLUE_SERVICE,
                BATCH_ROLE_ACTIONS,
                Some(batch_resources),
                &[],
            )?),
            Box::new(self.role(&roles.graph, STATES_SERVICE, GRAPH_ROLE_ACTIONS, None, &[])?),
        ])
    }

    /// Properties shared by every function of the pipeline.
    fn function_properties(&self, role: &Name, source_folder: PathBuf) -> Properties {
        let mut properties = props(json!({
            "region": self.lake.region(),
            "account_id": self.lake.account_id(),
            "role": role.value(),
            "root": self.root.display().to_string(),
            "source_folder": source_folder.display().to_string(),
        }));
        if let Some(network) = self.lake.network() {
            properties.insert("network".to_string(), json!(network.value()));
            properties.insert("network_subnet".to_string(), json!("private"));
        }
        properties
    }

    fn catch_function(&self, roles: &Roles) -> Result<FunctionResource> {
        let mut properties = self.function_properties(&roles.catch, self.root.join("catch"));
        properties.insert("timeout".to_string(), json!(60));
        properties.insert("memory_size".to_string(), json!(128));
        properties.insert(
            "environment".to_string(),
            json!({
                "PIPELINE_NAME": self.config.name.value(),
                "SNS_TOPIC_ARN": self.lake.topic_arn(),
            }),
        );
        FunctionResource::from_properties(
            self.config.name.add_suffix("catch"),
            self.config.tags.clone(),
            &properties,
        )
    }

    fn trigger_function(&self, roles: &Roles) -> Result<FunctionResource> {
        let state_machine = state_machine_arn(
            self.lake.region(),
            self.lake.account_id(),
            &self.config.name.value(),
        );
        let mut properties = self.function_properties(&roles.trigger, self.root.join("trigger"));
        properties.insert("timeout".to_string(), json!(60));
        properties.insert("memory_size".to_string(), json!(128));
        properties.insert(
            "environment".to_string(),
            json!({
                "STATE_MACHINE_ARN": state_machine,
                "TRIGGER_LAYER": self.config.layers.origin.to_string(),
                "TARGET_LAYER": self.config.layers.target.to_string(),
            }),
        );
        FunctionResource::from_properties(
            self.config.name.add_suffix("trigger"),
            self.config.tags.clone(),
            &properties,
        )
    }

    fn notifications(&self, trigger: &str) -> Result<Vec<Box<dyn Resource>>> {
        let origin = self
            .lake
            .bucket_set()
            .find(&self.config.domain, self.config.layers.origin)
            .map(|bucket| bucket.name.value())
            .unwrap_or_default();

        let mut notifications: Vec<Box<dyn Resource>> = Vec::new();
        for (i, trigger_config) in self.config.triggers.iter().enumerate() {
            let name = self.config.name.add_suffix(&format!("event-{}", i));
            let tags = self.config.tags.clone();
            match trigger_config {
                TriggerConfig::ObjectCreated(object) => {
                    let mut properties = props(json!({
                        "bucket": origin,
                        "function": trigger,
                        "event_type": "object_created",
                    }));
                    for (key, filter) in [("prefix", &object.prefix), ("suffix", &object.suffix)] {
                        if !filter.is_empty() {
                            properties.insert(key.to_string(), json!(filter));
                        }
                    }
                    notifications.push(Box::new(BucketNotificationResource::from_properties(
                        name,
                        tags,
                        &properties,
                    )?));
                }
                TriggerConfig::EventRule(rule) => {
                    notifications.push(Box::new(EventRuleResource::from_properties(
                        name,
                        tags,
                        &props(json!({
                            "region": self.lake.region(),
                            "account_id": self.lake.account_id(),
                            "targets": [trigger],
                            "event_pattern": rule.to_pattern(),
                        })),
                    )?));
                }
            }
        }
        Ok(notifications)
    }

    fn tasks(&self, roles: &Roles) -> Result<Vec<Box<dyn Resource>>> {
        let target_bucket = self
            .lake
            .bucket_set()
            .find(&self.config.domain, self.config.layers.target)
            .map(|bucket| bucket.uri.clone())
            .unwrap_or_default();
        let temp_uri = format!("{}/temp", target_bucket);
        let default_args: Map<String, Value> = self
            .config
            .argument_names()
            .into_iter()
            .map(|arg| (arg, json!("")))
            .collect();

        let mut tasks: Vec<Box<dyn Resource>> = Vec::new();
        for step in &self.config.steps {
            match step {
                StepConfig::Lambda(task) => {
                    let source = self.root.join("steps").join(&task.module);
                    let mut properties = self.function_properties(&roles.task, source);
                    overlay(&mut properties, &task.properties);
                    debug!(pipeline = %self.config.name, step = %task.step_name, "Building function task");
                    tasks.push(Box::new(FunctionResource::from_properties(
                        self.resource_name(task),
                        self.config.tags.clone(),
                        &properties,
                    )?));
                }
                StepConfig::Glue(task) => {
                    let source = self.root.join("steps").join(&task.module);
                    let mut properties = props(json!({
                        "region": self.lake.region(),
                        "account_id": self.lake.account_id(),
                        "role": roles.batch.value(),
                        "temp_uri": temp_uri,
                        "root": self.root.display().to_string(),
                        "source_folder": source.display().to_string(),
                        "default_args": default_args,
                    }));
                    overlay(&mut properties, &task.properties);
                    debug!(pipeline = %self.config.name, step = %task.step_name, "Building batch task");
                    tasks.push(Box::new(BatchJobResource::from_properties(
                        self.resource_name(task),
                        self.config.tags.clone(),
                        &properties,
                    )?));
                }
                StepConfig::Choice(_) => {}
            }
        }
        Ok(tasks)
    }
}

/// Step properties override the generated ones key by key.
fn overlay(properties: &mut Properties, step_properties: &Properties) {
    for (key, value) in step_properties {
        properties.insert(key.clone(), value.clone());
    }
}
