// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Shared lake resources: storage matrix, catalog, crawlers, notification
//! topic and the optional network.

use super::props;
use crate::bucket::BucketSet;
use crate::error::{BuildError, Result};
use crate::resource::{
    BucketResource, CatalogDatabaseResource, CrawlerResource, NetworkEndpointResource,
    NetworkResource, Resource, RoleResource, TopicResource,
};
use crate::settings::{LakeDefinition, Settings};
use lakeforge_dsl::{Environment, Layer, Name};
use serde_json::{Value, json};
use tracing::debug;

/// Services reachable from the private subnets without leaving the network.
pub const NETWORK_ENDPOINT_SERVICES: [&str; 4] = ["s3", "sns", "states", "glue"];

const CRAWLER_ROLE_ACTIONS: &[&str] = &[
    "glue:*",
    "s3:*",
    "iam:ListRolePolicies",
    "iam:GetRole",
    "iam:GetRolePolicy",
    "cloudwatch:PutMetricData",
    "logs:CreateLogGroup",
    "logs:CreateLogStream",
    "logs:PutLogEvents",
];

/// Resources every pipeline of a lake builds on.
///
/// Storage buckets and everything else are kept apart because they are
/// deployed as separate units: buckets first, the rest on top of them.
#[derive(Debug)]
pub struct DatalakePackage {
    name: Name,
    region: String,
    account_id: String,
    bucket_set: BucketSet,
    topic_arn: String,
    network: Option<Name>,
    storage: Vec<Box<dyn Resource>>,
    shared: Vec<Box<dyn Resource>>,
}

impl DatalakePackage {
    pub fn build(settings: &Settings, lake: &LakeDefinition) -> Result<Self> {
        let env = settings.environment;
        let tags = &lake.tags;
        let mut shared: Vec<Box<dyn Resource>> = Vec::new();

        let bucket_set = BucketSet::new(&settings.region, &settings.account_id, &lake.domains, env)
            .map_err(|e| BuildError::schema(format!("lake '{}'", lake.name), e))?;

        let network = if lake.enable_vpc {
            Some(build_network(settings, lake, &mut shared)?)
        } else {
            None
        };

        let subscriptions: Vec<Value> = lake
            .subscriptions
            .iter()
            .map(|s| json!({ "protocol": s.protocol, "endpoint": s.endpoint }))
            .collect();
        let topic = TopicResource::from_properties(
            Name::new("sns-topic", env),
            tags.clone(),
            &props(json!({
                "region": settings.region,
                "account_id": settings.account_id,
                "display_name": lake.topic_display_name,
                "subscriptions": subscriptions,
            })),
        )?;
        let topic_arn = topic.arn();
        shared.push(Box::new(topic));

        let crawler_role = Name::new("glue-crawler", env);
        shared.push(Box::new(RoleResource::from_properties(
            crawler_role.clone(),
            tags.clone(),
            &props(json!({
                "region": settings.region,
                "account_id": settings.account_id,
                "assumed_by": "glue.amazonaws.com",
                "effect": "allow",
                "actions": CRAWLER_ROLE_ACTIONS,
            })),
        )?));

        let mut storage: Vec<Box<dyn Resource>> = Vec::new();
        for bucket in bucket_set.buckets() {
            storage.push(Box::new(BucketResource::from_properties(
                bucket.name.clone(),
                tags.clone(),
                &props(json!({ "removal_policy": lake.bucket_removal_policy })),
            )?));

            shared.push(Box::new(CatalogDatabaseResource::from_properties(
                bucket.database.clone(),
                tags.clone(),
                &props(json!({
                    "region": settings.region,
                    "catalog_id": settings.account_id,
                    "location_uri": bucket.uri,
                    "bucket": bucket.name.value(),
                })),
            )?));

            if bucket.layer == Layer::lowest() {
                shared.push(Box::new(CrawlerResource::from_properties(
                    bucket.crawler.clone(),
                    tags.clone(),
                    &props(json!({
                        "region": settings.region,
                        "account_id": settings.account_id,
                        "role": crawler_role.value(),
                        "database_name": bucket.database.value(),
                        "s3_targets": [bucket.uri],
                        "schedule": lake.crawler_schedule,
                    })),
                )?));
            }
        }

        debug!(
            lake = %lake.name,
            buckets = storage.len(),
            shared = shared.len(),
            network = network.is_some(),
            "Built datalake package"
        );

        Ok(Self {
            name: Name::new(&lake.name, env),
            region: settings.region.clone(),
            account_id: settings.account_id.clone(),
            bucket_set,
            topic_arn,
            network,
            storage,
            shared,
        })
    }

    pub fn name(&self) -> &Name {
        &self.name
    }

    pub fn env(&self) -> Environment {
        self.name.env()
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    pub fn account_id(&self) -> &str {
        &self.account_id
    }

    pub fn bucket_set(&self) -> &BucketSet {
        &self.bucket_set
    }

    /// Identifier of the lake's failure-notification topic.
    pub fn topic_arn(&self) -> &str {
        &self.topic_arn
    }

    /// Name of the lake network, when one is enabled.
    pub fn network(&self) -> Option<&Name> {
        self.network.as_ref()
    }

    pub fn storage_resources(&self) -> &[Box<dyn Resource>] {
        &self.storage
    }

    pub fn shared_resources(&self) -> &[Box<dyn Resource>] {
        &self.shared
    }

    /// Hand over the storage and shared resource lists.
    pub(crate) fn take_resources(&mut self) -> (Vec<Box<dyn Resource>>, Vec<Box<dyn Resource>>) {
        (
            std::mem::take(&mut self.storage),
            std::mem::take(&mut self.shared),
        )
    }
}

fn build_network(
    settings: &Settings,
    lake: &LakeDefinition,
    shared: &mut Vec<Box<dyn Resource>>,
) -> Result<Name> {
    let env = settings.environment;
    let name = Name::new("vpc", env);

    shared.push(Box::new(NetworkResource::from_properties(
        name.clone(),
        lake.tags.clone(),
        &props(json!({
            "region": settings.region,
            "account_id": settings.account_id,
            "cidr": lake.vpc_cidr,
        })),
    )?));

    for service in NETWORK_ENDPOINT_SERVICES {
        shared.push(Box::new(NetworkEndpointResource::from_properties(
            Name::new(format!("vpce-{}", service), env),
            lake.tags.clone(),
            &props(json!({
                "region": settings.region,
                "service": service,
                "network": name.value(),
            })),
        )?));
    }

    Ok(name)
}

#[cfg(test)]
impl DatalakePackage {
    pub(crate) fn for_tests(domains: &[&str], enable_vpc: bool) -> Self {
        let (settings, lake) = test_inputs(domains, enable_vpc);
        Self::build(&settings, &lake).unwrap()
    }
}

#[cfg(test)]
pub(crate) fn test_inputs(domains: &[&str], enable_vpc: bool) -> (Settings, LakeDefinition) {
    let settings = Settings {
        region: "eu-west-1".to_string(),
        account_id: "123456789012".to_string(),
        environment: Environment::Dev,
    };
    let mut document = json!({
        "name": "Example Lake",
        "domains": domains,
        "enable_vpc": enable_vpc,
        "subscriptions": [{"protocol": "email", "endpoint": "ops@example.com"}],
    });
    if enable_vpc {
        document["vpc_cidr"] = json!("10.0.0.0/16");
    }
    let lake = LakeDefinition::from_value(&document, std::path::Path::new(".")).unwrap();
    (settings, lake)
}
