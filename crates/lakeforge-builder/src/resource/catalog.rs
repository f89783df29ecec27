// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Data catalog: databases and the crawlers that populate them.

use super::{Resource, ResourceKind, context, opt_string, string, strings, validated};
use crate::cache::ResolutionCache;
use crate::deployment::{DeploymentUnit, ManifestEntry};
use crate::error::{BuildError, Result};
use lakeforge_dsl::schema::{FieldType, Properties};
use lakeforge_dsl::{Name, SchemaError, Tags};
use serde_json::json;

const DATABASE_SCHEMA: &[(&str, FieldType)] = &[
    ("region", FieldType::String),
    ("catalog_id", FieldType::String),
    ("location_uri", FieldType::String),
    ("bucket?", FieldType::String),
];

const CRAWLER_SCHEMA: &[(&str, FieldType)] = &[
    ("region", FieldType::String),
    ("account_id", FieldType::String),
    ("role", FieldType::String),
    ("database_name", FieldType::String),
    ("s3_targets", FieldType::List),
    ("schedule?", FieldType::String),
];

#[derive(Debug, Clone)]
pub struct CatalogDatabaseResource {
    name: Name,
    tags: Tags,
    region: String,
    catalog_id: String,
    location_uri: String,
    bucket: Option<String>,
}

impl CatalogDatabaseResource {
    /// When `bucket` names a bucket resource, materialization requires it to
    /// exist already.
    pub fn from_properties(name: Name, tags: Tags, props: &Properties) -> Result<Self> {
        validated(ResourceKind::CatalogDatabase, &name, DATABASE_SCHEMA, props)?;

        Ok(Self {
            region: string(props, "region"),
            catalog_id: string(props, "catalog_id"),
            location_uri: string(props, "location_uri"),
            bucket: opt_string(props, "bucket"),
            name,
            tags,
        })
    }

    pub fn arn(&self) -> String {
        format!(
            "arn:aws:glue:{}:{}:database/{}",
            self.region,
            self.catalog_id,
            self.name.value()
        )
    }
}

impl Resource for CatalogDatabaseResource {
    fn name(&self) -> &Name {
        &self.name
    }

    fn kind(&self) -> ResourceKind {
        ResourceKind::CatalogDatabase
    }

    fn materialize(&self, unit: &mut DeploymentUnit, cache: &mut ResolutionCache) -> Result<()> {
        let mut properties = json!({
            "CatalogId": self.catalog_id,
            "DatabaseInput": {
                "Name": self.name.value(),
                "LocationUri": self.location_uri,
            },
        });
        if let Some(bucket) = &self.bucket {
            let bucket = unit.resolve(cache, bucket, ResourceKind::Bucket)?;
            properties["Bucket"] = json!(bucket.arn);
        }

        let entry = ManifestEntry::new(&self.name, self.kind(), self.arn(), properties)
            .with_tags(&self.tags);
        unit.emit(cache, entry)?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct CrawlerResource {
    name: Name,
    tags: Tags,
    region: String,
    account_id: String,
    role: String,
    database_name: String,
    s3_targets: Vec<String>,
    schedule: Option<String>,
}

impl CrawlerResource {
    /// `schedule`, when given, must be a `cron(...)` expression.
    pub fn from_properties(name: Name, tags: Tags, props: &Properties) -> Result<Self> {
        let kind = ResourceKind::Crawler;
        validated(kind, &name, CRAWLER_SCHEMA, props)?;

        let schedule = opt_string(props, "schedule").filter(|s| !s.is_empty());
        if let Some(schedule) = &schedule
            && !schedule.starts_with("cron(")
        {
            return Err(BuildError::schema(
                context(kind, &name),
                SchemaError::invalid("schedule", "expected a cron(...) expression"),
            ));
        }

        Ok(Self {
            region: string(props, "region"),
            account_id: string(props, "account_id"),
            role: string(props, "role"),
            database_name: string(props, "database_name"),
            s3_targets: strings(props, "s3_targets"),
            schedule,
            name,
            tags,
        })
    }

    pub fn schedule(&self) -> Option<&str> {
        self.schedule.as_deref()
    }
}

impl Resource for CrawlerResource {
    fn name(&self) -> &Name {
        &self.name
    }

    fn kind(&self) -> ResourceKind {
        ResourceKind::Crawler
    }

    fn materialize(&self, unit: &mut DeploymentUnit, cache: &mut ResolutionCache) -> Result<()> {
        let role = unit.resolve(cache, &self.role, ResourceKind::Role)?;
        unit.resolve(cache, &self.database_name, ResourceKind::CatalogDatabase)?;

        let targets: Vec<_> = self.s3_targets.iter().map(|p| json!({ "Path": p })).collect();
        let mut properties = json!({
            "Name": self.name.value(),
            "Role": role.arn,
            "DatabaseName": self.database_name,
            "Targets": { "S3Targets": targets },
            "SchemaChangePolicy": { "UpdateBehavior": "LOG", "DeleteBehavior": "LOG" },
            "RecrawlPolicy": { "RecrawlBehavior": "CRAWL_NEW_FOLDERS_ONLY" },
        });
        if let Some(schedule) = &self.schedule {
            properties["Schedule"] = json!({ "ScheduleExpression": schedule });
        }

        let arn = format!(
            "arn:aws:glue:{}:{}:crawler/{}",
            self.region,
            self.account_id,
            self.name.value()
        );
        let entry =
            ManifestEntry::new(&self.name, self.kind(), arn, properties).with_tags(&self.tags);
        unit.emit(cache, entry)?;
        Ok(())
    }
}
