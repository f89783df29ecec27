// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Object storage: buckets and their event notifications.

use super::{Resource, ResourceKind, context, one_of, opt_string, string, validated};
use crate::cache::ResolutionCache;
use crate::deployment::{DeploymentUnit, ManifestEntry};
use crate::error::{BuildError, Result};
use lakeforge_dsl::schema::{FieldType, Properties};
use lakeforge_dsl::{Name, SchemaError, Tags};
use serde_json::{Map, Value, json};

const BUCKET_SCHEMA: &[(&str, FieldType)] = &[("removal_policy?", FieldType::String)];

const NOTIFICATION_SCHEMA: &[(&str, FieldType)] = &[
    ("bucket", FieldType::String),
    ("function", FieldType::String),
    ("event_type", FieldType::String),
    ("prefix?", FieldType::String),
    ("suffix?", FieldType::String),
];

/// What happens to a bucket when its unit is torn down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemovalPolicy {
    Retain,
    Destroy,
    Snapshot,
}

impl RemovalPolicy {
    pub const NAMES: [&'static str; 3] = ["retain", "destroy", "snapshot"];

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "retain" => Some(RemovalPolicy::Retain),
            "destroy" => Some(RemovalPolicy::Destroy),
            "snapshot" => Some(RemovalPolicy::Snapshot),
            _ => None,
        }
    }

    fn deletion_policy(&self) -> &'static str {
        match self {
            RemovalPolicy::Retain => "Retain",
            RemovalPolicy::Destroy => "Delete",
            RemovalPolicy::Snapshot => "Snapshot",
        }
    }
}

// ============================================================================
// Bucket
// ============================================================================

#[derive(Debug, Clone)]
pub struct BucketResource {
    name: Name,
    tags: Tags,
    removal_policy: RemovalPolicy,
}

impl BucketResource {
    /// `removal_policy` defaults to `destroy`.
    pub fn from_properties(name: Name, tags: Tags, props: &Properties) -> Result<Self> {
        let kind = ResourceKind::Bucket;
        validated(kind, &name, BUCKET_SCHEMA, props)?;

        let policy = opt_string(props, "removal_policy").unwrap_or_else(|| "destroy".to_string());
        one_of(kind, &name, "removal_policy", &policy, &RemovalPolicy::NAMES)?;
        let removal_policy = RemovalPolicy::parse(&policy).unwrap_or(RemovalPolicy::Destroy);

        Ok(Self {
            name,
            tags,
            removal_policy,
        })
    }

    pub fn removal_policy(&self) -> RemovalPolicy {
        self.removal_policy
    }

    pub fn arn(&self) -> String {
        format!("arn:aws:s3:::{}", self.name.value())
    }
}

impl Resource for BucketResource {
    fn name(&self) -> &Name {
        &self.name
    }

    fn kind(&self) -> ResourceKind {
        ResourceKind::Bucket
    }

    fn materialize(&self, unit: &mut DeploymentUnit, cache: &mut ResolutionCache) -> Result<()> {
        let entry = ManifestEntry::new(
            &self.name,
            self.kind(),
            self.arn(),
            json!({
                "BucketName": self.name.value(),
                "DeletionPolicy": self.removal_policy.deletion_policy(),
            }),
        )
        .with_tags(&self.tags);
        unit.emit(cache, entry)?;
        Ok(())
    }
}

// ============================================================================
// Bucket notification
// ============================================================================

/// Invokes a function when objects matching a key filter change.
#[derive(Debug, Clone)]
pub struct BucketNotificationResource {
    name: Name,
    tags: Tags,
    bucket: String,
    function: String,
    event: &'static str,
    prefix: Option<String>,
    suffix: Option<String>,
}

impl BucketNotificationResource {
    /// `bucket` and `function` are rendered resource names. At least one of
    /// `prefix` and `suffix` must be non-empty.
    pub fn from_properties(name: Name, tags: Tags, props: &Properties) -> Result<Self> {
        let kind = ResourceKind::BucketNotification;
        validated(kind, &name, NOTIFICATION_SCHEMA, props)?;

        let event_type = string(props, "event_type");
        let event = match event_type.as_str() {
            "object_created" => "s3:ObjectCreated:*",
            "object_removed" => "s3:ObjectRemoved:*",
            other => {
                return Err(BuildError::schema(
                    context(kind, &name),
                    SchemaError::invalid(
                        "event_type",
                        format!("'{}' is not one of: object_created, object_removed", other),
                    ),
                ));
            }
        };

        let prefix = opt_string(props, "prefix").filter(|s| !s.is_empty());
        let suffix = opt_string(props, "suffix").filter(|s| !s.is_empty());
        if prefix.is_none() && suffix.is_none() {
            return Err(BuildError::schema(
                context(kind, &name),
                SchemaError::invalid("prefix", "at least one of prefix or suffix must be given"),
            ));
        }

        Ok(Self {
            bucket: string(props, "bucket"),
            function: string(props, "function"),
            name,
            tags,
            event,
            prefix,
            suffix,
        })
    }
}

impl Resource for BucketNotificationResource {
    fn name(&self) -> &Name {
        &self.name
    }

    fn kind(&self) -> ResourceKind {
        ResourceKind::BucketNotification
    }

    fn materialize(&self, unit: &mut DeploymentUnit, cache: &mut ResolutionCache) -> Result<()> {
        let bucket = unit.resolve(cache, &self.bucket, ResourceKind::Bucket)?;
        let function = unit.resolve(cache, &self.function, ResourceKind::Function)?;

        let mut filter = Map::new();
        if let Some(prefix) = &self.prefix {
            filter.insert("Prefix".to_string(), Value::from(prefix.as_str()));
        }
        if let Some(suffix) = &self.suffix {
            filter.insert("Suffix".to_string(), Value::from(suffix.as_str()));
        }

        let entry = ManifestEntry::new(
            &self.name,
            self.kind(),
            format!("{}/notification/{}", bucket.arn, self.name.value()),
            json!({
                "Bucket": bucket.arn,
                "Events": [self.event],
                "Destination": function.arn,
                "Filter": filter,
            }),
        )
        .with_tags(&self.tags);
        unit.emit(cache, entry)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::PlatformHandle;
    use crate::resource::test_support::props;
    use lakeforge_dsl::Environment;

    fn name(label: &str) -> Name {
        Name::new(label, Environment::Dev)
    }

    #[test]
    fn test_bucket_defaults_to_destroy() {
        let bucket = BucketResource::from_properties(name("sales-raw"), Tags::new(), &props(json!({})))
            .unwrap();
        assert_eq!(bucket.removal_policy(), RemovalPolicy::Destroy);
        assert_eq!(bucket.arn(), "arn:aws:s3:::sales-raw-dev");
    }

    #[test]
    fn test_bucket_rejects_unknown_policy() {
        let err = BucketResource::from_properties(
            name("b"),
            Tags::new(),
            &props(json!({"removal_policy": "keep"})),
        )
        .unwrap_err();
        assert!(err.to_string().contains("'keep' is not one of: retain, destroy, snapshot"));
    }

    #[test]
    fn test_bucket_materializes_with_tags() {
        let bucket = BucketResource::from_properties(
            name("b"),
            Tags::new().with("team", "data"),
            &props(json!({"removal_policy": "retain"})),
        )
        .unwrap();
        let mut cache = ResolutionCache::new();
        let mut unit = DeploymentUnit::new("storage");
        bucket.materialize(&mut unit, &mut cache).unwrap();

        let entry = unit.entry("b-dev").unwrap();
        assert_eq!(entry.properties["DeletionPolicy"], "Retain");
        assert_eq!(entry.tags.get("team"), Some("data"));
        assert_eq!(cache.get("b-dev").unwrap().arn, "arn:aws:s3:::b-dev");
    }

    #[test]
    fn test_notification_requires_filter() {
        let err = BucketNotificationResource::from_properties(
            name("n"),
            Tags::new(),
            &props(json!({"bucket": "b-dev", "function": "f-dev", "event_type": "object_created"})),
        )
        .unwrap_err();
        assert!(err.to_string().contains("at least one of prefix or suffix"));
    }

    #[test]
    fn test_notification_resolves_bucket_and_function() {
        let mut cache = ResolutionCache::new();
        let mut unit = DeploymentUnit::new("u");
        cache
            .put(
                "b-dev",
                PlatformHandle {
                    kind: ResourceKind::Bucket,
                    arn: "arn:aws:s3:::b-dev".to_string(),
                    unit: "u".to_string(),
                },
            )
            .unwrap();
        cache
            .put(
                "f-dev",
                PlatformHandle {
                    kind: ResourceKind::Function,
                    arn: "arn:aws:lambda:eu-west-1:1:function:f-dev".to_string(),
                    unit: "u".to_string(),
                },
            )
            .unwrap();

        let notification = BucketNotificationResource::from_properties(
            name("n"),
            Tags::new(),
            &props(json!({
                "bucket": "b-dev", "function": "f-dev",
                "event_type": "object_created", "suffix": ".json"
            })),
        )
        .unwrap();
        notification.materialize(&mut unit, &mut cache).unwrap();

        let entry = unit.entry("n-dev").unwrap();
        assert_eq!(entry.properties["Events"][0], "s3:ObjectCreated:*");
        assert_eq!(entry.properties["Filter"], json!({"Suffix": ".json"}));
        assert!(entry.properties.get("Filter").unwrap().get("Prefix").is_none());
    }

    #[test]
    fn test_notification_on_missing_bucket_fails() {
        let notification = BucketNotificationResource::from_properties(
            name("n"),
            Tags::new(),
            &props(json!({
                "bucket": "b-dev", "function": "f-dev",
                "event_type": "object_created", "prefix": "in/"
            })),
        )
        .unwrap();
        let err = notification
            .materialize(&mut DeploymentUnit::new("u"), &mut ResolutionCache::new())
            .unwrap_err();
        assert_eq!(err.category(), crate::error::ErrorCategory::Resolution);
    }
}
