// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Compilation settings.
//!
//! Deployment target (region, account, stage) comes from the environment;
//! the shape of the lake comes from a `lake.yml` document.

use crate::error::{BuildError, Result};
use crate::resource::{RemovalPolicy, Subscription};
use lakeforge_dsl::schema::{
    FieldType, as_properties, required_str, string_list, validate_properties,
};
use lakeforge_dsl::{Environment, SchemaError, Tags};
use serde_json::Value;
use std::path::{Path, PathBuf};

pub const DEFAULT_PIPELINES_PATH: &str = "pipelines";
pub const DEFAULT_VPC_CIDR: &str = "192.168.228.0/22";
pub const DEFAULT_CRAWLER_SCHEDULE: &str = "cron(0 0 * * ? *)";
pub const DEFAULT_BUCKET_REMOVAL_POLICY: &str = "retain";

/// Deployment target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub region: String,
    pub account_id: String,
    pub environment: Environment,
}

impl Settings {
    /// Load settings from environment variables.
    ///
    /// Required:
    /// - `LAKEFORGE_REGION`: provider region, e.g. `eu-west-1`
    /// - `LAKEFORGE_ACCOUNT_ID`: 12-digit account identifier
    /// - `LAKEFORGE_ENVIRONMENT`: one of `dev`, `test`, `staging`, `prod`
    pub fn from_env() -> std::result::Result<Self, SettingsError> {
        let region = std::env::var("LAKEFORGE_REGION")
            .map_err(|_| SettingsError::Missing("LAKEFORGE_REGION"))?;
        if region.trim().is_empty() {
            return Err(SettingsError::Invalid("LAKEFORGE_REGION", "must not be empty"));
        }

        let account_id = std::env::var("LAKEFORGE_ACCOUNT_ID")
            .map_err(|_| SettingsError::Missing("LAKEFORGE_ACCOUNT_ID"))?;
        if account_id.len() != 12 || !account_id.bytes().all(|b| b.is_ascii_digit()) {
            return Err(SettingsError::Invalid(
                "LAKEFORGE_ACCOUNT_ID",
                "must be a 12-digit account identifier",
            ));
        }

        let environment = std::env::var("LAKEFORGE_ENVIRONMENT")
            .map_err(|_| SettingsError::Missing("LAKEFORGE_ENVIRONMENT"))
            .and_then(|raw| {
                Environment::parse(&raw).ok_or(SettingsError::Invalid(
                    "LAKEFORGE_ENVIRONMENT",
                    "must be one of dev, test, staging, prod",
                ))
            })?;

        Ok(Self {
            region,
            account_id,
            environment,
        })
    }
}

/// Settings errors
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    /// A required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    Missing(&'static str),

    /// An environment variable has an invalid value.
    #[error("invalid value for {0}: {1}")]
    Invalid(&'static str, &'static str),
}

// ============================================================================
// Lake definition
// ============================================================================

const LAKE_SCHEMA: &[(&str, FieldType)] = &[
    ("name", FieldType::String),
    ("domains", FieldType::List),
    ("pipelines_path?", FieldType::String),
    ("enable_vpc?", FieldType::Boolean),
    ("vpc_cidr?", FieldType::String),
    ("topic_display_name?", FieldType::String),
    ("subscriptions?", FieldType::List),
    ("tags?", FieldType::Map),
    ("crawler_schedule?", FieldType::String),
    ("bucket_removal_policy?", FieldType::String),
];

/// Shape of the lake: domains, shared services and where pipelines live.
#[derive(Debug, Clone, PartialEq)]
pub struct LakeDefinition {
    pub name: String,
    pub domains: Vec<String>,
    /// Directory whose subdirectories each hold one `config.yml`.
    pub pipelines_path: PathBuf,
    pub enable_vpc: bool,
    pub vpc_cidr: String,
    pub topic_display_name: String,
    pub subscriptions: Vec<Subscription>,
    /// Tags applied to every shared resource.
    pub tags: Tags,
    pub crawler_schedule: String,
    pub bucket_removal_policy: String,
}

impl LakeDefinition {
    /// Read a lake document. `pipelines_path` is resolved against the
    /// document's directory.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| BuildError::io(path, e))?;
        let document = lakeforge_dsl::parse_document(&text).map_err(|source| BuildError::Config {
            path: path.to_path_buf(),
            source,
        })?;

        let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
        Self::from_value(&document, base_dir).map_err(|e| BuildError::Config {
            path: path.to_path_buf(),
            source: e.into(),
        })
    }

    /// Build a lake definition from a parsed document.
    pub fn from_value(document: &Value, base_dir: &Path) -> std::result::Result<Self, SchemaError> {
        let props = as_properties("lake", document)?;
        validate_properties(LAKE_SCHEMA, props)?;

        let name = required_str(props, "name")?;
        let domains = string_list("domains", &props["domains"])?;
        if domains.is_empty() {
            return Err(SchemaError::invalid("domains", "at least one domain is required"));
        }

        let text = |field: &str, default: &str| -> String {
            props
                .get(field)
                .and_then(Value::as_str)
                .unwrap_or(default)
                .to_string()
        };

        let pipelines_path = base_dir.join(text("pipelines_path", DEFAULT_PIPELINES_PATH));

        let subscriptions = match props.get("subscriptions") {
            Some(Value::Array(entries)) => entries
                .iter()
                .enumerate()
                .map(|(i, entry)| Subscription::from_value(&format!("subscriptions[{}]", i), entry))
                .collect::<std::result::Result<Vec<_>, _>>()?,
            _ => Vec::new(),
        };

        let mut tags = Tags::new();
        tags.add("lake", name.as_str());
        if let Some(Value::Object(extra)) = props.get("tags") {
            tags.extend_from_document(extra)?;
        }

        let bucket_removal_policy = text("bucket_removal_policy", DEFAULT_BUCKET_REMOVAL_POLICY);
        if RemovalPolicy::parse(&bucket_removal_policy).is_none() {
            return Err(SchemaError::invalid(
                "bucket_removal_policy",
                format!(
                    "'{}' is not one of: {}",
                    bucket_removal_policy,
                    RemovalPolicy::NAMES.join(", ")
                ),
            ));
        }

        Ok(Self {
            topic_display_name: text("topic_display_name", &name),
            enable_vpc: props
                .get("enable_vpc")
                .and_then(Value::as_bool)
                .unwrap_or(false),
            vpc_cidr: text("vpc_cidr", DEFAULT_VPC_CIDR),
            crawler_schedule: text("crawler_schedule", DEFAULT_CRAWLER_SCHEDULE),
            name,
            domains,
            pipelines_path,
            subscriptions,
            tags,
            bucket_removal_policy,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::env;
    use std::sync::Mutex;

    // Mutex to serialize tests that modify environment variables
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    /// Helper to set env vars for a test and restore them after
    struct EnvGuard {
        vars: Vec<(String, Option<String>)>,
    }

    impl EnvGuard {
        fn new() -> Self {
            Self { vars: Vec::new() }
        }

        fn set(&mut self, key: &str, value: &str) {
            let old = env::var(key).ok();
            self.vars.push((key.to_string(), old));
            // SAFETY: Tests are serialized via ENV_MUTEX, so no concurrent access
            unsafe { env::set_var(key, value) };
        }

        fn remove(&mut self, key: &str) {
            let old = env::var(key).ok();
            self.vars.push((key.to_string(), old));
            // SAFETY: Tests are serialized via ENV_MUTEX, so no concurrent access
            unsafe { env::remove_var(key) };
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            for (key, value) in self.vars.drain(..).rev() {
                // SAFETY: Tests are serialized via ENV_MUTEX, so no concurrent access
                unsafe {
                    match value {
                        Some(v) => env::set_var(&key, v),
                        None => env::remove_var(&key),
                    }
                }
            }
        }
    }

    fn set_all(guard: &mut EnvGuard) {
        guard.set("LAKEFORGE_REGION", "eu-west-1");
        guard.set("LAKEFORGE_ACCOUNT_ID", "123456789012");
        guard.set("LAKEFORGE_ENVIRONMENT", "Staging");
    }

    #[test]
    fn test_settings_from_env() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::new();
        set_all(&mut guard);

        let settings = Settings::from_env().unwrap();
        assert_eq!(settings.region, "eu-west-1");
        assert_eq!(settings.account_id, "123456789012");
        assert_eq!(settings.environment, Environment::Staging);
    }

    #[test]
    fn test_settings_missing_region() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::new();
        set_all(&mut guard);
        guard.remove("LAKEFORGE_REGION");

        let err = Settings::from_env().unwrap_err();
        assert!(matches!(err, SettingsError::Missing("LAKEFORGE_REGION")));
    }

    #[test]
    fn test_settings_invalid_account() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::new();
        set_all(&mut guard);
        guard.set("LAKEFORGE_ACCOUNT_ID", "12345");

        let err = Settings::from_env().unwrap_err();
        assert!(matches!(err, SettingsError::Invalid("LAKEFORGE_ACCOUNT_ID", _)));
    }

    #[test]
    fn test_settings_invalid_environment() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::new();
        set_all(&mut guard);
        guard.set("LAKEFORGE_ENVIRONMENT", "qa");

        let err = Settings::from_env().unwrap_err();
        assert!(err.to_string().contains("LAKEFORGE_ENVIRONMENT"));
    }

    #[test]
    fn test_lake_defaults() {
        let lake = LakeDefinition::from_value(
            &json!({"name": "example", "domains": ["sales"]}),
            Path::new("/srv/lake"),
        )
        .unwrap();
        assert_eq!(lake.pipelines_path, PathBuf::from("/srv/lake/pipelines"));
        assert!(!lake.enable_vpc);
        assert_eq!(lake.vpc_cidr, DEFAULT_VPC_CIDR);
        assert_eq!(lake.crawler_schedule, DEFAULT_CRAWLER_SCHEDULE);
        assert_eq!(lake.bucket_removal_policy, "retain");
        assert_eq!(lake.topic_display_name, "example");
        assert_eq!(lake.tags.get("lake"), Some("example"));
    }

    #[test]
    fn test_lake_full_document() {
        let lake = LakeDefinition::from_value(
            &json!({
                "name": "example",
                "domains": ["sales", "finance"],
                "pipelines_path": "flows",
                "enable_vpc": true,
                "subscriptions": [{"protocol": "email", "endpoint": "ops@example.com"}],
                "tags": {"Cost_Center": 7},
                "bucket_removal_policy": "snapshot",
            }),
            Path::new("base"),
        )
        .unwrap();
        assert_eq!(lake.domains, vec!["sales", "finance"]);
        assert_eq!(lake.pipelines_path, PathBuf::from("base/flows"));
        assert!(lake.enable_vpc);
        assert_eq!(lake.subscriptions[0].protocol, "email");
        assert_eq!(lake.tags.get("cost-center"), Some("7"));
    }

    #[test]
    fn test_lake_rejects_bad_documents() {
        let base = Path::new(".");
        let err = LakeDefinition::from_value(&json!({"name": "x", "domains": []}), base).unwrap_err();
        assert_eq!(err.field(), "domains");

        let err =
            LakeDefinition::from_value(&json!({"name": "x", "domains": ["a", 3]}), base).unwrap_err();
        assert_eq!(err.field(), "domains[1]");

        let err = LakeDefinition::from_value(
            &json!({"name": "x", "domains": ["a"], "bucket_removal_policy": "keep"}),
            base,
        )
        .unwrap_err();
        assert_eq!(err.field(), "bucket_removal_policy");

        let err = LakeDefinition::from_value(&json!({"domains": ["a"]}), base).unwrap_err();
        assert!(matches!(err, SchemaError::MissingField { .. }));
    }
}
