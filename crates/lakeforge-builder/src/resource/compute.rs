// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Compute: functions and batch jobs.
//!
//! Both kinds point at a source folder on disk. Packaging the code is left to
//! the provisioning side; the factories only check that the folder (and, for
//! functions, the entry point) exists.

use super::{
    Resource, ResourceKind, context, integer_or, one_of, opt_string, require_dir, require_file,
    string, string_map, validated,
};
use crate::cache::ResolutionCache;
use crate::deployment::{DeploymentUnit, ManifestEntry};
use crate::error::{BuildError, Result};
use lakeforge_dsl::schema::{FieldType, Properties};
use lakeforge_dsl::{Name, SchemaError, Tags};
use serde_json::{Map, Value, json};
use std::path::{Path, PathBuf};

const FUNCTION_SCHEMA: &[(&str, FieldType)] = &[
    ("region", FieldType::String),
    ("account_id", FieldType::String),
    ("role", FieldType::String),
    ("root", FieldType::String),
    ("source_folder", FieldType::String),
    ("timeout?", FieldType::Integer),
    ("memory_size?", FieldType::Integer),
    ("environment?", FieldType::Map),
    ("network?", FieldType::String),
    ("network_subnet?", FieldType::String),
];

const BATCH_JOB_SCHEMA: &[(&str, FieldType)] = &[
    ("region", FieldType::String),
    ("account_id", FieldType::String),
    ("glue_version", FieldType::String),
    ("root", FieldType::String),
    ("source_folder", FieldType::String),
    ("role", FieldType::String),
    ("temp_uri", FieldType::String),
    ("default_args?", FieldType::Map),
    ("max_retries?", FieldType::Integer),
    ("max_concurrent_runs?", FieldType::Integer),
    ("timeout_minutes?", FieldType::Integer),
    ("job_bookmark?", FieldType::String),
    ("worker_type?", FieldType::String),
    ("worker_count?", FieldType::Integer),
    ("max_capacity?", FieldType::Float),
];

const FUNCTION_ENTRY_POINT: &str = "src/index.py";

const GLUE_VERSIONS: [&str; 2] = ["pythonshell", "glueetl"];
const JOB_BOOKMARKS: [&str; 3] = ["enable", "disable", "pause"];
const WORKER_TYPES: [&str; 6] = ["STANDARD", "G_025_X", "G_1_X", "G_2_X", "G_4_X", "G_8_X"];
const SUBNETS: [&str; 2] = ["public", "private"];

/// Identifier of the function named `function_name`.
pub fn function_arn(region: &str, account_id: &str, function_name: &str) -> String {
    format!(
        "arn:aws:lambda:{}:{}:function:{}",
        region, account_id, function_name
    )
}

// ============================================================================
// Function
// ============================================================================

#[derive(Debug, Clone)]
pub struct FunctionResource {
    name: Name,
    tags: Tags,
    region: String,
    account_id: String,
    role: String,
    root: PathBuf,
    source_folder: PathBuf,
    timeout: i64,
    memory_size: i64,
    environment: Properties,
    network: Option<(String, String)>,
}

impl FunctionResource {
    /// Timeout defaults to 30 seconds and memory to 512 MB. When `network` is
    /// given, `network_subnet` must be `public` or `private`.
    pub fn from_properties(name: Name, tags: Tags, props: &Properties) -> Result<Self> {
        let kind = ResourceKind::Function;
        validated(kind, &name, FUNCTION_SCHEMA, props)?;

        let source_folder = PathBuf::from(string(props, "source_folder"));
        require_dir(&name, &source_folder)?;
        require_file(&name, &source_folder.join(FUNCTION_ENTRY_POINT))?;

        let network = match opt_string(props, "network") {
            Some(network) => {
                let Some(subnet) = opt_string(props, "network_subnet") else {
                    return Err(BuildError::schema(
                        context(kind, &name),
                        SchemaError::invalid(
                            "network_subnet",
                            "must be given when network is given",
                        ),
                    ));
                };
                one_of(kind, &name, "network_subnet", &subnet, &SUBNETS)?;
                Some((network, subnet))
            }
            None => None,
        };

        Ok(Self {
            region: string(props, "region"),
            account_id: string(props, "account_id"),
            role: string(props, "role"),
            root: PathBuf::from(string(props, "root")),
            timeout: integer_or(props, "timeout", 30),
            memory_size: integer_or(props, "memory_size", 512),
            environment: string_map(kind, &name, "environment", props.get("environment"))?,
            source_folder,
            network,
            name,
            tags,
        })
    }

    pub fn arn(&self) -> String {
        function_arn(&self.region, &self.account_id, &self.name.value())
    }

    pub fn timeout(&self) -> i64 {
        self.timeout
    }

    pub fn memory_size(&self) -> i64 {
        self.memory_size
    }

    pub fn environment(&self) -> &Properties {
        &self.environment
    }

    pub fn source_folder(&self) -> &Path {
        &self.source_folder
    }
}

impl Resource for FunctionResource {
    fn name(&self) -> &Name {
        &self.name
    }

    fn kind(&self) -> ResourceKind {
        ResourceKind::Function
    }

    fn materialize(&self, unit: &mut DeploymentUnit, cache: &mut ResolutionCache) -> Result<()> {
        let role = unit.resolve(cache, &self.role, ResourceKind::Role)?;

        let mut properties = json!({
            "FunctionName": self.name.value(),
            "Role": role.arn,
            "Code": {
                "Root": self.root.display().to_string(),
                "SourceFolder": self.source_folder.display().to_string(),
            },
            "Timeout": self.timeout,
            "MemorySize": self.memory_size,
            "Environment": { "Variables": self.environment },
        });

        if let Some((network, subnet)) = &self.network {
            let network = unit.resolve(cache, network, ResourceKind::Network)?;
            properties["VpcConfig"] = json!({
                "Network": network.arn,
                "SubnetType": subnet,
            });
        }

        let entry = ManifestEntry::new(&self.name, self.kind(), self.arn(), properties)
            .with_tags(&self.tags);
        unit.emit(cache, entry)?;
        Ok(())
    }
}

// ============================================================================
// Batch job
// ============================================================================

#[derive(Debug, Clone)]
pub struct BatchJobResource {
    name: Name,
    tags: Tags,
    region: String,
    account_id: String,
    glue_version: String,
    source_folder: PathBuf,
    role: String,
    temp_uri: String,
    default_args: Properties,
    max_retries: i64,
    max_concurrent_runs: i64,
    timeout_minutes: i64,
    job_bookmark: String,
    worker_type: String,
    worker_count: i64,
    max_capacity: f64,
}

impl BatchJobResource {
    pub fn from_properties(name: Name, tags: Tags, props: &Properties) -> Result<Self> {
        let kind = ResourceKind::BatchJob;
        validated(kind, &name, BATCH_JOB_SCHEMA, props)?;

        let source_folder = PathBuf::from(string(props, "source_folder"));
        require_dir(&name, &source_folder)?;

        let glue_version = string(props, "glue_version");
        one_of(kind, &name, "glue_version", &glue_version, &GLUE_VERSIONS)?;

        let job_bookmark = opt_string(props, "job_bookmark").unwrap_or_else(|| "disable".to_string());
        one_of(kind, &name, "job_bookmark", &job_bookmark, &JOB_BOOKMARKS)?;

        let worker_type = opt_string(props, "worker_type").unwrap_or_else(|| "G_2_X".to_string());
        one_of(kind, &name, "worker_type", &worker_type, &WORKER_TYPES)?;

        let default_args = match props.get("default_args") {
            Some(Value::Object(map)) => map.clone(),
            _ => Properties::new(),
        };

        Ok(Self {
            region: string(props, "region"),
            account_id: string(props, "account_id"),
            role: string(props, "role"),
            temp_uri: string(props, "temp_uri"),
            max_retries: integer_or(props, "max_retries", 0),
            max_concurrent_runs: integer_or(props, "max_concurrent_runs", 1),
            timeout_minutes: integer_or(props, "timeout_minutes", 5),
            worker_count: integer_or(props, "worker_count", 2),
            max_capacity: props
                .get("max_capacity")
                .and_then(Value::as_f64)
                .unwrap_or(0.0625),
            glue_version,
            source_folder,
            default_args,
            job_bookmark,
            worker_type,
            name,
            tags,
        })
    }

    pub fn arn(&self) -> String {
        format!(
            "arn:aws:glue:{}:{}:job/{}",
            self.region,
            self.account_id,
            self.name.value()
        )
    }

    pub fn glue_version(&self) -> &str {
        &self.glue_version
    }

    /// Arguments passed on every run, keyed `--name`.
    pub fn default_arguments(&self) -> Map<String, Value> {
        let mut args = Map::new();
        args.insert(
            "--job-bookmark-option".to_string(),
            Value::from(format!("job-bookmark-{}", self.job_bookmark)),
        );
        args.insert("--TempDir".to_string(), Value::from(self.temp_uri.as_str()));
        for (key, value) in &self.default_args {
            args.insert(format!("--{}", key), value.clone());
        }
        args
    }
}

impl Resource for BatchJobResource {
    fn name(&self) -> &Name {
        &self.name
    }

    fn kind(&self) -> ResourceKind {
        ResourceKind::BatchJob
    }

    fn materialize(&self, unit: &mut DeploymentUnit, cache: &mut ResolutionCache) -> Result<()> {
        let role = unit.resolve(cache, &self.role, ResourceKind::Role)?;

        let mut properties = json!({
            "Name": self.name.value(),
            "Role": role.arn,
            "Command": {
                "Name": self.glue_version,
                "ScriptLocation": self.source_folder.display().to_string(),
            },
            "DefaultArguments": self.default_arguments(),
            "MaxRetries": self.max_retries,
            "ExecutionProperty": { "MaxConcurrentRuns": self.max_concurrent_runs },
            "Timeout": self.timeout_minutes,
        });

        if self.glue_version == "pythonshell" {
            properties["GlueVersion"] = json!("1.0");
            properties["MaxCapacity"] = json!(self.max_capacity);
        } else {
            properties["GlueVersion"] = json!("3.0");
            properties["WorkerType"] = json!(self.worker_type);
            properties["NumberOfWorkers"] = json!(self.worker_count);
        }

        let entry = ManifestEntry::new(&self.name, self.kind(), self.arn(), properties)
            .with_tags(&self.tags);
        unit.emit(cache, entry)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::PlatformHandle;
    use crate::error::ErrorCategory;
    use crate::resource::test_support::props;
    use lakeforge_dsl::Environment;
    use std::fs;
    use tempfile::TempDir;

    fn code_folder(with_entry_point: bool) -> TempDir {
        let dir = TempDir::new().unwrap();
        if with_entry_point {
            fs::create_dir_all(dir.path().join("src")).unwrap();
            fs::write(dir.path().join(FUNCTION_ENTRY_POINT), "def handler(e, c): pass\n").unwrap();
        }
        dir
    }

    fn function_props(folder: &Path) -> Properties {
        props(json!({
            "region": "eu-west-1",
            "account_id": "123456789012",
            "role": "r-dev",
            "root": folder.display().to_string(),
            "source_folder": folder.display().to_string(),
        }))
    }

    fn with_role(unit: &str) -> ResolutionCache {
        let mut cache = ResolutionCache::new();
        cache
            .put(
                "r-dev",
                PlatformHandle {
                    kind: ResourceKind::Role,
                    arn: "arn:aws:iam::123456789012:role/r-dev".to_string(),
                    unit: unit.to_string(),
                },
            )
            .unwrap();
        cache
    }

    #[test]
    fn test_function_defaults() {
        let folder = code_folder(true);
        let function = FunctionResource::from_properties(
            Name::new("f", Environment::Dev),
            Tags::new(),
            &function_props(folder.path()),
        )
        .unwrap();
        assert_eq!(function.timeout(), 30);
        assert_eq!(function.memory_size(), 512);
        assert!(function.environment().is_empty());
        assert_eq!(function.arn(), "arn:aws:lambda:eu-west-1:123456789012:function:f-dev");
    }

    #[test]
    fn test_function_requires_entry_point() {
        let folder = code_folder(false);
        let err = FunctionResource::from_properties(
            Name::new("f", Environment::Dev),
            Tags::new(),
            &function_props(folder.path()),
        )
        .unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Precondition);
        assert!(err.to_string().contains("src/index.py"));
    }

    #[test]
    fn test_function_requires_source_folder() {
        let folder = code_folder(true);
        let mut bag = function_props(folder.path());
        bag.insert(
            "source_folder".to_string(),
            json!(folder.path().join("missing").display().to_string()),
        );
        let err =
            FunctionResource::from_properties(Name::new("f", Environment::Dev), Tags::new(), &bag)
                .unwrap_err();
        assert!(matches!(err, BuildError::Precondition { .. }));
    }

    #[test]
    fn test_function_network_needs_subnet() {
        let folder = code_folder(true);
        let mut bag = function_props(folder.path());
        bag.insert("network".to_string(), json!("vpc-dev"));
        let err =
            FunctionResource::from_properties(Name::new("f", Environment::Dev), Tags::new(), &bag)
                .unwrap_err();
        assert!(err.to_string().contains("network_subnet"));

        bag.insert("network_subnet".to_string(), json!("dmz"));
        let err =
            FunctionResource::from_properties(Name::new("f", Environment::Dev), Tags::new(), &bag)
                .unwrap_err();
        assert!(err.to_string().contains("'dmz' is not one of: public, private"));
    }

    #[test]
    fn test_function_environment_values_must_be_strings() {
        let folder = code_folder(true);
        let mut bag = function_props(folder.path());
        bag.insert("environment".to_string(), json!({"RETRIES": 3}));
        let err =
            FunctionResource::from_properties(Name::new("f", Environment::Dev), Tags::new(), &bag)
                .unwrap_err();
        assert!(err.to_string().contains("environment.RETRIES"));
    }

    #[test]
    fn test_function_materializes_role_arn() {
        let folder = code_folder(true);
        let mut bag = function_props(folder.path());
        bag.insert("memory_size".to_string(), json!(128));
        bag.insert("environment".to_string(), json!({"MODE": "fast"}));
        let function =
            FunctionResource::from_properties(Name::new("f", Environment::Dev), Tags::new(), &bag)
                .unwrap();

        let mut cache = with_role("u");
        let mut unit = DeploymentUnit::new("u");
        function.materialize(&mut unit, &mut cache).unwrap();

        let props = &unit.entry("f-dev").unwrap().properties;
        assert_eq!(props["Role"], "arn:aws:iam::123456789012:role/r-dev");
        assert_eq!(props["MemorySize"], 128);
        assert_eq!(props["Environment"]["Variables"]["MODE"], "fast");
        assert!(props.get("VpcConfig").is_none());
    }

    fn job_props(folder: &Path) -> Properties {
        props(json!({
            "region": "eu-west-1",
            "account_id": "123456789012",
            "glue_version": "pythonshell",
            "root": folder.display().to_string(),
            "source_folder": folder.display().to_string(),
            "role": "r-dev",
            "temp_uri": "s3://sales-trusted/temp",
            "default_args": {"origin_key": ""},
        }))
    }

    #[test]
    fn test_batch_job_defaults_and_arguments() {
        let folder = code_folder(false);
        let job = BatchJobResource::from_properties(
            Name::new("j", Environment::Dev),
            Tags::new(),
            &job_props(folder.path()),
        )
        .unwrap();

        let args = job.default_arguments();
        assert_eq!(args["--job-bookmark-option"], "job-bookmark-disable");
        assert_eq!(args["--TempDir"], "s3://sales-trusted/temp");
        assert_eq!(args["--origin_key"], "");

        let mut cache = with_role("u");
        let mut unit = DeploymentUnit::new("u");
        job.materialize(&mut unit, &mut cache).unwrap();
        let props = &unit.entry("j-dev").unwrap().properties;
        assert_eq!(props["MaxRetries"], 0);
        assert_eq!(props["ExecutionProperty"]["MaxConcurrentRuns"], 1);
        assert_eq!(props["Timeout"], 5);
        assert_eq!(props["MaxCapacity"], 0.0625);
        assert!(props.get("WorkerType").is_none());
    }

    #[test]
    fn test_batch_job_etl_uses_workers() {
        let folder = code_folder(false);
        let mut bag = job_props(folder.path());
        bag.insert("glue_version".to_string(), json!("glueetl"));
        let job =
            BatchJobResource::from_properties(Name::new("j", Environment::Dev), Tags::new(), &bag)
                .unwrap();

        let mut cache = with_role("u");
        let mut unit = DeploymentUnit::new("u");
        job.materialize(&mut unit, &mut cache).unwrap();
        let props = &unit.entry("j-dev").unwrap().properties;
        assert_eq!(props["WorkerType"], "G_2_X");
        assert_eq!(props["NumberOfWorkers"], 2);
    }

    #[test]
    fn test_batch_job_rejects_unknown_version_and_bookmark() {
        let folder = code_folder(false);
        let mut bag = job_props(folder.path());
        bag.insert("glue_version".to_string(), json!("spark"));
        assert!(
            BatchJobResource::from_properties(Name::new("j", Environment::Dev), Tags::new(), &bag)
                .is_err()
        );

        let mut bag = job_props(folder.path());
        bag.insert("job_bookmark".to_string(), json!("resume"));
        let err =
            BatchJobResource::from_properties(Name::new("j", Environment::Dev), Tags::new(), &bag)
                .unwrap_err();
        assert!(err.to_string().contains("job_bookmark"));
    }

    #[test]
    fn test_batch_job_missing_version() {
        let folder = code_folder(false);
        let mut bag = job_props(folder.path());
        bag.remove("glue_version");
        let err =
            BatchJobResource::from_properties(Name::new("j", Environment::Dev), Tags::new(), &bag)
                .unwrap_err();
        assert_eq!(
            err.to_string(),
            "schema error in batch job 'j-dev': missing required field 'glue_version', expected string"
        );
    }
}
