// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! End-to-end compilation of the fixture lake.

use lakeforge_builder::{
    BuildError, CompiledLake, ErrorCategory, GraphError, LakeDefinition, Settings, compile_lake,
};
use lakeforge_dsl::Environment;
use serde_json::Value;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

const LAKE: &str = include_str!("fixtures/lake.yml");
const ORDERS: &str = include_str!("fixtures/pipelines/orders/config.yml");
const INVOICES: &str = include_str!("fixtures/pipelines/invoices/config.yml");

fn settings() -> Settings {
    Settings {
        region: "eu-west-1".to_string(),
        account_id: "123456789012".to_string(),
        environment: Environment::Dev,
    }
}

fn code_folder(dir: &Path) {
    fs::create_dir_all(dir.join("src")).unwrap();
    fs::write(dir.join("src/index.py"), "def handler(event, context):\n    return event\n").unwrap();
}

type PipelineDir<'a> = (&'a str, &'a str, &'a [&'a str]);

fn pipeline<'a>(name: &'a str, config: &'a str, modules: &'a [&'a str]) -> PipelineDir<'a> {
    (name, config, modules)
}

/// Lay out a lake directory with the fixture documents and every source
/// folder the pipelines need.
fn lake_tree(pipelines: &[PipelineDir<'_>]) -> TempDir {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("lake.yml"), LAKE).unwrap();

    for (name, config, modules) in pipelines {
        let root = dir.path().join("pipelines").join(name);
        fs::create_dir_all(&root).unwrap();
        fs::write(root.join("config.yml"), config).unwrap();
        code_folder(&root.join("catch"));
        code_folder(&root.join("trigger"));
        for module in *modules {
            code_folder(&root.join("steps").join(module));
        }
    }
    dir
}

fn fixture_tree() -> TempDir {
    lake_tree(&[
        pipeline("orders", ORDERS, &["route_file", "process_bulk", "add_to_database"]),
        pipeline("invoices", INVOICES, &["publish"]),
    ])
}

fn compile(dir: &TempDir) -> Result<CompiledLake, BuildError> {
    let lake = LakeDefinition::from_file(&dir.path().join("lake.yml"))?;
    compile_lake(&settings(), &lake)
}

#[test]
fn test_units_are_ordered_storage_shared_pipelines() {
    let dir = fixture_tree();
    let compiled = compile(&dir).unwrap();

    let order: Vec<&str> = compiled.units.iter().map(|u| u.name()).collect();
    assert_eq!(
        order,
        vec![
            "lake-storage-stack-dev",
            "lake-shared-stack-dev",
            "lake-invoices-stack-dev",
            "lake-orders-stack-dev",
        ]
    );

    let storage = &compiled.units[0];
    assert_eq!(storage.entries().len(), 6);
    assert!(storage.depends_on().is_empty());

    // topic, crawler role, six databases, one crawler per domain
    let shared = &compiled.units[1];
    assert_eq!(shared.entries().len(), 10);
    assert_eq!(shared.depends_on(), ["lake-storage-stack-dev".to_string()]);

    for pipeline in &compiled.units[2..] {
        assert_eq!(pipeline.depends_on(), ["lake-shared-stack-dev".to_string()]);
    }
}

#[test]
fn test_pipeline_units_only_see_their_ancestors() {
    let dir = fixture_tree();
    let compiled = compile(&dir).unwrap();

    let orders = compiled.unit("lake-orders-stack-dev").unwrap();
    assert!(orders.can_see("lake-storage-stack-dev"));
    assert!(orders.can_see("lake-shared-stack-dev"));
    assert!(!orders.can_see("lake-invoices-stack-dev"));
}

#[test]
fn test_orders_pipeline_resources() {
    let dir = fixture_tree();
    let compiled = compile(&dir).unwrap();
    let orders = compiled.unit("lake-orders-stack-dev").unwrap();

    let route = orders.entry("orders-route-file-dev").unwrap();
    assert_eq!(route.properties["Timeout"], 60);
    assert_eq!(route.properties["MemorySize"], 256);
    assert_eq!(
        route.properties["Role"],
        "arn:aws:iam::123456789012:role/orders-role-lambda-dev"
    );
    assert_eq!(route.tags.get("pipeline"), Some("orders"));
    assert_eq!(route.tags.get("version"), Some("1.0.0"));

    let bulk = orders.entry("orders-process-bulk-dev").unwrap();
    assert_eq!(bulk.properties["GlueVersion"], "3.0");
    assert_eq!(bulk.properties["NumberOfWorkers"], 4);
    assert_eq!(bulk.properties["DefaultArguments"]["--file_key"], "");
    assert_eq!(
        bulk.properties["DefaultArguments"]["--TempDir"],
        "s3://sales-trusted-eu-west-1-123456789012-dev/temp"
    );

    let notification = orders.entry("orders-event-0-dev").unwrap();
    assert_eq!(
        notification.properties["Bucket"],
        "arn:aws:s3:::sales-raw-eu-west-1-123456789012-dev"
    );
    assert_eq!(notification.properties["Filter"]["Prefix"], "orders/");

    let catch = orders.entry("orders-catch-dev").unwrap();
    assert_eq!(
        catch.properties["Environment"]["Variables"]["SNS_TOPIC_ARN"],
        "arn:aws:sns:eu-west-1:123456789012:sns-topic-dev"
    );

    let trigger = orders.entry("orders-trigger-dev").unwrap();
    assert_eq!(
        trigger.properties["Environment"]["Variables"]["STATE_MACHINE_ARN"],
        "arn:aws:states:eu-west-1:123456789012:stateMachine:orders-dev"
    );
    assert_eq!(trigger.properties["Environment"]["Variables"]["TRIGGER_LAYER"], "raw");
}

#[test]
fn test_orders_graph_definition() {
    let dir = fixture_tree();
    let compiled = compile(&dir).unwrap();

    let orders = compiled
        .definitions
        .iter()
        .find(|d| d.pipeline == "orders-dev")
        .unwrap();
    let definition = &orders.definition;
    let states: Vec<&String> = definition.states.keys().collect();
    assert_eq!(
        states,
        vec!["Catch", "AddToDatabase", "ProcessBulk", "RouteChoice", "RouteFile"]
    );
    assert_eq!(definition.start_at, "RouteFile");
    assert_eq!(definition.states["RouteFile"]["Next"], "RouteChoice");
    assert_eq!(definition.states["AddToDatabase"]["End"], true);

    let choices = definition.states["RouteChoice"]["Choices"].as_array().unwrap();
    assert_eq!(choices.len(), 2);
    assert_eq!(choices[0]["Variable"], "$.route");
    assert_eq!(choices[0]["Next"], "ProcessBulk");
    assert_eq!(definition.states["RouteChoice"]["Default"], "Catch");

    assert_eq!(
        definition.states["ProcessBulk"]["Parameters"]["Arguments"]["--batch_id.$"],
        "$.batch_id"
    );
    assert_eq!(definition.states["ProcessBulk"]["Catch"][0]["Next"], "Catch");
}

#[test]
fn test_outputs_are_reproducible() {
    let dir = fixture_tree();
    let first = compile(&dir).unwrap();
    let second = compile(&dir).unwrap();

    for (a, b) in first.units.iter().zip(&second.units) {
        assert_eq!(a.manifest().unwrap().fingerprint, b.manifest().unwrap().fingerprint);
    }

    let out = dir.path().join("build");
    let written = first.write_outputs(&out).unwrap();
    assert_eq!(written.len(), 6);
    assert!(out.join("04-lake-orders-stack-dev.manifest.json").is_file());
    assert!(out.join("orders-dev.definition.json").is_file());

    let text = fs::read_to_string(out.join("invoices-dev.definition.json")).unwrap();
    let definition: Value = serde_json::from_str(&text).unwrap();
    assert_eq!(definition["StartAt"], "Publish");
}

#[test]
fn test_dangling_step_aborts_the_whole_run() {
    let broken = ORDERS.replace("next: AddToDatabase", "next: AddToDatabse");
    let dir = lake_tree(&[
        pipeline("orders", &broken, &["route_file", "process_bulk", "add_to_database"]),
        pipeline("invoices", INVOICES, &["publish"]),
    ]);

    let err = compile(&dir).unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Referential);
    let BuildError::Graph { pipeline, source } = err else {
        panic!("expected a graph error");
    };
    assert_eq!(pipeline, "orders-dev");
    assert!(matches!(source, GraphError::DanglingNext { .. }));
    assert!(source.to_string().contains("Did you mean 'AddToDatabase'?"));
}

#[test]
fn test_unknown_trigger_is_referential() {
    let broken = INVOICES.replace("event_rule:", "schedule:");
    let dir = lake_tree(&[pipeline("invoices", &broken, &["publish"])]);

    let err = compile(&dir).unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Referential);
    assert!(matches!(err, BuildError::Config { .. }));
}

#[test]
fn test_missing_step_source_is_a_precondition_error() {
    let dir = lake_tree(&[pipeline("invoices", INVOICES, &[])]);

    let err = compile(&dir).unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Precondition);
    assert!(err.to_string().contains("invoices-publish-dev"));
}

#[test]
fn test_lake_document_is_loaded_relative_to_its_directory() {
    let dir = fixture_tree();
    let lake = LakeDefinition::from_file(&dir.path().join("lake.yml")).unwrap();

    assert_eq!(lake.pipelines_path, dir.path().join("pipelines"));
    assert_eq!(lake.domains, vec!["sales", "finance"]);
    assert_eq!(lake.topic_display_name, "Example Lake alerts");
    assert_eq!(lake.tags.get("cost-center"), Some("42"));
    assert_eq!(lake.crawler_schedule, "cron(0 3 * * ? *)");
}
