// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Lake compiler CLI
//!
//! Compiles a lake definition and its pipelines into deployment manifests.
//!
//! Usage:
//!
//! ```text
//! lakeforge-compile --lake <path> [--output <dir>]
//! ```
//!
//! Example:
//!
//! ```text
//! LAKEFORGE_ENVIRONMENT=dev lakeforge-compile --lake lake.yml --output ./build
//! ```

use lakeforge_builder::{LakeDefinition, Settings, compile_lake};
use std::error::Error;
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

fn print_usage() {
    eprintln!(
        r#"Usage: lakeforge-compile [OPTIONS]

Compile a lake definition and its pipelines into deployment manifests.

OPTIONS:
    --lake <path>        Path to the lake definition (required)
    --output <dir>       Output directory (default: build)
    --check              Validate and materialize without writing outputs
    --help               Show this help message

ENVIRONMENT:
    LAKEFORGE_REGION         Provider region (required)
    LAKEFORGE_ACCOUNT_ID     12-digit account identifier (required)
    LAKEFORGE_ENVIRONMENT    dev, test, staging or prod (required)
    RUST_LOG                 Log filter (default: warn)

EXAMPLES:
    # Compile into ./build
    lakeforge-compile --lake lake.yml

    # Validate only
    lakeforge-compile --lake lake.yml --check
"#
    );
}

struct Args {
    lake_path: PathBuf,
    output_dir: PathBuf,
    check_only: bool,
}

fn parse_args() -> Result<Args, String> {
    let args: Vec<String> = std::env::args().collect();

    let mut lake_path: Option<PathBuf> = None;
    let mut output_dir = PathBuf::from("build");
    let mut check_only = false;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--help" | "-h" => {
                print_usage();
                std::process::exit(0);
            }
            "--lake" => {
                i += 1;
                if i >= args.len() {
                    return Err("--lake requires a path".to_string());
                }
                lake_path = Some(PathBuf::from(&args[i]));
            }
            "--output" => {
                i += 1;
                if i >= args.len() {
                    return Err("--output requires a path".to_string());
                }
                output_dir = PathBuf::from(&args[i]);
            }
            "--check" => {
                check_only = true;
            }
            arg => {
                return Err(format!("Unknown argument: {}", arg));
            }
        }
        i += 1;
    }

    let lake_path = lake_path.ok_or("--lake is required")?;

    Ok(Args {
        lake_path,
        output_dir,
        check_only,
    })
}

/// Print an error followed by its source chain.
fn report(context: &str, err: &dyn Error) {
    eprintln!("{}: {}", context, err);
    let mut source = err.source();
    while let Some(cause) = source {
        eprintln!("  caused by: {}", cause);
        source = cause.source();
    }
}

fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    // Initialize minimal logging (default to warn if RUST_LOG not set)
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()),
        )
        .with_writer(io::stderr)
        .init();

    let args = match parse_args() {
        Ok(args) => args,
        Err(e) => {
            eprintln!("Error: {}", e);
            eprintln!();
            print_usage();
            return ExitCode::FAILURE;
        }
    };

    let settings = match Settings::from_env() {
        Ok(settings) => settings,
        Err(e) => {
            report("Configuration error", &e);
            return ExitCode::FAILURE;
        }
    };

    let lake = match LakeDefinition::from_file(&args.lake_path) {
        Ok(lake) => lake,
        Err(e) => {
            report("Error reading lake definition", &e);
            return ExitCode::FAILURE;
        }
    };

    eprintln!(
        "Compiling lake: name={}, environment={}, domains={}",
        lake.name,
        settings.environment,
        lake.domains.join(",")
    );

    let compiled = match compile_lake(&settings, &lake) {
        Ok(compiled) => compiled,
        Err(e) => {
            report(&format!("Compilation failed ({:?} error)", e.category()), &e);
            return ExitCode::FAILURE;
        }
    };

    eprintln!("Compilation successful:");
    for unit in &compiled.units {
        eprintln!("  {} ({} resources)", unit.name(), unit.entries().len());
    }

    if args.check_only {
        return ExitCode::SUCCESS;
    }

    match compiled.write_outputs(&args.output_dir) {
        Ok(paths) => {
            // Print written paths to stdout for scripts to capture
            for path in paths {
                println!("{}", path.display());
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            report("Error writing outputs", &e);
            ExitCode::FAILURE
        }
    }
}
