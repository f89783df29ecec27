// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Errors raised while compiling a lake.

use crate::cache::ResolutionError;
use crate::deployment::PlanError;
use crate::graph::GraphError;
use crate::settings::SettingsError;
use lakeforge_dsl::{DslError, SchemaError};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Coarse classification of a [`BuildError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Missing or mistyped configuration.
    Schema,
    /// Unknown kind or dangling step reference.
    Referential,
    /// A required external asset is missing.
    Precondition,
    /// A handle was looked up before it was produced, or produced twice.
    Resolution,
    /// Deployment units cannot be ordered.
    Plan,
    /// Reading documents or writing outputs failed.
    Io,
}

/// Errors that abort a compilation run.
#[derive(Debug, Error)]
pub enum BuildError {
    /// A resource descriptor or lake document had the wrong shape.
    #[error("schema error in {context}: {source}")]
    Schema {
        context: String,
        #[source]
        source: SchemaError,
    },

    /// A configuration document failed to parse.
    #[error("invalid configuration {}: {source}", path.display())]
    Config {
        path: PathBuf,
        #[source]
        source: DslError,
    },

    /// A pipeline's steps do not form a valid graph.
    #[error("pipeline '{pipeline}': {source}")]
    Graph {
        pipeline: String,
        #[source]
        source: GraphError,
    },

    /// A resource needs an asset that does not exist.
    #[error("precondition failed for '{resource}': {reason}")]
    Precondition { resource: String, reason: String },

    #[error("resolution error: {0}")]
    Resolution(#[from] ResolutionError),

    #[error("deployment plan error: {0}")]
    Plan(#[from] PlanError),

    #[error("settings error: {0}")]
    Settings(#[from] SettingsError),

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize {what}: {source}")]
    Serialize {
        what: String,
        #[source]
        source: serde_json::Error,
    },
}

impl BuildError {
    pub fn schema(context: impl fmt::Display, source: SchemaError) -> Self {
        BuildError::Schema {
            context: context.to_string(),
            source,
        }
    }

    pub fn precondition(resource: impl fmt::Display, reason: impl Into<String>) -> Self {
        BuildError::Precondition {
            resource: resource.to_string(),
            reason: reason.into(),
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        BuildError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            BuildError::Schema { .. } | BuildError::Settings(_) => ErrorCategory::Schema,
            BuildError::Config { source, .. } if source.is_referential() => {
                ErrorCategory::Referential
            }
            BuildError::Config { .. } => ErrorCategory::Schema,
            BuildError::Graph { .. } => ErrorCategory::Referential,
            BuildError::Precondition { .. } => ErrorCategory::Precondition,
            BuildError::Resolution(_) => ErrorCategory::Resolution,
            BuildError::Plan(_) => ErrorCategory::Plan,
            BuildError::Io { .. } | BuildError::Serialize { .. } => ErrorCategory::Io,
        }
    }
}

/// Type alias for builder results.
pub type Result<T> = std::result::Result<T, BuildError>;
