// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Errors raised while reading pipeline configuration.

use crate::schema::SchemaError;
use thiserror::Error;

/// Errors that can occur while parsing a configuration document.
#[derive(Debug, Error)]
pub enum DslError {
    /// Missing or mistyped field.
    #[error("schema error: {0}")]
    Schema(#[from] SchemaError),

    /// A step declared a `type` that is not a known step kind.
    #[error("unknown step type '{step_type}' for step '{step}', expected one of: {expected}")]
    UnknownStepType {
        step: String,
        step_type: String,
        expected: String,
    },

    /// A trigger entry used a key that is not a known trigger kind.
    #[error("unknown trigger '{key}' at triggers[{index}], expected one of: {expected}")]
    UnknownTrigger {
        index: usize,
        key: String,
        expected: String,
    },

    /// A trigger entry was not a single-key map.
    #[error("trigger at triggers[{index}] must be a map with exactly one key, found {found} keys")]
    MalformedTrigger { index: usize, found: usize },

    /// The document could not be parsed as YAML/JSON.
    #[error("failed to parse document: {0}")]
    Document(#[from] serde_yaml::Error),
}

impl DslError {
    /// Whether this error is a referential error (unknown kind) rather than a
    /// shape error.
    pub fn is_referential(&self) -> bool {
        matches!(
            self,
            DslError::UnknownStepType { .. }
                | DslError::UnknownTrigger { .. }
                | DslError::MalformedTrigger { .. }
        )
    }
}

/// Type alias for DSL results.
pub type Result<T> = std::result::Result<T, DslError>;
