// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Canonical resource identifiers.

use crate::Environment;
use serde::{Serialize, Serializer};
use std::fmt;

/// A human label bound to an [`Environment`].
///
/// The raw label is kept as given; normalization happens when the name is
/// rendered with [`Name::value`]. Prefixes and suffixes therefore compose on
/// the raw text and are normalized once:
///
/// ```
/// use lakeforge_dsl::{Environment, Name};
///
/// let name = Name::new("OrderSync", Environment::Dev).add_prefix("lake").add_suffix("stack");
/// assert_eq!(name.value(), "lake-order-sync-stack-dev");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Name {
    label: String,
    env: Environment,
}

impl Name {
    /// Create a name from a raw label.
    pub fn new(label: impl Into<String>, env: Environment) -> Self {
        Self {
            label: label.into(),
            env,
        }
    }

    /// New name wrapping `"{prefix}-{label}"`.
    pub fn add_prefix(&self, prefix: &str) -> Name {
        Name::new(format!("{}-{}", prefix, self.label), self.env)
    }

    /// New name wrapping `"{label}-{suffix}"`.
    pub fn add_suffix(&self, suffix: &str) -> Name {
        Name::new(format!("{}-{}", self.label, suffix), self.env)
    }

    /// The raw, unnormalized label.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// The environment this name is scoped to.
    pub fn env(&self) -> Environment {
        self.env
    }

    /// Rendered form: kebab-case label followed by `-{environment}`.
    pub fn value(&self) -> String {
        format!("{}-{}", kebab_case(&self.label), self.env)
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.value())
    }
}

impl Serialize for Name {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.value())
    }
}

fn is_separator(c: char) -> bool {
    matches!(c, '-' | '_' | ' ')
}

/// Split camel-case boundaries, turn `_` and spaces into `-`, lowercase.
///
/// A boundary is placed before an uppercase letter that either follows a
/// lowercase letter or digit, or starts a capitalized word after any other
/// non-separator character (`HTTPServer` -> `http-server`).
pub fn kebab_case(input: &str) -> String {
    let chars: Vec<char> = input.chars().collect();
    let mut out = String::with_capacity(input.len() + 4);

    for (i, &c) in chars.iter().enumerate() {
        if c.is_ascii_uppercase() && i > 0 {
            let prev = chars[i - 1];
            let next_is_lower = chars.get(i + 1).is_some_and(|n| n.is_ascii_lowercase());
            let after_word = prev.is_ascii_lowercase() || prev.is_ascii_digit();
            if !is_separator(prev) && (after_word || next_is_lower) {
                out.push('-');
            }
        }

        if c == '_' || c == ' ' {
            out.push('-');
        } else {
            out.extend(c.to_lowercase());
        }
    }

    out
}
