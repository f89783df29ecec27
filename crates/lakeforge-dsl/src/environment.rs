// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Closed enumerations that namespace everything the builder generates.

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString, IntoEnumIterator};

/// Deployment stage. Every rendered [`Name`](crate::Name) ends with it.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
    EnumIter,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Environment {
    Dev,
    Test,
    Staging,
    Prod,
}

impl Environment {
    /// Parse a stage name (case-insensitive).
    pub fn parse(s: &str) -> Option<Self> {
        s.to_lowercase().parse().ok()
    }

    /// All stage names, for error messages.
    pub fn names() -> Vec<String> {
        Self::iter().map(|e| e.to_string()).collect()
    }
}

/// Data-maturity stage inside a domain's storage namespace.
///
/// Variants are declared lowest first; `Ord` follows that order.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
    EnumIter,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Layer {
    Raw,
    Trusted,
    Curated,
}

impl Layer {
    /// Every layer in namespace order.
    pub fn all() -> Vec<Layer> {
        Self::iter().collect()
    }

    /// The lowest layer; crawlers are only generated for it.
    pub fn lowest() -> Layer {
        Layer::Raw
    }

    /// All layer names, for error messages.
    pub fn names() -> Vec<String> {
        Self::iter().map(|l| l.to_string()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_environment_parse_is_case_insensitive() {
        assert_eq!(Environment::parse("PROD"), Some(Environment::Prod));
        assert_eq!(Environment::parse("dev"), Some(Environment::Dev));
        assert_eq!(Environment::parse("qa"), None);
    }

    #[test]
    fn test_environment_display() {
        assert_eq!(Environment::Staging.to_string(), "staging");
    }

    #[test]
    fn test_layers_are_ordered() {
        assert_eq!(Layer::all(), vec![Layer::Raw, Layer::Trusted, Layer::Curated]);
        assert!(Layer::Raw < Layer::Curated);
        assert_eq!(Layer::lowest(), Layer::Raw);
    }

    #[test]
    fn test_layer_from_str() {
        assert_eq!("trusted".parse::<Layer>().unwrap(), Layer::Trusted);
        assert!("gold".parse::<Layer>().is_err());
    }
}
