// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Storage namespace: one bucket per (domain, layer).

use lakeforge_dsl::{Environment, Layer, Name, SchemaError};
use serde::Serialize;

/// One cell of the domain × layer matrix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DatalakeBucket {
    pub domain: String,
    pub layer: Layer,
    pub name: Name,
    pub uri: String,
    pub arn: String,
    /// Catalog database holding the bucket's tables.
    pub database: Name,
    pub database_arn: String,
    pub crawler: Name,
}

impl DatalakeBucket {
    /// Wildcard over every object in the bucket.
    pub fn objects_arn(&self) -> String {
        format!("{}/*", self.arn)
    }

    /// Wildcard over every table in the bucket's database.
    pub fn tables_arn(&self) -> String {
        self.database_arn
            .replacen(":database/", ":table/", 1)
            + "/*"
    }
}

/// All buckets of a lake, domain-major in configuration order, layers in
/// [`Layer`] order within each domain.
#[derive(Debug, Clone, Serialize)]
pub struct BucketSet {
    region: String,
    account_id: String,
    env: Environment,
    buckets: Vec<DatalakeBucket>,
}

impl BucketSet {
    /// Derive the full matrix. The domain list must be non-empty and free of
    /// duplicates.
    pub fn new(
        region: &str,
        account_id: &str,
        domains: &[String],
        env: Environment,
    ) -> Result<Self, SchemaError> {
        if domains.is_empty() {
            return Err(SchemaError::invalid("domains", "at least one domain is required"));
        }
        for (i, domain) in domains.iter().enumerate() {
            if domain.trim().is_empty() {
                return Err(SchemaError::invalid(format!("domains[{}]", i), "domain is empty"));
            }
            if domains[..i].contains(domain) {
                return Err(SchemaError::invalid(
                    format!("domains[{}]", i),
                    format!("domain '{}' is listed twice", domain),
                ));
            }
        }

        let mut buckets = Vec::with_capacity(domains.len() * Layer::all().len());
        for domain in domains {
            for layer in Layer::all() {
                let name = Name::new(
                    format!("{}-{}-{}-{}", domain, layer, region, account_id),
                    env,
                );
                let database = Name::new(format!("{}-{}", domain, layer), env);
                let crawler = Name::new(format!("{}-{}-crawler", domain, layer), env);

                buckets.push(DatalakeBucket {
                    domain: domain.clone(),
                    layer,
                    uri: format!("s3://{}", name.value()),
                    arn: format!("arn:aws:s3:::{}", name.value()),
                    database_arn: format!(
                        "arn:aws:glue:{}:{}:database/{}",
                        region,
                        account_id,
                        database.value()
                    ),
                    name,
                    database,
                    crawler,
                });
            }
        }

        Ok(Self {
            region: region.to_string(),
            account_id: account_id.to_string(),
            env,
            buckets,
        })
    }

    pub fn buckets(&self) -> &[DatalakeBucket] {
        &self.buckets
    }

    /// Buckets whose domain is in `domains` and whose layer is in `layers`.
    /// An empty filter matches everything.
    pub fn get(&self, domains: &[&str], layers: &[Layer]) -> Vec<&DatalakeBucket> {
        self.buckets
            .iter()
            .filter(|b| domains.is_empty() || domains.contains(&b.domain.as_str()))
            .filter(|b| layers.is_empty() || layers.contains(&b.layer))
            .collect()
    }

    /// The single bucket of `domain` at `layer`.
    pub fn find(&self, domain: &str, layer: Layer) -> Option<&DatalakeBucket> {
        self.buckets
            .iter()
            .find(|b| b.domain == domain && b.layer == layer)
    }

    pub fn has_domain(&self, domain: &str) -> bool {
        self.buckets.iter().any(|b| b.domain == domain)
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    pub fn account_id(&self) -> &str {
        &self.account_id
    }

    pub fn env(&self) -> Environment {
        self.env
    }

    /// The account's data catalog.
    pub fn catalog_arn(&self) -> String {
        format!("arn:aws:glue:{}:{}:catalog", self.region, self.account_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn domains(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn set(names: &[&str]) -> BucketSet {
        BucketSet::new("eu-west-1", "123456789012", &domains(names), Environment::Dev).unwrap()
    }

    #[test]
    fn test_matrix_size_and_distinct_names() {
        let set = set(&["sales", "finance", "ops"]);
        assert_eq!(set.buckets().len(), 3 * Layer::all().len());
        let names: HashSet<String> = set.buckets().iter().map(|b| b.name.value()).collect();
        assert_eq!(names.len(), set.buckets().len());
    }

    #[test]
    fn test_derived_identifiers() {
        let set = set(&["sales"]);
        let bucket = set.find("sales", Layer::Raw).unwrap();
        assert_eq!(bucket.name.value(), "sales-raw-eu-west-1-123456789012-dev");
        assert_eq!(bucket.uri, "s3://sales-raw-eu-west-1-123456789012-dev");
        assert_eq!(bucket.arn, "arn:aws:s3:::sales-raw-eu-west-1-123456789012-dev");
        assert_eq!(bucket.database.value(), "sales-raw-dev");
        assert_eq!(
            bucket.database_arn,
            "arn:aws:glue:eu-west-1:123456789012:database/sales-raw-dev"
        );
        assert_eq!(
            bucket.tables_arn(),
            "arn:aws:glue:eu-west-1:123456789012:table/sales-raw-dev/*"
        );
        assert_eq!(bucket.crawler.value(), "sales-raw-crawler-dev");
    }

    #[test]
    fn test_empty_filters_match_all() {
        let set = set(&["sales", "finance"]);
        assert_eq!(set.get(&[], &[]).len(), 6);
    }

    #[test]
    fn test_domain_filter_is_independent_of_layers() {
        let set = set(&["sales", "finance"]);
        let sales = set.get(&["sales"], &[]);
        assert_eq!(sales.len(), 3);
        assert!(sales.iter().all(|b| b.domain == "sales"));

        let both = set.get(&["sales"], &[Layer::Raw, Layer::Curated]);
        assert_eq!(both.len(), 2);
        assert!(set.get(&["missing"], &[]).is_empty());
    }

    #[test]
    fn test_layer_filter() {
        let set = set(&["sales", "finance"]);
        let raw = set.get(&[], &[Layer::Raw]);
        assert_eq!(raw.len(), 2);
        assert_eq!(raw[0].domain, "sales");
        assert_eq!(raw[1].domain, "finance");
    }

    #[test]
    fn test_empty_domain_list_is_rejected() {
        let err = BucketSet::new("r", "a", &[], Environment::Dev).unwrap_err();
        assert_eq!(err.field(), "domains");
    }

    #[test]
    fn test_duplicate_domain_is_rejected() {
        let err = BucketSet::new("r", "a", &domains(&["x", "x"]), Environment::Dev).unwrap_err();
        assert_eq!(err.field(), "domains[1]");
    }
}
