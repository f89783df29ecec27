// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Service roles.

use super::{Resource, ResourceKind, one_of, string, strings, validated};
use crate::cache::ResolutionCache;
use crate::deployment::{DeploymentUnit, ManifestEntry};
use crate::error::Result;
use lakeforge_dsl::schema::{FieldType, Properties};
use lakeforge_dsl::{Name, Tags};
use serde_json::json;

const ROLE_SCHEMA: &[(&str, FieldType)] = &[
    ("region", FieldType::String),
    ("account_id", FieldType::String),
    ("assumed_by", FieldType::String),
    ("effect", FieldType::String),
    ("actions", FieldType::List),
    ("resources?", FieldType::List),
    ("managed_policies?", FieldType::List),
];

const POLICY_VERSION: &str = "2012-10-17";

/// Identifier of the role named `role_name` in `account_id`.
pub fn role_arn(account_id: &str, role_name: &str) -> String {
    format!("arn:aws:iam::{}:role/{}", account_id, role_name)
}

/// A role assumed by one service principal, carrying one inline statement.
#[derive(Debug, Clone)]
pub struct RoleResource {
    name: Name,
    tags: Tags,
    account_id: String,
    assumed_by: String,
    allow: bool,
    actions: Vec<String>,
    resources: Vec<String>,
    managed_policies: Vec<String>,
}

impl RoleResource {
    /// `effect` is `allow` or `deny`; `resources` defaults to `["*"]`.
    pub fn from_properties(name: Name, tags: Tags, props: &Properties) -> Result<Self> {
        let kind = ResourceKind::Role;
        validated(kind, &name, ROLE_SCHEMA, props)?;

        let effect = string(props, "effect");
        one_of(kind, &name, "effect", &effect, &["allow", "deny"])?;

        let mut resources = strings(props, "resources");
        if props.get("resources").is_none_or(|v| v.is_null()) {
            resources = vec!["*".to_string()];
        }

        Ok(Self {
            account_id: string(props, "account_id"),
            assumed_by: string(props, "assumed_by"),
            allow: effect == "allow",
            actions: strings(props, "actions"),
            resources,
            managed_policies: strings(props, "managed_policies"),
            name,
            tags,
        })
    }

    pub fn arn(&self) -> String {
        role_arn(&self.account_id, &self.name.value())
    }

    pub fn actions(&self) -> &[String] {
        &self.actions
    }

    pub fn resources(&self) -> &[String] {
        &self.resources
    }

    pub fn managed_policies(&self) -> &[String] {
        &self.managed_policies
    }
}

impl Resource for RoleResource {
    fn name(&self) -> &Name {
        &self.name
    }

    fn kind(&self) -> ResourceKind {
        ResourceKind::Role
    }

    fn materialize(&self, unit: &mut DeploymentUnit, cache: &mut ResolutionCache) -> Result<()> {
        let role_name = self.name.value();
        let managed: Vec<String> = self
            .managed_policies
            .iter()
            .map(|p| format!("arn:aws:iam::aws:policy/{}", p))
            .collect();

        let entry = ManifestEntry::new(
            &self.name,
            self.kind(),
            self.arn(),
            json!({
                "RoleName": role_name,
                "AssumeRolePolicyDocument": {
                    "Version": POLICY_VERSION,
                    "Statement": [{
                        "Effect": "Allow",
                        "Principal": { "Service": self.assumed_by },
                        "Action": "sts:AssumeRole",
                    }],
                },
                "Policies": [{
                    "PolicyName": format!("{}-policy", role_name),
                    "PolicyDocument": {
                        "Version": POLICY_VERSION,
                        "Statement": [{
                            "Effect": if self.allow { "Allow" } else { "Deny" },
                            "Action": self.actions,
                            "Resource": self.resources,
                        }],
                    },
                }],
                "ManagedPolicyArns": managed,
            }),
        )
        .with_tags(&self.tags);
        unit.emit(cache, entry)?;
        Ok(())
    }
}
