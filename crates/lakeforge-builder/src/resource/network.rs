// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Private network and its service endpoints.

use super::{Resource, ResourceKind, context, integer_or, string, validated};
use crate::cache::ResolutionCache;
use crate::deployment::{DeploymentUnit, ManifestEntry};
use crate::error::{BuildError, Result};
use lakeforge_dsl::schema::{FieldType, Properties};
use lakeforge_dsl::{Name, SchemaError, Tags};
use serde_json::{Value, json};
use std::net::Ipv4Addr;

const NETWORK_SCHEMA: &[(&str, FieldType)] = &[
    ("region", FieldType::String),
    ("account_id", FieldType::String),
    ("cidr", FieldType::String),
    ("max_azs?", FieldType::Integer),
    ("enable_dns_hostnames?", FieldType::Boolean),
    ("enable_dns_support?", FieldType::Boolean),
];

const ENDPOINT_SCHEMA: &[(&str, FieldType)] = &[
    ("region", FieldType::String),
    ("service", FieldType::String),
    ("network", FieldType::String),
];

/// Services reached through a route-table gateway instead of an interface.
const GATEWAY_SERVICES: [&str; 2] = ["s3", "dynamodb"];

fn valid_cidr(cidr: &str) -> bool {
    let Some((address, prefix)) = cidr.split_once('/') else {
        return false;
    };
    address.parse::<Ipv4Addr>().is_ok() && prefix.parse::<u8>().is_ok_and(|p| p <= 32)
}

/// Network with one public and one private subnet group.
#[derive(Debug, Clone)]
pub struct NetworkResource {
    name: Name,
    tags: Tags,
    region: String,
    account_id: String,
    cidr: String,
    max_azs: i64,
    dns_hostnames: bool,
    dns_support: bool,
}

impl NetworkResource {
    pub fn from_properties(name: Name, tags: Tags, props: &Properties) -> Result<Self> {
        let kind = ResourceKind::Network;
        validated(kind, &name, NETWORK_SCHEMA, props)?;

        let cidr = string(props, "cidr");
        if !valid_cidr(&cidr) {
            return Err(BuildError::schema(
                context(kind, &name),
                SchemaError::invalid("cidr", format!("'{}' is not an IPv4 CIDR block", cidr)),
            ));
        }

        let flag = |field: &str| props.get(field).and_then(Value::as_bool).unwrap_or(true);

        Ok(Self {
            region: string(props, "region"),
            account_id: string(props, "account_id"),
            max_azs: integer_or(props, "max_azs", 2),
            dns_hostnames: flag("enable_dns_hostnames"),
            dns_support: flag("enable_dns_support"),
            cidr,
            name,
            tags,
        })
    }

    pub fn cidr(&self) -> &str {
        &self.cidr
    }
}

impl Resource for NetworkResource {
    fn name(&self) -> &Name {
        &self.name
    }

    fn kind(&self) -> ResourceKind {
        ResourceKind::Network
    }

    fn materialize(&self, unit: &mut DeploymentUnit, cache: &mut ResolutionCache) -> Result<()> {
        let arn = format!(
            "arn:aws:ec2:{}:{}:vpc/{}",
            self.region,
            self.account_id,
            self.name.value()
        );
        let entry = ManifestEntry::new(
            &self.name,
            self.kind(),
            arn,
            json!({
                "VpcName": self.name.value(),
                "CidrBlock": self.cidr,
                "InstanceTenancy": "default",
                "EnableDnsHostnames": self.dns_hostnames,
                "EnableDnsSupport": self.dns_support,
                "MaxAzs": self.max_azs,
                "Subnets": [
                    { "Name": "public", "Type": "PUBLIC", "CidrMask": 24 },
                    { "Name": "private", "Type": "PRIVATE_ISOLATED", "CidrMask": 24 },
                ],
            }),
        )
        .with_tags(&self.tags);
        unit.emit(cache, entry)?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct NetworkEndpointResource {
    name: Name,
    tags: Tags,
    region: String,
    service: String,
    network: String,
}

impl NetworkEndpointResource {
    /// `network` is the rendered name of the network resource.
    pub fn from_properties(name: Name, tags: Tags, props: &Properties) -> Result<Self> {
        validated(ResourceKind::NetworkEndpoint, &name, ENDPOINT_SCHEMA, props)?;

        Ok(Self {
            region: string(props, "region"),
            service: string(props, "service"),
            network: string(props, "network"),
            name,
            tags,
        })
    }

    pub fn is_gateway(&self) -> bool {
        GATEWAY_SERVICES.contains(&self.service.as_str())
    }
}

impl Resource for NetworkEndpointResource {
    fn name(&self) -> &Name {
        &self.name
    }

    fn kind(&self) -> ResourceKind {
        ResourceKind::NetworkEndpoint
    }

    fn materialize(&self, unit: &mut DeploymentUnit, cache: &mut ResolutionCache) -> Result<()> {
        let network = unit.resolve(cache, &self.network, ResourceKind::Network)?;

        let entry = ManifestEntry::new(
            &self.name,
            self.kind(),
            format!("{}/endpoint/{}", network.arn, self.service),
            json!({
                "VpcId": network.arn,
                "ServiceName": format!("com.amazonaws.{}.{}", self.region, self.service),
                "VpcEndpointType": if self.is_gateway() { "Gateway" } else { "Interface" },
            }),
        )
        .with_tags(&self.tags);
        unit.emit(cache, entry)?;
        Ok(())
    }
}
