/* Copyright (C) 2025 Pedro Henrique / phkaiser13
* File: src/endpoint.rs
*
* Service status as reported for the vcluster's load-balanced Service, and the
* external endpoint derived from it. Only the first ingress entry and the
* first declared port are consulted.
*
* SPDX-License-Identifier: Apache-2.0 */

use serde::Deserialize;
use std::fmt;
use std::net::Ipv6Addr;

const DEFAULT_HTTPS_PORT: u16 = 443;

/// The subset of a Service object the endpoint resolver reads
/// (`status.loadBalancer.ingress[]` and `spec.ports[]`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ServiceStatus {
    #[serde(default)]
    pub status: StatusBlock,
    #[serde(default)]
    pub spec: SpecBlock,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusBlock {
    #[serde(default)]
    pub load_balancer: LoadBalancerStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct LoadBalancerStatus {
    #[serde(default)]
    pub ingress: Vec<IngressPoint>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct IngressPoint {
    #[serde(default)]
    pub ip: Option<String>,
    #[serde(default)]
    pub hostname: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct SpecBlock {
    #[serde(default)]
    pub ports: Vec<ServicePort>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ServicePort {
    pub port: i32,
}

impl ServiceStatus {
    pub fn from_json(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes)
    }

    /// Returns the published endpoint, or `None` while the load balancer has
    /// not been assigned an address or the Service declares no usable port.
    pub fn external_endpoint(&self) -> Option<ServiceEndpoint> {
        let ingress = self.status.load_balancer.ingress.first()?;
        let host = non_empty(ingress.ip.as_deref()).or_else(|| non_empty(ingress.hostname.as_deref()))?;
        let port = self.spec.ports.first()?.port;
        let port = u16::try_from(port).ok().filter(|p| *p != 0)?;
        Some(ServiceEndpoint::new(host, port))
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}

/// An externally reachable address for the virtual cluster's API server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceEndpoint {
    host: String,
    port: u16,
}

impl ServiceEndpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        ServiceEndpoint {
            host: host.into(),
            port,
        }
    }

    /// `https://host` for port 443, `https://host:port` otherwise. IPv6
    /// literals are bracketed.
    pub fn uri(&self) -> String {
        let host = if self.host.parse::<Ipv6Addr>().is_ok() {
            format!("[{}]", self.host)
        } else {
            self.host.clone()
        };
        if self.port == DEFAULT_HTTPS_PORT {
            format!("https://{}", host)
        } else {
            format!("https://{}:{}", host, self.port)
        }
    }
}

impl fmt::Display for ServiceEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.uri())
    }
}
