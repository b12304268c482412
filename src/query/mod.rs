/* Copyright (C) 2025 Pedro Henrique / phkaiser13
* File: src/query/mod.rs
*
* Read-only queries against the host cluster that the pollers run on every
* tick: the vcluster's kubeconfig secret and its load-balanced Service.
*
* Two backends implement `ClusterQuery`: `KubectlQuery` shells out to kubectl,
* `KubeApiQuery` talks to the API server directly through kube-rs. Both are
* handed the request's base kubeconfig on every call, so a single instance
* serves any number of concurrent requests.
*
* SPDX-License-Identifier: Apache-2.0 */

pub mod kube_api;
pub mod kubectl;

use crate::endpoint::ServiceStatus;
use anyhow::Result;
use async_trait::async_trait;
use clap::ValueEnum;
use std::path::Path;

pub use kube_api::KubeApiQuery;
pub use kubectl::KubectlQuery;

/// Key inside the vcluster secret that holds the kubeconfig.
pub const SECRET_CONFIG_KEY: &str = "config";

/// Host namespace vcluster creates for a virtual cluster.
pub fn cluster_namespace(cluster_name: &str) -> String {
    format!("vcluster-{}", cluster_name)
}

/// Secret in which vcluster publishes the virtual cluster's kubeconfig.
pub fn kubeconfig_secret_name(cluster_name: &str) -> String {
    format!("vc-{}", cluster_name)
}

#[async_trait]
pub trait ClusterQuery: Send + Sync {
    /// Returns the secret's `data.config` value as base64 text.
    async fn secret_config(&self, base_kubeconfig: &Path, namespace: &str, secret: &str) -> Result<String>;

    /// Returns the Service's load-balancer status and ports.
    async fn service_status(&self, base_kubeconfig: &Path, namespace: &str, service: &str) -> Result<ServiceStatus>;
}

/// Selects which `ClusterQuery` implementation the binary wires in.
#[derive(ValueEnum, Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum QueryBackend {
    /// Shell out to kubectl.
    #[default]
    Kubectl,
    /// Call the Kubernetes API through kube-rs.
    Api,
}
