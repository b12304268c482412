/*
* Copyright (C) 2025 Pedro Henrique / phkaiser13
*
* File: src/query/kube_api.rs
*
* `ClusterQuery` backed by the Kubernetes API through kube-rs. A client is
* built from the request's base kubeconfig on each call; requests may target
* different host clusters, and a query happens at most every few seconds.
*
* SPDX-License-Identifier: Apache-2.0
*/

use super::{ClusterQuery, SECRET_CONFIG_KEY};
use crate::endpoint::{IngressPoint, LoadBalancerStatus, ServicePort, ServiceStatus, SpecBlock, StatusBlock};
use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as B64, Engine};
use k8s_openapi::api::core::v1::{Secret, Service};
use kube::{
    api::Api,
    config::{KubeConfigOptions, Kubeconfig},
    Client, Config,
};
use std::path::Path;

#[derive(Debug, Clone, Default)]
pub struct KubeApiQuery;

impl KubeApiQuery {
    pub fn new() -> Self {
        KubeApiQuery
    }
}

/// Initializes a Kubernetes client from an explicit kubeconfig file.
pub async fn client_for(kubeconfig_path: &Path) -> Result<Client> {
    let kubeconfig = Kubeconfig::read_from(kubeconfig_path)
        .with_context(|| format!("Failed to read kubeconfig {}", kubeconfig_path.display()))?;
    let config = Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
        .await
        .context("Failed to load Kubernetes config")?;
    Client::try_from(config).context("Failed to create Kubernetes client from config")
}

/// Maps a core/v1 Service onto the fields the endpoint resolver reads.
pub fn service_status_from(service: &Service) -> ServiceStatus {
    let ingress = service
        .status
        .as_ref()
        .and_then(|s| s.load_balancer.as_ref())
        .and_then(|lb| lb.ingress.as_ref())
        .map(|points| {
            points
                .iter()
                .map(|p| IngressPoint {
                    ip: p.ip.clone(),
                    hostname: p.hostname.clone(),
                })
                .collect()
        })
        .unwrap_or_default();

    let ports = service
        .spec
        .as_ref()
        .and_then(|s| s.ports.as_ref())
        .map(|ports| ports.iter().map(|p| ServicePort { port: p.port }).collect())
        .unwrap_or_default();

    ServiceStatus {
        status: StatusBlock {
            load_balancer: LoadBalancerStatus { ingress },
        },
        spec: SpecBlock { ports },
    }
}

#[async_trait]
impl ClusterQuery for KubeApiQuery {
    async fn secret_config(&self, base_kubeconfig: &Path, namespace: &str, secret: &str) -> Result<String> {
        let client = client_for(base_kubeconfig).await?;
        let secrets: Api<Secret> = Api::namespaced(client, namespace);
        let found = secrets
            .get(secret)
            .await
            .with_context(|| format!("Failed to get secret '{}' in namespace '{}'", secret, namespace))?;

        // The API returns decoded bytes; re-encode to match the kubectl template output.
        Ok(found
            .data
            .as_ref()
            .and_then(|data| data.get(SECRET_CONFIG_KEY))
            .map(|value| B64.encode(&value.0))
            .unwrap_or_default())
    }

    async fn service_status(&self, base_kubeconfig: &Path, namespace: &str, service: &str) -> Result<ServiceStatus> {
        let client = client_for(base_kubeconfig).await?;
        let services: Api<Service> = Api::namespaced(client, namespace);
        let found = services
            .get(service)
            .await
            .with_context(|| format!("Failed to get service '{}' in namespace '{}'", service, namespace))?;
        Ok(service_status_from(&found))
    }
}
