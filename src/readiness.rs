/* Copyright (C) 2025 Pedro Henrique / phkaiser13
* File: src/readiness.rs
*
* The two waiting stages of a provisioning flow, both built on `poll_until`:
*
* - `wait_for_credential` polls the `vc-<name>` secret until it carries a
*   decodable, non-empty kubeconfig.
* - `resolve_endpoint` polls the `<name>` Service until its load balancer has
*   been assigned an address.
*
* SPDX-License-Identifier: Apache-2.0 */

use crate::endpoint::{ServiceEndpoint, ServiceStatus};
use crate::error::{ProvisionError, Result};
use crate::poll::{poll_until, PollBudget, PollTimeout};
use crate::query::{cluster_namespace, kubeconfig_secret_name, ClusterQuery};
use base64::{engine::general_purpose::STANDARD as B64, Engine};
use std::path::Path;
use tracing::debug;

/// Decodes the secret's base64 `config` value. Blank text, invalid base64 and
/// an empty payload all mean the secret is not populated yet.
pub fn decode_secret_payload(text: &str) -> Option<Vec<u8>> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    match B64.decode(trimmed) {
        Ok(bytes) if !bytes.is_empty() => Some(bytes),
        Ok(_) => None,
        Err(e) => {
            debug!(error = %e, "Secret payload is not valid base64 yet");
            None
        }
    }
}

fn timeout_error(what: String) -> impl FnOnce(PollTimeout) -> ProvisionError {
    move |t| ProvisionError::Timeout {
        what,
        attempts: t.attempts,
        elapsed: t.elapsed,
    }
}

/// Waits for the virtual cluster's kubeconfig and returns it decoded.
pub async fn wait_for_credential(
    query: &dyn ClusterQuery,
    base_kubeconfig: &Path,
    cluster_name: &str,
    budget: PollBudget,
) -> Result<Vec<u8>> {
    let namespace = cluster_namespace(cluster_name);
    let secret = kubeconfig_secret_name(cluster_name);
    let what = format!("secret {}/{}", namespace, secret);

    poll_until(
        &what,
        budget,
        || query.secret_config(base_kubeconfig, &namespace, &secret),
        |text| decode_secret_payload(&text),
    )
    .await
    .map_err(timeout_error(what.clone()))
}

/// Waits for the virtual cluster's Service to be published externally.
pub async fn resolve_endpoint(
    query: &dyn ClusterQuery,
    base_kubeconfig: &Path,
    cluster_name: &str,
    budget: PollBudget,
) -> Result<ServiceEndpoint> {
    let namespace = cluster_namespace(cluster_name);
    let what = format!("service {}/{} load balancer", namespace, cluster_name);

    poll_until(
        &what,
        budget,
        || query.service_status(base_kubeconfig, &namespace, cluster_name),
        |status: ServiceStatus| status.external_endpoint(),
    )
    .await
    .map_err(timeout_error(what.clone()))
}
