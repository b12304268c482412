/* Copyright (C) 2025 Pedro Henrique / phkaiser13
* File: src/request.rs
*
* Admission of a provisioning request. Parameters are validated once, the base
* kubeconfig is checked to exist, and the result is an immutable
* `ProvisioningRequest` bound to its workspace.
*
* SPDX-License-Identifier: Apache-2.0 */

use crate::error::{ProvisionError, Result};
use crate::workspace::Workspace;
use std::path::{Path, PathBuf};
use tokio::fs;

/// Longest name for which `vcluster-<name>` is still a valid namespace.
pub const MAX_CLUSTER_NAME_LEN: usize = 54;

/// What the caller asked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterParams {
    pub cluster_name: String,
    pub high_availability: bool,
    pub expose: bool,
}

/// Rejects names that are not RFC 1123 labels or would overflow the
/// derived namespace.
pub fn validate_cluster_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(ProvisionError::Validation("cluster name is required".into()));
    }
    if name.len() > MAX_CLUSTER_NAME_LEN {
        return Err(ProvisionError::Validation(format!(
            "cluster name '{}' is longer than {} characters",
            name, MAX_CLUSTER_NAME_LEN
        )));
    }
    let allowed = |c: char| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-';
    let alnum = |c: char| c.is_ascii_lowercase() || c.is_ascii_digit();
    let bounded = name.starts_with(alnum) && name.ends_with(alnum);
    if !name.chars().all(allowed) || !bounded {
        return Err(ProvisionError::Validation(format!(
            "cluster name '{}' must consist of lowercase alphanumerics or '-', and start and end with an alphanumeric",
            name
        )));
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub struct ProvisioningRequest {
    params: ClusterParams,
    base_kubeconfig: PathBuf,
    workspace: Workspace,
}

impl ProvisioningRequest {
    /// Validates `params` and the base kubeconfig and binds them to `workspace`.
    pub async fn admit(workspace: Workspace, params: ClusterParams, base_kubeconfig: PathBuf) -> Result<Self> {
        validate_cluster_name(&params.cluster_name)?;

        let is_file = fs::metadata(&base_kubeconfig)
            .await
            .map(|m| m.is_file())
            .unwrap_or(false);
        if !is_file {
            return Err(ProvisionError::Validation(format!(
                "base kubeconfig {} does not exist",
                base_kubeconfig.display()
            )));
        }

        Ok(ProvisioningRequest {
            params,
            base_kubeconfig,
            workspace,
        })
    }

    pub fn id(&self) -> &str {
        self.workspace.id()
    }

    pub fn cluster_name(&self) -> &str {
        &self.params.cluster_name
    }

    pub fn high_availability(&self) -> bool {
        self.params.high_availability
    }

    pub fn expose(&self) -> bool {
        self.params.expose
    }

    pub fn base_kubeconfig(&self) -> &Path {
        &self.base_kubeconfig
    }

    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }
}
