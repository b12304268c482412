/* Copyright (C) 2025 Pedro Henrique / phkaiser13
* File: src/kubeconfig.rs
*
* Typed model of a kubeconfig document and the server-endpoint patcher.
*
* Only the parts the provisioner touches are typed: the `clusters` list with
* each entry's `server`, plus the names of contexts and users. Everything else
* (certificate data, auth material, preferences, unknown keys) is carried in
* flattened mappings so a decode/encode round trip leaves it untouched.
*
* SPDX-License-Identifier: Apache-2.0 */

use crate::endpoint::ServiceEndpoint;
use crate::error::{ProvisionError, Result};
use serde::{Deserialize, Serialize};
use serde_yaml::Mapping;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CredentialDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    clusters: Option<Vec<NamedCluster>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    contexts: Option<Vec<NamedContext>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    users: Option<Vec<NamedUser>>,
    #[serde(flatten)]
    rest: Mapping,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedCluster {
    pub name: String,
    #[serde(default)]
    pub cluster: ClusterEntry,
    #[serde(flatten)]
    rest: Mapping,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClusterEntry {
    #[serde(default)]
    pub server: String,
    #[serde(flatten)]
    rest: Mapping,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedContext {
    pub name: String,
    #[serde(default)]
    pub context: ContextEntry,
    #[serde(flatten)]
    rest: Mapping,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContextEntry {
    #[serde(default)]
    pub cluster: String,
    #[serde(default)]
    pub user: String,
    #[serde(flatten)]
    rest: Mapping,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedUser {
    pub name: String,
    #[serde(flatten)]
    rest: Mapping,
}

impl CredentialDocument {
    /// Decodes a kubeconfig, rejecting documents without a `clusters` list.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let document: CredentialDocument = serde_yaml::from_slice(bytes)?;
        if document.clusters.is_none() {
            return Err(ProvisionError::MissingClusters);
        }
        Ok(document)
    }

    pub fn to_vec(&self) -> Result<Vec<u8>> {
        Ok(serde_yaml::to_string(self)?.into_bytes())
    }

    pub fn clusters(&self) -> &[NamedCluster] {
        self.clusters.as_deref().unwrap_or_default()
    }

    pub fn clusters_mut(&mut self) -> &mut [NamedCluster] {
        self.clusters.as_deref_mut().unwrap_or_default()
    }

    pub fn contexts(&self) -> &[NamedContext] {
        self.contexts.as_deref().unwrap_or_default()
    }

    pub fn users(&self) -> &[NamedUser] {
        self.users.as_deref().unwrap_or_default()
    }

    pub fn servers(&self) -> impl Iterator<Item = &str> {
        self.clusters().iter().map(|c| c.cluster.server.as_str())
    }

    /// Points every cluster entry at `server`. Returns how many were rewritten.
    pub fn set_server(&mut self, server: &str) -> usize {
        let clusters = self.clusters_mut();
        for entry in clusters.iter_mut() {
            entry.cluster.server = server.to_string();
        }
        clusters.len()
    }
}

/// Rewrites the server of every cluster in `raw` to the endpoint URI and
/// returns the re-encoded document.
pub fn patch_server_endpoint(raw: &[u8], endpoint: &ServiceEndpoint) -> Result<Vec<u8>> {
    let mut document = CredentialDocument::from_slice(raw)?;
    let uri = endpoint.uri();
    let patched = document.set_server(&uri);
    tracing::debug!(server = %uri, clusters = patched, "Patched kubeconfig server endpoints");
    document.to_vec()
}
