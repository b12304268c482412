/* Copyright (C) 2025 Pedro Henrique / phkaiser13
* File: src/cluster_spec.rs
*
* Builds the declarative `VirtualCluster` document handed to `vcluster create`.
* The builder is pure; serialization goes through serde_yaml with a fixed field
* order, so identical requests always produce identical bytes.
*
* SPDX-License-Identifier: Apache-2.0 */

use crate::error::{ProvisionError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

/// File name of the spec inside a request workspace.
pub const SPEC_FILE_NAME: &str = "vcluster.yaml";

const API_VERSION: &str = "v1";
const KIND: &str = "VirtualCluster";
const LOAD_BALANCER: &str = "LoadBalancer";

const HA_REPLICAS: u32 = 3;
const SINGLE_REPLICA: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterSpec {
    pub api_version: String,
    pub kind: String,
    pub metadata: SpecMetadata,
    pub spec: VirtualClusterSpec,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpecMetadata {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VirtualClusterSpec {
    pub replicas: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service: Option<ServiceExposure>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceExposure {
    #[serde(rename = "type")]
    pub type_: String,
}

impl ClusterSpec {
    pub fn build(name: &str, high_availability: bool, expose: bool) -> Self {
        let replicas = if high_availability {
            HA_REPLICAS
        } else {
            SINGLE_REPLICA
        };
        let service = expose.then(|| ServiceExposure {
            type_: LOAD_BALANCER.to_string(),
        });

        ClusterSpec {
            api_version: API_VERSION.to_string(),
            kind: KIND.to_string(),
            metadata: SpecMetadata {
                name: name.to_string(),
            },
            spec: VirtualClusterSpec { replicas, service },
        }
    }

    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Writes the spec to `<dir>/vcluster.yaml` and returns the path.
    pub async fn write_to(&self, dir: &Path) -> Result<PathBuf> {
        let yaml = self.to_yaml()?;
        let path = dir.join(SPEC_FILE_NAME);
        fs::write(&path, yaml.as_bytes())
            .await
            .map_err(|e| ProvisionError::io(&path, e))?;
        debug!(path = %path.display(), spec = %yaml, "Wrote cluster spec");
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_replicas_follow_ha_flag() {
        for expose in [false, true] {
            assert_eq!(ClusterSpec::build("demo", true, expose).spec.replicas, 3);
            assert_eq!(ClusterSpec::build("demo", false, expose).spec.replicas, 1);
        }
    }

    #[test]
    fn test_service_block_only_when_exposed() {
        for ha in [false, true] {
            let exposed = ClusterSpec::build("demo", ha, true);
            assert_eq!(
                exposed.spec.service,
                Some(ServiceExposure {
                    type_: "LoadBalancer".to_string()
                })
            );
            assert!(exposed.to_yaml().unwrap().contains("type: LoadBalancer"));

            let internal = ClusterSpec::build("demo", ha, false);
            assert!(internal.spec.service.is_none());
            assert!(!internal.to_yaml().unwrap().contains("service"));
        }
    }

    #[test]
    fn test_serialization_is_deterministic() {
        let first = ClusterSpec::build("demo-ha", true, true).to_yaml().unwrap();
        for _ in 0..5 {
            let again = ClusterSpec::build("demo-ha", true, true).to_yaml().unwrap();
            assert_eq!(first.as_bytes(), again.as_bytes());
        }
    }

    #[test]
    fn test_yaml_layout() {
        let yaml = ClusterSpec::build("demo", false, false).to_yaml().unwrap();
        assert_eq!(
            yaml,
            "apiVersion: v1\nkind: VirtualCluster\nmetadata:\n  name: demo\nspec:\n  replicas: 1\n"
        );

        let yaml = ClusterSpec::build("edge", true, true).to_yaml().unwrap();
        assert_eq!(
            yaml,
            "apiVersion: v1\nkind: VirtualCluster\nmetadata:\n  name: edge\nspec:\n  replicas: 3\n  service:\n    type: LoadBalancer\n"
        );
    }

    #[tokio::test]
    async fn test_write_to_workspace() {
        let dir = tempfile::tempdir().unwrap();
        let spec = ClusterSpec::build("demo", false, true);
        let path = spec.write_to(dir.path()).await.unwrap();

        assert_eq!(path, dir.path().join(SPEC_FILE_NAME));
        let written = std::fs::read_to_string(&path).unwrap();
        let parsed: ClusterSpec = serde_yaml::from_str(&written).unwrap();
        assert_eq!(parsed, spec);
    }
}
