/* Copyright (C) 2025 Pedro Henrique / phkaiser13
* File: src/testing.rs
*
* In-memory collaborators for unit tests: a provisioner that records what it
* was asked to create and a cluster query that becomes ready on a chosen tick.
*
* SPDX-License-Identifier: Apache-2.0 */

use crate::endpoint::{IngressPoint, LoadBalancerStatus, ServicePort, ServiceStatus, SpecBlock, StatusBlock};
use crate::error::{ProvisionError, Result};
use crate::provisioners::{CreateInvocation, Provisioner};
use crate::query::ClusterQuery;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as B64, Engine};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use tokio::time::Instant;

/// A kubeconfig shaped like the one vcluster stores in `vc-<name>`.
pub const VCLUSTER_KUBECONFIG: &str = "apiVersion: v1
kind: Config
clusters:
- name: my-vcluster
  cluster:
    certificate-authority-data: Q0E=
    server: https://localhost:8443
- name: my-vcluster-internal
  cluster:
    server: https://demo-ha.vcluster-demo-ha:443
contexts:
- name: my-vcluster
  context:
    cluster: my-vcluster
    user: my-vcluster
current-context: my-vcluster
users:
- name: my-vcluster
  user:
    client-certificate-data: Q0VSVA==
";

#[derive(Default)]
pub struct FakeProvisioner {
    pub fail: bool,
    /// Contents of each spec file passed to `create`.
    pub specs: Mutex<Vec<String>>,
    pub bases: Mutex<Vec<PathBuf>>,
}

impl FakeProvisioner {
    pub fn failing() -> Self {
        FakeProvisioner {
            fail: true,
            ..Default::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.specs.lock().unwrap().len()
    }
}

#[async_trait]
impl Provisioner for FakeProvisioner {
    async fn create(&self, invocation: &CreateInvocation<'_>) -> Result<()> {
        let spec = std::fs::read_to_string(invocation.spec_file).unwrap();
        self.specs.lock().unwrap().push(spec);
        self.bases
            .lock()
            .unwrap()
            .push(invocation.base_kubeconfig.to_path_buf());
        if self.fail {
            return Err(ProvisionError::Invocation {
                command: format!("vcluster create {}", invocation.cluster_name),
                status: "exit status: 1".into(),
                output: "error: namespace already exists".into(),
            });
        }
        Ok(())
    }
}

/// Kubeconfig whose entry names carry `cluster`, so concurrent flows can be
/// told apart by what they stored.
pub fn kubeconfig_for(cluster: &str) -> String {
    VCLUSTER_KUBECONFIG.replace("my-vcluster", &format!("my-vcluster-{}", cluster))
}

/// Becomes ready on the given (1-based) query; `None` never does.
pub struct FakeQuery {
    pub secret_ready_on: Option<u32>,
    pub endpoint_ready_on: Option<u32>,
    /// Secret contents for a cluster name, before base64 encoding.
    pub payload: fn(&str) -> String,
    pub secret_calls: AtomicU32,
    pub service_calls: AtomicU32,
    pub first_secret_query: Mutex<Option<Instant>>,
}

impl FakeQuery {
    pub fn new(secret_ready_on: Option<u32>, endpoint_ready_on: Option<u32>) -> Self {
        FakeQuery {
            secret_ready_on,
            endpoint_ready_on,
            payload: |_| VCLUSTER_KUBECONFIG.to_string(),
            secret_calls: AtomicU32::new(0),
            service_calls: AtomicU32::new(0),
            first_secret_query: Mutex::new(None),
        }
    }

    pub fn with_payload(mut self, payload: fn(&str) -> String) -> Self {
        self.payload = payload;
        self
    }

    pub fn secret_calls(&self) -> u32 {
        self.secret_calls.load(Ordering::SeqCst)
    }

    pub fn service_calls(&self) -> u32 {
        self.service_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ClusterQuery for FakeQuery {
    async fn secret_config(&self, _: &Path, namespace: &str, secret: &str) -> anyhow::Result<String> {
        assert_eq!(namespace.strip_prefix("vcluster-"), secret.strip_prefix("vc-"));
        self.first_secret_query
            .lock()
            .unwrap()
            .get_or_insert_with(Instant::now);
        let n = self.secret_calls.fetch_add(1, Ordering::SeqCst) + 1;
        match self.secret_ready_on {
            Some(ready) if n >= ready => {
                let cluster = secret.strip_prefix("vc-").unwrap_or(secret);
                Ok(B64.encode((self.payload)(cluster)))
            }
            _ => anyhow::bail!("secrets \"{}\" not found", secret),
        }
    }

    async fn service_status(&self, _: &Path, _: &str, _: &str) -> anyhow::Result<ServiceStatus> {
        let n = self.service_calls.fetch_add(1, Ordering::SeqCst) + 1;
        let ingress = match self.endpoint_ready_on {
            Some(ready) if n >= ready => vec![IngressPoint {
                ip: Some("203.0.113.9".into()),
                hostname: None,
            }],
            _ => Vec::new(),
        };
        Ok(ServiceStatus {
            status: StatusBlock {
                load_balancer: LoadBalancerStatus { ingress },
            },
            spec: SpecBlock {
                ports: vec![ServicePort { port: 443 }],
            },
        })
    }
}
