/* Copyright (C) 2025 Pedro Henrique / phkaiser13
* File: src/query/kubectl.rs
*
* `ClusterQuery` over the kubectl CLI. Every invocation passes `--kubeconfig`
* explicitly and runs with in-cluster discovery variables scrubbed, so the
* query always reaches the host cluster named by the request.
*
* SPDX-License-Identifier: Apache-2.0 */

use super::{ClusterQuery, SECRET_CONFIG_KEY};
use crate::endpoint::ServiceStatus;
use crate::provisioners::common::{describe, scrubbed_env};
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct KubectlQuery {
    binary: PathBuf,
}

impl KubectlQuery {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        KubectlQuery {
            binary: binary.into(),
        }
    }

    fn base_command(&self, base_kubeconfig: &Path) -> Command {
        let mut command = Command::new(&self.binary);
        command
            .arg("--kubeconfig")
            .arg(base_kubeconfig)
            .env_clear()
            .envs(scrubbed_env(std::env::vars_os()))
            .stdin(Stdio::null());
        command
    }

    /// `kubectl --kubeconfig <base> get secret <secret> -n <ns> --template={{.data.config}}`
    pub fn secret_command(&self, base_kubeconfig: &Path, namespace: &str, secret: &str) -> Command {
        let mut command = self.base_command(base_kubeconfig);
        command
            .args(["get", "secret", secret, "-n", namespace])
            .arg(format!("--template={{{{.data.{}}}}}", SECRET_CONFIG_KEY));
        command
    }

    /// `kubectl --kubeconfig <base> get svc <service> -n <ns> -o json`
    pub fn service_command(&self, base_kubeconfig: &Path, namespace: &str, service: &str) -> Command {
        let mut command = self.base_command(base_kubeconfig);
        command.args(["get", "svc", service, "-n", namespace, "-o", "json"]);
        command
    }

    /// Runs a query command and returns stdout. stderr only feeds the error.
    async fn run(mut command: Command) -> Result<Vec<u8>> {
        let rendered = describe(&command);
        let output = command
            .output()
            .await
            .with_context(|| format!("Failed to run `{}`. Is kubectl in your PATH?", rendered))?;

        if !output.status.success() {
            bail!(
                "`{}` exited with {}: {}",
                rendered,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        debug!(command = %rendered, bytes = output.stdout.len(), "kubectl query succeeded");
        Ok(output.stdout)
    }
}

#[async_trait]
impl ClusterQuery for KubectlQuery {
    async fn secret_config(&self, base_kubeconfig: &Path, namespace: &str, secret: &str) -> Result<String> {
        let stdout = Self::run(self.secret_command(base_kubeconfig, namespace, secret)).await?;
        let text = String::from_utf8(stdout).context("Secret payload is not valid UTF-8")?;
        // A missing key renders as "<no value>" under go templates.
        if text.trim() == "<no value>" {
            return Ok(String::new());
        }
        Ok(text)
    }

    async fn service_status(&self, base_kubeconfig: &Path, namespace: &str, service: &str) -> Result<ServiceStatus> {
        let stdout = Self::run(self.service_command(base_kubeconfig, namespace, service)).await?;
        ServiceStatus::from_json(&stdout).context("Failed to parse service JSON")
    }
}
