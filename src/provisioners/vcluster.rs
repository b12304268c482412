/* Copyright (C) 2025 Pedro Henrique / phkaiser13
 * File: src/provisioners/vcluster.rs
 * Implements the `Provisioner` trait with the vcluster CLI.
 * SPDX-License-Identifier: Apache-2.0
 */

use super::common::{describe, execute_command, scrubbed_env, KUBECONFIG_ENV};
use super::{CreateInvocation, Provisioner};
use crate::error::{ProvisionError, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Provisioner backed by `vcluster create`.
#[derive(Debug, Clone)]
pub struct VclusterProvisioner {
    binary: PathBuf,
    debug: bool,
}

impl VclusterProvisioner {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        VclusterProvisioner {
            binary: binary.into(),
            debug: false,
        }
    }

    /// Passes `--debug` to vcluster for verbose output in the captured transcript.
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Builds `vcluster create <name> --config <spec> --connect=false --skip-wait [--debug] [--expose]`
    /// running in the workspace with a scrubbed environment and `KUBECONFIG`
    /// pointing at the base kubeconfig.
    pub fn command(&self, invocation: &CreateInvocation<'_>) -> Command {
        let mut command = Command::new(&self.binary);
        command
            .arg("create")
            .arg(invocation.cluster_name)
            .arg("--config")
            .arg(spec_argument(invocation.spec_file, invocation.workspace))
            .arg("--connect=false")
            .arg("--skip-wait");
        if self.debug {
            command.arg("--debug");
        }
        if invocation.expose {
            command.arg("--expose");
        }

        command
            .current_dir(invocation.workspace)
            .env_clear()
            .envs(scrubbed_env(std::env::vars_os()))
            .env(KUBECONFIG_ENV, invocation.base_kubeconfig);
        command
    }
}

/// The spec is passed relative to the workspace when it lives inside it.
fn spec_argument(spec_file: &Path, workspace: &Path) -> PathBuf {
    spec_file
        .strip_prefix(workspace)
        .map(Path::to_path_buf)
        .unwrap_or_else(|_| spec_file.to_path_buf())
}

#[async_trait]
impl Provisioner for VclusterProvisioner {
    async fn create(&self, invocation: &CreateInvocation<'_>) -> Result<()> {
        let mut command = self.command(invocation);
        let rendered = describe(&command);
        info!(
            cluster = %invocation.cluster_name,
            workspace = %invocation.workspace.display(),
            command = %rendered,
            "Creating virtual cluster"
        );

        let output = execute_command(&mut command).await?;
        if !output.success {
            warn!(
                cluster = %invocation.cluster_name,
                status = %output.status,
                output = %output.combined,
                "vcluster create failed"
            );
            return Err(ProvisionError::Invocation {
                command: rendered,
                status: output.status,
                output: output.combined,
            });
        }

        debug!(cluster = %invocation.cluster_name, output = %output.combined, "vcluster create finished");
        Ok(())
    }
}
