/* Copyright (C) 2025 Pedro Henrique / phkaiser13
 * File: src/provisioners/mod.rs
 *
 * The `Provisioner` seam: whatever actually brings a virtual cluster up on
 * the host cluster. The orchestrator only depends on this trait, so tests can
 * swap in a fake while production uses the `vcluster` CLI.
 *
 * SPDX-License-Identifier: Apache-2.0
 */

pub mod common;
pub mod vcluster;

use crate::error::Result;
use async_trait::async_trait;
use std::path::Path;

pub use vcluster::VclusterProvisioner;

/// Everything one `create` call needs. Paths are owned by the request.
#[derive(Debug, Clone, Copy)]
pub struct CreateInvocation<'a> {
    pub cluster_name: &'a str,
    /// The spec file, already written inside `workspace`.
    pub spec_file: &'a Path,
    /// Working directory for the tool.
    pub workspace: &'a Path,
    /// Kubeconfig of the host cluster the virtual cluster is created in.
    pub base_kubeconfig: &'a Path,
    pub expose: bool,
}

#[async_trait]
pub trait Provisioner: Send + Sync {
    /// Creates the virtual cluster. A non-zero exit is reported as
    /// `ProvisionError::Invocation`; the call is never retried by callers.
    async fn create(&self, invocation: &CreateInvocation<'_>) -> Result<()>;
}
