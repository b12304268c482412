/* Copyright (C) 2025 Pedro Henrique / phkaiser13
* File: src/config.rs
*
* Immutable runtime configuration shared by every provisioning flow. Built
* once from the command line (see `cli::ProvisionerArgs`) and handed to the
* `Orchestrator`; tests construct it directly with zero delays.
*
* SPDX-License-Identifier: Apache-2.0 */

use crate::poll::PollBudget;
use crate::query::QueryBackend;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_WORKSPACE_ROOT: &str = "./requests";
pub const DEFAULT_BASE_KUBECONFIG: &str = "/var/secrets/kubeconfig";
pub const DEFAULT_VCLUSTER_BIN: &str = "vcluster";
pub const DEFAULT_KUBECTL_BIN: &str = "kubectl";

/// Wait after `vcluster create` returns, before the secret is first queried.
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_secs(60);
pub const DEFAULT_SECRET_POLL: PollBudget = PollBudget::new(Duration::from_secs(15), Duration::from_secs(180));
pub const DEFAULT_ENDPOINT_POLL: PollBudget = PollBudget::new(Duration::from_secs(10), Duration::from_secs(180));

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionerConfig {
    pub workspace_root: PathBuf,
    /// Used when a request does not bring its own kubeconfig.
    pub default_kubeconfig: PathBuf,
    pub vcluster_bin: PathBuf,
    pub kubectl_bin: PathBuf,
    pub query_backend: QueryBackend,
    /// Pass `--debug` to vcluster.
    pub vcluster_debug: bool,
    pub settle_delay: Duration,
    pub secret_poll: PollBudget,
    pub endpoint_poll: PollBudget,
}

impl Default for ProvisionerConfig {
    fn default() -> Self {
        ProvisionerConfig {
            workspace_root: PathBuf::from(DEFAULT_WORKSPACE_ROOT),
            default_kubeconfig: PathBuf::from(DEFAULT_BASE_KUBECONFIG),
            vcluster_bin: PathBuf::from(DEFAULT_VCLUSTER_BIN),
            kubectl_bin: PathBuf::from(DEFAULT_KUBECTL_BIN),
            query_backend: QueryBackend::default(),
            vcluster_debug: true,
            settle_delay: DEFAULT_SETTLE_DELAY,
            secret_poll: DEFAULT_SECRET_POLL,
            endpoint_poll: DEFAULT_ENDPOINT_POLL,
        }
    }
}
