/* Copyright (C) 2025 Pedro Henrique / phkaiser13
 * File: src/cli.rs
 * Command-line interface for the provisioner, declared with `clap` derive.
 * Every shared setting can also come from a `VCP_*` environment variable so
 * the server can be configured from a Deployment manifest.
 * SPDX-License-Identifier: Apache-2.0 */

use crate::config::{
    ProvisionerConfig, DEFAULT_BASE_KUBECONFIG, DEFAULT_KUBECTL_BIN, DEFAULT_VCLUSTER_BIN, DEFAULT_WORKSPACE_ROOT,
};
use crate::poll::PollBudget;
use crate::query::QueryBackend;
use clap::{Args, Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Provisions virtual Kubernetes clusters with vcluster and hands back their kubeconfig.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub provisioner: ProvisionerArgs,

    /// Emit logs as JSON lines.
    #[arg(long, global = true, env = "VCP_LOG_JSON")]
    pub log_json: bool,

    /// The command to execute.
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the HTTP API.
    Serve(ServeArgs),

    /// Provision a single virtual cluster and print its kubeconfig.
    Create(CreateArgs),
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Address the HTTP API listens on.
    #[arg(long, env = "VCP_LISTEN", default_value = "0.0.0.0:8081")]
    pub listen: SocketAddr,
}

#[derive(Args, Debug)]
pub struct CreateArgs {
    /// The name for the new virtual cluster.
    #[arg(required = true)]
    pub cluster_name: String,

    /// Run three control-plane replicas.
    #[arg(long)]
    pub ha: bool,

    /// Publish the API server through a LoadBalancer Service.
    #[arg(long)]
    pub expose: bool,

    /// Kubeconfig of the host cluster. Defaults to `--default-kubeconfig`.
    #[arg(long)]
    pub kubeconfig: Option<PathBuf>,

    /// Write the kubeconfig here instead of stdout.
    #[arg(long, short)]
    pub output: Option<PathBuf>,
}

/// Settings shared by every subcommand.
#[derive(Args, Debug)]
pub struct ProvisionerArgs {
    /// Directory under which each request gets its own workspace.
    #[arg(long, global = true, env = "VCP_WORKSPACE_ROOT", default_value = DEFAULT_WORKSPACE_ROOT)]
    pub workspace_root: PathBuf,

    /// Host-cluster kubeconfig used when a request does not supply one.
    #[arg(long, global = true, env = "VCP_DEFAULT_KUBECONFIG", default_value = DEFAULT_BASE_KUBECONFIG)]
    pub default_kubeconfig: PathBuf,

    #[arg(long, global = true, env = "VCP_VCLUSTER_BIN", default_value = DEFAULT_VCLUSTER_BIN)]
    pub vcluster_bin: PathBuf,

    #[arg(long, global = true, env = "VCP_KUBECTL_BIN", default_value = DEFAULT_KUBECTL_BIN)]
    pub kubectl_bin: PathBuf,

    /// How the secret and Service are queried while waiting.
    #[arg(long, global = true, value_enum, env = "VCP_QUERY_BACKEND", default_value_t = QueryBackend::Kubectl)]
    pub query_backend: QueryBackend,

    /// Seconds to wait after `vcluster create` before polling.
    #[arg(long, global = true, env = "VCP_SETTLE_DELAY_SECS", default_value_t = 60)]
    pub settle_delay_secs: u64,

    #[arg(long, global = true, env = "VCP_SECRET_POLL_INTERVAL_SECS", default_value_t = 15)]
    pub secret_poll_interval_secs: u64,

    #[arg(long, global = true, env = "VCP_SECRET_POLL_TIMEOUT_SECS", default_value_t = 180)]
    pub secret_poll_timeout_secs: u64,

    #[arg(long, global = true, env = "VCP_ENDPOINT_POLL_INTERVAL_SECS", default_value_t = 10)]
    pub endpoint_poll_interval_secs: u64,

    #[arg(long, global = true, env = "VCP_ENDPOINT_POLL_TIMEOUT_SECS", default_value_t = 180)]
    pub endpoint_poll_timeout_secs: u64,
}

impl From<&ProvisionerArgs> for ProvisionerConfig {
    fn from(args: &ProvisionerArgs) -> Self {
        ProvisionerConfig {
            workspace_root: args.workspace_root.clone(),
            default_kubeconfig: args.default_kubeconfig.clone(),
            vcluster_bin: args.vcluster_bin.clone(),
            kubectl_bin: args.kubectl_bin.clone(),
            query_backend: args.query_backend,
            settle_delay: Duration::from_secs(args.settle_delay_secs),
            secret_poll: PollBudget::new(
                Duration::from_secs(args.secret_poll_interval_secs),
                Duration::from_secs(args.secret_poll_timeout_secs),
            ),
            endpoint_poll: PollBudget::new(
                Duration::from_secs(args.endpoint_poll_interval_secs),
                Duration::from_secs(args.endpoint_poll_timeout_secs),
            ),
            ..ProvisionerConfig::default()
        }
    }
}
