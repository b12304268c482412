/* Copyright (C) 2025 Pedro Henrique / phkaiser13
* File: src/main.rs
*
* Entry point for the `vcluster_provisioner` binary. Parses the command line,
* installs logging, wires the orchestrator with its production collaborators
* and dispatches to the chosen subcommand:
*
* - `serve` runs the HTTP API until Ctrl-C.
* - `create` provisions one virtual cluster and prints or writes its kubeconfig.
*
* SPDX-License-Identifier: Apache-2.0 */

use anyhow::{Context, Result};
use clap::Parser;
use std::io::Write;
use std::sync::Arc;
use tracing::info;
use vcluster_provisioner::cli::{Cli, Commands, CreateArgs};
use vcluster_provisioner::metrics::ProvisionMetrics;
use vcluster_provisioner::{server, telemetry, ClusterParams, Orchestrator, ProvisionerConfig};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    telemetry::init(cli.log_json)?;

    let config = ProvisionerConfig::from(&cli.provisioner);
    info!(
        workspace_root = %config.workspace_root.display(),
        query_backend = ?config.query_backend,
        "Provisioner configured"
    );
    let metrics = ProvisionMetrics::new().context("Failed to register metrics")?;
    let orchestrator = Arc::new(Orchestrator::from_config(config, metrics));

    match cli.command {
        Commands::Serve(args) => server::serve(orchestrator, args.listen).await,
        Commands::Create(args) => create(&orchestrator, args).await,
    }
}

async fn create(orchestrator: &Orchestrator, args: CreateArgs) -> Result<()> {
    let workspace = orchestrator
        .create_workspace()
        .await
        .context("Failed to create request workspace")?;
    let params = ClusterParams {
        cluster_name: args.cluster_name,
        high_availability: args.ha,
        expose: args.expose,
    };
    let request = orchestrator
        .admit(workspace, params, args.kubeconfig)
        .await
        .context("Request was rejected")?;

    let report = orchestrator.provision(&request).await;
    let credential = report
        .into_result()
        .with_context(|| format!("Failed to provision '{}'", request.cluster_name()))?;

    info!(
        request_id = %request.id(),
        stored_at = %credential.path.display(),
        "Virtual cluster provisioned"
    );
    match args.output {
        Some(path) => std::fs::write(&path, &credential.bytes)
            .with_context(|| format!("Failed to write kubeconfig to {}", path.display()))?,
        None => std::io::stdout()
            .write_all(&credential.bytes)
            .context("Failed to write kubeconfig to stdout")?,
    }
    Ok(())
}
