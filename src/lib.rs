/* Copyright (C) 2025 Pedro Henrique / phkaiser13
* File: src/lib.rs
*
* Provisions virtual Kubernetes clusters with vcluster and hands back a
* kubeconfig that reaches them. A request writes a cluster spec into its own
* workspace, runs `vcluster create`, waits for the generated kubeconfig
* secret, optionally rewrites the server address to the load-balanced
* endpoint, and stores the result for later download.
*
* SPDX-License-Identifier: Apache-2.0 */

pub mod cli;
pub mod cluster_spec;
pub mod config;
pub mod endpoint;
pub mod error;
pub mod kubeconfig;
pub mod metrics;
pub mod orchestrator;
pub mod poll;
pub mod provisioners;
pub mod query;
pub mod readiness;
pub mod request;
pub mod server;
pub mod telemetry;
pub mod workspace;

#[cfg(test)]
pub(crate) mod testing;

pub use config::ProvisionerConfig;
pub use error::{FlowError, ProvisionError};
pub use orchestrator::{Orchestrator, ProvisioningOutcome, ProvisioningReport, Stage};
pub use request::{ClusterParams, ProvisioningRequest};
