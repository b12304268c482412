/*
* Copyright (C) 2025 Pedro Henrique / phkaiser13
*
* File: src/orchestrator.rs
*
* The request orchestrator drives one provisioning request through its stages:
*
*   Created -> SpecWritten -> Provisioned -> SecretReady -> (EndpointResolved)
*           -> Stored -> Done
*
* Stages are strictly sequential and never revisited. When a step fails, the
* flow ends in `Failed` carrying the stage that was being entered. The
* endpoint stage only runs for requests that asked for external exposure;
* otherwise the credential is stored exactly as read from the secret.
*
* An `Orchestrator` holds immutable configuration and handles to its
* collaborators and may run any number of flows concurrently. Per-request
* progress lives in a `ProvisioningFlow` owned by that request's task.
*
* SPDX-License-Identifier: Apache-2.0
*/

use crate::cluster_spec::ClusterSpec;
use crate::config::ProvisionerConfig;
use crate::error::{FlowError, ProvisionError, Result};
use crate::kubeconfig::{patch_server_endpoint, CredentialDocument};
use crate::metrics::{ProvisionMetrics, OUTCOME_READY};
use crate::provisioners::{CreateInvocation, Provisioner, VclusterProvisioner};
use crate::query::{ClusterQuery, KubeApiQuery, KubectlQuery, QueryBackend};
use crate::readiness::{resolve_endpoint, wait_for_credential};
use crate::request::{ClusterParams, ProvisioningRequest};
use crate::workspace::{self, Workspace, Workspaces};
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::time::{sleep, Instant};
use tracing::{error, info, info_span, Instrument};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Created,
    SpecWritten,
    Provisioned,
    SecretReady,
    EndpointResolved,
    Stored,
    Done,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Created => "created",
            Stage::SpecWritten => "spec_written",
            Stage::Provisioned => "provisioned",
            Stage::SecretReady => "secret_ready",
            Stage::EndpointResolved => "endpoint_resolved",
            Stage::Stored => "stored",
            Stage::Done => "done",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The kubeconfig handed back to the caller and where it was stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    pub bytes: Vec<u8>,
    pub path: PathBuf,
}

#[derive(Debug)]
pub enum ProvisioningOutcome {
    Pending,
    Ready(Credential),
    Failed(FlowError),
}

/// Progress of a single request. Only moves forward.
#[derive(Debug)]
pub struct ProvisioningFlow {
    history: Vec<Stage>,
    outcome: ProvisioningOutcome,
    last_transition: Instant,
}

impl ProvisioningFlow {
    pub fn new() -> Self {
        ProvisioningFlow {
            history: vec![Stage::Created],
            outcome: ProvisioningOutcome::Pending,
            last_transition: Instant::now(),
        }
    }

    pub fn stage(&self) -> Stage {
        self.history.last().copied().unwrap_or(Stage::Created)
    }

    pub fn history(&self) -> &[Stage] {
        &self.history
    }

    pub fn outcome(&self) -> &ProvisioningOutcome {
        &self.outcome
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self.outcome, ProvisioningOutcome::Pending)
    }

    /// Records `next` and returns the time spent since the previous stage.
    /// Returns `None` without changing anything if the flow is already
    /// terminal or `next` is not strictly after the current stage.
    fn advance(&mut self, next: Stage) -> Option<f64> {
        if self.is_terminal() || next <= self.stage() {
            return None;
        }
        self.history.push(next);
        let now = Instant::now();
        let spent = now.duration_since(self.last_transition).as_secs_f64();
        self.last_transition = now;
        Some(spent)
    }

    fn finish(&mut self, outcome: ProvisioningOutcome) {
        if !self.is_terminal() {
            self.outcome = outcome;
        }
    }
}

impl Default for ProvisioningFlow {
    fn default() -> Self {
        Self::new()
    }
}

/// What a finished `provision` call reports.
#[derive(Debug)]
pub struct ProvisioningReport {
    pub request_id: String,
    pub cluster_name: String,
    pub history: Vec<Stage>,
    pub outcome: ProvisioningOutcome,
}

impl ProvisioningReport {
    pub fn into_result(self) -> std::result::Result<Credential, FlowError> {
        match self.outcome {
            ProvisioningOutcome::Ready(credential) => Ok(credential),
            ProvisioningOutcome::Failed(e) => Err(e),
            // `provision` always returns a terminal outcome.
            ProvisioningOutcome::Pending => Err(FlowError {
                stage: self.history.last().copied().unwrap_or(Stage::Created),
                source: ProvisionError::Validation("provisioning did not finish".into()),
            }),
        }
    }
}

pub struct Orchestrator {
    config: ProvisionerConfig,
    workspaces: Workspaces,
    provisioner: Arc<dyn Provisioner>,
    query: Arc<dyn ClusterQuery>,
    metrics: ProvisionMetrics,
}

impl Orchestrator {
    pub fn new(
        config: ProvisionerConfig,
        provisioner: Arc<dyn Provisioner>,
        query: Arc<dyn ClusterQuery>,
        metrics: ProvisionMetrics,
    ) -> Self {
        let workspaces = Workspaces::new(&config.workspace_root);
        Orchestrator {
            config,
            workspaces,
            provisioner,
            query,
            metrics,
        }
    }

    /// Wires the production collaborators selected by `config`.
    pub fn from_config(config: ProvisionerConfig, metrics: ProvisionMetrics) -> Self {
        let provisioner = Arc::new(VclusterProvisioner::new(&config.vcluster_bin).with_debug(config.vcluster_debug));
        let query: Arc<dyn ClusterQuery> = match config.query_backend {
            QueryBackend::Kubectl => Arc::new(KubectlQuery::new(&config.kubectl_bin)),
            QueryBackend::Api => Arc::new(KubeApiQuery::new()),
        };
        Self::new(config, provisioner, query, metrics)
    }

    pub fn config(&self) -> &ProvisionerConfig {
        &self.config
    }

    pub fn metrics(&self) -> &ProvisionMetrics {
        &self.metrics
    }

    pub async fn create_workspace(&self) -> Result<Workspace> {
        self.workspaces.create().await
    }

    /// Admits a request into `workspace`, falling back to the configured
    /// default kubeconfig when the caller supplied none. A rejected request's
    /// workspace is removed.
    pub async fn admit(
        &self,
        workspace: Workspace,
        params: ClusterParams,
        base_kubeconfig: Option<PathBuf>,
    ) -> Result<ProvisioningRequest> {
        let base = base_kubeconfig.unwrap_or_else(|| self.config.default_kubeconfig.clone());
        let rejected = workspace.clone();
        match ProvisioningRequest::admit(workspace, params, base).await {
            Ok(request) => Ok(request),
            Err(e) => {
                workspace::discard(&rejected).await;
                Err(e)
            }
        }
    }

    pub async fn discard_workspace(&self, workspace: Workspace) {
        workspace::discard(&workspace).await;
    }

    /// Runs `request` to a terminal outcome.
    pub async fn provision(&self, request: &ProvisioningRequest) -> ProvisioningReport {
        let span = info_span!("provision", request_id = %request.id(), cluster = %request.cluster_name());
        self.run(request).instrument(span).await
    }

    /// Reads the credential stored by a finished request.
    pub async fn fetch_credential(&self, request_id: &str, cluster_name: &str) -> Result<Vec<u8>> {
        self.workspaces.read_credential(request_id, cluster_name).await
    }

    async fn run(&self, request: &ProvisioningRequest) -> ProvisioningReport {
        info!(
            ha = request.high_availability(),
            expose = request.expose(),
            base_kubeconfig = %request.base_kubeconfig().display(),
            "Provisioning request admitted"
        );
        let mut flow = ProvisioningFlow::new();

        match self.drive(request, &mut flow).await {
            Ok(credential) => {
                info!(path = %credential.path.display(), "Virtual cluster is ready");
                self.enter(&mut flow, Stage::Done);
                self.metrics.record_outcome(OUTCOME_READY);
                flow.finish(ProvisioningOutcome::Ready(credential));
            }
            Err(e) => {
                error!(stage = %e.stage, error = %e.source, "Provisioning failed");
                self.metrics.record_outcome(e.stage.as_str());
                flow.finish(ProvisioningOutcome::Failed(e));
            }
        }

        ProvisioningReport {
            request_id: request.id().to_string(),
            cluster_name: request.cluster_name().to_string(),
            history: flow.history,
            outcome: flow.outcome,
        }
    }

    fn enter(&self, flow: &mut ProvisioningFlow, stage: Stage) {
        if let Some(spent) = flow.advance(stage) {
            self.metrics.observe_stage(stage.as_str(), spent);
            info!(stage = %stage, seconds = spent, "Stage reached");
        }
    }

    async fn drive(&self, request: &ProvisioningRequest, flow: &mut ProvisioningFlow) -> std::result::Result<Credential, FlowError> {
        let name = request.cluster_name();
        let workspace = request.workspace();
        let base = request.base_kubeconfig();

        let spec = ClusterSpec::build(name, request.high_availability(), request.expose());
        let spec_file = spec
            .write_to(workspace.dir())
            .await
            .map_err(FlowError::at(Stage::SpecWritten))?;
        self.enter(flow, Stage::SpecWritten);

        let invocation = CreateInvocation {
            cluster_name: name,
            spec_file: &spec_file,
            workspace: workspace.dir(),
            base_kubeconfig: base,
            expose: request.expose(),
        };
        self.provisioner
            .create(&invocation)
            .await
            .map_err(FlowError::at(Stage::Provisioned))?;
        self.enter(flow, Stage::Provisioned);

        if !self.config.settle_delay.is_zero() {
            info!(delay = ?self.config.settle_delay, "Waiting for the virtual cluster to settle");
            sleep(self.config.settle_delay).await;
        }

        let raw = wait_for_credential(self.query.as_ref(), base, name, self.config.secret_poll)
            .await
            .map_err(FlowError::at(Stage::SecretReady))?;
        self.enter(flow, Stage::SecretReady);

        let bytes = if request.expose() {
            let endpoint = resolve_endpoint(self.query.as_ref(), base, name, self.config.endpoint_poll)
                .await
                .map_err(FlowError::at(Stage::EndpointResolved))?;
            self.enter(flow, Stage::EndpointResolved);
            info!(endpoint = %endpoint, "Rewriting kubeconfig server address");
            patch_server_endpoint(&raw, &endpoint).map_err(FlowError::at(Stage::Stored))?
        } else {
            // Stored as read, but it must still be a kubeconfig.
            CredentialDocument::from_slice(&raw).map_err(FlowError::at(Stage::Stored))?;
            raw
        };

        let path = workspace.credential_path(name);
        workspace::store(&path, &bytes)
            .await
            .map_err(FlowError::at(Stage::Stored))?;
        self.enter(flow, Stage::Stored);

        Ok(Credential { bytes, path })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::poll::PollBudget;
    use crate::testing::{kubeconfig_for, FakeProvisioner, FakeQuery, VCLUSTER_KUBECONFIG};
    use std::time::Duration;

    struct Harness {
        _root: tempfile::TempDir,
        base: PathBuf,
        orchestrator: Orchestrator,
        provisioner: Arc<FakeProvisioner>,
        query: Arc<FakeQuery>,
    }

    fn harness(provisioner: FakeProvisioner, query: FakeQuery, settle_delay: Duration) -> Harness {
        let root = tempfile::tempdir().unwrap();
        let base = root.path().join("base.yaml");
        std::fs::write(&base, "apiVersion: v1\nclusters: []\n").unwrap();

        let config = ProvisionerConfig {
            workspace_root: root.path().join("requests"),
            default_kubeconfig: base.clone(),
            settle_delay,
            secret_poll: PollBudget::new(Duration::from_secs(15), Duration::from_secs(180)),
            endpoint_poll: PollBudget::new(Duration::from_secs(10), Duration::from_secs(180)),
            ..ProvisionerConfig::default()
        };
        let provisioner = Arc::new(provisioner);
        let query = Arc::new(query);
        let orchestrator = Orchestrator::new(
            config,
            provisioner.clone(),
            query.clone(),
            ProvisionMetrics::new().unwrap(),
        );
        Harness {
            _root: root,
            base,
            orchestrator,
            provisioner,
            query,
        }
    }

    async fn request(h: &Harness, name: &str, ha: bool, expose: bool) -> ProvisioningRequest {
        let workspace = h.orchestrator.create_workspace().await.unwrap();
        let params = ClusterParams {
            cluster_name: name.to_string(),
            high_availability: ha,
            expose,
        };
        h.orchestrator.admit(workspace, params, None).await.unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_minimal_request_stores_credential_unchanged() {
        let h = harness(FakeProvisioner::default(), FakeQuery::new(Some(1), None), Duration::ZERO);
        let req = request(&h, "demo", false, false).await;
        assert_eq!(req.base_kubeconfig(), h.base);

        let report = h.orchestrator.provision(&req).await;

        assert_eq!(
            report.history,
            [Stage::Created, Stage::SpecWritten, Stage::Provisioned, Stage::SecretReady, Stage::Stored, Stage::Done]
        );
        let specs = h.provisioner.specs.lock().unwrap().clone();
        assert_eq!(specs.len(), 1);
        assert!(specs[0].contains("replicas: 1"));
        assert!(!specs[0].contains("service:"));
        assert_eq!(h.query.service_calls(), 0);

        let credential = report.into_result().unwrap();
        assert_eq!(credential.bytes, VCLUSTER_KUBECONFIG.as_bytes());
        assert_eq!(credential.path, req.workspace().credential_path("demo"));
        assert_eq!(std::fs::read(&credential.path).unwrap(), VCLUSTER_KUBECONFIG.as_bytes());
        assert_eq!(h.orchestrator.metrics().provisions(OUTCOME_READY), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exposed_request_rewrites_every_server() {
        let h = harness(FakeProvisioner::default(), FakeQuery::new(Some(2), Some(3)), Duration::ZERO);
        let req = request(&h, "demo-ha", true, true).await;

        let report = h.orchestrator.provision(&req).await;

        assert_eq!(
            report.history,
            [
                Stage::Created,
                Stage::SpecWritten,
                Stage::Provisioned,
                Stage::SecretReady,
                Stage::EndpointResolved,
                Stage::Stored,
                Stage::Done
            ]
        );
        let specs = h.provisioner.specs.lock().unwrap().clone();
        assert!(specs[0].contains("replicas: 3"));
        assert!(specs[0].contains("type: LoadBalancer"));
        assert_eq!(h.query.secret_calls(), 2);
        assert_eq!(h.query.service_calls(), 3);

        let credential = report.into_result().unwrap();
        let doc = CredentialDocument::from_slice(&credential.bytes).unwrap();
        assert_eq!(doc.clusters().len(), 2);
        assert!(doc.servers().all(|s| s == "https://203.0.113.9"));

        let fetched = h.orchestrator.fetch_credential(req.id(), "demo-ha").await.unwrap();
        assert_eq!(fetched, credential.bytes);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_create_stops_before_polling() {
        let h = harness(FakeProvisioner::failing(), FakeQuery::new(Some(1), None), Duration::ZERO);
        let req = request(&h, "demo", false, false).await;

        let report = h.orchestrator.provision(&req).await;

        assert_eq!(report.history, [Stage::Created, Stage::SpecWritten]);
        let err = report.into_result().unwrap_err();
        assert_eq!(err.stage, Stage::Provisioned);
        assert_eq!(err.kind(), ErrorKind::Invocation);
        assert!(err.to_string().contains("namespace already exists"));
        assert_eq!(h.query.secret_calls(), 0);
        assert_eq!(h.orchestrator.metrics().provisions("provisioned"), 1);

        let missing = h.orchestrator.fetch_credential(req.id(), "demo").await.unwrap_err();
        assert_eq!(missing.kind(), ErrorKind::NotFound);
    }

    #[tokio::test(start_paused = true)]
    async fn test_secret_timeout() {
        let h = harness(FakeProvisioner::default(), FakeQuery::new(None, None), Duration::ZERO);
        let req = request(&h, "demo", false, false).await;

        let report = h.orchestrator.provision(&req).await;

        let err = report.into_result().unwrap_err();
        assert_eq!(err.stage, Stage::SecretReady);
        assert_eq!(err.kind(), ErrorKind::Timeout);
        assert_eq!(h.query.secret_calls(), 13);
        assert!(!req.workspace().credential_path("demo").exists());
    }

    #[tokio::test(start_paused = true)]
    async fn test_endpoint_timeout() {
        let h = harness(FakeProvisioner::default(), FakeQuery::new(Some(1), None), Duration::ZERO);
        let req = request(&h, "demo", false, true).await;

        let report = h.orchestrator.provision(&req).await;

        assert_eq!(report.history.last(), Some(&Stage::SecretReady));
        let err = report.into_result().unwrap_err();
        assert_eq!(err.stage, Stage::EndpointResolved);
        assert_eq!(h.query.service_calls(), 19);
    }

    #[tokio::test(start_paused = true)]
    async fn test_settle_delay_precedes_first_secret_query() {
        let h = harness(FakeProvisioner::default(), FakeQuery::new(Some(1), None), Duration::from_secs(60));
        let req = request(&h, "demo", false, false).await;

        let started = Instant::now();
        let report = h.orchestrator.provision(&req).await;
        assert!(report.into_result().is_ok());

        let first = h.query.first_secret_query.lock().unwrap().unwrap();
        assert!(first.duration_since(started) >= Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn test_payload_that_is_not_a_kubeconfig_fails_unexposed() {
        let query = FakeQuery::new(Some(1), None).with_payload(|_| "just: some yaml\n".to_string());
        let h = harness(FakeProvisioner::default(), query, Duration::ZERO);
        let req = request(&h, "demo", false, false).await;

        let report = h.orchestrator.provision(&req).await;

        assert_eq!(report.history.last(), Some(&Stage::SecretReady));
        let err = report.into_result().unwrap_err();
        assert_eq!(err.stage, Stage::Stored);
        assert_eq!(err.kind(), ErrorKind::Decode);
        assert!(!req.workspace().credential_path("demo").exists());
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_flows_stay_isolated() {
        let query = FakeQuery::new(Some(1), Some(1)).with_payload(kubeconfig_for);
        let h = Arc::new(harness(FakeProvisioner::default(), query, Duration::from_secs(60)));
        let names = ["alpha", "bravo", "charlie", "delta"];

        let mut requests = Vec::new();
        for (i, name) in names.iter().enumerate() {
            requests.push(request(&h, name, false, i % 2 == 1).await);
        }
        let handles: Vec<_> = requests
            .into_iter()
            .map(|req| {
                let h = h.clone();
                tokio::spawn(async move {
                    let report = h.orchestrator.provision(&req).await;
                    (req, report)
                })
            })
            .collect();

        let mut ids = std::collections::HashSet::new();
        for (i, handle) in handles.into_iter().enumerate() {
            let (req, report) = handle.await.unwrap();
            let name = names[i];
            let exposed = i % 2 == 1;
            assert_eq!(report.cluster_name, name);
            assert!(ids.insert(report.request_id.clone()));
            assert_eq!(report.history.contains(&Stage::EndpointResolved), exposed);

            let credential = report.into_result().unwrap();
            assert_eq!(credential.path, req.workspace().credential_path(name));
            let stored = std::fs::read(&credential.path).unwrap();
            assert_eq!(stored, credential.bytes);

            let doc = CredentialDocument::from_slice(&stored).unwrap();
            assert_eq!(doc.clusters()[0].name, format!("my-vcluster-{}", name));
            if exposed {
                assert!(doc.servers().all(|s| s == "https://203.0.113.9"));
            } else {
                assert_eq!(stored, kubeconfig_for(name).as_bytes());
            }
        }
        assert_eq!(ids.len(), names.len());
        assert_eq!(h.provisioner.calls(), names.len());
        assert_eq!(h.orchestrator.metrics().provisions(OUTCOME_READY), names.len() as u64);
    }

    #[test]
    fn test_flow_only_moves_forward() {
        let mut flow = ProvisioningFlow::new();
        assert!(flow.advance(Stage::SpecWritten).is_some());
        assert!(flow.advance(Stage::Provisioned).is_some());
        assert!(flow.advance(Stage::SpecWritten).is_none());
        assert!(flow.advance(Stage::Provisioned).is_none());
        assert_eq!(flow.stage(), Stage::Provisioned);

        flow.finish(ProvisioningOutcome::Failed(FlowError {
            stage: Stage::SecretReady,
            source: ProvisionError::Validation("x".into()),
        }));
        assert!(flow.is_terminal());
        assert!(flow.advance(Stage::Done).is_none());
        flow.finish(ProvisioningOutcome::Pending);
        assert!(matches!(flow.outcome(), ProvisioningOutcome::Failed(_)));
    }

    #[test]
    fn test_stage_names() {
        assert_eq!(Stage::SecretReady.to_string(), "secret_ready");
        assert_eq!(Stage::EndpointResolved.as_str(), "endpoint_resolved");
        assert!(Stage::Created < Stage::Done);
    }
}
