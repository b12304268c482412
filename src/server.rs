/*
* Copyright (C) 2025 Pedro Henrique / phkaiser13
*
* File: src/server.rs
*
* The HTTP API, built with `warp`:
*
*   POST /api/vcluster   multipart form; provisions a cluster and returns its
*                        kubeconfig, setting a `reqid` cookie for later download
*   GET  /download       returns a stored kubeconfig as an attachment
*   GET  /metrics        Prometheus text format
*   GET  /healthz        liveness
*
* A provisioning request runs in its own task, so a client that disconnects
* does not abort a half-created cluster.
*
* SPDX-License-Identifier: Apache-2.0
*/

use crate::error::{ErrorKind, FlowError, ProvisionError};
use crate::orchestrator::{Orchestrator, Stage};
use crate::request::{validate_cluster_name, ClusterParams};
use bytes::BufMut;
use futures::{StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{error, info, warn};
use warp::http::{header, StatusCode};
use warp::multipart::{FormData, Part};
use warp::reply::{self, Response};
use warp::{Filter, Rejection, Reply};

/// Largest multipart body accepted by `POST /api/vcluster`.
pub const MAX_FORM_BYTES: u64 = 32 << 20;
pub const REQUEST_ID_COOKIE: &str = "reqid";
/// Name under which an uploaded host kubeconfig is saved in the workspace.
pub const UPLOADED_KUBECONFIG: &str = "uploaded.yaml";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ProvisionResponse {
    kubeconfig: String,
    request_id: String,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    stage: Option<Stage>,
}

#[derive(Debug, Default, Deserialize)]
struct DownloadQuery {
    #[serde(rename = "clusterName")]
    cluster_name: Option<String>,
    #[serde(rename = "reqId")]
    req_id: Option<String>,
}

/// The fields of the provisioning form.
#[derive(Debug, Default)]
struct ProvisionForm {
    cluster_name: String,
    high_availability: bool,
    load_balancer: bool,
    kubeconfig: Option<Vec<u8>>,
}

fn with_orchestrator(
    orchestrator: Arc<Orchestrator>,
) -> impl Filter<Extract = (Arc<Orchestrator>,), Error = Infallible> + Clone {
    warp::any().map(move || orchestrator.clone())
}

/// All routes, with CORS applied.
pub fn routes(orchestrator: Arc<Orchestrator>) -> impl Filter<Extract = (impl Reply,), Error = Infallible> + Clone {
    let provision = warp::path!("api" / "vcluster")
        .and(warp::post())
        .and(warp::multipart::form().max_length(MAX_FORM_BYTES))
        .and(with_orchestrator(orchestrator.clone()))
        .and_then(handle_provision);

    let download = warp::path!("download")
        .and(warp::get())
        .and(warp::query::<DownloadQuery>())
        .and(warp::cookie::optional(REQUEST_ID_COOKIE))
        .and(with_orchestrator(orchestrator.clone()))
        .and_then(handle_download);

    let metrics = warp::path!("metrics")
        .and(warp::get())
        .and(with_orchestrator(orchestrator))
        .and_then(handle_metrics);

    let healthz = warp::path!("healthz").and(warp::get()).map(|| "ok");

    let cors = warp::cors()
        .allow_any_origin()
        .allow_methods(vec!["POST", "GET", "OPTIONS"])
        .allow_header("content-type");

    provision
        .or(download)
        .or(metrics)
        .or(healthz)
        .with(cors)
        .recover(handle_rejection)
}

/// Serves the API on `addr` until Ctrl-C.
pub async fn serve(orchestrator: Arc<Orchestrator>, addr: SocketAddr) -> anyhow::Result<()> {
    let (bound, server) = warp::serve(routes(orchestrator)).try_bind_with_graceful_shutdown(addr, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for shutdown signal");
        }
    })?;
    info!("Starting HTTP API on {}", bound);
    server.await;
    info!("HTTP API shut down");
    Ok(())
}

fn error_reply(status: StatusCode, error: impl ToString, stage: Option<Stage>) -> Response {
    let body = ErrorBody {
        error: error.to_string(),
        stage,
    };
    reply::with_status(reply::json(&body), status).into_response()
}

fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Validation => StatusCode::BAD_REQUEST,
        ErrorKind::Timeout => StatusCode::GATEWAY_TIMEOUT,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Invocation | ErrorKind::Decode | ErrorKind::Io => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn provision_error_reply(e: &ProvisionError) -> Response {
    error_reply(status_for(e.kind()), e, None)
}

fn flow_error_reply(e: &FlowError) -> Response {
    error_reply(status_for(e.kind()), &e.source, Some(e.stage))
}

async fn part_bytes(part: Part) -> Result<Vec<u8>, warp::Error> {
    part.stream()
        .try_fold(Vec::new(), |mut acc, chunk| async move {
            acc.put(chunk);
            Ok(acc)
        })
        .await
}

async fn read_form(mut form: FormData) -> Result<ProvisionForm, warp::Error> {
    let mut fields = ProvisionForm::default();
    while let Some(part) = form.next().await {
        let part = part?;
        let name = part.name().to_string();
        let has_filename = part.filename().is_some();
        let data = part_bytes(part).await?;
        match name.as_str() {
            "clusterName" => fields.cluster_name = String::from_utf8_lossy(&data).trim().to_string(),
            "ha" => fields.high_availability = data == b"on",
            "loadbalancer" => fields.load_balancer = data == b"on",
            // Browsers send an empty part when no file was chosen.
            "kubeconfigFile" if has_filename && !data.is_empty() => fields.kubeconfig = Some(data),
            _ => {}
        }
    }
    Ok(fields)
}

async fn handle_provision(form: FormData, orchestrator: Arc<Orchestrator>) -> Result<Response, Infallible> {
    let form = match read_form(form).await {
        Ok(form) => form,
        Err(e) => {
            warn!(error = %e, "Malformed provisioning form");
            return Ok(error_reply(StatusCode::BAD_REQUEST, e, None));
        }
    };
    if let Err(e) = validate_cluster_name(&form.cluster_name) {
        return Ok(provision_error_reply(&e));
    }

    let workspace = match orchestrator.create_workspace().await {
        Ok(ws) => ws,
        Err(e) => {
            error!(error = %e, "Failed to create workspace");
            return Ok(provision_error_reply(&e));
        }
    };

    let base_kubeconfig = match form.kubeconfig {
        Some(data) => {
            let path = workspace.dir().join(UPLOADED_KUBECONFIG);
            let saved = match tokio::fs::write(&path, &data).await {
                Ok(()) => tokio::fs::canonicalize(&path).await,
                Err(e) => Err(e),
            };
            match saved {
                Ok(abs) => Some(abs),
                Err(e) => {
                    orchestrator.discard_workspace(workspace).await;
                    return Ok(provision_error_reply(&ProvisionError::Io { path, source: e }));
                }
            }
        }
        None => None,
    };

    let params = ClusterParams {
        cluster_name: form.cluster_name,
        high_availability: form.high_availability,
        expose: form.load_balancer,
    };
    let request = match orchestrator.admit(workspace, params, base_kubeconfig).await {
        Ok(request) => request,
        Err(e) => return Ok(provision_error_reply(&e)),
    };

    let request_id = request.id().to_string();
    let task = tokio::spawn(async move { orchestrator.provision(&request).await });
    let report = match task.await {
        Ok(report) => report,
        Err(e) => {
            error!(request_id = %request_id, error = %e, "Provisioning task aborted");
            return Ok(error_reply(StatusCode::INTERNAL_SERVER_ERROR, e, None));
        }
    };

    match report.into_result() {
        Ok(credential) => {
            let body = ProvisionResponse {
                kubeconfig: String::from_utf8_lossy(&credential.bytes).into_owned(),
                request_id: request_id.clone(),
            };
            let cookie = format!("{}={}; Path=/", REQUEST_ID_COOKIE, request_id);
            Ok(reply::with_header(reply::json(&body), header::SET_COOKIE, cookie).into_response())
        }
        Err(e) => Ok(flow_error_reply(&e)),
    }
}

async fn handle_download(
    query: DownloadQuery,
    cookie: Option<String>,
    orchestrator: Arc<Orchestrator>,
) -> Result<Response, Infallible> {
    let request_id = cookie.filter(|c| !c.is_empty()).or(query.req_id);
    let (request_id, cluster_name) = match (request_id, query.cluster_name) {
        (Some(id), Some(name)) if !name.is_empty() => (id, name),
        (None, _) => return Ok(error_reply(StatusCode::BAD_REQUEST, "missing request id", None)),
        _ => return Ok(error_reply(StatusCode::BAD_REQUEST, "missing clusterName", None)),
    };

    match orchestrator.fetch_credential(&request_id, &cluster_name).await {
        Ok(bytes) => {
            let reply = reply::with_header(bytes, header::CONTENT_TYPE, "application/octet-stream");
            let reply = reply::with_header(reply, header::CONTENT_DISPOSITION, "attachment; filename=kubeconfig.yaml");
            Ok(reply.into_response())
        }
        Err(e) => {
            if e.kind() != ErrorKind::NotFound {
                error!(request_id = %request_id, error = %e, "Failed to read stored kubeconfig");
            }
            Ok(provision_error_reply(&e))
        }
    }
}

async fn handle_metrics(orchestrator: Arc<Orchestrator>) -> Result<Response, Infallible> {
    match orchestrator.metrics().encode() {
        Ok(text) => Ok(reply::with_header(text, header::CONTENT_TYPE, "text/plain; version=0.0.4").into_response()),
        Err(e) => Ok(error_reply(StatusCode::INTERNAL_SERVER_ERROR, e, None)),
    }
}

async fn handle_rejection(rejection: Rejection) -> Result<Response, Infallible> {
    if rejection.is_not_found() {
        return Ok(error_reply(StatusCode::NOT_FOUND, "not found", None));
    }
    if rejection.find::<warp::reject::PayloadTooLarge>().is_some() {
        return Ok(error_reply(StatusCode::PAYLOAD_TOO_LARGE, "upload too large", None));
    }
    if rejection.find::<warp::reject::MethodNotAllowed>().is_some() {
        return Ok(error_reply(StatusCode::METHOD_NOT_ALLOWED, "method not allowed", None));
    }
    if let Some(e) = rejection.find::<warp::cors::CorsForbidden>() {
        return Ok(error_reply(StatusCode::FORBIDDEN, e, None));
    }
    Ok(error_reply(StatusCode::BAD_REQUEST, format!("{:?}", rejection), None))
}
