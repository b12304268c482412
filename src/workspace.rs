/* Copyright (C) 2025 Pedro Henrique / phkaiser13
* File: src/workspace.rs
*
* Per-request working directories under a shared root. Each request gets
* `<root>/<request-id>/`, created exclusively so that two requests admitted in
* the same nanosecond still end up in distinct directories. The finished
* credential is stored at `<workspace>/.vcluster/<cluster>/kubeconfig.yaml`.
*
* SPDX-License-Identifier: Apache-2.0 */

use crate::error::{ProvisionError, Result};
use chrono::Utc;
use std::io::ErrorKind as IoErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};

pub const CREDENTIAL_DIR: &str = ".vcluster";
pub const CREDENTIAL_FILE: &str = "kubeconfig.yaml";

const MAX_CREATE_ATTEMPTS: u32 = 1024;

/// An isolated directory owned by exactly one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workspace {
    id: String,
    dir: PathBuf,
}

impl Workspace {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Where the finished credential for `cluster_name` is stored.
    pub fn credential_path(&self, cluster_name: &str) -> PathBuf {
        credential_path(&self.dir, cluster_name)
    }
}

pub fn credential_path(workspace_dir: &Path, cluster_name: &str) -> PathBuf {
    workspace_dir
        .join(CREDENTIAL_DIR)
        .join(cluster_name)
        .join(CREDENTIAL_FILE)
}

/// True for a single, non-hidden path component.
pub fn is_safe_component(value: &str) -> bool {
    !value.is_empty()
        && !value.starts_with('.')
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

#[derive(Debug, Clone)]
pub struct Workspaces {
    root: PathBuf,
}

impl Workspaces {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Workspaces { root: root.into() }
    }

    /// Allocates a fresh workspace. The id starts at the current Unix time in
    /// nanoseconds and is bumped until an unused directory is created.
    pub async fn create(&self) -> Result<Workspace> {
        fs::create_dir_all(&self.root)
            .await
            .map_err(|e| ProvisionError::io(&self.root, e))?;

        let mut candidate = Utc::now()
            .timestamp_nanos_opt()
            .map(|n| n.unsigned_abs())
            .unwrap_or_default();

        for _ in 0..MAX_CREATE_ATTEMPTS {
            let id = candidate.to_string();
            let dir = self.root.join(&id);
            match fs::create_dir(&dir).await {
                Ok(()) => {
                    debug!(request_id = %id, dir = %dir.display(), "Workspace created");
                    return Ok(Workspace { id, dir });
                }
                Err(e) if e.kind() == IoErrorKind::AlreadyExists => candidate += 1,
                Err(e) => return Err(ProvisionError::io(dir, e)),
            }
        }

        Err(ProvisionError::io(
            &self.root,
            std::io::Error::new(IoErrorKind::AlreadyExists, "no free request id"),
        ))
    }

    /// Reads the credential stored by a completed request.
    pub async fn read_credential(&self, request_id: &str, cluster_name: &str) -> Result<Vec<u8>> {
        let not_found = || ProvisionError::NotFound {
            request_id: request_id.to_string(),
            cluster: cluster_name.to_string(),
        };
        if !is_safe_component(request_id) || !is_safe_component(cluster_name) {
            return Err(not_found());
        }

        let path = credential_path(&self.root.join(request_id), cluster_name);
        match fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == IoErrorKind::NotFound => Err(not_found()),
            Err(e) => Err(ProvisionError::io(path, e)),
        }
    }
}

/// Writes `bytes` to `path`, creating parent directories.
pub async fn store(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .await
            .map_err(|e| ProvisionError::io(parent, e))?;
    }
    fs::write(path, bytes)
        .await
        .map_err(|e| ProvisionError::io(path, e))
}

/// Removes a workspace that never got an admitted request. Failures are
/// logged, not returned; the caller is already reporting another error.
pub async fn discard(workspace: &Workspace) {
    match fs::remove_dir_all(workspace.dir()).await {
        Ok(()) => debug!(request_id = %workspace.id(), "Workspace discarded"),
        Err(e) => warn!(request_id = %workspace.id(), error = %e, "Failed to discard workspace"),
    }
}
