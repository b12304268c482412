/* Copyright (C) 2025 Pedro Henrique / phkaiser13
* File: src/error.rs
*
* Error types for the provisioner. `ProvisionError` is the failure taxonomy
* every stage returns; `FlowError` is what the orchestrator reports, pairing
* the failure with the stage that was being entered when it happened.
*
* SPDX-License-Identifier: Apache-2.0 */

use crate::orchestrator::Stage;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("invalid request: {0}")]
    Validation(String),

    #[error("`{command}` exited with {status}\nOutput:\n{output}")]
    Invocation {
        command: String,
        status: String,
        output: String,
    },

    #[error("failed to run `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("timed out waiting for {what} after {attempts} attempt(s) ({elapsed:?})")]
    Timeout {
        what: String,
        attempts: u32,
        elapsed: Duration,
    },

    #[error("invalid YAML document: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("credential document has no `clusters` field")]
    MissingClusters,

    #[error("workspace I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no stored credential for request '{request_id}' and cluster '{cluster}'")]
    NotFound { request_id: String, cluster: String },
}

/// Coarse classification used by callers that only need to tell failure
/// families apart (HTTP status mapping, metrics labels).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Invocation,
    Timeout,
    Decode,
    Io,
    NotFound,
}

impl ProvisionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ProvisionError::Validation(_) => ErrorKind::Validation,
            ProvisionError::Invocation { .. } | ProvisionError::Spawn { .. } => ErrorKind::Invocation,
            ProvisionError::Timeout { .. } => ErrorKind::Timeout,
            ProvisionError::Yaml(_) | ProvisionError::MissingClusters => ErrorKind::Decode,
            ProvisionError::Io { .. } => ErrorKind::Io,
            ProvisionError::NotFound { .. } => ErrorKind::NotFound,
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ProvisionError::Io {
            path: path.into(),
            source,
        }
    }
}

/// A provisioning failure tagged with the stage it occurred in.
#[derive(Debug, Error)]
#[error("{stage} stage failed: {source}")]
pub struct FlowError {
    pub stage: Stage,
    #[source]
    pub source: ProvisionError,
}

impl FlowError {
    pub fn at(stage: Stage) -> impl FnOnce(ProvisionError) -> FlowError {
        move |source| FlowError { stage, source }
    }

    pub fn kind(&self) -> ErrorKind {
        self.source.kind()
    }
}

pub type Result<T> = std::result::Result<T, ProvisionError>;
