/* Copyright (C) 2025 Pedro Henrique / phkaiser13
 * File: src/provisioners/common.rs
 *
 * Subprocess helpers shared by the provisioners and the kubectl query
 * backend: environment scrubbing for commands that must target an explicit
 * kubeconfig, and execution with stdout/stderr captured into one combined,
 * arrival-ordered transcript.
 *
 * SPDX-License-Identifier: Apache-2.0
 */

use crate::error::{ProvisionError, Result};
use futures::stream::{self, Stream, StreamExt};
use std::ffi::OsString;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tracing::debug;

/// Variables a surrounding Kubernetes pod injects for in-cluster discovery.
/// Left in place they make client tooling talk to the pod's own cluster.
const SERVICE_DISCOVERY_PREFIXES: [&str; 2] = ["KUBERNETES_SERVICE_", "KUBERNETES_PORT"];

pub const KUBECONFIG_ENV: &str = "KUBECONFIG";

fn is_service_discovery_var(key: &str) -> bool {
    SERVICE_DISCOVERY_PREFIXES
        .iter()
        .any(|prefix| key.starts_with(prefix))
}

/// Copies `vars` minus in-cluster discovery variables and any existing
/// `KUBECONFIG`, so the caller can inject its own.
pub fn scrubbed_env<I>(vars: I) -> Vec<(OsString, OsString)>
where
    I: IntoIterator<Item = (OsString, OsString)>,
{
    vars.into_iter()
        .filter(|(key, _)| {
            let key = key.to_string_lossy();
            !is_service_discovery_var(&key) && key != KUBECONFIG_ENV
        })
        .collect()
}

/// Captured result of a finished command.
#[derive(Debug)]
pub struct CommandOutput {
    pub success: bool,
    pub status: String,
    /// stdout and stderr lines, interleaved in the order they arrived.
    pub combined: String,
}

/// Renders a command as `program arg arg ...` for logs and errors.
pub fn describe(command: &Command) -> String {
    let std = command.as_std();
    std::iter::once(std.get_program())
        .chain(std.get_args())
        .map(|part| part.to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Turns a child pipe into a stream of lines. Tool output is not guaranteed
/// to be UTF-8, so lines are split on raw bytes and decoded lossily.
fn lines<R>(reader: R) -> impl Stream<Item = std::io::Result<String>>
where
    R: AsyncRead + Unpin,
{
    stream::unfold(BufReader::new(reader), |mut reader| async move {
        let mut buf = Vec::new();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => None,
            Ok(_) => {
                if buf.last() == Some(&b'\n') {
                    buf.pop();
                }
                if buf.last() == Some(&b'\r') {
                    buf.pop();
                }
                Some((Ok(String::from_utf8_lossy(&buf).into_owned()), reader))
            }
            Err(e) => Some((Err(e), reader)),
        }
    })
}

/// Runs `command` to completion, collecting stdout and stderr as one transcript.
pub async fn execute_command(command: &mut Command) -> Result<CommandOutput> {
    let rendered = describe(command);
    command.stdin(Stdio::null());
    command.stdout(Stdio::piped());
    command.stderr(Stdio::piped());
    // An early return below drops the child; make sure it does not outlive us.
    command.kill_on_drop(true);

    debug!(command = %rendered, "Spawning command");
    let spawn_err = |source| ProvisionError::Spawn {
        command: rendered.clone(),
        source,
    };
    let mut child = command.spawn().map_err(spawn_err)?;

    let missing_pipe = |name: &str| {
        spawn_err(std::io::Error::other(format!(
            "child process did not have a handle to {}",
            name
        )))
    };
    let stdout = child.stdout.take().ok_or_else(|| missing_pipe("stdout"))?;
    let stderr = child.stderr.take().ok_or_else(|| missing_pipe("stderr"))?;

    // Both pipes are drained together so neither can fill up and stall the child.
    let mut merged = std::pin::pin!(stream::select(lines(stdout), lines(stderr)));
    let mut combined = String::new();
    while let Some(line) = merged.next().await {
        match line {
            Ok(line) => push_line(&mut combined, &line),
            Err(e) => {
                // Reap the child before reporting.
                let _ = child.kill().await;
                return Err(spawn_err(e));
            }
        }
    }

    let status = child.wait().await.map_err(spawn_err)?;
    debug!(command = %rendered, %status, "Command finished");

    Ok(CommandOutput {
        success: status.success(),
        status: status.to_string(),
        combined,
    })
}

fn push_line(buffer: &mut String, line: &str) {
    buffer.push_str(line);
    buffer.push('\n');
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> Vec<(OsString, OsString)> {
        pairs
            .iter()
            .map(|(k, v)| (OsString::from(k), OsString::from(v)))
            .collect()
    }

    #[test]
    fn test_scrubbed_env_drops_service_discovery() {
        let env = scrubbed_env(vars(&[
            ("PATH", "/usr/bin"),
            ("KUBERNETES_SERVICE_HOST", "10.96.0.1"),
            ("KUBERNETES_SERVICE_PORT", "443"),
            ("KUBERNETES_SERVICE_PORT_HTTPS", "443"),
            ("KUBERNETES_PORT", "tcp://10.96.0.1:443"),
            ("KUBERNETES_PORT_443_TCP_ADDR", "10.96.0.1"),
            ("KUBECONFIG", "/root/.kube/config"),
            ("HOME", "/root"),
        ]));
        let keys: Vec<_> = env.iter().map(|(k, _)| k.to_string_lossy().into_owned()).collect();
        assert_eq!(keys, ["PATH", "HOME"]);
    }

    #[test]
    fn test_describe_renders_args() {
        let mut cmd = Command::new("vcluster");
        cmd.args(["create", "demo", "--connect=false"]);
        assert_eq!(describe(&cmd), "vcluster create demo --connect=false");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_execute_command_captures_both_streams() {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", "echo out; echo err 1>&2; exit 3"]);
        let output = execute_command(&mut cmd).await.unwrap();

        assert!(!output.success);
        assert!(output.combined.contains("out\n"));
        assert!(output.combined.contains("err\n"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_execute_command_tolerates_non_utf8_output() {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", "printf 'creating \\377 cluster\\n'; printf 'warn \\377\\n' 1>&2; exit 0"]);
        let output = execute_command(&mut cmd).await.unwrap();

        assert!(output.success);
        assert!(output.combined.contains("creating \u{FFFD} cluster\n"));
        assert!(output.combined.contains("warn \u{FFFD}\n"));
    }

    #[tokio::test]
    async fn test_missing_binary_is_a_spawn_error() {
        let mut cmd = Command::new("definitely-not-a-real-binary-5f1c");
        let err = execute_command(&mut cmd).await.unwrap_err();
        assert!(matches!(err, ProvisionError::Spawn { .. }));
    }
}
