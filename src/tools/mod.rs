//! External tool adapter.
//!
//! Uniform invocation contract for the wrapped binaries (`subfinder`, `gau`,
//! `katana`, `httpx`, `nmap`): piped stdio, a per-invocation timeout, and
//! cooperative cancellation that kills the child process. A binary that is
//! not on PATH surfaces as `ToolError::Missing` so callers can degrade
//! instead of failing the scan.

pub mod gau;
pub mod httpx;
pub mod katana;
pub mod nmap;
pub mod subfinder;

use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use crate::error::ToolError;

/// Captured output of a finished tool run.
#[derive(Debug)]
pub struct ToolOutput {
    pub stdout: String,
    pub stderr: String,
}

/// How much trailing stderr is kept when a tool fails.
const STDERR_TAIL_BYTES: usize = 400;

/// Runs a prepared command to completion.
///
/// The child is killed when the timeout elapses or the scan's cancellation
/// token fires; `kill_on_drop` covers both paths. A non-zero exit becomes
/// `ToolError::Failed` carrying a stderr tail.
pub async fn run_command(
    tool: &'static str,
    mut cmd: Command,
    timeout: Duration,
    cancel: &CancellationToken,
) -> Result<ToolOutput, ToolError> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let child = match cmd.spawn() {
        Ok(child) => child,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ToolError::Missing { tool });
        }
        Err(e) => return Err(ToolError::Io { tool, source: e }),
    };

    let output = tokio::select! {
        result = child.wait_with_output() => {
            result.map_err(|e| ToolError::Io { tool, source: e })?
        }
        _ = tokio::time::sleep(timeout) => {
            return Err(ToolError::TimedOut { tool, seconds: timeout.as_secs() });
        }
        _ = cancel.cancelled() => {
            return Err(ToolError::Cancelled { tool });
        }
    };

    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

    if !output.status.success() {
        return Err(ToolError::Failed {
            tool,
            stderr: stderr_tail(&stderr),
        });
    }

    Ok(ToolOutput { stdout, stderr })
}

fn stderr_tail(stderr: &str) -> String {
    let trimmed = stderr.trim();
    if trimmed.len() <= STDERR_TAIL_BYTES {
        return trimmed.to_string();
    }
    let mut start = trimmed.len() - STDERR_TAIL_BYTES;
    while !trimmed.is_char_boundary(start) {
        start += 1;
    }
    trimmed[start..].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_binary_maps_to_tool_missing() {
        let cancel = CancellationToken::new();
        let cmd = Command::new("definitely-not-a-real-binary-xyz");
        let err = run_command("subfinder", cmd, Duration::from_secs(5), &cancel)
            .await
            .unwrap_err();
        assert!(err.is_missing());
    }

    #[tokio::test]
    async fn successful_run_captures_stdout() {
        let cancel = CancellationToken::new();
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg("echo hello; echo noise >&2");
        let out = run_command("gau", cmd, Duration::from_secs(5), &cancel)
            .await
            .unwrap();
        assert_eq!(out.stdout.trim(), "hello");
        assert_eq!(out.stderr.trim(), "noise");
    }

    #[tokio::test]
    async fn nonzero_exit_carries_stderr_tail() {
        let cancel = CancellationToken::new();
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg("echo broken >&2; exit 3");
        let err = run_command("katana", cmd, Duration::from_secs(5), &cancel)
            .await
            .unwrap_err();
        match err {
            ToolError::Failed { tool, stderr } => {
                assert_eq!(tool, "katana");
                assert_eq!(stderr, "broken");
            }
            other => panic!("expected Failed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn timeout_kills_the_child() {
        let cancel = CancellationToken::new();
        let mut cmd = Command::new("sleep");
        cmd.arg("30");
        let started = std::time::Instant::now();
        let err = run_command("nmap", cmd, Duration::from_millis(100), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::TimedOut { .. }));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn cancellation_interrupts_a_running_tool() {
        let cancel = CancellationToken::new();
        let mut cmd = Command::new("sleep");
        cmd.arg("30");
        let token = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            token.cancel();
        });
        let err = run_command("httpx", cmd, Duration::from_secs(30), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Cancelled { .. }));
    }

    #[test]
    fn stderr_tail_truncates_long_output() {
        let long = "x".repeat(1000);
        let tail = stderr_tail(&long);
        assert_eq!(tail.len(), STDERR_TAIL_BYTES);
    }
}
