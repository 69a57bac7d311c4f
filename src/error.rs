//! Error taxonomy for external tools and the scan pipeline.

use thiserror::Error;

/// Failure modes of a wrapped external tool invocation.
///
/// `Missing` is a sentinel the caller handles by degrading (empty result or
/// a native fallback); it never fails a scan.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("{tool} not installed")]
    Missing { tool: &'static str },

    #[error("{tool} failed: {stderr}")]
    Failed { tool: &'static str, stderr: String },

    #[error("{tool} timed out after {seconds}s")]
    TimedOut { tool: &'static str, seconds: u64 },

    #[error("{tool} cancelled")]
    Cancelled { tool: &'static str },

    #[error("spawning {tool}: {source}")]
    Io {
        tool: &'static str,
        source: std::io::Error,
    },
}

impl ToolError {
    pub fn is_missing(&self) -> bool {
        matches!(self, ToolError::Missing { .. })
    }
}

/// Terminal outcome of a pipeline stage.
///
/// Kept separate from `anyhow` so cancellation can be told apart from real
/// failures: once a scan is cancelled no FAILED status may be posted.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("scan cancelled")]
    Cancelled,

    #[error(transparent)]
    Failed(#[from] anyhow::Error),
}

impl PipelineError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, PipelineError::Cancelled)
    }
}
