//! Execution pipeline errors.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Failure of a dispatcher run.
///
/// Every variant maps onto a stage label via [`ExecError::stage`]; the
/// `Display` form is `"<stage>: <cause>"` so it can be shown to users as-is.
#[derive(Debug, Error)]
pub enum ExecError {
    #[error("unsupported language: {0:?}")]
    UnsupportedLanguage(String),

    #[error("write error: {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("compile/execute error: failed to launch {program}: {source}")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("compile/execute error: compilation failed\n{output}")]
    Compile { output: String },

    #[error("timeout: execution exceeded {}s and was terminated", .after.as_secs_f32())]
    TimedOut { after: Duration },

    #[error("compile/execute error: {0}")]
    Io(#[from] std::io::Error),
}

impl ExecError {
    /// Human-readable stage label for the failure.
    pub fn stage(&self) -> &'static str {
        match self {
            Self::UnsupportedLanguage(_) => "unsupported language",
            Self::Write { .. } => "write error",
            Self::Launch { .. } | Self::Compile { .. } | Self::Io(_) => "compile/execute error",
            Self::TimedOut { .. } => "timeout",
        }
    }

    /// Whether the request was refused before anything touched the filesystem.
    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::UnsupportedLanguage(_))
    }
}
