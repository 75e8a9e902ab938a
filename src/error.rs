use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Failures surfaced to whoever invoked the harness.
#[derive(Error, Debug)]
pub enum HarnessError {
    #[error("working directory does not exist: {0}")]
    MissingDirectory(PathBuf),

    #[error("failed to launch `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("{action} failed ({status})")]
    BuildFailed { action: String, status: String },

    #[error("{action} failed: {count} test(s) failed: {}", names.join(", "))]
    TestsFailed {
        action: String,
        count: usize,
        names: Vec<String>,
    },

    #[error("{action}: no tests were run")]
    NoTestsRun { action: String },

    #[error("{action}: {count} compiler error(s)")]
    Diagnostics { action: String, count: usize },

    #[error("{action} was interrupted before it finished")]
    Interrupted { action: String },
}

impl HarnessError {
    /// Name of the build action the failure is attributed to, if any.
    pub fn action(&self) -> Option<&str> {
        match self {
            HarnessError::BuildFailed { action, .. }
            | HarnessError::TestsFailed { action, .. }
            | HarnessError::NoTestsRun { action }
            | HarnessError::Diagnostics { action, .. }
            | HarnessError::Interrupted { action } => Some(action),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, HarnessError>;
