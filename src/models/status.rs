use serde::{Deserialize, Serialize};

/// How the build tool process ended, as far as we know.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProcessStatus {
    Exited(i32),
    Signaled(i32),
    /// The run was interrupted before the process reported an exit status.
    #[default]
    StillRunning,
}

impl ProcessStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, ProcessStatus::Exited(0))
    }

    /// Whether the process finished on its own, successfully or not.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ProcessStatus::StillRunning)
    }

    pub fn code(&self) -> Option<i32> {
        match self {
            ProcessStatus::Exited(code) => Some(*code),
            _ => None,
        }
    }

    pub fn describe(&self) -> String {
        match self {
            ProcessStatus::Exited(code) => format!("exit code {}", code),
            ProcessStatus::Signaled(signal) => format!("signal {}", signal),
            ProcessStatus::StillRunning => "interrupted".into(),
        }
    }
}

impl From<std::process::ExitStatus> for ProcessStatus {
    fn from(status: std::process::ExitStatus) -> Self {
        if let Some(code) = status.code() {
            return ProcessStatus::Exited(code);
        }
        #[cfg(unix)]
        {
            use std::os::unix::process::ExitStatusExt;
            if let Some(signal) = status.signal() {
                return ProcessStatus::Signaled(signal);
            }
        }
        ProcessStatus::StillRunning
    }
}

/// Final result of one build tool process.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProcessResult {
    pub status: ProcessStatus,
    /// Everything the process wrote to stderr.
    pub stderr: String,
}

impl ProcessResult {
    pub fn interrupted(stderr: String) -> Self {
        Self {
            status: ProcessStatus::StillRunning,
            stderr,
        }
    }

    /// The last `count` non-empty lines of stderr, for error summaries.
    pub fn stderr_tail(&self, count: usize) -> String {
        let lines: Vec<&str> = self
            .stderr
            .lines()
            .filter(|l| !l.trim().is_empty())
            .collect();
        let start = lines.len().saturating_sub(count);
        lines[start..].join("\n")
    }
}

/// One line of the build tool's stdout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputLine {
    pub index: u64,
    pub text: String,
}
