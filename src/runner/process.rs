use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader, Split};
use tokio::process::{Child, ChildStdout, Command};
use tokio::task::JoinHandle;

use crate::error::{HarnessError, Result};
use crate::models::{OutputLine, ProcessResult};

/// Guard that kills the child process (and its entire process group) on drop.
struct ChildGuard {
    child: Option<Child>,
    /// Process group ID saved at spawn time so we can kill the whole group.
    #[cfg(unix)]
    pgid: Option<u32>,
}

impl ChildGuard {
    fn new(child: Child) -> Self {
        #[cfg(unix)]
        let pgid = child.id();
        Self {
            child: Some(child),
            #[cfg(unix)]
            pgid,
        }
    }

    /// The process exited on its own; leave any daemons it started alone.
    fn disarm(&mut self) {
        #[cfg(unix)]
        {
            self.pgid = None;
        }
    }

    fn kill(&mut self) {
        // Kill the entire process group so forked build workers don't become orphans.
        #[cfg(unix)]
        if let Some(pgid) = self.pgid.take() {
            unsafe { libc::kill(-(pgid as libc::pid_t), libc::SIGKILL) };
        }
        // Fallback / non-Unix: kill just the direct child.
        if let Some(ref mut child) = self.child {
            let _ = child.start_kill();
        }
    }
}

impl Drop for ChildGuard {
    fn drop(&mut self) {
        self.kill();
    }
}

/// Live stdout of a running build tool process.
///
/// Lines come out in order, once each; the stream cannot be rewound. Dropping
/// it kills the process.
pub struct OutputStream {
    lines: Split<BufReader<ChildStdout>>,
    next_index: u64,
    drained: bool,
    guard: ChildGuard,
    stderr: Option<JoinHandle<String>>,
}

impl OutputStream {
    /// Spawn `cmd` with piped output in its own process group.
    pub fn spawn(mut cmd: Command) -> Result<Self> {
        let label = cmd.as_std().get_program().to_string_lossy().to_string();

        // Put the child in its own process group so killing it also
        // takes out any worker processes it forks.
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            cmd.as_std_mut().process_group(0);
        }

        let mut child = cmd
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| HarnessError::Spawn {
                command: label.clone(),
                source,
            })?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        // The guard owns the child from here on, so an early return kills it.
        let guard = ChildGuard::new(child);

        let stdout = stdout.ok_or_else(|| HarnessError::Spawn {
            command: label.clone(),
            source: std::io::Error::other("missing stdout pipe"),
        })?;

        // Drain stderr in the background so the child never blocks on a full pipe.
        let stderr = stderr.map(|mut stderr| {
            tokio::spawn(async move {
                let mut buf = Vec::new();
                if let Err(e) = stderr.read_to_end(&mut buf).await {
                    log::debug!("failed reading stderr: {}", e);
                }
                String::from_utf8_lossy(&buf).into_owned()
            })
        });

        Ok(Self {
            lines: BufReader::new(stdout).split(b'\n'),
            next_index: 0,
            drained: false,
            guard,
            stderr,
        })
    }

    /// Wait for the next line of output. Returns `None` once stdout is closed.
    pub async fn next_line(&mut self) -> Option<OutputLine> {
        if self.drained {
            return None;
        }
        match self.lines.next_segment().await {
            Ok(Some(bytes)) => {
                let mut text = String::from_utf8_lossy(&bytes).into_owned();
                if text.ends_with('\r') {
                    text.pop();
                }
                let index = self.next_index;
                self.next_index += 1;
                Some(OutputLine { index, text })
            }
            Ok(None) => {
                self.drained = true;
                None
            }
            Err(e) => {
                log::warn!("error reading build output: {}", e);
                self.drained = true;
                None
            }
        }
    }

    /// Number of lines handed out so far.
    pub fn lines_read(&self) -> u64 {
        self.next_index
    }

    /// Drain whatever output is left, then wait for the process to exit.
    pub async fn finish(mut self) -> Result<ProcessResult> {
        self.wait().await
    }

    /// Like `finish`, but leaves the stream in place so it can still be
    /// killed if the wait is abandoned. Stderr collected before the wait was
    /// dropped may be lost.
    pub async fn wait(&mut self) -> Result<ProcessResult> {
        while self.next_line().await.is_some() {}

        let status = match self.guard.child.as_mut() {
            Some(child) => child.wait().await?,
            None => return Ok(ProcessResult::interrupted(self.collect_stderr().await)),
        };
        self.guard.disarm();

        Ok(ProcessResult {
            status: status.into(),
            stderr: self.collect_stderr().await,
        })
    }

    /// Kill the process before it finishes. The outcome is indeterminate.
    pub async fn kill(mut self) -> ProcessResult {
        self.guard.kill();
        if let Some(child) = self.guard.child.as_mut() {
            let _ = child.wait().await;
        }
        ProcessResult::interrupted(self.collect_stderr().await)
    }

    async fn collect_stderr(&mut self) -> String {
        match self.stderr.take() {
            Some(handle) => handle.await.unwrap_or_default(),
            None => String::new(),
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::models::ProcessStatus;
    use pretty_assertions::assert_eq;

    fn sh(script: &str) -> Command {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(script);
        cmd
    }

    #[tokio::test]
    async fn lines_are_numbered_in_order() {
        let mut stream = OutputStream::spawn(sh("printf 'a\\nb\\r\\nc'")).unwrap();
        let mut lines = Vec::new();
        while let Some(line) = stream.next_line().await {
            lines.push(line);
        }
        assert_eq!(
            lines,
            vec![
                OutputLine {
                    index: 0,
                    text: "a".into()
                },
                OutputLine {
                    index: 1,
                    text: "b".into()
                },
                OutputLine {
                    index: 2,
                    text: "c".into()
                },
            ]
        );
        assert_eq!(stream.next_line().await, None);
        let result = stream.finish().await.unwrap();
        assert_eq!(result.status, ProcessStatus::Exited(0));
    }

    #[tokio::test]
    async fn finish_drains_and_reports_exit_code() {
        let stream = OutputStream::spawn(sh("echo out; echo err >&2; exit 3")).unwrap();
        let result = stream.finish().await.unwrap();
        assert_eq!(result.status, ProcessStatus::Exited(3));
        assert_eq!(result.stderr.trim(), "err");
    }

    #[tokio::test]
    async fn signal_is_reported() {
        let stream = OutputStream::spawn(sh("kill -9 $$")).unwrap();
        let result = stream.finish().await.unwrap();
        assert_eq!(result.status, ProcessStatus::Signaled(9));
    }

    #[tokio::test]
    async fn kill_reports_still_running() {
        let mut stream = OutputStream::spawn(sh("echo started; sleep 30")).unwrap();
        let first = stream.next_line().await.unwrap();
        assert_eq!(first.text, "started");
        let result = stream.kill().await;
        assert_eq!(result.status, ProcessStatus::StillRunning);
    }

    #[tokio::test]
    async fn abandoned_wait_can_still_be_killed() {
        let mut stream = OutputStream::spawn(sh("exec >&-; sleep 30")).unwrap();
        let waited = tokio::time::timeout(std::time::Duration::from_millis(200), stream.wait()).await;
        assert!(waited.is_err());
        assert_eq!(stream.lines_read(), 0);
        let result = stream.kill().await;
        assert_eq!(result.status, ProcessStatus::StillRunning);
    }

    #[tokio::test]
    async fn missing_executable_fails_fast() {
        let err = OutputStream::spawn(Command::new("/definitely/not/here"))
            .err()
            .unwrap();
        assert!(matches!(err, HarnessError::Spawn { .. }));
    }
}
