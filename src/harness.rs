use std::future::Future;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use crate::config::Config;
use crate::error::Result;
use crate::models::{Issue, OutputLine, ProcessResult, RunSummary};
use crate::report::{ReportSet, is_test_action, parse_reports, report_dir};
use crate::reporter::{IssueSink, Reporter, Verdict};
use crate::resolve::SourceResolver;
use crate::runner::{BuildTool, LaunchRequest, RunnerEnvironment};
use crate::scanner::LineScanner;

/// Variable pointing the child at its own scratch directory.
const TEMP_VARIABLE: &str = "TMPDIR";

/// One request to run build actions against a module.
#[derive(Debug, Clone)]
pub struct Invocation {
    /// Root of the Gradle project.
    pub project_dir: PathBuf,
    /// Module under test, passed explicitly rather than inferred.
    pub module: String,
    pub actions: Vec<String>,
    /// Extra arguments for this run only.
    pub arguments: Vec<String>,
    /// Forwarded as `--tests`. Kept for compatibility; nothing relies on it
    /// actually narrowing which cases run.
    pub test_filter: Option<String>,
}

impl Invocation {
    pub fn new(project_dir: impl Into<PathBuf>, module: impl Into<String>, actions: Vec<String>) -> Self {
        Self {
            project_dir: project_dir.into(),
            module: module.into(),
            actions,
            arguments: Vec::new(),
            test_filter: None,
        }
    }

    /// Name errors are attributed to.
    pub fn action_label(&self) -> String {
        self.actions.join(" ")
    }

    pub fn test_actions(&self) -> impl Iterator<Item = &str> {
        self.actions
            .iter()
            .map(String::as_str)
            .filter(|a| is_test_action(a))
    }
}

/// Everything a finished run produced.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub action: String,
    pub process: ProcessResult,
    /// Diagnostics recognized in the live output.
    pub diagnostics: Vec<Issue>,
    pub reports: ReportSet,
    pub summary: RunSummary,
    pub tests_requested: bool,
    pub lines_read: u64,
}

impl RunOutcome {
    pub fn compiler_errors(&self) -> usize {
        self.diagnostics.iter().filter(|i| i.is_failure()).count()
    }

    /// Final pass/fail decision for the run.
    pub fn verdict(&self) -> Result<()> {
        Verdict {
            action: &self.action,
            status: self.process.status,
            summary: &self.summary,
            tests_requested: self.tests_requested,
            compiler_errors: self.compiler_errors(),
        }
        .decide()
    }
}

enum Step {
    Line(Option<OutputLine>),
    Exited(Result<ProcessResult>),
    Cancelled,
}

/// Runs build actions and reports on them.
pub struct Harness {
    tool: Arc<dyn BuildTool>,
    config: Config,
}

impl Harness {
    pub fn new(tool: Arc<dyn BuildTool>, config: Config) -> Self {
        Self { tool, config }
    }

    pub fn launch_request(&self, invocation: &Invocation) -> LaunchRequest {
        let gradle = &self.config.gradle;
        let mut arguments = invocation.actions.clone();
        arguments.extend(gradle.arguments.iter().cloned());
        arguments.extend(invocation.arguments.iter().cloned());
        if let Some(filter) = invocation.test_filter.as_deref() {
            arguments.push("--tests".into());
            arguments.push(filter.to_string());
        }

        LaunchRequest {
            directory: invocation.project_dir.clone(),
            command: gradle.command.clone(),
            arguments,
            environment: RunnerEnvironment::from_config(&self.config),
            memory_ceiling: gradle.memory.clone(),
        }
    }

    pub async fn run(
        &self,
        invocation: &Invocation,
        sink: &mut dyn IssueSink,
        out: &mut (dyn Write + Send),
    ) -> Result<RunOutcome> {
        self.run_until(invocation, sink, out, std::future::pending())
            .await
    }

    /// Run until the build finishes or `cancel` completes. A cancelled run
    /// kills the build and reports an interrupted status; nothing is salvaged.
    pub async fn run_until<F>(
        &self,
        invocation: &Invocation,
        sink: &mut dyn IssueSink,
        out: &mut (dyn Write + Send),
        cancel: F,
    ) -> Result<RunOutcome>
    where
        F: Future<Output = ()>,
    {
        let action = invocation.action_label();
        let tests_requested = invocation.test_actions().next().is_some();

        // Each run gets its own scratch space so concurrent runs never share it.
        let scratch = tempfile::Builder::new().prefix("glens-").tempdir()?;
        let mut request = self.launch_request(invocation);
        request.environment.overrides.insert(
            TEMP_VARIABLE.into(),
            scratch.path().to_string_lossy().to_string(),
        );

        log::info!("running {} with {}", action, self.tool.name());
        let mut stream = self.tool.launch(&request).await?;
        let mut scanner = LineScanner::new();
        let mut diagnostics = Vec::new();
        let mut stdout_open = true;

        // Cancellation stays live until the process has exited, even after
        // it closes stdout.
        tokio::pin!(cancel);
        let (process, lines_read) = loop {
            let step = if stdout_open {
                tokio::select! {
                    line = stream.next_line() => Step::Line(line),
                    _ = &mut cancel => Step::Cancelled,
                }
            } else {
                tokio::select! {
                    result = stream.wait() => Step::Exited(result),
                    _ = &mut cancel => Step::Cancelled,
                }
            };
            match step {
                Step::Line(Some(line)) => {
                    log::trace!("[stdout] {}", line.text);
                    if self.config.gradle.verbose {
                        writeln!(out, "{}", line.text)?;
                    }
                    if let Some(mut issue) = scanner.feed(&line) {
                        if let Some(location) = issue.location.as_mut() {
                            location.resolve_symlink();
                        }
                        sink.report(&issue);
                        diagnostics.push(issue);
                    }
                }
                Step::Line(None) => stdout_open = false,
                Step::Exited(result) => break (result?, stream.lines_read()),
                Step::Cancelled => {
                    log::warn!("{} cancelled; stopping the build", action);
                    let lines_read = stream.lines_read();
                    break (stream.kill().await, lines_read);
                }
            }
        };
        drop(scratch);

        let mut outcome = RunOutcome {
            action,
            process,
            diagnostics,
            reports: ReportSet::default(),
            summary: RunSummary::default(),
            tests_requested,
            lines_read,
        };
        if !outcome.process.status.is_terminal() {
            return Ok(outcome);
        }
        log::debug!("{} finished with {}", outcome.action, outcome.process.status.describe());

        let module_dir = invocation.project_dir.join(&invocation.module);
        for test_action in invocation.test_actions() {
            let dir = report_dir(&module_dir, &self.config.reports.root, test_action);
            match parse_reports(&dir) {
                Ok(set) => outcome.reports.extend(set),
                Err(e) => log::error!("unable to read reports in {}: {:#}", dir.display(), e),
            }
        }

        let mut resolver = SourceResolver::new(&invocation.project_dir, &self.config.resolve);
        let mut reporter = Reporter::new(sink, out, &mut resolver, &invocation.module)
            .show_output(self.config.reports.show_output);
        if tests_requested {
            outcome.summary = reporter.report_suites(&outcome.reports.suites)?;
            if outcome.summary.suites == 0 {
                reporter.report_missing_tests(&outcome.action);
            }
        }
        if !outcome.process.status.is_success() && outcome.summary.failed == 0 {
            log::error!("{} failed ({})", outcome.action, outcome.process.status.describe());
            reporter.report_build_failure(&outcome.action, &outcome.process);
        }
        Ok(outcome)
    }
}
