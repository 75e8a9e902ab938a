pub mod sink;

use std::io::{self, Write};

use crate::error::HarnessError;
use crate::models::{
    Issue, ProcessResult, ProcessStatus, RunSummary, SuiteSummary, TestCase, TestFailure, TestSuite,
};
use crate::resolve::{Resolution, SourceResolver};

pub use sink::{CollectingSink, ConsoleSink, IssueSink};

/// How many stderr lines accompany a build failure.
const STDERR_TAIL_LINES: usize = 20;

/// Turns parsed suites into summary lines and IDE issues.
pub struct Reporter<'a> {
    sink: &'a mut dyn IssueSink,
    out: &'a mut (dyn Write + Send),
    resolver: &'a mut SourceResolver,
    module: &'a str,
    show_output: bool,
}

impl<'a> Reporter<'a> {
    pub fn new(
        sink: &'a mut dyn IssueSink,
        out: &'a mut (dyn Write + Send),
        resolver: &'a mut SourceResolver,
        module: &'a str,
    ) -> Self {
        Self {
            sink,
            out,
            resolver,
            module,
            show_output: false,
        }
    }

    /// Echo captured stdout/stderr of failing suites.
    pub fn show_output(mut self, show: bool) -> Self {
        self.show_output = show;
        self
    }

    /// Print one line per suite plus a grand total, and raise an issue for
    /// every failure.
    pub fn report_suites(&mut self, suites: &[TestSuite]) -> io::Result<RunSummary> {
        let mut run = RunSummary::default();
        for suite in suites {
            let summary = self.report_suite(suite)?;
            run.add(&summary);
        }
        writeln!(
            self.out,
            "All Suites ({}): PASSED {} FAILED {} SKIPPED {} ({:.3}s)",
            run.suites, run.passed, run.failed, run.skipped, run.elapsed_seconds
        )?;
        Ok(run)
    }

    fn report_suite(&mut self, suite: &TestSuite) -> io::Result<SuiteSummary> {
        let summary = suite.summary();
        writeln!(
            self.out,
            "Test Suite '{}': PASSED {} FAILED {} SKIPPED {} ({:.3}s)",
            summary.name,
            summary.passed,
            summary.failed,
            summary.skipped,
            summary.elapsed_seconds
        )?;

        for case in &suite.test_cases {
            for failure in &case.failures {
                self.report_failure(suite, case, failure);
            }
        }

        if self.show_output && summary.failed > 0 {
            if let Some(stdout) = suite.system_out.as_deref() {
                writeln!(self.out, "--- stdout of '{}' ---\n{}", suite.name, stdout.trim_end())?;
            }
            if let Some(stderr) = suite.system_err.as_deref() {
                writeln!(self.out, "--- stderr of '{}' ---\n{}", suite.name, stderr.trim_end())?;
            }
        }
        Ok(summary)
    }

    /// Report a failure from both viewpoints. Both issues are emitted rather
    /// than merged; an unresolvable failure still gets an anchorless issue.
    fn report_failure(&mut self, suite: &TestSuite, case: &TestCase, failure: &TestFailure) {
        let message = format!(
            "{}.{}: {}",
            suite.name,
            case.display_name(),
            failure_summary(failure)
        );
        let resolution = self.resolve(case, failure);

        let mut anchored = false;
        for location in [resolution.generated, resolution.original]
            .into_iter()
            .flatten()
        {
            let mut location = location;
            location.resolve_symlink();
            self.sink.report(&Issue::error(message.clone()).at(location));
            anchored = true;
        }
        if !anchored {
            log::debug!("no source location for {}", message);
            self.sink.report(&Issue::error(message));
        }
    }

    /// Resolve against the module named in the test, then the invocation's module.
    /// A `$suffix` is not always a module name, so a miss there is not final.
    fn resolve(&mut self, case: &TestCase, failure: &TestFailure) -> Resolution {
        if let Some(module) = case.module_name().filter(|m| *m != self.module) {
            let resolution = self.resolver.resolve_failure(failure, module);
            if resolution.is_resolved() {
                return resolution;
            }
            log::debug!("{} did not resolve in module {}, trying {}", case.name, module, self.module);
        }
        self.resolver.resolve_failure(failure, self.module)
    }

    /// Raise the issue for a test action that left no reports behind.
    pub fn report_missing_tests(&mut self, action: &str) {
        self.sink
            .report(&Issue::error(format!("{}: no tests were run", action)));
    }

    /// Raise the issue for a build that failed without any attributable test failure.
    pub fn report_build_failure(&mut self, action: &str, process: &ProcessResult) {
        self.sink.report(&Issue::error(format!(
            "{} failed ({})",
            action,
            process.status.describe()
        )));
        let tail = process.stderr_tail(STDERR_TAIL_LINES);
        if !tail.is_empty() {
            self.sink.report(&Issue::note(tail));
        }
    }
}

/// First line of the failure message, or its exception type.
fn failure_summary(failure: &TestFailure) -> String {
    let line = failure.message.lines().next().unwrap_or_default().trim();
    if !line.is_empty() {
        return line.to_string();
    }
    failure
        .kind
        .clone()
        .unwrap_or_else(|| "test failed".to_string())
}

/// Everything the final pass/fail decision depends on.
#[derive(Debug, Clone)]
pub struct Verdict<'a> {
    pub action: &'a str,
    pub status: ProcessStatus,
    pub summary: &'a RunSummary,
    /// At least one requested action runs tests.
    pub tests_requested: bool,
    pub compiler_errors: usize,
}

impl Verdict<'_> {
    pub fn decide(&self) -> Result<(), HarnessError> {
        let action = self.action.to_string();
        if !self.status.is_terminal() {
            return Err(HarnessError::Interrupted { action });
        }
        let tests_failed = || HarnessError::TestsFailed {
            action: self.action.to_string(),
            count: self.summary.failed,
            names: self.summary.failed_tests.clone(),
        };

        if !self.status.is_success() {
            if self.summary.failed > 0 {
                return Err(tests_failed());
            }
            return Err(HarnessError::BuildFailed {
                action,
                status: self.status.describe(),
            });
        }
        if self.tests_requested && self.summary.suites == 0 {
            return Err(HarnessError::NoTestsRun { action });
        }
        if self.summary.failed > 0 {
            return Err(tests_failed());
        }
        if self.compiler_errors > 0 {
            return Err(HarnessError::Diagnostics {
                action,
                count: self.compiler_errors,
            });
        }
        Ok(())
    }
}
