use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TestSuite {
    pub name: String,
    pub time_seconds: Option<f64>,
    pub test_cases: Vec<TestCase>,
    pub system_out: Option<String>,
    pub system_err: Option<String>,
}

impl TestSuite {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Reported suite time, falling back to the sum of its cases.
    pub fn elapsed_seconds(&self) -> f64 {
        self.time_seconds
            .unwrap_or_else(|| self.test_cases.iter().map(|c| c.time_seconds).sum())
    }

    pub fn summary(&self) -> SuiteSummary {
        let mut summary = SuiteSummary {
            name: self.name.clone(),
            elapsed_seconds: self.elapsed_seconds(),
            ..Default::default()
        };
        for case in &self.test_cases {
            match case.outcome() {
                CaseOutcome::Passed => summary.passed += 1,
                CaseOutcome::Skipped => summary.skipped += 1,
                CaseOutcome::Failed => {
                    summary.failed += 1;
                    summary
                        .failed_tests
                        .push(format!("{}.{}", self.name, case.display_name()));
                }
            }
        }
        summary
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TestCase {
    pub name: String,
    pub class_name: Option<String>,
    pub time_seconds: f64,
    pub skipped: bool,
    pub failures: Vec<TestFailure>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CaseOutcome {
    Passed,
    Skipped,
    Failed,
}

impl TestCase {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Exactly one outcome holds; any failure wins over the skipped flag.
    pub fn outcome(&self) -> CaseOutcome {
        if !self.failures.is_empty() {
            CaseOutcome::Failed
        } else if self.skipped {
            CaseOutcome::Skipped
        } else {
            CaseOutcome::Passed
        }
    }

    pub fn display_name(&self) -> &str {
        demangle_test_name(&self.name).0
    }

    pub fn module_name(&self) -> Option<&str> {
        demangle_test_name(&self.name).1
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestFailure {
    /// The `type` attribute, usually the exception class.
    pub kind: Option<String>,
    pub message: String,
    /// Raw stack trace text, kept verbatim.
    pub contents: Option<String>,
}

/// Split a Kotlin-mangled test name such as `testFoo$MyModule_debugUnitTest`
/// into its readable name and the module it was compiled in.
pub fn demangle_test_name(name: &str) -> (&str, Option<&str>) {
    let Some((base, suffix)) = name.rsplit_once('$') else {
        return (name, None);
    };
    if base.is_empty() {
        return (name, None);
    }
    let module = suffix.split('_').next().unwrap_or_default();
    let valid = module
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic())
        && module.chars().all(|c| c.is_ascii_alphanumeric());
    (base, valid.then_some(module))
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SuiteSummary {
    pub name: String,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub elapsed_seconds: f64,
    pub failed_tests: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub suites: usize,
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub elapsed_seconds: f64,
    pub failed_tests: Vec<String>,
}

impl RunSummary {
    pub fn add(&mut self, suite: &SuiteSummary) {
        self.suites += 1;
        self.total += suite.passed + suite.failed + suite.skipped;
        self.passed += suite.passed;
        self.failed += suite.failed;
        self.skipped += suite.skipped;
        self.elapsed_seconds += suite.elapsed_seconds;
        self.failed_tests.extend(suite.failed_tests.iter().cloned());
    }
}
