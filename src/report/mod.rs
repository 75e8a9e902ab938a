pub mod junit;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::models::TestSuite;

pub use junit::parse_report;

/// A report file that could not be parsed and was left out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedReport {
    pub path: PathBuf,
    pub reason: String,
}

/// Every suite found under one report directory.
#[derive(Debug, Clone, Default)]
pub struct ReportSet {
    pub suites: Vec<TestSuite>,
    pub skipped: Vec<SkippedReport>,
}

impl ReportSet {
    pub fn extend(&mut self, other: ReportSet) {
        self.suites.extend(other.suites);
        self.skipped.extend(other.skipped);
    }
}

/// Parse every XML report under `dir`.
///
/// A missing directory yields an empty set; the caller decides whether that
/// means something went wrong. Individual malformed files are logged and
/// skipped.
pub fn parse_reports(dir: &Path) -> Result<ReportSet> {
    let mut set = ReportSet::default();
    if !dir.is_dir() {
        log::debug!("no report directory at {}", dir.display());
        return Ok(set);
    }

    for path in report_files(dir)? {
        log::debug!("parsing {}", path.display());
        match std::fs::read_to_string(&path)
            .context("failed to read report")
            .and_then(|xml| parse_report(&xml))
        {
            Ok(suites) => set.suites.extend(suites),
            Err(e) => {
                log::warn!("skipping malformed report {}: {:#}", path.display(), e);
                set.skipped.push(SkippedReport {
                    path,
                    reason: format!("{:#}", e),
                });
            }
        }
    }
    Ok(set)
}

/// Report files under `dir`, in a stable order.
pub fn report_files(dir: &Path) -> Result<Vec<PathBuf>> {
    // The directory is literal; only the suffix is a pattern.
    let pattern = Path::new(&glob::Pattern::escape(&dir.to_string_lossy()))
        .join("**")
        .join("*.xml")
        .to_string_lossy()
        .to_string();
    let mut files: Vec<PathBuf> = glob::glob(&pattern)
        .with_context(|| format!("invalid report pattern {}", pattern))?
        .flatten()
        .filter(|p| p.is_file())
        .collect();
    files.sort();
    Ok(files)
}

/// Last `:`-separated segment of a Gradle task path.
fn task_name(action: &str) -> &str {
    action.rsplit(':').next().unwrap_or(action)
}

/// Whether a build action runs tests and so should leave reports behind.
pub fn is_test_action(action: &str) -> bool {
    let task = task_name(action);
    task.starts_with("test") || (task.starts_with("connected") && task.ends_with("AndroidTest"))
}

/// Directory the given test action writes its XML reports to.
///
/// Android unit test tasks are named `<action>UnitTest` (`testDebug` writes
/// `testDebugUnitTest`); instrumented runs go under `outputs/androidTest-results`.
pub fn report_dir(module_dir: &Path, report_root: &Path, action: &str) -> PathBuf {
    let task = task_name(action);
    if task.starts_with("connected") {
        return module_dir.join("build/outputs/androidTest-results/connected");
    }
    let dir_name = if task == "test" || task.ends_with("UnitTest") {
        task.to_string()
    } else {
        format!("{}UnitTest", task)
    };
    module_dir.join(report_root).join(dir_name)
}
