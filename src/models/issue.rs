use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Note,
    Warning,
    Error,
}

impl Severity {
    /// Only errors fail a run; warnings and notes are informational.
    pub fn is_failure(&self) -> bool {
        matches!(self, Severity::Error)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Severity::Note => "note",
            Severity::Warning => "warning",
            Severity::Error => "error",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Location {
    pub path: PathBuf,
    pub line: u32,
    pub column: u32,
}

impl Location {
    pub fn new(path: impl Into<PathBuf>, line: u32, column: u32) -> Self {
        Self {
            path: path.into(),
            line,
            column,
        }
    }

    /// Rewrite `path` to the symlink's target so the editable file is reported
    /// rather than a derived copy. Non-links (and unreadable links) are left as is.
    pub fn resolve_symlink(&mut self) {
        let Ok(meta) = std::fs::symlink_metadata(&self.path) else {
            return;
        };
        if !meta.file_type().is_symlink() {
            return;
        }
        match std::fs::read_link(&self.path) {
            Ok(target) if target.is_absolute() => self.path = target,
            Ok(target) => {
                if let Some(parent) = self.path.parent() {
                    self.path = parent.join(target);
                }
            }
            Err(e) => log::debug!("unable to read link {}: {}", self.path.display(), e),
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.path.display(), self.line, self.column)
    }
}

/// A diagnostic destined for the IDE issue list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    pub severity: Severity,
    pub message: String,
    pub location: Option<Location>,
}

impl Issue {
    pub fn new(severity: Severity, message: impl Into<String>, location: Option<Location>) -> Self {
        Self {
            severity,
            message: message.into(),
            location,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(Severity::Error, message, None)
    }

    pub fn note(message: impl Into<String>) -> Self {
        Self::new(Severity::Note, message, None)
    }

    pub fn at(mut self, location: Location) -> Self {
        self.location = Some(location);
        self
    }

    pub fn is_failure(&self) -> bool {
        self.severity.is_failure()
    }
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.location {
            Some(loc) => write!(f, "{}: {}: {}", loc, self.severity, self.message),
            None => write!(f, "{}: {}", self.severity, self.message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_matches_ide_format() {
        let issue = Issue::error("boom").at(Location::new("/p/X.kt", 10, 3));
        assert_eq!(issue.to_string(), "/p/X.kt:10:3: error: boom");
        assert_eq!(Issue::note("hi").to_string(), "note: hi");
    }

    #[cfg(unix)]
    #[test]
    fn symlinked_location_points_at_target() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("Real.kt");
        std::fs::write(&target, "fun main() {}\n").unwrap();
        let link = dir.path().join("Link.kt");
        std::os::unix::fs::symlink(&target, &link).unwrap();

        let mut loc = Location::new(&link, 1, 1);
        loc.resolve_symlink();
        assert_eq!(loc.path, target);

        let mut plain = Location::new(&target, 1, 1);
        plain.resolve_symlink();
        assert_eq!(plain.path, target);
    }

    #[cfg(unix)]
    #[test]
    fn relative_link_is_resolved_against_its_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("Real.kt"), "").unwrap();
        let link = dir.path().join("Link.kt");
        std::os::unix::fs::symlink("Real.kt", &link).unwrap();

        let mut loc = Location::new(&link, 4, 2);
        loc.resolve_symlink();
        assert_eq!(loc.path, dir.path().join("Real.kt"));
    }
}
