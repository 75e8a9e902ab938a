//! Recognizes Kotlin compiler diagnostics in live build output.
//!
//! The compiler prints `e: file:///path/File.kt:12:5 message`. Some versions
//! break the message onto the following line, so every check looks at the
//! current line together with the one before it.

use std::path::PathBuf;
use std::sync::LazyLock;

use regex::Regex;

use crate::models::{Issue, Location, OutputLine, Severity};

static DIAGNOSTIC: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<severity>[ewiv]): (?P<uri>file://\S+?):(?P<line>\d+):(?P<column>\d+)(?:\s+(?P<message>.*))?$")
        .expect("valid diagnostic pattern")
});

struct Diagnostic {
    severity: Severity,
    location: Location,
    message: Option<String>,
}

fn parse_diagnostic(line: &str) -> Option<Diagnostic> {
    let caps = DIAGNOSTIC.captures(line.trim_end())?;
    let severity = match &caps["severity"] {
        "e" => Severity::Error,
        "w" => Severity::Warning,
        _ => Severity::Note,
    };
    let path = uri_to_path(&caps["uri"])?;
    let line = caps["line"].parse().ok()?;
    let column = caps["column"].parse().ok()?;
    let message = caps
        .name("message")
        .map(|m| m.as_str().trim().to_string())
        .filter(|m| !m.is_empty());
    Some(Diagnostic {
        severity,
        location: Location { path, line, column },
        message,
    })
}

fn uri_to_path(uri: &str) -> Option<PathBuf> {
    let url = url::Url::parse(uri).ok()?;
    url.to_file_path().ok()
}

/// Look at one adjacent pair of output lines and report the diagnostic they
/// describe, if any. A header line without a message produces nothing until
/// its continuation line arrives.
pub fn scan(previous: &str, current: &str) -> Option<Issue> {
    if let Some(diag) = parse_diagnostic(current) {
        let message = diag.message?;
        return Some(Issue::new(diag.severity, message, Some(diag.location)));
    }

    let header = parse_diagnostic(previous)?;
    if header.message.is_some() {
        return None;
    }
    let message = current.trim();
    if message.is_empty() {
        return None;
    }
    Some(Issue::new(header.severity, message, Some(header.location)))
}

/// Streaming wrapper around [`scan`] with a one-line lookback.
#[derive(Debug, Default)]
pub struct LineScanner {
    previous: Option<String>,
}

impl LineScanner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed the next line. The first line of a stream is compared against itself.
    pub fn feed(&mut self, line: &OutputLine) -> Option<Issue> {
        let previous = self.previous.as_deref().unwrap_or(&line.text);
        let issue = scan(previous, &line.text);
        self.previous = Some(line.text.clone());
        issue
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn line(index: u64, text: &str) -> OutputLine {
        OutputLine {
            index,
            text: text.into(),
        }
    }

    #[test]
    fn single_line_error() {
        let text = "e: file:///p/X.kt:10:3 Unresolved reference: foo";
        let issue = scan(text, text).unwrap();
        assert_eq!(
            issue,
            Issue::new(
                Severity::Error,
                "Unresolved reference: foo",
                Some(Location::new("/p/X.kt", 10, 3))
            )
        );
        assert!(issue.is_failure());
    }

    #[test]
    fn severities() {
        let w = scan("", "w: file:///p/X.kt:1:2 unused variable").unwrap();
        assert_eq!(w.severity, Severity::Warning);
        assert!(!w.is_failure());
        let i = scan("", "i: file:///p/X.kt:1:2 fyi").unwrap();
        assert_eq!(i.severity, Severity::Note);
    }

    #[test]
    fn message_on_following_line() {
        let header = "e: file:///p/X.kt:10:3";
        assert_eq!(scan(header, header), None);
        let issue = scan(header, " message here").unwrap();
        assert_eq!(issue.severity, Severity::Error);
        assert_eq!(issue.message, "message here");
        assert_eq!(issue.location, Some(Location::new("/p/X.kt", 10, 3)));
    }

    #[test]
    fn complete_header_does_not_claim_next_line() {
        assert_eq!(
            scan("e: file:///p/X.kt:10:3 done", "> Task :compileKotlin FAILED"),
            None
        );
    }

    #[test]
    fn unrelated_lines_produce_nothing() {
        for text in [
            "",
            "BUILD SUCCESSFUL in 3s",
            "e: something else",
            "e: /p/X.kt:10:3 no uri scheme",
            "x: file:///p/X.kt:10:3 bad severity",
            "e: file:///p/X.kt:ten:3 bad line",
        ] {
            assert_eq!(scan(text, text), None, "{text}");
        }
    }

    #[test]
    fn percent_escapes_are_decoded() {
        let issue = scan("", "e: file:///p/My%20Project/X.kt:2:1 oops").unwrap();
        assert_eq!(
            issue.location.unwrap().path,
            PathBuf::from("/p/My Project/X.kt")
        );
    }

    #[test]
    fn streaming_scanner_uses_one_line_lookback() {
        let mut scanner = LineScanner::new();
        let lines = [
            "> Task :compileDebugKotlin",
            "e: file:///p/X.kt:10:3",
            " message here",
            "w: file:///p/Y.kt:4:1 deprecated",
            "BUILD FAILED",
        ];
        let issues: Vec<Issue> = lines
            .iter()
            .enumerate()
            .filter_map(|(i, text)| scanner.feed(&line(i as u64, text)))
            .collect();
        assert_eq!(issues.len(), 2);
        assert_eq!(issues[0].message, "message here");
        assert_eq!(issues[1].severity, Severity::Warning);
    }

    #[test]
    fn first_line_is_compared_with_itself() {
        let mut scanner = LineScanner::new();
        let issue = scanner.feed(&line(0, "e: file:///p/X.kt:1:1 first"));
        assert_eq!(issue.unwrap().message, "first");
    }
}
