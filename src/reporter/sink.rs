use std::io::Write;

use crate::models::Issue;

/// Destination for issues shown in the IDE.
pub trait IssueSink: Send {
    fn report(&mut self, issue: &Issue);
}

/// Writes issues in the `path:line:column: severity: message` form IDEs pick
/// up from build logs.
pub struct ConsoleSink<W: Write + Send> {
    out: W,
}

impl<W: Write + Send> ConsoleSink<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write + Send> IssueSink for ConsoleSink<W> {
    fn report(&mut self, issue: &Issue) {
        if let Err(e) = writeln!(self.out, "{}", issue) {
            log::warn!("failed to write issue: {}", e);
        }
    }
}

/// Keeps every issue in memory.
#[derive(Debug, Default)]
pub struct CollectingSink {
    pub issues: Vec<Issue>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn errors(&self) -> impl Iterator<Item = &Issue> {
        self.issues.iter().filter(|i| i.is_failure())
    }
}

impl IssueSink for CollectingSink {
    fn report(&mut self, issue: &Issue) {
        self.issues.push(issue.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Location;

    #[test]
    fn console_sink_writes_one_line_per_issue() {
        let mut sink = ConsoleSink::new(Vec::new());
        sink.report(&Issue::error("bad").at(Location::new("/a/B.kt", 3, 4)));
        sink.report(&Issue::note("fyi"));
        let text = String::from_utf8(sink.into_inner()).unwrap();
        assert_eq!(text, "/a/B.kt:3:4: error: bad\nnote: fyi\n");
    }
}
