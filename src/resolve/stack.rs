use std::sync::LazyLock;

use regex::Regex;

use crate::config::ResolveConfig;

/// Marker the JVM puts in front of each nested cause.
pub const CAUSED_BY: &str = "Caused by:";

static FRAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^\s*at\s+(?:[\w.\-@]+/+)?(?P<type>[\w$.<>\-]+)\.(?P<method>[\w$<>\-]+)\((?:(?P<file>[^:()]+):(?P<line>\d+)|(?P<bare>[^:()]*))\)",
    )
    .expect("valid frame pattern")
});

/// One `at type.method(File.kt:12)` line of a JVM stack trace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackFrame {
    pub type_name: String,
    pub method: String,
    pub file: Option<String>,
    pub line: Option<u32>,
}

impl StackFrame {
    /// Type name with any nested or synthetic suffix removed
    /// (`a.b.FooTests$testBar$1` → `a.b.FooTests`).
    pub fn logical_type_name(&self) -> &str {
        self.type_name
            .split('$')
            .next()
            .unwrap_or(&self.type_name)
    }

    /// Package of the logical type, empty for the default package.
    pub fn package(&self) -> &str {
        self.logical_type_name()
            .rsplit_once('.')
            .map(|(package, _)| package)
            .unwrap_or_default()
    }
}

/// The trace after the last `Caused by:` marker. Coroutine failures wrap the
/// relevant exception inside the scheduler's, so only the innermost cause
/// points at the test.
pub fn innermost_trace(text: &str) -> &str {
    match text.rfind(CAUSED_BY) {
        Some(ix) => &text[ix + CAUSED_BY.len()..],
        None => text,
    }
}

pub fn parse_frames(text: &str) -> Vec<StackFrame> {
    text.lines()
        .filter_map(|line| {
            let caps = FRAME.captures(line)?;
            let file = caps.name("file").map(|m| m.as_str().to_string());
            let line = caps.name("line").and_then(|m| m.as_str().parse().ok());
            Some(StackFrame {
                type_name: caps["type"].to_string(),
                method: caps["method"].to_string(),
                file,
                line,
            })
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WalkState {
    Scanning,
    /// The previous frame was an inlined assertion helper; its caller is a
    /// synthetic bridge with no useful line.
    SkipNextFrame,
}

/// Picks the frame of a trace that points at code the test author wrote.
#[derive(Debug, Clone)]
pub struct FrameFilter {
    framework_prefixes: Vec<String>,
    wrapper_marker: String,
}

impl FrameFilter {
    pub fn new(framework_prefixes: Vec<String>, wrapper_marker: impl Into<String>) -> Self {
        Self {
            framework_prefixes,
            wrapper_marker: wrapper_marker.into(),
        }
    }

    pub fn from_config(config: &ResolveConfig) -> Self {
        Self::new(
            config.framework_prefixes.clone(),
            config.wrapper_marker.clone(),
        )
    }

    pub fn is_framework(&self, frame: &StackFrame) -> bool {
        self.framework_prefixes
            .iter()
            .any(|prefix| frame.type_name.starts_with(prefix.as_str()))
    }

    pub fn is_wrapper(&self, frame: &StackFrame) -> bool {
        !self.wrapper_marker.is_empty()
            && self.is_framework(frame)
            && frame.type_name.contains(self.wrapper_marker.as_str())
    }

    /// Authored frames run inside a function-local or synthetic type (`$`)
    /// and carry a file and line.
    fn qualifies(&self, frame: &StackFrame) -> bool {
        frame.type_name.contains('$') && frame.file.is_some() && frame.line.is_some()
    }

    /// Walk frames from the top and return the first authored one.
    pub fn select<'a>(&self, frames: &'a [StackFrame]) -> Option<&'a StackFrame> {
        let mut state = WalkState::Scanning;
        for frame in frames {
            match state {
                WalkState::SkipNextFrame => state = WalkState::Scanning,
                WalkState::Scanning if self.is_wrapper(frame) => {
                    state = WalkState::SkipNextFrame;
                }
                WalkState::Scanning if self.is_framework(frame) => {}
                WalkState::Scanning if self.qualifies(frame) => return Some(frame),
                WalkState::Scanning => {}
            }
        }
        None
    }
}

impl Default for FrameFilter {
    fn default() -> Self {
        Self::from_config(&ResolveConfig::default())
    }
}
