//! Maps test failures back to source files.
//!
//! Stack traces name the generated Kotlin sources the tests were compiled
//! from. Those are found on disk under the module's source roots and, where a
//! side-car source map exists, translated to the original authored file.

pub mod sourcemap;
pub mod stack;

use std::path::PathBuf;

use crate::config::ResolveConfig;
use crate::models::{Location, TestFailure};

pub use sourcemap::{SourceMap, SourceMapCache};
pub use stack::{FrameFilter, StackFrame, innermost_trace, parse_frames};

/// Where a failure happened, from both viewpoints. Either side may be missing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolution {
    pub generated: Option<Location>,
    pub original: Option<Location>,
}

impl Resolution {
    pub fn is_resolved(&self) -> bool {
        self.generated.is_some()
    }
}

/// Resolves failure locations for one report pass. Source maps are cached for
/// the resolver's lifetime.
#[derive(Debug)]
pub struct SourceResolver {
    project_dir: PathBuf,
    source_roots: Vec<PathBuf>,
    filter: FrameFilter,
    maps: SourceMapCache,
}

impl SourceResolver {
    pub fn new(project_dir: impl Into<PathBuf>, config: &ResolveConfig) -> Self {
        Self {
            project_dir: project_dir.into(),
            source_roots: config.source_roots.clone(),
            filter: FrameFilter::from_config(config),
            maps: SourceMapCache::new(),
        }
    }

    pub fn module_dir(&self, module: &str) -> PathBuf {
        self.project_dir.join(module)
    }

    /// Find the generated source file a frame points at. Tries each source
    /// root in order and returns the first path that exists.
    pub fn locate_frame(&self, frame: &StackFrame, module: &str) -> Option<Location> {
        let file = frame.file.as_deref()?;
        let line = frame.line?;
        let package_dir: PathBuf = frame.package().split('.').filter(|s| !s.is_empty()).collect();
        let module_dir = self.module_dir(module);

        self.source_roots
            .iter()
            .map(|root| module_dir.join(root).join(&package_dir).join(file))
            .find(|candidate| candidate.is_file())
            .map(|path| Location::new(path, line, 1))
    }

    /// Translate a generated location to the original source via its side-car map.
    pub fn resolve_original(&mut self, generated: &Location) -> Option<Location> {
        self.maps.original_location(generated)
    }

    /// Resolve a raw stack trace. Never fails: anything that cannot be found
    /// simply leaves that side of the resolution empty.
    pub fn resolve_trace(&mut self, trace: &str, module: &str) -> Resolution {
        let frames = parse_frames(innermost_trace(trace));
        let Some(frame) = self.filter.select(&frames) else {
            log::debug!("no authored frame in trace ({} frames)", frames.len());
            return Resolution::default();
        };
        let Some(generated) = self.locate_frame(frame, module) else {
            log::debug!(
                "no source file for {} ({:?}) in module {}",
                frame.logical_type_name(),
                frame.file,
                module
            );
            return Resolution::default();
        };
        let original = self.resolve_original(&generated);
        Resolution {
            generated: Some(generated),
            original,
        }
    }

    pub fn resolve_failure(&mut self, failure: &TestFailure, module: &str) -> Resolution {
        match failure.contents.as_deref() {
            Some(trace) => self.resolve_trace(trace, module),
            None => Resolution::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolve::sourcemap::{Position, SourceFile, SourceMapEntry, SourceRange};
    use std::path::Path;
    use pretty_assertions::assert_eq;

    const TRACE: &str = "java.lang.AssertionError: expected:<1> but was:<2>
\tat org.junit.Assert.fail(Assert.java:89)
\tat skip.unit.XCTestCase$DefaultImpls.XCTAssertEqual(XCTest.kt:60)
\tat skip.lib.FooTests.XCTAssertEqual(FooTests.kt:12)
\tat skip.lib.FooTests$testBar$1.invokeSuspend(FooTests.kt:33)
\tat kotlinx.coroutines.DispatchedTask.run(DispatchedTask.kt:108)";

    fn project() -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("Lib/src/test/kotlin/skip/lib/FooTests.kt");
        std::fs::create_dir_all(source.parent().unwrap()).unwrap();
        std::fs::write(&source, "class FooTests\n").unwrap();
        (dir, source)
    }

    fn write_map(generated: &Path, generated_line: u32, original_line: u32) {
        let map = SourceMap {
            entries: vec![SourceMapEntry {
                source_file: SourceFile {
                    path: PathBuf::from("/orig/Sources/FooTests.swift"),
                },
                source_range: SourceRange {
                    start: Position {
                        line: original_line,
                        column: 9,
                    },
                    end: Position {
                        line: original_line,
                        column: 30,
                    },
                },
                range: SourceRange {
                    start: Position {
                        line: generated_line,
                        column: 1,
                    },
                    end: Position {
                        line: generated_line,
                        column: 80,
                    },
                },
            }],
        };
        std::fs::write(
            sourcemap::sourcemap_path(generated).unwrap(),
            serde_json::to_string(&map).unwrap(),
        )
        .unwrap();
    }

    #[test]
    fn resolves_generated_and_original() {
        let (dir, source) = project();
        write_map(&source, 33, 21);
        let mut resolver = SourceResolver::new(dir.path(), &ResolveConfig::default());

        let resolution = resolver.resolve_trace(TRACE, "Lib");
        assert_eq!(resolution.generated, Some(Location::new(&source, 33, 1)));
        assert_eq!(
            resolution.original,
            Some(Location::new("/orig/Sources/FooTests.swift", 21, 9))
        );
    }

    #[test]
    fn missing_map_entry_keeps_generated_location() {
        let (dir, source) = project();
        write_map(&source, 5, 2);
        let mut resolver = SourceResolver::new(dir.path(), &ResolveConfig::default());
        let resolution = resolver.resolve_trace(TRACE, "Lib");
        assert_eq!(resolution.generated, Some(Location::new(&source, 33, 1)));
        assert_eq!(resolution.original, None);
    }

    #[test]
    fn falls_back_to_main_sources() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("Lib/src/main/kotlin/skip/lib/FooTests.kt");
        std::fs::create_dir_all(source.parent().unwrap()).unwrap();
        std::fs::write(&source, "").unwrap();
        let mut resolver = SourceResolver::new(dir.path(), &ResolveConfig::default());
        let resolution = resolver.resolve_trace(TRACE, "Lib");
        assert_eq!(resolution.generated.unwrap().path, source);
    }

    #[test]
    fn unresolvable_is_silent() {
        let (dir, _) = project();
        let mut resolver = SourceResolver::new(dir.path(), &ResolveConfig::default());
        assert_eq!(resolver.resolve_trace(TRACE, "Other"), Resolution::default());
        assert_eq!(resolver.resolve_trace("garbage", "Lib"), Resolution::default());
        let failure = TestFailure {
            kind: None,
            message: "m".into(),
            contents: None,
        };
        assert!(!resolver.resolve_failure(&failure, "Lib").is_resolved());
    }

    #[test]
    fn only_the_innermost_cause_is_used() {
        let (dir, source) = project();
        let mut resolver = SourceResolver::new(dir.path(), &ResolveConfig::default());
        let trace = format!(
            "kotlinx.coroutines.CompletionHandlerException: outer\n\tat skip.lib.FooTests$outer$1.invoke(FooTests.kt:99)\nCaused by: {}",
            TRACE
        );
        let resolution = resolver.resolve_trace(&trace, "Lib");
        assert_eq!(resolution.generated, Some(Location::new(&source, 33, 1)));
    }

    #[test]
    fn resolution_is_idempotent() {
        let (dir, source) = project();
        write_map(&source, 33, 21);
        let mut resolver = SourceResolver::new(dir.path(), &ResolveConfig::default());
        let first = resolver.resolve_trace(TRACE, "Lib");
        let second = resolver.resolve_trace(TRACE, "Lib");
        assert_eq!(first, second);
        let generated = first.generated.unwrap();
        assert_eq!(
            resolver.resolve_original(&generated),
            resolver.resolve_original(&generated)
        );
    }
}
