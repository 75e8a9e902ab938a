use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::models::Location;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub line: u32,
    #[serde(default)]
    pub column: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRange {
    pub start: Position,
    pub end: Position,
}

impl SourceRange {
    fn contains_line(&self, line: u32) -> bool {
        self.start.line <= line && line <= self.end.line
    }

    fn span(&self) -> u32 {
        self.end.line.saturating_sub(self.start.line)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFile {
    pub path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceMapEntry {
    /// The original file this entry was translated from.
    pub source_file: SourceFile,
    /// Range in the original file.
    pub source_range: SourceRange,
    /// Range in the generated file.
    pub range: SourceRange,
}

/// Side-car mapping from generated lines back to the original source.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceMap {
    #[serde(default)]
    pub entries: Vec<SourceMapEntry>,
}

impl SourceMap {
    pub fn parse(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Self::parse(&json).with_context(|| format!("failed to parse {}", path.display()))
    }

    /// The narrowest entry whose generated range covers `line`.
    pub fn lookup(&self, line: u32) -> Option<&SourceMapEntry> {
        self.entries
            .iter()
            .filter(|e| e.range.contains_line(line))
            .min_by_key(|e| e.range.span())
    }
}

/// Where the map for a generated file lives: `.<stem>.sourcemap` beside it.
pub fn sourcemap_path(generated: &Path) -> Option<PathBuf> {
    let stem = generated.file_stem()?.to_string_lossy();
    let dir = generated.parent()?;
    Some(dir.join(format!(".{}.sourcemap", stem)))
}

/// Lazily loaded maps, one per generated file, for a single report pass.
#[derive(Debug, Default)]
pub struct SourceMapCache {
    maps: HashMap<PathBuf, Option<SourceMap>>,
}

impl SourceMapCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Map for `generated`, loading it on first use. A missing or unreadable
    /// map is remembered as absent.
    pub fn get(&mut self, generated: &Path) -> Option<&SourceMap> {
        self.maps
            .entry(generated.to_path_buf())
            .or_insert_with(|| {
                let path = sourcemap_path(generated)?;
                if !path.exists() {
                    log::debug!("no source map at {}", path.display());
                    return None;
                }
                match SourceMap::load(&path) {
                    Ok(map) => Some(map),
                    Err(e) => {
                        log::warn!("{:#}", e);
                        None
                    }
                }
            })
            .as_ref()
    }

    /// Map a generated location to the original source, if the map covers it.
    pub fn original_location(&mut self, generated: &Location) -> Option<Location> {
        let entry = self.get(&generated.path)?.lookup(generated.line)?;
        let mut path = entry.source_file.path.clone();
        if path.is_relative()
            && let Some(dir) = generated.path.parent()
        {
            path = dir.join(path);
        }
        Some(Location {
            path,
            line: entry.source_range.start.line,
            column: entry.source_range.start.column.max(1),
        })
    }

    pub fn len(&self) -> usize {
        self.maps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.maps.is_empty()
    }
}
