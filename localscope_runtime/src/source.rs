//! Source text registry and excerpt rendering for diagnostics.
//!
//! Hosts register the text of each file they compile; diagnostics then quote
//! the lines around an offending line, marking it with `-->`:
//!
//! ```text
//!       2: def f(x):
//! -->   3:     return x / sigma
//! ```

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::sync::{Arc, LazyLock};

/// Lines shown on each side of the offending line.
const EXCERPT_CONTEXT: usize = 2;

// =============================================================================
// Source Map
// =============================================================================

/// Pre-computed line offset table for one source file.
#[derive(Debug, Clone)]
pub struct SourceMap {
    /// Byte offsets of each line start (always starts with 0).
    line_starts: Vec<usize>,
    /// The original source text.
    source: String,
    /// Filename for display.
    filename: Arc<str>,
}

impl SourceMap {
    /// Build a source map from source text and filename.
    pub fn new(source: &str, filename: impl Into<Arc<str>>) -> Self {
        let mut line_starts = vec![0usize];
        for (i, byte) in source.bytes().enumerate() {
            if byte == b'\n' {
                line_starts.push(i + 1);
            }
        }
        Self {
            line_starts,
            source: source.to_string(),
            filename: filename.into(),
        }
    }

    /// Get the source text of a given line (1-indexed), without the newline.
    pub fn line_text(&self, line: usize) -> Option<&str> {
        if line == 0 || line > self.line_starts.len() {
            return None;
        }
        let start = self.line_starts[line - 1];
        let end = self
            .line_starts
            .get(line)
            .copied()
            .unwrap_or(self.source.len());
        let text = &self.source[start..end];
        Some(text.trim_end_matches('\n').trim_end_matches('\r'))
    }

    #[inline]
    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// Get the total number of lines.
    #[inline]
    pub fn line_count(&self) -> usize {
        self.line_starts.len()
    }

    /// Render the lines around `line`, never leaving the enclosing
    /// definition (`first_line..=last_line`).
    ///
    /// Lines are dedented by their common indentation, numbered, and the
    /// offending line is marked with `-->`. Returns `None` when `line` is not
    /// part of the file.
    pub fn excerpt(&self, line: usize, first_line: usize, last_line: usize) -> Option<String> {
        self.line_text(line)?;
        let start = line
            .saturating_sub(EXCERPT_CONTEXT)
            .max(first_line.min(line))
            .max(1);
        let end = (line + EXCERPT_CONTEXT)
            .min(last_line.max(line))
            .min(self.line_count());

        let lines: Vec<(usize, &str)> = (start..=end)
            .filter_map(|no| self.line_text(no).map(|text| (no, text)))
            .collect();
        // Indentation of the definition itself; trailing context may be shallower.
        let indent = lines
            .iter()
            .filter(|(no, text)| *no <= line && !text.trim().is_empty())
            .map(|(_, text)| leading_whitespace(text))
            .min()
            .unwrap_or(0);

        let rendered: Vec<String> = lines
            .iter()
            .map(|&(no, text)| {
                let marker = if no == line { "--> " } else { "    " };
                let text = &text[leading_whitespace(text).min(indent)..];
                format!("{marker}{no:3}: {text}").trim_end().to_string()
            })
            .collect();
        Some(rendered.join("\n"))
    }
}

fn leading_whitespace(text: &str) -> usize {
    text.len() - text.trim_start_matches([' ', '\t']).len()
}

// =============================================================================
// Registry
// =============================================================================

static SOURCES: LazyLock<RwLock<FxHashMap<Arc<str>, Arc<SourceMap>>>> =
    LazyLock::new(|| RwLock::new(FxHashMap::default()));

/// Register (or replace) the source text of `filename`.
pub fn register_source(filename: impl Into<Arc<str>>, source: &str) -> Arc<SourceMap> {
    let filename = filename.into();
    let map = Arc::new(SourceMap::new(source, filename.clone()));
    SOURCES.write().insert(filename, map.clone());
    map
}

/// Look up the registered source of `filename`.
pub fn source_map(filename: &str) -> Option<Arc<SourceMap>> {
    SOURCES.read().get(filename).cloned()
}

/// Remove a registered source, returning whether one was present.
pub fn forget_source(filename: &str) -> bool {
    SOURCES.write().remove(filename).is_some()
}

// =============================================================================
// Tests
// =============================================================================
