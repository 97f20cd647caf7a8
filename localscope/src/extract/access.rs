//! Access records produced by extraction.

use rustc_hash::{FxHashMap, FxHashSet};
use smallvec::SmallVec;
use std::fmt;
use std::sync::Arc;

/// Attribute names read off an external name, in order.
pub type AttributePath = SmallVec<[Arc<str>; 4]>;

/// How an external name is resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AccessKind {
    /// Captured from an enclosing function's frame.
    Free,
    /// Resolved from the module namespace or builtins.
    Global,
}

impl AccessKind {
    pub const fn describe(self) -> &'static str {
        match self {
            AccessKind::Free => "free variable",
            AccessKind::Global => "global",
        }
    }
}

impl fmt::Display for AccessKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AccessKind::Free => "FREE",
            AccessKind::Global => "GLOBAL",
        })
    }
}

/// Where a read happens.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourceLocation {
    pub filename: Arc<str>,
    pub line: u32,
    /// Qualified name of the innermost code object containing the read.
    pub qualname: Arc<str>,
    /// First line of that code object.
    pub first_lineno: u32,
    /// Last line of that code object, including code nested in it.
    pub last_lineno: u32,
    /// Nesting depth below the analyzed callable (0 = the callable itself).
    pub depth: usize,
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "file \"{}\", line {}, in {}",
            self.filename, self.line, self.qualname
        )
    }
}

/// One external name read by a callable or the code nested inside it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessRecord {
    pub name: Arc<str>,
    pub kind: AccessKind,
    pub attribute_path: AttributePath,
    pub location: SourceLocation,
}

impl AccessRecord {
    /// `name` followed by its attribute path, dot separated.
    pub fn dotted(&self) -> String {
        let mut dotted = self.name.to_string();
        for attr in &self.attribute_path {
            dotted.push('.');
            dotted.push_str(attr);
        }
        dotted
    }
}

/// Deduplicated set of access records, in first-observed order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccessSet {
    records: Vec<AccessRecord>,
    index: FxHashMap<(Arc<str>, AccessKind), usize>,
    /// Records whose path was carried over from a replaced shallower site.
    inherited_paths: FxHashSet<usize>,
}

impl AccessSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an observed read.
    ///
    /// A deeper site replaces the stored one; an equally deep or shallower
    /// site is dropped. A replacing site without attributes keeps the
    /// replaced site's attribute path until it extends its own. Returns the
    /// record index when `record` became the representative site.
    pub fn observe(&mut self, record: AccessRecord) -> Option<usize> {
        let key = (record.name.clone(), record.kind);
        match self.index.get(&key) {
            Some(&idx) => {
                if record.location.depth <= self.records[idx].location.depth {
                    return None;
                }
                let replaced = std::mem::replace(&mut self.records[idx], record);
                let current = &mut self.records[idx];
                if current.attribute_path.is_empty() && !replaced.attribute_path.is_empty() {
                    current.attribute_path = replaced.attribute_path;
                    self.inherited_paths.insert(idx);
                } else {
                    self.inherited_paths.remove(&idx);
                }
                Some(idx)
            }
            None => {
                let idx = self.records.len();
                self.records.push(record);
                self.index.insert(key, idx);
                Some(idx)
            }
        }
    }

    /// Append an attribute to the path of the record at `idx`.
    pub(crate) fn extend_path(&mut self, idx: usize, attr: Arc<str>) {
        let inherited = self.inherited_paths.remove(&idx);
        if let Some(record) = self.records.get_mut(idx) {
            if inherited {
                record.attribute_path.clear();
            }
            record.attribute_path.push(attr);
        }
    }

    #[inline]
    pub fn get(&self, name: &str, kind: AccessKind) -> Option<&AccessRecord> {
        let idx = self.index.get(&(Arc::from(name), kind))?;
        self.records.get(*idx)
    }

    #[inline]
    pub fn contains(&self, name: &str, kind: AccessKind) -> bool {
        self.get(name, kind).is_some()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, AccessRecord> {
        self.records.iter()
    }

    /// Names of the given kind, sorted.
    pub fn names(&self, kind: AccessKind) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .records
            .iter()
            .filter(|record| record.kind == kind)
            .map(|record| &*record.name)
            .collect();
        names.sort_unstable();
        names
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl<'a> IntoIterator for &'a AccessSet {
    type Item = &'a AccessRecord;
    type IntoIter = std::slice::Iter<'a, AccessRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
