//! Scope violations and their rendering.

use crate::extract::{AccessKind, AccessRecord, AttributePath, SourceLocation};
use localscope_runtime::source;
use std::sync::Arc;
use thiserror::Error;

/// Why an external name was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ViolationReason {
    /// Bound, but neither allowed by name nor by value.
    NotPermitted,
    /// Not bound at all at check time.
    Unbound,
}

/// A read of an external name that the configuration does not permit.
///
/// Renders as a stable one-line message:
///
/// ```text
/// `sigma` is not a permitted global (file "model.py", line 4, in f)
/// ```
///
/// followed by a source excerpt when the file's text is registered with
/// [`localscope_runtime::source::register_source`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{}", self.render())]
pub struct ScopeViolation {
    name: Arc<str>,
    kind: AccessKind,
    reason: ViolationReason,
    location: SourceLocation,
    attribute_path: AttributePath,
    excerpt: Option<String>,
}

impl ScopeViolation {
    pub(crate) fn new(record: &AccessRecord, reason: ViolationReason) -> Self {
        let location = record.location.clone();
        let excerpt = source::source_map(&location.filename).and_then(|map| {
            map.excerpt(
                location.line as usize,
                location.first_lineno as usize,
                location.last_lineno as usize,
            )
        });
        Self {
            name: record.name.clone(),
            kind: record.kind,
            reason,
            location,
            attribute_path: record.attribute_path.clone(),
            excerpt,
        }
    }

    /// The offending identifier.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn kind(&self) -> AccessKind {
        self.kind
    }

    #[inline]
    pub fn reason(&self) -> ViolationReason {
        self.reason
    }

    /// Innermost site of the read.
    #[inline]
    pub fn location(&self) -> &SourceLocation {
        &self.location
    }

    /// Attributes read off the name at that site.
    #[inline]
    pub fn attribute_path(&self) -> &[Arc<str>] {
        &self.attribute_path
    }

    #[inline]
    pub fn excerpt(&self) -> Option<&str> {
        self.excerpt.as_deref()
    }

    /// The one-line message, without the source excerpt.
    pub fn summary(&self) -> String {
        let what = match (self.reason, self.kind) {
            (ViolationReason::NotPermitted, kind) => format!("is not a permitted {}", kind.describe()),
            (ViolationReason::Unbound, AccessKind::Global) => "is not in globals".to_string(),
            (ViolationReason::Unbound, AccessKind::Free) => {
                "is not bound in the enclosing scope".to_string()
            }
        };
        format!("`{}` {what} ({})", self.name, self.location)
    }

    /// The one-line message followed by the source excerpt, if any.
    fn render(&self) -> String {
        match &self.excerpt {
            Some(excerpt) => format!("{}\n{excerpt}", self.summary()),
            None => self.summary(),
        }
    }
}
