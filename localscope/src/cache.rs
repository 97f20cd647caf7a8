//! Memoized extraction keyed by code content.
//!
//! Entries are keyed by [`CodeObject::fingerprint`] and hold the analyzed code
//! itself, so a hit is confirmed structurally before it is trusted. Two
//! threads racing on the same code both compute the same set; the first
//! insert wins.

use crate::error::ExtractError;
use crate::extract::{AccessSet, extract};
use dashmap::DashMap;
use localscope_bytecode::CodeObject;
use std::sync::{Arc, LazyLock};
use tracing::{debug, warn};

static GLOBAL: LazyLock<ExtractionCache> = LazyLock::new(ExtractionCache::new);

/// Cache of extracted access sets.
#[derive(Debug, Default)]
pub struct ExtractionCache {
    entries: DashMap<u64, (Arc<CodeObject>, Arc<AccessSet>)>,
}

impl ExtractionCache {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Process-wide cache used by [`wrap`](crate::wrap).
    pub fn global() -> &'static ExtractionCache {
        &GLOBAL
    }

    /// Cached access set of `code`, extracting it on first use.
    pub fn get_or_extract(&self, code: &Arc<CodeObject>) -> Result<Arc<AccessSet>, ExtractError> {
        let fingerprint = code.fingerprint();

        if let Some(entry) = self.entries.get(&fingerprint) {
            let (cached, set) = entry.value();
            if Arc::ptr_eq(cached, code) || **cached == **code {
                debug!(qualname = %code.qualname, fingerprint, "extraction cache hit");
                return Ok(set.clone());
            }
            // Fingerprint collision: analyze without displacing the entry.
            warn!(
                qualname = %code.qualname,
                cached = %cached.qualname,
                fingerprint,
                "fingerprint collision in extraction cache"
            );
            drop(entry);
            return extract(code).map(Arc::new);
        }

        let set = Arc::new(extract(code)?);
        let entry = self
            .entries
            .entry(fingerprint)
            .or_insert_with(|| (code.clone(), set.clone()));
        if Arc::ptr_eq(&entry.0, code) || *entry.0 == **code {
            Ok(entry.1.clone())
        } else {
            Ok(set)
        }
    }

    /// Whether an access set for `code` is cached.
    pub fn contains(&self, code: &CodeObject) -> bool {
        self.entries
            .get(&code.fingerprint())
            .is_some_and(|entry| *entry.0 == *code)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }
}
