//! Per-source page cache.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::{SourceKey, SourcePage};

/// Fetched pages keyed by (source, page number).
///
/// The cache is plain storage: it makes no ordering guarantees across
/// sources and never drops entries on its own. Invalidation is per source,
/// and clearing one source never touches another source's pages.
#[derive(Debug, Clone, Default)]
pub struct PageCache {
    pages: HashMap<SourceKey, BTreeMap<u32, SourcePage>>,
}

impl PageCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached page, if present.
    pub fn get(&self, source: SourceKey, page: u32) -> Option<&SourcePage> {
        self.pages.get(&source).and_then(|pages| pages.get(&page))
    }

    /// Stores a page, overwriting any previous entry for (source, page).
    pub fn put(&mut self, source: SourceKey, page: u32, data: SourcePage) {
        self.pages.entry(source).or_default().insert(page, data);
    }

    /// Drops every cached page for one source.
    pub fn clear(&mut self, source: SourceKey) {
        self.pages.remove(&source);
    }

    /// Returns true if any page is cached for the source.
    pub fn has_any(&self, source: SourceKey) -> bool {
        self.pages
            .get(&source)
            .map(|pages| !pages.is_empty())
            .unwrap_or(false)
    }

    /// Distinct page numbers cached for any of the given sources, ascending.
    pub fn page_numbers(&self, sources: &[SourceKey]) -> Vec<u32> {
        let mut numbers = BTreeSet::new();
        for source in sources {
            if let Some(pages) = self.pages.get(source) {
                numbers.extend(pages.keys().copied());
            }
        }
        numbers.into_iter().collect()
    }

    /// Total number of cached pages across all sources.
    pub fn len(&self) -> usize {
        self.pages.values().map(|pages| pages.len()).sum()
    }

    /// Returns true if nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
