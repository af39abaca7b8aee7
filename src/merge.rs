//! Deterministic merging of cached per-source pages.

use std::collections::HashSet;

use crate::{PageCache, SourceKey, Story, StoryKey};

/// Interleaves cached pages into one ordered, deduplicated sequence.
///
/// Pages are visited in ascending page-number order so a source's page 2
/// never appears before another source's page 1. Within a page, stories are
/// taken round-robin across sources in the caller-declared order, giving
/// each source roughly equal weight per page. Deduplication by story key is
/// global across the whole sequence.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResultMerger;

impl ResultMerger {
    /// Creates a new merger.
    pub fn new() -> Self {
        Self
    }

    /// Rebuilds the merged sequence for the given sources from the cache.
    pub fn rebuild(&self, sources: &[SourceKey], cache: &PageCache) -> Vec<Story> {
        let mut merged = Vec::new();
        let mut seen: HashSet<StoryKey> = HashSet::new();

        for page in cache.page_numbers(sources) {
            self.interleave_page(sources, cache, page, &mut seen, &mut merged);
        }
        merged
    }

    /// Appends one page's round-robin interleaving to `merged`.
    fn interleave_page(
        &self,
        sources: &[SourceKey],
        cache: &PageCache,
        page: u32,
        seen: &mut HashSet<StoryKey>,
        merged: &mut Vec<Story>,
    ) {
        let lists: Vec<&[Story]> = sources
            .iter()
            .map(|&source| {
                cache
                    .get(source, page)
                    .map(|cached| cached.stories.as_slice())
                    .unwrap_or(&[])
            })
            .collect();

        let longest = lists.iter().map(|list| list.len()).max().unwrap_or(0);
        for index in 0..longest {
            for list in &lists {
                if let Some(story) = list.get(index) {
                    if seen.insert(story.key()) {
                        merged.push(story.clone());
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SourcePage;

    fn story(source: SourceKey, id: &str) -> Story {
        Story::new(source, id, format!("story {}", id))
    }

    fn page_of(source: SourceKey, ids: &[&str]) -> SourcePage {
        SourcePage::new(ids.iter().map(|id| story(source, id)).collect(), true)
    }

    fn ids(stories: &[Story]) -> Vec<String> {
        stories.iter().map(|s| s.id.clone()).collect()
    }

    #[test]
    fn test_round_robin_within_page() {
        let mut cache = PageCache::new();
        cache.put(SourceKey::Ao3, 1, page_of(SourceKey::Ao3, &["a1", "a2"]));
        cache.put(SourceKey::Pixiv, 1, page_of(SourceKey::Pixiv, &["p1", "p2"]));

        let merged = ResultMerger::new().rebuild(&[SourceKey::Ao3, SourceKey::Pixiv], &cache);
        assert_eq!(ids(&merged), vec!["a1", "p1", "a2", "p2"]);
    }

    #[test]
    fn test_caller_order_controls_interleaving() {
        let mut cache = PageCache::new();
        cache.put(SourceKey::Ao3, 1, page_of(SourceKey::Ao3, &["a1", "a2"]));
        cache.put(SourceKey::Pixiv, 1, page_of(SourceKey::Pixiv, &["p1", "p2"]));

        let merged = ResultMerger::new().rebuild(&[SourceKey::Pixiv, SourceKey::Ao3], &cache);
        assert_eq!(ids(&merged), vec!["p1", "a1", "p2", "a2"]);
    }

    #[test]
    fn test_pages_concatenate_in_ascending_order() {
        let mut cache = PageCache::new();
        cache.put(SourceKey::Ao3, 2, page_of(SourceKey::Ao3, &["a3", "a4"]));
        cache.put(SourceKey::Ao3, 1, page_of(SourceKey::Ao3, &["a1", "a2"]));
        cache.put(SourceKey::Pixiv, 1, page_of(SourceKey::Pixiv, &["p1"]));

        let merged = ResultMerger::new().rebuild(&[SourceKey::Ao3, SourceKey::Pixiv], &cache);
        assert_eq!(ids(&merged), vec!["a1", "p1", "a2", "a3", "a4"]);
    }

    #[test]
    fn test_uneven_lists_drain_longest() {
        let mut cache = PageCache::new();
        cache.put(SourceKey::Ao3, 1, page_of(SourceKey::Ao3, &["a1", "a2", "a3"]));
        cache.put(SourceKey::Lofter, 1, page_of(SourceKey::Lofter, &["l1"]));

        let merged = ResultMerger::new().rebuild(&[SourceKey::Ao3, SourceKey::Lofter], &cache);
        assert_eq!(ids(&merged), vec!["a1", "l1", "a2", "a3"]);
    }

    #[test]
    fn test_missing_page_treated_as_empty() {
        let mut cache = PageCache::new();
        cache.put(SourceKey::Ao3, 1, page_of(SourceKey::Ao3, &["a1"]));
        cache.put(SourceKey::Ao3, 2, page_of(SourceKey::Ao3, &["a2"]));
        cache.put(SourceKey::Pixiv, 1, page_of(SourceKey::Pixiv, &["p1"]));

        let merged = ResultMerger::new().rebuild(&[SourceKey::Ao3, SourceKey::Pixiv], &cache);
        assert_eq!(ids(&merged), vec!["a1", "p1", "a2"]);
    }

    #[test]
    fn test_dedup_is_global_across_pages() {
        let mut cache = PageCache::new();
        cache.put(SourceKey::Ao3, 1, page_of(SourceKey::Ao3, &["a1", "a2"]));
        // The same story drifts onto page 2 between fetches.
        cache.put(SourceKey::Ao3, 2, page_of(SourceKey::Ao3, &["a2", "a3"]));

        let merged = ResultMerger::new().rebuild(&[SourceKey::Ao3], &cache);
        assert_eq!(ids(&merged), vec!["a1", "a2", "a3"]);
    }

    #[test]
    fn test_same_id_on_different_sources_kept() {
        let mut cache = PageCache::new();
        cache.put(SourceKey::Ao3, 1, page_of(SourceKey::Ao3, &["42"]));
        cache.put(SourceKey::Pixiv, 1, page_of(SourceKey::Pixiv, &["42"]));

        let merged = ResultMerger::new().rebuild(&[SourceKey::Ao3, SourceKey::Pixiv], &cache);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].source, SourceKey::Ao3);
        assert_eq!(merged[1].source, SourceKey::Pixiv);
    }

    #[test]
    fn test_duplicate_within_one_page_emitted_once() {
        let mut cache = PageCache::new();
        cache.put(SourceKey::Ao3, 1, page_of(SourceKey::Ao3, &["a1", "a1", "a2"]));

        let merged = ResultMerger::new().rebuild(&[SourceKey::Ao3], &cache);
        assert_eq!(ids(&merged), vec!["a1", "a2"]);
    }

    #[test]
    fn test_empty_cache_yields_empty_sequence() {
        let cache = PageCache::new();
        let merged = ResultMerger::new().rebuild(&[SourceKey::Ao3, SourceKey::Pixiv], &cache);
        assert!(merged.is_empty());
    }

    #[test]
    fn test_unselected_sources_ignored() {
        let mut cache = PageCache::new();
        cache.put(SourceKey::Ao3, 1, page_of(SourceKey::Ao3, &["a1"]));
        cache.put(SourceKey::Bilibili, 1, page_of(SourceKey::Bilibili, &["b1"]));

        let merged = ResultMerger::new().rebuild(&[SourceKey::Ao3], &cache);
        assert_eq!(ids(&merged), vec!["a1"]);
    }

    #[test]
    fn test_no_sources_selected() {
        let mut cache = PageCache::new();
        cache.put(SourceKey::Ao3, 1, page_of(SourceKey::Ao3, &["a1"]));
        let merged = ResultMerger::new().rebuild(&[], &cache);
        assert!(merged.is_empty());
    }
}
