//! Search query representation.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::SourceKey;

/// Default number of items per fetched page.
pub const DEFAULT_PAGE_SIZE: u32 = 20;

/// Upper bound on items per fetched page.
pub const MAX_PAGE_SIZE: u32 = 100;

/// Sort key applied by each source to its own result pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SortBy {
    /// Most recently updated first.
    #[default]
    Date,
    /// Most liked first.
    LikeCount,
    /// Most viewed first.
    ViewCount,
    /// Longest first.
    Length,
}

impl SortBy {
    /// Returns the wire token for this sort key.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Date => "date",
            Self::LikeCount => "likeCount",
            Self::ViewCount => "viewCount",
            Self::Length => "length",
        }
    }
}

/// Tag filters for a single source.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagRule {
    /// Tags a result must match. A source with no include tags is skipped.
    pub tags: Vec<String>,
    /// Tags that disqualify a result.
    pub exclude_tags: Vec<String>,
}

impl TagRule {
    /// Creates a rule with the given include tags.
    pub fn new(tags: Vec<impl Into<String>>) -> Self {
        Self {
            tags: tags.into_iter().map(Into::into).collect(),
            exclude_tags: Vec::new(),
        }
    }

    /// Sets the exclusion tags.
    pub fn with_excluded(mut self, exclude_tags: Vec<impl Into<String>>) -> Self {
        self.exclude_tags = exclude_tags.into_iter().map(Into::into).collect();
        self
    }

    /// Returns true if this rule has no include tags.
    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }
}

/// Caller-owned query state, snapshotted per request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchQuery {
    /// Tag filters per source.
    pub rules: HashMap<SourceKey, TagRule>,
    /// Sort key forwarded to every source.
    pub sort_by: SortBy,
    /// Items per page, clamped to `1..=MAX_PAGE_SIZE`.
    pub page_size: u32,
}

impl Default for SearchQuery {
    fn default() -> Self {
        Self {
            rules: HashMap::new(),
            sort_by: SortBy::Date,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl SearchQuery {
    /// Creates an empty query with default sort and page size.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the tag rule for a source.
    pub fn with_rule(mut self, source: SourceKey, rule: TagRule) -> Self {
        self.rules.insert(source, rule);
        self
    }

    /// Sets the sort key.
    pub fn with_sort(mut self, sort_by: SortBy) -> Self {
        self.sort_by = sort_by;
        self
    }

    /// Sets the page size. Out-of-range values are clamped when requests
    /// are built.
    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size;
        self
    }

    /// Returns the tag rule for a source, if one is configured.
    pub fn rule(&self, source: SourceKey) -> Option<&TagRule> {
        self.rules.get(&source)
    }

    /// Returns true if the source has at least one include tag.
    pub fn has_tags(&self, source: SourceKey) -> bool {
        self.rule(source).map(|r| !r.is_empty()).unwrap_or(false)
    }

    /// Page size with out-of-range values clamped to `1..=MAX_PAGE_SIZE`.
    pub fn effective_page_size(&self) -> u32 {
        self.page_size.clamp(1, MAX_PAGE_SIZE)
    }
}

/// One page fetch handed to a source adapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    /// Source being fetched.
    pub source: SourceKey,
    /// Include tags. Never empty.
    pub tags: Vec<String>,
    /// Exclusion tags.
    pub exclude_tags: Vec<String>,
    /// Page number, 1-indexed.
    pub page: u32,
    /// Items per page.
    pub page_size: u32,
    /// Sort key.
    pub sort_by: SortBy,
}

impl PageRequest {
    /// Builds the request for one source and page from a query snapshot.
    ///
    /// Returns `None` when the source has no include tags, in which case
    /// the source is skipped rather than contacted.
    pub fn from_query(query: &SearchQuery, source: SourceKey, page: u32) -> Option<Self> {
        let rule = query.rule(source)?;
        if rule.is_empty() {
            return None;
        }
        Some(Self {
            source,
            tags: rule.tags.clone(),
            exclude_tags: rule.exclude_tags.clone(),
            page: page.max(1),
            page_size: query.effective_page_size(),
            sort_by: query.sort_by,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_query_new() {
        let query = SearchQuery::new();
        assert!(query.rules.is_empty());
        assert_eq!(query.sort_by, SortBy::Date);
        assert_eq!(query.page_size, DEFAULT_PAGE_SIZE);
    }

    #[test]
    fn test_search_query_with_rule() {
        let query = SearchQuery::new().with_rule(SourceKey::Ao3, TagRule::new(vec!["fluff"]));
        assert!(query.has_tags(SourceKey::Ao3));
        assert!(!query.has_tags(SourceKey::Pixiv));
    }

    #[test]
    fn test_search_query_with_sort() {
        let query = SearchQuery::new().with_sort(SortBy::LikeCount);
        assert_eq!(query.sort_by, SortBy::LikeCount);
    }

    #[test]
    fn test_search_query_builder_chain() {
        let query = SearchQuery::new()
            .with_rule(
                SourceKey::Bilibili,
                TagRule::new(vec!["fanfic"]).with_excluded(vec!["wip"]),
            )
            .with_sort(SortBy::ViewCount)
            .with_page_size(50);

        assert_eq!(query.sort_by, SortBy::ViewCount);
        assert_eq!(query.page_size, 50);
        let rule = query.rule(SourceKey::Bilibili).unwrap();
        assert_eq!(rule.tags, vec!["fanfic"]);
        assert_eq!(rule.exclude_tags, vec!["wip"]);
    }

    #[test]
    fn test_effective_page_size_clamps() {
        assert_eq!(SearchQuery::new().with_page_size(0).effective_page_size(), 1);
        assert_eq!(
            SearchQuery::new().with_page_size(500).effective_page_size(),
            MAX_PAGE_SIZE
        );
        assert_eq!(SearchQuery::new().effective_page_size(), DEFAULT_PAGE_SIZE);
    }

    #[test]
    fn test_tag_rule_empty() {
        let rule = TagRule::default();
        assert!(rule.is_empty());
        let rule = TagRule::new(vec!["a"]);
        assert!(!rule.is_empty());
    }

    #[test]
    fn test_has_tags_empty_rule() {
        let query = SearchQuery::new().with_rule(SourceKey::Ao3, TagRule::default());
        assert!(!query.has_tags(SourceKey::Ao3));
    }

    #[test]
    fn test_page_request_from_query() {
        let query = SearchQuery::new()
            .with_rule(SourceKey::Lofter, TagRule::new(vec!["au"]))
            .with_page_size(30);
        let request = PageRequest::from_query(&query, SourceKey::Lofter, 3).unwrap();
        assert_eq!(request.source, SourceKey::Lofter);
        assert_eq!(request.tags, vec!["au"]);
        assert_eq!(request.page, 3);
        assert_eq!(request.page_size, 30);
        assert_eq!(request.sort_by, SortBy::Date);
    }

    #[test]
    fn test_page_request_skips_empty_tags() {
        let query = SearchQuery::new().with_rule(SourceKey::Ao3, TagRule::default());
        assert!(PageRequest::from_query(&query, SourceKey::Ao3, 1).is_none());
        assert!(PageRequest::from_query(&query, SourceKey::Pixiv, 1).is_none());
    }

    #[test]
    fn test_page_request_floors_page_number() {
        let query = SearchQuery::new().with_rule(SourceKey::Ao3, TagRule::new(vec!["a"]));
        let request = PageRequest::from_query(&query, SourceKey::Ao3, 0).unwrap();
        assert_eq!(request.page, 1);
    }

    #[test]
    fn test_sort_by_tokens() {
        assert_eq!(SortBy::Date.as_str(), "date");
        assert_eq!(SortBy::LikeCount.as_str(), "likeCount");
        assert_eq!(SortBy::ViewCount.as_str(), "viewCount");
        assert_eq!(SortBy::Length.as_str(), "length");
    }

    #[test]
    fn test_sort_by_serialization() {
        assert_eq!(serde_json::to_string(&SortBy::LikeCount).unwrap(), "\"likeCount\"");
        let sort: SortBy = serde_json::from_str("\"viewCount\"").unwrap();
        assert_eq!(sort, SortBy::ViewCount);
    }

    #[test]
    fn test_search_query_serialization() {
        let query = SearchQuery::new().with_rule(SourceKey::Ao3, TagRule::new(vec!["fluff"]));
        let json = serde_json::to_string(&query).unwrap();
        assert!(json.contains("\"ao3\""));
        assert!(json.contains("\"fluff\""));
        let back: SearchQuery = serde_json::from_str(&json).unwrap();
        assert_eq!(back.rules, query.rules);
    }
}
