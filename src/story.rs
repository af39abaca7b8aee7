//! Story result types.

use serde::{Deserialize, Serialize};

use crate::SourceKey;

/// Identity of a story, unique across all sources.
///
/// Two stories with the same key are the same entity even if their other
/// fields differ between fetches.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StoryKey {
    /// Source the story came from.
    pub source: SourceKey,
    /// Source-local identifier.
    pub id: String,
}

impl std::fmt::Display for StoryKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.source, self.id)
    }
}

/// A single story result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Story {
    /// Source-local identifier.
    pub id: String,
    /// Source the story came from.
    pub source: SourceKey,
    /// Story title.
    pub title: String,
    /// Author display name.
    pub author: String,
    /// Short description or opening excerpt.
    pub summary: String,
    /// Tags attached by the source.
    pub tags: Vec<String>,
    /// Canonical URL on the source site.
    pub url: String,
    /// Total word count, if the source reports one.
    pub word_count: Option<u64>,
    /// Chapter count, if the source reports one.
    pub chapter_count: Option<u32>,
    /// Likes/kudos, if the source reports them.
    pub like_count: Option<u64>,
    /// Views/hits, if the source reports them.
    pub view_count: Option<u64>,
    /// Publication date as reported by the source.
    pub published_at: Option<String>,
    /// Last update date as reported by the source.
    pub updated_at: Option<String>,
    /// Cover image URL.
    pub cover_image: Option<String>,
    /// Whether the source marks the story finished.
    pub is_complete: bool,
}

impl Story {
    /// Creates a new story with the given identity and title.
    pub fn new(source: SourceKey, id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            source,
            title: title.into(),
            author: String::new(),
            summary: String::new(),
            tags: Vec::new(),
            url: String::new(),
            word_count: None,
            chapter_count: None,
            like_count: None,
            view_count: None,
            published_at: None,
            updated_at: None,
            cover_image: None,
            is_complete: false,
        }
    }

    /// Sets the author.
    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = author.into();
        self
    }

    /// Sets the summary.
    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = summary.into();
        self
    }

    /// Sets the tags.
    pub fn with_tags(mut self, tags: Vec<impl Into<String>>) -> Self {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the canonical URL.
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    /// Sets the word count.
    pub fn with_word_count(mut self, words: u64) -> Self {
        self.word_count = Some(words);
        self
    }

    /// Sets the chapter count.
    pub fn with_chapter_count(mut self, chapters: u32) -> Self {
        self.chapter_count = Some(chapters);
        self
    }

    /// Sets the like/kudos count.
    pub fn with_like_count(mut self, likes: u64) -> Self {
        self.like_count = Some(likes);
        self
    }

    /// Sets the view/hit count.
    pub fn with_view_count(mut self, views: u64) -> Self {
        self.view_count = Some(views);
        self
    }

    /// Sets the publication date.
    pub fn with_published_at(mut self, date: impl Into<String>) -> Self {
        self.published_at = Some(date.into());
        self
    }

    /// Sets the last update date.
    pub fn with_updated_at(mut self, date: impl Into<String>) -> Self {
        self.updated_at = Some(date.into());
        self
    }

    /// Sets the cover image URL.
    pub fn with_cover_image(mut self, url: impl Into<String>) -> Self {
        self.cover_image = Some(url.into());
        self
    }

    /// Marks the story finished.
    pub fn with_complete(mut self, complete: bool) -> Self {
        self.is_complete = complete;
        self
    }

    /// Returns the deduplication key for this story.
    pub fn key(&self) -> StoryKey {
        StoryKey {
            source: self.source,
            id: self.id.clone(),
        }
    }
}

/// One fetched page of results from a single source.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourcePage {
    /// Stories in source order.
    pub stories: Vec<Story>,
    /// Whether the source reports further pages.
    pub has_more: bool,
}

impl SourcePage {
    /// Creates a page from stories and a has-more flag.
    pub fn new(stories: Vec<Story>, has_more: bool) -> Self {
        Self { stories, has_more }
    }

    /// Creates an empty terminal page.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Number of stories on the page.
    pub fn len(&self) -> usize {
        self.stories.len()
    }

    /// Returns true if the page has no stories.
    pub fn is_empty(&self) -> bool {
        self.stories.is_empty()
    }
}
