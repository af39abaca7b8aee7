//! # ficweave
//!
//! An embeddable meta search library for fan fiction archives.
//!
//! This library coordinates tag searches across multiple fan fiction
//! sources and merges the results into one feed, with support for:
//!
//! - Async parallel fan-out with per-source failure isolation
//! - Page-level caching and deterministic round-robin merging
//! - Signature-based retry for upstreams with transient rejections
//! - Credential gating for sources that require a logged-in account
//!
//! ## Example
//!
//! ```rust,no_run
//! use ficweave::{
//!     PageRequest, Result, SearchQuery, SearchSession, SourceAdapter, SourceKey, SourcePage,
//!     TagRule,
//! };
//!
//! struct MyArchive;
//!
//! #[async_trait::async_trait]
//! impl SourceAdapter for MyArchive {
//!     fn key(&self) -> SourceKey {
//!         SourceKey::Ao3
//!     }
//!
//!     async fn fetch_page(&self, _request: &PageRequest) -> Result<SourcePage> {
//!         Ok(SourcePage::empty())
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let mut session = SearchSession::new();
//!     session.add_source(MyArchive);
//!
//!     let query =
//!         SearchQuery::new().with_rule(SourceKey::Ao3, TagRule::new(vec!["coffee shop au"]));
//!     session.set_query(query);
//!
//!     session.search(true).await?;
//!     session.settled().await;
//!
//!     for story in session.snapshot().stories {
//!         println!("{}: {}", story.source, story.title);
//!     }
//!     Ok(())
//! }
//! ```

mod error;
mod source;
mod query;
mod story;
mod cache;
mod retry;
mod credential;
mod merge;
mod session;

pub use error::{FailureSignature, Result, SearchError};
pub use source::{catalog, profile, requires_credential, SourceAdapter, SourceKey, SourceProfile};
pub use query::{PageRequest, SearchQuery, SortBy, TagRule, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};
pub use story::{SourcePage, Story, StoryKey};
pub use cache::PageCache;
pub use retry::{RetryPolicy, DEFAULT_RETRY_DELAY_MS};
pub use credential::{
    CredentialGate, CredentialProvider, CredentialState, CredentialStatus, DEFAULT_MAX_POLLS,
    DEFAULT_POLL_INTERVAL,
};
pub use merge::ResultMerger;
pub use session::{SearchSession, SessionSnapshot, SourceStatus};
