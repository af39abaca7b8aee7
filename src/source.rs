//! Source catalog and the per-source fetch seam.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{PageRequest, Result, RetryPolicy, SearchError, SourcePage};

/// Identifier of a known story source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKey {
    /// Archive of Our Own.
    Ao3,
    /// Pixiv novels.
    Pixiv,
    /// Lofter posts.
    Lofter,
    /// Bilibili articles.
    Bilibili,
}

impl SourceKey {
    /// Every known source, in catalog order.
    pub fn all() -> [SourceKey; 4] {
        [Self::Ao3, Self::Pixiv, Self::Lofter, Self::Bilibili]
    }

    /// Returns the wire token for this source.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ao3 => "ao3",
            Self::Pixiv => "pixiv",
            Self::Lofter => "lofter",
            Self::Bilibili => "bilibili",
        }
    }
}

impl std::fmt::Display for SourceKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::error::Error for SourceKey {}

impl std::str::FromStr for SourceKey {
    type Err = SearchError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "ao3" => Ok(Self::Ao3),
            "pixiv" => Ok(Self::Pixiv),
            "lofter" => Ok(Self::Lofter),
            "bilibili" => Ok(Self::Bilibili),
            other => Err(SearchError::Other(format!("unknown source: {}", other))),
        }
    }
}

/// Catalog entry for a source. Built at startup, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceProfile {
    /// Source identifier.
    pub key: SourceKey,
    /// Human-readable name.
    pub name: String,
    /// Whether the source needs stored credentials before it can be used.
    pub requires_credential: bool,
    /// Retry behavior for this source's fetches.
    pub retry: RetryPolicy,
}

/// Returns the catalog of known sources, in stable order.
pub fn catalog() -> Vec<SourceProfile> {
    SourceKey::all().into_iter().map(profile).collect()
}

/// Returns the catalog entry for a source.
///
/// Bilibili's unofficial API intermittently rejects requests with
/// payload-level risk-control codes that clear on their own, so its profile
/// carries a retrying policy. The other sources fail terminally on the
/// first error.
pub fn profile(key: SourceKey) -> SourceProfile {
    match key {
        SourceKey::Ao3 => SourceProfile {
            key,
            name: "Archive of Our Own".to_string(),
            requires_credential: false,
            retry: RetryPolicy::none(),
        },
        SourceKey::Pixiv => SourceProfile {
            key,
            name: "Pixiv".to_string(),
            requires_credential: true,
            retry: RetryPolicy::none(),
        },
        SourceKey::Lofter => SourceProfile {
            key,
            name: "Lofter".to_string(),
            requires_credential: true,
            retry: RetryPolicy::none(),
        },
        SourceKey::Bilibili => SourceProfile {
            key,
            name: "Bilibili".to_string(),
            requires_credential: false,
            retry: RetryPolicy::new(3).with_signatures(vec!["-352", "-401", "-412"]),
        },
    }
}

/// Returns whether a source needs stored credentials.
pub fn requires_credential(key: SourceKey) -> bool {
    profile(key).requires_credential
}

/// Trait for implementing story sources.
///
/// An adapter fetches one page of results for its source. Transport,
/// parsing and credential storage are the adapter's concern; the engine
/// only sees pages and errors. Errors should carry a [`FailureSignature`]
/// matching the source's retry policy when the failure is transient.
///
/// [`FailureSignature`]: crate::FailureSignature
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Returns the source this adapter serves.
    fn key(&self) -> SourceKey;

    /// Fetches one page of results.
    async fn fetch_page(&self, request: &PageRequest) -> Result<SourcePage>;
}
