//! Error types for the search library.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::source::SourceKey;

/// Result type alias for search operations.
pub type Result<T> = std::result::Result<T, SearchError>;

/// Opaque token identifying a class of upstream failure.
///
/// Sources attach a signature to the errors they emit ("-352", "rate-limited",
/// "auth-expired", ...). Retry policies match on these tokens verbatim and
/// never interpret them, so a source can use payload-level codes, transport
/// hints or anything else that stays stable for the same failure class.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FailureSignature(String);

impl FailureSignature {
    /// Creates a signature from a raw token.
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Returns the raw token.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for FailureSignature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for FailureSignature {
    fn from(token: &str) -> Self {
        Self::new(token)
    }
}

impl From<String> for FailureSignature {
    fn from(token: String) -> Self {
        Self(token)
    }
}

/// Errors that can occur during search operations.
#[derive(Error, Debug)]
pub enum SearchError {
    /// No enabled source has any include tags configured.
    #[error("No tags selected for any enabled source")]
    NoTagsSelected,

    /// A source failed to produce a page.
    #[error("Source '{source}' failed ({signature}): {message}")]
    Upstream {
        /// Source that failed.
        source: SourceKey,
        /// Failure class token, matched by retry policies.
        signature: FailureSignature,
        /// Human-readable detail.
        message: String,
    },

    /// A source requires credentials that are not ready.
    #[error("Credentials for '{0}' are not ready")]
    CredentialUnavailable(SourceKey),

    /// Generic error.
    #[error("{0}")]
    Other(String),
}

impl SearchError {
    /// Convenience constructor for upstream failures.
    pub fn upstream(
        source: SourceKey,
        signature: impl Into<FailureSignature>,
        message: impl Into<String>,
    ) -> Self {
        Self::Upstream {
            source,
            signature: signature.into(),
            message: message.into(),
        }
    }

    /// Returns the failure signature if this error carries one.
    pub fn signature(&self) -> Option<&FailureSignature> {
        match self {
            Self::Upstream { signature, .. } => Some(signature),
            _ => None,
        }
    }
}
