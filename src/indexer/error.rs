//! Error types for the indexer pipeline.

use std::time::Duration;

use thiserror::Error;

/// Errors raised while configuring, authenticating against or searching an indexer.
///
/// Messages never carry credential values; URLs are cleansed before they are
/// stored in a variant.
#[derive(Debug, Error)]
pub enum IndexerError {
    /// Missing or invalid settings. Raised before any network call.
    #[error("Invalid configuration: {reason}")]
    Configuration { reason: String },

    /// Login was rejected, or a replayed request was still rejected after re-login.
    #[error("Authentication failed: {message}")]
    Authentication { message: String },

    /// Network-level failure (connect, TLS, timeout, body read).
    #[error("Request to {url} failed: {reason}")]
    Transport {
        url: String,
        reason: String,
        timed_out: bool,
    },

    /// The site answered with a status the adapter does not treat as success.
    #[error("Unexpected response status {status} from {url}")]
    UnexpectedStatus { url: String, status: u16 },

    /// The site answered with a content type other than the one requested.
    #[error("Unexpected response content type from {url}: expected {expected}, got {actual}")]
    UnexpectedContentType {
        url: String,
        expected: String,
        actual: String,
    },

    /// The response body did not have the expected shape.
    #[error("Failed to parse response: {reason}")]
    Parse { reason: String },

    /// The caller asked for something the indexer does not declare support for.
    #[error("{indexer} does not support {requested}")]
    CapabilityMismatch { indexer: String, requested: String },

    /// HTTP 429 or a site-reported API quota.
    #[error("Request limit reached{}", retry_suffix(.retry_after))]
    RequestLimitReached { retry_after: Option<Duration> },

    /// The release file is gone from the site (HTTP 404 on download).
    #[error("Release no longer available at {url}")]
    ReleaseUnavailable { url: String },

    /// A release download returned something other than a release file.
    #[error("Download from {url} failed: {reason}")]
    Download { url: String, reason: String },
}

impl IndexerError {
    pub fn configuration(reason: impl Into<String>) -> Self {
        Self::Configuration {
            reason: reason.into(),
        }
    }

    pub fn authentication(message: impl Into<String>) -> Self {
        Self::Authentication {
            message: message.into(),
        }
    }

    pub fn parse(reason: impl Into<String>) -> Self {
        Self::Parse {
            reason: reason.into(),
        }
    }

    pub fn capability_mismatch(indexer: impl Into<String>, requested: impl Into<String>) -> Self {
        Self::CapabilityMismatch {
            indexer: indexer.into(),
            requested: requested.into(),
        }
    }

    /// Whether the error aborts the whole search rather than a single page.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Configuration { .. } | Self::Authentication { .. } | Self::CapabilityMismatch { .. }
        )
    }

    /// Short machine-friendly category, used in logs and query records.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Configuration { .. } => "configuration",
            Self::Authentication { .. } => "authentication",
            Self::Transport { .. } => "transport",
            Self::UnexpectedStatus { .. } | Self::UnexpectedContentType { .. } => "unexpected_response",
            Self::Parse { .. } => "parse",
            Self::CapabilityMismatch { .. } => "capability_mismatch",
            Self::RequestLimitReached { .. } => "request_limit",
            Self::ReleaseUnavailable { .. } => "release_unavailable",
            Self::Download { .. } => "download",
        }
    }
}

impl From<serde_json::Error> for IndexerError {
    fn from(err: serde_json::Error) -> Self {
        Self::parse(format!("invalid JSON: {err}"))
    }
}

impl From<quick_xml::Error> for IndexerError {
    fn from(err: quick_xml::Error) -> Self {
        Self::parse(format!("invalid XML: {err}"))
    }
}

fn retry_suffix(retry_after: &Option<Duration>) -> String {
    retry_after
        .map(|d| format!(", retry after {}s", d.as_secs()))
        .unwrap_or_default()
}

pub type Result<T> = std::result::Result<T, IndexerError>;
