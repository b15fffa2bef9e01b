//! Response parsing contract.
//!
//! A [`ResponseParser`] turns one received page into releases. Parsers are pure:
//! no network, no shared state, so parsing the same response twice yields equal
//! results. Status and content-type guards live on [`IndexerResponse`] so every
//! adapter reports them with the same typed errors.

use serde::de::DeserializeOwned;
use tracing::warn;

use super::error::{IndexerError, Result};
use super::http::HttpResponse;
use super::request::IndexerRequest;
use super::settings::cleanse;
use super::types::ReleaseInfo;

/// A received page together with the request that produced it
#[derive(Debug, Clone)]
pub struct IndexerResponse {
    pub request: IndexerRequest,
    pub http: HttpResponse,
    content: String,
}

impl IndexerResponse {
    pub fn new(request: IndexerRequest, http: HttpResponse) -> Self {
        let content = http.text().into_owned();
        Self { request, http, content }
    }

    /// Body as text
    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn status(&self) -> u16 {
        self.http.status
    }

    /// `UnexpectedStatus` unless the status is `expected`
    pub fn ensure_status(&self, expected: u16) -> Result<()> {
        if self.http.status == expected {
            Ok(())
        } else {
            Err(IndexerError::UnexpectedStatus {
                url: cleanse(self.request.url()),
                status: self.http.status,
            })
        }
    }

    /// `UnexpectedContentType` when the declared media type does not match the
    /// request's accept hint. A response without a content type is accepted.
    pub fn ensure_content_type(&self) -> Result<()> {
        match self.http.media_type() {
            Some(actual) if !self.request.accept.accepts(&actual) => {
                Err(IndexerError::UnexpectedContentType {
                    url: cleanse(self.request.url()),
                    expected: self.request.accept.to_string(),
                    actual,
                })
            }
            _ => Ok(()),
        }
    }

    /// Status 200 with a matching content type
    pub fn ensure_success(&self) -> Result<()> {
        self.ensure_status(200)?;
        self.ensure_content_type()
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_str(self.content())?)
    }

    pub fn html(&self) -> scraper::Html {
        scraper::Html::parse_document(self.content())
    }
}

pub trait ResponseParser: Send + Sync {
    fn parse(&self, response: &IndexerResponse) -> Result<Vec<ReleaseInfo>>;
}

/// Parse rows one by one, logging and skipping rows that fail.
///
/// A page whose every row fails is reported as a `Parse` error, since that
/// usually means the site layout changed rather than one odd row.
pub fn parse_rows<T>(
    indexer: &str,
    rows: impl IntoIterator<Item = T>,
    mut parse_row: impl FnMut(T) -> Result<ReleaseInfo>,
) -> Result<Vec<ReleaseInfo>> {
    let mut releases = Vec::new();
    let mut failed = 0usize;
    let mut first_error = None;

    for (index, row) in rows.into_iter().enumerate() {
        match parse_row(row) {
            Ok(release) => releases.push(release),
            Err(e) => {
                warn!(indexer = %indexer, row = index, error = %e, "Skipping unparseable row");
                failed += 1;
                if first_error.is_none() {
                    first_error = Some(e);
                }
            }
        }
    }

    match first_error {
        Some(e) if releases.is_empty() => Err(IndexerError::parse(format!(
            "all {failed} rows failed to parse, first error: {e}"
        ))),
        _ => Ok(releases),
    }
}

/// Like [`parse_rows`] for JSON arrays whose items are typed one by one, so an
/// item with a missing or mistyped field is skipped instead of failing the page
pub fn parse_json_rows<R: DeserializeOwned>(
    indexer: &str,
    rows: Vec<serde_json::Value>,
    mut parse_row: impl FnMut(R) -> Result<ReleaseInfo>,
) -> Result<Vec<ReleaseInfo>> {
    parse_rows(indexer, rows, |value| parse_row(serde_json::from_value(value)?))
}
