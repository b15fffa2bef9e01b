//! Request generation: outbound requests, request chains and pagination.

use std::ops::RangeInclusive;

use super::criteria::{SearchCriteria, SearchType};
use super::error::Result;
use super::http::HttpRequest;

/// Response dialect the adapter expects for a request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpAccept {
    Html,
    Json,
    Rss,
    Xml,
    Any,
}

impl HttpAccept {
    pub fn header_value(&self) -> &'static str {
        match self {
            HttpAccept::Html => "text/html, application/xhtml+xml",
            HttpAccept::Json => "application/json",
            HttpAccept::Rss => "application/rss+xml, application/xml, text/xml",
            HttpAccept::Xml => "application/xml, text/xml",
            HttpAccept::Any => "*/*",
        }
    }

    /// Whether a response media type satisfies this hint
    pub fn accepts(&self, media_type: &str) -> bool {
        let media_type = media_type.to_lowercase();
        match self {
            HttpAccept::Html => media_type.contains("html"),
            HttpAccept::Json => media_type.contains("json"),
            HttpAccept::Rss | HttpAccept::Xml => media_type.contains("xml"),
            HttpAccept::Any => true,
        }
    }
}

impl std::fmt::Display for HttpAccept {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HttpAccept::Html => write!(f, "html"),
            HttpAccept::Json => write!(f, "json"),
            HttpAccept::Rss => write!(f, "rss"),
            HttpAccept::Xml => write!(f, "xml"),
            HttpAccept::Any => write!(f, "any"),
        }
    }
}

/// One concrete outbound request. Session cookies are attached by the orchestrator
/// at execution time, so a generated request never carries session state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexerRequest {
    pub http: HttpRequest,
    pub accept: HttpAccept,
    /// Summary of the criteria that produced this request
    pub source: Option<String>,
}

impl IndexerRequest {
    pub fn new(url: impl Into<String>, accept: HttpAccept) -> Self {
        Self {
            http: HttpRequest::get(url).with_header("Accept", accept.header_value()),
            accept,
            source: None,
        }
    }

    pub fn post(url: impl Into<String>, form: Vec<(String, String)>, accept: HttpAccept) -> Self {
        Self {
            http: HttpRequest::post_form(url, form).with_header("Accept", accept.header_value()),
            accept,
            source: None,
        }
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.http = self.http.with_header(name, value);
        self
    }

    pub fn with_source(mut self, criteria: &SearchCriteria) -> Self {
        self.source = Some(criteria.to_string());
        self
    }

    pub fn url(&self) -> &str {
        &self.http.url
    }
}

/// Pages of one logical query, fetched in order until a page comes back short
pub type PageableRequest = Vec<IndexerRequest>;

/// Ordered tiers of pageable requests.
///
/// Pageable requests within a tier are independent of each other. Tiers are
/// fallbacks: a later tier is only tried when every earlier tier produced no
/// releases (e.g. an IMDb id search before a title search).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestChain {
    tiers: Vec<Vec<PageableRequest>>,
}

impl Default for RequestChain {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestChain {
    pub fn new() -> Self {
        Self { tiers: vec![vec![]] }
    }

    /// Add a pageable request to the current tier. Empty page lists are ignored.
    pub fn add(&mut self, pages: impl IntoIterator<Item = IndexerRequest>) {
        let pages: PageableRequest = pages.into_iter().collect();
        if pages.is_empty() {
            return;
        }
        if let Some(tier) = self.tiers.last_mut() {
            tier.push(pages);
        }
    }

    /// Start a new fallback tier. No-op while the current tier is empty.
    pub fn add_tier(&mut self) {
        if self.tiers.last().is_some_and(|t| !t.is_empty()) {
            self.tiers.push(vec![]);
        }
    }

    /// Start a new tier holding `pages`
    pub fn add_tier_with(&mut self, pages: impl IntoIterator<Item = IndexerRequest>) {
        self.add_tier();
        self.add(pages);
    }

    /// Non-empty tiers in order
    pub fn tiers(&self) -> impl Iterator<Item = &[PageableRequest]> {
        self.tiers.iter().filter(|t| !t.is_empty()).map(Vec::as_slice)
    }

    pub fn tier_count(&self) -> usize {
        self.tiers().count()
    }

    pub fn is_empty(&self) -> bool {
        self.tier_count() == 0
    }

    pub fn request_count(&self) -> usize {
        self.tiers().flatten().map(Vec::len).sum()
    }

    /// First request of the first tier, used for connection tests
    pub fn first_request(&self) -> Option<&IndexerRequest> {
        self.tiers().next()?.first()?.first()
    }
}

/// 1-based page index for a limit/offset request: `offset / limit + 1`
pub fn page_number(limit: u32, offset: u32) -> u32 {
    if limit == 0 { 1 } else { (offset / limit).saturating_add(1) }
}

/// Site pages of `page_size` results needed to cover `limit` results from `offset`
pub fn page_span(limit: u32, offset: u32, page_size: u32) -> RangeInclusive<u32> {
    if page_size == 0 {
        return 1..=1;
    }
    let first = page_number(page_size, offset);
    let last = page_number(page_size, offset.saturating_add(limit.max(1) - 1));
    first..=last
}

/// `application/x-www-form-urlencoded` query string from ordered pairs
pub fn encode_query<K: AsRef<str>, V: AsRef<str>>(pairs: &[(K, V)]) -> String {
    url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(pairs.iter().map(|(k, v)| (k.as_ref(), v.as_ref())))
        .finish()
}

/// Builds request chains for one adapter, one entry point per search domain.
///
/// Implementations are pure: the same criteria and configuration always give the
/// same chain, and the criteria are never modified. Domains an adapter does not
/// specialise fall back to [`basic_search`](Self::basic_search).
pub trait RequestGenerator: Send + Sync {
    fn basic_search(&self, criteria: &SearchCriteria) -> Result<RequestChain>;

    fn tv_search(&self, criteria: &SearchCriteria) -> Result<RequestChain> {
        self.basic_search(criteria)
    }

    fn movie_search(&self, criteria: &SearchCriteria) -> Result<RequestChain> {
        self.basic_search(criteria)
    }

    fn music_search(&self, criteria: &SearchCriteria) -> Result<RequestChain> {
        self.basic_search(criteria)
    }

    fn book_search(&self, criteria: &SearchCriteria) -> Result<RequestChain> {
        self.basic_search(criteria)
    }

    fn search_requests(&self, criteria: &SearchCriteria) -> Result<RequestChain> {
        match criteria.search_type {
            SearchType::Search => self.basic_search(criteria),
            SearchType::TvSearch => self.tv_search(criteria),
            SearchType::MovieSearch => self.movie_search(criteria),
            SearchType::MusicSearch => self.music_search(criteria),
            SearchType::BookSearch => self.book_search(criteria),
        }
    }
}
