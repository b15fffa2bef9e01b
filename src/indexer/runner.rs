//! The orchestrator: one configured indexer instance driving a search through
//! request generation, session handling, rate limiting, execution and parsing.

use std::collections::HashSet;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use governor::{
    Quota, RateLimiter,
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use super::auth::{AuthContext, AuthStrategy};
use super::capabilities::IndexerCapabilities;
use super::clock::Clock;
use super::criteria::SearchCriteria;
use super::error::{IndexerError, Result};
use super::http::{HttpClient, HttpRequest, HttpResponse};
use super::magnet::info_hash_from_magnet;
use super::request::{HttpAccept, IndexerRequest, RequestGenerator};
use super::response::{IndexerResponse, ResponseParser};
use super::session::{Session, SessionGuard, SessionState, SessionStore};
use super::settings::{IndexerSettings, cleanse};
use super::types::{DownloadProtocol, IndexerDescriptor, ReleaseInfo};

type DirectLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// The pieces an adapter contributes to an [`HttpIndexer`]
pub struct IndexerComponents {
    pub descriptor: IndexerDescriptor,
    pub capabilities: IndexerCapabilities,
    pub generator: Box<dyn RequestGenerator>,
    pub parser: Box<dyn ResponseParser>,
    pub auth: Box<dyn AuthStrategy>,
}

/// One executed page
#[derive(Debug, Clone, Serialize)]
pub struct QueryRecord {
    /// Request URL with credentials removed
    pub url: String,
    pub status: Option<u16>,
    pub elapsed_ms: u64,
    pub releases: usize,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SearchOutcome {
    pub releases: Vec<ReleaseInfo>,
    pub queries: Vec<QueryRecord>,
}

impl SearchOutcome {
    fn empty() -> Self {
        Self::default()
    }

    /// Pages that failed without aborting the search
    pub fn failed_queries(&self) -> impl Iterator<Item = &QueryRecord> {
        self.queries.iter().filter(|q| q.error.is_some())
    }
}

/// A configured indexer instance.
///
/// Owns its session and rate limiter; searches against the same instance may
/// run concurrently and share both.
pub struct HttpIndexer {
    id: String,
    name: String,
    descriptor: IndexerDescriptor,
    capabilities: IndexerCapabilities,
    settings: IndexerSettings,
    generator: Box<dyn RequestGenerator>,
    parser: Box<dyn ResponseParser>,
    auth: Box<dyn AuthStrategy>,
    http: Arc<dyn HttpClient>,
    clock: Arc<dyn Clock>,
    session: SessionStore,
    limiter: Option<DirectLimiter>,
    request_timeout: Duration,
}

impl std::fmt::Debug for HttpIndexer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpIndexer")
            .field("id", &self.id)
            .field("kind", &self.descriptor.kind)
            .field("settings", &self.settings)
            .field("auth", &self.auth)
            .finish_non_exhaustive()
    }
}

impl HttpIndexer {
    /// Assemble an indexer. `settings` must already be resolved against the
    /// adapter's setting definitions.
    pub fn new(
        id: impl Into<String>,
        name: Option<String>,
        components: IndexerComponents,
        settings: IndexerSettings,
        http: Arc<dyn HttpClient>,
        clock: Arc<dyn Clock>,
        request_timeout: Duration,
    ) -> Result<Self> {
        components.capabilities.validate()?;

        let limiter = Quota::with_period(components.capabilities.rate_limit)
            .map(|quota| RateLimiter::direct(quota.allow_burst(NonZeroU32::MIN)));

        Ok(Self {
            id: id.into(),
            name: name.unwrap_or_else(|| components.descriptor.name.to_string()),
            descriptor: components.descriptor,
            capabilities: components.capabilities,
            settings,
            generator: components.generator,
            parser: components.parser,
            auth: components.auth,
            http,
            clock,
            session: SessionStore::new(),
            limiter,
            request_timeout,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn descriptor(&self) -> &IndexerDescriptor {
        &self.descriptor
    }

    pub fn capabilities(&self) -> &IndexerCapabilities {
        &self.capabilities
    }

    pub async fn session_state(&self) -> SessionState {
        self.session.state(self.clock.now()).await
    }

    /// Run a search.
    ///
    /// Returns the releases of every page that succeeded. Configuration,
    /// authentication and capability errors abort the search; any other page
    /// failure is recorded in [`SearchOutcome::queries`] and the search goes on.
    pub async fn search(&self, criteria: &SearchCriteria) -> Result<SearchOutcome> {
        self.run_search(criteria).await.map_err(|e| {
            let e = self.scrub(e);
            error!(indexer_id = %self.id, error = %e, "Search failed");
            e
        })
    }

    /// Fetch the first page of a latest-releases query and report any failure
    pub async fn test_connection(&self) -> Result<()> {
        let criteria = if self.capabilities.supports_rss {
            SearchCriteria::rss()
        } else {
            SearchCriteria::basic("test")
        };
        let chain = self
            .generator
            .search_requests(&criteria)
            .map_err(|e| self.scrub(e))?;
        let request = chain
            .first_request()
            .ok_or_else(|| IndexerError::configuration("no test request could be built"))?;

        let mut queries = vec![];
        match self.fetch_page(request, &mut queries).await {
            Ok(releases) => {
                info!(indexer_id = %self.id, releases = releases.len(), "Connection test passed");
                Ok(())
            }
            Err(e) => Err(self.scrub(e)),
        }
    }

    /// Fetch a release file (`.torrent` or `.nzb`) with this indexer's session,
    /// redirect policy and rate limit.
    ///
    /// Magnet links are validated and returned as their UTF-8 bytes without any
    /// request. A 404 is [`IndexerError::ReleaseUnavailable`]; a 429 means the
    /// site's grab limit was hit and is [`IndexerError::RequestLimitReached`].
    pub async fn download(&self, link: &str) -> Result<Vec<u8>> {
        self.run_download(link).await.map_err(|e| {
            let e = self.scrub(e);
            error!(indexer_id = %self.id, error = %e, "Download failed");
            e
        })
    }

    async fn run_download(&self, link: &str) -> Result<Vec<u8>> {
        if link.starts_with("magnet:") {
            return magnet_bytes(link);
        }

        let url = cleanse(link);
        let mut request = IndexerRequest::new(link, HttpAccept::Any);
        let referer = self.settings.base_url();
        if !referer.is_empty() {
            request.http = request.http.with_header("Referer", referer);
        }

        let response = match self.execute_with_auth(&request).await {
            Err(e @ IndexerError::RequestLimitReached { .. }) => {
                warn!(indexer_id = %self.id, url = %self.settings.redact(&url), "Grab limit reached");
                return Err(e);
            }
            other => other?,
        };

        let http = response.http;
        if http.is_redirect() {
            if let Some(magnet) = http.location().filter(|l| l.starts_with("magnet:")) {
                return magnet_bytes(magnet);
            }
        }
        match http.status {
            200..=299 => {}
            404 => return Err(IndexerError::ReleaseUnavailable { url }),
            status => return Err(IndexerError::UnexpectedStatus { url, status }),
        }

        self.validate_download(&url, &http.body)?;
        info!(
            indexer_id = %self.id,
            url = %self.settings.redact(&url),
            bytes = http.body.len(),
            "Downloaded release"
        );
        Ok(http.body)
    }

    /// Reject bodies that are plainly not a release file, such as a login page
    /// served with status 200
    fn validate_download(&self, url: &str, body: &[u8]) -> Result<()> {
        let head = String::from_utf8_lossy(&body[..body.len().min(256)]);
        let reason = match self.descriptor.protocol {
            DownloadProtocol::Torrent if body.first() != Some(&b'd') => Some("response is not a torrent file"),
            DownloadProtocol::Usenet if head.contains("<error") => Some("site returned an error instead of an NZB"),
            DownloadProtocol::Usenet if !head.contains("<nzb") && !head.contains("<?xml") => {
                warn!(indexer_id = %self.id, "Downloaded content does not look like an NZB");
                None
            }
            _ => None,
        };

        match reason {
            Some(reason) => Err(IndexerError::Download {
                url: url.to_string(),
                reason: reason.to_string(),
            }),
            None => Ok(()),
        }
    }

    async fn run_search(&self, criteria: &SearchCriteria) -> Result<SearchOutcome> {
        self.capabilities.check(&self.name, criteria)?;

        if criteria.offset_or_zero() > 0 && !self.capabilities.supports_pagination {
            debug!(indexer_id = %self.id, "Offset requested but indexer has no pagination");
            return Ok(SearchOutcome::empty());
        }
        if criteria.is_rss_search() && !self.capabilities.supports_rss {
            debug!(indexer_id = %self.id, "Indexer has no RSS feed");
            return Ok(SearchOutcome::empty());
        }
        if !criteria.categories.is_empty()
            && self
                .capabilities
                .categories
                .supported_categories(&criteria.categories)
                .is_empty()
        {
            debug!(indexer_id = %self.id, categories = ?criteria.categories, "No requested category is supported");
            return Ok(SearchOutcome::empty());
        }

        let capped;
        let criteria = match criteria.limit {
            Some(limit) if limit > self.capabilities.limits_max => {
                debug!(indexer_id = %self.id, requested = limit, max = self.capabilities.limits_max, "Capping result limit");
                capped = SearchCriteria {
                    limit: Some(self.capabilities.limits_max),
                    ..criteria.clone()
                };
                &capped
            }
            _ => criteria,
        };

        let chain = self.generator.search_requests(criteria)?;
        debug!(
            indexer_id = %self.id,
            criteria = %criteria,
            tiers = chain.tier_count(),
            requests = chain.request_count(),
            "Built request chain"
        );

        let page_size = self.capabilities.page_size as usize;
        let mut releases = Vec::new();
        let mut queries = Vec::new();

        for tier in chain.tiers() {
            let before = releases.len();

            for pageable in tier {
                for request in pageable {
                    match self.fetch_page(request, &mut queries).await {
                        Ok(page) => {
                            let full = page_size > 0 && page.len() >= page_size;
                            releases.extend(page);
                            if !full {
                                break;
                            }
                        }
                        Err(e) if e.is_fatal() => return Err(e),
                        Err(e) => {
                            warn!(
                                indexer_id = %self.id,
                                url = %self.settings.redact(request.url()),
                                error = %self.settings.redact(&e.to_string()),
                                "Page failed"
                            );
                            break;
                        }
                    }
                }
            }

            if releases.len() > before {
                break;
            }
        }

        let releases = self.cleanup(releases);
        info!(indexer_id = %self.id, releases = releases.len(), pages = queries.len(), "Search complete");
        Ok(SearchOutcome { releases, queries })
    }

    async fn fetch_page(
        &self,
        request: &IndexerRequest,
        queries: &mut Vec<QueryRecord>,
    ) -> Result<Vec<ReleaseInfo>> {
        let started = Instant::now();
        let response = self.execute_with_auth(request).await;
        let status = response.as_ref().ok().map(IndexerResponse::status);
        let parsed = response.and_then(|r| self.parser.parse(&r));

        queries.push(QueryRecord {
            url: self.settings.redact(request.url()),
            status,
            elapsed_ms: started.elapsed().as_millis() as u64,
            releases: parsed.as_ref().map_or(0, Vec::len),
            error: parsed
                .as_ref()
                .err()
                .map(|e| self.settings.redact(&e.to_string())),
        });

        parsed
    }

    /// Execute a request, logging in again and replaying it once when the site
    /// says the session was rejected.
    async fn execute_with_auth(&self, request: &IndexerRequest) -> Result<IndexerResponse> {
        let session = self.ensure_session().await?;
        let response = self.execute(request, session.as_ref()).await?;
        if !self.auth.is_login_required(&response.http) {
            self.refresh_session(&response.http).await;
            return Ok(response);
        }

        info!(indexer_id = %self.id, "Site requires login, logging in again");
        let session = self.relogin(session.as_ref()).await?;
        let response = self.execute(request, session.as_ref()).await?;
        if self.auth.is_login_required(&response.http) {
            self.session.invalidate().await;
            return Err(IndexerError::authentication(
                "site still requires login after logging in again",
            ));
        }

        self.refresh_session(&response.http).await;
        Ok(response)
    }

    async fn execute(&self, request: &IndexerRequest, session: Option<&Session>) -> Result<IndexerResponse> {
        let mut http = request.http.clone();
        http.allow_redirect |= self.capabilities.follow_redirect;
        http.timeout.get_or_insert(self.request_timeout);
        self.auth.apply(&mut http, &self.settings, session);

        let response = self.throttled().execute(&http).await?;
        debug!(
            indexer_id = %self.id,
            url = %self.settings.redact(request.url()),
            status = response.status,
            bytes = response.body.len(),
            "Received response"
        );

        if response.status == 429 {
            let retry_after = response
                .header("retry-after")
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map(Duration::from_secs);
            return Err(IndexerError::RequestLimitReached { retry_after });
        }

        Ok(IndexerResponse::new(request.clone(), response))
    }

    /// The current session, logging in first when there is none or it lapsed
    async fn ensure_session(&self) -> Result<Option<Session>> {
        if !self.auth.requires_session() {
            return Ok(None);
        }

        let mut guard = self.session.lock().await;
        if let Some(session) = guard.load(self.clock.now()) {
            return Ok(Some(session.clone()));
        }
        self.login(&mut guard).await.map(Some)
    }

    async fn relogin(&self, stale: Option<&Session>) -> Result<Option<Session>> {
        let mut guard = self.session.lock().await;

        // Another search may have logged in while this one waited for the lock
        if let (Some(current), Some(stale)) = (guard.load(self.clock.now()), stale) {
            if current != stale {
                return Ok(Some(current.clone()));
            }
        }

        guard.invalidate();
        let session = self.login(&mut guard).await?;
        Ok(self.auth.requires_session().then_some(session))
    }

    async fn login(&self, guard: &mut SessionGuard<'_>) -> Result<Session> {
        guard.begin_login();
        let throttled = self.throttled();
        let ctx = AuthContext {
            http: &throttled,
            settings: &self.settings,
            clock: self.clock.as_ref(),
            session_ttl: self.descriptor.session_ttl,
            timeout: self.request_timeout,
        };

        match self.auth.login(&ctx).await {
            Ok(session) => {
                guard.save(session.clone());
                Ok(session)
            }
            Err(e) => {
                guard.fail_login();
                Err(e)
            }
        }
    }

    async fn refresh_session(&self, response: &HttpResponse) {
        if self.auth.requires_session() && !response.cookies.is_empty() {
            self.session
                .lock()
                .await
                .refresh_cookies(self.clock.now(), &response.cookies);
        }
    }

    fn throttled(&self) -> Throttled<'_> {
        Throttled {
            http: self.http.as_ref(),
            limiter: self.limiter.as_ref(),
        }
    }

    /// Dedup by guid, stamp the indexer identity and apply site-wide policy
    fn cleanup(&self, releases: Vec<ReleaseInfo>) -> Vec<ReleaseInfo> {
        let policy = self.descriptor.seed_policy;
        let mut seen = HashSet::new();

        releases
            .into_iter()
            .filter(|r| seen.insert(r.guid.clone()))
            .map(|mut release| {
                release.indexer_id = Some(self.id.clone());
                release.indexer_name = Some(self.name.clone());
                release.protocol = self.descriptor.protocol;
                if self.descriptor.ratioless {
                    release.download_volume_factor = 0.0;
                }
                if release.minimum_ratio.is_none() {
                    release.minimum_ratio = policy.minimum_ratio;
                }
                if release.minimum_seed_time.is_none() {
                    release.minimum_seed_time = policy.minimum_seed_time;
                }
                release
            })
            .collect()
    }

    /// Remove this instance's secret setting values from an error
    fn scrub(&self, err: IndexerError) -> IndexerError {
        let r = |text: String| self.settings.redact(&text);
        match err {
            IndexerError::Configuration { reason } => IndexerError::Configuration { reason: r(reason) },
            IndexerError::Authentication { message } => {
                IndexerError::Authentication { message: r(message) }
            }
            IndexerError::Transport {
                url,
                reason,
                timed_out,
            } => IndexerError::Transport {
                url: r(url),
                reason: r(reason),
                timed_out,
            },
            IndexerError::UnexpectedStatus { url, status } => {
                IndexerError::UnexpectedStatus { url: r(url), status }
            }
            IndexerError::UnexpectedContentType {
                url,
                expected,
                actual,
            } => IndexerError::UnexpectedContentType {
                url: r(url),
                expected,
                actual,
            },
            IndexerError::Parse { reason } => IndexerError::Parse { reason: r(reason) },
            IndexerError::ReleaseUnavailable { url } => IndexerError::ReleaseUnavailable { url: r(url) },
            IndexerError::Download { url, reason } => IndexerError::Download {
                url: r(url),
                reason: r(reason),
            },
            other => other,
        }
    }
}

fn magnet_bytes(link: &str) -> Result<Vec<u8>> {
    match info_hash_from_magnet(link) {
        Some(_) => Ok(link.as_bytes().to_vec()),
        None => Err(IndexerError::Download {
            url: cleanse(link),
            reason: "invalid magnet link".to_string(),
        }),
    }
}

/// Applies the indexer's rate limit in front of the shared transport
struct Throttled<'a> {
    http: &'a dyn HttpClient,
    limiter: Option<&'a DirectLimiter>,
}

#[async_trait]
impl HttpClient for Throttled<'_> {
    async fn execute(&self, request: &HttpRequest) -> Result<HttpResponse> {
        if let Some(limiter) = self.limiter {
            limiter.until_ready().await;
        }
        self.http.execute(request).await
    }
}
