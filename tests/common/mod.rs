//! Shared fakes for the integration tests: a scripted transport and a small
//! JSON site adapter with a counting login.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use parking_lot::Mutex;
use serde::Deserialize;

use indexarr::indexer::auth::{AuthContext, AuthStrategy};
use indexarr::indexer::capabilities::{MovieSearchParam, TvSearchParam};
use indexarr::indexer::http::HttpMethod;
use indexarr::indexer::request::{HttpAccept, encode_query, page_span};
use indexarr::indexer::response::parse_rows;
use indexarr::indexer::session::Session;
use indexarr::indexer::types::SeedPolicy;
use indexarr::indexer::{
    CategoryMap, DownloadProtocol, FixedClock, HttpClient, HttpIndexer, HttpRequest, HttpResponse,
    IndexerCapabilities, IndexerComponents, IndexerDescriptor, IndexerError, IndexerPrivacy,
    IndexerRequest, IndexerResponse, IndexerSettings, ReleaseInfo, RequestChain, RequestGenerator,
    ResponseParser, Result, SearchCriteria, cats,
};

pub const BASE_URL: &str = "https://site.test";

type Responder = dyn Fn(&HttpRequest, usize) -> Result<HttpResponse> + Send + Sync;

/// Transport answering from a closure, recording everything it was sent.
/// The closure gets the request and how many search (non-login) requests came before it.
pub struct FakeHttp {
    sent: Mutex<Vec<HttpRequest>>,
    responder: Box<Responder>,
}

impl FakeHttp {
    pub fn new(responder: impl Fn(&HttpRequest, usize) -> Result<HttpResponse> + Send + Sync + 'static) -> Arc<Self> {
        Arc::new(Self {
            sent: Mutex::new(vec![]),
            responder: Box::new(responder),
        })
    }

    /// Answer every request with the same JSON body
    pub fn json(body: impl Into<String>) -> Arc<Self> {
        let body = body.into();
        Self::new(move |request, _| Ok(json_response(&request.url, 200, &body)))
    }

    pub fn sent(&self) -> Vec<HttpRequest> {
        self.sent.lock().clone()
    }

    pub fn sent_urls(&self) -> Vec<String> {
        self.sent.lock().iter().map(|r| r.url.clone()).collect()
    }

    pub fn search_requests(&self) -> Vec<HttpRequest> {
        self.sent
            .lock()
            .iter()
            .filter(|r| r.method == HttpMethod::Get)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl HttpClient for FakeHttp {
    async fn execute(&self, request: &HttpRequest) -> Result<HttpResponse> {
        let previous = {
            let mut sent = self.sent.lock();
            let previous = sent.iter().filter(|r| r.method == HttpMethod::Get).count();
            sent.push(request.clone());
            previous
        };
        (self.responder)(request, previous)
    }
}

pub fn json_response(url: &str, status: u16, body: &str) -> HttpResponse {
    HttpResponse::new(url, status, body).with_header("content-type", "application/json")
}

/// `count` well-formed items whose guids start with `prefix`
pub fn items(prefix: &str, count: usize) -> String {
    let rows: Vec<String> = (0..count)
        .map(|i| {
            format!(
                r#"{{"title":"{prefix} {i}","guid":"{prefix}-{i}","seeders":10,"leechers":2,"size":1000,"time":1717200000}}"#
            )
        })
        .collect();
    format!("[{}]", rows.join(","))
}

pub fn descriptor() -> IndexerDescriptor {
    IndexerDescriptor {
        kind: "testsite",
        name: "Test Site",
        description: "JSON test tracker",
        language: "en-US",
        privacy: IndexerPrivacy::Private,
        protocol: DownloadProtocol::Torrent,
        links: &[BASE_URL],
        ratioless: false,
        seed_policy: SeedPolicy {
            minimum_ratio: Some(1.0),
            minimum_seed_time: Some(259_200),
        },
        session_ttl: Duration::from_secs(3600),
    }
}

pub fn category_map() -> CategoryMap {
    CategoryMap::new()
        .with("1", cats::MOVIES, "Movies")
        .with("2", cats::TV, "TV")
}

pub fn capabilities() -> IndexerCapabilities {
    IndexerCapabilities {
        limits_max: 100,
        limits_default: 2,
        supports_rss: true,
        tv_search_params: vec![TvSearchParam::Q, TvSearchParam::Season, TvSearchParam::Ep, TvSearchParam::ImdbId],
        movie_search_params: vec![MovieSearchParam::Q, MovieSearchParam::ImdbId],
        supports_pagination: true,
        page_size: 2,
        rate_limit: Duration::ZERO,
        categories: category_map(),
        ..IndexerCapabilities::new()
    }
}

/// Builds `/api?q=..&cat=..&page=N` pages; an IMDb id search gets a title fallback tier
pub struct SiteGenerator {
    pub categories: CategoryMap,
    pub limits_default: u32,
    pub page_size: u32,
}

impl SiteGenerator {
    pub fn new() -> Self {
        let caps = capabilities();
        Self {
            categories: caps.categories,
            limits_default: caps.limits_default,
            page_size: caps.page_size,
        }
    }

    fn pages(&self, criteria: &SearchCriteria, query: &[(&str, String)]) -> Vec<IndexerRequest> {
        let mut params: Vec<(&str, String)> = query.to_vec();
        if let Some(natives) = self.categories.native_filter(&criteria.categories) {
            params.push(("cat", natives.join(",")));
        }

        let limit = criteria.limit.unwrap_or(self.limits_default);
        page_span(limit, criteria.offset_or_zero(), self.page_size)
            .map(|page| {
                let mut params = params.clone();
                params.push(("page", page.to_string()));
                IndexerRequest::new(format!("{BASE_URL}/api?{}", encode_query(&params)), HttpAccept::Json)
                    .with_source(criteria)
            })
            .collect()
    }
}

impl RequestGenerator for SiteGenerator {
    fn basic_search(&self, criteria: &SearchCriteria) -> Result<RequestChain> {
        let mut chain = RequestChain::new();
        if let Some(imdb) = criteria.full_imdb_id() {
            chain.add(self.pages(criteria, &[("imdb", imdb)]));
            chain.add_tier();
        }
        chain.add(self.pages(criteria, &[("q", criteria.sanitized_tv_search_string())]));
        Ok(chain)
    }
}

/// Returns the same fixed tiers for every query
pub struct ScriptedGenerator {
    pub tiers: Vec<Vec<Vec<&'static str>>>,
}

impl RequestGenerator for ScriptedGenerator {
    fn basic_search(&self, criteria: &SearchCriteria) -> Result<RequestChain> {
        let mut chain = RequestChain::new();
        for tier in &self.tiers {
            chain.add_tier();
            for pageable in tier {
                chain.add(pageable.iter().map(|path| {
                    IndexerRequest::new(format!("{BASE_URL}{path}"), HttpAccept::Json).with_source(criteria)
                }));
            }
        }
        Ok(chain)
    }
}

#[derive(Deserialize)]
struct Item {
    title: Option<String>,
    guid: String,
    seeders: Option<u32>,
    leechers: Option<u32>,
    size: Option<u64>,
    time: i64,
}

pub struct SiteParser;

impl ResponseParser for SiteParser {
    fn parse(&self, response: &IndexerResponse) -> Result<Vec<ReleaseInfo>> {
        response.ensure_status(200)?;
        response.ensure_content_type()?;

        let items: Vec<Item> = response.json()?;
        parse_rows("testsite", items, |item| {
            let title = item.title.ok_or_else(|| IndexerError::parse("item without title"))?;
            let date = Utc
                .timestamp_opt(item.time, 0)
                .single()
                .ok_or_else(|| IndexerError::parse("bad time"))?;
            let mut release = ReleaseInfo::new(title, item.guid, date)
                .with_swarm(item.seeders.unwrap_or(0), item.leechers.unwrap_or(0));
            release.size = item.size;
            release.categories = vec![cats::MOVIES];
            Ok(release)
        })
    }
}

/// Session login that counts its calls; a 401 means the session was rejected
#[derive(Debug, Default)]
pub struct CountingAuth {
    logins: Arc<AtomicUsize>,
}

impl CountingAuth {
    pub fn new() -> (Self, Arc<AtomicUsize>) {
        let logins = Arc::new(AtomicUsize::new(0));
        (Self { logins: logins.clone() }, logins)
    }
}

#[async_trait]
impl AuthStrategy for CountingAuth {
    fn requires_session(&self) -> bool {
        true
    }

    async fn login(&self, ctx: &AuthContext<'_>) -> Result<Session> {
        let n = self.logins.fetch_add(1, Ordering::SeqCst) + 1;
        let form = vec![
            ("username".to_string(), ctx.settings.require("username")?.to_string()),
            ("password".to_string(), ctx.settings.require("password")?.to_string()),
        ];
        ctx.http
            .execute(&HttpRequest::post_form(format!("{BASE_URL}/login"), form))
            .await?;

        let cookies = [("sid".to_string(), n.to_string())].into_iter().collect();
        let expires = ctx.clock.now() + chrono::Duration::from_std(ctx.session_ttl).unwrap_or_default();
        Ok(Session::new(cookies, Some(expires)))
    }

    fn is_login_required(&self, response: &HttpResponse) -> bool {
        response.status == 401
    }

    fn apply(&self, request: &mut HttpRequest, _settings: &IndexerSettings, session: Option<&Session>) {
        if let Some(session) = session {
            request.cookies.extend(session.cookies.clone());
        }
    }
}

pub fn settings() -> IndexerSettings {
    IndexerSettings::new()
        .with_base_url(BASE_URL)
        .with("username", "alice")
        .with("password", "hunter2")
}

pub fn clock() -> Arc<FixedClock> {
    Arc::new(FixedClock::new(Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()))
}

pub struct Site {
    pub indexer: HttpIndexer,
    pub http: Arc<FakeHttp>,
    pub clock: Arc<FixedClock>,
    pub logins: Arc<AtomicUsize>,
}

impl Site {
    pub fn logins(&self) -> usize {
        self.logins.load(Ordering::SeqCst)
    }
}

/// The test site with its default generator, parser and counting login
pub fn site(http: Arc<FakeHttp>) -> Site {
    site_with(http, Box::new(SiteGenerator::new()), capabilities(), descriptor())
}

pub fn site_with(
    http: Arc<FakeHttp>,
    generator: Box<dyn RequestGenerator>,
    capabilities: IndexerCapabilities,
    descriptor: IndexerDescriptor,
) -> Site {
    site_named("testsite", http, generator, capabilities, descriptor)
}

pub fn site_named(
    id: &str,
    http: Arc<FakeHttp>,
    generator: Box<dyn RequestGenerator>,
    capabilities: IndexerCapabilities,
    descriptor: IndexerDescriptor,
) -> Site {
    let (auth, logins) = CountingAuth::new();
    let components = IndexerComponents {
        descriptor,
        capabilities,
        generator,
        parser: Box::new(SiteParser),
        auth: Box::new(auth),
    };
    let clock = clock();
    let indexer = HttpIndexer::new(
        id,
        None,
        components,
        settings(),
        http.clone(),
        clock.clone(),
        Duration::from_secs(5),
    )
    .unwrap();
    Site {
        indexer,
        http,
        clock,
        logins,
    }
}
