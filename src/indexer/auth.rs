//! Authentication strategies.
//!
//! Each adapter picks one strategy. The orchestrator calls [`AuthStrategy::apply`]
//! on every outbound request, [`AuthStrategy::login`] when no valid session
//! exists, and [`AuthStrategy::is_login_required`] on every response.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use scraper::{Html, Selector};
use tracing::{debug, info, warn};

use super::clock::Clock;
use super::error::{IndexerError, Result};
use super::http::{HttpClient, HttpRequest, HttpResponse};
use super::session::Session;
use super::settings::IndexerSettings;

/// What a login transaction needs from its indexer
pub struct AuthContext<'a> {
    pub http: &'a dyn HttpClient,
    pub settings: &'a IndexerSettings,
    pub clock: &'a dyn Clock,
    pub session_ttl: Duration,
    pub timeout: Duration,
}

#[async_trait]
pub trait AuthStrategy: Send + Sync + fmt::Debug {
    /// Whether requests need a session obtained by [`login`](Self::login)
    fn requires_session(&self) -> bool {
        false
    }

    /// Run the site's login transaction
    async fn login(&self, ctx: &AuthContext<'_>) -> Result<Session>;

    /// Whether a response shows the credentials or session were rejected
    fn is_login_required(&self, _response: &HttpResponse) -> bool {
        false
    }

    /// Attach credentials to an outbound request
    fn apply(&self, _request: &mut HttpRequest, _settings: &IndexerSettings, _session: Option<&Session>) {}
}

/// A response pattern meaning "you are not logged in"
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginMarker {
    /// Redirect whose target contains the text
    RedirectTo(&'static str),
    /// Body contains the text
    BodyContains(&'static str),
    /// Successful HTML (or untyped) response whose body lacks the text, e.g. a
    /// logout link. Files such as `.torrent` downloads never match.
    BodyMissing(&'static str),
    Status(u16),
}

impl LoginMarker {
    pub fn matches(&self, response: &HttpResponse) -> bool {
        match self {
            LoginMarker::RedirectTo(target) => {
                response.is_redirect() && response.location().is_some_and(|l| l.contains(target))
            }
            LoginMarker::BodyContains(text) => response.text().contains(text),
            LoginMarker::BodyMissing(text) => {
                (200..300).contains(&response.status)
                    && response.media_type().is_none_or(|m| m.contains("html"))
                    && !response.text().contains(text)
            }
            LoginMarker::Status(status) => response.status == *status,
        }
    }
}

/// Public sites
#[derive(Debug, Default, Clone, Copy)]
pub struct NoAuth;

#[async_trait]
impl AuthStrategy for NoAuth {
    async fn login(&self, _ctx: &AuthContext<'_>) -> Result<Session> {
        Ok(Session::default())
    }
}

/// Stateless API key sent as a query parameter on every request.
///
/// There is nothing to log in to; a rejected key surfaces as an
/// authentication error straight away.
#[derive(Debug, Clone)]
pub struct ApiKeyAuth {
    setting: &'static str,
    param: &'static str,
    rejected: Vec<LoginMarker>,
}

impl ApiKeyAuth {
    pub fn query(setting: &'static str, param: &'static str) -> Self {
        Self {
            setting,
            param,
            rejected: vec![LoginMarker::Status(401), LoginMarker::Status(403)],
        }
    }
}

#[async_trait]
impl AuthStrategy for ApiKeyAuth {
    async fn login(&self, _ctx: &AuthContext<'_>) -> Result<Session> {
        Err(IndexerError::authentication("API key rejected"))
    }

    fn is_login_required(&self, response: &HttpResponse) -> bool {
        self.rejected.iter().any(|m| m.matches(response))
    }

    fn apply(&self, request: &mut HttpRequest, settings: &IndexerSettings, _session: Option<&Session>) {
        let Some(key) = settings.get(self.setting) else {
            return;
        };
        // feed download links often embed the key already
        let present = url::Url::parse(&request.url).is_ok_and(|u| u.query_pairs().any(|(k, _)| k == self.param));
        if present {
            return;
        }
        let separator = if request.url.contains('?') { '&' } else { '?' };
        request.url = format!(
            "{}{}{}={}",
            request.url,
            separator,
            self.param,
            urlencoding::encode(key)
        );
    }
}

/// Cookies copied from a logged-in browser.
///
/// The site session cannot be renewed from here, so a rejected cookie is an
/// authentication error asking for a fresh one.
#[derive(Debug, Clone)]
pub struct CookieAuth {
    setting: &'static str,
    markers: Vec<LoginMarker>,
}

impl CookieAuth {
    pub fn new(setting: &'static str) -> Self {
        Self {
            setting,
            markers: vec![],
        }
    }

    pub fn with_marker(mut self, marker: LoginMarker) -> Self {
        self.markers.push(marker);
        self
    }
}

#[async_trait]
impl AuthStrategy for CookieAuth {
    async fn login(&self, ctx: &AuthContext<'_>) -> Result<Session> {
        let cookies = parse_cookie_string(ctx.settings.get(self.setting).unwrap_or_default());
        if cookies.is_empty() {
            return Err(IndexerError::authentication("No cookie configured"));
        }
        Err(IndexerError::authentication(
            "The cookie has expired or is invalid, update it from your browser",
        ))
    }

    fn is_login_required(&self, response: &HttpResponse) -> bool {
        self.markers.iter().any(|m| m.matches(response))
    }

    fn apply(&self, request: &mut HttpRequest, settings: &IndexerSettings, _session: Option<&Session>) {
        if let Some(raw) = settings.get(self.setting) {
            request.cookies.extend(parse_cookie_string(raw));
        }
    }
}

/// Split a raw `Cookie` header value ("a=1; b=2") into name/value pairs
pub fn parse_cookie_string(raw: &str) -> BTreeMap<String, String> {
    raw.split(';')
        .filter_map(|pair| {
            let (name, value) = pair.split_once('=')?;
            let name = name.trim();
            if name.is_empty() {
                return None;
            }
            Some((name.to_string(), value.trim().to_string()))
        })
        .collect()
}

/// Username/password form POST yielding session cookies
#[derive(Debug, Clone)]
pub struct FormLoginAuth {
    login_path: &'static str,
    username_field: &'static str,
    password_field: &'static str,
    extra_fields: Vec<(&'static str, &'static str)>,
    /// (form field, setting key)
    optional_fields: Vec<(&'static str, &'static str)>,
    fetch_login_page: bool,
    markers: Vec<LoginMarker>,
    error_selector: Option<&'static str>,
}

impl FormLoginAuth {
    pub fn new(login_path: &'static str) -> Self {
        Self {
            login_path,
            username_field: "username",
            password_field: "password",
            extra_fields: vec![],
            optional_fields: vec![],
            fetch_login_page: false,
            markers: vec![],
            error_selector: None,
        }
    }

    pub fn with_fields(mut self, username: &'static str, password: &'static str) -> Self {
        self.username_field = username;
        self.password_field = password;
        self
    }

    pub fn with_extra_field(mut self, name: &'static str, value: &'static str) -> Self {
        self.extra_fields.push((name, value));
        self
    }

    /// Send a form field (two-factor code, captcha answer) when the setting is filled in
    pub fn with_optional_field(mut self, field: &'static str, setting: &'static str) -> Self {
        self.optional_fields.push((field, setting));
        self
    }

    /// GET the login page first to pick up cookies and hidden form inputs
    pub fn with_login_page(mut self) -> Self {
        self.fetch_login_page = true;
        self
    }

    pub fn with_marker(mut self, marker: LoginMarker) -> Self {
        self.markers.push(marker);
        self
    }

    /// CSS selector for the site's login error message
    pub fn with_error_selector(mut self, selector: &'static str) -> Self {
        self.error_selector = Some(selector);
        self
    }

    fn login_error(&self, response: &HttpResponse, settings: &IndexerSettings) -> IndexerError {
        let message = self
            .error_selector
            .and_then(|s| Selector::parse(s).ok())
            .and_then(|selector| {
                let document = Html::parse_document(&response.text());
                document
                    .select(&selector)
                    .next()
                    .map(|el| el.text().collect::<String>())
            })
            .map(|text| super::parse_util::normalize_spaces(&text))
            .filter(|text| !text.is_empty())
            .unwrap_or_else(|| "Login failed".to_string());

        IndexerError::authentication(settings.redact(&message))
    }
}

#[async_trait]
impl AuthStrategy for FormLoginAuth {
    fn requires_session(&self) -> bool {
        true
    }

    async fn login(&self, ctx: &AuthContext<'_>) -> Result<Session> {
        let login_url = ctx.settings.url(self.login_path);
        let mut cookies = BTreeMap::new();
        let mut form: Vec<(String, String)> = vec![];

        if self.fetch_login_page {
            let mut request = HttpRequest::get(&login_url);
            request.allow_redirect = true;
            request.timeout = Some(ctx.timeout);
            let page = ctx.http.execute(&request).await?;
            cookies.extend(page.cookies.clone());
            form.extend(hidden_inputs(&page.text()));
            debug!(url = %login_url, hidden = form.len(), "Fetched login page");
        }

        form.push((
            self.username_field.to_string(),
            ctx.settings.require("username")?.to_string(),
        ));
        form.push((
            self.password_field.to_string(),
            ctx.settings.require("password")?.to_string(),
        ));
        for (name, value) in &self.extra_fields {
            form.push((name.to_string(), value.to_string()));
        }
        for (field, setting) in &self.optional_fields {
            if let Some(value) = ctx.settings.get(setting) {
                form.push((field.to_string(), value.to_string()));
            }
        }

        let mut request = HttpRequest::post_form(&login_url, form)
            .with_header("Referer", login_url.as_str());
        request.cookies = cookies.clone();
        request.timeout = Some(ctx.timeout);

        let response = ctx.http.execute(&request).await?;
        if self.is_login_required(&response) {
            warn!(url = %ctx.settings.redact(&login_url), status = response.status, "Login rejected");
            return Err(self.login_error(&response, ctx.settings));
        }

        cookies.extend(response.cookies.clone());
        if cookies.is_empty() {
            return Err(self.login_error(&response, ctx.settings));
        }

        let ttl = chrono::Duration::from_std(ctx.session_ttl)
            .map_err(|e| IndexerError::configuration(format!("invalid session lifetime: {e}")))?;
        info!(url = %ctx.settings.redact(&login_url), "Logged in");
        Ok(Session::new(cookies, Some(ctx.clock.now() + ttl)))
    }

    fn is_login_required(&self, response: &HttpResponse) -> bool {
        self.markers.iter().any(|m| m.matches(response))
    }

    fn apply(&self, request: &mut HttpRequest, _settings: &IndexerSettings, session: Option<&Session>) {
        if let Some(session) = session {
            request.cookies.extend(session.cookies.clone());
        }
    }
}

fn hidden_inputs(body: &str) -> Vec<(String, String)> {
    let Ok(selector) = Selector::parse("input[type=hidden][name]") else {
        return vec![];
    };
    Html::parse_document(body)
        .select(&selector)
        .filter_map(|el| {
            let name = el.value().attr("name")?;
            let value = el.value().attr("value").unwrap_or_default();
            Some((name.to_string(), value.to_string()))
        })
        .collect()
}
