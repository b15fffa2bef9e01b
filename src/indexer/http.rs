//! HTTP transport seam.
//!
//! The orchestrator talks to sites through [`HttpClient`] so tests can swap in a
//! scripted transport. [`ReqwestHttpClient`] is the production implementation.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, header, redirect};
use tracing::debug;

use super::error::{IndexerError, Result};
use super::settings::cleanse;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

/// A fully specified outbound request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: Vec<(String, String)>,
    /// Form-encoded body; implies `POST`
    pub form: Option<Vec<(String, String)>>,
    pub cookies: BTreeMap<String, String>,
    pub allow_redirect: bool,
    pub timeout: Option<Duration>,
}

impl HttpRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: HttpMethod::Get,
            url: url.into(),
            headers: vec![],
            form: None,
            cookies: BTreeMap::new(),
            allow_redirect: false,
            timeout: None,
        }
    }

    pub fn post_form(url: impl Into<String>, fields: Vec<(String, String)>) -> Self {
        Self {
            method: HttpMethod::Post,
            form: Some(fields),
            ..Self::get(url)
        }
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((name.to_string(), value.into()));
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// `Cookie` header value for the attached cookies
    pub fn cookie_header(&self) -> Option<String> {
        if self.cookies.is_empty() {
            return None;
        }
        Some(
            self.cookies
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect::<Vec<_>>()
                .join("; "),
        )
    }
}

/// A received response with the body fully read
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// URL that was requested
    pub url: String,
    pub status: u16,
    /// Header names are lowercase
    pub headers: Vec<(String, String)>,
    /// Cookies set by the response
    pub cookies: BTreeMap<String, String>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn new(url: impl Into<String>, status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            url: url.into(),
            status,
            headers: vec![],
            cookies: BTreeMap::new(),
            body: body.into(),
        }
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((name.to_lowercase(), value.into()));
        self
    }

    pub fn with_cookie(mut self, name: &str, value: &str) -> Self {
        self.cookies.insert(name.to_string(), value.to_string());
        self
    }

    /// Body decoded as UTF-8, with invalid sequences replaced
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        let name = name.to_lowercase();
        self.headers
            .iter()
            .find(|(k, _)| *k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Media type without parameters, lowercased ("application/json")
    pub fn media_type(&self) -> Option<String> {
        self.header("content-type")
            .and_then(|ct| ct.split(';').next())
            .map(|ct| ct.trim().to_lowercase())
    }

    pub fn is_redirect(&self) -> bool {
        (300..400).contains(&self.status)
    }

    pub fn location(&self) -> Option<&str> {
        self.header("location")
    }
}

/// Executes requests. Retries, proxies and TLS are the implementation's concern.
#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn execute(&self, request: &HttpRequest) -> Result<HttpResponse>;
}

/// reqwest-backed transport with connection pooling shared across indexers
#[derive(Debug, Clone)]
pub struct ReqwestHttpClient {
    follow: Client,
    no_follow: Client,
    default_timeout: Duration,
}

impl ReqwestHttpClient {
    pub fn new(user_agent: &str, default_timeout: Duration) -> Result<Self> {
        let build = |policy: redirect::Policy| {
            Client::builder()
                .user_agent(user_agent)
                .gzip(true)
                .deflate(true)
                .redirect(policy)
                .build()
                .map_err(|e| IndexerError::configuration(format!("failed to build HTTP client: {e}")))
        };

        Ok(Self {
            follow: build(redirect::Policy::limited(5))?,
            no_follow: build(redirect::Policy::none())?,
            default_timeout,
        })
    }

    fn transport_error(url: &str, err: reqwest::Error) -> IndexerError {
        IndexerError::Transport {
            url: cleanse(url),
            timed_out: err.is_timeout(),
            reason: err.without_url().to_string(),
        }
    }
}

fn parse_set_cookie(value: &str) -> Option<(String, String)> {
    let pair = value.split(';').next()?;
    let (name, value) = pair.split_once('=')?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    Some((name.to_string(), value.trim().to_string()))
}

#[async_trait]
impl HttpClient for ReqwestHttpClient {
    async fn execute(&self, request: &HttpRequest) -> Result<HttpResponse> {
        let client = if request.allow_redirect {
            &self.follow
        } else {
            &self.no_follow
        };

        let mut builder = match request.method {
            HttpMethod::Get => client.get(&request.url),
            HttpMethod::Post => client.post(&request.url),
        }
        .timeout(request.timeout.unwrap_or(self.default_timeout));

        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(cookie) = request.cookie_header() {
            builder = builder.header(header::COOKIE, cookie);
        }
        if let Some(form) = &request.form {
            builder = builder.form(form);
        }

        debug!(method = ?request.method, url = %cleanse(&request.url), "Sending request");

        let response = builder
            .send()
            .await
            .map_err(|e| Self::transport_error(&request.url, e))?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(k, v)| Some((k.as_str().to_lowercase(), v.to_str().ok()?.to_string())))
            .collect();
        let cookies = response
            .headers()
            .get_all(header::SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .filter_map(parse_set_cookie)
            .collect();

        let body = response
            .bytes()
            .await
            .map_err(|e| Self::transport_error(&request.url, e))?
            .to_vec();

        Ok(HttpResponse {
            url: request.url.clone(),
            status,
            headers,
            cookies,
            body,
        })
    }
}
