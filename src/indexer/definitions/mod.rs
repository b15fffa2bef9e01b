//! Indexer definitions and implementations
//!
//! Each adapter module exposes the same four items:
//! - `SETTINGS`: the options it recognises
//! - `descriptor()`: static facts (kind, privacy, protocol, mirrors, seed policy)
//! - `capabilities()`: search modes, categories, paging and rate limit
//! - `components(..)`: its request generator, response parser and auth strategy
//!
//! # Adding a new indexer
//!
//! 1. Create a new file in this directory (e.g., `myindexer.rs`)
//! 2. Implement `RequestGenerator` and `ResponseParser`, pick an `AuthStrategy`
//! 3. Add it to `AVAILABLE_INDEXERS` and to the match in [`create_indexer`]

pub mod gazelle;
pub mod iptorrents;
pub mod newznab;
pub mod torrentscsv;
pub mod unit3d;

use std::sync::Arc;
use std::time::Duration;

use once_cell::sync::Lazy;
use serde::Serialize;
use tracing::debug;

use crate::config::IndexerConfig;

use super::clock::Clock;
use super::error::{IndexerError, Result};
use super::http::HttpClient;
use super::runner::{HttpIndexer, IndexerComponents};
use super::settings::{IndexerSettings, SettingDefinition};
use super::types::{DownloadProtocol, IndexerDescriptor, IndexerPrivacy};

/// Information about an available indexer type
#[derive(Debug, Clone, Serialize)]
pub struct IndexerTypeInfo {
    /// Unique identifier for this indexer type (e.g., "iptorrents")
    pub kind: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub language: &'static str,
    pub privacy: IndexerPrivacy,
    pub protocol: DownloadProtocol,
    /// Known mirrors; empty when the user must supply a base URL
    pub links: &'static [&'static str],
    pub settings: &'static [SettingDefinition],
}

impl IndexerTypeInfo {
    fn new(descriptor: IndexerDescriptor, settings: &'static [SettingDefinition]) -> Self {
        Self {
            kind: descriptor.kind,
            name: descriptor.name,
            description: descriptor.description,
            language: descriptor.language,
            privacy: descriptor.privacy,
            protocol: descriptor.protocol,
            links: descriptor.links,
            settings,
        }
    }
}

/// List of all available indexer types
pub static AVAILABLE_INDEXERS: Lazy<Vec<IndexerTypeInfo>> = Lazy::new(|| {
    vec![
        IndexerTypeInfo::new(gazelle::descriptor(), gazelle::SETTINGS),
        IndexerTypeInfo::new(iptorrents::descriptor(), iptorrents::SETTINGS),
        IndexerTypeInfo::new(newznab::descriptor(), newznab::SETTINGS),
        IndexerTypeInfo::new(torrentscsv::descriptor(), torrentscsv::SETTINGS),
        IndexerTypeInfo::new(unit3d::descriptor(), unit3d::SETTINGS),
    ]
});

/// Get information about all available indexer types
pub fn available_indexers() -> &'static [IndexerTypeInfo] {
    &AVAILABLE_INDEXERS
}

/// Get information about a specific indexer type
pub fn get_indexer_info(kind: &str) -> Option<&'static IndexerTypeInfo> {
    AVAILABLE_INDEXERS.iter().find(|i| i.kind.eq_ignore_ascii_case(kind))
}

/// Build a ready-to-search indexer from its configuration.
///
/// Settings are checked against the adapter's declarations first, so a bad
/// configuration fails here with a `Configuration` error and no request is made.
pub fn create_indexer(
    config: &IndexerConfig,
    http: Arc<dyn HttpClient>,
    clock: Arc<dyn Clock>,
    request_timeout: Duration,
) -> Result<HttpIndexer> {
    let info = get_indexer_info(&config.kind)
        .ok_or_else(|| IndexerError::configuration(format!("unknown indexer kind '{}'", config.kind)))?;

    let settings = config.indexer_settings().resolve(info.settings, info.links)?;
    debug!(indexer_id = %config.id, kind = %info.kind, settings = ?settings, "Creating indexer");

    let components = components_for(info.kind, &settings, clock.clone())?;
    HttpIndexer::new(
        config.id.clone(),
        config.name.clone(),
        components,
        settings,
        http,
        clock,
        request_timeout,
    )
}

fn components_for(kind: &str, settings: &IndexerSettings, clock: Arc<dyn Clock>) -> Result<IndexerComponents> {
    match kind {
        "gazelle" => gazelle::components(settings),
        "iptorrents" => iptorrents::components(settings, clock),
        "newznab" => newznab::components(settings),
        "torrentscsv" => torrentscsv::components(settings),
        "unit3d" => unit3d::components(settings),
        other => Err(IndexerError::configuration(format!("unknown indexer kind '{other}'"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indexer::clock::SystemClock;
    use crate::indexer::http::{HttpRequest, HttpResponse};
    use assert_matches::assert_matches;
    use async_trait::async_trait;
    use std::collections::BTreeMap;

    #[derive(Debug)]
    struct Offline;

    #[async_trait]
    impl HttpClient for Offline {
        async fn execute(&self, request: &HttpRequest) -> Result<HttpResponse> {
            Err(IndexerError::Transport {
                url: request.url.clone(),
                reason: "offline".into(),
                timed_out: false,
            })
        }
    }

    fn config(kind: &str, base_url: Option<&str>, settings: &[(&str, &str)]) -> IndexerConfig {
        IndexerConfig {
            id: format!("{kind}-test"),
            kind: kind.to_string(),
            name: None,
            enabled: true,
            base_url: base_url.map(str::to_string),
            settings: settings
                .iter()
                .map(|(k, v)| (k.to_string(), serde_yaml::Value::String(v.to_string())))
                .collect::<BTreeMap<_, _>>(),
        }
    }

    fn create(config: &IndexerConfig) -> Result<HttpIndexer> {
        create_indexer(config, Arc::new(Offline), Arc::new(SystemClock), Duration::from_secs(5))
    }

    #[test]
    fn test_every_kind_is_listed_once() {
        let kinds: Vec<_> = available_indexers().iter().map(|i| i.kind).collect();
        assert_eq!(kinds, vec!["gazelle", "iptorrents", "newznab", "torrentscsv", "unit3d"]);
        assert!(get_indexer_info("IPTorrents").is_some());
        assert!(get_indexer_info("cardigann").is_none());
    }

    #[test]
    fn test_create_public_indexer_with_default_link() {
        let indexer = create(&config("torrentscsv", None, &[])).unwrap();
        assert_eq!(indexer.id(), "torrentscsv-test");
        assert_eq!(indexer.name(), "TorrentsCSV");
    }

    #[test]
    fn test_missing_required_setting_fails_before_any_request() {
        let result = create(&config("unit3d", Some("https://tracker.example/"), &[]));
        assert_matches!(result, Err(IndexerError::Configuration { .. }));
    }

    #[test]
    fn test_base_url_required_without_known_links() {
        let result = create(&config("gazelle", None, &[("username", "u"), ("password", "p")]));
        assert_matches!(result, Err(IndexerError::Configuration { .. }));
    }

    #[test]
    fn test_unknown_kind() {
        let result = create(&config("nope", Some("https://x.example"), &[]));
        assert_matches!(result, Err(IndexerError::Configuration { reason }) if reason.contains("nope"));
    }
}
