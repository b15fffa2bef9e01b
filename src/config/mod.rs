//! Application configuration management
//!
//! Process settings come from environment variables (a `.env` file is honoured).
//! Indexer instances are declared in a YAML file:
//!
//! ```yaml
//! indexers:
//!   - id: ipt
//!     kind: iptorrents
//!     settings:
//!       cookie: "uid=1; pass=abc"
//!       freeleech: true
//!   - id: geek
//!     kind: newznab
//!     base_url: https://api.nzbgeek.info
//!     settings:
//!       apikey: "..."
//! ```

use std::collections::BTreeMap;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::indexer::settings::IndexerSettings;

const DEFAULT_USER_AGENT: &str = concat!("indexarr/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Path of the YAML file declaring indexer instances
    pub indexers_path: PathBuf,

    /// Timeout applied to every outbound request
    pub request_timeout: Duration,

    /// User-Agent sent unless an indexer overrides it
    pub user_agent: String,

    /// How long identical searches are answered from cache
    pub cache_ttl: Duration,

    pub log_format: LogFormat,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // A missing .env file is fine
        let _ = dotenvy::dotenv();

        let request_timeout_secs: u64 = env::var("INDEXARR_REQUEST_TIMEOUT_SECS")
            .unwrap_or_else(|_| "30".to_string())
            .parse()
            .context("Invalid INDEXARR_REQUEST_TIMEOUT_SECS")?;

        let cache_ttl_secs: u64 = env::var("INDEXARR_CACHE_TTL_SECS")
            .unwrap_or_else(|_| "300".to_string())
            .parse()
            .context("Invalid INDEXARR_CACHE_TTL_SECS")?;

        let log_format = match env::var("INDEXARR_LOG_FORMAT").as_deref() {
            Ok("json") => LogFormat::Json,
            Ok("pretty") | Err(_) => LogFormat::Pretty,
            Ok(other) => anyhow::bail!("Invalid INDEXARR_LOG_FORMAT '{other}', expected json or pretty"),
        };

        Ok(Self {
            indexers_path: env::var("INDEXARR_INDEXERS")
                .unwrap_or_else(|_| "./indexers.yml".to_string())
                .into(),

            request_timeout: Duration::from_secs(request_timeout_secs.max(1)),

            user_agent: env::var("INDEXARR_USER_AGENT")
                .ok()
                .filter(|ua| !ua.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string()),

            cache_ttl: Duration::from_secs(cache_ttl_secs),

            log_format,
        })
    }

    pub fn load_indexers(&self) -> Result<IndexerFile> {
        IndexerFile::load(&self.indexers_path)
    }
}

/// Indexer instances declared by the user
#[derive(Debug, Clone, Default, Deserialize)]
pub struct IndexerFile {
    #[serde(default)]
    pub indexers: Vec<IndexerConfig>,
}

impl IndexerFile {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read indexer file {}", path.display()))?;
        Self::parse(&raw).with_context(|| format!("Invalid indexer file {}", path.display()))
    }

    pub fn parse(raw: &str) -> Result<Self> {
        let file: IndexerFile = serde_yaml::from_str(raw)?;

        let mut seen = std::collections::HashSet::new();
        for indexer in &file.indexers {
            anyhow::ensure!(!indexer.id.trim().is_empty(), "indexer id must not be empty");
            anyhow::ensure!(seen.insert(indexer.id.as_str()), "duplicate indexer id '{}'", indexer.id);
        }

        Ok(file)
    }

    pub fn enabled(&self) -> impl Iterator<Item = &IndexerConfig> {
        self.indexers.iter().filter(|i| i.enabled)
    }
}

fn default_enabled() -> bool {
    true
}

/// One configured indexer instance
#[derive(Clone, Deserialize)]
pub struct IndexerConfig {
    pub id: String,
    /// Adapter kind, e.g. "newznab"
    pub kind: String,
    pub name: Option<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    pub base_url: Option<String>,
    /// Raw values; YAML scalars of any type are accepted
    #[serde(default)]
    pub settings: BTreeMap<String, serde_yaml::Value>,
}

impl IndexerConfig {
    /// Settings as strings, ready to be resolved against an adapter's declarations
    pub fn indexer_settings(&self) -> IndexerSettings {
        let mut settings = IndexerSettings::new();
        if let Some(base_url) = &self.base_url {
            settings = settings.with_base_url(base_url.clone());
        }
        for (key, value) in &self.settings {
            let text = match value {
                serde_yaml::Value::Null => continue,
                serde_yaml::Value::Bool(b) => b.to_string(),
                serde_yaml::Value::Number(n) => n.to_string(),
                serde_yaml::Value::String(s) => s.clone(),
                other => serde_yaml::to_string(other).unwrap_or_default().trim().to_string(),
            };
            settings.set(key.clone(), text);
        }
        settings
    }
}

// Setting values may be credentials
impl std::fmt::Debug for IndexerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexerConfig")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("name", &self.name)
            .field("enabled", &self.enabled)
            .field("base_url", &self.base_url)
            .field("settings", &self.settings.keys().collect::<Vec<_>>())
            .finish()
    }
}
