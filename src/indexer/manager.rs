//! Indexer Manager
//!
//! The IndexerManager is responsible for:
//! - Loading and managing configured indexer instances
//! - Orchestrating searches across multiple indexers
//! - Caching search results

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Result, anyhow};
use parking_lot::RwLock;
use serde::Serialize;

use super::clock::Clock;
use super::criteria::SearchCriteria;
use super::definitions::create_indexer;
use super::error::IndexerError;
use super::http::HttpClient;
use super::runner::HttpIndexer;
use super::types::ReleaseInfo;
use crate::config::IndexerConfig;

/// Default cache TTL (5 minutes)
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(5 * 60);

/// Result from searching a single indexer
#[derive(Debug, Clone, Serialize)]
pub struct IndexerSearchResult {
    pub indexer_id: String,
    pub indexer_name: String,
    pub releases: Vec<ReleaseInfo>,
    pub elapsed_ms: u64,
    pub from_cache: bool,
    /// Set when the whole search failed
    pub error: Option<SearchFailure>,
    /// Pages that failed while others succeeded
    pub failed_pages: usize,
}

/// Why an indexer's search failed, kept typed so callers can tell a bad
/// configuration or rejected login from a flaky site
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchFailure {
    /// [`IndexerError::kind`], e.g. `authentication` or `transport`
    pub kind: &'static str,
    /// Retrying without changing settings will not help
    pub fatal: bool,
    pub message: String,
}

impl From<&IndexerError> for SearchFailure {
    fn from(err: &IndexerError) -> Self {
        Self {
            kind: err.kind(),
            fatal: err.is_fatal(),
            message: err.to_string(),
        }
    }
}

impl std::fmt::Display for SearchFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message, self.kind)
    }
}

/// Manages all configured indexer instances
pub struct IndexerManager {
    /// Loaded indexer instances by config ID
    indexers: RwLock<HashMap<String, Arc<HttpIndexer>>>,
    /// Search cache
    cache: SearchCache,
}

impl IndexerManager {
    pub fn new(cache_ttl: Duration) -> Self {
        Self {
            indexers: RwLock::new(HashMap::new()),
            cache: SearchCache::new(cache_ttl),
        }
    }

    /// Load every enabled indexer, logging and skipping the ones that fail to build.
    /// Returns the number loaded.
    pub fn load_indexers<'a>(
        &self,
        configs: impl IntoIterator<Item = &'a IndexerConfig>,
        http: Arc<dyn HttpClient>,
        clock: Arc<dyn Clock>,
        request_timeout: Duration,
    ) -> usize {
        let mut loaded = 0;
        for config in configs.into_iter().filter(|c| c.enabled) {
            match create_indexer(config, http.clone(), clock.clone(), request_timeout) {
                Ok(indexer) => {
                    tracing::info!(
                        indexer_id = %config.id,
                        indexer_name = %indexer.name(),
                        indexer_kind = %config.kind,
                        "Loaded indexer"
                    );
                    self.add_indexer(Arc::new(indexer));
                    loaded += 1;
                }
                Err(e) => {
                    tracing::warn!(
                        indexer_id = %config.id,
                        indexer_kind = %config.kind,
                        error = %e,
                        "Failed to load indexer"
                    );
                }
            }
        }
        loaded
    }

    pub fn add_indexer(&self, indexer: Arc<HttpIndexer>) {
        self.indexers.write().insert(indexer.id().to_string(), indexer);
    }

    /// Unload an indexer and forget its cached results
    pub fn unload_indexer(&self, id: &str) {
        self.indexers.write().remove(id);
        self.cache.remove_prefix(&format!("{id}:"));
    }

    /// Get a loaded indexer by config ID
    pub fn get_indexer(&self, id: &str) -> Option<Arc<HttpIndexer>> {
        self.indexers.read().get(id).cloned()
    }

    /// Get all loaded indexers, ordered by id
    pub fn get_all_indexers(&self) -> Vec<Arc<HttpIndexer>> {
        let mut all: Vec<_> = self.indexers.read().values().cloned().collect();
        all.sort_by(|a, b| a.id().cmp(b.id()));
        all
    }

    /// Search across all loaded indexers that can serve the criteria
    pub async fn search_all(&self, criteria: &SearchCriteria) -> Vec<IndexerSearchResult> {
        let indexers = self.get_all_indexers();
        self.search_each(indexers, criteria).await
    }

    /// Search specific indexers
    pub async fn search_indexers(&self, indexer_ids: &[String], criteria: &SearchCriteria) -> Vec<IndexerSearchResult> {
        let indexers = self
            .get_all_indexers()
            .into_iter()
            .filter(|idx| indexer_ids.iter().any(|id| id == idx.id()))
            .collect();
        self.search_each(indexers, criteria).await
    }

    async fn search_each(&self, indexers: Vec<Arc<HttpIndexer>>, criteria: &SearchCriteria) -> Vec<IndexerSearchResult> {
        let mut handles = vec![];
        for indexer in indexers {
            if !can_handle(&indexer, criteria) {
                tracing::debug!(indexer_id = %indexer.id(), criteria = %criteria, "Indexer cannot handle query");
                continue;
            }

            let criteria = criteria.clone();
            let cache = self.cache.clone();
            let handle = tokio::spawn(async move { Self::search_single(indexer, &criteria, cache).await });
            handles.push(handle);
        }

        // Collect results in indexer order
        let mut results = Vec::with_capacity(handles.len());
        for handle in handles {
            match handle.await {
                Ok(result) => results.push(result),
                Err(e) => {
                    tracing::error!(error = %e, "Indexer search task panicked");
                }
            }
        }

        results
    }

    /// Search a single indexer
    async fn search_single(indexer: Arc<HttpIndexer>, criteria: &SearchCriteria, cache: SearchCache) -> IndexerSearchResult {
        let start = Instant::now();
        let cache_key = format!("{}:{}", indexer.id(), criteria.cache_key());

        // Check cache first
        if let Some(cached) = cache.get(&cache_key) {
            return IndexerSearchResult {
                indexer_id: indexer.id().to_string(),
                indexer_name: indexer.name().to_string(),
                releases: cached,
                elapsed_ms: start.elapsed().as_millis() as u64,
                from_cache: true,
                error: None,
                failed_pages: 0,
            };
        }

        match indexer.search(criteria).await {
            Ok(outcome) => {
                let failed_pages = outcome.failed_queries().count();
                // Partial results are returned but not cached
                if failed_pages == 0 {
                    cache.insert(cache_key, outcome.releases.clone());
                }

                IndexerSearchResult {
                    indexer_id: indexer.id().to_string(),
                    indexer_name: indexer.name().to_string(),
                    releases: outcome.releases,
                    elapsed_ms: start.elapsed().as_millis() as u64,
                    from_cache: false,
                    error: None,
                    failed_pages,
                }
            }
            Err(e) => IndexerSearchResult {
                indexer_id: indexer.id().to_string(),
                indexer_name: indexer.name().to_string(),
                releases: vec![],
                elapsed_ms: start.elapsed().as_millis() as u64,
                from_cache: false,
                error: Some(SearchFailure::from(&e)),
                failed_pages: 0,
            },
        }
    }

    /// Test an indexer connection
    pub async fn test_indexer(&self, id: &str) -> Result<()> {
        let indexer = self
            .get_indexer(id)
            .ok_or_else(|| anyhow!("Indexer not loaded: {}", id))?;

        indexer.test_connection().await?;
        Ok(())
    }

    /// Fetch a release file through the indexer that listed it
    pub async fn download(&self, id: &str, link: &str) -> Result<Vec<u8>> {
        let indexer = self
            .get_indexer(id)
            .ok_or_else(|| anyhow!("Indexer not loaded: {}", id))?;

        Ok(indexer.download(link).await?)
    }
}

/// Search type, parameters and categories all within what the indexer declares
fn can_handle(indexer: &HttpIndexer, criteria: &SearchCriteria) -> bool {
    let caps = indexer.capabilities();
    if caps.unsupported_parameter(criteria).is_some() {
        return false;
    }
    criteria.categories.is_empty() || !caps.categories.supported_categories(&criteria.categories).is_empty()
}

/// Simple in-memory search cache
#[derive(Clone)]
struct SearchCache {
    entries: Arc<RwLock<HashMap<String, CacheEntry>>>,
    ttl: Duration,
}

struct CacheEntry {
    releases: Vec<ReleaseInfo>,
    expires_at: Instant,
}

impl SearchCache {
    fn new(ttl: Duration) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            ttl,
        }
    }

    fn get(&self, key: &str) -> Option<Vec<ReleaseInfo>> {
        let entries = self.entries.read();
        entries.get(key).and_then(|entry| {
            if entry.expires_at > Instant::now() {
                Some(entry.releases.clone())
            } else {
                None
            }
        })
    }

    fn insert(&self, key: String, releases: Vec<ReleaseInfo>) {
        if self.ttl.is_zero() {
            return;
        }
        self.cleanup();
        self.entries.write().insert(
            key,
            CacheEntry {
                releases,
                expires_at: Instant::now() + self.ttl,
            },
        );
    }

    fn remove_prefix(&self, prefix: &str) {
        self.entries.write().retain(|key, _| !key.starts_with(prefix));
    }

    /// Remove expired entries
    fn cleanup(&self) {
        let mut entries = self.entries.write();
        let now = Instant::now();
        entries.retain(|_, entry| entry.expires_at > now);
    }
}

impl std::fmt::Debug for IndexerManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexerManager")
            .field("indexers_count", &self.indexers.read().len())
            .finish()
    }
}
