//! Generalized Indexer Module
//!
//! One search pipeline drives every supported indexer. Each site contributes
//! only the parts that differ: a request generator, a response parser, an
//! authentication strategy and static capabilities.
//!
//! # Architecture
//!
//! - `SearchCriteria`: one normalized query shape for every search type
//! - `RequestGenerator`: turns criteria into a tiered [`RequestChain`]
//! - `AuthStrategy` + `SessionStore`: login, session reuse and relogin
//! - `ResponseParser`: turns one HTTP response into [`ReleaseInfo`] items
//! - `HttpIndexer`: runs the chain with rate limiting, auth retry and fallback
//! - `IndexerManager`: registry, fan-out across indexers, result cache
//! - `definitions`: the concrete adapters
//!
//! # Example
//!
//! ```ignore
//! use indexarr::indexer::{IndexerManager, SearchCriteria};
//!
//! let manager = IndexerManager::new(DEFAULT_CACHE_TTL);
//! manager.load_indexers(file.enabled(), http, clock, timeout);
//! let criteria = SearchCriteria::tv("Breaking Bad").with_season_episode(1, Some("01"));
//! let results = manager.search_all(&criteria).await;
//! ```

pub mod auth;
pub mod capabilities;
pub mod categories;
pub mod clock;
pub mod criteria;
pub mod dates;
pub mod definitions;
pub mod error;
pub mod http;
pub mod magnet;
pub mod manager;
pub mod parse_util;
pub mod request;
pub mod response;
pub mod runner;
pub mod session;
pub mod settings;
pub mod types;

// Re-export commonly used types
pub use capabilities::{BookSearchParam, IndexerCapabilities, MovieSearchParam, MusicSearchParam, TvSearchParam};
pub use categories::{CategoryMap, cats};
pub use clock::{Clock, FixedClock, SystemClock};
pub use criteria::{SearchCriteria, SearchType};
pub use error::{IndexerError, Result};
pub use http::{HttpClient, HttpRequest, HttpResponse, ReqwestHttpClient};
pub use manager::{DEFAULT_CACHE_TTL, IndexerManager, IndexerSearchResult, SearchFailure};
pub use request::{IndexerRequest, RequestChain, RequestGenerator};
pub use response::{IndexerResponse, ResponseParser};
pub use runner::{HttpIndexer, IndexerComponents, SearchOutcome};
pub use settings::{IndexerSettings, SettingDefinition};
pub use types::{DownloadProtocol, IndexerDescriptor, IndexerPrivacy, ReleaseInfo};
