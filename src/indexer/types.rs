//! Core types shared across the indexer pipeline: the normalized release record
//! and the static description of an adapter.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DownloadProtocol {
    #[default]
    Torrent,
    Usenet,
}

impl std::fmt::Display for DownloadProtocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DownloadProtocol::Torrent => write!(f, "torrent"),
            DownloadProtocol::Usenet => write!(f, "usenet"),
        }
    }
}

/// Who may register on the site
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexerPrivacy {
    Public,
    SemiPrivate,
    Private,
}

impl std::fmt::Display for IndexerPrivacy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IndexerPrivacy::Public => write!(f, "public"),
            IndexerPrivacy::SemiPrivate => write!(f, "semi-private"),
            IndexerPrivacy::Private => write!(f, "private"),
        }
    }
}

/// Seeding requirements a site applies to every release unless the release says otherwise
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Default)]
pub struct SeedPolicy {
    pub minimum_ratio: Option<f64>,
    /// Seconds
    pub minimum_seed_time: Option<u64>,
}

/// Static facts about one adapter kind
#[derive(Debug, Clone, Serialize)]
pub struct IndexerDescriptor {
    /// Stable adapter kind, e.g. "gazelle"
    pub kind: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub language: &'static str,
    pub privacy: IndexerPrivacy,
    pub protocol: DownloadProtocol,
    /// Known mirrors; the first is the default base URL
    pub links: &'static [&'static str],
    /// The site has no ratio accounting; every release is downloaded for free
    pub ratioless: bool,
    pub seed_policy: SeedPolicy,
    /// How long a successful login stays valid
    #[serde(skip)]
    pub session_ttl: Duration,
}

/// A release as returned by any site, normalized.
///
/// Built fresh by a parser and never changed after the orchestrator stamps the
/// indexer identity on it. `guid` is the dedup key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReleaseInfo {
    pub title: String,

    /// Stable unique key, usually the details or download URL
    pub guid: String,

    /// Download link (torrent file or NZB)
    pub link: Option<String>,
    pub magnet_uri: Option<String>,
    pub info_hash: Option<String>,
    /// Details page URL
    pub details: Option<String>,

    pub publish_date: DateTime<Utc>,

    /// Standard category ids
    pub categories: Vec<i32>,

    /// Bytes, when the site reports it
    pub size: Option<u64>,
    pub files: u32,
    pub grabs: u32,

    // Swarm
    pub seeders: u32,
    /// Seeders plus leechers
    pub peers: u32,

    pub description: Option<String>,
    pub imdb_id: Option<u32>,
    pub tvdb_id: Option<u32>,
    pub tmdb_id: Option<u32>,
    pub year: Option<u32>,
    pub genres: Vec<String>,
    pub poster: Option<String>,

    /// 0 = freeleech, 1 = normal
    pub download_volume_factor: f64,
    /// 1 = normal, 2 = double upload
    pub upload_volume_factor: f64,
    pub minimum_ratio: Option<f64>,
    /// Seconds
    pub minimum_seed_time: Option<u64>,

    pub protocol: DownloadProtocol,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub indexer_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub indexer_name: Option<String>,
}

impl ReleaseInfo {
    pub fn new(title: impl Into<String>, guid: impl Into<String>, publish_date: DateTime<Utc>) -> Self {
        Self {
            title: title.into(),
            guid: guid.into(),
            link: None,
            magnet_uri: None,
            info_hash: None,
            details: None,
            publish_date,
            categories: vec![],
            size: None,
            files: 0,
            grabs: 0,
            seeders: 0,
            peers: 0,
            description: None,
            imdb_id: None,
            tvdb_id: None,
            tmdb_id: None,
            year: None,
            genres: vec![],
            poster: None,
            download_volume_factor: 1.0,
            upload_volume_factor: 1.0,
            minimum_ratio: None,
            minimum_seed_time: None,
            protocol: DownloadProtocol::Torrent,
            indexer_id: None,
            indexer_name: None,
        }
    }

    /// Set seeders and derive peers from a leecher count
    pub fn with_swarm(mut self, seeders: u32, leechers: u32) -> Self {
        self.seeders = seeders;
        self.peers = seeders.saturating_add(leechers);
        self
    }

    pub fn is_freeleech(&self) -> bool {
        self.download_volume_factor == 0.0
    }

    pub fn leechers(&self) -> u32 {
        self.peers.saturating_sub(self.seeders)
    }

    /// Seeders times size in GiB, a rough availability score
    pub fn gain(&self) -> Option<f64> {
        self.size.map(|size| {
            let gb = size as f64 / (1024.0 * 1024.0 * 1024.0);
            self.seeders as f64 * gb
        })
    }

    /// Download link, falling back to the magnet URI
    pub fn download_target(&self) -> Option<&str> {
        self.link.as_deref().or(self.magnet_uri.as_deref())
    }
}
