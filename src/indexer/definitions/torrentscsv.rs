//! Torrents.csv, a public self-hostable torrent search engine.
//!
//! The JSON search service only answers terms of three characters or more, so
//! shorter searches generate no requests at all.

use std::time::Duration;

use serde::Deserialize;

use crate::indexer::auth::NoAuth;
use crate::indexer::capabilities::{DEFAULT_RATE_LIMIT, IndexerCapabilities, MovieSearchParam, TvSearchParam};
use crate::indexer::categories::{CategoryMap, cats};
use crate::indexer::criteria::SearchCriteria;
use crate::indexer::dates;
use crate::indexer::error::{IndexerError, Result};
use crate::indexer::magnet::build_public_magnet;
use crate::indexer::parse_util::lenient_u64;
use crate::indexer::request::{HttpAccept, IndexerRequest, RequestChain, RequestGenerator, encode_query};
use crate::indexer::response::{IndexerResponse, ResponseParser, parse_json_rows};
use crate::indexer::runner::IndexerComponents;
use crate::indexer::settings::{IndexerSettings, SettingDefinition};
use crate::indexer::types::{
    DownloadProtocol, IndexerDescriptor, IndexerPrivacy, ReleaseInfo, SeedPolicy,
};

pub const SETTINGS: &[SettingDefinition] = &[];

const MIN_TERM_LENGTH: usize = 3;
const RESULT_SIZE: u32 = 100;

pub fn descriptor() -> IndexerDescriptor {
    IndexerDescriptor {
        kind: "torrentscsv",
        name: "TorrentsCSV",
        description: "Torrents.csv is a self-hostable open source torrent search engine and database",
        language: "en-US",
        privacy: IndexerPrivacy::Public,
        protocol: DownloadProtocol::Torrent,
        links: &["https://torrents-csv.com/"],
        ratioless: true,
        seed_policy: SeedPolicy::default(),
        session_ttl: Duration::ZERO,
    }
}

pub fn capabilities() -> IndexerCapabilities {
    IndexerCapabilities {
        limits_max: RESULT_SIZE,
        limits_default: RESULT_SIZE,
        supports_rss: false,
        tv_search_params: vec![TvSearchParam::Q, TvSearchParam::Season, TvSearchParam::Ep],
        movie_search_params: vec![MovieSearchParam::Q],
        rate_limit: DEFAULT_RATE_LIMIT,
        categories: CategoryMap::new().with("1", cats::OTHER, "Other"),
        ..IndexerCapabilities::new()
    }
}

pub fn components(settings: &IndexerSettings) -> Result<IndexerComponents> {
    Ok(IndexerComponents {
        descriptor: descriptor(),
        capabilities: capabilities(),
        generator: Box::new(TorrentsCsvRequestGenerator {
            search_url: settings.url("service/search"),
        }),
        parser: Box::new(TorrentsCsvParser {
            base_url: settings.base_url().to_string(),
        }),
        auth: Box::new(NoAuth),
    })
}

pub struct TorrentsCsvRequestGenerator {
    search_url: String,
}

impl TorrentsCsvRequestGenerator {
    fn search(&self, criteria: &SearchCriteria, term: &str) -> RequestChain {
        let mut chain = RequestChain::new();
        if term.trim().chars().count() < MIN_TERM_LENGTH {
            return chain;
        }

        let query = encode_query(&[("size", RESULT_SIZE.to_string()), ("q", term.to_string())]);
        chain.add([
            IndexerRequest::new(format!("{}?{query}", self.search_url), HttpAccept::Json).with_source(criteria),
        ]);
        chain
    }
}

impl RequestGenerator for TorrentsCsvRequestGenerator {
    fn basic_search(&self, criteria: &SearchCriteria) -> Result<RequestChain> {
        Ok(self.search(criteria, &criteria.sanitized_search_term()))
    }

    fn tv_search(&self, criteria: &SearchCriteria) -> Result<RequestChain> {
        Ok(self.search(criteria, &criteria.sanitized_tv_search_string()))
    }
}

#[derive(Debug, Deserialize)]
struct CsvTorrent {
    infohash: String,
    name: String,
    #[serde(default, deserialize_with = "lenient_u64")]
    size_bytes: Option<u64>,
    #[serde(default, deserialize_with = "lenient_u64")]
    created_unix: Option<u64>,
    #[serde(default, deserialize_with = "lenient_u64")]
    seeders: Option<u64>,
    #[serde(default, deserialize_with = "lenient_u64")]
    leechers: Option<u64>,
    #[serde(default, deserialize_with = "lenient_u64")]
    completed: Option<u64>,
}

fn count(value: Option<u64>) -> u32 {
    value.map_or(0, |v| u32::try_from(v).unwrap_or(u32::MAX))
}

pub struct TorrentsCsvParser {
    base_url: String,
}

impl TorrentsCsvParser {
    fn parse_torrent(&self, torrent: CsvTorrent) -> Result<ReleaseInfo> {
        let hash = torrent.infohash.trim().to_string();
        let magnet = build_public_magnet(&hash, &torrent.name)
            .ok_or_else(|| IndexerError::parse(format!("\"{}\" has an invalid info hash", torrent.name)))?;
        let publish_date = torrent
            .created_unix
            .and_then(|t| i64::try_from(t).ok())
            .and_then(dates::from_unix)
            .ok_or_else(|| IndexerError::parse(format!("\"{}\" has no creation time", torrent.name)))?;

        // there is no details page, link to a search for the title instead
        let details = format!("{}/search/{}", self.base_url, urlencoding::encode(&torrent.name));

        let mut release = ReleaseInfo::new(torrent.name, format!("magnet:?xt=urn:btih:{hash}"), publish_date)
            .with_swarm(count(torrent.seeders), count(torrent.leechers));
        release.magnet_uri = Some(magnet);
        release.info_hash = Some(hash);
        release.details = Some(details);
        release.categories = vec![cats::OTHER];
        release.size = torrent.size_bytes;
        release.grabs = count(torrent.completed);
        release.download_volume_factor = 0.0;
        release.upload_volume_factor = 1.0;
        Ok(release)
    }
}

impl ResponseParser for TorrentsCsvParser {
    fn parse(&self, response: &IndexerResponse) -> Result<Vec<ReleaseInfo>> {
        response.ensure_status(200)?;
        response.ensure_content_type()?;

        // null entries show up in some result sets
        let mut rows: Vec<serde_json::Value> = response.json()?;
        rows.retain(|row| !row.is_null());
        let mut releases = parse_json_rows("torrentscsv", rows, |t| self.parse_torrent(t))?;
        releases.sort_by(|a, b| b.publish_date.cmp(&a.publish_date));
        Ok(releases)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indexer::http::HttpResponse;
    use pretty_assertions::assert_eq;

    fn generator() -> TorrentsCsvRequestGenerator {
        TorrentsCsvRequestGenerator {
            search_url: "https://torrents-csv.com/service/search".to_string(),
        }
    }

    fn response(body: &str) -> IndexerResponse {
        let url = "https://torrents-csv.com/service/search?size=100&q=ubuntu";
        IndexerResponse::new(
            IndexerRequest::new(url, HttpAccept::Json),
            HttpResponse::new(url, 200, body).with_header("content-type", "application/json"),
        )
    }

    #[test]
    fn test_short_terms_generate_nothing() {
        let chain = generator().search_requests(&SearchCriteria::basic("ab")).unwrap();
        assert!(chain.is_empty());
        assert_eq!(chain.request_count(), 0);
    }

    #[test]
    fn test_tv_search_url() {
        let criteria = SearchCriteria::tv("Show").with_season_episode(1, Some("2"));
        let chain = generator().search_requests(&criteria).unwrap();
        assert_eq!(
            chain.first_request().unwrap().url(),
            "https://torrents-csv.com/service/search?size=100&q=Show+S01E02"
        );
    }

    #[test]
    fn test_parse_results() {
        let parser = TorrentsCsvParser {
            base_url: "https://torrents-csv.com".to_string(),
        };
        let body = r#"[
          {"infohash":"0123456789abcdef0123456789abcdef01234567","name":"ubuntu 22.04","size_bytes":3654957056,
           "created_unix":1650000000,"seeders":900,"leechers":12,"completed":5000},
          null,
          {"infohash":"fedcba9876543210fedcba9876543210fedcba98","name":"ubuntu 24.04","size_bytes":6000000000,
           "created_unix":1714000000,"seeders":null,"leechers":3},
          {"infohash":"nothex","name":"bad","created_unix":1714000000}
        ]"#;
        let releases = parser.parse(&response(body)).unwrap();

        assert_eq!(releases.len(), 2);
        assert_eq!(releases[0].title, "ubuntu 24.04");
        assert_eq!(releases[0].seeders, 0);
        assert_eq!(releases[0].peers, 3);

        let older = &releases[1];
        assert_eq!(older.guid, "magnet:?xt=urn:btih:0123456789abcdef0123456789abcdef01234567");
        assert!(older.magnet_uri.as_deref().unwrap().starts_with("magnet:?xt=urn:btih:0123456789ABCDEF"));
        assert_eq!(older.details.as_deref(), Some("https://torrents-csv.com/search/ubuntu%2022.04"));
        assert_eq!(older.categories, vec![cats::OTHER]);
        assert_eq!(older.grabs, 5000);
        assert_eq!(older.download_volume_factor, 0.0);
    }

    #[test]
    fn test_row_without_infohash_is_skipped() {
        let parser = TorrentsCsvParser {
            base_url: "https://torrents-csv.com".to_string(),
        };
        let body = r#"[
          {"infohash":"0123456789abcdef0123456789abcdef01234567","name":"debian 12","created_unix":1700000000},
          {"name":"no hash","created_unix":1700000000,"seeders":4}
        ]"#;
        let releases = parser.parse(&response(body)).unwrap();
        assert_eq!(releases.len(), 1);
        assert_eq!(releases[0].title, "debian 12");
    }
}
