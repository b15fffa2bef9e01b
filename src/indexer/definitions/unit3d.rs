//! UNIT3D trackers, through the `api/torrents/filter` JSON API.
//!
//! The API token travels as the `api_token` query parameter and is attached by
//! [`ApiKeyAuth`]. Results carry category names rather than ids, so parsing maps
//! on labels.

use std::time::Duration;

use chrono::{DateTime, FixedOffset, Utc};
use serde::Deserialize;
use serde_json::Value;

use crate::indexer::auth::ApiKeyAuth;
use crate::indexer::capabilities::{
    BookSearchParam, DEFAULT_RATE_LIMIT, IndexerCapabilities, MovieSearchParam, MusicSearchParam,
    TvSearchParam,
};
use crate::indexer::categories::{CategoryMap, cats};
use crate::indexer::criteria::SearchCriteria;
use crate::indexer::dates;
use crate::indexer::error::{IndexerError, Result};
use crate::indexer::parse_util::{imdb_id_number, lenient_u64};
use crate::indexer::request::{
    HttpAccept, IndexerRequest, RequestChain, RequestGenerator, encode_query, page_span,
};
use crate::indexer::response::{IndexerResponse, ResponseParser, parse_json_rows};
use crate::indexer::runner::IndexerComponents;
use crate::indexer::settings::{IndexerSettings, SettingDefinition};
use crate::indexer::types::{
    DownloadProtocol, IndexerDescriptor, IndexerPrivacy, ReleaseInfo, SeedPolicy,
};

pub const SETTINGS: &[SettingDefinition] = &[
    SettingDefinition::api_key("apikey", "API Token")
        .with_help("Found under Settings > API Token on the site"),
];

const PAGE_SIZE: u32 = 100;

pub fn descriptor() -> IndexerDescriptor {
    IndexerDescriptor {
        kind: "unit3d",
        name: "UNIT3D",
        description: "Private tracker running UNIT3D",
        language: "en-US",
        privacy: IndexerPrivacy::Private,
        protocol: DownloadProtocol::Torrent,
        links: &[],
        ratioless: false,
        seed_policy: SeedPolicy {
            minimum_ratio: Some(1.0),
            minimum_seed_time: Some(172_800),
        },
        session_ttl: Duration::from_secs(30 * 24 * 3600),
    }
}

pub fn capabilities() -> IndexerCapabilities {
    IndexerCapabilities {
        tv_search_params: vec![
            TvSearchParam::Q,
            TvSearchParam::Season,
            TvSearchParam::Ep,
            TvSearchParam::ImdbId,
            TvSearchParam::TvdbId,
        ],
        movie_search_params: vec![
            MovieSearchParam::Q,
            MovieSearchParam::ImdbId,
            MovieSearchParam::TmdbId,
        ],
        music_search_params: vec![MusicSearchParam::Q],
        book_search_params: vec![BookSearchParam::Q],
        supports_pagination: true,
        page_size: PAGE_SIZE,
        rate_limit: DEFAULT_RATE_LIMIT,
        categories: CategoryMap::new()
            .with("1", cats::MOVIES, "Movie")
            .with("2", cats::TV, "TV Show")
            .with("3", cats::AUDIO, "Music")
            .with("4", cats::PC_GAMES, "Game")
            .with("5", cats::PC, "Application")
            .with("6", cats::TV_ANIME, "Anime"),
        ..IndexerCapabilities::new()
    }
}

pub fn components(settings: &IndexerSettings) -> Result<IndexerComponents> {
    let capabilities = capabilities();
    let generator = Unit3dRequestGenerator {
        search_url: settings.url("api/torrents/filter"),
        categories: capabilities.categories.clone(),
        limit: capabilities.limits_default,
    };
    let parser = Unit3dParser {
        categories: capabilities.categories.clone(),
    };

    Ok(IndexerComponents {
        descriptor: descriptor(),
        capabilities,
        generator: Box::new(generator),
        parser: Box::new(parser),
        auth: Box::new(ApiKeyAuth::query("apikey", "api_token")),
    })
}

pub struct Unit3dRequestGenerator {
    search_url: String,
    categories: CategoryMap,
    limit: u32,
}

impl Unit3dRequestGenerator {
    fn filter(&self, criteria: &SearchCriteria, term: &str, ids: Vec<(&'static str, String)>) -> RequestChain {
        let mut params: Vec<(String, String)> = Vec::new();
        if !term.is_empty() {
            params.push(("name".into(), term.to_string()));
        }
        if let Some(natives) = self.categories.native_filter(&criteria.categories) {
            params.extend(natives.into_iter().map(|n| ("categories[]".to_string(), n)));
        }
        params.extend(ids.into_iter().map(|(k, v)| (k.to_string(), v)));
        params.push(("perPage".into(), PAGE_SIZE.to_string()));

        let limit = criteria.limit.filter(|&l| l > 0).unwrap_or(self.limit);
        let pages = page_span(limit, criteria.offset_or_zero(), PAGE_SIZE).map(|page| {
            let mut query = params.clone();
            query.push(("page".into(), page.to_string()));
            IndexerRequest::new(format!("{}?{}", self.search_url, encode_query(&query)), HttpAccept::Json)
                .with_source(criteria)
        });

        let mut chain = RequestChain::new();
        chain.add(pages);
        chain
    }
}

impl RequestGenerator for Unit3dRequestGenerator {
    fn basic_search(&self, criteria: &SearchCriteria) -> Result<RequestChain> {
        Ok(self.filter(criteria, &criteria.sanitized_search_term(), vec![]))
    }

    fn tv_search(&self, criteria: &SearchCriteria) -> Result<RequestChain> {
        let mut ids = Vec::new();
        if let Some(imdb) = criteria.imdb_id_short() {
            ids.push(("imdbId", imdb.to_string()));
        }
        if let Some(tvdb) = criteria.tvdb_id {
            ids.push(("tvdbId", tvdb.to_string()));
        }
        Ok(self.filter(criteria, &criteria.sanitized_tv_search_string(), ids))
    }

    fn movie_search(&self, criteria: &SearchCriteria) -> Result<RequestChain> {
        let mut ids = Vec::new();
        if let Some(imdb) = criteria.imdb_id_short() {
            ids.push(("imdbId", imdb.to_string()));
        }
        if let Some(tmdb) = criteria.tmdb_id {
            ids.push(("tmdbId", tmdb.to_string()));
        }
        Ok(self.filter(criteria, &criteria.sanitized_search_term(), ids))
    }
}

#[derive(Debug, Deserialize)]
struct Unit3dResponse {
    #[serde(default)]
    data: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct Unit3dTorrent {
    id: Value,
    attributes: Unit3dAttributes,
}

#[derive(Debug, Deserialize)]
struct Unit3dAttributes {
    name: String,
    category: Option<String>,
    #[serde(default, deserialize_with = "lenient_u64")]
    release_year: Option<u64>,
    #[serde(default, deserialize_with = "lenient_u64")]
    size: Option<u64>,
    #[serde(default, deserialize_with = "lenient_u64")]
    num_file: Option<u64>,
    #[serde(default, deserialize_with = "lenient_u64")]
    times_completed: Option<u64>,
    #[serde(default, deserialize_with = "lenient_u64")]
    seeders: Option<u64>,
    #[serde(default, deserialize_with = "lenient_u64")]
    leechers: Option<u64>,
    created_at: String,
    download_link: String,
    details_link: String,
    info_hash: Option<String>,
    #[serde(default)]
    imdb_id: Value,
    #[serde(default, deserialize_with = "lenient_u64")]
    tmdb_id: Option<u64>,
    #[serde(default, deserialize_with = "lenient_u64")]
    tvdb_id: Option<u64>,
    #[serde(default)]
    freeleech: Value,
    #[serde(default)]
    double_upload: bool,
}

/// Ids arrive as numbers or strings depending on the site version
fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// `freeleech` is a bool on older sites and a percentage string ("100%") on newer ones
fn freeleech_factor(value: &Value) -> f64 {
    match value {
        Value::Bool(true) => 0.0,
        Value::String(s) => {
            let percent = s.trim().trim_end_matches('%').parse::<f64>().unwrap_or(0.0);
            (1.0 - percent / 100.0).clamp(0.0, 1.0)
        }
        _ => 1.0,
    }
}

fn positive_id(value: Option<u64>) -> Option<u32> {
    value.and_then(|v| u32::try_from(v).ok()).filter(|&v| v > 0)
}

fn count(value: Option<u64>) -> u32 {
    value.map_or(0, |v| u32::try_from(v).unwrap_or(u32::MAX))
}

fn created_at(text: &str) -> Result<DateTime<Utc>> {
    let utc = FixedOffset::east_opt(0).ok_or_else(|| IndexerError::parse("invalid offset"))?;
    dates::from_rfc2822(text).or_else(|_| dates::from_format(text, "%Y-%m-%d %H:%M:%S", utc))
}

pub struct Unit3dParser {
    categories: CategoryMap,
}

impl Unit3dParser {
    fn parse_torrent(&self, torrent: Unit3dTorrent) -> Result<ReleaseInfo> {
        let row = torrent.attributes;
        let publish_date = created_at(&row.created_at)?;

        let mut release = ReleaseInfo::new(row.name, row.details_link.clone(), publish_date)
            .with_swarm(count(row.seeders), count(row.leechers));
        release.link = Some(row.download_link);
        release.details = Some(row.details_link);
        release.info_hash = row.info_hash.or_else(|| value_text(&torrent.id));
        release.categories = match row.category.as_deref() {
            Some(label) => {
                let mapped = self.categories.map_label_to_standard(label);
                if mapped.is_empty() {
                    vec![cats::OTHER]
                } else {
                    mapped.into_iter().collect()
                }
            }
            None => vec![cats::OTHER],
        };
        release.size = row.size;
        release.files = count(row.num_file);
        release.grabs = count(row.times_completed);
        release.imdb_id = value_text(&row.imdb_id).and_then(|id| imdb_id_number(&id)).filter(|&id| id > 0);
        release.tmdb_id = positive_id(row.tmdb_id);
        release.tvdb_id = positive_id(row.tvdb_id);
        release.year = positive_id(row.release_year);
        release.download_volume_factor = freeleech_factor(&row.freeleech);
        release.upload_volume_factor = if row.double_upload { 2.0 } else { 1.0 };
        release.minimum_ratio = Some(1.0);
        release.minimum_seed_time = Some(172_800);
        Ok(release)
    }
}

impl ResponseParser for Unit3dParser {
    fn parse(&self, response: &IndexerResponse) -> Result<Vec<ReleaseInfo>> {
        response.ensure_status(200)?;
        response.ensure_content_type()?;

        let body: Unit3dResponse = response.json()?;
        let mut releases = parse_json_rows("unit3d", body.data, |t| self.parse_torrent(t))?;
        releases.sort_by(|a, b| b.publish_date.cmp(&a.publish_date));
        Ok(releases)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indexer::http::HttpResponse;
    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;

    fn generator() -> Unit3dRequestGenerator {
        Unit3dRequestGenerator {
            search_url: "https://tracker.example/api/torrents/filter".to_string(),
            categories: capabilities().categories,
            limit: PAGE_SIZE,
        }
    }

    fn response(status: u16, body: &str) -> IndexerResponse {
        let url = "https://tracker.example/api/torrents/filter?name=x";
        IndexerResponse::new(
            IndexerRequest::new(url, HttpAccept::Json),
            HttpResponse::new(url, status, body).with_header("content-type", "application/json"),
        )
    }

    const PAGE: &str = r#"{
      "data": [
        {
          "type": "torrent",
          "id": "41",
          "attributes": {
            "name": "Show S01E05 1080p WEB-DL",
            "release_year": 2021,
            "category": "TV Show",
            "size": 2147483648,
            "num_file": 3,
            "times_completed": 12,
            "seeders": 40,
            "leechers": 5,
            "created_at": "2024-05-01T10:00:00.000000Z",
            "download_link": "https://tracker.example/torrent/download/41.abc",
            "details_link": "https://tracker.example/torrents/41",
            "imdb_id": "1234567",
            "tmdb_id": 999,
            "tvdb_id": "0",
            "freeleech": "100%",
            "double_upload": true
          }
        },
        {
          "type": "torrent",
          "id": 42,
          "attributes": {
            "name": "Film 2020 2160p",
            "category": "Documentary",
            "size": "1000",
            "seeders": 1,
            "leechers": 0,
            "created_at": "2024-05-02 08:00:00",
            "download_link": "https://tracker.example/torrent/download/42.abc",
            "details_link": "https://tracker.example/torrents/42",
            "imdb_id": 0,
            "freeleech": false
          }
        },
        {
          "type": "torrent",
          "id": 43,
          "attributes": {
            "name": "Broken",
            "created_at": "yesterday-ish",
            "download_link": "https://tracker.example/torrent/download/43.abc",
            "details_link": "https://tracker.example/torrents/43"
          }
        }
      ]
    }"#;

    #[test]
    fn test_tv_search_request() {
        let criteria = SearchCriteria::tv("Show")
            .with_season_episode(1, Some("5"))
            .with_imdb("tt1234567")
            .with_tvdb(81189)
            .with_categories(vec![cats::TV]);
        let chain = generator().search_requests(&criteria).unwrap();

        assert_eq!(
            chain.first_request().unwrap().url(),
            "https://tracker.example/api/torrents/filter?name=Show+S01E05&categories%5B%5D=2&categories%5B%5D=6&imdbId=1234567&tvdbId=81189&perPage=100&page=1"
        );
        assert!(!chain.first_request().unwrap().url().contains("api_token"));
    }

    #[test]
    fn test_paging_window() {
        let criteria = SearchCriteria::basic("film").with_paging(100, 200);
        let chain = generator().search_requests(&criteria).unwrap();
        assert_eq!(chain.request_count(), 1);
        assert!(chain.first_request().unwrap().url().ends_with("page=3"));
    }

    #[test]
    fn test_parse_page() {
        let parser = Unit3dParser {
            categories: capabilities().categories,
        };
        let releases = parser.parse(&response(200, PAGE)).unwrap();
        assert_eq!(releases.len(), 2);

        let newest = &releases[0];
        assert_eq!(newest.title, "Film 2020 2160p");
        assert_eq!(newest.categories, vec![cats::OTHER]);
        assert_eq!(newest.imdb_id, None);
        assert_eq!(newest.download_volume_factor, 1.0);
        assert_eq!(newest.info_hash.as_deref(), Some("42"));

        let show = &releases[1];
        assert_eq!(show.guid, "https://tracker.example/torrents/41");
        assert_eq!(show.categories, vec![cats::TV]);
        assert_eq!(show.size, Some(2_147_483_648));
        assert_eq!(show.peers, 45);
        assert_eq!(show.grabs, 12);
        assert_eq!(show.imdb_id, Some(1_234_567));
        assert_eq!(show.tmdb_id, Some(999));
        assert_eq!(show.tvdb_id, None);
        assert_eq!(show.download_volume_factor, 0.0);
        assert_eq!(show.upload_volume_factor, 2.0);
        assert_eq!(show.minimum_seed_time, Some(172_800));
    }

    #[test]
    fn test_malformed_row_does_not_lose_the_page() {
        let parser = Unit3dParser {
            categories: capabilities().categories,
        };
        let body = r#"{"data": [
          {"id": 1, "attributes": {"name": "Good", "created_at": "2024-05-02 08:00:00",
            "download_link": "https://tracker.example/torrent/download/1.abc",
            "details_link": "https://tracker.example/torrents/1"}},
          {"id": 2, "attributes": {"name": "No link", "created_at": "2024-05-02 08:00:00",
            "details_link": "https://tracker.example/torrents/2"}}
        ]}"#;
        let releases = parser.parse(&response(200, body)).unwrap();
        assert_eq!(releases.len(), 1);
        assert_eq!(releases[0].title, "Good");
    }

    #[test]
    fn test_parse_rejects_error_status() {
        let parser = Unit3dParser {
            categories: capabilities().categories,
        };
        assert_matches!(
            parser.parse(&response(500, "{}")),
            Err(IndexerError::UnexpectedStatus { status: 500, .. })
        );
    }

    #[test]
    fn test_freeleech_factor() {
        assert_eq!(freeleech_factor(&Value::Bool(true)), 0.0);
        assert_eq!(freeleech_factor(&Value::String("50%".into())), 0.5);
        assert_eq!(freeleech_factor(&Value::String("0%".into())), 1.0);
        assert_eq!(freeleech_factor(&Value::Null), 1.0);
    }
}
