//! Gazelle trackers (the `ajax.php` JSON API shared by most music trackers).
//!
//! Login is a `login.php` form POST that yields session cookies. A session the
//! site no longer accepts shows up as a redirect to the login page or a
//! "bad credentials" payload.

use std::time::Duration;

use chrono::{DateTime, FixedOffset, Utc};
use serde::Deserialize;
use serde_json::Value;

use crate::indexer::auth::{FormLoginAuth, LoginMarker};
use crate::indexer::capabilities::{
    BookSearchParam, DEFAULT_RATE_LIMIT, IndexerCapabilities, MusicSearchParam,
};
use crate::indexer::categories::{CategoryMap, cats};
use crate::indexer::criteria::SearchCriteria;
use crate::indexer::dates;
use crate::indexer::error::{IndexerError, Result};
use crate::indexer::parse_util::{html_decode, lenient_u64};
use crate::indexer::request::{
    HttpAccept, IndexerRequest, RequestChain, RequestGenerator, encode_query, page_span,
};
use crate::indexer::response::{IndexerResponse, ResponseParser, parse_rows};
use crate::indexer::runner::IndexerComponents;
use crate::indexer::settings::{IndexerSettings, SettingDefinition};
use crate::indexer::types::{
    DownloadProtocol, IndexerDescriptor, IndexerPrivacy, ReleaseInfo, SeedPolicy,
};

pub const SETTINGS: &[SettingDefinition] = &[
    SettingDefinition::username("username", "Username"),
    SettingDefinition::password("password", "Password"),
    SettingDefinition::text("2fa_code", "Two-factor code")
        .with_help("Only needed when the account has two-factor authentication enabled"),
    SettingDefinition::checkbox("freeleech", "Freeleech only", false),
];

const PAGE_SIZE: u32 = 50;

pub fn descriptor() -> IndexerDescriptor {
    IndexerDescriptor {
        kind: "gazelle",
        name: "Gazelle",
        description: "Private tracker running the Gazelle JSON API",
        language: "en-US",
        privacy: IndexerPrivacy::Private,
        protocol: DownloadProtocol::Torrent,
        links: &[],
        ratioless: false,
        seed_policy: SeedPolicy::default(),
        session_ttl: Duration::from_secs(30 * 24 * 3600),
    }
}

pub fn capabilities() -> IndexerCapabilities {
    IndexerCapabilities {
        limits_max: 100,
        limits_default: PAGE_SIZE,
        music_search_params: vec![
            MusicSearchParam::Q,
            MusicSearchParam::Artist,
            MusicSearchParam::Album,
            MusicSearchParam::Label,
            MusicSearchParam::Year,
        ],
        book_search_params: vec![BookSearchParam::Q],
        supports_pagination: true,
        page_size: PAGE_SIZE,
        rate_limit: DEFAULT_RATE_LIMIT,
        categories: CategoryMap::new()
            .with("1", cats::AUDIO, "Music")
            .with("2", cats::PC, "Applications")
            .with("3", cats::BOOKS_EBOOK, "E-Books")
            .with("4", cats::AUDIO_AUDIOBOOK, "Audiobooks")
            .with("5", cats::OTHER, "E-Learning Videos")
            .with("6", cats::OTHER, "Comedy")
            .with("7", cats::BOOKS_COMICS, "Comics"),
        ..IndexerCapabilities::new()
    }
}

pub fn components(settings: &IndexerSettings) -> Result<IndexerComponents> {
    let capabilities = capabilities();
    let generator = GazelleRequestGenerator {
        api_url: settings.url("ajax.php"),
        categories: capabilities.categories.clone(),
        freeleech_only: settings.get_bool("freeleech"),
        limits_default: capabilities.limits_default,
    };
    let parser = GazelleParser {
        base_url: settings.base_url().to_string(),
        categories: capabilities.categories.clone(),
    };
    let auth = FormLoginAuth::new("login.php")
        .with_extra_field("keeplogged", "1")
        .with_optional_field("twofa", "2fa_code")
        .with_marker(LoginMarker::RedirectTo("login.php"))
        .with_marker(LoginMarker::BodyContains("\"bad credentials\""))
        .with_marker(LoginMarker::BodyContains("\"groupName\":\"wrong-creds\""))
        .with_marker(LoginMarker::BodyContains("Your username or password was incorrect"))
        .with_error_selector("form#loginform .warning, span.warning, p.error");

    Ok(IndexerComponents {
        descriptor: descriptor(),
        capabilities,
        generator: Box::new(generator),
        parser: Box::new(parser),
        auth: Box::new(auth),
    })
}

pub struct GazelleRequestGenerator {
    api_url: String,
    categories: CategoryMap,
    freeleech_only: bool,
    limits_default: u32,
}

impl GazelleRequestGenerator {
    fn browse(&self, criteria: &SearchCriteria, term: &str, extra: Vec<(String, String)>) -> RequestChain {
        let mut params: Vec<(String, String)> = vec![
            ("action".into(), "browse".into()),
            ("order_by".into(), "time".into()),
            ("order_way".into(), "desc".into()),
        ];
        if !term.is_empty() {
            params.push(("searchstr".into(), term.to_string()));
        }
        if let Some(natives) = self.categories.native_filter(&criteria.categories) {
            for native in natives {
                params.push((format!("filter_cat[{native}]"), "1".into()));
            }
        }
        if self.freeleech_only {
            params.push(("freetorrent".into(), "1".into()));
        }
        params.extend(extra);

        let limit = criteria.limit.filter(|&l| l > 0).unwrap_or(self.limits_default);
        let pages = page_span(limit, criteria.offset_or_zero(), PAGE_SIZE).map(|page| {
            let mut query = params.clone();
            query.push(("page".into(), page.to_string()));
            IndexerRequest::new(format!("{}?{}", self.api_url, encode_query(&query)), HttpAccept::Json)
                .with_source(criteria)
        });

        let mut chain = RequestChain::new();
        chain.add(pages);
        chain
    }
}

impl RequestGenerator for GazelleRequestGenerator {
    fn basic_search(&self, criteria: &SearchCriteria) -> Result<RequestChain> {
        Ok(self.browse(criteria, &criteria.sanitized_search_term(), vec![]))
    }

    fn music_search(&self, criteria: &SearchCriteria) -> Result<RequestChain> {
        let mut extra = Vec::new();
        let fields = [
            ("artistname", &criteria.artist),
            ("groupname", &criteria.album),
            ("recordlabel", &criteria.label),
        ];
        for (param, value) in fields {
            if let Some(value) = value.as_deref().filter(|v| !v.trim().is_empty()) {
                extra.push((param.to_string(), value.trim().to_string()));
            }
        }
        if let Some(year) = criteria.year {
            extra.push(("year".to_string(), year.to_string()));
        }
        Ok(self.browse(criteria, &criteria.sanitized_search_term(), extra))
    }
}

#[derive(Debug, Deserialize)]
struct GazelleEnvelope {
    status: Option<String>,
    response: Option<GazelleBrowse>,
}

#[derive(Debug, Deserialize)]
struct GazelleBrowse {
    #[serde(default)]
    results: Vec<Value>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GazelleGroup {
    #[serde(default, deserialize_with = "lenient_u64")]
    group_id: Option<u64>,
    #[serde(default)]
    group_name: String,
    artist: Option<String>,
    #[serde(default, deserialize_with = "lenient_u64")]
    group_year: Option<u64>,
    #[serde(default, deserialize_with = "lenient_u64")]
    group_time: Option<u64>,
    category: Option<String>,
    #[serde(default)]
    tags: Vec<String>,
    torrents: Option<Vec<Value>>,

    // Non-music groups carry a single torrent inline
    #[serde(default, deserialize_with = "lenient_u64")]
    torrent_id: Option<u64>,
    #[serde(default, deserialize_with = "lenient_u64")]
    size: Option<u64>,
    #[serde(default, deserialize_with = "lenient_u64")]
    seeders: Option<u64>,
    #[serde(default, deserialize_with = "lenient_u64")]
    leechers: Option<u64>,
    #[serde(default, deserialize_with = "lenient_u64")]
    snatches: Option<u64>,
    #[serde(default, deserialize_with = "lenient_u64")]
    file_count: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GazelleTorrent {
    #[serde(default, deserialize_with = "lenient_u64")]
    torrent_id: Option<u64>,
    format: Option<String>,
    encoding: Option<String>,
    media: Option<String>,
    #[serde(default)]
    has_cue: bool,
    time: Option<String>,
    category: Option<String>,
    #[serde(default, deserialize_with = "lenient_u64")]
    size: Option<u64>,
    #[serde(default, deserialize_with = "lenient_u64")]
    seeders: Option<u64>,
    #[serde(default, deserialize_with = "lenient_u64")]
    leechers: Option<u64>,
    #[serde(default, deserialize_with = "lenient_u64")]
    snatches: Option<u64>,
    #[serde(default, deserialize_with = "lenient_u64")]
    file_count: Option<u64>,
    #[serde(default)]
    is_freeleech: bool,
    #[serde(default)]
    is_neutral_leech: bool,
    #[serde(default)]
    is_personal_freeleech: bool,
}

fn count(value: Option<u64>) -> u32 {
    value.map_or(0, |v| u32::try_from(v).unwrap_or(u32::MAX))
}

pub struct GazelleParser {
    base_url: String,
    categories: CategoryMap,
}

impl GazelleParser {
    fn download_url(&self, torrent_id: u64) -> String {
        format!("{}/torrents.php?action=download&id={torrent_id}", self.base_url)
    }

    fn details_url(&self, group_id: Option<u64>, torrent_id: u64) -> String {
        format!(
            "{}/torrents.php?id={}&torrentid={torrent_id}",
            self.base_url,
            group_id.unwrap_or_default()
        )
    }

    /// Sites print the category name; "Select Category" means none was set
    fn map_category(&self, label: Option<&str>) -> Vec<i32> {
        let mapped = match label {
            Some(label) if !label.contains("Select Category") => self.categories.map_label_to_standard(label),
            _ => self.categories.map_native_to_standard("1"),
        };
        if mapped.is_empty() {
            vec![cats::OTHER]
        } else {
            mapped.into_iter().collect()
        }
    }

    fn base_release(
        &self,
        group: &GazelleGroup,
        torrent_id: Option<u64>,
        title: String,
        publish_date: DateTime<Utc>,
    ) -> Result<ReleaseInfo> {
        let torrent_id = torrent_id.ok_or_else(|| IndexerError::parse(format!("\"{title}\" has no torrent id")))?;
        let mut release = ReleaseInfo::new(title, format!("Gazelle-{torrent_id}"), publish_date);
        release.link = Some(self.download_url(torrent_id));
        release.details = Some(self.details_url(group.group_id, torrent_id));
        release.genres = group.tags.clone();
        release.year = group.group_year.and_then(|y| u32::try_from(y).ok()).filter(|&y| y > 0);
        Ok(release)
    }

    fn parse_torrent(&self, group: &GazelleGroup, torrent: &GazelleTorrent) -> Result<ReleaseInfo> {
        let artist = group.artist.as_deref().map(html_decode).unwrap_or_default();
        let album = html_decode(&group.group_name);

        let mut title = if artist.is_empty() {
            album
        } else {
            format!("{artist} - {album}")
        };
        if let Some(year) = group.group_year.filter(|&y| y > 0) {
            title.push_str(&format!(" ({year})"));
        }
        let quality = [torrent.format.as_deref(), torrent.encoding.as_deref()]
            .into_iter()
            .flatten()
            .collect::<Vec<_>>()
            .join(" ");
        if !quality.is_empty() {
            title.push_str(&format!(" [{quality}]"));
        }
        if let Some(media) = torrent.media.as_deref().filter(|m| !m.is_empty()) {
            title.push_str(&format!(" [{media}]"));
        }
        if torrent.has_cue {
            title.push_str(" [Cue]");
        }

        let time = torrent
            .time
            .as_deref()
            .ok_or_else(|| IndexerError::parse(format!("\"{title}\" has no upload time")))?;
        let utc = FixedOffset::east_opt(0).ok_or_else(|| IndexerError::parse("invalid offset"))?;
        let publish_date = dates::from_format(time, "%Y-%m-%d %H:%M:%S", utc)?;

        let mut release = self.base_release(group, torrent.torrent_id, title, publish_date)?;
        release.size = torrent.size;
        release.files = count(torrent.file_count);
        release.grabs = count(torrent.snatches);
        release = release.with_swarm(count(torrent.seeders), count(torrent.leechers));
        release.categories = self.map_category(torrent.category.as_deref().or(group.category.as_deref()));
        if torrent.is_freeleech || torrent.is_neutral_leech || torrent.is_personal_freeleech {
            release.download_volume_factor = 0.0;
        }
        if torrent.is_neutral_leech {
            release.upload_volume_factor = 0.0;
        }
        Ok(release)
    }

    fn parse_group(&self, group: &GazelleGroup) -> Result<ReleaseInfo> {
        let title = html_decode(&group.group_name);
        let publish_date = group
            .group_time
            .and_then(|t| i64::try_from(t).ok())
            .and_then(dates::from_unix)
            .ok_or_else(|| IndexerError::parse(format!("\"{title}\" has no upload time")))?;

        let mut release = self.base_release(group, group.torrent_id, title, publish_date)?;
        release.size = group.size;
        release.files = count(group.file_count);
        release.grabs = count(group.snatches);
        release = release.with_swarm(count(group.seeders), count(group.leechers));
        release.categories = self.map_category(group.category.as_deref());
        Ok(release)
    }
}

/// Groups and torrents are typed one at a time; a malformed one becomes a failed row
enum GazelleRow<'a> {
    Torrent(&'a GazelleGroup, &'a Value),
    Group(&'a GazelleGroup),
    Malformed(String),
}

impl ResponseParser for GazelleParser {
    fn parse(&self, response: &IndexerResponse) -> Result<Vec<ReleaseInfo>> {
        response.ensure_status(200)?;
        response.ensure_content_type()?;

        let envelope: GazelleEnvelope = response.json()?;
        let browse = match (envelope.status.as_deref(), envelope.response) {
            (Some("success"), Some(browse)) => browse,
            _ => return Ok(vec![]),
        };

        let groups: Vec<std::result::Result<GazelleGroup, serde_json::Error>> = browse
            .results
            .into_iter()
            .map(serde_json::from_value)
            .collect();

        let rows = groups.iter().flat_map(|group| match group {
            Ok(group) => match &group.torrents {
                Some(torrents) => torrents
                    .iter()
                    .map(|t| GazelleRow::Torrent(group, t))
                    .collect::<Vec<_>>(),
                None => vec![GazelleRow::Group(group)],
            },
            Err(e) => vec![GazelleRow::Malformed(e.to_string())],
        });

        let mut releases = parse_rows("gazelle", rows, |row| match row {
            GazelleRow::Torrent(group, torrent) => {
                let torrent: GazelleTorrent = serde_json::from_value(torrent.clone())?;
                self.parse_torrent(group, &torrent)
            }
            GazelleRow::Group(group) => self.parse_group(group),
            GazelleRow::Malformed(reason) => Err(IndexerError::parse(format!("invalid group: {reason}"))),
        })?;

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

    fn generator(freeleech_only: bool) -> GazelleRequestGenerator {
        GazelleRequestGenerator {
            api_url: "https://music.example/ajax.php".to_string(),
            categories: capabilities().categories,
            freeleech_only,
            limits_default: PAGE_SIZE,
        }
    }

    fn parser() -> GazelleParser {
        GazelleParser {
            base_url: "https://music.example".to_string(),
            categories: capabilities().categories,
        }
    }

    fn response(body: &str) -> IndexerResponse {
        IndexerResponse::new(
            IndexerRequest::new("https://music.example/ajax.php?action=browse", HttpAccept::Json),
            HttpResponse::new("https://music.example/ajax.php?action=browse", 200, body)
                .with_header("content-type", "application/json; charset=utf-8"),
        )
    }

    const BROWSE: &str = r#"{
      "status": "success",
      "response": {
        "currentPage": 1,
        "pages": 1,
        "results": [
          {
            "groupId": 10,
            "groupName": "Kid A",
            "artist": "Radiohead &amp; Friends",
            "groupYear": 2000,
            "tags": ["rock", "electronic"],
            "torrents": [
              {
                "torrentId": 100,
                "format": "FLAC",
                "encoding": "Lossless",
                "media": "CD",
                "hasCue": true,
                "time": "2024-03-10 12:00:00",
                "size": 400000000,
                "seeders": 25,
                "leechers": 2,
                "snatches": 80,
                "fileCount": 11,
                "isFreeleech": true
              },
              {
                "torrentId": 101,
                "format": "MP3",
                "encoding": "320",
                "media": "WEB",
                "time": "2024-03-12 08:30:00",
                "size": "120000000",
                "leechers": "1",
                "snatches": "4",
                "fileCount": 11
              },
              {
                "format": "MP3",
                "time": "2024-03-12 08:30:00"
              }
            ]
          },
          {
            "groupId": 11,
            "groupName": "Learning Rust",
            "category": "E-Books",
            "torrentId": 200,
            "groupTime": 1710000000,
            "size": 5000000,
            "seeders": 3,
            "leechers": 0
          }
        ]
      }
    }"#;

    #[test]
    fn test_basic_search_request() {
        let chain = generator(false)
            .search_requests(&SearchCriteria::basic("kid a"))
            .unwrap();
        assert_eq!(
            chain.first_request().unwrap().url(),
            "https://music.example/ajax.php?action=browse&order_by=time&order_way=desc&searchstr=kid+a&page=1"
        );
    }

    #[test]
    fn test_music_search_and_filters() {
        let criteria = SearchCriteria::music("")
            .with_artist_album(Some("Radiohead"), Some("Kid A"))
            .with_categories(vec![cats::AUDIO])
            .with_paging(100, 0);
        let chain = generator(true).search_requests(&criteria).unwrap();
        let urls: Vec<String> = chain
            .tiers()
            .flat_map(|t| t.iter().flatten().map(|r| r.url().to_string()).collect::<Vec<_>>())
            .collect();

        assert_eq!(urls.len(), 2);
        assert!(urls[0].contains("filter_cat%5B1%5D=1"));
        assert!(urls[0].contains("freetorrent=1"));
        assert!(urls[0].contains("artistname=Radiohead"));
        assert!(urls[0].contains("groupname=Kid+A"));
        assert!(urls[0].ends_with("page=1"));
        assert!(urls[1].ends_with("page=2"));
    }

    #[test]
    fn test_parse_browse() {
        let releases = parser().parse(&response(BROWSE)).unwrap();
        assert_eq!(releases.len(), 3);

        // newest first
        assert_eq!(releases[0].guid, "Gazelle-101");
        assert_eq!(releases[0].seeders, 0);
        assert_eq!(releases[0].peers, 1);
        assert_eq!(releases[0].size, Some(120_000_000));

        let flac = releases.iter().find(|r| r.guid == "Gazelle-100").unwrap();
        assert_eq!(
            flac.title,
            "Radiohead & Friends - Kid A (2000) [FLAC Lossless] [CD] [Cue]"
        );
        assert_eq!(flac.download_volume_factor, 0.0);
        assert_eq!(flac.categories, vec![cats::AUDIO]);
        assert_eq!(flac.link.as_deref(), Some("https://music.example/torrents.php?action=download&id=100"));
        assert_eq!(flac.details.as_deref(), Some("https://music.example/torrents.php?id=10&torrentid=100"));
        assert_eq!(flac.genres, vec!["rock".to_string(), "electronic".to_string()]);

        let book = releases.iter().find(|r| r.guid == "Gazelle-200").unwrap();
        assert_eq!(book.categories, vec![cats::BOOKS_EBOOK]);
        assert_eq!(book.publish_date.timestamp(), 1_710_000_000);
    }

    #[test]
    fn test_mistyped_torrent_is_skipped() {
        let body = r#"{"status": "success", "response": {"results": [
          {"groupId": 1, "groupName": "Album", "artist": "Band", "torrents": [
            {"torrentId": 5, "format": "FLAC", "time": "2024-03-10 12:00:00", "isFreeleech": null},
            {"torrentId": 6, "format": "MP3", "time": "2024-03-11 12:00:00", "isFreeleech": false}
          ]},
          {"groupId": 2, "groupName": "Other", "tags": "not-a-list", "torrentId": 7, "groupTime": 1710000000}
        ]}}"#;
        let releases = parser().parse(&response(body)).unwrap();
        assert_eq!(releases.len(), 1);
        assert_eq!(releases[0].guid, "Gazelle-6");
    }

    #[test]
    fn test_failure_status_is_empty() {
        let releases = parser()
            .parse(&response(r#"{"status":"failure","error":"bad parameters"}"#))
            .unwrap();
        assert!(releases.is_empty());
    }

    #[test]
    fn test_html_instead_of_json() {
        let html = IndexerResponse::new(
            IndexerRequest::new("https://music.example/ajax.php", HttpAccept::Json),
            HttpResponse::new("https://music.example/ajax.php", 200, "<html></html>")
                .with_header("content-type", "text/html"),
        );
        assert_matches!(parser().parse(&html), Err(IndexerError::UnexpectedContentType { .. }));
    }
}
