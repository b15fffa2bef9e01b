//! Newznab API indexers (usenet).
//!
//! Newznab is the common API of usenet indexers. Requests go to
//! `{base}{api_path}?t=<function>&extended=1`; results come back as RSS with
//! `newznab:attr` extension elements. The API key is attached by
//! [`ApiKeyAuth`] so generated requests never carry it.
//!
//! Searches with structured parameters (ids, season, artist, ...) use the
//! domain function (`tvsearch`, `movie`, ...). Without any, the request falls
//! back to `t=search`, since several indexers return unrelated results for
//! domain functions given a bare term. An id search with a term gets a second
//! tier that retries as a plain text search.

use std::time::Duration;

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use tracing::{debug, warn};

use crate::indexer::auth::ApiKeyAuth;
use crate::indexer::capabilities::{
    BookSearchParam, DEFAULT_RATE_LIMIT, IndexerCapabilities, MovieSearchParam, MusicSearchParam,
    TvSearchParam,
};
use crate::indexer::categories::{CategoryMap, cats};
use crate::indexer::criteria::SearchCriteria;
use crate::indexer::dates;
use crate::indexer::error::{IndexerError, Result};
use crate::indexer::parse_util::imdb_id_number;
use crate::indexer::request::{
    HttpAccept, IndexerRequest, PageableRequest, RequestChain, RequestGenerator, encode_query,
};
use crate::indexer::response::{IndexerResponse, ResponseParser, parse_rows};
use crate::indexer::runner::IndexerComponents;
use crate::indexer::settings::{IndexerSettings, SettingDefinition};
use crate::indexer::types::{
    DownloadProtocol, IndexerDescriptor, IndexerPrivacy, ReleaseInfo, SeedPolicy,
};

pub const SETTINGS: &[SettingDefinition] = &[
    SettingDefinition::text("api_path", "API Path")
        .with_default("/api")
        .with_help("Path to the api, usually /api"),
    SettingDefinition::api_key("apikey", "API Key").optional(),
    SettingDefinition::text("additional_parameters", "Additional Parameters")
        .with_help("Appended verbatim to every request, e.g. &attrs=poster"),
];

const NZB_MIME: &str = "application/x-nzb";

pub fn descriptor() -> IndexerDescriptor {
    IndexerDescriptor {
        kind: "newznab",
        name: "Newznab",
        description: "Generic Newznab API usenet indexer",
        language: "en-US",
        privacy: IndexerPrivacy::Private,
        protocol: DownloadProtocol::Usenet,
        links: &[],
        ratioless: false,
        seed_policy: SeedPolicy::default(),
        session_ttl: Duration::from_secs(30 * 24 * 3600),
    }
}

pub fn capabilities() -> IndexerCapabilities {
    use TvSearchParam as Tv;
    IndexerCapabilities {
        tv_search_params: vec![
            Tv::Q,
            Tv::Season,
            Tv::Ep,
            Tv::TvdbId,
            Tv::ImdbId,
            Tv::TvmazeId,
            Tv::RId,
        ],
        movie_search_params: vec![
            MovieSearchParam::Q,
            MovieSearchParam::ImdbId,
            MovieSearchParam::TmdbId,
            MovieSearchParam::TraktId,
        ],
        music_search_params: vec![
            MusicSearchParam::Q,
            MusicSearchParam::Artist,
            MusicSearchParam::Album,
        ],
        book_search_params: vec![
            BookSearchParam::Q,
            BookSearchParam::Author,
            BookSearchParam::Title,
        ],
        supports_pagination: true,
        page_size: 100,
        rate_limit: DEFAULT_RATE_LIMIT,
        follow_redirect: true,
        categories: default_categories(),
        ..IndexerCapabilities::new()
    }
}

/// Newznab sites use the standard ids as their own
fn default_categories() -> CategoryMap {
    CategoryMap::new()
        .with("2000", cats::MOVIES, "Movies")
        .with("2010", cats::MOVIES_FOREIGN, "Movies/Foreign")
        .with("2020", cats::MOVIES_OTHER, "Movies/Other")
        .with("2030", cats::MOVIES_SD, "Movies/SD")
        .with("2040", cats::MOVIES_HD, "Movies/HD")
        .with("2045", cats::MOVIES_UHD, "Movies/UHD")
        .with("2050", cats::MOVIES_BLURAY, "Movies/BluRay")
        .with("2060", cats::MOVIES_3D, "Movies/3D")
        .with("3000", cats::AUDIO, "Audio")
        .with("3010", cats::AUDIO_MP3, "Audio/MP3")
        .with("3020", cats::AUDIO_VIDEO, "Audio/Video")
        .with("3030", cats::AUDIO_AUDIOBOOK, "Audio/Audiobook")
        .with("3040", cats::AUDIO_LOSSLESS, "Audio/Lossless")
        .with("4000", cats::PC, "PC")
        .with("5000", cats::TV, "TV")
        .with("5020", cats::TV_FOREIGN, "TV/Foreign")
        .with("5030", cats::TV_SD, "TV/SD")
        .with("5040", cats::TV_HD, "TV/HD")
        .with("5045", cats::TV_UHD, "TV/UHD")
        .with("5060", cats::TV_SPORT, "TV/Sport")
        .with("5070", cats::TV_ANIME, "TV/Anime")
        .with("5080", cats::TV_DOCUMENTARY, "TV/Documentary")
        .with("7000", cats::BOOKS, "Books")
        .with("7020", cats::BOOKS_EBOOK, "Books/EBook")
        .with("7030", cats::BOOKS_COMICS, "Books/Comics")
        .with("8000", cats::OTHER, "Other")
}

pub fn components(settings: &IndexerSettings) -> Result<IndexerComponents> {
    let capabilities = capabilities();
    let api_path = settings.get("api_path").unwrap_or("/api");
    if !api_path.starts_with('/') {
        return Err(IndexerError::configuration("API path must start with '/'"));
    }

    let generator = NewznabRequestGenerator {
        api_url: format!("{}{}", settings.base_url(), api_path.trim_end_matches('/')),
        additional_parameters: settings.get("additional_parameters").map(str::to_string),
        categories: capabilities.categories.clone(),
        limits_default: capabilities.limits_default,
        page_size: capabilities.page_size,
    };
    let parser = NewznabParser {
        categories: capabilities.categories.clone(),
        has_api_key: settings.get("apikey").is_some(),
    };

    Ok(IndexerComponents {
        descriptor: descriptor(),
        capabilities,
        generator: Box::new(generator),
        parser: Box::new(parser),
        auth: Box::new(ApiKeyAuth::query("apikey", "apikey")),
    })
}

pub struct NewznabRequestGenerator {
    api_url: String,
    additional_parameters: Option<String>,
    categories: CategoryMap,
    limits_default: u32,
    page_size: u32,
}

impl NewznabRequestGenerator {
    /// One request per page of `page_size` results covering the requested window
    fn paged_requests(
        &self,
        criteria: &SearchCriteria,
        function: &str,
        params: &[(&str, String)],
    ) -> PageableRequest {
        let mut base = format!("{}?t={}&extended=1", self.api_url, function);
        if let Some(natives) = self.categories.native_filter(&criteria.categories) {
            if !natives.is_empty() {
                base.push_str(&format!("&cat={}", natives.join(",")));
            }
        }
        if let Some(extra) = &self.additional_parameters {
            base.push_str(extra);
        }

        let total = criteria.limit.filter(|&l| l > 0).unwrap_or(self.limits_default);
        let start = criteria.offset_or_zero();
        let end = start.saturating_add(total);
        let step = self.page_size.max(1);

        let mut pages = Vec::new();
        let mut offset = start;
        while offset < end {
            let limit = step.min(end - offset);
            let mut query: Vec<(&str, String)> = params.to_vec();
            query.push(("limit", limit.to_string()));
            query.push(("offset", offset.to_string()));

            pages.push(
                IndexerRequest::new(format!("{base}&{}", encode_query(&query)), HttpAccept::Rss)
                    .with_source(criteria),
            );
            offset += limit;
        }
        pages
    }

    /// Build the domain request, or a `t=search` request when no structured
    /// parameter is present. An id search with a term adds a text fallback tier.
    fn domain_chain(
        &self,
        criteria: &SearchCriteria,
        function: &str,
        params: Vec<(&'static str, String)>,
        fallback_term: String,
    ) -> RequestChain {
        let term = criteria.sanitized_search_term();
        let mut chain = RequestChain::new();

        if params.is_empty() {
            let query = text_query(&term);
            chain.add(self.paged_requests(criteria, "search", &query));
            return chain;
        }

        let mut query = params;
        if !term.is_empty() {
            query.push(("q", term.clone()));
        }
        chain.add(self.paged_requests(criteria, function, &query));

        if criteria.is_id_search() && !fallback_term.trim().is_empty() {
            chain.add_tier_with(self.paged_requests(criteria, "search", &text_query(&fallback_term)));
        }
        chain
    }
}

fn text_query(term: &str) -> Vec<(&'static str, String)> {
    if term.trim().is_empty() {
        vec![]
    } else {
        vec![("q", term.trim().to_string())]
    }
}

fn imdb_param(criteria: &SearchCriteria) -> Option<String> {
    criteria.imdb_id_short().map(|id| format!("{id:07}"))
}

impl RequestGenerator for NewznabRequestGenerator {
    fn basic_search(&self, criteria: &SearchCriteria) -> Result<RequestChain> {
        let mut chain = RequestChain::new();
        chain.add(self.paged_requests(
            criteria,
            "search",
            &text_query(&criteria.sanitized_search_term()),
        ));
        Ok(chain)
    }

    fn tv_search(&self, criteria: &SearchCriteria) -> Result<RequestChain> {
        let mut params = Vec::new();
        if let Some(id) = criteria.tvdb_id {
            params.push(("tvdbid", id.to_string()));
        }
        if let Some(id) = imdb_param(criteria) {
            params.push(("imdbid", id));
        }
        if let Some(id) = criteria.tvmaze_id {
            params.push(("tvmazeid", id.to_string()));
        }
        if let Some(id) = criteria.rage_id {
            params.push(("rid", id.to_string()));
        }
        // Zero-padded: some indexers mishandle season=0
        if let Some(season) = criteria.season {
            params.push(("season", format!("{season:02}")));
        }
        if let Some(ep) = criteria.episode.as_deref().filter(|e| !e.trim().is_empty()) {
            params.push(("ep", ep.trim().to_string()));
        }

        Ok(self.domain_chain(
            criteria,
            "tvsearch",
            params,
            criteria.sanitized_tv_search_string(),
        ))
    }

    fn movie_search(&self, criteria: &SearchCriteria) -> Result<RequestChain> {
        let mut params = Vec::new();
        if let Some(id) = criteria.tmdb_id {
            params.push(("tmdbid", id.to_string()));
        }
        if let Some(id) = imdb_param(criteria) {
            params.push(("imdbid", id));
        }
        if let Some(id) = criteria.trakt_id {
            params.push(("traktid", id.to_string()));
        }

        Ok(self.domain_chain(criteria, "movie", params, criteria.sanitized_search_term()))
    }

    fn music_search(&self, criteria: &SearchCriteria) -> Result<RequestChain> {
        let mut params = Vec::new();
        if let Some(artist) = criteria.artist.as_deref().filter(|a| !a.trim().is_empty()) {
            params.push(("artist", artist.trim().to_string()));
        }
        if let Some(album) = criteria.album.as_deref().filter(|a| !a.trim().is_empty()) {
            params.push(("album", album.trim().to_string()));
        }

        Ok(self.domain_chain(criteria, "music", params, String::new()))
    }

    fn book_search(&self, criteria: &SearchCriteria) -> Result<RequestChain> {
        let mut params = Vec::new();
        if let Some(author) = criteria.author.as_deref().filter(|a| !a.trim().is_empty()) {
            params.push(("author", author.trim().to_string()));
        }
        if let Some(title) = criteria.title.as_deref().filter(|t| !t.trim().is_empty()) {
            params.push(("title", title.trim().to_string()));
        }

        Ok(self.domain_chain(criteria, "book", params, String::new()))
    }
}

/// One `<item>` as read from the feed, before normalization
#[derive(Debug, Default)]
struct NewznabItem {
    title: Option<String>,
    guid: Option<String>,
    link: Option<String>,
    comments: Option<String>,
    pub_date: Option<String>,
    description: Option<String>,
    categories: Vec<String>,
    /// (url, length, type)
    enclosures: Vec<(String, Option<u64>, Option<String>)>,
    attrs: Vec<(String, String)>,
}

impl NewznabItem {
    fn attr(&self, names: &[&str]) -> Option<&str> {
        names.iter().find_map(|name| {
            self.attrs
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(name))
                .map(|(_, v)| v.as_str())
                .filter(|v| !v.trim().is_empty())
        })
    }

    fn attrs_named(&self, name: &str) -> Vec<&str> {
        self.attrs
            .iter()
            .filter(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
            .collect()
    }

    fn number(&self, names: &[&str]) -> Option<u32> {
        self.attr(names).and_then(|v| v.trim().parse().ok())
    }

    /// Items that only carry non-NZB enclosures belong to some other feed type
    fn has_nzb(&self) -> bool {
        self.enclosures.is_empty()
            || self
                .enclosures
                .iter()
                .any(|(_, _, mime)| mime.as_deref().is_none_or(|m| m == NZB_MIME))
    }

    fn set_text(&mut self, tag: &str, text: String) {
        let text = text.trim().to_string();
        if text.is_empty() {
            return;
        }
        match tag {
            "title" => self.title = Some(text),
            "guid" => self.guid = Some(text),
            "link" => self.link = Some(text),
            "comments" => self.comments = Some(text),
            "pubDate" => self.pub_date = Some(text),
            "description" => self.description = Some(text),
            "category" => self.categories.push(text),
            _ => {}
        }
    }
}

#[derive(Debug, Default)]
struct NewznabFeed {
    error: Option<(u32, String)>,
    items: Vec<NewznabItem>,
}

fn attributes(e: &BytesStart<'_>) -> Vec<(String, String)> {
    e.attributes()
        .flatten()
        .map(|attr| {
            let key = String::from_utf8_lossy(attr.key.as_ref()).to_string();
            let value = attr
                .unescape_value()
                .map(|v| v.to_string())
                .unwrap_or_else(|_| String::from_utf8_lossy(&attr.value).to_string());
            (key, value)
        })
        .collect()
}

fn read_feed(xml: &str) -> Result<NewznabFeed> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut feed = NewznabFeed::default();
    let mut current: Option<NewznabItem> = None;
    let mut current_tag = String::new();

    loop {
        let event = reader.read_event()?;
        match event {
            Event::Start(ref e) | Event::Empty(ref e) => {
                let is_empty = matches!(event, Event::Empty(_));
                let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                let local = String::from_utf8_lossy(e.local_name().as_ref()).to_string();

                match (local.as_str(), current.as_mut()) {
                    ("item", None) if !is_empty => current = Some(NewznabItem::default()),
                    ("error", None) => {
                        let attrs = attributes(e);
                        let get = |k: &str| {
                            attrs
                                .iter()
                                .find(|(key, _)| key == k)
                                .map(|(_, v)| v.clone())
                                .unwrap_or_default()
                        };
                        let code = get("code").trim().parse().unwrap_or(0);
                        feed.error = Some((code, get("description")));
                    }
                    ("attr", Some(item)) if name.contains(':') => {
                        let attrs = attributes(e);
                        let find = |k: &str| attrs.iter().find(|(key, _)| key == k).map(|(_, v)| v.clone());
                        if let (Some(n), Some(v)) = (find("name"), find("value")) {
                            item.attrs.push((n, v));
                        }
                    }
                    ("enclosure", Some(item)) => {
                        let attrs = attributes(e);
                        let find = |k: &str| attrs.iter().find(|(key, _)| key == k).map(|(_, v)| v.clone());
                        if let Some(url) = find("url") {
                            let length = find("length").and_then(|l| l.trim().parse().ok());
                            item.enclosures.push((url, length, find("type")));
                        }
                    }
                    (_, Some(_)) if !is_empty => current_tag = name,
                    _ => {}
                }
            }
            Event::Text(ref e) => {
                if let Some(item) = current.as_mut() {
                    let text = e.unescape().map(|t| t.to_string()).unwrap_or_default();
                    item.set_text(&current_tag, text);
                }
            }
            Event::CData(e) => {
                if let Some(item) = current.as_mut() {
                    let text = String::from_utf8_lossy(&e.into_inner()).to_string();
                    item.set_text(&current_tag, text);
                }
            }
            Event::End(ref e) => {
                if e.local_name().as_ref() == b"item" {
                    if let Some(item) = current.take() {
                        feed.items.push(item);
                    }
                }
                current_tag.clear();
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(feed)
}

pub struct NewznabParser {
    categories: CategoryMap,
    has_api_key: bool,
}

impl NewznabParser {
    fn check_error(&self, code: u32, description: &str) -> IndexerError {
        if (100..=199).contains(&code) {
            return IndexerError::authentication(description);
        }
        if !self.has_api_key && (description == "Missing parameter" || description.contains("apikey")) {
            return IndexerError::authentication("Indexer requires an API key");
        }
        if description == "Request limit reached" {
            return IndexerError::RequestLimitReached { retry_after: None };
        }
        IndexerError::parse(format!("Newznab error {code}: {description}"))
    }

    fn build(&self, item: NewznabItem) -> Result<ReleaseInfo> {
        let title = item
            .title
            .clone()
            .ok_or_else(|| IndexerError::parse("item has no title"))?;

        let nzb_enclosure = item
            .enclosures
            .iter()
            .find(|(_, _, mime)| mime.as_deref().is_none_or(|m| m == NZB_MIME));
        let link = item
            .link
            .clone()
            .filter(|l| url::Url::parse(l).is_ok())
            .or_else(|| nzb_enclosure.map(|(url, _, _)| url.clone()))
            .ok_or_else(|| IndexerError::parse(format!("\"{title}\" has no download link")))?;

        let date_text = item
            .attr(&["usenetdate"])
            .or(item.pub_date.as_deref())
            .ok_or_else(|| IndexerError::parse(format!("\"{title}\" has no publish date")))?;
        let publish_date = dates::from_rfc2822(date_text)?;

        let guid = item.guid.clone().unwrap_or_else(|| link.clone());
        let mut release = ReleaseInfo::new(title, guid, publish_date);
        release.link = Some(link);
        release.details = item
            .comments
            .as_deref()
            .map(|c| c.trim_end_matches("#comments").to_string());
        release.description = item.description.clone();
        release.protocol = DownloadProtocol::Usenet;

        release.size = item
            .attr(&["size"])
            .and_then(|s| s.trim().parse().ok())
            .or_else(|| nzb_enclosure.and_then(|(_, length, _)| *length));

        let mut native_cats: Vec<&str> = item.attrs_named("category");
        if native_cats.is_empty() {
            native_cats = item.categories.iter().map(String::as_str).collect();
        }
        let mut categories: Vec<i32> = native_cats
            .iter()
            .flat_map(|c| self.categories.map_native_to_standard(c))
            .collect();
        categories.sort_unstable();
        categories.dedup();
        if categories.is_empty() {
            categories.push(cats::OTHER);
        }
        release.categories = categories;

        release.grabs = item.number(&["grabs"]).unwrap_or(0);
        release.files = item.number(&["files"]).unwrap_or(0);
        release.imdb_id = item.attr(&["imdb", "imdbid"]).and_then(imdb_id_number);
        release.tmdb_id = item.number(&["tmdbid", "tmdb"]);
        release.tvdb_id = item.number(&["tvdbid", "tvdb"]);
        release.year = item.number(&["imdbyear", "year"]);
        release.poster = item.attr(&["coverurl"]).map(str::to_string);
        if let Some(genre) = item.attr(&["genre"]) {
            release.genres = genre
                .split(',')
                .map(|g| g.trim().to_string())
                .filter(|g| !g.is_empty())
                .collect();
        }

        Ok(release)
    }
}

impl ResponseParser for NewznabParser {
    fn parse(&self, response: &IndexerResponse) -> Result<Vec<ReleaseInfo>> {
        let is_xml = response
            .http
            .media_type()
            .is_none_or(|m| m.contains("xml"));
        if !is_xml {
            response.ensure_status(200)?;
            response.ensure_content_type()?;
        }

        let feed = read_feed(response.content())?;
        if let Some((code, description)) = &feed.error {
            return Err(self.check_error(*code, description));
        }
        response.ensure_status(200)?;

        let (items, skipped): (Vec<_>, Vec<_>) = feed.items.into_iter().partition(NewznabItem::has_nzb);
        if !skipped.is_empty() {
            warn!(skipped = skipped.len(), "Feed items without an NZB enclosure, is this a Torznab feed?");
        }

        let releases = parse_rows("newznab", items, |item| self.build(item))?;
        debug!(releases = releases.len(), "Parsed Newznab feed");
        Ok(releases)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indexer::http::HttpResponse;
    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;

    fn settings() -> IndexerSettings {
        IndexerSettings::new()
            .with_base_url("https://nzb.example/")
            .with("apikey", "secretkey")
            .resolve(SETTINGS, descriptor().links)
            .unwrap()
    }

    fn generator() -> NewznabRequestGenerator {
        let caps = capabilities();
        NewznabRequestGenerator {
            api_url: "https://nzb.example/api".to_string(),
            additional_parameters: None,
            categories: caps.categories,
            limits_default: caps.limits_default,
            page_size: caps.page_size,
        }
    }

    fn urls(chain: &RequestChain) -> Vec<Vec<String>> {
        chain
            .tiers()
            .map(|tier| tier.iter().flatten().map(|r| r.url().to_string()).collect())
            .collect()
    }

    const FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0" xmlns:newznab="http://www.newznab.com/DTD/2010/feeds/attributes/">
<channel>
  <title>example</title>
  <item>
    <title>Some.Show.S01E05.720p.HDTV</title>
    <guid isPermaLink="true">https://nzb.example/details/abc</guid>
    <link>https://nzb.example/getnzb/abc.nzb&amp;i=1</link>
    <comments>https://nzb.example/details/abc#comments</comments>
    <pubDate>Fri, 15 Mar 2024 10:00:00 +0000</pubDate>
    <category>TV &gt; HD</category>
    <description><![CDATA[Some show]]></description>
    <enclosure url="https://nzb.example/getnzb/abc.nzb" length="1048576" type="application/x-nzb"/>
    <newznab:attr name="category" value="5000"/>
    <newznab:attr name="category" value="5040"/>
    <newznab:attr name="size" value="2147483648"/>
    <newznab:attr name="grabs" value="12"/>
    <newznab:attr name="tvdbid" value="12345"/>
    <newznab:attr name="imdb" value="0944947"/>
    <newznab:attr name="usenetdate" value="Thu, 14 Mar 2024 09:00:00 +0000"/>
  </item>
  <item>
    <title>No.Link.Item</title>
    <pubDate>Fri, 15 Mar 2024 10:00:00 +0000</pubDate>
  </item>
  <item>
    <title>Torrent.Item</title>
    <enclosure url="https://nzb.example/t.torrent" type="application/x-bittorrent"/>
  </item>
  <item>
    <title>Unknown.Category</title>
    <link>https://nzb.example/getnzb/def.nzb</link>
    <pubDate>2024-03-15T08:00:00Z</pubDate>
    <newznab:attr name="category" value="9999"/>
  </item>
</channel>
</rss>"#;

    fn response(status: u16, body: &str) -> IndexerResponse {
        IndexerResponse::new(
            IndexerRequest::new("https://nzb.example/api?t=search", HttpAccept::Rss),
            HttpResponse::new("https://nzb.example/api?t=search", status, body)
                .with_header("content-type", "application/rss+xml; charset=utf-8"),
        )
    }

    fn parser(has_api_key: bool) -> NewznabParser {
        NewznabParser {
            categories: default_categories(),
            has_api_key,
        }
    }

    #[test]
    fn test_basic_search_request() {
        let criteria = SearchCriteria::basic("foo bar");
        let chain = generator().search_requests(&criteria).unwrap();
        assert_eq!(
            urls(&chain),
            vec![vec![
                "https://nzb.example/api?t=search&extended=1&q=foo+bar&limit=100&offset=0".to_string()
            ]]
        );
    }

    #[test]
    fn test_components_keep_api_key_out_of_generated_urls() {
        let components = components(&settings()).unwrap();
        let chain = components
            .generator
            .search_requests(&SearchCriteria::rss())
            .unwrap();
        let url = chain.first_request().unwrap().url().to_string();
        assert!(url.starts_with("https://nzb.example/api?t=search&extended=1"));
        assert!(!url.contains("secretkey"));
    }

    #[test]
    fn test_tv_search_uses_ids_with_text_fallback_tier() {
        let criteria = SearchCriteria::tv("Some Show")
            .with_tvdb(12345)
            .with_season_episode(1, Some("5"));
        let chain = generator().search_requests(&criteria).unwrap();
        let urls = urls(&chain);

        assert_eq!(urls.len(), 2);
        assert!(urls[0][0].contains("t=tvsearch"));
        assert!(urls[0][0].contains("tvdbid=12345"));
        assert!(urls[0][0].contains("season=01"));
        assert!(urls[0][0].contains("ep=5"));
        assert!(urls[1][0].contains("t=search"));
        assert!(urls[1][0].contains("q=Some+Show+S01E05"));
    }

    #[test]
    fn test_tv_search_without_structured_params_falls_back_to_search() {
        let criteria = SearchCriteria::tv("Some Show");
        let chain = generator().search_requests(&criteria).unwrap();
        let urls = urls(&chain);
        assert_eq!(urls.len(), 1);
        assert!(urls[0][0].contains("t=search&"));
    }

    #[test]
    fn test_movie_search_pads_imdb_id() {
        let criteria = SearchCriteria::movie("").with_imdb("tt0076759");
        let chain = generator().search_requests(&criteria).unwrap();
        let urls = urls(&chain);
        assert_eq!(urls.len(), 1);
        assert!(urls[0][0].contains("t=movie"));
        assert!(urls[0][0].contains("imdbid=0076759"));
    }

    #[test]
    fn test_category_filter() {
        let criteria = SearchCriteria::basic("x").with_categories(vec![cats::TV_HD]);
        let chain = generator().search_requests(&criteria).unwrap();
        assert!(chain.first_request().unwrap().url().contains("&cat=5040"));

        let unfiltered = SearchCriteria::basic("x");
        let chain = generator().search_requests(&unfiltered).unwrap();
        assert!(!chain.first_request().unwrap().url().contains("cat="));
    }

    #[test]
    fn test_pages_cover_requested_window() {
        let criteria = SearchCriteria::basic("x").with_paging(250, 100);
        let chain = generator().search_requests(&criteria).unwrap();
        let urls = urls(&chain);
        assert_eq!(urls[0].len(), 3);
        assert!(urls[0][0].ends_with("limit=100&offset=100"));
        assert!(urls[0][1].ends_with("limit=100&offset=200"));
        assert!(urls[0][2].ends_with("limit=50&offset=300"));
    }

    #[test]
    fn test_parse_feed() {
        let releases = parser(true).parse(&response(200, FEED)).unwrap();
        assert_eq!(releases.len(), 2);

        let first = &releases[0];
        assert_eq!(first.title, "Some.Show.S01E05.720p.HDTV");
        assert_eq!(first.guid, "https://nzb.example/details/abc");
        assert_eq!(first.link.as_deref(), Some("https://nzb.example/getnzb/abc.nzb&i=1"));
        assert_eq!(first.details.as_deref(), Some("https://nzb.example/details/abc"));
        assert_eq!(first.categories, vec![cats::TV, cats::TV_HD]);
        assert_eq!(first.size, Some(2_147_483_648));
        assert_eq!(first.grabs, 12);
        assert_eq!(first.tvdb_id, Some(12345));
        assert_eq!(first.imdb_id, Some(944947));
        assert_eq!(first.description.as_deref(), Some("Some show"));
        assert_eq!(first.publish_date.to_rfc3339(), "2024-03-14T09:00:00+00:00");
        assert_eq!(first.protocol, DownloadProtocol::Usenet);

        let second = &releases[1];
        assert_eq!(second.categories, vec![cats::OTHER]);
        assert_eq!(second.size, None);
        assert_eq!(second.guid, "https://nzb.example/getnzb/def.nzb");
    }

    #[test]
    fn test_parse_is_repeatable() {
        let p = parser(true);
        let r = response(200, FEED);
        assert_eq!(p.parse(&r).unwrap(), p.parse(&r).unwrap());
    }

    #[test]
    fn test_error_codes() {
        let auth = r#"<?xml version="1.0"?><error code="100" description="Incorrect user credentials"/>"#;
        assert_matches!(
            parser(true).parse(&response(200, auth)),
            Err(IndexerError::Authentication { message }) if message == "Incorrect user credentials"
        );

        let missing = r#"<error code="200" description="Missing parameter"/>"#;
        assert_matches!(
            parser(false).parse(&response(200, missing)),
            Err(IndexerError::Authentication { message }) if message == "Indexer requires an API key"
        );
        assert_matches!(
            parser(true).parse(&response(200, missing)),
            Err(IndexerError::Parse { .. })
        );

        let limit = r#"<error code="500" description="Request limit reached"/>"#;
        assert_matches!(
            parser(true).parse(&response(200, limit)),
            Err(IndexerError::RequestLimitReached { .. })
        );
    }

    #[test]
    fn test_status_and_content_type() {
        let html = IndexerResponse::new(
            IndexerRequest::new("https://nzb.example/api", HttpAccept::Rss),
            HttpResponse::new("https://nzb.example/api", 503, "<html>down</html>")
                .with_header("content-type", "text/html"),
        );
        assert_matches!(
            parser(true).parse(&html),
            Err(IndexerError::UnexpectedStatus { status: 503, .. })
        );

        let redirected = IndexerResponse::new(
            IndexerRequest::new("https://nzb.example/api", HttpAccept::Rss),
            HttpResponse::new("https://nzb.example/api", 200, "<html><body>login</body></html>")
                .with_header("content-type", "text/html"),
        );
        assert_matches!(
            parser(true).parse(&redirected),
            Err(IndexerError::UnexpectedContentType { .. })
        );
    }

    #[test]
    fn test_empty_feed() {
        let empty = r#"<rss><channel><title>x</title></channel></rss>"#;
        assert!(parser(true).parse(&response(200, empty)).unwrap().is_empty());
    }
}
