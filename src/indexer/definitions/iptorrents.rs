//! IPTorrents indexer
//!
//! IPTorrents is a private torrent tracker searched through its HTML browse page.
//!
//! # Authentication
//!
//! IPTorrents uses cookie-based authentication. Users need to:
//! 1. Log into IPTorrents in their browser
//! 2. Copy the cookie value from their browser's developer tools
//! 3. Configure the cookie (and the browser's user agent) for the indexer
//!
//! A page without the logout link means the cookie is no longer accepted.
//!
//! # Configuration
//!
//! Required settings:
//! - `cookie`: Session cookie from the browser
//!
//! Optional settings:
//! - `user_agent`: Browser user agent the cookie was issued to
//! - `freeleech`: Only search for freeleech torrents
//! - `sort`: Sort order (time, size, seeders, name)

use std::sync::Arc;
use std::time::Duration;

use once_cell::sync::Lazy;
use scraper::{ElementRef, Selector};

use crate::indexer::auth::{CookieAuth, LoginMarker};
use crate::indexer::capabilities::{
    BookSearchParam, DEFAULT_RATE_LIMIT, IndexerCapabilities, MovieSearchParam, MusicSearchParam,
    TvSearchParam,
};
use crate::indexer::categories::{CategoryMap, cats};
use crate::indexer::clock::Clock;
use crate::indexer::criteria::SearchCriteria;
use crate::indexer::dates;
use crate::indexer::error::{IndexerError, Result};
use crate::indexer::parse_util::{coerce_int, get_bytes, normalize_spaces};
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
    SettingDefinition::password("cookie", "Cookie")
        .with_help("Cookie header copied from a logged-in browser session"),
    SettingDefinition::text("user_agent", "Cookie User-Agent")
        .with_help("User-Agent of the browser the cookie was taken from"),
    SettingDefinition::checkbox("freeleech", "FreeLeech Only", false),
    SettingDefinition::select(
        "sort",
        "Sort requested from site",
        "time",
        &[
            ("time", "created"),
            ("size", "size"),
            ("seeders", "seeders"),
            ("name", "title"),
        ],
    ),
];

/// IPTorrents mirrors, first one is the default
const LINKS: &[&str] = &[
    "https://iptorrents.com/",
    "https://www.iptorrents.com/",
    "https://iptorrents.me/",
    "https://nemo.iptorrents.com/",
    "https://ip.findnemo.net/",
    "https://ip.venom.global/",
    "https://ip.getcrazy.me/",
    "https://ip.workisboring.net/",
    "https://ipt.cool/",
    "https://ipt.lol/",
    "https://ipt.world/",
];

const PAGE_SIZE: u32 = 100;
const MINIMUM_SEED_TIME: u64 = 1_209_600; // 14 days

static ROWS: Lazy<Selector> = Lazy::new(|| Selector::parse("table#torrents > tbody > tr").expect("valid selector"));
static TITLE: Lazy<Selector> = Lazy::new(|| Selector::parse("a.hv").expect("valid selector"));
static DOWNLOAD: Lazy<Selector> =
    Lazy::new(|| Selector::parse("a[href^=\"/download.php/\"]").expect("valid selector"));
static SUB: Lazy<Selector> = Lazy::new(|| Selector::parse("div.sub").expect("valid selector"));
static CATEGORY: Lazy<Selector> = Lazy::new(|| Selector::parse("td:nth-of-type(1) a").expect("valid selector"));
static FREE: Lazy<Selector> = Lazy::new(|| Selector::parse("span.free").expect("valid selector"));

pub fn descriptor() -> IndexerDescriptor {
    IndexerDescriptor {
        kind: "iptorrents",
        name: "IPTorrents",
        description: "IPTorrents (IPT) is a Private site. Always a step ahead.",
        language: "en-US",
        privacy: IndexerPrivacy::Private,
        protocol: DownloadProtocol::Torrent,
        links: LINKS,
        ratioless: false,
        seed_policy: SeedPolicy {
            minimum_ratio: Some(1.0),
            minimum_seed_time: Some(MINIMUM_SEED_TIME),
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
            TvSearchParam::Genre,
        ],
        movie_search_params: vec![
            MovieSearchParam::Q,
            MovieSearchParam::ImdbId,
            MovieSearchParam::Genre,
        ],
        music_search_params: vec![MusicSearchParam::Q],
        book_search_params: vec![BookSearchParam::Q],
        supports_pagination: true,
        page_size: PAGE_SIZE,
        rate_limit: DEFAULT_RATE_LIMIT,
        categories: category_map(),
        ..IndexerCapabilities::new()
    }
}

/// Site category id to standard category
fn category_map() -> CategoryMap {
    CategoryMap::new()
        // Movies
        .with("72", cats::MOVIES, "Movies")
        .with("87", cats::MOVIES_3D, "Movie/3D")
        .with("77", cats::MOVIES_SD, "Movie/480p")
        .with("101", cats::MOVIES_UHD, "Movie/4K")
        .with("89", cats::MOVIES_BLURAY, "Movie/BD-R")
        .with("90", cats::MOVIES_HD, "Movie/BD-Rip")
        .with("96", cats::MOVIES_SD, "Movie/Cam")
        .with("6", cats::MOVIES_DVD, "Movie/DVD-R")
        .with("48", cats::MOVIES_HD, "Movie/HD/Bluray")
        .with("54", cats::MOVIES, "Movie/Kids")
        .with("62", cats::MOVIES_SD, "Movie/MP4")
        .with("38", cats::MOVIES_FOREIGN, "Movie/Non-English")
        .with("68", cats::MOVIES, "Movie/Packs")
        .with("20", cats::MOVIES_WEBDL, "Movie/Web-DL")
        .with("100", cats::MOVIES_HD, "Movie/x265")
        .with("7", cats::MOVIES_SD, "Movie/Xvid")
        // TV
        .with("73", cats::TV, "TV")
        .with("26", cats::TV_DOCUMENTARY, "TV/Documentaries")
        .with("55", cats::TV_SPORT, "Sports")
        .with("78", cats::TV_SD, "TV/480p")
        .with("23", cats::TV_HD, "TV/BD")
        .with("24", cats::TV_SD, "TV/DVD-R")
        .with("25", cats::TV_SD, "TV/DVD-Rip")
        .with("66", cats::TV_SD, "TV/Mobile")
        .with("82", cats::TV_FOREIGN, "TV/Non-English")
        .with("65", cats::TV, "TV/Packs")
        .with("83", cats::TV_FOREIGN, "TV/Packs/Non-English")
        .with("79", cats::TV_SD, "TV/SD/x264")
        .with("22", cats::TV_WEBDL, "TV/Web-DL")
        .with("5", cats::TV_HD, "TV/x264")
        .with("99", cats::TV_HD, "TV/x265")
        .with("4", cats::TV_SD, "TV/Xvid")
        // Games
        .with("74", cats::CONSOLE, "Games")
        .with("2", cats::CONSOLE_OTHER, "Games/Mixed")
        .with("47", cats::CONSOLE_OTHER, "Games/Nintendo")
        .with("43", cats::PC_GAMES, "Games/PC-ISO")
        .with("45", cats::PC_GAMES, "Games/PC-Rip")
        .with("71", cats::CONSOLE_PS4, "Games/Playstation")
        .with("50", cats::CONSOLE_WII, "Games/Wii")
        .with("44", cats::CONSOLE_XBOX, "Games/Xbox")
        // Music
        .with("75", cats::AUDIO, "Music")
        .with("3", cats::AUDIO_MP3, "Music/Audio")
        .with("80", cats::AUDIO_LOSSLESS, "Music/Flac")
        .with("93", cats::AUDIO, "Music/Packs")
        .with("37", cats::AUDIO_VIDEO, "Music/Video")
        .with("21", cats::AUDIO_OTHER, "Podcast")
        // Other
        .with("76", cats::OTHER, "Miscellaneous")
        .with("60", cats::TV_ANIME, "Anime")
        .with("1", cats::PC_0DAY, "Appz")
        .with("86", cats::PC_0DAY, "Appz/Non-English")
        .with("64", cats::AUDIO_AUDIOBOOK, "AudioBook")
        .with("35", cats::BOOKS, "Books")
        .with("102", cats::BOOKS, "Books/Non-English")
        .with("94", cats::BOOKS_COMICS, "Comics")
        .with("95", cats::BOOKS_OTHER, "Educational")
        .with("98", cats::OTHER, "Fonts")
        .with("69", cats::PC_MAC, "Mac")
        .with("92", cats::BOOKS_MAGS, "Magazines / Newspapers")
        .with("58", cats::PC_MOBILE_OTHER, "Mobile")
        .with("36", cats::OTHER, "Pics/Wallpapers")
        // XXX
        .with("88", cats::XXX, "XXX")
        .with("85", cats::XXX_OTHER, "XXX/Magazines")
        .with("8", cats::XXX, "XXX/Movie")
        .with("81", cats::XXX, "XXX/Movie/0Day")
        .with("91", cats::XXX_PACK, "XXX/Packs")
        .with("84", cats::XXX_IMAGESET, "XXX/Pics/Wallpapers")
}

/// Relative upload dates ("2.1 hours ago") are resolved against `clock`
pub fn components(settings: &IndexerSettings, clock: Arc<dyn Clock>) -> Result<IndexerComponents> {
    let capabilities = capabilities();
    let generator = IPTorrentsRequestGenerator {
        search_url: settings.url("t"),
        categories: capabilities.categories.clone(),
        freeleech_only: settings.get_bool("freeleech"),
        sort: settings.get("sort").unwrap_or("time").to_string(),
        user_agent: settings.get("user_agent").map(str::to_string),
        limits_default: capabilities.limits_default,
    };
    let parser = IPTorrentsParser {
        base_url: settings.base_url().to_string(),
        categories: capabilities.categories.clone(),
        clock,
    };
    let auth = CookieAuth::new("cookie").with_marker(LoginMarker::BodyMissing("lout.php"));

    Ok(IndexerComponents {
        descriptor: descriptor(),
        capabilities,
        generator: Box::new(generator),
        parser: Box::new(parser),
        auth: Box::new(auth),
    })
}

pub struct IPTorrentsRequestGenerator {
    search_url: String,
    categories: CategoryMap,
    freeleech_only: bool,
    sort: String,
    user_agent: Option<String>,
    limits_default: u32,
}

impl IPTorrentsRequestGenerator {
    /// The site search is sphinx, so each part is grouped as a required term
    fn build(&self, criteria: &SearchCriteria, term: &str, imdb_id: Option<String>) -> RequestChain {
        let mut params: Vec<(String, String)> = Vec::new();

        if let Some(natives) = self.categories.native_filter(&criteria.categories) {
            params.extend(natives.into_iter().map(|n| (n, String::new())));
        }
        if self.freeleech_only {
            params.push(("free".into(), "on".into()));
        }

        let mut search_parts = Vec::new();
        if let Some(imdb) = &imdb_id {
            search_parts.push(format!("+({imdb})"));
        } else if let Some(genre) = criteria.genre.as_deref().filter(|g| !g.trim().is_empty()) {
            search_parts.push(format!("+({})", genre.trim()));
        }
        if !term.is_empty() {
            search_parts.push(format!("+({term})"));
        }
        if !search_parts.is_empty() {
            params.push(("q".into(), search_parts.join(" ")));
        }
        if imdb_id.is_some() {
            // imdb ids only appear in descriptions
            params.push(("qf".into(), "all".into()));
        }
        params.push(("o".into(), self.sort.clone()));

        let limit = criteria.limit.filter(|&l| l > 0).unwrap_or(self.limits_default);
        let pages = page_span(limit, criteria.offset_or_zero(), PAGE_SIZE).map(|page| {
            let mut query = params.clone();
            if page > 1 {
                query.push(("p".into(), page.to_string()));
            }
            let url = format!("{}?{}", self.search_url, encode_query(&query));
            let mut request = IndexerRequest::new(url, HttpAccept::Html)
                .with_header("Referer", self.search_url.clone())
                .with_source(criteria);
            if let Some(agent) = &self.user_agent {
                request = request.with_header("User-Agent", agent.clone());
            }
            request
        });

        let mut chain = RequestChain::new();
        chain.add(pages);
        chain
    }
}

impl RequestGenerator for IPTorrentsRequestGenerator {
    fn basic_search(&self, criteria: &SearchCriteria) -> Result<RequestChain> {
        Ok(self.build(criteria, &criteria.sanitized_search_term(), None))
    }

    fn tv_search(&self, criteria: &SearchCriteria) -> Result<RequestChain> {
        let mut term = criteria.sanitized_tv_search_string();
        // season packs: match every episode of the season
        if criteria.season.is_some_and(|s| s > 0) && criteria.episode.is_none() && !term.is_empty() {
            term.push('*');
        }
        Ok(self.build(criteria, &term, criteria.full_imdb_id()))
    }

    fn movie_search(&self, criteria: &SearchCriteria) -> Result<RequestChain> {
        Ok(self.build(criteria, &criteria.sanitized_search_term(), criteria.full_imdb_id()))
    }
}

pub struct IPTorrentsParser {
    base_url: String,
    categories: CategoryMap,
    clock: Arc<dyn Clock>,
}

impl IPTorrentsParser {
    fn absolute(&self, href: &str) -> String {
        format!("{}/{}", self.base_url, href.trim_start_matches('/'))
    }

    /// Remove request tags and stray control characters some titles carry
    fn clean_title(title: &str) -> String {
        let title = title.replace('\u{f}', "");
        let title = title.trim();
        let title = ["[REQ]", "[REQUEST]", "[REQUESTED]"]
            .iter()
            .find_map(|tag| title.strip_prefix(tag))
            .unwrap_or(title);

        normalize_spaces(title.trim().trim_matches(|c| c == '-' || c == ':'))
    }

    fn cell_text(cells: &[ElementRef<'_>], index: usize) -> Option<String> {
        cells.get(index).map(|c| c.text().collect::<String>())
    }

    fn parse_row(&self, row: ElementRef<'_>) -> Result<ReleaseInfo> {
        let title_link = row
            .select(&TITLE)
            .next()
            .ok_or_else(|| IndexerError::parse("row has no title link"))?;

        let title = Self::clean_title(&title_link.text().collect::<String>());
        if title.is_empty() {
            return Err(IndexerError::parse("row has an empty title"));
        }
        let details = self.absolute(title_link.value().attr("href").unwrap_or_default());
        let link = row
            .select(&DOWNLOAD)
            .next()
            .and_then(|a| a.value().attr("href"))
            .map(|href| self.absolute(href))
            .ok_or_else(|| IndexerError::parse(format!("\"{title}\" has no download link")))?;

        let sub = row
            .select(&SUB)
            .next()
            .map(|el| el.text().collect::<String>())
            .ok_or_else(|| IndexerError::parse(format!("\"{title}\" has no upload details")))?;
        let descr_split: Vec<&str> = sub.split('|').collect();
        let uploaded = descr_split.last().copied().unwrap_or_default();
        let date_split: Vec<&str> = uploaded.split(" by ").collect();
        let publish_date = dates::from_time_ago(date_split[0].trim(), self.clock.now())?;

        let mut description = Vec::new();
        if descr_split.len() > 1 {
            description.push(format!("Tags: {}", descr_split[0].trim()));
        }
        if date_split.len() > 1 {
            description.push(format!("Uploaded by: {}", date_split[date_split.len() - 1].trim()));
        }

        let category_icon = row.select(&CATEGORY).next().ok_or_else(|| {
            IndexerError::parse("no category icon, set 'Torrents - Category column' to 'Icons' in the site settings")
        })?;
        let native = category_icon
            .value()
            .attr("href")
            .unwrap_or_default()
            .trim_start_matches('?');

        let cells: Vec<ElementRef<'_>> = row
            .children()
            .filter_map(ElementRef::wrap)
            .filter(|el| el.value().name() == "td")
            .collect();

        let size = Self::cell_text(&cells, 5).and_then(|s| get_bytes(&s));
        let mut column = 6;
        let mut files = 0;
        if cells.len() == 10 {
            files = Self::cell_text(&cells, column)
                .and_then(|s| coerce_int(&s.replace("Go to files", "")))
                .unwrap_or(0);
            column += 1;
        }
        let count = |index: usize| {
            Self::cell_text(&cells, index)
                .and_then(|s| coerce_int(&s))
                .and_then(|n| u32::try_from(n).ok())
                .unwrap_or(0)
        };
        let grabs = count(column);
        let seeders = count(column + 1);
        let leechers = count(column + 2);

        let mut release = ReleaseInfo::new(title, details.clone(), publish_date).with_swarm(seeders, leechers);
        release.link = Some(link);
        release.details = Some(details);
        release.categories = self.categories.map_native_or_other(native);
        release.size = size;
        release.files = u32::try_from(files).unwrap_or(0);
        release.grabs = grabs;
        release.description = (!description.is_empty()).then(|| description.join(" "));
        release.download_volume_factor = if row.select(&FREE).next().is_some() { 0.0 } else { 1.0 };
        release.upload_volume_factor = 1.0;
        release.minimum_ratio = Some(1.0);
        release.minimum_seed_time = Some(MINIMUM_SEED_TIME);
        Ok(release)
    }
}

impl ResponseParser for IPTorrentsParser {
    fn parse(&self, response: &IndexerResponse) -> Result<Vec<ReleaseInfo>> {
        response.ensure_status(200)?;
        response.ensure_content_type()?;

        if response.content().contains("No Torrents Found!") {
            return Ok(vec![]);
        }

        let document = response.html();
        // header and spacer rows have no title link
        let rows = document
            .select(&ROWS)
            .filter(|row| row.select(&TITLE).next().is_some());
        parse_rows("iptorrents", rows, |row| self.parse_row(row))
    }
}
