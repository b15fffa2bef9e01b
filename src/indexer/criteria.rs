//! Search criteria: one immutable value per query, for exactly one content domain.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::parse_util::{full_imdb_id, imdb_id_number, normalize_spaces};

/// Content domain of a search
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SearchType {
    /// Generic free-text search (also used for RSS)
    #[default]
    Search,
    TvSearch,
    MovieSearch,
    MusicSearch,
    BookSearch,
}

impl fmt::Display for SearchType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SearchType::Search => write!(f, "search"),
            SearchType::TvSearch => write!(f, "tvsearch"),
            SearchType::MovieSearch => write!(f, "movie"),
            SearchType::MusicSearch => write!(f, "music"),
            SearchType::BookSearch => write!(f, "book"),
        }
    }
}

impl std::str::FromStr for SearchType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "search" | "q" | "basic" => Ok(SearchType::Search),
            "tvsearch" | "tv-search" | "tv" => Ok(SearchType::TvSearch),
            "movie" | "movie-search" | "moviesearch" => Ok(SearchType::MovieSearch),
            "music" | "music-search" | "musicsearch" | "audio" => Ok(SearchType::MusicSearch),
            "book" | "book-search" | "booksearch" => Ok(SearchType::BookSearch),
            _ => Err(anyhow::anyhow!("Unknown search type: {}", s)),
        }
    }
}

/// A search request as supplied by the caller.
///
/// Built once per query and only read by the pipeline. The sanitized forms of the
/// free-text term are derived on demand and are never absent (an absent term
/// sanitizes to the empty string).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchCriteria {
    pub search_type: SearchType,

    /// Raw free-text term as typed by the user
    pub search_term: Option<String>,

    /// Standard category ids; empty means every category
    pub categories: Vec<i32>,

    pub limit: Option<u32>,
    pub offset: Option<u32>,

    // Identifiers
    pub imdb_id: Option<String>,
    pub tmdb_id: Option<u32>,
    pub tvdb_id: Option<u32>,
    pub tvmaze_id: Option<u32>,
    pub rage_id: Option<u32>,
    pub trakt_id: Option<u32>,

    // TV
    pub season: Option<u32>,
    pub episode: Option<String>,

    // Music
    pub artist: Option<String>,
    pub album: Option<String>,
    pub label: Option<String>,
    pub track: Option<String>,

    // Book
    pub title: Option<String>,
    pub author: Option<String>,
    pub publisher: Option<String>,

    pub year: Option<u32>,
    pub genre: Option<String>,
}

impl SearchCriteria {
    fn of(search_type: SearchType, term: &str) -> Self {
        Self {
            search_type,
            search_term: Some(term.to_string()).filter(|t| !t.trim().is_empty()),
            ..Default::default()
        }
    }

    pub fn basic(term: &str) -> Self {
        Self::of(SearchType::Search, term)
    }

    /// Periodic "latest releases" query with no term
    pub fn rss() -> Self {
        Self::default()
    }

    pub fn tv(term: &str) -> Self {
        Self::of(SearchType::TvSearch, term)
    }

    pub fn movie(term: &str) -> Self {
        Self::of(SearchType::MovieSearch, term)
    }

    pub fn music(term: &str) -> Self {
        Self::of(SearchType::MusicSearch, term)
    }

    pub fn book(term: &str) -> Self {
        Self::of(SearchType::BookSearch, term)
    }

    pub fn with_season_episode(mut self, season: u32, episode: Option<&str>) -> Self {
        self.season = Some(season);
        self.episode = episode.map(str::to_string);
        self
    }

    pub fn with_imdb(mut self, imdb_id: &str) -> Self {
        self.imdb_id = Some(imdb_id.to_string());
        self
    }

    pub fn with_tmdb(mut self, tmdb_id: u32) -> Self {
        self.tmdb_id = Some(tmdb_id);
        self
    }

    pub fn with_tvdb(mut self, tvdb_id: u32) -> Self {
        self.tvdb_id = Some(tvdb_id);
        self
    }

    pub fn with_tvmaze(mut self, tvmaze_id: u32) -> Self {
        self.tvmaze_id = Some(tvmaze_id);
        self
    }

    pub fn with_artist_album(mut self, artist: Option<&str>, album: Option<&str>) -> Self {
        self.artist = artist.map(str::to_string);
        self.album = album.map(str::to_string);
        self
    }

    pub fn with_author_title(mut self, author: Option<&str>, title: Option<&str>) -> Self {
        self.author = author.map(str::to_string);
        self.title = title.map(str::to_string);
        self
    }

    pub fn with_year(mut self, year: u32) -> Self {
        self.year = Some(year);
        self
    }

    pub fn with_categories(mut self, cats: Vec<i32>) -> Self {
        self.categories = cats;
        self
    }

    pub fn with_paging(mut self, limit: u32, offset: u32) -> Self {
        self.limit = Some(limit);
        self.offset = Some(offset);
        self
    }

    /// The term with everything but letters, digits, whitespace and
    /// `-._()@/'[]+%` removed, whitespace collapsed.
    pub fn sanitized_search_term(&self) -> String {
        let raw = self.search_term.as_deref().unwrap_or_default();
        let kept: String = raw
            .chars()
            .filter(|c| {
                c.is_alphanumeric()
                    || c.is_whitespace()
                    || matches!(c, '-' | '.' | '_' | '(' | ')' | '@' | '/' | '\'' | '[' | ']' | '+' | '%')
            })
            .collect();
        normalize_spaces(&kept)
    }

    /// Season/episode token, e.g. "S01E05", "S01" or "S2024E03-15" for dated episodes
    pub fn episode_search_string(&self) -> Option<String> {
        let season = self.season?;
        match self.episode.as_deref().map(str::trim).filter(|e| !e.is_empty()) {
            Some(ep) => match ep.parse::<u32>() {
                Ok(n) => Some(format!("S{season:02}E{n:02}")),
                Err(_) => Some(format!("S{season:02}E{ep}")),
            },
            None if season > 0 => Some(format!("S{season:02}")),
            None => None,
        }
    }

    /// Sanitized term followed by the season/episode token
    pub fn sanitized_tv_search_string(&self) -> String {
        let term = self.sanitized_search_term();
        match self.episode_search_string() {
            Some(ep) if term.is_empty() => ep,
            Some(ep) => format!("{term} {ep}"),
            None => term,
        }
    }

    /// IMDb id in canonical "tt0000000" form, if one was supplied and is valid
    pub fn full_imdb_id(&self) -> Option<String> {
        self.imdb_id.as_deref().and_then(full_imdb_id)
    }

    /// Numeric part of the IMDb id
    pub fn imdb_id_short(&self) -> Option<u32> {
        self.imdb_id.as_deref().and_then(imdb_id_number)
    }

    pub fn is_id_search(&self) -> bool {
        self.imdb_id.is_some()
            || self.tmdb_id.is_some()
            || self.tvdb_id.is_some()
            || self.tvmaze_id.is_some()
            || self.rage_id.is_some()
            || self.trakt_id.is_some()
    }

    /// No term and no structured field: a periodic "latest releases" query
    pub fn is_rss_search(&self) -> bool {
        self.sanitized_search_term().is_empty()
            && !self.is_id_search()
            && self.season.is_none()
            && self.episode.is_none()
            && self.artist.is_none()
            && self.album.is_none()
            && self.label.is_none()
            && self.track.is_none()
            && self.title.is_none()
            && self.author.is_none()
            && self.publisher.is_none()
            && self.year.is_none()
            && self.genre.is_none()
    }

    pub fn offset_or_zero(&self) -> u32 {
        self.offset.unwrap_or(0)
    }

    /// Stable hash of every field, for result caching
    pub fn cache_key(&self) -> String {
        use sha2::{Digest, Sha256};
        let json = serde_json::to_string(self).unwrap_or_default();
        format!("{:x}", Sha256::digest(json.as_bytes()))
    }
}

impl fmt::Display for SearchCriteria {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{{Type: {}, Term: {}, Offset: {}, Limit: {}, Categories: [{}]",
            self.search_type,
            self.search_term.as_deref().unwrap_or_default(),
            self.offset.unwrap_or(0),
            self.limit.unwrap_or(0),
            self.categories
                .iter()
                .map(i32::to_string)
                .collect::<Vec<_>>()
                .join(", ")
        )?;
        if let Some(imdb) = &self.imdb_id {
            write!(f, ", ImdbId: {imdb}")?;
        }
        if let Some(ep) = self.episode_search_string() {
            write!(f, ", Episode: {ep}")?;
        }
        write!(f, "}}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_sanitized_search_term() {
        let criteria = SearchCriteria::basic("  Marvel's   Agents: of S.H.I.E.L.D.! <2013>  ");
        assert_eq!(criteria.sanitized_search_term(), "Marvel's Agents of S.H.I.E.L.D. 2013");
        assert_eq!(SearchCriteria::rss().sanitized_search_term(), "");
    }

    #[test]
    fn test_episode_strings() {
        let criteria = SearchCriteria::tv("The Wire").with_season_episode(1, Some("5"));
        assert_eq!(criteria.episode_search_string().as_deref(), Some("S01E05"));
        assert_eq!(criteria.sanitized_tv_search_string(), "The Wire S01E05");

        let season_only = SearchCriteria::tv("The Wire").with_season_episode(3, None);
        assert_eq!(season_only.sanitized_tv_search_string(), "The Wire S03");

        let daily = SearchCriteria::tv("").with_season_episode(2024, Some("03/15"));
        assert_eq!(daily.sanitized_tv_search_string(), "S2024E03/15");
    }

    #[test]
    fn test_rss_detection() {
        assert!(SearchCriteria::rss().is_rss_search());
        assert!(SearchCriteria::movie("   ").is_rss_search());
        assert!(!SearchCriteria::movie("").with_imdb("tt0133093").is_rss_search());
        assert!(!SearchCriteria::basic("foo").is_rss_search());
    }

    #[test]
    fn test_imdb_forms() {
        let criteria = SearchCriteria::movie("").with_imdb("133093");
        assert_eq!(criteria.full_imdb_id().as_deref(), Some("tt0133093"));
        assert_eq!(criteria.imdb_id_short(), Some(133093));
        assert!(criteria.is_id_search());
    }

    #[test]
    fn test_cache_key_depends_on_fields() {
        let a = SearchCriteria::basic("foo");
        let b = SearchCriteria::basic("foo").with_categories(vec![2000]);
        assert_eq!(a.cache_key(), SearchCriteria::basic("foo").cache_key());
        assert_ne!(a.cache_key(), b.cache_key());
    }

    #[test]
    fn test_search_type_parse() {
        assert_eq!("tv".parse::<SearchType>().unwrap(), SearchType::TvSearch);
        assert_eq!("Movie".parse::<SearchType>().unwrap(), SearchType::MovieSearch);
        assert!("caps".parse::<SearchType>().is_err());
    }
}
