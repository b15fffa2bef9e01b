//! Capability descriptor: what an indexer can be asked for.
//!
//! Each adapter builds one [`IndexerCapabilities`] value, validated once when the
//! indexer is created and read-only afterwards.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::categories::CategoryMap;
use super::criteria::{SearchCriteria, SearchType};
use super::error::{IndexerError, Result};

/// Default minimum spacing between two requests to the same site
pub const DEFAULT_RATE_LIMIT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TvSearchParam {
    Q,
    Season,
    Ep,
    ImdbId,
    TvdbId,
    RId,
    TmdbId,
    TvmazeId,
    TraktId,
    Year,
    Genre,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MovieSearchParam {
    Q,
    ImdbId,
    TmdbId,
    TraktId,
    Year,
    Genre,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MusicSearchParam {
    Q,
    Album,
    Artist,
    Label,
    Track,
    Year,
    Genre,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookSearchParam {
    Q,
    Title,
    Author,
    Publisher,
    Year,
    Genre,
}

/// Search modes, parameters, paging and politeness settings of one indexer
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexerCapabilities {
    /// Maximum results per page the site will return
    pub limits_max: u32,
    /// Results per page when the caller does not ask
    pub limits_default: u32,

    /// Generic free-text search
    pub search_available: bool,
    /// Term-less "latest releases" queries
    pub supports_rss: bool,

    pub tv_search_params: Vec<TvSearchParam>,
    pub movie_search_params: Vec<MovieSearchParam>,
    pub music_search_params: Vec<MusicSearchParam>,
    pub book_search_params: Vec<BookSearchParam>,

    /// Whether caller offsets can be honoured
    pub supports_pagination: bool,
    /// Releases per full page; a shorter page ends the crawl. 0 fetches one page only.
    pub page_size: u32,
    /// Minimum spacing between requests
    #[serde(with = "duration_millis")]
    pub rate_limit: Duration,
    pub follow_redirect: bool,

    #[serde(skip)]
    pub categories: CategoryMap,
}

mod duration_millis {
    use std::time::Duration;

    use serde::Serializer;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }
}

impl Default for IndexerCapabilities {
    fn default() -> Self {
        Self::new()
    }
}

impl IndexerCapabilities {
    /// Free-text search and RSS only, 100 results per page, 2 second spacing
    pub fn new() -> Self {
        Self {
            limits_max: 100,
            limits_default: 100,
            search_available: true,
            supports_rss: true,
            tv_search_params: vec![],
            movie_search_params: vec![],
            music_search_params: vec![],
            book_search_params: vec![],
            supports_pagination: false,
            page_size: 0,
            rate_limit: DEFAULT_RATE_LIMIT,
            follow_redirect: false,
            categories: CategoryMap::new(),
        }
    }

    pub fn tv_search_available(&self) -> bool {
        !self.tv_search_params.is_empty()
    }

    pub fn movie_search_available(&self) -> bool {
        !self.movie_search_params.is_empty()
    }

    pub fn music_search_available(&self) -> bool {
        !self.music_search_params.is_empty()
    }

    pub fn book_search_available(&self) -> bool {
        !self.book_search_params.is_empty()
    }

    pub fn has_tv_param(&self, param: TvSearchParam) -> bool {
        self.tv_search_params.contains(&param)
    }

    pub fn has_movie_param(&self, param: MovieSearchParam) -> bool {
        self.movie_search_params.contains(&param)
    }

    pub fn has_music_param(&self, param: MusicSearchParam) -> bool {
        self.music_search_params.contains(&param)
    }

    pub fn has_book_param(&self, param: BookSearchParam) -> bool {
        self.book_search_params.contains(&param)
    }

    pub fn supports_search_type(&self, search_type: SearchType) -> bool {
        match search_type {
            SearchType::Search => self.search_available,
            SearchType::TvSearch => self.tv_search_available(),
            SearchType::MovieSearch => self.movie_search_available(),
            SearchType::MusicSearch => self.music_search_available(),
            SearchType::BookSearch => self.book_search_available(),
        }
    }

    /// Reject descriptors that cannot drive a search.
    pub fn validate(&self) -> Result<()> {
        if self.limits_max == 0 || self.limits_default == 0 {
            return Err(IndexerError::configuration("result limits must be positive"));
        }
        if self.limits_default > self.limits_max {
            return Err(IndexerError::configuration(format!(
                "default limit {} exceeds maximum {}",
                self.limits_default, self.limits_max
            )));
        }
        if self.supports_pagination && self.page_size == 0 {
            return Err(IndexerError::configuration(
                "paginated indexers must declare a page size",
            ));
        }
        if self.categories.is_empty() {
            return Err(IndexerError::configuration("no category mappings declared"));
        }
        if !self.search_available
            && !self.tv_search_available()
            && !self.movie_search_available()
            && !self.music_search_available()
            && !self.book_search_available()
        {
            return Err(IndexerError::configuration("no search mode declared"));
        }
        Ok(())
    }

    /// Name of the first requested parameter the indexer cannot serve, if any
    pub fn unsupported_parameter(&self, criteria: &SearchCriteria) -> Option<String> {
        if !self.supports_search_type(criteria.search_type) {
            return Some(format!("{} searches", criteria.search_type));
        }

        let has_term = !criteria.sanitized_search_term().is_empty();
        let missing = |present: bool, supported: bool, name: &'static str| {
            (present && !supported).then_some(name)
        };

        let found = match criteria.search_type {
            SearchType::Search => None,
            SearchType::TvSearch => {
                use TvSearchParam as P;
                missing(has_term, self.has_tv_param(P::Q), "tv search terms")
                    .or_else(|| missing(criteria.imdb_id.is_some(), self.has_tv_param(P::ImdbId), "tv IMDb ids"))
                    .or_else(|| missing(criteria.tvdb_id.is_some(), self.has_tv_param(P::TvdbId), "TVDB ids"))
                    .or_else(|| missing(criteria.tmdb_id.is_some(), self.has_tv_param(P::TmdbId), "tv TMDb ids"))
                    .or_else(|| missing(criteria.tvmaze_id.is_some(), self.has_tv_param(P::TvmazeId), "TVMaze ids"))
                    .or_else(|| missing(criteria.rage_id.is_some(), self.has_tv_param(P::RId), "TVRage ids"))
                    .or_else(|| missing(criteria.trakt_id.is_some(), self.has_tv_param(P::TraktId), "tv Trakt ids"))
                    .or_else(|| missing(criteria.season.is_some(), self.has_tv_param(P::Season), "seasons"))
                    .or_else(|| missing(criteria.episode.is_some(), self.has_tv_param(P::Ep), "episodes"))
            }
            SearchType::MovieSearch => {
                use MovieSearchParam as P;
                missing(has_term, self.has_movie_param(P::Q), "movie search terms")
                    .or_else(|| missing(criteria.imdb_id.is_some(), self.has_movie_param(P::ImdbId), "movie IMDb ids"))
                    .or_else(|| missing(criteria.tmdb_id.is_some(), self.has_movie_param(P::TmdbId), "movie TMDb ids"))
                    .or_else(|| missing(criteria.trakt_id.is_some(), self.has_movie_param(P::TraktId), "movie Trakt ids"))
            }
            SearchType::MusicSearch => {
                use MusicSearchParam as P;
                missing(has_term, self.has_music_param(P::Q), "music search terms")
                    .or_else(|| missing(criteria.artist.is_some(), self.has_music_param(P::Artist), "artists"))
                    .or_else(|| missing(criteria.album.is_some(), self.has_music_param(P::Album), "albums"))
                    .or_else(|| missing(criteria.label.is_some(), self.has_music_param(P::Label), "labels"))
                    .or_else(|| missing(criteria.track.is_some(), self.has_music_param(P::Track), "tracks"))
            }
            SearchType::BookSearch => {
                use BookSearchParam as P;
                missing(has_term, self.has_book_param(P::Q), "book search terms")
                    .or_else(|| missing(criteria.title.is_some(), self.has_book_param(P::Title), "book titles"))
                    .or_else(|| missing(criteria.author.is_some(), self.has_book_param(P::Author), "authors"))
                    .or_else(|| missing(criteria.publisher.is_some(), self.has_book_param(P::Publisher), "publishers"))
            }
        };

        found.map(str::to_string)
    }

    /// Fail with `CapabilityMismatch` when the criteria ask for an unsupported domain
    /// or parameter.
    pub fn check(&self, indexer: &str, criteria: &SearchCriteria) -> Result<()> {
        match self.unsupported_parameter(criteria) {
            Some(requested) => Err(IndexerError::capability_mismatch(indexer, requested)),
            None => Ok(()),
        }
    }

    /// Results per page to ask the site for
    pub fn effective_limit(&self, criteria: &SearchCriteria) -> u32 {
        criteria
            .limit
            .filter(|&l| l > 0)
            .unwrap_or(self.limits_default)
            .min(self.limits_max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indexer::categories::cats;
    use assert_matches::assert_matches;

    fn caps() -> IndexerCapabilities {
        IndexerCapabilities {
            tv_search_params: vec![TvSearchParam::Q, TvSearchParam::Season, TvSearchParam::Ep],
            movie_search_params: vec![MovieSearchParam::Q, MovieSearchParam::ImdbId],
            categories: CategoryMap::new().with("1", cats::MOVIES, "Movies"),
            ..IndexerCapabilities::new()
        }
    }

    #[test]
    fn test_validate() {
        assert!(caps().validate().is_ok());

        let no_cats = IndexerCapabilities::new();
        assert_matches!(no_cats.validate(), Err(IndexerError::Configuration { .. }));

        let bad_paging = IndexerCapabilities {
            supports_pagination: true,
            page_size: 0,
            ..caps()
        };
        assert_matches!(bad_paging.validate(), Err(IndexerError::Configuration { .. }));
    }

    #[test]
    fn test_check_rejects_unsupported_parameters() {
        let caps = caps();
        assert!(caps.check("Site", &SearchCriteria::movie("x").with_imdb("tt0133093")).is_ok());
        assert!(caps.check("Site", &SearchCriteria::tv("x").with_season_episode(1, Some("2"))).is_ok());

        assert_matches!(
            caps.check("Site", &SearchCriteria::tv("x").with_tvdb(81189)),
            Err(IndexerError::CapabilityMismatch { requested, .. }) if requested == "TVDB ids"
        );
        assert_matches!(
            caps.check("Site", &SearchCriteria::music("x")),
            Err(IndexerError::CapabilityMismatch { requested, .. }) if requested == "music searches"
        );
    }

    #[test]
    fn test_effective_limit() {
        let caps = IndexerCapabilities {
            limits_default: 50,
            ..caps()
        };
        assert_eq!(caps.effective_limit(&SearchCriteria::basic("x")), 50);
        assert_eq!(caps.effective_limit(&SearchCriteria::basic("x").with_paging(500, 0)), 100);
        assert_eq!(caps.effective_limit(&SearchCriteria::basic("x").with_paging(25, 0)), 25);
    }
}
