//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use indexarr::indexer::{SearchCriteria, SearchType};

/// Search many torrent and usenet indexers through one query model.
#[derive(Parser, Debug)]
#[command(name = "indexarr")]
#[command(author, version, about)]
pub struct Cli {
    /// Indexer definitions file (overrides INDEXARR_INDEXERS)
    #[arg(short, long, global = true)]
    pub indexers: Option<PathBuf>,

    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List the supported indexer kinds and their settings
    List,
    /// List the configured indexers
    Indexers,
    /// Show what a configured indexer can search for
    Caps { id: String },
    /// Check that a configured indexer is reachable and accepts its credentials
    Test { id: String },
    /// Search the configured indexers
    Search(SearchArgs),
    /// Download a release file (or resolve a magnet link) through an indexer
    Download {
        id: String,
        link: String,
        /// Write to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Args, Debug, Default)]
pub struct SearchArgs {
    /// Free-text search term
    pub term: Vec<String>,

    /// Search type: search, tv, movie, music or book
    #[arg(short = 't', long = "type", default_value = "search")]
    pub search_type: SearchType,

    /// Only search these indexer ids (repeatable)
    #[arg(long = "indexer")]
    pub indexer_ids: Vec<String>,

    /// Standard category ids, e.g. 5000,5040
    #[arg(short, long = "cat", value_delimiter = ',')]
    pub categories: Vec<i32>,

    #[arg(long)]
    pub imdb: Option<String>,
    #[arg(long)]
    pub tmdb: Option<u32>,
    #[arg(long)]
    pub tvdb: Option<u32>,

    #[arg(long)]
    pub season: Option<u32>,
    #[arg(long, requires = "season")]
    pub ep: Option<String>,

    #[arg(long)]
    pub artist: Option<String>,
    #[arg(long)]
    pub album: Option<String>,
    #[arg(long)]
    pub author: Option<String>,
    #[arg(long)]
    pub title: Option<String>,
    #[arg(long)]
    pub year: Option<u32>,

    #[arg(long)]
    pub limit: Option<u32>,
    #[arg(long)]
    pub offset: Option<u32>,

    /// Print results as JSON
    #[arg(long)]
    pub json: bool,
}

impl SearchArgs {
    pub fn criteria(&self) -> SearchCriteria {
        let term = self.term.join(" ");
        let mut criteria = match self.search_type {
            SearchType::Search => SearchCriteria::basic(&term),
            SearchType::TvSearch => SearchCriteria::tv(&term),
            SearchType::MovieSearch => SearchCriteria::movie(&term),
            SearchType::MusicSearch => SearchCriteria::music(&term),
            SearchType::BookSearch => SearchCriteria::book(&term),
        };

        if let Some(imdb) = &self.imdb {
            criteria = criteria.with_imdb(imdb);
        }
        if let Some(tmdb) = self.tmdb {
            criteria = criteria.with_tmdb(tmdb);
        }
        if let Some(tvdb) = self.tvdb {
            criteria = criteria.with_tvdb(tvdb);
        }
        if let Some(season) = self.season {
            criteria = criteria.with_season_episode(season, self.ep.as_deref());
        }
        if self.artist.is_some() || self.album.is_some() {
            criteria = criteria.with_artist_album(self.artist.as_deref(), self.album.as_deref());
        }
        if self.author.is_some() || self.title.is_some() {
            criteria = criteria.with_author_title(self.author.as_deref(), self.title.as_deref());
        }
        if let Some(year) = self.year {
            criteria = criteria.with_year(year);
        }
        if !self.categories.is_empty() {
            criteria = criteria.with_categories(self.categories.clone());
        }
        criteria.limit = self.limit;
        criteria.offset = self.offset;
        criteria
    }
}
