//! Indexarr - one search model over many torrent and usenet indexers

pub mod config;
pub mod indexer;
