//! Concurrent fetching, format-sniffing parsing and incremental updating of
//! RSS, RDF and Atom feeds.

pub mod config;
pub mod feed;
pub mod util;
