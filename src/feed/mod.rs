//! Fetching, parsing and incremental updating of RSS, RDF and Atom feeds.
//!
//! - **Parsing**: [`parse`] picks a [`FeedParser`] from the process-wide
//!   registry by sniffing the raw text, then extracts a [`Feed`] from a
//!   lenient element tree
//! - **Fetching**: [`Fetcher`] issues concurrent GETs through a rolling
//!   window, follows redirects and reports every URL as a [`FetchOutcome`]
//! - **Updating**: [`update_one`] / [`update_all`] re-fetch known feeds with
//!   conditional headers and merge new entries in place
//!
//! # Example
//!
//! ```no_run
//! use feedpull::feed::{update_all, FetchOptions, Fetcher, RequestOptions};
//!
//! # async fn run() -> Result<(), feedpull::feed::FeedError> {
//! let fetcher = Fetcher::new(FetchOptions::default())?;
//! let url = "https://example.com/feed.xml";
//! let mut feeds: Vec<_> = fetcher
//!     .fetch_and_parse(url, &RequestOptions::default())
//!     .await?
//!     .fetched()
//!     .into_iter()
//!     .collect();
//!
//! // Later: pull only what changed
//! update_all(&fetcher, &mut feeds).await;
//! for entry in feeds.iter().flat_map(|f| f.new_entries()) {
//!     println!("{:?}", entry.title);
//! }
//! # Ok(())
//! # }
//! ```

mod date;
mod discovery;
mod document;
mod fetcher;
mod formats;
mod headers;
mod model;
mod parser;
mod registry;
mod sanitize;
mod update;

pub use date::{earliest, latest, parse_datetime, parse_datetime_at};
pub use document::{Document, Element};
pub use fetcher::{
    FetchFailure, FetchOptions, FetchOutcome, Fetcher, RawFeed, RequestOptions,
    DEFAULT_USER_AGENT, NOT_MODIFIED, TRANSPORT_FAILURE,
};
pub use formats::{Atom, AtomFeedBurner, Rss};
pub use headers::{etag_from_header, last_modified_from_header};
pub use model::{Entry, Feed, UpdateState};
pub use parser::{parse, parse_with, FeedError};
pub use registry::{
    add_feed_parser, determine_feed_parser_for_xml, registered_parsers, remove_feed_parser,
    FeedParser, ParserRegistry,
};
pub use sanitize::{ControlCharSanitizer, Sanitizer};
pub use update::{update_all, update_one, UpdateOutcome};
