use thiserror::Error;

use super::document::Document;
use super::model::Feed;
use super::registry::{determine_feed_parser_for_xml, ParserRegistry};

/// Errors surfaced by feed dispatch.
///
/// Network problems are never errors here; they come back as
/// [`FetchOutcome::Failed`](super::FetchOutcome::Failed) values.
#[derive(Debug, Error)]
pub enum FeedError {
    /// No registered parser recognised the document
    #[error("no parser available for this document")]
    NoParserAvailable,
    /// A parser claimed the document but it has no usable XML structure
    #[error("XML error: {0}")]
    Xml(String),
    /// An update was asked for a feed with no `feed_url` to fetch
    #[error("feed has no feed_url to update from")]
    MissingFeedUrl,
    /// The HTTP client could not be constructed
    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

/// Parses `raw` with the first matching parser in the process-wide registry.
///
/// # Errors
///
/// - [`FeedError::NoParserAvailable`] if no parser's sniff accepts `raw`
/// - [`FeedError::Xml`] if the chosen parser's document has no root element
pub fn parse(raw: &str) -> Result<Feed, FeedError> {
    let parser = determine_feed_parser_for_xml(raw)?;
    let document = Document::parse(raw)?;
    Ok(parser.parse(&document))
}

/// Like [`parse`], against an explicit registry.
pub fn parse_with(registry: &ParserRegistry, raw: &str) -> Result<Feed, FeedError> {
    let parser = registry.determine(raw)?;
    let document = Document::parse(raw)?;
    Ok(parser.parse(&document))
}
