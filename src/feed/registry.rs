//! Format detection.
//!
//! A [`ParserRegistry`] is an ordered list of [`FeedParser`]s. Detection walks
//! the list and picks the first parser whose sniff accepts the raw text, so
//! order encodes priority: registered parsers go in front of the built-ins,
//! and among the built-ins the more specific signatures come first.
//!
//! The process-wide registry behind [`determine_feed_parser_for_xml`] is
//! seeded with the built-ins on first use and guarded by an `RwLock`.

use std::fmt;
use std::sync::{Arc, LazyLock, PoisonError, RwLock};

use super::document::Document;
use super::formats::{Atom, AtomFeedBurner, Rss};
use super::model::Feed;
use super::FeedError;

/// A feed format: a content sniff plus field extraction from a document tree.
pub trait FeedParser: Send + Sync {
    /// Short identifier, recorded in [`Feed::format`].
    fn name(&self) -> &str;

    /// Content-based check on the raw text; must be cheap.
    fn able_to_parse(&self, raw: &str) -> bool;

    /// Extracts a feed from an already-parsed document.
    ///
    /// Missing or malformed fields are skipped, never fatal.
    fn parse(&self, document: &Document) -> Feed;
}

impl fmt::Debug for dyn FeedParser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("FeedParser").field(&self.name()).finish()
    }
}

/// Ordered parser list; earlier entries win.
#[derive(Clone)]
pub struct ParserRegistry {
    parsers: Vec<Arc<dyn FeedParser>>,
}

impl fmt::Debug for ParserRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.parsers.iter().map(|p| p.name()))
            .finish()
    }
}

impl Default for ParserRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl ParserRegistry {
    /// An empty registry.
    pub fn empty() -> Self {
        Self {
            parsers: Vec::new(),
        }
    }

    /// RSS/RDF first so RSS envelopes with an `atom:` namespace stay RSS,
    /// then FeedBurner Atom ahead of plain Atom.
    pub fn with_builtins() -> Self {
        Self {
            parsers: vec![
                Arc::new(Rss) as Arc<dyn FeedParser>,
                Arc::new(AtomFeedBurner),
                Arc::new(Atom),
            ],
        }
    }

    /// Adds `parser` in front of everything already registered.
    pub fn add(&mut self, parser: Arc<dyn FeedParser>) {
        tracing::debug!(parser = parser.name(), "Registering feed parser");
        self.parsers.insert(0, parser);
    }

    /// Removes the highest-priority parser named `name`.
    pub fn remove(&mut self, name: &str) -> Option<Arc<dyn FeedParser>> {
        let index = self.parsers.iter().position(|p| p.name() == name)?;
        Some(self.parsers.remove(index))
    }

    /// Parser names in priority order.
    pub fn names(&self) -> Vec<String> {
        self.parsers.iter().map(|p| p.name().to_string()).collect()
    }

    /// First parser whose sniff accepts `raw`.
    pub fn determine(&self, raw: &str) -> Result<Arc<dyn FeedParser>, FeedError> {
        self.parsers
            .iter()
            .find(|p| p.able_to_parse(raw))
            .cloned()
            .ok_or(FeedError::NoParserAvailable)
    }
}

static REGISTRY: LazyLock<RwLock<ParserRegistry>> =
    LazyLock::new(|| RwLock::new(ParserRegistry::with_builtins()));

/// Picks a parser for `raw` from the process-wide registry.
pub fn determine_feed_parser_for_xml(raw: &str) -> Result<Arc<dyn FeedParser>, FeedError> {
    REGISTRY
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .determine(raw)
}

/// Registers `parser` process-wide, ahead of all existing parsers.
pub fn add_feed_parser(parser: Arc<dyn FeedParser>) {
    REGISTRY
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .add(parser);
}

/// Unregisters the highest-priority parser named `name` process-wide.
pub fn remove_feed_parser(name: &str) -> Option<Arc<dyn FeedParser>> {
    REGISTRY
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .remove(name)
}

/// Snapshot of the process-wide registry.
pub fn registered_parsers() -> ParserRegistry {
    REGISTRY
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .clone()
}

#[cfg(test)]
mod tests {
    use super::*;

    const RSS: &str = r#"<?xml version="1.0"?><rss version="2.0"><channel><title>T</title></channel></rss>"#;
    const RDF: &str = r#"<?xml version="1.0"?><rdf:RDF xmlns:rdf="http://www.w3.org/1999/02/22-rdf-syntax-ns#" xmlns="http://purl.org/rss/1.0/"><channel/></rdf:RDF>"#;
    const ATOM: &str = r#"<?xml version="1.0"?><feed xmlns="http://www.w3.org/2005/Atom"><title>T</title></feed>"#;
    const FEEDBURNER_ATOM: &str = r#"<?xml version="1.0"?><feed xmlns="http://www.w3.org/2005/Atom" xmlns:feedburner="http://rssnamespace.org/feedburner/ext/1.0"><title>T</title></feed>"#;
    const RSS_WITH_ATOM_NS: &str = r#"<rss version="2.0" xmlns:atom="http://www.w3.org/2005/Atom"><channel><atom:link rel="self" href="https://e.com/feed"/></channel></rss>"#;

    struct Greedy(&'static str);

    impl FeedParser for Greedy {
        fn name(&self) -> &str {
            self.0
        }
        fn able_to_parse(&self, _raw: &str) -> bool {
            true
        }
        fn parse(&self, _document: &Document) -> Feed {
            Feed {
                format: self.0.to_string(),
                ..Default::default()
            }
        }
    }

    fn detected(registry: &ParserRegistry, raw: &str) -> String {
        registry.determine(raw).unwrap().name().to_string()
    }

    #[test]
    fn test_builtin_detection() {
        let registry = ParserRegistry::with_builtins();
        assert_eq!(detected(&registry, RSS), "rss");
        assert_eq!(detected(&registry, RDF), "rss");
        assert_eq!(detected(&registry, ATOM), "atom");
        assert_eq!(detected(&registry, FEEDBURNER_ATOM), "atom_feedburner");
    }

    #[test]
    fn test_rss_envelope_with_atom_namespace_is_rss() {
        let registry = ParserRegistry::with_builtins();
        assert_eq!(detected(&registry, RSS_WITH_ATOM_NS), "rss");
    }

    #[test]
    fn test_no_parser_available() {
        let registry = ParserRegistry::with_builtins();
        assert!(matches!(
            registry.determine("I'm an invalid feed"),
            Err(FeedError::NoParserAvailable)
        ));
        assert!(matches!(
            ParserRegistry::empty().determine(RSS),
            Err(FeedError::NoParserAvailable)
        ));
    }

    #[test]
    fn test_added_parser_wins_ties_and_removal_restores_order() {
        let mut registry = ParserRegistry::with_builtins();
        registry.add(Arc::new(Greedy("custom")));

        assert_eq!(detected(&registry, ATOM), "custom");
        assert_eq!(detected(&registry, "plain text"), "custom");
        assert_eq!(registry.names()[0], "custom");

        let removed = registry.remove("custom").unwrap();
        assert_eq!(removed.name(), "custom");
        assert_eq!(detected(&registry, ATOM), "atom");
        assert!(registry.determine("plain text").is_err());
    }

    #[test]
    fn test_most_recent_registration_goes_first() {
        let mut registry = ParserRegistry::empty();
        registry.add(Arc::new(Greedy("first")));
        registry.add(Arc::new(Greedy("second")));
        assert_eq!(registry.names(), vec!["second", "first"]);
    }

    #[test]
    fn test_remove_unknown_is_none() {
        let mut registry = ParserRegistry::with_builtins();
        assert!(registry.remove("nope").is_none());
        assert_eq!(registry.names().len(), 3);
    }
}
