use regex::Regex;
use std::sync::LazyLock;

use super::{media_image, EntryBuilder};
use crate::feed::document::{Document, Element};
use crate::feed::model::{Entry, Feed};
use crate::feed::registry::FeedParser;

const ATOM_NS: &str = "http://www.w3.org/2005/Atom";
const ATOM_03_NS: &str = "http://purl.org/atom";

static FEED_ROOT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<feed[\s>]").expect("Invalid Atom root pattern"));

fn is_atom(raw: &str) -> bool {
    FEED_ROOT.is_match(raw) && (raw.contains(ATOM_NS) || raw.contains(ATOM_03_NS))
}

/// Atom 1.0 and the older 0.3 namespace.
#[derive(Debug, Clone, Copy, Default)]
pub struct Atom;

impl FeedParser for Atom {
    fn name(&self) -> &str {
        "atom"
    }

    fn able_to_parse(&self, raw: &str) -> bool {
        is_atom(raw)
    }

    fn parse(&self, document: &Document) -> Feed {
        parse_atom(self.name(), document, false)
    }
}

/// Atom as re-published by FeedBurner: entry links point at a tracking
/// redirect and the real article URL is in `feedburner:origLink`.
#[derive(Debug, Clone, Copy, Default)]
pub struct AtomFeedBurner;

impl FeedParser for AtomFeedBurner {
    fn name(&self) -> &str {
        "atom_feedburner"
    }

    fn able_to_parse(&self, raw: &str) -> bool {
        is_atom(raw) && raw.contains("feedburner")
    }

    fn parse(&self, document: &Document) -> Feed {
        parse_atom(self.name(), document, true)
    }
}

fn parse_atom(format: &str, document: &Document, feedburner: bool) -> Feed {
    let root = &document.root;

    Feed {
        format: format.to_string(),
        title: root.child_text("title"),
        url: alternate_link(root),
        feed_url: link_with_rel(root, "self"),
        description: root
            .child_text("subtitle")
            .or_else(|| root.child_text("tagline")),
        entries: root
            .children_named("entry")
            .map(|entry| parse_entry(entry, feedburner))
            .collect(),
        ..Default::default()
    }
}

fn parse_entry(element: &Element, feedburner: bool) -> Entry {
    let orig_link = element.child_text("feedburner:origLink");

    let mut builder = EntryBuilder::new();
    if feedburner {
        builder.url(orig_link.clone());
    }
    builder
        .id(element.child_text("id"))
        .title(element.child_text("title"))
        .url(alternate_link(element))
        .original_url(orig_link)
        .author(element.child("author").and_then(|a| a.child_text("name")))
        .content(element.child_text("content"))
        .summary(element.child_text("summary"))
        .image(media_image(element));

    for name in ["published", "created", "issued"] {
        for date in element.children_named(name) {
            builder.published(date.text_value());
        }
    }
    for name in ["updated", "modified"] {
        for date in element.children_named(name) {
            builder.updated(date.text_value());
        }
    }
    for category in element.children_named("category") {
        builder.category(category.attr("term").map(str::to_string));
    }

    builder.finish()
}

/// `rel="alternate"` link (or one without `rel`), preferring HTML targets.
fn alternate_link(element: &Element) -> Option<String> {
    let candidates: Vec<&Element> = element
        .children_named("link")
        .filter(|l| matches!(l.attr("rel"), None | Some("alternate")))
        .collect();

    candidates
        .iter()
        .find(|l| matches!(l.attr("type"), None | Some("text/html")))
        .or_else(|| candidates.first())
        .and_then(|l| l.attr("href"))
        .map(str::to_string)
}

fn link_with_rel(element: &Element, rel: &str) -> Option<String> {
    element
        .children_named("link")
        .find(|l| l.attr("rel") == Some(rel))
        .and_then(|l| l.attr("href"))
        .map(str::to_string)
}
