//! Built-in feed formats.
//!
//! Each format reads the fields it knows from a [`Document`] tree. Several
//! source elements may alias onto one logical field (`pubDate`, `dc:date`
//! and `issued` all mean "published"); [`EntryBuilder`] collects every raw
//! value and settles them once in [`EntryBuilder::finish`], so the result does
//! not depend on element order.
//!
//! [`Document`]: super::document::Document

mod atom;
mod rss;

pub use atom::{Atom, AtomFeedBurner};
pub use rss::Rss;

use super::date::{earliest, latest, parse_datetime};
use super::document::Element;
use super::model::Entry;

/// Accumulates raw field values for one entry.
#[derive(Debug, Default)]
pub(crate) struct EntryBuilder {
    entry: Entry,
    published: Vec<String>,
    updated: Vec<String>,
}

impl EntryBuilder {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn id(&mut self, value: Option<String>) -> &mut Self {
        fill(&mut self.entry.id, value);
        self
    }

    pub(crate) fn title(&mut self, value: Option<String>) -> &mut Self {
        fill(&mut self.entry.title, value);
        self
    }

    pub(crate) fn author(&mut self, value: Option<String>) -> &mut Self {
        fill(&mut self.entry.author, value);
        self
    }

    pub(crate) fn url(&mut self, value: Option<String>) -> &mut Self {
        fill(&mut self.entry.url, value);
        self
    }

    pub(crate) fn original_url(&mut self, value: Option<String>) -> &mut Self {
        fill(&mut self.entry.original_url, value);
        self
    }

    pub(crate) fn content(&mut self, value: Option<String>) -> &mut Self {
        fill(&mut self.entry.content, value);
        self
    }

    pub(crate) fn summary(&mut self, value: Option<String>) -> &mut Self {
        fill(&mut self.entry.summary, value);
        self
    }

    pub(crate) fn image(&mut self, value: Option<String>) -> &mut Self {
        fill(&mut self.entry.image, value);
        self
    }

    pub(crate) fn category(&mut self, value: Option<String>) -> &mut Self {
        if let Some(v) = value {
            self.entry.categories.insert(v);
        }
        self
    }

    /// Records one raw "published" candidate.
    pub(crate) fn published(&mut self, raw: Option<String>) -> &mut Self {
        self.published.extend(raw);
        self
    }

    /// Records one raw "updated" candidate.
    pub(crate) fn updated(&mut self, raw: Option<String>) -> &mut Self {
        self.updated.extend(raw);
        self
    }

    /// Normalizes the collected dates and returns the entry.
    ///
    /// Published keeps the earliest parseable candidate, updated the latest.
    /// Candidates the date normalizer rejects are dropped.
    pub(crate) fn finish(self) -> Entry {
        let mut entry = self.entry;
        entry.published = earliest(self.published.iter().filter_map(|s| parse_datetime(s)));
        entry.updated = latest(self.updated.iter().filter_map(|s| parse_datetime(s)));
        entry
    }
}

/// First non-empty value wins.
fn fill(slot: &mut Option<String>, value: Option<String>) {
    if slot.is_none() {
        *slot = value.filter(|v| !v.trim().is_empty());
    }
}

/// `url` attribute of the first `media:content` or `media:thumbnail` child.
pub(crate) fn media_image(element: &Element) -> Option<String> {
    ["media:content", "media:thumbnail"]
        .iter()
        .flat_map(|name| element.children_named(*name))
        .find_map(|media| media.attr("url"))
        .map(str::to_string)
}
