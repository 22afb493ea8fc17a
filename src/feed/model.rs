use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeSet, HashSet};

use super::sanitize::Sanitizer;

/// A syndicated feed and its entries, in the order the publisher listed them.
///
/// [`Feed::update`] describes only the most recent
/// [`update_one`](crate::feed::update_one) on this value and is not persisted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Feed {
    /// Name of the parser that produced this feed (e.g. `"rss"`, `"atom"`)
    #[serde(default)]
    pub format: String,
    pub title: Option<String>,
    /// Human-readable site URL
    pub url: Option<String>,
    /// Where the feed document itself lives; follows redirects
    pub feed_url: Option<String>,
    /// Explicit description, else subtitle
    pub description: Option<String>,
    pub etag: Option<String>,
    pub last_modified: Option<DateTime<Utc>>,
    #[serde(default)]
    pub entries: Vec<Entry>,
    /// Outcome of the last merge; read it through [`Feed::is_updated`] and
    /// [`Feed::new_entries`]
    #[serde(skip)]
    pub update: UpdateState,
}

/// Transient result of the last [`Feed::merge`].
///
/// Parsers leave this at its default; only a merge sets it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateState {
    changed: bool,
    new_entries: usize,
}

/// One item/entry of a feed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    pub id: Option<String>,
    pub title: Option<String>,
    pub author: Option<String>,
    pub url: Option<String>,
    /// FeedBurner's `origLink`, when the entry URL is a tracking redirect
    pub original_url: Option<String>,
    pub content: Option<String>,
    pub summary: Option<String>,
    pub published: Option<DateTime<Utc>>,
    pub updated: Option<DateTime<Utc>>,
    #[serde(default)]
    pub categories: BTreeSet<String>,
    pub image: Option<String>,
}

impl Entry {
    /// The entry id, or its URL for formats that don't carry one.
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref().or(self.url.as_deref())
    }

    /// Merge key: [`Entry::id`], else a SHA-256 over the entry's content.
    ///
    /// Two entries without id or url only collide when title, dates,
    /// summary, content and image all match.
    pub fn identity(&self) -> String {
        if let Some(id) = self.id() {
            return id.to_string();
        }

        let timestamp = |t: Option<DateTime<Utc>>| t.map(|t| t.timestamp().to_string());
        let mut hasher = Sha256::new();
        for part in [
            self.title.clone(),
            timestamp(self.published),
            timestamp(self.updated),
            self.summary.clone(),
            self.content.clone(),
            self.image.clone(),
        ] {
            // Length-prefixed so adjacent fields cannot run together
            let part = part.unwrap_or_default();
            hasher.update((part.len() as u64).to_le_bytes());
            hasher.update(part.as_bytes());
        }
        format!("{:x}", hasher.finalize())
    }

    /// Publish time, falling back to the update time.
    pub fn published_or_updated(&self) -> Option<DateTime<Utc>> {
        self.published.or(self.updated)
    }

    /// Assigns `published`, keeping the older value if one is already held.
    pub fn set_published(&mut self, value: DateTime<Utc>) {
        if self.published.is_none_or(|held| value < held) {
            self.published = Some(value);
        }
    }

    /// Assigns `updated`, keeping the newer value if one is already held.
    pub fn set_updated(&mut self, value: DateTime<Utc>) {
        if self.updated.is_none_or(|held| value > held) {
            self.updated = Some(value);
        }
    }

    /// Runs `sanitizer` over title, author, summary and content.
    pub fn sanitize(&mut self, sanitizer: &dyn Sanitizer) {
        for field in [
            &mut self.title,
            &mut self.author,
            &mut self.summary,
            &mut self.content,
        ] {
            if let Some(text) = field.as_mut() {
                sanitizer.sanitize_in_place(text);
            }
        }
    }
}

impl Feed {
    /// True when the most recent update changed this feed.
    pub fn is_updated(&self) -> bool {
        self.update.changed
    }

    /// Entries introduced by the most recent update.
    ///
    /// New entries are prepended, so this is a prefix of [`Feed::entries`].
    pub fn new_entries(&self) -> &[Entry] {
        &self.entries[..self.update.new_entries.min(self.entries.len())]
    }

    pub fn has_new_entries(&self) -> bool {
        !self.new_entries().is_empty()
    }

    pub(crate) fn reset_update_state(&mut self) {
        self.update = UpdateState::default();
    }

    /// Folds a freshly parsed copy of this feed into `self`.
    ///
    /// Entries whose identity is unknown are prepended in feed order;
    /// duplicates within `fresh` are dropped. Caching headers always follow
    /// `fresh`; title, description, url and feed_url follow it when present.
    /// Returns the number of new entries.
    pub fn merge(&mut self, fresh: Feed) -> usize {
        let mut seen: HashSet<String> = self.entries.iter().map(Entry::identity).collect();
        let mut merged: Vec<Entry> = fresh
            .entries
            .into_iter()
            .filter(|entry| seen.insert(entry.identity()))
            .collect();
        let added = merged.len();

        let mut changed = added > 0;
        changed |= replace_if_some(&mut self.title, fresh.title);
        changed |= replace_if_some(&mut self.description, fresh.description);
        changed |= replace_if_some(&mut self.url, fresh.url);
        changed |= replace_if_some(&mut self.feed_url, fresh.feed_url);
        changed |= self.etag != fresh.etag || self.last_modified != fresh.last_modified;
        self.etag = fresh.etag;
        self.last_modified = fresh.last_modified;
        if !fresh.format.is_empty() {
            self.format = fresh.format;
        }

        merged.append(&mut self.entries);
        self.entries = merged;
        self.update = UpdateState {
            changed,
            new_entries: added,
        };
        added
    }

    /// Runs `sanitizer` over the feed title, description and every entry.
    pub fn sanitize(&mut self, sanitizer: &dyn Sanitizer) {
        for text in [&mut self.title, &mut self.description].into_iter().flatten() {
            sanitizer.sanitize_in_place(text);
        }
        for entry in &mut self.entries {
            entry.sanitize(sanitizer);
        }
    }
}

fn replace_if_some(slot: &mut Option<String>, value: Option<String>) -> bool {
    match value {
        Some(v) if slot.as_deref() != Some(v.as_str()) => {
            *slot = Some(v);
            true
        }
        _ => false,
    }
}
