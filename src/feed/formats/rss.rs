use regex::Regex;
use std::sync::LazyLock;

use super::{media_image, EntryBuilder};
use crate::feed::document::{Document, Element};
use crate::feed::model::{Entry, Feed};
use crate::feed::registry::FeedParser;

static RSS_SIGNATURE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)<rss[\s>/]|<rdf:rdf[\s>]").expect("Invalid RSS signature pattern")
});

/// Element names that all mean "published" across RSS 0.9x/1.0/2.0 and Dublin Core.
const PUBLISHED_ALIASES: &[&str] = &[
    "pubDate",
    "pubdate",
    "dc:date",
    "dc:Date",
    "dcterms:created",
    "issued",
];

/// RSS 0.9x/2.0 and RSS 1.0 (RDF).
#[derive(Debug, Clone, Copy, Default)]
pub struct Rss;

impl FeedParser for Rss {
    fn name(&self) -> &str {
        "rss"
    }

    fn able_to_parse(&self, raw: &str) -> bool {
        RSS_SIGNATURE.is_match(raw)
    }

    fn parse(&self, document: &Document) -> Feed {
        let root = &document.root;
        let channel = root.child("channel").unwrap_or(root);

        let feed_url = channel
            .children_named("atom:link")
            .find(|link| link.attr("rel") == Some("self"))
            .and_then(|link| link.attr("href"))
            .map(str::to_string);

        // RSS 2.0 nests items in <channel>; RDF puts them beside it
        let entries = root
            .descendants_named("item")
            .into_iter()
            .map(parse_item)
            .collect();

        Feed {
            format: self.name().to_string(),
            title: channel.child_text("title"),
            url: channel.child_text("link"),
            feed_url,
            description: channel
                .child_text("description")
                .or_else(|| channel.child_text("subtitle"))
                .or_else(|| channel.child_text("itunes:subtitle")),
            entries,
            ..Default::default()
        }
    }
}

fn parse_item(item: &Element) -> Entry {
    let mut builder = EntryBuilder::new();
    builder
        .id(item.child_text("guid"))
        .id(item.attr("rdf:about").map(str::to_string))
        .title(item.child_text("title"))
        .url(item.child_text("link"))
        .original_url(item.child_text("feedburner:origLink"))
        .author(item.child_text("dc:creator"))
        .author(item.child_text("author"))
        .content(item.child_text("content:encoded"))
        .summary(item.child_text("description"))
        .image(media_image(item))
        .image(enclosure_image(item));

    for element in item.children_named("dcterms:modified") {
        builder.updated(element.text_value());
    }

    for alias in PUBLISHED_ALIASES {
        for element in item.children_named(alias) {
            builder.published(element.text_value());
        }
    }
    for category in item
        .children_named("category")
        .chain(item.children_named("dc:subject"))
    {
        builder.category(category.text_value());
    }

    builder.finish()
}

/// `<enclosure type="image/...">` as a last resort for the entry image.
fn enclosure_image(item: &Element) -> Option<String> {
    item.children_named("enclosure")
        .find(|e| e.attr("type").is_some_and(|t| t.starts_with("image/")))
        .and_then(|e| e.attr("url"))
        .map(str::to_string)
}
