//! Feed autodiscovery in HTML pages.
//!
//! Uses plain string scanning over `<link>` tags; no HTML parser.

/// First `<link rel="alternate">` with an RSS or Atom type, resolved against
/// `base_url`.
pub(crate) fn find_feed_link_in_html(html: &str, base_url: &str) -> Option<String> {
    link_tags(html)
        .filter(|tag| {
            let lower = tag.to_lowercase();
            contains_attr(&lower, "rel", "alternate") && is_feed_type(&lower)
        })
        .find_map(|tag| extract_attr_value(tag, "href"))
        .map(|href| resolve_url(href, base_url))
}

/// Every `<link ...>` tag, in document order, with original casing.
fn link_tags(html: &str) -> impl Iterator<Item = &str> {
    let lower = html.to_ascii_lowercase();
    let mut tags = Vec::new();
    let mut search_from = 0;

    while let Some(offset) = lower[search_from..].find("<link") {
        let start = search_from + offset;
        let Some(len) = lower[start..].find('>') else {
            break;
        };
        tags.push(&html[start..=start + len]);
        search_from = start + len + 1;
    }

    tags.into_iter()
}

/// `attr_name="attr_value"` or `attr_name='attr_value'` in a lowercased tag.
fn contains_attr(tag: &str, attr_name: &str, attr_value: &str) -> bool {
    tag.contains(&format!("{attr_name}=\"{attr_value}\""))
        || tag.contains(&format!("{attr_name}='{attr_value}'"))
}

fn is_feed_type(tag: &str) -> bool {
    tag.contains("application/rss+xml") || tag.contains("application/atom+xml")
}

/// Quoted attribute value, case preserved.
fn extract_attr_value<'a>(tag: &'a str, attr_name: &str) -> Option<&'a str> {
    let prefix = format!("{attr_name}=");
    let value_start = tag.to_ascii_lowercase().find(&prefix)? + prefix.len();

    let rest = tag.get(value_start..)?;
    let quote = rest.chars().next().filter(|c| *c == '"' || *c == '\'')?;
    let inner = &rest[1..];
    let end = inner.find(quote)?;
    Some(&inner[..end])
}

/// Resolves a possibly relative `href` against `base_url`.
fn resolve_url(href: &str, base_url: &str) -> String {
    match url::Url::parse(base_url).and_then(|base| base.join(href)) {
        Ok(resolved) => resolved.to_string(),
        Err(_) => href.to_owned(),
    }
}
