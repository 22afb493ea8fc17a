//! A small, lenient element tree built from `quick-xml` events.
//!
//! Format parsers walk this tree instead of talking to the tokenizer
//! directly. Element names keep their namespace prefix (`dc:creator`,
//! `media:content`) since feed formats are identified by prefix in practice.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use super::FeedError;

/// Nesting limit; deeper documents are treated as hostile.
const MAX_DEPTH: usize = 64;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Element {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub text: String,
    pub children: Vec<Element>,
}

impl Element {
    fn open(start: &BytesStart<'_>, reader: &Reader<&[u8]>) -> Self {
        let mut attributes = Vec::new();
        for attr in start.attributes().with_checks(false) {
            let attr = match attr {
                Ok(attr) => attr,
                Err(e) => {
                    tracing::debug!(error = %e, "Skipping malformed attribute");
                    continue;
                }
            };
            let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            let value = match attr.decode_and_unescape_value(reader.decoder()) {
                Ok(v) => v.into_owned(),
                Err(_) => String::from_utf8_lossy(&attr.value).into_owned(),
            };
            attributes.push((key, value));
        }

        Self {
            name: String::from_utf8_lossy(start.name().as_ref()).into_owned(),
            attributes,
            ..Default::default()
        }
    }

    /// Element name without its namespace prefix.
    pub fn local_name(&self) -> &str {
        self.name.rsplit(':').next().unwrap_or(&self.name)
    }

    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// First direct child with the exact (prefixed) name.
    pub fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.name == name)
    }

    /// All direct children with the exact (prefixed) name.
    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> + 'a {
        self.children.iter().filter(move |c| c.name == name)
    }

    /// Trimmed text of the first direct child named `name`, if non-empty.
    pub fn child_text(&self, name: &str) -> Option<String> {
        self.children_named(name).find_map(Element::text_value)
    }

    /// Trimmed text content, `None` when blank.
    pub fn text_value(&self) -> Option<String> {
        let trimmed = self.text.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    }

    /// Every descendant (depth-first, document order) with the given name.
    pub fn descendants_named<'a>(&'a self, name: &str) -> Vec<&'a Element> {
        let mut found = Vec::new();
        self.collect_named(name, &mut found);
        found
    }

    fn collect_named<'a>(&'a self, name: &str, out: &mut Vec<&'a Element>) {
        for child in &self.children {
            if child.name == name {
                out.push(child);
            }
            child.collect_named(name, out);
        }
    }
}

/// A parsed XML document: the root element and everything beneath it.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub root: Element,
}

impl Document {
    /// Builds a tree from raw XML.
    ///
    /// Mismatched end tags are tolerated. A tokenizer error after the root
    /// element opened truncates the tree there (with a warning) rather than
    /// discarding the entries already read; an error before any element was
    /// seen, or a document with no element at all, is a [`FeedError::Xml`].
    pub fn parse(raw: &str) -> Result<Self, FeedError> {
        let mut reader = Reader::from_str(raw);
        let config = reader.config_mut();
        config.trim_text(false);
        config.check_end_names = false;

        let mut stack: Vec<Element> = Vec::new();
        let mut root: Option<Element> = None;

        loop {
            match reader.read_event() {
                Ok(Event::Start(e)) => {
                    if stack.len() >= MAX_DEPTH {
                        return Err(FeedError::Xml(format!(
                            "nesting depth exceeds maximum of {MAX_DEPTH} levels"
                        )));
                    }
                    let mut element = Element::open(&e, &reader);
                    if element.attr("type") != Some("xhtml") {
                        stack.push(element);
                        continue;
                    }
                    // Atom xhtml text constructs: keep the inner markup as text
                    match reader.read_text(e.name()) {
                        Ok(markup) => {
                            element.text = markup.trim().to_string();
                            attach(&mut stack, &mut root, element);
                        }
                        Err(err) => {
                            tracing::warn!(
                                error = %err,
                                "Unterminated xhtml content, keeping elements parsed so far"
                            );
                            break;
                        }
                    }
                }
                Ok(Event::Empty(e)) => {
                    let element = Element::open(&e, &reader);
                    attach(&mut stack, &mut root, element);
                }
                Ok(Event::End(_)) => {
                    if let Some(element) = stack.pop() {
                        attach(&mut stack, &mut root, element);
                    }
                }
                Ok(Event::Text(t)) => {
                    if let Some(current) = stack.last_mut() {
                        match t.unescape() {
                            Ok(text) => current.text.push_str(&text),
                            // Unknown entities such as &nbsp; are kept verbatim
                            Err(_) => current.text.push_str(&String::from_utf8_lossy(&t)),
                        }
                    }
                }
                Ok(Event::CData(c)) => {
                    if let Some(current) = stack.last_mut() {
                        current.text.push_str(&String::from_utf8_lossy(&c.into_inner()));
                    }
                }
                Ok(Event::Eof) => break,
                Err(e) => {
                    if stack.is_empty() && root.is_none() {
                        return Err(FeedError::Xml(e.to_string()));
                    }
                    tracing::warn!(
                        position = reader.error_position(),
                        error = %e,
                        "Malformed XML, keeping elements parsed so far"
                    );
                    break;
                }
                _ => {}
            }
        }

        // Close anything left open by a truncated document
        while let Some(element) = stack.pop() {
            attach(&mut stack, &mut root, element);
        }

        root.map(|root| Self { root })
            .ok_or_else(|| FeedError::Xml("document has no root element".to_string()))
    }
}

fn attach(stack: &mut [Element], root: &mut Option<Element>, element: Element) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(element),
        None => {
            if root.is_none() {
                *root = Some(element);
            }
        }
    }
}
