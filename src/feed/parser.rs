use std::borrow::Cow;
use std::sync::LazyLock;

use encoding_rs::{Encoding, UTF_8};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use regex::bytes::Regex;
use thiserror::Error;

use crate::util::{normalize_ws, strip_control_bytes, strip_html};

/// How far into the document to look for the XML declaration.
const DECLARATION_SNIFF_LEN: usize = 256;

static RE_DECLARED_ENCODING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^\s*<\?xml[^>]*?\sencoding\s*=\s*["']([A-Za-z0-9._:-]+)["']"#).unwrap()
});

/// Error returned when a feed document cannot be read as XML even after
/// control-byte sanitization.
#[derive(Debug, Error)]
pub enum ParseError {
    /// The document is not well-formed XML.
    #[error("Malformed feed XML: {0}")]
    Malformed(String),
}

/// One item extracted from an RSS or Atom document.
///
/// Text fields are already stripped of markup and whitespace-collapsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedItem {
    pub title: String,
    pub link: String,
    pub description: String,
    pub published: Option<String>,
    pub enclosure_mime: Option<String>,
}

/// Parses an RSS 2.0, RSS 1.0 (RDF) or Atom document.
///
/// Elements are matched by local name, so namespace prefixes do not matter.
/// A document whose root is none of `rss`, `RDF` or `feed` yields an empty
/// list. Items missing a title or a link are skipped.
///
/// The document is transcoded to UTF-8 first, following its byte order mark
/// or the `encoding` of its XML declaration (GBK and Big5 feeds are common).
///
/// XML 1.0 forbids most control bytes; a document containing them is
/// sanitized once with [`strip_control_bytes`] and parsed again.
///
/// # Errors
///
/// Returns [`ParseError::Malformed`] if the (sanitized) document is not
/// well-formed.
pub fn parse_feed(bytes: &[u8]) -> Result<Vec<ParsedItem>, ParseError> {
    let utf8 = to_utf8(bytes);
    let bytes = &*utf8;
    match strip_control_bytes(bytes) {
        Cow::Borrowed(clean) => parse_document(clean),
        Cow::Owned(clean) => {
            tracing::debug!(
                removed = bytes.len() - clean.len(),
                "Stripped control bytes from feed document"
            );
            parse_document(&clean)
        }
    }
    .map_err(|e| ParseError::Malformed(e.to_string()))
}

/// Re-encodes `bytes` as UTF-8 and drops any byte order mark.
///
/// A BOM wins over the declaration. Declared encodings that are not ASCII
/// compatible contradict a declaration readable as ASCII and are ignored;
/// unknown labels leave the bytes as they are.
fn to_utf8(bytes: &[u8]) -> Cow<'_, [u8]> {
    if let Some((encoding, bom_len)) = Encoding::for_bom(bytes) {
        let body = &bytes[bom_len..];
        if encoding == UTF_8 {
            return Cow::Borrowed(body);
        }
        let (text, _) = encoding.decode_without_bom_handling(body);
        return Cow::Owned(text.into_owned().into_bytes());
    }

    let head = &bytes[..bytes.len().min(DECLARATION_SNIFF_LEN)];
    let declared = RE_DECLARED_ENCODING
        .captures(head)
        .and_then(|caps| Encoding::for_label(&caps[1]));
    match declared {
        Some(encoding) if encoding != UTF_8 && encoding.is_ascii_compatible() => {
            let (text, had_errors) = encoding.decode_without_bom_handling(bytes);
            if had_errors {
                tracing::debug!(encoding = encoding.name(), "Feed contained undecodable bytes");
            }
            Cow::Owned(text.into_owned().into_bytes())
        }
        _ => Cow::Borrowed(bytes),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FeedKind {
    Rss,
    Atom,
}

impl FeedKind {
    fn item_tag(self) -> &'static [u8] {
        match self {
            FeedKind::Rss => b"item",
            FeedKind::Atom => b"entry",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Title,
    Link,
    Description,
    Encoded,
    Summary,
    Content,
    PubDate,
    DcDate,
    Published,
    Updated,
}

impl Field {
    fn from_local_name(name: &[u8]) -> Option<Self> {
        Some(match name {
            b"title" => Field::Title,
            b"link" => Field::Link,
            b"description" => Field::Description,
            b"encoded" => Field::Encoded,
            b"summary" => Field::Summary,
            b"content" => Field::Content,
            b"pubDate" => Field::PubDate,
            b"date" => Field::DcDate,
            b"published" => Field::Published,
            b"updated" => Field::Updated,
            _ => return None,
        })
    }
}

/// Accumulates the raw field text of the item being read.
#[derive(Debug, Default)]
struct ItemBuilder {
    title: String,
    link_text: String,
    /// Preferred `href` link: `rel="alternate"` or no rel.
    href_alternate: Option<String>,
    href_any: Option<String>,
    description: String,
    encoded: String,
    summary: String,
    content: String,
    pub_date: String,
    dc_date: String,
    published: String,
    updated: String,
    enclosure_mime: Option<String>,
}

impl ItemBuilder {
    fn buffer(&mut self, field: Field) -> &mut String {
        match field {
            Field::Title => &mut self.title,
            Field::Link => &mut self.link_text,
            Field::Description => &mut self.description,
            Field::Encoded => &mut self.encoded,
            Field::Summary => &mut self.summary,
            Field::Content => &mut self.content,
            Field::PubDate => &mut self.pub_date,
            Field::DcDate => &mut self.dc_date,
            Field::Published => &mut self.published,
            Field::Updated => &mut self.updated,
        }
    }

    fn add_href(&mut self, href: String, rel: Option<String>) {
        let href = href.trim().to_string();
        if href.is_empty() {
            return;
        }
        let is_alternate = rel
            .as_deref()
            .map_or(true, |r| r.eq_ignore_ascii_case("alternate"));
        if is_alternate && self.href_alternate.is_none() {
            self.href_alternate = Some(href);
        } else if self.href_any.is_none() {
            self.href_any = Some(href);
        }
    }

    fn finish(self, kind: FeedKind) -> Option<ParsedItem> {
        let title = strip_html(&self.title);
        let link_text = normalize_ws(&self.link_text);
        let link = match kind {
            FeedKind::Rss if !link_text.is_empty() => Some(link_text),
            _ => self.href_alternate.or(self.href_any).or_else(|| {
                (!link_text.is_empty()).then_some(link_text)
            }),
        }?;
        if title.is_empty() {
            return None;
        }

        let (primary, fallback, date_primary, date_fallback) = match kind {
            FeedKind::Rss => (self.description, self.encoded, self.pub_date, self.dc_date),
            FeedKind::Atom => (self.summary, self.content, self.published, self.updated),
        };
        let mut description = strip_html(&primary);
        if description.is_empty() {
            description = strip_html(&fallback);
        }
        let published = [date_primary, date_fallback]
            .into_iter()
            .map(|d| normalize_ws(&d))
            .find(|d| !d.is_empty());

        Some(ParsedItem {
            title,
            link,
            description,
            published,
            enclosure_mime: self.enclosure_mime,
        })
    }
}

fn attr_value<R>(e: &BytesStart<'_>, reader: &Reader<R>, key: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.local_name().as_ref() == key)
        .and_then(|a| {
            a.decode_and_unescape_value(reader.decoder())
                .ok()
                .map(|v| v.into_owned())
        })
}

/// Handles `<link href=...>` and `<enclosure type=...>` on an item child.
fn read_child_attributes<R>(
    e: &BytesStart<'_>,
    reader: &Reader<R>,
    item: &mut ItemBuilder,
) {
    match e.local_name().as_ref() {
        b"link" => {
            if let Some(href) = attr_value(e, reader, b"href") {
                item.add_href(href, attr_value(e, reader, b"rel"));
            }
        }
        b"enclosure" => {
            if item.enclosure_mime.is_none() {
                item.enclosure_mime = attr_value(e, reader, b"type")
                    .map(|t| t.trim().to_string())
                    .filter(|t| !t.is_empty());
            }
        }
        _ => {}
    }
}

fn parse_document(bytes: &[u8]) -> Result<Vec<ParsedItem>, quick_xml::Error> {
    // quick-xml resolves only the five predefined entities and never expands
    // DOCTYPE declarations.
    let mut reader = Reader::from_reader(bytes);

    let mut items = Vec::new();
    let mut buf = Vec::new();
    let mut kind: Option<FeedKind> = None;
    let mut depth: usize = 0;
    let mut item: Option<(usize, ItemBuilder)> = None;
    let mut field: Option<Field> = None;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => {
                depth += 1;
                let k = match kind {
                    Some(k) => k,
                    None => {
                        let root = match e.local_name().as_ref() {
                            b"rss" | b"RDF" => FeedKind::Rss,
                            b"feed" => FeedKind::Atom,
                            _ => return Ok(Vec::new()),
                        };
                        kind = Some(root);
                        root
                    }
                };

                match item.as_mut() {
                    // The root element itself is never an item.
                    None if depth > 1 && e.local_name().as_ref() == k.item_tag() => {
                        item = Some((depth, ItemBuilder::default()));
                    }
                    Some((item_depth, builder)) if depth == *item_depth + 1 => {
                        read_child_attributes(&e, &reader, builder);
                        field = Field::from_local_name(e.local_name().as_ref());
                    }
                    Some((_, builder)) => {
                        // Markup nested inside a field (unescaped XHTML content).
                        if let Some(f) = field {
                            builder.buffer(f).push(' ');
                        }
                    }
                    None => {}
                }
            }
            Event::Empty(e) => {
                if kind.is_none() {
                    return Ok(Vec::new());
                }
                if let Some((item_depth, builder)) = item.as_mut() {
                    if depth == *item_depth {
                        read_child_attributes(&e, &reader, builder);
                    }
                }
            }
            Event::End(_) => {
                if let Some((item_depth, _)) = &item {
                    if depth == *item_depth + 1 {
                        field = None;
                    } else if depth == *item_depth {
                        if let Some((_, builder)) = item.take() {
                            if let Some(parsed) = builder.finish(kind.unwrap_or(FeedKind::Rss)) {
                                items.push(parsed);
                            }
                        }
                    }
                }
                depth = depth.saturating_sub(1);
            }
            Event::Text(t) => {
                if let (Some(f), Some((_, builder))) = (field, item.as_mut()) {
                    let text = match t.unescape() {
                        Ok(s) => s.into_owned(),
                        // Feeds routinely use HTML entities such as &nbsp;.
                        Err(_) => html_escape::decode_html_entities(&String::from_utf8_lossy(&t))
                            .into_owned(),
                    };
                    builder.buffer(f).push_str(&text);
                }
            }
            Event::CData(c) => {
                if let (Some(f), Some((_, builder))) = (field, item.as_mut()) {
                    builder.buffer(f).push_str(&String::from_utf8_lossy(&c));
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(items)
}
