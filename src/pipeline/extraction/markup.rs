//! Tag scanner that locates KPI markers inside module fragments.
//!
//! Fragments come from the module renderers, so this is not a general HTML
//! parser: it walks tags, tracks attribute quoting, and pairs each marker
//! element with its closing tag. Anything it cannot walk is reported as a
//! [`MarkupError`].

use std::sync::LazyLock;

use regex::{Captures, Regex};

use super::MarkupError;

/// Attribute naming the KPI key carried by an element.
pub const KEY_ATTR: &str = "data-kpi-key";
/// Attribute carrying the unit the module displayed next to the value.
pub const UNIT_ATTR: &str = "data-kpi-unit";
/// Optional declared value kind: `number`, `text`, `label` or `json`.
pub const TYPE_ATTR: &str = "data-kpi-type";
/// Value held in an attribute instead of element text (for void elements).
pub const VALUE_ATTR: &str = "data-kpi-value";
/// Marks the authoritative marker when a key is rendered more than once.
pub const CANONICAL_ATTR: &str = "data-kpi-canonical";

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source",
    "track", "wbr",
];

/// A KPI marker found in a fragment, with its value as rendered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Marker {
    pub key: String,
    pub text: String,
    pub unit: Option<String>,
    pub kind: Option<String>,
    pub canonical: bool,
    /// Byte offset of the marker's opening tag.
    pub offset: usize,
}

#[derive(Debug)]
struct Tag {
    name: String,
    closing: bool,
    self_closing: bool,
    attrs: Vec<(String, String)>,
    start: usize,
    end: usize,
}

impl Tag {
    fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    fn opens_element(&self) -> bool {
        !self.closing && !self.self_closing && !VOID_ELEMENTS.contains(&self.name.as_str())
    }
}

/// Scan a fragment for every KPI marker, in document order.
///
/// Fails when the fragment has no tags at all, when a tag, comment or
/// attribute quote is left open, or when a marker element is never closed.
pub fn scan_markers(fragment: &str) -> Result<Vec<Marker>, MarkupError> {
    let mut markers = Vec::new();
    let mut tag_count = 0usize;
    let mut pos = 0;

    while let Some(tag) = next_tag(fragment, pos)? {
        tag_count += 1;
        pos = tag.end;

        if tag.closing {
            continue;
        }
        let key = match tag.attr(KEY_ATTR).map(str::trim) {
            Some(k) if !k.is_empty() => k.to_string(),
            _ => continue,
        };

        let text = if let Some(value) = tag.attr(VALUE_ATTR) {
            normalize_whitespace(value)
        } else if tag.opens_element() {
            let close_start = find_closing(fragment, &tag)?
                .ok_or_else(|| MarkupError::UnclosedMarker { key: key.clone() })?;
            rendered_text(&fragment[tag.end..close_start])?
        } else {
            String::new()
        };

        markers.push(Marker {
            key,
            text,
            unit: tag
                .attr(UNIT_ATTR)
                .map(str::trim)
                .filter(|u| !u.is_empty())
                .map(str::to_string),
            kind: tag
                .attr(TYPE_ATTR)
                .map(|k| k.trim().to_ascii_lowercase())
                .filter(|k| !k.is_empty()),
            canonical: tag
                .attr(CANONICAL_ATTR)
                .is_some_and(|v| v.is_empty() || v.eq_ignore_ascii_case("true")),
            offset: tag.start,
        });
    }

    if tag_count == 0 {
        return Err(MarkupError::NoMarkup);
    }
    Ok(markers)
}

/// Find the next start or end tag at or after `pos`, skipping comments,
/// doctype/processing instructions, and bare `<` characters in text.
fn next_tag(src: &str, mut pos: usize) -> Result<Option<Tag>, MarkupError> {
    let bytes = src.as_bytes();

    while let Some(rel) = src[pos..].find('<') {
        let start = pos + rel;
        let rest = &src[start..];

        if rest.starts_with("<!--") {
            match rest[4..].find("-->") {
                Some(end) => {
                    pos = start + 4 + end + 3;
                    continue;
                }
                None => return Err(MarkupError::UnterminatedComment(start)),
            }
        }
        if rest.starts_with("<!") || rest.starts_with("<?") {
            match rest.find('>') {
                Some(end) => {
                    pos = start + end + 1;
                    continue;
                }
                None => return Err(MarkupError::UnterminatedTag(start)),
            }
        }

        let (closing, name_start) = if rest.starts_with("</") {
            (true, start + 2)
        } else {
            (false, start + 1)
        };
        let name_len = src[name_start..]
            .bytes()
            .take_while(|b| b.is_ascii_alphanumeric() || *b == b'-')
            .count();
        if name_len == 0 || !bytes[name_start].is_ascii_alphabetic() {
            // Bare '<' in text ("a < b").
            pos = start + 1;
            continue;
        }

        let name = src[name_start..name_start + name_len].to_ascii_lowercase();
        return parse_tag_body(src, start, name_start + name_len, name, closing).map(Some);
    }

    Ok(None)
}

fn parse_tag_body(
    src: &str,
    start: usize,
    mut i: usize,
    name: String,
    closing: bool,
) -> Result<Tag, MarkupError> {
    let bytes = src.as_bytes();
    let len = bytes.len();
    let mut attrs = Vec::new();
    let mut self_closing = false;

    loop {
        while i < len && bytes[i].is_ascii_whitespace() {
            i += 1;
        }
        if i >= len {
            return Err(MarkupError::UnterminatedTag(start));
        }
        match bytes[i] {
            b'>' => {
                return Ok(Tag {
                    name,
                    closing,
                    self_closing,
                    attrs,
                    start,
                    end: i + 1,
                });
            }
            b'/' => {
                self_closing = true;
                i += 1;
                continue;
            }
            b'<' => return Err(MarkupError::UnterminatedTag(start)),
            _ => self_closing = false,
        }

        let attr_start = i;
        while i < len
            && !bytes[i].is_ascii_whitespace()
            && !matches!(bytes[i], b'=' | b'>' | b'/' | b'<')
        {
            i += 1;
        }
        let attr_name = src[attr_start..i].to_ascii_lowercase();

        while i < len && bytes[i].is_ascii_whitespace() {
            i += 1;
        }
        let mut value = String::new();
        if i < len && bytes[i] == b'=' {
            i += 1;
            while i < len && bytes[i].is_ascii_whitespace() {
                i += 1;
            }
            if i >= len {
                return Err(MarkupError::UnterminatedTag(start));
            }
            match bytes[i] {
                quote @ (b'"' | b'\'') => {
                    let value_start = i + 1;
                    match src[value_start..].find(quote as char) {
                        Some(rel) => {
                            value = src[value_start..value_start + rel].to_string();
                            i = value_start + rel + 1;
                        }
                        None => return Err(MarkupError::UnterminatedAttribute(start)),
                    }
                }
                _ => {
                    let value_start = i;
                    while i < len && !bytes[i].is_ascii_whitespace() && bytes[i] != b'>' {
                        i += 1;
                    }
                    value = src[value_start..i].to_string();
                }
            }
        }

        if !attr_name.is_empty() {
            attrs.push((attr_name, decode_entities(&value)));
        }
    }
}

/// Byte offset of the end tag matching `open`, honouring nested elements of
/// the same name. `None` when the document ends first.
fn find_closing(src: &str, open: &Tag) -> Result<Option<usize>, MarkupError> {
    let mut depth = 1usize;
    let mut pos = open.end;

    while let Some(tag) = next_tag(src, pos)? {
        pos = tag.end;
        if tag.name != open.name {
            continue;
        }
        if tag.closing {
            depth -= 1;
            if depth == 0 {
                return Ok(Some(tag.start));
            }
        } else if tag.opens_element() {
            depth += 1;
        }
    }

    Ok(None)
}

/// Comments and declarations left in the text runs between tags.
static NON_TEXT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<!--.*?-->|<[!?][^>]*>").expect("valid regex"));

static ENTITY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"&(#[xX][0-9a-fA-F]+|#[0-9]+|[a-zA-Z]+);").expect("valid regex")
});

/// Text a browser would show for a marker's inner markup. Tags are walked
/// with the same quote-aware scanner as markers, so a `>` inside an attribute
/// value never ends a tag early.
pub fn rendered_text(inner: &str) -> Result<String, MarkupError> {
    let mut text = String::with_capacity(inner.len());
    let mut pos = 0;
    while let Some(tag) = next_tag(inner, pos)? {
        text.push_str(&NON_TEXT_RE.replace_all(&inner[pos..tag.start], ""));
        pos = tag.end;
    }
    text.push_str(&NON_TEXT_RE.replace_all(&inner[pos..], ""));
    Ok(normalize_whitespace(&decode_entities(&text)))
}

fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Decode the basic named entities and numeric character references.
/// Unknown entities are left untouched.
pub fn decode_entities(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }
    ENTITY_RE
        .replace_all(text, |caps: &Captures| {
            let body = &caps[1];
            let decoded = match body {
                "amp" => Some('&'),
                "lt" => Some('<'),
                "gt" => Some('>'),
                "quot" => Some('"'),
                "apos" => Some('\''),
                "nbsp" => Some('\u{a0}'),
                _ if body.starts_with("#x") || body.starts_with("#X") => {
                    u32::from_str_radix(&body[2..], 16).ok().and_then(char::from_u32)
                }
                _ if body.starts_with('#') => body[1..].parse::<u32>().ok().and_then(char::from_u32),
                _ => None,
            };
            match decoded {
                Some(c) => c.to_string(),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}
