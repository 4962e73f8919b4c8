//! XHTML content helpers
//!
//! Plain-text extraction for search, resource reference scanning and
//! charset-aware decoding of content documents.

use std::borrow::Cow;
use std::sync::OnceLock;

use regex::Regex;

struct Patterns {
    hidden: Regex,
    tags: Regex,
    stylesheet: Regex,
    image: Regex,
    svg_image: Regex,
}

static PATTERNS: OnceLock<Patterns> = OnceLock::new();

fn patterns() -> &'static Patterns {
    PATTERNS.get_or_init(|| Patterns {
        hidden: Regex::new(r"(?is)<head[\s>].*?</head\s*>|<script[^>]*>.*?</script\s*>|<style[^>]*>.*?</style\s*>")
            .expect("hidden-content pattern"),
        tags: Regex::new(r"<[^>]+>").expect("tag pattern"),
        stylesheet: Regex::new(r#"(?i)<link[^>]+href=["']([^"']+)["'][^>]*>"#)
            .expect("stylesheet pattern"),
        image: Regex::new(r#"(?i)<img[^>]+src=["']([^"']+)["'][^>]*>"#).expect("image pattern"),
        svg_image: Regex::new(r#"(?i)<image[^>]+(?:xlink:)?href=["']([^"']+)["'][^>]*>"#)
            .expect("svg image pattern"),
    })
}

/// Plain text of an XHTML document
///
/// Head, script and style blocks are dropped, tags become spaces, entities
/// are decoded and whitespace runs collapse to one space.
pub fn extract_plain_text(html: &str) -> String {
    let p = patterns();
    let visible = p.hidden.replace_all(html, " ");
    let no_tags = p.tags.replace_all(&visible, " ");
    let decoded = html_escape::decode_html_entities(&no_tags);
    normalize_text(&decoded)
}

/// Collapse whitespace runs
pub fn normalize_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Stylesheet and image references, in document order, deduplicated
pub fn extract_resources(html: &str) -> Vec<String> {
    let p = patterns();
    let mut refs: Vec<String> = Vec::new();

    let stylesheets = p
        .stylesheet
        .captures_iter(html)
        .filter(|cap| {
            let tag = cap.get(0).map_or("", |m| m.as_str()).to_lowercase();
            tag.contains("stylesheet") || tag.contains(".css")
        })
        .filter_map(|cap| cap.get(1));
    let images = p
        .image
        .captures_iter(html)
        .chain(p.svg_image.captures_iter(html))
        .filter_map(|cap| cap.get(1));

    for href in stylesheets.chain(images) {
        let href = html_escape::decode_html_entities(href.as_str()).into_owned();
        if href.starts_with("data:") || href.contains("://") {
            continue;
        }
        if !refs.contains(&href) {
            refs.push(href);
        }
    }

    refs
}

/// Decode a content document
///
/// UTF-8 first (BOM handled), then the encoding from the XML declaration,
/// then Windows-1252.
pub fn decode_text(bytes: &[u8]) -> Cow<'_, str> {
    let (result, _, malformed) = encoding_rs::UTF_8.decode(bytes);
    if !malformed {
        return result;
    }

    if let Some(encoding) = xml_declared_encoding(bytes).and_then(|label| {
        encoding_rs::Encoding::for_label(label.as_bytes())
    }) {
        return encoding.decode(bytes).0;
    }

    encoding_rs::WINDOWS_1252.decode(bytes).0
}

/// Encoding named in a leading `<?xml ... encoding="..."?>`
fn xml_declared_encoding(bytes: &[u8]) -> Option<&str> {
    let prefix = &bytes[..bytes.len().min(100)];
    let decl_start = prefix.windows(5).position(|w| w == b"<?xml")?;
    let decl = &prefix[decl_start..];
    let enc_pos = decl
        .windows(9)
        .position(|w| w.eq_ignore_ascii_case(b"encoding="))?;
    let rest = &decl[enc_pos + 9..];

    let quote = *rest.first()?;
    if quote != b'"' && quote != b'\'' {
        return None;
    }
    let end = rest[1..].iter().position(|&b| b == quote)? + 1;
    std::str::from_utf8(&rest[1..end]).ok()
}
