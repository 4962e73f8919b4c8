//! Table of contents documents
//!
//! EPUB 3 navigation documents (`<nav epub:type="toc">`) and EPUB 2 NCX
//! files, both parsed into the same nested [`NavPoint`] tree.

use quick_xml::events::Event;
use quick_xml::Reader;

use super::package::attribute;
use crate::document::Result;

/// TOC entry before href resolution
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NavPoint {
    pub label: String,
    /// Href relative to the navigation document
    pub href: String,
    pub children: Vec<NavPoint>,
}

impl NavPoint {
    fn is_empty(&self) -> bool {
        self.label.is_empty() && self.href.is_empty()
    }

    fn finish(mut self) -> Self {
        self.label = normalize_label(&self.label);
        self
    }
}

fn normalize_label(label: &str) -> String {
    label.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Parse an EPUB 3 navigation document
///
/// Uses the `toc` nav when present, else the first nav with entries.
pub fn parse_nav(xml: &str) -> Result<Vec<NavPoint>> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(false);

    let mut navs: Vec<(bool, Vec<NavPoint>)> = Vec::new();

    // Per-nav parse state
    let mut nav_depth = 0usize;
    let mut is_toc = false;
    let mut lists: Vec<Vec<NavPoint>> = Vec::new();
    let mut items: Vec<NavPoint> = Vec::new();
    let mut top: Vec<NavPoint> = Vec::new();
    let mut label_depth = 0usize;

    loop {
        match reader.read_event()? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"nav" => {
                    nav_depth += 1;
                    if nav_depth == 1 {
                        is_toc = attribute(&e, b"type")?
                            .map_or(false, |t| t.split_whitespace().any(|v| v == "toc"));
                        lists.clear();
                        items.clear();
                        top.clear();
                    }
                }
                _ if nav_depth == 0 => {}
                b"ol" => lists.push(Vec::new()),
                b"li" => items.push(NavPoint::default()),
                b"a" => {
                    if let Some(item) = items.last_mut() {
                        item.href = attribute(&e, b"href")?.unwrap_or_default();
                        item.label.clear();
                        label_depth += 1;
                    }
                }
                b"span" => {
                    if let Some(item) = items.last_mut() {
                        if item.label.is_empty() || label_depth > 0 {
                            label_depth += 1;
                        }
                    }
                }
                _ => {}
            },
            Event::Text(t) if label_depth > 0 => {
                if let Some(item) = items.last_mut() {
                    item.label.push_str(&t.unescape()?);
                }
            }
            Event::End(e) => match e.local_name().as_ref() {
                b"nav" if nav_depth > 0 => {
                    nav_depth -= 1;
                    if nav_depth == 0 {
                        navs.push((is_toc, std::mem::take(&mut top)));
                    }
                }
                _ if nav_depth == 0 => {}
                b"a" | b"span" if label_depth > 0 => label_depth -= 1,
                b"li" => {
                    if let Some(item) = items.pop() {
                        if !item.is_empty() {
                            if let Some(list) = lists.last_mut() {
                                list.push(item.finish());
                            }
                        }
                    }
                }
                b"ol" => {
                    if let Some(list) = lists.pop() {
                        match items.last_mut() {
                            Some(parent) => parent.children.extend(list),
                            None if top.is_empty() => top = list,
                            None => {}
                        }
                    }
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }

    let toc = navs
        .iter()
        .position(|(toc, entries)| *toc && !entries.is_empty())
        .or_else(|| navs.iter().position(|(_, entries)| !entries.is_empty()));

    Ok(toc.map(|idx| navs.swap_remove(idx).1).unwrap_or_default())
}

/// Parse an EPUB 2 NCX document's navMap
pub fn parse_ncx(xml: &str) -> Result<Vec<NavPoint>> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut top: Vec<NavPoint> = Vec::new();
    let mut stack: Vec<NavPoint> = Vec::new();
    let mut in_nav_map = false;
    let mut in_label_text = false;

    loop {
        match reader.read_event()? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"navMap" => in_nav_map = true,
                b"navPoint" if in_nav_map => stack.push(NavPoint::default()),
                b"text" if !stack.is_empty() => in_label_text = true,
                b"content" => set_content_src(&mut stack, &e)?,
                _ => {}
            },
            Event::Empty(e) if e.local_name().as_ref() == b"content" => {
                set_content_src(&mut stack, &e)?;
            }
            Event::Text(t) if in_label_text => {
                if let Some(point) = stack.last_mut() {
                    // Only the first navLabel counts
                    if point.label.is_empty() {
                        point.label = t.unescape()?.into_owned();
                    }
                }
            }
            Event::End(e) => match e.local_name().as_ref() {
                b"navMap" => in_nav_map = false,
                b"text" => in_label_text = false,
                b"navPoint" => {
                    if let Some(point) = stack.pop() {
                        if point.is_empty() {
                            continue;
                        }
                        let point = point.finish();
                        match stack.last_mut() {
                            Some(parent) => parent.children.push(point),
                            None => top.push(point),
                        }
                    }
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(top)
}

fn set_content_src(stack: &mut [NavPoint], e: &quick_xml::events::BytesStart<'_>) -> Result<()> {
    if let Some(point) = stack.last_mut() {
        if point.href.is_empty() {
            point.href = attribute(e, b"src")?.unwrap_or_default();
        }
    }
    Ok(())
}
