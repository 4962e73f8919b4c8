//! Core document types
//!
//! Format-agnostic types shared by every engine.

use chrono::{DateTime, Utc};
use image::RgbaImage;
use serde::{Deserialize, Serialize};

use super::format::BookFormat;

/// Summary information about an open document
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentInfo {
    /// Path the document was opened from
    pub path: String,
    /// Detected format
    pub format: BookFormat,
    /// File size in bytes (0 for extracted EPUB directories)
    pub file_size: u64,
    /// Number of chapters (pages for PDF)
    pub chapter_count: usize,
    /// Document title
    pub title: String,
    /// Primary author
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    /// Language code
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    /// Publisher
    #[serde(skip_serializing_if = "Option::is_none")]
    pub publisher: Option<String>,
    /// Unique identifier (ISBN, UUID, etc.)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,
    /// Description/summary
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Subject (PDF)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    /// Creating application (PDF)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub creator: Option<String>,
    /// Producing library (PDF)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub producer: Option<String>,
    /// Text encoding name (TXT)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub charset: Option<String>,
    /// Line count (TXT)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line_count: Option<usize>,
    /// Word count (TXT)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub word_count: Option<usize>,
}

impl DocumentInfo {
    /// Info with only the required fields set
    pub fn new(path: impl Into<String>, format: BookFormat, title: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            format,
            file_size: 0,
            chapter_count: 0,
            title: title.into(),
            author: None,
            language: None,
            publisher: None,
            identifier: None,
            description: None,
            subject: None,
            creator: None,
            producer: None,
            charset: None,
            line_count: None,
            word_count: None,
        }
    }
}

/// A chapter (or PDF page) materialized on request
///
/// Chapters are regenerated on each access and never cached by the engines.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chapter {
    /// 0-based chapter index
    pub index: usize,
    /// Chapter title
    pub title: String,
    /// Raw content (XHTML for EPUB, plain text otherwise)
    pub content: String,
    /// Content with markup removed
    pub plain_text: String,
    /// Resources referenced by the chapter (EPUB only)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub resources: Vec<ChapterResource>,
}

impl Chapter {
    /// Chapter whose content is already plain text
    pub fn plain(index: usize, title: impl Into<String>, text: String) -> Self {
        Self {
            index,
            title: title.into(),
            plain_text: text.clone(),
            content: text,
            resources: Vec::new(),
        }
    }
}

/// Resource referenced from a chapter (stylesheet, image, font)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChapterResource {
    /// Archive path relative to the package document
    pub href: String,
    /// Media type from the manifest
    pub mime_type: String,
    /// Payload, loaded on demand
    #[serde(skip)]
    pub data: Option<Vec<u8>>,
}

/// Outline (table of contents) entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutlineItem {
    /// Entry label
    pub title: String,
    /// Target chapter or page index, if the target resolved
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chapter_index: Option<usize>,
    /// Nesting depth, 0 for top level
    pub level: u32,
    /// Nested entries
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<OutlineItem>,
}

impl OutlineItem {
    /// Top-level entry pointing at a chapter
    pub fn new(title: impl Into<String>, chapter_index: usize) -> Self {
        Self {
            title: title.into(),
            chapter_index: Some(chapter_index),
            level: 0,
            children: Vec::new(),
        }
    }

    /// Number of entries in this subtree, including self
    pub fn count(&self) -> usize {
        1 + self.children.iter().map(OutlineItem::count).sum::<usize>()
    }
}

/// Single search hit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    /// Chapter (or page) containing the match
    pub chapter_index: usize,
    /// Title of that chapter
    pub chapter_title: String,
    /// Context around the match
    pub snippet: String,
    /// Character offset of the match within the chapter's text
    pub position: usize,
}

/// Reading position handed to the persistence layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadingPosition {
    pub chapter_index: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_index: Option<usize>,
    pub paragraph_index: usize,
    pub char_offset: usize,
    /// Fraction of the book read, 0.0 to 1.0
    pub progress: f32,
    pub timestamp: DateTime<Utc>,
}

impl ReadingPosition {
    /// Position at a character offset inside a chapter
    ///
    /// Progress is derived from the chapter index alone: the start of
    /// chapter `i` out of `n` is `i / n`.
    pub fn at(chapter_index: usize, char_offset: usize, chapter_count: usize) -> Self {
        let progress = if chapter_count == 0 {
            0.0
        } else {
            (chapter_index as f32 / chapter_count as f32).clamp(0.0, 1.0)
        };
        Self {
            chapter_index,
            page_index: None,
            paragraph_index: 0,
            char_offset,
            progress,
            timestamp: Utc::now(),
        }
    }

    /// Set the page index (PDF)
    pub fn with_page(mut self, page_index: usize) -> Self {
        self.page_index = Some(page_index);
        self
    }

    /// Set the paragraph index
    pub fn with_paragraph(mut self, paragraph_index: usize) -> Self {
        self.paragraph_index = paragraph_index;
        self
    }
}

/// Page dimensions in points
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PageSize {
    pub width: f32,
    pub height: f32,
}

impl PageSize {
    pub fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }

    /// Uniform scale fitting the page inside a `width x height` box
    pub fn fit_scale(&self, width: u32, height: u32) -> f32 {
        if self.width <= 0.0 || self.height <= 0.0 {
            return 1.0;
        }
        (width as f32 / self.width).min(height as f32 / self.height)
    }
}

/// Rendered page bitmap
#[derive(Debug, Clone)]
pub struct RenderedPage {
    /// Page that was rendered
    pub page_index: usize,
    /// RGBA pixels, exactly the requested size
    pub image: RgbaImage,
}

impl RenderedPage {
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Approximate memory footprint in bytes
    pub fn byte_size(&self) -> usize {
        self.image.as_raw().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fit_scale_picks_smaller_axis() {
        let size = PageSize::new(612.0, 792.0);
        let scale = size.fit_scale(306, 1000);
        assert!((scale - 0.5).abs() < f32::EPSILON);
    }

    #[test]
    fn test_reading_position_progress() {
        let pos = ReadingPosition::at(2, 10, 4).with_page(2);
        assert!((pos.progress - 0.5).abs() < f32::EPSILON);
        assert_eq!(pos.page_index, Some(2));
        assert_eq!(ReadingPosition::at(0, 0, 0).progress, 0.0);
    }

    #[test]
    fn test_outline_count() {
        let mut root = OutlineItem::new("Part I", 0);
        root.children.push(OutlineItem::new("One", 0));
        root.children.push(OutlineItem::new("Two", 1));
        assert_eq!(root.count(), 3);
    }

    #[test]
    fn test_search_result_serializes_camel_case() {
        let result = SearchResult {
            chapter_index: 1,
            chapter_title: "Two".into(),
            snippet: "...x...".into(),
            position: 4,
        };
        let json = serde_json::to_string(&result).unwrap();
        assert!(json.contains("\"chapterIndex\":1"));
        assert!(json.contains("\"chapterTitle\":\"Two\""));
    }
}
