//! Line indexing and heading-based chapter segmentation

use regex::Regex;
use tokio_util::sync::CancellationToken;

use super::charset::TxtCharset;
use crate::config::ChapterDetection;
use crate::document::{DocumentError, Result};

/// Built-in heading families, highest priority first
const DEFAULT_HEADING_PATTERNS: [&str; 4] = [
    r"^第[一二三四五六七八九十百千零两]+[章节回卷集部篇]",
    r"(?i)^chapter\s+[0-9]+",
    r"^[0-9]+\.",
    r"^[IVXLCDM]+\.",
];

/// Lines scanned between cancellation checks
const CANCEL_CHECK_INTERVAL: usize = 1024;

pub const FULL_TEXT_TITLE: &str = "Full Text";
pub const PREFACE_TITLE: &str = "Preface";

/// Byte span of one line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineSpan {
    /// First byte of the line
    pub start: usize,
    /// End of the line content, before the terminator
    pub end: usize,
    /// First byte of the following line
    pub next: usize,
}

/// Byte span of one chapter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChapterSpan {
    pub title: String,
    /// Heading offset (or 0 for the first implicit chapter)
    pub start: usize,
    /// First byte after the heading line
    pub body_start: usize,
    pub end: usize,
    /// Index of the chapter's first line
    pub first_line: usize,
}

/// Heading line matcher
#[derive(Debug, Clone)]
pub struct HeadingMatcher {
    patterns: Vec<Regex>,
}

impl HeadingMatcher {
    pub fn new(detection: &ChapterDetection) -> Result<Self> {
        let patterns = match detection {
            ChapterDetection::Disabled => Vec::new(),
            ChapterDetection::Default => default_patterns()?,
            ChapterDetection::Custom(pattern) => {
                let mut patterns = vec![Regex::new(pattern)?];
                patterns.extend(default_patterns()?);
                patterns
            }
        };
        Ok(Self { patterns })
    }

    /// Whether the trimmed line is a chapter heading
    pub fn is_heading(&self, line: &str) -> bool {
        let trimmed = line.trim();
        !trimmed.is_empty() && self.patterns.iter().any(|re| re.is_match(trimmed))
    }
}

fn default_patterns() -> Result<Vec<Regex>> {
    DEFAULT_HEADING_PATTERNS
        .iter()
        .map(|p| Regex::new(p).map_err(DocumentError::from))
        .collect()
}

/// Split raw bytes into lines on `\n`, honoring the code unit size
pub fn split_lines(bytes: &[u8], charset: TxtCharset) -> Vec<LineSpan> {
    let mut lines = Vec::new();
    let mut start = 0;

    match charset {
        TxtCharset::Utf16Le | TxtCharset::Utf16Be => {
            let newline: [u8; 2] = if charset == TxtCharset::Utf16Le {
                [b'\n', 0]
            } else {
                [0, b'\n']
            };
            let mut pos = 0;
            while pos + 1 < bytes.len() {
                if bytes[pos..pos + 2] == newline {
                    lines.push(LineSpan {
                        start,
                        end: pos,
                        next: pos + 2,
                    });
                    start = pos + 2;
                }
                pos += 2;
            }
        }
        _ => {
            for (pos, byte) in bytes.iter().enumerate() {
                if *byte == b'\n' {
                    lines.push(LineSpan {
                        start,
                        end: pos,
                        next: pos + 1,
                    });
                    start = pos + 1;
                }
            }
        }
    }

    if start < bytes.len() {
        lines.push(LineSpan {
            start,
            end: bytes.len(),
            next: bytes.len(),
        });
    }

    lines
}

/// Decode one line without its terminator (or trailing `\r`)
pub fn decode_line(bytes: &[u8], charset: TxtCharset, line: &LineSpan) -> String {
    let decoded = charset.decode(&bytes[line.start..line.end]);
    decoded.trim_end_matches('\r').to_string()
}

/// Segment the text into chapters
///
/// Chapters cover the byte range contiguously from the first heading to end
/// of file. Non-blank text before the first heading becomes a "Preface"
/// chapter; a file without headings is one "Full Text" chapter.
pub fn segment(
    bytes: &[u8],
    charset: TxtCharset,
    lines: &[LineSpan],
    matcher: &HeadingMatcher,
    cancel: &CancellationToken,
) -> Result<Vec<ChapterSpan>> {
    let mut chapters: Vec<ChapterSpan> = Vec::new();
    let mut seen_text = false;

    for (idx, line) in lines.iter().enumerate() {
        if idx % CANCEL_CHECK_INTERVAL == 0 && cancel.is_cancelled() {
            return Err(DocumentError::Cancelled);
        }

        let text = decode_line(bytes, charset, line);
        if !matcher.is_heading(&text) {
            if !text.trim().is_empty() {
                seen_text = true;
            }
            continue;
        }

        if let Some(previous) = chapters.last_mut() {
            previous.end = line.start;
        } else if seen_text {
            chapters.push(ChapterSpan {
                title: PREFACE_TITLE.to_string(),
                start: 0,
                body_start: 0,
                end: line.start,
                first_line: 0,
            });
        }

        chapters.push(ChapterSpan {
            title: text.trim().to_string(),
            start: line.start,
            body_start: line.next,
            end: bytes.len(),
            first_line: idx,
        });
    }

    if chapters.is_empty() {
        chapters.push(ChapterSpan {
            title: FULL_TEXT_TITLE.to_string(),
            start: 0,
            body_start: 0,
            end: bytes.len(),
            first_line: 0,
        });
    }

    Ok(chapters)
}
