//! TXT engine
//!
//! The whole file is held as raw bytes; chapters are byte spans decoded on
//! demand with the detected charset.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use image::DynamicImage;
use tokio_util::sync::CancellationToken;

use super::chapters::{self, ChapterSpan, HeadingMatcher, LineSpan};
use super::charset::{self, TxtCharset};
use crate::config::{ChapterDetection, DEFAULT_CONTEXT_LINES};
use crate::document::{
    find_ignore_case, word_count, BookFormat, Chapter, DocumentEngine, DocumentError,
    DocumentInfo, OutlineItem, Result, SearchResult, SearchStream,
};

/// Lines scanned per blocking search step
const SEARCH_BATCH_LINES: usize = 2048;

/// Options for opening a TXT file
#[derive(Debug, Clone)]
pub struct TxtOpenOptions {
    /// Charset to use instead of detection
    pub charset: Option<TxtCharset>,
    /// Fail instead of falling back to UTF-8 when detection is inconclusive
    pub strict_charset: bool,
    pub chapter_detection: ChapterDetection,
    /// Lines of context either side of a search hit
    pub context_lines: usize,
    /// Format reported in document info
    pub format: BookFormat,
}

impl Default for TxtOpenOptions {
    fn default() -> Self {
        Self {
            charset: None,
            strict_charset: false,
            chapter_detection: ChapterDetection::Default,
            context_lines: DEFAULT_CONTEXT_LINES,
            format: BookFormat::Txt,
        }
    }
}

/// Open plain-text document
pub struct TxtEngine {
    inner: Arc<TxtDocument>,
}

struct TxtDocument {
    bytes: Vec<u8>,
    charset: TxtCharset,
    lines: Vec<LineSpan>,
    chapters: Vec<ChapterSpan>,
    info: DocumentInfo,
    context_lines: usize,
}

impl TxtEngine {
    /// Open and segment a text file
    pub async fn open(
        path: impl AsRef<Path>,
        options: TxtOpenOptions,
        cancel: CancellationToken,
    ) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let document = tokio::task::spawn_blocking(move || load(path, options, &cancel)).await??;

        tracing::info!(
            path = %document.info.path,
            charset = %document.charset,
            chapters = document.chapters.len(),
            "Opened TXT document"
        );

        Ok(Self {
            inner: Arc::new(document),
        })
    }

    /// Charset the file is decoded with
    pub fn charset(&self) -> TxtCharset {
        self.inner.charset
    }
}

fn load(path: PathBuf, options: TxtOpenOptions, cancel: &CancellationToken) -> Result<TxtDocument> {
    if !path.is_file() {
        return Err(DocumentError::FileNotFound(path));
    }
    let bytes = std::fs::read(&path)?;

    let charset = match options.charset {
        Some(charset) => charset,
        None => {
            let detection = charset::detect(&bytes);
            if !detection.confident {
                if options.strict_charset {
                    return Err(DocumentError::EncodingUndetectable(path.display().to_string()));
                }
                tracing::warn!(path = %path.display(), "Could not detect text encoding, falling back to UTF-8");
            }
            detection.charset
        }
    };

    let matcher = HeadingMatcher::new(&options.chapter_detection)?;
    let lines = chapters::split_lines(&bytes, charset);
    let spans = chapters::segment(&bytes, charset, &lines, &matcher, cancel)?;

    let title = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();

    let mut info = DocumentInfo::new(path.display().to_string(), options.format, title);
    info.file_size = bytes.len() as u64;
    info.chapter_count = spans.len();
    info.charset = Some(charset.name().to_string());
    info.line_count = Some(lines.len());
    info.word_count = Some(word_count(&charset.decode(&bytes)));

    Ok(TxtDocument {
        bytes,
        charset,
        lines,
        chapters: spans,
        info,
        context_lines: options.context_lines,
    })
}

impl TxtDocument {
    fn decode(&self, start: usize, end: usize) -> String {
        self.charset.decode(&self.bytes[start..end]).into_owned()
    }

    fn line_text(&self, idx: usize) -> String {
        chapters::decode_line(&self.bytes, self.charset, &self.lines[idx])
    }

    /// Characters the line contributes to its chapter's text, terminator included
    fn line_char_len(&self, idx: usize) -> usize {
        let line = &self.lines[idx];
        self.charset.decode(&self.bytes[line.start..line.next]).chars().count()
    }

    fn snippet(&self, idx: usize) -> String {
        let from = idx.saturating_sub(self.context_lines);
        let to = (idx + self.context_lines + 1).min(self.lines.len());
        (from..to)
            .map(|i| self.line_text(i))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[async_trait]
impl DocumentEngine for TxtEngine {
    fn format(&self) -> BookFormat {
        self.inner.info.format
    }

    fn chapter_count(&self) -> usize {
        self.inner.chapters.len()
    }

    async fn chapter(&self, index: usize) -> Result<Chapter> {
        self.check_index(index)?;
        let inner = self.inner.clone();

        tokio::task::spawn_blocking(move || {
            let span = &inner.chapters[index];
            let text = inner.decode(span.body_start, span.end);
            Chapter::plain(index, span.title.clone(), text)
        })
        .await
        .map_err(DocumentError::from)
    }

    async fn outline(&self) -> Result<Vec<OutlineItem>> {
        Ok(self
            .inner
            .chapters
            .iter()
            .enumerate()
            .map(|(idx, span)| OutlineItem::new(span.title.clone(), idx))
            .collect())
    }

    fn search(&self, query: &str, cancel: CancellationToken) -> SearchStream {
        if query.is_empty() {
            return stream::empty().boxed();
        }

        let state = LineScan {
            doc: self.inner.clone(),
            query: query.to_string(),
            line: 0,
            chapter: 0,
            chars_before: 0,
        };

        stream::unfold(Some(state), move |state| {
            let cancel = cancel.clone();
            async move {
                let mut state = state?;
                loop {
                    if cancel.is_cancelled() {
                        return Some((Err(DocumentError::Cancelled), None));
                    }
                    let step = tokio::task::spawn_blocking(move || {
                        let outcome = state.scan_batch();
                        (state, outcome)
                    })
                    .await;

                    match step {
                        Ok((next, ScanOutcome::Hit(hit))) => return Some((Ok(hit), Some(next))),
                        Ok((_, ScanOutcome::Exhausted)) => return None,
                        Ok((next, ScanOutcome::Pending)) => state = next,
                        Err(err) => return Some((Err(err.into()), None)),
                    }
                }
            }
        })
        .boxed()
    }

    async fn cover(&self) -> Result<Option<DynamicImage>> {
        Ok(None)
    }

    fn info(&self) -> DocumentInfo {
        self.inner.info.clone()
    }
}

/// Forward-only line scanner backing a search stream
struct LineScan {
    doc: Arc<TxtDocument>,
    query: String,
    /// Next line to examine
    line: usize,
    /// Chapter owning `line`
    chapter: usize,
    /// Body characters of the current chapter before `line`
    chars_before: usize,
}

enum ScanOutcome {
    Hit(SearchResult),
    Pending,
    Exhausted,
}

impl LineScan {
    fn scan_batch(&mut self) -> ScanOutcome {
        let doc = self.doc.clone();
        let limit = (self.line + SEARCH_BATCH_LINES).min(doc.lines.len());

        while self.line < limit {
            let idx = self.line;
            self.line += 1;

            let next_chapter = self.chapter + 1;
            if next_chapter < doc.chapters.len() && doc.chapters[next_chapter].first_line <= idx {
                self.chapter = next_chapter;
                self.chars_before = 0;
            }

            let span = &doc.chapters[self.chapter];
            let line = &doc.lines[idx];
            // The heading line is the title, not part of the body
            let is_heading = line.start == span.start && span.body_start > span.start;
            let before_body = line.start < span.start;

            let text = doc.line_text(idx);
            let hit = find_ignore_case(&text, &self.query);

            let position = if is_heading || before_body {
                0
            } else {
                let offset = self.chars_before;
                self.chars_before += doc.line_char_len(idx);
                offset
            };

            if let Some((start, _)) = hit {
                let in_line = if is_heading || before_body {
                    0
                } else {
                    text[..start].chars().count()
                };
                return ScanOutcome::Hit(SearchResult {
                    chapter_index: self.chapter,
                    chapter_title: span.title.clone(),
                    snippet: doc.snippet(idx),
                    position: position + in_line,
                });
            }
        }

        if self.line >= doc.lines.len() {
            ScanOutcome::Exhausted
        } else {
            ScanOutcome::Pending
        }
    }
}
