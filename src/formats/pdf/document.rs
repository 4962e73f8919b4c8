//! PDF engine
//!
//! Pages double as chapters. Text, outline and metadata come from MuPDF;
//! rendered bitmaps are kept in a bounded [`RenderCache`].

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use image::DynamicImage;
use mupdf::{MetadataName, Outline};
use tokio_util::sync::CancellationToken;

use super::renderer::render_fit;
use crate::config::DEFAULT_SNIPPET_RADIUS;
use crate::document::{
    char_offset, find_all_ignore_case, snippet_around, BookFormat, Chapter, DocumentEngine,
    DocumentError, DocumentInfo, OutlineItem, PageSize, RenderCache, RenderCacheKey,
    RenderedPage, Result, SearchResult, SearchStream, DEFAULT_RENDER_CACHE_CAPACITY,
};
use crate::mupdf::SafeDocument;

/// Options for opening a PDF
#[derive(Debug, Clone)]
pub struct PdfOpenOptions {
    /// Rendered pages kept in memory
    pub cache_capacity: usize,
    /// Characters of context either side of a search hit
    pub snippet_radius: usize,
}

impl Default for PdfOpenOptions {
    fn default() -> Self {
        Self {
            cache_capacity: DEFAULT_RENDER_CACHE_CAPACITY,
            snippet_radius: DEFAULT_SNIPPET_RADIUS,
        }
    }
}

/// Open PDF document
pub struct PdfEngine {
    inner: Arc<PdfBook>,
}

struct PdfBook {
    doc: SafeDocument,
    cache: RenderCache,
    /// Held across the cache miss and insert so one size is rasterized once
    render_lock: tokio::sync::Mutex<()>,
    info: DocumentInfo,
    snippet_radius: usize,
}

fn page_title(index: usize) -> String {
    format!("Page {}", index + 1)
}

impl PdfEngine {
    pub async fn open(
        path: impl AsRef<Path>,
        options: PdfOpenOptions,
        cancel: CancellationToken,
    ) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let book = tokio::task::spawn_blocking(move || load(path, options, &cancel)).await??;

        tracing::info!(
            path = %book.info.path,
            pages = book.doc.page_count(),
            "Opened PDF document"
        );

        Ok(Self {
            inner: Arc::new(book),
        })
    }

    /// Number of rendered pages currently cached
    pub fn cached_pages(&self) -> usize {
        self.inner.cache.len()
    }

    /// Text layer of one page
    pub async fn extract_text(&self, index: usize) -> Result<String> {
        let inner = self.inner.clone();
        tokio::task::spawn_blocking(move || inner.page_text(index)).await?
    }
}

fn load(path: PathBuf, options: PdfOpenOptions, cancel: &CancellationToken) -> Result<PdfBook> {
    if !path.is_file() {
        return Err(DocumentError::FileNotFound(path));
    }
    let file_size = std::fs::metadata(&path)?.len();
    let doc = SafeDocument::open(&path)?;

    if cancel.is_cancelled() {
        return Err(DocumentError::Cancelled);
    }

    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();

    let mut info = doc.with_doc(|mupdf_doc| {
        let get_meta = |name: MetadataName| -> Option<String> {
            mupdf_doc
                .metadata(name)
                .ok()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
        };

        let title = get_meta(MetadataName::Title).unwrap_or_else(|| stem.clone());
        let mut info = DocumentInfo::new(path.display().to_string(), BookFormat::Pdf, title);
        info.author = get_meta(MetadataName::Author);
        info.subject = get_meta(MetadataName::Subject);
        info.creator = get_meta(MetadataName::Creator);
        info.producer = get_meta(MetadataName::Producer);
        Ok(info)
    })?;
    info.file_size = file_size;
    info.chapter_count = doc.page_count();

    Ok(PdfBook {
        doc,
        cache: RenderCache::new(options.cache_capacity),
        render_lock: tokio::sync::Mutex::new(()),
        info,
        snippet_radius: options.snippet_radius,
    })
}

impl PdfBook {
    fn page_text(&self, index: usize) -> Result<String> {
        self.doc.with_page(index, |page| Ok(page.to_text()?))
    }

    /// Every match of `query` on one page
    fn search_page(&self, index: usize, query: &str) -> Result<Vec<SearchResult>> {
        let text = self.page_text(index)?;
        let title = page_title(index);
        Ok(find_all_ignore_case(&text, query)
            .map(|(start, end)| SearchResult {
                chapter_index: index,
                chapter_title: title.clone(),
                snippet: snippet_around(&text, start, end, self.snippet_radius),
                position: char_offset(&text, start),
            })
            .collect())
    }
}

fn convert_outlines(outlines: &[Outline], level: u32) -> Vec<OutlineItem> {
    outlines
        .iter()
        .map(|outline| {
            let title = if outline.title.trim().is_empty() {
                "Untitled".to_string()
            } else {
                outline.title.trim().to_string()
            };
            OutlineItem {
                title,
                chapter_index: outline.page.map(|p| p as usize),
                level,
                children: convert_outlines(&outline.down, level + 1),
            }
        })
        .collect()
}

#[async_trait]
impl DocumentEngine for PdfEngine {
    fn format(&self) -> BookFormat {
        BookFormat::Pdf
    }

    fn chapter_count(&self) -> usize {
        self.inner.doc.page_count()
    }

    async fn chapter(&self, index: usize) -> Result<Chapter> {
        let text = self.extract_text(index).await?;
        Ok(Chapter::plain(index, page_title(index), text))
    }

    async fn outline(&self) -> Result<Vec<OutlineItem>> {
        let inner = self.inner.clone();
        tokio::task::spawn_blocking(move || {
            inner
                .doc
                .with_doc(|mupdf_doc| Ok(convert_outlines(&mupdf_doc.outlines()?, 0)))
        })
        .await?
    }

    fn search(&self, query: &str, cancel: CancellationToken) -> SearchStream {
        if query.is_empty() {
            return stream::empty().boxed();
        }

        let state = PageScan {
            book: self.inner.clone(),
            query: query.to_string(),
            page: 0,
            pending: VecDeque::new(),
        };

        stream::unfold(Some(state), move |state| {
            let cancel = cancel.clone();
            async move {
                let mut state = state?;
                loop {
                    if let Some(hit) = state.pending.pop_front() {
                        return Some((Ok(hit), Some(state)));
                    }
                    if state.page >= state.book.doc.page_count() {
                        return None;
                    }
                    if cancel.is_cancelled() {
                        return Some((Err(DocumentError::Cancelled), None));
                    }

                    let book = state.book.clone();
                    let query = state.query.clone();
                    let page = state.page;
                    state.page += 1;

                    match tokio::task::spawn_blocking(move || book.search_page(page, &query)).await
                    {
                        Ok(Ok(hits)) => state.pending.extend(hits),
                        Ok(Err(err)) => return Some((Err(err), None)),
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

    fn page_count(&self) -> Option<usize> {
        Some(self.inner.doc.page_count())
    }

    fn page_size(&self, index: usize) -> Result<PageSize> {
        self.inner.doc.page_size(index)
    }

    async fn render_page(
        &self,
        index: usize,
        width: u32,
        height: u32,
    ) -> Result<Option<Arc<RenderedPage>>> {
        self.check_index(index)?;

        let key = RenderCacheKey::new(index, width, height);
        if let Some(page) = self.inner.cache.get(&key) {
            return Ok(Some(page));
        }

        // MuPDF access is serialized by SafeDocument already
        let _guard = self.inner.render_lock.lock().await;
        if let Some(page) = self.inner.cache.get(&key) {
            return Ok(Some(page));
        }

        let inner = self.inner.clone();
        let rendered = tokio::task::spawn_blocking(move || {
            inner
                .doc
                .with_page(index, |page| render_fit(page, index, width, height))
        })
        .await?;

        match rendered {
            Ok(page) => {
                let page = Arc::new(page);
                self.inner.cache.put(key, page.clone());
                Ok(Some(page))
            }
            Err(err) => {
                tracing::warn!(page = index, width, height, error = %err, "Page render failed");
                Ok(None)
            }
        }
    }

    fn release(&self) {
        self.inner.cache.clear();
    }
}

/// Forward-only page scanner backing a search stream
struct PageScan {
    book: Arc<PdfBook>,
    query: String,
    /// Next page to extract
    page: usize,
    /// Hits of the last extracted page not yet yielded
    pending: VecDeque<SearchResult>,
}
