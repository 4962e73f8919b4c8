//! Document traits
//!
//! Format-agnostic interface every engine implements.

use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::BoxStream;
use image::DynamicImage;
use tokio_util::sync::CancellationToken;

use super::error::{DocumentError, Result};
use super::format::BookFormat;
use super::types::{Chapter, DocumentInfo, OutlineItem, PageSize, RenderedPage, SearchResult};

/// Lazy stream of search hits
///
/// Finite and forward-only. Dropping the stream stops the scan; a
/// cancelled token makes it yield one `Err(Cancelled)` and end.
pub type SearchStream = BoxStream<'static, Result<SearchResult>>;

/// Format-agnostic document engine
///
/// One instance holds one open document. Engines are constructed by their
/// `open` functions and released by dropping them.
#[async_trait]
pub trait DocumentEngine: Send + Sync {
    /// Format this engine was opened with
    fn format(&self) -> BookFormat;

    /// Number of chapters (pages for PDF)
    fn chapter_count(&self) -> usize;

    /// Materialize a chapter
    async fn chapter(&self, index: usize) -> Result<Chapter>;

    /// Table of contents
    async fn outline(&self) -> Result<Vec<OutlineItem>>;

    /// Search the document for `query`, case-insensitively
    fn search(&self, query: &str, cancel: CancellationToken) -> SearchStream;

    /// Cover image, if the document has a decodable one
    async fn cover(&self) -> Result<Option<DynamicImage>>;

    /// Document information gathered at open time
    fn info(&self) -> DocumentInfo;

    /// Raw bytes of an embedded resource
    async fn resource(&self, _href: &str) -> Result<Option<Vec<u8>>> {
        Err(DocumentError::UnsupportedOperation {
            format: self.format().display_name(),
            operation: "resource",
        })
    }

    /// Page count for paginated formats
    fn page_count(&self) -> Option<usize> {
        None
    }

    /// Page dimensions in points
    fn page_size(&self, _index: usize) -> Result<PageSize> {
        Err(DocumentError::UnsupportedOperation {
            format: self.format().display_name(),
            operation: "page_size",
        })
    }

    /// Render a page onto a `width x height` canvas
    ///
    /// `Ok(None)` means the renderer failed for this page.
    async fn render_page(
        &self,
        _index: usize,
        _width: u32,
        _height: u32,
    ) -> Result<Option<Arc<RenderedPage>>> {
        Err(DocumentError::UnsupportedOperation {
            format: self.format().display_name(),
            operation: "render_page",
        })
    }

    /// Release caches and buffers ahead of drop
    fn release(&self) {}

    /// Check a chapter index against the chapter count
    fn check_index(&self, index: usize) -> Result<()> {
        let count = self.chapter_count();
        if index >= count {
            return Err(DocumentError::invalid_index(index, count));
        }
        Ok(())
    }
}
