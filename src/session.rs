//! Open-document handle
//!
//! A [`Session`] owns one engine. Clones share it; closing any clone closes
//! them all. After [`Session::close`] every query fails with
//! [`DocumentError::DocumentClosed`] and in-flight searches end with
//! [`DocumentError::Cancelled`].

use std::sync::Arc;

use chrono::{DateTime, Utc};
use image::DynamicImage;
use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::document::{
    BookFormat, Chapter, DocumentEngine, DocumentError, DocumentInfo, OutlineItem, PageSize,
    ReadingPosition, RenderedPage, Result, SearchStream,
};

#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    id: Uuid,
    path: String,
    format: BookFormat,
    opened_at: DateTime<Utc>,
    engine: RwLock<Option<Arc<dyn DocumentEngine>>>,
    /// Parent of every search token handed out by this session
    cancel: CancellationToken,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.inner.id)
            .field("path", &self.inner.path)
            .field("format", &self.inner.format)
            .field("opened", &self.is_opened())
            .finish()
    }
}

impl Session {
    pub(crate) fn new(path: impl Into<String>, engine: Arc<dyn DocumentEngine>) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                id: Uuid::new_v4(),
                path: path.into(),
                format: engine.format(),
                opened_at: Utc::now(),
                engine: RwLock::new(Some(engine)),
                cancel: CancellationToken::new(),
            }),
        }
    }

    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    pub fn path(&self) -> &str {
        &self.inner.path
    }

    /// Format the document was opened as
    pub fn format(&self) -> BookFormat {
        self.inner.format
    }

    pub fn opened_at(&self) -> DateTime<Utc> {
        self.inner.opened_at
    }

    pub fn is_opened(&self) -> bool {
        self.inner.engine.read().is_some()
    }

    fn engine(&self) -> Result<Arc<dyn DocumentEngine>> {
        self.inner
            .engine
            .read()
            .clone()
            .ok_or(DocumentError::DocumentClosed)
    }

    pub fn chapter_count(&self) -> Result<usize> {
        Ok(self.engine()?.chapter_count())
    }

    pub async fn chapter(&self, index: usize) -> Result<Chapter> {
        self.engine()?.chapter(index).await
    }

    pub async fn outline(&self) -> Result<Vec<OutlineItem>> {
        self.engine()?.outline().await
    }

    /// Start a lazy search
    ///
    /// The stream is cancelled when the session closes.
    pub fn search(&self, query: &str) -> Result<SearchStream> {
        let engine = self.engine()?;
        Ok(engine.search(query, self.inner.cancel.child_token()))
    }

    pub async fn cover(&self) -> Result<Option<DynamicImage>> {
        self.engine()?.cover().await
    }

    pub fn document_info(&self) -> Result<DocumentInfo> {
        Ok(self.engine()?.info())
    }

    pub async fn resource(&self, href: &str) -> Result<Option<Vec<u8>>> {
        self.engine()?.resource(href).await
    }

    /// Page count, `None` for reflowable formats
    pub fn page_count(&self) -> Result<Option<usize>> {
        Ok(self.engine()?.page_count())
    }

    pub fn page_size(&self, index: usize) -> Result<PageSize> {
        self.engine()?.page_size(index)
    }

    pub async fn render_page(
        &self,
        index: usize,
        width: u32,
        height: u32,
    ) -> Result<Option<Arc<RenderedPage>>> {
        self.engine()?.render_page(index, width, height).await
    }

    /// Reading position at `char_offset` inside a chapter
    ///
    /// For paginated documents the chapter index is also the page index.
    pub fn reading_position(
        &self,
        chapter_index: usize,
        char_offset: usize,
    ) -> Result<ReadingPosition> {
        let engine = self.engine()?;
        engine.check_index(chapter_index)?;

        let position = ReadingPosition::at(chapter_index, char_offset, engine.chapter_count());
        Ok(match engine.page_count() {
            Some(_) => position.with_page(chapter_index),
            None => position,
        })
    }

    /// Release the document
    ///
    /// Idempotent. Cancels outstanding searches and drops engine caches.
    pub fn close(&self) {
        let engine = self.inner.engine.write().take();
        if let Some(engine) = engine {
            self.inner.cancel.cancel();
            engine.release();
            tracing::info!(session = %self.inner.id, path = %self.inner.path, "Closed document");
        }
    }
}
