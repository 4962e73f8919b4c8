//! Unified engine facade
//!
//! Detects the format of a path or URI, opens the matching engine and keeps
//! the most recent [`Session`] as the current document. Opening a new
//! document closes the previous one.
//!
//! ```rust,ignore
//! let engine = UnifiedEngine::new(EngineConfig::from_env());
//! let session = engine.open_document("moby-dick.epub", None).await?;
//! let first = session.chapter(0).await?;
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use image::DynamicImage;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::config::EngineConfig;
use crate::document::{
    BookFormat, Chapter, ContentResolver, DocumentEngine, DocumentError, DocumentInfo,
    EngineKind, FileSystemResolver, FormatDetector, OutlineItem, Result, SearchStream,
};
use crate::formats::epub::{EpubEngine, EpubOpenOptions};
use crate::formats::pdf::{PdfEngine, PdfOpenOptions};
use crate::formats::txt::{TxtEngine, TxtOpenOptions};
use crate::session::Session;

pub struct UnifiedEngine<R = FileSystemResolver> {
    config: EngineConfig,
    detector: FormatDetector<R>,
    current: Mutex<Option<Session>>,
}

impl UnifiedEngine<FileSystemResolver> {
    pub fn new(config: EngineConfig) -> Self {
        Self::with_resolver(config, FileSystemResolver)
    }
}

impl Default for UnifiedEngine<FileSystemResolver> {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl<R: ContentResolver> UnifiedEngine<R> {
    /// Create an engine that resolves URIs through `resolver`
    pub fn with_resolver(config: EngineConfig, resolver: R) -> Self {
        Self {
            config,
            detector: FormatDetector::new(resolver),
            current: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Detect the format of a path or URI without opening it
    pub fn detect_format(&self, path_or_uri: &str) -> BookFormat {
        self.detector.detect(path_or_uri)
    }

    /// Open a document and make it the current one
    ///
    /// `format` overrides detection. The previous document is closed first.
    pub async fn open_document(
        &self,
        path_or_uri: &str,
        format: Option<BookFormat>,
    ) -> Result<Session> {
        self.open_document_with_cancel(path_or_uri, format, CancellationToken::new())
            .await
    }

    /// [`open_document`](Self::open_document) with a cancellation token
    /// checked while the document is parsed
    pub async fn open_document_with_cancel(
        &self,
        path_or_uri: &str,
        format: Option<BookFormat>,
        cancel: CancellationToken,
    ) -> Result<Session> {
        let path = self
            .detector
            .resolver()
            .resolve_path(path_or_uri)
            .filter(|path| path.exists())
            .ok_or_else(|| DocumentError::FileNotFound(PathBuf::from(path_or_uri)))?;

        let format = format.unwrap_or_else(|| self.detector.detect(path_or_uri));
        let kind = format
            .engine()
            .ok_or_else(|| DocumentError::UnsupportedFormat(format.to_string()))?;

        let previous = self.current.lock().take();
        if let Some(previous) = previous {
            previous.close();
        }

        tracing::debug!(uri = path_or_uri, format = ?format, engine = ?kind, "Opening document");

        let engine: Arc<dyn DocumentEngine> = match kind {
            EngineKind::Pdf => {
                let options = PdfOpenOptions {
                    cache_capacity: self.config.render.cache_capacity,
                    snippet_radius: self.config.search.snippet_radius,
                };
                Arc::new(PdfEngine::open(&path, options, cancel).await?)
            }
            EngineKind::Epub => {
                let options = EpubOpenOptions {
                    snippet_radius: self.config.search.snippet_radius,
                };
                Arc::new(EpubEngine::open(&path, options, cancel).await?)
            }
            EngineKind::Txt => {
                let options = TxtOpenOptions {
                    strict_charset: self.config.txt.strict_charset,
                    chapter_detection: self.config.txt.chapter_detection.clone(),
                    context_lines: self.config.search.context_lines,
                    format,
                    ..Default::default()
                };
                Arc::new(TxtEngine::open(&path, options, cancel).await?)
            }
        };

        let session = Session::new(path.display().to_string(), engine);
        tracing::info!(session = %session.id(), path = %session.path(), format = ?format, "Opened document");

        let replaced = self.current.lock().replace(session.clone());
        if let Some(replaced) = replaced {
            replaced.close();
        }

        Ok(session)
    }

    /// Current session, if a document is open
    pub fn current_session(&self) -> Option<Session> {
        self.current
            .lock()
            .as_ref()
            .filter(|session| session.is_opened())
            .cloned()
    }

    fn current(&self) -> Result<Session> {
        self.current_session().ok_or(DocumentError::NotOpen)
    }

    pub fn is_opened(&self) -> bool {
        self.current_session().is_some()
    }

    /// Format of the current document
    pub fn format(&self) -> Result<BookFormat> {
        Ok(self.current()?.format())
    }

    pub fn chapter_count(&self) -> Result<usize> {
        self.current()?.chapter_count()
    }

    pub async fn chapter(&self, index: usize) -> Result<Chapter> {
        self.current()?.chapter(index).await
    }

    pub async fn outline(&self) -> Result<Vec<OutlineItem>> {
        self.current()?.outline().await
    }

    pub fn search(&self, query: &str) -> Result<SearchStream> {
        self.current()?.search(query)
    }

    pub async fn cover(&self) -> Result<Option<DynamicImage>> {
        self.current()?.cover().await
    }

    pub fn document_info(&self) -> Result<DocumentInfo> {
        self.current()?.document_info()
    }

    /// Close the current document, if any
    pub fn close(&self) {
        let session = self.current.lock().take();
        if let Some(session) = session {
            session.close();
        }
    }
}
