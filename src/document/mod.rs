//! Unified document abstraction
//!
//! This module provides the format-agnostic interfaces and types shared by
//! the PDF, EPUB and TXT engines.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │              UnifiedEngine  ->  Session                 │
//! │   (format detection, open/close, pass-through calls)    │
//! └─────────────────────────────────────────────────────────┘
//!                            │  Arc<dyn DocumentEngine>
//!           ┌────────────────┼────────────────┐
//!           ▼                ▼                ▼
//!   ┌──────────────┐ ┌──────────────┐ ┌──────────────┐
//!   │  PdfEngine   │ │  EpubEngine  │ │  TxtEngine   │
//!   │ (RenderCache)│ │ (zip / dir)  │ │  (charset)   │
//!   └──────────────┘ └──────────────┘ └──────────────┘
//!           │
//!           ▼
//!   ┌─────────────────────────────────────────────────────┐
//!   │                 SafeDocument                        │
//!   │  (serialized MuPDF access)                          │
//!   └─────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use readwise_engine::{UnifiedEngine, EngineConfig};
//! use futures::StreamExt;
//!
//! let engine = UnifiedEngine::new(EngineConfig::default());
//! let session = engine.open_document("book.epub", None).await?;
//!
//! let chapter = session.chapter(0).await?;
//! let mut hits = session.search("whale")?;
//! while let Some(hit) = hits.next().await {
//!     println!("{}", hit?.snippet);
//! }
//! ```

mod cache;
mod error;
mod format;
mod text;
mod traits;
mod types;

pub use cache::{CacheStats, RenderCache, RenderCacheKey, DEFAULT_RENDER_CACHE_CAPACITY};
pub use error::{DocumentError, DocumentResult, Result};
pub use format::{
    extension_of, BookFormat, ContentResolver, EngineKind, FileSystemResolver, FormatDetector,
};
pub use text::{char_offset, find_all_ignore_case, find_ignore_case, snippet_around, word_count};
pub use traits::{DocumentEngine, SearchStream};
pub use types::{
    Chapter, ChapterResource, DocumentInfo, OutlineItem, PageSize, ReadingPosition, RenderedPage,
    SearchResult,
};
