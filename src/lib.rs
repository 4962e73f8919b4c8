//! Readwise document engine
//!
//! Opens PDF, EPUB and plain-text books behind one interface.
//!
//! # Modules
//!
//! - `document`: format detection, shared types, the `DocumentEngine` trait
//! - `formats`: TXT, EPUB and PDF engines
//! - `engine`: `UnifiedEngine` facade tracking the current document
//! - `session`: `Session` handle for one open document
//! - `config`: `EngineConfig` defaults and environment overrides
//! - `mupdf`: serialized MuPDF access

pub mod config;
pub mod document;
pub mod engine;
pub mod formats;
pub mod mupdf;
pub mod session;

pub use config::EngineConfig;
pub use document::{
    BookFormat, Chapter, DocumentEngine, DocumentError, DocumentInfo, DocumentResult,
    FormatDetector, OutlineItem, ReadingPosition, SearchResult, SearchStream,
};
pub use engine::UnifiedEngine;
pub use session::Session;
