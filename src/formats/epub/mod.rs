//! EPUB format implementation
//!
//! # Architecture
//!
//! - [`container`]: ZIP archive or extracted directory, `container.xml`
//! - [`package`]: OPF metadata, manifest and spine
//! - [`navigation`]: EPUB 3 nav and EPUB 2 NCX tables of contents
//! - [`markup`]: plain text and resource references of content documents
//! - [`EpubEngine`]: `DocumentEngine` tying these together
//!
//! Resolution chain: `META-INF/container.xml` -> package document ->
//! manifest -> spine -> metadata (and the optional cover entry).

pub mod container;
mod document;
pub mod markup;
pub mod navigation;
pub mod package;

pub use document::{EpubEngine, EpubOpenOptions};
