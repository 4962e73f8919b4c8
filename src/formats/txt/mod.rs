//! Plain-text format implementation
//!
//! - [`charset`]: encoding detection (`encoding_rs`)
//! - [`chapters`]: line index and heading-based segmentation
//! - [`TxtEngine`]: `DocumentEngine` over the raw bytes

pub mod chapters;
pub mod charset;
mod document;

pub use charset::TxtCharset;
pub use document::{TxtEngine, TxtOpenOptions};
