//! Format-specific document engines
//!
//! Each module provides one [`DocumentEngine`](crate::document::DocumentEngine)
//! implementation, opened by an async `open(path, options, cancel)`:
//!
//! - [`txt`]: plain text (also serves MOBI, HTML and RTF)
//! - [`epub`]: EPUB 2/3 archives and extracted directories
//! - [`pdf`]: PDF through MuPDF

pub mod epub;
pub mod pdf;
pub mod txt;
