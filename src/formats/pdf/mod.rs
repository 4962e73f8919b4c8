//! PDF format implementation
//!
//! - [`PdfEngine`]: `DocumentEngine` over MuPDF's page tree, text layer
//!   and outline
//! - `renderer`: fit-and-center rasterization into RGBA canvases
//!
//! MuPDF access goes through [`SafeDocument`](crate::mupdf::SafeDocument).

mod document;
mod renderer;

pub use document::{PdfEngine, PdfOpenOptions};
