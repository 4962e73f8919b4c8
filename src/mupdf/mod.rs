//! Low-level MuPDF wrapper
//!
//! MuPDF's `fz_context` is **NOT thread-safe**. [`SafeDocument`] opens a
//! fresh document per operation and serializes access with a mutex.
//!
//! ```rust,ignore
//! use readwise_engine::mupdf::SafeDocument;
//!
//! let doc = SafeDocument::open("paper.pdf")?;
//! let text = doc.with_page(0, |page| Ok(page.to_text()?))?;
//! ```

mod safe;

pub use safe::SafeDocument;
