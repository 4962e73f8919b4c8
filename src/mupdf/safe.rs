//! Thread-safe document wrapper for MuPDF
//!
//! # Design
//!
//! MuPDF documents are not thread-safe. This wrapper:
//!
//! 1. Stores the document path
//! 2. Opens a fresh document for each operation
//! 3. Uses `parking_lot::Mutex` to serialize access
//!
//! No `mupdf::Document` outlives the closure it was opened for.

use std::path::{Path, PathBuf};

use mupdf::{Document, Page};
use parking_lot::Mutex;

use crate::document::{DocumentError, DocumentResult, PageSize};

/// Thread-safe PDF document handle
pub struct SafeDocument {
    path: PathBuf,
    page_count: usize,
    _lock: Mutex<()>,
}

impl SafeDocument {
    /// Open and validate a document, caching its page count
    pub fn open<P: AsRef<Path>>(path: P) -> DocumentResult<Self> {
        let path = path.as_ref().to_path_buf();
        if !path.is_file() {
            return Err(DocumentError::FileNotFound(path));
        }

        let doc = open_path(&path)?;
        let page_count = doc.page_count()?.max(0) as usize;

        Ok(Self {
            path,
            page_count,
            _lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn page_count(&self) -> usize {
        self.page_count
    }

    /// Execute a closure with access to a freshly opened document
    ///
    /// ```ignore
    /// let bounds = safe_doc.with_doc(|doc| {
    ///     let page = doc.load_page(0)?;
    ///     Ok(page.bounds()?)
    /// })?;
    /// ```
    pub fn with_doc<F, R>(&self, f: F) -> DocumentResult<R>
    where
        F: FnOnce(&Document) -> DocumentResult<R>,
    {
        let _guard = self._lock.lock();
        let doc = open_path(&self.path)?;
        f(&doc)
    }

    /// Execute a closure with one loaded page
    pub fn with_page<F, R>(&self, index: usize, f: F) -> DocumentResult<R>
    where
        F: FnOnce(&Page) -> DocumentResult<R>,
    {
        if index >= self.page_count {
            return Err(DocumentError::invalid_index(index, self.page_count));
        }
        self.with_doc(|doc| {
            let page = doc.load_page(index as i32)?;
            f(&page)
        })
    }

    /// Page dimensions in points
    pub fn page_size(&self, index: usize) -> DocumentResult<PageSize> {
        self.with_page(index, |page| {
            let bounds = page.bounds()?;
            Ok(PageSize::new(bounds.x1 - bounds.x0, bounds.y1 - bounds.y0))
        })
    }
}

fn open_path(path: &Path) -> DocumentResult<Document> {
    let path_str = path.to_string_lossy();
    Document::open(&*path_str).map_err(Into::into)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_missing_file() {
        let result = SafeDocument::open("/nonexistent/book.pdf");
        assert!(matches!(result, Err(DocumentError::FileNotFound(_))));
    }

    fn assert_send_sync<T: Send + Sync>() {}

    #[test]
    fn test_safe_document_is_send_sync() {
        // Shared across spawn_blocking tasks through Arc
        assert_send_sync::<SafeDocument>();
        assert_send_sync::<std::sync::Arc<SafeDocument>>();
    }
}
