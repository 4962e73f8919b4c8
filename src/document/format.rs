//! Book format detection
//!
//! Maps file extensions and MIME types to [`BookFormat`]. Detection never
//! fails: unknown inputs resolve to [`BookFormat::Unknown`] and callers are
//! expected to check before dispatching to an engine.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::formats::epub::container::CONTAINER_XML;

/// Number of leading bytes read for magic-byte sniffing
const SNIFF_LEN: usize = 64;

/// Book format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookFormat {
    Pdf,
    Epub,
    Mobi,
    Azw3,
    Txt,
    Docx,
    Html,
    Chm,
    Cbz,
    Cbr,
    Fb2,
    Djvu,
    Rtf,
    Unknown,
}

/// Backing engine a format is routed to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineKind {
    Pdf,
    Epub,
    Txt,
}

impl BookFormat {
    /// All known formats, `Unknown` last
    pub const ALL: [BookFormat; 14] = [
        BookFormat::Pdf,
        BookFormat::Epub,
        BookFormat::Mobi,
        BookFormat::Azw3,
        BookFormat::Txt,
        BookFormat::Docx,
        BookFormat::Html,
        BookFormat::Chm,
        BookFormat::Cbz,
        BookFormat::Cbr,
        BookFormat::Fb2,
        BookFormat::Djvu,
        BookFormat::Rtf,
        BookFormat::Unknown,
    ];

    /// Detect format from file extension (case-insensitive, no leading dot)
    pub fn from_extension(ext: &str) -> Self {
        match ext.trim_start_matches('.').to_lowercase().as_str() {
            "pdf" => Self::Pdf,
            "epub" => Self::Epub,
            "mobi" | "azw" => Self::Mobi,
            "azw3" => Self::Azw3,
            "txt" | "md" | "markdown" => Self::Txt,
            "docx" => Self::Docx,
            "html" | "htm" | "xhtml" => Self::Html,
            "chm" => Self::Chm,
            "cbz" => Self::Cbz,
            "cbr" => Self::Cbr,
            "fb2" => Self::Fb2,
            "djvu" => Self::Djvu,
            "rtf" => Self::Rtf,
            _ => Self::Unknown,
        }
    }

    /// Detect format from MIME type
    pub fn from_mime_type(mime: &str) -> Self {
        let essence = mime.split(';').next().unwrap_or("").trim().to_lowercase();
        match essence.as_str() {
            "application/pdf" => Self::Pdf,
            "application/epub+zip" => Self::Epub,
            "application/x-mobipocket-ebook" => Self::Mobi,
            "application/vnd.amazon.mobi8-ebook" => Self::Azw3,
            "text/plain" | "text/markdown" => Self::Txt,
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document" => Self::Docx,
            "text/html" | "application/xhtml+xml" => Self::Html,
            "application/x-chm" | "application/vnd.ms-htmlhelp" => Self::Chm,
            "application/vnd.comicbook+zip" | "application/x-cbz" => Self::Cbz,
            "application/vnd.comicbook-rar" | "application/x-cbr" => Self::Cbr,
            "application/x-fictionbook" | "application/x-fictionbook+xml" => Self::Fb2,
            "image/vnd.djvu" | "image/x-djvu" => Self::Djvu,
            "application/rtf" | "text/rtf" => Self::Rtf,
            _ => Self::Unknown,
        }
    }

    /// Detect format from magic bytes
    ///
    /// Only formats with an unambiguous signature are recognized. ZIP files
    /// are reported as EPUB only when the stored mimetype entry says so.
    pub fn from_magic_bytes(bytes: &[u8]) -> Self {
        if bytes.len() < 4 {
            return Self::Unknown;
        }

        if bytes.starts_with(b"%PDF") {
            return Self::Pdf;
        }

        if bytes.starts_with(b"PK") && bytes.len() > 30 {
            let head = &bytes[..bytes.len().min(SNIFF_LEN)];
            if head.windows(4).any(|w| w == b"epub") {
                return Self::Epub;
            }
            return Self::Unknown;
        }

        if bytes.starts_with(b"AT&TFORM") {
            return Self::Djvu;
        }

        if bytes.starts_with(b"{\\rtf") {
            return Self::Rtf;
        }

        // MOBI: "BOOKMOBI" at offset 60 of the PalmDB header
        if bytes.len() >= 68 && &bytes[60..68] == b"BOOKMOBI" {
            return Self::Mobi;
        }

        Self::Unknown
    }

    /// Canonical file extension (empty for `Unknown`)
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Epub => "epub",
            Self::Mobi => "mobi",
            Self::Azw3 => "azw3",
            Self::Txt => "txt",
            Self::Docx => "docx",
            Self::Html => "html",
            Self::Chm => "chm",
            Self::Cbz => "cbz",
            Self::Cbr => "cbr",
            Self::Fb2 => "fb2",
            Self::Djvu => "djvu",
            Self::Rtf => "rtf",
            Self::Unknown => "",
        }
    }

    /// Human-readable name for labelling files
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Pdf => "Portable Document Format",
            Self::Epub => "EPUB",
            Self::Mobi => "MOBI",
            Self::Azw3 => "AZW3",
            Self::Txt => "TXT",
            Self::Docx => "DOCX",
            Self::Html => "HTML",
            Self::Chm => "CHM",
            Self::Cbz => "CBZ",
            Self::Cbr => "CBR",
            Self::Fb2 => "FB2",
            Self::Djvu => "DJVU",
            Self::Rtf => "RTF",
            Self::Unknown => "Unknown",
        }
    }

    /// Primary MIME type
    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Pdf => "application/pdf",
            Self::Epub => "application/epub+zip",
            Self::Mobi => "application/x-mobipocket-ebook",
            Self::Azw3 => "application/vnd.amazon.mobi8-ebook",
            Self::Txt => "text/plain",
            Self::Docx => {
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
            }
            Self::Html => "text/html",
            Self::Chm => "application/x-chm",
            Self::Cbz => "application/vnd.comicbook+zip",
            Self::Cbr => "application/x-cbr",
            Self::Fb2 => "application/x-fictionbook",
            Self::Djvu => "image/vnd.djvu",
            Self::Rtf => "application/rtf",
            Self::Unknown => "application/octet-stream",
        }
    }

    /// Engine that opens this format, if any
    ///
    /// MOBI shares the TXT engine, as do HTML and RTF which are read as
    /// plain text.
    pub fn engine(&self) -> Option<EngineKind> {
        match self {
            Self::Pdf => Some(EngineKind::Pdf),
            Self::Epub => Some(EngineKind::Epub),
            Self::Txt | Self::Mobi | Self::Html | Self::Rtf => Some(EngineKind::Txt),
            _ => None,
        }
    }

    /// Whether the format is a known one
    pub fn is_supported(&self) -> bool {
        *self != Self::Unknown
    }
}

impl std::fmt::Display for BookFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Platform content resolution
///
/// Supplies MIME types and local file paths for paths or content URIs. On a
/// device this is backed by the platform content resolver.
pub trait ContentResolver: Send + Sync {
    /// MIME type of the resource, if it can be determined
    fn mime_type(&self, path_or_uri: &str) -> Option<String>;

    /// Local filesystem path for the resource, if it resolves to one
    fn resolve_path(&self, path_or_uri: &str) -> Option<PathBuf>;
}

/// Resolver for plain paths and `file://` URIs
#[derive(Debug, Clone, Copy, Default)]
pub struct FileSystemResolver;

impl ContentResolver for FileSystemResolver {
    fn mime_type(&self, path_or_uri: &str) -> Option<String> {
        let path = self.resolve_path(path_or_uri)?;

        if let Some(sniffed) = sniff_file(&path) {
            return Some(sniffed.mime_type().to_string());
        }

        mime_guess::from_path(&path)
            .first()
            .map(|mime| mime.essence_str().to_string())
    }

    fn resolve_path(&self, path_or_uri: &str) -> Option<PathBuf> {
        if let Some(rest) = path_or_uri.strip_prefix("file://") {
            let decoded = urlencoding::decode(strip_query(rest)).ok()?;
            return Some(PathBuf::from(decoded.into_owned()));
        }
        if has_scheme(path_or_uri) {
            return None;
        }
        Some(PathBuf::from(path_or_uri))
    }
}

/// Stateless format detector
///
/// Resolution order: extension table first, MIME lookup as fallback.
pub struct FormatDetector<R = FileSystemResolver> {
    resolver: R,
}

impl Default for FormatDetector<FileSystemResolver> {
    fn default() -> Self {
        Self::new(FileSystemResolver)
    }
}

impl<R: ContentResolver> FormatDetector<R> {
    /// Create a detector backed by the given content resolver
    pub fn new(resolver: R) -> Self {
        Self { resolver }
    }

    /// The content resolver used for MIME lookups and URI resolution
    pub fn resolver(&self) -> &R {
        &self.resolver
    }

    /// Detect the format of a path or URI
    pub fn detect(&self, path_or_uri: &str) -> BookFormat {
        if let Some(ext) = extension_of(path_or_uri) {
            let by_extension = BookFormat::from_extension(&ext);
            if by_extension.is_supported() {
                return by_extension;
            }
        }

        match self.resolver.mime_type(path_or_uri) {
            Some(mime) => {
                let by_mime = BookFormat::from_mime_type(&mime);
                tracing::debug!(uri = path_or_uri, mime = %mime, format = ?by_mime, "Format detected by MIME lookup");
                by_mime
            }
            None => BookFormat::Unknown,
        }
    }
}

/// Extract the lowercase extension from a path or URI
///
/// Query strings and fragments of URIs are ignored and percent-encoding is
/// decoded before the extension is taken from the last path segment.
pub fn extension_of(path_or_uri: &str) -> Option<String> {
    let without_query = strip_query(path_or_uri);
    let decoded = urlencoding::decode(without_query)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| without_query.to_string());

    let name = decoded.rsplit(['/', '\\']).next()?;
    let ext = Path::new(name).extension()?.to_str()?;
    if ext.is_empty() {
        None
    } else {
        Some(ext.to_lowercase())
    }
}

fn strip_query(uri: &str) -> &str {
    let end = uri.find(['?', '#']).unwrap_or(uri.len());
    &uri[..end]
}

fn has_scheme(s: &str) -> bool {
    match s.find("://") {
        Some(idx) => s[..idx]
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.')),
        None => false,
    }
}

fn sniff_file(path: &Path) -> Option<BookFormat> {
    if path.is_dir() {
        // Extracted EPUB
        return path
            .join(CONTAINER_XML)
            .is_file()
            .then_some(BookFormat::Epub);
    }
    let mut file = File::open(path).ok()?;
    let mut head = [0u8; 128];
    let read = file.read(&mut head).ok()?;
    let format = BookFormat::from_magic_bytes(&head[..read]);
    format.is_supported().then_some(format)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StaticResolver(Option<&'static str>);

    impl ContentResolver for StaticResolver {
        fn mime_type(&self, _path_or_uri: &str) -> Option<String> {
            self.0.map(str::to_string)
        }

        fn resolve_path(&self, _path_or_uri: &str) -> Option<PathBuf> {
            None
        }
    }

    #[test]
    fn test_every_table_extension_is_detected() {
        let detector = FormatDetector::new(StaticResolver(None));
        for format in BookFormat::ALL {
            if format == BookFormat::Unknown {
                continue;
            }
            let path = format!("/books/sample.{}", format.extension());
            assert_eq!(detector.detect(&path), format, "extension {}", format.extension());
        }
    }

    #[test]
    fn test_unknown_extension() {
        let detector = FormatDetector::new(StaticResolver(None));
        assert_eq!(detector.detect("/books/sample.xyz"), BookFormat::Unknown);
        assert_eq!(detector.detect("/books/no_extension"), BookFormat::Unknown);
    }

    #[test]
    fn test_extension_aliases() {
        assert_eq!(BookFormat::from_extension("AZW"), BookFormat::Mobi);
        assert_eq!(BookFormat::from_extension("htm"), BookFormat::Html);
        assert_eq!(BookFormat::from_extension("markdown"), BookFormat::Txt);
        assert_eq!(BookFormat::from_extension(".EPUB"), BookFormat::Epub);
    }

    #[test]
    fn test_mime_fallback_for_content_uri() {
        let detector = FormatDetector::new(StaticResolver(Some("application/epub+zip")));
        assert_eq!(
            detector.detect("content://com.android.providers/document/1234"),
            BookFormat::Epub
        );
    }

    #[test]
    fn test_extension_wins_over_mime() {
        let detector = FormatDetector::new(StaticResolver(Some("application/pdf")));
        assert_eq!(detector.detect("/books/novel.txt"), BookFormat::Txt);
    }

    #[test]
    fn test_extension_of_uri() {
        assert_eq!(
            extension_of("file:///storage/My%20Book.EPUB?download=1#frag"),
            Some("epub".to_string())
        );
        assert_eq!(extension_of("content://media/external/42"), None);
    }

    #[test]
    fn test_from_mime_type_with_parameters() {
        assert_eq!(
            BookFormat::from_mime_type("text/plain; charset=utf-8"),
            BookFormat::Txt
        );
        assert_eq!(BookFormat::from_mime_type("image/png"), BookFormat::Unknown);
    }

    #[test]
    fn test_magic_bytes() {
        assert_eq!(BookFormat::from_magic_bytes(b"%PDF-1.7\n"), BookFormat::Pdf);
        let mut zip_head = b"PK\x03\x04".to_vec();
        zip_head.extend_from_slice(&[0u8; 26]);
        zip_head.extend_from_slice(b"mimetypeapplication/epub+zip");
        assert_eq!(BookFormat::from_magic_bytes(&zip_head), BookFormat::Epub);
        assert_eq!(BookFormat::from_magic_bytes(b"PK"), BookFormat::Unknown);
    }

    #[test]
    fn test_engine_routing() {
        assert_eq!(BookFormat::Mobi.engine(), Some(EngineKind::Txt));
        assert_eq!(BookFormat::Pdf.engine(), Some(EngineKind::Pdf));
        assert_eq!(BookFormat::Cbz.engine(), None);
        assert_eq!(BookFormat::Unknown.engine(), None);
    }

    #[test]
    fn test_extracted_epub_directory() {
        let dir = tempfile::tempdir().unwrap();
        let detector = FormatDetector::default();
        let path = dir.path().display().to_string();
        assert_eq!(detector.detect(&path), BookFormat::Unknown);

        std::fs::create_dir_all(dir.path().join("META-INF")).unwrap();
        std::fs::write(dir.path().join(CONTAINER_XML), "<container/>").unwrap();
        assert_eq!(detector.detect(&path), BookFormat::Epub);
    }

    #[test]
    fn test_file_resolver_paths() {
        let resolver = FileSystemResolver;
        assert_eq!(
            resolver.resolve_path("file:///tmp/a%20b.txt"),
            Some(PathBuf::from("/tmp/a b.txt"))
        );
        assert_eq!(resolver.resolve_path("content://x/y"), None);
        assert_eq!(
            resolver.resolve_path("/tmp/plain.pdf"),
            Some(PathBuf::from("/tmp/plain.pdf"))
        );
    }
}
