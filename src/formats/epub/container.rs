//! EPUB container access
//!
//! A container is either a packed `.epub` (ZIP) or an already extracted
//! directory. Paths are always archive-style: `/`-separated and relative to
//! the container root.

use std::borrow::Cow;
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use quick_xml::events::Event;
use quick_xml::Reader;
use zip::result::ZipError;
use zip::ZipArchive;

use crate::document::{DocumentError, Result};

/// Location of the container descriptor
pub const CONTAINER_XML: &str = "META-INF/container.xml";

/// Upper bound on the buffer reserved from an entry's declared size
const MAX_PREALLOC: u64 = 1 << 20;

pub enum EpubContainer {
    Archive(Mutex<ZipArchive<Cursor<Vec<u8>>>>),
    Directory(PathBuf),
}

impl EpubContainer {
    /// Open a packed EPUB file or an extracted EPUB directory
    pub fn open(path: &Path) -> Result<Self> {
        if path.is_dir() {
            return Ok(EpubContainer::Directory(path.to_path_buf()));
        }
        if !path.is_file() {
            return Err(DocumentError::FileNotFound(path.to_path_buf()));
        }

        let bytes = std::fs::read(path)?;
        let archive = ZipArchive::new(Cursor::new(bytes)).map_err(|e| {
            DocumentError::MalformedContainer(format!("not a ZIP archive: {}", e))
        })?;
        Ok(EpubContainer::Archive(Mutex::new(archive)))
    }

    /// Read an entry, `None` when it does not exist
    pub fn read(&self, path: &str) -> Result<Option<Vec<u8>>> {
        match self {
            EpubContainer::Archive(archive) => {
                let mut archive = archive.lock();
                let mut file = match archive.by_name(path) {
                    Ok(file) => file,
                    Err(ZipError::FileNotFound) => return Ok(None),
                    Err(e) => return Err(e.into()),
                };
                let mut data = Vec::with_capacity(prealloc_len(file.size()));
                file.read_to_end(&mut data)?;
                Ok(Some(data))
            }
            EpubContainer::Directory(root) => {
                let full = root.join(path);
                if !full.is_file() {
                    return Ok(None);
                }
                Ok(Some(std::fs::read(full)?))
            }
        }
    }

    /// Path of the package document named by `META-INF/container.xml`
    pub fn rootfile_path(&self) -> Result<String> {
        let bytes = self.read(CONTAINER_XML)?.ok_or_else(|| {
            DocumentError::MalformedContainer(format!("missing {}", CONTAINER_XML))
        })?;
        let xml = String::from_utf8_lossy(strip_bom(&bytes));
        parse_container_xml(&xml)
    }

    pub fn is_archive(&self) -> bool {
        matches!(self, EpubContainer::Archive(_))
    }
}

/// Buffer to reserve for an entry whose header declares `declared` bytes
///
/// The header value is untrusted; `read_to_end` grows past the cap.
fn prealloc_len(declared: u64) -> usize {
    declared.min(MAX_PREALLOC) as usize
}

/// Extract `rootfile@full-path` from container.xml
pub fn parse_container_xml(xml: &str) -> Result<String> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) if e.local_name().as_ref() == b"rootfile" => {
                for attr in e.attributes().flatten() {
                    if attr.key.local_name().as_ref() == b"full-path" {
                        let value = attr.unescape_value().map_err(malformed)?;
                        if !value.is_empty() {
                            return Ok(value.into_owned());
                        }
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(malformed(e)),
            _ => {}
        }
    }

    Err(DocumentError::MalformedContainer(
        "no rootfile found in container.xml".to_string(),
    ))
}

fn malformed(err: quick_xml::Error) -> DocumentError {
    DocumentError::MalformedContainer(format!("container.xml: {}", err))
}

/// Directory part of an archive path ("" for root-level files)
pub fn parent_dir(path: &str) -> &str {
    path.rsplit_once('/').map(|(dir, _)| dir).unwrap_or("")
}

/// Resolve `href` against `base_dir`
///
/// Fragments are dropped, percent-escapes decoded, and `.`/`..` segments
/// collapsed. A leading `/` makes the href container-absolute.
pub fn resolve_href(base_dir: &str, href: &str) -> String {
    let href = href.split('#').next().unwrap_or("");
    let decoded = urlencoding::decode(href).unwrap_or(Cow::Borrowed(href));

    let mut parts: Vec<&str> = if decoded.starts_with('/') {
        Vec::new()
    } else {
        base_dir.split('/').filter(|s| !s.is_empty()).collect()
    };

    for segment in decoded.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            s => parts.push(s),
        }
    }

    parts.join("/")
}

/// Drop a UTF-8 byte-order mark
pub fn strip_bom(data: &[u8]) -> &[u8] {
    data.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONTAINER: &str = r#"<?xml version="1.0"?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
  <rootfiles>
    <rootfile full-path="OEBPS/content.opf" media-type="application/oebps-package+xml"/>
  </rootfiles>
</container>"#;

    #[test]
    fn test_parse_container_xml() {
        assert_eq!(parse_container_xml(CONTAINER).unwrap(), "OEBPS/content.opf");
    }

    #[test]
    fn test_container_without_rootfile() {
        let result = parse_container_xml("<container><rootfiles/></container>");
        assert!(matches!(result, Err(DocumentError::MalformedContainer(_))));
    }

    #[test]
    fn test_resolve_href() {
        assert_eq!(resolve_href("OEBPS", "text/ch1.xhtml#p3"), "OEBPS/text/ch1.xhtml");
        assert_eq!(resolve_href("OEBPS/text", "../images/a%20b.png"), "OEBPS/images/a b.png");
        assert_eq!(resolve_href("", "./ch1.xhtml"), "ch1.xhtml");
        assert_eq!(resolve_href("OEBPS", "/cover.jpg"), "cover.jpg");
    }

    #[test]
    fn test_parent_dir() {
        assert_eq!(parent_dir("OEBPS/content.opf"), "OEBPS");
        assert_eq!(parent_dir("content.opf"), "");
    }

    #[test]
    fn test_directory_container() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("META-INF")).unwrap();
        std::fs::write(dir.path().join(CONTAINER_XML), CONTAINER).unwrap();

        let container = EpubContainer::open(dir.path()).unwrap();
        assert!(!container.is_archive());
        assert_eq!(container.rootfile_path().unwrap(), "OEBPS/content.opf");
        assert!(container.read("missing.xhtml").unwrap().is_none());
    }

    /// Overwrite the uncompressed size recorded for `name` in both the local
    /// and central directory headers
    fn patch_declared_size(zip: &mut [u8], name: &[u8], size: u32) {
        let le16 = |b: &[u8], at: usize| u16::from_le_bytes([b[at], b[at + 1]]) as usize;
        let mut pos = 0;
        while pos + 4 <= zip.len() {
            let (name_len_at, name_at, size_at) = match &zip[pos..pos + 4] {
                [0x50, 0x4b, 0x03, 0x04] => (26, 30, 22),
                [0x50, 0x4b, 0x01, 0x02] => (28, 46, 24),
                _ => {
                    pos += 1;
                    continue;
                }
            };
            let len = le16(zip, pos + name_len_at);
            if zip.get(pos + name_at..pos + name_at + len) == Some(name) {
                zip[pos + size_at..pos + size_at + 4].copy_from_slice(&size.to_le_bytes());
            }
            pos += 4;
        }
    }

    #[test]
    fn test_prealloc_is_capped() {
        assert_eq!(prealloc_len(512), 512);
        assert_eq!(prealloc_len(1 << 40), 1 << 20);
    }

    #[test]
    fn test_oversized_declared_entry() {
        use std::io::Write;
        use zip::write::SimpleFileOptions;

        let mut buf = Cursor::new(Vec::new());
        {
            let mut zip = zip::ZipWriter::new(&mut buf);
            let stored =
                SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored);
            zip.start_file("OEBPS/big.xhtml", stored).unwrap();
            zip.write_all(b"<p>small</p>").unwrap();
            zip.finish().unwrap();
        }
        let mut bytes = buf.into_inner();
        patch_declared_size(&mut bytes, b"OEBPS/big.xhtml", 0xFFFF_FFF0);

        let file = tempfile::Builder::new().suffix(".epub").tempfile().unwrap();
        std::fs::write(file.path(), &bytes).unwrap();

        // Either the entry reads back or the archive reports an error; the
        // declared size never drives the allocation
        if let Ok(container) = EpubContainer::open(file.path()) {
            match container.read("OEBPS/big.xhtml") {
                Ok(Some(data)) => assert_eq!(data, b"<p>small</p>"),
                Ok(None) => panic!("entry vanished"),
                Err(_) => {}
            }
        }
    }

    #[test]
    fn test_not_a_zip() {
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(file.path(), b"plain bytes").unwrap();
        let result = EpubContainer::open(file.path());
        assert!(matches!(result, Err(DocumentError::MalformedContainer(_))));
    }
}
