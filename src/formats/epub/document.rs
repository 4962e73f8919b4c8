//! EPUB engine
//!
//! The container, package document and table of contents are parsed at
//! open time. Chapter content is read from the container on every access
//! and never cached.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use image::DynamicImage;
use tokio_util::sync::CancellationToken;

use super::container::{parent_dir, resolve_href, EpubContainer};
use super::markup::{decode_text, extract_plain_text, extract_resources};
use super::navigation::{parse_nav, parse_ncx, NavPoint};
use super::package::{parse_opf, ManifestItem, Package};
use crate::config::DEFAULT_SNIPPET_RADIUS;
use crate::document::{
    find_ignore_case, snippet_around, BookFormat, Chapter, ChapterResource, DocumentEngine,
    DocumentError, DocumentInfo, OutlineItem, Result, SearchResult, SearchStream,
};

/// Title used when the package has no `dc:title`
const UNKNOWN_TITLE: &str = "Unknown";

/// Options for opening an EPUB
#[derive(Debug, Clone)]
pub struct EpubOpenOptions {
    /// Characters of context either side of a search hit
    pub snippet_radius: usize,
}

impl Default for EpubOpenOptions {
    fn default() -> Self {
        Self {
            snippet_radius: DEFAULT_SNIPPET_RADIUS,
        }
    }
}

/// Open EPUB document
pub struct EpubEngine {
    inner: Arc<EpubBook>,
}

/// Content document in reading order
#[derive(Debug, Clone)]
struct ChapterEntry {
    /// Container path
    path: String,
    title: String,
}

struct EpubBook {
    container: EpubContainer,
    package: Package,
    /// Directory of the package document, base for manifest hrefs
    package_dir: String,
    chapters: Vec<ChapterEntry>,
    toc: Vec<OutlineItem>,
    info: DocumentInfo,
    snippet_radius: usize,
    /// Content documents read so far
    chapter_loads: AtomicUsize,
}

impl EpubEngine {
    /// Open a packed `.epub` or an extracted EPUB directory
    pub async fn open(
        path: impl AsRef<Path>,
        options: EpubOpenOptions,
        cancel: CancellationToken,
    ) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let book = tokio::task::spawn_blocking(move || load(path, options, &cancel)).await??;

        tracing::info!(
            path = %book.info.path,
            title = %book.info.title,
            chapters = book.chapters.len(),
            "Opened EPUB document"
        );

        Ok(Self {
            inner: Arc::new(book),
        })
    }

    /// Number of content documents read from the container since open
    pub fn chapter_loads(&self) -> usize {
        self.inner.chapter_loads.load(Ordering::Relaxed)
    }
}

fn load(path: PathBuf, options: EpubOpenOptions, cancel: &CancellationToken) -> Result<EpubBook> {
    let container = EpubContainer::open(&path)?;

    let package_path = container.rootfile_path()?;
    let package_bytes = container.read(&package_path)?.ok_or_else(|| {
        DocumentError::MalformedContainer(format!("missing package document {}", package_path))
    })?;
    let package = parse_opf(&decode_text(&package_bytes))?;
    let package_dir = parent_dir(&package_path).to_string();

    if cancel.is_cancelled() {
        return Err(DocumentError::Cancelled);
    }

    let chapter_paths: Vec<String> = package
        .chapter_items()
        .iter()
        .map(|item| resolve_href(&package_dir, &item.href))
        .collect();

    let nav_tree = read_toc(&container, &package, &package_dir);

    let chapters: Vec<ChapterEntry> = chapter_paths
        .iter()
        .enumerate()
        .map(|(idx, path)| ChapterEntry {
            path: path.clone(),
            title: first_label_for(&nav_tree, path).unwrap_or_else(|| format!("Chapter {}", idx + 1)),
        })
        .collect();

    let toc = if nav_tree.is_empty() {
        chapters
            .iter()
            .enumerate()
            .map(|(idx, chapter)| OutlineItem::new(chapter.title.clone(), idx))
            .collect()
    } else {
        to_outline(&nav_tree, &chapter_paths, 0)
    };

    let metadata = &package.metadata;
    let mut info = DocumentInfo::new(
        path.display().to_string(),
        BookFormat::Epub,
        metadata.title.clone().unwrap_or_else(|| UNKNOWN_TITLE.to_string()),
    );
    info.file_size = if container.is_archive() {
        std::fs::metadata(&path).map(|m| m.len()).unwrap_or(0)
    } else {
        0
    };
    info.chapter_count = chapters.len();
    info.author = metadata.creators.first().cloned();
    info.language = metadata.language.clone();
    info.publisher = metadata.publisher.clone();
    info.identifier = metadata.identifier.clone();
    info.description = metadata.description.clone();

    Ok(EpubBook {
        container,
        package,
        package_dir,
        chapters,
        toc,
        info,
        snippet_radius: options.snippet_radius,
        chapter_loads: AtomicUsize::new(0),
    })
}

/// Navigation tree with hrefs resolved to container paths
///
/// NAV first, then NCX. Unreadable or unparseable documents yield an empty
/// tree and the caller falls back to the spine.
fn read_toc(container: &EpubContainer, package: &Package, package_dir: &str) -> Vec<NavPoint> {
    let sources: [(Option<&ManifestItem>, fn(&str) -> Result<Vec<NavPoint>>); 2] =
        [(package.nav_item(), parse_nav), (package.ncx_item(), parse_ncx)];

    for (item, parse) in sources {
        let Some(item) = item else { continue };
        let doc_path = resolve_href(package_dir, &item.href);

        let parsed = container
            .read(&doc_path)
            .and_then(|bytes| match bytes {
                Some(bytes) => parse(&decode_text(&bytes)),
                None => Ok(Vec::new()),
            });

        match parsed {
            Ok(points) if !points.is_empty() => {
                return resolve_points(points, parent_dir(&doc_path));
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(path = %doc_path, error = %e, "Failed to parse table of contents");
            }
        }
    }

    Vec::new()
}

fn resolve_points(points: Vec<NavPoint>, base_dir: &str) -> Vec<NavPoint> {
    points
        .into_iter()
        .map(|point| NavPoint {
            href: if point.href.is_empty() {
                String::new()
            } else {
                resolve_href(base_dir, &point.href)
            },
            children: resolve_points(point.children, base_dir),
            label: point.label,
        })
        .collect()
}

/// Label of the first TOC entry (depth-first) targeting `path`
fn first_label_for(points: &[NavPoint], path: &str) -> Option<String> {
    points.iter().find_map(|point| {
        if point.href == path && !point.label.is_empty() {
            Some(point.label.clone())
        } else {
            first_label_for(&point.children, path)
        }
    })
}

fn to_outline(points: &[NavPoint], chapter_paths: &[String], level: u32) -> Vec<OutlineItem> {
    points
        .iter()
        .map(|point| OutlineItem {
            title: if point.label.is_empty() {
                point.href.clone()
            } else {
                point.label.clone()
            },
            chapter_index: chapter_paths.iter().position(|p| *p == point.href),
            level,
            children: to_outline(&point.children, chapter_paths, level + 1),
        })
        .collect()
}

impl EpubBook {
    /// Read and decode a chapter's content document
    fn load_chapter_html(&self, index: usize) -> Result<String> {
        let entry = &self.chapters[index];
        self.chapter_loads.fetch_add(1, Ordering::Relaxed);

        let bytes = self.container.read(&entry.path)?.ok_or_else(|| {
            DocumentError::MalformedContainer(format!("missing content document {}", entry.path))
        })?;
        Ok(decode_text(&bytes).into_owned())
    }

    fn resources_for(&self, chapter_path: &str, html: &str) -> Vec<ChapterResource> {
        let base = parent_dir(chapter_path);
        extract_resources(html)
            .into_iter()
            .map(|href| {
                let path = resolve_href(base, &href);
                let mime_type = self
                    .package
                    .manifest
                    .iter()
                    .find(|item| resolve_href(&self.package_dir, &item.href) == path)
                    .map(|item| item.media_type.clone())
                    .unwrap_or_else(|| {
                        mime_guess::from_path(&path)
                            .first_or_octet_stream()
                            .essence_str()
                            .to_string()
                    });
                ChapterResource {
                    href: path,
                    mime_type,
                    data: None,
                }
            })
            .collect()
    }

    /// First match in a chapter, if any
    fn search_chapter(&self, index: usize, query: &str) -> Result<Option<SearchResult>> {
        let html = self.load_chapter_html(index)?;
        let text = extract_plain_text(&html);

        Ok(find_ignore_case(&text, query).map(|(start, end)| SearchResult {
            chapter_index: index,
            chapter_title: self.chapters[index].title.clone(),
            snippet: snippet_around(&text, start, end, self.snippet_radius),
            position: text[..start].chars().count(),
        }))
    }
}

#[async_trait]
impl DocumentEngine for EpubEngine {
    fn format(&self) -> BookFormat {
        BookFormat::Epub
    }

    fn chapter_count(&self) -> usize {
        self.inner.chapters.len()
    }

    async fn chapter(&self, index: usize) -> Result<Chapter> {
        self.check_index(index)?;
        let book = self.inner.clone();

        tokio::task::spawn_blocking(move || {
            let html = book.load_chapter_html(index)?;
            let entry = &book.chapters[index];
            Ok(Chapter {
                index,
                title: entry.title.clone(),
                plain_text: extract_plain_text(&html),
                resources: book.resources_for(&entry.path, &html),
                content: html,
            })
        })
        .await?
    }

    async fn outline(&self) -> Result<Vec<OutlineItem>> {
        Ok(self.inner.toc.clone())
    }

    fn search(&self, query: &str, cancel: CancellationToken) -> SearchStream {
        if query.is_empty() {
            return stream::empty().boxed();
        }

        let book = self.inner.clone();
        let query = query.to_string();
        let count = book.chapters.len();

        stream::unfold(Some(0usize), move |next| {
            let book = book.clone();
            let query = query.clone();
            let cancel = cancel.clone();
            async move {
                let mut index = next?;
                while index < count {
                    if cancel.is_cancelled() {
                        return Some((Err(DocumentError::Cancelled), None));
                    }

                    let scan_book = book.clone();
                    let scan_query = query.clone();
                    let found = tokio::task::spawn_blocking(move || {
                        scan_book.search_chapter(index, &scan_query)
                    })
                    .await;

                    index += 1;
                    match found {
                        Ok(Ok(Some(hit))) => return Some((Ok(hit), Some(index))),
                        Ok(Ok(None)) => {}
                        Ok(Err(e)) => return Some((Err(e), Some(index))),
                        Err(e) => return Some((Err(e.into()), None)),
                    }
                }
                None
            }
        })
        .boxed()
    }

    async fn cover(&self) -> Result<Option<DynamicImage>> {
        let book = self.inner.clone();

        tokio::task::spawn_blocking(move || {
            let Some(item) = book.package.cover_item() else {
                return Ok(None);
            };
            let path = resolve_href(&book.package_dir, &item.href);
            let Some(bytes) = book.container.read(&path)? else {
                return Ok(None);
            };
            match image::load_from_memory(&bytes) {
                Ok(img) => Ok(Some(img)),
                Err(e) => {
                    tracing::debug!(path = %path, error = %e, "Cover image could not be decoded");
                    Ok(None)
                }
            }
        })
        .await?
    }

    fn info(&self) -> DocumentInfo {
        self.inner.info.clone()
    }

    async fn resource(&self, href: &str) -> Result<Option<Vec<u8>>> {
        let book = self.inner.clone();
        let path = resolve_href(&book.package_dir, href);

        tokio::task::spawn_blocking(move || book.container.read(&path)).await?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    const CONTAINER: &str = r#"<?xml version="1.0"?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
  <rootfiles><rootfile full-path="OEBPS/content.opf" media-type="application/oebps-package+xml"/></rootfiles>
</container>"#;

    fn build_epub(files: &[(&str, &str)]) -> tempfile::NamedTempFile {
        let files: Vec<(&str, &[u8])> = files.iter().map(|(n, c)| (*n, c.as_bytes())).collect();
        build_epub_bytes(&files)
    }

    fn build_epub_bytes(files: &[(&str, &[u8])]) -> tempfile::NamedTempFile {
        let file = tempfile::Builder::new().suffix(".epub").tempfile().unwrap();
        let mut zip = zip::ZipWriter::new(std::fs::File::create(file.path()).unwrap());
        let stored = SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored);

        zip.start_file("mimetype", stored).unwrap();
        zip.write_all(b"application/epub+zip").unwrap();
        zip.start_file("META-INF/container.xml", SimpleFileOptions::default()).unwrap();
        zip.write_all(CONTAINER.as_bytes()).unwrap();
        for (name, content) in files {
            zip.start_file(*name, SimpleFileOptions::default()).unwrap();
            zip.write_all(content).unwrap();
        }
        zip.finish().unwrap();
        file
    }

    fn chapter_html(title: &str, body: &str) -> String {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?><html xmlns="http://www.w3.org/1999/xhtml"><head><title>{title}</title><link rel="stylesheet" href="../style.css"/></head><body><h1>{title}</h1><p>{body}</p></body></html>"#
        )
    }

    const OPF: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<package xmlns="http://www.idpf.org/2007/opf" version="2.0">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/">
    <dc:title>Test Book</dc:title><dc:creator>Author X</dc:creator>
  </metadata>
  <manifest>
    <item id="ncx" href="toc.ncx" media-type="application/x-dtbncx+xml"/>
    <item id="c1" href="text/c1.xhtml" media-type="application/xhtml+xml"/>
    <item id="c2" href="text/c2.xhtml" media-type="application/xhtml+xml"/>
    <item id="c3" href="text/c3.xhtml" media-type="application/xhtml+xml"/>
    <item id="css" href="style.css" media-type="text/css"/>
  </manifest>
  <spine toc="ncx"><itemref idref="c1"/><itemref idref="css"/><itemref idref="c2"/><itemref idref="c3"/></spine>
</package>"#;

    const NCX: &str = r#"<ncx><navMap>
  <navPoint id="n1"><navLabel><text>Opening</text></navLabel><content src="text/c1.xhtml"/></navPoint>
  <navPoint id="n2"><navLabel><text>Middle</text></navLabel><content src="text/c2.xhtml#top"/></navPoint>
</navMap></ncx>"#;

    async fn open_sample() -> (EpubEngine, tempfile::NamedTempFile) {
        let c1 = chapter_html("One", "The whale surfaced near the ship.");
        let c2 = chapter_html("Two", "Nothing to see here.");
        let c3 = chapter_html("Three", "Another whale, far away.");
        let file = build_epub(&[
            ("OEBPS/content.opf", OPF),
            ("OEBPS/toc.ncx", NCX),
            ("OEBPS/text/c1.xhtml", &c1),
            ("OEBPS/text/c2.xhtml", &c2),
            ("OEBPS/text/c3.xhtml", &c3),
            ("OEBPS/style.css", "p { margin: 0 }"),
        ]);
        let engine = EpubEngine::open(file.path(), EpubOpenOptions::default(), CancellationToken::new())
            .await
            .unwrap();
        (engine, file)
    }

    #[tokio::test]
    async fn test_open_metadata_and_chapters() {
        let (engine, _file) = open_sample().await;
        let info = engine.info();
        assert_eq!(info.title, "Test Book");
        assert_eq!(info.author.as_deref(), Some("Author X"));
        assert_eq!(engine.chapter_count(), 3);
        assert_eq!(engine.chapter_loads(), 0);
    }

    #[tokio::test]
    async fn test_chapter_titles_from_toc() {
        let (engine, _file) = open_sample().await;
        assert_eq!(engine.chapter(0).await.unwrap().title, "Opening");
        assert_eq!(engine.chapter(1).await.unwrap().title, "Middle");
        assert_eq!(engine.chapter(2).await.unwrap().title, "Chapter 3");
    }

    #[tokio::test]
    async fn test_chapter_content_and_resources() {
        let (engine, _file) = open_sample().await;
        let chapter = engine.chapter(0).await.unwrap();
        assert!(chapter.content.contains("<h1>One</h1>"));
        assert_eq!(chapter.plain_text, "One The whale surfaced near the ship.");
        assert_eq!(chapter.resources.len(), 1);
        assert_eq!(chapter.resources[0].href, "OEBPS/style.css");
        assert_eq!(chapter.resources[0].mime_type, "text/css");
        assert!(chapter.resources[0].data.is_none());

        assert!(matches!(
            engine.chapter(3).await,
            Err(DocumentError::InvalidChapterIndex { index: 3, count: 3 })
        ));
    }

    #[tokio::test]
    async fn test_outline_from_ncx() {
        let (engine, _file) = open_sample().await;
        let outline = engine.outline().await.unwrap();
        assert_eq!(outline.len(), 2);
        assert_eq!(outline[1].title, "Middle");
        assert_eq!(outline[1].chapter_index, Some(1));
        assert_eq!(outline[1].level, 0);
    }

    #[tokio::test]
    async fn test_resource_lookup() {
        let (engine, _file) = open_sample().await;
        let css = engine.resource("style.css").await.unwrap();
        assert_eq!(css.as_deref(), Some(&b"p { margin: 0 }"[..]));
        assert!(engine.resource("missing.png").await.unwrap().is_none());
        assert!(engine.cover().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_search_is_lazy() {
        let (engine, _file) = open_sample().await;
        let mut hits = engine.search("WHALE", CancellationToken::new());

        let first = hits.next().await.unwrap().unwrap();
        assert_eq!(first.chapter_index, 0);
        assert_eq!(first.chapter_title, "Opening");
        assert!(first.snippet.starts_with("..."));
        assert!(first.snippet.contains("whale"));
        assert_eq!(first.position, 8);
        assert_eq!(engine.chapter_loads(), 1);

        let second = hits.next().await.unwrap().unwrap();
        assert_eq!(second.chapter_index, 2);
        assert_eq!(engine.chapter_loads(), 3);
        assert!(hits.next().await.is_none());
    }

    #[tokio::test]
    async fn test_search_cancelled_between_chapters() {
        let (engine, _file) = open_sample().await;
        let token = CancellationToken::new();
        let mut hits = engine.search("whale", token.clone());

        assert!(hits.next().await.unwrap().is_ok());
        token.cancel();
        assert!(matches!(hits.next().await, Some(Err(DocumentError::Cancelled))));
        assert!(hits.next().await.is_none());
    }

    #[tokio::test]
    async fn test_missing_container_xml() {
        let file = tempfile::Builder::new().suffix(".epub").tempfile().unwrap();
        let mut zip = zip::ZipWriter::new(std::fs::File::create(file.path()).unwrap());
        zip.start_file("mimetype", SimpleFileOptions::default()).unwrap();
        zip.write_all(b"application/epub+zip").unwrap();
        zip.finish().unwrap();

        let result = EpubEngine::open(file.path(), EpubOpenOptions::default(), CancellationToken::new()).await;
        assert!(matches!(result, Err(DocumentError::MalformedContainer(_))));
    }

    /// 3x2 PNG
    fn cover_png() -> Vec<u8> {
        let mut bytes = Vec::new();
        DynamicImage::ImageRgba8(image::RgbaImage::new(3, 2))
            .write_to(&mut std::io::Cursor::new(&mut bytes), image::ImageFormat::Png)
            .unwrap();
        bytes
    }

    async fn open_with_cover(opf: &str) -> (EpubEngine, tempfile::NamedTempFile) {
        let chapter = chapter_html("One", "Cover test.");
        let png = cover_png();
        let file = build_epub_bytes(&[
            ("OEBPS/content.opf", opf.as_bytes()),
            ("OEBPS/text/c1.xhtml", chapter.as_bytes()),
            ("OEBPS/images/cover.png", &png),
        ]);
        let engine = EpubEngine::open(file.path(), EpubOpenOptions::default(), CancellationToken::new())
            .await
            .unwrap();
        (engine, file)
    }

    #[tokio::test]
    async fn test_cover_from_meta_element() {
        let opf = r#"<?xml version="1.0" encoding="UTF-8"?>
<package xmlns="http://www.idpf.org/2007/opf" version="2.0">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/">
    <dc:title>Covered</dc:title><meta name="cover" content="cover-img"/>
  </metadata>
  <manifest>
    <item id="c1" href="text/c1.xhtml" media-type="application/xhtml+xml"/>
    <item id="cover-img" href="images/cover.png" media-type="image/png"/>
  </manifest>
  <spine><itemref idref="c1"/></spine>
</package>"#;
        let (engine, _file) = open_with_cover(opf).await;
        let cover = engine.cover().await.unwrap();
        assert_eq!(cover.map(|img| (img.width(), img.height())), Some((3, 2)));
    }

    #[tokio::test]
    async fn test_cover_from_cover_image_property() {
        let opf = r#"<?xml version="1.0" encoding="UTF-8"?>
<package xmlns="http://www.idpf.org/2007/opf" version="3.0">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/"><dc:title>Covered</dc:title></metadata>
  <manifest>
    <item id="c1" href="text/c1.xhtml" media-type="application/xhtml+xml"/>
    <item id="art" href="images/cover.png" media-type="image/png" properties="cover-image"/>
  </manifest>
  <spine><itemref idref="c1"/></spine>
</package>"#;
        let (engine, _file) = open_with_cover(opf).await;
        let cover = engine.cover().await.unwrap();
        assert_eq!(cover.map(|img| (img.width(), img.height())), Some((3, 2)));
    }
}
