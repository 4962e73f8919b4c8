//! OPF package document parsing
//!
//! Streams the package document with quick-xml and collects the metadata
//! block, the manifest (in document order) and the spine.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::document::{DocumentError, Result};

/// Dublin Core and cover metadata
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PackageMetadata {
    pub title: Option<String>,
    pub creators: Vec<String>,
    pub description: Option<String>,
    pub language: Option<String>,
    pub publisher: Option<String>,
    pub identifier: Option<String>,
    /// Manifest id named by `<meta name="cover">`
    pub cover_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ManifestItem {
    pub id: String,
    /// Href as written, relative to the package document
    pub href: String,
    pub media_type: String,
    pub properties: Option<String>,
}

impl ManifestItem {
    pub fn is_html(&self) -> bool {
        matches!(
            self.media_type.as_str(),
            "application/xhtml+xml" | "text/html"
        )
    }

    pub fn has_property(&self, name: &str) -> bool {
        self.properties
            .as_deref()
            .map_or(false, |p| p.split_whitespace().any(|prop| prop == name))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SpineRef {
    pub idref: String,
    pub linear: bool,
}

/// Parsed package document
#[derive(Debug, Clone, Default)]
pub struct Package {
    pub metadata: PackageMetadata,
    pub manifest: Vec<ManifestItem>,
    pub spine: Vec<SpineRef>,
    /// Manifest id of the NCX named by `spine@toc`
    pub spine_toc: Option<String>,
}

impl Package {
    pub fn item(&self, id: &str) -> Option<&ManifestItem> {
        self.manifest.iter().find(|item| item.id == id)
    }

    /// Reading-order content documents
    ///
    /// Spine items whose media type is XHTML/HTML. When the spine is empty,
    /// the manifest's HTML items in document order.
    pub fn chapter_items(&self) -> Vec<&ManifestItem> {
        if self.spine.is_empty() {
            return self.manifest.iter().filter(|item| item.is_html()).collect();
        }
        self.spine
            .iter()
            .filter_map(|r| self.item(&r.idref))
            .filter(|item| item.is_html())
            .collect()
    }

    /// EPUB 3 navigation document
    pub fn nav_item(&self) -> Option<&ManifestItem> {
        self.manifest.iter().find(|item| item.has_property("nav"))
    }

    /// EPUB 2 NCX: `spine@toc`, else any item with the NCX media type
    pub fn ncx_item(&self) -> Option<&ManifestItem> {
        self.spine_toc
            .as_deref()
            .and_then(|id| self.item(id))
            .or_else(|| {
                self.manifest
                    .iter()
                    .find(|item| item.media_type == "application/x-dtbncx+xml")
            })
    }

    /// Cover image: `<meta name="cover">`, falling back to `cover-image`
    pub fn cover_item(&self) -> Option<&ManifestItem> {
        self.metadata
            .cover_id
            .as_deref()
            .and_then(|id| self.item(id))
            .or_else(|| {
                self.manifest
                    .iter()
                    .find(|item| item.has_property("cover-image"))
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum DcField {
    Title,
    Creator,
    Description,
    Language,
    Publisher,
    Identifier,
}

impl DcField {
    fn from_local_name(name: &[u8]) -> Option<Self> {
        match name {
            b"title" => Some(DcField::Title),
            b"creator" => Some(DcField::Creator),
            b"description" => Some(DcField::Description),
            b"language" => Some(DcField::Language),
            b"publisher" => Some(DcField::Publisher),
            b"identifier" => Some(DcField::Identifier),
            _ => None,
        }
    }
}

/// Parse an OPF package document
///
/// XML errors are reported as `MalformedContainer`.
pub fn parse_opf(xml: &str) -> Result<Package> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut package = Package::default();
    let mut in_metadata = false;
    let mut current: Option<DcField> = None;
    let mut text = String::new();

    loop {
        let event = reader.read_event().map_err(malformed)?;
        match event {
            Event::Start(e) => {
                let local = e.local_name();
                match local.as_ref() {
                    b"metadata" => in_metadata = true,
                    name if in_metadata => {
                        if let Some(field) = DcField::from_local_name(name) {
                            current = Some(field);
                            text.clear();
                        } else {
                            handle_element(&mut package, &e)?;
                        }
                    }
                    _ => handle_element(&mut package, &e)?,
                }
            }
            Event::Empty(e) => handle_element(&mut package, &e)?,
            Event::Text(t) if current.is_some() => {
                text.push_str(&t.unescape().map_err(malformed)?);
            }
            Event::CData(c) if current.is_some() => {
                text.push_str(&String::from_utf8_lossy(&c.into_inner()));
            }
            Event::End(e) => {
                let local = e.local_name();
                if local.as_ref() == b"metadata" {
                    in_metadata = false;
                } else if let Some(field) = current {
                    if DcField::from_local_name(local.as_ref()) == Some(field) {
                        store_field(&mut package.metadata, field, text.trim());
                        current = None;
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if package.manifest.is_empty() {
        return Err(DocumentError::MalformedContainer(
            "package document has no manifest items".to_string(),
        ));
    }

    Ok(package)
}

fn store_field(metadata: &mut PackageMetadata, field: DcField, value: &str) {
    if value.is_empty() {
        return;
    }
    let value = value.to_string();
    match field {
        DcField::Title => {
            metadata.title.get_or_insert(value);
        }
        DcField::Creator => metadata.creators.push(value),
        DcField::Description => {
            metadata.description.get_or_insert(value);
        }
        DcField::Language => {
            metadata.language.get_or_insert(value);
        }
        DcField::Publisher => {
            metadata.publisher.get_or_insert(value);
        }
        DcField::Identifier => {
            metadata.identifier.get_or_insert(value);
        }
    }
}

/// Manifest item, spine, itemref and cover meta elements
fn handle_element(package: &mut Package, e: &BytesStart<'_>) -> Result<()> {
    match e.local_name().as_ref() {
        b"item" => {
            let id = attribute(e, b"id")?;
            let href = attribute(e, b"href")?;
            if let (Some(id), Some(href)) = (id, href) {
                package.manifest.push(ManifestItem {
                    id,
                    href,
                    media_type: attribute(e, b"media-type")?.unwrap_or_default(),
                    properties: attribute(e, b"properties")?,
                });
            }
        }
        b"spine" => {
            package.spine_toc = attribute(e, b"toc")?;
        }
        b"itemref" => {
            if let Some(idref) = attribute(e, b"idref")? {
                let linear = attribute(e, b"linear")?.map_or(true, |v| v != "no");
                package.spine.push(SpineRef { idref, linear });
            }
        }
        b"meta" => {
            if attribute(e, b"name")?.as_deref() == Some("cover") {
                package.metadata.cover_id = attribute(e, b"content")?;
            }
        }
        _ => {}
    }
    Ok(())
}

/// Unescaped value of the attribute with the given local name
pub(crate) fn attribute(e: &BytesStart<'_>, name: &[u8]) -> Result<Option<String>> {
    for attr in e.attributes() {
        let attr = attr.map_err(|err| malformed(err.into()))?;
        if attr.key.local_name().as_ref() == name {
            let value = attr.unescape_value().map_err(malformed)?;
            return Ok(Some(value.into_owned()));
        }
    }
    Ok(None)
}

fn malformed(err: quick_xml::Error) -> DocumentError {
    DocumentError::MalformedContainer(format!("package document: {}", err))
}
