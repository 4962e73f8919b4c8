//! Synthetic book fixtures shared by the integration tests

#![allow(dead_code)]

use std::io::Write;

use tempfile::NamedTempFile;
use zip::write::SimpleFileOptions;

const CONTAINER: &str = r#"<?xml version="1.0"?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
  <rootfiles><rootfile full-path="OEBPS/content.opf" media-type="application/oebps-package+xml"/></rootfiles>
</container>"#;

pub fn write_file(suffix: &str, content: &[u8]) -> NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
    file.write_all(content).unwrap();
    file.flush().unwrap();
    file
}

pub fn path_of(file: &NamedTempFile) -> String {
    file.path().display().to_string()
}

/// Zip an EPUB whose package document lives at `OEBPS/content.opf`
pub fn build_epub(files: &[(&str, String)]) -> NamedTempFile {
    let file = tempfile::Builder::new().suffix(".epub").tempfile().unwrap();
    let mut zip = zip::ZipWriter::new(std::fs::File::create(file.path()).unwrap());
    let stored = SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored);

    zip.start_file("mimetype", stored).unwrap();
    zip.write_all(b"application/epub+zip").unwrap();
    zip.start_file("META-INF/container.xml", SimpleFileOptions::default())
        .unwrap();
    zip.write_all(CONTAINER.as_bytes()).unwrap();
    for (name, content) in files {
        zip.start_file(*name, SimpleFileOptions::default()).unwrap();
        zip.write_all(content.as_bytes()).unwrap();
    }
    zip.finish().unwrap();
    file
}

pub fn chapter_html(title: &str, body: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<html xmlns="http://www.w3.org/1999/xhtml"><head><title>{title}</title></head>
<body><h1>{title}</h1><p>{body}</p></body></html>"#
    )
}

/// EPUB with `chapters` spine documents plus a stylesheet listed in the spine
pub fn sample_epub(chapters: &[(&str, &str)]) -> NamedTempFile {
    let mut manifest = String::new();
    let mut spine = String::new();
    let mut files = Vec::new();

    for (i, (title, body)) in chapters.iter().enumerate() {
        manifest.push_str(&format!(
            r#"<item id="c{i}" href="text/c{i}.xhtml" media-type="application/xhtml+xml"/>"#
        ));
        spine.push_str(&format!(r#"<itemref idref="c{i}"/>"#));
        if i == 0 {
            spine.push_str(r#"<itemref idref="css"/>"#);
        }
        files.push((format!("OEBPS/text/c{i}.xhtml"), chapter_html(title, body)));
    }

    let opf = format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<package xmlns="http://www.idpf.org/2007/opf" version="2.0">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/">
    <dc:title>Test Book</dc:title><dc:creator>Author X</dc:creator><dc:language>en</dc:language>
  </metadata>
  <manifest>{manifest}<item id="css" href="style.css" media-type="text/css"/></manifest>
  <spine>{spine}</spine>
</package>"#
    );

    let mut entries: Vec<(&str, String)> = vec![
        ("OEBPS/content.opf", opf),
        ("OEBPS/style.css", "p { margin: 0 }".to_string()),
    ];
    for (name, content) in &files {
        entries.push((name.as_str(), content.clone()));
    }
    build_epub(&entries)
}

/// Unzipped EPUB laid out on disk with a single chapter
pub fn extracted_epub(title: &str, body: &str) -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    std::fs::create_dir_all(root.join("META-INF")).unwrap();
    std::fs::create_dir_all(root.join("OEBPS/text")).unwrap();
    std::fs::write(root.join("mimetype"), "application/epub+zip").unwrap();
    std::fs::write(root.join("META-INF/container.xml"), CONTAINER).unwrap();
    std::fs::write(
        root.join("OEBPS/content.opf"),
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<package xmlns="http://www.idpf.org/2007/opf" version="2.0">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/"><dc:title>{title}</dc:title></metadata>
  <manifest><item id="c0" href="text/c0.xhtml" media-type="application/xhtml+xml"/></manifest>
  <spine><itemref idref="c0"/></spine>
</package>"#
        ),
    )
    .unwrap();
    std::fs::write(root.join("OEBPS/text/c0.xhtml"), chapter_html(title, body)).unwrap();
    dir
}

/// Minimal PDF with one line of Helvetica text per page
pub fn sample_pdf(pages: &[&str]) -> NamedTempFile {
    let n = pages.len();
    let mut objects = vec![
        "<< /Type /Catalog /Pages 2 0 R >>".to_string(),
        format!(
            "<< /Type /Pages /Kids [{}] /Count {n} >>",
            (0..n)
                .map(|i| format!("{} 0 R", 4 + 2 * i))
                .collect::<Vec<_>>()
                .join(" ")
        ),
        "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica >>".to_string(),
    ];
    for (i, text) in pages.iter().enumerate() {
        objects.push(format!(
            "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] \
             /Resources << /Font << /F1 3 0 R >> >> /Contents {} 0 R >>",
            5 + 2 * i
        ));
        let stream = format!("BT /F1 12 Tf 72 720 Td ({text}) Tj ET");
        objects.push(format!(
            "<< /Length {} >>\nstream\n{stream}\nendstream",
            stream.len()
        ));
    }

    let mut out = b"%PDF-1.4\n".to_vec();
    let mut offsets = Vec::new();
    for (i, body) in objects.iter().enumerate() {
        offsets.push(out.len());
        out.extend_from_slice(format!("{} 0 obj\n{body}\nendobj\n", i + 1).as_bytes());
    }
    let xref_at = out.len();
    out.extend_from_slice(format!("xref\n0 {}\n0000000000 65535 f \n", objects.len() + 1).as_bytes());
    for offset in offsets {
        out.extend_from_slice(format!("{offset:010} 00000 n \n").as_bytes());
    }
    out.extend_from_slice(
        format!(
            "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{xref_at}\n%%EOF\n",
            objects.len() + 1
        )
        .as_bytes(),
    );

    write_file(".pdf", &out)
}
