/// Short text snippets used as the content signal for classification.
///
/// Every supported format is reduced to at most [`SNIPPET_CHARS`] characters.
/// Extraction never fails past this module: unsupported formats and broken
/// files are reported as [`Extraction::Unsupported`] or
/// [`Extraction::Degraded`], both of which yield an empty snippet.
use regex::Regex;
use std::collections::HashMap;
use std::fs::File;
use std::io::{Read, Seek};
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::sync::LazyLock;
use thiserror::Error;
use tracing::{debug, warn};

/// Maximum snippet length, in characters.
pub const SNIPPET_CHARS: usize = 800;

/// Number of non-blank paragraphs read from a word-processing document.
const MAX_PARAGRAPHS: usize = 20;

/// Number of leading slides read from a presentation.
const MAX_SLIDES: usize = 2;

/// Extensions read as raw text.
const TEXT_EXTENSIONS: &[&str] = &[
    "txt", "md", "py", "js", "ts", "html", "htm", "css", "c", "h", "cpp", "hpp", "java", "rs",
    "go", "json", "csv", "tex",
];

static SHAPE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<p:sp\b[^>]*>(.*?)</p:sp>").expect("valid shape regex"));
static PARAGRAPH_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<a:p(?:\s[^>]*)?>(.*?)</a:p>|<a:p\s*/>").expect("valid paragraph regex")
});
static RUN_TEXT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<a:t(?:\s[^>]*)?>(.*?)</a:t>").expect("valid text-run regex")
});
static SLIDE_ID_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<p:sldId\b[^>]*?\br:id="([^"]+)""#).expect("valid slide id regex")
});
static RELATIONSHIP_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<Relationship\b[^>]*>").expect("valid relationship regex"));
static REL_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"\bId="([^"]*)""#).expect("valid Id regex"));
static REL_TARGET_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"\bTarget="([^"]*)""#).expect("valid Target regex"));
static SLIDE_PART_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^ppt/slides/slide(\d+)\.xml$").expect("valid slide part regex")
});

/// Why a snippet could not be produced.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("failed to read file: {0}")]
    Io(#[from] std::io::Error),
    #[error("PDF parsing failed: {0}")]
    Pdf(String),
    #[error("DOCX parsing failed: {0}")]
    Docx(String),
    #[error("package parsing failed: {0}")]
    Package(#[from] zip::result::ZipError),
    #[error("{format} parser panicked")]
    Panicked { format: &'static str },
}

/// The result of extracting a snippet.
#[derive(Debug)]
pub enum Extraction {
    /// Text was extracted (it may still be empty, e.g. a blank page).
    Text(String),
    /// The format is not one this module reads.
    Unsupported,
    /// The format is supported but the file could not be read.
    Degraded(ExtractError),
}

impl Extraction {
    /// Collapses the outcome into the snippet the classifier receives.
    pub fn into_snippet(self) -> String {
        match self {
            Extraction::Text(text) => text,
            Extraction::Unsupported | Extraction::Degraded(_) => String::new(),
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, Extraction::Degraded(_))
    }
}

/// Document families the extractor understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnippetFormat {
    PlainText,
    Pdf,
    Docx,
    Pptx,
}

impl SnippetFormat {
    /// Picks the reader for a lowercased extension.
    pub fn for_extension(ext: &str) -> Option<Self> {
        match ext {
            "pdf" => Some(Self::Pdf),
            "docx" => Some(Self::Docx),
            "pptx" => Some(Self::Pptx),
            e if TEXT_EXTENSIONS.contains(&e) => Some(Self::PlainText),
            _ => None,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Self::PlainText => "text",
            Self::Pdf => "PDF",
            Self::Docx => "DOCX",
            Self::Pptx => "PPTX",
        }
    }
}

/// Reads bounded text snippets from files.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContentExtractor;

impl ContentExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Extracts a snippet, reporting why nothing came out when that happens.
    pub fn extract(&self, path: &Path, extension: &str) -> Extraction {
        let Some(format) = SnippetFormat::for_extension(extension) else {
            return Extraction::Unsupported;
        };

        // Third-party parsers may panic on malformed input.
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| match format {
            SnippetFormat::PlainText => read_plain_text(path),
            SnippetFormat::Pdf => read_pdf_first_page(path),
            SnippetFormat::Docx => read_docx_paragraphs(path),
            SnippetFormat::Pptx => read_pptx_slides(path),
        }))
        .unwrap_or(Err(ExtractError::Panicked {
            format: format.name(),
        }));

        match outcome {
            Ok(text) => {
                let snippet = truncate_chars(&text, SNIPPET_CHARS);
                debug!(
                    file = %path.display(),
                    format = format.name(),
                    chars = snippet.chars().count(),
                    "extracted snippet"
                );
                Extraction::Text(snippet)
            }
            Err(e) => {
                warn!(file = %path.display(), error = %e, "snippet extraction degraded");
                Extraction::Degraded(e)
            }
        }
    }

    /// Extracts a snippet, degrading every failure to an empty string.
    pub fn snippet(&self, path: &Path, extension: &str) -> String {
        self.extract(path, extension).into_snippet()
    }
}

/// Returns the first `max` characters of `text`.
pub fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

fn read_plain_text(path: &Path) -> Result<String, ExtractError> {
    // A UTF-8 character is at most 4 bytes, so this always covers the budget.
    let mut bytes = Vec::with_capacity(SNIPPET_CHARS * 4);
    File::open(path)?
        .take((SNIPPET_CHARS * 4) as u64)
        .read_to_end(&mut bytes)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Drops every page but the first, then extracts text from what is left.
fn read_pdf_first_page(path: &Path) -> Result<String, ExtractError> {
    let mut doc = lopdf::Document::load(path).map_err(|e| ExtractError::Pdf(e.to_string()))?;
    let page_numbers: Vec<u32> = doc.get_pages().keys().copied().collect();
    let Some((_, later_pages)) = page_numbers.split_first() else {
        return Ok(String::new());
    };
    if !later_pages.is_empty() {
        doc.delete_pages(later_pages);
    }

    let mut first_page = Vec::new();
    doc.save_to(&mut first_page).map_err(|e| ExtractError::Pdf(e.to_string()))?;
    pdf_extract::extract_text_from_mem(&first_page).map_err(|e| ExtractError::Pdf(e.to_string()))
}

fn read_docx_paragraphs(path: &Path) -> Result<String, ExtractError> {
    use docx_rs::{DocumentChild, ParagraphChild, RunChild};

    let bytes = std::fs::read(path)?;
    let docx = docx_rs::read_docx(&bytes).map_err(|e| ExtractError::Docx(e.to_string()))?;

    let mut paragraphs: Vec<String> = Vec::new();
    for child in &docx.document.children {
        let DocumentChild::Paragraph(paragraph) = child else {
            continue;
        };

        let mut text = String::new();
        for paragraph_child in &paragraph.children {
            if let ParagraphChild::Run(run) = paragraph_child {
                for run_child in &run.children {
                    if let RunChild::Text(t) = run_child {
                        text.push_str(&t.text);
                    }
                }
            }
        }

        if !text.trim().is_empty() {
            paragraphs.push(text);
        }
        if paragraphs.len() >= MAX_PARAGRAPHS {
            break;
        }
    }

    Ok(paragraphs.join("\n"))
}

fn read_pptx_slides(path: &Path) -> Result<String, ExtractError> {
    let mut archive = zip::ZipArchive::new(File::open(path)?)?;

    let mut parts = presentation_slide_parts(&mut archive)?;
    if parts.is_empty() {
        parts = numbered_slide_parts(&archive);
    }
    parts.retain(|part| archive.index_for_name(part).is_some());

    let mut shape_texts: Vec<String> = Vec::new();
    for part in parts.iter().take(MAX_SLIDES) {
        if let Some(xml) = read_zip_entry(&mut archive, part)? {
            shape_texts.extend(slide_shape_texts(&xml));
        }
    }

    Ok(shape_texts.join(" "))
}

/// Slide parts in presentation order, following `<p:sldIdLst>` through the
/// presentation relationships. Empty when either part is missing.
fn presentation_slide_parts<R: Read + Seek>(
    archive: &mut zip::ZipArchive<R>,
) -> Result<Vec<String>, ExtractError> {
    let Some(presentation) = read_zip_entry(archive, "ppt/presentation.xml")? else {
        return Ok(Vec::new());
    };
    let Some(rels) = read_zip_entry(archive, "ppt/_rels/presentation.xml.rels")? else {
        return Ok(Vec::new());
    };

    let targets: HashMap<&str, &str> = RELATIONSHIP_RE
        .find_iter(&rels)
        .filter_map(|tag| {
            let tag = tag.as_str();
            let id = REL_ID_RE.captures(tag)?.get(1)?.as_str();
            let target = REL_TARGET_RE.captures(tag)?.get(1)?.as_str();
            Some((id, target))
        })
        .collect();

    Ok(SLIDE_ID_RE
        .captures_iter(&presentation)
        .filter_map(|slide| targets.get(slide.get(1)?.as_str()).copied())
        .map(|target| match target.strip_prefix('/') {
            Some(absolute) => absolute.to_string(),
            None => format!("ppt/{}", target.trim_start_matches("./")),
        })
        .collect())
}

/// `ppt/slides/slideN.xml` parts ordered by `N`, gaps allowed.
fn numbered_slide_parts<R: Read + Seek>(archive: &zip::ZipArchive<R>) -> Vec<String> {
    let mut numbered: Vec<(u32, String)> = archive
        .file_names()
        .filter_map(|name| {
            let number = SLIDE_PART_RE.captures(name)?.get(1)?.as_str().parse().ok()?;
            Some((number, name.to_string()))
        })
        .collect();
    numbered.sort();
    numbered.into_iter().map(|(_, name)| name).collect()
}

fn read_zip_entry<R: Read + Seek>(
    archive: &mut zip::ZipArchive<R>,
    name: &str,
) -> Result<Option<String>, ExtractError> {
    match archive.by_name(name) {
        Ok(mut entry) => {
            let mut xml = String::new();
            entry.read_to_string(&mut xml)?;
            Ok(Some(xml))
        }
        Err(zip::result::ZipError::FileNotFound) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Text of every text-bearing shape on a slide, paragraphs joined by newlines.
fn slide_shape_texts(slide_xml: &str) -> Vec<String> {
    SHAPE_RE
        .captures_iter(slide_xml)
        .filter_map(|shape| {
            let body = shape.get(1)?.as_str();
            if !body.contains("<p:txBody") {
                return None;
            }
            let paragraphs: Vec<String> = PARAGRAPH_RE
                .captures_iter(body)
                .map(|p| {
                    p.get(1)
                        .map(|inner| {
                            RUN_TEXT_RE
                                .captures_iter(inner.as_str())
                                .filter_map(|t| t.get(1))
                                .map(|t| unescape_xml(t.as_str()))
                                .collect::<String>()
                        })
                        .unwrap_or_default()
                })
                .collect();
            Some(paragraphs.join("\n"))
        })
        .collect()
}

fn unescape_xml(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn write_package(path: &Path, parts: &[(&str, &str)]) {
        let file = File::create(path).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        let options = zip::write::SimpleFileOptions::default();
        for (name, body) in parts {
            zip.start_file(*name, options).unwrap();
            zip.write_all(body.as_bytes()).unwrap();
        }
        zip.finish().unwrap();
    }

    fn write_pptx(path: &Path, slides: &[&str]) {
        let names: Vec<String> = (1..=slides.len())
            .map(|i| format!("ppt/slides/slide{i}.xml"))
            .collect();
        let parts: Vec<(&str, &str)> = names
            .iter()
            .map(String::as_str)
            .zip(slides.iter().copied())
            .collect();
        write_package(path, &parts);
    }

    fn write_docx(path: &Path, paragraphs: &[String]) {
        use docx_rs::{Docx, Paragraph, Run};

        let docx = paragraphs.iter().fold(Docx::new(), |docx, text| {
            docx.add_paragraph(Paragraph::new().add_run(Run::new().add_text(text.as_str())))
        });
        docx.build().pack(File::create(path).unwrap()).unwrap();
    }

    /// One Helvetica text line per page; an empty slice gives a zero-page PDF.
    fn write_pdf(path: &Path, pages: &[&str]) {
        use lopdf::{Document, Object, Stream, dictionary};

        let mut doc = Document::with_version("1.4");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
        });

        let mut kids: Vec<Object> = Vec::new();
        for text in pages {
            let content = Stream::new(
                dictionary! {},
                format!("BT /F1 12 Tf 72 720 Td ({text}) Tj ET").into_bytes(),
            );
            let content_id = doc.add_object(content);
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
                "Contents" => content_id,
                "Resources" => dictionary! {
                    "Font" => dictionary! { "F1" => font_id },
                },
            });
            kids.push(page_id.into());
        }

        let count = kids.len() as i64;
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => count,
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        doc.save(path).unwrap();
    }

    fn slide(shapes: &[&str]) -> String {
        let mut xml = String::from("<p:sld><p:cSld><p:spTree>");
        for text in shapes {
            xml.push_str(&format!(
                "<p:sp><p:nvSpPr/><p:spPr/><p:txBody><a:bodyPr/><a:p><a:r><a:t>{text}</a:t></a:r></a:p></p:txBody></p:sp>"
            ));
        }
        xml.push_str("<p:sp><p:spPr/></p:sp></p:spTree></p:cSld></p:sld>");
        xml
    }

    #[test]
    fn test_truncate_chars_respects_multibyte() {
        assert_eq!(truncate_chars("zażółć", 3), "zaż");
        assert_eq!(truncate_chars("abc", 10), "abc");
        assert_eq!(truncate_chars("", 5), "");
    }

    #[test]
    fn test_plain_text_truncated_to_budget() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("notes.txt");
        std::fs::write(&path, "x".repeat(5000)).unwrap();

        let snippet = ContentExtractor::new().snippet(&path, "txt");
        assert_eq!(snippet.chars().count(), SNIPPET_CHARS);
    }

    #[test]
    fn test_plain_text_invalid_utf8_is_replaced() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("script.py");
        std::fs::write(&path, b"print('hi')\xff\xfe").unwrap();

        let snippet = ContentExtractor::new().snippet(&path, "py");
        assert!(snippet.starts_with("print('hi')"));
        assert!(snippet.contains('\u{FFFD}'));
    }

    #[test]
    fn test_unknown_extension_is_unsupported() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("mystery.bin");
        std::fs::write(&path, [0u8, 1, 2, 3]).unwrap();

        let extraction = ContentExtractor::new().extract(&path, "bin");
        assert!(matches!(extraction, Extraction::Unsupported));
        assert_eq!(extraction.into_snippet(), "");
    }

    #[test]
    fn test_missing_file_degrades_to_empty() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("gone.txt");

        let extraction = ContentExtractor::new().extract(&path, "txt");
        assert!(extraction.is_degraded());
        assert_eq!(extraction.into_snippet(), "");
    }

    #[test]
    fn test_corrupt_pdf_degrades_to_empty() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("broken.pdf");
        std::fs::write(&path, b"definitely not a pdf").unwrap();

        assert_eq!(ContentExtractor::new().snippet(&path, "pdf"), "");
    }

    #[test]
    fn test_corrupt_docx_degrades_to_empty() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("broken.docx");
        std::fs::write(&path, b"PK not really").unwrap();

        let extraction = ContentExtractor::new().extract(&path, "docx");
        assert!(extraction.is_degraded());
    }

    #[test]
    fn test_pptx_reads_only_first_two_slides() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("deck.pptx");
        let slides = [
            slide(&["Quarterly", "Review"]),
            slide(&["Revenue &amp; costs"]),
            slide(&["Appendix"]),
        ];
        let refs: Vec<&str> = slides.iter().map(String::as_str).collect();
        write_pptx(&path, &refs);

        let snippet = ContentExtractor::new().snippet(&path, "pptx");
        assert_eq!(snippet, "Quarterly Review Revenue & costs");
    }

    #[test]
    fn test_pptx_with_single_slide() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("short.pptx");
        let only = slide(&["Hello"]);
        write_pptx(&path, &[only.as_str()]);

        assert_eq!(ContentExtractor::new().snippet(&path, "pptx"), "Hello");
    }

    #[test]
    fn test_pptx_follows_presentation_order() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("reordered.pptx");
        let presentation = r#"<p:presentation><p:sldIdLst><p:sldId id="256" r:id="rId7"/><p:sldId id="257" r:id="rId8"/></p:sldIdLst></p:presentation>"#;
        let rels = r#"<Relationships><Relationship Id="rId1" Type="slideMaster" Target="slideMasters/slideMaster1.xml"/><Relationship Id="rId7" Type="slide" Target="slides/slide3.xml"/><Relationship Target="/ppt/slides/slide1.xml" Type="slide" Id="rId8"/></Relationships>"#;
        let first = slide(&["Opening"]);
        let second = slide(&["Agenda"]);
        let unused = slide(&["Removed draft"]);
        write_package(
            &path,
            &[
                ("ppt/presentation.xml", presentation),
                ("ppt/_rels/presentation.xml.rels", rels),
                ("ppt/slides/slide1.xml", second.as_str()),
                ("ppt/slides/slide2.xml", unused.as_str()),
                ("ppt/slides/slide3.xml", first.as_str()),
            ],
        );

        assert_eq!(ContentExtractor::new().snippet(&path, "pptx"), "Opening Agenda");
    }

    #[test]
    fn test_pptx_without_presentation_part_tolerates_numbering_gaps() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("gaps.pptx");
        let a = slide(&["Quarterly results"]);
        let b = slide(&["Outlook"]);
        let c = slide(&["Backup"]);
        write_package(
            &path,
            &[
                ("ppt/slides/slide12.xml", c.as_str()),
                ("ppt/slides/slide2.xml", a.as_str()),
                ("ppt/slides/slide5.xml", b.as_str()),
            ],
        );

        assert_eq!(
            ContentExtractor::new().snippet(&path, "pptx"),
            "Quarterly results Outlook"
        );
    }

    #[test]
    fn test_pptx_snippet_truncated_to_budget() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("wordy.pptx");
        let long = "w".repeat(1000);
        let only = slide(&[long.as_str()]);
        write_pptx(&path, &[only.as_str()]);

        let snippet = ContentExtractor::new().snippet(&path, "pptx");
        assert_eq!(snippet.chars().count(), SNIPPET_CHARS);
    }

    #[test]
    fn test_docx_stops_after_twenty_paragraphs() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("long.docx");
        let mut paragraphs = Vec::new();
        for i in 1..=25 {
            paragraphs.push(format!("para {i:02}"));
            paragraphs.push(String::new());
        }
        write_docx(&path, &paragraphs);

        let snippet = ContentExtractor::new().snippet(&path, "docx");
        assert!(snippet.starts_with("para 01\npara 02"));
        assert!(snippet.contains("para 20"));
        assert!(!snippet.contains("para 21"));
        assert_eq!(snippet.lines().count(), 20);
    }

    #[test]
    fn test_docx_snippet_truncated_to_budget() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("dense.docx");
        let paragraphs: Vec<String> = (0..20).map(|_| "d".repeat(60)).collect();
        write_docx(&path, &paragraphs);

        let snippet = ContentExtractor::new().snippet(&path, "docx");
        assert_eq!(snippet.chars().count(), SNIPPET_CHARS);
    }

    #[test]
    fn test_pdf_reads_only_first_page() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("two_pages.pdf");
        write_pdf(&path, &["Alpha invoice", "Omega appendix"]);

        let snippet = ContentExtractor::new().snippet(&path, "pdf");
        assert!(snippet.contains("Alpha"), "got: {snippet:?}");
        assert!(!snippet.contains("Omega"), "got: {snippet:?}");
    }

    #[test]
    fn test_pdf_without_pages_is_empty() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("empty.pdf");
        write_pdf(&path, &[]);

        let extraction = ContentExtractor::new().extract(&path, "pdf");
        assert!(matches!(&extraction, Extraction::Text(t) if t.is_empty()));
    }

    #[test]
    fn test_slide_shape_texts_ignores_shapes_without_text() {
        let xml = "<p:sp><p:spPr/></p:sp><p:sp><p:txBody><a:p><a:pPr/><a:r><a:t>A</a:t></a:r><a:r><a:t>B</a:t></a:r></a:p><a:p/><a:p><a:r><a:t>C</a:t></a:r></a:p></p:txBody></p:sp>";
        assert_eq!(slide_shape_texts(xml), vec!["AB\n\nC".to_string()]);
    }
}
