use std::{fs, io::Read, path::Path};

use anyhow::{Context, Result, anyhow};
use pdf_extract::extract_text_by_pages;
use quick_xml::{
    Reader as XmlReader,
    events::{BytesStart, Event},
};
use zip::ZipArchive;

/// File extensions the extractor understands.
pub const SUPPORTED_EXTENSIONS: &[&str] = &["pdf", "docx", "txt"];

const FORM_FEED: char = '\u{c}';

/// Extract the raw text of a document, one entry per page, in reading order.
pub fn extract_pages(path: &Path) -> Result<Vec<String>> {
    match extension_of(path).as_str() {
        "pdf" => extract_text_by_pages(path)
            .with_context(|| format!("failed to extract PDF text from {}", path.display())),
        "docx" => extract_docx_pages(path),
        "txt" => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("failed to read text file {}", path.display()))?;
            Ok(text.split(FORM_FEED).map(str::to_string).collect())
        }
        other => Err(anyhow!("Unsupported file type: {}", other)),
    }
}

fn extension_of(path: &Path) -> String {
    path.extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or("")
        .to_lowercase()
}

/// Collects `word/document.xml` text, starting a new page at every explicit page break.
#[derive(Default)]
struct DocxPages {
    pages: Vec<String>,
    current: String,
}

impl DocxPages {
    fn paragraph(&mut self) {
        if !self.current.is_empty() && !self.current.ends_with("\n\n") {
            self.current.push_str("\n\n");
        }
    }

    fn line_break(&mut self, element: &BytesStart<'_>) {
        if is_page_break(element) {
            self.page_break();
        } else {
            self.current.push('\n');
        }
    }

    fn page_break(&mut self) {
        let page = std::mem::take(&mut self.current);
        self.pages.push(page.trim().to_string());
    }

    fn finish(mut self) -> Vec<String> {
        if !self.current.trim().is_empty() || self.pages.is_empty() {
            self.page_break();
        }
        self.pages
    }
}

fn is_page_break(element: &BytesStart<'_>) -> bool {
    matches!(
        element.try_get_attribute("w:type"),
        Ok(Some(attr)) if attr.value.as_ref() == b"page"
    )
}

fn extract_docx_pages(path: &Path) -> Result<Vec<String>> {
    let file = fs::File::open(path)
        .with_context(|| format!("failed to open DOCX file {}", path.display()))?;
    let mut archive = ZipArchive::new(file)
        .with_context(|| format!("failed to open DOCX archive {}", path.display()))?;

    let mut document = archive
        .by_name("word/document.xml")
        .with_context(|| format!("missing word/document.xml in {}", path.display()))?;

    let mut xml = String::new();
    document
        .read_to_string(&mut xml)
        .with_context(|| format!("failed to read DOCX XML for {}", path.display()))?;

    let mut reader = XmlReader::from_str(&xml);
    let mut pages = DocxPages::default();
    let mut in_text_node = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => match e.name().as_ref() {
                b"w:p" => pages.paragraph(),
                b"w:tab" => pages.current.push('\t'),
                b"w:br" => pages.line_break(e),
                b"w:t" => in_text_node = true,
                _ => {}
            },
            Ok(Event::Empty(ref e)) => match e.name().as_ref() {
                b"w:p" => pages.paragraph(),
                b"w:tab" => pages.current.push('\t'),
                b"w:br" => pages.line_break(e),
                _ => {}
            },
            Ok(Event::Text(e)) => {
                if in_text_node {
                    let value = e.unescape().map_err(|err| anyhow!(err))?;
                    pages.current.push_str(&value);
                }
            }
            Ok(Event::End(ref e)) => {
                if e.name().as_ref() == b"w:t" {
                    in_text_node = false;
                }
            }
            Ok(Event::Eof) => break,
            Err(err) => return Err(anyhow!("failed to parse DOCX XML: {}", err)),
            _ => {}
        }
    }

    Ok(pages.finish())
}
