use crate::error::IngestError;
use crate::models::DocumentFormat;
use lopdf::Document;
use regex::Regex;

#[derive(Debug, Clone, PartialEq)]
pub struct PageText {
    pub number: u32,
    pub text: String,
}

pub trait DocumentExtractor {
    fn extract_pages(&self, name: &str, bytes: &[u8]) -> Result<Vec<PageText>, IngestError>;
}

#[derive(Default)]
pub struct LopdfExtractor;

impl DocumentExtractor for LopdfExtractor {
    fn extract_pages(&self, name: &str, bytes: &[u8]) -> Result<Vec<PageText>, IngestError> {
        let document =
            Document::load_mem(bytes).map_err(|error| IngestError::PdfParse(error.to_string()))?;

        let tidier = PageTidier::new()?;
        let mut pages = Vec::new();
        for (page_no, _page_id) in document.get_pages() {
            let text = document
                .extract_text(&[page_no])
                .map_err(|error| IngestError::PdfParse(error.to_string()))?;
            let text = tidier.tidy(&text);

            if !text.is_empty() {
                pages.push(PageText {
                    number: page_no,
                    text,
                });
            }
        }

        if pages.is_empty() {
            return Err(IngestError::EmptyDocument(name.to_string()));
        }

        Ok(pages)
    }
}

#[derive(Default)]
pub struct PlainTextExtractor;

impl DocumentExtractor for PlainTextExtractor {
    fn extract_pages(&self, name: &str, bytes: &[u8]) -> Result<Vec<PageText>, IngestError> {
        let text = std::str::from_utf8(bytes)
            .map_err(|error| IngestError::InvalidContent(format!("{name}: {error}")))?;
        let text = PageTidier::new()?.tidy(text);

        if text.is_empty() {
            return Err(IngestError::EmptyDocument(name.to_string()));
        }

        Ok(vec![PageText { number: 1, text }])
    }
}

/// Extracts ordered page texts, choosing the extractor from the file extension.
pub fn extract_page_texts(name: &str, bytes: &[u8]) -> Result<Vec<PageText>, IngestError> {
    match DocumentFormat::from_file_name(name) {
        Some(DocumentFormat::Pdf) => LopdfExtractor.extract_pages(name, bytes),
        Some(DocumentFormat::PlainText) => PlainTextExtractor.extract_pages(name, bytes),
        None => Err(IngestError::UnsupportedFileType(name.to_string())),
    }
}

/// Normalizes line endings, strips trailing spaces and collapses runs of blank lines
/// so paragraph boundaries survive as a single `"\n\n"`.
pub struct PageTidier {
    trailing: Regex,
    blank_runs: Regex,
}

impl PageTidier {
    pub fn new() -> Result<Self, IngestError> {
        Ok(Self {
            trailing: Regex::new(r"(?m)[ \t\u{a0}]+$")?,
            blank_runs: Regex::new(r"\n{3,}")?,
        })
    }

    pub fn tidy(&self, text: &str) -> String {
        let unified = text.replace("\r\n", "\n").replace('\r', "\n");
        let stripped = self.trailing.replace_all(&unified, "");
        self.blank_runs
            .replace_all(&stripped, "\n\n")
            .trim()
            .to_string()
    }
}
