// CV text extraction: PDF text layer, Word .docx and UTF-8 plain text.

mod docx;

use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("Unsupported document format: {0}")]
    UnsupportedFormat(String),

    #[error("Could not read PDF: {0}")]
    Pdf(String),

    #[error("Could not read Word document: {0}")]
    Docx(String),

    #[error("Plain text upload is not valid UTF-8")]
    Encoding(#[from] std::string::FromUtf8Error),

    #[error("No text could be extracted from the document")]
    Empty,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Pdf,
    Docx,
    PlainText,
}

const DOCX_MIME: &str = "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

impl DocumentFormat {
    /// Detects the format from the file extension. The declared content type
    /// is only consulted when the file name has no extension.
    pub fn detect(
        file_name: Option<&str>,
        content_type: Option<&str>,
    ) -> Result<Self, ExtractionError> {
        let extension = file_name
            .and_then(|n| n.rsplit_once('.'))
            .map(|(_, ext)| ext.to_ascii_lowercase());

        if let Some(ext) = extension {
            return match ext.as_str() {
                "pdf" => Ok(DocumentFormat::Pdf),
                "docx" => Ok(DocumentFormat::Docx),
                "txt" | "text" | "md" => Ok(DocumentFormat::PlainText),
                _ => Err(ExtractionError::UnsupportedFormat(format!(".{ext}"))),
            };
        }

        let mime = content_type
            .map(|c| c.split(';').next().unwrap_or(c).trim().to_ascii_lowercase());
        match mime.as_deref() {
            Some("application/pdf") => Ok(DocumentFormat::Pdf),
            Some(DOCX_MIME) => Ok(DocumentFormat::Docx),
            Some("text/plain" | "text/markdown") => Ok(DocumentFormat::PlainText),
            _ => Err(ExtractionError::UnsupportedFormat(
                mime.unwrap_or_else(|| "unknown".to_string()),
            )),
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            DocumentFormat::Pdf => "application/pdf",
            DocumentFormat::Docx => DOCX_MIME,
            DocumentFormat::PlainText => "text/plain; charset=utf-8",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            DocumentFormat::Pdf => "pdf",
            DocumentFormat::Docx => "docx",
            DocumentFormat::PlainText => "txt",
        }
    }
}

/// Extracts and normalises the text of an uploaded document.
pub fn extract_text(format: DocumentFormat, bytes: &[u8]) -> Result<String, ExtractionError> {
    let raw = match format {
        DocumentFormat::Pdf => extract_pdf(bytes)?,
        DocumentFormat::Docx => docx::extract(bytes)?,
        DocumentFormat::PlainText => String::from_utf8(bytes.to_vec())?,
    };

    let text = normalize_whitespace(&raw);
    debug!(
        "Extracted {} chars from {:?} upload ({} bytes)",
        text.len(),
        format,
        bytes.len()
    );

    if text.is_empty() {
        return Err(ExtractionError::Empty);
    }
    Ok(text)
}

fn extract_pdf(bytes: &[u8]) -> Result<String, ExtractionError> {
    // pdf-extract panics on some malformed inputs
    match std::panic::catch_unwind(|| pdf_extract::extract_text_from_mem(bytes)) {
        Ok(Ok(text)) => Ok(text),
        Ok(Err(e)) => Err(ExtractionError::Pdf(e.to_string())),
        Err(_) => Err(ExtractionError::Pdf("malformed PDF".to_string())),
    }
}

/// Normalises line endings, trims the text and each line's end, drops control
/// characters and collapses runs of blank lines into one.
pub fn normalize_whitespace(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut blank_run = 0usize;

    for line in text.replace("\r\n", "\n").replace('\r', "\n").lines() {
        let line: String = line
            .chars()
            .filter(|c| !c.is_control() || *c == '\t')
            .collect();
        let line = line.trim_end();

        if line.trim().is_empty() {
            blank_run += 1;
            continue;
        }
        if !out.is_empty() {
            out.push('\n');
            if blank_run > 0 {
                out.push('\n');
            }
        }
        blank_run = 0;
        out.push_str(line);
    }

    out.trim_start().to_string()
}
