// Paragraph text of a .docx (word/document.xml inside the zip package).

use std::io::{Cursor, Read};

use quick_xml::events::Event;
use quick_xml::Reader;

use super::ExtractionError;

const DOCUMENT_PART: &str = "word/document.xml";
/// Upper bound on the inflated size of the document part.
const MAX_DOCUMENT_XML_BYTES: usize = 32 * 1024 * 1024;

pub(super) fn extract(bytes: &[u8]) -> Result<String, ExtractionError> {
    let xml = read_document_part(bytes, MAX_DOCUMENT_XML_BYTES)?;
    paragraphs_text(&xml)
}

fn read_document_part(bytes: &[u8], limit: usize) -> Result<String, ExtractionError> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| ExtractionError::Docx(format!("not a Word package ({e})")))?;

    let part = archive
        .by_name(DOCUMENT_PART)
        .map_err(|_| ExtractionError::Docx(format!("missing {DOCUMENT_PART}")))?;

    let mut raw = Vec::new();
    part.take(limit as u64 + 1)
        .read_to_end(&mut raw)
        .map_err(|e| ExtractionError::Docx(e.to_string()))?;
    if raw.len() > limit {
        return Err(ExtractionError::Docx("document too large".to_string()));
    }

    String::from_utf8(raw).map_err(|e| ExtractionError::Docx(e.to_string()))
}

/// Concatenates `w:t` runs; paragraph ends and `w:br` become newlines,
/// `w:tab` a tab.
fn paragraphs_text(xml: &str) -> Result<String, ExtractionError> {
    let mut reader = Reader::from_str(xml);
    let mut out = String::new();
    let mut in_text_run = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) if e.name().as_ref() == b"w:t" => in_text_run = true,
            Ok(Event::End(e)) => match e.name().as_ref() {
                b"w:t" => in_text_run = false,
                b"w:p" => out.push('\n'),
                _ => {}
            },
            Ok(Event::Empty(e)) => match e.name().as_ref() {
                b"w:br" | b"w:cr" => out.push('\n'),
                b"w:tab" => out.push('\t'),
                _ => {}
            },
            Ok(Event::Text(t)) if in_text_run => {
                let text = t
                    .unescape()
                    .map_err(|e| ExtractionError::Docx(e.to_string()))?;
                out.push_str(&text);
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(ExtractionError::Docx(format!(
                    "malformed XML at byte {}: {e}",
                    reader.buffer_position()
                )))
            }
            _ => {}
        }
    }

    Ok(out)
}
