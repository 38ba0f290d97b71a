//! Text extraction for documents attached to chat messages.
//!
//! The frontend sends an uploaded file inline as a base64 data URL next to its filename. PDF and
//! DOCX are supported; the type is taken from the filename extension. Extraction is CPU bound and
//! runs on the blocking pool.
use axum::body::Bytes;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use quick_xml::{Reader, events::Event};
use std::io::{Cursor, Read};
use tracing::{debug, instrument, warn};

use crate::errors::GatewayError;

/// Extracted text beyond this many characters is dropped before it is sent upstream.
pub const MAX_DOCUMENT_CHARS: usize = 100_000;

/// Cap on the decompressed size of a DOCX body part.
const MAX_DOCX_XML_BYTES: u64 = 32 * 1024 * 1024;

const DOCX_BODY_PART: &str = "word/document.xml";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DocumentError {
    #[error("A filename is required when uploading a file.")]
    MissingFilename,
    #[error("Invalid base64 file data.")]
    InvalidData,
    #[error("The uploaded file is empty.")]
    Empty,
    #[error("Unsupported file type. Please upload a PDF or DOCX file.")]
    UnsupportedType,
    #[error("Could not read the PDF file. It may be corrupted or encrypted.")]
    UnreadablePdf,
    #[error("Could not read the DOCX file. It may be corrupted.")]
    UnreadableDocx,
}

impl From<DocumentError> for GatewayError {
    fn from(e: DocumentError) -> Self {
        GatewayError::InvalidInput(e.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Pdf,
    Docx,
}

impl DocumentKind {
    pub fn from_filename(filename: &str) -> Option<Self> {
        let (_, extension) = filename.rsplit_once('.')?;
        match extension.to_ascii_lowercase().as_str() {
            "pdf" => Some(Self::Pdf),
            "docx" => Some(Self::Docx),
            _ => None,
        }
    }
}

/// A decoded upload, not yet read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub filename: String,
    pub kind: DocumentKind,
    pub bytes: Bytes,
}

impl Attachment {
    /// Decodes a `data:<mime>;base64,<payload>` URL. Only the payload after the first comma is
    /// used; the declared MIME type is ignored in favour of the filename.
    pub fn from_data_url(data_url: &str, filename: &str) -> Result<Self, DocumentError> {
        let filename = filename.trim();
        if filename.is_empty() {
            return Err(DocumentError::MissingFilename);
        }
        let kind = DocumentKind::from_filename(filename).ok_or(DocumentError::UnsupportedType)?;

        let (_, encoded) = data_url
            .split_once(',')
            .ok_or(DocumentError::InvalidData)?;
        let bytes = STANDARD
            .decode(encoded.trim())
            .map_err(|_| DocumentError::InvalidData)?;
        if bytes.is_empty() {
            return Err(DocumentError::Empty);
        }

        Ok(Self {
            filename: filename.to_string(),
            kind,
            bytes: bytes.into(),
        })
    }
}

/// Extracts plain text from the attachment. An image-only or blank document yields an empty
/// string rather than an error.
#[instrument(
    skip(attachment),
    fields(filename = %attachment.filename, bytes = attachment.bytes.len())
)]
pub async fn extract_text(attachment: &Attachment) -> Result<String, DocumentError> {
    let kind = attachment.kind;
    let bytes = attachment.bytes.clone();
    let unreadable = match kind {
        DocumentKind::Pdf => DocumentError::UnreadablePdf,
        DocumentKind::Docx => DocumentError::UnreadableDocx,
    };

    let text = tokio::task::spawn_blocking(move || match kind {
        DocumentKind::Pdf => pdf_text(&bytes),
        DocumentKind::Docx => docx_text(&bytes),
    })
    .await
    .map_err(|e| {
        // The PDF parser panics on some malformed inputs.
        warn!(error = %e, "Document extraction task failed");
        unreadable
    })??;

    let text = truncate_chars(text.trim(), MAX_DOCUMENT_CHARS);
    debug!(chars = text.chars().count(), "Extracted document text");
    Ok(text)
}

fn pdf_text(bytes: &[u8]) -> Result<String, DocumentError> {
    pdf_extract::extract_text_from_mem(bytes).map_err(|e| {
        debug!(error = %e, "PDF extraction failed");
        DocumentError::UnreadablePdf
    })
}

/// Reads the paragraphs of `word/document.xml`, one per line, skipping empty ones.
fn docx_text(bytes: &[u8]) -> Result<String, DocumentError> {
    let mut archive =
        zip::ZipArchive::new(Cursor::new(bytes)).map_err(|_| DocumentError::UnreadableDocx)?;
    let part = archive
        .by_name(DOCX_BODY_PART)
        .map_err(|_| DocumentError::UnreadableDocx)?;
    let mut xml = String::new();
    part.take(MAX_DOCX_XML_BYTES)
        .read_to_string(&mut xml)
        .map_err(|_| DocumentError::UnreadableDocx)?;

    paragraphs_from_xml(&xml)
        .map(|paragraphs| paragraphs.join("\n"))
        .ok_or(DocumentError::UnreadableDocx)
}

fn paragraphs_from_xml(xml: &str) -> Option<Vec<String>> {
    let mut reader = Reader::from_str(xml);
    let mut paragraphs = Vec::new();
    let mut current = String::new();
    let mut in_text_run = false;

    loop {
        match reader.read_event().ok()? {
            Event::Start(e) if e.name().as_ref() == b"w:t" => in_text_run = true,
            Event::End(e) => match e.name().as_ref() {
                b"w:t" => in_text_run = false,
                b"w:p" => {
                    let paragraph = std::mem::take(&mut current);
                    if !paragraph.trim().is_empty() {
                        paragraphs.push(paragraph);
                    }
                }
                _ => {}
            },
            Event::Empty(e) => match e.name().as_ref() {
                b"w:tab" => current.push('\t'),
                b"w:br" | b"w:cr" => current.push('\n'),
                _ => {}
            },
            Event::Text(t) if in_text_run => current.push_str(&t.unescape().ok()?),
            Event::Eof => break,
            _ => {}
        }
    }
    if !current.trim().is_empty() {
        paragraphs.push(current);
    }
    Some(paragraphs)
}

fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((cut, _)) => {
            debug!(max, "Truncating document text");
            text[..cut].to_string()
        }
        None => text.to_string(),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    /// A minimal DOCX holding only the main document part.
    pub(crate) fn docx_bytes(paragraphs: &[&str]) -> Vec<u8> {
        let body: String = paragraphs
            .iter()
            .map(|p| format!("<w:p><w:r><w:t xml:space=\"preserve\">{p}</w:t></w:r></w:p>"))
            .collect();
        let namespace = "http://schemas.openxmlformats.org/wordprocessingml/2006/main";
        let xml = format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\
             <w:document xmlns:w=\"{namespace}\"><w:body>{body}</w:body></w:document>"
        );

        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        writer
            .start_file(DOCX_BODY_PART, SimpleFileOptions::default())
            .unwrap();
        writer.write_all(xml.as_bytes()).unwrap();
        writer.finish().unwrap().into_inner()
    }

    pub(crate) fn data_url(mime: &str, bytes: &[u8]) -> String {
        format!("data:{mime};base64,{}", STANDARD.encode(bytes))
    }

    #[test]
    fn kind_comes_from_the_extension() {
        assert_eq!(DocumentKind::from_filename("cv.PDF"), Some(DocumentKind::Pdf));
        assert_eq!(
            DocumentKind::from_filename("notes.final.docx"),
            Some(DocumentKind::Docx)
        );
        assert_eq!(DocumentKind::from_filename("notes.doc"), None);
        assert_eq!(DocumentKind::from_filename("pdf"), None);
    }

    #[test]
    fn data_url_errors_are_specific() {
        assert_eq!(
            Attachment::from_data_url("JVBERi0xLjQ=", "a.pdf").unwrap_err(),
            DocumentError::InvalidData
        );
        assert_eq!(
            Attachment::from_data_url("data:application/pdf;base64,***", "a.pdf").unwrap_err(),
            DocumentError::InvalidData
        );
        assert_eq!(
            Attachment::from_data_url("data:application/pdf;base64,", "a.pdf").unwrap_err(),
            DocumentError::Empty
        );
        assert_eq!(
            Attachment::from_data_url("data:image/png;base64,iVBORw0K", "a.png").unwrap_err(),
            DocumentError::UnsupportedType
        );
        assert_eq!(
            Attachment::from_data_url("data:application/pdf;base64,JVBE", " ").unwrap_err(),
            DocumentError::MissingFilename
        );
    }

    #[test]
    fn data_url_payload_is_decoded() {
        let attachment =
            Attachment::from_data_url(&data_url("application/pdf", b"%PDF-1.4"), "cv.pdf")
                .unwrap();
        assert_eq!(attachment.kind, DocumentKind::Pdf);
        assert_eq!(attachment.filename, "cv.pdf");
        assert_eq!(&attachment.bytes[..], b"%PDF-1.4");
    }

    #[tokio::test]
    async fn docx_paragraphs_become_lines() {
        let bytes = docx_bytes(&["Jane Doe", "", "Rust &amp; Go engineer"]);
        let attachment = Attachment {
            filename: "cv.docx".into(),
            kind: DocumentKind::Docx,
            bytes: bytes.into(),
        };
        assert_eq!(
            extract_text(&attachment).await.unwrap(),
            "Jane Doe\nRust & Go engineer"
        );
    }

    #[tokio::test]
    async fn corrupt_files_are_unreadable() {
        let pdf = Attachment {
            filename: "broken.pdf".into(),
            kind: DocumentKind::Pdf,
            bytes: Bytes::from_static(b"definitely not a pdf"),
        };
        assert_eq!(
            extract_text(&pdf).await.unwrap_err(),
            DocumentError::UnreadablePdf
        );

        let docx = Attachment {
            filename: "broken.docx".into(),
            kind: DocumentKind::Docx,
            bytes: Bytes::from_static(b"PK but not really"),
        };
        assert_eq!(
            extract_text(&docx).await.unwrap_err(),
            DocumentError::UnreadableDocx
        );
    }

    #[test]
    fn long_text_is_truncated_on_a_char_boundary() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("hi", 10), "hi");
    }
}
