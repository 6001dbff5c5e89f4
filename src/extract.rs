//! Text extraction from binary email attachments (PDF, DOCX).
//!
//! Each format gets a strict validation pass (size bounds, byte signature,
//! extension) that runs before extraction, and an extraction pass that
//! never fails: malformed content degrades to a placeholder text plus a
//! message describing the failure, so one bad attachment cannot abort a
//! batch.

use std::io::Read;

use tracing::warn;

/// Supported MIME types.
pub const MIME_PDF: &str = "application/pdf";
pub const MIME_DOCX: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

/// Hard input-size caps per format, distinct from the email-size cap.
pub const PDF_MAX_BYTES: usize = 10 * 1024 * 1024;
pub const DOCX_MAX_BYTES: usize = 5 * 1024 * 1024;

/// Buffers smaller than this cannot be a real document of either format.
const MIN_FILE_BYTES: usize = 64;

/// Maximum decompressed bytes to read from a DOCX ZIP entry (zip-bomb
/// protection).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

const PDF_SIGNATURE: &[u8] = b"%PDF-";

/// ZIP local-file-header signatures (DOCX is a ZIP container).
const ZIP_SIGNATURES: &[&[u8]] = &[
    &[0x50, 0x4B, 0x03, 0x04],
    &[0x50, 0x4B, 0x05, 0x06],
    &[0x50, 0x4B, 0x07, 0x08],
];

const PDF_EXTENSIONS: &[&str] = &["pdf"];
const DOCX_EXTENSIONS: &[&str] = &["docx"];

/// Validation outcome: all failed checks, not just the first.
#[derive(Debug, Clone)]
pub struct Validation {
    pub is_valid: bool,
    pub errors: Vec<String>,
}

impl Validation {
    fn from_errors(errors: Vec<String>) -> Self {
        Self {
            is_valid: errors.is_empty(),
            errors,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ExtractMetadata {
    pub word_count: usize,
    pub char_count: usize,
}

/// Extraction result. `degraded` marks placeholder output from a failed
/// parse; callers that only read `text` still get the bracketed error
/// marker.
#[derive(Debug, Clone)]
pub struct ExtractedText {
    pub text: String,
    pub metadata: ExtractMetadata,
    pub messages: Vec<String>,
    pub degraded: bool,
}

impl ExtractedText {
    fn ok(text: String) -> Self {
        let metadata = ExtractMetadata {
            word_count: text.split_whitespace().count(),
            char_count: text.chars().count(),
        };
        Self {
            text,
            metadata,
            messages: Vec::new(),
            degraded: false,
        }
    }

    fn degraded(format: &str, filename: &str, cause: String) -> Self {
        Self {
            text: format!("[Error parsing {format}: {filename}]"),
            metadata: ExtractMetadata::default(),
            messages: vec![cause],
            degraded: true,
        }
    }
}

fn extension_of(filename: &str) -> Option<String> {
    filename.rsplit_once('.').map(|(_, ext)| ext.to_lowercase())
}

fn validate_common(
    buffer: &[u8],
    filename: &str,
    max_bytes: usize,
    extensions: &[&str],
    errors: &mut Vec<String>,
) {
    if buffer.is_empty() {
        errors.push("Buffer is empty".to_string());
    } else if buffer.len() < MIN_FILE_BYTES {
        errors.push(format!(
            "Buffer too small ({} bytes < {} byte minimum)",
            buffer.len(),
            MIN_FILE_BYTES
        ));
    }
    if buffer.len() > max_bytes {
        errors.push(format!(
            "Buffer exceeds size limit ({} bytes > {} bytes)",
            buffer.len(),
            max_bytes
        ));
    }
    match extension_of(filename) {
        Some(ext) if extensions.contains(&ext.as_str()) => {}
        _ => errors.push(format!(
            "Unexpected extension for {filename} (expected one of: {})",
            extensions.join(", ")
        )),
    }
}

/// Validate a PDF buffer: size bounds, `%PDF-` header, `.pdf` extension.
pub fn validate_pdf(buffer: &[u8], filename: &str) -> Validation {
    let mut errors = Vec::new();
    validate_common(buffer, filename, PDF_MAX_BYTES, PDF_EXTENSIONS, &mut errors);
    if !buffer.is_empty() && !buffer.starts_with(PDF_SIGNATURE) {
        errors.push("Missing PDF signature (%PDF-)".to_string());
    }
    Validation::from_errors(errors)
}

/// Validate a DOCX buffer: size bounds, ZIP local-file-header signature,
/// `.docx` extension.
pub fn validate_docx(buffer: &[u8], filename: &str) -> Validation {
    let mut errors = Vec::new();
    validate_common(
        buffer,
        filename,
        DOCX_MAX_BYTES,
        DOCX_EXTENSIONS,
        &mut errors,
    );
    if !buffer.is_empty() && !ZIP_SIGNATURES.iter().any(|sig| buffer.starts_with(sig)) {
        errors.push("Missing ZIP signature (DOCX is a ZIP container)".to_string());
    }
    Validation::from_errors(errors)
}

/// Extract text from a PDF buffer. Never fails: parse errors degrade to a
/// placeholder marker plus a message.
pub fn parse_pdf(buffer: &[u8], filename: &str) -> ExtractedText {
    match pdf_extract::extract_text_from_mem(buffer) {
        Ok(text) => ExtractedText::ok(text.trim().to_string()),
        Err(e) => {
            warn!(filename, error = %e, "PDF extraction degraded");
            ExtractedText::degraded("PDF", filename, format!("PDF extraction failed: {e}"))
        }
    }
}

/// Extract text from a DOCX buffer. Never fails: parse errors degrade to a
/// placeholder marker plus a message. Word-specific characters are
/// normalized to ASCII equivalents.
pub fn parse_docx(buffer: &[u8], filename: &str) -> ExtractedText {
    match extract_docx_text(buffer) {
        Ok(text) => ExtractedText::ok(clean_word_text(&text)),
        Err(e) => {
            warn!(filename, error = %e, "DOCX extraction degraded");
            ExtractedText::degraded("DOCX", filename, format!("DOCX extraction failed: {e}"))
        }
    }
}

fn extract_docx_text(buffer: &[u8]) -> Result<String, String> {
    let mut archive =
        zip::ZipArchive::new(std::io::Cursor::new(buffer)).map_err(|e| e.to_string())?;
    let mut doc_xml = Vec::new();
    let mut found = false;
    for i in 0..archive.len() {
        let entry = archive.by_index(i).map_err(|e| e.to_string())?;
        if entry.name() == "word/document.xml" {
            entry
                .take(MAX_XML_ENTRY_BYTES)
                .read_to_end(&mut doc_xml)
                .map_err(|e| e.to_string())?;
            if doc_xml.len() as u64 >= MAX_XML_ENTRY_BYTES {
                return Err("word/document.xml exceeds size limit".to_string());
            }
            found = true;
            break;
        }
    }
    if !found {
        return Err("word/document.xml not found".to_string());
    }
    extract_w_t_elements(&doc_xml)
}

/// Pull the text runs (`w:t`) out of a WordprocessingML document, with a
/// newline at each paragraph end.
fn extract_w_t_elements(xml: &[u8]) -> Result<String, String> {
    let mut out = String::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(quick_xml::events::Event::Start(e)) => {
                if e.local_name().as_ref() == b"t" {
                    if let Ok(quick_xml::events::Event::Text(te)) = reader.read_event_into(&mut buf)
                    {
                        out.push_str(te.unescape().unwrap_or_default().as_ref());
                    }
                }
            }
            Ok(quick_xml::events::Event::End(e)) => {
                if e.local_name().as_ref() == b"p" && !out.ends_with('\n') && !out.is_empty() {
                    out.push('\n');
                }
            }
            Ok(quick_xml::events::Event::Eof) => break,
            Err(e) => return Err(e.to_string()),
            _ => {}
        }
        buf.clear();
    }
    Ok(out.trim().to_string())
}

/// Replace Word-specific typography with plain ASCII.
fn clean_word_text(text: &str) -> String {
    text.replace('\u{a0}', " ")
        .replace(['\u{2013}', '\u{2014}'], "-")
        .replace(['\u{2018}', '\u{2019}'], "'")
        .replace(['\u{201c}', '\u{201d}'], "\"")
        .replace('\u{2026}', "...")
}
