//! Attachment validation, routing, and bounded-concurrency extraction.
//!
//! [`AttachmentProcessor::process_attachments`] classifies every item as
//! processed, skipped (unsupported type, which is not an error), or
//! failed (validation or extraction error), and runs extraction in
//! fixed-size concurrent batches: up to `max_concurrent` items are
//! dispatched together and the whole batch is awaited before the next one
//! starts, bounding peak memory from parsing large binaries.

use tokio::task::JoinSet;
use tracing::warn;

use crate::config::AttachmentConfig;
use crate::extract;
use crate::models::{AttachmentInfo, ParsedAttachment};

/// Clamp bounds for [`ProcessorLimits`].
const MIN_CONCURRENT: usize = 1;
const MAX_CONCURRENT: usize = 10;
const MIN_FILE_SIZE: u64 = 1024;
const MAX_FILE_SIZE: u64 = 50 * 1024 * 1024;

/// One attachment: metadata plus the raw payload.
#[derive(Debug, Clone)]
pub struct AttachmentItem {
    pub info: AttachmentInfo,
    pub data: Vec<u8>,
}

/// Operational limits, always held within clamped ranges.
#[derive(Debug, Clone, Copy)]
pub struct ProcessorLimits {
    pub max_concurrent: usize,
    pub max_file_size: u64,
}

impl ProcessorLimits {
    pub fn clamped(max_concurrent: usize, max_file_size: u64) -> Self {
        Self {
            max_concurrent: max_concurrent.clamp(MIN_CONCURRENT, MAX_CONCURRENT),
            max_file_size: max_file_size.clamp(MIN_FILE_SIZE, MAX_FILE_SIZE),
        }
    }
}

/// An attachment skipped because its type is unsupported. Tracked apart
/// from errors.
#[derive(Debug, Clone)]
pub struct SkippedAttachment {
    pub filename: String,
    pub reason: String,
}

/// A validation or extraction failure for one attachment.
#[derive(Debug, Clone)]
pub struct AttachmentFailure {
    pub filename: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProcessorStats {
    pub total: usize,
    pub processed: usize,
    pub errors: usize,
    pub skipped: usize,
}

/// Outcome of one attachment batch.
#[derive(Debug, Default)]
pub struct AttachmentBatch {
    pub processed: Vec<ParsedAttachment>,
    pub errors: Vec<AttachmentFailure>,
    pub skipped: Vec<SkippedAttachment>,
    pub stats: ProcessorStats,
}

enum ItemOutcome {
    Processed(ParsedAttachment),
    Error(AttachmentFailure),
    Skipped(SkippedAttachment),
}

#[derive(Clone, Copy)]
enum Format {
    Pdf,
    Docx,
}

fn route(info: &AttachmentInfo) -> Option<Format> {
    let mime = info.mime_type.to_lowercase();
    if mime == extract::MIME_PDF {
        return Some(Format::Pdf);
    }
    if mime == extract::MIME_DOCX {
        return Some(Format::Docx);
    }
    match info.filename.rsplit_once('.').map(|(_, e)| e.to_lowercase()) {
        Some(ext) if ext == "pdf" => Some(Format::Pdf),
        Some(ext) if ext == "docx" => Some(Format::Docx),
        _ => None,
    }
}

/// Validates, routes, and extracts attachments under concurrency and size
/// limits.
pub struct AttachmentProcessor {
    limits: ProcessorLimits,
}

impl AttachmentProcessor {
    pub fn new(config: &AttachmentConfig) -> Self {
        Self {
            limits: ProcessorLimits::clamped(config.max_concurrent, config.max_file_size),
        }
    }

    /// Adjust limits at runtime; values outside the clamped ranges are
    /// pulled to the nearest bound (concurrency 1–10, file size
    /// 1 KiB–50 MiB).
    pub fn configure(&mut self, max_concurrent: Option<usize>, max_file_size: Option<u64>) {
        self.limits = ProcessorLimits::clamped(
            max_concurrent.unwrap_or(self.limits.max_concurrent),
            max_file_size.unwrap_or(self.limits.max_file_size),
        );
    }

    pub fn limits(&self) -> ProcessorLimits {
        self.limits
    }

    /// Process a batch of attachments.
    ///
    /// Results are attributed by item index regardless of completion order,
    /// and one item's failure never cancels its siblings.
    pub async fn process_attachments(&self, items: Vec<AttachmentItem>) -> AttachmentBatch {
        let total = items.len();
        let max_file_size = self.limits.max_file_size;
        let mut slots: Vec<Option<ItemOutcome>> = Vec::with_capacity(total);
        slots.resize_with(total, || None);

        let mut pending: Vec<Option<AttachmentItem>> = items.into_iter().map(Some).collect();
        let indices: Vec<usize> = (0..total).collect();

        for batch in indices.chunks(self.limits.max_concurrent) {
            let mut join_set: JoinSet<(usize, ItemOutcome)> = JoinSet::new();
            for &idx in batch {
                let item = pending[idx].take().expect("item dispatched once");
                join_set
                    .spawn_blocking(move || (idx, process_one(item, max_file_size)));
            }
            // Fan-in: wait for the whole batch before dispatching the next.
            while let Some(joined) = join_set.join_next().await {
                match joined {
                    Ok((idx, outcome)) => slots[idx] = Some(outcome),
                    Err(e) => warn!(error = %e, "attachment task panicked"),
                }
            }
        }

        let mut result = AttachmentBatch::default();
        result.stats.total = total;
        for slot in slots.into_iter().flatten() {
            match slot {
                ItemOutcome::Processed(parsed) => result.processed.push(parsed),
                ItemOutcome::Error(failure) => result.errors.push(failure),
                ItemOutcome::Skipped(skipped) => result.skipped.push(skipped),
            }
        }
        result.stats.processed = result.processed.len();
        result.stats.errors = result.errors.len();
        result.stats.skipped = result.skipped.len();
        result
    }
}

fn process_one(item: AttachmentItem, max_file_size: u64) -> ItemOutcome {
    let AttachmentItem { info, data } = item;

    if data.is_empty() {
        return ItemOutcome::Error(AttachmentFailure {
            filename: info.filename,
            error: "Attachment buffer is empty".to_string(),
        });
    }
    if data.len() as u64 > max_file_size {
        return ItemOutcome::Error(AttachmentFailure {
            filename: info.filename,
            error: format!(
                "Attachment exceeds size limit ({} bytes > {} bytes)",
                data.len(),
                max_file_size
            ),
        });
    }
    if data.len() as u64 != info.size_bytes {
        return ItemOutcome::Error(AttachmentFailure {
            filename: info.filename,
            error: format!(
                "Size mismatch: declared {} bytes, received {} bytes",
                info.size_bytes,
                data.len()
            ),
        });
    }

    let Some(format) = route(&info) else {
        return ItemOutcome::Skipped(SkippedAttachment {
            filename: info.filename,
            reason: format!("Unsupported attachment type: {}", info.mime_type),
        });
    };

    let validation = match format {
        Format::Pdf => extract::validate_pdf(&data, &info.filename),
        Format::Docx => extract::validate_docx(&data, &info.filename),
    };
    if !validation.is_valid {
        return ItemOutcome::Error(AttachmentFailure {
            filename: info.filename,
            error: validation.errors.join("; "),
        });
    }

    let extracted = match format {
        Format::Pdf => extract::parse_pdf(&data, &info.filename),
        Format::Docx => extract::parse_docx(&data, &info.filename),
    };

    ItemOutcome::Processed(ParsedAttachment {
        filename: info.filename,
        mime_type: info.mime_type,
        size_bytes: info.size_bytes,
        extracted_text: extracted.text,
        attachment_id: info.id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn docx_payload(text: &str) -> Vec<u8> {
        let mut buf = Vec::new();
        {
            let mut zip = zip::ZipWriter::new(std::io::Cursor::new(&mut buf));
            zip.start_file(
                "word/document.xml",
                zip::write::SimpleFileOptions::default(),
            )
            .unwrap();
            let xml = format!(
                "<?xml version=\"1.0\"?><w:document xmlns:w=\"http://schemas.openxmlformats.org/wordprocessingml/2006/main\"><w:body><w:p><w:r><w:t>{text}</w:t></w:r></w:p></w:body></w:document>"
            );
            zip.write_all(xml.as_bytes()).unwrap();
            zip.finish().unwrap();
        }
        buf
    }

    fn item(id: &str, filename: &str, mime: &str, data: Vec<u8>) -> AttachmentItem {
        AttachmentItem {
            info: AttachmentInfo {
                id: id.to_string(),
                filename: filename.to_string(),
                mime_type: mime.to_string(),
                size_bytes: data.len() as u64,
            },
            data,
        }
    }

    #[test]
    fn limits_are_clamped() {
        let limits = ProcessorLimits::clamped(0, 1);
        assert_eq!(limits.max_concurrent, 1);
        assert_eq!(limits.max_file_size, 1024);

        let limits = ProcessorLimits::clamped(100, u64::MAX);
        assert_eq!(limits.max_concurrent, 10);
        assert_eq!(limits.max_file_size, 50 * 1024 * 1024);
    }

    #[tokio::test]
    async fn mixed_batch_is_classified_per_item() {
        let processor = AttachmentProcessor::new(&AttachmentConfig::default());

        let good = item(
            "a1",
            "notes.docx",
            extract::MIME_DOCX,
            docx_payload("meeting notes body text"),
        );
        let unsupported = item("a2", "photo.png", "image/png", vec![0u8; 200]);
        let mut mismatched = item("a3", "late.docx", extract::MIME_DOCX, docx_payload("x"));
        mismatched.info.size_bytes += 7;
        let bad_signature = item(
            "a4",
            "fake.docx",
            extract::MIME_DOCX,
            b"not a zip at all, padded to pass the minimum size check....... ok"
                .to_vec(),
        );

        let batch = processor
            .process_attachments(vec![good, unsupported, mismatched, bad_signature])
            .await;

        assert_eq!(batch.stats.total, 4);
        assert_eq!(batch.stats.processed, 1);
        assert_eq!(batch.stats.skipped, 1);
        assert_eq!(batch.stats.errors, 2);

        assert_eq!(batch.processed[0].attachment_id, "a1");
        assert!(batch.processed[0].extracted_text.contains("meeting notes"));
        assert!(batch.skipped[0].reason.contains("Unsupported"));
        assert!(batch
            .errors
            .iter()
            .any(|e| e.filename == "late.docx" && e.error.contains("Size mismatch")));
        assert!(batch
            .errors
            .iter()
            .any(|e| e.filename == "fake.docx" && e.error.contains("signature")));
    }

    #[tokio::test]
    async fn empty_buffer_is_a_validation_error() {
        let processor = AttachmentProcessor::new(&AttachmentConfig::default());
        let batch = processor
            .process_attachments(vec![item("a1", "empty.pdf", extract::MIME_PDF, vec![])])
            .await;
        assert_eq!(batch.stats.errors, 1);
        assert!(batch.errors[0].error.contains("empty"));
    }

    #[tokio::test]
    async fn oversized_buffer_is_rejected_before_routing() {
        let mut processor = AttachmentProcessor::new(&AttachmentConfig::default());
        processor.configure(None, Some(1024));
        let data = vec![b'x'; 4096];
        let batch = processor
            .process_attachments(vec![item("a1", "big.bin", "application/x-thing", data)])
            .await;
        // Size violations beat the unsupported-type skip.
        assert_eq!(batch.stats.errors, 1);
        assert!(batch.errors[0].error.contains("exceeds size limit"));
    }

    #[tokio::test]
    async fn batches_larger_than_concurrency_still_attribute_results() {
        let mut processor = AttachmentProcessor::new(&AttachmentConfig::default());
        processor.configure(Some(2), None);

        let items: Vec<AttachmentItem> = (0..7)
            .map(|i| {
                item(
                    &format!("id-{i}"),
                    &format!("doc{i}.docx"),
                    extract::MIME_DOCX,
                    docx_payload(&format!("document number {i} content")),
                )
            })
            .collect();

        let batch = processor.process_attachments(items).await;
        assert_eq!(batch.stats.processed, 7);
        for i in 0..7 {
            let parsed = batch
                .processed
                .iter()
                .find(|p| p.attachment_id == format!("id-{i}"))
                .unwrap();
            assert!(parsed
                .extracted_text
                .contains(&format!("document number {i}")));
        }
    }
}
