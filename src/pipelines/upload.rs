//! Shared first step: upload the submitted document.

use std::path::Path;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use chrono::Local;
use tracing::info;

use super::DOCUMENT_SERVICE;
use crate::adapters::FileUpload;
use crate::config::RunLimits;
use crate::core::{Step, StepContext, StepError};
use crate::domain::{Event, EventKind, FileSubmitted, FileUploaded};

const PDF_MIME: &str = "application/pdf";
const PPTX_MIME: &str = "application/vnd.openxmlformats-officedocument.presentationml.presentation";
const XLSX_MIME: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

const RESOURCES: &[&str] = &[DOCUMENT_SERVICE.name()];

/// Uploads the document and records its id in run state
#[derive(Debug, Default)]
pub struct UploadFile;

#[async_trait]
impl Step for UploadFile {
    fn name(&self) -> &'static str {
        "upload_file"
    }

    fn accepts(&self) -> EventKind {
        EventKind::FileSubmitted
    }

    fn emits(&self) -> &'static [EventKind] {
        &[EventKind::FileUploaded]
    }

    fn resources(&self) -> &'static [&'static str] {
        RESOURCES
    }

    async fn run(&self, event: Event, ctx: &StepContext<'_>) -> Result<Event, StepError> {
        let kind = event.kind();
        let Event::FileSubmitted(input) = event else {
            return Err(StepError::UnexpectedEvent {
                step: self.name(),
                kind,
            });
        };

        let upload = prepare_upload(&input, &ctx.resources.config().limits).await?;
        let service = ctx.resources.get(&DOCUMENT_SERVICE)?;

        info!(file_name = %upload.file_name, mime_type = %upload.mime_type, bytes = upload.bytes.len(), "Uploading document");
        let uploaded = service.upload(upload).await?;
        info!(file_id = %uploaded.id, "Document uploaded");

        ctx.state.edit().await.file_id = Some(uploaded.id.clone());
        Ok(Event::FileUploaded(FileUploaded {
            file_id: uploaded.id,
        }))
    }
}

/// Build the upload request for a submitted document
pub async fn prepare_upload(input: &FileSubmitted, limits: &RunLimits) -> Result<FileUpload, StepError> {
    if !input.is_source_content {
        let path = Path::new(&input.source);
        let size = tokio::fs::metadata(path).await?.len();
        if size > limits.max_file_bytes {
            return Err(StepError::data_contract(format!(
                "File {} is {} bytes, limit is {}",
                path.display(),
                size,
                limits.max_file_bytes
            )));
        }

        let bytes = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| input.source.clone());
        let extension = path
            .extension()
            .map(|ext| format!(".{}", ext.to_string_lossy()))
            .unwrap_or_default();

        return Ok(FileUpload {
            file_name,
            bytes,
            mime_type: mime_type(&extension).to_string(),
            external_file_id: input.source.clone(),
        });
    }

    let max_inline_bytes = limits.max_inline_bytes;
    let encoded = input.source.trim();

    // Padding accounts for at most two bytes of the estimate
    let estimated = decoded_len_estimate(encoded.len());
    if estimated.saturating_sub(2) > max_inline_bytes {
        return Err(StepError::data_contract(format!(
            "Inline content is about {} bytes, limit is {}",
            estimated, max_inline_bytes
        )));
    }

    let bytes = STANDARD
        .decode(encoded)
        .map_err(|e| StepError::data_contract(format!("Inline content is not valid base64: {}", e)))?;

    if bytes.len() as u64 > max_inline_bytes {
        return Err(StepError::data_contract(format!(
            "Inline content is {} bytes, limit is {}",
            bytes.len(),
            max_inline_bytes
        )));
    }

    let extension = input.extension();
    let file_name = input
        .file_name
        .clone()
        .unwrap_or_else(|| timestamped_name(extension));

    Ok(FileUpload {
        external_file_id: file_name.clone(),
        file_name,
        bytes,
        mime_type: mime_type(extension).to_string(),
    })
}

/// Upper bound of the decoded size of `encoded_len` base64 characters
fn decoded_len_estimate(encoded_len: usize) -> u64 {
    (encoded_len as u64).div_ceil(4) * 3
}

/// Local timestamp with ':' and '.' replaced, plus the extension
fn timestamped_name(extension: &str) -> String {
    format!("{}{}", Local::now().format("%Y-%m-%dT%H-%M-%S-%6f"), extension)
}

fn mime_type(extension: &str) -> &'static str {
    match extension.to_ascii_lowercase().as_str() {
        ".pdf" => PDF_MIME,
        ".pptx" => PPTX_MIME,
        _ => XLSX_MIME,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::FileType;

    fn limits(max_inline_bytes: u64, max_file_bytes: u64) -> RunLimits {
        RunLimits {
            max_inline_bytes,
            max_file_bytes,
            ..RunLimits::default()
        }
    }

    #[test]
    fn test_mime_type() {
        assert_eq!(mime_type(".pdf"), PDF_MIME);
        assert_eq!(mime_type(".PDF"), PDF_MIME);
        assert_eq!(mime_type(".pptx"), PPTX_MIME);
        assert_eq!(mime_type(".xlsx"), XLSX_MIME);
        assert_eq!(mime_type(""), XLSX_MIME);
    }

    #[test]
    fn test_timestamped_name_has_no_colons_or_dots() {
        let name = timestamped_name(".xlsx");
        let stem = name.strip_suffix(".xlsx").unwrap();

        assert!(!stem.contains(':'));
        assert!(!stem.contains('.'));
        assert_eq!(stem.len(), "2024-01-01T10-00-00-000000".len());
    }

    #[tokio::test]
    async fn test_inline_upload() {
        let input = FileSubmitted::inline(STANDARD.encode(b"deck bytes"), FileType::SlideDeck)
            .with_file_name("q3.pdf");

        let upload = prepare_upload(&input, &limits(1024, 1024)).await.unwrap();
        assert_eq!(upload.bytes, b"deck bytes");
        assert_eq!(upload.file_name, "q3.pdf");
        assert_eq!(upload.external_file_id, "q3.pdf");
        assert_eq!(upload.mime_type, PDF_MIME);
    }

    #[tokio::test]
    async fn test_inline_upload_defaults_to_timestamp_name() {
        let input = FileSubmitted::inline(STANDARD.encode(b"cells"), FileType::Spreadsheet);

        let upload = prepare_upload(&input, &limits(1024, 1024)).await.unwrap();
        assert!(upload.file_name.ends_with(".xlsx"));
        assert_eq!(upload.mime_type, XLSX_MIME);
    }

    #[tokio::test]
    async fn test_invalid_base64_is_data_contract() {
        let input = FileSubmitted::inline("***not base64***", FileType::Spreadsheet);

        let err = prepare_upload(&input, &limits(1024, 1024)).await.unwrap_err();
        assert!(matches!(err, StepError::DataContract(_)));
    }

    #[tokio::test]
    async fn test_inline_size_limit() {
        let input = FileSubmitted::inline(STANDARD.encode([0u8; 64]), FileType::Spreadsheet);

        let err = prepare_upload(&input, &limits(16, 1024)).await.unwrap_err();
        assert!(matches!(err, StepError::DataContract(_)));
    }

    #[tokio::test]
    async fn test_oversized_inline_rejected_before_decoding() {
        // Not valid base64, so only the size estimate can reject it
        let input = FileSubmitted::inline("*".repeat(4096), FileType::Spreadsheet);

        let err = prepare_upload(&input, &limits(64, 1024)).await.unwrap_err();
        assert!(err.to_string().starts_with("Inline content is about 3072 bytes"));
    }

    #[tokio::test]
    async fn test_padded_inline_at_limit_is_accepted() {
        let input = FileSubmitted::inline(STANDARD.encode(b"cells"), FileType::Spreadsheet);

        let upload = prepare_upload(&input, &limits(5, 0)).await.unwrap();
        assert_eq!(upload.bytes, b"cells");
    }

    #[test]
    fn test_decoded_len_estimate() {
        assert_eq!(decoded_len_estimate(0), 0);
        assert_eq!(decoded_len_estimate(8), 6);
        assert_eq!(decoded_len_estimate(10), 9);
    }

    #[tokio::test]
    async fn test_path_size_limit() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("portfolio.xlsx");
        std::fs::write(&path, [0u8; 64]).unwrap();

        let input = FileSubmitted::from_path(&path, FileType::Spreadsheet);
        let err = prepare_upload(&input, &limits(1024, 16)).await.unwrap_err();
        assert!(matches!(err, StepError::DataContract(_)));
    }

    #[tokio::test]
    async fn test_path_upload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("portfolio.xlsx");
        std::fs::write(&path, b"sheet").unwrap();

        let input = FileSubmitted::from_path(&path, FileType::Spreadsheet);
        let upload = prepare_upload(&input, &limits(0, 1024)).await.unwrap();

        assert_eq!(upload.file_name, "portfolio.xlsx");
        assert_eq!(upload.external_file_id, path.to_string_lossy());
        assert_eq!(upload.bytes, b"sheet");
        assert_eq!(upload.mime_type, XLSX_MIME);
    }
}
