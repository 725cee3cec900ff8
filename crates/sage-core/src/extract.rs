//! Text extraction for ingestible files, a preprocessing step feeding
//! [`crate::engine::Engine::ingest`].

use std::path::Path;

/// Default maximum file size: 50 MiB.
pub const DEFAULT_MAX_FILE_SIZE: u64 = 50 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    PlainText,
    Markdown,
    Pdf,
}

impl DocumentFormat {
    #[must_use]
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "txt" | "text" => Some(Self::PlainText),
            "md" | "markdown" => Some(Self::Markdown),
            "pdf" => Some(Self::Pdf),
            _ => None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("file too large: {0} bytes")]
    FileTooLarge(u64),

    #[error("PDF error: {0}")]
    Pdf(String),
}

/// Extract raw bytes into text given a format hint.
///
/// # Errors
///
/// Returns an error if the format cannot be decoded, or for PDF input when
/// the crate is built without the `pdf` feature.
pub fn extract_bytes(bytes: &[u8], format: DocumentFormat) -> Result<String, ExtractError> {
    match format {
        DocumentFormat::PlainText | DocumentFormat::Markdown => {
            Ok(String::from_utf8_lossy(bytes).into_owned())
        }
        #[cfg(feature = "pdf")]
        DocumentFormat::Pdf => {
            pdf_extract::extract_text_from_mem(bytes).map_err(|e| ExtractError::Pdf(e.to_string()))
        }
        #[cfg(not(feature = "pdf"))]
        DocumentFormat::Pdf => Err(ExtractError::UnsupportedFormat(
            "pdf (crate built without the pdf feature)".into(),
        )),
    }
}

/// Read a file and extract its text, choosing the format from the extension.
///
/// # Errors
///
/// Returns an error for unknown extensions, files over
/// [`DEFAULT_MAX_FILE_SIZE`], or a failed extraction.
pub async fn extract_file(path: &Path) -> Result<String, ExtractError> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
    let format = DocumentFormat::from_extension(ext)
        .ok_or_else(|| ExtractError::UnsupportedFormat(ext.to_owned()))?;

    let meta = tokio::fs::metadata(path).await?;
    if meta.len() > DEFAULT_MAX_FILE_SIZE {
        return Err(ExtractError::FileTooLarge(meta.len()));
    }

    let bytes = tokio::fs::read(path).await?;
    if format == DocumentFormat::Pdf {
        // pdf parsing is CPU-bound; keep it off the async workers
        return tokio::task::spawn_blocking(move || extract_bytes(&bytes, DocumentFormat::Pdf))
            .await
            .map_err(|e| ExtractError::Io(std::io::Error::other(e)))?;
    }
    extract_bytes(&bytes, format)
}
