use std::path::PathBuf;

use crate::error::DocumentError;

/// Where the PDF Reader gets its document from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PdfSource {
    Local(PathBuf),
    Url(String),
}

pub async fn fetch_pdf(http: &reqwest::Client, url: &str) -> Result<Vec<u8>, DocumentError> {
    tracing::info!(%url, "fetching PDF");

    let response = http
        .get(url)
        .send()
        .await
        .map_err(|e| DocumentError::Fetch(e.to_string()))?;

    if !response.status().is_success() {
        return Err(DocumentError::HttpStatus(response.status().as_u16()));
    }

    let bytes = response
        .bytes()
        .await
        .map_err(|e| DocumentError::Fetch(e.to_string()))?;
    Ok(bytes.to_vec())
}

pub async fn load_pdf_bytes(http: &reqwest::Client, source: &PdfSource) -> Result<Vec<u8>, DocumentError> {
    match source {
        PdfSource::Local(path) => tokio::fs::read(path).await.map_err(|e| DocumentError::Read {
            path: path.display().to_string(),
            reason: e.to_string(),
        }),
        PdfSource::Url(url) => fetch_pdf(http, url.trim()).await,
    }
}

/// Concatenated text of every page. Runs on the blocking pool; a panic inside
/// the parser is reported as an unreadable document.
pub async fn extract_text(bytes: Vec<u8>) -> Result<String, DocumentError> {
    let text = tokio::task::spawn_blocking(move || pdf_extract::extract_text_from_mem(&bytes))
        .await
        .map_err(|e| DocumentError::Unreadable(e.to_string()))?
        .map_err(|e| DocumentError::Unreadable(e.to_string()))?;

    if text.trim().is_empty() {
        return Err(DocumentError::NoContent);
    }

    tracing::debug!(chars = text.len(), "extracted PDF text");
    Ok(text)
}

pub async fn read_pdf(http: &reqwest::Client, source: &PdfSource) -> Result<String, DocumentError> {
    let bytes = load_pdf_bytes(http, source).await?;
    extract_text(bytes).await
}
