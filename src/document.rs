//! Loading document files as plain text

use std::path::Path;

use tracing::debug;

use crate::error::{Error, Result};

/// Read a document into text. PDFs need the `pdf` feature.
pub async fn load_document(path: impl AsRef<Path>) -> Result<String> {
    let path = path.as_ref();
    if !tokio::fs::try_exists(path).await.unwrap_or(false) {
        return Err(Error::invalid_input(format!(
            "File not found: {}",
            path.display()
        )));
    }

    let is_pdf = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));

    let text = if is_pdf {
        load_pdf(path).await?
    } else {
        let bytes = tokio::fs::read(path).await?;
        String::from_utf8(bytes).map_err(|_| {
            Error::invalid_input(format!("{} is not UTF-8 text", path.display()))
        })?
    };

    debug!(path = %path.display(), chars = text.chars().count(), "loaded document");
    Ok(text)
}

#[cfg(feature = "pdf")]
async fn load_pdf(path: &Path) -> Result<String> {
    let owned = path.to_path_buf();
    tokio::task::spawn_blocking(move || pdf_extract::extract_text(&owned))
        .await
        .map_err(|e| Error::invalid_input(format!("PDF extraction aborted: {}", e)))?
        .map_err(|e| Error::invalid_input(format!("Could not read PDF {}: {}", path.display(), e)))
}

#[cfg(not(feature = "pdf"))]
async fn load_pdf(path: &Path) -> Result<String> {
    Err(Error::invalid_input(format!(
        "{} is a PDF; rebuild with the `pdf` feature to ingest it",
        path.display()
    )))
}
