//! Raw text extraction for source documents.
//!
//! Ingestion reads PDFs and plain-text files; this module turns their bytes
//! into plain UTF-8 text. Extraction failures are errors for the caller to
//! log and skip — a bad document must never abort a whole ingestion run.

use std::path::Path;

use anyhow::{Context, Result};

/// Extract text from PDF bytes.
///
/// Returns `Ok(None)` when the PDF parses but yields no extractable text
/// (scanned images, empty pages); that is a skip, not an error.
pub fn extract_pdf_text(bytes: &[u8]) -> Result<Option<String>> {
    let text = pdf_extract::extract_text_from_mem(bytes)
        .map_err(|e| anyhow::anyhow!("PDF text extraction failed: {}", e))?;
    if text.trim().is_empty() {
        Ok(None)
    } else {
        Ok(Some(text))
    }
}

/// Read a plain-text file, tolerating invalid UTF-8 byte sequences.
pub fn read_txt_file(path: &Path) -> Result<String> {
    let bytes =
        std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_pdf_is_an_error() {
        assert!(extract_pdf_text(b"not a pdf").is_err());
    }

    #[test]
    fn txt_read_tolerates_invalid_utf8() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, b"hello \xff world").unwrap();
        let text = read_txt_file(&path).unwrap();
        assert!(text.starts_with("hello "));
        assert!(text.ends_with(" world"));
    }

    #[test]
    fn missing_txt_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(read_txt_file(&dir.path().join("gone.txt")).is_err());
    }
}
