//! Uploaded document: raw bytes plus what kind of document they are.
//!
//! The kind is decided from magic bytes, never from the file extension: a
//! PDF starts with `%PDF`, images are recognised by the `image` crate's
//! format sniffing. A PNG or JPEG upload is a one-page document that skips
//! rasterisation entirely.

use crate::error::ReviewError;
use image::ImageFormat;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// What the uploaded bytes contain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentKind {
    Pdf,
    Image { mime_type: &'static str },
}

/// An uploaded document, cheap to clone.
#[derive(Debug, Clone)]
pub struct SourceDocument {
    name: String,
    kind: DocumentKind,
    bytes: Arc<Vec<u8>>,
}

impl SourceDocument {
    /// Wrap in-memory bytes, rejecting anything that is not a PDF, PNG or JPEG.
    pub fn from_bytes(name: impl Into<String>, bytes: Vec<u8>) -> Result<Self, ReviewError> {
        let name = name.into();
        let kind = sniff(&bytes).ok_or_else(|| ReviewError::UnsupportedDocument { name: name.clone() })?;
        debug!("Document '{}' sniffed as {:?} ({} bytes)", name, kind, bytes.len());
        Ok(Self {
            name,
            kind,
            bytes: Arc::new(bytes),
        })
    }

    /// Read a document from disk.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, ReviewError> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| ReviewError::DocumentLoadFailure {
                detail: format!("{}: {e}", path.display()),
            })?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Self::from_bytes(name, bytes)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &DocumentKind {
        &self.kind
    }

    pub fn is_pdf(&self) -> bool {
        self.kind == DocumentKind::Pdf
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub(crate) fn shared_bytes(&self) -> Arc<Vec<u8>> {
        Arc::clone(&self.bytes)
    }
}

/// Identify a document from its leading bytes.
pub fn sniff(bytes: &[u8]) -> Option<DocumentKind> {
    if bytes.starts_with(b"%PDF") {
        return Some(DocumentKind::Pdf);
    }
    match image::guess_format(bytes).ok()? {
        ImageFormat::Png => Some(DocumentKind::Image {
            mime_type: "image/png",
        }),
        ImageFormat::Jpeg => Some(DocumentKind::Image {
            mime_type: "image/jpeg",
        }),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG_MAGIC: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0];
    const JPEG_MAGIC: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0, 0x10];

    #[test]
    fn sniff_pdf() {
        assert_eq!(sniff(b"%PDF-1.7\n..."), Some(DocumentKind::Pdf));
    }

    #[test]
    fn sniff_images() {
        assert_eq!(
            sniff(PNG_MAGIC),
            Some(DocumentKind::Image {
                mime_type: "image/png"
            })
        );
        assert_eq!(
            sniff(JPEG_MAGIC),
            Some(DocumentKind::Image {
                mime_type: "image/jpeg"
            })
        );
    }

    #[test]
    fn plain_text_is_rejected() {
        let err = SourceDocument::from_bytes("notes.txt", b"hello".to_vec()).unwrap_err();
        assert!(matches!(err, ReviewError::UnsupportedDocument { .. }));
    }

    #[tokio::test]
    async fn open_missing_file_is_load_failure() {
        let err = SourceDocument::open("/definitely/not/here.pdf").await.unwrap_err();
        assert!(matches!(err, ReviewError::DocumentLoadFailure { .. }));
    }
}
