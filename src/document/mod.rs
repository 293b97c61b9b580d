//! Document rasterizer adapter: uploaded bytes → page images for OCR.
//!
//! ```text
//! source ──▶ render ──▶ encode
//! (sniff)    (pdfium)   (base64 PNG)
//! ```
//!
//! 1. [`source`] — decide whether the upload is a PDF or a single image
//! 2. [`render`] — rasterise selected PDF pages in `spawn_blocking`
//! 3. [`encode`] — base64-wrap each page for the endpoint request

pub mod encode;
pub mod render;
pub mod source;

pub use render::RenderOptions;
pub use source::{DocumentKind, SourceDocument};

use crate::endpoint::InlineImage;
use crate::error::ReviewError;
use crate::progress::ProgressCallback;
use tracing::info;

/// Number of pages in the document; an image counts as one page.
pub async fn page_count(doc: &SourceDocument) -> Result<usize, ReviewError> {
    match doc.kind() {
        DocumentKind::Pdf => render::load_document(doc.shared_bytes()).await,
        DocumentKind::Image { .. } => Ok(1),
    }
}

/// Produce one inline image per selected page, in page order.
///
/// Images are forwarded untouched; `pages` is ignored for them.
pub async fn rasterize(
    doc: &SourceDocument,
    pages: &[usize],
    options: RenderOptions,
    observer: ProgressCallback,
) -> Result<Vec<InlineImage>, ReviewError> {
    match doc.kind() {
        DocumentKind::Image { mime_type } => Ok(vec![encode::encode_bytes(doc.bytes(), mime_type)]),
        DocumentKind::Pdf => {
            let rendered = render::render_pages(doc.shared_bytes(), pages, options, observer).await?;
            let images = rendered
                .iter()
                .zip(pages)
                .map(|(img, &page)| {
                    encode::encode_page(img).map_err(|e| ReviewError::RasterisationFailed {
                        page,
                        detail: format!("Image encoding failed: {e}"),
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;
            info!("Rasterised {} pages of '{}'", images.len(), doc.name());
            Ok(images)
        }
    }
}
