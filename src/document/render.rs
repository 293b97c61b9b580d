//! PDF rasterisation via pdfium.
//!
//! ## Why spawn_blocking?
//!
//! pdfium is a C++ library with thread-local state and CPU-heavy rendering.
//! `tokio::task::spawn_blocking` keeps it off the async worker threads.
//! Each call binds, loads and renders inside one blocking task because the
//! `Pdfium` handle and the documents it opens cannot cross an `.await`.

use crate::error::ReviewError;
use crate::progress::ProgressCallback;
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::sync::Arc;
use tracing::{debug, info};

/// Rendering parameters for one batch of pages.
#[derive(Debug, Clone, Copy)]
pub struct RenderOptions {
    /// Page scale factor (1.0 = 72 DPI).
    pub scale: f32,
    /// Cap on either dimension in pixels.
    pub max_pixels: u32,
}

/// Open the document and report its page count.
pub async fn load_document(bytes: Arc<Vec<u8>>) -> Result<usize, ReviewError> {
    tokio::task::spawn_blocking(move || {
        let pdfium = bind_pdfium()?;
        let document = open(&pdfium, &bytes)?;
        let total = document.pages().len() as usize;
        info!("PDF loaded: {} pages", total);
        Ok(total)
    })
    .await
    .map_err(|e| ReviewError::Internal(format!("Load task panicked: {e}")))?
}

/// Rasterise the given 1-based pages, in order.
///
/// `observer.on_render_page` fires before each page is drawn.
pub async fn render_pages(
    bytes: Arc<Vec<u8>>,
    pages: &[usize],
    options: RenderOptions,
    observer: ProgressCallback,
) -> Result<Vec<DynamicImage>, ReviewError> {
    let pages = pages.to_vec();
    tokio::task::spawn_blocking(move || render_pages_blocking(&bytes, &pages, options, &observer))
        .await
        .map_err(|e| ReviewError::Internal(format!("Render task panicked: {e}")))?
}

fn render_pages_blocking(
    bytes: &[u8],
    pages: &[usize],
    options: RenderOptions,
    observer: &ProgressCallback,
) -> Result<Vec<DynamicImage>, ReviewError> {
    let pdfium = bind_pdfium()?;
    let document = open(&pdfium, bytes)?;
    let doc_pages = document.pages();
    let total_pages = doc_pages.len() as usize;

    let render_config = PdfRenderConfig::new()
        .scale_page_by_factor(options.scale)
        .set_maximum_width(options.max_pixels as i32)
        .set_maximum_height(options.max_pixels as i32);

    let mut images = Vec::with_capacity(pages.len());
    for (i, &page_num) in pages.iter().enumerate() {
        if page_num == 0 || page_num > total_pages {
            return Err(ReviewError::RasterisationFailed {
                page: page_num,
                detail: format!("out of range (document has {total_pages} pages)"),
            });
        }
        observer.on_render_page(page_num, i + 1, pages.len());

        let page = doc_pages
            .get((page_num - 1) as u16)
            .map_err(|e| ReviewError::RasterisationFailed {
                page: page_num,
                detail: format!("{e:?}"),
            })?;
        let bitmap = page
            .render_with_config(&render_config)
            .map_err(|e| ReviewError::RasterisationFailed {
                page: page_num,
                detail: format!("{e:?}"),
            })?;

        let image = bitmap.as_image();
        debug!(
            "Rendered page {} → {}x{} px",
            page_num,
            image.width(),
            image.height()
        );
        images.push(image);
    }

    Ok(images)
}

fn open<'a>(pdfium: &'a Pdfium, bytes: &'a [u8]) -> Result<PdfDocument<'a>, ReviewError> {
    pdfium
        .load_pdf_from_byte_slice(bytes, None)
        .map_err(|e| ReviewError::DocumentLoadFailure {
            detail: format!("{e:?}"),
        })
}

/// Bind to pdfium: `PDFIUM_LIB_PATH` if set, else a copy next to the
/// working directory, else the system library.
fn bind_pdfium() -> Result<Pdfium, ReviewError> {
    let bindings = match std::env::var("PDFIUM_LIB_PATH") {
        Ok(path) if !path.is_empty() => Pdfium::bind_to_library(&path),
        _ => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
            .or_else(|_| Pdfium::bind_to_system_library()),
    }
    .map_err(|e| ReviewError::PdfiumBindingFailed(format!("{e:?}")))?;
    Ok(Pdfium::new(bindings))
}
