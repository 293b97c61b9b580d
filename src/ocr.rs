//! Vision OCR: page images → one consolidated transcription.
//!
//! All pages go out in a single request behind the fixed
//! [`OCR_INSTRUCTION`]; no retry is attempted. Deciding whether a large
//! page count needs confirmation is the caller's job
//! (see [`crate::session::ReviewSession::extract_text`]).

use crate::endpoint::{InlineImage, ModelEndpoint, ModelRequest};
use crate::error::ReviewError;
use crate::progress::ProgressCallback;
use crate::prompts::{NO_TEXT_EXTRACTED, OCR_INSTRUCTION};
use std::time::Instant;
use tracing::info;

/// Build the OCR request for `images`, in page order.
pub fn ocr_request(model: &str, images: Vec<InlineImage>) -> ModelRequest {
    images
        .into_iter()
        .fold(ModelRequest::new(model).instruction(OCR_INSTRUCTION), ModelRequest::image)
}

/// Transcribe `images` with one endpoint call.
///
/// An empty answer yields [`NO_TEXT_EXTRACTED`] rather than an error.
pub async fn run_ocr(
    endpoint: &dyn ModelEndpoint,
    credential: &str,
    model: &str,
    images: Vec<InlineImage>,
    observer: &ProgressCallback,
) -> Result<String, ReviewError> {
    if images.is_empty() {
        return Err(ReviewError::NoPagesSelected {
            range: String::new(),
            total: 0,
        });
    }
    let count = images.len();
    observer.on_ocr_start(count, model);
    info!("Sending {} images to {} via {}", count, model, endpoint.name());

    let request = ocr_request(model, images);
    let started = Instant::now();
    let response = endpoint
        .generate(credential, &request)
        .await
        .map_err(ReviewError::OcrFailure)?;

    let text = if response.text.is_empty() {
        NO_TEXT_EXTRACTED.to_string()
    } else {
        response.text
    };
    info!(
        "OCR returned {} chars in {:.2}s",
        text.len(),
        started.elapsed().as_secs_f64()
    );
    observer.on_ocr_complete(text.len());
    Ok(text)
}
