//! Single-shot text refinement for the notes buffer.

use crate::config::{RefinementConfig, DEFAULT_MODEL};
use crate::endpoint::{GenerationParams, ModelEndpoint, ModelRequest};
use crate::error::ReviewError;
use crate::prompts::{refinement_content, REFINEMENT_TEMPERATURE};
use tracing::{debug, info};

/// Used when the stored configuration carries a zero token limit.
const FALLBACK_MAX_TOKENS: u32 = 2000;

pub fn refinement_request(text: &str, prompt: &str, config: &RefinementConfig) -> ModelRequest {
    let model = if config.model.trim().is_empty() {
        DEFAULT_MODEL
    } else {
        config.model.as_str()
    };
    let max_tokens = if config.max_tokens == 0 {
        FALLBACK_MAX_TOKENS
    } else {
        config.max_tokens
    };
    ModelRequest::new(model)
        .content(refinement_content(prompt, text))
        .generation(GenerationParams {
            temperature: Some(REFINEMENT_TEMPERATURE),
            top_p: None,
            max_output_tokens: Some(max_tokens),
        })
}

/// Rewrite `text` according to `prompt`.
///
/// A credential is required even for blank input, which is then returned
/// as-is without a call. An empty answer leaves the original text unchanged.
pub async fn refine_text(
    endpoint: &dyn ModelEndpoint,
    credential: &str,
    text: &str,
    prompt: &str,
    config: &RefinementConfig,
) -> Result<String, ReviewError> {
    if credential.trim().is_empty() {
        return Err(ReviewError::MissingCredential);
    }
    if text.trim().is_empty() {
        return Ok(text.to_string());
    }

    let request = refinement_request(text, prompt, config);
    info!("Refining {} chars with {}", text.len(), request.model);
    let response = endpoint
        .generate(credential, &request)
        .await
        .map_err(ReviewError::RefinementFailed)?;

    if response.text.is_empty() {
        debug!("Refinement returned no text; keeping original");
        Ok(text.to_string())
    } else {
        Ok(response.text)
    }
}
