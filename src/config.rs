//! Configuration types for a review session.
//!
//! Session-wide knobs live in [`ReviewConfig`], built via its
//! [`ReviewConfigBuilder`]. The quick-notes refinement settings are a
//! separate, persisted [`RefinementConfig`] because the user saves them
//! independently of everything else.

use crate::error::ReviewError;
use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;

/// Model used for OCR, stages and refinement unless overridden.
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";

/// Base URL of the Gemini REST API.
pub const DEFAULT_API_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Bounds the UI enforces on an agent's `max_output_tokens`.
pub const MAX_OUTPUT_TOKENS_RANGE: RangeInclusive<u32> = 100..=8192;

/// Models offered for OCR and per-agent selection.
pub const KNOWN_MODELS: &[&str] = &[
    "gemini-2.5-flash",
    "gemini-2.5-pro",
    "gemini-1.5-flash",
    "gemini-1.5-pro",
];

/// Whether `model` is one of [`KNOWN_MODELS`].
pub fn is_known_model(model: &str) -> bool {
    KNOWN_MODELS.contains(&model)
}

/// Configuration for a review session.
///
/// # Example
/// ```rust
/// use tfda_review::ReviewConfig;
///
/// let config = ReviewConfig::builder()
///     .ocr_model("gemini-2.5-pro")
///     .render_scale(1.5)
///     .build()
///     .unwrap();
/// assert_eq!(config.page_confirm_threshold, 20);
/// ```
#[derive(Debug, Clone)]
pub struct ReviewConfig {
    /// Vision model used by the OCR step. Default: `gemini-2.5-flash`.
    pub ocr_model: String,

    /// Page scale factor used when rasterising. Range: 0.5–4.0. Default: 2.0.
    ///
    /// 2.0 renders a US-letter page at roughly 1224 × 1584 px, sharp enough
    /// for small print in regulatory tables.
    pub render_scale: f32,

    /// Cap on either rendered dimension in pixels. Default: 4000.
    pub max_rendered_pixels: u32,

    /// Number of pages above which the caller must confirm before OCR. Default: 20.
    pub page_confirm_threshold: usize,

    /// Size of the initial page range offered after loading a PDF. Default: 5.
    pub default_page_window: usize,

    /// Base URL of the Gemini-compatible `generateContent` API.
    pub api_base_url: String,

    /// Per-call timeout in seconds. Default: 120.
    pub api_timeout_secs: u64,

    /// Route model calls through a named edgequake-llm provider
    /// (e.g. `"openai"`, `"ollama"`) instead of the direct Gemini endpoint.
    pub provider_name: Option<String>,
}

impl Default for ReviewConfig {
    fn default() -> Self {
        Self {
            ocr_model: DEFAULT_MODEL.to_string(),
            render_scale: 2.0,
            max_rendered_pixels: 4000,
            page_confirm_threshold: 20,
            default_page_window: 5,
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            api_timeout_secs: 120,
            provider_name: None,
        }
    }
}

impl ReviewConfig {
    /// Create a new builder for `ReviewConfig`.
    pub fn builder() -> ReviewConfigBuilder {
        ReviewConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`ReviewConfig`].
#[derive(Debug)]
pub struct ReviewConfigBuilder {
    config: ReviewConfig,
}

impl ReviewConfigBuilder {
    pub fn ocr_model(mut self, model: impl Into<String>) -> Self {
        self.config.ocr_model = model.into();
        self
    }

    pub fn render_scale(mut self, scale: f32) -> Self {
        self.config.render_scale = scale.clamp(0.5, 4.0);
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(256);
        self
    }

    pub fn page_confirm_threshold(mut self, pages: usize) -> Self {
        self.config.page_confirm_threshold = pages;
        self
    }

    pub fn default_page_window(mut self, pages: usize) -> Self {
        self.config.default_page_window = pages.max(1);
        self
    }

    pub fn api_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.api_base_url = url.into();
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ReviewConfig, ReviewError> {
        let c = &self.config;
        if c.ocr_model.trim().is_empty() {
            return Err(ReviewError::InvalidConfig("OCR model must not be empty".into()));
        }
        if !(c.api_base_url.starts_with("http://") || c.api_base_url.starts_with("https://")) {
            return Err(ReviewError::InvalidConfig(format!(
                "API base URL must be http(s), got '{}'",
                c.api_base_url
            )));
        }
        if c.api_timeout_secs == 0 {
            return Err(ReviewError::InvalidConfig("API timeout must be ≥ 1s".into()));
        }
        Ok(self.config)
    }
}

/// Settings for the quick-notes refinement call, persisted on explicit save.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefinementConfig {
    /// Instruction sent ahead of the notes text.
    pub prompt: String,
    /// Model used for refinement.
    pub model: String,
    /// Output-token cap for the refinement call.
    pub max_tokens: u32,
}

impl Default for RefinementConfig {
    fn default() -> Self {
        Self {
            prompt: "Clean up grammar and formatting. Make it concise.".to_string(),
            model: DEFAULT_MODEL.to_string(),
            max_tokens: 2000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_review_flow() {
        let c = ReviewConfig::default();
        assert_eq!(c.ocr_model, "gemini-2.5-flash");
        assert_eq!(c.render_scale, 2.0);
        assert_eq!(c.page_confirm_threshold, 20);
        assert_eq!(c.default_page_window, 5);
        assert!(c.provider_name.is_none());
    }

    #[test]
    fn default_models_are_known() {
        assert!(is_known_model(&ReviewConfig::default().ocr_model));
        assert!(is_known_model(&RefinementConfig::default().model));
        assert!(!is_known_model("gpt-4o"));
    }

    #[test]
    fn builder_clamps_scale() {
        let c = ReviewConfig::builder().render_scale(12.0).build().unwrap();
        assert_eq!(c.render_scale, 4.0);
        let c = ReviewConfig::builder().render_scale(0.1).build().unwrap();
        assert_eq!(c.render_scale, 0.5);
    }

    #[test]
    fn builder_rejects_bad_url() {
        let err = ReviewConfig::builder()
            .api_base_url("ftp://example.com")
            .build()
            .unwrap_err();
        assert!(matches!(err, ReviewError::InvalidConfig(_)));
    }

    #[test]
    fn builder_rejects_empty_model() {
        assert!(ReviewConfig::builder().ocr_model("  ").build().is_err());
    }

    #[test]
    fn refinement_config_uses_camel_case_slot_format() {
        let json = serde_json::to_value(RefinementConfig::default()).unwrap();
        assert_eq!(json["maxTokens"], 2000);
        assert_eq!(json["model"], "gemini-2.5-flash");
        let back: RefinementConfig = serde_json::from_value(json).unwrap();
        assert_eq!(back, RefinementConfig::default());
    }
}
