//! The external model endpoint: one request/response contract shared by the
//! OCR step, every pipeline stage and the notes refinement.
//!
//! ```text
//! ModelRequest { model, instruction_parts: [text | image], content_parts: [text], generation }
//!        │
//!        ▼
//! ModelEndpoint::generate ──▶ ModelResponse { text }   (text may be empty)
//! ```
//!
//! Three adapters implement [`ModelEndpoint`]:
//!
//! - [`gemini::GeminiEndpoint`] — direct `generateContent` REST call with the
//!   session credential
//! - [`provider::ProviderEndpoint`] — any edgequake-llm provider
//! - [`mock::MockEndpoint`] — in-process, deterministic; used by tests and
//!   the CLI's `--dry-run`

pub mod gemini;
pub mod mock;
pub mod provider;

use crate::error::EndpointError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A base64-encoded image attached inline to a request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InlineImage {
    pub mime_type: String,
    /// Standard base64, no data-URI prefix.
    pub data: String,
}

/// One part of a request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Part {
    Text(String),
    Image(InlineImage),
}

impl Part {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Part::Text(t) => Some(t),
            Part::Image(_) => None,
        }
    }
}

/// Optional sampling parameters; `None` leaves the endpoint default.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationParams {
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    pub max_output_tokens: Option<u32>,
}

/// A single model call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelRequest {
    pub model: String,
    pub instruction_parts: Vec<Part>,
    pub content_parts: Vec<Part>,
    pub generation: GenerationParams,
}

impl ModelRequest {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            instruction_parts: Vec::new(),
            content_parts: Vec::new(),
            generation: GenerationParams::default(),
        }
    }

    pub fn instruction(mut self, text: impl Into<String>) -> Self {
        self.instruction_parts.push(Part::Text(text.into()));
        self
    }

    pub fn image(mut self, image: InlineImage) -> Self {
        self.instruction_parts.push(Part::Image(image));
        self
    }

    pub fn content(mut self, text: impl Into<String>) -> Self {
        self.content_parts.push(Part::Text(text.into()));
        self
    }

    pub fn generation(mut self, generation: GenerationParams) -> Self {
        self.generation = generation;
        self
    }

    /// All parts in wire order: instruction parts first, then content parts.
    pub fn parts(&self) -> impl Iterator<Item = &Part> {
        self.instruction_parts.iter().chain(self.content_parts.iter())
    }

    /// Number of inline images carried by the request.
    pub fn image_count(&self) -> usize {
        self.parts().filter(|p| matches!(p, Part::Image(_))).count()
    }
}

/// The endpoint's answer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelResponse {
    pub text: String,
}

/// A language-model endpoint.
///
/// Implementations must not retry; the caller decides how a failure is
/// surfaced.
#[async_trait]
pub trait ModelEndpoint: Send + Sync {
    /// Issue one call.
    async fn generate(
        &self,
        credential: &str,
        request: &ModelRequest,
    ) -> Result<ModelResponse, EndpointError>;

    /// Short name used in logs.
    fn name(&self) -> &str;
}
