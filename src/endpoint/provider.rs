//! edgequake-llm adapter: route calls through any configured provider.
//!
//! Agents may name different models, so one provider instance is created per
//! model on first use and cached. Provider credentials come from the
//! provider's own environment variables (`OPENAI_API_KEY`, …); the session
//! credential still gates every run but is not forwarded.

use super::{ModelEndpoint, ModelRequest, ModelResponse, Part};
use crate::error::EndpointError;
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMProvider, ProviderFactory};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::debug;

pub struct ProviderEndpoint {
    provider_name: String,
    providers: Mutex<HashMap<String, Arc<dyn LLMProvider>>>,
}

impl ProviderEndpoint {
    pub fn new(provider_name: impl Into<String>) -> Self {
        Self {
            provider_name: provider_name.into(),
            providers: Mutex::new(HashMap::new()),
        }
    }

    fn provider_for(&self, model: &str) -> Result<Arc<dyn LLMProvider>, EndpointError> {
        let mut cache = self
            .providers
            .lock()
            .map_err(|_| EndpointError::Provider("provider cache poisoned".into()))?;
        if let Some(p) = cache.get(model) {
            return Ok(Arc::clone(p));
        }
        let provider = ProviderFactory::create_llm_provider(&self.provider_name, model)
            .map_err(|e| EndpointError::Provider(format!("{}: {e}", self.provider_name)))?;
        cache.insert(model.to_string(), Arc::clone(&provider));
        Ok(provider)
    }
}

/// Instruction text becomes the system message; content text and any images
/// become the user message.
fn build_messages(request: &ModelRequest) -> Vec<ChatMessage> {
    let system: Vec<&str> = request
        .instruction_parts
        .iter()
        .filter_map(Part::as_text)
        .collect();
    let user: Vec<&str> = request.content_parts.iter().filter_map(Part::as_text).collect();
    let images: Vec<ImageData> = request
        .parts()
        .filter_map(|p| match p {
            Part::Image(img) => {
                Some(ImageData::new(img.data.clone(), img.mime_type.as_str()).with_detail("high"))
            }
            Part::Text(_) => None,
        })
        .collect();

    let mut messages = Vec::with_capacity(2);
    if !system.is_empty() {
        messages.push(ChatMessage::system(system.join("\n\n")));
    }
    if images.is_empty() {
        messages.push(ChatMessage::user(user.join("\n\n")));
    } else {
        messages.push(ChatMessage::user_with_images(user.join("\n\n"), images));
    }
    messages
}

fn build_options(request: &ModelRequest) -> CompletionOptions {
    CompletionOptions {
        temperature: request.generation.temperature,
        top_p: request.generation.top_p,
        max_tokens: request.generation.max_output_tokens.map(|n| n as usize),
        ..Default::default()
    }
}

#[async_trait]
impl ModelEndpoint for ProviderEndpoint {
    async fn generate(
        &self,
        _credential: &str,
        request: &ModelRequest,
    ) -> Result<ModelResponse, EndpointError> {
        let provider = self.provider_for(&request.model)?;
        let messages = build_messages(request);
        let options = build_options(request);

        let response = provider
            .chat(&messages, Some(&options))
            .await
            .map_err(|e| EndpointError::Provider(e.to_string()))?;

        debug!(
            "{} call: model={} {} input tokens, {} output tokens",
            self.provider_name, request.model, response.prompt_tokens, response.completion_tokens
        );

        Ok(ModelResponse {
            text: response.content,
        })
    }

    fn name(&self) -> &str {
        &self.provider_name
    }
}
