//! Direct Gemini `generateContent` adapter.
//!
//! The whole request travels as one user turn: instruction parts first
//! (system text, then any inline images), then the content parts. This is
//! the layout the review prompts were written against.

use super::{GenerationParams, ModelEndpoint, ModelRequest, ModelResponse, Part};
use crate::error::EndpointError;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Calls `{base_url}/models/{model}:generateContent`.
pub struct GeminiEndpoint {
    client: reqwest::Client,
    base_url: String,
}

impl GeminiEndpoint {
    pub fn new(base_url: impl Into<String>, timeout_secs: u64) -> Result<Self, EndpointError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, model: &str) -> String {
        format!("{}/models/{}:generateContent", self.base_url, model)
    }
}

#[async_trait]
impl ModelEndpoint for GeminiEndpoint {
    async fn generate(
        &self,
        credential: &str,
        request: &ModelRequest,
    ) -> Result<ModelResponse, EndpointError> {
        let body = GenerateContentRequest::from(request);
        debug!(
            "Gemini call: model={} parts={} images={}",
            request.model,
            body.contents[0].parts.len(),
            request.image_count()
        );

        let response = self
            .client
            .post(self.url(&request.model))
            .header("x-goog-api-key", credential)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let raw = response.text().await.unwrap_or_default();
            return Err(status_error(status, &raw));
        }

        let parsed: GenerateContentResponse = response.json().await?;
        Ok(ModelResponse {
            text: parsed.text(),
        })
    }

    fn name(&self) -> &str {
        "gemini"
    }
}

/// Map a non-success HTTP answer to a typed error, preferring the API's own message.
fn status_error(status: StatusCode, raw: &str) -> EndpointError {
    let message = serde_json::from_str::<ErrorEnvelope>(raw)
        .map(|e| e.error.message)
        .unwrap_or_else(|_| raw.trim().to_string());
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => EndpointError::Auth { message },
        _ => EndpointError::Api {
            status: status.as_u16(),
            message,
        },
    }
}

// ── Wire types ───────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<WireContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<WireGenerationConfig>,
}

#[derive(Debug, Serialize)]
struct WireContent {
    role: &'static str,
    parts: Vec<WirePart>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum WirePart {
    Text {
        text: String,
    },
    Inline {
        #[serde(rename = "inlineData")]
        inline_data: WireInlineData,
    },
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WireInlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WireGenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
}

impl From<&ModelRequest> for GenerateContentRequest {
    fn from(req: &ModelRequest) -> Self {
        let parts = req
            .parts()
            .map(|p| match p {
                Part::Text(text) => WirePart::Text { text: text.clone() },
                Part::Image(img) => WirePart::Inline {
                    inline_data: WireInlineData {
                        mime_type: img.mime_type.clone(),
                        data: img.data.clone(),
                    },
                },
            })
            .collect();

        Self {
            contents: vec![WireContent { role: "user", parts }],
            generation_config: wire_generation(&req.generation),
        }
    }
}

fn wire_generation(g: &GenerationParams) -> Option<WireGenerationConfig> {
    if *g == GenerationParams::default() {
        return None;
    }
    Some(WireGenerationConfig {
        temperature: g.temperature,
        top_p: g.top_p,
        max_output_tokens: g.max_output_tokens,
    })
}

#[derive(Debug, Default, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<WireCandidate>,
}

#[derive(Debug, Deserialize)]
struct WireCandidate {
    content: Option<WireResponseContent>,
}

#[derive(Debug, Deserialize)]
struct WireResponseContent {
    #[serde(default)]
    parts: Vec<WireResponsePart>,
}

#[derive(Debug, Deserialize)]
struct WireResponsePart {
    text: Option<String>,
}

impl GenerateContentResponse {
    /// Concatenated text of the first candidate; empty when there is none.
    fn text(&self) -> String {
        self.candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map(|c| c.parts.iter().filter_map(|p| p.text.as_deref()).collect())
            .unwrap_or_default()
    }
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::InlineImage;

    #[test]
    fn request_body_is_single_user_turn() {
        let req = ModelRequest::new("gemini-2.5-flash")
            .instruction("You are an auditor.")
            .content("Check:\n\n---Document Content---\nbody")
            .generation(GenerationParams {
                temperature: Some(0.2),
                top_p: Some(0.95),
                max_output_tokens: Some(2000),
            });
        let json = serde_json::to_value(GenerateContentRequest::from(&req)).unwrap();

        assert_eq!(json["contents"].as_array().unwrap().len(), 1);
        assert_eq!(json["contents"][0]["role"], "user");
        assert_eq!(json["contents"][0]["parts"][0]["text"], "You are an auditor.");
        assert_eq!(json["generationConfig"]["topP"], serde_json::json!(0.95f32));
        assert_eq!(json["generationConfig"]["maxOutputTokens"], 2000);
    }

    #[test]
    fn images_serialise_as_inline_data() {
        let req = ModelRequest::new("m").instruction("ocr").image(InlineImage {
            mime_type: "image/png".into(),
            data: "iVBORw0".into(),
        });
        let json = serde_json::to_value(GenerateContentRequest::from(&req)).unwrap();
        let part = &json["contents"][0]["parts"][1];
        assert_eq!(part["inlineData"]["mimeType"], "image/png");
        assert_eq!(part["inlineData"]["data"], "iVBORw0");
        assert!(json.get("generationConfig").is_none());
    }

    #[test]
    fn response_text_joins_parts_of_first_candidate() {
        let raw = r#"{"candidates":[{"content":{"parts":[{"text":"Hello "},{"text":"world"}]}},
                      {"content":{"parts":[{"text":"ignored"}]}}]}"#;
        let parsed: GenerateContentResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.text(), "Hello world");
    }

    #[test]
    fn response_without_candidates_is_empty_text() {
        let parsed: GenerateContentResponse =
            serde_json::from_str(r#"{"promptFeedback":{"blockReason":"SAFETY"}}"#).unwrap();
        assert_eq!(parsed.text(), "");
    }

    #[test]
    fn forbidden_maps_to_auth_error() {
        let raw = r#"{"error":{"code":403,"message":"API key not valid.","status":"PERMISSION_DENIED"}}"#;
        let err = status_error(StatusCode::FORBIDDEN, raw);
        assert_eq!(
            err,
            EndpointError::Auth {
                message: "API key not valid.".into()
            }
        );
    }

    #[test]
    fn server_error_keeps_raw_body_when_not_json() {
        let err = status_error(StatusCode::BAD_GATEWAY, "upstream down\n");
        assert_eq!(
            err,
            EndpointError::Api {
                status: 502,
                message: "upstream down".into()
            }
        );
    }
}
