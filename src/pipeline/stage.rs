//! Invocation of a single agent stage.
//!
//! A stage never fails from the engine's point of view: an endpoint error is
//! turned into the stage's output text and logged like any other result.

use super::log::estimate_tokens;
use crate::agents::AgentDefinition;
use crate::endpoint::{GenerationParams, ModelEndpoint, ModelRequest};
use crate::prompts::stage_content;
use std::time::Instant;
use tracing::{debug, warn};

/// What one stage produced.
#[derive(Debug, Clone, PartialEq)]
pub struct StageOutcome {
    pub output: String,
    pub tokens: u64,
    pub latency_seconds: f64,
    pub failed: bool,
}

/// Build the request an agent sends for `input`.
pub fn stage_request(agent: &AgentDefinition, input: &str) -> ModelRequest {
    ModelRequest::new(&agent.model_id)
        .instruction(&agent.system_instruction)
        .content(stage_content(&agent.user_prefix, input))
        .generation(GenerationParams {
            temperature: Some(agent.temperature),
            top_p: Some(agent.top_p),
            max_output_tokens: Some(agent.max_output_tokens),
        })
}

/// Run `agent` against `input`.
///
/// Latency covers the endpoint call whether or not it succeeded.
pub async fn invoke_stage(
    endpoint: &dyn ModelEndpoint,
    credential: &str,
    agent: &AgentDefinition,
    input: &str,
) -> StageOutcome {
    let request = stage_request(agent, input);
    let started = Instant::now();
    let result = endpoint.generate(credential, &request).await;
    let latency_seconds = started.elapsed().as_secs_f64();

    match result {
        Ok(response) => {
            let tokens = estimate_tokens(
                &agent.system_instruction,
                &agent.user_prefix,
                input,
                &response.text,
            );
            debug!(
                "Agent {} returned {} chars in {:.2}s (~{} tokens)",
                agent.id,
                response.text.len(),
                latency_seconds,
                tokens
            );
            StageOutcome {
                output: response.text,
                tokens,
                latency_seconds,
                failed: false,
            }
        }
        Err(e) => {
            warn!("Agent {} failed after {:.2}s: {}", agent.id, latency_seconds, e);
            StageOutcome {
                output: format!("Error executing agent {}: {}", agent.name, e),
                tokens: 0,
                latency_seconds,
                failed: true,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::default_agents;
    use crate::endpoint::mock::{MockEndpoint, MockReply};
    use crate::endpoint::Part;
    use crate::error::EndpointError;

    #[test]
    fn request_carries_agent_configuration() {
        let agent = &default_agents()[1];
        let req = stage_request(agent, "label text");
        assert_eq!(req.model, agent.model_id);
        assert_eq!(req.instruction_parts, vec![Part::Text(agent.system_instruction.clone())]);
        assert_eq!(
            req.content_parts[0].as_text(),
            Some(format!("{}\n\n---Document Content---\nlabel text", agent.user_prefix).as_str())
        );
        assert_eq!(req.generation.temperature, Some(0.2));
        assert_eq!(req.generation.top_p, Some(0.95));
        assert_eq!(req.generation.max_output_tokens, Some(2000));
    }

    #[tokio::test]
    async fn success_estimates_tokens() {
        let agent = &default_agents()[0];
        let mock = MockEndpoint::scripted([MockReply::Text("summary".into())]);
        let out = invoke_stage(&mock, "key", agent, "doc").await;
        assert!(!out.failed);
        assert_eq!(out.output, "summary");
        assert_eq!(
            out.tokens,
            estimate_tokens(&agent.system_instruction, &agent.user_prefix, "doc", "summary")
        );
        assert!(out.latency_seconds >= 0.0);
    }

    #[tokio::test]
    async fn failure_becomes_text_with_zero_tokens() {
        let agent = &default_agents()[2];
        let mock = MockEndpoint::scripted([MockReply::Fail(EndpointError::Api {
            status: 500,
            message: "backend unavailable".into(),
        })]);
        let out = invoke_stage(&mock, "key", agent, "doc").await;
        assert!(out.failed);
        assert_eq!(out.tokens, 0);
        assert!(out.output.starts_with(&format!("Error executing agent {}: ", agent.name)));
        assert!(out.output.contains("backend unavailable"));
    }

    #[tokio::test]
    async fn empty_output_is_kept_empty() {
        let agent = &default_agents()[0];
        let mock = MockEndpoint::scripted([MockReply::Text(String::new())]);
        let out = invoke_stage(&mock, "key", agent, "doc").await;
        assert_eq!(out.output, "");
        assert!(!out.failed);
    }
}
