//! In-process endpoint with scripted or echoed replies.
//!
//! Every call is recorded so callers can inspect exactly what would have
//! been sent. Scripted replies are consumed in order; once the script is
//! exhausted the endpoint echoes the request's content text, tagged with the
//! model id, which keeps chained pipeline runs deterministic.

use super::{ModelEndpoint, ModelRequest, ModelResponse, Part};
use crate::error::EndpointError;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

/// One scripted reply.
#[derive(Debug, Clone)]
pub enum MockReply {
    Text(String),
    Fail(EndpointError),
    /// Panic inside the call, simulating a broken endpoint implementation.
    Panic(String),
}

#[derive(Debug, Default)]
pub struct MockEndpoint {
    script: Mutex<VecDeque<MockReply>>,
    calls: Mutex<Vec<ModelRequest>>,
}

impl MockEndpoint {
    /// Echo every request.
    pub fn echo() -> Self {
        Self::default()
    }

    /// Play `replies` in order, then fall back to echoing.
    pub fn scripted(replies: impl IntoIterator<Item = MockReply>) -> Self {
        Self {
            script: Mutex::new(replies.into_iter().collect()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Requests received so far, in call order.
    pub fn calls(&self) -> Vec<ModelRequest> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().map(|c| c.len()).unwrap_or(0)
    }

    fn echo_text(request: &ModelRequest) -> String {
        let content: Vec<&str> = request.content_parts.iter().filter_map(Part::as_text).collect();
        format!("[{}] {}", request.model, content.join("\n"))
    }
}

#[async_trait]
impl ModelEndpoint for MockEndpoint {
    async fn generate(
        &self,
        _credential: &str,
        request: &ModelRequest,
    ) -> Result<ModelResponse, EndpointError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(request.clone());
        }
        let next = self.script.lock().ok().and_then(|mut s| s.pop_front());

        match next {
            Some(MockReply::Text(text)) => Ok(ModelResponse { text }),
            Some(MockReply::Fail(err)) => Err(err),
            Some(MockReply::Panic(msg)) => panic!("{msg}"),
            None => Ok(ModelResponse {
                text: Self::echo_text(request),
            }),
        }
    }

    fn name(&self) -> &str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn script_then_echo() {
        let ep = MockEndpoint::scripted([MockReply::Text("first".into())]);
        let req = ModelRequest::new("m").content("abc");

        assert_eq!(ep.generate("k", &req).await.unwrap().text, "first");
        assert_eq!(ep.generate("k", &req).await.unwrap().text, "[m] abc");
        assert_eq!(ep.call_count(), 2);
    }

    #[tokio::test]
    async fn scripted_failure_is_returned() {
        let ep = MockEndpoint::scripted([MockReply::Fail(EndpointError::Transport("down".into()))]);
        let err = ep.generate("k", &ModelRequest::new("m")).await.unwrap_err();
        assert_eq!(err, EndpointError::Transport("down".into()));
    }
}
