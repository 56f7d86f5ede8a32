use crate::config::Provider;
use crate::core::error::PromptgenError;
use crate::core::types::{GenerationRequest, Message, Role, TokenUsage};
use crate::registry::ModelDescriptor;
use serde_json::Value;

pub mod anthropic;
pub mod base_client;
pub mod factory;
pub mod gemini;
pub mod huggingface;
pub mod openai_compatible;
pub mod sse;

pub use base_client::{HttpClient, HttpReply, HttpStreamReply, Transport};
pub use factory::AdapterSet;

/// Everything needed to issue one provider call.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderHttpSpec {
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Value,
}

impl ProviderHttpSpec {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Provider response reduced to the fields every provider can supply.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderReply {
    pub content: String,
    pub model: Option<String>,
    pub usage: TokenUsage,
}

/// What one SSE `data:` payload contributed to a stream.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StreamEvent {
    pub text: Option<String>,
    pub usage: Option<TokenUsage>,
    pub done: bool,
}

impl StreamEvent {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Default::default()
        }
    }

    pub fn usage(usage: TokenUsage) -> Self {
        Self {
            usage: Some(usage),
            ..Default::default()
        }
    }

    pub fn done() -> Self {
        Self {
            done: true,
            ..Default::default()
        }
    }

    pub fn ignore() -> Self {
        Self::default()
    }
}

/// Maps generic requests onto one provider's wire format and back.
/// Implementations are pure; all I/O goes through [`Transport`].
pub trait ProviderAdapter: Send + Sync {
    fn provider(&self) -> Provider;

    fn build_request(
        &self,
        request: &GenerationRequest,
        model: &ModelDescriptor,
        api_key: &str,
        stream: bool,
    ) -> ProviderHttpSpec;

    fn parse_response(&self, raw: &Value) -> Result<ProviderReply, PromptgenError>;

    fn parse_stream_data(&self, data: &str) -> Result<StreamEvent, PromptgenError>;
}

/// System prompt, prior turns, then the prompt itself as the final user turn.
pub fn conversation_messages(request: &GenerationRequest) -> Vec<Message> {
    let mut messages = Vec::with_capacity(request.history.len() + 2);
    if let Some(system) = request.system_prompt.as_ref().filter(|s| !s.is_empty()) {
        messages.push(Message::new(Role::System, system.clone()));
    }
    messages.extend(request.history.iter().cloned());
    messages.push(Message::new(Role::User, request.prompt.clone()));
    messages
}

/// Best human-readable message out of an error body, whatever its shape.
pub fn error_message(body: &str) -> String {
    const MAX_LEN: usize = 500;

    if let Ok(parsed) = serde_json::from_str::<Value>(body) {
        let candidates = [
            parsed.pointer("/error/message"),
            parsed.get("error"),
            parsed.get("message"),
            parsed.pointer("/0/error/message"),
        ];
        for candidate in candidates.into_iter().flatten() {
            if let Some(text) = candidate.as_str() {
                return text.to_string();
            }
        }
    }

    let body = body.trim();
    if body.is_empty() {
        return "empty response body".to_string();
    }
    match body.char_indices().nth(MAX_LEN) {
        Some((idx, _)) => format!("{}...", &body[..idx]),
        None => body.to_string(),
    }
}

pub(crate) fn as_u64(value: Option<&Value>) -> u64 {
    value.and_then(Value::as_u64).unwrap_or(0)
}
