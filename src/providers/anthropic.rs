use crate::config::Provider;
use crate::core::error::PromptgenError;
use crate::core::types::{GenerationRequest, Role, TokenUsage};
use crate::providers::{
    ProviderAdapter, ProviderHttpSpec, ProviderReply, StreamEvent, as_u64, conversation_messages,
};
use crate::registry::ModelDescriptor;
use serde::{Deserialize, Serialize};
use serde_json::Value;

const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u32 = 1024;

#[derive(Serialize)]
struct AnthropicRequest {
    model: String,
    max_tokens: u32,
    messages: Vec<AnthropicMessage>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
}

#[derive(Serialize)]
struct AnthropicMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct AnthropicResponse {
    #[serde(default)]
    model: Option<String>,
    content: Vec<ContentBlock>,
    #[serde(default)]
    usage: Option<AnthropicUsage>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Deserialize)]
struct AnthropicUsage {
    #[serde(default)]
    input_tokens: u64,
    #[serde(default)]
    output_tokens: u64,
}

pub struct AnthropicAdapter;

impl ProviderAdapter for AnthropicAdapter {
    fn provider(&self) -> Provider {
        Provider::Anthropic
    }

    fn build_request(
        &self,
        request: &GenerationRequest,
        model: &ModelDescriptor,
        api_key: &str,
        stream: bool,
    ) -> ProviderHttpSpec {
        let all = conversation_messages(request);
        let system = all
            .iter()
            .find(|m| m.role == Role::System)
            .map(|m| m.content.clone());

        let messages = all
            .into_iter()
            .filter(|m| m.role != Role::System)
            .map(|m| AnthropicMessage {
                role: m.role.as_str().to_string(),
                content: m.content,
            })
            .collect();

        let payload = AnthropicRequest {
            model: model.upstream_name().to_string(),
            max_tokens: request.params.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            messages,
            stream,
            system,
            temperature: request.params.temperature,
            top_p: request.params.top_p,
        };

        ProviderHttpSpec {
            url: model.endpoint.clone(),
            headers: vec![
                ("x-api-key".to_string(), api_key.to_string()),
                (
                    "anthropic-version".to_string(),
                    ANTHROPIC_VERSION.to_string(),
                ),
            ],
            body: serde_json::to_value(payload).unwrap_or(Value::Null),
        }
    }

    fn parse_response(&self, raw: &Value) -> Result<ProviderReply, PromptgenError> {
        let parsed: AnthropicResponse = serde_json::from_value(raw.clone())
            .map_err(|e| PromptgenError::malformed("anthropic", e.to_string()))?;

        let content: String = parsed
            .content
            .iter()
            .filter(|block| block.kind == "text" || block.kind.is_empty())
            .filter_map(|block| block.text.as_deref())
            .collect();

        if parsed.content.is_empty() {
            return Err(PromptgenError::malformed(
                "anthropic",
                "Empty response from Anthropic",
            ));
        }

        let usage = parsed
            .usage
            .map(|u| TokenUsage::new(u.input_tokens, u.output_tokens, None))
            .unwrap_or_default();

        Ok(ProviderReply {
            content,
            model: parsed.model,
            usage,
        })
    }

    fn parse_stream_data(&self, data: &str) -> Result<StreamEvent, PromptgenError> {
        let parsed: Value = match serde_json::from_str(data) {
            Ok(v) => v,
            Err(_) => return Ok(StreamEvent::ignore()),
        };

        match parsed["type"].as_str().unwrap_or_default() {
            "message_start" => {
                let usage = &parsed["message"]["usage"];
                Ok(StreamEvent::usage(TokenUsage::new(
                    as_u64(usage.get("input_tokens")),
                    as_u64(usage.get("output_tokens")),
                    None,
                )))
            }
            "content_block_delta" if parsed["delta"]["type"] == "text_delta" => {
                match parsed["delta"]["text"].as_str() {
                    Some(text) if !text.is_empty() => Ok(StreamEvent::text(text)),
                    _ => Ok(StreamEvent::ignore()),
                }
            }
            "message_delta" => Ok(StreamEvent::usage(TokenUsage::new(
                0,
                as_u64(parsed["usage"].get("output_tokens")),
                None,
            ))),
            "message_stop" => Ok(StreamEvent::done()),
            "error" => {
                let message = parsed["error"]["message"]
                    .as_str()
                    .unwrap_or("unknown error");
                Err(PromptgenError::Stream(format!(
                    "Anthropic stream error: {}",
                    message
                )))
            }
            _ => Ok(StreamEvent::ignore()),
        }
    }
}
