use crate::config::Provider;
use crate::core::error::PromptgenError;
use crate::core::types::{GenerationRequest, Role, TokenUsage};
use crate::providers::{
    ProviderAdapter, ProviderHttpSpec, ProviderReply, StreamEvent, conversation_messages,
};
use crate::registry::ModelDescriptor;
use serde_json::Value;

mod types;

use types::*;

/// Google Generative Language API. The key travels in the `x-goog-api-key`
/// header and the streaming variant uses a different method on the same
/// model path.
pub struct GeminiAdapter;

impl GeminiAdapter {
    fn build_payload(request: &GenerationRequest) -> GeminiRequest {
        let mut contents = Vec::new();
        let mut system_instruction = None;

        for message in conversation_messages(request) {
            match message.role {
                Role::System => {
                    if system_instruction.is_none() {
                        system_instruction = Some(SystemInstruction {
                            parts: vec![GeminiPart {
                                text: message.content,
                            }],
                        });
                    }
                }
                Role::User | Role::Assistant => {
                    let role = if message.role == Role::User { "user" } else { "model" };
                    contents.push(GeminiContentPart {
                        role: role.to_string(),
                        parts: vec![GeminiPart {
                            text: message.content,
                        }],
                    });
                }
            }
        }

        let params = &request.params;
        GeminiRequest {
            contents,
            system_instruction,
            generation_config: GenerationConfig {
                temperature: params.temperature,
                max_output_tokens: params.max_tokens,
                top_p: params.top_p,
                frequency_penalty: params.frequency_penalty,
                presence_penalty: params.presence_penalty,
            },
        }
    }
}

fn usage_from(metadata: Option<&UsageMetadata>) -> TokenUsage {
    metadata
        .map(|u| {
            TokenUsage::new(
                u.prompt_token_count,
                u.candidates_token_count,
                u.total_token_count,
            )
        })
        .unwrap_or_default()
}

impl ProviderAdapter for GeminiAdapter {
    fn provider(&self) -> Provider {
        Provider::Gemini
    }

    fn build_request(
        &self,
        request: &GenerationRequest,
        model: &ModelDescriptor,
        api_key: &str,
        stream: bool,
    ) -> ProviderHttpSpec {
        let url = if stream {
            format!("{}:streamGenerateContent?alt=sse", model.endpoint)
        } else {
            format!("{}:generateContent", model.endpoint)
        };

        ProviderHttpSpec {
            url,
            headers: vec![("x-goog-api-key".to_string(), api_key.to_string())],
            body: serde_json::to_value(Self::build_payload(request)).unwrap_or(Value::Null),
        }
    }

    fn parse_response(&self, raw: &Value) -> Result<ProviderReply, PromptgenError> {
        let parsed: GeminiResponse = serde_json::from_value(raw.clone()).map_err(|e| {
            PromptgenError::malformed("gemini", format!("Failed to parse Gemini response: {}", e))
        })?;

        let content = parsed
            .text()
            .ok_or_else(|| PromptgenError::malformed("gemini", "No valid response from Gemini"))?;

        Ok(ProviderReply {
            content,
            model: parsed.model_version.clone(),
            usage: usage_from(parsed.usage_metadata.as_ref()),
        })
    }

    fn parse_stream_data(&self, data: &str) -> Result<StreamEvent, PromptgenError> {
        let parsed: Value = serde_json::from_str(data).map_err(|e| {
            PromptgenError::Stream(format!("Failed to parse stream data: {}", e))
        })?;

        if let Some(message) = parsed.pointer("/error/message").and_then(Value::as_str) {
            return Err(PromptgenError::Stream(format!(
                "Gemini stream error: {}",
                message
            )));
        }

        let chunk: GeminiResponse = serde_json::from_value(parsed)
            .map_err(|e| PromptgenError::Stream(format!("Unexpected Gemini chunk: {}", e)))?;

        Ok(StreamEvent {
            text: chunk.text().filter(|t| !t.is_empty()),
            usage: chunk.usage_metadata.as_ref().map(|u| usage_from(Some(u))),
            done: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Message;
    use crate::registry::ModelRegistry;
    use serde_json::json;

    fn flash() -> ModelDescriptor {
        ModelRegistry::builtin()
            .get_model("gemini-2-0-flash")
            .unwrap()
            .clone()
    }

    #[test]
    fn key_goes_in_header_and_stream_uses_sse_method() {
        let request = GenerationRequest::new("gemini-2-0-flash", "hi");

        let plain = GeminiAdapter.build_request(&request, &flash(), "k1", false);
        let streaming = GeminiAdapter.build_request(&request, &flash(), "k1", true);

        assert!(plain.url.ends_with("gemini-2.0-flash:generateContent"));
        assert!(streaming.url.ends_with(":streamGenerateContent?alt=sse"));
        assert!(!plain.url.contains("k1") && !streaming.url.contains("k1"));
        assert_eq!(plain.header("x-goog-api-key"), Some("k1"));
        assert_eq!(streaming.header("x-goog-api-key"), Some("k1"));
    }

    #[test]
    fn assistant_turns_become_model_role() {
        let request = GenerationRequest::new("gemini-2-0-flash", "again")
            .with_system_prompt("sys")
            .with_history(vec![
                Message::new(Role::User, "first"),
                Message::new(Role::Assistant, "answer"),
            ]);

        let spec = GeminiAdapter.build_request(&request, &flash(), "k", false);

        assert_eq!(spec.body["systemInstruction"]["parts"][0]["text"], "sys");
        assert_eq!(spec.body["contents"][1]["role"], "model");
        assert_eq!(spec.body["contents"][2]["parts"][0]["text"], "again");
        assert!(spec.body.get("generationConfig").is_none());
    }

    #[test]
    fn usage_metadata_is_normalized() {
        let raw = json!({
            "candidates": [{"content": {"parts": [{"text": "Hi"}]}}],
            "usageMetadata": {"promptTokenCount": 10, "candidatesTokenCount": 5}
        });

        let reply = GeminiAdapter.parse_response(&raw).unwrap();

        assert_eq!(reply.content, "Hi");
        assert_eq!(reply.usage.total_tokens, 15);
    }

    #[test]
    fn no_candidates_is_malformed() {
        let err = GeminiAdapter.parse_response(&json!({"candidates": []})).unwrap_err();
        assert!(matches!(err, PromptgenError::Provider { .. }));
    }

    #[test]
    fn stream_chunk_carries_text_and_usage() {
        let event = GeminiAdapter
            .parse_stream_data(r#"{"candidates":[{"content":{"parts":[{"text":"ab"}]}}],"usageMetadata":{"promptTokenCount":2,"candidatesTokenCount":1,"totalTokenCount":3}}"#)
            .unwrap();

        assert_eq!(event.text.as_deref(), Some("ab"));
        assert_eq!(event.usage.unwrap().total_tokens, 3);
    }
}
