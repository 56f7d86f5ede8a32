use crate::config::Provider;
use crate::core::error::PromptgenError;
use crate::core::types::{GenerationRequest, Role, TokenUsage};
use crate::providers::{
    ProviderAdapter, ProviderHttpSpec, ProviderReply, StreamEvent, as_u64, conversation_messages,
};
use crate::registry::ModelDescriptor;
use serde_json::{Map, Value, json};

/// Text-generation inference endpoint: a single `inputs` string instead of a
/// message array.
pub struct HuggingFaceAdapter;

/// Flattens the conversation into one prompt. A bare prompt is sent as-is.
fn flatten_inputs(request: &GenerationRequest) -> String {
    let messages = conversation_messages(request);
    if messages.len() == 1 {
        return request.prompt.clone();
    }

    let mut inputs = String::new();
    for message in &messages {
        let label = match message.role {
            Role::System => "System",
            Role::User => "User",
            Role::Assistant => "Assistant",
        };
        inputs.push_str(label);
        inputs.push_str(": ");
        inputs.push_str(&message.content);
        inputs.push('\n');
    }
    inputs.push_str("Assistant:");
    inputs
}

impl ProviderAdapter for HuggingFaceAdapter {
    fn provider(&self) -> Provider {
        Provider::HuggingFace
    }

    fn build_request(
        &self,
        request: &GenerationRequest,
        model: &ModelDescriptor,
        api_key: &str,
        stream: bool,
    ) -> ProviderHttpSpec {
        let params = &request.params;
        let mut parameters = Map::new();
        parameters.insert("return_full_text".to_string(), Value::Bool(false));
        parameters.insert(
            "max_new_tokens".to_string(),
            json!(params.max_tokens.unwrap_or(model.max_tokens)),
        );
        if let Some(temperature) = params.temperature {
            parameters.insert("temperature".to_string(), json!(temperature));
        }
        if let Some(top_p) = params.top_p {
            parameters.insert("top_p".to_string(), json!(top_p));
        }
        if let Some(penalty) = params.frequency_penalty {
            parameters.insert("repetition_penalty".to_string(), json!(1.0 + penalty));
        }

        let mut body = json!({
            "inputs": flatten_inputs(request),
            "parameters": parameters,
        });
        if stream {
            body["stream"] = Value::Bool(true);
        } else {
            body["parameters"]["details"] = Value::Bool(true);
        }

        ProviderHttpSpec {
            url: model.endpoint.clone(),
            headers: vec![(
                "Authorization".to_string(),
                format!("Bearer {}", api_key),
            )],
            body,
        }
    }

    fn parse_response(&self, raw: &Value) -> Result<ProviderReply, PromptgenError> {
        if let Some(error) = raw.get("error").and_then(Value::as_str) {
            return Err(PromptgenError::malformed("huggingface", error));
        }

        let first = match raw {
            Value::Array(items) => items.first(),
            Value::Object(_) => Some(raw),
            _ => None,
        };
        let Some(text) = first
            .and_then(|item| item.get("generated_text"))
            .and_then(Value::as_str)
        else {
            return Err(PromptgenError::malformed(
                "huggingface",
                "No generated_text in response",
            ));
        };

        let generated = first
            .and_then(|item| item.pointer("/details/generated_tokens"))
            .and_then(Value::as_u64)
            .unwrap_or(0);

        Ok(ProviderReply {
            content: text.trim().to_string(),
            model: None,
            usage: TokenUsage::new(0, generated, None),
        })
    }

    fn parse_stream_data(&self, data: &str) -> Result<StreamEvent, PromptgenError> {
        let parsed: Value = serde_json::from_str(data).map_err(|e| {
            PromptgenError::Stream(format!("Failed to parse stream data: {}", e))
        })?;

        if let Some(error) = parsed.get("error").and_then(Value::as_str) {
            return Err(PromptgenError::Stream(format!(
                "Hugging Face stream error: {}",
                error
            )));
        }

        let mut event = StreamEvent::ignore();
        let token = &parsed["token"];
        if !token["special"].as_bool().unwrap_or(false) {
            event.text = token["text"]
                .as_str()
                .filter(|t| !t.is_empty())
                .map(str::to_string);
        }
        if let Some(details) = parsed.get("details").filter(|d| d.is_object()) {
            event.usage = Some(TokenUsage::new(
                0,
                as_u64(details.get("generated_tokens")),
                None,
            ));
            event.done = true;
        }
        Ok(event)
    }
}
