use crate::config::Provider;
use crate::core::error::PromptgenError;
use crate::core::types::{GenerationRequest, TokenUsage};
use crate::providers::{
    ProviderAdapter, ProviderHttpSpec, ProviderReply, StreamEvent, as_u64, conversation_messages,
};
use crate::registry::ModelDescriptor;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatCompletionMessage>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    frequency_penalty: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    presence_penalty: Option<f32>,
}

#[derive(Serialize)]
struct ChatCompletionMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<CompletionUsage>,
}

#[derive(Deserialize)]
struct Choice {
    message: MessageContent,
}

#[derive(Deserialize)]
struct MessageContent {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct CompletionUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
    #[serde(default)]
    total_tokens: Option<u64>,
}

impl From<CompletionUsage> for TokenUsage {
    fn from(usage: CompletionUsage) -> Self {
        TokenUsage::new(
            usage.prompt_tokens,
            usage.completion_tokens,
            usage.total_tokens,
        )
    }
}

/// Chat-completions dialect shared by Zhipu, DeepSeek and OpenRouter.
pub struct OpenAICompatibleAdapter {
    provider: Provider,
}

impl OpenAICompatibleAdapter {
    pub fn new(provider: Provider) -> Self {
        Self { provider }
    }
}

impl ProviderAdapter for OpenAICompatibleAdapter {
    fn provider(&self) -> Provider {
        self.provider
    }

    fn build_request(
        &self,
        request: &GenerationRequest,
        model: &ModelDescriptor,
        api_key: &str,
        stream: bool,
    ) -> ProviderHttpSpec {
        let messages = conversation_messages(request)
            .into_iter()
            .map(|m| ChatCompletionMessage {
                role: m.role.as_str().to_string(),
                content: m.content,
            })
            .collect();

        let params = &request.params;
        let payload = ChatCompletionRequest {
            model: model.upstream_name().to_string(),
            messages,
            stream,
            temperature: params.temperature,
            max_tokens: params.max_tokens,
            top_p: params.top_p,
            frequency_penalty: params.frequency_penalty,
            presence_penalty: params.presence_penalty,
        };

        let mut headers = vec![(
            "Authorization".to_string(),
            format!("Bearer {}", api_key),
        )];
        if self.provider == Provider::OpenRouter {
            headers.push((
                "HTTP-Referer".to_string(),
                "https://github.com/promptgen/promptgen".to_string(),
            ));
            headers.push(("X-Title".to_string(), "AI Prompts Generator".to_string()));
        }

        ProviderHttpSpec {
            url: model.endpoint.clone(),
            headers,
            body: serde_json::to_value(payload).unwrap_or(Value::Null),
        }
    }

    fn parse_response(&self, raw: &Value) -> Result<ProviderReply, PromptgenError> {
        let parsed: ChatCompletionResponse = serde_json::from_value(raw.clone())
            .map_err(|e| PromptgenError::malformed(self.provider.as_str(), e.to_string()))?;

        let Some(choice) = parsed.choices.into_iter().next() else {
            return Err(PromptgenError::malformed(
                self.provider.as_str(),
                "No choices in API response",
            ));
        };

        Ok(ProviderReply {
            content: choice.message.content.unwrap_or_default().trim().to_string(),
            model: parsed.model,
            usage: parsed.usage.map(TokenUsage::from).unwrap_or_default(),
        })
    }

    fn parse_stream_data(&self, data: &str) -> Result<StreamEvent, PromptgenError> {
        if data == "[DONE]" {
            return Ok(StreamEvent::done());
        }

        let parsed: Value = serde_json::from_str(data).map_err(|e| {
            PromptgenError::Stream(format!("Failed to parse stream data: {}", e))
        })?;

        if let Some(error) = parsed.get("error") {
            let message = error
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown error");
            return Err(PromptgenError::Stream(format!(
                "{} stream error: {}",
                self.provider, message
            )));
        }

        let mut event = StreamEvent::ignore();
        if let Some(text) = parsed
            .pointer("/choices/0/delta/content")
            .and_then(Value::as_str)
            .filter(|t| !t.is_empty())
        {
            event.text = Some(text.to_string());
        }
        if let Some(usage) = parsed.get("usage").filter(|u| u.is_object()) {
            event.usage = Some(TokenUsage::new(
                as_u64(usage.get("prompt_tokens")),
                as_u64(usage.get("completion_tokens")),
                usage.get("total_tokens").and_then(Value::as_u64),
            ));
        }
        Ok(event)
    }
}
