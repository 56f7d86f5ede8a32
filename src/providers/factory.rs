use crate::config::Provider;
use crate::core::error::PromptgenError;
use crate::providers::{
    ProviderAdapter, anthropic::AnthropicAdapter, gemini::GeminiAdapter,
    huggingface::HuggingFaceAdapter, openai_compatible::OpenAICompatibleAdapter,
};
use std::collections::HashMap;

/// Provider to adapter strategy map. Adding a provider means adding an
/// adapter here; the dispatcher never branches on provider names.
pub struct AdapterSet {
    adapters: HashMap<Provider, Box<dyn ProviderAdapter>>,
}

impl AdapterSet {
    pub fn new() -> Self {
        let mut set = Self {
            adapters: HashMap::new(),
        };

        for provider in [Provider::Zhipu, Provider::DeepSeek, Provider::OpenRouter] {
            set.insert(Box::new(OpenAICompatibleAdapter::new(provider)));
        }
        set.insert(Box::new(GeminiAdapter));
        set.insert(Box::new(AnthropicAdapter));
        set.insert(Box::new(HuggingFaceAdapter));

        set
    }

    pub fn insert(&mut self, adapter: Box<dyn ProviderAdapter>) {
        self.adapters.insert(adapter.provider(), adapter);
    }

    pub fn get(&self, provider: Provider) -> Result<&dyn ProviderAdapter, PromptgenError> {
        self.adapters
            .get(&provider)
            .map(|adapter| adapter.as_ref())
            .ok_or_else(|| PromptgenError::Config(format!("No adapter for provider: {}", provider)))
    }
}

impl Default for AdapterSet {
    fn default() -> Self {
        Self::new()
    }
}
