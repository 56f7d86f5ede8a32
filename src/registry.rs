//! Static table of callable models.
//!
//! The registry is built once at start-up (built-in table, then any models
//! and endpoint overrides from the config) and is read-only afterwards; it is
//! shared behind an `Arc` by the dispatcher and the front end.

use crate::config::{Config, Provider};
use crate::core::error::PromptgenError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelStatus {
    #[default]
    Active,
    Inactive,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelDescriptor {
    pub id: String,
    pub name: String,
    pub provider: Provider,
    /// Identifier sent to the provider; defaults to `id`.
    #[serde(default)]
    pub model_name: String,
    pub endpoint: String,
    #[serde(default = "default_true")]
    pub is_free: bool,
    pub max_tokens: u32,
    #[serde(default)]
    pub cost_per_token: f64,
    #[serde(default)]
    pub capabilities: Vec<String>,
    #[serde(default)]
    pub status: ModelStatus,
}

fn default_true() -> bool {
    true
}

impl ModelDescriptor {
    pub fn upstream_name(&self) -> &str {
        if self.model_name.is_empty() {
            &self.id
        } else {
            &self.model_name
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == ModelStatus::Active
    }

    pub fn cost_for(&self, tokens: u64) -> f64 {
        tokens as f64 * self.cost_per_token
    }
}

struct Entry {
    id: &'static str,
    name: &'static str,
    provider: Provider,
    model_name: &'static str,
    endpoint: &'static str,
    is_free: bool,
    max_tokens: u32,
    cost_per_token: f64,
    capabilities: &'static [&'static str],
}

const BUILTIN_MODELS: &[Entry] = &[
    Entry {
        id: "glm-4-5",
        name: "GLM-4.5",
        provider: Provider::Zhipu,
        model_name: "glm-4.5",
        endpoint: "https://open.bigmodel.cn/api/paas/v4/chat/completions",
        is_free: true,
        max_tokens: 8192,
        cost_per_token: 0.0,
        capabilities: &["text", "reasoning", "code"],
    },
    Entry {
        id: "glm-4-flash",
        name: "GLM-4 Flash",
        provider: Provider::Zhipu,
        model_name: "glm-4-flash",
        endpoint: "https://open.bigmodel.cn/api/paas/v4/chat/completions",
        is_free: true,
        max_tokens: 4096,
        cost_per_token: 0.0,
        capabilities: &["text", "fast"],
    },
    Entry {
        id: "deepseek-chat",
        name: "DeepSeek Chat",
        provider: Provider::DeepSeek,
        model_name: "deepseek-chat",
        endpoint: "https://api.deepseek.com/v1/chat/completions",
        is_free: true,
        max_tokens: 8192,
        cost_per_token: 0.0,
        capabilities: &["text", "code"],
    },
    Entry {
        id: "llama-3-3-70b",
        name: "Llama 3.3 70B Instruct",
        provider: Provider::OpenRouter,
        model_name: "meta-llama/llama-3.3-70b-instruct:free",
        endpoint: "https://openrouter.ai/api/v1/chat/completions",
        is_free: true,
        max_tokens: 4096,
        cost_per_token: 0.0,
        capabilities: &["text"],
    },
    Entry {
        id: "gemini-2-0-flash",
        name: "Gemini 2.0 Flash",
        provider: Provider::Gemini,
        model_name: "gemini-2.0-flash",
        endpoint: "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.0-flash",
        is_free: true,
        max_tokens: 8192,
        cost_per_token: 0.0,
        capabilities: &["text", "multimodal", "fast"],
    },
    Entry {
        id: "claude-3-5-haiku",
        name: "Claude 3.5 Haiku",
        provider: Provider::Anthropic,
        model_name: "claude-3-5-haiku-latest",
        endpoint: "https://api.anthropic.com/v1/messages",
        is_free: false,
        max_tokens: 8192,
        cost_per_token: 0.000_004,
        capabilities: &["text", "code"],
    },
    Entry {
        id: "mistral-7b-instruct",
        name: "Mistral 7B Instruct",
        provider: Provider::HuggingFace,
        model_name: "mistralai/Mistral-7B-Instruct-v0.3",
        endpoint: "https://api-inference.huggingface.co/models/mistralai/Mistral-7B-Instruct-v0.3",
        is_free: true,
        max_tokens: 1024,
        cost_per_token: 0.0,
        capabilities: &["text"],
    },
];

pub struct ModelRegistry {
    models: Vec<ModelDescriptor>,
    index: HashMap<String, usize>,
}

impl ModelRegistry {
    pub fn empty() -> Self {
        Self {
            models: Vec::new(),
            index: HashMap::new(),
        }
    }

    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        for entry in BUILTIN_MODELS {
            registry.register(ModelDescriptor {
                id: entry.id.to_string(),
                name: entry.name.to_string(),
                provider: entry.provider,
                model_name: entry.model_name.to_string(),
                endpoint: entry.endpoint.to_string(),
                is_free: entry.is_free,
                max_tokens: entry.max_tokens,
                cost_per_token: entry.cost_per_token,
                capabilities: entry.capabilities.iter().map(|c| c.to_string()).collect(),
                status: ModelStatus::Active,
            });
        }
        registry
    }

    /// Built-in table plus the config's extra models and endpoint overrides.
    pub fn from_config(config: &Config) -> Self {
        let mut registry = Self::builtin();
        for model in &config.models {
            registry.register(model.clone());
        }
        for (provider, provider_config) in &config.providers {
            if let Some(base_url) = &provider_config.base_url {
                registry.override_base_url(*provider, base_url);
            }
        }
        registry
    }

    /// Adds a model, replacing any entry with the same id.
    pub fn register(&mut self, descriptor: ModelDescriptor) {
        match self.index.get(&descriptor.id) {
            Some(&pos) => self.models[pos] = descriptor,
            None => {
                self.index.insert(descriptor.id.clone(), self.models.len());
                self.models.push(descriptor);
            }
        }
    }

    fn override_base_url(&mut self, provider: Provider, base_url: &str) {
        for model in self.models.iter_mut().filter(|m| m.provider == provider) {
            model.endpoint = rebase_endpoint(&model.endpoint, base_url);
        }
    }

    pub fn list_models(&self) -> &[ModelDescriptor] {
        &self.models
    }

    pub fn get_model(&self, id: &str) -> Option<&ModelDescriptor> {
        self.index.get(id).map(|&pos| &self.models[pos])
    }

    pub fn get_model_or_err(&self, id: &str) -> Result<&ModelDescriptor, PromptgenError> {
        self.get_model(id)
            .ok_or_else(|| PromptgenError::UnknownModel(id.to_string()))
    }

    pub fn active_models(&self) -> impl Iterator<Item = &ModelDescriptor> {
        self.models.iter().filter(|m| m.is_active())
    }

    pub fn free_models(&self) -> impl Iterator<Item = &ModelDescriptor> {
        self.models.iter().filter(|m| m.is_free)
    }
}

/// Swaps the scheme and host of `endpoint` for `base_url`, keeping the path.
fn rebase_endpoint(endpoint: &str, base_url: &str) -> String {
    let base_url = base_url.trim_end_matches('/');
    let path = endpoint
        .find("://")
        .and_then(|scheme_end| {
            endpoint[scheme_end + 3..]
                .find('/')
                .map(|p| &endpoint[scheme_end + 3 + p..])
        })
        .unwrap_or("");
    format!("{}{}", base_url, path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProviderConfig;

    #[test]
    fn every_registered_id_resolves_to_itself() {
        let registry = ModelRegistry::builtin();
        assert!(!registry.list_models().is_empty());
        for model in registry.list_models() {
            assert_eq!(registry.get_model(&model.id).unwrap().id, model.id);
        }
    }

    #[test]
    fn unknown_id_is_an_error() {
        let registry = ModelRegistry::builtin();
        assert!(registry.get_model("gpt-9").is_none());
        assert!(matches!(
            registry.get_model_or_err("gpt-9"),
            Err(PromptgenError::UnknownModel(id)) if id == "gpt-9"
        ));
    }

    #[test]
    fn lookup_is_exact() {
        let registry = ModelRegistry::builtin();
        assert!(registry.get_model("GLM-4-5").is_none());
        assert!(registry.get_model("glm-4-5 ").is_none());
    }

    #[test]
    fn register_replaces_existing_id() {
        let mut registry = ModelRegistry::builtin();
        let before = registry.list_models().len();
        let mut replacement = registry.get_model("glm-4-5").unwrap().clone();
        replacement.status = ModelStatus::Inactive;

        registry.register(replacement);

        assert_eq!(registry.list_models().len(), before);
        assert!(!registry.get_model("glm-4-5").unwrap().is_active());
        assert!(registry.active_models().all(|m| m.id != "glm-4-5"));
    }

    #[test]
    fn config_base_url_rebases_provider_endpoints() {
        let mut config = Config::default();
        config.providers.insert(
            Provider::Zhipu,
            ProviderConfig {
                api_key: None,
                base_url: Some("http://127.0.0.1:8080/".to_string()),
            },
        );

        let registry = ModelRegistry::from_config(&config);

        assert_eq!(
            registry.get_model("glm-4-5").unwrap().endpoint,
            "http://127.0.0.1:8080/api/paas/v4/chat/completions"
        );
        assert_eq!(
            registry.get_model("deepseek-chat").unwrap().endpoint,
            "https://api.deepseek.com/v1/chat/completions"
        );
    }

    #[test]
    fn builtin_free_models_cost_nothing() {
        let registry = ModelRegistry::builtin();
        for model in registry.free_models() {
            assert_eq!(model.cost_for(1_000), 0.0);
        }
    }

    #[test]
    fn extra_models_deserialize_with_defaults() {
        let yaml = "id: local\nname: Local\nprovider: deepseek\nendpoint: http://localhost/v1/chat/completions\nmax_tokens: 512\n";
        let model: ModelDescriptor = serde_yml::from_str(yaml).unwrap();
        assert_eq!(model.upstream_name(), "local");
        assert!(model.is_free);
        assert!(model.is_active());
    }
}
