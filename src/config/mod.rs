use crate::core::error::PromptgenError;
use crate::registry::ModelDescriptor;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

pub mod settings;

pub use settings::AiSettings;

pub const DEFAULT_MODEL: &str = "glm-4-5";
pub const DEFAULT_ANALYTICS_CAPACITY: usize = 1000;

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_analytics_capacity() -> usize {
    DEFAULT_ANALYTICS_CAPACITY
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Zhipu,
    DeepSeek,
    OpenRouter,
    Gemini,
    Anthropic,
    HuggingFace,
}

impl Provider {
    pub const ALL: [Provider; 6] = [
        Provider::Zhipu,
        Provider::DeepSeek,
        Provider::OpenRouter,
        Provider::Gemini,
        Provider::Anthropic,
        Provider::HuggingFace,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Zhipu => "zhipu",
            Provider::DeepSeek => "deepseek",
            Provider::OpenRouter => "openrouter",
            Provider::Gemini => "gemini",
            Provider::Anthropic => "anthropic",
            Provider::HuggingFace => "huggingface",
        }
    }

    /// Environment variable consulted when the config carries no key.
    pub fn api_key_env(&self) -> &'static str {
        match self {
            Provider::Zhipu => "ZHIPU_API_KEY",
            Provider::DeepSeek => "DEEPSEEK_API_KEY",
            Provider::OpenRouter => "OPENROUTER_API_KEY",
            Provider::Gemini => "GEMINI_API_KEY",
            Provider::Anthropic => "ANTHROPIC_API_KEY",
            Provider::HuggingFace => "HUGGINGFACE_API_KEY",
        }
    }
}

impl FromStr for Provider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "zhipu" | "glm" => Ok(Provider::Zhipu),
            "deepseek" => Ok(Provider::DeepSeek),
            "openrouter" => Ok(Provider::OpenRouter),
            "gemini" | "google" => Ok(Provider::Gemini),
            "anthropic" => Ok(Provider::Anthropic),
            "huggingface" | "hf" => Ok(Provider::HuggingFace),
            other => Err(format!("unknown provider '{}'", other)),
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub api_key: Option<String>,
    /// Replaces the host part of every registered endpoint for this provider.
    pub base_url: Option<String>,
}

/// API keys resolved per provider.
#[derive(Debug, Default, Clone)]
pub struct Credentials {
    keys: HashMap<Provider, String>,
}

impl Credentials {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_key(mut self, provider: Provider, key: impl Into<String>) -> Self {
        self.keys.insert(provider, key.into());
        self
    }

    pub fn get(&self, provider: Provider) -> Option<&str> {
        self.keys.get(&provider).map(String::as_str)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_model")]
    pub default_model: String,
    #[serde(default)]
    pub providers: HashMap<Provider, ProviderConfig>,
    /// Extra models registered on top of the built-in table.
    #[serde(default)]
    pub models: Vec<ModelDescriptor>,
    #[serde(default = "default_analytics_capacity")]
    pub analytics_capacity: usize,
    /// Overrides the directory used for local storage.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_model: default_model(),
            providers: HashMap::new(),
            models: Vec::new(),
            analytics_capacity: default_analytics_capacity(),
            data_dir: None,
        }
    }
}

impl Config {
    fn config_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".promptgen")
    }

    pub fn config_path() -> PathBuf {
        Self::config_dir().join("config.yaml")
    }

    pub fn load() -> Result<Config, PromptgenError> {
        Self::load_from(&Self::config_path())
    }

    /// Reads the config at `path`, writing a default one first if it is missing.
    pub fn load_from(path: &Path) -> Result<Config, PromptgenError> {
        if path.exists() {
            let contents = fs::read_to_string(path)?;
            let config = serde_yml::from_str::<Config>(&contents)
                .map_err(|e| PromptgenError::Config(format!("Parse {}: {}", path.display(), e)))?;
            return Ok(config);
        }

        let config = Config::default();
        if let Err(e) = config.save_to(path) {
            tracing::warn!(path = %path.display(), error = %e, "could not write default config");
        }
        Ok(config)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), PromptgenError> {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }

        let yaml_content = serde_yml::to_string(self)?;
        fs::write(path, yaml_content)?;
        Ok(())
    }

    pub fn data_dir(&self) -> PathBuf {
        self.data_dir
            .clone()
            .unwrap_or_else(|| Self::config_dir().join("data"))
    }

    pub fn history_dir(&self) -> PathBuf {
        self.data_dir().join("history")
    }

    /// Config keys win over the environment; empty keys count as absent.
    pub fn credentials(&self) -> Credentials {
        self.credentials_with(|name| env::var(name).ok())
    }

    fn credentials_with(&self, lookup: impl Fn(&str) -> Option<String>) -> Credentials {
        let mut credentials = Credentials::new();
        for provider in Provider::ALL {
            let key = self
                .providers
                .get(&provider)
                .and_then(|c| c.api_key.clone())
                .filter(|k| !k.trim().is_empty())
                .or_else(|| lookup(provider.api_key_env()).filter(|k| !k.trim().is_empty()));
            if let Some(key) = key {
                credentials = credentials.with_key(provider, key);
            }
        }
        credentials
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_config_is_created_with_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("config.yaml");

        let config = Config::load_from(&path).unwrap();

        assert_eq!(config.default_model, DEFAULT_MODEL);
        assert_eq!(config.analytics_capacity, 1000);
        assert!(path.exists());
    }

    #[test]
    fn parses_provider_sections() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(
            &path,
            "default_model: deepseek-chat\nproviders:\n  zhipu:\n    api_key: abc\n    base_url: http://localhost:9000\n",
        )
        .unwrap();

        let config = Config::load_from(&path).unwrap();

        assert_eq!(config.default_model, "deepseek-chat");
        let zhipu = &config.providers[&Provider::Zhipu];
        assert_eq!(zhipu.api_key.as_deref(), Some("abc"));
        assert_eq!(zhipu.base_url.as_deref(), Some("http://localhost:9000"));
    }

    #[test]
    fn malformed_config_is_a_config_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(&path, "providers: [not, a, map").unwrap();

        assert!(matches!(
            Config::load_from(&path),
            Err(PromptgenError::Config(_))
        ));
    }

    #[test]
    fn config_key_beats_environment() {
        let mut config = Config::default();
        config.providers.insert(
            Provider::Zhipu,
            ProviderConfig {
                api_key: Some("from-config".to_string()),
                base_url: None,
            },
        );

        let credentials = config.credentials_with(|name| match name {
            "ZHIPU_API_KEY" => Some("from-env".to_string()),
            "GEMINI_API_KEY" => Some("gem".to_string()),
            "DEEPSEEK_API_KEY" => Some("  ".to_string()),
            _ => None,
        });

        assert_eq!(credentials.get(Provider::Zhipu), Some("from-config"));
        assert_eq!(credentials.get(Provider::Gemini), Some("gem"));
        assert_eq!(credentials.get(Provider::DeepSeek), None);
    }

    #[test]
    fn provider_names_parse_case_insensitively() {
        assert_eq!("GLM".parse::<Provider>(), Ok(Provider::Zhipu));
        assert_eq!("HuggingFace".parse::<Provider>(), Ok(Provider::HuggingFace));
        assert!("nope".parse::<Provider>().is_err());
    }
}
