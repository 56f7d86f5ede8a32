use std::io;
use thiserror::Error;

/// Unified error type for the prompt generator core
#[derive(Error, Debug)]
pub enum PromptgenError {
    /// The requested model id is not in the registry
    #[error("Unknown model: {0}")]
    UnknownModel(String),

    /// Non-success status or malformed payload from a provider
    #[error("{provider} error (status {status}): {message}")]
    Provider {
        provider: String,
        status: u16,
        message: String,
    },

    /// Failure after a stream has started delivering chunks
    #[error("Stream error: {0}")]
    Stream(String),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// User input errors
    #[error("Input error: {0}")]
    Input(String),

    /// IO-related errors
    #[error("IO error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Network-related errors
    #[error("Network error: {0}")]
    Network(String),
}

impl PromptgenError {
    pub fn provider(provider: impl Into<String>, status: u16, message: impl Into<String>) -> Self {
        PromptgenError::Provider {
            provider: provider.into(),
            status,
            message: message.into(),
        }
    }

    /// Malformed payloads carry status 200 since the HTTP exchange itself succeeded.
    pub fn malformed(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::provider(provider, 200, message)
    }
}

impl From<reqwest::Error> for PromptgenError {
    fn from(err: reqwest::Error) -> Self {
        // URLs may carry credentials.
        let err = err.without_url();
        if err.is_timeout() {
            PromptgenError::Network(format!("Request timed out: {}", err))
        } else if err.is_connect() {
            PromptgenError::Network(format!("Connection failed: {}", err))
        } else {
            PromptgenError::Network(format!("Request failed: {}", err))
        }
    }
}

impl From<serde_json::Error> for PromptgenError {
    fn from(err: serde_json::Error) -> Self {
        PromptgenError::Serialization(format!("JSON error: {}", err))
    }
}

impl From<serde_yml::Error> for PromptgenError {
    fn from(err: serde_yml::Error) -> Self {
        PromptgenError::Serialization(format!("YAML error: {}", err))
    }
}
