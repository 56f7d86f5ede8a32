use crate::core::error::PromptgenError;
use crate::core::types::SamplingParams;
use crate::storage::LocalStore;
use serde::{Deserialize, Serialize};

pub const SETTINGS_KEY: &str = "ai-settings";

/// User-adjustable generation defaults, kept in the local store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AiSettings {
    #[serde(default)]
    pub default_model: Option<String>,
    #[serde(default)]
    pub params: SamplingParams,
    #[serde(default)]
    pub system_prompt: Option<String>,
    #[serde(default)]
    pub stream: bool,
}

impl AiSettings {
    pub fn load(store: &LocalStore) -> Self {
        store.get_or_default(SETTINGS_KEY)
    }

    pub fn save(&self, store: &LocalStore) -> Result<(), PromptgenError> {
        store.set(SETTINGS_KEY, self)
    }

    pub fn clear(store: &LocalStore) -> Result<(), PromptgenError> {
        store.remove(SETTINGS_KEY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn settings_round_trip_through_store() {
        let dir = tempdir().unwrap();
        let store = LocalStore::new(dir.path());
        let settings = AiSettings {
            default_model: Some("gemini-2-0-flash".to_string()),
            params: SamplingParams {
                temperature: Some(0.2),
                ..Default::default()
            },
            system_prompt: None,
            stream: true,
        };

        settings.save(&store).unwrap();

        assert_eq!(AiSettings::load(&store), settings);
    }

    #[test]
    fn malformed_settings_fall_back_to_defaults() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("ai-settings.json"), "{ not json").unwrap();

        let settings = AiSettings::load(&LocalStore::new(dir.path()));

        assert_eq!(settings, AiSettings::default());
    }
}
