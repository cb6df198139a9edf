//! Application settings: JSON file first, then environment overrides.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::{debug, trace};

/// Settings for the text-generation client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSettings {
    pub api_key: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
    pub base_url: String,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: "gpt-4o".into(),
            temperature: 0.5,
            max_tokens: None,
            base_url: "https://api.openai.com/v1".into(),
        }
    }
}

/// Settings for the speech-to-text client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioSettings {
    pub model: String,
    pub device: String,
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self {
            model: "tiny".into(),
            device: "cpu".into(),
        }
    }
}

/// Defaults for translation requests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TranslationDefaults {
    pub input_lang: String,
    pub output_lang: String,
    pub batch_size: usize,
    pub context_window: usize,
}

impl Default for TranslationDefaults {
    fn default() -> Self {
        Self {
            input_lang: "ja".into(),
            output_lang: "en".into(),
            batch_size: crate::translate::DEFAULT_BATCH_SIZE,
            context_window: crate::translate::DEFAULT_CONTEXT_WINDOW,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub llm: LlmSettings,
    pub audio: AudioSettings,
    pub translation: TranslationDefaults,
}

impl AppConfig {
    /// Load from `path` when given, then apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                trace!("loading config from {}", path.display());
                let text = fs::read_to_string(path)
                    .with_context(|| format!("reading config {}", path.display()))?;
                Self::from_json(&text)?
            }
            None => Self::default(),
        };
        config.apply_vars(|key| std::env::var(key).ok())?;
        debug!(
            "config: model={} temperature={} input_lang={} output_lang={}",
            config.llm.model,
            config.llm.temperature,
            config.translation.input_lang,
            config.translation.output_lang
        );
        Ok(config)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).context("parsing config JSON")
    }

    /// Override fields from variables looked up through `get`.
    fn apply_vars(&mut self, get: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(key) = get("OPENAI_API_KEY") {
            self.llm.api_key = key;
        }
        if let Some(model) = get("OPENAI_MODEL") {
            self.llm.model = model;
        }
        if let Some(url) = get("OPENAI_BASE_URL") {
            self.llm.base_url = url;
        }
        if let Some(t) = get("TEMPERATURE") {
            self.llm.temperature = t
                .trim()
                .parse()
                .with_context(|| format!("TEMPERATURE must be a number, got {t:?}"))?;
        }
        if let Some(model) = get("WHISPER_MODEL") {
            self.audio.model = model;
        }
        if let Some(device) = get("DEVICE") {
            self.audio.device = device;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn partial_json_keeps_defaults() {
        let config = AppConfig::from_json(r#"{"llm": {"model": "gpt-4o-mini"}, "translation": {"output_lang": "pt-BR"}}"#).unwrap();
        assert_eq!(config.llm.model, "gpt-4o-mini");
        assert_eq!(config.llm.temperature, 0.5);
        assert_eq!(config.translation.input_lang, "ja");
        assert_eq!(config.translation.output_lang, "pt-BR");
        assert_eq!(config.audio.device, "cpu");
    }

    #[test]
    fn environment_overrides_file() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("OPENAI_API_KEY", "sk-test"),
            ("TEMPERATURE", "0.2"),
            ("DEVICE", "cuda"),
        ]);
        let mut config = AppConfig::default();
        config
            .apply_vars(|k| vars.get(k).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.llm.api_key, "sk-test");
        assert_eq!(config.llm.temperature, 0.2);
        assert_eq!(config.audio.device, "cuda");
        assert_eq!(config.llm.model, "gpt-4o");
    }

    #[test]
    fn bad_temperature_is_an_error() {
        let mut config = AppConfig::default();
        assert!(config
            .apply_vars(|k| (k == "TEMPERATURE").then(|| "warm".to_string()))
            .is_err());
    }

    #[test]
    fn load_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"translation": {"batch_size": 25}}"#).unwrap();
        let config = AppConfig::load(Some(&path)).unwrap();
        assert_eq!(config.translation.batch_size, 25);
    }
}
