//! Settings for writing-compiler
//!
//! Stored as one JSON record under `writing-compiler:settings:v1` in a
//! [`KeyValueStore`], by default `~/.config/writing-compiler/`.

use crate::compiler::prompts;
use crate::store::{FileStore, KeyValueStore, StoreError};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::path::PathBuf;
use thiserror::Error;

pub const SETTINGS_KEY: &str = "writing-compiler:settings:v1";

pub const DEFAULT_BASE_URL: &str = "https://api.groq.com/openai/v1";
pub const DEFAULT_MODEL: &str = "llama-3.1-70b-versatile";

/// Env override for the settings directory.
pub const CONFIG_DIR_ENV: &str = "WRITING_COMPILER_CONFIG_DIR";

/// Environment variables checked, in order, for a session API key.
pub const API_KEY_ENV_VARS: [&str; 3] =
    ["WRITING_COMPILER_API_KEY", "GROQ_API_KEY", "OPENAI_API_KEY"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AppSettings {
    pub base_url: String,
    pub model_validator: String,
    pub model_rewriter: String,
    /// When false the key is never written to storage.
    pub persist_api_key: bool,
    #[serde(deserialize_with = "null_as_empty")]
    pub api_key: String,
    pub system_prompt_validator: String,
    pub system_prompt_rewriter: String,
    pub validator_prompt_template: String,
    pub rewriter_prompt_template: String,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            model_validator: DEFAULT_MODEL.to_string(),
            model_rewriter: DEFAULT_MODEL.to_string(),
            persist_api_key: false,
            api_key: String::new(),
            system_prompt_validator: prompts::VALIDATOR_SYSTEM.to_string(),
            system_prompt_rewriter: prompts::REWRITER_SYSTEM.to_string(),
            validator_prompt_template: prompts::VALIDATOR_TEMPLATE.to_string(),
            rewriter_prompt_template: prompts::REWRITER_TEMPLATE.to_string(),
        }
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

fn or_builtin<'a>(value: &'a str, builtin: &'a str) -> &'a str {
    if value.trim().is_empty() {
        builtin
    } else {
        value
    }
}

impl AppSettings {
    pub fn effective_system_prompt_validator(&self) -> &str {
        or_builtin(&self.system_prompt_validator, prompts::VALIDATOR_SYSTEM)
    }

    pub fn effective_system_prompt_rewriter(&self) -> &str {
        or_builtin(&self.system_prompt_rewriter, prompts::REWRITER_SYSTEM)
    }

    pub fn effective_validator_template(&self) -> &str {
        or_builtin(&self.validator_prompt_template, prompts::VALIDATOR_TEMPLATE)
    }

    pub fn effective_rewriter_template(&self) -> &str {
        or_builtin(&self.rewriter_prompt_template, prompts::REWRITER_TEMPLATE)
    }

    /// Restore the built-in system prompts and templates.
    pub fn reset_prompts(&mut self) {
        let defaults = Self::default();
        self.system_prompt_validator = defaults.system_prompt_validator;
        self.system_prompt_rewriter = defaults.system_prompt_rewriter;
        self.validator_prompt_template = defaults.validator_prompt_template;
        self.rewriter_prompt_template = defaults.rewriter_prompt_template;
    }

    /// Check the fields a request depends on.
    pub fn validate(&self) -> Result<(), SettingsError> {
        let parsed = url::Url::parse(self.base_url.trim())
            .map_err(|e| SettingsError::Invalid(format!("baseUrl '{}': {}", self.base_url, e)))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(SettingsError::Invalid(format!(
                "baseUrl must use http or https, got '{}'",
                parsed.scheme()
            )));
        }
        if self.model_validator.trim().is_empty() {
            return Err(SettingsError::Invalid("modelValidator is empty".to_string()));
        }
        if self.model_rewriter.trim().is_empty() {
            return Err(SettingsError::Invalid("modelRewriter is empty".to_string()));
        }
        Ok(())
    }

    /// The key with everything but the last four characters hidden.
    pub fn masked_api_key(&self) -> String {
        mask_secret(&self.api_key)
    }

    /// Copy as it may be written to storage.
    fn scrubbed(&self) -> Self {
        let mut copy = self.clone();
        if !copy.persist_api_key {
            copy.api_key.clear();
        }
        copy
    }
}

pub fn mask_secret(secret: &str) -> String {
    let count = secret.chars().count();
    if count == 0 {
        return "(not set)".to_string();
    }
    if count <= 8 {
        return "*".repeat(count);
    }
    let tail: String = secret.chars().skip(count - 4).collect();
    format!("{}{}", "*".repeat(count - 4), tail)
}

/// First non-empty key from [`API_KEY_ENV_VARS`].
pub fn api_key_from_env() -> Option<String> {
    API_KEY_ENV_VARS.iter().find_map(|name| {
        std::env::var(name)
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    })
}

/// `--config-dir`, then `$WRITING_COMPILER_CONFIG_DIR`, then the platform config dir.
pub fn resolve_config_dir(flag: Option<PathBuf>) -> Option<PathBuf> {
    flag.or_else(|| {
        std::env::var_os(CONFIG_DIR_ENV)
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
    })
    .or_else(FileStore::default_dir)
}

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to load settings: {0}")]
    Load(#[source] StoreError),
    #[error("failed to save settings: {0}")]
    Save(#[source] StoreError),
    #[error("invalid settings: {0}")]
    Invalid(String),
}

pub struct SettingsStore<S> {
    store: S,
}

impl<S: KeyValueStore> SettingsStore<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn inner(&self) -> &S {
        &self.store
    }

    /// Defaults overlaid with the stored record.
    pub fn load(&self) -> Result<AppSettings, SettingsError> {
        let stored = match self.store.get(SETTINGS_KEY) {
            Ok(Some(value)) => value,
            Ok(None) => return Ok(AppSettings::default()),
            Err(StoreError::Decode { source, .. }) => {
                return Ok(self.recover(&source.to_string()));
            }
            Err(err) => return Err(SettingsError::Load(err)),
        };

        let Value::Object(stored) = stored else {
            return Ok(self.recover("record is not a JSON object"));
        };

        let merged = merge_over_defaults(stored);
        match serde_json::from_value::<AppSettings>(Value::Object(merged)) {
            Ok(settings) => Ok(settings.scrubbed()),
            Err(err) => Ok(self.recover(&err.to_string())),
        }
    }

    /// Replace the stored record. The key is blanked unless `persist_api_key` is set.
    pub fn save(&self, settings: &AppSettings) -> Result<(), SettingsError> {
        let value = serde_json::to_value(settings.scrubbed()).map_err(|source| {
            SettingsError::Save(StoreError::Encode {
                key: SETTINGS_KEY.to_string(),
                source,
            })
        })?;
        self.store
            .set(SETTINGS_KEY, &value)
            .map_err(SettingsError::Save)?;
        tracing::debug!(persist_api_key = settings.persist_api_key, "settings saved");
        Ok(())
    }

    /// Drop the stored record; the next load yields defaults.
    pub fn reset(&self) -> Result<(), SettingsError> {
        self.store.remove(SETTINGS_KEY).map_err(SettingsError::Save)
    }

    /// Blank the stored key, leaving every other field as it was.
    pub fn clear_credential(&self) -> Result<(), SettingsError> {
        let stored = match self.store.get(SETTINGS_KEY) {
            Ok(Some(value)) => value,
            Ok(None) => return Ok(()),
            Err(err) => return Err(SettingsError::Load(err)),
        };
        let Value::Object(mut record) = stored else {
            return Ok(());
        };
        record.insert("apiKey".to_string(), Value::String(String::new()));
        self.store
            .set(SETTINGS_KEY, &Value::Object(record))
            .map_err(SettingsError::Save)
    }

    fn recover(&self, reason: &str) -> AppSettings {
        if let Err(err) = self.store.quarantine(SETTINGS_KEY) {
            tracing::warn!(error = %err, "failed to preserve unreadable settings record");
        }
        tracing::warn!(
            reason,
            "stored settings were unreadable; a backup was kept and defaults were loaded"
        );
        AppSettings::default()
    }
}

fn merge_over_defaults(stored: Map<String, Value>) -> Map<String, Value> {
    let mut merged = match serde_json::to_value(AppSettings::default()) {
        Ok(Value::Object(map)) => map,
        _ => Map::new(),
    };
    for (key, value) in stored {
        merged.insert(key, value);
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use serde_json::json;

    fn custom() -> AppSettings {
        AppSettings {
            base_url: "http://localhost:11434/v1".to_string(),
            model_validator: "validator-model".to_string(),
            model_rewriter: "rewriter-model".to_string(),
            persist_api_key: false,
            api_key: "gsk_abcdefghijklmnop".to_string(),
            ..AppSettings::default()
        }
    }

    #[test]
    fn test_load_without_record_returns_defaults() {
        let store = SettingsStore::new(MemoryStore::new());
        let settings = store.load().unwrap();
        assert_eq!(settings, AppSettings::default());
        assert_eq!(settings.base_url, "https://api.groq.com/openai/v1");
        assert_eq!(settings.model_validator, "llama-3.1-70b-versatile");
        assert!(!settings.persist_api_key);
        assert_eq!(settings.api_key, "");
    }

    #[test]
    fn test_round_trip_without_persisting_key() {
        let store = SettingsStore::new(MemoryStore::new());
        let settings = custom();
        store.save(&settings).unwrap();

        let raw = store.inner().get(SETTINGS_KEY).unwrap().unwrap();
        assert_eq!(raw["apiKey"], json!(""));

        let loaded = store.load().unwrap();
        assert_eq!(loaded.api_key, "");
        assert_eq!(
            loaded,
            AppSettings {
                api_key: String::new(),
                ..settings
            }
        );
    }

    #[test]
    fn test_round_trip_with_persisted_key() {
        let store = SettingsStore::new(MemoryStore::new());
        let settings = AppSettings {
            persist_api_key: true,
            ..custom()
        };
        store.save(&settings).unwrap();
        assert_eq!(store.load().unwrap(), settings);
    }

    #[test]
    fn test_key_in_record_is_ignored_when_not_persisting() {
        let store = SettingsStore::new(MemoryStore::new());
        store
            .inner()
            .set(
                SETTINGS_KEY,
                &json!({"persistApiKey": false, "apiKey": "leaked"}),
            )
            .unwrap();
        assert_eq!(store.load().unwrap().api_key, "");
    }

    #[test]
    fn test_reset_then_load_equals_defaults() {
        let store = SettingsStore::new(MemoryStore::new());
        store.save(&custom()).unwrap();
        store.reset().unwrap();
        assert_eq!(store.load().unwrap(), AppSettings::default());
    }

    #[test]
    fn test_clear_credential_keeps_other_fields() {
        let store = SettingsStore::new(MemoryStore::new());
        let settings = AppSettings {
            persist_api_key: true,
            ..custom()
        };
        store.save(&settings).unwrap();
        store.clear_credential().unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(loaded.api_key, "");
        assert!(loaded.persist_api_key);
        assert_eq!(loaded.model_rewriter, "rewriter-model");
    }

    #[test]
    fn test_clear_credential_without_record_is_noop() {
        let store = SettingsStore::new(MemoryStore::new());
        store.clear_credential().unwrap();
        assert_eq!(store.inner().get(SETTINGS_KEY).unwrap(), None);
    }

    #[test]
    fn test_partial_record_is_backfilled() {
        let store = SettingsStore::new(MemoryStore::new());
        store
            .inner()
            .set(SETTINGS_KEY, &json!({"modelRewriter": "m2", "apiKey": null}))
            .unwrap();
        let loaded = store.load().unwrap();
        assert_eq!(loaded.model_rewriter, "m2");
        assert_eq!(loaded.model_validator, DEFAULT_MODEL);
        assert_eq!(loaded.validator_prompt_template, prompts::VALIDATOR_TEMPLATE);
    }

    #[test]
    fn test_wrongly_typed_record_falls_back_to_defaults() {
        let store = SettingsStore::new(MemoryStore::new());
        store
            .inner()
            .set(SETTINGS_KEY, &json!({"persistApiKey": "yes"}))
            .unwrap();
        assert_eq!(store.load().unwrap(), AppSettings::default());
        assert!(store
            .inner()
            .get(&format!("{}.corrupt", SETTINGS_KEY))
            .unwrap()
            .is_some());
    }

    #[test]
    fn test_non_object_record_falls_back_to_defaults() {
        let store = SettingsStore::new(MemoryStore::new());
        store.inner().set(SETTINGS_KEY, &json!([1, 2])).unwrap();
        assert_eq!(store.load().unwrap(), AppSettings::default());
    }

    #[test]
    fn test_file_backed_round_trip() {
        let tmp = tempfile::tempdir().unwrap();
        let store = SettingsStore::new(FileStore::new(tmp.path()));
        let settings = AppSettings {
            persist_api_key: true,
            ..custom()
        };
        store.save(&settings).unwrap();

        let reopened = SettingsStore::new(FileStore::new(tmp.path()));
        assert_eq!(reopened.load().unwrap(), settings);
    }

    #[test]
    fn test_corrupt_file_is_preserved() {
        let tmp = tempfile::tempdir().unwrap();
        let file_store = FileStore::new(tmp.path());
        std::fs::write(file_store.path_for(SETTINGS_KEY), "{ truncated").unwrap();

        let store = SettingsStore::new(file_store);
        assert_eq!(store.load().unwrap(), AppSettings::default());
        assert!(tmp
            .path()
            .join("writing-compiler-settings-v1.json.corrupt")
            .exists());
    }

    #[test]
    fn test_blank_prompts_resolve_to_builtins() {
        let settings = AppSettings {
            system_prompt_validator: "   ".to_string(),
            rewriter_prompt_template: String::new(),
            validator_prompt_template: "custom {{TEXT}}".to_string(),
            ..AppSettings::default()
        };
        assert_eq!(
            settings.effective_system_prompt_validator(),
            prompts::VALIDATOR_SYSTEM
        );
        assert_eq!(
            settings.effective_rewriter_template(),
            prompts::REWRITER_TEMPLATE
        );
        assert_eq!(settings.effective_validator_template(), "custom {{TEXT}}");
    }

    #[test]
    fn test_validate_rejects_bad_urls_and_models() {
        assert!(AppSettings::default().validate().is_ok());

        let relative = AppSettings {
            base_url: "api.groq.com/openai/v1".to_string(),
            ..AppSettings::default()
        };
        assert!(matches!(relative.validate(), Err(SettingsError::Invalid(_))));

        let ftp = AppSettings {
            base_url: "ftp://example.com".to_string(),
            ..AppSettings::default()
        };
        assert!(ftp.validate().is_err());

        let no_model = AppSettings {
            model_validator: " ".to_string(),
            ..AppSettings::default()
        };
        assert!(no_model.validate().is_err());
    }

    #[test]
    fn test_mask_secret() {
        assert_eq!(mask_secret(""), "(not set)");
        assert_eq!(mask_secret("short"), "*****");
        assert_eq!(mask_secret("gsk_abcdefgh1234"), "************1234");
    }
}
