use crate::db::Database;
use crate::store::StoreError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Settings key under which the whole configuration is stored as one JSON document.
pub const SETTINGS_KEY: &str = "MarkdownChat";

pub const DEFAULT_PLACEHOLDER: &str = "@text";
pub const DEFAULT_PAGE_RANGE: &str = "1-999";

/// Fixed parameters sent with every completion request
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct GenerationParams {
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            max_tokens: 4000,
            temperature: 0.6,
            top_p: 1.0,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct ChatSettings {
    pub forms_endpoint: String,
    pub forms_key: String,
    #[serde(rename = "azureOpenAIEndpoint")]
    pub azure_openai_endpoint: String,
    #[serde(rename = "azureOpenAIKey")]
    pub azure_openai_key: String,
    pub system_instruction: String,
    pub welcome_message: String,
    pub placeholder: String,
    pub page_range: String,
    pub generation: GenerationParams,
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            forms_endpoint: String::new(),
            forms_key: String::new(),
            azure_openai_endpoint: String::new(),
            azure_openai_key: String::new(),
            system_instruction: String::new(),
            welcome_message: String::new(),
            placeholder: DEFAULT_PLACEHOLDER.to_string(),
            page_range: DEFAULT_PAGE_RANGE.to_string(),
            generation: GenerationParams::default(),
        }
    }
}

const SETTING_KEYS: &[&str] = &[
    "formsEndpoint",
    "formsKey",
    "azureOpenAIEndpoint",
    "azureOpenAIKey",
    "systemInstruction",
    "welcomeMessage",
    "placeholder",
    "pageRange",
    "maxTokens",
    "temperature",
    "topP",
];

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Unknown setting key: {0}")]
    UnknownKey(String),
    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },
    #[error("Settings JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Store(#[from] StoreError),
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, SettingsError> {
    value.trim().parse().map_err(|_| SettingsError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn mask(value: &str) -> String {
    let chars: Vec<char> = value.chars().collect();
    if chars.len() > 8 {
        let head: String = chars[..4].iter().collect();
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("{}...{}", head, tail)
    } else {
        value.to_string()
    }
}

impl ChatSettings {
    /// Load settings from the database. A missing entry yields defaults.
    pub fn load(db: &Database) -> Result<Self, SettingsError> {
        match db.get_setting(SETTINGS_KEY)? {
            Some(json) => Ok(serde_json::from_str(&json)?),
            None => {
                tracing::info!("No stored chat settings, using defaults");
                Ok(Self::default())
            }
        }
    }

    pub fn save(&self, db: &Database) -> Result<(), SettingsError> {
        db.set_setting(SETTINGS_KEY, &serde_json::to_string(self)?)?;
        Ok(())
    }

    /// Update a single field by its stored name.
    pub fn set(&mut self, key: &str, value: String) -> Result<(), SettingsError> {
        match key {
            "formsEndpoint" => self.forms_endpoint = value,
            "formsKey" => self.forms_key = value,
            "azureOpenAIEndpoint" => self.azure_openai_endpoint = value,
            "azureOpenAIKey" => self.azure_openai_key = value,
            "systemInstruction" => self.system_instruction = value,
            "welcomeMessage" => self.welcome_message = value,
            "placeholder" => self.placeholder = value,
            "pageRange" => self.page_range = value,
            "maxTokens" => self.generation.max_tokens = parse_number(key, &value)?,
            "temperature" => self.generation.temperature = parse_number(key, &value)?,
            "topP" => self.generation.top_p = parse_number(key, &value)?,
            _ => return Err(SettingsError::UnknownKey(key.to_string())),
        }
        Ok(())
    }

    /// Settings for display, with keys masked.
    pub fn masked(&self) -> BTreeMap<&'static str, String> {
        let mut map = BTreeMap::new();
        for key in SETTING_KEYS {
            let value = match *key {
                "formsEndpoint" => self.forms_endpoint.clone(),
                "formsKey" => mask(&self.forms_key),
                "azureOpenAIEndpoint" => self.azure_openai_endpoint.clone(),
                "azureOpenAIKey" => mask(&self.azure_openai_key),
                "systemInstruction" => self.system_instruction.clone(),
                "welcomeMessage" => self.welcome_message.clone(),
                "placeholder" => self.placeholder.clone(),
                "pageRange" => self.page_range.clone(),
                "maxTokens" => self.generation.max_tokens.to_string(),
                "temperature" => self.generation.temperature.to_string(),
                "topP" => self.generation.top_p.to_string(),
                _ => continue,
            };
            map.insert(*key, value);
        }
        map
    }
}
