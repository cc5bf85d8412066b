use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

use crate::error::ConfigError;
use crate::gemini::DEFAULT_BASE_URL;

pub const API_KEY_VAR: &str = "GOOGLE_API_KEY";

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_model() -> String {
    "gemini-pro".to_string()
}

fn default_vision_model() -> String {
    "gemini-1.5-flash".to_string()
}

fn default_window_width() -> u32 {
    1100
}

fn default_window_height() -> u32 {
    800
}

fn default_window_min_width() -> u32 {
    600
}

fn default_window_min_height() -> u32 {
    400
}

fn default_display_width() -> u32 {
    750
}

fn default_max_upload_dimension() -> u32 {
    1120
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub gemini: GeminiConfig,
    #[serde(default)]
    pub window: WindowConfig,
    #[serde(default)]
    pub image: ImageConfig,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct GeminiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_vision_model")]
    pub vision_model: String,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct WindowConfig {
    #[serde(default = "default_window_width")]
    pub width: u32,
    #[serde(default = "default_window_height")]
    pub height: u32,
    #[serde(default = "default_window_min_width")]
    pub min_width: u32,
    #[serde(default = "default_window_min_height")]
    pub min_height: u32,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct ImageConfig {
    #[serde(default = "default_display_width")]
    pub display_width: u32,
    #[serde(default = "default_max_upload_dimension")]
    pub max_upload_dimension: u32,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        GeminiConfig {
            base_url: default_base_url(),
            model: default_model(),
            vision_model: default_vision_model(),
        }
    }
}

impl Default for WindowConfig {
    fn default() -> Self {
        WindowConfig {
            width: default_window_width(),
            height: default_window_height(),
            min_width: default_window_min_width(),
            min_height: default_window_min_height(),
        }
    }
}

impl Default for ImageConfig {
    fn default() -> Self {
        ImageConfig {
            display_width: default_display_width(),
            max_upload_dimension: default_max_upload_dimension(),
        }
    }
}

impl Config {
    pub fn load() -> Self {
        let config_path = Self::get_config_path();

        if config_path.exists() {
            match fs::read_to_string(&config_path) {
                Ok(contents) => match Self::from_toml_str(&contents) {
                    Ok(config) => return config,
                    Err(e) => tracing::warn!("Error parsing {}: {}. Using defaults.", config_path.display(), e),
                },
                Err(e) => tracing::warn!("Error reading {}: {}. Using defaults.", config_path.display(), e),
            }
        } else if let Some(parent) = config_path.parent() {
            let _ = fs::create_dir_all(parent);
        }

        Config::default()
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }

    pub fn get_config_path() -> PathBuf {
        Self::get_config_dir().join("config.toml")
    }

    pub fn get_config_dir() -> PathBuf {
        if let Some(home) = std::env::var_os("HOME") {
            PathBuf::from(home).join(".config/red-dwarf")
        } else {
            PathBuf::from(".")
        }
    }
}

/// Reads the API key from the environment. A blank value counts as missing.
pub fn api_key_from_env() -> Result<String, ConfigError> {
    api_key_from(std::env::var(API_KEY_VAR).ok())
}

fn api_key_from(value: Option<String>) -> Result<String, ConfigError> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or(ConfigError::MissingApiKey(API_KEY_VAR))
}
