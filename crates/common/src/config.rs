//! Service configuration
//!
//! Values are resolved in three layers: built-in defaults, an optional YAML file
//! named by `DERMAI_CONFIG`, then individual environment variables.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {error}")]
    Read { path: String, error: String },

    #[error("Failed to parse config file {path}: {error}")]
    Parse { path: String, error: String },

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error("{0} missing in environment")]
    MissingSecret(String),
}

/// Numeric preprocessing applied to RGB pixels before inference
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum NormalizationScheme {
    /// Raw `[0, 255]` floats; the network carries its own rescaling layer
    #[default]
    #[serde(rename = "efficientnetv2")]
    EfficientNetV2,
    /// `x / 127.5 - 1`, mapping pixels into `[-1, 1]`
    #[serde(rename = "scaled_centered")]
    ScaledCentered,
    /// `(x / 255 - mean) / std` with ImageNet channel statistics
    #[serde(rename = "imagenet")]
    ImageNet,
}

impl FromStr for NormalizationScheme {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "efficientnetv2" | "efficientnet_v2" | "raw" => Ok(Self::EfficientNetV2),
            "scaled_centered" | "tf" => Ok(Self::ScaledCentered),
            "imagenet" | "torch" => Ok(Self::ImageNet),
            _ => Err(format!(
                "unknown normalization '{s}'. Valid options: efficientnetv2, scaled_centered, imagenet"
            )),
        }
    }
}

/// Gemini API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeminiConfig {
    /// API key (required)
    pub api_key: String,
    /// Model identifier
    pub model: String,
    /// API base URL
    pub base_url: String,
    /// Request timeout in seconds
    pub timeout_secs: u64,
    /// Retries on transient failures (timeouts, connection errors, 5xx, 429)
    pub max_retries: u32,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: "gemini-flash-latest".to_string(),
            base_url: "https://generativelanguage.googleapis.com".to_string(),
            timeout_secs: 30,
            max_retries: 0,
        }
    }
}

/// Top-level service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Socket address to bind
    pub bind_addr: String,
    /// ONNX model artifact
    pub model_path: PathBuf,
    /// JSON array of raw class labels, in model output order
    pub labels_path: PathBuf,
    /// Optional JSON object overriding raw label -> display name entries
    pub display_names_path: Option<PathBuf>,
    /// Pixel preprocessing scheme matching the model's training
    pub normalization: NormalizationScheme,
    /// Load the model before accepting connections
    pub preload_model: bool,
    /// Maximum request body size in MiB
    pub max_upload_mb: usize,
    pub gemini: GeminiConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:5000".to_string(),
            model_path: PathBuf::from("models/skin_cnn.onnx"),
            labels_path: PathBuf::from("class_labels.json"),
            display_names_path: None,
            normalization: NormalizationScheme::default(),
            preload_model: true,
            max_upload_mb: 16,
            gemini: GeminiConfig::default(),
        }
    }
}

impl ServiceConfig {
    /// Resolve configuration from defaults, `DERMAI_CONFIG` and the process environment
    ///
    /// # Errors
    /// Returns error if the YAML file is unreadable, a variable fails to parse,
    /// or the Gemini API key is absent
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match std::env::var("DERMAI_CONFIG") {
            Ok(path) => Self::from_yaml(path)?,
            Err(_) => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a YAML file; absent fields keep their defaults
    pub fn from_yaml(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            error: e.to_string(),
        })?;
        serde_yaml::from_str(&contents).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            error: e.to_string(),
        })
    }

    /// Override fields from environment-style lookups
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("DERMAI_ADDR") {
            self.bind_addr = v;
        }
        if let Some(v) = lookup("DERMAI_MODEL_PATH") {
            self.model_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("DERMAI_LABELS_PATH") {
            self.labels_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("DERMAI_DISPLAY_NAMES_PATH") {
            self.display_names_path = Some(PathBuf::from(v));
        }
        if let Some(v) = lookup("DERMAI_NORMALIZATION") {
            self.normalization = parse_value("DERMAI_NORMALIZATION", &v)?;
        }
        if let Some(v) = lookup("DERMAI_PRELOAD_MODEL") {
            self.preload_model = parse_bool("DERMAI_PRELOAD_MODEL", &v)?;
        }
        if let Some(v) = lookup("DERMAI_MAX_UPLOAD_MB") {
            self.max_upload_mb = parse_value("DERMAI_MAX_UPLOAD_MB", &v)?;
        }
        if let Some(v) = lookup("GEMINI_API_KEY") {
            self.gemini.api_key = v;
        }
        if let Some(v) = lookup("GEMINI_MODEL") {
            self.gemini.model = v;
        }
        if let Some(v) = lookup("GEMINI_BASE_URL") {
            self.gemini.base_url = v;
        }
        if let Some(v) = lookup("GEMINI_TIMEOUT_SECS") {
            self.gemini.timeout_secs = parse_value("GEMINI_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = lookup("GEMINI_MAX_RETRIES") {
            self.gemini.max_retries = parse_value("GEMINI_MAX_RETRIES", &v)?;
        }
        Ok(())
    }

    /// Check required settings
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.gemini.api_key.trim().is_empty() {
            return Err(ConfigError::MissingSecret("GEMINI_API_KEY".to_string()));
        }
        if self.max_upload_mb == 0 {
            return Err(ConfigError::InvalidValue {
                key: "max_upload_mb".to_string(),
                value: "0".to_string(),
            });
        }
        Ok(())
    }

    /// Request body limit in bytes
    #[must_use]
    pub fn max_upload_bytes(&self) -> usize {
        self.max_upload_mb.saturating_mul(1024 * 1024)
    }
}

fn parse_value<T: FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
        }),
    }
}
