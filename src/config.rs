use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::document::DEFAULT_PREVIEW_CHARS;
use crate::semantic::DEFAULT_MODEL;

/// Default number of hits returned by a search
const DEFAULT_TOP_K: usize = 5;
/// Default number of documents the store reserves room for
const DEFAULT_EXPECTED_DOCUMENTS: usize = 256;
/// Default deadline for a single embedding call in seconds
const DEFAULT_EMBED_TIMEOUT_SECS: u64 = 30;

const DEFAULT_VISION_MODEL: &str = "claude-3-haiku-20240307";
const DEFAULT_VISION_MAX_TOKENS: u32 = 300;
/// Images larger than this on either side are downscaled before upload
const DEFAULT_VISION_MAX_DIMENSION: u32 = 1024;
const DEFAULT_VISION_TIMEOUT_SECS: u64 = 60;
const DEFAULT_VISION_CACHE_CAPACITY: u64 = 1024;

const DEFAULT_OCR_BINARY: &str = "tesseract";
const DEFAULT_OCR_TIMEOUT_SECS: u64 = 30;

/// Environment variable consulted when `vision.api_key` is not set
pub const API_KEY_ENV: &str = "ANTHROPIC_API_KEY";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("config is malformed: {0}")]
    Parse(#[from] serde_yml::Error),

    #[error("{0}")]
    Invalid(String),
}

/// Configuration for indexing and search
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Model name for embeddings (e.g., "all-MiniLM-L6-v2")
    #[serde(default = "default_model")]
    pub model: String,

    /// Directory for downloaded models; `~/.cache/shotsearch` when unset
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,

    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Length of the OCR and vision previews stored with each entry
    #[serde(default = "default_preview_chars")]
    pub preview_chars: usize,

    #[serde(default = "default_expected_documents")]
    pub expected_documents: usize,

    #[serde(default = "default_embed_timeout_secs")]
    pub embed_timeout_secs: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            cache_dir: None,
            top_k: DEFAULT_TOP_K,
            preview_chars: DEFAULT_PREVIEW_CHARS,
            expected_documents: DEFAULT_EXPECTED_DOCUMENTS,
            embed_timeout_secs: DEFAULT_EMBED_TIMEOUT_SECS,
        }
    }
}

impl SearchConfig {
    /// Where model files are cached, if a location can be determined.
    pub fn models_dir(&self) -> Option<PathBuf> {
        let base = match &self.cache_dir {
            Some(dir) => Some(dir.clone()),
            None => homedir::my_home()
                .ok()
                .flatten()
                .map(|home| home.join(".cache").join("shotsearch")),
        };
        base.map(|dir| dir.join("models"))
    }

    pub fn embed_timeout(&self) -> Duration {
        Duration::from_secs(self.embed_timeout_secs)
    }
}

/// Configuration for the vision-description client
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VisionConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// API key; falls back to the ANTHROPIC_API_KEY environment variable
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,

    #[serde(default = "default_vision_model")]
    pub model: String,

    #[serde(default = "default_vision_max_tokens")]
    pub max_tokens: u32,

    #[serde(default = "default_vision_max_dimension")]
    pub max_dimension: u32,

    #[serde(default = "default_vision_timeout_secs")]
    pub timeout_secs: u64,

    /// Number of descriptions kept in the content cache
    #[serde(default = "default_vision_cache_capacity")]
    pub cache_capacity: u64,
}

impl Default for VisionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            api_key: None,
            model: default_vision_model(),
            max_tokens: DEFAULT_VISION_MAX_TOKENS,
            max_dimension: DEFAULT_VISION_MAX_DIMENSION,
            timeout_secs: DEFAULT_VISION_TIMEOUT_SECS,
            cache_capacity: DEFAULT_VISION_CACHE_CAPACITY,
        }
    }
}

impl VisionConfig {
    /// The configured key, or the one from the environment. Blank keys count as missing.
    pub fn resolved_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .or_else(|| std::env::var(API_KEY_ENV).ok())
            .filter(|key| !key.trim().is_empty())
    }
}

/// Configuration for the OCR subprocess
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OcrConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_ocr_binary")]
    pub binary: String,

    #[serde(default = "default_ocr_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            binary: default_ocr_binary(),
            timeout_secs: DEFAULT_OCR_TIMEOUT_SECS,
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub vision: VisionConfig,
    #[serde(default)]
    pub ocr: OcrConfig,
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_top_k() -> usize {
    DEFAULT_TOP_K
}

fn default_preview_chars() -> usize {
    DEFAULT_PREVIEW_CHARS
}

fn default_expected_documents() -> usize {
    DEFAULT_EXPECTED_DOCUMENTS
}

fn default_embed_timeout_secs() -> u64 {
    DEFAULT_EMBED_TIMEOUT_SECS
}

fn default_true() -> bool {
    true
}

fn default_vision_model() -> String {
    DEFAULT_VISION_MODEL.to_string()
}

fn default_vision_max_tokens() -> u32 {
    DEFAULT_VISION_MAX_TOKENS
}

fn default_vision_max_dimension() -> u32 {
    DEFAULT_VISION_MAX_DIMENSION
}

fn default_vision_timeout_secs() -> u64 {
    DEFAULT_VISION_TIMEOUT_SECS
}

fn default_vision_cache_capacity() -> u64 {
    DEFAULT_VISION_CACHE_CAPACITY
}

fn default_ocr_binary() -> String {
    DEFAULT_OCR_BINARY.to_string()
}

fn default_ocr_timeout_secs() -> u64 {
    DEFAULT_OCR_TIMEOUT_SECS
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let search = &self.search;
        if search.model.trim().is_empty() {
            return Err(ConfigError::Invalid("search.model must not be empty".into()));
        }
        if search.top_k == 0 {
            return Err(ConfigError::Invalid("search.top_k must be greater than 0".into()));
        }
        if search.preview_chars == 0 || search.preview_chars > DEFAULT_PREVIEW_CHARS {
            return Err(ConfigError::Invalid(format!(
                "search.preview_chars must be between 1 and {DEFAULT_PREVIEW_CHARS}"
            )));
        }
        if search.embed_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "search.embed_timeout_secs must be greater than 0".into(),
            ));
        }

        let vision = &self.vision;
        if vision.max_tokens == 0 {
            return Err(ConfigError::Invalid("vision.max_tokens must be greater than 0".into()));
        }
        if vision.max_dimension == 0 {
            return Err(ConfigError::Invalid(
                "vision.max_dimension must be greater than 0".into(),
            ));
        }
        if vision.timeout_secs == 0 {
            return Err(ConfigError::Invalid("vision.timeout_secs must be greater than 0".into()));
        }
        if vision.cache_capacity == 0 {
            return Err(ConfigError::Invalid(
                "vision.cache_capacity must be greater than 0".into(),
            ));
        }

        if self.ocr.timeout_secs == 0 {
            return Err(ConfigError::Invalid("ocr.timeout_secs must be greater than 0".into()));
        }

        Ok(())
    }

    pub fn from_yaml(config_str: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yml::from_str(config_str)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a YAML config. No path, or a path that does not exist, yields defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let Some(path) = path.filter(|p| p.exists()) else {
            let config = Self::default();
            config.validate()?;
            return Ok(config);
        };

        let config_str = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        Self::from_yaml(&config_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.search.top_k, 5);
        assert_eq!(config.search.preview_chars, 500);
        assert_eq!(config.vision.max_dimension, 1024);
    }

    #[test]
    fn test_partial_yaml_fills_defaults() {
        let config = Config::from_yaml("search:\n  top_k: 10\nocr:\n  enabled: false\n").unwrap();
        assert_eq!(config.search.top_k, 10);
        assert_eq!(config.search.model, DEFAULT_MODEL);
        assert!(!config.ocr.enabled);
        assert_eq!(config.ocr.binary, "tesseract");
        assert!(config.vision.enabled);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let result = Config::from_yaml("search:\n  top_k: 0\n");
        assert!(matches!(result, Err(ConfigError::Invalid(_))));

        let result = Config::from_yaml("vision:\n  cache_capacity: 0\n");
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_preview_chars_bounded() {
        let config = Config::from_yaml("search:\n  preview_chars: 120\n").unwrap();
        assert_eq!(config.search.preview_chars, 120);

        let result = Config::from_yaml("search:\n  preview_chars: 500\n");
        assert!(result.is_ok());

        let result = Config::from_yaml("search:\n  preview_chars: 5000\n");
        assert!(matches!(result, Err(ConfigError::Invalid(_))));

        let result = Config::from_yaml("search:\n  preview_chars: 0\n");
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_malformed_yaml_rejected() {
        let result = Config::from_yaml("search: [not, a, map");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_load_missing_file_gives_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let config = Config::load(Some(&tmp.path().join("missing.yaml"))).unwrap();
        assert_eq!(config.search.top_k, 5);
    }

    #[test]
    fn test_load_from_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.yaml");
        std::fs::write(&path, "search:\n  model: bge-small-en-v1.5\n").unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.search.model, "bge-small-en-v1.5");
    }

    #[test]
    fn test_models_dir_uses_cache_dir() {
        let config = SearchConfig {
            cache_dir: Some(PathBuf::from("/var/cache/shots")),
            ..Default::default()
        };
        assert_eq!(config.models_dir(), Some(PathBuf::from("/var/cache/shots/models")));
    }

    #[test]
    fn test_configured_api_key_wins() {
        let vision = VisionConfig {
            api_key: Some("sk-test".into()),
            ..Default::default()
        };
        assert_eq!(vision.resolved_api_key(), Some("sk-test".to_string()));
    }
}
