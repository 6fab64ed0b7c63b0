//! Text embedding providers.
//!
//! - [`EmbeddingProvider`]: the seam the search engine talks to
//! - [`FastEmbedProvider`]: local ONNX models through fastembed
//! - [`fastembed_chain`]: the ordered load strategies used by default

use fastembed::{InitOptions, TextEmbedding};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use crate::config::SearchConfig;
use crate::semantic::deadline::DeadlineError;
use crate::semantic::fallback::FallbackChain;

/// Turns text into fixed-length vectors.
///
/// `dimensions()` is constant for the lifetime of a provider and `encode`
/// is deterministic for a given model version.
pub trait EmbeddingProvider: Send + Sync {
    fn name(&self) -> &str;

    fn dimensions(&self) -> usize;

    fn encode(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;
}

/// Error type for embedding operations
#[derive(Debug, thiserror::Error)]
pub enum EmbeddingError {
    #[error("Model initialization failed: {0}")]
    InitFailed(String),

    #[error("Embedding generation failed: {0}")]
    EmbeddingFailed(String),

    #[error("Invalid model name: {0}")]
    InvalidModel(String),

    #[error("Embedding call failed: {0}")]
    Deadline(#[from] DeadlineError),
}

/// Wrapper around fastembed's TextEmbedding model.
/// Uses a Mutex because fastembed's embed() requires &mut self.
pub struct FastEmbedProvider {
    model: Mutex<TextEmbedding>,
    model_name: String,
    dimensions: usize,
}

impl FastEmbedProvider {
    /// Load `model_name`, downloading it on first use.
    ///
    /// With `cache_dir` the model files live there, otherwise fastembed
    /// picks its default cache location.
    pub fn load(model_name: &str, cache_dir: Option<PathBuf>) -> Result<Self, EmbeddingError> {
        let model_enum = parse_model_name(model_name)?;

        let mut options = InitOptions::new(model_enum).with_show_download_progress(false);
        if let Some(dir) = cache_dir {
            std::fs::create_dir_all(&dir).map_err(|e| {
                EmbeddingError::InitFailed(format!("Failed to create models directory: {}", e))
            })?;
            options = options.with_cache_dir(dir);
        }

        let mut model = TextEmbedding::try_new(options)
            .map_err(|e| EmbeddingError::InitFailed(e.to_string()))?;

        let dimensions = probe_dimensions(&mut model)?;

        Ok(Self {
            model: Mutex::new(model),
            model_name: model_name.to_string(),
            dimensions,
        })
    }
}

impl EmbeddingProvider for FastEmbedProvider {
    fn name(&self) -> &str {
        &self.model_name
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn encode(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let mut model = self.model.lock().map_err(|e| {
            EmbeddingError::EmbeddingFailed(format!("Failed to acquire model lock: {}", e))
        })?;

        let embeddings = model
            .embed(vec![text], None)
            .map_err(|e| EmbeddingError::EmbeddingFailed(e.to_string()))?;

        embeddings
            .into_iter()
            .next()
            .ok_or_else(|| EmbeddingError::EmbeddingFailed("No embedding returned".to_string()))
    }
}

/// Default load order for the configured model:
/// 1. `pinned`: the configured cache directory
/// 2. `default`: fastembed's own cache location
/// 3. `compatibility`: the quantized variant of the same model
pub fn fastembed_chain(config: &SearchConfig) -> FallbackChain<Arc<dyn EmbeddingProvider>> {
    let pinned_model = config.model.clone();
    let pinned_dir = config.models_dir();
    let default_model = config.model.clone();
    let compat_model = quantized_variant(&config.model);

    FallbackChain::new("embedding provider")
        .then("pinned", move || {
            let dir = pinned_dir.clone().ok_or_else(|| {
                EmbeddingError::InitFailed("no model cache directory available".to_string())
            })?;
            FastEmbedProvider::load(&pinned_model, Some(dir)).map(into_provider)
        })
        .then("default", move || {
            FastEmbedProvider::load(&default_model, None).map(into_provider)
        })
        .then("compatibility", move || {
            FastEmbedProvider::load(&compat_model, None).map(into_provider)
        })
}

fn into_provider(provider: FastEmbedProvider) -> Arc<dyn EmbeddingProvider> {
    Arc::new(provider)
}

/// Name of the quantized sibling of `name` (`-q` suffix).
pub fn quantized_variant(name: &str) -> String {
    if name.to_lowercase().ends_with("-q") {
        name.to_string()
    } else {
        format!("{name}-q")
    }
}

/// Parse model name string to fastembed enum.
pub fn parse_model_name(name: &str) -> Result<fastembed::EmbeddingModel, EmbeddingError> {
    match name.to_lowercase().as_str() {
        "all-minilm-l6-v2" | "allminiml6v2" => Ok(fastembed::EmbeddingModel::AllMiniLML6V2),
        "all-minilm-l6-v2-q" | "allminiml6v2q" => Ok(fastembed::EmbeddingModel::AllMiniLML6V2Q),
        "bge-small-en-v1.5" | "bgesmallenv15" => Ok(fastembed::EmbeddingModel::BGESmallENV15),
        "bge-small-en-v1.5-q" | "bgesmallenv15q" => Ok(fastembed::EmbeddingModel::BGESmallENV15Q),
        "bge-base-en-v1.5" | "bgebaseenv15" => Ok(fastembed::EmbeddingModel::BGEBaseENV15),
        "bge-base-en-v1.5-q" | "bgebaseenv15q" => Ok(fastembed::EmbeddingModel::BGEBaseENV15Q),
        "bge-large-en-v1.5" | "bgelargeenv15" => Ok(fastembed::EmbeddingModel::BGELargeENV15),
        "bge-large-en-v1.5-q" | "bgelargeenv15q" => Ok(fastembed::EmbeddingModel::BGELargeENV15Q),
        _ => Err(EmbeddingError::InvalidModel(format!(
            "Unknown model: {}. Supported models: all-MiniLM-L6-v2, bge-small-en-v1.5, bge-base-en-v1.5, bge-large-en-v1.5 (add -q suffix for quantized)",
            name
        ))),
    }
}

/// Probe the model to determine embedding dimensions.
fn probe_dimensions(model: &mut TextEmbedding) -> Result<usize, EmbeddingError> {
    let test_embeddings = model
        .embed(vec!["test"], None)
        .map_err(|e| EmbeddingError::InitFailed(format!("Failed to probe dimensions: {}", e)))?;

    test_embeddings
        .first()
        .map(|v| v.len())
        .ok_or_else(|| EmbeddingError::InitFailed("Model returned no embedding".to_string()))
}
