//! Configuration file handling
//!
//! Settings live in `~/.potterbuddy/config.toml`. Environment variables
//! override the file once at load time.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::rag::pipeline::RAGConfig;
use crate::rag::retrieval::CategoryPolicy;

/// Environment variables consulted once at load time
pub const ENV_GROQ_API_KEY: &str = "GROQ_API_KEY";
pub const ENV_MODEL: &str = "POTTERBUDDY_MODEL";
pub const ENV_QDRANT_URL: &str = "QDRANT_URL";
pub const ENV_QDRANT_API_KEY: &str = "QDRANT_API_KEY";
pub const ENV_COLLECTION: &str = "POTTERBUDDY_COLLECTION";

/// Top-level configuration, built once and handed to component constructors
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub generator: GeneratorConfig,
    #[serde(default)]
    pub embedder: EmbedderConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub rag: RAGConfig,
}

/// Hosted chat-completions endpoint (Groq, OpenAI compatible)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    pub base_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    pub model: String,
    /// Tried in order when the primary model fails
    pub fallback_models: Vec<String>,
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
    /// Per HTTP request
    pub timeout_secs: u64,
    /// Rate-limit retries per model
    pub max_retries: u32,
    /// Stream answers by default; `--stream` turns it on for one run
    pub stream: bool,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.groq.com/openai/v1".to_string(),
            api_key: None,
            model: "llama-3.1-8b-instant".to_string(),
            fallback_models: vec![
                "llama-3.3-70b-versatile".to_string(),
                "gemma2-9b-it".to_string(),
            ],
            max_tokens: 1500,
            temperature: 0.7,
            top_p: 0.9,
            timeout_secs: 45,
            max_retries: 3,
            stream: false,
        }
    }
}

impl GeneratorConfig {
    /// Whether answers are streamed, given the command-line flag
    pub fn streaming(&self, requested: bool) -> bool {
        requested || self.stream
    }
}

/// Local sentence embedder
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbedderConfig {
    pub model_id: String,
    /// Expected vector length; 0 accepts whatever the model produces
    pub dimension: usize,
    pub normalize: bool,
    /// Token truncation length
    pub max_tokens: usize,
}

impl Default for EmbedderConfig {
    fn default() -> Self {
        Self {
            model_id: "sentence-transformers/all-MiniLM-L6-v2".to_string(),
            dimension: 384,
            normalize: true,
            max_tokens: 256,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Qdrant,
    Memory,
}

/// Where the indexed chunks live
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    pub collection: String,
    /// Payload field holding the passage text
    pub text_field: String,
    pub source_field: String,
    pub category_field: String,
    /// JSON export used by the in-memory backend
    pub memory_path: Option<PathBuf>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Qdrant,
            url: "http://localhost:6334".to_string(),
            api_key: None,
            collection: "harry_potter".to_string(),
            text_field: "document".to_string(),
            source_field: "source".to_string(),
            category_field: "category".to_string(),
            memory_path: None,
        }
    }
}

impl Config {
    /// Load from `path` (or the default location), then apply environment overrides
    ///
    /// The default file is created on first use; an explicit path must exist.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::read(path)?,
            None => {
                let default_path = Self::config_path()?;
                if default_path.exists() {
                    Self::read(&default_path)?
                } else {
                    let config = Config::default();
                    config.save_to(&default_path)?;
                    config
                }
            }
        };

        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    fn read(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_toml(&contents)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        toml::from_str(contents).context("Invalid configuration TOML")
    }

    /// Apply overrides from an environment lookup
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(key) = non_empty(ENV_GROQ_API_KEY) {
            self.generator.api_key = Some(key);
        }
        if let Some(model) = non_empty(ENV_MODEL) {
            self.generator.model = model;
        }
        if let Some(url) = non_empty(ENV_QDRANT_URL) {
            self.store.url = url;
        }
        if let Some(key) = non_empty(ENV_QDRANT_API_KEY) {
            self.store.api_key = Some(key);
        }
        if let Some(collection) = non_empty(ENV_COLLECTION) {
            self.store.collection = collection;
        }
    }

    /// Save configuration to the default location
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let toml_string = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(path, toml_string).context("Failed to write config file")?;

        Ok(())
    }

    /// Get the configuration file path
    pub fn config_path() -> Result<PathBuf> {
        let home = dirs::home_dir().context("Could not determine home directory")?;

        Ok(home.join(".potterbuddy").join("config.toml"))
    }

    /// All models the generator may try, primary first
    pub fn models(&self) -> Vec<String> {
        let mut models = vec![self.generator.model.clone()];
        for model in &self.generator.fallback_models {
            if !models.contains(model) {
                models.push(model.clone());
            }
        }
        models
    }

    /// Human-readable list of configuration problems (empty when valid)
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.generator.api_key.as_deref().map_or(true, |k| k.trim().is_empty()) {
            errors.push(format!("{} not set in environment or config", ENV_GROQ_API_KEY));
        }
        if self.generator.model.trim().is_empty() {
            errors.push("generator.model is empty".to_string());
        }
        if !(0.0..=2.0).contains(&self.generator.temperature) {
            errors.push(format!(
                "generator.temperature {} outside 0.0..=2.0",
                self.generator.temperature
            ));
        }

        let search = &self.rag.search;
        if search.top_k == 0 {
            errors.push("rag.search.top_k must be positive".to_string());
        }
        if !(0.0..=1.0).contains(&search.threshold) {
            errors.push(format!("rag.search.threshold {} outside 0.0..=1.0", search.threshold));
        }
        if !(0.0..=1.0).contains(&search.dedup_similarity) {
            errors.push(format!(
                "rag.search.dedup_similarity {} outside 0.0..=1.0",
                search.dedup_similarity
            ));
        }
        if search.category_policy == CategoryPolicy::Boost && search.category_boost < 0.0 {
            errors.push("rag.search.category_boost must not be negative".to_string());
        }
        if self.rag.context.budget_chars == 0 {
            errors.push("rag.context.budget_chars must be positive".to_string());
        }

        if self.store.backend == StoreBackend::Memory {
            match &self.store.memory_path {
                None => errors.push("store.memory_path required for the memory backend".to_string()),
                Some(path) if !path.exists() => {
                    errors.push(format!("Chunk file not found at: {}", path.display()))
                }
                Some(_) => {}
            }
        }

        errors
    }
}
