//! Bootstrap for PotterBuddy
//!
//! Builds the chunk store, embedder, and generator from configuration and
//! wires them into a [`RAGPipeline`].

use anyhow::{Context, Result};
use colored::Colorize;
use std::sync::Arc;

use crate::config::{Config, StoreBackend, StoreConfig, ENV_GROQ_API_KEY};
use crate::embedding::{Embedder, EmbeddingEngine};
use crate::rag::RAGPipeline;
use crate::store::{ChunkStore, InMemoryChunkStore, QdrantChunkStore};
use crate::streaming::{GenerationOptions, GroqClient};
use crate::telemetry::TelemetryCollector;

/// Exit code for setup needed
pub const EXIT_CODE_SETUP_NEEDED: i32 = 2;

/// Bootstrap check result
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BootstrapStatus {
    Ready,
    MissingApiKey,
    StoreUnreachable(String),
    StoreEmpty,
}

/// Open the configured chunk store
pub fn build_store(config: &StoreConfig) -> Result<Arc<dyn ChunkStore>> {
    match config.backend {
        StoreBackend::Qdrant => {
            let store = QdrantChunkStore::new(config)
                .with_context(|| format!("Failed to connect to Qdrant at {}", config.url))?;
            Ok(Arc::new(store))
        }
        StoreBackend::Memory => {
            let path = config
                .memory_path
                .as_deref()
                .context("store.memory_path is required for the memory backend")?;
            Ok(Arc::new(InMemoryChunkStore::load(path)?))
        }
    }
}

/// Load the embedding model; downloads weights on first use
pub async fn build_embedder(config: &Config) -> Result<Arc<dyn Embedder>> {
    let embedder_config = config.embedder.clone();
    let engine = tokio::task::spawn_blocking(move || EmbeddingEngine::new(&embedder_config))
        .await
        .context("Embedding model loader panicked")?
        .with_context(|| format!("Failed to load embedding model {}", config.embedder.model_id))?;

    Ok(Arc::new(Arc::new(engine)))
}

pub fn generation_options(config: &Config) -> GenerationOptions {
    GenerationOptions {
        max_tokens: config.generator.max_tokens,
        temperature: config.generator.temperature,
        top_p: config.generator.top_p,
    }
}

/// Build the full pipeline from configuration
pub async fn build_pipeline(config: &Config, telemetry: TelemetryCollector) -> Result<RAGPipeline> {
    let generator = GroqClient::new(&config.generator).context("Failed to create Groq client")?;
    let store = build_store(&config.store)?;
    let embedder = build_embedder(config).await?;

    tracing::info!(
        store = %store.describe(),
        model = %config.generator.model,
        embedder = %config.embedder.model_id,
        "pipeline ready"
    );

    Ok(RAGPipeline::new(
        embedder,
        store,
        Arc::new(generator),
        config.rag.clone(),
        generation_options(config),
    )
    .with_telemetry(telemetry))
}

/// Cheap readiness check run before loading the embedding model
pub async fn check(config: &Config) -> BootstrapStatus {
    if config
        .generator
        .api_key
        .as_deref()
        .map_or(true, |k| k.trim().is_empty())
    {
        return BootstrapStatus::MissingApiKey;
    }

    let store = match build_store(&config.store) {
        Ok(store) => store,
        Err(e) => return BootstrapStatus::StoreUnreachable(format!("{:#}", e)),
    };

    match store.count().await {
        Ok(0) => BootstrapStatus::StoreEmpty,
        Ok(_) => BootstrapStatus::Ready,
        Err(e) => BootstrapStatus::StoreUnreachable(e.to_string()),
    }
}

/// Print setup guidance for a failed check
pub fn show_setup_instructions(status: &BootstrapStatus, config: &Config) {
    match status {
        BootstrapStatus::Ready => {}
        BootstrapStatus::MissingApiKey => {
            eprintln!("\n{} {} is not set!", "❌".red(), ENV_GROQ_API_KEY);
            eprintln!("\nGet a free key at https://console.groq.com/keys, then either:");
            eprintln!("   export {}=gsk_...", ENV_GROQ_API_KEY);
            eprintln!("   or add it to a .env file in the current directory");
            eprintln!();
        }
        BootstrapStatus::StoreUnreachable(reason) => {
            eprintln!("\n{} Chunk store unavailable: {}", "❌".red(), reason);
            match config.store.backend {
                StoreBackend::Qdrant => {
                    eprintln!("\n🚀 Start Qdrant locally:");
                    eprintln!("   docker run -p 6333:6333 -p 6334:6334 qdrant/qdrant");
                    eprintln!("\nThen point potterbuddy at it with QDRANT_URL (current: {}).", config.store.url);
                }
                StoreBackend::Memory => {
                    eprintln!("\nCheck store.memory_path in your config file.");
                }
            }
            eprintln!();
        }
        BootstrapStatus::StoreEmpty => {
            eprintln!(
                "\n{} Collection '{}' holds no passages.",
                "⚠️ ".yellow(),
                config.store.collection
            );
            eprintln!("Index the Harry Potter books into it before asking questions.");
            eprintln!();
        }
    }
}
