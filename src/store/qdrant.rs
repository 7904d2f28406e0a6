// Qdrant-backed chunk store (read-only search over an indexed collection)
use async_trait::async_trait;
use qdrant_client::qdrant::{
    point_id::PointIdOptions, value::Kind, PointId, SearchPointsBuilder, Value as QdrantValue,
};
use qdrant_client::Qdrant;
use serde_json::Value as JsonValue;
use std::collections::HashMap;

use crate::config::StoreConfig;
use crate::errors::{PipelineError, Result};
use crate::store::{Chunk, ChunkStore, ScoredChunk};

/// Chunk store backed by a Qdrant collection
pub struct QdrantChunkStore {
    client: Qdrant,
    url: String,
    collection: String,
    text_field: String,
    source_field: String,
    category_field: String,
}

impl QdrantChunkStore {
    /// Connect to the configured Qdrant instance (no request is made yet)
    pub fn new(config: &StoreConfig) -> Result<Self> {
        let client = Qdrant::from_url(&config.url)
            .api_key(config.api_key.clone())
            .build()
            .map_err(|e| {
                PipelineError::RetrievalUnavailable(format!("Failed to create Qdrant client: {}", e))
            })?;

        Ok(Self {
            client,
            url: config.url.clone(),
            collection: config.collection.clone(),
            text_field: config.text_field.clone(),
            source_field: config.source_field.clone(),
            category_field: config.category_field.clone(),
        })
    }

    /// Check that the Qdrant server answers
    pub async fn health_check(&self) -> Result<bool> {
        match self.client.health_check().await {
            Ok(_) => Ok(true),
            Err(e) => {
                tracing::warn!(url = %self.url, error = %e, "qdrant health check failed");
                Ok(false)
            }
        }
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    fn point_to_chunk(&self, id: String, payload: HashMap<String, QdrantValue>) -> Chunk {
        let text = payload
            .get(&self.text_field)
            .and_then(qdrant_value_to_string)
            .unwrap_or_default();
        let source = payload
            .get(&self.source_field)
            .and_then(qdrant_value_to_string)
            .unwrap_or_default();
        let category = payload
            .get(&self.category_field)
            .and_then(qdrant_value_to_string);

        let mut metadata = serde_json::Map::new();
        for (key, value) in payload {
            if key == self.text_field || key == self.source_field || key == self.category_field {
                continue;
            }
            if let Some(json_val) = qdrant_to_json_value(&value) {
                metadata.insert(key, json_val);
            }
        }

        Chunk {
            id,
            source,
            text,
            category,
            metadata,
        }
    }
}

#[async_trait]
impl ChunkStore for QdrantChunkStore {
    async fn search(&self, vector: &[f32], k: usize) -> Result<Vec<ScoredChunk>> {
        let response = self
            .client
            .search_points(
                SearchPointsBuilder::new(&self.collection, vector.to_vec(), k as u64)
                    .with_payload(true),
            )
            .await
            .map_err(|e| {
                PipelineError::RetrievalUnavailable(format!(
                    "Failed to search collection {}: {}",
                    self.collection, e
                ))
            })?;

        let results = response
            .result
            .into_iter()
            .map(|point| {
                let id = point_id_to_string(&point.id);
                let chunk = self.point_to_chunk(id, point.payload);
                ScoredChunk::new(chunk, point.score)
            })
            .collect();

        Ok(results)
    }

    async fn count(&self) -> Result<u64> {
        let info = self
            .client
            .collection_info(&self.collection)
            .await
            .map_err(|e| {
                PipelineError::RetrievalUnavailable(format!(
                    "Failed to get collection info for {}: {}",
                    self.collection, e
                ))
            })?;

        Ok(info.result.and_then(|r| r.points_count).unwrap_or(0))
    }

    fn describe(&self) -> String {
        format!("qdrant {} (collection: {})", self.url, self.collection)
    }
}

// Helper functions for payload conversions
fn qdrant_to_json_value(value: &QdrantValue) -> Option<JsonValue> {
    value.kind.as_ref().and_then(|kind| match kind {
        Kind::StringValue(s) => Some(JsonValue::String(s.clone())),
        Kind::IntegerValue(i) => Some(JsonValue::Number((*i).into())),
        Kind::DoubleValue(f) => serde_json::Number::from_f64(*f).map(JsonValue::Number),
        Kind::BoolValue(b) => Some(JsonValue::Bool(*b)),
        _ => None,
    })
}

fn qdrant_value_to_string(value: &QdrantValue) -> Option<String> {
    value.kind.as_ref().and_then(|kind| match kind {
        Kind::StringValue(s) => Some(s.clone()),
        Kind::IntegerValue(i) => Some(i.to_string()),
        _ => None,
    })
}

fn point_id_to_string(point_id: &Option<PointId>) -> String {
    point_id
        .as_ref()
        .and_then(|id| match &id.point_id_options {
            Some(PointIdOptions::Num(n)) => Some(n.to_string()),
            Some(PointIdOptions::Uuid(u)) => Some(u.clone()),
            None => None,
        })
        .unwrap_or_else(|| "unknown".to_string())
}
