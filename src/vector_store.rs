//! Integración con Qdrant como vector store vía su API REST.
//!
//! API pública:
//!   - `VectorIndex` (trait inyectable)
//!   - `QdrantStore::ensure_collection()`
//!   - `QdrantStore::upsert_points(...)` / `search(...)`.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::info;

use crate::config::AppConfig;
use crate::models::{ChunkPoint, SearchHit};

/// Índice vectorial con upsert y búsqueda por vecindad.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    async fn upsert_points(&self, points: &[ChunkPoint]) -> Result<()>;
    async fn search(&self, vector: &[f32], limit: usize) -> Result<Vec<SearchHit>>;
}

#[derive(Debug, Clone)]
pub struct QdrantStore {
    http: reqwest::Client,
    endpoint: String,
    collection: String,
    vector_size: usize,
}

impl QdrantStore {
    pub fn from_config(cfg: &AppConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint: cfg.qdrant_url.trim_end_matches('/').to_string(),
            collection: cfg.qdrant_collection.clone(),
            vector_size: cfg.embedding_dim,
        }
    }

    /// Garantiza que la colección exista, creándola con distancia coseno
    /// si hace falta.
    pub async fn ensure_collection(&self) -> Result<()> {
        let url = format!("{}/collections/{}", self.endpoint, self.collection);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .context("No se pudo contactar con Qdrant")?;

        if response.status().is_success() {
            info!("Colección '{}' ya existe en Qdrant.", self.collection);
            return Ok(());
        }

        let response = self
            .http
            .put(&url)
            .json(&json!({
                "vectors": {
                    "size": self.vector_size,
                    "distance": "Cosine",
                }
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("Qdrant no pudo crear la colección: {status}\n{body}"));
        }

        info!(
            "Colección '{}' creada en Qdrant (dim {}, coseno).",
            self.collection, self.vector_size
        );
        Ok(())
    }
}

#[async_trait]
impl VectorIndex for QdrantStore {
    async fn upsert_points(&self, points: &[ChunkPoint]) -> Result<()> {
        if points.is_empty() {
            return Ok(());
        }

        let body: Vec<Value> = points
            .iter()
            .map(|p| {
                json!({
                    "id": p.id,
                    "vector": p.vector,
                    "payload": { "text": p.text, "source": p.source },
                })
            })
            .collect();

        let response = self
            .http
            .put(format!(
                "{}/collections/{}/points?wait=true",
                self.endpoint, self.collection
            ))
            .json(&json!({ "points": body }))
            .send()
            .await
            .context("No se pudo contactar con Qdrant")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("Qdrant rechazó el upsert: {status}\n{body}"));
        }

        Ok(())
    }

    /// Búsqueda de los `limit` vecinos más cercanos. Se pide también el
    /// vector almacenado para el filtro secundario de relevancia.
    async fn search(&self, vector: &[f32], limit: usize) -> Result<Vec<SearchHit>> {
        let response = self
            .http
            .post(format!(
                "{}/collections/{}/points/search",
                self.endpoint, self.collection
            ))
            .json(&json!({
                "vector": vector,
                "limit": limit,
                "with_payload": true,
                "with_vector": true,
            }))
            .send()
            .await
            .context("No se pudo contactar con Qdrant")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("Qdrant rechazó la búsqueda: {status}\n{body}"));
        }

        let parsed: Value = response
            .json()
            .await
            .context("Respuesta de Qdrant no es JSON válido")?;
        let hits = parsed
            .pointer("/result")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        let mut output = Vec::with_capacity(hits.len());
        for hit in hits {
            let score = hit.pointer("/score").and_then(Value::as_f64).unwrap_or(0.0) as f32;
            let text = hit
                .pointer("/payload/text")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            let source = hit
                .pointer("/payload/source")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            let vector: Vec<f32> = hit
                .pointer("/vector")
                .and_then(Value::as_array)
                .map(|v| v.iter().map(|x| x.as_f64().unwrap_or(0.0) as f32).collect())
                .unwrap_or_default();

            output.push(SearchHit { text, source, score, vector });
        }

        Ok(output)
    }
}
