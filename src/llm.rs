//! Clientes HTTP para el LLM alojado (chat completions) y para el
//! servicio de embeddings, ambos detrás de traits para poder
//! sustituirlos en tests.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};

use crate::config::AppConfig;

/// Mensaje del protocolo de chat `{role, content}`.
#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: "system".to_string(), content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: "user".to_string(), content: content.into() }
    }
}

/// Modelo de chat: una petición de completion por llamada.
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String>;
}

/// Generador de embeddings de texto.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Cliente del LLM alojado vía la API de chat completions.
#[derive(Debug, Clone)]
pub struct ChatClient {
    http: reqwest::Client,
    api_url: String,
    api_key: String,
    model: String,
}

impl ChatClient {
    pub fn from_config(cfg: &AppConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_url: cfg.llm_api_url.clone(),
            api_key: cfg.llm_api_key.clone(),
            model: cfg.llm_chat_model.clone(),
        }
    }
}

#[async_trait]
impl ChatModel for ChatClient {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        let response = self
            .http
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(&json!({
                "model": self.model,
                "messages": messages,
            }))
            .send()
            .await
            .context("No se pudo contactar con la API del LLM")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("Error de la API del LLM: {status}\n{body}"));
        }

        let parsed: Value = response
            .json()
            .await
            .context("Respuesta del LLM no es JSON válido")?;
        let content = parsed
            .pointer("/choices/0/message/content")
            .and_then(Value::as_str)
            .ok_or_else(|| anyhow!("Respuesta del LLM sin choices[0].message.content"))?;

        Ok(content.to_string())
    }
}

/// Cliente del servicio de embeddings (formato OpenAI-compatible).
#[derive(Debug, Clone)]
pub struct HttpEmbedder {
    http: reqwest::Client,
    api_url: String,
    api_key: String,
    model: String,
}

impl HttpEmbedder {
    pub fn from_config(cfg: &AppConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_url: cfg.embedding_api_url.clone(),
            api_key: cfg.llm_api_key.clone(),
            model: cfg.embedding_model.clone(),
        }
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let response = self
            .http
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(&json!({
                "model": self.model,
                "input": texts,
            }))
            .send()
            .await
            .context("No se pudo contactar con la API de embeddings")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("Error de la API de embeddings: {status}\n{body}"));
        }

        let parsed: Value = response
            .json()
            .await
            .context("Respuesta de embeddings no es JSON válido")?;
        let data = parsed
            .pointer("/data")
            .and_then(Value::as_array)
            .ok_or_else(|| anyhow!("Respuesta de embeddings sin campo 'data'"))?;

        let mut vectors = Vec::with_capacity(data.len());
        for item in data {
            let vector: Vec<f32> = item
                .pointer("/embedding")
                .and_then(Value::as_array)
                .ok_or_else(|| anyhow!("Entrada de embedding sin campo 'embedding'"))?
                .iter()
                .map(|v| v.as_f64().unwrap_or(0.0) as f32)
                .collect();
            vectors.push(vector);
        }

        if vectors.len() != texts.len() {
            return Err(anyhow!(
                "Número de embeddings ({}) distinto al número de textos ({})",
                vectors.len(),
                texts.len()
            ));
        }

        Ok(vectors)
    }
}

/// Interpreta la autoevaluación de confianza del modelo.
///
/// Sólo se acepta un entero 1..=5; cualquier otra cosa degrada a 0.
pub fn parse_confidence(raw: &str) -> u8 {
    raw.trim()
        .parse::<u8>()
        .ok()
        .filter(|v| (1..=5).contains(v))
        .unwrap_or(0)
}
