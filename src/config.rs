//! Carga y gestión de configuración de la aplicación (Qdrant + LLM + ingesta).

use std::env;
use anyhow::{anyhow, Result};
use url::Url;

/// Estrategia de troceado de documentos en chunks.
///
/// Las dos variantes coexisten en el sistema; la autoritativa se elige
/// por configuración (`CHUNK_STRATEGY`).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChunkStrategy {
    FixedWindow,
    ParagraphAware,
}

impl ChunkStrategy {
    pub fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "fixed" | "fixed_window" => Ok(Self::FixedWindow),
            "paragraph" | "paragraph_aware" => Ok(Self::ParagraphAware),
            other => Err(anyhow!("Estrategia de chunking no soportada: {other}")),
        }
    }
}

/// Configuración completa de la aplicación.
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub qdrant_url: String,
    pub qdrant_collection: String,
    pub server_addr: String,

    pub llm_api_url: String,
    pub llm_api_key: String,
    pub llm_chat_model: String,

    pub embedding_api_url: String,
    pub embedding_model: String,
    pub embedding_dim: usize,

    pub raw_dir: String,
    pub docs_dir: String,
    pub manifest_path: String,

    pub chunk_strategy: ChunkStrategy,
    pub chunk_size: usize,
    pub chunk_overlap: usize,

    pub top_k: usize,
    pub min_score: f32,
    pub relevance_threshold: f32,
    pub confidence_enabled: bool,
}

impl AppConfig {
    /// Carga la configuración desde variables de entorno (usando .env si existe).
    pub fn from_env() -> Result<Self> {
        let llm_api_url = env::var("LLM_API_URL")
            .map_err(|_| anyhow!("Falta LLM_API_URL en el entorno"))?;
        let llm_api_key = env::var("LLM_API_KEY")
            .map_err(|_| anyhow!("Falta LLM_API_KEY en el entorno"))?;
        let llm_chat_model =
            env::var("LLM_CHAT_MODEL").unwrap_or_else(|_| "llama-3.1-8b-instant".to_string());

        let embedding_api_url = env::var("EMBEDDING_API_URL")
            .map_err(|_| anyhow!("Falta EMBEDDING_API_URL en el entorno"))?;
        let embedding_model = env::var("EMBEDDING_MODEL")
            .unwrap_or_else(|_| "text-embedding-3-small".to_string());
        let embedding_dim = parse_var("EMBEDDING_DIM", 1536usize)?;

        let qdrant_url =
            env::var("QDRANT_URL").unwrap_or_else(|_| "http://localhost:6333".to_string());
        let qdrant_collection =
            env::var("QDRANT_COLLECTION").unwrap_or_else(|_| "student_docs".to_string());

        let server_addr =
            env::var("SERVER_ADDR").unwrap_or_else(|_| "127.0.0.1:3322".to_string());

        let raw_dir = env::var("RAW_DIR").unwrap_or_else(|_| "data/raw".to_string());
        let docs_dir = env::var("DOCS_DIR").unwrap_or_else(|_| "data/processed".to_string());
        let manifest_path =
            env::var("MANIFEST_PATH").unwrap_or_else(|_| "embeddings/metadata.json".to_string());

        let chunk_strategy_str =
            env::var("CHUNK_STRATEGY").unwrap_or_else(|_| "fixed".to_string());
        let chunk_strategy = ChunkStrategy::from_str(&chunk_strategy_str)?;
        let chunk_size = parse_var("CHUNK_SIZE", 500usize)?;
        let chunk_overlap = parse_var("CHUNK_OVERLAP", 50usize)?;

        let top_k = parse_var("TOP_K", 5usize)?;
        let min_score = parse_var("MIN_SCORE", 0.6f32)?;
        let relevance_threshold = parse_var("RELEVANCE_THRESHOLD", 0.5f32)?;
        let confidence_enabled = parse_var("CONFIDENCE_ENABLED", true)?;

        // Validaciones que de otro modo fallarían a mitad de una ingesta.
        if chunk_size == 0 {
            return Err(anyhow!("CHUNK_SIZE debe ser mayor que cero"));
        }
        if chunk_overlap >= chunk_size {
            return Err(anyhow!(
                "CHUNK_OVERLAP ({chunk_overlap}) debe ser menor que CHUNK_SIZE ({chunk_size})"
            ));
        }
        if top_k == 0 {
            return Err(anyhow!("TOP_K debe ser mayor que cero"));
        }
        Url::parse(&llm_api_url)
            .map_err(|e| anyhow!("LLM_API_URL no es una URL válida: {e}"))?;
        Url::parse(&embedding_api_url)
            .map_err(|e| anyhow!("EMBEDDING_API_URL no es una URL válida: {e}"))?;
        Url::parse(&qdrant_url)
            .map_err(|e| anyhow!("QDRANT_URL no es una URL válida: {e}"))?;

        Ok(Self {
            qdrant_url,
            qdrant_collection,
            server_addr,
            llm_api_url,
            llm_api_key,
            llm_chat_model,
            embedding_api_url,
            embedding_model,
            embedding_dim,
            raw_dir,
            docs_dir,
            manifest_path,
            chunk_strategy,
            chunk_size,
            chunk_overlap,
            top_k,
            min_score,
            relevance_threshold,
            confidence_enabled,
        })
    }
}

/// Lee una variable de entorno tipada, con valor por defecto si no está.
fn parse_var<T: std::str::FromStr>(name: &str, default: T) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| anyhow!("Valor inválido para {name}: {e}")),
        Err(_) => Ok(default),
    }
}
