//! Modelos de dominio (documentos, puntos del vector store y manifiesto).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Documento crudo leído del directorio de ingesta.
/// Se descarta una vez troceado en chunks.
#[derive(Debug, Clone)]
pub struct Document {
    pub text: String,
    pub source: String,
}

/// Punto listo para insertar en Qdrant: vector + payload {text, source}.
#[derive(Debug, Clone)]
pub struct ChunkPoint {
    pub id: String,
    pub vector: Vec<f32>,
    pub text: String,
    pub source: String,
}

/// Entrada del manifiesto de ingesta. Una por hash de contenido único;
/// se añade al embeber un documento y nunca se muta ni se borra.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionRecord {
    pub filename: String,
    pub hash: String,
    pub embedded_on: DateTime<Utc>,
}

/// Resultado de una búsqueda vectorial. El vector almacenado se devuelve
/// junto al payload para poder re-evaluar la relevancia sin re-embeber.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub text: String,
    pub source: String,
    pub score: f32,
    pub vector: Vec<f32>,
}
