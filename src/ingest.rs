//! Ingesta de documentos de texto en Qdrant con deduplicación por hash
//! de contenido y manifiesto JSON persistente.
//!
//! También expone la conversión previa de PDFs a texto plano
//! (`data/raw` → `data/processed`).

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use sha2::{Digest, Sha256};
use tracing::{info, warn};
use uuid::Uuid;
use walkdir::WalkDir;

use crate::chunker::chunk_text;
use crate::config::AppConfig;
use crate::llm::Embedder;
use crate::models::{ChunkPoint, Document, IngestionRecord};
use crate::vector_store::VectorIndex;

/// Resumen de los resultados de una operación de ingesta.
#[derive(Debug, Default)]
pub struct IngestionSummary {
    pub files_scanned: u32,
    pub files_ingested: u32,
    pub files_skipped: u32,
    pub chunks_created: usize,
}

impl std::fmt::Display for IngestionSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Resumen: {} ficheros escaneados, {} ingeridos, {} omitidos. {} chunks creados.",
            self.files_scanned, self.files_ingested, self.files_skipped, self.chunks_created
        )
    }
}

/// Manifiesto de documentos ya embebidos, indexado por hash de contenido.
///
/// En disco es un array JSON de `{filename, hash, embedded_on}`; en
/// memoria se mantiene además el conjunto de hashes para la consulta.
#[derive(Debug, Default)]
pub struct Manifest {
    records: Vec<IngestionRecord>,
    hashes: HashSet<String>,
}

impl Manifest {
    /// Carga el manifiesto desde `path`; si no existe, empieza vacío.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(path)
            .with_context(|| format!("No se pudo leer el manifiesto {}", path.display()))?;
        let records: Vec<IngestionRecord> = serde_json::from_str(&raw)
            .with_context(|| format!("Manifiesto corrupto en {}", path.display()))?;
        let hashes = records.iter().map(|r| r.hash.clone()).collect();
        Ok(Self { records, hashes })
    }

    pub fn contains(&self, hash: &str) -> bool {
        self.hashes.contains(hash)
    }

    pub fn append(&mut self, record: IngestionRecord) {
        self.hashes.insert(record.hash.clone());
        self.records.push(record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Persiste el manifiesto de forma atómica: se escribe a un fichero
    /// temporal en el mismo directorio y se renombra encima del real.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let tmp = path.with_extension("json.tmp");
        let body = serde_json::to_string_pretty(&self.records)?;
        fs::write(&tmp, body)
            .with_context(|| format!("No se pudo escribir {}", tmp.display()))?;
        fs::rename(&tmp, path)
            .with_context(|| format!("No se pudo renombrar {} a {}", tmp.display(), path.display()))?;
        Ok(())
    }
}

/// Hash SHA-256 (hex) del texto en bytes UTF-8.
pub fn hash_text(text: &str) -> String {
    let digest = Sha256::digest(text.as_bytes());
    format!("{digest:x}")
}

/// Lee todos los `.txt` de `folder` como documentos {texto, fuente}.
pub fn load_documents(folder: &Path) -> Result<Vec<Document>> {
    if !folder.is_dir() {
        return Err(anyhow!("La ruta no es un directorio: {}", folder.display()));
    }

    let mut docs = Vec::new();
    for entry in fs::read_dir(folder)? {
        let entry = entry?;
        let path = entry.path();
        let is_txt = path
            .extension()
            .and_then(std::ffi::OsStr::to_str)
            .map(|ext| ext.eq_ignore_ascii_case("txt"))
            .unwrap_or(false);
        if !path.is_file() || !is_txt {
            continue;
        }

        let source = path
            .file_name()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| path.to_string_lossy().to_string());
        match fs::read_to_string(&path) {
            Ok(text) => docs.push(Document { text, source }),
            Err(err) => warn!("Saltando fichero no-UTF8 {}: {err}", path.display()),
        }
    }

    docs.sort_by(|a, b| a.source.cmp(&b.source));
    Ok(docs)
}

/// Ingesta todos los `.txt` del directorio configurado: hash, chunking,
/// embeddings y upsert en Qdrant, con el manifiesto como registro de lo
/// ya procesado. Idempotente: re-ejecutar con las mismas entradas no
/// crea puntos ni registros nuevos.
pub async fn ingest_folder(
    embedder: &dyn Embedder,
    store: &dyn VectorIndex,
    cfg: &AppConfig,
) -> Result<IngestionSummary> {
    let manifest_path = Path::new(&cfg.manifest_path);
    let mut manifest = Manifest::load(manifest_path)?;
    let documents = load_documents(Path::new(&cfg.docs_dir))?;

    let mut summary = IngestionSummary::default();

    for doc in documents {
        summary.files_scanned += 1;
        let hash = hash_text(&doc.text);

        if manifest.contains(&hash) {
            info!("Omitido (ya embebido): {}", doc.source);
            summary.files_skipped += 1;
            continue;
        }

        let chunks = chunk_text(&doc.text, cfg.chunk_strategy, cfg.chunk_size, cfg.chunk_overlap);
        if chunks.is_empty() {
            warn!("Fichero vacío o sin texto útil: {}", doc.source);
            summary.files_skipped += 1;
            continue;
        }

        let embeddings = embedder.embed_texts(&chunks).await?;
        let points: Vec<ChunkPoint> = chunks
            .into_iter()
            .zip(embeddings)
            .map(|(text, vector)| ChunkPoint {
                id: Uuid::new_v4().to_string(),
                vector,
                text,
                source: doc.source.clone(),
            })
            .collect();

        store.upsert_points(&points).await?;

        manifest.append(IngestionRecord {
            filename: doc.source.clone(),
            hash,
            embedded_on: Utc::now(),
        });
        // Se persiste tras cada documento para que un fallo a mitad de
        // ingesta no obligue a re-embeber lo ya subido.
        manifest.save(manifest_path)?;

        info!("Embebido y añadido a Qdrant: {} ({} chunks)", doc.source, points.len());
        summary.files_ingested += 1;
        summary.chunks_created += points.len();
    }

    Ok(summary)
}

/// Convierte los `.pdf` del directorio crudo en `.txt` en el directorio
/// de procesados. Los fallos de extracción se registran y no detienen
/// la conversión del resto.
pub fn convert_pdfs(cfg: &AppConfig) -> Result<usize> {
    let raw_dir = Path::new(&cfg.raw_dir);
    if !raw_dir.is_dir() {
        return Err(anyhow!("La ruta no es un directorio: {}", raw_dir.display()));
    }
    let out_dir = Path::new(&cfg.docs_dir);
    fs::create_dir_all(out_dir)?;

    let mut converted = 0;
    for entry in WalkDir::new(raw_dir).into_iter().filter_map(|e| e.ok()) {
        let path = entry.path();
        let is_pdf = path
            .extension()
            .and_then(std::ffi::OsStr::to_str)
            .map(|ext| ext.eq_ignore_ascii_case("pdf"))
            .unwrap_or(false);
        if !entry.file_type().is_file() || !is_pdf {
            continue;
        }

        let text = match pdf_extract::extract_text(path) {
            Ok(text) => text,
            Err(err) => {
                warn!("No se pudo extraer texto del PDF {}: {err}. Saltando.", path.display());
                continue;
            }
        };

        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "documento".to_string());
        let out_path = out_dir.join(format!("{stem}.txt"));
        fs::write(&out_path, text)?;
        info!("Convertido {} → {}", path.display(), out_path.display());
        converted += 1;
    }

    Ok(converted)
}
