use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;

use crate::{config::AppConfig, llm::{ChatModel, Embedder}, vector_store::VectorIndex};

/// Estado compartido de la aplicación. Las dependencias externas se
/// construyen en `main` y se inyectan aquí, de modo que en tests se
/// pueden sustituir por dobles en memoria.
#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub embedder: Arc<dyn Embedder>,
    pub llm: Arc<dyn ChatModel>,
    pub store: Arc<dyn VectorIndex>,
    pub shutdown_sender: Arc<Mutex<Option<oneshot::Sender<()>>>>,
}
