// Módulos de la aplicación
mod api;
mod app_state;
mod chunker;
mod config;
mod ingest;
mod llm;
mod models;
mod rag;
mod vector_store;

use std::sync::{Arc, Mutex};

use axum::Router;
use tokio::sync::oneshot;
use tower_http::{
    cors::{Any, CorsLayer},
    services::ServeDir,
};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::app_state::AppState;
use crate::llm::{ChatClient, HttpEmbedder};
use crate::vector_store::QdrantStore;

#[tokio::main]
async fn main() {
    // 1. Cargar .env e inicializar logging
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // 2. Cargar configuración
    let cfg = config::AppConfig::from_env().expect("Error al cargar la configuración");

    // 3. Modo de ejecución: servidor por defecto; la ingesta y la
    // conversión de PDFs son invocaciones independientes del mismo binario.
    match std::env::args().nth(1).as_deref() {
        None => run_server(cfg).await,
        Some("ingest") => run_ingest(cfg).await,
        Some("convert-pdfs") => run_convert_pdfs(cfg),
        Some(other) => {
            error!("Comando no reconocido: '{other}'. Usa 'ingest' o 'convert-pdfs', o ningún argumento para el servidor.");
            std::process::exit(2);
        }
    }
}

/// Arranca el servidor web del chatbot.
async fn run_server(cfg: config::AppConfig) {
    // Clientes de los colaboradores externos
    let store = QdrantStore::from_config(&cfg);
    store
        .ensure_collection()
        .await
        .expect("Error asegurando la colección de Qdrant");

    let embedder = HttpEmbedder::from_config(&cfg);
    let llm = ChatClient::from_config(&cfg);

    // Canal para la señal de apagado.
    let (shutdown_tx, shutdown_rx) = oneshot::channel();

    // Estado compartido con las dependencias inyectadas
    let app_state = AppState {
        config: cfg.clone(),
        embedder: Arc::new(embedder),
        llm: Arc::new(llm),
        store: Arc::new(store),
        shutdown_sender: Arc::new(Mutex::new(Some(shutdown_tx))),
    };

    // Router de la API y servicio de ficheros estáticos del frontend
    let app = Router::new()
        .merge(api::create_router(app_state))
        .fallback_service(ServeDir::new("frontend"))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );

    let listener = tokio::net::TcpListener::bind(&cfg.server_addr)
        .await
        .expect("No se pudo abrir el puerto del servidor");
    let server_url = format!("http://{}", cfg.server_addr);
    info!("🚀 Servidor escuchando en {}", &server_url);

    if webbrowser::open(&server_url).is_err() {
        info!("No se pudo abrir el navegador. Por favor, accede a {} manualmente.", server_url);
    }

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            shutdown_rx.await.ok();
            info!("Señal de apagado recibida, iniciando cierre del servidor.");
        })
        .await
        .expect("Error del servidor");

    info!("✅ Servidor cerrado correctamente.");
}

/// Ingesta los documentos de texto del directorio configurado.
async fn run_ingest(cfg: config::AppConfig) {
    let store = QdrantStore::from_config(&cfg);
    store
        .ensure_collection()
        .await
        .expect("Error asegurando la colección de Qdrant");
    let embedder = HttpEmbedder::from_config(&cfg);

    match ingest::ingest_folder(&embedder, &store, &cfg).await {
        Ok(summary) => info!("¡Ingesta completada! {summary}"),
        Err(err) => {
            error!("Error en la ingesta: {err}");
            std::process::exit(1);
        }
    }
}

/// Convierte los PDFs del directorio crudo a texto plano.
fn run_convert_pdfs(cfg: config::AppConfig) {
    match ingest::convert_pdfs(&cfg) {
        Ok(count) => info!("Conversión completada: {count} PDFs convertidos a texto."),
        Err(err) => {
            error!("Error convirtiendo PDFs: {err}");
            std::process::exit(1);
        }
    }
}
