use axum::{
    extract::{Json, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, info};

use crate::{app_state::AppState, rag};

// --- Payloads y Respuestas de la API ---

#[derive(Deserialize)]
pub struct ChatPayload {
    query: String,
}

/// Respuesta del chat. Los campos de confianza sólo aparecen cuando el
/// modo de autoevaluación está activado en la configuración.
#[derive(Serialize)]
pub struct ChatResponse {
    answer: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    confidence: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    has_relevant_info: Option<bool>,
}

// --- Router ---

pub fn create_router(app_state: AppState) -> Router {
    Router::new()
        .route("/chat", post(chat_handler))
        .route("/api/health", get(health_handler))
        .route("/api/shutdown", post(shutdown_handler))
        .with_state(app_state)
}

// --- Handlers ---

#[axum::debug_handler]
async fn chat_handler(
    State(state): State<AppState>,
    Json(payload): Json<ChatPayload>,
) -> Result<Json<ChatResponse>, (StatusCode, Json<serde_json::Value>)> {
    let params = rag::RetrievalParams::from_config(&state.config);

    let context = rag::retrieve_similar_docs(
        state.embedder.as_ref(),
        state.store.as_ref(),
        params,
        &payload.query,
    )
    .await
    .map_err(|e| {
        error!("Error recuperando contexto: {e}");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"error": format!("Error al recuperar contexto: {e}")})),
        )
    })?;

    let result = rag::answer_question(
        state.llm.as_ref(),
        state.config.confidence_enabled,
        &payload.query,
        &context,
    )
    .await
    .map_err(|e| {
        error!("Error generando la respuesta: {e}");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"error": format!("Error al generar la respuesta: {e}")})),
        )
    })?;

    Ok(Json(ChatResponse {
        answer: result.answer,
        confidence: result.confidence,
        has_relevant_info: result.has_relevant_info,
    }))
}

#[axum::debug_handler]
async fn health_handler(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "collection": state.config.qdrant_collection,
        "model": state.config.llm_chat_model,
    }))
}

#[axum::debug_handler]
async fn shutdown_handler(State(state): State<AppState>) -> impl IntoResponse {
    info!("Petición de apagado recibida.");
    if let Some(sender) = state.shutdown_sender.lock().unwrap().take() {
        let _ = sender.send(());
    }
    StatusCode::OK
}
