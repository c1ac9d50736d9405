use axum::{
    extract::{DefaultBodyLimit, Json, Multipart, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, info, warn};

use crate::{
    app_state::AppState,
    assistant::QaResponse,
    error::RagError,
    ingest::IngestionSummary,
    models::{ConversationTurn, SourceCitation},
};

/// Tamaño máximo aceptado para un documento subido.
const MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

type ApiError = (StatusCode, Json<serde_json::Value>);

// --- Payloads de la API ---

/// Sin `use_history` el historial recibido se ignora.
#[derive(Deserialize)]
pub struct QaPayload {
    question: String,
    #[serde(default)]
    use_history: bool,
    #[serde(default)]
    history: Vec<ConversationTurn>,
}

#[derive(Debug, Serialize)]
pub struct SummaryResponse {
    summary: String,
    sources: Vec<SourceCitation>,
}

// --- Router ---

pub fn create_router(app_state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health_handler))
        .route("/api/upload", post(upload_handler))
        .route("/api/summarize", post(summarize_handler))
        .route("/api/qa", post(qa_handler))
        .route("/api/shutdown", post(shutdown_handler))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .with_state(app_state)
}

/// Traduce un error del núcleo a la respuesta HTTP correspondiente.
fn error_response(err: RagError) -> ApiError {
    let status = match err {
        RagError::NotInitialized | RagError::EmptyInput(_) | RagError::UnsupportedFile(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status.is_server_error() {
        error!("Error procesando la petición: {}", err);
    } else {
        warn!("Petición rechazada: {}", err);
    }
    (status, Json(json!({ "error": err.to_string() })))
}

// --- Handlers ---

#[axum::debug_handler]
async fn health_handler(State(state): State<AppState>) -> Json<serde_json::Value> {
    let health = state.assistant.health().await;
    Json(json!({
        "status": health.status,
        "vector_store_loaded": health.vector_store_loaded,
        "records": health.records,
        "documents": health.documents,
        "provider": format!("{:?}", state.config.llm_provider).to_lowercase(),
        "chat_model": state.config.llm_chat_model,
    }))
}

#[axum::debug_handler]
async fn upload_handler(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<IngestionSummary>, ApiError> {
    while let Some(field) = multipart.next_field().await.map_err(|e| {
        (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": format!("Formulario multipart inválido: {}", e)})),
        )
    })? {
        if field.name() != Some("file") {
            continue;
        }
        let filename = field.file_name().unwrap_or_default().to_string();
        let bytes = field.bytes().await.map_err(|e| {
            (
                StatusCode::BAD_REQUEST,
                Json(json!({"error": format!("No se pudo leer el fichero: {}", e)})),
            )
        })?;

        info!("Fichero recibido: {} ({} bytes)", filename, bytes.len());
        return state
            .assistant
            .upload(&filename, &bytes)
            .await
            .map(Json)
            .map_err(error_response);
    }

    Err((
        StatusCode::BAD_REQUEST,
        Json(json!({"error": "Falta el campo 'file' en el formulario."})),
    ))
}

#[axum::debug_handler]
async fn summarize_handler(State(state): State<AppState>) -> Result<Json<SummaryResponse>, ApiError> {
    let result = state.assistant.summarize().await.map_err(error_response)?;
    if let Some(message) = result.error {
        error!("Error generando el resumen: {}", message);
        return Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"error": format!("Error: {}", message)})),
        ));
    }
    Ok(Json(SummaryResponse { summary: result.answer, sources: result.sources }))
}

#[axum::debug_handler]
async fn qa_handler(
    State(state): State<AppState>,
    Json(payload): Json<QaPayload>,
) -> Result<Json<QaResponse>, ApiError> {
    if payload.question.trim().is_empty() {
        return Err(error_response(RagError::EmptyInput("question must not be empty".into())));
    }
    let history = payload.use_history.then_some(payload.history.as_slice());
    state
        .assistant
        .ask(&payload.question, history)
        .await
        .map(Json)
        .map_err(error_response)
}

#[axum::debug_handler]
async fn shutdown_handler(State(state): State<AppState>) -> impl IntoResponse {
    info!("Petición de apagado recibida.");
    if let Some(sender) = state.shutdown_sender.lock().await.take() {
        let _ = sender.send(());
    }
    StatusCode::OK
}
