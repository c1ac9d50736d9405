// Módulos de la aplicación
mod api;
mod app_state;
mod assistant;
mod chunker;
mod config;
mod error;
mod guardrails;
mod ingest;
mod llm;
mod models;
mod rag;
mod retriever;
mod vector_store;

#[cfg(test)]
mod test_support;

use crate::{app_state::AppState, assistant::ContractAssistant};
use axum::Router;
use tokio::sync::oneshot;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    // 1. Cargar .env e inicializar logging
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // 2. Cargar configuración
    let cfg = config::AppConfig::from_env().expect("Error al cargar la configuración");
    info!(
        provider = ?cfg.llm_provider,
        chat_model = %cfg.llm_chat_model,
        embedding_model = %cfg.llm_embedding_model,
        "Configuración cargada"
    );

    // 3. Construir el asistente (LLM, índice vectorial, cadena RAG y guardrails)
    let assistant = ContractAssistant::from_config(&cfg).expect("Error inicializando el asistente");

    // 4. Restaurar el índice persistido. Cualquier error detiene el arranque.
    if let Err(e) = assistant.startup_load().await {
        error!(fatal = e.is_fatal(), "Error cargando el índice vectorial persistido: {}", e);
        panic!("Error cargando el índice vectorial persistido: {}", e);
    }

    // Crear canal para la señal de apagado.
    let (shutdown_tx, shutdown_rx) = oneshot::channel();

    // 5. Crear estado compartido de la aplicación
    let app_state = AppState::new(cfg.clone(), assistant, shutdown_tx);

    // 6. Configurar el router de la API
    let app = Router::new().merge(api::create_router(app_state.clone())).layer(
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any),
    );

    // 7. Iniciar el servidor
    let server_addr = &app_state.config.server_addr;
    let listener = tokio::net::TcpListener::bind(server_addr)
        .await
        .expect("No se pudo abrir la dirección del servidor");
    info!("🚀 Servidor escuchando en http://{}", server_addr);

    // Configurar el apagado ordenado.
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            shutdown_rx.await.ok();
            info!("Señal de apagado recibida, iniciando cierre del servidor.");
        })
        .await
        .expect("Error en el servidor HTTP");

    info!("✅ Servidor cerrado correctamente.");
}
