//! Servicios opacos que consume el núcleo (embeddings y generación) y su
//! implementación sobre Rig para los proveedores soportados.

use std::{future::Future, time::Duration};

use async_trait::async_trait;
use rig::client::{CompletionClient as _, EmbeddingsClient as _, ProviderClient as _};
use rig::completion::Prompt;
use rig::embeddings::EmbeddingModel as _;
use rig::providers::{gemini, ollama, openai};
use tracing::debug;

use crate::{
    config::{AppConfig, LlmProvider},
    error::{RagError, Result},
};

/// Servicio de embeddings: determinista para la misma entrada y versión de modelo.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Por defecto llama a `embed` en secuencia; los backends con batch nativo
    /// deberían sobrescribirlo.
    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed(text).await?);
        }
        Ok(out)
    }

    fn dimensions(&self) -> usize;
}

/// Modelo generativo: puede no ser determinista.
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String>;
}

/// Ejecuta `fut` con un límite de tiempo; agotarlo es un error ordinario.
pub async fn with_timeout<T, F>(operation: &'static str, limit: Duration, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(RagError::Timeout { operation, limit }),
    }
}

/// Gestor de LLMs y embeddings sobre Rig.
#[derive(Debug, Clone)]
pub struct LlmManager {
    pub provider: LlmProvider,
    pub embedding_model: String,
    pub chat_model: String,
    pub dimensions: usize,
}

impl LlmManager {
    /// Construye el manager a partir de la configuración. Falla aquí, y no en
    /// la primera llamada, si el proveedor necesita una clave que no existe.
    pub fn from_config(cfg: &AppConfig) -> Result<Self> {
        if let Some(var) = cfg.llm_provider.api_key_var() {
            if std::env::var(var).map(|v| v.trim().is_empty()).unwrap_or(true) {
                return Err(RagError::Configuration(format!(
                    "{var} is required for provider {:?}",
                    cfg.llm_provider
                )));
            }
        }
        Ok(Self {
            provider: cfg.llm_provider,
            embedding_model: cfg.llm_embedding_model.clone(),
            chat_model: cfg.llm_chat_model.clone(),
            dimensions: cfg.embedding_dimensions,
        })
    }

    async fn embed_texts(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        let expected = texts.len();
        let embeddings = match self.provider {
            LlmProvider::OpenAI => {
                openai::Client::from_env()
                    .embedding_model(&self.embedding_model)
                    .embed_texts(texts)
                    .await
            }
            LlmProvider::Gemini => {
                gemini::Client::from_env()
                    .embedding_model(&self.embedding_model)
                    .embed_texts(texts)
                    .await
            }
            LlmProvider::Ollama => {
                ollama::Client::from_env()
                    .embedding_model(&self.embedding_model)
                    .embed_texts(texts)
                    .await
            }
        }
        .map_err(|e| RagError::Embedding(e.to_string()))?;

        if embeddings.len() != expected {
            return Err(RagError::Embedding(format!(
                "expected {expected} embeddings, got {}",
                embeddings.len()
            )));
        }

        Ok(embeddings
            .into_iter()
            .map(|e| e.vec.into_iter().map(|x| x as f32).collect())
            .collect())
    }
}

#[async_trait]
impl Embedder for LlmManager {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_texts(vec![text.to_string()])
            .await?
            .pop()
            .ok_or_else(|| RagError::Embedding("empty embedding response".into()))
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        debug!(count = texts.len(), model = %self.embedding_model, "Calculando embeddings");
        self.embed_texts(texts.iter().map(|t| t.to_string()).collect()).await
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

#[async_trait]
impl Generator for LlmManager {
    async fn generate(&self, prompt: &str) -> Result<String> {
        debug!(provider = ?self.provider, model = %self.chat_model, "Invocando modelo generativo");
        let answer = match self.provider {
            LlmProvider::OpenAI => {
                let agent = openai::Client::from_env()
                    .agent(&self.chat_model)
                    .build();
                agent.prompt(prompt).await
            }
            LlmProvider::Gemini => {
                let agent = gemini::Client::from_env()
                    .agent(&self.chat_model)
                    .build();
                agent.prompt(prompt).await
            }
            LlmProvider::Ollama => {
                let agent = ollama::Client::from_env()
                    .agent(&self.chat_model)
                    .build();
                agent.prompt(prompt).await
            }
        };
        answer.map_err(|e| RagError::Model(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{KeywordEmbedder, SlowGenerator};
    use tokio_test::{assert_err, assert_ok};

    #[tokio::test]
    async fn default_batch_embeds_each_text() {
        let embedder = KeywordEmbedder::default();
        let vectors = assert_ok!(embedder.embed_batch(&["rent", "lease term"]).await);
        assert_eq!(vectors.len(), 2);
        assert!(vectors.iter().all(|v| v.len() == embedder.dimensions()));
    }

    #[tokio::test]
    async fn timeout_becomes_ordinary_error() {
        let slow = SlowGenerator(Duration::from_millis(200));
        let result = with_timeout("generation", Duration::from_millis(10), slow.generate("q")).await;
        assert!(matches!(assert_err!(result), RagError::Timeout { operation: "generation", .. }));
    }

    #[tokio::test]
    async fn fast_call_passes_through_timeout() {
        let slow = SlowGenerator(Duration::from_millis(1));
        let out = with_timeout("generation", Duration::from_secs(5), slow.generate("q")).await;
        assert_eq!(assert_ok!(out), "late answer");
    }

    #[test]
    fn ollama_needs_no_key() {
        let cfg = AppConfig::from_lookup(|_| None).unwrap();
        let manager = LlmManager::from_config(&cfg).unwrap();
        assert_eq!(manager.provider, LlmProvider::Ollama);
        assert_eq!(manager.dimensions, 768);
    }

    #[test]
    fn gemini_without_key_fails_at_construction() {
        if std::env::var("GEMINI_API_KEY").is_ok() {
            return;
        }
        let cfg = AppConfig::from_lookup(|key| (key == "LLM_PROVIDER").then(|| "gemini".to_string()))
            .unwrap();
        assert!(matches!(LlmManager::from_config(&cfg), Err(RagError::Configuration(_))));
    }
}
