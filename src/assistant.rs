//! Servicio que agrupa el pipeline completo (chunker, índice, cadena RAG y
//! guardrails). Se construye de forma explícita al arrancar y se comparte con
//! los handlers HTTP; no hay estado global.

use std::{path::PathBuf, sync::Arc};

use serde::Serialize;
use tracing::info;

use crate::{
    chunker::Chunker,
    config::AppConfig,
    error::{RagError, Result},
    guardrails::Guardrails,
    ingest::{self, IngestionSummary},
    llm::{Embedder, LlmManager},
    models::{AnswerResult, ConversationTurn, GuardrailReport},
    rag::RagChain,
    retriever::Retriever,
    vector_store::VectorIndex,
};

/// Respuesta de preguntas: el `AnswerResult` más, opcionalmente, el informe
/// de guardrails.
#[derive(Debug, Clone, Serialize)]
pub struct QaResponse {
    #[serde(flatten)]
    pub result: AnswerResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub guardrails: Option<GuardrailReport>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Health {
    pub status: &'static str,
    pub vector_store_loaded: bool,
    pub records: usize,
    pub documents: Vec<String>,
}

pub struct ContractAssistant {
    chunker: Chunker,
    index: Arc<VectorIndex>,
    chain: RagChain,
    guardrails: Guardrails,
    upload_dir: PathBuf,
}

impl ContractAssistant {
    pub fn new(
        chunker: Chunker,
        index: Arc<VectorIndex>,
        chain: RagChain,
        guardrails: Guardrails,
        upload_dir: PathBuf,
    ) -> Self {
        Self { chunker, index, chain, guardrails, upload_dir }
    }

    /// Construye el servicio con los backends reales de la configuración.
    pub fn from_config(cfg: &AppConfig) -> Result<Self> {
        let embedder: Arc<dyn Embedder> = Arc::new(LlmManager::from_config(cfg)?);
        let index = Arc::new(VectorIndex::new(
            embedder,
            cfg.llm_embedding_model.clone(),
            cfg.vector_store_path(),
            cfg.request_timeout,
        )?);
        let chain = RagChain::from_config(cfg, Retriever::new(index.clone(), cfg.top_k))?;
        let chunker = Chunker::new(cfg.chunk_size, cfg.chunk_overlap)?;
        info!(chunk_size = chunker.size(), chunk_overlap = chunker.overlap(), "Chunker configurado");
        Ok(Self::new(
            chunker,
            index,
            chain,
            Guardrails::new(cfg.guardrails_enabled),
            cfg.upload_dir.clone(),
        ))
    }

    /// Intenta restaurar el índice persistido. Un índice corrupto es fatal.
    pub async fn startup_load(&self) -> Result<bool> {
        let loaded = self.index.load().await?;
        if loaded {
            info!(
                path = %self.index.store_path().display(),
                dimension = self.index.dimension(),
                "Asistente listo con el índice existente"
            );
        } else {
            info!("No se encontró índice vectorial; esperando la primera subida");
        }
        Ok(loaded)
    }

    /// Guarda el fichero subido en el directorio de subidas y lo ingiere.
    pub async fn upload(&self, raw_filename: &str, bytes: &[u8]) -> Result<IngestionSummary> {
        let filename = ingest::sanitize_filename(raw_filename)
            .ok_or_else(|| RagError::EmptyInput("missing filename".into()))?;
        if !ingest::is_supported(&filename) {
            return Err(RagError::UnsupportedFile(filename));
        }

        tokio::fs::create_dir_all(&self.upload_dir).await?;
        let path = self.upload_dir.join(&filename);
        tokio::fs::write(&path, bytes).await?;
        info!("Procesando fichero: {}", path.display());

        let text = ingest::extract_text(&path).await?;
        self.ingest_text(&filename, &text).await
    }

    /// Trocea, indexa y persiste el texto ya extraído de un documento.
    pub async fn ingest_text(&self, filename: &str, text: &str) -> Result<IngestionSummary> {
        let summary = ingest::ingest_text(&self.chunker, &self.index, filename, text).await?;
        self.index.persist().await?;
        Ok(summary)
    }

    /// Responde una pregunta. Falla con `NotInitialized` si aún no hay
    /// documentos; los demás errores quedan dentro del `AnswerResult`.
    pub async fn ask(&self, question: &str, history: Option<&[ConversationTurn]>) -> Result<QaResponse> {
        if !self.index.is_initialized().await {
            return Err(RagError::NotInitialized);
        }
        let history = history.filter(|h| !h.is_empty());
        let result = self.chain.answer(question, history).await;
        if result.is_error() {
            return Ok(QaResponse { result, guardrails: None });
        }

        let guardrails = if self.guardrails.is_enabled() && !result.sources.is_empty() {
            let context: Vec<&str> = result.sources.iter().map(|s| s.preview.as_str()).collect();
            Some(self.guardrails.validate(&result.answer, &context.join("\n")))
        } else {
            None
        };

        Ok(QaResponse { result, guardrails })
    }

    pub async fn summarize(&self) -> Result<AnswerResult> {
        if !self.index.is_initialized().await {
            return Err(RagError::NotInitialized);
        }
        Ok(self.chain.summarize().await)
    }

    pub async fn health(&self) -> Health {
        Health {
            status: "healthy",
            vector_store_loaded: self.index.is_initialized().await,
            records: self.index.len().await,
            documents: self.index.document_ids().await,
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::llm::Generator;
    use crate::test_support::{temp_store_dir, EchoGenerator, FixedGenerator, KeywordEmbedder};
    use std::time::Duration;
    use tokio_test::{assert_err, assert_ok};

    pub(crate) fn assistant(dir: &std::path::Path, generator: Arc<dyn Generator>, guardrails: bool) -> ContractAssistant {
        let index = Arc::new(
            VectorIndex::new(
                Arc::new(KeywordEmbedder::default()),
                "keywords",
                dir.join("contract_store.json"),
                Duration::from_secs(5),
            )
            .unwrap(),
        );
        let chain = RagChain::new(Retriever::new(index.clone(), 5), generator, Duration::from_secs(5));
        ContractAssistant::new(
            Chunker::new(30, 5).unwrap(),
            index,
            chain,
            Guardrails::new(guardrails),
            dir.join("uploads"),
        )
    }

    const LEASE: &str = "The lease term is 12 months. Rent is $2000 per month.";

    #[tokio::test]
    async fn asking_before_upload_is_not_initialized() {
        let dir = temp_store_dir();
        let a = assistant(&dir, Arc::new(EchoGenerator), true);
        assert!(matches!(assert_err!(a.ask("What is the rent?", None).await), RagError::NotInitialized));
        assert!(matches!(assert_err!(a.summarize().await), RagError::NotInitialized));
        assert!(!a.health().await.vector_store_loaded);
    }

    #[tokio::test]
    async fn upload_then_ask_attaches_guardrails() {
        let dir = temp_store_dir();
        let a = assistant(&dir, Arc::new(EchoGenerator), true);
        let summary = assert_ok!(a.upload("lease.txt", LEASE.as_bytes()).await);
        assert_eq!(summary.chunks, 2);
        assert!(dir.join("uploads").join("lease.txt").exists());
        assert!(dir.join("contract_store.json").exists());

        let response = assert_ok!(a.ask("What is the rent?", None).await);
        assert_eq!(response.result.sources[0].filename, "lease.txt");
        let report = response.guardrails.expect("guardrails enabled");
        assert!(report.check("context_relevance").unwrap().passed);

        let health = a.health().await;
        assert!(health.vector_store_loaded);
        assert_eq!(health.documents, vec!["lease.txt".to_string()]);
        let _ = std::fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn disabled_guardrails_are_omitted() {
        let dir = temp_store_dir();
        let a = assistant(&dir, Arc::new(FixedGenerator("The rent is $2000.")), false);
        a.ingest_text("lease.txt", LEASE).await.unwrap();
        let response = a.ask("What is the rent?", Some(&[][..])).await.unwrap();
        assert!(response.guardrails.is_none());
        let _ = std::fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn unsupported_upload_is_rejected_before_saving() {
        let dir = temp_store_dir();
        let a = assistant(&dir, Arc::new(EchoGenerator), true);
        assert!(matches!(assert_err!(a.upload("lease.xlsx", b"data").await), RagError::UnsupportedFile(_)));
        assert!(!dir.join("uploads").join("lease.xlsx").exists());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_ingests_are_all_persisted() {
        let dir = temp_store_dir();
        let a = Arc::new(assistant(&dir, Arc::new(EchoGenerator), true));

        let mut tasks = tokio::task::JoinSet::new();
        for i in 0..8 {
            let a = a.clone();
            tasks.spawn(async move { a.ingest_text(&format!("lease{i}.txt"), LEASE).await });
        }
        while let Some(joined) = tasks.join_next().await {
            assert_ok!(joined.unwrap());
        }
        assert_eq!(a.health().await.records, 16);

        let restarted = assistant(&dir, Arc::new(EchoGenerator), true);
        assert!(assert_ok!(restarted.startup_load().await));
        assert_eq!(restarted.health().await.records, 16);
        assert_eq!(restarted.health().await.documents.len(), 8);
        let _ = std::fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn restart_recovers_uploaded_documents() {
        let dir = temp_store_dir();
        let first = assistant(&dir, Arc::new(EchoGenerator), true);
        first.ingest_text("lease.txt", LEASE).await.unwrap();
        let before = first.ask("What is the rent?", None).await.unwrap();

        let second = assistant(&dir, Arc::new(EchoGenerator), true);
        assert!(assert_ok!(second.startup_load().await));
        let after = second.ask("What is the rent?", None).await.unwrap();
        assert_eq!(before.result.sources, after.result.sources);
        let _ = std::fs::remove_dir_all(dir);
    }
}
