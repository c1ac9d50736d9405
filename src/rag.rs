//! Orquestador RAG: pregunta → chunks recuperados → prompt → modelo → respuesta
//! con citas de las fuentes.
//!
//! Flujo (etapas fijas, en este orden, sobre un `QueryContext` compartido):
//!   1. Recuperación de los top-K chunks para la pregunta.
//!   2. Formateo del bloque de contexto (orden de relevancia).
//!   3. Formateo del historial (últimos 5 turnos) o del marcador "sin historial".
//!   4. Composición del prompt con la plantilla de instrucciones.
//!   5. Llamada al modelo generativo.
//!   6. Citas de las fuentes a partir de los mismos chunks del paso 1.
//!
//! Cualquier fallo se convierte en un `AnswerResult` de error: el orquestador
//! nunca propaga errores a quien lo llama.

use std::{sync::Arc, time::Duration};

use tracing::{error, info};

use crate::{
    config::AppConfig,
    error::Result,
    llm::{with_timeout, Generator, LlmManager},
    models::{AnswerResult, ConversationTurn, ScoredChunk, SourceCitation},
    retriever::Retriever,
};

/// Turnos de historial que se incluyen en el prompt; los anteriores se descartan.
pub const MAX_HISTORY_TURNS: usize = 5;

pub const NO_HISTORY: &str = "No previous conversation.";

pub const SUMMARY_QUESTION: &str = "Provide a comprehensive summary of this document, including key terms, parties involved, main obligations, and important dates.";

const INSTRUCTIONS: &str = "You are a helpful assistant that answers questions about contracts and legal documents.
Answer based ONLY on the provided context and previous conversation. If the context doesn't contain enough information, say so.
Cite sources when referencing specific information.";

/// Estado compartido por las etapas de una consulta.
#[derive(Debug, Default)]
struct QueryContext {
    question: String,
    history: Vec<ConversationTurn>,
    hits: Vec<ScoredChunk>,
    context_block: String,
    history_block: String,
    prompt: String,
    answer: String,
}

pub struct RagChain {
    retriever: Retriever,
    generator: Arc<dyn Generator>,
    timeout: Duration,
}

impl RagChain {
    pub fn new(retriever: Retriever, generator: Arc<dyn Generator>, timeout: Duration) -> Self {
        Self { retriever, generator, timeout }
    }

    /// Selecciona el backend generativo según la configuración. Un proveedor
    /// no utilizable falla aquí, al construir, y no en la primera pregunta.
    pub fn from_config(cfg: &AppConfig, retriever: Retriever) -> Result<Self> {
        let generator = LlmManager::from_config(cfg)?;
        info!(provider = ?cfg.llm_provider, model = %cfg.llm_chat_model, top_k = retriever.top_k(), "Orquestador RAG inicializado");
        Ok(Self::new(retriever, Arc::new(generator), cfg.request_timeout))
    }

    /// Responde sin historial de conversación.
    pub async fn invoke(&self, question: &str) -> AnswerResult {
        self.answer(question, None).await
    }

    /// Responde `question` usando el historial opcional. Siempre devuelve un
    /// `AnswerResult` bien formado.
    pub async fn answer(&self, question: &str, history: Option<&[ConversationTurn]>) -> AnswerResult {
        let mut ctx = QueryContext {
            question: question.to_string(),
            history: history.map(<[ConversationTurn]>::to_vec).unwrap_or_default(),
            ..Default::default()
        };

        match self.run(&mut ctx).await {
            Ok(()) => AnswerResult {
                answer: ctx.answer,
                sources: attach_sources(&ctx.hits),
                question: ctx.question,
                error: None,
            },
            Err(e) => {
                error!(error = %e, question, "Error en la cadena RAG");
                AnswerResult::failed(question, e.to_string())
            }
        }
    }

    pub async fn summarize(&self) -> AnswerResult {
        self.invoke(SUMMARY_QUESTION).await
    }

    async fn run(&self, ctx: &mut QueryContext) -> Result<()> {
        ctx.hits = self.retriever.retrieve(&ctx.question).await?;
        ctx.context_block = format_context(&ctx.hits);
        ctx.history_block = format_history(&ctx.history);
        ctx.prompt = build_prompt(&ctx.context_block, &ctx.history_block, &ctx.question);
        ctx.answer = with_timeout("generation", self.timeout, self.generator.generate(&ctx.prompt)).await?;
        info!(sources = ctx.hits.len(), answer_chars = ctx.answer.len(), "Respuesta generada");
        Ok(())
    }
}

/// Un bloque por chunk, en orden de recuperación, separados por una línea en blanco.
pub fn format_context(hits: &[ScoredChunk]) -> String {
    hits.iter()
        .enumerate()
        .map(|(i, hit)| {
            format!(
                "[Document {} - {}, Chunk {}]\n{}",
                i + 1,
                hit.chunk.source_document_id,
                hit.chunk.chunk_index,
                hit.chunk.text
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Últimos `MAX_HISTORY_TURNS` turnos en orden cronológico como líneas
/// "Human:" / "Assistant:". Las partes vacías de un turno se omiten.
pub fn format_history(history: &[ConversationTurn]) -> String {
    if history.is_empty() {
        return NO_HISTORY.to_string();
    }
    let recent = &history[history.len().saturating_sub(MAX_HISTORY_TURNS)..];
    let mut lines = Vec::with_capacity(recent.len() * 2);
    for turn in recent {
        if !turn.human.is_empty() {
            lines.push(format!("Human: {}", turn.human));
        }
        if !turn.assistant.is_empty() {
            lines.push(format!("Assistant: {}", turn.assistant));
        }
    }
    if lines.is_empty() {
        return NO_HISTORY.to_string();
    }
    lines.join("\n")
}

pub fn build_prompt(context: &str, history: &str, question: &str) -> String {
    format!(
        "{INSTRUCTIONS}\n\nPrevious conversation:\n{history}\n\nContext:\n{context}\n\nQuestion: {question}\n\nAnswer:"
    )
}

pub fn attach_sources(hits: &[ScoredChunk]) -> Vec<SourceCitation> {
    hits.iter().map(|hit| SourceCitation::from_chunk(&hit.chunk)).collect()
}
