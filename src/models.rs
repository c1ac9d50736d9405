//! Modelos de dominio: chunks de documentos, historial de conversación,
//! respuestas con citas e informes de guardrails.

use serde::{Deserialize, Serialize};

/// Longitud máxima (en caracteres) del extracto que acompaña a cada cita.
pub const PREVIEW_CHARS: usize = 200;

/// Trozo de texto de un documento. Inmutable una vez creado.
///
/// El "documento" no existe como entidad propia: es el conjunto de chunks
/// que comparten `source_document_id` (el nombre del fichero subido).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub text: String,
    pub source_document_id: String,
    pub chunk_index: usize,
    /// Offset en caracteres del inicio del chunk dentro del texto original.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub char_offset: Option<usize>,
}

/// Chunk recuperado del índice junto con su similitud con la consulta.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub score: f32,
}

/// Un intercambio pregunta/respuesta del historial de la sesión.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    #[serde(default)]
    pub human: String,
    #[serde(default)]
    pub assistant: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceCitation {
    pub filename: String,
    pub chunk_index: usize,
    pub preview: String,
}

impl SourceCitation {
    pub fn from_chunk(chunk: &Chunk) -> Self {
        Self {
            filename: chunk.source_document_id.clone(),
            chunk_index: chunk.chunk_index,
            preview: preview(&chunk.text),
        }
    }
}

/// Primeros `PREVIEW_CHARS` caracteres, con "..." si se ha truncado.
pub fn preview(text: &str) -> String {
    match text.char_indices().nth(PREVIEW_CHARS) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

/// Resultado del orquestador. Siempre bien formado, incluso ante errores.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerResult {
    pub answer: String,
    pub sources: Vec<SourceCitation>,
    pub question: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AnswerResult {
    pub fn failed(question: &str, message: String) -> Self {
        Self {
            answer: format!("Error: {message}"),
            sources: Vec::new(),
            question: question.to_string(),
            error: Some(message),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuardrailCheck {
    pub name: String,
    pub passed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuardrailReport {
    pub all_passed: bool,
    pub checks: Vec<GuardrailCheck>,
    /// Ausente cuando los guardrails están desactivados.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relevance_score: Option<f64>,
}

impl GuardrailReport {
    pub fn check(&self, name: &str) -> Option<&GuardrailCheck> {
        self.checks.iter().find(|c| c.name == name)
    }
}
