//! Taxonomía de errores del núcleo RAG (chunking, índice, orquestación).

use std::{path::PathBuf, time::Duration};
use thiserror::Error;

/// Errores que puede producir el pipeline de preguntas sobre contratos.
#[derive(Debug, Error)]
pub enum RagError {
    /// Configuración inválida: proveedor desconocido, tamaño de chunk
    /// incorrecto o dimensión de embedding que no coincide.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// El índice no tiene registros (todavía no se ha subido ningún documento).
    #[error("No documents loaded. Please upload a document first.")]
    NotInitialized,

    /// Texto vacío o imposible de extraer.
    #[error("Empty input: {0}")]
    EmptyInput(String),

    /// Tipo de fichero que no se sabe extraer.
    #[error("Unsupported file type: {0}. Only PDF, DOCX, TXT and MD files are supported")]
    UnsupportedFile(String),

    /// El estado persistido existe pero no se puede leer.
    #[error("Index at {} is corrupt: {message}", .path.display())]
    IndexCorrupt { path: PathBuf, message: String },

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Model error: {0}")]
    Model(String),

    #[error("{operation} timed out after {limit:?}")]
    Timeout { operation: &'static str, limit: Duration },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl RagError {
    /// Errores que no tiene sentido reintentar: señalan un problema de
    /// configuración o pérdida de datos.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Configuration(_) | Self::IndexCorrupt { .. })
    }
}

pub type Result<T> = std::result::Result<T, RagError>;
