//! Ingesta de documentos subidos: extracción de texto, troceado e inserción
//! en el índice vectorial.

use std::path::Path;

use tracing::{info, warn};

use crate::{
    chunker::Chunker,
    error::{RagError, Result},
    vector_store::VectorIndex,
};

/// Resumen de la ingesta de un documento.
#[derive(Debug, Clone, serde::Serialize)]
pub struct IngestionSummary {
    pub filename: String,
    pub chunks: usize,
    pub total_records: usize,
}

/// Implementa cómo se mostrará el resumen como texto.
impl std::fmt::Display for IngestionSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Resumen: '{}' troceado en {} chunks; el índice tiene {} registros.",
            self.filename, self.chunks, self.total_records
        )
    }
}

/// Último componente del nombre recibido; evita rutas fuera del directorio de subidas.
pub fn sanitize_filename(raw: &str) -> Option<String> {
    let name = Path::new(raw.trim()).file_name()?.to_string_lossy().to_string();
    (!name.is_empty() && name != "." && name != "..").then_some(name)
}

pub fn is_supported(filename: &str) -> bool {
    matches!(extension_of(filename).as_str(), "pdf" | "docx" | "txt" | "md")
}

fn extension_of(filename: &str) -> String {
    Path::new(filename)
        .extension()
        .and_then(std::ffi::OsStr::to_str)
        .unwrap_or("")
        .to_lowercase()
}

/// Extrae el texto de un fichero según su extensión.
pub async fn extract_text(path: &Path) -> Result<String> {
    let name = path.file_name().map(|s| s.to_string_lossy().to_string()).unwrap_or_default();

    let text = match extension_of(&name).as_str() {
        "pdf" => {
            let owned = path.to_path_buf();
            let extracted = tokio::task::spawn_blocking(move || {
                pdf_extract::extract_text(owned).map_err(|e| e.to_string())
            })
                .await
                .map_err(|e| RagError::EmptyInput(format!("PDF extraction of {name} aborted: {e}")))?;
            match extracted {
                Ok(content) => content,
                Err(e) => {
                    warn!("No se pudo extraer texto del PDF {}: {}", path.display(), e);
                    return Err(RagError::EmptyInput(format!("no text extracted from {name}: {e}")));
                }
            }
        }
        "docx" => {
            let bytes = tokio::fs::read(path).await?;
            let extracted = tokio::task::spawn_blocking(move || docx_text(&bytes))
                .await
                .map_err(|e| RagError::EmptyInput(format!("DOCX extraction of {name} aborted: {e}")))?;
            match extracted {
                Ok(content) => content,
                Err(e) => {
                    warn!("No se pudo leer el DOCX {}: {}", path.display(), e);
                    return Err(RagError::EmptyInput(format!("no text extracted from {name}: {e}")));
                }
            }
        }
        "txt" | "md" => match tokio::fs::read_to_string(path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::InvalidData => {
                warn!("Fichero no-UTF8: {}", path.display());
                return Err(RagError::EmptyInput(format!("{name} is not valid UTF-8 text")));
            }
            Err(e) => return Err(e.into()),
        },
        other => return Err(RagError::UnsupportedFile(format!(".{other}"))),
    };

    if text.trim().is_empty() {
        return Err(RagError::EmptyInput(format!("no text extracted from {name}")));
    }
    Ok(text)
}

/// Texto de cada párrafo del documento, un párrafo por línea.
fn docx_text(bytes: &[u8]) -> std::result::Result<String, String> {
    let doc = docx_rs::read_docx(bytes).map_err(|e| e.to_string())?;
    let mut paragraphs = Vec::new();
    for child in doc.document.children {
        if let docx_rs::DocumentChild::Paragraph(p) = child {
            let mut line = String::new();
            for child in p.children {
                if let docx_rs::ParagraphChild::Run(run) = child {
                    for child in run.children {
                        if let docx_rs::RunChild::Text(t) = child {
                            line.push_str(&t.text);
                        }
                    }
                }
            }
            paragraphs.push(line);
        }
    }
    Ok(paragraphs.join("\n"))
}

/// Trocea `text` bajo el id `filename` y lo añade al índice. Subir de nuevo el
/// mismo nombre añade chunks bajo ese id, no los reemplaza.
pub async fn ingest_text(
    chunker: &Chunker,
    index: &VectorIndex,
    filename: &str,
    text: &str,
) -> Result<IngestionSummary> {
    let chunks = chunker.chunk(text, filename)?;
    let added = index.insert(&chunks).await?;
    let summary = IngestionSummary {
        filename: filename.to_string(),
        chunks: added,
        total_records: index.len().await,
    };
    info!("Ingerido {}. {}", filename, summary);
    Ok(summary)
}
