//! Troceado del texto extraído en ventanas de tamaño fijo con solapamiento.

use crate::{
    error::{RagError, Result},
    models::Chunk,
};

/// Divide texto en ventanas de `size` caracteres que avanzan `size - overlap`.
/// No guarda estado entre llamadas más allá de su configuración.
#[derive(Debug, Clone, Copy)]
pub struct Chunker {
    size: usize,
    overlap: usize,
}

impl Chunker {
    pub fn new(size: usize, overlap: usize) -> Result<Self> {
        if size == 0 {
            return Err(RagError::Configuration("chunk size must be greater than zero".into()));
        }
        if overlap >= size {
            return Err(RagError::Configuration(format!(
                "chunk overlap ({overlap}) must be less than chunk size ({size})"
            )));
        }
        Ok(Self { size, overlap })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    /// Trocea `text` en orden de documento; `chunk_index` va de 0 a n-1.
    /// La última ventana puede ser más corta que `size`.
    pub fn chunk(&self, text: &str, source_id: &str) -> Result<Vec<Chunk>> {
        if text.trim().is_empty() {
            return Err(RagError::EmptyInput(format!("no text extracted from {source_id}")));
        }

        // Offsets en bytes de cada carácter, más el final del texto.
        let bounds: Vec<usize> = text
            .char_indices()
            .map(|(i, _)| i)
            .chain(std::iter::once(text.len()))
            .collect();
        let total_chars = bounds.len() - 1;
        let step = self.size - self.overlap;

        let mut chunks = Vec::new();
        let mut start = 0;
        loop {
            let end = (start + self.size).min(total_chars);
            chunks.push(Chunk {
                text: text[bounds[start]..bounds[end]].to_string(),
                source_document_id: source_id.to_string(),
                chunk_index: chunks.len(),
                char_offset: Some(start),
            });
            if end == total_chars {
                break;
            }
            start += step;
        }

        Ok(chunks)
    }
}

/// Atajo sin estado equivalente a `Chunker::new(size, overlap)?.chunk(text, source_id)`.
pub fn chunk(text: &str, source_id: &str, size: usize, overlap: usize) -> Result<Vec<Chunk>> {
    Chunker::new(size, overlap)?.chunk(text, source_id)
}
