//! Índice vectorial en memoria para los `Chunk`, persistido como JSON.
//!
//! API pública:
//!   - `VectorIndex::insert(&[Chunk])`: calcula embeddings y añade registros.
//!   - `VectorIndex::search(&[f32], k)`: top-k por similitud coseno.
//!   - `VectorIndex::persist()` / `VectorIndex::load()`: guardado en disco
//!     bajo el identificador del store.
//!
//! Las inserciones y las búsquedas se serializan con un `RwLock`: un único
//! escritor o varios lectores, nunca un índice a medio escribir. Las escrituras
//! a disco van en exclusión mutua: la última en terminar lleva la última foto.

use std::{
    cmp::Ordering,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    error::{RagError, Result},
    llm::{with_timeout, Embedder},
    models::{Chunk, ScoredChunk},
};

const FORMAT_VERSION: u32 = 1;

/// Un registro del índice: exactamente un chunk y un vector de la dimensión fija.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct IndexRecord {
    id: Uuid,
    chunk: Chunk,
    embedding: Vec<f32>,
}

#[derive(Serialize)]
struct PersistedIndexRef<'a> {
    version: u32,
    dimension: usize,
    embedding_model: &'a str,
    saved_at: DateTime<Utc>,
    records: &'a [IndexRecord],
}

#[derive(Deserialize)]
struct PersistedIndex {
    version: u32,
    dimension: usize,
    #[serde(default)]
    embedding_model: String,
    saved_at: DateTime<Utc>,
    records: Vec<IndexRecord>,
}

pub struct VectorIndex {
    dimension: usize,
    embedding_model: String,
    store_path: PathBuf,
    embedder: Arc<dyn Embedder>,
    timeout: Duration,
    records: RwLock<Vec<IndexRecord>>,
    persist_lock: Mutex<()>,
}

impl VectorIndex {
    /// Crea un índice vacío. La dimensión la fija el modelo de embeddings y no
    /// cambia durante la vida del índice.
    pub fn new(
        embedder: Arc<dyn Embedder>,
        embedding_model: impl Into<String>,
        store_path: impl Into<PathBuf>,
        timeout: Duration,
    ) -> Result<Self> {
        let dimension = embedder.dimensions();
        if dimension == 0 {
            return Err(RagError::Configuration("embedding dimension must be greater than zero".into()));
        }
        Ok(Self {
            dimension,
            embedding_model: embedding_model.into(),
            store_path: store_path.into(),
            embedder,
            timeout,
            records: RwLock::new(Vec::new()),
            persist_lock: Mutex::new(()),
        })
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn store_path(&self) -> &Path {
        &self.store_path
    }

    pub async fn is_initialized(&self) -> bool {
        !self.records.read().await.is_empty()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    /// Identificadores de documento distintos, en orden de inserción.
    pub async fn document_ids(&self) -> Vec<String> {
        let records = self.records.read().await;
        let mut ids: Vec<String> = Vec::new();
        for record in records.iter() {
            if !ids.contains(&record.chunk.source_document_id) {
                ids.push(record.chunk.source_document_id.clone());
            }
        }
        ids
    }

    /// Embedding de una consulta, acotado por el timeout del índice.
    pub async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        let vector = with_timeout("embedding", self.timeout, self.embedder.embed(text)).await?;
        self.check_dimension(&vector)?;
        Ok(vector)
    }

    /// Calcula un embedding por chunk y añade los pares al índice. Nunca
    /// reemplaza registros existentes. Devuelve el número de registros añadidos.
    pub async fn insert(&self, chunks: &[Chunk]) -> Result<usize> {
        if chunks.is_empty() {
            return Ok(0);
        }

        // Los embeddings se calculan fuera del lock de escritura.
        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        let vectors = with_timeout("embedding", self.timeout, self.embedder.embed_batch(&texts)).await?;
        if vectors.len() != chunks.len() {
            return Err(RagError::Embedding(format!(
                "expected {} embeddings, got {}",
                chunks.len(),
                vectors.len()
            )));
        }
        for vector in &vectors {
            self.check_dimension(vector)?;
        }

        let new_records = chunks.iter().cloned().zip(vectors).map(|(chunk, embedding)| IndexRecord {
            id: Uuid::new_v4(),
            chunk,
            embedding,
        });

        let mut records = self.records.write().await;
        records.extend(new_records);
        info!(added = chunks.len(), total = records.len(), "Chunks añadidos al índice");
        Ok(chunks.len())
    }

    /// Devuelve los `k` registros más similares, de mayor a menor similitud.
    /// Empates: `chunk_index` ascendente y después `source_document_id`.
    pub async fn search(&self, query_embedding: &[f32], k: usize) -> Result<Vec<ScoredChunk>> {
        self.check_dimension(query_embedding)?;
        let records = self.records.read().await;
        if records.is_empty() {
            return Err(RagError::NotInitialized);
        }

        let mut scored: Vec<ScoredChunk> = records
            .iter()
            .map(|r| ScoredChunk {
                score: cosine_similarity(&r.embedding, query_embedding),
                chunk: r.chunk.clone(),
            })
            .collect();
        drop(records);

        scored.sort_by(compare_ranked);
        scored.truncate(k);
        Ok(scored)
    }

    /// Escribe el estado completo en `store_path` (fichero temporal + rename).
    pub async fn persist(&self) -> Result<()> {
        // Foto, escritura y rename bajo el mismo candado.
        let _guard = self.persist_lock.lock().await;
        let (data, count) = {
            let records = self.records.read().await;
            let snapshot = PersistedIndexRef {
                version: FORMAT_VERSION,
                dimension: self.dimension,
                embedding_model: &self.embedding_model,
                saved_at: Utc::now(),
                records: &records,
            };
            let data = serde_json::to_vec(&snapshot).map_err(|e| {
                RagError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e))
            })?;
            (data, records.len())
        };

        if let Some(parent) = self.store_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp_path = self.store_path.with_extension("json.tmp");
        tokio::fs::write(&tmp_path, data).await?;
        tokio::fs::rename(&tmp_path, &self.store_path).await?;

        info!(records = count, path = %self.store_path.display(), "Índice vectorial guardado");
        Ok(())
    }

    /// Restaura el estado persistido. `Ok(false)` si no hay nada guardado en
    /// `store_path`; un fichero ilegible (contenido o E/S) es `IndexCorrupt`,
    /// nunca un índice vacío.
    pub async fn load(&self) -> Result<bool> {
        let exists = tokio::fs::try_exists(&self.store_path)
            .await
            .map_err(|e| self.corrupt(format!("cannot inspect index: {e}")))?;
        if !exists {
            warn!(path = %self.store_path.display(), "No existe índice vectorial persistido");
            return Ok(false);
        }

        let data = tokio::fs::read(&self.store_path)
            .await
            .map_err(|e| self.corrupt(format!("cannot read index: {e}")))?;
        let persisted: PersistedIndex = serde_json::from_slice(&data)
            .map_err(|e| self.corrupt(format!("unreadable index: {e}")))?;

        if persisted.version != FORMAT_VERSION {
            return Err(self.corrupt(format!("unsupported format version {}", persisted.version)));
        }
        if persisted.dimension != self.dimension {
            return Err(RagError::Configuration(format!(
                "persisted index has dimension {} but the embedding model produces {}",
                persisted.dimension, self.dimension
            )));
        }
        if let Some(bad) = persisted.records.iter().find(|r| r.embedding.len() != self.dimension) {
            return Err(self.corrupt(format!(
                "record {} has {} dimensions, expected {}",
                bad.id,
                bad.embedding.len(),
                self.dimension
            )));
        }
        if !persisted.embedding_model.is_empty() && persisted.embedding_model != self.embedding_model {
            warn!(
                stored = %persisted.embedding_model,
                configured = %self.embedding_model,
                "El índice se creó con otro modelo de embeddings"
            );
        }

        let count = persisted.records.len();
        *self.records.write().await = persisted.records;
        info!(
            records = count,
            saved_at = %persisted.saved_at.to_rfc3339(),
            path = %self.store_path.display(),
            "Índice vectorial cargado"
        );
        Ok(true)
    }

    fn check_dimension(&self, vector: &[f32]) -> Result<()> {
        if vector.len() != self.dimension {
            return Err(RagError::Configuration(format!(
                "embedding has {} dimensions but the index expects {}",
                vector.len(),
                self.dimension
            )));
        }
        Ok(())
    }

    fn corrupt(&self, message: String) -> RagError {
        RagError::IndexCorrupt { path: self.store_path.clone(), message }
    }
}

fn compare_ranked(a: &ScoredChunk, b: &ScoredChunk) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| a.chunk.chunk_index.cmp(&b.chunk.chunk_index))
        .then_with(|| a.chunk.source_document_id.cmp(&b.chunk.source_document_id))
}

/// Similitud coseno; 0.0 si alguno de los vectores tiene norma cero.
fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}
