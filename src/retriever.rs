//! Consulta top-K sobre el índice vectorial a partir de una pregunta en texto.

use std::sync::Arc;

use tracing::debug;

use crate::{error::Result, models::ScoredChunk, vector_store::VectorIndex};

#[derive(Clone)]
pub struct Retriever {
    index: Arc<VectorIndex>,
    top_k: usize,
}

impl Retriever {
    pub fn new(index: Arc<VectorIndex>, top_k: usize) -> Self {
        Self { index, top_k }
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    /// Los `top_k` chunks más similares a `query`, en orden de relevancia.
    pub async fn retrieve(&self, query: &str) -> Result<Vec<ScoredChunk>> {
        let embedding = self.index.embed_query(query).await?;
        let hits = self.index.search(&embedding, self.top_k).await?;
        debug!(hits = hits.len(), top_k = self.top_k, "Chunks recuperados");
        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunker::chunk;
    use crate::error::RagError;
    use crate::test_support::{temp_store_dir, KeywordEmbedder};
    use std::time::Duration;

    fn retriever(top_k: usize) -> (Arc<VectorIndex>, Retriever) {
        let index = VectorIndex::new(
            Arc::new(KeywordEmbedder::default()),
            "keywords",
            temp_store_dir().join("s.json"),
            Duration::from_secs(5),
        )
        .unwrap();
        let index = Arc::new(index);
        (index.clone(), Retriever::new(index, top_k))
    }

    #[tokio::test]
    async fn rent_question_finds_rent_chunk_first() {
        let (index, r) = retriever(5);
        let text = "The lease term is 12 months. Rent is $2000 per month.";
        index.insert(&chunk(text, "lease.txt", 30, 5).unwrap()).await.unwrap();

        let hits = r.retrieve("What is the rent?").await.unwrap();
        assert_eq!(hits.len(), 2);
        assert!(hits[0].chunk.text.contains("$2000"));
        assert_eq!(hits[0].chunk.source_document_id, "lease.txt");
    }

    #[tokio::test]
    async fn retrieval_before_upload_fails_closed() {
        let (_, r) = retriever(5);
        assert!(matches!(r.retrieve("anything").await, Err(RagError::NotInitialized)));
    }
}
