//! Servicios deterministas para los tests: sin red ni modelos reales.

use std::time::Duration;

use async_trait::async_trait;

use crate::{
    error::{RagError, Result},
    llm::{Embedder, Generator},
};

const CONTRACT_VOCABULARY: &[&str] = &[
    "lease", "term", "months", "rent", "2000", "month", "tenant", "landlord", "deposit",
    "termination", "notice", "payment", "party", "parties", "agreement", "penalty",
];

/// Bolsa de palabras sobre un vocabulario fijo: cada dimensión cuenta las
/// apariciones de una palabra. Las palabras fuera del vocabulario se ignoran.
#[derive(Debug, Clone)]
pub struct KeywordEmbedder {
    vocabulary: Vec<String>,
}

impl KeywordEmbedder {
    pub fn with_vocabulary(words: &[&str]) -> Self {
        Self { vocabulary: words.iter().map(|w| w.to_string()).collect() }
    }
}

impl Default for KeywordEmbedder {
    fn default() -> Self {
        Self::with_vocabulary(CONTRACT_VOCABULARY)
    }
}

#[async_trait]
impl Embedder for KeywordEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vector = vec![0.0; self.vocabulary.len()];
        for token in text.split(|c: char| !c.is_alphanumeric()).filter(|t| !t.is_empty()) {
            let token = token.to_lowercase();
            if let Some(pos) = self.vocabulary.iter().position(|w| *w == token) {
                vector[pos] += 1.0;
            }
        }
        Ok(vector)
    }

    fn dimensions(&self) -> usize {
        self.vocabulary.len()
    }
}

pub struct FailingEmbedder;

#[async_trait]
impl Embedder for FailingEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        Err(RagError::Embedding("embedding service unavailable".into()))
    }

    fn dimensions(&self) -> usize {
        CONTRACT_VOCABULARY.len()
    }
}

/// Devuelve la sección de contexto del prompt tal cual.
pub struct EchoGenerator;

#[async_trait]
impl Generator for EchoGenerator {
    async fn generate(&self, prompt: &str) -> Result<String> {
        let start = prompt.find("Context:\n").map(|i| i + "Context:\n".len()).unwrap_or(0);
        let end = prompt[start..].find("\n\nQuestion:").map(|i| start + i).unwrap_or(prompt.len());
        Ok(prompt[start..end].to_string())
    }
}

/// Devuelve siempre el mismo texto.
pub struct FixedGenerator(pub &'static str);

#[async_trait]
impl Generator for FixedGenerator {
    async fn generate(&self, _prompt: &str) -> Result<String> {
        Ok(self.0.to_string())
    }
}

pub struct FailingGenerator;

#[async_trait]
impl Generator for FailingGenerator {
    async fn generate(&self, _prompt: &str) -> Result<String> {
        Err(RagError::Model("model backend unreachable".into()))
    }
}

pub struct SlowGenerator(pub Duration);

#[async_trait]
impl Generator for SlowGenerator {
    async fn generate(&self, _prompt: &str) -> Result<String> {
        tokio::time::sleep(self.0).await;
        Ok("late answer".to_string())
    }
}

/// Directorio temporal único para tests de persistencia.
pub fn temp_store_dir() -> std::path::PathBuf {
    std::env::temp_dir().join(format!("contract-assistant-test-{}", uuid::Uuid::new_v4()))
}
