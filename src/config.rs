//! Carga y gestión de configuración de la aplicación (LLM + índice vectorial).

use std::{env, path::PathBuf, str::FromStr, time::Duration};

use anyhow::Result;

use crate::error::RagError;

/// Proveedores de LLM soportados. Conjunto cerrado: se valida una sola vez
/// al arrancar.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LlmProvider {
    OpenAI,
    Gemini,
    Ollama,
}

impl LlmProvider {
    pub fn default_chat_model(self) -> &'static str {
        match self {
            Self::OpenAI => "gpt-4o-mini",
            Self::Gemini => "gemini-1.5-flash",
            Self::Ollama => "llama3.2",
        }
    }

    pub fn default_embedding_model(self) -> &'static str {
        match self {
            Self::OpenAI => "text-embedding-3-small",
            Self::Gemini => "text-embedding-004",
            Self::Ollama => "nomic-embed-text",
        }
    }

    pub fn default_embedding_dimensions(self) -> usize {
        match self {
            Self::OpenAI => 1536,
            Self::Gemini | Self::Ollama => 768,
        }
    }

    /// Variable de entorno con la clave de API que exige el proveedor, si la hay.
    pub fn api_key_var(self) -> Option<&'static str> {
        match self {
            Self::OpenAI => Some("OPENAI_API_KEY"),
            Self::Gemini => Some("GEMINI_API_KEY"),
            Self::Ollama => None,
        }
    }
}

impl FromStr for LlmProvider {
    type Err = RagError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "openai" => Ok(Self::OpenAI),
            "gemini" => Ok(Self::Gemini),
            "ollama" => Ok(Self::Ollama),
            other => Err(RagError::Configuration(format!("Unknown LLM provider: {other}"))),
        }
    }
}

/// Configuración completa de la aplicación.
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub server_addr: String,

    pub llm_provider: LlmProvider,
    pub llm_chat_model: String,
    pub llm_embedding_model: String,
    pub embedding_dimensions: usize,

    pub vector_store_dir: PathBuf,
    pub vector_store_name: String,
    pub upload_dir: PathBuf,

    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub top_k: usize,
    pub request_timeout: Duration,
    pub guardrails_enabled: bool,
}

impl AppConfig {
    /// Carga la configuración desde variables de entorno (usando .env si existe).
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Igual que `from_env`, pero leyendo de una función arbitraria.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let server_addr = get("SERVER_ADDR").unwrap_or_else(|| "127.0.0.1:8001".to_string());

        let llm_provider: LlmProvider = get("LLM_PROVIDER")
            .unwrap_or_else(|| "ollama".to_string())
            .parse()?;
        let llm_chat_model = get("LLM_CHAT_MODEL")
            .unwrap_or_else(|| llm_provider.default_chat_model().to_string());
        let llm_embedding_model = get("LLM_EMBEDDING_MODEL")
            .unwrap_or_else(|| llm_provider.default_embedding_model().to_string());
        let embedding_dimensions = parse_or(
            get("EMBEDDING_DIMENSIONS"),
            "EMBEDDING_DIMENSIONS",
            llm_provider.default_embedding_dimensions(),
        )?;

        let data_root = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("contract-assistant");
        let vector_store_dir = get("VECTOR_STORE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| data_root.join("vector_stores"));
        let vector_store_name =
            get("VECTOR_STORE_NAME").unwrap_or_else(|| "contract_store".to_string());
        let upload_dir = get("UPLOAD_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| data_root.join("uploads"));

        let chunk_size = parse_or(get("CHUNK_SIZE"), "CHUNK_SIZE", 1000)?;
        let chunk_overlap = parse_or(get("CHUNK_OVERLAP"), "CHUNK_OVERLAP", 200)?;
        let top_k = parse_or(get("TOP_K"), "TOP_K", 5)?;
        let timeout_secs: u64 = parse_or(get("REQUEST_TIMEOUT_SECS"), "REQUEST_TIMEOUT_SECS", 60)?;
        let guardrails_enabled = parse_or(get("GUARDRAILS_ENABLED"), "GUARDRAILS_ENABLED", true)?;

        let cfg = Self {
            server_addr,
            llm_provider,
            llm_chat_model,
            llm_embedding_model,
            embedding_dimensions,
            vector_store_dir,
            vector_store_name,
            upload_dir,
            chunk_size,
            chunk_overlap,
            top_k,
            request_timeout: Duration::from_secs(timeout_secs),
            guardrails_enabled,
        };
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<(), RagError> {
        if self.chunk_size == 0 || self.chunk_overlap >= self.chunk_size {
            return Err(RagError::Configuration(format!(
                "invalid chunking: size={} overlap={} (need size > 0 and overlap < size)",
                self.chunk_size, self.chunk_overlap
            )));
        }
        if self.top_k == 0 {
            return Err(RagError::Configuration("TOP_K must be greater than zero".into()));
        }
        if self.embedding_dimensions == 0 {
            return Err(RagError::Configuration(
                "EMBEDDING_DIMENSIONS must be greater than zero".into(),
            ));
        }
        if self.vector_store_name.contains(['/', '\\']) {
            return Err(RagError::Configuration(format!(
                "VECTOR_STORE_NAME must be a plain name, got '{}'",
                self.vector_store_name
            )));
        }
        Ok(())
    }

    /// Ruta del fichero que persiste el índice (identificador del store).
    pub fn vector_store_path(&self) -> PathBuf {
        self.vector_store_dir.join(format!("{}.json", self.vector_store_name))
    }
}

fn parse_or<T: FromStr>(raw: Option<String>, key: &str, default: T) -> Result<T> {
    match raw {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| {
                anyhow::Error::new(RagError::Configuration(format!(
                    "{key} has an invalid value: '{value}'"
                )))
            }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<AppConfig> {
        let map: HashMap<String, String> =
            vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        AppConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn defaults_follow_ollama() {
        let cfg = load(&[]).unwrap();
        assert_eq!(cfg.llm_provider, LlmProvider::Ollama);
        assert_eq!(cfg.llm_chat_model, "llama3.2");
        assert_eq!(cfg.embedding_dimensions, 768);
        assert_eq!(cfg.chunk_size, 1000);
        assert_eq!(cfg.chunk_overlap, 200);
        assert_eq!(cfg.top_k, 5);
        assert!(cfg.guardrails_enabled);
        assert!(cfg.vector_store_path().ends_with("contract_store.json"));
    }

    #[test]
    fn provider_is_case_insensitive() {
        let cfg = load(&[("LLM_PROVIDER", "OpenAI")]).unwrap();
        assert_eq!(cfg.llm_provider, LlmProvider::OpenAI);
        assert_eq!(cfg.llm_embedding_model, "text-embedding-3-small");
        assert_eq!(cfg.embedding_dimensions, 1536);
    }

    #[test]
    fn unknown_provider_is_configuration_error() {
        let err = load(&[("LLM_PROVIDER", "huggingface")]).unwrap_err();
        let rag = err.downcast_ref::<RagError>().expect("RagError");
        assert!(matches!(rag, RagError::Configuration(_)));
    }

    #[test]
    fn overlap_must_be_smaller_than_size() {
        assert!(load(&[("CHUNK_SIZE", "100"), ("CHUNK_OVERLAP", "100")]).is_err());
        assert!(load(&[("CHUNK_SIZE", "0"), ("CHUNK_OVERLAP", "0")]).is_err());
        assert!(load(&[("CHUNK_SIZE", "100"), ("CHUNK_OVERLAP", "99")]).is_ok());
    }

    #[test]
    fn invalid_numbers_are_rejected() {
        assert!(load(&[("TOP_K", "five")]).is_err());
        assert!(load(&[("TOP_K", "0")]).is_err());
        assert!(load(&[("GUARDRAILS_ENABLED", "maybe")]).is_err());
    }

    #[test]
    fn guardrails_flag_and_timeout() {
        let cfg = load(&[("GUARDRAILS_ENABLED", "false"), ("REQUEST_TIMEOUT_SECS", "5")]).unwrap();
        assert!(!cfg.guardrails_enabled);
        assert_eq!(cfg.request_timeout, Duration::from_secs(5));
    }
}
