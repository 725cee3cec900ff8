use std::path::Path;

use anyhow::Context;
use serde::Deserialize;

use sage_index::IndexConfig;

#[derive(Debug, Deserialize)]
pub struct Config {
    pub agent: AgentConfig,
    pub llm: LlmConfig,
    pub index: IndexSettings,
    pub store: StoreConfig,
}

#[derive(Debug, Deserialize)]
pub struct AgentConfig {
    pub default_system_prompt: String,
}

#[derive(Debug, Deserialize)]
pub struct LlmConfig {
    pub base_url: String,
    pub model: String,
    pub embedding_model: String,
    pub api_key_env: String,
    pub max_tokens: u32,
}

#[derive(Debug, Deserialize)]
pub struct IndexSettings {
    pub dimension: usize,
    pub top_k: usize,
    pub max_items: usize,
    pub n_neighbor: usize,
    pub n_neighbor0: usize,
}

#[derive(Debug, Deserialize)]
pub struct StoreConfig {
    pub sqlite_path: String,
}

impl Config {
    /// Load configuration from a TOML file with env var overrides.
    ///
    /// Falls back to defaults when the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path).context("failed to read config file")?;
            toml::from_str::<Self>(&content).context("failed to parse config file")?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("SAGE_LLM_BASE_URL") {
            self.llm.base_url = v;
        }
        if let Ok(v) = std::env::var("SAGE_LLM_MODEL") {
            self.llm.model = v;
        }
        if let Ok(v) = std::env::var("SAGE_LLM_EMBEDDING_MODEL") {
            self.llm.embedding_model = v;
        }
        if let Ok(v) = std::env::var("SAGE_STORE_PATH") {
            self.store.sqlite_path = v;
        }
    }

    #[must_use]
    pub fn index_config(&self) -> IndexConfig {
        IndexConfig {
            dimension: self.index.dimension,
            max_items: self.index.max_items,
            n_neighbor: self.index.n_neighbor,
            n_neighbor0: self.index.n_neighbor0,
        }
    }

    fn default() -> Self {
        Self {
            agent: AgentConfig {
                default_system_prompt: "You are a helpful assistant grounded in the \
                                        provided course material."
                    .into(),
            },
            llm: LlmConfig {
                base_url: "https://api.openai.com/v1".into(),
                model: "gpt-4o-mini".into(),
                embedding_model: "text-embedding-3-small".into(),
                api_key_env: "SAGE_API_KEY".into(),
                max_tokens: 1024,
            },
            index: IndexSettings {
                dimension: 1536,
                top_k: 5,
                max_items: 16384,
                n_neighbor: 16,
                n_neighbor0: 32,
            },
            store: StoreConfig {
                sqlite_path: "./data/sage.db".into(),
            },
        }
    }
}
