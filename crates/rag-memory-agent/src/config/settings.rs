use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::utils::error::{AgentError, Result};

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
#[serde(default)]
pub struct Settings {
    pub memory: MemoryConfig,
    pub chunking: ChunkingConfig,
    pub retrieval: RetrievalConfig,
    pub llm: LlmConfig,
    pub agent: AgentConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct MemoryConfig {
    pub ltm_db_path: PathBuf,
    pub stm_token_budget: usize,
    pub use_stm: bool,
    pub use_ltm: bool,
    pub pool_max_size: u32,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            ltm_db_path: PathBuf::from("./data/ltm.db"),
            stm_token_budget: 2000,
            use_stm: true,
            use_ltm: true,
            pool_max_size: 4,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Kept as text; interpreted only when chunking runs.
    pub strategy: String,
    pub size: usize,
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            strategy: "fixed".to_string(),
            size: 512,
            overlap: 50,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct RetrievalConfig {
    pub top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self { top_k: 3 }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct LlmConfig {
    pub base_url: String,
    pub model: String,
    pub api_key: Option<String>,
    pub temperature: f32,
    pub max_tokens: usize,
    /// None means the HTTP client never times out.
    pub timeout_seconds: Option<u64>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com".to_string(),
            model: "gpt-4o-2024-08-06".to_string(),
            api_key: None,
            temperature: 0.7,
            max_tokens: 500,
            timeout_seconds: None,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct AgentConfig {
    pub system_instruction: String,
    pub closing_instruction: String,
    pub fact_salience: f64,
    pub relation_fact_salience: f64,
    pub prompt_fact_limit: usize,
    pub prompt_min_salience: f64,
    pub prompt_entity_limit: usize,
    pub prompt_relation_limit: usize,
    pub stats_sample_limit: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            system_instruction:
                "You are a knowledgeable assistant specializing in unusual natural phenomena."
                    .to_string(),
            closing_instruction:
                "Provide a clear and accurate answer based on the context provided.".to_string(),
            fact_salience: 0.7,
            relation_fact_salience: 0.6,
            prompt_fact_limit: 5,
            prompt_min_salience: 0.3,
            prompt_entity_limit: 10,
            prompt_relation_limit: 15,
            stats_sample_limit: 100,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    pub format: String,
    pub directory: PathBuf,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: "pretty".to_string(),
            directory: PathBuf::from("logs"),
        }
    }
}

impl Settings {
    pub fn load() -> Result<Self> {
        // Load from environment first
        dotenvy::dotenv().ok();

        let config = Config::builder()
            // Load from config file
            .add_source(File::with_name("config/settings").required(false))
            // Override with environment variables (prefix: APP)
            // Example: APP_MEMORY__STM_TOKEN_BUDGET=4000
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true)
            )
            .build()?;

        let settings: Settings = config.try_deserialize()?;

        settings.validate()?;

        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if self.chunking.size == 0 || self.chunking.overlap >= self.chunking.size {
            return Err(AgentError::InvalidChunking {
                chunk_size: self.chunking.size,
                overlap: self.chunking.overlap,
            });
        }

        if self.memory.stm_token_budget == 0 {
            return Err(AgentError::ConfigError(
                "memory.stm_token_budget must be greater than zero".to_string(),
            ));
        }

        for (name, value) in [
            ("agent.fact_salience", self.agent.fact_salience),
            ("agent.relation_fact_salience", self.agent.relation_fact_salience),
            ("agent.prompt_min_salience", self.agent.prompt_min_salience),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(AgentError::ConfigError(format!(
                    "{} must be within [0, 1], got {}",
                    name, value
                )));
            }
        }

        Ok(())
    }
}
