pub mod settings;

pub use settings::{
    AgentConfig, ChunkingConfig, LlmConfig, LoggingConfig, MemoryConfig, RetrievalConfig,
    Settings,
};
