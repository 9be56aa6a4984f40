//! Layered-memory retrieval-augmented question answering.
//!
//! Documents are split into token-bounded chunks for an external index; at
//! query time the [`Agent`] combines retrieved chunks with a short-term
//! conversation buffer and a persistent store of facts, entities and
//! relations before calling the language model.

pub mod config;
pub mod database;
pub mod document;
pub mod memory;
pub mod services;
pub mod utils;

pub use config::Settings;
pub use document::{Chunk, TextChunker, TiktokenTokenizer, Tokenizer};
pub use memory::{EntityExtractor, LongTermMemory, ShortTermMemory};
pub use services::{Agent, AnswerResult, Generator, LlmService, Retriever};
pub use utils::error::{AgentError, Result};
