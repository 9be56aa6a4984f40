pub mod agent;
pub mod generator;
pub mod llm_service;
pub mod retriever;

pub use agent::{build_context, Agent, AnswerResult};
pub use generator::{Completion, EchoGenerator, Generator};
pub use llm_service::LlmService;
pub use retriever::{RetrievedChunk, RetrievedMetadata, Retriever, SearchFilters, StaticRetriever};
