pub mod chunker;
pub mod tokenizer;

pub use chunker::{Chunk, ChunkMetadata, ChunkStrategy, DocumentMetadata, StrategyTag, TextChunker};
pub use tokenizer::{TiktokenTokenizer, Tokenizer};
