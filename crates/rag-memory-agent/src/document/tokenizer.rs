use tiktoken_rs::CoreBPE;

use crate::utils::error::{AgentError, Result};

/// Token counting and windowing capability shared by the chunker and STM.
pub trait Tokenizer: Send + Sync {
    fn encode(&self, text: &str) -> Vec<u32>;

    fn decode(&self, tokens: &[u32]) -> Result<String>;

    fn count_tokens(&self, text: &str) -> usize {
        self.encode(text).len()
    }
}

/// `cl100k_base` BPE, the encoding used by current OpenAI chat models.
pub struct TiktokenTokenizer {
    bpe: CoreBPE,
}

impl TiktokenTokenizer {
    pub fn cl100k() -> Result<Self> {
        let bpe = tiktoken_rs::cl100k_base()
            .map_err(|e| AgentError::Tokenizer(format!("Failed to load cl100k_base: {}", e)))?;
        Ok(Self { bpe })
    }
}

impl Tokenizer for TiktokenTokenizer {
    fn encode(&self, text: &str) -> Vec<u32> {
        self.bpe.encode_ordinary(text)
    }

    /// Byte sequences cut by a window boundary decode to U+FFFD.
    fn decode(&self, tokens: &[u32]) -> Result<String> {
        let bytes: Vec<u8> = self
            .bpe
            ._decode_native_and_split(tokens.to_vec())
            .flatten()
            .collect();
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

impl std::fmt::Debug for TiktokenTokenizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TiktokenTokenizer").field("encoding", &"cl100k_base").finish()
    }
}
