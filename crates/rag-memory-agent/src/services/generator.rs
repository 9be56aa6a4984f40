use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Completion text plus the token usage reported by the model.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Completion {
    pub text: String,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

/// Turns a fully assembled prompt into an answer.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Generator: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<Completion>;
}

/// Offline generator: answers with a fixed reply, reporting whitespace word
/// counts as token usage.
#[derive(Debug, Clone)]
pub struct EchoGenerator {
    reply: String,
}

impl EchoGenerator {
    pub fn new(reply: impl Into<String>) -> Self {
        Self { reply: reply.into() }
    }
}

#[async_trait]
impl Generator for EchoGenerator {
    async fn complete(&self, prompt: &str) -> Result<Completion> {
        Ok(Completion {
            text: self.reply.clone(),
            prompt_tokens: word_count(prompt),
            completion_tokens: word_count(&self.reply),
        })
    }
}

/// Saturates at `u32::MAX`.
fn word_count(text: &str) -> u32 {
    u32::try_from(text.split_whitespace().count()).unwrap_or(u32::MAX)
}
