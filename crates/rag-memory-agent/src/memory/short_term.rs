use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

use crate::document::Tokenizer;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::System => "system",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct BufferedTurn {
    turn: ConversationTurn,
    tokens: usize,
}

/// Token-budgeted buffer of recent conversation turns.
///
/// After every append the oldest turns are dropped until the summed token
/// count fits the budget. A single turn is never evicted on its own, even
/// when it alone exceeds the budget.
pub struct ShortTermMemory {
    turns: VecDeque<BufferedTurn>,
    token_budget: usize,
    tokenizer: Arc<dyn Tokenizer>,
}

impl ShortTermMemory {
    pub fn new(token_budget: usize, tokenizer: Arc<dyn Tokenizer>) -> Self {
        Self {
            turns: VecDeque::new(),
            token_budget,
            tokenizer,
        }
    }

    pub fn add(&mut self, role: Role, content: impl Into<String>) {
        let content = content.into();
        let tokens = self.tokenizer.count_tokens(&content);

        self.turns.push_back(BufferedTurn {
            turn: ConversationTurn {
                role,
                content,
                timestamp: Utc::now(),
            },
            tokens,
        });

        self.trim_to_budget();
    }

    fn trim_to_budget(&mut self) {
        let mut total = self.total_tokens();
        while self.turns.len() > 1 && total > self.token_budget {
            if let Some(evicted) = self.turns.pop_front() {
                total -= evicted.tokens;
                debug!(
                    role = %evicted.turn.role,
                    tokens = evicted.tokens,
                    remaining = total,
                    "Evicted oldest turn from short-term memory"
                );
            }
        }
    }

    /// Renders the transcript as `ROLE: content` lines.
    pub fn context_string(&self) -> String {
        self.turns
            .iter()
            .map(|t| format!("{}: {}", t.turn.role.as_str().to_uppercase(), t.turn.content))
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn turns(&self) -> impl Iterator<Item = &ConversationTurn> {
        self.turns.iter().map(|t| &t.turn)
    }

    pub fn total_tokens(&self) -> usize {
        self.turns.iter().map(|t| t.tokens).sum()
    }

    pub fn token_budget(&self) -> usize {
        self.token_budget
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn clear(&mut self) {
        self.turns.clear();
    }
}
