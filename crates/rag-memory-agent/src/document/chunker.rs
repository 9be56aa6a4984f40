use crate::config::ChunkingConfig;
use crate::document::tokenizer::Tokenizer;
use crate::utils::error::{AgentError, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use tracing::debug;

/// Separators tried by the recursive strategy, coarsest first.
const SEPARATORS: [&str; 4] = ["\n\n", "\n", ". ", " "];

/// Configurable chunking strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkStrategy {
    Fixed,     // Token windows with overlap
    Recursive, // Separator-based splitting with forced fallback
}

impl FromStr for ChunkStrategy {
    type Err = AgentError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "fixed" => Ok(Self::Fixed),
            "recursive" => Ok(Self::Recursive),
            other => Err(AgentError::UnknownStrategy(other.to_string())),
        }
    }
}

/// Strategy marker recorded on each produced chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyTag {
    Fixed,
    Recursive,
    RecursiveForced,
}

/// Provenance of the document being chunked.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub title: Option<String>,
    pub url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub title: Option<String>,
    pub url: Option<String>,
    pub chunk_id: usize,
    pub strategy: StrategyTag,
    /// Configured budget, not the actual length.
    pub chunk_size: usize,
    pub token_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_token: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_token: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub text: String,
    pub metadata: ChunkMetadata,
}

pub struct TextChunker {
    config: ChunkingConfig,
    tokenizer: Arc<dyn Tokenizer>,
}

impl TextChunker {
    pub fn new(config: ChunkingConfig, tokenizer: Arc<dyn Tokenizer>) -> Self {
        Self { config, tokenizer }
    }

    pub fn count_tokens(&self, text: &str) -> usize {
        self.tokenizer.count_tokens(text)
    }

    /// Chunk text into token-bounded pieces.
    ///
    /// The strategy name and window sizes are checked before any tokenization
    /// happens. Ids are sequential over the whole document.
    pub fn chunk(&self, text: &str, metadata: &DocumentMetadata) -> Result<Vec<Chunk>> {
        let strategy: ChunkStrategy = self.config.strategy.parse()?;

        if self.config.size == 0 || self.config.overlap >= self.config.size {
            return Err(AgentError::InvalidChunking {
                chunk_size: self.config.size,
                overlap: self.config.overlap,
            });
        }

        if text.trim().is_empty() {
            return Ok(Vec::new());
        }

        debug!(chars = text.len(), ?strategy, "Chunking text");

        let mut chunks = Vec::new();
        match strategy {
            ChunkStrategy::Fixed => self.chunk_fixed(text, metadata, &mut chunks)?,
            ChunkStrategy::Recursive => {
                self.split_recursive(text, &SEPARATORS, metadata, &mut chunks)?
            }
        }

        debug!(count = chunks.len(), "Created chunks");

        Ok(chunks)
    }

    /// Window bounds `[start, end)` over `len` tokens, advancing by
    /// `size - overlap` and stopping once a window reaches the end.
    fn windows(&self, len: usize) -> Vec<(usize, usize)> {
        let mut windows = Vec::new();
        let mut start = 0;

        while start < len {
            let end = (start + self.config.size).min(len);
            windows.push((start, end));

            if end == len {
                break;
            }
            start = end - self.config.overlap;
        }

        windows
    }

    fn chunk_fixed(
        &self,
        text: &str,
        metadata: &DocumentMetadata,
        chunks: &mut Vec<Chunk>,
    ) -> Result<()> {
        let tokens = self.tokenizer.encode(text);

        for (start, end) in self.windows(tokens.len()) {
            let content = self.tokenizer.decode(&tokens[start..end])?;
            let chunk_metadata = self.metadata_for(
                metadata,
                chunks.len(),
                StrategyTag::Fixed,
                end - start,
                Some((start, end)),
            );
            chunks.push(Chunk { text: content, metadata: chunk_metadata });
        }

        Ok(())
    }

    fn split_recursive(
        &self,
        text: &str,
        separators: &[&str],
        metadata: &DocumentMetadata,
        chunks: &mut Vec<Chunk>,
    ) -> Result<()> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Ok(());
        }

        let token_count = self.count_tokens(trimmed);
        if token_count <= self.config.size {
            let chunk_metadata = self.metadata_for(
                metadata,
                chunks.len(),
                StrategyTag::Recursive,
                token_count,
                None,
            );
            chunks.push(Chunk { text: trimmed.to_string(), metadata: chunk_metadata });
            return Ok(());
        }

        let Some((separator, remaining)) = separators.split_first() else {
            return self.split_forced(trimmed, metadata, chunks);
        };

        let mut current = String::new();
        for part in text.split(separator) {
            let candidate = if current.is_empty() {
                part.to_string()
            } else {
                format!("{}{}{}", current, separator, part)
            };

            if self.count_tokens(&candidate) <= self.config.size {
                current = candidate;
            } else {
                if !current.is_empty() {
                    self.split_recursive(&current, remaining, metadata, chunks)?;
                }
                current = part.to_string();
            }
        }

        if !current.is_empty() {
            self.split_recursive(&current, remaining, metadata, chunks)?;
        }

        Ok(())
    }

    /// Last resort for a unit with no separator left to split on.
    fn split_forced(
        &self,
        text: &str,
        metadata: &DocumentMetadata,
        chunks: &mut Vec<Chunk>,
    ) -> Result<()> {
        let tokens = self.tokenizer.encode(text);
        debug!(tokens = tokens.len(), "Forcing token split on unsplittable unit");

        for (start, end) in self.windows(tokens.len()) {
            let content = self.tokenizer.decode(&tokens[start..end])?;
            let chunk_metadata = self.metadata_for(
                metadata,
                chunks.len(),
                StrategyTag::RecursiveForced,
                end - start,
                None,
            );
            chunks.push(Chunk { text: content, metadata: chunk_metadata });
        }

        Ok(())
    }

    fn metadata_for(
        &self,
        document: &DocumentMetadata,
        chunk_id: usize,
        strategy: StrategyTag,
        token_count: usize,
        span: Option<(usize, usize)>,
    ) -> ChunkMetadata {
        ChunkMetadata {
            title: document.title.clone(),
            url: document.url.clone(),
            chunk_id,
            strategy,
            chunk_size: self.config.size,
            token_count,
            start_token: span.map(|(start, _)| start),
            end_token: span.map(|(_, end)| end),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::tokenizer::TiktokenTokenizer;

    fn chunker(strategy: &str, size: usize, overlap: usize) -> TextChunker {
        let tokenizer = Arc::new(TiktokenTokenizer::cl100k().unwrap());
        TextChunker::new(
            ChunkingConfig { strategy: strategy.to_string(), size, overlap },
            tokenizer,
        )
    }

    fn doc() -> DocumentMetadata {
        DocumentMetadata {
            title: Some("Green flash".to_string()),
            url: Some("https://en.wikipedia.org/wiki/Green_flash".to_string()),
        }
    }

    #[test]
    fn test_fixed_windows_overlap() {
        let chunker = chunker("fixed", 10, 2);
        // 25 tokens: "a" followed by 24 " a"
        let text = format!("a{}", " a".repeat(24));
        assert_eq!(chunker.count_tokens(&text), 25);

        let chunks = chunker.chunk(&text, &doc()).unwrap();
        let spans: Vec<(Option<usize>, Option<usize>)> = chunks
            .iter()
            .map(|c| (c.metadata.start_token, c.metadata.end_token))
            .collect();
        assert_eq!(
            spans,
            vec![(Some(0), Some(10)), (Some(8), Some(18)), (Some(16), Some(25))]
        );
        let ids: Vec<usize> = chunks.iter().map(|c| c.metadata.chunk_id).collect();
        assert_eq!(ids, vec![0, 1, 2]);
        assert!(chunks.iter().all(|c| c.metadata.strategy == StrategyTag::Fixed));
        assert_eq!(chunks[0].metadata.title.as_deref(), Some("Green flash"));
    }

    #[test]
    fn test_fixed_short_document_is_single_chunk() {
        let chunker = chunker("fixed", 512, 50);
        let chunks = chunker.chunk("Blood Falls is in Antarctica.", &doc()).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "Blood Falls is in Antarctica.");
        assert_eq!(chunks[0].metadata.start_token, Some(0));
    }

    #[test]
    fn test_empty_and_whitespace_input() {
        for strategy in ["fixed", "recursive"] {
            let chunker = chunker(strategy, 10, 2);
            assert!(chunker.chunk("", &doc()).unwrap().is_empty());
            assert!(chunker.chunk("  \n\n \t ", &doc()).unwrap().is_empty());
        }
    }

    #[test]
    fn test_unknown_strategy_fails_before_work() {
        let chunker = chunker("semantic", 10, 2);
        // Even empty input is rejected: the strategy is checked first.
        assert!(matches!(
            chunker.chunk("", &doc()),
            Err(AgentError::UnknownStrategy(name)) if name == "semantic"
        ));
    }

    #[test]
    fn test_overlap_not_below_size_is_rejected() {
        let chunker = chunker("fixed", 4, 4);
        assert!(matches!(
            chunker.chunk("a a a a a a", &doc()),
            Err(AgentError::InvalidChunking { .. })
        ));
    }

    #[test]
    fn test_recursive_short_document_is_single_chunk() {
        let chunker = chunker("recursive", 512, 50);
        let chunks = chunker.chunk("  The Brocken spectre.\n\nSeen from hills.  ", &doc()).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "The Brocken spectre.\n\nSeen from hills.");
        assert_eq!(chunks[0].metadata.strategy, StrategyTag::Recursive);
        assert_eq!(chunks[0].metadata.start_token, None);
    }

    #[test]
    fn test_recursive_respects_budget_and_ids() {
        let chunker = chunker("recursive", 12, 2);
        let paragraph = "Sailing stones move across the playa. They leave long tracks.\nNobody saw them move for decades.";
        let text = [paragraph; 4].join("\n\n");

        let chunks = chunker.chunk(&text, &doc()).unwrap();
        assert!(chunks.len() > 1);
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.metadata.chunk_id, i);
            assert!(chunker.count_tokens(&chunk.text) <= 12, "chunk {} too long", i);
            assert_eq!(chunk.text, chunk.text.trim());
        }
        assert!(chunks.iter().all(|c| c.metadata.strategy == StrategyTag::Recursive));
    }

    #[test]
    fn test_recursive_prefers_paragraph_boundaries() {
        let chunker = chunker("recursive", 8, 2);
        let text = "a a a a a\n\nb b b b b\n\nc c c c c";
        let chunks = chunker.chunk(text, &doc()).unwrap();
        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, vec!["a a a a a", "b b b b b", "c c c c c"]);
    }

    #[test]
    fn test_recursive_forced_split_for_unbroken_unit() {
        let chunker = chunker("recursive", 5, 1);
        // No separators at all, so every level is exhausted.
        let text = "Catatumbo".repeat(20);
        assert!(chunker.count_tokens(&text) > 5);

        let chunks = chunker.chunk(&text, &doc()).unwrap();
        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|c| c.metadata.strategy == StrategyTag::RecursiveForced));
        assert!(chunks.iter().all(|c| c.metadata.token_count <= 5));
        let ids: Vec<usize> = chunks.iter().map(|c| c.metadata.chunk_id).collect();
        assert_eq!(ids, (0..chunks.len()).collect::<Vec<_>>());
    }

    const MULTIBYTE_TEXT: &str =
        "Le phénomène 🌈🌈🌈 du rayon vert, observé à Ōsaka 日本語の文章です。";

    #[test]
    fn test_fixed_windows_over_multibyte_text() {
        let chunker = chunker("fixed", 7, 2);
        let text = MULTIBYTE_TEXT.repeat(5);

        let chunks = chunker.chunk(&text, &doc()).unwrap();
        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|c| c.metadata.token_count <= 7));
        assert_eq!(chunks.last().unwrap().metadata.end_token, Some(chunker.count_tokens(&text)));
    }

    #[test]
    fn test_forced_split_over_multibyte_text() {
        let chunker = chunker("recursive", 5, 1);
        let text = "🌈日本語".repeat(20);

        let chunks = chunker.chunk(&text, &doc()).unwrap();
        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|c| c.metadata.strategy == StrategyTag::RecursiveForced));
        assert!(chunks.iter().all(|c| c.metadata.token_count <= 5));
    }

    /// One token per char, so token lengths are exact.
    struct CharTokenizer;

    impl Tokenizer for CharTokenizer {
        fn encode(&self, text: &str) -> Vec<u32> {
            text.chars().map(u32::from).collect()
        }

        fn decode(&self, tokens: &[u32]) -> Result<String> {
            Ok(tokens.iter().filter_map(|&t| char::from_u32(t)).collect())
        }
    }

    #[test]
    fn test_forced_split_stops_at_window_reaching_end() {
        let chunker = TextChunker::new(
            ChunkingConfig { strategy: "recursive".to_string(), size: 5, overlap: 1 },
            Arc::new(CharTokenizer),
        );
        let text = "x".repeat(57);

        let chunks = chunker.chunk(&text, &doc()).unwrap();

        // Starts 0, 4, .., 52; the window at 52 reaches 57, so no trailing
        // window at 56 duplicating the last token.
        assert_eq!(chunks.len(), 14);
        assert!(chunks.iter().all(|c| c.metadata.token_count == 5));
        assert!(chunks.iter().all(|c| c.metadata.strategy == StrategyTag::RecursiveForced));
    }

    #[test]
    fn test_ids_stay_sequential_across_mixed_split_paths() {
        let chunker = chunker("recursive", 6, 1);
        let text = format!("short one\n\n{}\n\nshort two", "Brinicle".repeat(12));
        let chunks = chunker.chunk(&text, &doc()).unwrap();

        assert_eq!(chunks.first().unwrap().text, "short one");
        assert_eq!(chunks.last().unwrap().text, "short two");
        assert!(chunks
            .iter()
            .any(|c| c.metadata.strategy == StrategyTag::RecursiveForced));
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.metadata.chunk_id, i);
        }
    }

    #[test]
    fn test_chunking_is_deterministic() {
        let chunker = chunker("recursive", 10, 2);
        let text = "Lake Nyos released carbon dioxide.\nThe cloud flowed downhill. Villages were affected.";
        assert_eq!(
            chunker.chunk(text, &doc()).unwrap(),
            chunker.chunk(text, &doc()).unwrap()
        );
    }
}
