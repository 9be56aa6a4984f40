use serde::{Serialize, Serializer};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use super::generator::Generator;
use super::retriever::{RetrievedChunk, Retriever};
use crate::config::{AgentConfig, Settings};
use crate::document::{TiktokenTokenizer, Tokenizer};
use crate::memory::{EntityExtractor, LongTermMemory, LtmStats, Role, ShortTermMemory};
use crate::utils::error::{AgentError, Result};

const QUESTION_PREVIEW_CHARS: usize = 100;
const ANSWER_PREVIEW_CHARS: usize = 200;
const CHUNK_EXTRACTION_CHARS: usize = 500;

/// Outcome of one `Agent::answer` call.
#[derive(Debug, Clone, Serialize)]
pub struct AnswerResult {
    pub answer: String,
    pub retrieved_chunks: Vec<RetrievedChunk>,
    pub tokens_in: u32,
    pub tokens_out: u32,
    #[serde(serialize_with = "serialize_secs")]
    pub latency: Duration,
}

fn serialize_secs<S: Serializer>(latency: &Duration, serializer: S) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_f64(latency.as_secs_f64())
}

/// Question-answering loop over a retriever and a generator, with optional
/// short-term (session) and long-term (cross-session) memory.
///
/// Every step of `answer` runs to completion before the next starts. A
/// failure aborts the call without undoing memory writes already made.
pub struct Agent {
    retriever: Arc<dyn Retriever>,
    generator: Arc<dyn Generator>,
    stm: Option<ShortTermMemory>,
    ltm: Option<LongTermMemory>,
    extractor: EntityExtractor,
    config: AgentConfig,
}

impl Agent {
    /// An agent with both memory tiers disabled.
    pub fn new(
        retriever: Arc<dyn Retriever>,
        generator: Arc<dyn Generator>,
        config: AgentConfig,
    ) -> Self {
        Self {
            retriever,
            generator,
            stm: None,
            ltm: None,
            extractor: EntityExtractor::new(),
            config,
        }
    }

    pub fn with_short_term(mut self, stm: ShortTermMemory) -> Self {
        self.stm = Some(stm);
        self
    }

    pub fn with_long_term(mut self, ltm: LongTermMemory) -> Self {
        self.ltm = Some(ltm);
        self
    }

    /// Builds the memory tiers enabled in `settings.memory`, using the
    /// `cl100k_base` tokenizer and the SQLite store.
    pub async fn from_settings(
        settings: &Settings,
        retriever: Arc<dyn Retriever>,
        generator: Arc<dyn Generator>,
    ) -> Result<Self> {
        let mut agent = Self::new(retriever, generator, settings.agent.clone());

        if settings.memory.use_stm {
            let tokenizer: Arc<dyn Tokenizer> = Arc::new(TiktokenTokenizer::cl100k()?);
            agent = agent.with_short_term(ShortTermMemory::new(
                settings.memory.stm_token_budget,
                tokenizer,
            ));
        }
        if settings.memory.use_ltm {
            agent = agent.with_long_term(LongTermMemory::open(&settings.memory).await?);
        }

        info!(
            use_stm = settings.memory.use_stm,
            use_ltm = settings.memory.use_ltm,
            "Agent initialized"
        );
        Ok(agent)
    }

    pub fn short_term(&self) -> Option<&ShortTermMemory> {
        self.stm.as_ref()
    }

    pub fn long_term(&self) -> Option<&LongTermMemory> {
        self.ltm.as_ref()
    }

    pub async fn answer(&mut self, question: &str, top_k: usize) -> Result<AnswerResult> {
        let start = Instant::now();

        let retrieved_chunks = self
            .retriever
            .search(question, top_k, None)
            .await
            .map_err(AgentError::Retrieval)?;
        debug!(count = retrieved_chunks.len(), top_k, "Retrieved chunks");

        let context = build_context(&retrieved_chunks);
        let prompt = self.build_prompt(question, &context).await?;
        debug!(prompt_chars = prompt.len(), "Prompt assembled");

        let completion = self
            .generator
            .complete(&prompt)
            .await
            .map_err(AgentError::Generation)?;

        if let Some(stm) = self.stm.as_mut() {
            stm.add(Role::User, question);
            stm.add(Role::Assistant, completion.text.as_str());
        }

        if let Some(ltm) = &self.ltm {
            self.update_long_term(ltm, question, &completion.text, &retrieved_chunks)
                .await?;
        }

        let latency = start.elapsed();
        info!(
            chunks = retrieved_chunks.len(),
            tokens_in = completion.prompt_tokens,
            tokens_out = completion.completion_tokens,
            latency_ms = latency.as_millis() as u64,
            "Answer completed"
        );

        Ok(AnswerResult {
            answer: completion.text,
            retrieved_chunks,
            tokens_in: completion.prompt_tokens,
            tokens_out: completion.completion_tokens,
            latency,
        })
    }

    /// Clears the conversation buffer. Long-term memory is untouched.
    pub fn reset_session(&mut self) {
        if let Some(stm) = self.stm.as_mut() {
            stm.clear();
        }
    }

    pub fn get_stm_context(&self) -> String {
        self.stm.as_ref().map(ShortTermMemory::context_string).unwrap_or_default()
    }

    /// Zeros when long-term memory is disabled.
    pub async fn get_ltm_stats(&self) -> Result<LtmStats> {
        match &self.ltm {
            Some(ltm) => ltm.stats(self.config.stats_sample_limit).await,
            None => Ok(LtmStats::default()),
        }
    }

    async fn build_prompt(&self, question: &str, context: &str) -> Result<String> {
        let mut parts = vec![self.config.system_instruction.clone()];

        if let Some(stm) = self.stm.as_ref().filter(|stm| !stm.is_empty()) {
            parts.push(format!("\nConversation History:\n{}\n", stm.context_string()));
        }

        if let Some(ltm) = &self.ltm {
            let facts = ltm
                .get_facts(self.config.prompt_fact_limit, self.config.prompt_min_salience)
                .await?;
            if !facts.is_empty() {
                let lines: Vec<String> = facts.iter().map(|f| format!("- {}", f.content)).collect();
                parts.push(format!(
                    "\nRelevant Facts from Previous Sessions:\n{}\n",
                    lines.join("\n")
                ));
            }

            let entities = ltm.get_all_entities().await?;
            if !entities.is_empty() {
                let lines: Vec<String> = entities
                    .iter()
                    .take(self.config.prompt_entity_limit)
                    .map(|e| format!("- {} ({})", e.name, e.entity_type))
                    .collect();
                parts.push(format!("\nKnown Entities:\n{}\n", lines.join("\n")));
            }

            let relations = ltm
                .get_entity_relations(self.config.prompt_relation_limit)
                .await?;
            if !relations.is_empty() {
                let lines: Vec<String> = relations
                    .iter()
                    .map(|r| {
                        format!(
                            "- {} {} {}",
                            r.entity1,
                            r.relation_type.replace('_', " "),
                            r.entity2
                        )
                    })
                    .collect();
                parts.push(format!("\nKnown Relationships:\n{}\n", lines.join("\n")));
            }
        }

        parts.push(format!("\nRelevant Context:\n{}\n", context));
        parts.push(format!("\nQuestion: {}\n", question));
        parts.push(format!("\n{}", self.config.closing_instruction));

        Ok(parts.join("\n"))
    }

    /// No-op without retrieved chunks.
    async fn update_long_term(
        &self,
        ltm: &LongTermMemory,
        question: &str,
        answer: &str,
        retrieved_chunks: &[RetrievedChunk],
    ) -> Result<()> {
        let Some(top) = retrieved_chunks.first() else {
            debug!("No chunks retrieved, skipping long-term memory update");
            return Ok(());
        };
        let source = top.title();

        let content = format!(
            "Q: {}... A: {}...",
            truncate_chars(question, QUESTION_PREVIEW_CHARS),
            truncate_chars(answer, ANSWER_PREVIEW_CHARS)
        );
        ltm.save_fact(&content, Some(source), self.config.fact_salience, true)
            .await?;

        let combined = format!(
            "{} {} {}",
            question,
            answer,
            truncate_chars(&top.text, CHUNK_EXTRACTION_CHARS)
        );

        let entities = self.extractor.extract_entities(&combined);
        for entity in &entities {
            ltm.save_entity(&entity.name, entity.entity_type, &entity.attributes)
                .await?;
        }

        let relations = self.extractor.extract_relations(&combined, &entities);
        let mut saved_relations = 0usize;
        for relation in &relations {
            let saved = ltm
                .save_relation(&relation.source, &relation.target, &relation.relation_type)
                .await?;
            if saved.is_some() {
                saved_relations += 1;
                let description = format!(
                    "{} {} {}",
                    relation.source, relation.relation_type, relation.target
                );
                ltm.save_fact(
                    &description,
                    Some(source),
                    self.config.relation_fact_salience,
                    true,
                )
                .await?;
            }
        }

        debug!(
            entities = entities.len(),
            relations = saved_relations,
            source,
            "Long-term memory updated"
        );
        Ok(())
    }
}

/// `[Source i: title]` headed blocks in rank order, separated by blank lines.
pub fn build_context(chunks: &[RetrievedChunk]) -> String {
    chunks
        .iter()
        .enumerate()
        .map(|(i, chunk)| format!("[Source {}: {}]\n{}", i + 1, chunk.title(), chunk.text))
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn truncate_chars(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{EntityType, InMemoryKnowledgeStore, KnowledgeStore};
    use crate::services::generator::{Completion, EchoGenerator, MockGenerator};
    use crate::services::retriever::{MockRetriever, RetrievedMetadata, StaticRetriever};

    struct WordTokenizer;

    impl Tokenizer for WordTokenizer {
        fn encode(&self, text: &str) -> Vec<u32> {
            vec![0; text.split_whitespace().count()]
        }

        fn decode(&self, _tokens: &[u32]) -> Result<String> {
            Ok(String::new())
        }
    }

    const CHUNK_TEXT: &str = "The Green Flash was studied by Jane Smith near Antarctica";
    const ANSWER: &str = "It is a refraction effect.";

    fn chunk(title: Option<&str>, text: &str) -> RetrievedChunk {
        RetrievedChunk {
            id: "doc-1#0".to_string(),
            text: text.to_string(),
            metadata: RetrievedMetadata {
                title: title.map(str::to_string),
                ..Default::default()
            },
            distance: 0.12,
        }
    }

    fn stm() -> ShortTermMemory {
        ShortTermMemory::new(2000, Arc::new(WordTokenizer))
    }

    fn full_agent(chunks: Vec<RetrievedChunk>, store: Arc<InMemoryKnowledgeStore>) -> Agent {
        Agent::new(
            Arc::new(StaticRetriever::new(chunks)),
            Arc::new(EchoGenerator::new(ANSWER)),
            AgentConfig::default(),
        )
        .with_short_term(stm())
        .with_long_term(LongTermMemory::new(store))
    }

    #[test]
    fn test_build_context_format() {
        let chunks = vec![chunk(Some("Optics"), "first"), chunk(None, "second")];
        assert_eq!(
            build_context(&chunks),
            "[Source 1: Optics]\nfirst\n\n[Source 2: Unknown]\nsecond"
        );
    }

    #[test]
    fn test_truncate_chars_respects_char_boundaries() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("short", 100), "short");
    }

    #[tokio::test]
    async fn test_answer_persists_fact_entities_and_relations() {
        let store = Arc::new(InMemoryKnowledgeStore::new());
        let mut agent = full_agent(vec![chunk(Some("Atmospheric Optics"), CHUNK_TEXT)], store.clone());

        let result = agent.answer("What is the green flash?", 3).await.unwrap();
        assert_eq!(result.answer, ANSWER);
        assert_eq!(result.retrieved_chunks.len(), 1);
        assert_eq!(result.tokens_out, 5);

        let facts = store.get_facts(100, 0.0).await.unwrap();
        assert_eq!(facts.len(), 3);
        let base = facts
            .iter()
            .find(|f| f.content.starts_with("Q: "))
            .unwrap();
        assert_eq!(
            base.content,
            "Q: What is the green flash?... A: It is a refraction effect...."
        );
        assert_eq!(base.source.as_deref(), Some("Atmospheric Optics"));
        assert_eq!(base.salience, 0.7);

        let mut relation_facts: Vec<&str> = facts
            .iter()
            .filter(|f| f.salience == 0.6)
            .map(|f| f.content.as_str())
            .collect();
        relation_facts.sort();
        assert_eq!(
            relation_facts,
            vec!["Green Flash occurs_in Antarctica", "Jane Smith studied Green Flash"]
        );

        let entity = store.get_entity("Green Flash").await.unwrap().unwrap();
        assert_eq!(entity.entity_type, EntityType::Phenomenon);
        assert_eq!(store.get_all_entities().await.unwrap().len(), 3);
        assert_eq!(store.get_entity_relations(100).await.unwrap().len(), 2);

        assert_eq!(
            agent.get_stm_context(),
            format!("USER: What is the green flash?\nASSISTANT: {}", ANSWER)
        );
    }

    #[tokio::test]
    async fn test_each_answer_adds_exactly_one_base_fact() {
        let store = Arc::new(InMemoryKnowledgeStore::new());
        let mut agent = full_agent(vec![chunk(Some("Notes"), "nothing notable here")], store.clone());

        agent.answer("first question", 3).await.unwrap();
        agent.answer("second question", 3).await.unwrap();

        let facts = store.get_facts(100, 0.0).await.unwrap();
        assert_eq!(facts.len(), 2);
        assert!(facts.iter().all(|f| f.content.starts_with("Q: ")));
    }

    #[tokio::test]
    async fn test_no_chunks_skips_long_term_update() {
        let store = Arc::new(InMemoryKnowledgeStore::new());
        let mut agent = full_agent(Vec::new(), store.clone());

        let result = agent.answer("What is the green flash?", 3).await.unwrap();
        assert!(result.retrieved_chunks.is_empty());
        assert_eq!(agent.get_ltm_stats().await.unwrap(), LtmStats::default());
        assert_eq!(agent.short_term().map(ShortTermMemory::len), Some(2));
    }

    #[tokio::test]
    async fn test_long_term_disabled_persists_nothing() {
        let mut agent = Agent::new(
            Arc::new(StaticRetriever::new(vec![chunk(Some("T"), CHUNK_TEXT)])),
            Arc::new(EchoGenerator::new(ANSWER)),
            AgentConfig::default(),
        )
        .with_short_term(stm());

        agent.answer("What is the green flash?", 3).await.unwrap();
        assert!(agent.long_term().is_none());
        assert_eq!(agent.get_ltm_stats().await.unwrap(), LtmStats::default());
    }

    #[tokio::test]
    async fn test_short_term_disabled_has_empty_context() {
        let mut agent = Agent::new(
            Arc::new(StaticRetriever::new(Vec::new())),
            Arc::new(EchoGenerator::new(ANSWER)),
            AgentConfig::default(),
        );
        agent.answer("anything", 3).await.unwrap();
        assert_eq!(agent.get_stm_context(), "");
    }

    #[tokio::test]
    async fn test_reset_session_keeps_long_term_memory() {
        let store = Arc::new(InMemoryKnowledgeStore::new());
        let mut agent = full_agent(vec![chunk(Some("Atmospheric Optics"), CHUNK_TEXT)], store.clone());
        agent.answer("What is the green flash?", 3).await.unwrap();

        agent.reset_session();

        assert_eq!(agent.get_stm_context(), "");
        let stats = agent.get_ltm_stats().await.unwrap();
        assert_eq!(
            stats,
            LtmStats { total_facts: 3, total_entities: 3, total_relations: 2 }
        );
    }

    #[tokio::test]
    async fn test_prompt_without_memory_content() {
        let store = Arc::new(InMemoryKnowledgeStore::new());
        let agent = full_agent(Vec::new(), store);
        let config = AgentConfig::default();

        let prompt = agent.build_prompt("q?", "[Source 1: T]\nbody").await.unwrap();
        assert_eq!(
            prompt,
            format!(
                "{}\n\nRelevant Context:\n[Source 1: T]\nbody\n\n\nQuestion: q?\n\n\n{}",
                config.system_instruction, config.closing_instruction
            )
        );
    }

    #[tokio::test]
    async fn test_second_prompt_includes_both_memory_tiers() {
        let store = Arc::new(InMemoryKnowledgeStore::new());
        let mut agent = full_agent(vec![chunk(Some("Atmospheric Optics"), CHUNK_TEXT)], store);
        agent.answer("What is the green flash?", 3).await.unwrap();

        let prompt = agent.build_prompt("And where?", "ctx").await.unwrap();

        assert!(prompt.contains("\nConversation History:\nUSER: What is the green flash?\n"));
        assert!(prompt.contains("\nRelevant Facts from Previous Sessions:\n- "));
        assert!(prompt.contains("- Green Flash (phenomenon)"));
        assert!(prompt.contains("- Jane Smith (person)"));
        assert!(prompt.contains("- Antarctica (location)"));
        assert!(prompt.contains("- Green Flash occurs in Antarctica"));
        assert!(prompt.contains("- Jane Smith studied Green Flash"));
        assert!(prompt.ends_with("\nQuestion: And where?\n\n\nProvide a clear and accurate answer based on the context provided."));
    }

    #[tokio::test]
    async fn test_prompt_fact_and_entity_limits() {
        let store = Arc::new(InMemoryKnowledgeStore::new());
        let ltm = LongTermMemory::new(store);
        for i in 0..8 {
            ltm.save_fact(&format!("fact {}", i), None, 0.9, true).await.unwrap();
        }
        ltm.save_fact("quiet fact", None, 0.1, true).await.unwrap();
        for i in 0..12 {
            ltm.save_entity(&format!("Place{}", i), EntityType::Location, &Default::default())
                .await
                .unwrap();
        }

        let agent = Agent::new(
            Arc::new(StaticRetriever::default()),
            Arc::new(EchoGenerator::new(ANSWER)),
            AgentConfig::default(),
        )
        .with_long_term(ltm);

        let prompt = agent.build_prompt("q", "ctx").await.unwrap();
        assert_eq!(prompt.matches("- fact ").count(), 5);
        assert!(!prompt.contains("quiet fact"));
        assert_eq!(prompt.matches("(location)").count(), 10);
    }

    #[tokio::test]
    async fn test_generator_receives_assembled_prompt() {
        let mut generator = MockGenerator::new();
        generator
            .expect_complete()
            .withf(|prompt: &str| {
                prompt.contains("[Source 1: Atmospheric Optics]\n") && prompt.contains("Question: Why green?")
            })
            .times(1)
            .returning(|_| {
                Ok(Completion { text: "Dispersion.".to_string(), prompt_tokens: 40, completion_tokens: 2 })
            });

        let mut agent = Agent::new(
            Arc::new(StaticRetriever::new(vec![chunk(Some("Atmospheric Optics"), "body")])),
            Arc::new(generator),
            AgentConfig::default(),
        );

        let result = agent.answer("Why green?", 3).await.unwrap();
        assert_eq!(result.answer, "Dispersion.");
        assert_eq!((result.tokens_in, result.tokens_out), (40, 2));
    }

    #[tokio::test]
    async fn test_retriever_failure_aborts_before_generation() {
        let mut retriever = MockRetriever::new();
        retriever
            .expect_search()
            .times(1)
            .returning(|_, _, _| Err(anyhow::anyhow!("index offline")));
        let mut generator = MockGenerator::new();
        generator.expect_complete().never();

        let store = Arc::new(InMemoryKnowledgeStore::new());
        let mut agent = Agent::new(Arc::new(retriever), Arc::new(generator), AgentConfig::default())
            .with_short_term(stm())
            .with_long_term(LongTermMemory::new(store.clone()));

        let err = agent.answer("q", 3).await.unwrap_err();
        assert!(matches!(err, AgentError::Retrieval(_)));
        assert_eq!(agent.get_stm_context(), "");
        assert!(store.get_facts(10, 0.0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_generator_failure_leaves_memory_untouched() {
        let mut generator = MockGenerator::new();
        generator
            .expect_complete()
            .returning(|_| Err(anyhow::anyhow!("upstream 503")));

        let store = Arc::new(InMemoryKnowledgeStore::new());
        let mut agent = Agent::new(
            Arc::new(StaticRetriever::new(vec![chunk(None, CHUNK_TEXT)])),
            Arc::new(generator),
            AgentConfig::default(),
        )
        .with_short_term(stm())
        .with_long_term(LongTermMemory::new(store.clone()));

        let err = agent.answer("q", 3).await.unwrap_err();
        assert!(matches!(err, AgentError::Generation(_)));
        assert!(agent.short_term().map(ShortTermMemory::is_empty).unwrap_or(false));
        assert!(store.get_all_entities().await.unwrap().is_empty());
    }

    #[test]
    fn test_answer_result_serializes_latency_in_seconds() {
        let result = AnswerResult {
            answer: "a".to_string(),
            retrieved_chunks: Vec::new(),
            tokens_in: 1,
            tokens_out: 1,
            latency: Duration::from_millis(1500),
        };
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["latency"], serde_json::json!(1.5));
    }
}
