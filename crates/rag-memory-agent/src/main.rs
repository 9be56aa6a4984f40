use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use rag_memory_agent::document::DocumentMetadata;
use rag_memory_agent::services::{RetrievedChunk, RetrievedMetadata, StaticRetriever};
use rag_memory_agent::utils::init_logger;
use rag_memory_agent::{
    Agent, EntityExtractor, LlmService, LongTermMemory, Settings, TextChunker, TiktokenTokenizer,
    Tokenizer,
};

#[derive(Parser, Debug)]
#[command(
    name = "rag-memory",
    version,
    about = "Layered-memory RAG agent: chunking, entity extraction and long-term memory"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Chunk a document and print one JSON chunk per line
    Chunk {
        /// Text file to chunk
        file: PathBuf,

        /// Title copied into every chunk's metadata
        #[arg(long)]
        title: Option<String>,

        /// Source URL copied into every chunk's metadata
        #[arg(long)]
        url: Option<String>,

        /// `fixed` or `recursive` (defaults to the configured strategy)
        #[arg(long)]
        strategy: Option<String>,

        /// Maximum tokens per chunk
        #[arg(long)]
        size: Option<usize>,

        /// Tokens shared between consecutive fixed windows
        #[arg(long)]
        overlap: Option<usize>,
    },

    /// Print the entities and relations recognized in a piece of text
    Extract {
        text: String,
    },

    /// Answer one question, using the given files as the retrieval corpus
    Ask {
        question: String,

        /// Context documents; their chunks are served in file order
        #[arg(long = "context")]
        context: Vec<PathBuf>,

        /// Number of chunks to retrieve (defaults to retrieval.top_k)
        #[arg(long)]
        top_k: Option<usize>,
    },

    /// Print long-term memory counts
    Stats,

    /// Delete every fact, entity and relation from long-term memory
    Clear,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let settings = Settings::load().context("Failed to load settings")?;
    let _log_guard = init_logger(&settings.logging)?;

    match cli.command {
        Command::Chunk { file, title, url, strategy, size, overlap } => {
            let mut chunking = settings.chunking.clone();
            if let Some(strategy) = strategy {
                chunking.strategy = strategy;
            }
            if let Some(size) = size {
                chunking.size = size;
            }
            if let Some(overlap) = overlap {
                chunking.overlap = overlap;
            }

            let text = tokio::fs::read_to_string(&file)
                .await
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let tokenizer: Arc<dyn Tokenizer> = Arc::new(TiktokenTokenizer::cl100k()?);
            let chunker = TextChunker::new(chunking, tokenizer);
            let chunks = chunker.chunk(&text, &DocumentMetadata { title, url })?;

            info!(file = %file.display(), chunks = chunks.len(), "Document chunked");
            for chunk in &chunks {
                println!("{}", serde_json::to_string(chunk)?);
            }
        }
        Command::Extract { text } => {
            let extractor = EntityExtractor::new();
            let entities = extractor.extract_entities(&text);
            let relations = extractor.extract_relations(&text, &entities);
            let output = serde_json::json!({ "entities": entities, "relations": relations });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        Command::Ask { question, context, top_k } => {
            let tokenizer: Arc<dyn Tokenizer> = Arc::new(TiktokenTokenizer::cl100k()?);
            let chunker = TextChunker::new(settings.chunking.clone(), tokenizer);

            let mut corpus = Vec::new();
            for path in &context {
                let text = tokio::fs::read_to_string(path)
                    .await
                    .with_context(|| format!("Failed to read {}", path.display()))?;
                let title = path.file_stem().map(|s| s.to_string_lossy().into_owned());
                let metadata = DocumentMetadata { title, url: None };
                for chunk in chunker.chunk(&text, &metadata)? {
                    corpus.push(RetrievedChunk {
                        id: format!("{}#{}", path.display(), chunk.metadata.chunk_id),
                        text: chunk.text,
                        metadata: RetrievedMetadata {
                            title: chunk.metadata.title,
                            url: chunk.metadata.url,
                            ..Default::default()
                        },
                        distance: 0.0,
                    });
                }
            }

            let generator = Arc::new(LlmService::new(settings.llm.clone())?);
            let retriever = Arc::new(StaticRetriever::new(corpus));
            let mut agent = Agent::from_settings(&settings, retriever, generator).await?;

            let top_k = top_k.unwrap_or(settings.retrieval.top_k);
            let result = agent.answer(&question, top_k).await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Command::Stats => {
            let ltm = LongTermMemory::open(&settings.memory).await?;
            let stats = ltm.stats(settings.agent.stats_sample_limit).await?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        Command::Clear => {
            let ltm = LongTermMemory::open(&settings.memory).await?;
            ltm.clear().await?;
            info!(path = %settings.memory.ltm_db_path.display(), "Long-term memory cleared");
        }
    }

    Ok(())
}
