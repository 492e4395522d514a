use alcove_chat::orchestrator::{CancelToken, ChatOrchestrator};
use alcove_chat::{AlcoveConfig, HttpChatProvider};
use alcove_embed::HttpEmbeddingProvider;
use alcove_retriever::retrieval::indexing_engine::IndexingEngine;
use alcove_retriever::retrieval::planner::RetrievalPlanner;
use alcove_retriever::storage::VectorStore;
use anyhow::Result;
use clap::{Parser, Subcommand};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_stream::StreamExt;

/// Chat with a local language model, grounded in your own documents.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, default_value = "alcove.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Index new and changed documents
    Reindex {
        /// Discard the existing index and rebuild everything
        #[arg(long)]
        force: bool,
    },
    /// Ask a question against the indexed documents
    Query {
        /// The question to ask
        question: String,
    },
    /// Show index statistics
    Stats,
    /// List models served by the configured provider
    Models,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn,alcove=info".into()),
        )
        .init();

    let args = Args::parse();
    let config = AlcoveConfig::load(&args.config)?;

    let store = Arc::new(VectorStore::new(config.vector_store_config()));
    let embedder = Arc::new(HttpEmbeddingProvider::new(config.embed_http_config())?);

    match args.command {
        Commands::Reindex { force } => {
            let engine = IndexingEngine::new(config.engine_config()?, store, embedder);
            let report = engine.reindex(force).await?;
            println!(
                "indexed: {} new, {} updated, {} unchanged, {} removed, {} failed, {} skipped ({} chunks total)",
                report.new,
                report.updated,
                report.unchanged,
                report.removed,
                report.failed,
                report.skipped,
                report.chunk_count,
            );
        }
        Commands::Query { question } => {
            let engine = IndexingEngine::new(config.engine_config()?, store.clone(), embedder.clone());
            engine.reindex(false).await?;

            let planner = RetrievalPlanner::new(store, embedder, config.retrieval_config());
            let provider = Arc::new(HttpChatProvider::new(config.chat_http_config())?);
            let orchestrator = ChatOrchestrator::new(
                planner,
                provider,
                config.orchestrator_config(),
                config.conversation_history(),
            );

            let mut stream = orchestrator.ask(&question, CancelToken::new()).await?;
            let mut stdout = std::io::stdout();
            while let Some(delta) = stream.next().await {
                write!(stdout, "{}", delta?)?;
                stdout.flush()?;
            }
            writeln!(stdout)?;
        }
        Commands::Stats => {
            if !store.load().await? {
                println!("no index found; run `alcove reindex` first");
                return Ok(());
            }
            let stats = store.stats().await;
            println!("documents: {}", stats.document_count);
            println!("chunks:    {}", stats.chunk_count);
            println!("dimension: {}", stats.dimension);
            match stats.last_indexed {
                Some(when) => println!("indexed:   {}", when.to_rfc3339()),
                None => println!("indexed:   never"),
            }
        }
        Commands::Models => {
            use alcove_chat::provider::ChatProvider;
            let provider = HttpChatProvider::new(config.chat_http_config())?;
            for model in provider.list_models().await? {
                println!("{model}");
            }
        }
    }
    Ok(())
}
