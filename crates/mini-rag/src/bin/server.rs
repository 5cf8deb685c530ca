//! RAG Server binary
//!
//! Run with: cargo run -p mini-rag --bin mini-rag-server -- --config mini-rag.toml

use clap::Parser;
use mini_rag::{config::RagConfig, server::RagServer};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "mini-rag-server", version, about = "Document chunking, search and RAG answers over HTTP")]
struct Args {
    /// TOML config file (defaults to $MINI_RAG_CONFIG, then built-in defaults)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the listen port
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mini_rag=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    println!(
        r#"
╔═══════════════════════════════════════════════════════════╗
║                         Mini RAG                          ║
║        Chunk, embed, search and answer over files         ║
╚═══════════════════════════════════════════════════════════╝
"#
    );

    let mut config = RagConfig::load(args.config.as_deref())?;
    if let Some(port) = args.port {
        config.server.port = port;
    }

    tracing::info!("Configuration loaded");
    tracing::info!("  - Data directory: {}", config.storage.data_dir.display());
    tracing::info!(
        "  - Embeddings: {:?} ({} dimensions, batch {})",
        config.embeddings.backend,
        config.embeddings.dimensions,
        config.embeddings.batch_size
    );
    tracing::info!("  - Similarity metric: {:?}", config.vector_index.metric);
    tracing::info!(
        "  - Chunking: {} chars, {} overlap",
        config.chunking.chunk_size,
        config.chunking.chunk_overlap
    );
    tracing::info!("  - LLM: {:?} ({})", config.llm.provider, config.llm.model);

    let server = RagServer::new(config)?;

    println!("\nServer starting...");
    println!("  API: http://{}/api/v1/data", server.address());
    println!("  Health: http://{}/health", server.address());
    println!("\nPress Ctrl+C to stop\n");

    server.start().await?;

    Ok(())
}
