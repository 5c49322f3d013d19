use anyhow::Context;
use clap::Parser;
use pdf_chat_core::{
    FileStorage, HttpChatModel, HttpEmbedder, LopdfExtractor, MetaDb, Pipeline, QdrantStore,
    VectorIndex,
};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod error;
mod routes;
mod state;

use state::AppState;

#[derive(Parser)]
#[command(name = "pdf-chat-server", version)]
struct Cli {
    /// Address to listen on
    #[arg(long, env = "PDF_CHAT_BIND", default_value = "0.0.0.0:8000")]
    bind: String,

    /// Directory holding uploads, extracted text, and the metadata db
    #[arg(long, env = "PDF_CHAT_DATA_DIR", default_value = "data")]
    data_dir: PathBuf,

    /// Qdrant base URL
    #[arg(long, env = "QDRANT_URL", default_value = "http://localhost:6333")]
    qdrant_url: String,

    /// Qdrant collection
    #[arg(long, env = "QDRANT_COLLECTION", default_value = "pdf_chunks")]
    qdrant_collection: String,

    /// Base URL of the OpenAI-compatible embedding endpoint
    #[arg(long, env = "EMBEDDING_URL", default_value = "http://localhost:11434")]
    embedding_url: String,

    /// Embedding model name
    #[arg(long, env = "EMBEDDING_MODEL", default_value = "nomic-embed-text")]
    embedding_model: String,

    /// API key for the embedding endpoint
    #[arg(long, env = "EMBEDDING_API_KEY")]
    embedding_api_key: Option<String>,

    /// Dimension of the embedding space
    #[arg(long, env = "EMBEDDING_DIMENSIONS", default_value = "768")]
    embedding_dimensions: usize,

    /// Base URL of the OpenAI-compatible chat endpoint
    #[arg(long, env = "CHAT_URL", default_value = "http://localhost:11434")]
    chat_url: String,

    /// Chat model name
    #[arg(long, env = "CHAT_MODEL", default_value = "llama3.1")]
    chat_model: String,

    /// API key for the chat endpoint
    #[arg(long, env = "CHAT_API_KEY")]
    chat_api_key: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();

    let meta = MetaDb::connect(&cli.data_dir.join("files.db"))
        .await
        .context("opening metadata database")?;
    meta.init_schema().await.context("initializing schema")?;

    let storage = FileStorage::new(&cli.data_dir)
        .await
        .context("preparing data directories")?;

    let embedder = HttpEmbedder::new(
        &cli.embedding_url,
        &cli.embedding_model,
        cli.embedding_api_key.clone(),
        cli.embedding_dimensions,
    )
    .context("configuring embedding client")?;

    let chat = HttpChatModel::new(&cli.chat_url, &cli.chat_model, cli.chat_api_key.clone())
        .context("configuring chat client")?;

    let index = QdrantStore::new(
        &cli.qdrant_url,
        &cli.qdrant_collection,
        cli.embedding_dimensions,
    );
    index
        .ensure_collection(cli.embedding_dimensions)
        .await
        .map_err(|error| anyhow::anyhow!(error.to_string()))
        .context("preparing qdrant collection")?;

    let pipeline = Pipeline::new(LopdfExtractor, embedder, index, chat, meta, storage);
    let state = AppState::new(pipeline);

    let listener = tokio::net::TcpListener::bind(&cli.bind)
        .await
        .with_context(|| format!("binding {}", cli.bind))?;

    info!(
        bind = %cli.bind,
        qdrant = %cli.qdrant_url,
        collection = %cli.qdrant_collection,
        embedding_model = %cli.embedding_model,
        chat_model = %cli.chat_model,
        "pdf-chat-server boot"
    );

    axum::serve(listener, routes::router(state))
        .await
        .context("server error")?;

    Ok(())
}
