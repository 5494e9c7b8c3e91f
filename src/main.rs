//! Binary entry point for Verifyr.
//!
//! Verifyr answers questions about wearable-product documentation with
//! grounded, citation-bearing answers. This binary wraps the library crate
//! with two subcommands: `ingest` builds the offline chunks/lexical/vector
//! artifacts from a directory of source PDFs, and `serve` starts the HTTP
//! API over whatever artifacts are already on disk.

#![allow(clippy::print_stdout, clippy::print_stderr)]

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use verifyr_core::api;
use verifyr_core::chunking::chunk_pages;
use verifyr_core::config::AppConfig;
use verifyr_core::embedding::create_embedder;
use verifyr_core::extraction::{extract_product, load_sources_map};
use verifyr_core::generation::GenerationDispatcher;
use verifyr_core::generation::anthropic::AnthropicProvider;
use verifyr_core::model::Chunk;
use verifyr_core::orchestrator::Orchestrator;
use verifyr_core::retrieval::HybridRetriever;
use verifyr_core::search::LexicalIndex;
use verifyr_core::search::rrf::RrfConfig;
use verifyr_core::search::vector::{VectorIndex, VectorStoreLock};
use verifyr_core::storage::ConversationStore;

#[derive(Parser, Debug)]
#[command(name = "verifyr", version, about = "Grounded question-answering over wearable-product documentation")]
struct Cli {
    /// Path to the TOML config file. Falls back to `VERIFYR_CONFIG`, then `./verifyr.toml`.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Builds the chunks, lexical index, and vector index from a directory
    /// of per-product PDF folders.
    Ingest {
        /// Directory containing one subdirectory per product, each holding PDFs.
        input_dir: PathBuf,
    },
    /// Starts the HTTP API, serving queries against the artifacts in `data_dir`.
    Serve,
}

fn resolve_config_path(explicit: Option<PathBuf>) -> Option<PathBuf> {
    explicit.or_else(|| std::env::var_os("VERIFYR_CONFIG").map(PathBuf::from)).or_else(|| {
        let default = PathBuf::from("verifyr.toml");
        default.exists().then_some(default)
    })
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let config_path = resolve_config_path(cli.config);

    match run(config_path, cli.command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("verifyr: error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(config_path: Option<PathBuf>, command: Command) -> Result<()> {
    let config = AppConfig::load(config_path.as_deref()).context("loading configuration")?;

    match command {
        Command::Ingest { input_dir } => ingest(&config, &input_dir),
        Command::Serve => serve(config).await,
    }
}

/// Drives extraction → chunking → {embedding → vector index, lexical index}
/// over every product subdirectory of `input_dir`, then persists all three
/// artifacts under `config.data_dir`.
fn ingest(config: &AppConfig, input_dir: &std::path::Path) -> Result<()> {
    let sources_path = input_dir.join("sources.json");
    let sources = load_sources_map(&sources_path).context("loading sources map")?;

    let mut product_dirs: Vec<PathBuf> = std::fs::read_dir(input_dir)
        .with_context(|| format!("reading input directory {}", input_dir.display()))?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_dir())
        .collect();
    product_dirs.sort();

    if product_dirs.is_empty() {
        bail!("no product subdirectories found under {}", input_dir.display());
    }

    let mut all_pages = Vec::new();
    for product_dir in &product_dirs {
        let (pages, failures) = extract_product(product_dir, &sources)?;
        for (path, message) in &failures {
            eprintln!("verifyr: skipped {}: {message}", path.display());
        }
        println!("{}: extracted {} page(s)", product_dir.display(), pages.len());
        all_pages.extend(pages);
    }

    let chunks = chunk_pages(&all_pages, config.chunk_target_tokens, config.chunk_overlap_tokens);
    println!("chunked {} page(s) into {} chunk(s)", all_pages.len(), chunks.len());

    std::fs::create_dir_all(&config.data_dir).with_context(|| format!("creating data directory {}", config.data_dir.display()))?;
    let chunks_json = serde_json::to_string(&chunks).context("serializing chunks")?;
    std::fs::write(config.chunks_path(), chunks_json).context("writing chunks.json")?;

    let lexical = LexicalIndex::build(&chunks);
    lexical.save(&config.lexical_index_path()).context("saving lexical index")?;
    println!("lexical index: {} document(s)", lexical.len());

    build_vector_index(config, &chunks)?;

    Ok(())
}

fn build_vector_index(config: &AppConfig, chunks: &[Chunk]) -> Result<()> {
    let embedder = create_embedder().context("initializing embedder")?;
    if embedder.dimensions() != config.vector_dim {
        bail!("embedder produces {}-dimensional vectors but vector_dim is configured as {}", embedder.dimensions(), config.vector_dim);
    }

    let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
    let embeddings = embedder.embed_batch(&texts).context("embedding chunks")?;

    let vector_dir = config.vector_index_dir();
    let lock = VectorStoreLock::acquire(&vector_dir).context("acquiring vector store lock")?;
    let index = VectorIndex::build(chunks, &embeddings, embedder.name(), config.vector_dim)?;
    index.save(&vector_dir).context("saving vector index")?;
    drop(lock);

    println!("vector index: {} point(s), embedder '{}'", index.len(), embedder.name());
    Ok(())
}

/// Loads the offline artifacts, wires every collaborator, and serves the
/// HTTP API until terminated.
async fn serve(config: AppConfig) -> Result<()> {
    tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::new(config.log_filter.clone())).init();

    let config = Arc::new(config);

    let chunks_text = std::fs::read_to_string(config.chunks_path()).context("reading chunks.json; run `verifyr ingest` first")?;
    let chunks: Vec<Chunk> = serde_json::from_str(&chunks_text).context("parsing chunks.json")?;
    let chunk_map: std::collections::HashMap<String, Chunk> = chunks.into_iter().map(|c| (c.chunk_id.clone(), c)).collect();

    let lexical = Arc::new(LexicalIndex::load(&config.lexical_index_path()).context("loading lexical index; run `verifyr ingest` first")?);
    let vector = Arc::new(VectorIndex::load(&config.vector_index_dir(), &config.embedder_name, config.vector_dim).context("loading vector index; run `verifyr ingest` first")?);

    let embedder: Arc<dyn verifyr_core::embedding::Embedder> = Arc::from(create_embedder().context("initializing embedder")?);

    let retriever = Arc::new(HybridRetriever::new(
        lexical,
        vector,
        embedder,
        Arc::new(chunk_map),
        config.retrieve_k,
        RrfConfig::new(config.rrf_k),
        Duration::from_millis(config.retrieval_deadline_ms),
    ));

    let mut providers: Vec<Arc<dyn verifyr_core::generation::LlmProvider>> = Vec::new();
    match AnthropicProvider::from_env(vec!["claude-".to_string()]) {
        Ok(provider) => providers.push(Arc::new(provider)),
        Err(e) => tracing::warn!("anthropic provider unavailable: {e}"),
    }
    #[cfg(feature = "openai-provider")]
    {
        use verifyr_core::generation::openai::OpenAiProvider;
        match OpenAiProvider::from_env(vec!["gpt-".to_string(), "o1-".to_string(), "o3-".to_string()]) {
            Ok(provider) => providers.push(Arc::new(provider)),
            Err(e) => tracing::warn!("openai provider unavailable: {e}"),
        }
    }
    if providers.is_empty() {
        bail!("no generation provider is configured; set ANTHROPIC_API_KEY or OPENAI_API_KEY");
    }

    let dispatcher = Arc::new(GenerationDispatcher::new(providers, &config, Duration::from_secs(30)));
    let store = Arc::new(ConversationStore::open(&config.conversation_db_path).context("opening conversation store")?);
    let orchestrator = Arc::new(Orchestrator::new(Arc::clone(&config), retriever, dispatcher, store.clone()));

    let state = api::AppState::new(orchestrator, store, Arc::clone(&config));
    let router = api::create_router(state);

    api::start_server(router, &config.http_bind_addr).await.context("running HTTP server")?;
    Ok(())
}
