//! ragcore-demo -- loads configuration, opens a document store, indexes a
//! handful of sample documents, and prints the assembled query context for a
//! natural-language question against them.
//!
//! This binary is a demonstration harness, not a server: the retrieval core
//! is a library other services embed (spec §1's "HTTP/RPC transport" and the
//! NL2SQL layer that calls it are both out of scope here).

use std::path::PathBuf;

use tracing_subscriber::EnvFilter;

use ragcore::cache::EmbeddingCache;
use ragcore::config::Config;
use ragcore::context::ContextBuilder;
use ragcore::document::{Document, DocumentType};
use ragcore::embedding::provider::{EmbeddingProvider, FallbackProvider, HttpEmbeddingProvider};
use ragcore::embedding::EmbeddingService;
use ragcore::store::memory::InMemoryDocumentStore;
use ragcore::store::DocumentStore;

// ---------------------------------------------------------------------------
// CLI argument parsing (minimal, no clap dependency)
// ---------------------------------------------------------------------------

struct CliArgs {
    config_path: PathBuf,
    query: String,
    connection_id: String,
}

fn parse_args() -> CliArgs {
    let mut args = std::env::args().skip(1);
    let mut config_path = PathBuf::from("ragcore.toml");
    let mut query = "why is the orders query slow".to_string();
    let mut connection_id = "demo".to_string();

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" | "-c" => {
                if let Some(path) = args.next() {
                    config_path = PathBuf::from(path);
                } else {
                    eprintln!("Error: --config requires a path argument");
                    std::process::exit(1);
                }
            }
            "--query" | "-q" => {
                if let Some(q) = args.next() {
                    query = q;
                } else {
                    eprintln!("Error: --query requires a text argument");
                    std::process::exit(1);
                }
            }
            "--connection" => {
                if let Some(c) = args.next() {
                    connection_id = c;
                } else {
                    eprintln!("Error: --connection requires an id argument");
                    std::process::exit(1);
                }
            }
            "--help" | "-h" => {
                print_usage();
                std::process::exit(0);
            }
            "--version" | "-V" => {
                println!("ragcore-demo {}", env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            other => {
                eprintln!("Unknown argument: {other}");
                eprintln!("Run with --help for usage information.");
                std::process::exit(1);
            }
        }
    }

    CliArgs { config_path, query, connection_id }
}

fn print_usage() {
    println!(
        "\
ragcore-demo {version} -- retrieval core demo harness

USAGE:
    ragcore-demo [OPTIONS]

OPTIONS:
    -c, --config <PATH>       Path to configuration file [default: ragcore.toml]
    -q, --query <TEXT>        Natural-language question to build context for
        --connection <ID>     Connection id to scope the search to [default: demo]
    -h, --help                Print this help message
    -V, --version             Print version information

ENVIRONMENT:
    RUST_LOG                  Override log level (e.g. RUST_LOG=debug)
    RAGCORE_CONFIG            Alternative to --config flag
",
        version = env!("CARGO_PKG_VERSION")
    );
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = parse_args();

    let config_path = std::env::var("RAGCORE_CONFIG").map(PathBuf::from).unwrap_or(cli.config_path);

    let config = Config::load(&config_path)?;
    init_tracing(&config);

    tracing::info!(version = env!("CARGO_PKG_VERSION"), config = %config_path.display(), "starting ragcore-demo");

    // The demo runs against the in-process, in-memory store so it needs no
    // running SurrealDB instance; the embedding provider still talks to the
    // configured HTTP endpoint.
    let store = InMemoryDocumentStore::new();
    store.initialize().await?;

    let cache = EmbeddingCache::new(config.embedding.cache_max_size, config.embedding.cache_ttl_secs);
    let provider = build_embedding_provider(&config);
    let embeddings = EmbeddingService::new(provider, cache);

    seed_sample_documents(&store, &embeddings).await?;

    let builder = ContextBuilder::new(&store, &embeddings);
    let context = builder.build_context(&cli.query, &cli.connection_id).await?;

    println!("{}", serde_json::to_string_pretty(&context)?);

    Ok(())
}

fn build_embedding_provider(config: &Config) -> Box<dyn EmbeddingProvider> {
    let primary = HttpEmbeddingProvider::new(
        config.embedding.endpoint.clone(),
        config.embedding.model.clone(),
        config.embedding.dimension,
        config.embedding.api_key.clone(),
    );

    match &config.embedding.fallback_endpoint {
        Some(fallback_endpoint) => {
            let fallback = HttpEmbeddingProvider::new(
                fallback_endpoint.clone(),
                config.embedding.model.clone(),
                config.embedding.dimension,
                config.embedding.api_key.clone(),
            );
            Box::new(FallbackProvider::new(Box::new(primary), Box::new(fallback)))
        }
        None => Box::new(primary),
    }
}

async fn seed_sample_documents(store: &InMemoryDocumentStore, embeddings: &EmbeddingService) -> anyhow::Result<()> {
    let mut docs = vec![
        Document::new("demo", DocumentType::Schema, "table: orders\ncolumn: id integer primary key"),
        Document::new("demo", DocumentType::Schema, "table: orders\ncolumn: total decimal(10,2)"),
        Document::new("demo", DocumentType::Query, "select * from orders where status = 'pending'"),
        Document::new("demo", DocumentType::Business, "orders older than 30 days are archived"),
        Document::new("demo", DocumentType::Performance, "add an index on orders.status for faster filtering"),
    ];
    for doc in &mut docs {
        embeddings.embed_document(doc).await?;
    }
    store.batch_index(docs).await?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Tracing initialization
// ---------------------------------------------------------------------------

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = &config.logging.level;
        EnvFilter::new(format!("ragcore={level},warn"))
    });

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    if config.logging.json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_print_usage_does_not_panic() {
        print_usage();
    }
}
