use anyhow::{bail, Context};
use chrono::Utc;
use clap::{Parser, Subcommand};
use excerpt_search_core::{
    is_pdf_path, CharacterNgramEmbedder, DocumentService, EmbeddingProvider, IngestionOptions,
    LopdfExtractor, OpenAiEmbeddingProvider, ProviderConfig, QueryResponse, SearchOptions,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const MAX_UPLOAD_BYTES: u64 = 50 * 1024 * 1024;

#[derive(Parser)]
#[command(name = "excerpt-search", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// OpenAI-compatible embeddings endpoint [env: EMBEDDING_ENDPOINT]
    #[arg(long)]
    embedding_endpoint: Option<String>,

    /// Embedding model name [env: EMBEDDING_MODEL]
    #[arg(long)]
    embedding_model: Option<String>,

    /// API key for the embeddings endpoint [env: EMBEDDING_API_KEY, OPENAI_API_KEY]
    #[arg(long)]
    embedding_api_key: Option<String>,

    /// Use the local character n-gram embedder instead of the remote endpoint.
    #[arg(long, default_value_t = false)]
    offline: bool,

    /// Upper bound in seconds for text extraction and each embedding call.
    #[arg(long, default_value = "60")]
    timeout_secs: u64,

    /// Print results as JSON.
    #[arg(long, default_value_t = false)]
    json: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Ingest one PDF and run one or more queries against it.
    Search {
        /// PDF file to upload.
        #[arg(long)]
        file: PathBuf,
        /// Query text; repeat for several queries.
        #[arg(long, required = true)]
        query: Vec<String>,
        /// Number of excerpts to return per query (default 5).
        #[arg(long)]
        top_k: Option<usize>,
    },
    /// Ingest every PDF in a folder, list them, and optionally query each one.
    Ingest {
        /// Folder that contains PDFs recursively.
        #[arg(long)]
        folder: PathBuf,
        /// Query to run against every ingested document.
        #[arg(long)]
        query: Option<String>,
        /// Number of excerpts to return per document (default 5).
        #[arg(long)]
        top_k: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let app_version = env!("CARGO_PKG_VERSION");

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();
    let timeout = Duration::from_secs(cli.timeout_secs.max(1));

    let provider = build_provider(&cli, timeout)?;
    info!(
        version = app_version,
        provider = provider.name(),
        started_at = %Utc::now().to_rfc3339(),
        "excerpt-search boot"
    );

    let service = DocumentService::new(
        provider,
        Arc::new(LopdfExtractor),
        IngestionOptions {
            parse_timeout: timeout,
            ..IngestionOptions::default()
        },
        SearchOptions {
            provider_timeout: timeout,
            ..SearchOptions::default()
        },
    );

    match cli.command {
        Command::Search { file, query, top_k } => {
            let bytes = read_upload(&file).await?;
            let name = file
                .file_name()
                .and_then(|name| name.to_str())
                .unwrap_or("upload.pdf")
                .to_string();

            let summary = service.ingest(bytes, &name).await?;
            info!(
                document_id = %summary.id,
                pages = summary.total_pages,
                chunks = summary.chunk_count,
                "document ready"
            );

            for text in query {
                let response = service.query(&summary.id, &text, top_k).await?;
                print_response(&response, cli.json)?;
            }
        }
        Command::Ingest {
            folder,
            query,
            top_k,
        } => {
            let report = service.ingest_folder(&folder).await?;

            if !report.skipped_files.is_empty() {
                warn!(
                    skipped = report.skipped_files.len(),
                    folder = %folder.display(),
                    "skipped pdfs"
                );
            }

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&service.list_documents())?);
            } else {
                for summary in service.list_documents() {
                    println!(
                        "{} name={} pages={} chunks={} created_at={}",
                        summary.id,
                        summary.name,
                        summary.total_pages,
                        summary.chunk_count,
                        summary.created_at.to_rfc3339()
                    );
                }
                for skipped in &report.skipped_files {
                    println!("skipped {}: {}", skipped.path.display(), skipped.reason);
                }
            }

            if let Some(text) = query {
                for summary in service.list_documents() {
                    let response = service.query(&summary.id, &text, top_k).await?;
                    print_response(&response, cli.json)?;
                }
            }
        }
    }

    Ok(())
}

fn build_provider(cli: &Cli, timeout: Duration) -> anyhow::Result<Box<dyn EmbeddingProvider>> {
    if cli.offline {
        return Ok(Box::new(CharacterNgramEmbedder::default()));
    }

    let from_env = ProviderConfig::from_env(timeout)?;
    let config = ProviderConfig::new(
        cli.embedding_endpoint
            .as_deref()
            .unwrap_or(from_env.endpoint.as_str()),
        cli.embedding_api_key.clone().or(from_env.api_key),
        cli.embedding_model.clone().unwrap_or(from_env.model),
        timeout,
    )?;
    if config.api_key.is_none() {
        warn!(endpoint = %config.endpoint, "no embedding API key configured");
    }

    Ok(Box::new(OpenAiEmbeddingProvider::new(config)?))
}

async fn read_upload(path: &Path) -> anyhow::Result<Vec<u8>> {
    if !is_pdf_path(path) {
        bail!("only PDF files are supported: {}", path.display());
    }

    let metadata = tokio::fs::metadata(path)
        .await
        .with_context(|| format!("unable to read {}", path.display()))?;
    if metadata.len() > MAX_UPLOAD_BYTES {
        bail!(
            "{} is {} bytes; uploads must be at most 50MB",
            path.display(),
            metadata.len()
        );
    }

    tokio::fs::read(path)
        .await
        .with_context(|| format!("unable to read {}", path.display()))
}

fn print_response(response: &QueryResponse, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(response)?);
        return Ok(());
    }

    println!(
        "query: {} document={} ({}ms)",
        response.query, response.document_name, response.elapsed_ms
    );
    if response.results.is_empty() {
        println!("  no matching excerpts");
    }
    for result in &response.results {
        println!(
            "[page {}] score={:.4} match={:?}",
            result.page_number, result.score, result.matched_by
        );
        println!("  excerpt:\n{}", result.text);
        if result.context != result.text {
            println!("  context:\n{}", result.context);
        }
    }

    Ok(())
}
