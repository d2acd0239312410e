use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use shortlist_core::{
    ingest_folder_best_effort, store_documents, CharacterNgramEmbedder, Document, Embedder,
    FileDocumentStore, FileIndexStore, HttpCrossEncoder, HttpEmbedder, LlmEndpointConfig,
    LlmProfileExtractor, MatchCoordinator, MatchRequest, MatchResult, PairScorer,
    ProfileExtractor, QdrantIndexStore, SynonymTable, TokenOverlapScorer, VectorIndex,
    VocabularyExtractor,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "shortlist", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Directory holding the document and index files.
    #[arg(long, env = "SHORTLIST_DATA_DIR", default_value = "./data")]
    data_dir: PathBuf,

    /// Embedding service base URL. The local n-gram embedder is used when unset.
    #[arg(long, env = "SHORTLIST_EMBEDDING_URL")]
    embedding_url: Option<String>,

    /// Output dimension of the embedding service.
    #[arg(long, default_value_t = 384)]
    embedding_dimensions: usize,

    /// Cross-encoder rerank service base URL. Token overlap scoring is used when unset.
    #[arg(long, env = "SHORTLIST_RERANK_URL")]
    rerank_url: Option<String>,

    /// OpenAI-compatible base URL for profile extraction. Vocabulary matching is used when unset.
    #[arg(long, env = "SHORTLIST_LLM_URL")]
    llm_url: Option<String>,

    #[arg(long, env = "SHORTLIST_LLM_API_KEY", hide_env_values = true)]
    llm_api_key: Option<String>,

    #[arg(long, env = "SHORTLIST_LLM_MODEL", default_value = "gpt-4o-mini")]
    llm_model: String,

    /// Qdrant base URL. The file index under the data directory is used when unset.
    #[arg(long, env = "SHORTLIST_QDRANT_URL")]
    qdrant_url: Option<String>,

    /// Prefix for per-scope Qdrant collections.
    #[arg(long, default_value = "shortlist")]
    qdrant_prefix: String,

    /// JSON synonym table replacing the built-in one.
    #[arg(long, env = "SHORTLIST_SYNONYMS")]
    synonyms: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Ingest .txt/.md CVs from a folder into a scope.
    Ingest {
        #[arg(long)]
        scope: String,
        /// Folder searched recursively.
        #[arg(long)]
        folder: PathBuf,
    },
    /// Rank the CVs of a scope against a requirement text.
    Match {
        #[arg(long)]
        scope: String,
        /// Requirement text (job description or skill list).
        #[arg(long)]
        query: String,
        /// Print the full result as JSON.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Remove every document and index entry of a scope.
    Delete {
        #[arg(long)]
        scope: String,
    },
    /// List the stored documents of a scope with their extracted skills.
    List {
        #[arg(long)]
        scope: String,
    },
    /// Report how many documents a scope holds.
    Count {
        #[arg(long)]
        scope: String,
    },
}

fn load_synonyms(cli: &Cli) -> anyhow::Result<Arc<SynonymTable>> {
    match &cli.synonyms {
        Some(path) => {
            let table = SynonymTable::from_json_file(path)
                .with_context(|| format!("failed to load synonym table {}", path.display()))?;
            info!(version = table.version(), concepts = table.len(), "synonym table loaded");
            Ok(Arc::new(table))
        }
        None => Ok(Arc::new(SynonymTable::builtin().clone())),
    }
}

fn build_embedder(cli: &Cli) -> anyhow::Result<Arc<dyn Embedder>> {
    match &cli.embedding_url {
        Some(url) => Ok(Arc::new(HttpEmbedder::new(url, cli.embedding_dimensions)?)),
        None => Ok(Arc::new(CharacterNgramEmbedder::default())),
    }
}

fn build_index(cli: &Cli, embedder: Arc<dyn Embedder>) -> Box<dyn VectorIndex> {
    match &cli.qdrant_url {
        Some(url) => Box::new(QdrantIndexStore::new(url, &cli.qdrant_prefix, embedder)),
        None => Box::new(FileIndexStore::new(cli.data_dir.join("index"), embedder)),
    }
}

fn build_scorer(cli: &Cli) -> anyhow::Result<Box<dyn PairScorer>> {
    match &cli.rerank_url {
        Some(url) => Ok(Box::new(HttpCrossEncoder::new(url)?)),
        None => Ok(Box::new(TokenOverlapScorer)),
    }
}

fn build_extractor(cli: &Cli, synonyms: Arc<SynonymTable>) -> Box<dyn ProfileExtractor> {
    match &cli.llm_url {
        Some(url) => Box::new(LlmProfileExtractor::new(LlmEndpointConfig {
            endpoint: url.clone(),
            api_key: cli.llm_api_key.clone(),
            model: cli.llm_model.clone(),
        })),
        None => Box::new(VocabularyExtractor::new(synonyms)),
    }
}

fn describe_document(document: &Document) -> String {
    let skills = if document.skills.is_empty() {
        "-".to_string()
    } else {
        document.skills.join(", ")
    };
    format!(
        "{} file={} added_at={} skills: {}",
        document.display_name(),
        document.filename,
        document.added_at.to_rfc3339(),
        skills
    )
}

fn print_result(result: &MatchResult) {
    println!(
        "request: {} scanned={} match_found={}",
        result.request_id, result.total_scanned, result.match_found
    );

    for (rank, candidate) in result.top_candidates.iter().enumerate() {
        let marker = if candidate.promoted { " (closest available)" } else { "" };
        println!(
            "{}. {} [{}] final={:.4} embedding={:.4} reranker={:.4} skill={:.4}{marker}",
            rank + 1,
            candidate.candidate_name,
            candidate.tier,
            candidate.final_score,
            candidate.embedding_score,
            candidate.reranker_score,
            candidate.skill_score,
        );
        println!("   file={}", candidate.filename);
        if !candidate.matched_signals.is_empty() {
            println!("   matched: {}", candidate.matched_signals.join(", "));
        }
        if !candidate.missing_signals.is_empty() {
            println!("   missing: {}", candidate.missing_signals.join(", "));
        }
    }

    if let Some(explanation) = &result.explanation {
        println!("explanation: {explanation}");
    }

    for near_miss in &result.near_misses {
        println!(
            "near miss: {} final={:.4} skill={:.4} domain={}",
            near_miss.candidate_name, near_miss.final_score, near_miss.skill_score, near_miss.domain
        );
        println!("   {}", near_miss.suggestion);
    }

    for suggestion in &result.suggestions {
        println!("suggestion: {suggestion}");
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let app_version = env!("CARGO_PKG_VERSION");

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();
    info!(
        version = app_version,
        started_at = %Utc::now().to_rfc3339(),
        "shortlist boot"
    );

    let synonyms = load_synonyms(&cli)?;
    let documents = FileDocumentStore::new(cli.data_dir.join("documents"));
    let index = build_index(&cli, build_embedder(&cli)?);

    match &cli.command {
        Command::Ingest { scope, folder } => {
            let report = ingest_folder_best_effort(folder, scope)?;
            for skipped in &report.skipped_files {
                warn!(path = %skipped.path.display(), reason = %skipped.reason, "skipped file");
            }

            let extractor = build_extractor(&cli, synonyms);
            let added = store_documents(report.documents, &extractor, &index, &documents)
                .await
                .with_context(|| format!("failed to ingest {}", folder.display()))?;

            info!(scope = %scope, added, skipped = report.skipped_files.len(), "ingestion finished");
            println!(
                "{added} document(s) ingested into scope '{scope}' at {}",
                Utc::now().to_rfc3339()
            );
        }
        Command::Match { scope, query, json } => {
            let coordinator = MatchCoordinator::new(
                documents,
                index,
                build_scorer(&cli)?,
                build_extractor(&cli, synonyms.clone()),
            )
            .with_synonyms(synonyms);

            let result = coordinator
                .run(&MatchRequest::new(query.as_str(), scope.as_str()))
                .await?;

            if *json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                print_result(&result);
            }
        }
        Command::Delete { scope } => {
            index.delete(scope).await?;
            documents.delete_scope(scope).await?;
            println!("scope '{scope}' deleted");
        }
        Command::List { scope } => {
            let stored = documents.list(scope).await?;
            if stored.is_empty() {
                println!("scope '{scope}' holds no documents");
            }
            for document in &stored {
                println!("{}", describe_document(document));
            }
        }
        Command::Count { scope } => {
            let stored = documents.list(scope).await?.len();
            let indexed = index.len(scope).await?;
            println!("scope '{scope}': {stored} document(s), {indexed} indexed");
        }
    }

    Ok(())
}
