//! ColPali RAG CLI
//!
//! Index page images and ask questions about them.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colpali_rag::{
    config::Config,
    corpus::DocumentSource,
    eval::{GenerationEvalResult, Judge, build_judge},
    pages::PageRef,
    retrieval::Retriever,
    service::{DefaultRagService, QueryOptions},
};
use std::path::PathBuf;
use std::time::Instant;
use tracing_subscriber::EnvFilter;

/// ColPali RAG - question answering over document page images
#[derive(Parser)]
#[command(name = "colpali-rag")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Directory holding the page images (overrides the config file)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Embed every page of the corpus into the vector store
    Index {
        /// Rebuild the index even if it already holds pages
        #[arg(long)]
        overwrite: bool,

        /// Copy these files or page directories into the data directory first
        #[arg(long = "add", value_name = "PATH")]
        add: Vec<PathBuf>,
    },

    /// Ask a question about the indexed pages
    Query {
        /// The question
        question: String,

        /// Number of pages to retrieve
        #[arg(short = 'k', long)]
        top_k: Option<usize>,

        /// Neighbouring pages to add before each hit
        #[arg(long)]
        before: Option<u32>,

        /// Neighbouring pages to add after each hit
        #[arg(long)]
        after: Option<u32>,

        /// Output token limit for the answer
        #[arg(long)]
        max_tokens: Option<u32>,
    },

    /// Show configuration, corpus and index status
    Info,

    /// Send one scripted answer to the configured judge
    CheckJudge,
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn load_config(data_dir: Option<PathBuf>) -> Result<Config> {
    let mut config = Config::load().context("Failed to load configuration")?;
    if let Some(dir) = data_dir {
        config.storage.data_dir = dir;
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let config = load_config(cli.data_dir)?;

    match cli.command {
        Commands::Index { overwrite, add } => cmd_index(config, overwrite, add).await,
        Commands::Query {
            question,
            top_k,
            before,
            after,
            max_tokens,
        } => {
            let options = QueryOptions {
                top_k,
                max_new_tokens: max_tokens,
                pages_before: before,
                pages_after: after,
            };
            cmd_query(config, question, options).await
        }
        Commands::Info => cmd_info(config).await,
        Commands::CheckJudge => cmd_check_judge(config).await,
    }
}

async fn cmd_index(config: Config, overwrite: bool, add: Vec<PathBuf>) -> Result<()> {
    let mut service = DefaultRagService::from_config(&config)
        .await
        .context("Failed to connect to backends")?;

    for path in add {
        let dest = service
            .corpus()
            .add_document(DocumentSource::Path(path.clone()))
            .with_context(|| format!("Failed to add '{}'", path.display()))?;
        println!("Added: {}", dest.display());
    }

    println!("Indexing: {}", config.storage.data_dir.display());
    let start = Instant::now();

    let pages = service
        .index_documents(overwrite)
        .await
        .context("Indexing failed")?;

    if pages == 0 && service.corpus().is_empty() {
        println!("No supported files found.");
    } else if pages == 0 {
        println!("Index already populated. Use --overwrite to rebuild.");
    } else {
        println!("\nIndex Built:");
        println!("  Documents:   {}", service.corpus().document_count());
        println!("  Pages:       {}", pages);
        println!("  Build time:  {:.2?}", start.elapsed());
    }

    Ok(())
}

async fn cmd_query(config: Config, question: String, options: QueryOptions) -> Result<()> {
    config.validate().context("Invalid configuration")?;

    let service = DefaultRagService::from_config(&config)
        .await
        .context("Failed to connect to backends")?;

    println!("Question: \"{}\"", question);
    println!("Using model: {}", config.llm.model);
    println!();

    let start = Instant::now();
    let details = service
        .query_with_details_opts(&question, options)
        .await
        .context("Query failed")?;

    println!("{}", details.answer);
    println!();
    println!("{}", "─".repeat(60));
    let list = |pages: &[PageRef]| {
        pages
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ")
    };
    println!("Retrieved: {}", list(&details.retrieved_pages));
    println!("Context:   {}", list(&details.expanded_pages));
    println!("Answered in {:.2?}", start.elapsed());

    Ok(())
}

async fn cmd_info(config: Config) -> Result<()> {
    println!("Configuration");
    println!("{}", "─".repeat(40));
    println!("  Vision model:  {} @ {}", config.llm.model, config.llm.api_base);
    println!("  Embedder:      {}", config.embedder.base_url);
    println!(
        "  Vector store:  {} ({})",
        config.qdrant.url, config.qdrant.collection_name
    );
    println!(
        "  Retrieval:     top_k={} before={} after={}",
        config.rag.default_top_k, config.rag.pages_before, config.rag.pages_after
    );
    println!(
        "  Judge:         {} ({})",
        config.evaluation.judge.model_name,
        config.evaluation.judge.backend.as_str()
    );
    if let Some(path) = Config::config_file_path() {
        println!("  Config file:   {}", path.display());
    }
    println!();

    let service = DefaultRagService::from_config(&config)
        .await
        .context("Failed to connect to backends")?;
    let points = service.retriever().store().point_count().await?;

    println!("Corpus");
    println!("{}", "─".repeat(40));
    println!("  Data dir:      {}", config.storage.data_dir.display());
    println!("  Documents:     {}", service.corpus().document_count());
    println!("  Pages:         {}", service.corpus().total_pages());
    println!("  Indexed pages: {}", points);
    println!("  Ready:         {}", service.retriever().is_indexed());

    Ok(())
}

async fn cmd_check_judge(config: Config) -> Result<()> {
    let judge_config = &config.evaluation.judge;
    println!(
        "Checking judge: {} ({})\n",
        judge_config.model_name,
        judge_config.backend.as_str()
    );

    let judge = build_judge(judge_config).context("Failed to create judge")?;
    let start = Instant::now();

    let result = run_judge_check(judge.as_ref()).await?;

    println!("Judge responded in {:.2?}", start.elapsed());
    println!("  Overall score: {}", result.overall_score);
    println!("  Reasoning:     {}", result.reasoning);

    Ok(())
}

/// Score one fixed answer; any backend failure is an error.
async fn run_judge_check(judge: &dyn Judge) -> Result<GenerationEvalResult> {
    judge
        .evaluate_generation(
            "What is the boiling point of water at sea level?",
            "100 degrees Celsius.",
            "Water boils at 100 °C at sea level.",
        )
        .await
        .context("Judge check failed")
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use colpali_rag::RagError;

    struct FixedJudge(std::result::Result<f64, String>);

    #[async_trait]
    impl Judge for FixedJudge {
        async fn evaluate_generation(
            &self,
            _question: &str,
            _expected_answer: &str,
            _generated_answer: &str,
        ) -> colpali_rag::Result<GenerationEvalResult> {
            match &self.0 {
                Ok(score) => Ok(GenerationEvalResult {
                    correctness: *score,
                    completeness: *score,
                    relevance: *score,
                    coherence: *score,
                    overall_score: *score,
                    reasoning: "ok".to_string(),
                    faithfulness_score: None,
                    unsupported_claims: None,
                }),
                Err(msg) => Err(RagError::LlmApi(msg.clone())),
            }
        }

        fn model_name(&self) -> &str {
            "fixed"
        }
    }

    #[tokio::test]
    async fn test_judge_check_fails_on_backend_error() {
        let judge = FixedJudge(Err("connection refused".to_string()));
        let err = run_judge_check(&judge).await.unwrap_err();
        assert_eq!(err.to_string(), "Judge check failed");
        assert!(format!("{:#}", err).contains("connection refused"));
    }

    #[tokio::test]
    async fn test_judge_check_returns_verdict() {
        let judge = FixedJudge(Ok(5.0));
        let result = run_judge_check(&judge).await.unwrap();
        assert_eq!(result.overall_score, 5.0);
    }
}
