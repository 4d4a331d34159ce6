//! Evaluation CLI: score the RAG pipeline on a test dataset with an LLM judge.
//!
//! Usage:
//!   eval --test-file <path>        # Evaluate every case in the dataset
//!
//! Options:
//!   --output-dir <dir>             # Checkpoints and reports (default: evaluation_results)
//!   --model <name>                 # Judge model
//!   --judge <local|hosted>         # Judge backend
//!   --no-intermediate              # Skip per-case checkpoint files
//!   --resume                       # Reuse checkpoints from an earlier run
//!   --data-dir <dir>               # Page image directory
//!   --overwrite                    # Rebuild the index before evaluating
//!   --verbose                      # Debug logging

use anyhow::{Context, Result};
use clap::Parser;
use colpali_rag::config::{Config, JudgeBackend};
use colpali_rag::eval::{Evaluator, ReportGenerator, TestDataset};
use colpali_rag::service::DefaultRagService;
use std::io::Write;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "eval")]
#[command(about = "Evaluate the ColPali RAG pipeline using an LLM judge", long_about = None)]
struct Cli {
    /// Path to the test dataset JSON file
    #[arg(short, long)]
    test_file: PathBuf,

    /// Output directory for checkpoints and reports
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Judge model (overrides the config file)
    #[arg(short, long)]
    model: Option<String>,

    /// Judge backend: local or hosted
    #[arg(long, value_parser = parse_backend)]
    judge: Option<JudgeBackend>,

    /// Don't write per-case checkpoint files
    #[arg(long)]
    no_intermediate: bool,

    /// Reuse checkpoints left by an interrupted run
    #[arg(long)]
    resume: bool,

    /// Page image directory (overrides the config file)
    #[arg(short, long)]
    data_dir: Option<PathBuf>,

    /// Rebuild the index before evaluating
    #[arg(long)]
    overwrite: bool,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,
}

fn parse_backend(s: &str) -> std::result::Result<JudgeBackend, String> {
    JudgeBackend::parse(s).ok_or_else(|| format!("unknown judge backend '{s}' (local, hosted)"))
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut config = Config::load().context("Failed to load configuration")?;
    if let Some(dir) = cli.data_dir {
        config.storage.data_dir = dir;
    }

    let mut eval_config = config.evaluation.clone();
    if let Some(dir) = cli.output_dir {
        eval_config.output_dir = dir;
    }
    if let Some(model) = cli.model {
        eval_config.judge.model_name = model;
    }
    if let Some(backend) = cli.judge {
        eval_config.judge.backend = backend;
    }
    if cli.no_intermediate {
        eval_config.save_intermediate = false;
    }
    if cli.resume {
        eval_config.resume = true;
    }
    config.validate().context("Invalid configuration")?;

    println!("Loading test dataset from {}...", cli.test_file.display());
    let dataset = TestDataset::from_json(&cli.test_file).context("Failed to load test dataset")?;
    println!(
        "Loaded {} test cases from '{}' ({} with page ground truth)",
        dataset.len(),
        dataset.dataset_name,
        dataset.cases_with_ground_truth()
    );

    println!("Initializing RAG service...");
    let mut service = DefaultRagService::from_config(&config)
        .await
        .context("Failed to connect to backends")?;

    if !service.is_indexed() || cli.overwrite {
        println!("Indexing documents from {}...", config.storage.data_dir.display());
        let pages = service
            .index_documents(cli.overwrite)
            .await
            .context("Failed to index documents")?;
        println!("Indexed {} pages", pages);
    }

    let judge_model = eval_config.judge.model_name.clone();
    let output_dir = eval_config.output_dir.clone();
    let mut evaluator = Evaluator::new(&service, eval_config).context("Failed to create judge")?;

    println!("\nStarting evaluation with {} as judge...", judge_model);
    println!("{}", "-".repeat(50));

    let report = evaluator
        .evaluate_dataset_with_progress(&dataset, |current, total| {
            let pct = current as f64 / total as f64 * 100.0;
            print!("Progress: {}/{} ({:.1}%)\r", current, total, pct);
            let _ = std::io::stdout().flush();
        })
        .await
        .context("Evaluation failed")?;

    println!("\n");
    println!("Generating reports...");
    ReportGenerator::new(&report)
        .save_all(&output_dir)
        .context("Failed to write reports")?;

    println!("\n{}", "=".repeat(50));
    println!("EVALUATION SUMMARY");
    println!("{}", "=".repeat(50));
    println!("Dataset: {}", report.dataset_name);
    println!("Test Cases: {}", report.total_test_cases);
    println!("Judge Model: {}", judge_model);

    println!("\nGeneration Metrics:");
    for (metric, value) in &report.aggregate_generation_metrics {
        println!("  {}: {:.4}", metric, value);
    }

    if !report.aggregate_retrieval_metrics.is_empty() {
        println!("\nRetrieval Metrics:");
        for (metric, value) in &report.aggregate_retrieval_metrics {
            println!("  {}: {:.4}", metric, value);
        }
    }

    println!("\nAverage Latency: {:.1} ms", report.average_latency_ms());

    println!("\nReports saved to {}/", output_dir.display());
    println!("  - report.json (full results)");
    println!("  - report.md (readable summary)");
    println!("  - metrics.csv (spreadsheet format)");

    Ok(())
}
