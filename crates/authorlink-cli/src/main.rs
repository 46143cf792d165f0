//! Authorlink CLI - Command-line interface
//!
//! Usage:
//!   authorlink run [--mode hybrid] [--policy strict] [--limit N]
//!   authorlink inspect <mention_id>
//!   authorlink evaluate [--predictions <path>] [--ground-truth <path>]

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use async_trait::async_trait;
use authorlink_core::{
    load_mentions, AppConfig, Corpus, DecisionOracle, DecisionRequest, EmptyFilterPolicy,
    GradingRequest, LinkError, LlmClient, OracleDecision, StrategyMode,
};
use authorlink_decider::{create_llm_client, LlmOracle};
use authorlink_extractor::{Evaluator, GroundTruth, ProfileBuilder, ProfileCache};
use authorlink_pipeline::{ResultAggregate, TaskOrchestrator};
use authorlink_vector::{create_embedding_client, EmbeddingClient, EmbeddingSimilarity};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "authorlink")]
#[command(about = "Link ambiguous paper authors to known scholars")]
#[command(version)]
struct Cli {
    /// TOML configuration file
    #[arg(long, global = true, env = "AUTHORLINK_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve every mention not yet in the task log
    Run {
        /// Decision mode: single, two-stage or hybrid
        #[arg(long)]
        mode: Option<StrategyMode>,
        /// Empty coarse filter policy: strict or fallback
        #[arg(long)]
        policy: Option<EmptyFilterPolicy>,
        /// Stop after this many pending mentions
        #[arg(long)]
        limit: Option<usize>,
        /// Simultaneous oracle calls
        #[arg(long)]
        concurrency: Option<usize>,
        /// Mentions per checkpointed batch
        #[arg(long)]
        batch_size: Option<usize>,
    },
    /// Print the decision input for one mention without calling the oracle
    Inspect {
        /// Mention ID (`<paper_id>-<author_index>`)
        mention_id: String,
    },
    /// Score a result aggregate against ground truth
    Evaluate {
        /// Result aggregate snapshot (defaults to the configured output)
        #[arg(long)]
        predictions: Option<PathBuf>,
        /// Ground truth file (defaults to the configured data path)
        #[arg(long)]
        ground_truth: Option<PathBuf>,
        /// Mentions in the full task list, used as the recall denominator
        #[arg(long)]
        total: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut config = load_config(cli.config.as_ref())?;

    match cli.command {
        Commands::Run {
            mode,
            policy,
            limit,
            concurrency,
            batch_size,
        } => {
            if let Some(mode) = mode {
                config.decision.mode = mode;
            }
            if let Some(policy) = policy {
                config.decision.empty_filter_policy = policy;
            }
            if let Some(concurrency) = concurrency {
                config.runner.max_concurrency = concurrency;
            }
            if let Some(batch_size) = batch_size {
                config.runner.batch_size = batch_size;
            }
            config.runner.limit = limit.or(config.runner.limit);
            config.validate().context("Invalid configuration")?;
            init_tracing(&config);
            run(config).await
        }
        Commands::Inspect { mention_id } => {
            init_tracing(&config);
            inspect(config, &mention_id).await
        }
        Commands::Evaluate {
            predictions,
            ground_truth,
            total,
        } => {
            init_tracing(&config);
            evaluate(config, predictions, ground_truth, total)
        }
    }
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<AppConfig> {
    let config = match path {
        Some(path) => AppConfig::from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?
            .with_env_override()?,
        None => AppConfig::from_env()?,
    };
    Ok(config)
}

fn init_tracing(config: &AppConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("authorlink={}", config.logging.level).into());

    if config.logging.json_format {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

fn orchestrator(
    config: &AppConfig,
    oracle: Arc<dyn DecisionOracle>,
) -> anyhow::Result<TaskOrchestrator> {
    let corpus = Corpus::load(&config.data).context("Failed to load corpus")?;
    info!(
        entities = corpus.directory.len(),
        papers = corpus.papers.len(),
        publications = corpus.publications.len(),
        "Corpus loaded"
    );

    let cache = ProfileCache::open(&config.output.profile_cache_path);
    let builder = ProfileBuilder::new(config.profile.clone(), cache);
    let mut orchestrator = TaskOrchestrator::new(
        Arc::new(corpus),
        builder,
        oracle,
        config.decision.clone(),
        &config.output,
        config.runner.clone(),
    );

    if config.decision.semantic_ranking {
        let client: Arc<dyn EmbeddingClient> = Arc::from(
            create_embedding_client(&config.llm).context("Failed to create embedding client")?,
        );
        orchestrator = orchestrator.with_similarity(Arc::new(EmbeddingSimilarity::new(client)));
    }
    Ok(orchestrator)
}

async fn run(config: AppConfig) -> anyhow::Result<()> {
    let mentions = load_mentions(&config.data.mentions_path).context("Failed to load mentions")?;
    if !mentions.rejected.is_empty() {
        warn!(
            count = mentions.rejected.len(),
            "Some mention IDs could not be parsed"
        );
    }

    let client: Arc<dyn LlmClient> =
        Arc::from(create_llm_client(&config.llm).context("Failed to create LLM client")?);
    let oracle = Arc::new(LlmOracle::new(client, config.llm.model.clone()));
    let orchestrator = orchestrator(&config, oracle)?;

    let summary = orchestrator.run(&mentions).await?;
    println!("{summary}");

    let report = orchestrator.profile_builder().cache().stats().report();
    println!(
        "Profile cache: hits={} misses={} writes={} flushes={} hit_rate={:.1}%",
        report.hits,
        report.misses,
        report.writes,
        report.flushes,
        report.hit_rate * 100.0
    );
    Ok(())
}

/// Oracle stand-in for commands that only render decision input
struct InspectOnly;

#[async_trait]
impl DecisionOracle for InspectOnly {
    async fn decide(&self, _request: &DecisionRequest) -> authorlink_core::Result<OracleDecision> {
        Err(LinkError::Oracle("inspect does not call the oracle".to_string()))
    }

    async fn grade(&self, _request: &GradingRequest) -> authorlink_core::Result<String> {
        Err(LinkError::Oracle("inspect does not call the oracle".to_string()))
    }

    fn name(&self) -> &str {
        "inspect-only"
    }
}

async fn inspect(config: AppConfig, mention_id: &str) -> anyhow::Result<()> {
    let orchestrator = orchestrator(&config, Arc::new(InspectOnly))?;
    let inspection = orchestrator
        .inspect(mention_id)
        .await
        .with_context(|| format!("Failed to inspect {mention_id}"))?;

    println!("=== Mention {} ===\n", inspection.mention);
    println!("{}", inspection.prepared.paper_context);
    if inspection.candidates.is_empty() {
        println!("No candidates: this mention resolves to NIL without an oracle call.");
        return Ok(());
    }

    let ids: Vec<&str> = inspection.candidates.iter().map(String::as_str).collect();
    println!("=== Candidates ({}) ===\n{}\n", ids.len(), ids.join(", "));
    println!("=== Coarse briefs ===\n{}", inspection.prepared.brief_bundle());
    println!(
        "=== Full profiles ===\n{}",
        inspection
            .prepared
            .profile_bundle(&inspection.prepared.candidate_ids())
    );
    Ok(())
}

fn evaluate(
    config: AppConfig,
    predictions: Option<PathBuf>,
    ground_truth: Option<PathBuf>,
    total: Option<usize>,
) -> anyhow::Result<()> {
    let predictions = predictions.unwrap_or(config.output.aggregate_path);
    let Some(ground_truth) = ground_truth.or(config.data.ground_truth_path) else {
        bail!("No ground truth file given (--ground-truth or data.ground_truth_path)");
    };

    let aggregate = ResultAggregate::load(&predictions)
        .with_context(|| format!("Failed to load predictions from {}", predictions.display()))?;
    let truth = GroundTruth::load(&ground_truth)
        .with_context(|| format!("Failed to load ground truth from {}", ground_truth.display()))?;

    let mut evaluator = Evaluator::new(truth);
    if let Some(total) = total {
        evaluator = evaluator.with_total(total);
    }
    let evaluation = evaluator.evaluate(aggregate.buckets());

    println!("{}", evaluation.metrics.report());
    println!("Mismatches: {}", evaluation.mismatches.len());
    for mismatch in evaluation.mismatches.iter().take(10) {
        println!(
            "  {} -> {} (expected: {})",
            mismatch.mention_id,
            mismatch.predicted,
            if mismatch.expected.is_empty() {
                "NIL".to_string()
            } else {
                mismatch.expected.join(", ")
            }
        );
    }
    Ok(())
}
