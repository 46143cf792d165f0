//! Task orchestrator
//!
//! Drives every pending mention through
//! `Pending -> CandidatesGenerated -> Profiled -> Decided -> Logged`,
//! with mentions that have no candidates logged as NIL straight after
//! blocking. Work is dispatched in fixed-size batches; mentions inside a
//! batch run concurrently while the oracle gate bounds in-flight calls.
//! After each batch the outcomes are appended to the task log and the
//! aggregate snapshot is rewritten, so an interrupted run resumes where it
//! stopped.

use std::collections::HashSet;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use authorlink_core::{
    Corpus, DecisionConfig, DecisionMode, DecisionOracle, DecisionOutcome, FailurePolicy,
    LinkError, MentionId, MentionList, OutputConfig, Resolution, Result, RunnerConfig,
    SimilarityService, StageStats, TokenCounter,
};
use authorlink_decider::{DecisionStrategy, PreparedDecision};
use authorlink_extractor::{CandidateGenerator, CandidateSet, ProfileBuilder};
use futures::future::join_all;
use serde::Serialize;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::aggregate::ResultAggregate;
use crate::checkpoint::{TaskLog, TaskLogEntry};
use crate::gate::RateLimitedOracle;

/// Last stage a mention reached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStage {
    Pending,
    CandidatesGenerated,
    Profiled,
    Decided,
    Logged,
}

impl TaskStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::CandidatesGenerated => "candidates_generated",
            Self::Profiled => "profiled",
            Self::Decided => "decided",
            Self::Logged => "logged",
        }
    }
}

impl fmt::Display for TaskStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A mention that could not be decided
#[derive(Debug)]
pub struct TaskFailure {
    pub mention_id: String,
    pub stage: TaskStage,
    pub error: LinkError,
}

/// Counters reported at the end of a run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    /// Mentions in the task list
    pub total: usize,
    /// Already logged before this run
    pub skipped: usize,
    /// Decided and logged in this run
    pub processed: usize,
    pub resolved: usize,
    pub nil: usize,
    pub failed: usize,
    /// Failures logged as NIL under a `log_nil` policy
    pub logged_failures: usize,
    pub batches: usize,
    pub oracle_calls: usize,
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "total={} skipped={} processed={} resolved={} nil={} failed={} (logged {}) batches={} oracle_calls={}",
            self.total,
            self.skipped,
            self.processed,
            self.resolved,
            self.nil,
            self.failed,
            self.logged_failures,
            self.batches,
            self.oracle_calls
        )
    }
}

/// Decision input for one mention, rendered without calling the oracle
#[derive(Debug, Clone)]
pub struct Inspection {
    pub mention: MentionId,
    pub candidates: CandidateSet,
    pub prepared: PreparedDecision,
}

/// Resumable batch runner over a mention list
pub struct TaskOrchestrator {
    corpus: Arc<Corpus>,
    generator: CandidateGenerator,
    builder: ProfileBuilder,
    strategy: DecisionStrategy,
    gate: Arc<RateLimitedOracle>,
    log: TaskLog,
    aggregate_path: PathBuf,
    runner: RunnerConfig,
}

impl TaskOrchestrator {
    pub fn new(
        corpus: Arc<Corpus>,
        builder: ProfileBuilder,
        oracle: Arc<dyn DecisionOracle>,
        decision: DecisionConfig,
        output: &OutputConfig,
        runner: RunnerConfig,
    ) -> Self {
        let gate = Arc::new(RateLimitedOracle::new(oracle, runner.max_concurrency));
        Self {
            generator: CandidateGenerator::new(&corpus.directory),
            corpus,
            builder,
            strategy: DecisionStrategy::new(gate.clone(), decision),
            gate,
            log: TaskLog::new(&output.task_log_path),
            aggregate_path: output.aggregate_path.clone(),
            runner,
        }
    }

    pub fn with_similarity(self, similarity: Arc<dyn SimilarityService>) -> Self {
        Self {
            strategy: self.strategy.with_similarity(similarity),
            ..self
        }
    }

    pub fn with_token_counter(self, counter: Arc<dyn TokenCounter>) -> Self {
        Self {
            strategy: self.strategy.with_token_counter(counter),
            ..self
        }
    }

    pub fn task_log(&self) -> &TaskLog {
        &self.log
    }

    pub fn profile_builder(&self) -> &ProfileBuilder {
        &self.builder
    }

    /// Oracle calls admitted through the gate since construction
    pub fn oracle_calls(&self) -> usize {
        self.gate.calls()
    }

    /// Resolve every mention not yet in the task log
    pub async fn run(&self, mentions: &MentionList) -> Result<RunSummary> {
        let replay = self.log.replay().await?;
        if replay.duplicates > 0 {
            self.log.compact().await?;
        }
        let mut aggregate = ResultAggregate::from_entries(replay.entries.values());

        let tasks: Vec<String> = mentions
            .mentions
            .iter()
            .map(ToString::to_string)
            .chain(mentions.rejected.iter().cloned())
            .collect();

        let mut summary = RunSummary {
            total: tasks.len(),
            ..RunSummary::default()
        };
        let mut queued = HashSet::new();
        let mut pending = Vec::new();
        for id in tasks {
            if replay.contains(&id) {
                summary.skipped += 1;
            } else if queued.insert(id.clone()) {
                pending.push(id);
            }
        }
        if let Some(limit) = self.runner.limit {
            pending.truncate(limit);
        }

        let batch_size = self.runner.batch_size.max(1);
        let batches = pending.len().div_ceil(batch_size);
        let calls_before = self.gate.calls();
        info!(
            total = summary.total,
            skipped = summary.skipped,
            pending = pending.len(),
            batches,
            concurrency = self.gate.limit(),
            oracle = %self.strategy.oracle_name(),
            "Starting run"
        );

        for (index, batch) in pending.chunks(batch_size).enumerate() {
            let results = join_all(batch.iter().map(|id| {
                self.process(id)
                    .instrument(info_span!("mention", mention_id = %id))
            }))
            .await;

            let mut entries = Vec::with_capacity(batch.len());
            let mut failed = 0usize;
            for result in results {
                match result {
                    Ok(entry) => {
                        summary.processed += 1;
                        if entry.outcome.is_nil() {
                            summary.nil += 1;
                        } else {
                            summary.resolved += 1;
                        }
                        entries.push(entry);
                    }
                    Err(failure) => {
                        failed += 1;
                        summary.failed += 1;
                        let policy = self.policy_for(&failure.error);
                        warn!(
                            mention_id = %failure.mention_id,
                            stage = %failure.stage,
                            error = %failure.error,
                            ?policy,
                            "Mention failed"
                        );
                        if policy == FailurePolicy::LogNil {
                            summary.logged_failures += 1;
                            entries.push(self.failure_entry(&failure));
                        }
                    }
                }
            }

            self.log.append(&entries).await?;
            for entry in &entries {
                aggregate.record(&entry.mention_id, &entry.outcome);
            }
            aggregate.write_snapshot(&self.aggregate_path).await?;
            summary.batches += 1;

            info!(
                batch = index + 1,
                batches,
                logged = entries.len(),
                failed,
                "Batch complete"
            );
        }

        summary.oracle_calls = self.gate.calls() - calls_before;
        info!(%summary, "Run finished");
        Ok(summary)
    }

    /// Render what the oracle would see for one mention.
    ///
    /// Read-only: profiles missing from the cache are computed but not stored.
    pub async fn inspect(&self, mention_id: &str) -> Result<Inspection> {
        let mention: MentionId = mention_id.parse()?;
        let paper = self.corpus.paper(mention.paper_id())?;
        let candidates = self.generator.generate(&mention, paper)?;
        let profiles = self.builder.preview(
            &candidates,
            &self.corpus.directory,
            &self.corpus.publications,
        )?;
        let prepared = self
            .strategy
            .prepare(mention.paper_id(), paper, mention.author_index(), &profiles)
            .await?;

        Ok(Inspection {
            mention,
            candidates,
            prepared,
        })
    }

    async fn process(&self, mention_id: &str) -> std::result::Result<TaskLogEntry, TaskFailure> {
        let mut stage = TaskStage::Pending;
        self.advance(mention_id, &mut stage)
            .await
            .map_err(|error| TaskFailure {
                mention_id: mention_id.to_string(),
                stage,
                error,
            })
    }

    async fn advance(&self, mention_id: &str, stage: &mut TaskStage) -> Result<TaskLogEntry> {
        let mention: MentionId = mention_id.parse()?;
        let paper = self.corpus.paper(mention.paper_id())?;

        let candidates = self.generator.generate(&mention, paper)?;
        *stage = TaskStage::CandidatesGenerated;
        if candidates.is_empty() {
            debug!("No candidate carries this name, resolving to NIL");
            return Ok(self.log.entry(mention_id, DecisionOutcome::no_candidates()));
        }

        let profiles = self.builder.build(
            &candidates,
            &self.corpus.directory,
            &self.corpus.publications,
        )?;
        *stage = TaskStage::Profiled;

        let outcome = self
            .strategy
            .resolve(mention.paper_id(), paper, mention.author_index(), &profiles)
            .await?;
        *stage = TaskStage::Decided;
        debug!(
            resolution = %outcome.resolution,
            mode = ?outcome.stats.mode,
            oracle_calls = outcome.stats.oracle_calls,
            "Mention decided"
        );

        Ok(self.log.entry(mention_id, outcome))
    }

    fn policy_for(&self, error: &LinkError) -> FailurePolicy {
        if error.is_data_error() {
            self.runner.data_error_policy
        } else if error.is_oracle_error() {
            self.runner.oracle_error_policy
        } else {
            FailurePolicy::Retry
        }
    }

    fn failure_entry(&self, failure: &TaskFailure) -> TaskLogEntry {
        let outcome = DecisionOutcome {
            resolution: Resolution::Nil,
            rationale: format!("Failed at stage {}: {}", failure.stage, failure.error),
            confidence: None,
            stats: StageStats {
                mode: DecisionMode::Failed,
                ..StageStats::default()
            },
        };
        let mut entry = self.log.entry(&failure.mention_id, outcome);
        entry.error = Some(failure.error.to_string());
        entry
    }
}
