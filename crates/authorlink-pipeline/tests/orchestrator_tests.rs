//! End-to-end runs over a small on-disk workspace with a mocked oracle

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use authorlink_core::{
    Corpus, DecisionConfig, DecisionMode, DecisionOracle, DecisionRequest, DirectoryEntry,
    EntityDirectory, FailurePolicy, GradingRequest, LinkError, MentionId, MentionList,
    OracleDecision, OutputConfig, PaperAuthor, PaperRecord, ProfileConfig, PublicationStore,
    Result, RunnerConfig, NIL_BUCKET,
};
use authorlink_extractor::{ProfileBuilder, ProfileCache};
use authorlink_pipeline::{ResultAggregate, TaskLog, TaskOrchestrator};

/// Picks the first offered candidate; papers titled "Flaky" time out
#[derive(Default)]
struct ScriptedOracle {
    calls: AtomicUsize,
    current: AtomicUsize,
    peak: AtomicUsize,
    delay_ms: u64,
}

impl ScriptedOracle {
    fn slow(delay_ms: u64) -> Self {
        Self {
            delay_ms,
            ..Self::default()
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DecisionOracle for ScriptedOracle {
    async fn decide(&self, request: &DecisionRequest) -> Result<OracleDecision> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        if self.delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
        }
        self.current.fetch_sub(1, Ordering::SeqCst);

        if request.paper_context.contains("Title: Flaky") {
            return Err(LinkError::Oracle("request timed out".to_string()));
        }
        Ok(OracleDecision {
            identifier: request.candidate_ids[0].clone(),
            rationale: "First candidate.".to_string(),
            confidence: Some(4),
        })
    }

    async fn grade(&self, request: &GradingRequest) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(request
            .candidate_ids
            .iter()
            .map(|id| format!("{id}:Level_4"))
            .collect::<Vec<_>>()
            .join(", "))
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

fn paper(title: &str, author: &str) -> PaperRecord {
    PaperRecord::new(title)
        .with_year(2021)
        .with_author(PaperAuthor::new(author).with_affiliation("Tsinghua University"))
        .with_author(PaperAuthor::new("Yu Zhang"))
}

fn corpus() -> Corpus {
    let directory: EntityDirectory = [
        ("a1", DirectoryEntry::new("Jian Li", ["w1"])),
        ("a2", DirectoryEntry::new("Li Jian", ["w2"])),
        ("b1", DirectoryEntry::new("Wei Wang", ["w3"])),
    ]
    .into_iter()
    .map(|(id, entry)| (id.to_string(), entry))
    .collect();

    let papers: PublicationStore = [
        ("p1", paper("Graph Mining", "Jian Li")),
        ("p2", paper("Query Optimization", "Wei Wang")),
        ("p3", paper("Protein Folding", "Xiao Ming")),
        ("p4", paper("Sparse Graphs", "J. Li")),
        ("p5", paper("Flaky", "Wei Wang")),
    ]
    .into_iter()
    .map(|(id, record)| (id.to_string(), record))
    .collect();

    let publications: PublicationStore = [
        ("w1", paper("Graph Theory", "Jian Li")),
        ("w2", paper("Databases", "Li Jian")),
        ("w3", paper("Indexing", "Wei Wang")),
    ]
    .into_iter()
    .map(|(id, record)| (id.to_string(), record))
    .collect();

    Corpus::new(directory, papers, publications)
}

fn mentions(ids: &[&str]) -> MentionList {
    MentionList {
        mentions: ids.iter().map(|id| id.parse::<MentionId>().unwrap()).collect(),
        rejected: Vec::new(),
    }
}

fn output(dir: &Path) -> OutputConfig {
    OutputConfig {
        task_log_path: dir.join("log.jsonl"),
        aggregate_path: dir.join("result.json"),
        profile_cache_path: dir.join("profile_cache.json"),
    }
}

fn orchestrator(
    corpus: Corpus,
    oracle: Arc<ScriptedOracle>,
    dir: &Path,
    runner: RunnerConfig,
) -> TaskOrchestrator {
    let output = output(dir);
    let builder = ProfileBuilder::new(
        ProfileConfig::default(),
        ProfileCache::open(&output.profile_cache_path),
    );
    TaskOrchestrator::new(
        Arc::new(corpus),
        builder,
        oracle,
        DecisionConfig::default(),
        &output,
        runner,
    )
}

#[tokio::test]
async fn test_empty_directory_resolves_nil_without_oracle() {
    let dir = tempfile::tempdir().unwrap();
    let mut corpus = corpus();
    corpus.directory.clear();
    let oracle = Arc::new(ScriptedOracle::default());
    let runner = orchestrator(corpus, oracle.clone(), dir.path(), RunnerConfig::default());

    let summary = runner.run(&mentions(&["p1-0", "p2-0"])).await.unwrap();

    assert_eq!(summary.processed, 2);
    assert_eq!(summary.nil, 2);
    assert_eq!(summary.oracle_calls, 0);
    assert_eq!(oracle.calls(), 0);

    let replay = runner.task_log().replay().await.unwrap();
    let entry = &replay.entries["p1-0"];
    assert!(entry.outcome.is_nil());
    assert_eq!(entry.stats.candidates, 0);
    assert_eq!(entry.stats.mode, DecisionMode::NoCandidates);
}

#[tokio::test]
async fn test_single_candidate_single_stage() {
    let dir = tempfile::tempdir().unwrap();
    let oracle = Arc::new(ScriptedOracle::default());
    let runner = orchestrator(corpus(), oracle.clone(), dir.path(), RunnerConfig::default());

    let summary = runner.run(&mentions(&["p2-0"])).await.unwrap();
    assert_eq!(summary.resolved, 1);

    let replay = runner.task_log().replay().await.unwrap();
    let entry = &replay.entries["p2-0"];
    assert_eq!(entry.outcome.label(), "b1");
    assert_eq!(entry.stats.mode, DecisionMode::SingleStage);
    assert_eq!(entry.stats.oracle_calls, 1);
    assert_eq!(entry.stats.candidates, 1);
    assert_eq!(oracle.calls(), 1);

    let aggregate = ResultAggregate::load(dir.path().join("result.json")).unwrap();
    assert!(aggregate.mentions("b1").unwrap().contains("p2-0"));
}

#[tokio::test]
async fn test_resume_matches_single_pass() {
    let all = mentions(&["p1-0", "p2-0", "p3-0", "p4-0"]);

    let one_pass = tempfile::tempdir().unwrap();
    let summary = orchestrator(
        corpus(),
        Arc::new(ScriptedOracle::default()),
        one_pass.path(),
        RunnerConfig::default(),
    )
    .run(&all)
    .await
    .unwrap();
    assert_eq!(summary.processed, 4);

    let resumed = tempfile::tempdir().unwrap();
    let first = orchestrator(
        corpus(),
        Arc::new(ScriptedOracle::default()),
        resumed.path(),
        RunnerConfig {
            limit: Some(2),
            batch_size: 1,
            ..RunnerConfig::default()
        },
    )
    .run(&all)
    .await
    .unwrap();
    assert_eq!(first.processed, 2);
    assert_eq!(first.batches, 2);

    let second_oracle = Arc::new(ScriptedOracle::default());
    let second = orchestrator(
        corpus(),
        second_oracle.clone(),
        resumed.path(),
        RunnerConfig::default(),
    )
    .run(&all)
    .await
    .unwrap();
    assert_eq!(second.skipped, 2);
    assert_eq!(second.processed, 2);

    let expected = ResultAggregate::load(one_pass.path().join("result.json")).unwrap();
    let actual = ResultAggregate::load(resumed.path().join("result.json")).unwrap();
    assert_eq!(actual, expected);
    assert_eq!(actual.nil_count(), 1);
    assert!(actual.mentions(NIL_BUCKET).unwrap().contains("p3-0"));

    let third = orchestrator(corpus(), second_oracle.clone(), resumed.path(), RunnerConfig::default())
        .run(&all)
        .await
        .unwrap();
    assert_eq!(third.skipped, 4);
    assert_eq!(third.processed, 0);
    assert_eq!(third.oracle_calls, 0);
}

#[tokio::test]
async fn test_oracle_failure_is_retried_later() {
    let dir = tempfile::tempdir().unwrap();
    let oracle = Arc::new(ScriptedOracle::default());
    let runner = orchestrator(corpus(), oracle, dir.path(), RunnerConfig::default());
    let list = mentions(&["p5-0", "p2-0"]);

    let summary = runner.run(&list).await.unwrap();
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.processed, 1);
    assert_eq!(summary.logged_failures, 0);

    let replay = runner.task_log().replay().await.unwrap();
    assert!(!replay.contains("p5-0"));
    assert!(replay.contains("p2-0"));

    let again = runner.run(&list).await.unwrap();
    assert_eq!(again.skipped, 1);
    assert_eq!(again.failed, 1);
}

#[tokio::test]
async fn test_log_nil_policy_records_failures() {
    let dir = tempfile::tempdir().unwrap();
    let runner = orchestrator(
        corpus(),
        Arc::new(ScriptedOracle::default()),
        dir.path(),
        RunnerConfig {
            data_error_policy: FailurePolicy::LogNil,
            ..RunnerConfig::default()
        },
    );
    let mut list = mentions(&["p4-5", "p9-0", "p5-0"]);
    list.rejected.push("garbage".to_string());

    let summary = runner.run(&list).await.unwrap();
    assert_eq!(summary.total, 4);
    assert_eq!(summary.failed, 4);
    // Oracle errors keep the default retry policy
    assert_eq!(summary.logged_failures, 3);

    let replay = runner.task_log().replay().await.unwrap();
    let entry = &replay.entries["p4-5"];
    assert!(entry.outcome.is_nil());
    assert!(entry.is_failure());
    assert_eq!(entry.stats.mode, DecisionMode::Failed);
    assert!(replay.contains("p9-0"));
    assert!(replay.contains("garbage"));
    assert!(!replay.contains("p5-0"));

    let again = runner.run(&list).await.unwrap();
    assert_eq!(again.skipped, 3);
}

#[tokio::test]
async fn test_oracle_concurrency_is_bounded() {
    let dir = tempfile::tempdir().unwrap();
    let mut corpus = corpus();
    let ids: Vec<String> = (0..12).map(|i| format!("q{i}")).collect();
    for id in &ids {
        corpus
            .papers
            .insert(id.clone(), paper("Query Planning", "Wei Wang"));
    }
    let oracle = Arc::new(ScriptedOracle::slow(20));
    let runner = orchestrator(
        corpus,
        oracle.clone(),
        dir.path(),
        RunnerConfig {
            batch_size: 12,
            max_concurrency: 3,
            ..RunnerConfig::default()
        },
    );

    let list = MentionList {
        mentions: ids.iter().map(|id| MentionId::new(id.clone(), 0)).collect(),
        rejected: Vec::new(),
    };
    let summary = runner.run(&list).await.unwrap();

    assert_eq!(summary.processed, 12);
    assert_eq!(summary.batches, 1);
    assert_eq!(summary.oracle_calls, 12);
    assert_eq!(oracle.peak.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_duplicate_log_entries_are_compacted() {
    let dir = tempfile::tempdir().unwrap();
    let output = output(dir.path());
    let log = TaskLog::new(&output.task_log_path);
    let entry = log.entry("p3-0", authorlink_core::DecisionOutcome::no_candidates());
    log.append(&[entry.clone(), entry]).await.unwrap();

    let runner = orchestrator(
        corpus(),
        Arc::new(ScriptedOracle::default()),
        dir.path(),
        RunnerConfig::default(),
    );
    let summary = runner.run(&mentions(&["p3-0", "p2-0"])).await.unwrap();
    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.processed, 1);

    let content = std::fs::read_to_string(&output.task_log_path).unwrap();
    assert_eq!(content.lines().count(), 2);
}

#[tokio::test]
async fn test_inspect_renders_decision_input() {
    let dir = tempfile::tempdir().unwrap();
    let oracle = Arc::new(ScriptedOracle::default());
    let runner = orchestrator(corpus(), oracle.clone(), dir.path(), RunnerConfig::default());

    let inspection = runner.inspect("p1-0").await.unwrap();
    assert_eq!(inspection.candidates.len(), 2);
    assert!(inspection.prepared.paper_context.contains("Target author: Jian Li"));
    assert!(inspection.prepared.profiles["a2"].starts_with("[ID: a2]"));
    assert_eq!(oracle.calls(), 0);
    assert!(runner.profile_builder().cache().is_empty());
    assert!(!output(dir.path()).profile_cache_path.exists());

    assert!(runner.inspect("p1-9").await.unwrap_err().is_data_error());
}
