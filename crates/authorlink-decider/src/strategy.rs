//! Decision strategy
//!
//! Turns a mention's paper context and candidate profiles into a
//! [`DecisionOutcome`], either with one oracle call over every candidate
//! or with a coarse tier-grading call followed by a deep call over the
//! shortlisted candidates. Hybrid mode picks between the two by candidate
//! count.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Arc;

use authorlink_core::{
    CharRatioCounter, DecisionConfig, DecisionMode, DecisionOracle, DecisionOutcome,
    DecisionRequest, EmptyFilterPolicy, GradingRequest, LinkError, PaperRecord, Profile,
    Resolution, Result, SimilarityService, StageCost, StageStats, StrategyMode, TokenCounter,
    WorkSummary,
};
use futures::future::join_all;
use tracing::{debug, warn};

use crate::context::{render_paper_context, similarity_query};
use crate::parse::{normalize_identifier, parse_tiers, TierAssignment};

/// Everything the oracle sees for one mention
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PreparedDecision {
    pub paper_context: String,
    /// Full profile blocks keyed by entity ID
    pub profiles: BTreeMap<String, String>,
    /// Coarse briefs keyed by entity ID
    pub briefs: BTreeMap<String, String>,
}

impl PreparedDecision {
    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }

    pub fn candidate_ids(&self) -> Vec<String> {
        self.profiles.keys().cloned().collect()
    }

    /// Full profiles of `ids`, in the given order
    pub fn profile_bundle(&self, ids: &[String]) -> String {
        ids.iter()
            .filter_map(|id| self.profiles.get(id))
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Briefs of every candidate
    pub fn brief_bundle(&self) -> String {
        self.briefs
            .values()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Single-stage, two-stage or hybrid decision policy over a [`DecisionOracle`]
pub struct DecisionStrategy {
    oracle: Arc<dyn DecisionOracle>,
    counter: Arc<dyn TokenCounter>,
    similarity: Option<Arc<dyn SimilarityService>>,
    config: DecisionConfig,
}

impl DecisionStrategy {
    pub fn new(oracle: Arc<dyn DecisionOracle>, config: DecisionConfig) -> Self {
        Self {
            oracle,
            counter: Arc::new(CharRatioCounter::default()),
            similarity: None,
            config,
        }
    }

    /// Replace the default character-ratio token counter
    pub fn with_token_counter(mut self, counter: Arc<dyn TokenCounter>) -> Self {
        self.counter = counter;
        self
    }

    /// Enable semantic ranking of representative works
    pub fn with_similarity(mut self, similarity: Arc<dyn SimilarityService>) -> Self {
        self.similarity = Some(similarity);
        self
    }

    pub fn config(&self) -> &DecisionConfig {
        &self.config
    }

    pub fn oracle_name(&self) -> &str {
        self.oracle.name()
    }

    /// Render the paper context and candidate blocks for one mention.
    ///
    /// Fails with `OutOfRange` when `author_index` is past the author list.
    pub async fn prepare(
        &self,
        paper_id: &str,
        paper: &PaperRecord,
        author_index: usize,
        profiles: &BTreeMap<String, Profile>,
    ) -> Result<PreparedDecision> {
        let paper_context = render_paper_context(
            paper_id,
            paper,
            author_index,
            self.config.abstract_excerpt_chars,
        )?;
        let query = similarity_query(paper);

        Ok(PreparedDecision {
            paper_context,
            profiles: self.render_profiles(&query, profiles).await,
            briefs: profiles
                .iter()
                .map(|(id, profile)| (id.clone(), profile.brief()))
                .collect(),
        })
    }

    /// Prepare and decide in one step
    pub async fn resolve(
        &self,
        paper_id: &str,
        paper: &PaperRecord,
        author_index: usize,
        profiles: &BTreeMap<String, Profile>,
    ) -> Result<DecisionOutcome> {
        let prepared = self.prepare(paper_id, paper, author_index, profiles).await?;
        self.decide(&prepared).await
    }

    /// Decide among the prepared candidates.
    ///
    /// Oracle failures propagate; they are never turned into NIL here.
    pub async fn decide(&self, prepared: &PreparedDecision) -> Result<DecisionOutcome> {
        if prepared.is_empty() {
            return Ok(DecisionOutcome::no_candidates());
        }

        let all_ids = prepared.candidate_ids();
        let full_bundle = prepared.profile_bundle(&all_ids);
        let baseline = self.tokens(&[&prepared.paper_context, &full_bundle]);

        let mode = self.select_mode(all_ids.len());
        debug!(
            candidates = all_ids.len(),
            ?mode,
            baseline_tokens = baseline,
            "Deciding mention"
        );

        match mode {
            DecisionMode::TwoStage => self.two_stage(prepared, all_ids, baseline).await,
            _ => self.single_stage(prepared, all_ids, full_bundle, baseline).await,
        }
    }

    fn select_mode(&self, candidates: usize) -> DecisionMode {
        match self.config.mode {
            StrategyMode::Single => DecisionMode::SingleStage,
            StrategyMode::TwoStage => DecisionMode::TwoStage,
            StrategyMode::Hybrid if candidates > self.config.hybrid_threshold => {
                DecisionMode::TwoStage
            }
            StrategyMode::Hybrid => DecisionMode::SingleStage,
        }
    }

    async fn single_stage(
        &self,
        prepared: &PreparedDecision,
        candidate_ids: Vec<String>,
        candidate_profiles: String,
        baseline: usize,
    ) -> Result<DecisionOutcome> {
        let candidates = candidate_ids.len();
        let request = DecisionRequest {
            paper_context: prepared.paper_context.clone(),
            candidate_profiles,
            candidate_ids,
            stage_context: None,
        };
        let decision = self.oracle.decide(&request).await?;
        let output_tokens = self.tokens(&[&decision.identifier, &decision.rationale]);

        Ok(DecisionOutcome {
            resolution: normalize_identifier(&decision.identifier),
            rationale: decision.rationale,
            confidence: decision.confidence,
            stats: StageStats {
                mode: DecisionMode::SingleStage,
                candidates,
                oracle_calls: 1,
                input_tokens: baseline,
                output_tokens,
                baseline_input_tokens: baseline,
                ..StageStats::default()
            },
        })
    }

    async fn two_stage(
        &self,
        prepared: &PreparedDecision,
        all_ids: Vec<String>,
        baseline: usize,
    ) -> Result<DecisionOutcome> {
        let candidates = all_ids.len();
        let min_tier = self.config.min_tier;

        let grading = GradingRequest {
            paper_context: prepared.paper_context.clone(),
            candidate_briefs: prepared.brief_bundle(),
            candidate_ids: all_ids.clone(),
        };
        let listing = self.oracle.grade(&grading).await?;
        let coarse = StageCost {
            candidates,
            input_tokens: self.tokens(&[&grading.paper_context, &grading.candidate_briefs]),
        };
        let listing_tokens = self.counter.count(&listing);

        // IDs outside the candidate set cannot be examined in depth
        let tiers: Vec<TierAssignment> = parse_tiers(&listing, min_tier)
            .into_iter()
            .filter(|t| prepared.profiles.contains_key(&t.entity_id))
            .collect();
        debug!(
            candidates,
            qualified = tiers.len(),
            coarse_tokens = coarse.input_tokens,
            "Coarse filter finished"
        );

        let coarse_empty = tiers.is_empty();
        let (deep_ids, stage_context) = if coarse_empty {
            match self.config.empty_filter_policy {
                EmptyFilterPolicy::Strict => {
                    return Ok(DecisionOutcome {
                        resolution: Resolution::Nil,
                        rationale: format!(
                            "No candidate reached Level_{min_tier} in the coarse filter; \
                             the author is treated as new."
                        ),
                        confidence: None,
                        stats: StageStats {
                            mode: DecisionMode::TwoStage,
                            candidates,
                            oracle_calls: 1,
                            input_tokens: coarse.input_tokens,
                            output_tokens: listing_tokens,
                            baseline_input_tokens: baseline,
                            coarse: Some(coarse),
                            deep: None,
                            coarse_empty: true,
                        },
                    });
                }
                EmptyFilterPolicy::Fallback => (
                    all_ids,
                    format!(
                        "The coarse filter found no candidate at Level_{min_tier} or above. \
                         All {candidates} candidates are re-examined with full profiles."
                    ),
                ),
            }
        } else {
            let shortlisted = tiers.len();
            let shortlist = tiers
                .iter()
                .map(|t| format!("{}:Level_{}", t.entity_id, t.tier))
                .collect::<Vec<_>>()
                .join(", ");
            (
                tiers.into_iter().map(|t| t.entity_id).collect(),
                format!(
                    "The coarse filter shortlisted {shortlisted} of {candidates} candidates \
                     ({shortlist}), highest tier first. Confirm one of them or answer NIL."
                ),
            )
        };

        let request = DecisionRequest {
            paper_context: prepared.paper_context.clone(),
            candidate_profiles: prepared.profile_bundle(&deep_ids),
            candidate_ids: deep_ids,
            stage_context: Some(stage_context),
        };
        let deep = StageCost {
            candidates: request.candidate_ids.len(),
            input_tokens: self.tokens(&[
                &request.paper_context,
                request.stage_context.as_deref().unwrap_or_default(),
                &request.candidate_profiles,
            ]),
        };
        let decision = self.oracle.decide(&request).await?;
        debug!(
            deep_candidates = deep.candidates,
            deep_tokens = deep.input_tokens,
            "Deep analysis finished"
        );

        let output_tokens =
            listing_tokens + self.tokens(&[&decision.identifier, &decision.rationale]);

        Ok(DecisionOutcome {
            resolution: normalize_identifier(&decision.identifier),
            rationale: decision.rationale,
            confidence: decision.confidence,
            stats: StageStats {
                mode: DecisionMode::TwoStage,
                candidates,
                oracle_calls: 2,
                input_tokens: coarse.input_tokens + deep.input_tokens,
                output_tokens,
                baseline_input_tokens: baseline,
                coarse: Some(coarse),
                deep: Some(deep),
                coarse_empty,
            },
        })
    }

    fn tokens(&self, parts: &[&str]) -> usize {
        self.counter.count(&parts.concat())
    }

    async fn render_profiles(
        &self,
        query: &str,
        profiles: &BTreeMap<String, Profile>,
    ) -> BTreeMap<String, String> {
        let similarity = match (&self.similarity, self.config.semantic_ranking) {
            (Some(similarity), true) => similarity.as_ref(),
            _ => {
                return profiles
                    .iter()
                    .map(|(id, profile)| (id.clone(), profile.render()))
                    .collect()
            }
        };
        let keep = self.config.ranked_works;

        let rendered = join_all(profiles.iter().map(|(id, profile)| async move {
            let block = match rank_works(similarity, query, &profile.works, keep).await {
                Ok(works) => profile.render_with_works(&works),
                Err(e) => {
                    warn!(entity = %id, error = %e, "Work ranking failed, keeping profile order");
                    profile.render()
                }
            };
            (id.clone(), block)
        }))
        .await;

        rendered.into_iter().collect()
    }
}

/// Works ordered by similarity to `query`, best first, at most `keep`
async fn rank_works(
    similarity: &dyn SimilarityService,
    query: &str,
    works: &[WorkSummary],
    keep: usize,
) -> Result<Vec<WorkSummary>> {
    if works.is_empty() {
        return Ok(Vec::new());
    }

    let texts: Vec<String> = works.iter().map(WorkSummary::similarity_text).collect();
    let scores = similarity.similarities(query, &texts).await?;
    if scores.len() != works.len() {
        return Err(LinkError::Similarity(format!(
            "expected {} scores, got {}",
            works.len(),
            scores.len()
        )));
    }

    let mut order: Vec<usize> = (0..works.len()).collect();
    order.sort_by(|&a, &b| scores[b].partial_cmp(&scores[a]).unwrap_or(Ordering::Equal));
    Ok(order
        .into_iter()
        .take(keep)
        .map(|i| works[i].clone())
        .collect())
}
