//! Authorlink Core - Domain models, traits, and shared types
//!
//! This crate defines the core abstractions used throughout the
//! author-disambiguation pipeline:
//! - Mention, paper and directory models
//! - Entity profiles and decision outcomes
//! - Common error types
//! - Capability traits for the decision oracle, similarity service and LLM clients
//! - Configuration management
//! - Corpus loading

pub mod config;
pub mod corpus;

pub use config::{
    AppConfig, ConfigError, DataConfig, DecisionConfig, EmptyFilterPolicy, FailurePolicy,
    LlmConfig, LlmProvider, LoggingConfig, OutputConfig, ProfileConfig, RunnerConfig,
    StrategyMode,
};
pub use corpus::{
    load_json, load_mentions, Corpus, EntityDirectory, MentionList, PublicationLookup,
    PublicationStore,
};

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Aggregate bucket that collects mentions resolved to no known entity
pub const NIL_BUCKET: &str = "new_author";

/// Label written to the task log for NIL outcomes
pub const NIL_LABEL: &str = "NIL";

// ============================================================================
// Error Types
// ============================================================================

/// Core error types for resolution operations
#[derive(Error, Debug)]
pub enum LinkError {
    #[error("Author index {index} out of range for paper {paper_id} ({authors} authors)")]
    OutOfRange {
        paper_id: String,
        index: usize,
        authors: usize,
    },

    #[error("Paper not found: {0}")]
    MissingPaper(String),

    #[error("Entity not found in directory: {0}")]
    MissingEntity(String),

    #[error("Invalid mention id: {0}")]
    InvalidMention(String),

    #[error("Oracle error: {0}")]
    Oracle(String),

    #[error("Malformed oracle response: {0}")]
    MalformedResponse(String),

    #[error("Similarity service error: {0}")]
    Similarity(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl LinkError {
    /// Missing or inconsistent input data for a single mention
    pub fn is_data_error(&self) -> bool {
        matches!(
            self,
            Self::OutOfRange { .. }
                | Self::MissingPaper(_)
                | Self::MissingEntity(_)
                | Self::InvalidMention(_)
        )
    }

    /// Failure of the external decision capability
    pub fn is_oracle_error(&self) -> bool {
        matches!(self, Self::Oracle(_) | Self::MalformedResponse(_))
    }
}

pub type Result<T> = std::result::Result<T, LinkError>;

// ============================================================================
// Mentions and Papers
// ============================================================================

/// One (paper, author position) pair awaiting resolution.
///
/// Written as `<paper_id>-<author_index>`; the index is the suffix after the
/// last dash so paper IDs may themselves contain dashes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MentionId {
    paper_id: String,
    author_index: usize,
}

impl MentionId {
    pub fn new(paper_id: impl Into<String>, author_index: usize) -> Self {
        Self {
            paper_id: paper_id.into(),
            author_index,
        }
    }

    pub fn paper_id(&self) -> &str {
        &self.paper_id
    }

    pub fn author_index(&self) -> usize {
        self.author_index
    }
}

impl fmt::Display for MentionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.paper_id, self.author_index)
    }
}

impl FromStr for MentionId {
    type Err = LinkError;

    fn from_str(s: &str) -> Result<Self> {
        let (paper_id, index) = s
            .trim()
            .rsplit_once('-')
            .ok_or_else(|| LinkError::InvalidMention(s.to_string()))?;
        if paper_id.is_empty() {
            return Err(LinkError::InvalidMention(s.to_string()));
        }
        let author_index = index
            .parse()
            .map_err(|_| LinkError::InvalidMention(s.to_string()))?;
        Ok(Self::new(paper_id, author_index))
    }
}

impl TryFrom<String> for MentionId {
    type Error = LinkError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<MentionId> for String {
    fn from(id: MentionId) -> Self {
        id.to_string()
    }
}

/// An author slot on a paper
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PaperAuthor {
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,

    /// Free-text affiliation as printed on the paper
    #[serde(default, rename = "org", alias = "affiliation")]
    pub affiliation: Option<String>,
}

impl PaperAuthor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            affiliation: None,
        }
    }

    pub fn with_affiliation(mut self, affiliation: impl Into<String>) -> Self {
        self.affiliation = Some(affiliation.into());
        self
    }
}

/// A publication record owned by the external corpus
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PaperRecord {
    #[serde(default, deserialize_with = "null_as_default")]
    pub title: String,

    #[serde(default)]
    pub venue: Option<String>,

    #[serde(default, deserialize_with = "lenient_year")]
    pub year: Option<u32>,

    #[serde(default, rename = "abstract")]
    pub abstract_text: Option<String>,

    #[serde(default, deserialize_with = "null_as_default")]
    pub keywords: Vec<String>,

    #[serde(default, deserialize_with = "null_as_default")]
    pub authors: Vec<PaperAuthor>,
}

impl PaperRecord {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }

    pub fn with_author(mut self, author: PaperAuthor) -> Self {
        self.authors.push(author);
        self
    }

    pub fn with_keywords<I, S>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.keywords = keywords.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_year(mut self, year: u32) -> Self {
        self.year = Some(year);
        self
    }

    pub fn with_venue(mut self, venue: impl Into<String>) -> Self {
        self.venue = Some(venue.into());
        self
    }

    /// Author slot referenced by a mention
    pub fn author(&self, paper_id: &str, index: usize) -> Result<&PaperAuthor> {
        self.authors.get(index).ok_or_else(|| LinkError::OutOfRange {
            paper_id: paper_id.to_string(),
            index,
            authors: self.authors.len(),
        })
    }
}

/// A known author identity in the entity directory
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DirectoryEntry {
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,

    #[serde(
        default,
        rename = "pubs",
        alias = "publication_ids",
        deserialize_with = "null_as_default"
    )]
    pub publication_ids: Vec<String>,
}

impl DirectoryEntry {
    pub fn new<I, S>(name: impl Into<String>, publication_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            publication_ids: publication_ids.into_iter().map(Into::into).collect(),
        }
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Accepts `2019`, `"2019"`, `""` and `null`
fn lenient_year<'de, D>(deserializer: D) -> std::result::Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::Number(n)) => n.as_u64().and_then(|y| u32::try_from(y).ok()),
        Some(serde_json::Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}

// ============================================================================
// Profiles
// ============================================================================

/// A value with its occurrence count
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrequencyEntry {
    pub value: String,
    pub count: usize,
}

impl fmt::Display for FrequencyEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.value, self.count)
    }
}

/// A representative publication of an entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkSummary {
    pub title: String,
    pub year: Option<u32>,
    pub venue: Option<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
}

impl WorkSummary {
    /// Text used for semantic comparison against a paper
    pub fn similarity_text(&self) -> String {
        if self.keywords.is_empty() {
            self.title.clone()
        } else {
            format!("{} {}", self.title, self.keywords.join(" "))
        }
    }
}

impl fmt::Display for WorkSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let year = self
            .year
            .map(|y| y.to_string())
            .unwrap_or_else(|| "N/A".to_string());
        let venue = self.venue.as_deref().unwrap_or("Unknown Venue");
        write!(f, "{} (Year: {} | Venue: {})", self.title, year, venue)
    }
}

/// Cacheable summary of an entity's publication history.
///
/// Deterministic for a given publication set and normalization rules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub entity_id: String,
    pub name: String,
    pub affiliations: Vec<String>,
    pub keywords: Vec<FrequencyEntry>,
    pub collaborators: Vec<FrequencyEntry>,
    pub works: Vec<WorkSummary>,
    /// Publications that contributed to this profile
    pub publication_count: usize,
}

impl Profile {
    /// Full profile block used for deep analysis
    pub fn render(&self) -> String {
        self.render_with_works(&self.works)
    }

    /// Full profile block with an explicit selection of works
    pub fn render_with_works(&self, works: &[WorkSummary]) -> String {
        let mut out = format!("[ID: {}]\n", self.entity_id);
        out.push_str(&self.affiliation_block());
        out.push_str(&format!("- keywords: {}\n", join_entries(&self.keywords)));
        out.push_str("- works:\n");
        if works.is_empty() {
            out.push_str("  (None)\n");
        }
        for (i, work) in works.iter().enumerate() {
            out.push_str(&format!("  {}. {}\n", i + 1, work));
        }
        out.push_str(&format!(
            "- collaborators: {}\n",
            join_entries(&self.collaborators)
        ));
        out
    }

    /// Compact brief used by the coarse filter
    pub fn brief(&self) -> String {
        let mut out = format!("ID:{}\n", self.entity_id);
        out.push_str(&self.affiliation_block());
        out.push_str(&format!("- keywords: {}\n", join_entries(&self.keywords)));
        out.push_str(&format!(
            "- collaborators: {}\n",
            join_entries(&self.collaborators)
        ));
        out
    }

    fn affiliation_block(&self) -> String {
        let mut out = String::from("- orgs:\n");
        if self.affiliations.is_empty() {
            out.push_str("  (Unknown/Not provided)\n");
        }
        for (i, org) in self.affiliations.iter().enumerate() {
            out.push_str(&format!("  {}. {}\n", i + 1, org));
        }
        out
    }
}

fn join_entries(entries: &[FrequencyEntry]) -> String {
    if entries.is_empty() {
        return "N/A".to_string();
    }
    entries
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

// ============================================================================
// Decision Outcomes
// ============================================================================

/// Resolved entity or NIL
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Resolution {
    Entity(String),
    Nil,
}

impl Resolution {
    pub fn is_nil(&self) -> bool {
        matches!(self, Self::Nil)
    }

    /// Label written to the task log (`NIL` or the entity ID)
    pub fn label(&self) -> &str {
        match self {
            Self::Entity(id) => id,
            Self::Nil => NIL_LABEL,
        }
    }

    /// Key of the result aggregate bucket
    pub fn bucket(&self) -> &str {
        match self {
            Self::Entity(id) => id,
            Self::Nil => NIL_BUCKET,
        }
    }
}

impl From<String> for Resolution {
    fn from(label: String) -> Self {
        if label == NIL_LABEL || label == NIL_BUCKET {
            Self::Nil
        } else {
            Self::Entity(label)
        }
    }
}

impl From<Resolution> for String {
    fn from(resolution: Resolution) -> Self {
        resolution.label().to_string()
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Path taken by the decision strategy for one mention
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionMode {
    /// Empty candidate set, no oracle call
    #[default]
    NoCandidates,
    SingleStage,
    TwoStage,
    /// Logged failure under the `log_nil` policy
    Failed,
}

/// Candidate count and input cost of one oracle stage
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageCost {
    pub candidates: usize,
    pub input_tokens: usize,
}

/// Stage-level statistics for cost comparison across strategies
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StageStats {
    pub mode: DecisionMode,
    pub candidates: usize,
    pub oracle_calls: u32,
    pub input_tokens: usize,
    pub output_tokens: usize,
    /// Input tokens a single-stage call over all candidates would have used
    pub baseline_input_tokens: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coarse: Option<StageCost>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deep: Option<StageCost>,
    pub coarse_empty: bool,
}

/// Outcome of resolving one mention
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionOutcome {
    pub resolution: Resolution,
    pub rationale: String,
    pub confidence: Option<u8>,
    pub stats: StageStats,
}

impl DecisionOutcome {
    /// Terminal NIL for a mention whose name matches no directory entry
    pub fn no_candidates() -> Self {
        Self {
            resolution: Resolution::Nil,
            rationale: "Candidate set is empty.".to_string(),
            confidence: None,
            stats: StageStats::default(),
        }
    }
}

// ============================================================================
// Capability Traits
// ============================================================================

/// Input of a deep (or single-stage) identity decision
#[derive(Debug, Clone, Default)]
pub struct DecisionRequest {
    pub paper_context: String,
    pub candidate_profiles: String,
    pub candidate_ids: Vec<String>,
    /// Explains which branch of the two-stage protocol produced this call
    pub stage_context: Option<String>,
}

/// Raw answer of the decision oracle
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OracleDecision {
    pub identifier: String,
    pub rationale: String,
    pub confidence: Option<u8>,
}

/// Input of the coarse tier-grading call
#[derive(Debug, Clone, Default)]
pub struct GradingRequest {
    pub paper_context: String,
    pub candidate_briefs: String,
    pub candidate_ids: Vec<String>,
}

/// External capability that judges mention-vs-candidate identity
#[async_trait::async_trait]
pub trait DecisionOracle: Send + Sync {
    /// Pick the matching candidate ID or a no-match sentinel
    async fn decide(&self, request: &DecisionRequest) -> Result<OracleDecision>;

    /// Grade candidates; returns a free-text `ID:Level_N` listing
    async fn grade(&self, request: &GradingRequest) -> Result<String>;

    /// Oracle name for logging
    fn name(&self) -> &str;
}

/// External capability that scores semantic similarity between texts
#[async_trait::async_trait]
pub trait SimilarityService: Send + Sync {
    /// Similarity of each text to the query, higher is closer
    async fn similarities(&self, query: &str, texts: &[String]) -> Result<Vec<f32>>;
}

/// Text-in, text-out model backend behind the LLM oracle
#[async_trait::async_trait]
pub trait LlmClient: Send + Sync {
    /// Complete a single prompt
    async fn generate(&self, prompt: &str) -> Result<String>;
}

/// Cost surrogate for text sent to or received from the oracle
pub trait TokenCounter: Send + Sync {
    fn count(&self, text: &str) -> usize;
}

/// Approximates tokens as a fixed number of characters per token
#[derive(Debug, Clone, Copy)]
pub struct CharRatioCounter {
    chars_per_token: usize,
}

impl CharRatioCounter {
    pub fn new(chars_per_token: usize) -> Self {
        Self {
            chars_per_token: chars_per_token.max(1),
        }
    }
}

impl Default for CharRatioCounter {
    fn default() -> Self {
        Self::new(4)
    }
}

impl TokenCounter for CharRatioCounter {
    fn count(&self, text: &str) -> usize {
        text.chars().count().div_ceil(self.chars_per_token)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mention_id_parse() {
        let id: MentionId = "53e9ab2fb7602d97034a5b9f-3".parse().unwrap();
        assert_eq!(id.paper_id(), "53e9ab2fb7602d97034a5b9f");
        assert_eq!(id.author_index(), 3);
        assert_eq!(id.to_string(), "53e9ab2fb7602d97034a5b9f-3");
    }

    #[test]
    fn test_mention_id_dashed_paper() {
        let id: MentionId = "conf-2019-abc-0".parse().unwrap();
        assert_eq!(id.paper_id(), "conf-2019-abc");
        assert_eq!(id.author_index(), 0);
    }

    #[test]
    fn test_mention_id_invalid() {
        assert!("nodash".parse::<MentionId>().is_err());
        assert!("paper-x".parse::<MentionId>().is_err());
        assert!("-2".parse::<MentionId>().is_err());
    }

    #[test]
    fn test_mention_id_serde() {
        let id = MentionId::new("p1", 2);
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"p1-2\"");
        let back: MentionId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn test_paper_record_lenient_fields() {
        let json = r#"{
            "title": "Deep Graphs",
            "year": "2018",
            "venue": null,
            "keywords": null,
            "authors": [{"name": "Jian Li", "org": "Tsinghua University"}, {"name": "Wei Wang"}]
        }"#;
        let paper: PaperRecord = serde_json::from_str(json).unwrap();
        assert_eq!(paper.year, Some(2018));
        assert!(paper.keywords.is_empty());
        assert_eq!(
            paper.authors[0].affiliation.as_deref(),
            Some("Tsinghua University")
        );
        assert!(paper.authors[1].affiliation.is_none());
    }

    #[test]
    fn test_author_out_of_range() {
        let paper = PaperRecord::new("t").with_author(PaperAuthor::new("A B"));
        assert!(paper.author("p", 0).is_ok());
        let err = paper.author("p", 1).unwrap_err();
        assert!(err.is_data_error());
        assert!(matches!(err, LinkError::OutOfRange { index: 1, .. }));
    }

    #[test]
    fn test_directory_entry_aliases() {
        let a: DirectoryEntry =
            serde_json::from_str(r#"{"name": "Jian Li", "pubs": ["p1", "p2"]}"#).unwrap();
        let b: DirectoryEntry =
            serde_json::from_str(r#"{"name": "Jian Li", "publication_ids": ["p1", "p2"]}"#)
                .unwrap();
        assert_eq!(a, b);
        assert_eq!(a.publication_ids.len(), 2);
    }

    #[test]
    fn test_resolution_labels() {
        let nil = Resolution::Nil;
        assert_eq!(nil.label(), "NIL");
        assert_eq!(nil.bucket(), "new_author");
        assert_eq!(Resolution::from("NIL".to_string()), Resolution::Nil);
        assert_eq!(Resolution::from("new_author".to_string()), Resolution::Nil);

        let hit = Resolution::Entity("a1".to_string());
        assert_eq!(hit.bucket(), "a1");
        assert_eq!(serde_json::to_string(&hit).unwrap(), "\"a1\"");
    }

    #[test]
    fn test_profile_render_and_brief() {
        let profile = Profile {
            entity_id: "a1".to_string(),
            name: "Jian Li".to_string(),
            affiliations: vec!["Tsinghua University".to_string()],
            keywords: vec![FrequencyEntry {
                value: "graph".to_string(),
                count: 3,
            }],
            collaborators: vec![],
            works: vec![WorkSummary {
                title: "Graph Mining".to_string(),
                year: Some(2020),
                venue: None,
                keywords: vec![],
            }],
            publication_count: 1,
        };

        let full = profile.render();
        assert!(full.contains("[ID: a1]"));
        assert!(full.contains("1. Tsinghua University"));
        assert!(full.contains("graph(3)"));
        assert!(full.contains("Graph Mining (Year: 2020 | Venue: Unknown Venue)"));
        assert!(full.contains("- collaborators: N/A"));

        let brief = profile.brief();
        assert!(brief.starts_with("ID:a1"));
        assert!(!brief.contains("works"));
    }

    #[test]
    fn test_char_ratio_counter() {
        let counter = CharRatioCounter::default();
        assert_eq!(counter.count(""), 0);
        assert_eq!(counter.count("abcd"), 1);
        assert_eq!(counter.count("abcde"), 2);
    }

    #[test]
    fn test_error_classification() {
        assert!(LinkError::MissingPaper("p".into()).is_data_error());
        assert!(LinkError::Oracle("timeout".into()).is_oracle_error());
        assert!(LinkError::MalformedResponse("x".into()).is_oracle_error());
        assert!(!LinkError::Storage("disk".into()).is_oracle_error());
    }
}
