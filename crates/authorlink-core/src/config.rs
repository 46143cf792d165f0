//! Run configuration
//!
//! Layers, lowest precedence first: built-in defaults, an optional TOML
//! file, then environment variables. The CLI applies its own flag
//! overrides on top before calling [`AppConfig::validate`].

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Everything a run needs, one section per TOML table
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Input dataset locations
    pub data: DataConfig,

    /// Checkpoint and cache locations
    pub output: OutputConfig,

    /// LLM provider configuration
    pub llm: LlmConfig,

    /// Profile construction limits
    pub profile: ProfileConfig,

    /// Decision strategy configuration
    pub decision: DecisionConfig,

    /// Batch runner configuration
    pub runner: RunnerConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Defaults plus environment overrides
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env()?;
        Ok(config)
    }

    /// Read a TOML file; absent tables and keys keep their defaults
    pub fn from_file(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let content = std::fs::read_to_string(&path).map_err(|e| ConfigError::FileReadError {
            path: path.clone(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path,
            message: e.to_string(),
        })
    }

    /// Apply environment overrides on top of a file-loaded config
    pub fn with_env_override(mut self) -> Result<Self, ConfigError> {
        self.apply_env()?;
        Ok(self)
    }

    /// Check cross-field constraints
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=64).contains(&self.runner.max_concurrency) {
            return Err(ConfigError::InvalidValue {
                key: "runner.max_concurrency".to_string(),
                value: self.runner.max_concurrency.to_string(),
            });
        }
        if self.runner.batch_size == 0 {
            return Err(ConfigError::InvalidValue {
                key: "runner.batch_size".to_string(),
                value: "0".to_string(),
            });
        }
        if self.profile.merge_threshold > 100 {
            return Err(ConfigError::InvalidValue {
                key: "profile.merge_threshold".to_string(),
                value: self.profile.merge_threshold.to_string(),
            });
        }
        Ok(())
    }

    fn apply_env(&mut self) -> Result<(), ConfigError> {
        if let Some(provider) = env_var("LLM_PROVIDER") {
            self.llm.provider = provider.parse()?;
        }
        self.llm.openai_api_key = env_var("OPENAI_API_KEY").or(self.llm.openai_api_key.take());
        self.llm.openai_base_url = env_var("OPENAI_BASE_URL").or(self.llm.openai_base_url.take());
        for (name, slot) in [
            ("OLLAMA_URL", &mut self.llm.ollama_url),
            ("LLM_MODEL", &mut self.llm.model),
            ("EMBEDDING_MODEL", &mut self.llm.embedding_model),
            ("LOG_LEVEL", &mut self.logging.level),
        ] {
            if let Some(value) = env_var(name) {
                *slot = value;
            }
        }

        if let Some(value) = parsed_env_var("AUTHORLINK_CONCURRENCY")? {
            self.runner.max_concurrency = value;
        }
        if let Some(value) = parsed_env_var("AUTHORLINK_BATCH_SIZE")? {
            self.runner.batch_size = value;
        }
        Ok(())
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

fn parsed_env_var<T: std::str::FromStr>(name: &str) -> Result<Option<T>, ConfigError> {
    env_var(name)
        .map(|value| {
            value.parse().map_err(|_| ConfigError::InvalidValue {
                key: name.to_string(),
                value,
            })
        })
        .transpose()
}

/// Input dataset locations
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    /// Entity directory (`{id: {name, pubs}}`)
    pub directory_path: PathBuf,

    /// Papers carrying the mentions to resolve
    pub mention_papers_path: PathBuf,

    /// Full publication store backing the directory
    pub publications_path: PathBuf,

    /// Mention list (`["<paper>-<index>", ...]`)
    pub mentions_path: PathBuf,

    /// Ground truth for offline evaluation
    pub ground_truth_path: Option<PathBuf>,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            directory_path: PathBuf::from("dataset/valid/whole_author_profiles.json"),
            mention_papers_path: PathBuf::from("dataset/valid/cna_valid_unass_pub.json"),
            publications_path: PathBuf::from("dataset/valid/whole_author_profiles_pub.json"),
            mentions_path: PathBuf::from("dataset/valid/cna_valid_unass.json"),
            ground_truth_path: None,
        }
    }
}

/// Checkpoint and cache locations
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Append-only task log (JSON lines)
    pub task_log_path: PathBuf,

    /// Result aggregate snapshot
    pub aggregate_path: PathBuf,

    /// Persistent profile cache
    pub profile_cache_path: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            task_log_path: PathBuf::from("output/analysis_log.jsonl"),
            aggregate_path: PathBuf::from("output/result.json"),
            profile_cache_path: PathBuf::from("output/profile_cache.json"),
        }
    }
}

/// Oracle and embedding backend
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub provider: LlmProvider,

    /// Required for the OpenAI-compatible providers
    pub openai_api_key: Option<String>,

    /// Overrides `https://api.openai.com/v1`, e.g. for DeepSeek or Azure
    pub openai_base_url: Option<String>,

    pub ollama_url: String,

    /// Chat model answering grading and decision prompts
    pub model: String,

    /// Used only when semantic ranking is on
    pub embedding_model: String,

    /// Completion cap per oracle call
    pub max_tokens: u32,

    /// Kept at 0.0 so repeated runs agree
    pub temperature: f32,

    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: LlmProvider::OpenAI,
            openai_api_key: None,
            openai_base_url: None,
            ollama_url: "http://localhost:11434".to_string(),
            model: "deepseek-chat".to_string(),
            embedding_model: "text-embedding-3-small".to_string(),
            max_tokens: 1024,
            temperature: 0.0,
            timeout_secs: 120,
        }
    }
}

/// Chat completion backends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    OpenAI,
    Ollama,
    Azure,
}

impl std::str::FromStr for LlmProvider {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "openai" => Ok(Self::OpenAI),
            "ollama" => Ok(Self::Ollama),
            "azure" => Ok(Self::Azure),
            _ => Err(ConfigError::InvalidValue {
                key: "LLM_PROVIDER".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

/// Profile construction limits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfileConfig {
    /// Publications read per entity
    pub max_publications: usize,

    /// Keywords kept, by frequency
    pub top_keywords: usize,

    /// Collaborators kept, by frequency
    pub top_collaborators: usize,

    /// Representative works kept
    pub max_works: usize,

    /// Affiliations kept after merging
    pub max_affiliations: usize,

    /// Similarity (0-100) at which two affiliations merge
    pub merge_threshold: u8,
}

impl Default for ProfileConfig {
    fn default() -> Self {
        Self {
            max_publications: 50,
            top_keywords: 30,
            top_collaborators: 20,
            max_works: 10,
            max_affiliations: 8,
            merge_threshold: 80,
        }
    }
}

/// How the decision strategy is chosen per mention
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyMode {
    /// Always one oracle call over every candidate (baseline)
    Single,
    /// Always coarse filter then deep analysis
    TwoStage,
    /// Two-stage only when the candidate set exceeds the hybrid threshold
    #[default]
    Hybrid,
}

impl std::str::FromStr for StrategyMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "single" | "baseline" => Ok(Self::Single),
            "two_stage" | "twostage" => Ok(Self::TwoStage),
            "hybrid" => Ok(Self::Hybrid),
            _ => Err(ConfigError::InvalidValue {
                key: "decision.mode".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

/// Behavior when no candidate clears the coarse filter
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmptyFilterPolicy {
    /// Resolve to NIL without a deep-analysis call
    #[default]
    Strict,
    /// Run deep analysis over the full candidate set
    Fallback,
}

impl std::str::FromStr for EmptyFilterPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "strict" => Ok(Self::Strict),
            "fallback" => Ok(Self::Fallback),
            _ => Err(ConfigError::InvalidValue {
                key: "decision.empty_filter_policy".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

/// Decision strategy configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DecisionConfig {
    pub mode: StrategyMode,

    /// Candidate count above which hybrid mode uses two stages
    pub hybrid_threshold: usize,

    pub empty_filter_policy: EmptyFilterPolicy,

    /// Lowest coarse tier that qualifies for deep analysis
    pub min_tier: u8,

    /// Characters of the abstract included in the paper context
    pub abstract_excerpt_chars: usize,

    /// Re-rank representative works with the similarity service
    pub semantic_ranking: bool,

    /// Works kept per candidate after semantic ranking
    pub ranked_works: usize,
}

impl Default for DecisionConfig {
    fn default() -> Self {
        Self {
            mode: StrategyMode::Hybrid,
            hybrid_threshold: 3,
            empty_filter_policy: EmptyFilterPolicy::Strict,
            min_tier: 2,
            abstract_excerpt_chars: 200,
            semantic_ranking: false,
            ranked_works: 5,
        }
    }
}

/// What to do with a mention whose processing failed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Leave unlogged so the next run retries it
    #[default]
    Retry,
    /// Log as NIL with the error as rationale
    LogNil,
}

impl std::str::FromStr for FailurePolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "retry" => Ok(Self::Retry),
            "log_nil" => Ok(Self::LogNil),
            _ => Err(ConfigError::InvalidValue {
                key: "runner.failure_policy".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

/// Batch runner configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// Mentions dispatched together before checkpointing
    pub batch_size: usize,

    /// Simultaneous in-flight oracle calls
    pub max_concurrency: usize,

    /// Policy for missing papers, bad author indices and unknown entities
    pub data_error_policy: FailurePolicy,

    /// Policy for oracle failures and malformed responses
    pub oracle_error_policy: FailurePolicy,

    /// Stop after this many pending mentions
    pub limit: Option<usize>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            max_concurrency: 4,
            data_error_policy: FailurePolicy::Retry,
            oracle_error_policy: FailurePolicy::Retry,
            limit: None,
        }
    }
}

/// Tracing output
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Directive for the `authorlink` targets when `RUST_LOG` is unset
    pub level: String,

    /// Emit one JSON object per event
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Cannot read {path}: {source}")]
    FileReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{path} is not valid configuration: {message}")]
    ParseError { path: PathBuf, message: String },

    #[error("{key} cannot be {value:?}")]
    InvalidValue { key: String, value: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.runner.batch_size, 10);
        assert_eq!(config.profile.merge_threshold, 80);
        assert_eq!(config.decision.mode, StrategyMode::Hybrid);
        assert_eq!(config.decision.empty_filter_policy, EmptyFilterPolicy::Strict);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_llm_provider_parse() {
        assert_eq!(
            "openai".parse::<LlmProvider>().unwrap(),
            LlmProvider::OpenAI
        );
        assert_eq!(
            "ollama".parse::<LlmProvider>().unwrap(),
            LlmProvider::Ollama
        );
        assert!("invalid".parse::<LlmProvider>().is_err());
    }

    #[test]
    fn test_mode_and_policy_parse() {
        assert_eq!(
            "two-stage".parse::<StrategyMode>().unwrap(),
            StrategyMode::TwoStage
        );
        assert_eq!(
            "baseline".parse::<StrategyMode>().unwrap(),
            StrategyMode::Single
        );
        assert_eq!(
            "FALLBACK".parse::<EmptyFilterPolicy>().unwrap(),
            EmptyFilterPolicy::Fallback
        );
        assert_eq!(
            "log-nil".parse::<FailurePolicy>().unwrap(),
            FailurePolicy::LogNil
        );
        assert!("sometimes".parse::<FailurePolicy>().is_err());
    }

    #[test]
    fn test_from_file_partial() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[decision]
mode = "two_stage"
empty_filter_policy = "fallback"

[runner]
max_concurrency = 8
"#
        )
        .unwrap();

        let config = AppConfig::from_file(file.path()).unwrap();
        assert_eq!(config.decision.mode, StrategyMode::TwoStage);
        assert_eq!(
            config.decision.empty_filter_policy,
            EmptyFilterPolicy::Fallback
        );
        assert_eq!(config.runner.max_concurrency, 8);
        // Untouched sections keep their defaults
        assert_eq!(config.runner.batch_size, 10);
        assert_eq!(config.profile.top_keywords, 30);
    }

    #[test]
    fn test_validate_rejects_bad_concurrency() {
        let mut config = AppConfig::default();
        config.runner.max_concurrency = 0;
        assert!(config.validate().is_err());
        config.runner.max_concurrency = 65;
        assert!(config.validate().is_err());
    }
}
