//! Authorlink Extractor - Blocking and profile extraction
//!
//! Implements the deterministic half of the pipeline: person-name
//! equivalence, affiliation normalization, candidate blocking over the
//! entity directory, and cached entity profiles built from publication
//! histories. Also hosts offline evaluation metrics.

pub mod cache;
pub mod candidates;
pub mod metrics;
pub mod names;
pub mod org;
pub mod profile;

pub use cache::{CacheStats, CacheStatsReport, ProfileCache};
pub use candidates::{CandidateGenerator, CandidateSet};
pub use metrics::{Evaluation, Evaluator, GroundTruth, Mismatch, ResolutionMetrics};
pub use names::{equivalent, NormalizedName};
pub use profile::ProfileBuilder;
