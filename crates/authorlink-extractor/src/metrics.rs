//! Resolution quality metrics
//!
//! Scores a result aggregate against ground truth with precision, recall,
//! F1 and NIL-specific rates. Evaluation is offline and never feeds back into
//! resolution.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;

use authorlink_core::{load_json, MentionId, Result, NIL_BUCKET};
use serde::{Deserialize, Serialize};

// ============================================================================
// Ground Truth
// ============================================================================

/// `{name: {entity_id: [paper_id]}}` flattened to paper -> owning entities
#[derive(Debug, Clone, Default)]
pub struct GroundTruth {
    owners: HashMap<String, BTreeSet<String>>,
}

impl GroundTruth {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw: BTreeMap<String, BTreeMap<String, Vec<String>>> = load_json(path)?;
        Ok(Self::from_nested(raw))
    }

    pub fn from_nested(raw: BTreeMap<String, BTreeMap<String, Vec<String>>>) -> Self {
        let mut owners: HashMap<String, BTreeSet<String>> = HashMap::new();
        for entities in raw.into_values() {
            for (entity_id, papers) in entities {
                for paper_id in papers {
                    owners.entry(paper_id).or_default().insert(entity_id.clone());
                }
            }
        }
        Self { owners }
    }

    /// Entities that own `paper_id`; empty means the paper's mention is NIL
    pub fn owners(&self, paper_id: &str) -> Option<&BTreeSet<String>> {
        self.owners.get(paper_id)
    }

    pub fn paper_count(&self) -> usize {
        self.owners.len()
    }
}

// ============================================================================
// Resolution Metrics
// ============================================================================

/// Counters behind the resolution quality report
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResolutionMetrics {
    /// Mentions present in the predictions
    pub predicted: usize,
    /// Predictions that match ground truth
    pub correct: usize,
    /// Mentions in the task list; recall denominator when known
    pub total_mentions: Option<usize>,
    /// Predictions in the NIL bucket
    pub predicted_nil: usize,
    /// Predicted mentions whose paper has no ground-truth owner
    pub truth_nil: usize,
    /// Truth NIL and predicted NIL
    pub nil_correct: usize,
    /// Truth entity but predicted NIL
    pub nil_false_positives: usize,
}

impl ResolutionMetrics {
    /// Correct / predicted
    pub fn precision(&self) -> f64 {
        ratio(self.correct, self.predicted)
    }

    /// Correct / total mentions, falling back to predicted when no total is set
    pub fn recall(&self) -> f64 {
        ratio(self.correct, self.total_mentions.unwrap_or(self.predicted))
    }

    /// Harmonic mean of precision and recall
    pub fn f1_score(&self) -> f64 {
        let p = self.precision();
        let r = self.recall();
        if p + r == 0.0 {
            0.0
        } else {
            2.0 * p * r / (p + r)
        }
    }

    pub fn nil_recall(&self) -> f64 {
        ratio(self.nil_correct, self.truth_nil)
    }

    pub fn nil_false_positive_rate(&self) -> f64 {
        ratio(self.nil_false_positives, self.predicted_nil)
    }

    /// Human-readable summary
    pub fn report(&self) -> String {
        let total = self
            .total_mentions
            .map(|t| t.to_string())
            .unwrap_or_else(|| "n/a".to_string());
        format!(
            "=== Resolution Quality Report ===\n\n\
             Predicted: {} | Correct: {} | Total mentions: {}\n\
               Precision: {:.2}%\n\
               Recall:    {:.2}%\n\
               F1 Score:  {:.4}\n\n\
             NIL:\n\
               Predicted NIL: {} | Truth NIL: {} | Correct NIL: {}\n\
               NIL recall:              {:.2}%\n\
               NIL false-positive rate: {:.2}%\n",
            self.predicted,
            self.correct,
            total,
            self.precision() * 100.0,
            self.recall() * 100.0,
            self.f1_score(),
            self.predicted_nil,
            self.truth_nil,
            self.nil_correct,
            self.nil_recall() * 100.0,
            self.nil_false_positive_rate() * 100.0,
        )
    }
}

fn ratio(numerator: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

/// A prediction that disagrees with ground truth
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mismatch {
    pub mention_id: String,
    pub predicted: String,
    /// Ground-truth owners of the paper; empty for NIL
    pub expected: Vec<String>,
}

/// Metrics plus the individual mismatches
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Evaluation {
    pub metrics: ResolutionMetrics,
    pub mismatches: Vec<Mismatch>,
}

// ============================================================================
// Evaluator
// ============================================================================

/// Evaluator for result aggregates
#[derive(Debug, Clone)]
pub struct Evaluator {
    ground_truth: GroundTruth,
    total_mentions: Option<usize>,
}

impl Evaluator {
    pub fn new(ground_truth: GroundTruth) -> Self {
        Self {
            ground_truth,
            total_mentions: None,
        }
    }

    /// Use the full task-list size as the recall denominator
    pub fn with_total(mut self, total: usize) -> Self {
        self.total_mentions = Some(total);
        self
    }

    /// Score `{bucket: [mention_id]}` predictions
    pub fn evaluate<'a, I, M>(&self, predictions: I) -> Evaluation
    where
        I: IntoIterator<Item = (&'a String, M)>,
        M: IntoIterator<Item = &'a String>,
    {
        let mut evaluation = Evaluation {
            metrics: ResolutionMetrics {
                total_mentions: self.total_mentions,
                ..Default::default()
            },
            mismatches: Vec::new(),
        };
        let metrics = &mut evaluation.metrics;

        for (bucket, mentions) in predictions {
            let predicted_nil = bucket == NIL_BUCKET;
            for mention in mentions {
                metrics.predicted += 1;

                let paper_id = mention
                    .parse::<MentionId>()
                    .map(|m| m.paper_id().to_string())
                    .unwrap_or_else(|_| mention.clone());
                let owners = self.ground_truth.owners(&paper_id);
                let truth_nil = owners.map_or(true, BTreeSet::is_empty);

                if truth_nil {
                    metrics.truth_nil += 1;
                }

                let correct = if predicted_nil {
                    metrics.predicted_nil += 1;
                    if truth_nil {
                        metrics.nil_correct += 1;
                    } else {
                        metrics.nil_false_positives += 1;
                    }
                    truth_nil
                } else {
                    owners.is_some_and(|o| o.contains(bucket))
                };

                if correct {
                    metrics.correct += 1;
                } else {
                    evaluation.mismatches.push(Mismatch {
                        mention_id: mention.clone(),
                        predicted: bucket.clone(),
                        expected: owners
                            .map(|o| o.iter().cloned().collect())
                            .unwrap_or_default(),
                    });
                }
            }
        }

        evaluation
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ground_truth() -> GroundTruth {
        let raw: BTreeMap<String, BTreeMap<String, Vec<String>>> = serde_json::from_str(
            r#"{
                "Jian Li": {"a1": ["p1", "p2"], "a2": ["p3"]},
                "Wei Wang": {"a3": ["p4"]}
            }"#,
        )
        .unwrap();
        GroundTruth::from_nested(raw)
    }

    fn predictions() -> BTreeMap<String, BTreeSet<String>> {
        let mut map: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        let mut put = |bucket: &str, mention: &str| {
            map.entry(bucket.to_string())
                .or_default()
                .insert(mention.to_string());
        };
        put("a1", "p1-0"); // correct
        put("a1", "p3-1"); // wrong entity
        put("a2", "p3-0"); // correct
        put("new_author", "p9-0"); // correct NIL
        put("new_author", "p4-2"); // NIL false positive
        map
    }

    #[test]
    fn test_ground_truth_flattening() {
        let gt = ground_truth();
        assert_eq!(gt.paper_count(), 4);
        assert!(gt.owners("p1").unwrap().contains("a1"));
        assert!(gt.owners("p9").is_none());
    }

    #[test]
    fn test_evaluate_counts() {
        let evaluation = Evaluator::new(ground_truth()).evaluate(&predictions());
        let m = &evaluation.metrics;

        assert_eq!(m.predicted, 5);
        assert_eq!(m.correct, 3);
        assert_eq!(m.predicted_nil, 2);
        assert_eq!(m.truth_nil, 1);
        assert_eq!(m.nil_correct, 1);
        assert_eq!(m.nil_false_positives, 1);
        assert_eq!(evaluation.mismatches.len(), 2);

        assert!((m.precision() - 0.6).abs() < 1e-9);
        // Without a total, recall falls back to the predicted count
        assert!((m.recall() - 0.6).abs() < 1e-9);
        assert!((m.nil_recall() - 1.0).abs() < 1e-9);
        assert!((m.nil_false_positive_rate() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_global_recall_denominator() {
        let evaluation = Evaluator::new(ground_truth())
            .with_total(10)
            .evaluate(&predictions());
        let m = &evaluation.metrics;

        assert!((m.recall() - 0.3).abs() < 1e-9);
        assert!((m.f1_score() - 0.4).abs() < 1e-9);
        assert!(m.report().contains("Total mentions: 10"));
    }

    #[test]
    fn test_empty_predictions() {
        let empty: BTreeMap<String, Vec<String>> = BTreeMap::new();
        let evaluation = Evaluator::new(ground_truth()).evaluate(&empty);
        assert_eq!(evaluation.metrics.precision(), 0.0);
        assert_eq!(evaluation.metrics.f1_score(), 0.0);
    }
}
