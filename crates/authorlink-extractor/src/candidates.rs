//! Candidate generation (blocking)
//!
//! Scans the entity directory for entries whose recorded name is equivalent
//! to the mention's author name. All matches are returned with equal standing.

use std::collections::BTreeSet;

use authorlink_core::{EntityDirectory, MentionId, PaperRecord, Result};
use tracing::debug;

use crate::names::NormalizedName;

/// Entity IDs that may own a mention, in ID order
pub type CandidateSet = BTreeSet<String>;

/// Blocking over a pre-normalized directory
#[derive(Debug, Clone, Default)]
pub struct CandidateGenerator {
    entries: Vec<(String, NormalizedName)>,
}

impl CandidateGenerator {
    pub fn new(directory: &EntityDirectory) -> Self {
        let entries = directory
            .iter()
            .map(|(id, entry)| (id.clone(), NormalizedName::parse(&entry.name)))
            .collect();
        Self { entries }
    }

    /// Candidates for the author slot referenced by `mention`.
    ///
    /// Fails with `OutOfRange` when the index is past the paper's author list.
    pub fn generate(&self, mention: &MentionId, paper: &PaperRecord) -> Result<CandidateSet> {
        let author = paper.author(mention.paper_id(), mention.author_index())?;
        let candidates = self.candidates_for_name(&author.name);
        debug!(
            mention = %mention,
            name = %author.name,
            candidates = candidates.len(),
            "Generated candidates"
        );
        Ok(candidates)
    }

    /// Directory entries whose name is equivalent to `name`
    pub fn candidates_for_name(&self, name: &str) -> CandidateSet {
        let target = NormalizedName::parse(name);
        self.entries
            .iter()
            .filter(|(_, entry_name)| entry_name.equivalent_to(&target))
            .map(|(id, _)| id.clone())
            .collect()
    }

    pub fn directory_size(&self) -> usize {
        self.entries.len()
    }
}

/// One-shot blocking without reusing a normalized directory
pub fn generate(
    mention: &MentionId,
    paper: &PaperRecord,
    directory: &EntityDirectory,
) -> Result<CandidateSet> {
    CandidateGenerator::new(directory).generate(mention, paper)
}

#[cfg(test)]
mod tests {
    use super::*;
    use authorlink_core::{DirectoryEntry, LinkError, PaperAuthor};

    fn directory() -> EntityDirectory {
        [
            ("a1", "Jian Li"),
            ("a2", "Li Jian"),
            ("a3", "J. Li"),
            ("a4", "Wei Wang"),
            ("a5", "Jian Li Wang"),
        ]
        .into_iter()
        .map(|(id, name)| (id.to_string(), DirectoryEntry::new(name, Vec::<String>::new())))
        .collect()
    }

    fn paper() -> PaperRecord {
        PaperRecord::new("Graph Mining")
            .with_author(PaperAuthor::new("Wei Wang"))
            .with_author(PaperAuthor::new("Jian Li"))
    }

    #[test]
    fn test_generate_returns_all_equivalent_entries() {
        let generator = CandidateGenerator::new(&directory());
        let candidates = generator
            .generate(&MentionId::new("p1", 1), &paper())
            .unwrap();
        let expected: CandidateSet = ["a1", "a2", "a3"].iter().map(|s| s.to_string()).collect();
        assert_eq!(candidates, expected);
    }

    #[test]
    fn test_generate_out_of_range() {
        let err = generate(&MentionId::new("p1", 5), &paper(), &directory()).unwrap_err();
        assert!(matches!(err, LinkError::OutOfRange { index: 5, authors: 2, .. }));
    }

    #[test]
    fn test_empty_directory_yields_empty_set() {
        let candidates =
            generate(&MentionId::new("p1", 0), &paper(), &EntityDirectory::new()).unwrap();
        assert!(candidates.is_empty());
    }

    #[test]
    fn test_unnamed_author_matches_nothing() {
        let paper = PaperRecord::new("t").with_author(PaperAuthor::new(""));
        let candidates = generate(&MentionId::new("p1", 0), &paper, &directory()).unwrap();
        assert!(candidates.is_empty());
    }
}
