//! Read-only corpus: entity directory, publication stores and mention lists

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::{DataConfig, DirectoryEntry, LinkError, MentionId, PaperRecord, Result};

/// Entity ID -> directory entry, iterated in ID order
pub type EntityDirectory = BTreeMap<String, DirectoryEntry>;

/// Lookup of publication records by ID
pub trait PublicationLookup: Send + Sync {
    fn publication(&self, id: &str) -> Option<&PaperRecord>;
}

/// In-memory publication store
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PublicationStore {
    records: HashMap<String, PaperRecord>,
}

impl PublicationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        load_json(path)
    }

    pub fn insert(&mut self, id: impl Into<String>, record: PaperRecord) {
        self.records.insert(id.into(), record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl FromIterator<(String, PaperRecord)> for PublicationStore {
    fn from_iter<T: IntoIterator<Item = (String, PaperRecord)>>(iter: T) -> Self {
        Self {
            records: iter.into_iter().collect(),
        }
    }
}

impl PublicationLookup for PublicationStore {
    fn publication(&self, id: &str) -> Option<&PaperRecord> {
        self.records.get(id)
    }
}

/// Everything the pipeline reads but never writes
#[derive(Debug, Clone, Default)]
pub struct Corpus {
    pub directory: EntityDirectory,
    /// Papers carrying the mentions to resolve
    pub papers: PublicationStore,
    /// Publications owned by directory entities
    pub publications: PublicationStore,
}

impl Corpus {
    pub fn new(
        directory: EntityDirectory,
        papers: PublicationStore,
        publications: PublicationStore,
    ) -> Self {
        Self {
            directory,
            papers,
            publications,
        }
    }

    /// Load all stores named by the data configuration
    pub fn load(config: &DataConfig) -> Result<Self> {
        Ok(Self {
            directory: load_json(&config.directory_path)?,
            papers: PublicationStore::load(&config.mention_papers_path)?,
            publications: PublicationStore::load(&config.publications_path)?,
        })
    }

    /// Paper of a mention, preferring the mention-paper store
    pub fn paper(&self, paper_id: &str) -> Result<&PaperRecord> {
        self.papers
            .publication(paper_id)
            .or_else(|| self.publications.publication(paper_id))
            .ok_or_else(|| LinkError::MissingPaper(paper_id.to_string()))
    }
}

/// Parsed mention list plus the raw IDs that could not be parsed
#[derive(Debug, Clone, Default)]
pub struct MentionList {
    pub mentions: Vec<MentionId>,
    pub rejected: Vec<String>,
}

/// Load a JSON array of `<paper>-<index>` identifiers
pub fn load_mentions(path: impl AsRef<Path>) -> Result<MentionList> {
    let raw: Vec<String> = load_json(path)?;
    let mut list = MentionList::default();
    for id in raw {
        match id.parse::<MentionId>() {
            Ok(mention) => list.mentions.push(mention),
            Err(_) => list.rejected.push(id),
        }
    }
    Ok(list)
}

/// Read and deserialize a JSON file
pub fn load_json<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<T> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)
        .map_err(|e| LinkError::Storage(format!("Failed to read {}: {e}", path.display())))?;
    serde_json::from_str(&content)
        .map_err(|e| LinkError::Storage(format!("Failed to parse {}: {e}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PaperAuthor;

    #[test]
    fn test_paper_lookup_prefers_mention_store() {
        let papers: PublicationStore =
            [("p1".to_string(), PaperRecord::new("mention paper"))]
                .into_iter()
                .collect();
        let publications: PublicationStore = [
            ("p1".to_string(), PaperRecord::new("corpus paper")),
            ("p2".to_string(), PaperRecord::new("only in corpus")),
        ]
        .into_iter()
        .collect();
        let corpus = Corpus::new(EntityDirectory::new(), papers, publications);

        assert_eq!(corpus.paper("p1").unwrap().title, "mention paper");
        assert_eq!(corpus.paper("p2").unwrap().title, "only in corpus");
        assert!(matches!(
            corpus.paper("p3"),
            Err(LinkError::MissingPaper(_))
        ));
    }

    #[test]
    fn test_load_mentions_rejects_bad_ids() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mentions.json");
        std::fs::write(&path, r#"["p1-0", "bad", "p-2-1"]"#).unwrap();

        let list = load_mentions(&path).unwrap();
        assert_eq!(list.mentions.len(), 2);
        assert_eq!(list.mentions[1], MentionId::new("p-2", 1));
        assert_eq!(list.rejected, vec!["bad".to_string()]);
    }

    #[test]
    fn test_load_corpus_from_files() {
        let dir = tempfile::tempdir().unwrap();
        let write = |name: &str, body: &str| {
            let path = dir.path().join(name);
            std::fs::write(&path, body).unwrap();
            path
        };

        let config = DataConfig {
            directory_path: write("dir.json", r#"{"a1": {"name": "Jian Li", "pubs": ["w1"]}}"#),
            mention_papers_path: write(
                "papers.json",
                r#"{"p1": {"title": "T", "authors": [{"name": "J. Li"}]}}"#,
            ),
            publications_path: write(
                "pubs.json",
                r#"{"w1": {"title": "W", "year": 2019, "authors": [{"name": "Jian Li", "org": "PKU"}]}}"#,
            ),
            mentions_path: write("mentions.json", r#"["p1-0"]"#),
            ground_truth_path: None,
        };

        let corpus = Corpus::load(&config).unwrap();
        assert_eq!(corpus.directory["a1"].publication_ids, vec!["w1"]);
        assert_eq!(
            corpus.paper("p1").unwrap().authors[0],
            PaperAuthor::new("J. Li")
        );
        assert_eq!(corpus.publications.publication("w1").unwrap().year, Some(2019));
    }

    #[test]
    fn test_load_json_reports_path() {
        let err = load_json::<EntityDirectory>("/nonexistent/dir.json").unwrap_err();
        assert!(err.to_string().contains("/nonexistent/dir.json"));
    }
}
