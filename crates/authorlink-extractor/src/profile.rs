//! Profile builder
//!
//! Aggregates an entity's publication history into a [`Profile`]: merged
//! affiliations, keyword and collaborator frequencies, representative works.
//! Profiles are cached by entity ID and never rebuilt once cached.

use std::collections::{BTreeMap, HashMap};

use authorlink_core::{
    EntityDirectory, FrequencyEntry, LinkError, Profile, ProfileConfig, PublicationLookup,
    Result, WorkSummary,
};
use tracing::{debug, warn};

use crate::cache::ProfileCache;
use crate::names::NormalizedName;
use crate::org;

/// Builds candidate profiles, consulting the cache first
#[derive(Debug, Clone)]
pub struct ProfileBuilder {
    config: ProfileConfig,
    cache: ProfileCache,
}

impl ProfileBuilder {
    pub fn new(config: ProfileConfig, cache: ProfileCache) -> Self {
        Self { config, cache }
    }

    pub fn cache(&self) -> &ProfileCache {
        &self.cache
    }

    /// Profiles for every candidate, keyed by entity ID.
    ///
    /// Flushes the cache once at the end, and only if a profile was computed.
    pub fn build<'a, I>(
        &self,
        candidate_ids: I,
        directory: &EntityDirectory,
        publications: &dyn PublicationLookup,
    ) -> Result<BTreeMap<String, Profile>>
    where
        I: IntoIterator<Item = &'a String>,
    {
        let mut profiles = BTreeMap::new();
        let mut computed = 0usize;

        for id in candidate_ids {
            if let Some(profile) = self.cache.get(id) {
                profiles.insert(id.clone(), profile);
                continue;
            }

            let profile = self.compute(id, directory, publications)?;
            self.cache.insert(profile.clone());
            profiles.insert(id.clone(), profile);
            computed += 1;
        }

        if computed > 0 {
            debug!(computed, total = profiles.len(), "Built new profiles");
            if let Err(e) = self.cache.flush() {
                warn!(error = %e, "Failed to flush profile cache");
            }
        }

        Ok(profiles)
    }

    /// Profiles for every candidate without storing new ones or flushing
    pub fn preview<'a, I>(
        &self,
        candidate_ids: I,
        directory: &EntityDirectory,
        publications: &dyn PublicationLookup,
    ) -> Result<BTreeMap<String, Profile>>
    where
        I: IntoIterator<Item = &'a String>,
    {
        candidate_ids
            .into_iter()
            .map(|id| -> Result<(String, Profile)> {
                let profile = match self.cache.get(id) {
                    Some(profile) => profile,
                    None => self.compute(id, directory, publications)?,
                };
                Ok((id.clone(), profile))
            })
            .collect()
    }

    /// Derive one profile from the publication store, bypassing the cache
    pub fn compute(
        &self,
        entity_id: &str,
        directory: &EntityDirectory,
        publications: &dyn PublicationLookup,
    ) -> Result<Profile> {
        let entry = directory
            .get(entity_id)
            .ok_or_else(|| LinkError::MissingEntity(entity_id.to_string()))?;
        let own_name = NormalizedName::parse(&entry.name);

        let mut affiliations = Vec::new();
        let mut keywords = FrequencyTable::default();
        let mut collaborators = FrequencyTable::default();
        let mut works = Vec::new();
        let mut publication_count = 0;

        for pub_id in entry.publication_ids.iter().take(self.config.max_publications) {
            let Some(paper) = publications.publication(pub_id) else {
                debug!(entity = entity_id, publication = %pub_id, "Publication not in store");
                continue;
            };
            publication_count += 1;

            for keyword in &paper.keywords {
                keywords.add(keyword);
            }

            for author in &paper.authors {
                if NormalizedName::parse(&author.name).equivalent_to(&own_name) {
                    if let Some(raw) = author.affiliation.as_deref() {
                        let normalized = org::normalize(raw);
                        if !normalized.is_empty() {
                            affiliations.push(normalized);
                        }
                    }
                } else {
                    collaborators.add(&author.name);
                }
            }

            if works.len() < self.config.max_works {
                works.push(WorkSummary {
                    title: paper.title.clone(),
                    year: paper.year,
                    venue: paper.venue.clone().filter(|v| !v.trim().is_empty()),
                    keywords: paper.keywords.clone(),
                });
            }
        }

        let mut affiliations = org::merge(&affiliations, self.config.merge_threshold);
        affiliations.truncate(self.config.max_affiliations);

        Ok(Profile {
            entity_id: entity_id.to_string(),
            name: entry.name.clone(),
            affiliations,
            keywords: keywords.top(self.config.top_keywords),
            collaborators: collaborators.top(self.config.top_collaborators),
            works,
            publication_count,
        })
    }
}

/// Occurrence counts that remember first-seen order for tie-breaking
#[derive(Debug, Default)]
struct FrequencyTable {
    index: HashMap<String, usize>,
    entries: Vec<FrequencyEntry>,
}

impl FrequencyTable {
    fn add(&mut self, raw: &str) {
        let value = raw.trim();
        if value.is_empty() {
            return;
        }
        match self.index.get(value) {
            Some(&i) => self.entries[i].count += 1,
            None => {
                self.index.insert(value.to_string(), self.entries.len());
                self.entries.push(FrequencyEntry {
                    value: value.to_string(),
                    count: 1,
                });
            }
        }
    }

    /// Highest counts first; equal counts keep first-seen order
    fn top(mut self, n: usize) -> Vec<FrequencyEntry> {
        self.entries.sort_by(|a, b| b.count.cmp(&a.count));
        self.entries.truncate(n);
        self.entries
    }
}
