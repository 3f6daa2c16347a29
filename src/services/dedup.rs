//! Deduplication engine for merging result sets from multiple queries.
//!
//! Two layers must both hold: this in-memory filter spans every query within
//! one search stage, and the store's insert-by-primary-key idempotence spans
//! runs.

use std::collections::HashSet;

use crate::models::Paper;

/// Normalized title key: lower-case, alphanumeric only, truncated to 60
/// characters.
pub fn title_key(title: &str) -> String {
    title
        .to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .take(60)
        .collect()
}

/// Cross-query seen-sets carried across a whole search stage.
#[derive(Debug, Default)]
pub struct DedupFilter {
    seen_dois: HashSet<String>,
    seen_titles: HashSet<String>,
}

impl DedupFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop papers whose DOI or title key was already seen; record the
    /// survivors. First-encountered wins.
    pub fn filter(&mut self, papers: Vec<Paper>) -> Vec<Paper> {
        let mut unique = Vec::with_capacity(papers.len());
        for paper in papers {
            let doi = paper
                .doi
                .as_deref()
                .map(|d| d.trim().to_lowercase())
                .filter(|d| !d.is_empty());
            let key = title_key(&paper.title);

            if let Some(doi) = &doi {
                if self.seen_dois.contains(doi) {
                    continue;
                }
            }
            if self.seen_titles.contains(&key) {
                continue;
            }

            if let Some(doi) = doi {
                self.seen_dois.insert(doi);
            }
            self.seen_titles.insert(key);
            unique.push(paper);
        }
        unique
    }
}
