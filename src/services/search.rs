//! Search stage: execute generated queries against the bibliographic
//! catalogs, deduplicate across queries, and ingest survivors.
//!
//! A failing query is logged and skipped; it never aborts the stage.

use anyhow::Result;
use serde_json::json;
use tracing::warn;

use crate::config::ReviewConfig;
use crate::models::{CatalogSource, GeneratedQuery};
use crate::progress::ProgressSink;
use crate::remote::{CatalogClient, SearchRequest};
use crate::services::dedup::DedupFilter;
use crate::storage::PaperStore;

pub struct SearchStage<'a> {
    store: &'a PaperStore,
    config: &'a ReviewConfig,
    progress: &'a dyn ProgressSink,
}

impl<'a> SearchStage<'a> {
    pub fn new(
        store: &'a PaperStore,
        config: &'a ReviewConfig,
        progress: &'a dyn ProgressSink,
    ) -> Self {
        Self {
            store,
            config,
            progress,
        }
    }

    /// Execute every query against its catalog. Returns the number of
    /// unique papers stored.
    pub fn run(
        &self,
        queries: &[GeneratedQuery],
        catalogs: &[&dyn CatalogClient],
    ) -> Result<usize> {
        let mut dedup = DedupFilter::new();
        let mut total_inserted = 0;
        let primary_cap = (self.config.target_corpus_size * 4).max(50);

        for (index, query) in queries.iter().enumerate() {
            let Some(catalog) = catalogs.iter().find(|c| c.source() == query.catalog) else {
                warn!(catalog = query.catalog.as_str(), "no client for catalog");
                continue;
            };
            let limit = match query.catalog {
                CatalogSource::OpenAlex => primary_cap,
                CatalogSource::SemanticScholar => primary_cap / 2,
            };
            let label = format!("{}:{}", query.catalog.as_str(), index + 1);
            self.progress.log(&format!(
                "Search: query {} of {} ({label}): '{}'",
                index + 1,
                queries.len(),
                query.query_text
            ));

            let request = SearchRequest {
                query: query.query_text.clone(),
                year_min: self.config.year_min,
                year_max: self.config.year_max,
                document_types: self.config.document_types.clone(),
                limit,
            };
            let records = match catalog.search(&request) {
                Ok(records) => records,
                Err(err) => {
                    warn!(query = %query.query_text, error = %err, "search query failed");
                    self.progress
                        .log(&format!("Search: query {label} failed: {err}"));
                    continue;
                }
            };

            let found = records.len();
            let papers: Vec<_> = records
                .into_iter()
                .map(|record| {
                    let mut paper = record.into_paper(query.catalog, "search");
                    paper.query_source = Some(label.clone());
                    paper
                })
                .collect();
            let unique = dedup.filter(papers);
            let inserted = self.store.upsert_papers(&unique)?;
            total_inserted += inserted;

            self.store.append_event(
                "SEARCHING",
                &format!("Query {label}: found {found}, {inserted} new after dedup"),
                json!({ "query": query.query_text, "found": found, "inserted": inserted }),
            )?;
        }

        self.store.append_event(
            "SEARCHING",
            &format!("Total unique papers: {total_inserted}"),
            json!({ "total_inserted": total_inserted }),
        )?;
        self.progress.log(&format!(
            "Search: complete. {total_inserted} unique papers stored."
        ));
        Ok(total_inserted)
    }
}
