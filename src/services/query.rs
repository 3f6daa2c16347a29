//! Query formulation: turn the research question into per-catalog search
//! queries. Always regenerates; the stored list is replaced wholesale.

use anyhow::{Context, Result};

use crate::config::ReviewConfig;
use crate::models::{CatalogSource, GeneratedQuery};
use crate::progress::ProgressSink;
use crate::remote::{CompletionClient, CompletionRequest};
use crate::storage::PaperStore;

pub struct QueryFormulator<'a> {
    store: &'a PaperStore,
    client: &'a dyn CompletionClient,
    config: &'a ReviewConfig,
    progress: &'a dyn ProgressSink,
}

impl<'a> QueryFormulator<'a> {
    pub fn new(
        store: &'a PaperStore,
        client: &'a dyn CompletionClient,
        config: &'a ReviewConfig,
        progress: &'a dyn ProgressSink,
    ) -> Self {
        Self {
            store,
            client,
            config,
            progress,
        }
    }

    /// Generate and persist the search strategy. Unlike the other stages
    /// this is not idempotent: re-invocation always regenerates.
    pub fn run(&self) -> Result<Vec<GeneratedQuery>> {
        self.progress.log("Query formulation: building search strategy.");
        let response = self
            .client
            .complete_json(&self.request())
            .context("query formulation call failed")?;

        let mut queries = Vec::new();
        collect_queries(&response, "openalex_queries", CatalogSource::OpenAlex, &mut queries);
        collect_queries(
            &response,
            "semantic_scholar_queries",
            CatalogSource::SemanticScholar,
            &mut queries,
        );
        if queries.is_empty() {
            anyhow::bail!("query formulation returned no usable queries");
        }

        self.store.save_queries(&queries)?;
        self.progress.log(&format!(
            "Query formulation: generated {} queries.",
            queries.len()
        ));
        Ok(queries)
    }

    fn request(&self) -> CompletionRequest {
        let system = "You design search strategies for literature reviews. Return JSON: \
                      {\"openalex_queries\": [{\"query\", \"description\"}], \
                      \"semantic_scholar_queries\": [{\"query\", \"description\"}]}."
            .to_string();
        let cfg = self.config;
        let user = format!(
            "Research question: {}\nReview type: {}\nYears: {}-{}\nKeywords: {}\n\
             Document types: {}\nInclusion criteria: {}\nExclusion criteria: {}",
            cfg.research_question,
            cfg.review_type,
            cfg.year_min.map(|y| y.to_string()).unwrap_or_else(|| "any".into()),
            cfg.year_max.map(|y| y.to_string()).unwrap_or_else(|| "any".into()),
            cfg.keywords.as_deref().unwrap_or("none specified"),
            if cfg.document_types.is_empty() {
                "all".to_string()
            } else {
                cfg.document_types.join(", ")
            },
            cfg.inclusion_criteria.as_deref().unwrap_or("not specified"),
            cfg.exclusion_criteria.as_deref().unwrap_or("not specified"),
        );
        CompletionRequest::new(system, user, &cfg.settings.query_model)
            .with_temperature(0.3)
            .expecting_json()
    }
}

fn collect_queries(
    response: &serde_json::Value,
    key: &str,
    catalog: CatalogSource,
    out: &mut Vec<GeneratedQuery>,
) {
    let Some(entries) = response.get(key).and_then(|q| q.as_array()) else {
        return;
    };
    for entry in entries {
        if let Some(query_text) = entry.get("query").and_then(|q| q.as_str()) {
            out.push(GeneratedQuery {
                catalog,
                query_text: query_text.to_string(),
                description: entry
                    .get("description")
                    .and_then(|d| d.as_str())
                    .unwrap_or("")
                    .to_string(),
            });
        }
    }
}
