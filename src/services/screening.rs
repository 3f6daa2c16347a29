//! Title/abstract screening: concurrent batched remote calls, then a single
//! sequential commit pass.

use anyhow::Result;
use serde_json::json;
use std::collections::HashSet;
use tracing::warn;

use crate::config::ReviewConfig;
use crate::models::{FinalStatus, HumanDecision, Paper, ScreeningDecision, ScreeningState};
use crate::progress::ProgressSink;
use crate::remote::{CompletionClient, CompletionRequest};
use crate::services::batch::BatchExecutor;
use crate::storage::{PaperFilter, PaperStore};

const ABSTRACT_CHARS: usize = 600;

/// Pass-1 decision counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScreeningCounts {
    pub include: usize,
    pub exclude: usize,
    pub borderline: usize,
}

impl ScreeningCounts {
    pub fn screened(&self) -> usize {
        self.include + self.exclude + self.borderline
    }
}

/// One decision attributed to a submitted paper id.
#[derive(Debug, Clone)]
struct BatchDecision {
    id: String,
    state: ScreeningState,
}

pub struct ScreeningEngine<'a> {
    store: &'a PaperStore,
    client: &'a dyn CompletionClient,
    config: &'a ReviewConfig,
    progress: &'a dyn ProgressSink,
}

impl<'a> ScreeningEngine<'a> {
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

    /// Screen every paper lacking a decision. Idempotent: already-screened
    /// papers are not re-submitted.
    pub fn run_pass1(&self) -> Result<ScreeningCounts> {
        let unscreened = self.store.list_papers(&PaperFilter::unscreened())?;
        if unscreened.is_empty() {
            self.progress.log("Screening: no unscreened papers.");
            return Ok(ScreeningCounts::default());
        }

        let batch_size = self.config.settings.screening_batch_size;
        let paper_total = unscreened.len();
        let mut batches: Vec<Vec<Paper>> = Vec::new();
        let mut iter = unscreened.into_iter().peekable();
        while iter.peek().is_some() {
            batches.push(iter.by_ref().take(batch_size).collect());
        }
        self.progress.log(&format!(
            "Screening: {paper_total} papers in {} batches ({} workers).",
            batches.len(),
            self.config.settings.screening_workers
        ));

        let executor = BatchExecutor::new(self.config.settings.screening_workers);
        let client = self.client;
        let config = self.config;
        let outcomes = executor.run(
            batches,
            |batch| screen_batch(client, config, batch),
            |done, total| {
                self.progress
                    .log(&format!("Screening: {done}/{total} batches complete."));
            },
        )?;

        // Single sequential commit after every worker has finished.
        let mut counts = ScreeningCounts::default();
        for decisions in outcomes {
            for decision in decisions {
                self.store.set_screening(&decision.id, &decision.state)?;
                match decision.state.decision {
                    ScreeningDecision::Include => counts.include += 1,
                    ScreeningDecision::Borderline => counts.borderline += 1,
                    ScreeningDecision::Exclude => {
                        counts.exclude += 1;
                        self.store
                            .set_final_status(&decision.id, Some(FinalStatus::Excluded))?;
                    }
                }
            }
        }

        self.store.append_event(
            "SCREENING_PASS_1",
            "Pass 1 complete",
            json!({
                "include": counts.include,
                "exclude": counts.exclude,
                "borderline": counts.borderline,
            }),
        )?;
        self.progress.log(&format!(
            "Screening complete. Include: {}, Exclude: {}, Borderline: {}",
            counts.include, counts.exclude, counts.borderline
        ));
        Ok(counts)
    }

    /// Mark every paper with decision INCLUDE and no final status as
    /// INCLUDED. Runs regardless of the HITL toggle so non-borderline
    /// inclusions are never blocked on human review.
    pub fn finalize_included(&self) -> Result<usize> {
        let filter = PaperFilter {
            screening: Some(ScreeningDecision::Include),
            ..PaperFilter::default()
        };
        let mut finalized = 0;
        for paper in self.store.list_papers(&filter)? {
            if paper.final_status.is_none() {
                self.store
                    .set_final_status(&paper.id, Some(FinalStatus::Included))?;
                finalized += 1;
            }
        }
        Ok(finalized)
    }

    /// Apply recorded human overrides to borderline papers.
    ///
    /// INCLUDE resets the screening decision and clears final status so the
    /// paper flows through [`Self::finalize_included`]; EXCLUDE sets final
    /// status directly.
    pub fn apply_human_decisions(&self) -> Result<()> {
        let filter = PaperFilter {
            screening: Some(ScreeningDecision::Borderline),
            ..PaperFilter::default()
        };
        for paper in self.store.list_papers(&filter)? {
            match paper.human_decision {
                Some(HumanDecision::Include) => {
                    let state = ScreeningState {
                        decision: ScreeningDecision::Include,
                        reason: "Human override".into(),
                        confidence: paper
                            .screening
                            .as_ref()
                            .map(|s| s.confidence)
                            .unwrap_or(50.0),
                    };
                    self.store.set_screening(&paper.id, &state)?;
                    self.store.set_final_status(&paper.id, None)?;
                }
                Some(HumanDecision::Exclude) => {
                    self.store
                        .set_final_status(&paper.id, Some(FinalStatus::Excluded))?;
                }
                None => {}
            }
        }
        Ok(())
    }
}

/// Screen one batch in a single remote call. Never fails: a remote failure
/// is converted to BORDERLINE decisions for the whole batch.
fn screen_batch(
    client: &dyn CompletionClient,
    config: &ReviewConfig,
    batch: Vec<Paper>,
) -> Vec<BatchDecision> {
    let submitted: HashSet<&str> = batch.iter().map(|p| p.id.as_str()).collect();
    let request = screening_request(config, &batch);

    match client.complete_json(&request) {
        Ok(response) => parse_decisions(&response, &submitted),
        Err(err) => {
            warn!(error = %err, papers = batch.len(), "screening batch failed");
            batch
                .iter()
                .map(|paper| BatchDecision {
                    id: paper.id.clone(),
                    state: ScreeningState {
                        decision: ScreeningDecision::Borderline,
                        reason: "API error".into(),
                        confidence: 50.0,
                    },
                })
                .collect()
        }
    }
}

fn screening_request(config: &ReviewConfig, batch: &[Paper]) -> CompletionRequest {
    let papers_json = serde_json::to_string(
        &batch
            .iter()
            .map(|p| {
                json!({
                    "id": p.id,
                    "title": p.title,
                    "abstract": truncate_chars(p.abstract_text.as_deref().unwrap_or(""), ABSTRACT_CHARS),
                })
            })
            .collect::<Vec<_>>(),
    )
    .unwrap_or_else(|_| "[]".into());

    let system = "You screen papers for a literature review. Return JSON: \
                  {\"decisions\": [{\"id\", \"decision\": INCLUDE|EXCLUDE|BORDERLINE, \
                  \"confidence\": 0-100, \"reason\"}]} with exactly one decision per paper."
        .to_string();
    let user = format!(
        "Research question: {}\nReview type: {}\nStrictness (1-5): {}\n\
         Inclusion criteria: {}\nExclusion criteria: {}\n\nPapers ({}):\n{}",
        config.research_question,
        config.review_type,
        config.strictness,
        config.inclusion_criteria.as_deref().unwrap_or("not specified"),
        config.exclusion_criteria.as_deref().unwrap_or("not specified"),
        batch.len(),
        papers_json,
    );
    CompletionRequest::new(system, user, &config.settings.screening_model)
        .with_temperature(0.1)
        .expecting_json()
}

/// Keep only decisions for submitted ids; coerce unknown labels to
/// BORDERLINE. Shortfall is silent under-coverage by design.
fn parse_decisions(response: &serde_json::Value, submitted: &HashSet<&str>) -> Vec<BatchDecision> {
    let Some(entries) = response.get("decisions").and_then(|d| d.as_array()) else {
        return Vec::new();
    };
    entries
        .iter()
        .filter_map(|entry| {
            let id = entry.get("id")?.as_str()?;
            if !submitted.contains(id) {
                return None;
            }
            let label = entry.get("decision").and_then(|d| d.as_str()).unwrap_or("");
            Some(BatchDecision {
                id: id.to_string(),
                state: ScreeningState {
                    decision: ScreeningDecision::coerce(label),
                    reason: entry
                        .get("reason")
                        .and_then(|r| r.as_str())
                        .unwrap_or("")
                        .to_string(),
                    confidence: entry
                        .get("confidence")
                        .and_then(|c| c.as_f64())
                        .unwrap_or(50.0),
                },
            })
        })
        .collect()
}

pub(crate) fn truncate_chars(text: &str, limit: usize) -> String {
    text.chars().take(limit).collect()
}
