//! Snowball expansion: iterative citation-graph rounds with a principled
//! stopping rule.
//!
//! Rounds are strictly sequential; each depends on the prior round's
//! inclusion results. Candidate screening is delegated to the screening
//! engine.

use anyhow::Result;
use serde_json::json;
use std::collections::HashSet;
use tracing::warn;

use crate::config::ReviewConfig;
use crate::models::{CatalogSource, Paper};
use crate::progress::ProgressSink;
use crate::remote::{CatalogClient, CompletionClient};
use crate::services::screening::ScreeningEngine;
use crate::storage::{PaperFilter, PaperStore};

/// Why a snowball run stopped, in evaluation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    RoundCapReached,
    NoCandidates,
    NoNewInclusions,
    YieldBelowFloor,
    TargetSizeExceeded,
    /// No included papers existed at entry.
    NothingToExpand,
}

/// Summary of a completed snowball run.
#[derive(Debug, Clone)]
pub struct SnowballOutcome {
    pub rounds_run: usize,
    pub total_new_included: u64,
    pub stop_reason: StopReason,
}

pub struct SnowballController<'a> {
    store: &'a PaperStore,
    completion: &'a dyn CompletionClient,
    catalog: &'a dyn CatalogClient,
    config: &'a ReviewConfig,
    progress: &'a dyn ProgressSink,
}

impl<'a> SnowballController<'a> {
    pub fn new(
        store: &'a PaperStore,
        completion: &'a dyn CompletionClient,
        catalog: &'a dyn CatalogClient,
        config: &'a ReviewConfig,
        progress: &'a dyn ProgressSink,
    ) -> Self {
        Self {
            store,
            completion,
            catalog,
            config,
            progress,
        }
    }

    /// Run up to `max_snowball_rounds` rounds. Performs at least one round
    /// when any included paper exists at entry.
    pub fn run(&self) -> Result<SnowballOutcome> {
        let settings = &self.config.settings;
        let max_rounds = settings.max_snowball_rounds;
        let mut total_new_included: u64 = 0;
        let mut rounds_run = 0;
        let mut stop_reason = StopReason::RoundCapReached;

        for round in 1..=max_rounds {
            let included = self.store.list_papers(&PaperFilter::included())?;
            if included.is_empty() {
                self.progress
                    .log("Snowball: no included papers to expand from.");
                stop_reason = StopReason::NothingToExpand;
                break;
            }
            rounds_run = round;
            self.progress
                .log(&format!("Snowball: round {round}/{max_rounds}."));

            let candidates = self.gather_candidates(&included, round)?;
            if candidates.is_empty() {
                self.progress
                    .log(&format!("Snowball: round {round} found no new candidates."));
                self.store.append_event(
                    "SNOWBALLING",
                    &format!("Round {round}: no new candidates"),
                    json!({ "round": round }),
                )?;
                stop_reason = StopReason::NoCandidates;
                break;
            }
            let candidate_count = candidates.len();
            self.progress.log(&format!(
                "Snowball: round {round} screening {candidate_count} candidates."
            ));
            self.store.upsert_papers(&candidates)?;

            // Screen only the newly inserted, previously-unscreened papers.
            let pre = self.store.count_by_status()?;
            let screener =
                ScreeningEngine::new(self.store, self.completion, self.config, self.progress);
            screener.run_pass1()?;
            screener.finalize_included()?;
            let post = self.store.count_by_status()?;

            let new_included = post.included.saturating_sub(pre.included);
            let yield_rate = new_included as f64 / candidate_count as f64;
            total_new_included += new_included;

            self.store.append_event(
                "SNOWBALLING",
                &format!("Round {round}: {candidate_count} candidates, {new_included} included"),
                json!({
                    "round": round,
                    "candidates": candidate_count,
                    "new_included": new_included,
                    "yield_rate": yield_rate,
                }),
            )?;
            self.progress.log(&format!(
                "Snowball: round {round} included {new_included} new papers (yield {:.1}%).",
                yield_rate * 100.0
            ));

            if new_included == 0 {
                stop_reason = StopReason::NoNewInclusions;
                break;
            }
            if yield_rate < settings.min_yield_rate {
                stop_reason = StopReason::YieldBelowFloor;
                break;
            }
            let target_ceiling = (self.config.target_corpus_size as f64 * 1.5) as u64;
            if post.included > target_ceiling {
                stop_reason = StopReason::TargetSizeExceeded;
                break;
            }
        }

        self.progress.log(&format!(
            "Snowball: complete after {rounds_run} rounds, {total_new_included} new papers included."
        ));
        Ok(SnowballOutcome {
            rounds_run,
            total_new_included,
            stop_reason,
        })
    }

    /// Collect citation-graph neighbors of the included set, dropping
    /// anything already known to the store and deduplicating by id.
    /// Lookup failures are logged and skipped.
    fn gather_candidates(&self, included: &[Paper], round: usize) -> Result<Vec<Paper>> {
        let settings = &self.config.settings;
        let direction = self.config.snowball_direction;
        let known = self.store.known_ids()?;
        let found_via = format!("snowball_round_{round}");
        let mut seen: HashSet<String> = HashSet::new();
        let mut candidates: Vec<Paper> = Vec::new();

        for paper in included {
            if candidates.len() >= settings.max_candidates_per_round {
                break;
            }
            let Some(native_id) = self.native_id_for(paper) else {
                continue;
            };

            if direction.includes_backward() {
                match self
                    .catalog
                    .references(&native_id, settings.citation_lookup_cap)
                {
                    Ok(records) => self.absorb(records, &known, &mut seen, &found_via, &mut candidates),
                    Err(err) => {
                        warn!(paper = %native_id, error = %err, "backward lookup failed");
                        self.progress
                            .log(&format!("Snowball: backward lookup failed for {native_id}."));
                    }
                }
            }
            if direction.includes_forward() {
                match self
                    .catalog
                    .citations(&native_id, settings.citation_lookup_cap)
                {
                    Ok(records) => self.absorb(records, &known, &mut seen, &found_via, &mut candidates),
                    Err(err) => {
                        warn!(paper = %native_id, error = %err, "forward lookup failed");
                        self.progress
                            .log(&format!("Snowball: forward lookup failed for {native_id}."));
                    }
                }
            }
        }
        candidates.truncate(settings.max_candidates_per_round);
        Ok(candidates)
    }

    fn absorb(
        &self,
        records: Vec<crate::remote::CandidateRecord>,
        known: &HashSet<String>,
        seen: &mut HashSet<String>,
        found_via: &str,
        candidates: &mut Vec<Paper>,
    ) {
        for record in records {
            let paper = record.into_paper(self.catalog.source(), found_via);
            if known.contains(&paper.id) || !seen.insert(paper.id.clone()) {
                continue;
            }
            candidates.push(paper);
        }
    }

    fn native_id_for(&self, paper: &Paper) -> Option<String> {
        match self.catalog.source() {
            CatalogSource::OpenAlex => paper.openalex_id.clone(),
            CatalogSource::SemanticScholar => paper.semantic_scholar_id.clone(),
        }
    }
}
