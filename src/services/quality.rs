//! Quality assessment: one remote scoring call per included paper.

use anyhow::Result;
use serde_json::json;
use tracing::warn;

use crate::config::ReviewConfig;
use crate::models::{Paper, QualityFlag, QualityState};
use crate::progress::ProgressSink;
use crate::remote::{CompletionClient, CompletionRequest};
use crate::services::batch::BatchExecutor;
use crate::services::screening::truncate_chars;
use crate::storage::{PaperFilter, PaperStore};

const ABSTRACT_CHARS: usize = 800;

pub struct QualityEngine<'a> {
    store: &'a PaperStore,
    client: &'a dyn CompletionClient,
    config: &'a ReviewConfig,
    progress: &'a dyn ProgressSink,
}

impl<'a> QualityEngine<'a> {
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

    /// Assess every INCLUDED paper lacking a quality score. Returns the
    /// number of papers assessed.
    pub fn run(&self) -> Result<usize> {
        let filter = PaperFilter {
            missing_quality: true,
            ..PaperFilter::included()
        };
        let unassessed = self.store.list_papers(&filter)?;
        if unassessed.is_empty() {
            self.progress
                .log("Quality: all included papers already assessed.");
            return Ok(0);
        }
        self.progress.log(&format!(
            "Quality: assessing {} papers ({} workers).",
            unassessed.len(),
            self.config.settings.quality_workers
        ));

        let executor = BatchExecutor::new(self.config.settings.quality_workers);
        let client = self.client;
        let config = self.config;
        let outcomes = executor.run(
            unassessed,
            |paper| assess_paper(client, config, paper),
            |done, total| {
                self.progress
                    .log(&format!("Quality: {done}/{total} papers assessed."));
            },
        )?;

        let assessed = outcomes.len();
        for (id, state) in &outcomes {
            self.store.set_quality(id, state)?;
        }
        self.store.append_event(
            "QUALITY_ASSESSMENT",
            &format!("Assessed {assessed} papers"),
            json!({ "assessed": assessed }),
        )?;
        self.progress
            .log(&format!("Quality: complete. {assessed} papers assessed."));
        Ok(assessed)
    }
}

/// Score one paper. A remote failure degrades to a neutral score rather
/// than aborting the batch.
fn assess_paper(
    client: &dyn CompletionClient,
    config: &ReviewConfig,
    paper: Paper,
) -> (String, QualityState) {
    let request = quality_request(config, &paper);
    let state = match client.complete_json(&request) {
        Ok(response) => QualityState {
            score: response
                .get("quality_score")
                .and_then(|s| s.as_f64())
                .unwrap_or(50.0)
                .clamp(0.0, 100.0),
            notes: response
                .get("quality_notes")
                .and_then(|n| n.as_str())
                .unwrap_or("")
                .to_string(),
            flag: QualityFlag::parse(response.get("flag").and_then(|f| f.as_str()).unwrap_or("")),
        },
        Err(err) => {
            warn!(error = %err, paper = %paper.id, "quality assessment failed");
            QualityState {
                score: 50.0,
                notes: "Assessment failed.".into(),
                flag: QualityFlag::None,
            }
        }
    };
    (paper.id, state)
}

fn quality_request(config: &ReviewConfig, paper: &Paper) -> CompletionRequest {
    let system = "You assess methodological quality for a literature review. \
                  Return JSON: {\"quality_score\": 0-100, \"quality_notes\", \
                  \"flag\": none|low_sample_size|no_control_group|preprint_unreviewed|conflict_of_interest|other}."
        .to_string();
    let user = format!(
        "Research question: {}\nReview type: {}\n\nTitle: {}\nAbstract: {}\nYear: {}\n\
         Venue: {}\nCitations: {}\nDocument type: {}",
        config.research_question,
        config.review_type,
        paper.title,
        truncate_chars(paper.abstract_text.as_deref().unwrap_or(""), ABSTRACT_CHARS),
        paper
            .year
            .map(|y| y.to_string())
            .unwrap_or_else(|| "unknown".into()),
        paper.venue.as_deref().unwrap_or("unknown"),
        paper.citation_count.unwrap_or(0),
        paper.document_type.as_deref().unwrap_or("article"),
    );
    CompletionRequest::new(system, user, &config.settings.quality_model)
        .with_temperature(0.2)
        .expecting_json()
}
