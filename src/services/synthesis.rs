//! Synthesis stage: embeddings, clustering, cluster labeling, relevance
//! scoring, 2D projection, and the overall narrative.
//!
//! The synthesis record is a singleton, replaced wholesale on each run.

use anyhow::Result;
use serde_json::json;
use tracing::warn;

use crate::config::ReviewConfig;
use crate::models::{ClusterSummary, Paper, SynthesisResult};
use crate::progress::ProgressSink;
use crate::remote::{CompletionClient, CompletionRequest, EmbeddingClient};
use crate::services::clustering::{assign_clusters, project_2d, NOISE_CLUSTER, NOISE_LABEL};
use crate::services::relevance::RelevanceScorer;
use crate::services::screening::truncate_chars;
use crate::storage::{PaperFilter, PaperStore};

const EMBED_CHARS: usize = 400;
const LABEL_ABSTRACT_CHARS: usize = 300;
/// At most this many member papers feed one cluster-labeling call.
const LABEL_SAMPLE: usize = 15;

pub struct SynthesisStage<'a> {
    store: &'a PaperStore,
    completion: &'a dyn CompletionClient,
    embeddings: &'a dyn EmbeddingClient,
    config: &'a ReviewConfig,
    progress: &'a dyn ProgressSink,
}

impl<'a> SynthesisStage<'a> {
    pub fn new(
        store: &'a PaperStore,
        completion: &'a dyn CompletionClient,
        embeddings: &'a dyn EmbeddingClient,
        config: &'a ReviewConfig,
        progress: &'a dyn ProgressSink,
    ) -> Self {
        Self {
            store,
            completion,
            embeddings,
            config,
            progress,
        }
    }

    pub fn run(&self) -> Result<SynthesisResult> {
        let papers = self.store.list_papers(&PaperFilter::included())?;
        if papers.is_empty() {
            self.progress.log("Synthesis: no included papers.");
            return Ok(SynthesisResult::default());
        }
        self.progress
            .log(&format!("Synthesis: starting for {} papers.", papers.len()));

        let vectors = self.compute_embeddings(&papers)?;

        let cluster_ids = assign_clusters(&vectors, papers.len());
        for (paper, cluster_id) in papers.iter().zip(&cluster_ids) {
            self.store.set_cluster(&paper.id, *cluster_id)?;
        }
        let mut unique: Vec<i64> = cluster_ids
            .iter()
            .copied()
            .filter(|&c| c != NOISE_CLUSTER)
            .collect();
        unique.sort_unstable();
        unique.dedup();
        self.progress
            .log(&format!("Synthesis: {} clusters identified.", unique.len()));

        if !vectors.is_empty() {
            RelevanceScorer::new(self.store, self.embeddings, self.config, self.progress).run()?;
        }

        let coords_2d = if vectors.is_empty() {
            None
        } else {
            project_2d(&vectors)
        };

        let mut cluster_summaries = Vec::new();
        for &cluster_id in &unique {
            let members: Vec<&Paper> = papers
                .iter()
                .zip(&cluster_ids)
                .filter(|(_, &c)| c == cluster_id)
                .map(|(p, _)| p)
                .collect();
            self.progress.log(&format!(
                "Synthesis: labeling cluster {} ({} papers).",
                cluster_id + 1,
                members.len()
            ));
            let (label, summary) = self.label_cluster(&members);
            for member in &members {
                self.store.set_cluster_label(&member.id, &label)?;
            }
            cluster_summaries.push(ClusterSummary {
                cluster_id,
                label,
                paper_count: members.len(),
                summary,
            });
        }
        for (paper, &cluster_id) in papers.iter().zip(&cluster_ids) {
            if cluster_id == NOISE_CLUSTER {
                self.store.set_cluster_label(&paper.id, NOISE_LABEL)?;
            }
        }

        self.progress.log("Synthesis: generating overall narrative.");
        let narrative = self.overall_narrative(&papers, &cluster_summaries);

        let result = SynthesisResult {
            narrative,
            cluster_summaries,
            coords_2d: coords_2d.unwrap_or_default(),
            paper_ids: papers.iter().map(|p| p.id.clone()).collect(),
            paper_count: papers.len(),
        };
        self.store.save_synthesis(&result)?;
        self.store.append_event(
            "SYNTHESIS",
            "Synthesis complete",
            json!({ "clusters": unique.len(), "papers": papers.len() }),
        )?;
        self.progress.log("Synthesis: complete.");
        Ok(result)
    }

    /// Embed the included corpus, storing one vector per paper. An embedding
    /// failure degrades to an empty vector set, which skips clustering.
    fn compute_embeddings(&self, papers: &[Paper]) -> Result<Vec<Vec<f32>>> {
        self.progress.log("Synthesis: computing embeddings.");
        let texts: Vec<String> = papers
            .iter()
            .map(|p| {
                format!(
                    "{} {}",
                    p.title,
                    truncate_chars(p.abstract_text.as_deref().unwrap_or(""), EMBED_CHARS)
                )
            })
            .collect();
        match self
            .embeddings
            .embed(&texts, &self.config.settings.embedding_model)
        {
            Ok(vectors) if vectors.len() == papers.len() => {
                for (paper, vector) in papers.iter().zip(&vectors) {
                    self.store.save_embedding(&paper.id, vector)?;
                }
                Ok(vectors)
            }
            Ok(vectors) => {
                warn!(
                    expected = papers.len(),
                    got = vectors.len(),
                    "embedding count mismatch, skipping clustering"
                );
                Ok(Vec::new())
            }
            Err(err) => {
                warn!(error = %err, "embedding failed, skipping clustering");
                self.progress
                    .log("Synthesis: embedding failed, skipping clustering.");
                Ok(Vec::new())
            }
        }
    }

    /// Label and summarize one cluster from up to the first 15 members.
    /// Falls back to a generic label on failure.
    fn label_cluster(&self, members: &[&Paper]) -> (String, String) {
        let papers_text = members
            .iter()
            .take(LABEL_SAMPLE)
            .map(|p| {
                format!(
                    "Title: {}\nAbstract: {}",
                    p.title,
                    truncate_chars(
                        p.abstract_text.as_deref().unwrap_or(""),
                        LABEL_ABSTRACT_CHARS
                    )
                )
            })
            .collect::<Vec<_>>()
            .join("\n\n");
        let request = CompletionRequest::new(
            "You label topic clusters of research papers. Return JSON: {\"label\", \"summary\"}.",
            format!("Papers:\n{papers_text}"),
            &self.config.settings.synthesis_model,
        )
        .with_temperature(0.4)
        .expecting_json();

        match self.completion.complete_json(&request) {
            Ok(response) => (
                response
                    .get("label")
                    .and_then(|l| l.as_str())
                    .unwrap_or("Research cluster")
                    .to_string(),
                response
                    .get("summary")
                    .and_then(|s| s.as_str())
                    .unwrap_or("")
                    .to_string(),
            ),
            Err(err) => {
                warn!(error = %err, "cluster labeling failed");
                ("Research cluster".to_string(), String::new())
            }
        }
    }

    /// Overall narrative over the per-cluster summaries, degrading to a
    /// stub result when the remote call fails.
    fn overall_narrative(
        &self,
        papers: &[Paper],
        summaries: &[ClusterSummary],
    ) -> serde_json::Value {
        let summaries_text = summaries
            .iter()
            .map(|c| format!("## {} ({} papers)\n{}", c.label, c.paper_count, c.summary))
            .collect::<Vec<_>>()
            .join("\n\n");
        let request = CompletionRequest::new(
            "You synthesize literature review findings. Return JSON with keys: \
             narrative_overview, key_themes, consensus_points, key_debates, research_gaps.",
            format!(
                "Research question: {}\nReview type: {}\nPapers: {}\n\nCluster summaries:\n{}",
                self.config.research_question,
                self.config.review_type,
                papers.len(),
                summaries_text,
            ),
            &self.config.settings.synthesis_model,
        )
        .with_temperature(0.5)
        .expecting_json();

        match self.completion.complete_json(&request) {
            Ok(narrative) => narrative,
            Err(err) => {
                warn!(error = %err, "narrative generation failed");
                self.progress
                    .log("Synthesis: narrative generation failed, storing stub.");
                json!({
                    "narrative_overview": "Synthesis generation failed.",
                    "key_themes": [],
                    "consensus_points": [],
                    "key_debates": [],
                    "research_gaps": [],
                })
            }
        }
    }
}
