//! Relevance scoring: semantic closeness of each included paper to the
//! research question, with a keyword-overlap fallback when no embeddings
//! exist.

use anyhow::Result;
use serde_json::json;
use std::collections::HashSet;

use crate::config::ReviewConfig;
use crate::models::Paper;
use crate::progress::ProgressSink;
use crate::remote::EmbeddingClient;
use crate::storage::{PaperFilter, PaperStore};

const STOPWORDS: &[&str] = &[
    "the", "a", "an", "and", "or", "of", "in", "to", "for", "is", "are", "was", "were", "be",
    "been", "being", "that", "this", "which", "with", "by", "from", "as",
];

pub struct RelevanceScorer<'a> {
    store: &'a PaperStore,
    embeddings: &'a dyn EmbeddingClient,
    config: &'a ReviewConfig,
    progress: &'a dyn ProgressSink,
}

impl<'a> RelevanceScorer<'a> {
    pub fn new(
        store: &'a PaperStore,
        embeddings: &'a dyn EmbeddingClient,
        config: &'a ReviewConfig,
        progress: &'a dyn ProgressSink,
    ) -> Self {
        Self {
            store,
            embeddings,
            config,
            progress,
        }
    }

    /// Score every included paper 0-100. Uses cosine similarity against the
    /// embedded research question when stored vectors exist, otherwise the
    /// keyword fallback. Returns the number of papers scored.
    pub fn run(&self) -> Result<usize> {
        let papers = self.store.list_papers(&PaperFilter::included())?;
        if papers.is_empty() {
            return Ok(0);
        }

        let stored = self.store.load_embeddings()?;
        if stored.is_empty() {
            self.progress
                .log("Relevance: no embeddings stored, using keyword fallback.");
            return self.keyword_score(&papers);
        }

        self.progress.log("Relevance: embedding research question.");
        let question = vec![self.config.research_question.clone()];
        let question_vec = match self
            .embeddings
            .embed(&question, &self.config.settings.embedding_model)
        {
            Ok(mut vectors) if !vectors.is_empty() => vectors.remove(0),
            _ => {
                self.progress
                    .log("Relevance: question embedding failed, using keyword fallback.");
                return self.keyword_score(&papers);
            }
        };
        let question_unit = normalize(&question_vec);

        let floor = self.config.settings.similarity_floor;
        let span = self.config.settings.similarity_span;
        let mut scored = 0;
        for paper in &papers {
            let Some(vector) = stored.get(&paper.id) else {
                continue;
            };
            let sim = dot(&question_unit, &normalize(vector)) as f64;
            let score = (((sim - floor) / span) * 100.0).clamp(0.0, 100.0);
            self.store.set_relevance(&paper.id, round1(score))?;
            scored += 1;
        }

        self.store.append_event(
            "RELEVANCE_SCORING",
            &format!("Scored {scored}/{} papers by semantic similarity", papers.len()),
            json!({ "scored": scored }),
        )?;
        self.progress
            .log(&format!("Relevance: scored {scored} papers."));
        Ok(scored)
    }

    fn keyword_score(&self, papers: &[Paper]) -> Result<usize> {
        let question_tokens = tokenize(&self.config.research_question);
        for paper in papers {
            let text = format!(
                "{} {}",
                paper.title,
                paper.abstract_text.as_deref().unwrap_or("")
            );
            let paper_tokens = tokenize(&text);
            let overlap = question_tokens.intersection(&paper_tokens).count() as f64;
            let score = (150.0 * overlap / question_tokens.len().max(1) as f64).min(100.0);
            self.store.set_relevance(&paper.id, round1(score))?;
        }
        self.store.append_event(
            "RELEVANCE_SCORING",
            &format!("Scored {} papers by keyword overlap", papers.len()),
            json!({ "scored": papers.len(), "method": "keyword" }),
        )?;
        Ok(papers.len())
    }
}

/// Lower-case, strip punctuation, drop stop-words and short tokens.
fn tokenize(text: &str) -> HashSet<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.len() > 2 && !STOPWORDS.contains(w))
        .map(|w| w.to_string())
        .collect()
}

pub(crate) fn normalize(vector: &[f32]) -> Vec<f32> {
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt() + 1e-9;
    vector.iter().map(|v| v / norm).collect()
}

pub(crate) fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
