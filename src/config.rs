//! Review configuration and pipeline tuning knobs.
//!
//! A [`ReviewConfig`] is created once per session and drives every stage.
//! It is replaced wholesale on re-submission, never partially mutated by
//! agents. All tuning parameters live in [`PipelineSettings`] with named,
//! validated fields; defaults are resolved at construction.

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

/// Which citation directions snowballing follows.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SnowballDirection {
    Backward,
    Forward,
    #[default]
    Both,
}

impl SnowballDirection {
    pub fn includes_backward(&self) -> bool {
        matches!(self, Self::Backward | Self::Both)
    }

    pub fn includes_forward(&self) -> bool {
        matches!(self, Self::Forward | Self::Both)
    }
}

/// Immutable-per-run parameter set for one review session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewConfig {
    pub research_question: String,
    #[serde(default = "default_review_type")]
    pub review_type: String,
    #[serde(default)]
    pub inclusion_criteria: Option<String>,
    #[serde(default)]
    pub exclusion_criteria: Option<String>,
    #[serde(default)]
    pub keywords: Option<String>,
    #[serde(default)]
    pub year_min: Option<i32>,
    #[serde(default)]
    pub year_max: Option<i32>,
    #[serde(default)]
    pub document_types: Vec<String>,
    /// Screening strictness on a 1–5 scale.
    #[serde(default = "default_strictness")]
    pub strictness: u8,
    #[serde(default = "default_target_corpus_size")]
    pub target_corpus_size: usize,
    #[serde(default)]
    pub snowball_direction: SnowballDirection,
    /// Whether borderline papers pause the pipeline for human review.
    #[serde(default)]
    pub hitl_enabled: bool,
    #[serde(default)]
    pub settings: PipelineSettings,
}

impl ReviewConfig {
    pub fn new(research_question: impl Into<String>) -> Self {
        Self {
            research_question: research_question.into(),
            review_type: default_review_type(),
            inclusion_criteria: None,
            exclusion_criteria: None,
            keywords: None,
            year_min: None,
            year_max: None,
            document_types: Vec::new(),
            strictness: default_strictness(),
            target_corpus_size: default_target_corpus_size(),
            snowball_direction: SnowballDirection::default(),
            hitl_enabled: false,
            settings: PipelineSettings::default(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.research_question.trim().is_empty() {
            bail!("review configuration has no research question");
        }
        if self.target_corpus_size == 0 {
            bail!("target corpus size must be positive");
        }
        if !(1..=5).contains(&self.strictness) {
            bail!("strictness must be between 1 and 5");
        }
        if let (Some(lo), Some(hi)) = (self.year_min, self.year_max) {
            if lo > hi {
                bail!("year_min {lo} is after year_max {hi}");
            }
        }
        self.settings.validate()
    }
}

/// Tuning parameters with sensible defaults, overridable per run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSettings {
    /// Papers per screening call.
    #[serde(default = "default_screening_batch_size")]
    pub screening_batch_size: usize,
    /// Concurrent remote calls during screening.
    #[serde(default = "default_screening_workers")]
    pub screening_workers: usize,
    /// Concurrent remote calls during quality assessment.
    #[serde(default = "default_quality_workers")]
    pub quality_workers: usize,
    #[serde(default = "default_max_snowball_rounds")]
    pub max_snowball_rounds: usize,
    /// Minimum `new_included / candidates` ratio to keep snowballing.
    #[serde(default = "default_min_yield_rate")]
    pub min_yield_rate: f64,
    /// Candidate ceiling gathered in a single snowball round.
    #[serde(default = "default_max_candidates_per_round")]
    pub max_candidates_per_round: usize,
    /// Per-document citation lookup cap.
    #[serde(default = "default_citation_lookup_cap")]
    pub citation_lookup_cap: usize,
    /// Lower bound of the similarity band mapped onto relevance 0.
    /// A calibration choice for the embedding space, not a guarantee.
    #[serde(default = "default_similarity_floor")]
    pub similarity_floor: f64,
    /// Width of the similarity band mapped onto relevance 0–100.
    #[serde(default = "default_similarity_span")]
    pub similarity_span: f64,
    #[serde(default = "default_query_model")]
    pub query_model: String,
    #[serde(default = "default_screening_model")]
    pub screening_model: String,
    #[serde(default = "default_quality_model")]
    pub quality_model: String,
    #[serde(default = "default_synthesis_model")]
    pub synthesis_model: String,
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,
}

impl PipelineSettings {
    pub fn validate(&self) -> Result<()> {
        if self.screening_batch_size == 0 {
            bail!("screening batch size must be positive");
        }
        if self.screening_workers == 0 || self.quality_workers == 0 {
            bail!("worker pool width must be positive");
        }
        if !(0.0..=1.0).contains(&self.min_yield_rate) {
            bail!("min yield rate must be within [0, 1]");
        }
        if self.similarity_span <= 0.0 {
            bail!("similarity span must be positive");
        }
        Ok(())
    }
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            screening_batch_size: default_screening_batch_size(),
            screening_workers: default_screening_workers(),
            quality_workers: default_quality_workers(),
            max_snowball_rounds: default_max_snowball_rounds(),
            min_yield_rate: default_min_yield_rate(),
            max_candidates_per_round: default_max_candidates_per_round(),
            citation_lookup_cap: default_citation_lookup_cap(),
            similarity_floor: default_similarity_floor(),
            similarity_span: default_similarity_span(),
            query_model: default_query_model(),
            screening_model: default_screening_model(),
            quality_model: default_quality_model(),
            synthesis_model: default_synthesis_model(),
            embedding_model: default_embedding_model(),
        }
    }
}

const fn default_strictness() -> u8 {
    3
}

const fn default_target_corpus_size() -> usize {
    50
}

const fn default_screening_batch_size() -> usize {
    20
}

const fn default_screening_workers() -> usize {
    12
}

const fn default_quality_workers() -> usize {
    8
}

const fn default_max_snowball_rounds() -> usize {
    3
}

const fn default_min_yield_rate() -> f64 {
    0.02
}

const fn default_max_candidates_per_round() -> usize {
    2000
}

const fn default_citation_lookup_cap() -> usize {
    100
}

const fn default_similarity_floor() -> f64 {
    0.3
}

const fn default_similarity_span() -> f64 {
    0.7
}

fn default_review_type() -> String {
    "systematic review".into()
}

fn default_query_model() -> String {
    "gpt-4o".into()
}

fn default_screening_model() -> String {
    "gpt-4o-mini".into()
}

fn default_quality_model() -> String {
    "gpt-4o".into()
}

fn default_synthesis_model() -> String {
    "gpt-4o".into()
}

fn default_embedding_model() -> String {
    "text-embedding-3-small".into()
}
