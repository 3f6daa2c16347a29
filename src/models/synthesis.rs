use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Append-only audit log entry written by pipeline components.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineEvent {
    /// Monotonically increasing sequence id assigned by the store.
    pub seq: i64,
    pub stage: String,
    pub message: String,
    #[serde(default)]
    pub details: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

/// One search query produced by query formulation, flattened per catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratedQuery {
    pub catalog: crate::models::CatalogSource,
    pub query_text: String,
    #[serde(default)]
    pub description: String,
}

/// Corpus breakdown by pipeline status.
///
/// `borderline` counts only papers still awaiting a human decision;
/// `unscreened` is the remainder.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub total: u64,
    pub included: u64,
    pub excluded: u64,
    pub borderline: u64,
    pub unscreened: u64,
}

/// Per-cluster labeling output from the synthesis stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterSummary {
    pub cluster_id: i64,
    pub label: String,
    pub paper_count: usize,
    #[serde(default)]
    pub summary: String,
}

/// Singleton synthesis output, entirely replaced on each synthesis run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SynthesisResult {
    pub narrative: serde_json::Value,
    #[serde(default)]
    pub cluster_summaries: Vec<ClusterSummary>,
    /// 2D projection coordinates, empty when projection was unavailable.
    #[serde(default)]
    pub coords_2d: Vec<[f64; 2]>,
    /// Paper ids in the order used for clustering and projection.
    #[serde(default)]
    pub paper_ids: Vec<String>,
    pub paper_count: usize,
}
