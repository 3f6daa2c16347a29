pub mod paper;
pub mod synthesis;

pub use paper::{
    derive_paper_id, CatalogSource, FinalStatus, HumanDecision, Paper, QualityFlag, QualityState,
    ScreeningDecision, ScreeningState,
};
pub use synthesis::{ClusterSummary, GeneratedQuery, PipelineEvent, StatusCounts, SynthesisResult};
