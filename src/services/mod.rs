pub mod batch;
pub mod clustering;
pub mod dedup;
pub mod quality;
pub mod query;
pub mod relevance;
pub mod screening;
pub mod search;
pub mod snowball;
pub mod synthesis;

pub use batch::BatchExecutor;
pub use dedup::{title_key, DedupFilter};
pub use quality::QualityEngine;
pub use query::QueryFormulator;
pub use relevance::RelevanceScorer;
pub use screening::{ScreeningCounts, ScreeningEngine};
pub use search::SearchStage;
pub use snowball::{SnowballController, SnowballOutcome, StopReason};
pub use synthesis::SynthesisStage;
