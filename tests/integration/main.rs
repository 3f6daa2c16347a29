mod support;

mod batch_commit;
mod pipeline_flow;
mod relevance_scores;
mod screening_flow;
