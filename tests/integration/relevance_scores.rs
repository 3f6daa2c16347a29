use super::support::{make_paper, FailingEmbeddings, PipelineHarness, ScriptedEmbeddings};
use anyhow::Result;
use litflow::models::FinalStatus;
use litflow::services::RelevanceScorer;
use litflow::storage::PaperStore;
use litflow::SilentProgress;

fn include(store: &PaperStore, id: &str, title: &str) -> Result<()> {
    store.upsert_papers(&[make_paper(id, title)])?;
    store.set_final_status(id, Some(FinalStatus::Included))?;
    Ok(())
}

#[test]
fn keyword_fallback_scores_overlap_and_gives_zero_for_disjoint_text() -> Result<()> {
    let harness = PipelineHarness::new();
    let store = harness.store();
    // Question: "How does quantum error correction scale?" -> 6 tokens.
    let config = harness.config();
    include(&store, "W1", "Quantum error correction")?;
    include(&store, "W2", "Baking sourdough bread")?;

    let embeddings = ScriptedEmbeddings::new(|_| vec![1.0]);
    let scorer = RelevanceScorer::new(&store, &embeddings, &config, &SilentProgress);
    let scored = scorer.run()?;

    assert_eq!(scored, 2);
    // 3 overlapping tokens of 6, scaled by 150: 75.0.
    assert_eq!(store.get_paper("W1")?.unwrap().relevance_score, Some(75.0));
    assert_eq!(store.get_paper("W2")?.unwrap().relevance_score, Some(0.0));
    Ok(())
}

#[test]
fn similarity_band_maps_onto_zero_to_hundred() -> Result<()> {
    let harness = PipelineHarness::new();
    let store = harness.store();
    let config = harness.config();
    include(&store, "aligned", "Paper A")?;
    include(&store, "orthogonal", "Paper B")?;
    include(&store, "diagonal", "Paper C")?;
    store.save_embedding("aligned", &[1.0, 0.0])?;
    store.save_embedding("orthogonal", &[0.0, 1.0])?;
    store.save_embedding("diagonal", &[1.0, 1.0])?;

    let embeddings = ScriptedEmbeddings::new(|_| vec![1.0, 0.0]);
    let scorer = RelevanceScorer::new(&store, &embeddings, &config, &SilentProgress);
    assert_eq!(scorer.run()?, 3);

    // Band [0.3, 1.0]: identical similarity saturates at 100, orthogonal
    // clamps to 0, cos(45°) lands partway up the band.
    assert_eq!(store.get_paper("aligned")?.unwrap().relevance_score, Some(100.0));
    assert_eq!(store.get_paper("orthogonal")?.unwrap().relevance_score, Some(0.0));
    let diagonal = store.get_paper("diagonal")?.unwrap().relevance_score.unwrap();
    assert!((diagonal - 58.2).abs() < 0.5, "got {diagonal}");
    Ok(())
}

#[test]
fn papers_without_stored_vectors_are_skipped() -> Result<()> {
    let harness = PipelineHarness::new();
    let store = harness.store();
    let config = harness.config();
    include(&store, "with-vec", "Paper A")?;
    include(&store, "without-vec", "Paper B")?;
    store.save_embedding("with-vec", &[1.0, 0.0])?;

    let embeddings = ScriptedEmbeddings::new(|_| vec![1.0, 0.0]);
    let scorer = RelevanceScorer::new(&store, &embeddings, &config, &SilentProgress);
    assert_eq!(scorer.run()?, 1);
    assert!(store.get_paper("without-vec")?.unwrap().relevance_score.is_none());
    Ok(())
}

#[test]
fn question_embedding_failure_falls_back_to_keywords() -> Result<()> {
    let harness = PipelineHarness::new();
    let store = harness.store();
    let config = harness.config();
    include(&store, "W1", "Quantum error correction")?;
    store.save_embedding("W1", &[1.0, 0.0])?;

    let scorer = RelevanceScorer::new(&store, &FailingEmbeddings, &config, &SilentProgress);
    assert_eq!(scorer.run()?, 1);
    assert_eq!(store.get_paper("W1")?.unwrap().relevance_score, Some(75.0));
    Ok(())
}
