use super::support::{make_paper, submitted_papers, PipelineHarness, ScriptedCompletion};
use anyhow::Result;
use litflow::models::{FinalStatus, HumanDecision, ScreeningDecision};
use litflow::services::ScreeningEngine;
use litflow::storage::PaperFilter;
use litflow::SilentProgress;

#[test]
fn failed_batch_marks_all_papers_borderline() -> Result<()> {
    let harness = PipelineHarness::new();
    let store = harness.store();
    let config = harness.config();
    let papers: Vec<_> = (0..20)
        .map(|i| make_paper(&format!("W{i}"), &format!("Ambiguous paper {i}")))
        .collect();
    store.upsert_papers(&papers)?;

    let client = ScriptedCompletion::failing();
    let engine = ScreeningEngine::new(&store, &client, &config, &SilentProgress);
    let counts = engine.run_pass1()?;

    assert_eq!(counts.borderline, 20);
    assert_eq!(counts.include + counts.exclude, 0);
    for paper in store.list_papers(&PaperFilter::default())? {
        let screening = paper.screening.expect("decision recorded");
        assert_eq!(screening.decision, ScreeningDecision::Borderline);
        assert_eq!(screening.confidence, 50.0);
        assert_eq!(screening.reason, "API error");
    }
    Ok(())
}

#[test]
fn exclude_sets_final_status_and_finalize_marks_includes() -> Result<()> {
    let harness = PipelineHarness::new();
    let store = harness.store();
    let config = harness.config();
    store.upsert_papers(&[
        make_paper("W1", "Quantum codes at scale"),
        make_paper("W2", "Cooking with cast iron"),
        make_paper("W3", "Something tangential"),
    ])?;

    let client = ScriptedCompletion::keyword_screener();
    let engine = ScreeningEngine::new(&store, &client, &config, &SilentProgress);
    let counts = engine.run_pass1()?;
    assert_eq!((counts.include, counts.exclude, counts.borderline), (1, 1, 1));

    // EXCLUDE is finalized during commit, INCLUDE only by the finalize pass.
    assert_eq!(
        store.get_paper("W2")?.unwrap().final_status,
        Some(FinalStatus::Excluded)
    );
    assert_eq!(store.get_paper("W1")?.unwrap().final_status, None);

    engine.finalize_included()?;
    assert_eq!(
        store.get_paper("W1")?.unwrap().final_status,
        Some(FinalStatus::Included)
    );
    assert_eq!(store.get_paper("W3")?.unwrap().final_status, None);
    Ok(())
}

#[test]
fn unknown_labels_coerce_and_foreign_ids_are_ignored() -> Result<()> {
    let harness = PipelineHarness::new();
    let store = harness.store();
    let config = harness.config();
    store.upsert_papers(&[make_paper("W1", "Some paper")])?;

    let client = ScriptedCompletion::new(|request| {
        let ids: Vec<String> = submitted_papers(&request.user)
            .into_iter()
            .map(|(id, _)| id)
            .collect();
        Ok(serde_json::json!({
            "decisions": [
                { "id": &ids[0], "decision": "MAYBE", "confidence": 70, "reason": "odd label" },
                { "id": "not-submitted", "decision": "INCLUDE", "confidence": 99, "reason": "spoof" },
            ]
        }))
    });
    let engine = ScreeningEngine::new(&store, &client, &config, &SilentProgress);
    engine.run_pass1()?;

    let paper = store.get_paper("W1")?.unwrap();
    assert_eq!(
        paper.screening.unwrap().decision,
        ScreeningDecision::Borderline
    );
    assert!(store.get_paper("not-submitted")?.is_none());
    Ok(())
}

#[test]
fn missing_ids_stay_unscreened_and_are_picked_up_on_rerun() -> Result<()> {
    let harness = PipelineHarness::new();
    let store = harness.store();
    let config = harness.config();
    store.upsert_papers(&[
        make_paper("W1", "Quantum paper one"),
        make_paper("W2", "Quantum paper two"),
    ])?;

    // First pass covers only the first submitted id: silent under-coverage.
    let partial = ScriptedCompletion::new(|request| {
        let papers = submitted_papers(&request.user);
        Ok(serde_json::json!({
            "decisions": [
                { "id": &papers[0].0, "decision": "INCLUDE", "confidence": 80, "reason": "ok" },
            ]
        }))
    });
    let engine = ScreeningEngine::new(&store, &partial, &config, &SilentProgress);
    let counts = engine.run_pass1()?;
    assert_eq!(counts.screened(), 1);
    assert_eq!(store.list_papers(&PaperFilter::unscreened())?.len(), 1);

    // Re-invocation screens only the leftover paper.
    let full = ScriptedCompletion::keyword_screener();
    let engine = ScreeningEngine::new(&store, &full, &config, &SilentProgress);
    let counts = engine.run_pass1()?;
    assert_eq!(counts.screened(), 1);
    assert!(store.list_papers(&PaperFilter::unscreened())?.is_empty());
    Ok(())
}

#[test]
fn human_overrides_flow_through_finalize() -> Result<()> {
    let harness = PipelineHarness::new();
    let store = harness.store();
    let config = harness.config();
    store.upsert_papers(&[
        make_paper("W1", "Borderline kept"),
        make_paper("W2", "Borderline dropped"),
        make_paper("W3", "Borderline untouched"),
    ])?;

    let client = ScriptedCompletion::failing();
    let engine = ScreeningEngine::new(&store, &client, &config, &SilentProgress);
    engine.run_pass1()?;

    store.set_human_decision("W1", HumanDecision::Include)?;
    store.set_human_decision("W2", HumanDecision::Exclude)?;
    engine.apply_human_decisions()?;
    engine.finalize_included()?;

    let kept = store.get_paper("W1")?.unwrap();
    assert_eq!(kept.screening.unwrap().decision, ScreeningDecision::Include);
    assert_eq!(kept.final_status, Some(FinalStatus::Included));

    let dropped = store.get_paper("W2")?.unwrap();
    assert_eq!(dropped.final_status, Some(FinalStatus::Excluded));

    let untouched = store.get_paper("W3")?.unwrap();
    assert_eq!(untouched.final_status, None);

    // Finalize invariant over the whole corpus.
    for paper in store.list_papers(&PaperFilter::default())? {
        match paper.final_status {
            Some(FinalStatus::Included) => {
                assert_eq!(paper.screening_decision(), Some(ScreeningDecision::Include));
            }
            Some(FinalStatus::Excluded) => {
                let excluded_by_screen =
                    paper.screening_decision() == Some(ScreeningDecision::Exclude);
                let excluded_by_human = paper.human_decision == Some(HumanDecision::Exclude);
                assert!(excluded_by_screen || excluded_by_human);
            }
            None => {}
        }
    }
    Ok(())
}
