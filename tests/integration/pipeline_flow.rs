use super::support::{
    make_paper, make_record, submitted_papers, FakeCatalog, PipelineHarness, ScriptedCompletion,
    ScriptedEmbeddings,
};
use anyhow::Result;
use litflow::models::HumanDecision;
use litflow::remote::{CatalogClient, RemoteFailure};
use litflow::{Orchestrator, SilentProgress, Stage};
use serde_json::json;

/// Completion fake routing on the stage-specific system prompt, so one
/// client can drive the whole pipeline.
fn stage_router() -> ScriptedCompletion {
    ScriptedCompletion::new(|request| {
        let system = &request.system;
        if system.contains("design search strategies") {
            Ok(json!({
                "openalex_queries": [
                    { "query": "quantum error correction", "description": "primary" },
                ],
                "semantic_scholar_queries": [],
            }))
        } else if system.contains("screen papers") {
            let decisions: Vec<_> = submitted_papers(&request.user)
                .into_iter()
                .map(|(id, title)| {
                    let lower = title.to_lowercase();
                    let decision = if lower.contains("quantum") {
                        "INCLUDE"
                    } else if lower.contains("cooking") {
                        "EXCLUDE"
                    } else {
                        "BORDERLINE"
                    };
                    json!({ "id": id, "decision": decision, "confidence": 90, "reason": "keyword" })
                })
                .collect();
            Ok(json!({ "decisions": decisions }))
        } else if system.contains("methodological quality") {
            Ok(json!({ "quality_score": 72, "quality_notes": "sound design", "flag": "none" }))
        } else if system.contains("label topic clusters") {
            Ok(json!({ "label": "Quantum error correction", "summary": "codes and thresholds" }))
        } else if system.contains("synthesize literature") {
            Ok(json!({
                "narrative_overview": "The field is converging.",
                "key_themes": ["codes"],
                "consensus_points": [],
                "key_debates": [],
                "research_gaps": [],
            }))
        } else {
            Err(RemoteFailure::Rejected { status: 404 })
        }
    })
}

fn seeded_catalog() -> FakeCatalog {
    FakeCatalog::new()
        .with_search(
            "quantum error correction",
            vec![
                make_record("Quantum surface codes", None, Some("W1")),
                make_record("Quantum threshold theorems", None, Some("W2")),
                make_record("Quantum decoder benchmarks", None, Some("W3")),
                make_record("Quantum hardware error rates", None, Some("W4")),
                make_record("Cooking pasta quickly", None, Some("W5")),
                make_record("Urban gardening trends", None, Some("W6")),
            ],
        )
        .with_references(
            "W1",
            vec![make_record("Quantum snowball extension", None, Some("W10"))],
        )
}

#[test]
fn full_pipeline_walk_reaches_complete() -> Result<()> {
    let harness = PipelineHarness::new();
    let store = harness.store();
    let completion = stage_router();
    let embeddings = ScriptedEmbeddings::new(|_| vec![1.0, 0.0, 0.0]);
    let catalog = seeded_catalog();
    let catalogs: [&dyn CatalogClient; 1] = [&catalog];
    let orchestrator =
        Orchestrator::new(&store, &completion, &embeddings, &catalogs, &SilentProgress);

    let mut ctx = orchestrator.start_session(harness.config())?;
    assert_eq!(ctx.stage, Stage::Idle);
    assert!(store.load_config()?.is_some());

    let queries = orchestrator.run_query_formulation(&mut ctx)?;
    assert_eq!(queries.len(), 1);
    assert_eq!(ctx.stage, Stage::QueryApproval);
    assert_eq!(store.load_queries()?.len(), 1);

    let stored = orchestrator.run_search(&mut ctx)?;
    assert_eq!(stored, 6);
    assert_eq!(ctx.stage, Stage::Deduplication);

    let counts = orchestrator.run_screening_pass1(&mut ctx)?;
    assert_eq!((counts.include, counts.exclude, counts.borderline), (4, 1, 1));
    // HITL is disabled, so the stage does not branch to review.
    assert_eq!(ctx.stage, Stage::ScreeningPass1);

    let outcome = orchestrator.run_snowballing(&mut ctx)?;
    assert_eq!(outcome.total_new_included, 1);
    assert_eq!(
        store.get_paper("W10")?.unwrap().found_via,
        "snowball_round_1"
    );

    let assessed = orchestrator.run_quality_assessment(&mut ctx)?;
    assert_eq!(assessed, 5);
    let quality = store.get_paper("W1")?.unwrap().quality.unwrap();
    assert_eq!(quality.score, 72.0);

    let result = orchestrator.run_synthesis(&mut ctx)?;
    assert_eq!(ctx.stage, Stage::Complete);
    assert_eq!(result.paper_count, 5);
    assert_eq!(
        result.narrative.get("narrative_overview").and_then(|n| n.as_str()),
        Some("The field is converging.")
    );
    assert_eq!(store.load_synthesis()?.unwrap().paper_count, 5);

    let status = orchestrator.status()?;
    assert_eq!(status.total, 7);
    assert_eq!(status.included, 5);
    assert_eq!(status.excluded, 1);
    assert_eq!(status.borderline, 1);

    // Every stage transition left an event, in execution order.
    let events = store.list_events(200)?;
    let stages: Vec<&str> = events
        .iter()
        .rev()
        .filter_map(|e| e.message.strip_prefix("Entering stage: "))
        .collect();
    assert_eq!(
        stages,
        [
            "QUERY_FORMULATION",
            "QUERY_APPROVAL",
            "SEARCHING",
            "DEDUPLICATION",
            "SCREENING_PASS_1",
            "SNOWBALLING",
            "QUALITY_ASSESSMENT",
            "SYNTHESIS",
            "COMPLETE",
        ]
    );

    // Screening is idempotent after the run.
    assert_eq!(orchestrator.run_screening_pass1(&mut ctx)?.screened(), 0);
    Ok(())
}

#[test]
fn hitl_branch_pauses_and_resumes() -> Result<()> {
    let harness = PipelineHarness::new();
    let store = harness.store();
    let mut config = harness.config();
    config.hitl_enabled = true;
    store.upsert_papers(&[
        make_paper("W1", "Quantum clear include"),
        make_paper("W2", "Ambiguous borderline paper"),
    ])?;

    let completion = stage_router();
    let embeddings = ScriptedEmbeddings::new(|_| vec![1.0]);
    let catalogs: [&dyn CatalogClient; 0] = [];
    let orchestrator =
        Orchestrator::new(&store, &completion, &embeddings, &catalogs, &SilentProgress);
    let mut ctx = orchestrator.start_session(config)?;

    orchestrator.run_screening_pass1(&mut ctx)?;
    assert_eq!(ctx.stage, Stage::HitlReview);
    // The clear include is finalized even while review is pending.
    assert_eq!(orchestrator.status()?.included, 1);

    store.set_human_decision("W2", HumanDecision::Include)?;
    orchestrator.resume_after_hitl(&mut ctx)?;
    assert_eq!(ctx.stage, Stage::ScreeningPass1);
    assert_eq!(orchestrator.status()?.included, 2);
    assert_eq!(orchestrator.status()?.borderline, 0);
    Ok(())
}

#[test]
fn stage_preconditions_reject_out_of_order_calls() -> Result<()> {
    let harness = PipelineHarness::new();
    let store = harness.store();
    let completion = stage_router();
    let embeddings = ScriptedEmbeddings::new(|_| vec![1.0]);
    let catalogs: [&dyn CatalogClient; 0] = [];
    let orchestrator =
        Orchestrator::new(&store, &completion, &embeddings, &catalogs, &SilentProgress);
    let mut ctx = orchestrator.start_session(harness.config())?;

    assert!(orchestrator.run_search(&mut ctx).is_err());
    assert!(orchestrator.run_screening_pass1(&mut ctx).is_err());
    Ok(())
}

#[test]
fn query_formulation_failure_propagates() -> Result<()> {
    let harness = PipelineHarness::new();
    let store = harness.store();
    let completion = ScriptedCompletion::failing();
    let embeddings = ScriptedEmbeddings::new(|_| vec![1.0]);
    let catalogs: [&dyn CatalogClient; 0] = [];
    let orchestrator =
        Orchestrator::new(&store, &completion, &embeddings, &catalogs, &SilentProgress);
    let mut ctx = orchestrator.start_session(harness.config())?;

    assert!(orchestrator.run_query_formulation(&mut ctx).is_err());
    assert!(ctx.generated_queries.is_empty());
    Ok(())
}
