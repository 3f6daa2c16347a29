//! Stage orchestrator: the top-level state machine sequencing every
//! pipeline stage.
//!
//! The orchestrator holds no authoritative state itself. Current stage and
//! configuration live in the session-scoped [`PipelineContext`]; everything
//! durable lives in the Paper Store, so an orchestrator may be constructed
//! fresh on every invocation. Every stage transition appends a pipeline
//! event before yielding control.

use anyhow::{bail, Result};
use serde_json::json;
use uuid::Uuid;

use crate::config::ReviewConfig;
use crate::models::{CatalogSource, GeneratedQuery, StatusCounts, SynthesisResult};
use crate::progress::ProgressSink;
use crate::remote::{CatalogClient, CompletionClient, EmbeddingClient};
use crate::services::{
    QualityEngine, QueryFormulator, RelevanceScorer, ScreeningCounts, ScreeningEngine,
    SearchStage, SnowballController, SnowballOutcome, SynthesisStage,
};
use crate::storage::PaperStore;

/// Pipeline stages in execution order, with two branch points: HITL review
/// only when enabled and borderline papers exist, snowballing bounded by
/// its own stopping rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Idle,
    QueryFormulation,
    QueryApproval,
    Searching,
    Deduplication,
    ScreeningPass1,
    HitlReview,
    Snowballing,
    QualityAssessment,
    Synthesis,
    Complete,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "IDLE",
            Self::QueryFormulation => "QUERY_FORMULATION",
            Self::QueryApproval => "QUERY_APPROVAL",
            Self::Searching => "SEARCHING",
            Self::Deduplication => "DEDUPLICATION",
            Self::ScreeningPass1 => "SCREENING_PASS_1",
            Self::HitlReview => "HITL_REVIEW",
            Self::Snowballing => "SNOWBALLING",
            Self::QualityAssessment => "QUALITY_ASSESSMENT",
            Self::Synthesis => "SYNTHESIS",
            Self::Complete => "COMPLETE",
        }
    }
}

/// Session-scoped pipeline context, created at session start and destroyed
/// at session reset. Passed by reference into every orchestrator call; no
/// ambient globals.
#[derive(Debug, Clone)]
pub struct PipelineContext {
    pub session_id: Uuid,
    pub stage: Stage,
    pub config: ReviewConfig,
    pub generated_queries: Vec<GeneratedQuery>,
}

impl PipelineContext {
    pub fn new(config: ReviewConfig) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            stage: Stage::Idle,
            config,
            generated_queries: Vec::new(),
        }
    }
}

pub struct Orchestrator<'a> {
    store: &'a PaperStore,
    completion: &'a dyn CompletionClient,
    embeddings: &'a dyn EmbeddingClient,
    catalogs: &'a [&'a dyn CatalogClient],
    progress: &'a dyn ProgressSink,
}

impl<'a> Orchestrator<'a> {
    pub fn new(
        store: &'a PaperStore,
        completion: &'a dyn CompletionClient,
        embeddings: &'a dyn EmbeddingClient,
        catalogs: &'a [&'a dyn CatalogClient],
        progress: &'a dyn ProgressSink,
    ) -> Self {
        Self {
            store,
            completion,
            embeddings,
            catalogs,
            progress,
        }
    }

    /// Validate and persist the run configuration, producing a fresh
    /// session context. Re-submission overwrites the stored configuration
    /// wholesale.
    pub fn start_session(&self, config: ReviewConfig) -> Result<PipelineContext> {
        config.validate()?;
        self.store.save_config(&config)?;
        Ok(PipelineContext::new(config))
    }

    /// Formulate search queries. Not idempotent: always regenerates.
    pub fn run_query_formulation(&self, ctx: &mut PipelineContext) -> Result<Vec<GeneratedQuery>> {
        self.set_stage(ctx, Stage::QueryFormulation)?;
        let formulator =
            QueryFormulator::new(self.store, self.completion, &ctx.config, self.progress);
        let queries = formulator.run()?;
        ctx.generated_queries = queries.clone();
        self.set_stage(ctx, Stage::QueryApproval)?;
        Ok(queries)
    }

    /// Execute approved queries. Returns the unique paper count stored.
    pub fn run_search(&self, ctx: &mut PipelineContext) -> Result<usize> {
        if ctx.generated_queries.is_empty() {
            bail!("cannot search before query formulation");
        }
        self.set_stage(ctx, Stage::Searching)?;
        let stage = SearchStage::new(self.store, &ctx.config, self.progress);
        let total = stage.run(&ctx.generated_queries, self.catalogs)?;
        self.set_stage(ctx, Stage::Deduplication)?;
        self.store.append_event(
            Stage::Deduplication.as_str(),
            &format!("{total} unique papers after deduplication"),
            json!({ "unique": total }),
        )?;
        Ok(total)
    }

    /// Screen unscreened papers and finalize non-borderline inclusions.
    /// Idempotent: papers with a decision are not re-screened. Branches to
    /// HITL review when enabled and borderline papers remain.
    pub fn run_screening_pass1(&self, ctx: &mut PipelineContext) -> Result<ScreeningCounts> {
        let counts = self.store.count_by_status()?;
        if counts.total == 0 {
            bail!("cannot screen: no papers have been ingested");
        }
        self.set_stage(ctx, Stage::ScreeningPass1)?;
        let engine = ScreeningEngine::new(self.store, self.completion, &ctx.config, self.progress);
        let screened = engine.run_pass1()?;
        engine.finalize_included()?;
        if ctx.config.hitl_enabled && self.store.count_by_status()?.borderline > 0 {
            self.set_stage(ctx, Stage::HitlReview)?;
        }
        Ok(screened)
    }

    /// Apply recorded human overrides and re-finalize.
    pub fn resume_after_hitl(&self, ctx: &mut PipelineContext) -> Result<()> {
        let engine = ScreeningEngine::new(self.store, self.completion, &ctx.config, self.progress);
        engine.apply_human_decisions()?;
        engine.finalize_included()?;
        ctx.stage = Stage::ScreeningPass1;
        Ok(())
    }

    pub fn run_snowballing(&self, ctx: &mut PipelineContext) -> Result<SnowballOutcome> {
        self.set_stage(ctx, Stage::Snowballing)?;
        let catalog = self.primary_catalog()?;
        let controller = SnowballController::new(
            self.store,
            self.completion,
            catalog,
            &ctx.config,
            self.progress,
        );
        controller.run()
    }

    /// Assess included papers lacking a quality score. Idempotent.
    pub fn run_quality_assessment(&self, ctx: &mut PipelineContext) -> Result<usize> {
        self.set_stage(ctx, Stage::QualityAssessment)?;
        let engine = QualityEngine::new(self.store, self.completion, &ctx.config, self.progress);
        engine.run()
    }

    pub fn run_synthesis(&self, ctx: &mut PipelineContext) -> Result<SynthesisResult> {
        self.set_stage(ctx, Stage::Synthesis)?;
        let stage = SynthesisStage::new(
            self.store,
            self.completion,
            self.embeddings,
            &ctx.config,
            self.progress,
        );
        let result = stage.run()?;
        self.set_stage(ctx, Stage::Complete)?;
        Ok(result)
    }

    /// Re-run relevance scoring independently of the synthesis stage.
    pub fn run_relevance_scoring(&self, ctx: &PipelineContext) -> Result<usize> {
        RelevanceScorer::new(self.store, self.embeddings, &ctx.config, self.progress).run()
    }

    pub fn status(&self) -> Result<StatusCounts> {
        self.store.count_by_status()
    }

    fn set_stage(&self, ctx: &mut PipelineContext, stage: Stage) -> Result<()> {
        ctx.stage = stage;
        self.store.append_event(
            stage.as_str(),
            &format!("Entering stage: {}", stage.as_str()),
            json!({ "session": ctx.session_id }),
        )?;
        self.progress.log(&format!("-- Stage: {} --", stage.as_str()));
        Ok(())
    }

    /// Snowballing follows citations through the primary catalog.
    fn primary_catalog(&self) -> Result<&'a dyn CatalogClient> {
        self.catalogs
            .iter()
            .find(|c| c.source() == CatalogSource::OpenAlex)
            .or_else(|| self.catalogs.first())
            .copied()
            .ok_or_else(|| anyhow::anyhow!("no catalog client configured"))
    }
}
