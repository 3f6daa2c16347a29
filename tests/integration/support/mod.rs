use litflow::config::ReviewConfig;
use litflow::models::{CatalogSource, Paper};
use litflow::remote::{
    CandidateRecord, CatalogClient, CompletionClient, CompletionRequest, EmbeddingClient,
    RemoteFailure, SearchRequest,
};
use litflow::storage::PaperStore;
use std::collections::HashMap;
use tempfile::TempDir;

/// Temp-dir backed store plus a default configuration for pipeline tests.
pub struct PipelineHarness {
    workspace: TempDir,
}

impl PipelineHarness {
    pub fn new() -> Self {
        Self {
            workspace: TempDir::new().expect("failed to create temp workspace"),
        }
    }

    pub fn store(&self) -> PaperStore {
        PaperStore::open(self.workspace.path().join("review.db"))
            .expect("failed to open paper store")
    }

    pub fn config(&self) -> ReviewConfig {
        let mut config = ReviewConfig::new("How does quantum error correction scale?");
        // Small worker pools keep the scripted tests fast.
        config.settings.screening_workers = 2;
        config.settings.quality_workers = 2;
        config
    }
}

pub fn make_paper(id: &str, title: &str) -> Paper {
    let mut paper = Paper::new(title);
    paper.id = id.to_string();
    paper
}

pub fn make_record(title: &str, doi: Option<&str>, native_id: Option<&str>) -> CandidateRecord {
    CandidateRecord {
        doi: doi.map(|d| d.to_string()),
        title: title.to_string(),
        abstract_text: Some(format!("Abstract of {title}")),
        native_id: native_id.map(|n| n.to_string()),
        ..CandidateRecord::default()
    }
}

// ── Completion fakes ──────────────────────────────────────────────────────

type CompletionHandler =
    Box<dyn Fn(&CompletionRequest) -> Result<serde_json::Value, RemoteFailure> + Send + Sync>;

/// Completion client driven by a caller-supplied handler.
pub struct ScriptedCompletion {
    handler: CompletionHandler,
}

impl ScriptedCompletion {
    pub fn new<F>(handler: F) -> Self
    where
        F: Fn(&CompletionRequest) -> Result<serde_json::Value, RemoteFailure>
            + Send
            + Sync
            + 'static,
    {
        Self {
            handler: Box::new(handler),
        }
    }

    /// Screens every submitted paper by title keyword: "quantum" includes,
    /// "cooking" excludes, anything else is borderline.
    pub fn keyword_screener() -> Self {
        Self::new(|request| {
            if !request.system.contains("screen papers") {
                return Err(RemoteFailure::Rejected { status: 404 });
            }
            let decisions: Vec<serde_json::Value> = submitted_papers(&request.user)
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
                    serde_json::json!({
                        "id": id,
                        "decision": decision,
                        "confidence": 90,
                        "reason": "keyword match",
                    })
                })
                .collect();
            Ok(serde_json::json!({ "decisions": decisions }))
        })
    }

    /// Fails every call with a hard 4xx.
    pub fn failing() -> Self {
        Self::new(|_| Err(RemoteFailure::Rejected { status: 400 }))
    }
}

impl CompletionClient for ScriptedCompletion {
    fn complete(&self, request: &CompletionRequest) -> Result<String, RemoteFailure> {
        (self.handler)(request).map(|value| value.to_string())
    }
}

/// Parse the `(id, title)` pairs out of a screening request body.
pub fn submitted_papers(user: &str) -> Vec<(String, String)> {
    let Some(idx) = user.rfind("):\n") else {
        return Vec::new();
    };
    let raw = &user[idx + 3..];
    let Ok(entries) = serde_json::from_str::<Vec<serde_json::Value>>(raw) else {
        return Vec::new();
    };
    entries
        .iter()
        .filter_map(|entry| {
            Some((
                entry.get("id")?.as_str()?.to_string(),
                entry.get("title")?.as_str()?.to_string(),
            ))
        })
        .collect()
}

// ── Embedding fakes ───────────────────────────────────────────────────────

type EmbeddingHandler = Box<dyn Fn(&str) -> Vec<f32> + Send + Sync>;

pub struct ScriptedEmbeddings {
    handler: EmbeddingHandler,
}

impl ScriptedEmbeddings {
    pub fn new<F>(handler: F) -> Self
    where
        F: Fn(&str) -> Vec<f32> + Send + Sync + 'static,
    {
        Self {
            handler: Box::new(handler),
        }
    }
}

impl EmbeddingClient for ScriptedEmbeddings {
    fn embed(&self, texts: &[String], _model: &str) -> Result<Vec<Vec<f32>>, RemoteFailure> {
        Ok(texts.iter().map(|t| (self.handler)(t)).collect())
    }
}

pub struct FailingEmbeddings;

impl EmbeddingClient for FailingEmbeddings {
    fn embed(&self, _texts: &[String], _model: &str) -> Result<Vec<Vec<f32>>, RemoteFailure> {
        Err(RemoteFailure::Rejected { status: 400 })
    }
}

// ── Catalog fake ──────────────────────────────────────────────────────────

/// In-memory catalog with scripted search results and citation links.
#[derive(Default)]
pub struct FakeCatalog {
    pub search_results: HashMap<String, Vec<CandidateRecord>>,
    pub references: HashMap<String, Vec<CandidateRecord>>,
    pub citations: HashMap<String, Vec<CandidateRecord>>,
}

impl FakeCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_search(mut self, query: &str, records: Vec<CandidateRecord>) -> Self {
        self.search_results.insert(query.to_string(), records);
        self
    }

    pub fn with_references(mut self, native_id: &str, records: Vec<CandidateRecord>) -> Self {
        self.references.insert(native_id.to_string(), records);
        self
    }

    pub fn with_citations(mut self, native_id: &str, records: Vec<CandidateRecord>) -> Self {
        self.citations.insert(native_id.to_string(), records);
        self
    }
}

impl CatalogClient for FakeCatalog {
    fn source(&self) -> CatalogSource {
        CatalogSource::OpenAlex
    }

    fn search(&self, request: &SearchRequest) -> Result<Vec<CandidateRecord>, RemoteFailure> {
        Ok(self
            .search_results
            .get(&request.query)
            .cloned()
            .unwrap_or_default())
    }

    fn references(&self, native_id: &str, limit: usize) -> Result<Vec<CandidateRecord>, RemoteFailure> {
        let mut records = self.references.get(native_id).cloned().unwrap_or_default();
        records.truncate(limit);
        Ok(records)
    }

    fn citations(&self, native_id: &str, limit: usize) -> Result<Vec<CandidateRecord>, RemoteFailure> {
        let mut records = self.citations.get(native_id).cloned().unwrap_or_default();
        records.truncate(limit);
        Ok(records)
    }
}
