//! Interfaces to the remote collaborators: the LLM completion service, the
//! embedding service, and the two bibliographic catalogs.
//!
//! The pipeline core never performs HTTP itself. Implementations of these
//! traits own their retry/backoff behavior; rate limits are expected to be
//! retried inside the collaborator and surface here only after retries are
//! exhausted. Failures are classified so callers can convert them to safe
//! default outcomes instead of aborting a batch.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{derive_paper_id, CatalogSource, Paper};

/// Classified failure from a remote collaborator after its own retries.
#[derive(Debug, Clone, Error)]
pub enum RemoteFailure {
    #[error("rate limited after retries")]
    RateLimited,
    #[error("remote call rejected with status {status}")]
    Rejected { status: u16 },
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("malformed structured response: {0}")]
    Malformed(String),
}

/// Structured prompt for one completion call.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub system: String,
    pub user: String,
    pub model: String,
    pub temperature: f32,
    /// Ask the collaborator for parseable key/value output.
    pub json_output: bool,
}

impl CompletionRequest {
    pub fn new(system: impl Into<String>, user: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
            model: model.into(),
            temperature: 0.2,
            json_output: false,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn expecting_json(mut self) -> Self {
        self.json_output = true;
        self
    }
}

/// LLM completion collaborator.
pub trait CompletionClient: Send + Sync {
    fn complete(&self, request: &CompletionRequest) -> Result<String, RemoteFailure>;

    /// Run a completion and parse the result as a JSON object.
    fn complete_json(&self, request: &CompletionRequest) -> Result<serde_json::Value, RemoteFailure> {
        let raw = self.complete(&request.clone().expecting_json())?;
        serde_json::from_str(&raw).map_err(|err| RemoteFailure::Malformed(err.to_string()))
    }
}

/// Embedding collaborator, one fixed-length vector per input text.
pub trait EmbeddingClient: Send + Sync {
    fn embed(&self, texts: &[String], model: &str) -> Result<Vec<Vec<f32>>, RemoteFailure>;
}

/// One search against a bibliographic catalog.
#[derive(Debug, Clone, Default)]
pub struct SearchRequest {
    pub query: String,
    pub year_min: Option<i32>,
    pub year_max: Option<i32>,
    pub document_types: Vec<String>,
    pub limit: usize,
}

/// Normalized record returned by catalog search and citation lookups.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CandidateRecord {
    #[serde(default)]
    pub doi: Option<String>,
    pub title: String,
    #[serde(default)]
    pub abstract_text: Option<String>,
    #[serde(default)]
    pub authors: Vec<String>,
    #[serde(default)]
    pub year: Option<i32>,
    #[serde(default)]
    pub venue: Option<String>,
    #[serde(default)]
    pub citation_count: Option<i64>,
    #[serde(default)]
    pub document_type: Option<String>,
    #[serde(default)]
    pub open_access_url: Option<String>,
    #[serde(default)]
    pub concepts: Vec<String>,
    #[serde(default)]
    pub referenced_works: Vec<String>,
    /// Identifier native to the producing catalog, e.g. an OpenAlex work id.
    #[serde(default)]
    pub native_id: Option<String>,
}

impl CandidateRecord {
    /// Convert to a [`Paper`] with derived identity and provenance.
    pub fn into_paper(self, source: CatalogSource, found_via: &str) -> Paper {
        let id = derive_paper_id(self.doi.as_deref(), self.native_id.as_deref(), &self.title);
        let mut paper = Paper::new(self.title);
        paper.id = id;
        paper.doi = self.doi;
        paper.abstract_text = self.abstract_text;
        paper.authors = self.authors;
        paper.year = self.year;
        paper.venue = self.venue;
        paper.citation_count = self.citation_count;
        paper.document_type = self.document_type;
        paper.open_access_url = self.open_access_url;
        paper.concepts = self.concepts;
        paper.referenced_works = self.referenced_works;
        paper.found_via = found_via.to_string();
        match source {
            CatalogSource::OpenAlex => paper.openalex_id = self.native_id,
            CatalogSource::SemanticScholar => paper.semantic_scholar_id = self.native_id,
        }
        paper
    }
}

/// Bibliographic catalog collaborator: free-text search plus citation
/// lookups in both directions.
pub trait CatalogClient: Send + Sync {
    fn source(&self) -> CatalogSource;

    fn search(&self, request: &SearchRequest) -> Result<Vec<CandidateRecord>, RemoteFailure>;

    /// Works referenced by the given document (backward snowballing).
    fn references(&self, native_id: &str, limit: usize) -> Result<Vec<CandidateRecord>, RemoteFailure>;

    /// Works citing the given document (forward snowballing).
    fn citations(&self, native_id: &str, limit: usize) -> Result<Vec<CandidateRecord>, RemoteFailure>;
}
