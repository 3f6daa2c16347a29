use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Verdict from automated title/abstract screening.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScreeningDecision {
    Include,
    Exclude,
    Borderline,
}

impl ScreeningDecision {
    /// Parse a decision label from a remote response. Unknown labels are
    /// coerced to Borderline rather than rejected.
    pub fn coerce(label: &str) -> Self {
        match label.trim().to_uppercase().as_str() {
            "INCLUDE" => Self::Include,
            "EXCLUDE" => Self::Exclude,
            _ => Self::Borderline,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Include => "INCLUDE",
            Self::Exclude => "EXCLUDE",
            Self::Borderline => "BORDERLINE",
        }
    }
}

/// Terminal verdict after all review stages.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FinalStatus {
    Included,
    Excluded,
}

impl FinalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Included => "INCLUDED",
            Self::Excluded => "EXCLUDED",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "INCLUDED" => Some(Self::Included),
            "EXCLUDED" => Some(Self::Excluded),
            _ => None,
        }
    }
}

/// Human override recorded for borderline papers during HITL review.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HumanDecision {
    Include,
    Exclude,
}

impl HumanDecision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Include => "INCLUDE",
            Self::Exclude => "EXCLUDE",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "INCLUDE" => Some(Self::Include),
            "EXCLUDE" => Some(Self::Exclude),
            _ => None,
        }
    }
}

/// Methodological risk flag attached by quality assessment.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum QualityFlag {
    #[default]
    None,
    LowSampleSize,
    NoControlGroup,
    PreprintUnreviewed,
    ConflictOfInterest,
    Other,
}

impl QualityFlag {
    pub fn parse(label: &str) -> Self {
        match label.trim().to_lowercase().as_str() {
            "low_sample_size" => Self::LowSampleSize,
            "no_control_group" => Self::NoControlGroup,
            "preprint_unreviewed" => Self::PreprintUnreviewed,
            "conflict_of_interest" => Self::ConflictOfInterest,
            "none" | "" => Self::None,
            _ => Self::Other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::LowSampleSize => "low_sample_size",
            Self::NoControlGroup => "no_control_group",
            Self::PreprintUnreviewed => "preprint_unreviewed",
            Self::ConflictOfInterest => "conflict_of_interest",
            Self::Other => "other",
        }
    }
}

/// Which bibliographic catalog produced a record.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CatalogSource {
    OpenAlex,
    SemanticScholar,
}

impl CatalogSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAlex => "openalex",
            Self::SemanticScholar => "semantic_scholar",
        }
    }
}

/// Screening state written back after pass 1 or a HITL override.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScreeningState {
    pub decision: ScreeningDecision,
    pub reason: String,
    pub confidence: f64,
}

/// Quality-assessment state for an included paper.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityState {
    pub score: f64,
    pub notes: String,
    pub flag: QualityFlag,
}

/// One bibliographic record under pipeline evaluation.
///
/// Created once on first ingestion; later stages only mutate the nullable
/// pipeline-state fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Paper {
    /// Stable identity key, see [`derive_paper_id`].
    pub id: String,
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
    pub openalex_id: Option<String>,
    #[serde(default)]
    pub semantic_scholar_id: Option<String>,
    /// Outbound citation ids as reported by the source catalog.
    #[serde(default)]
    pub referenced_works: Vec<String>,
    /// Which query execution produced this record, e.g. `openalex:2`.
    #[serde(default)]
    pub query_source: Option<String>,
    /// How the paper entered the corpus: `search` or `snowball_round_<n>`.
    pub found_via: String,

    // Pipeline state, all unset until the relevant stage runs.
    #[serde(default)]
    pub screening: Option<ScreeningState>,
    #[serde(default)]
    pub human_decision: Option<HumanDecision>,
    #[serde(default)]
    pub quality: Option<QualityState>,
    #[serde(default)]
    pub relevance_score: Option<f64>,
    #[serde(default)]
    pub cluster_id: Option<i64>,
    #[serde(default)]
    pub cluster_label: Option<String>,
    #[serde(default)]
    pub final_status: Option<FinalStatus>,

    pub created_at: DateTime<Utc>,
}

impl Paper {
    /// Minimal record with identity derived from the available metadata.
    pub fn new(title: impl Into<String>) -> Self {
        let title = title.into();
        Self {
            id: derive_paper_id(None, None, &title),
            doi: None,
            title,
            abstract_text: None,
            authors: Vec::new(),
            year: None,
            venue: None,
            citation_count: None,
            document_type: None,
            open_access_url: None,
            concepts: Vec::new(),
            openalex_id: None,
            semantic_scholar_id: None,
            referenced_works: Vec::new(),
            query_source: None,
            found_via: "search".into(),
            screening: None,
            human_decision: None,
            quality: None,
            relevance_score: None,
            cluster_id: None,
            cluster_label: None,
            final_status: None,
            created_at: Utc::now(),
        }
    }

    pub fn screening_decision(&self) -> Option<ScreeningDecision> {
        self.screening.as_ref().map(|s| s.decision)
    }
}

/// Derive the stable identity key for a paper.
///
/// Preference order: DOI, then a source-native identifier, then a content
/// hash of the title so that every record has a key even with incomplete
/// metadata.
pub fn derive_paper_id(doi: Option<&str>, native_id: Option<&str>, title: &str) -> String {
    if let Some(doi) = doi.filter(|d| !d.trim().is_empty()) {
        return format!("doi:{}", doi.trim().to_lowercase());
    }
    if let Some(native) = native_id.filter(|n| !n.trim().is_empty()) {
        return native.trim().to_string();
    }
    let digest = Sha256::digest(title.trim().to_lowercase().as_bytes());
    format!("title:{:x}", digest)[..38].to_string()
}
