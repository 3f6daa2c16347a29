//! Paper Store: the single source of truth for documents, pipeline events,
//! configuration, embeddings, and synthesis output.
//!
//! One SQLite database per review session. Inserts are idempotent by paper
//! id (a later insert of an already-stored id is a no-op, not an overwrite);
//! pipeline-state fields are mutated through typed setters with
//! last-writer-wins semantics.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::{HashMap, HashSet};
use std::path::Path;

use crate::config::ReviewConfig;
use crate::models::{
    CatalogSource, FinalStatus, GeneratedQuery, HumanDecision, Paper, PipelineEvent, QualityFlag,
    QualityState, ScreeningDecision, ScreeningState, StatusCounts, SynthesisResult,
};

/// Filter for [`PaperStore::list_papers`].
#[derive(Debug, Clone, Default)]
pub struct PaperFilter {
    pub final_status: Option<FinalStatus>,
    pub screening: Option<ScreeningDecision>,
    /// Only papers with no screening decision yet.
    pub unscreened_only: bool,
    /// Only papers with no quality score yet.
    pub missing_quality: bool,
}

impl PaperFilter {
    pub fn included() -> Self {
        Self {
            final_status: Some(FinalStatus::Included),
            ..Self::default()
        }
    }

    pub fn unscreened() -> Self {
        Self {
            unscreened_only: true,
            ..Self::default()
        }
    }
}

pub struct PaperStore {
    conn: Connection,
}

impl PaperStore {
    /// Open (or create) the session database at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let conn = Connection::open(path.as_ref()).context("failed to open paper store")?;
        let store = Self { conn };
        store.init_schema()?;
        Ok(store)
    }

    /// In-memory store, used by tests and throwaway sessions.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("failed to open in-memory store")?;
        let store = Self { conn };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS papers (
                id TEXT PRIMARY KEY,
                doi TEXT,
                title TEXT NOT NULL,
                abstract_text TEXT,
                authors TEXT NOT NULL DEFAULT '[]',
                year INTEGER,
                venue TEXT,
                citation_count INTEGER,
                document_type TEXT,
                open_access_url TEXT,
                concepts TEXT NOT NULL DEFAULT '[]',
                openalex_id TEXT,
                semantic_scholar_id TEXT,
                referenced_works TEXT NOT NULL DEFAULT '[]',
                query_source TEXT,
                found_via TEXT NOT NULL DEFAULT 'search',
                screening_decision TEXT,
                screening_reason TEXT,
                screening_confidence REAL,
                human_decision TEXT,
                quality_score REAL,
                quality_notes TEXT,
                quality_flag TEXT,
                relevance_score REAL,
                cluster_id INTEGER,
                cluster_label TEXT,
                final_status TEXT,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS embeddings (
                paper_id TEXT PRIMARY KEY,
                vector TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS pipeline_log (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                stage TEXT NOT NULL,
                message TEXT NOT NULL,
                details TEXT NOT NULL DEFAULT '{}',
                ts TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS review_config (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                data TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS generated_queries (
                pos INTEGER PRIMARY KEY,
                catalog TEXT NOT NULL,
                query_text TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT ''
            );

            CREATE TABLE IF NOT EXISTS synthesis_result (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                data TEXT NOT NULL,
                created_at TEXT NOT NULL
            );
            "#,
        )?;
        Ok(())
    }

    // ── Papers ────────────────────────────────────────────────────────────

    /// Insert papers, skipping ids already present. Returns the number of
    /// rows actually inserted.
    pub fn upsert_papers(&self, papers: &[Paper]) -> Result<usize> {
        let mut inserted = 0;
        for paper in papers {
            let changed = self.conn.execute(
                r#"
                INSERT OR IGNORE INTO papers (
                    id, doi, title, abstract_text, authors, year, venue,
                    citation_count, document_type, open_access_url, concepts,
                    openalex_id, semantic_scholar_id, referenced_works,
                    query_source, found_via, created_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)
                "#,
                params![
                    paper.id,
                    paper.doi,
                    paper.title,
                    paper.abstract_text,
                    serde_json::to_string(&paper.authors)?,
                    paper.year,
                    paper.venue,
                    paper.citation_count,
                    paper.document_type,
                    paper.open_access_url,
                    serde_json::to_string(&paper.concepts)?,
                    paper.openalex_id,
                    paper.semantic_scholar_id,
                    serde_json::to_string(&paper.referenced_works)?,
                    paper.query_source,
                    paper.found_via,
                    paper.created_at.to_rfc3339(),
                ],
            )?;
            inserted += changed;
        }
        Ok(inserted)
    }

    pub fn get_paper(&self, id: &str) -> Result<Option<Paper>> {
        self.conn
            .query_row("SELECT * FROM papers WHERE id = ?1", [id], row_to_paper)
            .optional()
            .context("failed to load paper")
    }

    pub fn list_papers(&self, filter: &PaperFilter) -> Result<Vec<Paper>> {
        let mut clauses: Vec<String> = Vec::new();
        let mut values: Vec<String> = Vec::new();
        if let Some(status) = filter.final_status {
            clauses.push("final_status = ?".into());
            values.push(status.as_str().into());
        }
        if let Some(decision) = filter.screening {
            clauses.push("screening_decision = ?".into());
            values.push(decision.as_str().into());
        }
        if filter.unscreened_only {
            clauses.push("screening_decision IS NULL".into());
        }
        if filter.missing_quality {
            clauses.push("quality_score IS NULL".into());
        }
        let where_sql = if clauses.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", clauses.join(" AND "))
        };
        let sql = format!(
            "SELECT * FROM papers {where_sql} ORDER BY citation_count DESC NULLS LAST, id"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(rusqlite::params_from_iter(values.iter()), row_to_paper)?;
        let mut papers = Vec::new();
        for row in rows {
            papers.push(row?);
        }
        Ok(papers)
    }

    /// Every paper id known to the store, regardless of status.
    pub fn known_ids(&self) -> Result<HashSet<String>> {
        let mut stmt = self.conn.prepare("SELECT id FROM papers")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut ids = HashSet::new();
        for row in rows {
            ids.insert(row?);
        }
        Ok(ids)
    }

    pub fn set_screening(&self, id: &str, state: &ScreeningState) -> Result<()> {
        self.conn.execute(
            "UPDATE papers SET screening_decision = ?1, screening_reason = ?2, screening_confidence = ?3 WHERE id = ?4",
            params![state.decision.as_str(), state.reason, state.confidence, id],
        )?;
        Ok(())
    }

    pub fn set_final_status(&self, id: &str, status: Option<FinalStatus>) -> Result<()> {
        self.conn.execute(
            "UPDATE papers SET final_status = ?1 WHERE id = ?2",
            params![status.map(|s| s.as_str()), id],
        )?;
        Ok(())
    }

    pub fn set_human_decision(&self, id: &str, decision: HumanDecision) -> Result<()> {
        self.conn.execute(
            "UPDATE papers SET human_decision = ?1 WHERE id = ?2",
            params![decision.as_str(), id],
        )?;
        Ok(())
    }

    pub fn set_quality(&self, id: &str, state: &QualityState) -> Result<()> {
        self.conn.execute(
            "UPDATE papers SET quality_score = ?1, quality_notes = ?2, quality_flag = ?3 WHERE id = ?4",
            params![state.score, state.notes, state.flag.as_str(), id],
        )?;
        Ok(())
    }

    pub fn set_relevance(&self, id: &str, score: f64) -> Result<()> {
        self.conn.execute(
            "UPDATE papers SET relevance_score = ?1 WHERE id = ?2",
            params![score, id],
        )?;
        Ok(())
    }

    pub fn set_cluster(&self, id: &str, cluster_id: i64) -> Result<()> {
        self.conn.execute(
            "UPDATE papers SET cluster_id = ?1 WHERE id = ?2",
            params![cluster_id, id],
        )?;
        Ok(())
    }

    pub fn set_cluster_label(&self, id: &str, label: &str) -> Result<()> {
        self.conn.execute(
            "UPDATE papers SET cluster_label = ?1 WHERE id = ?2",
            params![label, id],
        )?;
        Ok(())
    }

    pub fn count_by_status(&self) -> Result<StatusCounts> {
        let total: u64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM papers", [], |r| r.get(0))?;
        let included: u64 = self.conn.query_row(
            "SELECT COUNT(*) FROM papers WHERE final_status = 'INCLUDED'",
            [],
            |r| r.get(0),
        )?;
        let excluded: u64 = self.conn.query_row(
            "SELECT COUNT(*) FROM papers WHERE final_status = 'EXCLUDED'",
            [],
            |r| r.get(0),
        )?;
        let borderline: u64 = self.conn.query_row(
            "SELECT COUNT(*) FROM papers WHERE screening_decision = 'BORDERLINE' AND human_decision IS NULL AND final_status IS NULL",
            [],
            |r| r.get(0),
        )?;
        Ok(StatusCounts {
            total,
            included,
            excluded,
            borderline,
            unscreened: total.saturating_sub(included + excluded + borderline),
        })
    }

    // ── Pipeline log ──────────────────────────────────────────────────────

    pub fn append_event(&self, stage: &str, message: &str, details: serde_json::Value) -> Result<()> {
        self.conn.execute(
            "INSERT INTO pipeline_log (stage, message, details, ts) VALUES (?1, ?2, ?3, ?4)",
            params![
                stage,
                message,
                serde_json::to_string(&details)?,
                Utc::now().to_rfc3339()
            ],
        )?;
        Ok(())
    }

    /// Most recent events first.
    pub fn list_events(&self, limit: usize) -> Result<Vec<PipelineEvent>> {
        let mut stmt = self.conn.prepare(
            "SELECT seq, stage, message, details, ts FROM pipeline_log ORDER BY seq DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map([limit], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
            ))
        })?;
        let mut events = Vec::new();
        for row in rows {
            let (seq, stage, message, details, ts) = row?;
            events.push(PipelineEvent {
                seq,
                stage,
                message,
                details: serde_json::from_str(&details).unwrap_or(serde_json::Value::Null),
                timestamp: parse_timestamp(&ts),
            });
        }
        Ok(events)
    }

    // ── Config ────────────────────────────────────────────────────────────

    pub fn save_config(&self, config: &ReviewConfig) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO review_config (id, data) VALUES (1, ?1)",
            [serde_json::to_string(config)?],
        )?;
        Ok(())
    }

    pub fn load_config(&self) -> Result<Option<ReviewConfig>> {
        let data: Option<String> = self
            .conn
            .query_row("SELECT data FROM review_config WHERE id = 1", [], |r| r.get(0))
            .optional()?;
        match data {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    // ── Generated queries ─────────────────────────────────────────────────

    /// Replace the stored query list wholesale.
    pub fn save_queries(&self, queries: &[GeneratedQuery]) -> Result<()> {
        self.conn.execute("DELETE FROM generated_queries", [])?;
        for (pos, query) in queries.iter().enumerate() {
            self.conn.execute(
                "INSERT INTO generated_queries (pos, catalog, query_text, description) VALUES (?1, ?2, ?3, ?4)",
                params![pos as i64, query.catalog.as_str(), query.query_text, query.description],
            )?;
        }
        Ok(())
    }

    pub fn load_queries(&self) -> Result<Vec<GeneratedQuery>> {
        let mut stmt = self.conn.prepare(
            "SELECT catalog, query_text, description FROM generated_queries ORDER BY pos",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?;
        let mut queries = Vec::new();
        for row in rows {
            let (catalog, query_text, description) = row?;
            let catalog = match catalog.as_str() {
                "semantic_scholar" => CatalogSource::SemanticScholar,
                _ => CatalogSource::OpenAlex,
            };
            queries.push(GeneratedQuery {
                catalog,
                query_text,
                description,
            });
        }
        Ok(queries)
    }

    // ── Embeddings ────────────────────────────────────────────────────────

    /// Overwrites any previous vector for the paper.
    pub fn save_embedding(&self, paper_id: &str, vector: &[f32]) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO embeddings (paper_id, vector) VALUES (?1, ?2)",
            params![paper_id, serde_json::to_string(vector)?],
        )?;
        Ok(())
    }

    pub fn load_embeddings(&self) -> Result<HashMap<String, Vec<f32>>> {
        let mut stmt = self.conn.prepare("SELECT paper_id, vector FROM embeddings")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;
        let mut map = HashMap::new();
        for row in rows {
            let (id, raw) = row?;
            let vector: Vec<f32> = serde_json::from_str(&raw)?;
            map.insert(id, vector);
        }
        Ok(map)
    }

    // ── Synthesis ─────────────────────────────────────────────────────────

    /// Replaces the singleton synthesis record.
    pub fn save_synthesis(&self, result: &SynthesisResult) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO synthesis_result (id, data, created_at) VALUES (1, ?1, ?2)",
            params![serde_json::to_string(result)?, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    pub fn load_synthesis(&self) -> Result<Option<SynthesisResult>> {
        let data: Option<String> = self
            .conn
            .query_row("SELECT data FROM synthesis_result WHERE id = 1", [], |r| r.get(0))
            .optional()?;
        match data {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }
}

fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn row_to_paper(row: &Row<'_>) -> rusqlite::Result<Paper> {
    let authors: String = row.get("authors")?;
    let concepts: String = row.get("concepts")?;
    let referenced: String = row.get("referenced_works")?;
    let created_at: String = row.get("created_at")?;

    let screening = match row.get::<_, Option<String>>("screening_decision")? {
        Some(label) => Some(ScreeningState {
            decision: ScreeningDecision::coerce(&label),
            reason: row
                .get::<_, Option<String>>("screening_reason")?
                .unwrap_or_default(),
            confidence: row
                .get::<_, Option<f64>>("screening_confidence")?
                .unwrap_or(50.0),
        }),
        None => None,
    };
    let quality = match row.get::<_, Option<f64>>("quality_score")? {
        Some(score) => Some(QualityState {
            score,
            notes: row
                .get::<_, Option<String>>("quality_notes")?
                .unwrap_or_default(),
            flag: QualityFlag::parse(
                &row.get::<_, Option<String>>("quality_flag")?
                    .unwrap_or_default(),
            ),
        }),
        None => None,
    };

    Ok(Paper {
        id: row.get("id")?,
        doi: row.get("doi")?,
        title: row.get("title")?,
        abstract_text: row.get("abstract_text")?,
        authors: serde_json::from_str(&authors).unwrap_or_default(),
        year: row.get("year")?,
        venue: row.get("venue")?,
        citation_count: row.get("citation_count")?,
        document_type: row.get("document_type")?,
        open_access_url: row.get("open_access_url")?,
        concepts: serde_json::from_str(&concepts).unwrap_or_default(),
        openalex_id: row.get("openalex_id")?,
        semantic_scholar_id: row.get("semantic_scholar_id")?,
        referenced_works: serde_json::from_str(&referenced).unwrap_or_default(),
        query_source: row.get("query_source")?,
        found_via: row.get("found_via")?,
        screening,
        human_decision: row
            .get::<_, Option<String>>("human_decision")?
            .as_deref()
            .and_then(HumanDecision::parse),
        quality,
        relevance_score: row.get("relevance_score")?,
        cluster_id: row.get("cluster_id")?,
        cluster_label: row.get("cluster_label")?,
        final_status: row
            .get::<_, Option<String>>("final_status")?
            .as_deref()
            .and_then(FinalStatus::parse),
        created_at: parse_timestamp(&created_at),
    })
}
