use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::app_dirs::AppDirs;
use crate::error::{ProctorError, Result};
use crate::modality::Answers;
use crate::session::SessionResult;

/// Where finished sessions go. Implementations may fail; the caller keeps the
/// result and may try again.
pub trait ResultSink {
    fn submit(&mut self, result: &SessionResult) -> Result<()>;
}

/// One row of the history listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredSummary {
    pub session_id: String,
    pub modality: String,
    pub status: String,
    pub score: Option<u32>,
    pub violations: u32,
    pub elapsed_seconds: u32,
    pub completed_at: DateTime<Utc>,
}

/// SQLite-backed result history
#[derive(Debug)]
pub struct ResultStore {
    conn: Connection,
}

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS session_results (
        id TEXT PRIMARY KEY,
        modality TEXT NOT NULL,
        status TEXT NOT NULL,
        score INTEGER,
        violations INTEGER NOT NULL,
        elapsed INTEGER NOT NULL,
        json TEXT NOT NULL,
        completed_at TEXT NOT NULL
    );
    CREATE TABLE IF NOT EXISTS recordings (
        session_id TEXT NOT NULL REFERENCES session_results(id),
        question_id TEXT NOT NULL,
        mime TEXT NOT NULL,
        bytes BLOB NOT NULL,
        PRIMARY KEY (session_id, question_id)
    );
    CREATE INDEX IF NOT EXISTS idx_session_results_completed ON session_results(completed_at);
"#;

impl ResultStore {
    /// Open the store at the default state location, creating it if needed.
    pub fn open_default() -> Result<Self> {
        let path = AppDirs::db_path().unwrap_or_else(|| PathBuf::from("proctor_results.db"));
        Self::open(path)
    }

    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }
        Self::init(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    /// Most recent results first.
    pub fn recent(&self, limit: usize) -> Result<Vec<StoredSummary>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, modality, status, score, violations, elapsed, completed_at
            FROM session_results
            ORDER BY completed_at DESC
            LIMIT ?1
            "#,
        )?;

        let rows = stmt.query_map([limit as i64], |row| {
            let completed: String = row.get(6)?;
            let completed_at = DateTime::parse_from_rfc3339(&completed)
                .map_err(|e| {
                    rusqlite::Error::FromSqlConversionFailure(
                        6,
                        rusqlite::types::Type::Text,
                        Box::new(e),
                    )
                })?
                .with_timezone(&Utc);
            Ok(StoredSummary {
                session_id: row.get(0)?,
                modality: row.get(1)?,
                status: row.get(2)?,
                score: row.get(3)?,
                violations: row.get(4)?,
                elapsed_seconds: row.get(5)?,
                completed_at,
            })
        })?;

        let mut summaries = Vec::new();
        for summary in rows {
            summaries.push(summary?);
        }
        Ok(summaries)
    }

    pub fn load(&self, session_id: &str) -> Result<Option<SessionResult>> {
        let json: Option<String> = self
            .conn
            .query_row(
                "SELECT json FROM session_results WHERE id = ?1",
                [session_id],
                |row| row.get(0),
            )
            .optional()?;
        match json {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    /// Raw bytes of one interview answer.
    pub fn recording(&self, session_id: &str, question_id: &str) -> Result<Option<Vec<u8>>> {
        let bytes = self
            .conn
            .query_row(
                "SELECT bytes FROM recordings WHERE session_id = ?1 AND question_id = ?2",
                params![session_id, question_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(bytes)
    }

    pub fn count(&self) -> Result<usize> {
        let n: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM session_results", [], |row| row.get(0))?;
        Ok(n as usize)
    }
}

impl ResultSink for ResultStore {
    fn submit(&mut self, result: &SessionResult) -> Result<()> {
        let json = serde_json::to_string(result)?;
        let tx = self.conn.transaction()?;
        tx.execute(
            r#"
            INSERT OR REPLACE INTO session_results
            (id, modality, status, score, violations, elapsed, json, completed_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
            params![
                result.session_id,
                result.modality.to_string(),
                result.status.to_string(),
                result.score,
                result.violation_count,
                result.elapsed_seconds,
                json,
                result.completed_at.to_rfc3339(),
            ],
        )?;

        if let Answers::Interview(recordings) = &result.answers {
            for (question, blob) in recordings {
                tx.execute(
                    r#"
                    INSERT OR REPLACE INTO recordings (session_id, question_id, mime, bytes)
                    VALUES (?1, ?2, ?3, ?4)
                    "#,
                    params![result.session_id, question.as_str(), blob.mime, blob.data],
                )?;
            }
        }

        tx.commit()?;
        info!(id = %result.session_id, status = %result.status, "result stored");
        Ok(())
    }
}

/// A finished result that has not reached its sink yet.
#[derive(Debug, Clone)]
pub struct PendingSubmission {
    result: SessionResult,
    attempts: u32,
}

impl PendingSubmission {
    pub fn new(result: SessionResult) -> Self {
        Self {
            result,
            attempts: 0,
        }
    }

    pub fn result(&self) -> &SessionResult {
        &self.result
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// On failure the result stays here and `Submission` is returned, so the
    /// caller can offer a retry.
    pub fn submit_to(&mut self, sink: &mut dyn ResultSink) -> Result<()> {
        self.attempts += 1;
        sink.submit(&self.result).map_err(|err| {
            warn!(attempt = self.attempts, error = %err, "result submission failed");
            match err {
                ProctorError::Submission(msg) => ProctorError::Submission(msg),
                other => ProctorError::Submission(other.to_string()),
            }
        })
    }
}
