//! SQLite-backed durable job store.
//!
//! Grounded on `original_source/src/core/job_manager.py`'s `_init_db`/
//! `_save_job`/`_get_job_from_db` (JSON-encoded `result`/`error_details`
//! columns, upsert-by-id writes on every transition), expressed with
//! `sqlx::SqlitePool` since that's already a dependency, rather than ported
//! from any single existing file (nothing else here persists structured job
//! records, only page mirrors on disk).

use super::job::{ErrorDetails, Job, JobStatus};
use crate::extractor::Artifact;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("corrupt job record: {0}")]
    Corrupt(String),
}

pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// `create_if_missing(true)` is required here: a fresh deployment's
    /// `storage/` directory exists (`main.rs` creates it) but the sqlite
    /// file itself does not, and sqlx's default `false` fails to connect
    /// rather than create one.
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new().max_connections(5).connect_with(options).await?;
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS jobs (
                id TEXT PRIMARY KEY,
                url TEXT NOT NULL,
                session_key TEXT,
                callback_url TEXT,
                issue_ref INTEGER,
                status TEXT NOT NULL,
                result TEXT,
                error TEXT,
                created_at TEXT NOT NULL,
                started_at TEXT,
                completed_at TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Upsert-by-id, matching `_save_job`'s `INSERT OR REPLACE`.
    pub async fn save(&self, job: &Job) -> Result<(), StoreError> {
        let result_json = job.result.as_ref().map(serde_json::to_string).transpose().map_err(|e| StoreError::Corrupt(e.to_string()))?;
        let error_json = job.error.as_ref().map(serde_json::to_string).transpose().map_err(|e| StoreError::Corrupt(e.to_string()))?;

        sqlx::query(
            r#"
            INSERT OR REPLACE INTO jobs
                (id, url, session_key, callback_url, issue_ref, status, result, error, created_at, started_at, completed_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(job.id.to_string())
        .bind(&job.url)
        .bind(&job.session_key)
        .bind(&job.callback_url)
        .bind(job.issue_ref)
        .bind(job.status.as_str())
        .bind(result_json)
        .bind(error_json)
        .bind(job.created_at.to_rfc3339())
        .bind(job.started_at.map(|t| t.to_rfc3339()))
        .bind(job.completed_at.map(|t| t.to_rfc3339()))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<Job>, StoreError> {
        let row = sqlx::query("SELECT * FROM jobs WHERE id = ?").bind(id.to_string()).fetch_optional(&self.pool).await?;
        row.map(row_to_job).transpose()
    }

    /// Delete every row whose `completed_at` predates `cutoff`
    /// ("Cleanup").
    pub async fn delete_completed_before(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM jobs WHERE completed_at IS NOT NULL AND completed_at < ?")
            .bind(cutoff.to_rfc3339())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Jobs still `processing` — left behind by a crash.
    pub async fn find_abandoned_processing(&self) -> Result<Vec<Job>, StoreError> {
        let rows = sqlx::query("SELECT * FROM jobs WHERE status = 'processing'").fetch_all(&self.pool).await?;
        rows.into_iter().map(row_to_job).collect()
    }

    pub async fn mark_queued(&self, id: Uuid) -> Result<(), StoreError> {
        sqlx::query("UPDATE jobs SET status = 'queued' WHERE id = ?").bind(id.to_string()).execute(&self.pool).await?;
        Ok(())
    }
}

fn row_to_job(row: sqlx::sqlite::SqliteRow) -> Result<Job, StoreError> {
    let id: String = row.try_get("id")?;
    let status: String = row.try_get("status")?;
    let result: Option<String> = row.try_get("result")?;
    let error: Option<String> = row.try_get("error")?;
    let created_at: String = row.try_get("created_at")?;
    let started_at: Option<String> = row.try_get("started_at")?;
    let completed_at: Option<String> = row.try_get("completed_at")?;

    Ok(Job {
        id: Uuid::parse_str(&id).map_err(|e| StoreError::Corrupt(e.to_string()))?,
        url: row.try_get("url")?,
        session_key: row.try_get("session_key")?,
        callback_url: row.try_get("callback_url")?,
        issue_ref: row.try_get("issue_ref")?,
        status: status.parse().map_err(|e: anyhow::Error| StoreError::Corrupt(e.to_string()))?,
        result: result.map(|s| serde_json::from_str::<Artifact>(&s)).transpose().map_err(|e| StoreError::Corrupt(e.to_string()))?,
        error: error.map(|s| serde_json::from_str::<ErrorDetails>(&s)).transpose().map_err(|e| StoreError::Corrupt(e.to_string()))?,
        created_at: parse_timestamp(&created_at)?,
        started_at: started_at.map(|s| parse_timestamp(&s)).transpose()?,
        completed_at: completed_at.map(|s| parse_timestamp(&s)).transpose()?,
    })
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(s).map(|t| t.with_timezone(&Utc)).map_err(|e| StoreError::Corrupt(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn memory_store() -> Store {
        Store::connect("sqlite::memory:").await.unwrap()
    }

    #[tokio::test]
    async fn round_trips_a_queued_job() {
        let store = memory_store().await;
        let job = Job::new("https://example.com".into(), None, None, None);
        store.save(&job).await.unwrap();

        let loaded = store.get(job.id).await.unwrap().unwrap();
        assert_eq!(loaded.url, job.url);
        assert_eq!(loaded.status, JobStatus::Queued);
    }

    #[tokio::test]
    async fn missing_job_is_none() {
        let store = memory_store().await;
        assert!(store.get(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn save_is_an_upsert() {
        let store = memory_store().await;
        let mut job = Job::new("https://example.com".into(), None, None, None);
        store.save(&job).await.unwrap();

        job.status = JobStatus::Completed;
        job.result = Some(Artifact::default());
        job.completed_at = Some(Utc::now());
        store.save(&job).await.unwrap();

        let loaded = store.get(job.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, JobStatus::Completed);
        assert!(loaded.result.is_some());
    }

    #[tokio::test]
    async fn cleanup_deletes_only_expired_completed_jobs() {
        let store = memory_store().await;
        let mut old_job = Job::new("https://old.example.com".into(), None, None, None);
        old_job.status = JobStatus::Completed;
        old_job.completed_at = Some(Utc::now() - chrono::Duration::days(2));
        store.save(&old_job).await.unwrap();

        let mut recent_job = Job::new("https://recent.example.com".into(), None, None, None);
        recent_job.status = JobStatus::Completed;
        recent_job.completed_at = Some(Utc::now());
        store.save(&recent_job).await.unwrap();

        let cutoff = Utc::now() - chrono::Duration::hours(1);
        let deleted = store.delete_completed_before(cutoff).await.unwrap();
        assert_eq!(deleted, 1);
        assert!(store.get(old_job.id).await.unwrap().is_none());
        assert!(store.get(recent_job.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn finds_abandoned_processing_jobs() {
        let store = memory_store().await;
        let mut job = Job::new("https://example.com".into(), None, None, None);
        job.status = JobStatus::Processing;
        job.started_at = Some(Utc::now());
        store.save(&job).await.unwrap();

        let abandoned = store.find_abandoned_processing().await.unwrap();
        assert_eq!(abandoned.len(), 1);
        assert_eq!(abandoned[0].id, job.id);
    }
}
