//! SQLite-backed job store.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::{Row, SqlitePool, sqlite::SqliteRow};

use wms_core::JobId;

use crate::store::{JobStore, JobStoreError};
use crate::types::{Job, JobStatus};

/// SQLite-backed job store.
///
/// Cheap to clone; safe to share between the enqueuing application and the
/// worker (they write disjoint rows: enqueue inserts, the worker updates).
#[derive(Debug, Clone)]
pub struct SqliteJobStore {
    pool: SqlitePool,
}

impl SqliteJobStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create the jobs table and its polling index if missing.
    pub async fn ensure_schema(&self) -> Result<(), JobStoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sap_jobs (
                id                   TEXT PRIMARY KEY,
                job_type             TEXT NOT NULL,
                document_type        TEXT NOT NULL,
                document_id          TEXT NOT NULL,
                payload              TEXT NOT NULL,
                status               TEXT NOT NULL,
                retry_count          INTEGER NOT NULL DEFAULT 0,
                max_retries          INTEGER NOT NULL,
                next_retry_at        TEXT NULL,
                created_at           TEXT NOT NULL,
                started_at           TEXT NULL,
                completed_at         TEXT NULL,
                error_message        TEXT NULL,
                result               TEXT NULL,
                sap_document_number  TEXT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_sap_jobs_status_created
             ON sap_jobs (status, created_at)",
        )
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        Ok(())
    }

    async fn fetch_where(
        &self,
        condition: &str,
        bind_time: Option<String>,
    ) -> Result<Vec<Job>, JobStoreError> {
        let sql = format!(
            "SELECT id, job_type, document_type, document_id, payload, status,
                    retry_count, max_retries, next_retry_at, created_at,
                    started_at, completed_at, error_message, result,
                    sap_document_number
             FROM sap_jobs
             WHERE {condition}
             ORDER BY created_at ASC, id ASC"
        );

        let mut query = sqlx::query(&sql);
        if let Some(time) = bind_time {
            query = query.bind(time);
        }

        let rows = query.fetch_all(&self.pool).await.map_err(storage_err)?;
        rows.into_iter().map(row_to_job).collect()
    }
}

#[async_trait]
impl JobStore for SqliteJobStore {
    async fn enqueue(&self, job: Job) -> Result<JobId, JobStoreError> {
        let result = sqlx::query(
            r#"
            INSERT OR IGNORE INTO sap_jobs (
                id, job_type, document_type, document_id, payload, status,
                retry_count, max_retries, next_retry_at, created_at,
                started_at, completed_at, error_message, result,
                sap_document_number
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
            "#,
        )
        .bind(job.id.to_string())
        .bind(&job.job_type)
        .bind(job.document_type.as_str())
        .bind(job.document_id.to_string())
        .bind(job.payload.to_string())
        .bind(job.status.as_str())
        .bind(job.retry_count as i64)
        .bind(job.max_retries as i64)
        .bind(job.next_retry_at.map(timestamp))
        .bind(timestamp(job.created_at))
        .bind(job.started_at.map(timestamp))
        .bind(job.completed_at.map(timestamp))
        .bind(job.error_message.clone())
        .bind(job.result.as_ref().map(|r| r.to_string()))
        .bind(job.sap_document_number.clone())
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        if result.rows_affected() == 0 {
            return Err(JobStoreError::AlreadyExists(job.id));
        }
        Ok(job.id)
    }

    async fn get(&self, job_id: JobId) -> Result<Option<Job>, JobStoreError> {
        let row = sqlx::query(
            "SELECT id, job_type, document_type, document_id, payload, status,
                    retry_count, max_retries, next_retry_at, created_at,
                    started_at, completed_at, error_message, result,
                    sap_document_number
             FROM sap_jobs WHERE id = ?1",
        )
        .bind(job_id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_err)?;

        row.map(row_to_job).transpose()
    }

    async fn fetch_pending(&self) -> Result<Vec<Job>, JobStoreError> {
        self.fetch_where("status = 'pending'", None).await
    }

    async fn fetch_retry_ready(&self, now: DateTime<Utc>) -> Result<Vec<Job>, JobStoreError> {
        self.fetch_where(
            "status = 'retrying' AND next_retry_at IS NOT NULL AND next_retry_at <= ?1",
            Some(timestamp(now)),
        )
        .await
    }

    async fn update(&self, job: &Job) -> Result<(), JobStoreError> {
        // payload, job_type, document refs and created_at are write-once;
        // only the mutable field set is touched here.
        let result = sqlx::query(
            r#"
            UPDATE sap_jobs
            SET status = ?2,
                retry_count = ?3,
                next_retry_at = ?4,
                started_at = ?5,
                completed_at = ?6,
                error_message = ?7,
                result = ?8,
                sap_document_number = ?9
            WHERE id = ?1
            "#,
        )
        .bind(job.id.to_string())
        .bind(job.status.as_str())
        .bind(job.retry_count as i64)
        .bind(job.next_retry_at.map(timestamp))
        .bind(job.started_at.map(timestamp))
        .bind(job.completed_at.map(timestamp))
        .bind(job.error_message.clone())
        .bind(job.result.as_ref().map(|r| r.to_string()))
        .bind(job.sap_document_number.clone())
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        if result.rows_affected() == 0 {
            return Err(JobStoreError::NotFound(job.id));
        }
        Ok(())
    }
}

fn storage_err(err: sqlx::Error) -> JobStoreError {
    JobStoreError::Storage(err.to_string())
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn parse_timestamp(raw: String, column: &str) -> Result<DateTime<Utc>, JobStoreError> {
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| JobStoreError::Storage(format!("invalid {column}: {e}")))
}

fn parse_opt_timestamp(
    raw: Option<String>,
    column: &str,
) -> Result<Option<DateTime<Utc>>, JobStoreError> {
    raw.map(|s| parse_timestamp(s, column)).transpose()
}

fn row_to_job(row: SqliteRow) -> Result<Job, JobStoreError> {
    let storage = |e: sqlx::Error| JobStoreError::Storage(e.to_string());

    let id_str: String = row.try_get("id").map_err(storage)?;
    let id: JobId = id_str
        .parse()
        .map_err(|e| JobStoreError::Storage(format!("invalid job id: {e}")))?;

    let document_type_str: String = row.try_get("document_type").map_err(storage)?;
    let document_type = document_type_str
        .parse()
        .map_err(|e| JobStoreError::Storage(format!("invalid document type: {e}")))?;

    let document_id_str: String = row.try_get("document_id").map_err(storage)?;
    let document_id = document_id_str
        .parse()
        .map_err(|e| JobStoreError::Storage(format!("invalid document id: {e}")))?;

    let payload_str: String = row.try_get("payload").map_err(storage)?;
    let payload = serde_json::from_str(&payload_str)
        .map_err(|e| JobStoreError::Storage(format!("invalid payload JSON: {e}")))?;

    let status_str: String = row.try_get("status").map_err(storage)?;
    let status: JobStatus = status_str
        .parse()
        .map_err(|e| JobStoreError::Storage(format!("invalid job status: {e}")))?;

    let result_str: Option<String> = row.try_get("result").map_err(storage)?;
    let result = result_str
        .map(|s| serde_json::from_str(&s))
        .transpose()
        .map_err(|e| JobStoreError::Storage(format!("invalid result JSON: {e}")))?;

    let retry_count: i64 = row.try_get("retry_count").map_err(storage)?;
    let max_retries: i64 = row.try_get("max_retries").map_err(storage)?;

    let created_at: String = row.try_get("created_at").map_err(storage)?;

    Ok(Job {
        id,
        job_type: row.try_get("job_type").map_err(storage)?,
        document_type,
        document_id,
        payload,
        status,
        retry_count: retry_count as u32,
        max_retries: max_retries as u32,
        next_retry_at: parse_opt_timestamp(
            row.try_get("next_retry_at").map_err(storage)?,
            "next_retry_at",
        )?,
        created_at: parse_timestamp(created_at, "created_at")?,
        started_at: parse_opt_timestamp(row.try_get("started_at").map_err(storage)?, "started_at")?,
        completed_at: parse_opt_timestamp(
            row.try_get("completed_at").map_err(storage)?,
            "completed_at",
        )?,
        error_message: row.try_get("error_message").map_err(storage)?,
        result,
        sap_document_number: row.try_get("sap_document_number").map_err(storage)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::JobKind;
    use chrono::Duration;
    use sqlx::sqlite::SqlitePoolOptions;
    use wms_core::DocumentId;

    async fn test_store() -> SqliteJobStore {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        let store = SqliteJobStore::new(pool);
        store.ensure_schema().await.unwrap();
        store
    }

    fn transfer_job() -> Job {
        Job::new(
            &JobKind::SerialTransfer {
                transfer_id: DocumentId::new(),
            },
            3,
        )
    }

    #[tokio::test]
    async fn enqueue_and_get_round_trips_every_field() {
        let store = test_store().await;
        let mut job = transfer_job();
        job.status = JobStatus::Retrying;
        job.retry_count = 2;
        job.next_retry_at = Some(Utc::now() + Duration::seconds(60));
        job.started_at = Some(Utc::now());
        job.error_message = Some("SAP rejected the document: timeout".to_string());

        store.enqueue(job.clone()).await.unwrap();
        let loaded = store.get(job.id).await.unwrap().unwrap();

        assert_eq!(loaded, job);
    }

    #[tokio::test]
    async fn enqueue_rejects_duplicate_ids() {
        let store = test_store().await;
        let job = transfer_job();
        store.enqueue(job.clone()).await.unwrap();
        assert!(matches!(
            store.enqueue(job).await,
            Err(JobStoreError::AlreadyExists(_))
        ));
    }

    #[tokio::test]
    async fn fetch_pending_is_fifo() {
        let store = test_store().await;
        let base = Utc::now();

        let mut expected = Vec::new();
        for offset in [3i64, 1, 2] {
            let mut job = transfer_job();
            job.created_at = base + Duration::seconds(offset);
            expected.push((offset, job.id));
            store.enqueue(job).await.unwrap();
        }
        expected.sort_by_key(|(offset, _)| *offset);

        let pending = store.fetch_pending().await.unwrap();
        let fetched: Vec<JobId> = pending.iter().map(|j| j.id).collect();
        let expected: Vec<JobId> = expected.into_iter().map(|(_, id)| id).collect();
        assert_eq!(fetched, expected);
    }

    #[tokio::test]
    async fn fetch_retry_ready_excludes_future_and_non_retrying() {
        let store = test_store().await;
        let now = Utc::now();

        let mut due = transfer_job();
        due.status = JobStatus::Retrying;
        due.next_retry_at = Some(now - Duration::seconds(5));
        let due_id = due.id;
        store.enqueue(due).await.unwrap();

        let mut future = transfer_job();
        future.status = JobStatus::Retrying;
        future.next_retry_at = Some(now + Duration::seconds(300));
        store.enqueue(future).await.unwrap();

        let pending = transfer_job();
        store.enqueue(pending).await.unwrap();

        let ready = store.fetch_retry_ready(now).await.unwrap();
        assert_eq!(ready.len(), 1);
        assert_eq!(ready[0].id, due_id);
    }

    #[tokio::test]
    async fn update_persists_the_mutable_fields() {
        let store = test_store().await;
        let mut job = transfer_job();
        store.enqueue(job.clone()).await.unwrap();

        job.status = JobStatus::Completed;
        job.completed_at = Some(Utc::now());
        job.result = Some(serde_json::json!({"DocNum": 90001}));
        job.sap_document_number = Some("90001".to_string());
        store.update(&job).await.unwrap();

        let loaded = store.get(job.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, JobStatus::Completed);
        assert_eq!(loaded.sap_document_number.as_deref(), Some("90001"));
        assert_eq!(loaded.result, job.result);
    }

    #[tokio::test]
    async fn update_unknown_job_is_not_found() {
        let store = test_store().await;
        let job = transfer_job();
        assert!(matches!(
            store.update(&job).await,
            Err(JobStoreError::NotFound(_))
        ));
    }
}
