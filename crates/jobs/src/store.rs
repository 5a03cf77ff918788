//! Job storage abstraction and the in-memory implementation.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use wms_core::JobId;

use crate::types::{Job, JobStatus};

/// Job store abstraction.
///
/// The enqueuing collaborator and the worker share this; they never race on
/// the same row because enqueue only inserts and the single worker is the
/// only writer of existing rows.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert a new job. Single atomic write.
    async fn enqueue(&self, job: Job) -> Result<JobId, JobStoreError>;

    /// Fetch a job by id.
    async fn get(&self, job_id: JobId) -> Result<Option<Job>, JobStoreError>;

    /// All pending jobs, oldest first (FIFO, no priorities).
    async fn fetch_pending(&self) -> Result<Vec<Job>, JobStoreError>;

    /// All retrying jobs whose `next_retry_at` has passed, oldest first.
    async fn fetch_retry_ready(&self, now: DateTime<Utc>) -> Result<Vec<Job>, JobStoreError>;

    /// Persist the full mutable field set of one job atomically.
    async fn update(&self, job: &Job) -> Result<(), JobStoreError>;
}

/// Job store error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum JobStoreError {
    #[error("job not found: {0}")]
    NotFound(JobId),
    #[error("job already exists: {0}")]
    AlreadyExists(JobId),
    #[error("storage error: {0}")]
    Storage(String),
}

/// In-memory job store for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryJobStore {
    jobs: RwLock<HashMap<JobId, Job>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    fn sorted_matching(&self, predicate: impl Fn(&Job) -> bool) -> Vec<Job> {
        let jobs = self.jobs.read().unwrap();
        let mut result: Vec<Job> = jobs.values().filter(|j| predicate(j)).cloned().collect();
        // FIFO; job ids are UUIDv7 so they break created_at ties in order.
        result.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.id.as_uuid().cmp(b.id.as_uuid()))
        });
        result
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn enqueue(&self, job: Job) -> Result<JobId, JobStoreError> {
        let mut jobs = self.jobs.write().unwrap();
        if jobs.contains_key(&job.id) {
            return Err(JobStoreError::AlreadyExists(job.id));
        }
        let id = job.id;
        jobs.insert(id, job);
        Ok(id)
    }

    async fn get(&self, job_id: JobId) -> Result<Option<Job>, JobStoreError> {
        let jobs = self.jobs.read().unwrap();
        Ok(jobs.get(&job_id).cloned())
    }

    async fn fetch_pending(&self) -> Result<Vec<Job>, JobStoreError> {
        Ok(self.sorted_matching(|j| j.status == JobStatus::Pending))
    }

    async fn fetch_retry_ready(&self, now: DateTime<Utc>) -> Result<Vec<Job>, JobStoreError> {
        Ok(self.sorted_matching(|j| {
            j.status == JobStatus::Retrying && j.next_retry_at.is_some_and(|at| at <= now)
        }))
    }

    async fn update(&self, job: &Job) -> Result<(), JobStoreError> {
        let mut jobs = self.jobs.write().unwrap();
        if !jobs.contains_key(&job.id) {
            return Err(JobStoreError::NotFound(job.id));
        }
        jobs.insert(job.id, job.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::JobKind;
    use chrono::Duration;
    use wms_core::DocumentId;

    fn grpo_job() -> Job {
        Job::new(
            &JobKind::GrpoPost {
                grpo_id: DocumentId::new(),
            },
            3,
        )
    }

    #[tokio::test]
    async fn enqueue_rejects_duplicate_ids() {
        let store = InMemoryJobStore::new();
        let job = grpo_job();
        store.enqueue(job.clone()).await.unwrap();
        assert!(matches!(
            store.enqueue(job).await,
            Err(JobStoreError::AlreadyExists(_))
        ));
    }

    #[tokio::test]
    async fn fetch_pending_is_fifo() {
        let store = InMemoryJobStore::new();
        let base = Utc::now();

        let mut ids = Vec::new();
        // Enqueue out of creation order to prove the sort.
        for offset in [2i64, 0, 1] {
            let mut job = grpo_job();
            job.created_at = base + Duration::seconds(offset);
            ids.push((offset, job.id));
            store.enqueue(job).await.unwrap();
        }

        let pending = store.fetch_pending().await.unwrap();
        let fetched: Vec<JobId> = pending.iter().map(|j| j.id).collect();

        ids.sort_by_key(|(offset, _)| *offset);
        let expected: Vec<JobId> = ids.into_iter().map(|(_, id)| id).collect();
        assert_eq!(fetched, expected);
    }

    #[tokio::test]
    async fn fetch_retry_ready_honors_next_retry_at() {
        let store = InMemoryJobStore::new();
        let now = Utc::now();

        let mut due = grpo_job();
        due.status = JobStatus::Retrying;
        due.next_retry_at = Some(now - Duration::seconds(1));
        let due_id = due.id;
        store.enqueue(due).await.unwrap();

        let mut not_due = grpo_job();
        not_due.status = JobStatus::Retrying;
        not_due.next_retry_at = Some(now + Duration::seconds(60));
        store.enqueue(not_due).await.unwrap();

        let ready = store.fetch_retry_ready(now).await.unwrap();
        assert_eq!(ready.len(), 1);
        assert_eq!(ready[0].id, due_id);
    }

    #[tokio::test]
    async fn pending_and_retrying_sets_are_disjoint() {
        let store = InMemoryJobStore::new();
        let mut job = grpo_job();
        job.status = JobStatus::Retrying;
        job.next_retry_at = Some(Utc::now() - Duration::seconds(1));
        store.enqueue(job).await.unwrap();

        assert!(store.fetch_pending().await.unwrap().is_empty());
        assert_eq!(store.fetch_retry_ready(Utc::now()).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn update_unknown_job_is_not_found() {
        let store = InMemoryJobStore::new();
        let job = grpo_job();
        assert!(matches!(
            store.update(&job).await,
            Err(JobStoreError::NotFound(_))
        ));
    }
}
