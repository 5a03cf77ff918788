//! Job execution: dispatch, the SAP call, and the outcome writes.

use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};
use tracing::{info, warn};

use wms_documents::{Document, DocumentDetails, DocumentStore, DocumentStoreError};
use wms_sap::{GoodsReceiptRequest, SapClient, SapPostResult, SerialTransferRequest};

use crate::retry::{RetryDecision, RetryPolicy};
use crate::store::{JobStore, JobStoreError};
use crate::types::{Job, JobKind, JobStatus};

/// How a single attempt failed.
enum AttemptError {
    /// Worth retrying: SAP or storage misbehaved.
    Transient(String),
    /// Retrying cannot help: bad payload, missing or mismatched document.
    Permanent(String),
}

/// Executes one job attempt end to end and writes both the job and the
/// document outcome.
///
/// Exactly one processor instance runs at a time (driven by the worker), so
/// job writes never race. The success path writes the document first and the
/// job second; if the process dies between the two, recovery re-runs the job
/// and `mark_posted` is idempotent.
pub struct JobProcessor {
    store: Arc<dyn JobStore>,
    documents: Arc<dyn DocumentStore>,
    sap: Arc<dyn SapClient>,
    retry: RetryPolicy,
}

impl JobProcessor {
    pub fn new(
        store: Arc<dyn JobStore>,
        documents: Arc<dyn DocumentStore>,
        sap: Arc<dyn SapClient>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            store,
            documents,
            sap,
            retry,
        }
    }

    /// Run one attempt of `job` and persist its outcome.
    ///
    /// Returns the status the job ended the attempt in. Errors are store
    /// failures only; SAP failures are absorbed into the retry bookkeeping.
    pub async fn process(&self, mut job: Job) -> Result<JobStatus, JobStoreError> {
        job.status = JobStatus::Processing;
        job.started_at.get_or_insert_with(Utc::now);
        job.next_retry_at = None;
        self.store.update(&job).await?;

        info!(
            job_id = %job.id,
            job_type = %job.job_type,
            attempt = job.retry_count + 1,
            "processing job"
        );

        match self.attempt(&job).await {
            Ok(result) => self.complete(job, result).await,
            Err(AttemptError::Transient(message)) => self.fail_transient(job, message).await,
            Err(AttemptError::Permanent(message)) => {
                warn!(job_id = %job.id, error = %message, "permanent job failure");
                self.fail_terminal(job, message).await
            }
        }
    }

    /// One attempt: decode the payload, load the document, call SAP.
    async fn attempt(&self, job: &Job) -> Result<SapPostResult, AttemptError> {
        let kind = JobKind::from_payload(&job.payload)
            .map_err(|e| AttemptError::Permanent(format!("undecodable job payload: {e}")))?;

        let document = self
            .documents
            .get(kind.document_type(), kind.document_id())
            .await
            .map_err(|e| AttemptError::Transient(format!("document lookup failed: {e}")))?
            .ok_or_else(|| {
                AttemptError::Permanent(format!(
                    "document {} not found for {}",
                    kind.document_id(),
                    kind.job_type()
                ))
            })?;

        match (&kind, &document) {
            (
                JobKind::GrpoPost { grpo_id },
                Document {
                    details:
                        DocumentDetails::Grpo {
                            po_number,
                            supplier_code,
                        },
                    ..
                },
            ) => {
                let request = GoodsReceiptRequest {
                    document_id: *grpo_id,
                    po_number: po_number.clone(),
                    supplier_code: supplier_code.clone(),
                };
                self.sap
                    .post_goods_receipt(&request)
                    .await
                    .map_err(|e| AttemptError::Transient(e.to_string()))
            }
            (
                JobKind::SerialTransfer { transfer_id },
                Document {
                    details:
                        DocumentDetails::SerialItemTransfer {
                            from_warehouse,
                            to_warehouse,
                        },
                    ..
                },
            ) => {
                let request = SerialTransferRequest {
                    document_id: *transfer_id,
                    from_warehouse: from_warehouse.clone(),
                    to_warehouse: to_warehouse.clone(),
                };
                self.sap
                    .post_serial_transfer(&request)
                    .await
                    .map_err(|e| AttemptError::Transient(e.to_string()))
            }
            _ => Err(AttemptError::Permanent(format!(
                "document {} does not carry {} details",
                document.id,
                kind.job_type()
            ))),
        }
    }

    /// Success: document becomes `posted` first, then the job completes.
    async fn complete(&self, mut job: Job, result: SapPostResult) -> Result<JobStatus, JobStoreError> {
        if let Err(e) = self
            .documents
            .mark_posted(job.document_type, job.document_id, &result.document_number)
            .await
        {
            // The SAP call went through but we could not record it locally.
            // Treat as transient; the next attempt re-posts (accepted
            // duplicate-call limitation of the at-least-once model).
            return self
                .fail_transient(job, format!("failed to mark document posted: {e}"))
                .await;
        }

        job.status = JobStatus::Completed;
        job.completed_at = Some(Utc::now());
        job.sap_document_number = Some(result.document_number.clone());
        job.result = Some(result.raw);
        job.error_message = None;
        self.store.update(&job).await?;

        info!(
            job_id = %job.id,
            sap_document_number = %result.document_number,
            "job completed"
        );
        Ok(JobStatus::Completed)
    }

    /// Transient failure: count the attempt, then either schedule a retry or
    /// give up.
    async fn fail_transient(
        &self,
        mut job: Job,
        message: String,
    ) -> Result<JobStatus, JobStoreError> {
        job.retry_count += 1;

        match self.retry.decide(job.retry_count, job.max_retries) {
            RetryDecision::Retry { delay } => {
                let delay = ChronoDuration::from_std(delay).unwrap_or_default();
                job.status = JobStatus::Retrying;
                job.next_retry_at = Some(Utc::now() + delay);
                job.error_message = Some(message.clone());
                self.store.update(&job).await?;

                warn!(
                    job_id = %job.id,
                    retry_count = job.retry_count,
                    next_retry_at = %job.next_retry_at.unwrap_or_default(),
                    error = %message,
                    "job failed, retry scheduled"
                );
                Ok(JobStatus::Retrying)
            }
            RetryDecision::Terminal => self.fail_terminal(job, message).await,
        }
    }

    /// Final failure: the job dies and the document falls back to its
    /// pre-posting-safe status so operators can re-trigger it.
    async fn fail_terminal(&self, mut job: Job, message: String) -> Result<JobStatus, JobStoreError> {
        job.status = JobStatus::Failed;
        job.completed_at = Some(Utc::now());
        job.next_retry_at = None;
        job.error_message = Some(message.clone());
        self.store.update(&job).await?;

        match self
            .documents
            .revert_to_safe(job.document_type, job.document_id)
            .await
        {
            Ok(()) | Err(DocumentStoreError::NotFound(_)) => {}
            Err(e) => {
                warn!(
                    job_id = %job.id,
                    document_id = %job.document_id,
                    error = %e,
                    "failed to revert document after terminal job failure"
                );
            }
        }

        warn!(
            job_id = %job.id,
            retry_count = job.retry_count,
            error = %message,
            "job failed terminally"
        );
        Ok(JobStatus::Failed)
    }
}
