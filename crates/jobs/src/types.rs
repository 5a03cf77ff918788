//! Core job types and the job state machine.

use chrono::{DateTime, Utc};
use core::str::FromStr;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use wms_core::{DocumentId, DomainError, JobId};
use wms_documents::DocumentType;

/// Job execution status.
///
/// Transitions: `pending → processing → {completed, retrying}`,
/// `retrying → processing`, `processing → failed` (retry exhaustion or
/// permanent error). `completed` and `failed` are terminal.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Queued, waiting to be picked up.
    Pending,
    /// Currently being executed by the worker.
    Processing,
    /// Failed transiently; eligible again once `next_retry_at` passes.
    Retrying,
    /// Posted to SAP successfully.
    Completed,
    /// Gave up: retries exhausted or the failure was permanent.
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Retrying => "retrying",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }
}

impl FromStr for JobStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "processing" => Ok(JobStatus::Processing),
            "retrying" => Ok(JobStatus::Retrying),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            other => Err(DomainError::validation(format!(
                "unknown job status '{other}'"
            ))),
        }
    }
}

/// What a job does, with its typed payload.
///
/// Closed set: the processor dispatches with an exhaustive `match`, so adding
/// a job type is a compile-time-checked change. The enqueue path serializes
/// this once into `Job::payload`; the processor decodes it once per attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "job_type", rename_all = "snake_case")]
pub enum JobKind {
    /// Post a goods receipt PO to SAP.
    GrpoPost { grpo_id: DocumentId },
    /// Post a serialized stock transfer to SAP.
    SerialTransfer { transfer_id: DocumentId },
}

impl JobKind {
    pub fn job_type(&self) -> &'static str {
        match self {
            JobKind::GrpoPost { .. } => "grpo_post",
            JobKind::SerialTransfer { .. } => "serial_transfer",
        }
    }

    pub fn document_type(&self) -> DocumentType {
        match self {
            JobKind::GrpoPost { .. } => DocumentType::Grpo,
            JobKind::SerialTransfer { .. } => DocumentType::SerialItemTransfer,
        }
    }

    pub fn document_id(&self) -> DocumentId {
        match self {
            JobKind::GrpoPost { grpo_id } => *grpo_id,
            JobKind::SerialTransfer { transfer_id } => *transfer_id,
        }
    }

    /// Serialize into the write-once job payload.
    pub fn to_payload(&self) -> JsonValue {
        // This enum has no fallible serialization paths.
        serde_json::to_value(self).expect("JobKind serialization is infallible")
    }

    /// Decode a persisted payload. Fails when the tag is unknown, which the
    /// processor classifies as a permanent error.
    pub fn from_payload(payload: &JsonValue) -> Result<Self, serde_json::Error> {
        serde_json::from_value(payload.clone())
    }
}

/// A persisted unit of deferred work: one attempt to synchronize a business
/// document with SAP.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    /// Persisted kind tag (`grpo_post`, `serial_transfer`), denormalized for
    /// queries and operator visibility.
    pub job_type: String,
    pub document_type: DocumentType,
    pub document_id: DocumentId,
    /// Write-once at creation: the serialized [`JobKind`].
    pub payload: JsonValue,
    pub status: JobStatus,
    /// Failed attempts so far; never exceeds `max_retries` while the job is
    /// still live.
    pub retry_count: u32,
    pub max_retries: u32,
    /// Only meaningful while `status == Retrying`.
    pub next_retry_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    /// Set once, on the first processing attempt.
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Last failure description.
    pub error_message: Option<String>,
    /// Raw SAP response; set only on success.
    pub result: Option<JsonValue>,
    /// SAP document number; set only on success.
    pub sap_document_number: Option<String>,
}

impl Job {
    /// Create a pending job for the given kind.
    pub fn new(kind: &JobKind, max_retries: u32) -> Self {
        Self {
            id: JobId::new(),
            job_type: kind.job_type().to_string(),
            document_type: kind.document_type(),
            document_id: kind.document_id(),
            payload: kind.to_payload(),
            status: JobStatus::Pending,
            retry_count: 0,
            max_retries,
            next_retry_at: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            error_message: None,
            result: None,
            sap_document_number: None,
        }
    }
}
