//! `wms-jobs` — background job system for SAP B1 integration.
//!
//! ## Design
//!
//! - A job is one persisted attempt to synchronize a business document with
//!   SAP; enqueueing is cheap and never blocks on the integration itself
//! - Transient SAP failures are retried with exponential backoff up to a
//!   per-job `max_retries`; unknown job types and missing documents fail
//!   permanently on the spot
//! - The document's status always tracks the eventual outcome: `posted` on
//!   success, reverted to `qc_approved` when the worker gives up
//! - A single worker drives all processing, so no two attempts ever race on
//!   the same job
//!
//! ## Components
//!
//! - `Job` / `JobKind` / `JobStatus`: the persisted unit of work
//! - `RetryPolicy`: pure backoff/terminal decision
//! - `JobStore`: persistence (in-memory or SQLite)
//! - `JobProcessor`: dispatch, SAP call, job + document outcome writes
//! - `SyncWorker`: the polling loop with start/stop lifecycle

pub mod config;
pub mod processor;
pub mod retry;
pub mod sqlite;
pub mod store;
pub mod types;
pub mod worker;

pub use config::WorkerConfig;
pub use processor::JobProcessor;
pub use retry::{RetryDecision, RetryPolicy};
pub use sqlite::SqliteJobStore;
pub use store::{InMemoryJobStore, JobStore, JobStoreError};
pub use types::{Job, JobKind, JobStatus};
pub use worker::SyncWorker;
