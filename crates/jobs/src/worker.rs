//! Background worker: the polling loop and its start/stop lifecycle.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Utc;
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::config::WorkerConfig;
use crate::processor::JobProcessor;
use crate::store::JobStore;
use crate::types::Job;

/// Single background worker that polls the store and drives the processor.
///
/// One worker per store: with a single driver, jobs are processed strictly
/// one at a time and no attempt ever races another.
pub struct SyncWorker {
    store: Arc<dyn JobStore>,
    processor: Arc<JobProcessor>,
    config: WorkerConfig,
    state: Mutex<Option<RunState>>,
}

struct RunState {
    handle: JoinHandle<()>,
    shutdown: Arc<Notify>,
    stopping: Arc<AtomicBool>,
}

impl SyncWorker {
    pub fn new(
        store: Arc<dyn JobStore>,
        processor: Arc<JobProcessor>,
        config: WorkerConfig,
    ) -> Self {
        Self {
            store,
            processor,
            config,
            state: Mutex::new(None),
        }
    }

    /// Spawn the polling loop. Idempotent: calling while the loop is alive
    /// does nothing.
    pub async fn start(&self) {
        let mut state = self.state.lock().await;
        if let Some(existing) = state.as_ref() {
            if !existing.handle.is_finished() {
                debug!("sync worker already running");
                return;
            }
        }

        // Fresh signals per run: a permit left over from a previous stop()
        // must not short-circuit this one.
        let shutdown = Arc::new(Notify::new());
        let stopping = Arc::new(AtomicBool::new(false));

        let handle = tokio::spawn(run_loop(
            self.store.clone(),
            self.processor.clone(),
            self.config.clone(),
            shutdown.clone(),
            stopping.clone(),
        ));

        *state = Some(RunState {
            handle,
            shutdown,
            stopping,
        });
        info!(
            poll_interval_secs = self.config.poll_interval.as_secs(),
            "sync worker started"
        );
    }

    /// Signal the loop to stop and wait for it, bounded by the configured
    /// shutdown timeout. After this returns the worker will not pick up any
    /// further job, even if an in-flight attempt is still finishing.
    pub async fn stop(&self) {
        let run = { self.state.lock().await.take() };
        let Some(run) = run else {
            debug!("sync worker was not running");
            return;
        };

        run.stopping.store(true, Ordering::SeqCst);
        run.shutdown.notify_one();

        match tokio::time::timeout(self.config.shutdown_timeout, run.handle).await {
            Ok(Ok(())) => info!("sync worker stopped"),
            Ok(Err(e)) => error!(error = %e, "sync worker task panicked"),
            Err(_) => warn!(
                timeout_secs = self.config.shutdown_timeout.as_secs(),
                "sync worker did not stop in time; abandoning the task"
            ),
        }
    }

    /// Whether the polling loop is currently alive.
    pub async fn is_running(&self) -> bool {
        let state = self.state.lock().await;
        state.as_ref().is_some_and(|s| !s.handle.is_finished())
    }
}

async fn run_loop(
    store: Arc<dyn JobStore>,
    processor: Arc<JobProcessor>,
    config: WorkerConfig,
    shutdown: Arc<Notify>,
    stopping: Arc<AtomicBool>,
) {
    let mut ticker = tokio::time::interval(config.poll_interval);
    // A slow cycle should not be followed by a burst of catch-up ticks.
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = shutdown.notified() => break,
            _ = ticker.tick() => {
                if stopping.load(Ordering::SeqCst) {
                    break;
                }
                run_cycle(&store, &processor, &stopping).await;
            }
        }
    }
}

/// One polling cycle: drain pending jobs FIFO, then due retries FIFO.
///
/// A failure on one job never aborts the cycle; it is logged and the cycle
/// moves on.
async fn run_cycle(
    store: &Arc<dyn JobStore>,
    processor: &Arc<JobProcessor>,
    stopping: &Arc<AtomicBool>,
) {
    let pending = match store.fetch_pending().await {
        Ok(jobs) => jobs,
        Err(e) => {
            error!(error = %e, "failed to fetch pending jobs");
            return;
        }
    };
    let retry_ready = match store.fetch_retry_ready(Utc::now()).await {
        Ok(jobs) => jobs,
        Err(e) => {
            error!(error = %e, "failed to fetch retry-ready jobs");
            return;
        }
    };

    let total = pending.len() + retry_ready.len();
    if total > 0 {
        debug!(
            pending = pending.len(),
            retry_ready = retry_ready.len(),
            "polling cycle found work"
        );
    }

    for job in pending.into_iter().chain(retry_ready) {
        if stopping.load(Ordering::SeqCst) {
            return;
        }
        process_one(processor, job).await;
    }
}

async fn process_one(processor: &Arc<JobProcessor>, job: Job) {
    let job_id = job.id;
    if let Err(e) = processor.process(job).await {
        error!(job_id = %job_id, error = %e, "job processing hit a store error");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    use async_trait::async_trait;
    use serde_json::json;

    use wms_core::DocumentId;
    use wms_documents::{
        Document, DocumentDetails, DocumentStatus, DocumentStore, DocumentType,
        InMemoryDocumentStore,
    };
    use wms_sap::{
        GoodsReceiptRequest, SapClient, SapClientError, SapPostResult, SerialTransferRequest,
    };

    use crate::retry::RetryPolicy;
    use crate::store::InMemoryJobStore;
    use crate::types::{JobKind, JobStatus};

    struct FakeSap {
        responses: tokio::sync::Mutex<VecDeque<Result<SapPostResult, SapClientError>>>,
        calls: AtomicUsize,
    }

    impl FakeSap {
        fn scripted(responses: Vec<Result<SapPostResult, SapClientError>>) -> Arc<Self> {
            Arc::new(Self {
                responses: tokio::sync::Mutex::new(responses.into()),
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        async fn next(&self) -> Result<SapPostResult, SapClientError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.responses
                .lock()
                .await
                .pop_front()
                .unwrap_or_else(|| Err(SapClientError::Transport("no scripted response".into())))
        }
    }

    #[async_trait]
    impl SapClient for FakeSap {
        async fn post_goods_receipt(
            &self,
            _request: &GoodsReceiptRequest,
        ) -> Result<SapPostResult, SapClientError> {
            self.next().await
        }

        async fn post_serial_transfer(
            &self,
            _request: &SerialTransferRequest,
        ) -> Result<SapPostResult, SapClientError> {
            self.next().await
        }
    }

    struct Harness {
        store: Arc<InMemoryJobStore>,
        documents: Arc<InMemoryDocumentStore>,
        sap: Arc<FakeSap>,
        worker: SyncWorker,
    }

    fn harness(responses: Vec<Result<SapPostResult, SapClientError>>) -> Harness {
        let store = InMemoryJobStore::arc();
        let documents = InMemoryDocumentStore::arc();
        let sap = FakeSap::scripted(responses);
        let processor = Arc::new(JobProcessor::new(
            store.clone(),
            documents.clone(),
            sap.clone(),
            RetryPolicy::default(),
        ));
        let config = WorkerConfig {
            poll_interval: Duration::from_millis(10),
            shutdown_timeout: Duration::from_secs(1),
            ..WorkerConfig::default()
        };
        let worker = SyncWorker::new(store.clone(), processor, config);
        Harness {
            store,
            documents,
            sap,
            worker,
        }
    }

    async fn seed_grpo(h: &Harness) -> (crate::types::Job, DocumentId) {
        let doc = Document::qc_approved(
            DocumentId::new(),
            DocumentDetails::Grpo {
                po_number: "PO-1001".to_string(),
                supplier_code: "V-200".to_string(),
            },
        );
        let doc_id = doc.id;
        h.documents.insert(doc).await.unwrap();

        let job = crate::types::Job::new(&JobKind::GrpoPost { grpo_id: doc_id }, 3);
        h.store.enqueue(job.clone()).await.unwrap();
        (job, doc_id)
    }

    async fn wait_for<F, Fut>(mut condition: F)
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = bool>,
    {
        for _ in 0..200 {
            if condition().await {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("condition not reached in time");
    }

    #[tokio::test]
    async fn picks_up_a_pending_job_and_completes_it() {
        let h = harness(vec![Ok(SapPostResult {
            document_number: "80001".to_string(),
            raw: json!({"DocNum": "80001"}),
        })]);
        let (job, doc_id) = seed_grpo(&h).await;

        h.worker.start().await;
        wait_for(|| async {
            matches!(
                h.store.get(job.id).await.unwrap(),
                Some(j) if j.status == JobStatus::Completed
            )
        })
        .await;
        h.worker.stop().await;

        assert_eq!(h.sap.calls(), 1);
        let doc = h
            .documents
            .get(DocumentType::Grpo, doc_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(doc.status, DocumentStatus::Posted);
    }

    #[tokio::test]
    async fn start_is_idempotent() {
        let h = harness(vec![Ok(SapPostResult {
            document_number: "80001".to_string(),
            raw: json!({}),
        })]);
        let (job, _) = seed_grpo(&h).await;

        h.worker.start().await;
        h.worker.start().await;
        h.worker.start().await;

        wait_for(|| async {
            matches!(
                h.store.get(job.id).await.unwrap(),
                Some(j) if j.status == JobStatus::Completed
            )
        })
        .await;
        h.worker.stop().await;

        // A duplicated loop would have burned extra scripted responses.
        assert_eq!(h.sap.calls(), 1);
    }

    #[tokio::test]
    async fn job_enqueued_while_running_is_processed_exactly_once() {
        let h = harness(vec![Ok(SapPostResult {
            document_number: "80005".to_string(),
            raw: json!({"DocNum": "80005"}),
        })]);

        h.worker.start().await;
        // Let the loop run a few empty cycles before any work exists.
        tokio::time::sleep(Duration::from_millis(30)).await;

        let (job, _) = seed_grpo(&h).await;
        wait_for(|| async {
            matches!(
                h.store.get(job.id).await.unwrap(),
                Some(j) if j.status == JobStatus::Completed
            )
        })
        .await;

        // Keep polling after completion; the job must not be picked up again.
        tokio::time::sleep(Duration::from_millis(50)).await;
        h.worker.stop().await;

        assert_eq!(h.sap.calls(), 1);
        let stored = h.store.get(job.id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Completed);
        assert_eq!(stored.sap_document_number.as_deref(), Some("80005"));
    }

    #[tokio::test]
    async fn stop_is_bounded_and_halts_processing() {
        let h = harness(vec![]);
        h.worker.start().await;
        assert!(h.worker.is_running().await);

        let before = tokio::time::Instant::now();
        h.worker.stop().await;
        assert!(before.elapsed() < Duration::from_secs(1));
        assert!(!h.worker.is_running().await);

        // Work enqueued after stop is left untouched.
        let (job, _) = seed_grpo(&h).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        let stored = h.store.get(job.id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Pending);
        assert_eq!(h.sap.calls(), 0);
    }

    #[tokio::test]
    async fn stop_without_start_is_a_no_op() {
        let h = harness(vec![]);
        h.worker.stop().await;
        assert!(!h.worker.is_running().await);
    }

    #[tokio::test]
    async fn restart_after_stop_resumes_processing() {
        let h = harness(vec![Ok(SapPostResult {
            document_number: "80001".to_string(),
            raw: json!({}),
        })]);

        h.worker.start().await;
        h.worker.stop().await;

        let (job, _) = seed_grpo(&h).await;
        h.worker.start().await;
        wait_for(|| async {
            matches!(
                h.store.get(job.id).await.unwrap(),
                Some(j) if j.status == JobStatus::Completed
            )
        })
        .await;
        h.worker.stop().await;
    }

    #[tokio::test]
    async fn one_failing_job_does_not_block_the_next() {
        let h = harness(vec![
            Err(SapClientError::Transport("boom".into())),
            Ok(SapPostResult {
                document_number: "80002".to_string(),
                raw: json!({}),
            }),
        ]);
        let (first, _) = seed_grpo(&h).await;
        let (second, _) = seed_grpo(&h).await;

        h.worker.start().await;
        wait_for(|| async {
            matches!(
                h.store.get(second.id).await.unwrap(),
                Some(j) if j.status == JobStatus::Completed
            )
        })
        .await;
        h.worker.stop().await;

        let failed = h.store.get(first.id).await.unwrap().unwrap();
        assert_eq!(failed.status, JobStatus::Retrying);
        assert_eq!(failed.retry_count, 1);
    }
}
