//! SAP sync daemon: runs the background worker against a SQLite job store.

use std::sync::Arc;

use anyhow::Context;
use sqlx::sqlite::SqlitePoolOptions;

use wms_documents::SqliteDocumentStore;
use wms_jobs::{JobProcessor, SqliteJobStore, SyncWorker, WorkerConfig};
use wms_sap::{ServiceLayerClient, ServiceLayerConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    wms_observability::init();

    let database_url = std::env::var("WMS_DATABASE_URL").unwrap_or_else(|_| {
        tracing::warn!("WMS_DATABASE_URL not set; using ./wms.db");
        "sqlite://wms.db?mode=rwc".to_string()
    });

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .with_context(|| format!("failed to open database {database_url}"))?;

    let job_store = SqliteJobStore::new(pool.clone());
    job_store
        .ensure_schema()
        .await
        .context("failed to create job schema")?;

    let document_store = SqliteDocumentStore::new(pool);
    document_store
        .ensure_schema()
        .await
        .context("failed to create document schema")?;

    let sap = ServiceLayerClient::new(service_layer_config()?);

    let config = WorkerConfig::from_env();
    let job_store = Arc::new(job_store);
    let processor = Arc::new(JobProcessor::new(
        job_store.clone(),
        Arc::new(document_store),
        Arc::new(sap),
        config.retry,
    ));

    let worker = SyncWorker::new(job_store, processor, config);
    worker.start().await;

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    tracing::info!("shutdown signal received");
    worker.stop().await;

    Ok(())
}

fn service_layer_config() -> anyhow::Result<ServiceLayerConfig> {
    let var = |name: &str| std::env::var(name).with_context(|| format!("{name} must be set"));
    Ok(ServiceLayerConfig {
        base_url: var("SAP_SL_BASE_URL")?,
        company_db: var("SAP_SL_COMPANY_DB")?,
        username: var("SAP_SL_USERNAME")?,
        password: var("SAP_SL_PASSWORD")?,
    })
}
