//! SQLite-backed document store.
//!
//! The documents table is owned by the warehouse application; this store
//! only touches the columns the sync core is allowed to write (status and
//! SAP document number). `ensure_schema` exists so the worker daemon and
//! tests can bootstrap a fresh database.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::{Row, SqlitePool, sqlite::SqliteRow};

use wms_core::DocumentId;

use crate::document::{Document, DocumentDetails, DocumentStatus, DocumentType};
use crate::store::{DocumentStore, DocumentStoreError};

/// SQLite-backed document store.
///
/// Cheap to clone; safe to share across tasks.
#[derive(Debug, Clone)]
pub struct SqliteDocumentStore {
    pool: SqlitePool,
}

impl SqliteDocumentStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create the documents table if it does not exist yet.
    pub async fn ensure_schema(&self) -> Result<(), DocumentStoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS wms_documents (
                id                   TEXT PRIMARY KEY,
                document_type        TEXT NOT NULL,
                status               TEXT NOT NULL,
                po_number            TEXT NULL,
                supplier_code        TEXT NULL,
                from_warehouse       TEXT NULL,
                to_warehouse         TEXT NULL,
                sap_document_number  TEXT NULL,
                created_at           TEXT NOT NULL,
                updated_at           TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for SqliteDocumentStore {
    async fn get(
        &self,
        document_type: DocumentType,
        id: DocumentId,
    ) -> Result<Option<Document>, DocumentStoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, document_type, status, po_number, supplier_code,
                   from_warehouse, to_warehouse, sap_document_number,
                   created_at, updated_at
            FROM wms_documents
            WHERE id = ?1 AND document_type = ?2
            "#,
        )
        .bind(id.to_string())
        .bind(document_type.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_err)?;

        row.map(row_to_document).transpose()
    }

    async fn mark_posted(
        &self,
        document_type: DocumentType,
        id: DocumentId,
        sap_document_number: &str,
    ) -> Result<(), DocumentStoreError> {
        let result = sqlx::query(
            r#"
            UPDATE wms_documents
            SET status = 'posted',
                sap_document_number = ?3,
                updated_at = ?4
            WHERE id = ?1 AND document_type = ?2
            "#,
        )
        .bind(id.to_string())
        .bind(document_type.as_str())
        .bind(sap_document_number)
        .bind(timestamp(Utc::now()))
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        if result.rows_affected() == 0 {
            return Err(DocumentStoreError::NotFound(id));
        }
        Ok(())
    }

    async fn revert_to_safe(
        &self,
        document_type: DocumentType,
        id: DocumentId,
    ) -> Result<(), DocumentStoreError> {
        let result = sqlx::query(
            r#"
            UPDATE wms_documents
            SET status = 'qc_approved',
                updated_at = ?3
            WHERE id = ?1 AND document_type = ?2
            "#,
        )
        .bind(id.to_string())
        .bind(document_type.as_str())
        .bind(timestamp(Utc::now()))
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        if result.rows_affected() == 0 {
            return Err(DocumentStoreError::NotFound(id));
        }
        Ok(())
    }

    async fn insert(&self, document: Document) -> Result<(), DocumentStoreError> {
        let (po_number, supplier_code, from_warehouse, to_warehouse) = match &document.details {
            DocumentDetails::Grpo {
                po_number,
                supplier_code,
            } => (Some(po_number.clone()), Some(supplier_code.clone()), None, None),
            DocumentDetails::SerialItemTransfer {
                from_warehouse,
                to_warehouse,
            } => (None, None, Some(from_warehouse.clone()), Some(to_warehouse.clone())),
        };

        let result = sqlx::query(
            r#"
            INSERT OR IGNORE INTO wms_documents (
                id, document_type, status, po_number, supplier_code,
                from_warehouse, to_warehouse, sap_document_number,
                created_at, updated_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
        )
        .bind(document.id.to_string())
        .bind(document.document_type().as_str())
        .bind(document.status.as_str())
        .bind(po_number)
        .bind(supplier_code)
        .bind(from_warehouse)
        .bind(to_warehouse)
        .bind(document.sap_document_number.clone())
        .bind(timestamp(document.created_at))
        .bind(timestamp(document.updated_at))
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        if result.rows_affected() == 0 {
            return Err(DocumentStoreError::AlreadyExists(document.id));
        }
        Ok(())
    }
}

fn storage_err(err: sqlx::Error) -> DocumentStoreError {
    DocumentStoreError::Storage(err.to_string())
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(raw: &str, column: &str) -> Result<DateTime<Utc>, DocumentStoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| DocumentStoreError::Storage(format!("invalid {column}: {e}")))
}

fn row_to_document(row: SqliteRow) -> Result<Document, DocumentStoreError> {
    let storage = |e: sqlx::Error| DocumentStoreError::Storage(e.to_string());

    let id_str: String = row.try_get("id").map_err(storage)?;
    let id: DocumentId = id_str
        .parse()
        .map_err(|e| DocumentStoreError::Storage(format!("invalid document id: {e}")))?;

    let type_str: String = row.try_get("document_type").map_err(storage)?;
    let document_type: DocumentType = type_str
        .parse()
        .map_err(|e| DocumentStoreError::Storage(format!("invalid document type: {e}")))?;

    let status_str: String = row.try_get("status").map_err(storage)?;
    let status: DocumentStatus = status_str
        .parse()
        .map_err(|e| DocumentStoreError::Storage(format!("invalid document status: {e}")))?;

    let details = match document_type {
        DocumentType::Grpo => DocumentDetails::Grpo {
            po_number: row
                .try_get::<Option<String>, _>("po_number")
                .map_err(storage)?
                .unwrap_or_default(),
            supplier_code: row
                .try_get::<Option<String>, _>("supplier_code")
                .map_err(storage)?
                .unwrap_or_default(),
        },
        DocumentType::SerialItemTransfer => DocumentDetails::SerialItemTransfer {
            from_warehouse: row
                .try_get::<Option<String>, _>("from_warehouse")
                .map_err(storage)?
                .unwrap_or_default(),
            to_warehouse: row
                .try_get::<Option<String>, _>("to_warehouse")
                .map_err(storage)?
                .unwrap_or_default(),
        },
    };

    let created_at_str: String = row.try_get("created_at").map_err(storage)?;
    let updated_at_str: String = row.try_get("updated_at").map_err(storage)?;

    Ok(Document {
        id,
        status,
        sap_document_number: row.try_get("sap_document_number").map_err(storage)?,
        details,
        created_at: parse_timestamp(&created_at_str, "created_at")?,
        updated_at: parse_timestamp(&updated_at_str, "updated_at")?,
    })
}
