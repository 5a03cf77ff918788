//! Document store abstraction (the spec's Document Synchronizer).

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use wms_core::DocumentId;

use crate::document::{Document, DocumentType};

/// Access to business documents, scoped to what the sync core needs:
/// look one up, mark it posted, or revert it to its pre-posting-safe status.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Fetch a document by type and id. `Ok(None)` when it does not exist
    /// (or exists under a different type).
    async fn get(
        &self,
        document_type: DocumentType,
        id: DocumentId,
    ) -> Result<Option<Document>, DocumentStoreError>;

    /// Mark the document posted and record the SAP document number.
    async fn mark_posted(
        &self,
        document_type: DocumentType,
        id: DocumentId,
        sap_document_number: &str,
    ) -> Result<(), DocumentStoreError>;

    /// Revert the document to `qc_approved`.
    async fn revert_to_safe(
        &self,
        document_type: DocumentType,
        id: DocumentId,
    ) -> Result<(), DocumentStoreError>;

    /// Insert a document. The sync core never calls this; it exists for the
    /// owning application's write path and for test setup.
    async fn insert(&self, document: Document) -> Result<(), DocumentStoreError>;
}

/// Document store error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum DocumentStoreError {
    #[error("document not found: {0}")]
    NotFound(DocumentId),
    #[error("document already exists: {0}")]
    AlreadyExists(DocumentId),
    #[error("storage error: {0}")]
    Storage(String),
}

/// In-memory document store for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryDocumentStore {
    documents: RwLock<HashMap<DocumentId, Document>>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn get(
        &self,
        document_type: DocumentType,
        id: DocumentId,
    ) -> Result<Option<Document>, DocumentStoreError> {
        let documents = self.documents.read().unwrap();
        Ok(documents
            .get(&id)
            .filter(|d| d.document_type() == document_type)
            .cloned())
    }

    async fn mark_posted(
        &self,
        document_type: DocumentType,
        id: DocumentId,
        sap_document_number: &str,
    ) -> Result<(), DocumentStoreError> {
        let mut documents = self.documents.write().unwrap();
        let doc = documents
            .get_mut(&id)
            .filter(|d| d.document_type() == document_type)
            .ok_or(DocumentStoreError::NotFound(id))?;
        doc.mark_posted(sap_document_number);
        Ok(())
    }

    async fn revert_to_safe(
        &self,
        document_type: DocumentType,
        id: DocumentId,
    ) -> Result<(), DocumentStoreError> {
        let mut documents = self.documents.write().unwrap();
        let doc = documents
            .get_mut(&id)
            .filter(|d| d.document_type() == document_type)
            .ok_or(DocumentStoreError::NotFound(id))?;
        doc.revert_to_safe();
        Ok(())
    }

    async fn insert(&self, document: Document) -> Result<(), DocumentStoreError> {
        let mut documents = self.documents.write().unwrap();
        if documents.contains_key(&document.id) {
            return Err(DocumentStoreError::AlreadyExists(document.id));
        }
        documents.insert(document.id, document);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{DocumentDetails, DocumentStatus};

    fn transfer_doc() -> Document {
        Document::qc_approved(
            DocumentId::new(),
            DocumentDetails::SerialItemTransfer {
                from_warehouse: "WH01".to_string(),
                to_warehouse: "WH02".to_string(),
            },
        )
    }

    #[tokio::test]
    async fn get_respects_document_type() {
        let store = InMemoryDocumentStore::new();
        let doc = transfer_doc();
        let id = doc.id;
        store.insert(doc).await.unwrap();

        assert!(
            store
                .get(DocumentType::SerialItemTransfer, id)
                .await
                .unwrap()
                .is_some()
        );
        // Same id, wrong type: not found, not an error.
        assert!(store.get(DocumentType::Grpo, id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn mark_posted_then_revert() {
        let store = InMemoryDocumentStore::new();
        let doc = transfer_doc();
        let id = doc.id;
        store.insert(doc).await.unwrap();

        store
            .mark_posted(DocumentType::SerialItemTransfer, id, "70010")
            .await
            .unwrap();
        let posted = store
            .get(DocumentType::SerialItemTransfer, id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(posted.status, DocumentStatus::Posted);
        assert_eq!(posted.sap_document_number.as_deref(), Some("70010"));

        store
            .revert_to_safe(DocumentType::SerialItemTransfer, id)
            .await
            .unwrap();
        let reverted = store
            .get(DocumentType::SerialItemTransfer, id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(reverted.status, DocumentStatus::QcApproved);
    }

    #[tokio::test]
    async fn mark_posted_on_missing_document_is_not_found() {
        let store = InMemoryDocumentStore::new();
        let err = store
            .mark_posted(DocumentType::Grpo, DocumentId::new(), "1")
            .await
            .unwrap_err();
        assert!(matches!(err, DocumentStoreError::NotFound(_)));
    }
}
