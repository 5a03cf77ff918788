//! Integration client contract.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;

use wms_core::DocumentId;

/// Arguments for posting a goods receipt (GRPO) to SAP.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoodsReceiptRequest {
    pub document_id: DocumentId,
    pub po_number: String,
    pub supplier_code: String,
}

/// Arguments for posting a serialized stock transfer to SAP.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerialTransferRequest {
    pub document_id: DocumentId,
    pub from_warehouse: String,
    pub to_warehouse: String,
}

/// Successful posting outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SapPostResult {
    /// Document number assigned by SAP (correlates the remote document).
    pub document_number: String,
    /// Raw response body, persisted on the job for later inspection.
    pub raw: JsonValue,
}

/// Integration client error.
///
/// The job processor treats every variant as a transient failure: whether a
/// request timed out, was rejected, or came back malformed, the retry policy
/// decides what happens next. Permanent-failure classification (unknown job
/// type, missing document) happens before the client is ever invoked.
#[derive(Debug, Clone, Error)]
pub enum SapClientError {
    #[error("service layer request failed: {0}")]
    Transport(String),
    #[error("service layer login failed: {0}")]
    Login(String),
    #[error("SAP rejected the document: {0}")]
    Rejected(String),
    #[error("unexpected service layer response: {0}")]
    Malformed(String),
}

/// Client performing the actual remote call to SAP.
///
/// One method per document kind; handlers shape the typed request from
/// document fields. A call either returns the SAP document number or an
/// error; the caller never inspects wire-level detail.
#[async_trait]
pub trait SapClient: Send + Sync {
    async fn post_goods_receipt(
        &self,
        request: &GoodsReceiptRequest,
    ) -> Result<SapPostResult, SapClientError>;

    async fn post_serial_transfer(
        &self,
        request: &SerialTransferRequest,
    ) -> Result<SapPostResult, SapClientError>;
}
