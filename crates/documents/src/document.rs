//! Document model: type, status lifecycle and type-specific detail fields.

use chrono::{DateTime, Utc};
use core::str::FromStr;
use serde::{Deserialize, Serialize};

use wms_core::{DocumentId, DomainError};

/// Kind of business document a job can reference.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    Grpo,
    SerialItemTransfer,
}

impl DocumentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentType::Grpo => "grpo",
            DocumentType::SerialItemTransfer => "serial_item_transfer",
        }
    }
}

impl core::fmt::Display for DocumentType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocumentType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "grpo" => Ok(DocumentType::Grpo),
            "serial_item_transfer" => Ok(DocumentType::SerialItemTransfer),
            other => Err(DomainError::validation(format!(
                "unknown document type '{other}'"
            ))),
        }
    }
}

/// Document status lifecycle.
///
/// The sync subsystem only ever writes two of these: `Posted` when the SAP
/// call succeeds, and `QcApproved` (the pre-posting-safe status) when a job
/// terminally fails after the document was already mid-flight.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    Draft,
    Submitted,
    QcApproved,
    Posted,
    Rejected,
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentStatus::Draft => "draft",
            DocumentStatus::Submitted => "submitted",
            DocumentStatus::QcApproved => "qc_approved",
            DocumentStatus::Posted => "posted",
            DocumentStatus::Rejected => "rejected",
        }
    }
}

impl FromStr for DocumentStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(DocumentStatus::Draft),
            "submitted" => Ok(DocumentStatus::Submitted),
            "qc_approved" => Ok(DocumentStatus::QcApproved),
            "posted" => Ok(DocumentStatus::Posted),
            "rejected" => Ok(DocumentStatus::Rejected),
            other => Err(DomainError::validation(format!(
                "unknown document status '{other}'"
            ))),
        }
    }
}

/// Type-specific document fields.
///
/// Closed set: adding a document type is a compile-time-checked change in the
/// handlers that shape SAP requests from these fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "document_type", rename_all = "snake_case")]
pub enum DocumentDetails {
    /// Goods receipt against a purchase order.
    Grpo {
        po_number: String,
        supplier_code: String,
    },
    /// Serialized stock transfer between warehouses.
    SerialItemTransfer {
        from_warehouse: String,
        to_warehouse: String,
    },
}

impl DocumentDetails {
    pub fn document_type(&self) -> DocumentType {
        match self {
            DocumentDetails::Grpo { .. } => DocumentType::Grpo,
            DocumentDetails::SerialItemTransfer { .. } => DocumentType::SerialItemTransfer,
        }
    }
}

/// A business document referenced (not owned) by the sync subsystem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentId,
    pub status: DocumentStatus,
    /// Number assigned by SAP once the document has been posted.
    pub sap_document_number: Option<String>,
    pub details: DocumentDetails,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Document {
    /// Create a QC-approved document, i.e. one that is ready to be posted.
    ///
    /// Jobs are only enqueued for documents that have passed QC, so this is
    /// the state in which the sync subsystem first sees a document.
    pub fn qc_approved(id: DocumentId, details: DocumentDetails) -> Self {
        let now = Utc::now();
        Self {
            id,
            status: DocumentStatus::QcApproved,
            sap_document_number: None,
            details,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn document_type(&self) -> DocumentType {
        self.details.document_type()
    }

    /// Record a successful SAP posting.
    pub fn mark_posted(&mut self, sap_document_number: impl Into<String>) {
        self.status = DocumentStatus::Posted;
        self.sap_document_number = Some(sap_document_number.into());
        self.updated_at = Utc::now();
    }

    /// Revert to the pre-posting-safe status after the sync core gives up.
    pub fn revert_to_safe(&mut self) {
        self.status = DocumentStatus::QcApproved;
        self.updated_at = Utc::now();
    }
}
