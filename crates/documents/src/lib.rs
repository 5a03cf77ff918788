//! `wms-documents` — the business documents the sync subsystem keeps
//! consistent with SAP B1.
//!
//! The sync core never creates or deletes documents; it reads their identity
//! and writes their status (`posted` on success, back to the pre-posting-safe
//! `qc_approved` on terminal failure). The owning web application performs
//! every other mutation.

pub mod document;
pub mod sqlite;
pub mod store;

pub use document::{Document, DocumentDetails, DocumentStatus, DocumentType};
pub use sqlite::SqliteDocumentStore;
pub use store::{DocumentStore, DocumentStoreError, InMemoryDocumentStore};
