//! `wms-core` — shared domain primitives for the SAP sync subsystem.
//!
//! This crate contains **pure domain** building blocks (no infrastructure
//! concerns): strongly-typed identifiers and the domain error model.

pub mod error;
pub mod id;

pub use error::{DomainError, DomainResult};
pub use id::{DocumentId, JobId};
