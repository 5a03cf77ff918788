//! `wms-sap` — the Integration Client boundary towards SAP Business One.
//!
//! The rest of the subsystem depends only on the [`SapClient`] trait: a
//! posting attempt either succeeds with a SAP document number or fails with
//! an error the job processor treats as transient. The Service Layer HTTP
//! implementation lives in [`service_layer`]; tests use scripted fakes.

pub mod client;
pub mod service_layer;

pub use client::{
    GoodsReceiptRequest, SapClient, SapClientError, SapPostResult, SerialTransferRequest,
};
pub use service_layer::{ServiceLayerClient, ServiceLayerConfig};
