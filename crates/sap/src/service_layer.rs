//! SAP B1 Service Layer HTTP client.
//!
//! Sessions are established lazily via `/Login` and carried as the
//! `B1SESSION` cookie. A request that comes back 401 triggers exactly one
//! re-login before the error is surfaced; everything else is reported as-is
//! and left to the job processor's retry policy.

use reqwest::StatusCode;
use reqwest::header::COOKIE;
use serde_json::{Value as JsonValue, json};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use async_trait::async_trait;

use crate::client::{
    GoodsReceiptRequest, SapClient, SapClientError, SapPostResult, SerialTransferRequest,
};

/// Connection settings for the Service Layer.
#[derive(Debug, Clone)]
pub struct ServiceLayerConfig {
    /// Base URL, e.g. `https://sap-host:50000/b1s/v1`.
    pub base_url: String,
    pub company_db: String,
    pub username: String,
    pub password: String,
}

/// HTTP implementation of [`SapClient`] against the SAP B1 Service Layer.
pub struct ServiceLayerClient {
    http: reqwest::Client,
    config: ServiceLayerConfig,
    session: RwLock<Option<String>>,
}

impl ServiceLayerClient {
    pub fn new(config: ServiceLayerConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
            session: RwLock::new(None),
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), path)
    }

    /// Return the session cookie, logging in first when there is none.
    async fn session_cookie(&self) -> Result<String, SapClientError> {
        if let Some(cookie) = self.session.read().await.clone() {
            return Ok(cookie);
        }

        let body = json!({
            "CompanyDB": self.config.company_db,
            "UserName": self.config.username,
            "Password": self.config.password,
        });

        let response = self
            .http
            .post(self.endpoint("Login"))
            .json(&body)
            .send()
            .await
            .map_err(|e| SapClientError::Transport(e.to_string()))?;

        let status = response.status();
        let payload: JsonValue = response
            .json()
            .await
            .map_err(|e| SapClientError::Malformed(e.to_string()))?;

        if !status.is_success() {
            return Err(SapClientError::Login(error_message(&payload, status)));
        }

        let session_id = payload
            .get("SessionId")
            .and_then(JsonValue::as_str)
            .ok_or_else(|| {
                SapClientError::Malformed("login response is missing SessionId".to_string())
            })?;

        let cookie = format!("B1SESSION={session_id}");
        *self.session.write().await = Some(cookie.clone());
        debug!("established service layer session");
        Ok(cookie)
    }

    async fn post_document(
        &self,
        path: &str,
        body: &JsonValue,
    ) -> Result<SapPostResult, SapClientError> {
        let mut relogged_in = false;

        loop {
            let cookie = self.session_cookie().await?;

            let response = self
                .http
                .post(self.endpoint(path))
                .header(COOKIE, cookie)
                .json(body)
                .send()
                .await
                .map_err(|e| SapClientError::Transport(e.to_string()))?;

            if response.status() == StatusCode::UNAUTHORIZED && !relogged_in {
                // Session expired; drop it and retry once with a fresh login.
                warn!("service layer session expired, logging in again");
                *self.session.write().await = None;
                relogged_in = true;
                continue;
            }

            let status = response.status();
            let payload: JsonValue = response
                .json()
                .await
                .map_err(|e| SapClientError::Malformed(e.to_string()))?;

            if !status.is_success() {
                return Err(SapClientError::Rejected(error_message(&payload, status)));
            }

            let document_number = document_number_from(&payload)?;
            return Ok(SapPostResult {
                document_number,
                raw: payload,
            });
        }
    }
}

#[async_trait]
impl SapClient for ServiceLayerClient {
    async fn post_goods_receipt(
        &self,
        request: &GoodsReceiptRequest,
    ) -> Result<SapPostResult, SapClientError> {
        self.post_document("PurchaseDeliveryNotes", &goods_receipt_body(request))
            .await
    }

    async fn post_serial_transfer(
        &self,
        request: &SerialTransferRequest,
    ) -> Result<SapPostResult, SapClientError> {
        self.post_document("StockTransfers", &serial_transfer_body(request))
            .await
    }
}

/// Service Layer body for a goods receipt PO.
fn goods_receipt_body(request: &GoodsReceiptRequest) -> JsonValue {
    json!({
        "CardCode": request.supplier_code,
        "NumAtCard": request.po_number,
        "Comments": format!("WMS GRPO {}", request.document_id),
    })
}

/// Service Layer body for a stock transfer.
fn serial_transfer_body(request: &SerialTransferRequest) -> JsonValue {
    json!({
        "FromWarehouse": request.from_warehouse,
        "ToWarehouse": request.to_warehouse,
        "Comments": format!("WMS serial transfer {}", request.document_id),
    })
}

/// Extract the SAP document number from a posting response.
///
/// `DocNum` is the human-facing number; older endpoints only return
/// `DocEntry`, which is accepted as a fallback.
fn document_number_from(payload: &JsonValue) -> Result<String, SapClientError> {
    for key in ["DocNum", "DocEntry"] {
        match payload.get(key) {
            Some(JsonValue::Number(n)) => return Ok(n.to_string()),
            Some(JsonValue::String(s)) if !s.is_empty() => return Ok(s.clone()),
            _ => {}
        }
    }
    Err(SapClientError::Malformed(
        "posting response carries neither DocNum nor DocEntry".to_string(),
    ))
}

/// Best-effort error text from a Service Layer error body.
fn error_message(payload: &JsonValue, status: StatusCode) -> String {
    payload
        .pointer("/error/message/value")
        .and_then(JsonValue::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| format!("service layer returned {status}"))
}
