//! HTTP remote implementation.
//!
//! The actual HTTP client is abstracted via [`HttpClient`] so the host can
//! plug in whatever stack it already ships (reqwest, hyper, a webview
//! bridge) and tests can answer in-process.

use crate::error::{SyncError, SyncResult};
use crate::remote::RemoteStore;
use async_trait::async_trait;
use parking_lot::RwLock;
use possync_core::{
    BusinessProfile, DocumentKind, FiscalAssignment, Product, ReferenceKind, ShiftState,
};
use serde::de::DeserializeOwned;
use tracing::debug;

/// A response from [`HttpClient`].
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    /// HTTP status code.
    pub status: u16,
    /// Decoded JSON body (`Null` when empty).
    pub body: serde_json::Value,
}

impl HttpResponse {
    /// Creates a response.
    pub fn new(status: u16, body: serde_json::Value) -> Self {
        Self { status, body }
    }

    /// Returns true for 2xx statuses.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// HTTP client abstraction.
///
/// `Err` means the request never produced a response (DNS, connect, TLS,
/// reset). Non-2xx statuses are `Ok` responses.
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Sends a POST with a JSON body.
    async fn post_json(&self, url: &str, body: serde_json::Value) -> Result<HttpResponse, String>;

    /// Sends a GET expecting a JSON body.
    async fn get_json(&self, url: &str) -> Result<HttpResponse, String>;
}

/// REST path for inserting documents of `kind`.
pub fn document_endpoint(kind: DocumentKind) -> &'static str {
    match kind {
        DocumentKind::Invoice => "/facturas",
        DocumentKind::Payment => "/pagos",
        DocumentKind::Expense => "/gastos",
        DocumentKind::DeliveryOrder => "/envios",
    }
}

/// REST path for fetching reference data of `kind`.
pub fn reference_endpoint(kind: ReferenceKind) -> &'static str {
    match kind {
        ReferenceKind::ProductCatalog => "/productos",
        ReferenceKind::BusinessProfile => "/negocio",
        ReferenceKind::FiscalAssignment => "/cai",
        ReferenceKind::ShiftOpenState => "/turno",
    }
}

/// [`RemoteStore`] over a REST/JSON backend.
pub struct HttpRemote<C: HttpClient> {
    /// Base URL of the backend (e.g., "https://api.example.com/rest/v1").
    base_url: String,
    client: C,
    last_error: RwLock<Option<String>>,
}

impl<C: HttpClient> HttpRemote<C> {
    /// Creates a new HTTP remote.
    pub fn new(base_url: impl Into<String>, client: C) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
            last_error: RwLock::new(None),
        }
    }

    /// Returns the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Returns the last transport or server error.
    pub fn last_error(&self) -> Option<String> {
        self.last_error.read().clone()
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}{}", self.base_url, endpoint)
    }

    fn record<T>(&self, result: SyncResult<T>) -> SyncResult<T> {
        match &result {
            Ok(_) => *self.last_error.write() = None,
            Err(err) => *self.last_error.write() = Some(err.to_string()),
        }
        result
    }

    async fn get(&self, kind: ReferenceKind) -> SyncResult<serde_json::Value> {
        let url = self.url(reference_endpoint(kind));
        let result = match self.client.get_json(&url).await {
            Ok(response) => check_status(response),
            Err(message) => Err(SyncError::transport_retryable(message)),
        };
        self.record(result)
    }

    async fn get_single<T: DeserializeOwned>(&self, kind: ReferenceKind) -> SyncResult<Option<T>> {
        let body = self.get(kind).await?;
        single(body)
    }
}

fn check_status(response: HttpResponse) -> SyncResult<serde_json::Value> {
    if response.is_success() {
        Ok(response.body)
    } else {
        let message = match &response.body {
            serde_json::Value::String(s) => s.clone(),
            serde_json::Value::Null => String::new(),
            other => other.to_string(),
        };
        Err(SyncError::server(response.status, message))
    }
}

/// Single-row endpoints may answer with an object, a one-element array, or
/// nothing at all.
fn single<T: DeserializeOwned>(body: serde_json::Value) -> SyncResult<Option<T>> {
    let value = match body {
        serde_json::Value::Null => return Ok(None),
        serde_json::Value::Array(mut rows) => {
            if rows.is_empty() {
                return Ok(None);
            }
            rows.swap_remove(0)
        }
        other => other,
    };
    serde_json::from_value(value)
        .map(Some)
        .map_err(|e| SyncError::Protocol(format!("failed to decode response: {e}")))
}

#[async_trait]
impl<C: HttpClient> RemoteStore for HttpRemote<C> {
    async fn insert_document(
        &self,
        kind: DocumentKind,
        payload: serde_json::Value,
    ) -> SyncResult<()> {
        let url = self.url(document_endpoint(kind));
        debug!(%kind, %url, "posting document");
        let result = match self.client.post_json(&url, payload).await {
            Ok(response) => check_status(response).map(|_| ()),
            Err(message) => Err(SyncError::transport_retryable(message)),
        };
        self.record(result)
    }

    async fn fetch_catalog(&self) -> SyncResult<Vec<Product>> {
        let body = self.get(ReferenceKind::ProductCatalog).await?;
        if body.is_null() {
            return Ok(Vec::new());
        }
        serde_json::from_value(body)
            .map_err(|e| SyncError::Protocol(format!("failed to decode catalog: {e}")))
    }

    async fn fetch_business_profile(&self) -> SyncResult<Option<BusinessProfile>> {
        self.get_single(ReferenceKind::BusinessProfile).await
    }

    async fn fetch_fiscal_assignment(&self) -> SyncResult<Option<FiscalAssignment>> {
        self.get_single(ReferenceKind::FiscalAssignment).await
    }

    async fn fetch_shift_state(&self) -> SyncResult<Option<ShiftState>> {
        self.get_single(ReferenceKind::ShiftOpenState).await
    }
}

impl<C: HttpClient> std::fmt::Debug for HttpRemote<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpRemote")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}
