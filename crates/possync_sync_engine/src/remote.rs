//! Remote system of record abstraction.

use crate::error::{SyncError, SyncResult};
use async_trait::async_trait;
use parking_lot::Mutex;
use possync_core::{BusinessProfile, DocumentKind, FiscalAssignment, Product, ShiftState};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

/// The backend the till reports to.
///
/// Document inserts carry no idempotency key: if an acknowledgement is lost
/// after the remote committed, the retry creates a second remote row.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Inserts one business document.
    async fn insert_document(
        &self,
        kind: DocumentKind,
        payload: serde_json::Value,
    ) -> SyncResult<()>;

    /// Fetches the full product catalog.
    async fn fetch_catalog(&self) -> SyncResult<Vec<Product>>;

    /// Fetches the business profile, if one exists.
    async fn fetch_business_profile(&self) -> SyncResult<Option<BusinessProfile>>;

    /// Fetches the cashier's fiscal assignment, if one exists.
    async fn fetch_fiscal_assignment(&self) -> SyncResult<Option<FiscalAssignment>>;

    /// Fetches the register's shift state, if one exists.
    async fn fetch_shift_state(&self) -> SyncResult<Option<ShiftState>>;
}

/// Scripted result of one mock insert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockOutcome {
    /// Accept the document.
    Succeed,
    /// Reject with a retryable transport error.
    Fail(String),
    /// Wait, then accept. Used to exercise timeouts.
    Delay(Duration),
}

/// In-process remote for tests.
///
/// Inserts consume scripted outcomes first, then fall back to the default
/// outcome (initially [`MockOutcome::Succeed`]). Accepted documents are
/// recorded in arrival order.
#[derive(Debug)]
pub struct MockRemote {
    script: Mutex<VecDeque<MockOutcome>>,
    default_outcome: Mutex<MockOutcome>,
    accepted: Mutex<Vec<(DocumentKind, serde_json::Value)>>,
    insert_calls: AtomicUsize,
    fetch_calls: AtomicUsize,
    fetch_failing: AtomicBool,
    catalog: Mutex<Vec<Product>>,
    business_profile: Mutex<Option<BusinessProfile>>,
    fiscal_assignment: Mutex<Option<FiscalAssignment>>,
    shift_state: Mutex<Option<ShiftState>>,
}

impl Default for MockRemote {
    fn default() -> Self {
        Self::new()
    }
}

impl MockRemote {
    /// Creates a mock that accepts everything and serves empty reference data.
    pub fn new() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            default_outcome: Mutex::new(MockOutcome::Succeed),
            accepted: Mutex::new(Vec::new()),
            insert_calls: AtomicUsize::new(0),
            fetch_calls: AtomicUsize::new(0),
            fetch_failing: AtomicBool::new(false),
            catalog: Mutex::new(Vec::new()),
            business_profile: Mutex::new(None),
            fiscal_assignment: Mutex::new(None),
            shift_state: Mutex::new(None),
        }
    }

    /// Queues outcomes for the next inserts.
    pub fn script(&self, outcomes: impl IntoIterator<Item = MockOutcome>) {
        self.script.lock().extend(outcomes);
    }

    /// Sets the outcome used once the script is exhausted.
    pub fn set_default(&self, outcome: MockOutcome) {
        *self.default_outcome.lock() = outcome;
    }

    /// Makes every insert fail until changed.
    pub fn fail_all(&self) {
        self.set_default(MockOutcome::Fail("remote unreachable".into()));
    }

    /// Makes every fetch fail (or succeed again).
    pub fn set_fetch_failing(&self, failing: bool) {
        self.fetch_failing.store(failing, Ordering::SeqCst);
    }

    /// Sets the catalog served by `fetch_catalog`.
    pub fn set_catalog(&self, products: Vec<Product>) {
        *self.catalog.lock() = products;
    }

    /// Sets the business profile.
    pub fn set_business_profile(&self, profile: Option<BusinessProfile>) {
        *self.business_profile.lock() = profile;
    }

    /// Sets the fiscal assignment.
    pub fn set_fiscal_assignment(&self, assignment: Option<FiscalAssignment>) {
        *self.fiscal_assignment.lock() = assignment;
    }

    /// Sets the shift state.
    pub fn set_shift_state(&self, state: Option<ShiftState>) {
        *self.shift_state.lock() = state;
    }

    /// Documents accepted so far, in arrival order.
    pub fn accepted(&self) -> Vec<(DocumentKind, serde_json::Value)> {
        self.accepted.lock().clone()
    }

    /// Number of insert calls, accepted or not.
    pub fn insert_calls(&self) -> usize {
        self.insert_calls.load(Ordering::SeqCst)
    }

    /// Number of fetch calls, successful or not.
    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    fn begin_fetch(&self) -> SyncResult<()> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        if self.fetch_failing.load(Ordering::SeqCst) {
            Err(SyncError::transport_retryable("remote unreachable"))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl RemoteStore for MockRemote {
    async fn insert_document(
        &self,
        kind: DocumentKind,
        payload: serde_json::Value,
    ) -> SyncResult<()> {
        self.insert_calls.fetch_add(1, Ordering::SeqCst);
        let outcome = self
            .script
            .lock()
            .pop_front()
            .unwrap_or_else(|| self.default_outcome.lock().clone());

        match outcome {
            MockOutcome::Succeed => {}
            MockOutcome::Fail(message) => return Err(SyncError::transport_retryable(message)),
            MockOutcome::Delay(delay) => tokio::time::sleep(delay).await,
        }

        self.accepted.lock().push((kind, payload));
        Ok(())
    }

    async fn fetch_catalog(&self) -> SyncResult<Vec<Product>> {
        self.begin_fetch()?;
        Ok(self.catalog.lock().clone())
    }

    async fn fetch_business_profile(&self) -> SyncResult<Option<BusinessProfile>> {
        self.begin_fetch()?;
        Ok(self.business_profile.lock().clone())
    }

    async fn fetch_fiscal_assignment(&self) -> SyncResult<Option<FiscalAssignment>> {
        self.begin_fetch()?;
        Ok(self.fiscal_assignment.lock().clone())
    }

    async fn fetch_shift_state(&self) -> SyncResult<Option<ShiftState>> {
        self.begin_fetch()?;
        Ok(self.shift_state.lock().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn script_then_default() {
        let remote = MockRemote::new();
        remote.script([MockOutcome::Fail("boom".into())]);

        let first = remote
            .insert_document(DocumentKind::Invoice, json!({"factura": "1"}))
            .await;
        assert!(first.is_err());

        remote
            .insert_document(DocumentKind::Invoice, json!({"factura": "1"}))
            .await
            .unwrap();

        assert_eq!(remote.insert_calls(), 2);
        assert_eq!(remote.accepted().len(), 1);
    }

    #[tokio::test]
    async fn fetch_failure_switch() {
        let remote = MockRemote::new();
        remote.set_catalog(vec![Product::default()]);
        assert_eq!(remote.fetch_catalog().await.unwrap().len(), 1);

        remote.set_fetch_failing(true);
        assert!(remote.fetch_catalog().await.is_err());
        assert_eq!(remote.fetch_calls(), 2);
    }
}
