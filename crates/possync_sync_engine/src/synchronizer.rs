//! Draining the pending-document queues against the remote.

use crate::config::SyncConfig;
use crate::error::SyncError;
use crate::remote::RemoteStore;
use parking_lot::RwLock;
use possync_core::{
    now_millis, Document, DocumentKind, EpochMillis, PendingQueue, PendingQueues, PendingRecord,
    StalledRecord,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Outcome of one pass for one document kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KindSummary {
    /// Document kind.
    pub kind: DocumentKind,
    /// Records delivered and removed.
    pub succeeded: usize,
    /// Records whose attempt failed.
    pub failed: usize,
    /// Records skipped because their backoff has not elapsed.
    pub deferred: usize,
}

impl KindSummary {
    fn new(kind: DocumentKind) -> Self {
        Self {
            kind,
            succeeded: 0,
            failed: 0,
            deferred: 0,
        }
    }
}

/// Outcome of one pass over all queues.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassSummary {
    /// True if the pass did not run because another was in flight.
    pub skipped: bool,
    /// Per-kind counts, in synchronization order.
    pub kinds: Vec<KindSummary>,
    /// Records at or over the high-water mark after the pass.
    pub stalled: Vec<StalledRecord>,
    /// When the pass started.
    pub started_at: EpochMillis,
    /// How long it took.
    pub duration: Duration,
}

impl PassSummary {
    fn skipped() -> Self {
        Self {
            skipped: true,
            kinds: Vec::new(),
            stalled: Vec::new(),
            started_at: now_millis(),
            duration: Duration::ZERO,
        }
    }

    /// Counts for one kind (zeros if the pass was skipped).
    pub fn kind(&self, kind: DocumentKind) -> KindSummary {
        self.kinds
            .iter()
            .find(|k| k.kind == kind)
            .cloned()
            .unwrap_or_else(|| KindSummary::new(kind))
    }

    /// Records delivered across all kinds.
    pub fn total_succeeded(&self) -> usize {
        self.kinds.iter().map(|k| k.succeeded).sum()
    }

    /// Failed attempts across all kinds.
    pub fn total_failed(&self) -> usize {
        self.kinds.iter().map(|k| k.failed).sum()
    }

    /// Deferred records across all kinds.
    pub fn total_deferred(&self) -> usize {
        self.kinds.iter().map(|k| k.deferred).sum()
    }
}

/// Running totals since the synchronizer was created.
#[derive(Debug, Clone, Default)]
pub struct SyncStats {
    /// Passes that ran to completion.
    pub passes_completed: u64,
    /// Passes skipped because one was already running.
    pub passes_skipped: u64,
    /// Documents delivered.
    pub documents_synced: u64,
    /// Failed delivery attempts.
    pub failed_attempts: u64,
    /// Start time of the last completed pass.
    pub last_pass_at: Option<EpochMillis>,
    /// Summary of the last completed pass.
    pub last_summary: Option<PassSummary>,
}

/// Clears the in-progress flag when a pass ends, however it ends.
struct PassGuard<'a>(&'a AtomicBool);

impl Drop for PassGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Delivers queued documents to the remote.
///
/// A pass walks the invoice, payment, expense and delivery queues in that
/// order, oldest record first, one remote call at a time. A delivered record
/// is removed; a failed one gets its attempt count bumped and the pass moves
/// on. Only one pass runs at a time; a pass requested meanwhile is skipped.
pub struct Synchronizer {
    queues: PendingQueues,
    remote: Arc<dyn RemoteStore>,
    config: SyncConfig,
    in_progress: AtomicBool,
    stats: RwLock<SyncStats>,
}

impl Synchronizer {
    /// Creates a synchronizer.
    pub fn new(queues: PendingQueues, remote: Arc<dyn RemoteStore>, config: SyncConfig) -> Self {
        Self {
            queues,
            remote,
            config,
            in_progress: AtomicBool::new(false),
            stats: RwLock::new(SyncStats::default()),
        }
    }

    /// Returns the queues this synchronizer drains.
    pub fn queues(&self) -> &PendingQueues {
        &self.queues
    }

    /// Returns the configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Returns a snapshot of the running totals.
    pub fn stats(&self) -> SyncStats {
        self.stats.read().clone()
    }

    /// Returns true while a pass is running.
    pub fn is_running(&self) -> bool {
        self.in_progress.load(Ordering::Acquire)
    }

    /// Returns true if any queue holds a record.
    ///
    /// A store error counts as "has work" so the caller still runs a pass and
    /// the error gets logged there.
    pub fn has_pending(&self) -> bool {
        self.queues.is_empty().map(|empty| !empty).unwrap_or(true)
    }

    /// Runs one full pass. Never fails; problems are logged and counted.
    pub async fn run_pass(&self) -> PassSummary {
        if self
            .in_progress
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("sync pass already running, skipping");
            self.stats.write().passes_skipped += 1;
            return PassSummary::skipped();
        }
        let _guard = PassGuard(&self.in_progress);

        let started = Instant::now();
        let started_at = now_millis();

        let kinds = vec![
            self.drain(&self.queues.invoices).await,
            self.drain(&self.queues.payments).await,
            self.drain(&self.queues.expenses).await,
            self.drain(&self.queues.deliveries).await,
        ];

        let stalled = self
            .queues
            .stalled(self.config.high_water_mark)
            .unwrap_or_else(|err| {
                error!(error = %err, "could not list stalled records");
                Vec::new()
            });

        let summary = PassSummary {
            skipped: false,
            kinds,
            stalled,
            started_at,
            duration: started.elapsed(),
        };

        info!(
            succeeded = summary.total_succeeded(),
            failed = summary.total_failed(),
            deferred = summary.total_deferred(),
            stalled = summary.stalled.len(),
            duration_ms = summary.duration.as_millis() as u64,
            "sync pass finished"
        );

        let mut stats = self.stats.write();
        stats.passes_completed += 1;
        stats.documents_synced += summary.total_succeeded() as u64;
        stats.failed_attempts += summary.total_failed() as u64;
        stats.last_pass_at = Some(started_at);
        stats.last_summary = Some(summary.clone());

        summary
    }

    async fn drain<D: Document>(&self, queue: &PendingQueue<D>) -> KindSummary {
        let kind = D::KIND;
        let mut summary = KindSummary::new(kind);

        let entries = match queue.scan() {
            Ok(entries) => entries,
            Err(err) => {
                error!(%kind, error = %err, "could not read queue");
                return summary;
            }
        };

        for (key, record) in entries {
            let record = match record {
                Ok(record) => record,
                Err(err) => {
                    // Left queued for inspection; the rest of the kind still drains.
                    warn!(%kind, %key, error = %err, "skipping undecodable pending record");
                    summary.failed += 1;
                    continue;
                }
            };

            let now = now_millis();
            if !self
                .config
                .retry
                .is_due(record.attempts, record.last_attempt_at, now)
            {
                summary.deferred += 1;
                continue;
            }

            match self.deliver(&record).await {
                Ok(()) => match queue.remove(record.id) {
                    Ok(()) => {
                        debug!(%kind, id = record.id.as_u64(), "document synced");
                        summary.succeeded += 1;
                    }
                    Err(err) => {
                        // The remote has the row; the next pass will send it again.
                        error!(%kind, id = record.id.as_u64(), error = %err, "delivered but could not dequeue");
                        summary.failed += 1;
                    }
                },
                Err(err) => {
                    summary.failed += 1;
                    self.note_failure(queue, &record, &err);
                }
            }
        }

        summary
    }

    async fn deliver<D: Document>(&self, record: &PendingRecord<D>) -> Result<(), SyncError> {
        let payload = serde_json::to_value(&record.payload)?;
        match tokio::time::timeout(
            self.config.request_timeout,
            self.remote.insert_document(D::KIND, payload),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(SyncError::Timeout),
        }
    }

    fn note_failure<D: Document>(
        &self,
        queue: &PendingQueue<D>,
        record: &PendingRecord<D>,
        err: &SyncError,
    ) {
        let kind = D::KIND;
        let id = record.id.as_u64();
        match queue.record_attempt_failure(record.id) {
            Ok(Some(attempts)) if attempts >= self.config.high_water_mark => {
                warn!(%kind, id, attempts, error = %err, "document stalled");
            }
            Ok(Some(attempts)) => {
                debug!(%kind, id, attempts, retryable = err.is_retryable(), error = %err, "sync attempt failed");
            }
            Ok(None) => debug!(%kind, id, "record left the queue during its attempt"),
            Err(store_err) => {
                error!(%kind, id, error = %store_err, "could not record failed attempt");
            }
        }
    }
}

impl std::fmt::Debug for Synchronizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Synchronizer")
            .field("config", &self.config)
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetryConfig;
    use crate::remote::{MockOutcome, MockRemote};
    use possync_core::{Expense, Invoice, LocalStore, Payment, Schema};
    use serde_json::json;

    fn setup(remote: Arc<MockRemote>, config: SyncConfig) -> Synchronizer {
        let store = Arc::new(LocalStore::open_in_memory(&Schema::point_of_sale()).unwrap());
        Synchronizer::new(PendingQueues::new(store), remote, config)
    }

    fn invoice(number: &str) -> Invoice {
        Invoice {
            invoice_number: number.into(),
            total: "150.00".into(),
            ..Invoice::default()
        }
    }

    #[tokio::test]
    async fn empty_pass_succeeds_with_zero_counts() {
        let sync = setup(Arc::new(MockRemote::new()), SyncConfig::default());
        let summary = sync.run_pass().await;
        assert!(!summary.skipped);
        assert_eq!(summary.kinds.len(), 4);
        assert_eq!(summary.total_succeeded(), 0);
        assert_eq!(sync.stats().passes_completed, 1);
    }

    #[tokio::test]
    async fn delivers_in_enqueue_order_and_removes() {
        let remote = Arc::new(MockRemote::new());
        let sync = setup(Arc::clone(&remote), SyncConfig::default());
        sync.queues().invoices.enqueue(invoice("A")).unwrap();
        sync.queues().invoices.enqueue(invoice("B")).unwrap();

        let summary = sync.run_pass().await;
        assert_eq!(summary.kind(DocumentKind::Invoice).succeeded, 2);

        let numbers: Vec<_> = remote
            .accepted()
            .into_iter()
            .map(|(_, payload)| payload["factura"].clone())
            .collect();
        assert_eq!(numbers, vec![json!("A"), json!("B")]);
        assert!(sync.queues().invoices.is_empty().unwrap());
    }

    #[tokio::test]
    async fn local_fields_are_not_sent() {
        let remote = Arc::new(MockRemote::new());
        let sync = setup(Arc::clone(&remote), SyncConfig::default());
        sync.queues().invoices.enqueue(invoice("1")).unwrap();
        sync.run_pass().await;

        let (_, payload) = remote.accepted().remove(0);
        for local in ["id", "timestamp", "attempts", "last_attempt_at"] {
            assert!(payload.get(local).is_none(), "{local} leaked");
        }
    }

    #[tokio::test]
    async fn kinds_drain_in_fixed_order() {
        let remote = Arc::new(MockRemote::new());
        let sync = setup(Arc::clone(&remote), SyncConfig::default());
        sync.queues().expenses.enqueue(Expense::default()).unwrap();
        sync.queues().payments.enqueue(Payment::default()).unwrap();
        sync.queues().invoices.enqueue(invoice("1")).unwrap();

        sync.run_pass().await;
        let kinds: Vec<_> = remote.accepted().into_iter().map(|(k, _)| k).collect();
        assert_eq!(
            kinds,
            vec![DocumentKind::Invoice, DocumentKind::Payment, DocumentKind::Expense]
        );
    }

    #[tokio::test]
    async fn failure_does_not_stop_the_pass() {
        let remote = Arc::new(MockRemote::new());
        remote.script([MockOutcome::Fail("boom".into())]);
        let sync = setup(Arc::clone(&remote), SyncConfig::default());
        let first = sync.queues().invoices.enqueue(invoice("1")).unwrap();
        sync.queues().invoices.enqueue(invoice("2")).unwrap();

        let summary = sync.run_pass().await;
        let invoices = summary.kind(DocumentKind::Invoice);
        assert_eq!(invoices.failed, 1);
        assert_eq!(invoices.succeeded, 1);

        let left = sync.queues().invoices.list_pending().unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].id, first);
        assert_eq!(left[0].attempts, 1);
    }

    #[tokio::test]
    async fn undecodable_record_does_not_block_its_kind() {
        let remote = Arc::new(MockRemote::new());
        let store = Arc::new(LocalStore::open_in_memory(&Schema::point_of_sale()).unwrap());
        store
            .add(DocumentKind::Invoice.collection(), vec![0xa0])
            .unwrap();
        let sync = Synchronizer::new(
            PendingQueues::new(Arc::clone(&store)),
            Arc::clone(&remote) as Arc<dyn RemoteStore>,
            SyncConfig::default(),
        );
        sync.queues().invoices.enqueue(invoice("1")).unwrap();

        for pass in 1..=2 {
            let summary = sync.run_pass().await;
            let invoices = summary.kind(DocumentKind::Invoice);
            assert_eq!(invoices.succeeded, if pass == 1 { 1 } else { 0 });
            assert_eq!(invoices.failed, 1);
            assert_eq!(remote.accepted().len(), 1);
            assert_eq!(store.count(DocumentKind::Invoice.collection()).unwrap(), 1);
        }
    }

    #[tokio::test]
    async fn timeout_counts_as_failure() {
        let remote = Arc::new(MockRemote::new());
        remote.set_default(MockOutcome::Delay(Duration::from_secs(5)));
        let sync = setup(
            Arc::clone(&remote),
            SyncConfig::default().with_timeout(Duration::from_millis(20)),
        );
        let id = sync.queues().payments.enqueue(Payment::default()).unwrap();

        let summary = sync.run_pass().await;
        assert_eq!(summary.kind(DocumentKind::Payment).failed, 1);
        assert_eq!(
            sync.queues().payments.get(id).unwrap().unwrap().attempts,
            1
        );
    }

    #[tokio::test]
    async fn stalled_records_are_reported_not_dropped() {
        let remote = Arc::new(MockRemote::new());
        remote.fail_all();
        let sync = setup(
            Arc::clone(&remote),
            SyncConfig::default().with_high_water_mark(2),
        );
        let id = sync.queues().invoices.enqueue(invoice("1")).unwrap();

        assert!(sync.run_pass().await.stalled.is_empty());
        let summary = sync.run_pass().await;
        assert_eq!(summary.stalled.len(), 1);
        assert_eq!(summary.stalled[0].id, id);

        sync.run_pass().await;
        assert_eq!(sync.queues().invoices.len().unwrap(), 1);
        assert_eq!(sync.stats().failed_attempts, 3);
    }

    #[tokio::test]
    async fn concurrent_pass_is_skipped() {
        let remote = Arc::new(MockRemote::new());
        remote.script([MockOutcome::Delay(Duration::from_millis(200))]);
        let sync = Arc::new(setup(Arc::clone(&remote), SyncConfig::default()));
        sync.queues().invoices.enqueue(invoice("1")).unwrap();

        let background = {
            let sync = Arc::clone(&sync);
            tokio::spawn(async move { sync.run_pass().await })
        };
        while !sync.is_running() {
            tokio::task::yield_now().await;
        }

        let second = sync.run_pass().await;
        assert!(second.skipped);

        let first = background.await.unwrap();
        assert!(!first.skipped);
        assert_eq!(first.total_succeeded(), 1);
        assert_eq!(remote.insert_calls(), 1);
        assert_eq!(sync.stats().passes_skipped, 1);
    }

    #[tokio::test]
    async fn backoff_defers_recently_failed_records() {
        let remote = Arc::new(MockRemote::new());
        remote.script([MockOutcome::Fail("boom".into())]);
        let retry = RetryConfig::exponential().with_initial_delay(Duration::from_secs(60));
        let sync = setup(Arc::clone(&remote), SyncConfig::default().with_retry(retry));
        sync.queues().invoices.enqueue(invoice("1")).unwrap();

        assert_eq!(sync.run_pass().await.total_failed(), 1);

        let summary = sync.run_pass().await;
        assert_eq!(summary.total_deferred(), 1);
        assert_eq!(summary.total_failed(), 0);
        assert_eq!(remote.insert_calls(), 1);
    }
}
