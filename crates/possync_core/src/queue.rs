//! Pending-document queues.

use crate::codec::{from_cbor, to_cbor};
use crate::document::{DeliveryOrder, Document, DocumentKind, Expense, Invoice, Payment, PendingRecord};
use crate::error::{StoreError, StoreResult};
use crate::store::LocalStore;
use crate::types::{now_millis, EpochMillis, RecordId, RecordKey};
use serde::{Deserialize, Serialize};
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::{debug, warn};

/// Stored form of a pending record; the id is the record key.
#[derive(Serialize, Deserialize)]
struct Envelope<D> {
    payload: D,
    timestamp: EpochMillis,
    attempts: u32,
    last_attempt_at: Option<EpochMillis>,
}

impl<D> Envelope<D> {
    fn into_record(self, id: RecordId) -> PendingRecord<D> {
        PendingRecord {
            id,
            payload: self.payload,
            timestamp: self.timestamp,
            attempts: self.attempts,
            last_attempt_at: self.last_attempt_at,
        }
    }
}

/// Durable FIFO of documents of one kind awaiting delivery.
///
/// Records leave the queue only through [`PendingQueue::remove`], which the
/// synchronizer calls after the remote confirms the write. Nothing is ever
/// discarded for having failed too often.
pub struct PendingQueue<D: Document> {
    store: Arc<LocalStore>,
    _kind: PhantomData<fn() -> D>,
}

impl<D: Document> Clone for PendingQueue<D> {
    fn clone(&self) -> Self {
        Self::new(Arc::clone(&self.store))
    }
}

impl<D: Document> PendingQueue<D> {
    /// Creates a queue over `store`.
    pub fn new(store: Arc<LocalStore>) -> Self {
        Self {
            store,
            _kind: PhantomData,
        }
    }

    /// The document kind of this queue.
    #[must_use]
    pub fn kind(&self) -> DocumentKind {
        D::KIND
    }

    fn collection(&self) -> &'static str {
        D::KIND.collection()
    }

    /// Durably stores `payload` and returns its id.
    ///
    /// There is no in-memory fallback: if this returns an error the
    /// document has not been kept and the caller must say so.
    pub fn enqueue(&self, payload: D) -> StoreResult<RecordId> {
        let envelope = Envelope {
            payload,
            timestamp: now_millis(),
            attempts: 0,
            last_attempt_at: None,
        };
        let id = self.store.add(self.collection(), to_cbor(&envelope)?)?;
        debug!(kind = %D::KIND, id = id.as_u64(), "document queued");
        Ok(id)
    }

    /// Returns every pending record, oldest first.
    pub fn list_pending(&self) -> StoreResult<Vec<PendingRecord<D>>> {
        self.store
            .get_all(self.collection())?
            .into_iter()
            .map(|(key, bytes)| decode(self.collection(), &key, &bytes))
            .collect()
    }

    /// Returns every queued record in enqueue order, decoding each one on
    /// its own.
    ///
    /// A record that fails to decode is returned as an error next to its
    /// key instead of failing the whole scan; it stays queued.
    pub fn scan(&self) -> StoreResult<Vec<(RecordKey, StoreResult<PendingRecord<D>>)>> {
        Ok(self
            .store
            .get_all(self.collection())?
            .into_iter()
            .map(|(key, bytes)| {
                let record = decode(self.collection(), &key, &bytes);
                (key, record)
            })
            .collect())
    }

    /// Returns one record, or `None` if it is not queued.
    pub fn get(&self, id: RecordId) -> StoreResult<Option<PendingRecord<D>>> {
        let key = RecordKey::Auto(id);
        self.store
            .get(self.collection(), &key)?
            .map(|bytes| decode(self.collection(), &key, &bytes))
            .transpose()
    }

    /// Removes a delivered record. Removing an absent id is not an error.
    pub fn remove(&self, id: RecordId) -> StoreResult<()> {
        self.store.delete(self.collection(), &RecordKey::Auto(id))
    }

    /// Counts one failed delivery attempt against a record.
    ///
    /// Returns the new attempt count, or `None` if the record is no longer
    /// queued.
    pub fn record_attempt_failure(&self, id: RecordId) -> StoreResult<Option<u32>> {
        self.record_attempt_failure_at(id, now_millis())
    }

    /// Like [`PendingQueue::record_attempt_failure`] with an explicit clock.
    pub fn record_attempt_failure_at(
        &self,
        id: RecordId,
        now: EpochMillis,
    ) -> StoreResult<Option<u32>> {
        let mut attempts = None;
        let found = self
            .store
            .update(self.collection(), &RecordKey::Auto(id), |bytes| {
                let mut envelope: Envelope<D> = from_cbor(bytes)?;
                envelope.attempts = envelope.attempts.saturating_add(1);
                envelope.last_attempt_at = Some(now);
                attempts = Some(envelope.attempts);
                to_cbor(&envelope)
            })?;

        if !found {
            debug!(kind = %D::KIND, id = id.as_u64(), "attempt on record no longer queued");
        }
        Ok(attempts)
    }

    /// Number of queued records.
    pub fn len(&self) -> StoreResult<usize> {
        self.store.count(self.collection())
    }

    /// Returns true if nothing is queued.
    pub fn is_empty(&self) -> StoreResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Records whose attempt count has reached `mark`.
    pub fn over_high_water(&self, mark: u32) -> StoreResult<Vec<PendingRecord<D>>> {
        Ok(self
            .scan()?
            .into_iter()
            .filter_map(|(_, record)| record.ok())
            .filter(|r| r.attempts >= mark)
            .collect())
    }
}

impl<D: Document> std::fmt::Debug for PendingQueue<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingQueue")
            .field("kind", &D::KIND)
            .finish_non_exhaustive()
    }
}

fn decode<D: Document>(
    collection: &str,
    key: &RecordKey,
    bytes: &[u8],
) -> StoreResult<PendingRecord<D>> {
    let id = key.as_id().ok_or_else(|| {
        StoreError::corruption(format!("named key {key} in queue {collection}"))
    })?;
    let envelope: Envelope<D> = from_cbor(bytes).map_err(|err| {
        warn!(collection, id = id.as_u64(), error = %err, "undecodable pending record");
        err
    })?;
    Ok(envelope.into_record(id))
}

/// Number of pending records per kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingCounts {
    /// Pending invoices.
    pub invoices: usize,
    /// Pending payments.
    pub payments: usize,
    /// Pending expenses.
    pub expenses: usize,
    /// Pending delivery orders.
    pub deliveries: usize,
}

impl PendingCounts {
    /// Total across all kinds.
    #[must_use]
    pub fn total(&self) -> usize {
        self.invoices + self.payments + self.expenses + self.deliveries
    }

    /// Count for one kind.
    #[must_use]
    pub fn get(&self, kind: DocumentKind) -> usize {
        match kind {
            DocumentKind::Invoice => self.invoices,
            DocumentKind::Payment => self.payments,
            DocumentKind::Expense => self.expenses,
            DocumentKind::DeliveryOrder => self.deliveries,
        }
    }
}

/// A record that has reached the high-water mark.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StalledRecord {
    /// Queue it sits in.
    pub kind: DocumentKind,
    /// Record id.
    pub id: RecordId,
    /// Failed attempts so far.
    pub attempts: u32,
    /// Creation time.
    pub timestamp: EpochMillis,
    /// Last failed attempt.
    pub last_attempt_at: Option<EpochMillis>,
}

impl<D: Document> From<&PendingRecord<D>> for StalledRecord {
    fn from(record: &PendingRecord<D>) -> Self {
        Self {
            kind: D::KIND,
            id: record.id,
            attempts: record.attempts,
            timestamp: record.timestamp,
            last_attempt_at: record.last_attempt_at,
        }
    }
}

/// The four document queues over one store.
#[derive(Debug, Clone)]
pub struct PendingQueues {
    /// Invoice queue.
    pub invoices: PendingQueue<Invoice>,
    /// Payment queue.
    pub payments: PendingQueue<Payment>,
    /// Expense queue.
    pub expenses: PendingQueue<Expense>,
    /// Delivery order queue.
    pub deliveries: PendingQueue<DeliveryOrder>,
}

impl PendingQueues {
    /// Creates all queues over `store`.
    pub fn new(store: Arc<LocalStore>) -> Self {
        Self {
            invoices: PendingQueue::new(Arc::clone(&store)),
            payments: PendingQueue::new(Arc::clone(&store)),
            expenses: PendingQueue::new(Arc::clone(&store)),
            deliveries: PendingQueue::new(store),
        }
    }

    /// Pending count per kind.
    pub fn counts(&self) -> StoreResult<PendingCounts> {
        Ok(PendingCounts {
            invoices: self.invoices.len()?,
            payments: self.payments.len()?,
            expenses: self.expenses.len()?,
            deliveries: self.deliveries.len()?,
        })
    }

    /// Returns true if every queue is empty.
    pub fn is_empty(&self) -> StoreResult<bool> {
        Ok(self.counts()?.total() == 0)
    }

    /// Records at or over `mark` attempts, across all kinds.
    pub fn stalled(&self, mark: u32) -> StoreResult<Vec<StalledRecord>> {
        let mut stalled = Vec::new();
        stalled.extend(self.invoices.over_high_water(mark)?.iter().map(StalledRecord::from));
        stalled.extend(self.payments.over_high_water(mark)?.iter().map(StalledRecord::from));
        stalled.extend(self.expenses.over_high_water(mark)?.iter().map(StalledRecord::from));
        stalled.extend(
            self.deliveries
                .over_high_water(mark)?
                .iter()
                .map(StalledRecord::from),
        );
        Ok(stalled)
    }
}
