//! The offline system: everything wired together behind one handle.

use crate::config::SyncConfig;
use crate::connectivity::{ConnectivityMonitor, ConnectivityState};
use crate::error::SyncResult;
use crate::refresher::CacheRefresher;
use crate::remote::RemoteStore;
use crate::scheduler::{self, SchedulerHandle};
use crate::synchronizer::{PassSummary, SyncStats, Synchronizer};
use possync_core::{
    BusinessProfile, DeliveryOrder, Expense, FiscalAssignment, Invoice, LocalStore, Payment,
    PendingCounts, PendingQueues, Product, RecordId, ReferenceCache, ReferenceKind, Schema,
    ShiftState, StalledRecord, StoreConfig, StoreResult,
};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

/// Offline durability and synchronization for one till.
///
/// Created with [`OfflineSystem::start`] (or [`OfflineSystem::open`] for a
/// store directory). Startup:
///
/// 1. starts the connectivity monitor with the host's current signal
/// 2. spawns the scheduler (timer and reconnect listener)
/// 3. runs one pass if online and anything is queued
/// 4. fetches the catalog once if the cache has none
///
/// Must be called from within a tokio runtime.
pub struct OfflineSystem {
    store: Arc<LocalStore>,
    queues: PendingQueues,
    cache: ReferenceCache,
    monitor: Arc<ConnectivityMonitor>,
    synchronizer: Arc<Synchronizer>,
    refresher: Arc<CacheRefresher>,
    scheduler: SchedulerHandle,
}

impl OfflineSystem {
    /// Starts the system over an already opened store.
    pub async fn start(
        store: Arc<LocalStore>,
        remote: Arc<dyn RemoteStore>,
        initially_online: bool,
        config: SyncConfig,
    ) -> Self {
        let queues = PendingQueues::new(Arc::clone(&store));
        let cache = ReferenceCache::new(Arc::clone(&store));
        let monitor = Arc::new(ConnectivityMonitor::new(initially_online));
        let synchronizer = Arc::new(Synchronizer::new(
            queues.clone(),
            Arc::clone(&remote),
            config.clone(),
        ));
        let refresher = Arc::new(CacheRefresher::new(
            cache.clone(),
            remote,
            config.request_timeout,
        ));

        let scheduler = scheduler::spawn(
            Arc::clone(&synchronizer),
            Arc::clone(&monitor),
            Some(Arc::clone(&refresher)),
            config.sync_interval,
        );

        let system = Self {
            store,
            queues,
            cache,
            monitor,
            synchronizer,
            refresher,
            scheduler,
        };

        if initially_online && system.synchronizer.has_pending() {
            system.synchronizer.run_pass().await;
        }

        if config.catalog_refresh_on_start {
            match system.cache.is_populated(ReferenceKind::ProductCatalog) {
                Ok(true) => {}
                Ok(false) => {
                    if let Err(err) = system.refresher.refresh_catalog().await {
                        warn!(error = %err, "startup catalog refresh failed");
                    }
                }
                Err(err) => warn!(error = %err, "could not read catalog cache"),
            }
        }

        info!(
            online = initially_online,
            pending = system.pending_counts().map(|c| c.total()).unwrap_or(0),
            "offline system started"
        );
        system
    }

    /// Opens the store at `path` with the point-of-sale schema and starts.
    pub async fn open(
        path: impl AsRef<Path>,
        remote: Arc<dyn RemoteStore>,
        initially_online: bool,
        store_config: StoreConfig,
        sync_config: SyncConfig,
    ) -> StoreResult<Self> {
        let store = LocalStore::open(path.as_ref(), &Schema::point_of_sale(), store_config)?;
        Ok(Self::start(Arc::new(store), remote, initially_online, sync_config).await)
    }

    /// Queues an invoice for delivery.
    pub fn enqueue_invoice(&self, invoice: Invoice) -> StoreResult<RecordId> {
        self.queues.invoices.enqueue(invoice)
    }

    /// Queues a payment for delivery.
    pub fn enqueue_payment(&self, payment: Payment) -> StoreResult<RecordId> {
        self.queues.payments.enqueue(payment)
    }

    /// Queues an expense for delivery.
    pub fn enqueue_expense(&self, expense: Expense) -> StoreResult<RecordId> {
        self.queues.expenses.enqueue(expense)
    }

    /// Queues a delivery order for delivery.
    pub fn enqueue_delivery(&self, delivery: DeliveryOrder) -> StoreResult<RecordId> {
        self.queues.deliveries.enqueue(delivery)
    }

    /// Pending records per kind.
    pub fn pending_counts(&self) -> StoreResult<PendingCounts> {
        self.queues.counts()
    }

    /// Runs a pass now. Skipped if one is already running.
    pub async fn sync_now(&self) -> PassSummary {
        self.synchronizer.run_pass().await
    }

    /// Cached catalog, no network.
    pub fn cached_catalog(&self) -> StoreResult<Vec<Product>> {
        Ok(self
            .cache
            .read::<Product>()?
            .into_iter()
            .map(|entry| entry.snapshot)
            .collect())
    }

    /// Cached business profile, no network.
    pub fn cached_business_profile(&self) -> StoreResult<Option<BusinessProfile>> {
        Ok(self.cache.read_single()?.map(|entry| entry.snapshot))
    }

    /// Cached fiscal assignment, no network.
    pub fn cached_fiscal_assignment(&self) -> StoreResult<Option<FiscalAssignment>> {
        Ok(self.cache.read_single()?.map(|entry| entry.snapshot))
    }

    /// Cached shift state, no network.
    pub fn cached_shift_state(&self) -> StoreResult<Option<ShiftState>> {
        Ok(self.cache.read_single()?.map(|entry| entry.snapshot))
    }

    /// Fetches the catalog; on failure the cached copy stays.
    pub async fn refresh_catalog(&self) -> SyncResult<usize> {
        self.refresher.refresh_catalog().await
    }

    /// Fetches the business profile; on failure the cached copy stays.
    pub async fn refresh_business_profile(&self) -> SyncResult<usize> {
        self.refresher.refresh_business_profile().await
    }

    /// Fetches the fiscal assignment; on failure the cached copy stays.
    pub async fn refresh_fiscal_assignment(&self) -> SyncResult<usize> {
        self.refresher.refresh_fiscal_assignment().await
    }

    /// Fetches the shift state; on failure the cached copy stays.
    pub async fn refresh_shift_state(&self) -> SyncResult<usize> {
        self.refresher.refresh_shift_state().await
    }

    /// Records at or over the high-water mark.
    pub fn stalled_records(&self) -> StoreResult<Vec<StalledRecord>> {
        self.queues
            .stalled(self.synchronizer.config().high_water_mark)
    }

    /// Current connectivity state.
    pub fn connectivity(&self) -> ConnectivityState {
        self.monitor.state()
    }

    /// Feeds the host's online/offline signal.
    pub fn report_connectivity(&self, online: bool) -> bool {
        self.monitor.report(online)
    }

    /// Synchronizer totals.
    pub fn stats(&self) -> SyncStats {
        self.synchronizer.stats()
    }

    /// The underlying store.
    pub fn store(&self) -> &Arc<LocalStore> {
        &self.store
    }

    /// Stops the scheduler and closes the store.
    pub async fn shutdown(self) -> StoreResult<()> {
        self.scheduler.shutdown().await;
        self.store.close()?;
        info!("offline system stopped");
        Ok(())
    }
}

impl std::fmt::Debug for OfflineSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OfflineSystem")
            .field("connectivity", &self.connectivity())
            .field("synchronizer", &self.synchronizer)
            .finish_non_exhaustive()
    }
}
