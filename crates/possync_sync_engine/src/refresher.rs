//! Fetching reference data and writing it into the cache.

use crate::error::{SyncError, SyncResult};
use crate::remote::RemoteStore;
use possync_core::{
    BusinessProfile, FiscalAssignment, Reference, ReferenceCache, ReferenceKind, ShiftState,
};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Refreshes the reference cache from the remote.
///
/// A successful fetch replaces the kind's cached snapshot wholesale. A failed
/// fetch leaves the cache as it was and returns the error.
pub struct CacheRefresher {
    cache: ReferenceCache,
    remote: Arc<dyn RemoteStore>,
    request_timeout: Duration,
}

impl CacheRefresher {
    /// Creates a refresher.
    pub fn new(
        cache: ReferenceCache,
        remote: Arc<dyn RemoteStore>,
        request_timeout: Duration,
    ) -> Self {
        Self {
            cache,
            remote,
            request_timeout,
        }
    }

    /// Returns the local cache.
    pub fn cache(&self) -> &ReferenceCache {
        &self.cache
    }

    /// Refreshes one kind. Returns the number of cached entries afterwards.
    pub async fn refresh(&self, kind: ReferenceKind) -> SyncResult<usize> {
        match kind {
            ReferenceKind::ProductCatalog => self.refresh_catalog().await,
            ReferenceKind::BusinessProfile => self.refresh_business_profile().await,
            ReferenceKind::FiscalAssignment => self.refresh_fiscal_assignment().await,
            ReferenceKind::ShiftOpenState => self.refresh_shift_state().await,
        }
    }

    /// Refreshes the product catalog.
    pub async fn refresh_catalog(&self) -> SyncResult<usize> {
        let products = self.fetch(self.remote.fetch_catalog()).await?;
        self.store(products)
    }

    /// Refreshes the business profile.
    pub async fn refresh_business_profile(&self) -> SyncResult<usize> {
        let profile = self.fetch(self.remote.fetch_business_profile()).await?;
        self.store::<BusinessProfile>(profile.into_iter().collect())
    }

    /// Refreshes the fiscal assignment.
    pub async fn refresh_fiscal_assignment(&self) -> SyncResult<usize> {
        let assignment = self.fetch(self.remote.fetch_fiscal_assignment()).await?;
        self.store::<FiscalAssignment>(assignment.into_iter().collect())
    }

    /// Refreshes the shift state.
    pub async fn refresh_shift_state(&self) -> SyncResult<usize> {
        let state = self.fetch(self.remote.fetch_shift_state()).await?;
        self.store::<ShiftState>(state.into_iter().collect())
    }

    /// Refreshes every single-row kind, logging failures.
    pub async fn refresh_single_row(&self) {
        for kind in ReferenceKind::ALL {
            if !kind.is_single_row() {
                continue;
            }
            if let Err(err) = self.refresh(kind).await {
                warn!(%kind, error = %err, "reference refresh failed, keeping cached copy");
            }
        }
    }

    async fn fetch<T>(&self, call: impl Future<Output = SyncResult<T>>) -> SyncResult<T> {
        match tokio::time::timeout(self.request_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(SyncError::Timeout),
        }
    }

    fn store<R: Reference>(&self, snapshots: Vec<R>) -> SyncResult<usize> {
        let count = snapshots.len();
        self.cache.replace(snapshots)?;
        if R::KIND == ReferenceKind::ProductCatalog {
            info!(kind = %R::KIND, count, "reference cache refreshed");
        } else {
            debug!(kind = %R::KIND, count, "reference cache refreshed");
        }
        Ok(count)
    }
}

impl std::fmt::Debug for CacheRefresher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheRefresher")
            .field("request_timeout", &self.request_timeout)
            .finish_non_exhaustive()
    }
}
