//! Background task that triggers sync passes.

use crate::connectivity::{ConnectivityMonitor, ConnectivityState};
use crate::refresher::CacheRefresher;
use crate::synchronizer::Synchronizer;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Handle to a running scheduler task.
#[derive(Debug)]
pub struct SchedulerHandle {
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Stops the scheduler and waits for it to exit.
    ///
    /// A pass already running finishes first.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Err(err) = (&mut self.task).await {
            warn!(error = %err, "scheduler task ended abnormally");
        }
    }

    /// Returns true once the task has exited.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

/// Starts the scheduler on the current tokio runtime.
///
/// Every `interval` the scheduler settles the monitor and, unless offline,
/// runs a pass when some queue holds a record. Every reconnect event runs a
/// pass straight away and then refreshes the single-row reference kinds if a
/// refresher is given.
pub fn spawn(
    synchronizer: Arc<Synchronizer>,
    monitor: Arc<ConnectivityMonitor>,
    refresher: Option<Arc<CacheRefresher>>,
    interval: Duration,
) -> SchedulerHandle {
    let (shutdown, shutdown_rx) = oneshot::channel();
    let reconnects = monitor.subscribe_reconnect();
    let task = tokio::spawn(run(
        synchronizer,
        monitor,
        refresher,
        interval,
        reconnects,
        shutdown_rx,
    ));
    SchedulerHandle {
        shutdown: Some(shutdown),
        task,
    }
}

async fn run(
    synchronizer: Arc<Synchronizer>,
    monitor: Arc<ConnectivityMonitor>,
    refresher: Option<Arc<CacheRefresher>>,
    period: Duration,
    mut reconnects: broadcast::Receiver<()>,
    mut shutdown: oneshot::Receiver<()>,
) {
    let mut timer = interval_at(Instant::now() + period, period);
    timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
    info!(interval_ms = period.as_millis() as u64, "sync scheduler started");

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            _ = timer.tick() => {
                monitor.settle();
                if monitor.state() == ConnectivityState::Offline {
                    debug!("offline, skipping timed pass");
                    continue;
                }
                if synchronizer.has_pending() {
                    synchronizer.run_pass().await;
                }
            }
            event = reconnects.recv() => match event {
                Ok(()) | Err(broadcast::error::RecvError::Lagged(_)) => {
                    info!("reconnected, running sync pass");
                    synchronizer.run_pass().await;
                    if let Some(refresher) = &refresher {
                        refresher.refresh_single_row().await;
                    }
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }

    info!("sync scheduler stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SyncConfig;
    use crate::remote::MockRemote;
    use possync_core::{Invoice, LocalStore, PendingQueues, Schema};

    fn synchronizer(remote: Arc<MockRemote>) -> Arc<Synchronizer> {
        let store = Arc::new(LocalStore::open_in_memory(&Schema::point_of_sale()).unwrap());
        Arc::new(Synchronizer::new(
            PendingQueues::new(store),
            remote,
            SyncConfig::default(),
        ))
    }

    async fn wait_until(mut done: impl FnMut() -> bool) {
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while !done() {
            assert!(std::time::Instant::now() < deadline, "timed out waiting");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    #[tokio::test]
    async fn timer_drains_queue_when_online() {
        let remote = Arc::new(MockRemote::new());
        let sync = synchronizer(Arc::clone(&remote));
        sync.queues().invoices.enqueue(Invoice::default()).unwrap();
        let monitor = Arc::new(ConnectivityMonitor::new(true));

        let handle = spawn(
            Arc::clone(&sync),
            monitor,
            None,
            Duration::from_millis(50),
        );
        wait_until(|| remote.accepted().len() == 1).await;
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn timer_does_nothing_offline() {
        let remote = Arc::new(MockRemote::new());
        let sync = synchronizer(Arc::clone(&remote));
        sync.queues().invoices.enqueue(Invoice::default()).unwrap();
        let monitor = Arc::new(ConnectivityMonitor::new(false));

        let handle = spawn(
            Arc::clone(&sync),
            monitor,
            None,
            Duration::from_millis(20),
        );
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(remote.insert_calls(), 0);
        assert_eq!(sync.stats().passes_completed, 0);
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn timer_skips_empty_queues() {
        let remote = Arc::new(MockRemote::new());
        let sync = synchronizer(Arc::clone(&remote));
        let monitor = Arc::new(ConnectivityMonitor::new(true));

        let handle = spawn(
            Arc::clone(&sync),
            monitor,
            None,
            Duration::from_millis(20),
        );
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(sync.stats().passes_completed, 0);
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn reconnect_runs_pass_before_timer() {
        let remote = Arc::new(MockRemote::new());
        let sync = synchronizer(Arc::clone(&remote));
        sync.queues().invoices.enqueue(Invoice::default()).unwrap();
        let monitor = Arc::new(ConnectivityMonitor::new(false));

        let handle = spawn(
            Arc::clone(&sync),
            Arc::clone(&monitor),
            None,
            Duration::from_secs(3600),
        );
        monitor.report(true);
        wait_until(|| remote.accepted().len() == 1).await;
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn tick_settles_reconnecting() {
        let remote = Arc::new(MockRemote::new());
        let sync = synchronizer(remote);
        let monitor = Arc::new(ConnectivityMonitor::new(false));
        let handle = spawn(sync, Arc::clone(&monitor), None, Duration::from_millis(20));

        monitor.report(true);
        wait_until(|| monitor.state() == ConnectivityState::Online).await;
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn shutdown_stops_task() {
        let sync = synchronizer(Arc::new(MockRemote::new()));
        let monitor = Arc::new(ConnectivityMonitor::new(true));
        let handle = spawn(sync, monitor, None, Duration::from_millis(20));
        assert!(!handle.is_finished());
        handle.shutdown().await;
    }
}
