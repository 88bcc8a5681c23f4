use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace};

use domain::event::EventPublisher;

use crate::status::AllInterfaceStatus;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Fixed-period driver of the continuous run.
///
/// A tick that fires while the previous one is still running is dropped, never
/// queued. Changed items are pushed to the publisher after each tick.
pub struct InterfaceService {
    status: Arc<AllInterfaceStatus>,
    publisher: Arc<dyn EventPublisher>,
    period: Duration,
    in_tick: Arc<AtomicBool>,
    skipped: AtomicU64,
}

/// Clears the in-tick flag when the tick ends, including by panic.
struct TickGuard(Arc<AtomicBool>);

impl Drop for TickGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl InterfaceService {
    pub fn new(
        status: Arc<AllInterfaceStatus>,
        publisher: Arc<dyn EventPublisher>,
        period: Duration,
    ) -> Self {
        Self {
            status,
            publisher,
            period,
            in_tick: Arc::new(AtomicBool::new(false)),
            skipped: AtomicU64::new(0),
        }
    }

    pub fn status(&self) -> &Arc<AllInterfaceStatus> {
        &self.status
    }

    pub fn ticks_skipped(&self) -> u64 {
        self.skipped.load(Ordering::Relaxed)
    }

    pub fn is_ticking(&self) -> bool {
        self.in_tick.load(Ordering::Acquire)
    }

    /// Starts one tick in the background unless one is already running.
    pub fn on_tick(&self) -> Option<JoinHandle<()>> {
        if self
            .in_tick
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            self.skipped.fetch_add(1, Ordering::Relaxed);
            trace!("Previous tick still running, dropping this one");
            return None;
        }

        let guard = TickGuard(self.in_tick.clone());
        let status = self.status.clone();
        let publisher = self.publisher.clone();
        Some(tokio::spawn(async move {
            let _guard = guard;
            let changes = status.update_values_continuous_by_tick().await;
            if changes > 0 {
                trace!(changes, "Tick updated values");
            }

            let events = status.drain_events();
            if events.is_empty() {
                return;
            }
            if let Err(e) = publisher.publish_batch(events).await {
                error!(error = %e, "Failed to publish status events");
            }
        }))
    }

    /// Ticks until `cancel` fires.
    pub async fn run(&self, cancel: CancellationToken) {
        let mut timer = interval(self.period);
        timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(period_ms = self.period.as_millis() as u64, "Polling service started");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Shutdown signal received");
                    break;
                }
                _ = timer.tick() => {
                    if let Some(handle) = self.on_tick() {
                        // a panicking tick is reported and the timer keeps going
                        tokio::spawn(async move {
                            if let Err(e) = handle.await {
                                error!(error = %e, "Tick failed");
                            }
                        });
                    }
                }
            }
        }

        debug!(skipped = self.ticks_skipped(), "Polling service stopped");
    }

    pub fn spawn(self: Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move { self.run(cancel).await })
    }
}
