//! Periodic delivery dispatcher.
//!
//! Owns its own lifecycle: constructed with the pool, the delivery service,
//! and a cancellation token, it polls the ledger on a fixed tick, claims due
//! rows atomically, and fans the sends out across a bounded worker pool. Two
//! maintenance ticks run alongside: stale-claim release (crash recovery) and
//! fan-out repair.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use sqlx::PgPool;
use tokio::sync::Semaphore;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::models::Delivery;
use crate::services::delivery_service::DeliveryService;
use crate::services::event_service::EventService;

/// Dispatcher configuration.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Tick interval between ledger polls, in seconds.
    pub tick_interval_secs: u64,
    /// Maximum rows claimed per tick.
    pub batch_size: i32,
    /// Maximum concurrent outbound sends.
    pub concurrency: usize,
    /// Age in seconds after which an in-flight claim is considered stale.
    pub stale_claim_secs: i64,
    /// Interval between fan-out repair passes, in seconds.
    pub fanout_repair_interval_secs: u64,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: 60,
            batch_size: 50,
            concurrency: 8,
            stale_claim_secs: 300,
            fanout_repair_interval_secs: 300,
        }
    }
}

/// Background worker that drains the delivery ledger.
pub struct Dispatcher {
    pool: PgPool,
    delivery_service: Arc<DeliveryService>,
    event_service: EventService,
    config: DispatcherConfig,
    shutdown: CancellationToken,
}

impl Dispatcher {
    /// Create a new dispatcher.
    pub fn new(
        pool: PgPool,
        delivery_service: Arc<DeliveryService>,
        event_service: EventService,
        config: DispatcherConfig,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            pool,
            delivery_service,
            event_service,
            config,
            shutdown,
        }
    }

    /// Run the dispatch loop until the cancellation token fires.
    ///
    /// On shutdown, in-flight sends are awaited to completion so no row is
    /// left claimed by this process.
    pub async fn run(&self) {
        info!(
            tick_interval_secs = self.config.tick_interval_secs,
            batch_size = self.config.batch_size,
            concurrency = self.config.concurrency,
            "Starting delivery dispatcher"
        );

        // Recover rows claimed by a previous process that died mid-send.
        self.release_stale_claims().await;

        let semaphore = Arc::new(Semaphore::new(self.config.concurrency));
        let mut poll_tick = interval(Duration::from_secs(self.config.tick_interval_secs));
        let mut stale_tick = interval(Duration::from_secs(self.config.stale_claim_secs.max(1) as u64));
        let mut repair_tick = interval(Duration::from_secs(self.config.fanout_repair_interval_secs));

        loop {
            tokio::select! {
                () = self.shutdown.cancelled() => {
                    info!("Dispatcher shutdown requested, stopping poll loop");
                    break;
                }
                _ = poll_tick.tick() => {
                    self.claim_and_send(&semaphore).await;
                }
                _ = stale_tick.tick() => {
                    self.release_stale_claims().await;
                }
                _ = repair_tick.tick() => {
                    self.repair_fan_out().await;
                }
            }
        }

        info!("Waiting for in-flight deliveries to complete...");
        let _ = semaphore.acquire_many(self.config.concurrency as u32).await;
        info!("Dispatcher stopped");
    }

    /// Claim due rows and spawn one bounded send task per row.
    async fn claim_and_send(&self, semaphore: &Arc<Semaphore>) {
        let claimed = match Delivery::claim_due(&self.pool, self.config.batch_size).await {
            Ok(rows) => rows,
            Err(e) => {
                error!(error = %e, "Failed to claim due deliveries");
                return;
            }
        };

        if claimed.is_empty() {
            return;
        }

        debug!(count = claimed.len(), "Claimed due deliveries");

        for delivery in claimed {
            // Waiting for a permit applies backpressure: the tick does not
            // claim faster than the pool can send.
            let permit = match semaphore.clone().acquire_owned().await {
                Ok(p) => p,
                Err(_) => return,
            };

            let service = self.delivery_service.clone();
            tokio::spawn(async move {
                let _permit = permit;
                service.process(&delivery).await;
            });
        }
    }

    /// Release in-flight claims abandoned by a crashed dispatcher.
    async fn release_stale_claims(&self) {
        let cutoff = Utc::now() - chrono::Duration::seconds(self.config.stale_claim_secs);
        match Delivery::release_stale_claims(&self.pool, cutoff).await {
            Ok(count) if count > 0 => {
                warn!(count, "Released stale delivery claims back to pending");
            }
            Ok(_) => {}
            Err(e) => {
                error!(error = %e, "Failed to release stale delivery claims");
            }
        }
    }

    /// Re-create missing fan-out rows.
    async fn repair_fan_out(&self) {
        if let Err(e) = self.event_service.repair_fan_out().await {
            error!(error = %e, "Fan-out repair pass failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dispatcher_config_defaults() {
        let config = DispatcherConfig::default();
        assert_eq!(config.tick_interval_secs, 60);
        assert_eq!(config.batch_size, 50);
        assert_eq!(config.concurrency, 8);
    }
}
