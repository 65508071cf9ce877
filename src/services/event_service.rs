//! Event append and fan-out.
//!
//! Appending an event, creating its delivery rows, and stamping
//! `fanned_out_at` happen in one transaction, so an event can never be
//! committed without its fan-out on record. The repair pass exists for
//! defense in depth: any event left without the stamp gets its fan-out
//! re-run idempotently. An event fanned out to zero destinations is stamped
//! like any other and is never fanned out again; subscriptions only receive
//! events appended after they were activated.

use chrono::{Duration, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::WebhookError;
use crate::models::{Delivery, Event, NewEvent};

/// Events younger than this are skipped by the repair pass so an append
/// transaction still in flight is never repaired against.
const REPAIR_GRACE_SECS: i64 = 60;

/// Maximum events repaired per pass.
const REPAIR_BATCH: i64 = 100;

/// Service for appending events and maintaining their fan-out.
#[derive(Clone)]
pub struct EventService {
    pool: PgPool,
}

impl EventService {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Append an event and fan it out to every active subscription.
    ///
    /// The insert and the fan-out commit atomically. Producers are
    /// fire-and-forget; delivery failures never surface here.
    pub async fn append(&self, data: NewEvent) -> Result<Event, WebhookError> {
        if data.event_name.trim().is_empty() {
            return Err(WebhookError::Validation(
                "event_name must not be empty".to_string(),
            ));
        }

        let mut tx = self.pool.begin().await?;
        let event = Event::insert(&mut *tx, &data).await?;
        let fanned_out = Delivery::fan_out(&mut *tx, event.id).await?;
        Event::mark_fanned_out(&mut *tx, event.id).await?;
        tx.commit().await?;

        tracing::info!(
            target: "webhook_delivery",
            event_id = %event.id,
            event_name = %event.event_name,
            source = %event.source,
            deliveries = fanned_out,
            "Event appended and fanned out"
        );

        Ok(event)
    }

    /// Look up a stored event.
    pub async fn get(&self, id: Uuid) -> Result<Event, WebhookError> {
        Event::find_by_id(&self.pool, id)
            .await?
            .ok_or(WebhookError::EventNotFound)
    }

    /// Re-run fan-out for events whose `fanned_out_at` stamp is missing.
    ///
    /// Returns the number of delivery rows created. Idempotent: rows that
    /// already exist are untouched. Events that were fanned out to zero
    /// destinations carry the stamp and are never picked up here, so a
    /// subscription activated after an event was appended never receives it.
    pub async fn repair_fan_out(&self) -> Result<u64, WebhookError> {
        let cutoff = Utc::now() - Duration::seconds(REPAIR_GRACE_SECS);
        let unfanned = Event::find_unfanned(&self.pool, cutoff, REPAIR_BATCH).await?;

        let mut created = 0u64;
        for event in &unfanned {
            let mut tx = self.pool.begin().await?;
            created += Delivery::fan_out(&mut *tx, event.id).await?;
            Event::mark_fanned_out(&mut *tx, event.id).await?;
            tx.commit().await?;
        }

        if !unfanned.is_empty() {
            tracing::warn!(
                target: "webhook_delivery",
                events = unfanned.len(),
                deliveries = created,
                "Repaired fan-out for events missing their fan-out stamp"
            );
        }

        Ok(created)
    }
}
