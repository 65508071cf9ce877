//! `Event` model: the append-only event store.
//!
//! Event content is immutable once created; the only mutation is stamping
//! `fanned_out_at` when the fan-out runs. There are no delete queries in
//! this module on purpose.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgExecutor, PgPool};
use uuid::Uuid;

/// A domain event recorded for external delivery.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    /// Dotted event name, e.g. `donation.created`.
    pub event_name: String,
    /// Application user that triggered the event.
    pub user_id: i64,
    pub occurred_at: DateTime<Utc>,
    /// Emitting component, e.g. `enrollment-api`.
    pub source: String,
    pub payload: serde_json::Value,
    /// When delivery rows were created for this event. `None` means fan-out
    /// never ran; the repair pass targets exactly these.
    pub fanned_out_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Data needed to append a new event.
#[derive(Debug, Clone)]
pub struct NewEvent {
    pub event_name: String,
    pub user_id: i64,
    pub occurred_at: DateTime<Utc>,
    pub source: String,
    pub payload: serde_json::Value,
}

impl Event {
    /// Insert a new event row.
    ///
    /// Takes a generic executor so the event service can run it inside the
    /// same transaction as the delivery fan-out.
    pub async fn insert<'e>(
        executor: impl PgExecutor<'e>,
        data: &NewEvent,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as(
            r"
            INSERT INTO events (event_name, user_id, occurred_at, source, payload)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            ",
        )
        .bind(&data.event_name)
        .bind(data.user_id)
        .bind(data.occurred_at)
        .bind(&data.source)
        .bind(&data.payload)
        .fetch_one(executor)
        .await
    }

    /// Find an event by id.
    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as("SELECT * FROM events WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Mark an event's fan-out as complete.
    ///
    /// Called inside the append transaction, and by the repair pass after it
    /// re-runs a missed fan-out. The marker is what distinguishes "fanned out
    /// to zero active subscriptions" from "fan-out never ran": only the
    /// latter may ever be fanned out again.
    pub async fn mark_fanned_out<'e>(
        executor: impl PgExecutor<'e>,
        id: Uuid,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE events SET fanned_out_at = NOW() WHERE id = $1")
            .bind(id)
            .execute(executor)
            .await?;
        Ok(())
    }

    /// Find events older than `cutoff` whose fan-out never ran.
    ///
    /// The cutoff keeps appends that are still in flight out of the repair
    /// pass.
    pub async fn find_unfanned(
        pool: &PgPool,
        cutoff: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as(
            r"
            SELECT * FROM events
            WHERE fanned_out_at IS NULL AND created_at < $1
            ORDER BY created_at ASC
            LIMIT $2
            ",
        )
        .bind(cutoff)
        .bind(limit)
        .fetch_all(pool)
        .await
    }
}
