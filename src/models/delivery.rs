//! `Delivery` model: the per-(event, subscription) ledger of retryable work.
//!
//! All correctness flows from atomic state transitions on this table:
//! `pending -> sending` (claim), `sending -> ok` (terminal success),
//! `sending -> pending` (re-armed retry), `sending -> failed` (terminal,
//! attempts exhausted). `ok` and `failed` rows are never modified again.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgExecutor, PgPool};
use uuid::Uuid;

/// Delivery lifecycle states as stored in the `status` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryStatus {
    /// Waiting for its `next_attempt_at` to come due.
    Pending,
    /// Claimed by a dispatcher; an HTTP send is in flight.
    Sending,
    /// Terminal: a 2xx response was received.
    Ok,
    /// Terminal: attempts exhausted.
    Failed,
}

impl DeliveryStatus {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Sending => "sending",
            Self::Ok => "ok",
            Self::Failed => "failed",
        }
    }

    /// Parse a stored status string.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "sending" => Some(Self::Sending),
            "ok" => Some(Self::Ok),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Terminal states accept no further transitions.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Ok | Self::Failed)
    }
}

/// One delivery ledger row.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Delivery {
    pub id: Uuid,
    pub event_id: Uuid,
    pub subscription_id: Uuid,
    pub status: String,
    pub attempt_count: i32,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub next_attempt_at: Option<DateTime<Utc>>,
    pub response_status: Option<i16>,
    pub response_headers: Option<serde_json::Value>,
    pub response_body: Option<String>,
    pub latency_ms: Option<i32>,
    pub error_message: Option<String>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Captured HTTP exchange details written back onto the row.
#[derive(Debug, Clone, Default)]
pub struct ResponseSnapshot {
    pub status: Option<i16>,
    pub headers: Option<serde_json::Value>,
    pub body: Option<String>,
    pub latency_ms: Option<i32>,
}

impl Delivery {
    /// Fan an event out to every currently active subscription.
    ///
    /// Inserts one `pending` row per active destination with
    /// `next_attempt_at = now`. Idempotent: the unique
    /// (event_id, subscription_id) constraint makes re-runs no-ops, which is
    /// what the fan-out repair pass relies on.
    pub async fn fan_out<'e>(
        executor: impl PgExecutor<'e>,
        event_id: Uuid,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            r"
            INSERT INTO deliveries (event_id, subscription_id, status, attempt_count, next_attempt_at)
            SELECT $1, s.id, 'pending', 0, NOW()
            FROM subscriptions s
            WHERE s.active
            ON CONFLICT (event_id, subscription_id) DO NOTHING
            ",
        )
        .bind(event_id)
        .execute(executor)
        .await?;

        Ok(result.rows_affected())
    }

    /// Atomically claim up to `batch_size` due rows for this dispatcher.
    ///
    /// Transitions `pending -> sending` on rows whose `next_attempt_at` has
    /// passed, oldest-due first. `FOR UPDATE SKIP LOCKED` keeps concurrent
    /// dispatcher instances from claiming the same row, so no delivery is
    /// ever in flight twice.
    pub async fn claim_due(pool: &PgPool, batch_size: i32) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as(
            r"
            UPDATE deliveries d
            SET status = 'sending', updated_at = NOW()
            FROM (
                SELECT id FROM deliveries
                WHERE status = 'pending' AND next_attempt_at <= NOW()
                ORDER BY next_attempt_at ASC
                LIMIT $1
                FOR UPDATE SKIP LOCKED
            ) due
            WHERE d.id = due.id
            RETURNING d.*
            ",
        )
        .bind(batch_size)
        .fetch_all(pool)
        .await
    }

    /// Record a successful attempt: `sending -> ok` (terminal).
    pub async fn record_success(
        pool: &PgPool,
        id: Uuid,
        snapshot: &ResponseSnapshot,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r"
            UPDATE deliveries
            SET status = 'ok',
                attempt_count = attempt_count + 1,
                last_attempt_at = NOW(),
                next_attempt_at = NULL,
                response_status = $2,
                response_headers = $3,
                response_body = $4,
                latency_ms = $5,
                error_message = NULL,
                completed_at = NOW(),
                updated_at = NOW()
            WHERE id = $1 AND status = 'sending'
            ",
        )
        .bind(id)
        .bind(snapshot.status)
        .bind(&snapshot.headers)
        .bind(&snapshot.body)
        .bind(snapshot.latency_ms)
        .execute(pool)
        .await?;

        Ok(())
    }

    /// Record a failed attempt.
    ///
    /// With `next_attempt_at = Some(_)` the row is re-armed
    /// (`sending -> pending`); with `None` the attempts are exhausted and the
    /// row goes terminal (`sending -> failed`).
    pub async fn record_failure(
        pool: &PgPool,
        id: Uuid,
        error_message: &str,
        snapshot: &ResponseSnapshot,
        next_attempt_at: Option<DateTime<Utc>>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r"
            UPDATE deliveries
            SET status = CASE WHEN $6::timestamptz IS NULL THEN 'failed' ELSE 'pending' END,
                attempt_count = attempt_count + 1,
                last_attempt_at = NOW(),
                next_attempt_at = $6,
                response_status = $3,
                response_headers = $4,
                response_body = $5,
                latency_ms = $7,
                error_message = $2,
                completed_at = CASE WHEN $6::timestamptz IS NULL THEN NOW() ELSE NULL END,
                updated_at = NOW()
            WHERE id = $1 AND status = 'sending'
            ",
        )
        .bind(id)
        .bind(error_message)
        .bind(snapshot.status)
        .bind(&snapshot.headers)
        .bind(&snapshot.body)
        .bind(next_attempt_at)
        .bind(snapshot.latency_ms)
        .execute(pool)
        .await?;

        Ok(())
    }

    /// Release claims abandoned by a crashed or killed dispatcher.
    ///
    /// Any row still `sending` with an `updated_at` older than `cutoff` goes
    /// back to `pending` and becomes immediately due.
    pub async fn release_stale_claims(
        pool: &PgPool,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            r"
            UPDATE deliveries
            SET status = 'pending', next_attempt_at = NOW(), updated_at = NOW()
            WHERE status = 'sending' AND updated_at < $1
            ",
        )
        .bind(cutoff)
        .execute(pool)
        .await?;

        Ok(result.rows_affected())
    }

    /// Find a delivery by id.
    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as("SELECT * FROM deliveries WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Operator triage listing, newest first, optionally filtered by status.
    pub async fn list(
        pool: &PgPool,
        status: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as(
            r"
            SELECT * FROM deliveries
            WHERE ($3::text IS NULL OR status = $3)
            ORDER BY created_at DESC
            LIMIT $1 OFFSET $2
            ",
        )
        .bind(limit)
        .bind(offset)
        .bind(status)
        .fetch_all(pool)
        .await
    }

    /// Count deliveries, optionally filtered by status.
    pub async fn count(pool: &PgPool, status: Option<&str>) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar("SELECT COUNT(*) FROM deliveries WHERE ($1::text IS NULL OR status = $1)")
            .bind(status)
            .fetch_one(pool)
            .await
    }

    /// Delivery history for one destination, newest first.
    pub async fn list_by_subscription(
        pool: &PgPool,
        subscription_id: Uuid,
        status: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as(
            r"
            SELECT * FROM deliveries
            WHERE subscription_id = $1
              AND ($4::text IS NULL OR status = $4)
            ORDER BY created_at DESC
            LIMIT $2 OFFSET $3
            ",
        )
        .bind(subscription_id)
        .bind(limit)
        .bind(offset)
        .bind(status)
        .fetch_all(pool)
        .await
    }

    /// Count one destination's deliveries, optionally filtered by status.
    pub async fn count_by_subscription(
        pool: &PgPool,
        subscription_id: Uuid,
        status: Option<&str>,
    ) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar(
            r"
            SELECT COUNT(*) FROM deliveries
            WHERE subscription_id = $1
              AND ($2::text IS NULL OR status = $2)
            ",
        )
        .bind(subscription_id)
        .bind(status)
        .fetch_one(pool)
        .await
    }

    /// All delivery rows for one event.
    pub async fn list_by_event(pool: &PgPool, event_id: Uuid) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as("SELECT * FROM deliveries WHERE event_id = $1 ORDER BY created_at ASC")
            .bind(event_id)
            .fetch_all(pool)
            .await
    }
}
