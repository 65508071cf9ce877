//! `Subscription` model: the registry of external delivery destinations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

/// A registered delivery destination.
///
/// `secret_encrypted` holds the AES-256-GCM encrypted signing secret; the
/// plaintext exists only transiently at send time.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Subscription {
    pub id: Uuid,
    pub destination_name: String,
    pub url: String,
    pub secret_encrypted: String,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Data needed to register a new subscription.
#[derive(Debug, Clone)]
pub struct CreateSubscription {
    pub destination_name: String,
    pub url: String,
    pub secret_encrypted: String,
}

/// Partial update; `None` fields are left unchanged.
#[derive(Debug, Clone, Default)]
pub struct UpdateSubscription {
    pub destination_name: Option<String>,
    pub url: Option<String>,
    pub secret_encrypted: Option<String>,
    pub active: Option<bool>,
}

impl Subscription {
    /// Register a new destination.
    pub async fn create(pool: &PgPool, data: CreateSubscription) -> Result<Self, sqlx::Error> {
        sqlx::query_as(
            r"
            INSERT INTO subscriptions (destination_name, url, secret_encrypted)
            VALUES ($1, $2, $3)
            RETURNING *
            ",
        )
        .bind(&data.destination_name)
        .bind(&data.url)
        .bind(&data.secret_encrypted)
        .fetch_one(pool)
        .await
    }

    /// Find a subscription by id.
    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as("SELECT * FROM subscriptions WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// List subscriptions, newest first, optionally filtered by active flag.
    pub async fn list(
        pool: &PgPool,
        limit: i64,
        offset: i64,
        active: Option<bool>,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as(
            r"
            SELECT * FROM subscriptions
            WHERE ($3::boolean IS NULL OR active = $3)
            ORDER BY created_at DESC
            LIMIT $1 OFFSET $2
            ",
        )
        .bind(limit)
        .bind(offset)
        .bind(active)
        .fetch_all(pool)
        .await
    }

    /// Count subscriptions, optionally filtered by active flag.
    pub async fn count(pool: &PgPool, active: Option<bool>) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar(
            "SELECT COUNT(*) FROM subscriptions WHERE ($1::boolean IS NULL OR active = $1)",
        )
        .bind(active)
        .fetch_one(pool)
        .await
    }

    /// Apply a partial update. Returns the updated row, or `None` if the
    /// subscription does not exist.
    pub async fn update(
        pool: &PgPool,
        id: Uuid,
        data: UpdateSubscription,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as(
            r"
            UPDATE subscriptions
            SET destination_name = COALESCE($2, destination_name),
                url = COALESCE($3, url),
                secret_encrypted = COALESCE($4, secret_encrypted),
                active = COALESCE($5, active),
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            ",
        )
        .bind(id)
        .bind(data.destination_name)
        .bind(data.url)
        .bind(data.secret_encrypted)
        .bind(data.active)
        .fetch_optional(pool)
        .await
    }

    /// Deactivate a destination. Existing delivery rows are unaffected; the
    /// destination just stops receiving future fan-outs.
    pub async fn deactivate(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as(
            r"
            UPDATE subscriptions
            SET active = FALSE, updated_at = NOW()
            WHERE id = $1
            RETURNING *
            ",
        )
        .bind(id)
        .fetch_optional(pool)
        .await
    }

    /// Delete a subscription. Fails with a foreign key violation while
    /// delivery rows still reference it.
    pub async fn delete(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM subscriptions WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_default_changes_nothing() {
        let update = UpdateSubscription::default();
        assert!(update.destination_name.is_none());
        assert!(update.url.is_none());
        assert!(update.secret_encrypted.is_none());
        assert!(update.active.is_none());
    }
}
