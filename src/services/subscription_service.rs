//! Subscription registry CRUD with URL validation and secret encryption.

use sqlx::PgPool;
use uuid::Uuid;

use crate::crypto;
use crate::error::WebhookError;
use crate::models::{CreateSubscription, Subscription, UpdateSubscription};
use crate::validation;

/// Postgres foreign key violation SQLSTATE.
const FK_VIOLATION: &str = "23503";

/// Input for registering a destination.
#[derive(Debug, Clone)]
pub struct CreateSubscriptionInput {
    pub destination_name: String,
    pub url: String,
    pub secret: String,
}

/// Partial update input. A new `secret` rotates the signing key; rotation is
/// non-atomic with respect to in-flight deliveries, which sign with whichever
/// secret is current at send time.
#[derive(Debug, Clone, Default)]
pub struct UpdateSubscriptionInput {
    pub destination_name: Option<String>,
    pub url: Option<String>,
    pub secret: Option<String>,
    pub active: Option<bool>,
}

/// Service for subscription registry operations.
#[derive(Clone)]
pub struct SubscriptionService {
    pool: PgPool,
    encryption_key: Vec<u8>,
    allow_http: bool,
}

impl SubscriptionService {
    #[must_use]
    pub fn new(pool: PgPool, encryption_key: Vec<u8>) -> Self {
        Self {
            pool,
            encryption_key,
            allow_http: false,
        }
    }

    /// Allow HTTP URLs (development/testing only).
    #[must_use]
    pub fn with_allow_http(mut self, allow: bool) -> Self {
        self.allow_http = allow;
        self
    }

    /// Register a new destination.
    pub async fn create(&self, input: CreateSubscriptionInput) -> Result<Subscription, WebhookError> {
        validation::validate_endpoint_url(&input.url, self.allow_http)?;

        if input.destination_name.trim().is_empty() {
            return Err(WebhookError::Validation(
                "destination_name must not be empty".to_string(),
            ));
        }
        if input.secret.is_empty() {
            return Err(WebhookError::Validation(
                "secret must not be empty".to_string(),
            ));
        }

        let secret_encrypted = crypto::encrypt_secret(&input.secret, &self.encryption_key)?;

        let sub = Subscription::create(
            &self.pool,
            CreateSubscription {
                destination_name: input.destination_name,
                url: input.url,
                secret_encrypted,
            },
        )
        .await?;

        Ok(sub)
    }

    /// List destinations with pagination.
    pub async fn list(
        &self,
        limit: i64,
        offset: i64,
        active: Option<bool>,
    ) -> Result<(Vec<Subscription>, i64), WebhookError> {
        let items = Subscription::list(&self.pool, limit, offset, active).await?;
        let total = Subscription::count(&self.pool, active).await?;
        Ok((items, total))
    }

    /// Fetch a single destination.
    pub async fn get(&self, id: Uuid) -> Result<Subscription, WebhookError> {
        Subscription::find_by_id(&self.pool, id)
            .await?
            .ok_or(WebhookError::SubscriptionNotFound)
    }

    /// Apply a partial update, re-validating the URL and re-encrypting the
    /// secret when either changes.
    pub async fn update(
        &self,
        id: Uuid,
        input: UpdateSubscriptionInput,
    ) -> Result<Subscription, WebhookError> {
        if let Some(ref url) = input.url {
            validation::validate_endpoint_url(url, self.allow_http)?;
        }

        let secret_encrypted = match &input.secret {
            Some(secret) if !secret.is_empty() => {
                Some(crypto::encrypt_secret(secret, &self.encryption_key)?)
            }
            Some(_) => {
                return Err(WebhookError::Validation(
                    "secret must not be empty".to_string(),
                ));
            }
            None => None,
        };

        Subscription::update(
            &self.pool,
            id,
            UpdateSubscription {
                destination_name: input.destination_name,
                url: input.url,
                secret_encrypted,
                active: input.active,
            },
        )
        .await?
        .ok_or(WebhookError::SubscriptionNotFound)
    }

    /// Deactivate a destination. Pending deliveries keep retrying; only
    /// future fan-outs stop including it.
    pub async fn deactivate(&self, id: Uuid) -> Result<Subscription, WebhookError> {
        Subscription::deactivate(&self.pool, id)
            .await?
            .ok_or(WebhookError::SubscriptionNotFound)
    }

    /// Delete a destination. Rejected while delivery rows reference it;
    /// deactivation is the supported retirement path.
    pub async fn delete(&self, id: Uuid) -> Result<(), WebhookError> {
        match Subscription::delete(&self.pool, id).await {
            Ok(true) => Ok(()),
            Ok(false) => Err(WebhookError::SubscriptionNotFound),
            Err(e) => {
                if let Some(db_err) = e.as_database_error() {
                    if db_err.code().as_deref() == Some(FK_VIOLATION) {
                        return Err(WebhookError::SubscriptionInUse);
                    }
                }
                Err(WebhookError::Database(e))
            }
        }
    }
}
