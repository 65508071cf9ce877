//! Delivery execution: signed HTTP sends and outcome classification.
//!
//! A claimed ledger row is joined with its parent event and subscription,
//! serialized to the wire payload, signed with HMAC-SHA256, and POSTed with a
//! bounded timeout. The outcome either terminalizes the row (`ok`, `failed`)
//! or re-arms it for retry per the backoff schedule. Every failure is
//! recovered locally; nothing propagates back to the event producer.

use std::time::Instant;

use chrono::{DateTime, Duration, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::crypto;
use crate::error::WebhookError;
use crate::models::{Delivery, Event, ResponseSnapshot, Subscription};

/// Default maximum delivery attempts per row (initial + 5 retries).
pub const DEFAULT_MAX_ATTEMPTS: i32 = 6;

/// Fixed escalating retry schedule in seconds: 2, 4, 8, 16, 32 minutes.
const BACKOFF_SCHEDULE_SECS: [i64; 5] = [120, 240, 480, 960, 1920];

/// Captured response bodies are truncated to this many characters.
const RESPONSE_BODY_LIMIT: usize = 4096;

/// The JSON body POSTed to subscriber endpoints.
///
/// The exact serialized bytes of this struct are what gets signed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookPayload {
    pub id: Uuid,
    pub event_name: String,
    pub user_id: i64,
    pub occurred_at: DateTime<Utc>,
    pub source: String,
    pub payload: serde_json::Value,
}

impl WebhookPayload {
    /// Build the wire payload from a stored event.
    #[must_use]
    pub fn from_event(event: &Event) -> Self {
        Self {
            id: event.id,
            event_name: event.event_name.clone(),
            user_id: event.user_id,
            occurred_at: event.occurred_at,
            source: event.source.clone(),
            payload: event.payload.clone(),
        }
    }
}

/// Service executing delivery attempts against subscriber endpoints.
#[derive(Clone)]
pub struct DeliveryService {
    pool: PgPool,
    http_client: Client,
    encryption_key: Vec<u8>,
    max_attempts: i32,
}

impl DeliveryService {
    /// Create a new delivery service with a shared HTTP client.
    ///
    /// # Errors
    ///
    /// Returns `WebhookError::Internal` if the HTTP client cannot be built.
    pub fn new(
        pool: PgPool,
        encryption_key: Vec<u8>,
        http_timeout_secs: u64,
    ) -> Result<Self, WebhookError> {
        let http_client = Client::builder()
            .timeout(std::time::Duration::from_secs(http_timeout_secs))
            .user_agent(concat!("webhook-relay/", env!("CARGO_PKG_VERSION")))
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| WebhookError::Internal(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            pool,
            http_client,
            encryption_key,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        })
    }

    /// Set the maximum delivery attempts.
    #[must_use]
    pub fn with_max_attempts(mut self, max: i32) -> Self {
        self.max_attempts = max;
        self
    }

    /// Process one claimed delivery row end to end.
    ///
    /// Never returns an error: every outcome is written back onto the row so
    /// the dispatcher loop keeps going regardless of what happens here.
    pub async fn process(&self, delivery: &Delivery) {
        let subscription =
            match Subscription::find_by_id(&self.pool, delivery.subscription_id).await {
                Ok(Some(sub)) => sub,
                Ok(None) => {
                    // FK integrity should make this impossible; fail the
                    // attempt visibly rather than dropping the row.
                    self.fail_attempt(delivery, "Subscription row missing", &ResponseSnapshot::default())
                        .await;
                    return;
                }
                Err(e) => {
                    self.fail_attempt(
                        delivery,
                        &format!("Failed to load subscription: {e}"),
                        &ResponseSnapshot::default(),
                    )
                    .await;
                    return;
                }
            };

        let event = match Event::find_by_id(&self.pool, delivery.event_id).await {
            Ok(Some(event)) => event,
            Ok(None) => {
                self.fail_attempt(delivery, "Event row missing", &ResponseSnapshot::default())
                    .await;
                return;
            }
            Err(e) => {
                self.fail_attempt(
                    delivery,
                    &format!("Failed to load event: {e}"),
                    &ResponseSnapshot::default(),
                )
                .await;
                return;
            }
        };

        self.execute(delivery, &subscription, &event).await;
    }

    /// Execute a single signed HTTP send and classify the outcome.
    async fn execute(&self, delivery: &Delivery, subscription: &Subscription, event: &Event) {
        // Serialize first; the signed bytes and the sent bytes must be the
        // same buffer.
        let body = match serde_json::to_vec(&WebhookPayload::from_event(event)) {
            Ok(b) => b,
            Err(e) => {
                self.fail_attempt(
                    delivery,
                    &format!("Failed to serialize payload: {e}"),
                    &ResponseSnapshot::default(),
                )
                .await;
                return;
            }
        };

        let secret = match crypto::decrypt_secret(&subscription.secret_encrypted, &self.encryption_key)
        {
            Ok(s) => s,
            Err(e) => {
                self.fail_attempt(
                    delivery,
                    &format!("Failed to decrypt signing secret: {e}"),
                    &ResponseSnapshot::default(),
                )
                .await;
                return;
            }
        };

        let signature = match crypto::sign_body(&secret, &body) {
            Ok(sig) => sig,
            Err(e) => {
                self.fail_attempt(
                    delivery,
                    &format!("Failed to sign payload: {e}"),
                    &ResponseSnapshot::default(),
                )
                .await;
                return;
            }
        };

        let start = Instant::now();
        let result = self
            .http_client
            .post(&subscription.url)
            .header("Content-Type", "application/json")
            .header("X-Event-Name", &event.event_name)
            .header("X-Signature", format!("sha256={signature}"))
            .body(body)
            .send()
            .await;
        let latency_ms = start.elapsed().as_millis() as i32;

        match result {
            Ok(response) => {
                let status_code = response.status().as_u16();
                let headers = headers_to_json(response.headers());
                let body = response
                    .text()
                    .await
                    .unwrap_or_default()
                    .chars()
                    .take(RESPONSE_BODY_LIMIT)
                    .collect::<String>();

                let snapshot = ResponseSnapshot {
                    status: Some(status_code as i16),
                    headers: Some(headers),
                    body: Some(body),
                    latency_ms: Some(latency_ms),
                };

                if is_success_status(status_code) {
                    self.succeed_attempt(delivery, subscription, &snapshot).await;
                } else {
                    self.fail_attempt(delivery, &format!("HTTP {status_code}"), &snapshot)
                        .await;
                }
            }
            Err(e) => {
                let error_msg = if e.is_timeout() {
                    "Request timeout".to_string()
                } else if e.is_connect() {
                    format!("Connection failed: {e}")
                } else {
                    format!("Request error: {e}")
                };

                let snapshot = ResponseSnapshot {
                    latency_ms: Some(latency_ms),
                    ..ResponseSnapshot::default()
                };
                self.fail_attempt(delivery, &error_msg, &snapshot).await;
            }
        }
    }

    /// Terminal success: `sending -> ok`.
    async fn succeed_attempt(
        &self,
        delivery: &Delivery,
        subscription: &Subscription,
        snapshot: &ResponseSnapshot,
    ) {
        tracing::info!(
            target: "webhook_delivery",
            delivery_id = %delivery.id,
            event_id = %delivery.event_id,
            subscription_id = %subscription.id,
            destination = %subscription.destination_name,
            response_status = snapshot.status,
            latency_ms = snapshot.latency_ms,
            attempt = delivery.attempt_count + 1,
            "Delivery succeeded"
        );

        if let Err(e) = Delivery::record_success(&self.pool, delivery.id, snapshot).await {
            tracing::error!(
                target: "webhook_delivery",
                delivery_id = %delivery.id,
                error = %e,
                "Failed to record delivery success"
            );
        }
    }

    /// Failed attempt: re-arm for retry or terminalize.
    async fn fail_attempt(
        &self,
        delivery: &Delivery,
        error_message: &str,
        snapshot: &ResponseSnapshot,
    ) {
        let attempt_number = delivery.attempt_count + 1;
        let next_attempt_at = calculate_next_attempt_at(attempt_number, self.max_attempts);
        let exhausted = next_attempt_at.is_none();

        tracing::warn!(
            target: "webhook_delivery",
            delivery_id = %delivery.id,
            event_id = %delivery.event_id,
            subscription_id = %delivery.subscription_id,
            error = %error_message,
            attempt = attempt_number,
            exhausted,
            "Delivery attempt failed"
        );

        if let Err(e) =
            Delivery::record_failure(&self.pool, delivery.id, error_message, snapshot, next_attempt_at)
                .await
        {
            tracing::error!(
                target: "webhook_delivery",
                delivery_id = %delivery.id,
                error = %e,
                "Failed to record delivery failure"
            );
        }
    }
}

/// A delivery succeeds on any 2xx response; everything else — other status
/// codes, connection failures, timeouts — takes the single retry path.
#[must_use]
pub fn is_success_status(status: u16) -> bool {
    (200..300).contains(&status)
}

/// Delay before the retry following `attempt_index` completed attempts,
/// zero-indexed, clamped to the last schedule entry.
#[must_use]
pub fn next_delay(attempt_index: usize) -> Duration {
    let secs = BACKOFF_SCHEDULE_SECS
        .get(attempt_index)
        .copied()
        .unwrap_or(BACKOFF_SCHEDULE_SECS[BACKOFF_SCHEDULE_SECS.len() - 1]);
    Duration::seconds(secs)
}

/// Next retry timestamp after a failed attempt, or `None` once attempts are
/// exhausted. `attempt_number` counts completed attempts including the one
/// that just failed.
#[must_use]
pub fn calculate_next_attempt_at(
    attempt_number: i32,
    max_attempts: i32,
) -> Option<DateTime<Utc>> {
    if attempt_number >= max_attempts {
        return None;
    }

    let idx = (attempt_number - 1).max(0) as usize;
    Some(Utc::now() + next_delay(idx))
}

/// Flatten response headers into a JSON object for the row snapshot.
fn headers_to_json(headers: &reqwest::header::HeaderMap) -> serde_json::Value {
    let mut map = serde_json::Map::new();
    for (name, value) in headers {
        if let Ok(v) = value.to_str() {
            map.insert(name.to_string(), serde_json::Value::String(v.to_string()));
        }
    }
    serde_json::Value::Object(map)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
