//! Common test utilities for webhook-relay integration tests.
//!
//! Provides mock servers, responders, and fixtures for verifying delivery
//! behavior over the wire without requiring a real database.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use uuid::Uuid;
use wiremock::{Request, Respond, ResponseTemplate};

// ---------------------------------------------------------------------------
// Test fixtures
// ---------------------------------------------------------------------------

/// Standard test signing secrets
pub const SECRET_1: &str = "whsec_test_secret_key_12345";
pub const SECRET_2: &str = "whsec_another_secret_67890";

/// Standard test user IDs
pub const USER_1: i64 = 1001;
pub const USER_2: i64 = 2002;

// ---------------------------------------------------------------------------
// CapturedRequest - for inspecting webhook requests
// ---------------------------------------------------------------------------

/// A captured HTTP request with body and headers.
#[derive(Debug, Clone)]
pub struct CapturedRequest {
    pub body: Vec<u8>,
    pub headers: HashMap<String, String>,
    pub timestamp: DateTime<Utc>,
}

impl CapturedRequest {
    /// Parse the body as JSON.
    pub fn body_json<T: serde::de::DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }

    /// Get a header value by name (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        let name_lower = name.to_lowercase();
        self.headers
            .iter()
            .find(|(k, _)| k.to_lowercase() == name_lower)
            .map(|(_, v)| v.as_str())
    }
}

// ---------------------------------------------------------------------------
// CaptureResponder - captures requests and returns success
// ---------------------------------------------------------------------------

/// A wiremock responder that captures incoming requests.
#[derive(Clone)]
pub struct CaptureResponder {
    requests: Arc<Mutex<Vec<CapturedRequest>>>,
    response_code: u16,
}

impl CaptureResponder {
    /// Create a new capture responder that returns 200 OK.
    pub fn new() -> Self {
        Self {
            requests: Arc::new(Mutex::new(Vec::new())),
            response_code: 200,
        }
    }

    /// Create a capture responder that returns a custom status code.
    pub fn with_status(status: u16) -> Self {
        Self {
            requests: Arc::new(Mutex::new(Vec::new())),
            response_code: status,
        }
    }

    /// Get all captured requests.
    pub fn requests(&self) -> Vec<CapturedRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Get the number of captured requests.
    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

impl Default for CaptureResponder {
    fn default() -> Self {
        Self::new()
    }
}

impl Respond for CaptureResponder {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let captured = CapturedRequest {
            body: request.body.clone(),
            headers: request
                .headers
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_str().unwrap_or("").to_string()))
                .collect(),
            timestamp: Utc::now(),
        };
        self.requests.lock().unwrap().push(captured);
        ResponseTemplate::new(self.response_code)
    }
}

// ---------------------------------------------------------------------------
// CountingResponder - counts requests
// ---------------------------------------------------------------------------

/// A wiremock responder that counts incoming requests.
#[derive(Clone)]
pub struct CountingResponder {
    count: Arc<AtomicU32>,
    response_code: u16,
}

impl CountingResponder {
    /// Create a new counting responder that returns 200 OK.
    pub fn new() -> Self {
        Self {
            count: Arc::new(AtomicU32::new(0)),
            response_code: 200,
        }
    }

    /// Create a counting responder that returns a custom status code.
    pub fn with_status(status: u16) -> Self {
        Self {
            count: Arc::new(AtomicU32::new(0)),
            response_code: status,
        }
    }

    /// Get the current request count.
    pub fn count(&self) -> u32 {
        self.count.load(Ordering::SeqCst)
    }
}

impl Default for CountingResponder {
    fn default() -> Self {
        Self::new()
    }
}

impl Respond for CountingResponder {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        self.count.fetch_add(1, Ordering::SeqCst);
        ResponseTemplate::new(self.response_code)
    }
}

// ---------------------------------------------------------------------------
// FailingResponder - fails N times then succeeds
// ---------------------------------------------------------------------------

/// A wiremock responder that fails a specified number of times before succeeding.
#[derive(Clone)]
pub struct FailingResponder {
    attempt_count: Arc<AtomicU32>,
    failures_before_success: u32,
    failure_code: u16,
    success_code: u16,
}

impl FailingResponder {
    /// Create a responder that fails `n` times with 500, then returns 200.
    pub fn fail_times(n: u32) -> Self {
        Self {
            attempt_count: Arc::new(AtomicU32::new(0)),
            failures_before_success: n,
            failure_code: 500,
            success_code: 200,
        }
    }

    /// Create a responder that fails with a custom status code.
    pub fn fail_with_status(n: u32, failure_code: u16) -> Self {
        Self {
            attempt_count: Arc::new(AtomicU32::new(0)),
            failures_before_success: n,
            failure_code,
            success_code: 200,
        }
    }

    /// Get the current attempt count.
    pub fn attempt_count(&self) -> u32 {
        self.attempt_count.load(Ordering::SeqCst)
    }
}

impl Respond for FailingResponder {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        let n = self.attempt_count.fetch_add(1, Ordering::SeqCst);
        if n < self.failures_before_success {
            ResponseTemplate::new(self.failure_code)
        } else {
            ResponseTemplate::new(self.success_code)
        }
    }
}

// ---------------------------------------------------------------------------
// DelayedResponder - adds response delay
// ---------------------------------------------------------------------------

/// A wiremock responder that adds a delay before responding.
#[derive(Clone)]
pub struct DelayedResponder {
    delay_ms: u64,
    response_code: u16,
}

impl DelayedResponder {
    /// Create a responder that delays for `ms` milliseconds.
    pub fn new(delay_ms: u64) -> Self {
        Self {
            delay_ms,
            response_code: 200,
        }
    }

    /// Create a delayed responder with custom status code.
    pub fn with_status(delay_ms: u64, response_code: u16) -> Self {
        Self {
            delay_ms,
            response_code,
        }
    }
}

impl Respond for DelayedResponder {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        ResponseTemplate::new(self.response_code)
            .set_delay(std::time::Duration::from_millis(self.delay_ms))
    }
}

// ---------------------------------------------------------------------------
// WirePayload - matches the delivered JSON body
// ---------------------------------------------------------------------------

/// JSON payload delivered to subscriber endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WirePayload {
    pub id: Uuid,
    pub event_name: String,
    pub user_id: i64,
    pub occurred_at: DateTime<Utc>,
    pub source: String,
    pub payload: serde_json::Value,
}

// ---------------------------------------------------------------------------
// Helper functions for signature verification
// ---------------------------------------------------------------------------

/// Compute the hex HMAC-SHA256 signature over raw body bytes (same scheme as
/// the crypto module).
pub fn compute_test_signature(secret: &str, body: &[u8]) -> String {
    use hmac::{Hmac, Mac};
    use sha2::Sha256;

    type HmacSha256 = Hmac<Sha256>;

    let mut mac = <HmacSha256 as Mac>::new_from_slice(secret.as_bytes())
        .expect("HMAC can take key of any size");
    mac.update(body);

    hex::encode(mac.finalize().into_bytes())
}

/// Verify the signature header on a captured request.
pub fn verify_captured_signature(request: &CapturedRequest, secret: &str) -> bool {
    let signature_header = match request.header("x-signature") {
        Some(h) => h,
        None => return false,
    };

    // Expected format: "sha256={hex}"
    let expected = format!("sha256={}", compute_test_signature(secret, &request.body));

    signature_header == expected
}

// ---------------------------------------------------------------------------
// Test HTTP client mirroring the delivery send path
// ---------------------------------------------------------------------------

/// HTTP client that sends payloads the way the delivery service does:
/// serialized once, signed over the exact bytes, with the event name and
/// signature headers.
pub struct TestWebhookClient {
    client: reqwest::Client,
}

impl TestWebhookClient {
    /// Create a new test client.
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(10))
                .redirect(reqwest::redirect::Policy::none())
                .build()
                .expect("Failed to build HTTP client"),
        }
    }

    /// Create a test client with a short timeout, for timeout tests.
    pub fn with_timeout_ms(ms: u64) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_millis(ms))
                .redirect(reqwest::redirect::Policy::none())
                .build()
                .expect("Failed to build HTTP client"),
        }
    }

    /// Deliver a payload to a URL, signed with `secret`.
    pub async fn deliver(
        &self,
        url: &str,
        payload: &WirePayload,
        secret: &str,
    ) -> Result<reqwest::Response, reqwest::Error> {
        let body = serde_json::to_vec(payload).expect("Failed to serialize payload");
        let signature = compute_test_signature(secret, &body);

        self.client
            .post(url)
            .header("Content-Type", "application/json")
            .header("X-Event-Name", &payload.event_name)
            .header("X-Signature", format!("sha256={signature}"))
            .body(body)
            .send()
            .await
    }
}

impl Default for TestWebhookClient {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Helper to create test payloads
// ---------------------------------------------------------------------------

/// Create a test payload for a donation.created event.
pub fn donation_created_payload(user_id: i64) -> WirePayload {
    WirePayload {
        id: Uuid::new_v4(),
        event_name: "donation.created".to_string(),
        user_id,
        occurred_at: Utc::now(),
        source: "donations-api".to_string(),
        payload: serde_json::json!({
            "donation_id": 88101,
            "amount_cents": 2500,
            "currency": "USD"
        }),
    }
}

/// Create a test payload for an enrollment.completed event.
pub fn enrollment_completed_payload(user_id: i64) -> WirePayload {
    WirePayload {
        id: Uuid::new_v4(),
        event_name: "enrollment.completed".to_string(),
        user_id,
        occurred_at: Utc::now(),
        source: "enrollments-api".to_string(),
        payload: serde_json::json!({
            "enrollment_id": 4302,
            "program": "spring-cohort"
        }),
    }
}

/// Create a custom test payload.
pub fn custom_payload(user_id: i64, event_name: &str, data: serde_json::Value) -> WirePayload {
    WirePayload {
        id: Uuid::new_v4(),
        event_name: event_name.to_string(),
        user_id,
        occurred_at: Utc::now(),
        source: "test-suite".to_string(),
        payload: data,
    }
}
