//! Integration tests for retry semantics and the backoff schedule.
//!
//! The retry loop is driven by `calculate_next_attempt_at`; these tests
//! exercise that policy together with an endpoint that recovers after a few
//! failures.

mod common;

use common::*;
use webhook_relay::services::delivery_service::{
    calculate_next_attempt_at, is_success_status, next_delay, DEFAULT_MAX_ATTEMPTS,
};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer};

/// Test: an endpoint that fails twice then recovers is delivered on the
/// third attempt, and the policy would have kept retrying that long.
#[tokio::test]
async fn test_recovering_endpoint_succeeds_within_budget() {
    let mock_server = MockServer::start().await;
    let responder = FailingResponder::fail_times(2);

    Mock::given(method("POST"))
        .and(path("/hooks"))
        .respond_with(responder.clone())
        .mount(&mock_server)
        .await;

    let client = TestWebhookClient::new();
    let payload = donation_created_payload(USER_1);
    let url = format!("{}/hooks", mock_server.uri());

    // Drive the attempt loop the way the dispatcher does: send, classify,
    // consult the policy, repeat until success or exhaustion.
    let mut attempt_number = 0;
    let mut delivered = false;
    while !delivered {
        let response = client.deliver(&url, &payload, SECRET_1).await.unwrap();
        attempt_number += 1;

        if is_success_status(response.status().as_u16()) {
            delivered = true;
        } else if calculate_next_attempt_at(attempt_number, DEFAULT_MAX_ATTEMPTS).is_none() {
            break;
        }
    }

    assert!(delivered, "Delivery should succeed once the endpoint recovers");
    assert_eq!(attempt_number, 3, "Two failures then one success");
    assert_eq!(responder.attempt_count(), 3);
}

/// Test: a permanently failing endpoint exhausts after exactly the maximum
/// number of attempts.
#[tokio::test]
async fn test_permanent_failure_exhausts_at_max_attempts() {
    let mock_server = MockServer::start().await;
    let responder = CountingResponder::with_status(500);

    Mock::given(method("POST"))
        .and(path("/hooks"))
        .respond_with(responder.clone())
        .mount(&mock_server)
        .await;

    let client = TestWebhookClient::new();
    let payload = donation_created_payload(USER_1);
    let url = format!("{}/hooks", mock_server.uri());

    let mut attempt_number = 0;
    loop {
        let response = client.deliver(&url, &payload, SECRET_1).await.unwrap();
        attempt_number += 1;
        assert!(!is_success_status(response.status().as_u16()));

        if calculate_next_attempt_at(attempt_number, DEFAULT_MAX_ATTEMPTS).is_none() {
            break;
        }
    }

    assert_eq!(attempt_number, DEFAULT_MAX_ATTEMPTS);
    assert_eq!(responder.count(), DEFAULT_MAX_ATTEMPTS as u32);
}

/// Test: the retry delays escalate 2, 4, 8, 16, 32 minutes across the
/// five retries.
#[tokio::test]
async fn test_backoff_delays_escalate() {
    let expected_minutes = [2, 4, 8, 16, 32];

    for (attempt_number, minutes) in (1..=5).zip(expected_minutes) {
        let delay = next_delay((attempt_number - 1) as usize);
        assert_eq!(
            delay.num_minutes(),
            minutes,
            "retry after attempt {attempt_number}"
        );
    }
}

/// Test: retries stop producing timestamps exactly at the attempt cap.
#[tokio::test]
async fn test_policy_is_exhausted_only_at_cap() {
    for attempt_number in 1..DEFAULT_MAX_ATTEMPTS {
        assert!(
            calculate_next_attempt_at(attempt_number, DEFAULT_MAX_ATTEMPTS).is_some(),
            "attempt {attempt_number} should reschedule"
        );
    }
    assert!(calculate_next_attempt_at(DEFAULT_MAX_ATTEMPTS, DEFAULT_MAX_ATTEMPTS).is_none());
}

/// Test: every attempt carries a fresh, valid signature.
#[tokio::test]
async fn test_each_retry_is_signed() {
    let mock_server = MockServer::start().await;
    let capture = CaptureResponder::with_status(503);

    Mock::given(method("POST"))
        .and(path("/hooks"))
        .respond_with(capture.clone())
        .mount(&mock_server)
        .await;

    let client = TestWebhookClient::new();
    let payload = donation_created_payload(USER_1);
    let url = format!("{}/hooks", mock_server.uri());

    for _ in 0..3 {
        client.deliver(&url, &payload, SECRET_1).await.unwrap();
    }

    let requests = capture.requests();
    assert_eq!(requests.len(), 3);
    for request in &requests {
        assert!(
            verify_captured_signature(request, SECRET_1),
            "Every retry must carry a valid signature"
        );
    }
}
