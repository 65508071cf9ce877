//! Axum router and shared handler state.

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use sqlx::PgPool;
use tower_http::trace::TraceLayer;

use crate::handlers::{deliveries, events, subscriptions};
use crate::services::event_service::EventService;
use crate::services::subscription_service::SubscriptionService;

/// Shared state for API handlers.
#[derive(Clone)]
pub struct AppState {
    pub event_service: EventService,
    pub subscription_service: Arc<SubscriptionService>,
    pool: PgPool,
}

impl AppState {
    /// Create handler state from a pool and the secret encryption key.
    pub fn new(pool: PgPool, encryption_key: Vec<u8>, allow_http: bool) -> Self {
        Self {
            event_service: EventService::new(pool.clone()),
            subscription_service: Arc::new(
                SubscriptionService::new(pool.clone(), encryption_key).with_allow_http(allow_http),
            ),
            pool,
        }
    }

    /// Get a reference to the database pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Build the relay router with all routes.
pub fn relay_router(state: AppState) -> Router {
    Router::new()
        // Producer interface
        .route("/events", post(events::append_event_handler))
        .route("/events/:id", get(events::get_event_handler))
        // Subscription registry
        .route(
            "/subscriptions",
            post(subscriptions::create_subscription_handler)
                .get(subscriptions::list_subscriptions_handler),
        )
        .route(
            "/subscriptions/:id",
            get(subscriptions::get_subscription_handler)
                .patch(subscriptions::update_subscription_handler)
                .delete(subscriptions::delete_subscription_handler),
        )
        .route(
            "/subscriptions/:id/deactivate",
            post(subscriptions::deactivate_subscription_handler),
        )
        // Delivery ledger (operator triage)
        .route("/deliveries", get(deliveries::list_deliveries_handler))
        .route("/deliveries/:id", get(deliveries::get_delivery_handler))
        .route(
            "/subscriptions/:id/deliveries",
            get(deliveries::list_subscription_deliveries_handler),
        )
        .route("/healthz", get(|| async { "ok" }))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
