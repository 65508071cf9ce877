//! Reliable webhook delivery: at-least-once, signed, retried pushes of
//! domain events to externally registered HTTP endpoints.
//!
//! Events are appended to an immutable store and fanned out into a delivery
//! ledger, one row per active subscription. A periodic dispatcher claims due
//! rows atomically, sends HMAC-SHA256-signed HTTP POSTs with a bounded
//! worker pool, and transitions each row to a terminal or retry state with
//! exponential backoff.

pub mod config;
pub mod crypto;
pub mod dispatcher;
pub mod error;
pub mod handlers;
pub mod models;
pub mod router;
pub mod services;
pub mod validation;

pub use config::Config;
pub use dispatcher::{Dispatcher, DispatcherConfig};
pub use error::WebhookError;
pub use models::{Delivery, DeliveryStatus, Event, Subscription};
pub use router::{relay_router, AppState};
pub use services::delivery_service::{DeliveryService, WebhookPayload};
pub use services::event_service::EventService;
pub use services::subscription_service::SubscriptionService;
