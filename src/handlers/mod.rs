//! HTTP API handlers.

pub mod deliveries;
pub mod events;
pub mod subscriptions;
