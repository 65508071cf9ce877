//! Business logic services.

pub mod delivery_service;
pub mod event_service;
pub mod subscription_service;
