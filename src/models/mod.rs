//! Database row types and queries.

pub mod delivery;
pub mod event;
pub mod subscription;

pub use delivery::{Delivery, DeliveryStatus, ResponseSnapshot};
pub use event::{Event, NewEvent};
pub use subscription::{CreateSubscription, Subscription, UpdateSubscription};
