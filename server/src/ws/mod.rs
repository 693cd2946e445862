pub mod actor;
pub mod broadcast;
pub mod handler;
pub mod registry;

pub use broadcast::{BroadcastReport, Broadcaster, DeliveryOutcome, Payload};
pub use registry::{ConnectionRegistry, ConnectionState, SubscriberHandle, SubscriberId};
