//! Message routing and subscriber management module
//!
//! Fans a broadcast out to every subscriber whose topic filter matches,
//! plus the reserved ALL channel.

/// Subscriber failure types
pub mod error;
/// Topic-scoped observer registry
pub mod observer;
/// Callback handles
pub mod subscriber;

pub use error::{SubscriberError, SubscriberResult};
pub use observer::{ALL_TOPICS, BroadcastReport, EventSource, TopicObserver};
pub use subscriber::Subscriber;
