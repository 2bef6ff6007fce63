//! # Fleet Router
//!
//! Topic-addressed publish/subscribe routing for real-time fleet tracking
//! clients. Vehicle, call and hospital updates arrive over one persistent
//! broker connection and are fanned out to any number of independent
//! components.
//!
//! ## Layers
//!
//! - **Topic patterns**: broker-style filters with `+` and trailing `#`
//!   wildcards ([`TopicPattern`]), and a pattern-keyed subscriber
//!   dictionary ([`TopicRegistry`]).
//! - **Observer**: [`TopicObserver`] broadcasts to every subscriber list
//!   whose pattern matches a topic, plus the reserved ALL channel.
//! - **Connection**: [`ConnectionClient`] turns broker callbacks into
//!   [`ConnectionEvent`]s and tracks the connection state.
//! - **Application**: [`ApplicationRouter`] discovers entities through a
//!   [`DataSource`], subscribes their topics and re-broadcasts decoded
//!   updates.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use fleet_router::prelude::*;
//!
//! struct Backend;
//!
//! impl DataSource for Backend {
//!     async fn fetch(
//!         &self,
//!         _kind: EntityKind,
//!     ) -> Result<Vec<EntityRecord>, DataSourceError> {
//!         Ok(Vec::new())
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = Arc::new(ConnectionClient::new(RumqttcConnector::default()));
//!     let router = ApplicationRouter::new(client, Backend)?;
//!
//!     router.observe(
//!         Some("ambulance/+/data"),
//!         Subscriber::from_fn(|update: &EntityUpdate| {
//!             println!("{}: {}", update.topic, update.payload);
//!         }),
//!     )?;
//!
//!     router.start(&ConnectOptions::localhost("dispatch-ui")).await?;
//!     router.shutdown().await?;
//!     Ok(())
//! }
//! ```

pub mod app;
pub mod client;
pub mod message_serializer;
pub mod routing;
pub mod topic;

pub use app::{
	ApplicationRouter, DataSource, DataSourceError, EntityId, EntityKind,
	EntityRecord, EntityUpdate, RouterError,
};
pub use client::{
	ClientSettings, ConnectCallbacks, ConnectOptions, ConnectionClient,
	ConnectionClientError, ConnectionEvent, ConnectionState, Connector,
	EventKind, RumqttcConnector, SubscriptionConfig, Transport,
	TransportError, TransportHandlers,
};
pub use message_serializer::{JsonSerializer, MessageSerializer, Payload};
pub use routing::{
	ALL_TOPICS, BroadcastReport, EventSource, Subscriber, SubscriberError,
	TopicObserver,
};
pub use topic::{TopicPattern, TopicPatternError, TopicRegistry};

// Essential external types
pub use rumqttc::QoS;

/// Prelude module for convenient imports
///
/// ```rust
/// use fleet_router::prelude::*;
/// ```
pub mod prelude {
	//! Essential types for most applications

	pub use crate::{
		ALL_TOPICS, ApplicationRouter, ConnectOptions, ConnectionClient,
		ConnectionEvent, DataSource, DataSourceError, EntityKind,
		EntityRecord, EntityUpdate, EventSource, QoS, RumqttcConnector,
		Subscriber, TopicObserver,
	};
}

/// Error types used throughout the library
///
/// ```rust
/// use fleet_router::errors::*;
/// ```
pub mod errors {
	//! All error types used in the library

	pub use crate::app::RouterError;
	pub use crate::client::{ConnectionClientError, TransportError};
	pub use crate::message_serializer::PayloadDecodeError;
	pub use crate::routing::SubscriberError;
	pub use crate::topic::{TopicError, TopicPatternError, TopicRegistryError};
}
