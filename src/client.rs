//! Broker connection module
//!
//! Wraps a persistent broker connection and turns its raw callbacks into
//! [`ConnectionEvent`]s on a topic-scoped event channel.

/// Connection and subscription settings
pub mod config;
/// Lifecycle wrapper around a transport
pub mod connection_client;
/// Client error types
pub mod error;
/// Connection lifecycle events
pub mod event;
/// rumqttc-backed transport
pub mod rumqttc_transport;
/// Connector and transport traits
pub mod transport;

pub use config::{ClientSettings, ConnectOptions, SubscriptionConfig};
pub use connection_client::{
	ConnectCallbacks, ConnectionClient, ConnectionState,
};
pub use error::{ConnectionClientError, TransportError};
pub use event::{ConnectionEvent, EventKind};
pub use rumqttc_transport::{RumqttcConnector, RumqttcTransport};
pub use transport::{Connector, Transport, TransportHandlers};
