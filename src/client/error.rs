use rumqttc::{ClientError, OptionError};

use crate::topic::{TopicError, TopicPatternError};

/// Failures of the underlying broker transport.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
	/// Request could not be queued on the rumqttc client
	#[error("Client operation failed: {0}")]
	Client(#[from] ClientError),

	/// Connection options were rejected by rumqttc
	#[error("Configuration error: {0}")]
	Options(#[from] OptionError),

	/// Network or protocol failure
	#[error("Network connection failed: {details}")]
	Network { details: String },

	/// Broker refused the connection
	#[error("Broker rejected connection: {reason}")]
	Rejected { reason: String },

	/// Connection establishment timed out
	#[error("Connection establishment timed out after {timeout_millis}ms")]
	Timeout { timeout_millis: u64 },
}

impl TransportError {
	/// Creates a new Network error
	pub fn network(details: impl Into<String>) -> Self {
		Self::Network {
			details: details.into(),
		}
	}

	/// Creates a new Rejected error
	pub fn rejected(reason: impl Into<String>) -> Self {
		Self::Rejected {
			reason: reason.into(),
		}
	}

	/// Returns the error type for categorization
	pub fn error_type(&self) -> &'static str {
		match self {
			| TransportError::Client(_) => "client",
			| TransportError::Options(_) => "options",
			| TransportError::Network { .. } => "network",
			| TransportError::Rejected { .. } => "rejected",
			| TransportError::Timeout { .. } => "timeout",
		}
	}
}

/// Errors that can occur in connection client operations
#[derive(Debug, thiserror::Error)]
pub enum ConnectionClientError {
	/// Transport failed to connect, subscribe, unsubscribe or publish
	#[error("Transport error: {0}")]
	Transport(#[from] TransportError),

	/// Topic or filter rejected before reaching the transport
	#[error("Topic error: {0}")]
	Topic(#[from] TopicError),

	/// `connect` called while an earlier call is still in flight
	#[error("A connection attempt is already in progress")]
	ConnectInProgress,

	/// Payload could not be encoded
	#[error("Serialization error: {0}")]
	Serialization(String),
}

impl From<TopicPatternError> for ConnectionClientError {
	fn from(err: TopicPatternError) -> Self {
		ConnectionClientError::Topic(err.into())
	}
}
