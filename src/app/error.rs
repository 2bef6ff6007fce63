use thiserror::Error;

use super::data_source::DataSourceError;
use crate::client::ConnectionClientError;
use crate::topic::{TopicError, TopicPatternError, TopicRegistryError};

/// Errors that can occur in application router operations
#[derive(Debug, Error)]
pub enum RouterError {
	/// Connection client failed
	#[error("Client error: {0}")]
	Client(#[from] ConnectionClientError),

	/// Entity retrieval failed
	#[error("Data source error: {0}")]
	DataSource(#[from] DataSourceError),

	/// Topic or filter rejected
	#[error("Topic error: {0}")]
	Topic(#[from] TopicError),

	/// Payload could not be encoded for publishing
	#[error("Serialization error: {0}")]
	Serialization(#[from] serde_json::Error),

	/// `start` called twice
	#[error("Router already started")]
	AlreadyStarted,

	/// Operation needs a started router
	#[error("Router not started")]
	NotStarted,
}

impl RouterError {
	/// Returns the error type for categorization
	pub fn error_type(&self) -> &'static str {
		match self {
			| RouterError::Client(_) => "client",
			| RouterError::DataSource(_) => "data_source",
			| RouterError::Topic(_) => "topic",
			| RouterError::Serialization(_) => "serialization",
			| RouterError::AlreadyStarted => "already_started",
			| RouterError::NotStarted => "not_started",
		}
	}
}

impl From<TopicRegistryError> for RouterError {
	fn from(err: TopicRegistryError) -> Self {
		RouterError::Topic(err.into())
	}
}

impl From<TopicPatternError> for RouterError {
	fn from(err: TopicPatternError) -> Self {
		RouterError::Topic(err.into())
	}
}

/// Convenient Result type for router operations
pub type RouterResult<T> = Result<T, RouterError>;
