//! Error types and utilities for the topic module
//!
//! Holds the composite error type and shared constants for the topic
//! module, while the individual error types stay next to the code that
//! raises them.

use thiserror::Error;

use super::topic_pattern::TopicPatternError;
use super::topic_registry::TopicRegistryError;

/// Comprehensive error type for all topic-related operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TopicError {
	/// Topic filter parsing or validation error
	#[error("Topic pattern error: {0}")]
	Pattern(#[from] TopicPatternError),

	/// Registry operation error
	#[error("Topic registry error: {0}")]
	Registry(#[from] TopicRegistryError),

	/// Concrete topic rejected for publishing
	#[error("Topic '{topic}' cannot be published to: {reason}")]
	InvalidPublishTopic { topic: String, reason: String },
}

impl TopicError {
	/// Creates a new InvalidPublishTopic error
	pub fn invalid_publish_topic(
		topic: impl Into<String>,
		reason: impl Into<String>,
	) -> Self {
		Self::InvalidPublishTopic {
			topic: topic.into(),
			reason: reason.into(),
		}
	}
}

/// Convenient Result type for topic operations
pub type TopicResult<T> = Result<T, TopicError>;

/// Convenient Result type for pattern operations
pub type PatternResult<T> = Result<T, TopicPatternError>;

/// Convenient Result type for registry operations
pub type RegistryResult<T> = Result<T, TopicRegistryError>;

/// Topic processing limits
pub mod limits {
	/// Maximum topic length accepted by MQTT brokers
	pub const MAX_TOPIC_LENGTH: usize = 65535;
}

/// Validation utilities for topic operations
pub mod validation {
	use super::TopicError;
	use super::limits::MAX_TOPIC_LENGTH;

	/// Validates a concrete topic for publishing.
	///
	/// Publishing needs an exact topic, so wildcards and null bytes are
	/// rejected along with empty or oversized names.
	pub fn validate_publish_topic(topic: &str) -> Result<(), TopicError> {
		if topic.is_empty() || topic.len() > MAX_TOPIC_LENGTH {
			return Err(TopicError::invalid_publish_topic(
				topic,
				"Topic is empty or too long",
			));
		}
		if topic.chars().any(|c| matches!(c, '\0' | '#' | '+')) {
			return Err(TopicError::invalid_publish_topic(
				topic,
				"Topic contains illegal characters ('#', '+', or null byte)",
			));
		}
		Ok(())
	}

	#[cfg(test)]
	mod tests {
		use super::*;

		#[test]
		fn test_validate_publish_topic() {
			assert!(validate_publish_topic("ambulance/1/data").is_ok());
			assert!(validate_publish_topic("").is_err());
			assert!(validate_publish_topic("ambulance/+/data").is_err());
			assert!(validate_publish_topic("ambulance/#").is_err());
			assert!(validate_publish_topic("bad\0topic").is_err());
		}
	}
}
