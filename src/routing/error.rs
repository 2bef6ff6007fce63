use std::error::Error as StdError;

use thiserror::Error;

/// Failure reported by a single subscriber during a broadcast.
#[derive(Debug, Error)]
pub enum SubscriberError {
	/// Subscriber returned an error
	#[error("Subscriber failed: {0}")]
	Failed(Box<dyn StdError + Send + Sync>),
	/// Subscriber panicked; the panic was contained
	#[error("Subscriber panicked: {message}")]
	Panicked { message: String },
}

impl SubscriberError {
	/// Wraps any error (or message) as a subscriber failure
	pub fn failed(err: impl Into<Box<dyn StdError + Send + Sync>>) -> Self {
		Self::Failed(err.into())
	}

	/// Returns the error type for categorization
	pub fn error_type(&self) -> &'static str {
		match self {
			| SubscriberError::Failed(_) => "failed",
			| SubscriberError::Panicked { .. } => "panicked",
		}
	}
}

/// What a subscriber callback returns.
pub type SubscriberResult = Result<(), SubscriberError>;
