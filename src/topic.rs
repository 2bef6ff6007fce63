//! Topic handling module
//!
//! Compiles broker-style topic filters and keeps the pattern-keyed
//! subscriber dictionary the observers are built on.

pub mod error;
pub mod topic_pattern;
pub mod topic_registry;


pub use error::{
	PatternResult, RegistryResult, TopicError, TopicResult, limits, validation,
};
pub use topic_pattern::{
	PatternSegments, TopicPattern, TopicPatternError, TopicPatternItem,
};
pub use topic_registry::{TopicMatches, TopicRegistry, TopicRegistryError};
