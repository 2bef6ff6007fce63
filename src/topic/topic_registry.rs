use std::collections::HashMap;

use arcstr::ArcStr;
use thiserror::Error;

use super::topic_pattern::{TopicPattern, TopicPatternError};

/// Errors that can occur during registry operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TopicRegistryError {
	/// Topic filter failed to compile
	#[error("Invalid topic: {0}")]
	InvalidTopic(#[from] TopicPatternError),

	/// `create` was called for a key that already exists
	#[error("Topic '{topic}' is already registered")]
	DuplicateTopic { topic: String },

	/// Operation on a key that was never created or pushed
	#[error("Topic '{topic}' is not registered")]
	UnknownTopic { topic: String },
}

impl TopicRegistryError {
	/// Creates a new DuplicateTopic error
	pub fn duplicate_topic(topic: impl Into<String>) -> Self {
		Self::DuplicateTopic {
			topic: topic.into(),
		}
	}

	/// Creates a new UnknownTopic error
	pub fn unknown_topic(topic: impl Into<String>) -> Self {
		Self::UnknownTopic {
			topic: topic.into(),
		}
	}

	/// Returns the error type for categorization
	pub fn error_type(&self) -> &'static str {
		match self {
			| TopicRegistryError::InvalidTopic(_) => "invalid_topic",
			| TopicRegistryError::DuplicateTopic { .. } => "duplicate_topic",
			| TopicRegistryError::UnknownTopic { .. } => "unknown_topic",
		}
	}
}

/// Key-to-subscriber-list pairs returned by [`TopicRegistry::get`], in
/// registration order.
pub type TopicMatches<'a, T> = Vec<(ArcStr, &'a [T])>;

#[derive(Debug)]
struct RegistryEntry<T> {
	pattern: TopicPattern,
	subscribers: Vec<T>,
}

/// Pattern-keyed subscriber dictionary.
///
/// Each distinct filter string owns an ordered subscriber list. Entries stay
/// in place when their last subscriber is removed, so `contains` keeps
/// answering `true` for a filter that was populated once.
#[derive(Debug)]
pub struct TopicRegistry<T> {
	entries: HashMap<ArcStr, RegistryEntry<T>>,
	// Registration order of `entries`; same key set at all times.
	keys: Vec<ArcStr>,
}

impl<T> Default for TopicRegistry<T> {
	fn default() -> Self {
		Self::new()
	}
}

impl<T> TopicRegistry<T> {
	pub fn new() -> Self {
		Self {
			entries: HashMap::new(),
			keys: Vec::new(),
		}
	}

	/// Inserts an empty list for `pattern`. Returns `false` if the key exists.
	pub(crate) fn insert_pattern(&mut self, pattern: TopicPattern) -> bool {
		let key = pattern.key().clone();
		if self.entries.contains_key(&key) {
			return false;
		}
		self.entries.insert(key.clone(), RegistryEntry {
			pattern,
			subscribers: Vec::new(),
		});
		self.keys.push(key);
		true
	}

	/// Registers `filter` with an empty subscriber list.
	pub fn create(&mut self, filter: &str) -> Result<(), TopicRegistryError> {
		let pattern = TopicPattern::compile(filter)?;
		if self.insert_pattern(pattern) {
			Ok(())
		} else {
			Err(TopicRegistryError::duplicate_topic(filter))
		}
	}

	/// Appends `subscriber` to the list of `filter`, creating the key if
	/// needed. Returns `true` when the key was freshly created.
	pub fn push(
		&mut self,
		filter: &str,
		subscriber: T,
	) -> Result<bool, TopicRegistryError> {
		let pattern = TopicPattern::compile(filter)?;
		let key = pattern.key().clone();
		let fresh = self.insert_pattern(pattern);
		self.entries
			.get_mut(&key)
			.ok_or_else(|| TopicRegistryError::unknown_topic(filter))?
			.subscribers
			.push(subscriber);
		Ok(fresh)
	}

	pub fn contains(&self, filter: &str) -> bool {
		self.entries.contains_key(filter)
	}

	/// Every key whose pattern matches `topic`, in registration order.
	pub fn match_all(&self, topic: &str) -> Vec<ArcStr> {
		self.matching_keys(topic).cloned().collect()
	}

	pub fn match_first(&self, topic: &str) -> Option<ArcStr> {
		self.matching_keys(topic).next().cloned()
	}

	fn matching_keys<'a>(
		&'a self,
		topic: &'a str,
	) -> impl Iterator<Item = &'a ArcStr> + 'a {
		self.keys.iter().filter(move |key| {
			self.entries
				.get(*key)
				.is_some_and(|entry| entry.pattern.matches(topic))
		})
	}

	/// Subscriber lists of every key matching `topic`.
	///
	/// Fails with `UnknownTopic` when nothing matches.
	pub fn get(
		&self,
		topic: &str,
	) -> Result<TopicMatches<'_, T>, TopicRegistryError> {
		let matches: TopicMatches<'_, T> = self
			.matching_keys(topic)
			.filter_map(|key| {
				self.entries
					.get(key)
					.map(|entry| (key.clone(), entry.subscribers.as_slice()))
			})
			.collect();
		if matches.is_empty() {
			return Err(TopicRegistryError::unknown_topic(topic));
		}
		Ok(matches)
	}

	/// Subscriber list stored under the exact key `filter`.
	pub fn subscribers(&self, filter: &str) -> Option<&[T]> {
		self.entries
			.get(filter)
			.map(|entry| entry.subscribers.as_slice())
	}

	pub fn keys(&self) -> &[ArcStr] {
		&self.keys
	}

	pub fn len(&self) -> usize {
		self.keys.len()
	}

	pub fn is_empty(&self) -> bool {
		self.keys.is_empty()
	}

	/// Drops every key and subscriber.
	pub fn clear(&mut self) {
		self.entries.clear();
		self.keys.clear();
	}
}

impl<T: PartialEq> TopicRegistry<T> {
	/// Removes every occurrence of `subscriber` from the list of `filter`.
	/// Returns how many registrations were dropped.
	pub fn remove(
		&mut self,
		filter: &str,
		subscriber: &T,
	) -> Result<usize, TopicRegistryError> {
		let pattern = TopicPattern::compile(filter)?;
		let entry = self
			.entries
			.get_mut(pattern.key())
			.ok_or_else(|| TopicRegistryError::unknown_topic(filter))?;
		let before = entry.subscribers.len();
		entry.subscribers.retain(|s| s != subscriber);
		Ok(before - entry.subscribers.len())
	}
}
