use std::sync::{Mutex, MutexGuard, PoisonError};

use arcstr::ArcStr;
use tracing::{debug, error, warn};

use super::subscriber::Subscriber;
use crate::topic::{
	RegistryResult, TopicPattern, TopicRegistry, TopicRegistryError,
};

/// Reserved key of the channel that receives every broadcast.
pub const ALL_TOPICS: &str = "__ALL__";

/// Anything UI components can observe: the bare observer, the connection
/// client's lifecycle channel, the application router.
///
/// `None` as topic selects the [`ALL_TOPICS`] channel.
pub trait EventSource<T> {
	fn observe(
		&self,
		topic: Option<&str>,
		subscriber: Subscriber<T>,
	) -> RegistryResult<()>;

	fn remove(
		&self,
		topic: Option<&str>,
		subscriber: &Subscriber<T>,
	) -> RegistryResult<()>;

	fn broadcast(&self, data: &T, topic: Option<&str>) -> BroadcastReport;
}

/// Outcome of one broadcast pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BroadcastReport {
	/// Keys whose lists were invoked, ALL excluded.
	pub matched_topics: Vec<ArcStr>,
	/// Subscriber invocations that returned `Ok`.
	pub delivered: usize,
	/// Subscriber invocations that failed or panicked.
	pub failed: usize,
	/// A topic was given and no registered pattern matched it.
	pub no_topics_matched: bool,
}

type Snapshot<T> = Vec<(ArcStr, Vec<Subscriber<T>>)>;

/// Topic-scoped observer registry.
///
/// Broadcasting is synchronous: every matching subscriber runs on the
/// caller's thread before `broadcast` returns. Lists are snapshotted before
/// any callback runs, so a callback may observe or remove (itself included)
/// without disturbing the pass in progress.
#[derive(Debug)]
pub struct TopicObserver<T> {
	registry: Mutex<TopicRegistry<Subscriber<T>>>,
}

impl<T> Default for TopicObserver<T> {
	fn default() -> Self {
		Self::new()
	}
}

impl<T> TopicObserver<T> {
	pub fn new() -> Self {
		Self {
			registry: Mutex::new(Self::seeded_registry()),
		}
	}

	fn seeded_registry() -> TopicRegistry<Subscriber<T>> {
		let mut registry = TopicRegistry::new();
		registry.insert_pattern(TopicPattern::Literal(ArcStr::from(ALL_TOPICS)));
		registry
	}

	fn lock_registry(&self) -> MutexGuard<'_, TopicRegistry<Subscriber<T>>> {
		// Callbacks never run under the lock, a poisoned guard is still sound.
		self.registry.lock().unwrap_or_else(PoisonError::into_inner)
	}

	/// Registers an empty channel for `topic`; fails if it already exists.
	pub fn create(&self, topic: &str) -> RegistryResult<()> {
		self.lock_registry().create(topic)
	}

	pub fn contains(&self, topic: &str) -> bool {
		self.lock_registry().contains(topic)
	}

	pub fn observe(
		&self,
		topic: Option<&str>,
		subscriber: Subscriber<T>,
	) -> RegistryResult<()> {
		let topic = topic.unwrap_or(ALL_TOPICS);
		let fresh = self.lock_registry().push(topic, subscriber)?;
		if fresh {
			debug!(topic = %topic, "Observer channel created");
		}
		Ok(())
	}

	pub fn remove(
		&self,
		topic: Option<&str>,
		subscriber: &Subscriber<T>,
	) -> RegistryResult<()> {
		let topic = topic.unwrap_or(ALL_TOPICS);
		let removed = self.lock_registry().remove(topic, subscriber)?;
		debug!(topic = %topic, removed, "Subscriber removed");
		Ok(())
	}

	/// Number of subscribers across all channels, ALL included.
	pub fn subscriber_count(&self) -> usize {
		let registry = self.lock_registry();
		registry
			.keys()
			.iter()
			.filter_map(|key| registry.subscribers(key))
			.map(<[_]>::len)
			.sum()
	}

	/// Drops every channel and subscriber, then re-creates the ALL channel.
	pub fn reset(&self) {
		let mut registry = self.lock_registry();
		registry.clear();
		registry.insert_pattern(TopicPattern::Literal(ArcStr::from(ALL_TOPICS)));
	}

	/// Delivers `data` to every list whose pattern matches `topic`, then to
	/// the ALL channel.
	///
	/// With `topic` set to `None` (or [`ALL_TOPICS`]) only the ALL channel
	/// runs. An unmatched topic is logged and reported, never an error.
	pub fn broadcast(&self, data: &T, topic: Option<&str>) -> BroadcastReport {
		let mut report = BroadcastReport::default();
		let (targets, all) = self.snapshot(topic, &mut report);

		for (key, subscribers) in &targets {
			for (index, subscriber) in subscribers.iter().enumerate() {
				Self::deliver(key, index, subscriber, data, &mut report);
			}
		}
		let all_key = ArcStr::from(ALL_TOPICS);
		for (index, subscriber) in all.iter().enumerate() {
			Self::deliver(&all_key, index, subscriber, data, &mut report);
		}

		report.matched_topics = targets.into_iter().map(|(key, _)| key).collect();
		report
	}

	fn snapshot(
		&self,
		topic: Option<&str>,
		report: &mut BroadcastReport,
	) -> (Snapshot<T>, Vec<Subscriber<T>>) {
		let registry = self.lock_registry();
		let mut targets = Vec::new();
		if let Some(topic) = topic.filter(|topic| *topic != ALL_TOPICS) {
			match registry.get(topic) {
				| Ok(matches) => {
					targets = matches
						.into_iter()
						.map(|(key, subscribers)| (key, subscribers.to_vec()))
						.collect();
				}
				| Err(TopicRegistryError::UnknownTopic { .. }) => {
					warn!(topic = %topic, "No topics matched");
					report.no_topics_matched = true;
				}
				| Err(err) => {
					warn!(topic = %topic, error = %err, "Topic resolution failed");
					report.no_topics_matched = true;
				}
			}
		}
		let all = registry
			.subscribers(ALL_TOPICS)
			.map(<[_]>::to_vec)
			.unwrap_or_default();
		(targets, all)
	}

	fn deliver(
		key: &ArcStr,
		index: usize,
		subscriber: &Subscriber<T>,
		data: &T,
		report: &mut BroadcastReport,
	) {
		match subscriber.invoke(data) {
			| Ok(()) => report.delivered += 1,
			| Err(err) => {
				report.failed += 1;
				error!(
					topic = %key,
					subscriber_index = index,
					subscriber = subscriber.label().unwrap_or("anonymous"),
					error_type = err.error_type(),
					error = %err,
					"Subscriber failed during broadcast"
				);
			}
		}
	}
}

impl<T> EventSource<T> for TopicObserver<T> {
	fn observe(
		&self,
		topic: Option<&str>,
		subscriber: Subscriber<T>,
	) -> RegistryResult<()> {
		TopicObserver::observe(self, topic, subscriber)
	}

	fn remove(
		&self,
		topic: Option<&str>,
		subscriber: &Subscriber<T>,
	) -> RegistryResult<()> {
		TopicObserver::remove(self, topic, subscriber)
	}

	fn broadcast(&self, data: &T, topic: Option<&str>) -> BroadcastReport {
		TopicObserver::broadcast(self, data, topic)
	}
}
