use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use arcstr::ArcStr;
use futures::future::try_join_all;
use rumqttc::QoS;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, error, info, warn};

use super::data_source::{DataSource, EntityRecord};
use super::entity::{EntityId, EntityKind, entity_topics, parse_data_topic};
use super::error::{RouterError, RouterResult};
use crate::client::{
	ConnectOptions, ConnectionClient, ConnectionEvent, Connector,
	SubscriptionConfig,
};
use crate::routing::{
	BroadcastReport, EventSource, Subscriber, SubscriberError, TopicObserver,
};
use crate::topic::{RegistryResult, TopicPattern};

/// What UI components receive: the broker topic and its decoded payload.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityUpdate {
	pub topic: ArcStr,
	pub payload: Value,
}

#[derive(Debug, Default)]
struct RouterState {
	entities: HashMap<(EntityKind, EntityId), Value>,
	// Broker filters currently subscribed, in subscription order
	filters: Vec<String>,
}

#[derive(Debug, Default)]
struct RouterInner {
	updates: TopicObserver<EntityUpdate>,
	state: Mutex<RouterState>,
}

impl RouterInner {
	fn lock_state(&self) -> MutexGuard<'_, RouterState> {
		self.state.lock().unwrap_or_else(PoisonError::into_inner)
	}

	fn message_arrived(&self, topic: &ArcStr, payload: Value) -> BroadcastReport {
		if let Some(key) = parse_data_topic(topic) {
			self.lock_state().entities.insert(key, payload.clone());
		}
		let update = EntityUpdate {
			topic: topic.clone(),
			payload,
		};
		self.updates.broadcast(&update, Some(topic.as_str()))
	}

	fn tracked_filters(&self) -> Vec<String> {
		self.lock_state().filters.clone()
	}
}

/// Application-level router between the backend, the broker connection and
/// the UI.
///
/// Entities are discovered through a [`DataSource`]; every discovered
/// entity gets its broker topics subscribed. Arriving messages update an
/// entity cache and are re-broadcast as [`EntityUpdate`]s on their own topic,
/// so components observe `ambulance/+/data` or `hospital/7/data` directly.
///
/// Created once per session with [`new`](Self::new), started once with
/// [`start`](Self::start) and torn down with [`shutdown`](Self::shutdown).
pub struct ApplicationRouter<C: Connector, D: DataSource> {
	client: Arc<ConnectionClient<C>>,
	data_source: D,
	inner: Arc<RouterInner>,
	forwarder: Subscriber<ConnectionEvent>,
	subscription: SubscriptionConfig,
	started: AtomicBool,
}

impl<C: Connector, D: DataSource> ApplicationRouter<C, D> {
	/// Attaches a router to `client`'s event channel.
	pub fn new(
		client: Arc<ConnectionClient<C>>,
		data_source: D,
	) -> RouterResult<Self> {
		Self::with_subscription_config(
			client,
			data_source,
			SubscriptionConfig::default(),
		)
	}

	pub fn with_subscription_config(
		client: Arc<ConnectionClient<C>>,
		data_source: D,
		subscription: SubscriptionConfig,
	) -> RouterResult<Self> {
		let inner = Arc::new(RouterInner::default());
		let forwarder = Self::forwarder(
			Arc::downgrade(&inner),
			Arc::downgrade(&client),
			subscription,
		);
		client.events().observe(None, forwarder.clone())?;
		Ok(Self {
			client,
			data_source,
			inner,
			forwarder,
			subscription,
			started: AtomicBool::new(false),
		})
	}

	fn forwarder(
		inner: Weak<RouterInner>,
		client: Weak<ConnectionClient<C>>,
		subscription: SubscriptionConfig,
	) -> Subscriber<ConnectionEvent> {
		Subscriber::from_fn(move |event: &ConnectionEvent| match event {
			| ConnectionEvent::MessageArrived { topic, payload, .. } => {
				if let Some(inner) = inner.upgrade() {
					inner.message_arrived(topic, payload.to_value());
				}
			}
			| ConnectionEvent::Connected {
				reconnect: true, ..
			} => {
				if let Some(inner) = inner.upgrade() {
					Self::resubscribe_all(
						inner.tracked_filters(),
						client.clone(),
						subscription,
					);
				}
			}
			| _ => {}
		})
		.with_label("application_router")
	}

	/// Re-issues every tracked subscription after the broker came back.
	fn resubscribe_all(
		filters: Vec<String>,
		client: Weak<ConnectionClient<C>>,
		subscription: SubscriptionConfig,
	) {
		if filters.is_empty() {
			return;
		}
		let runtime = match tokio::runtime::Handle::try_current() {
			| Ok(runtime) => runtime,
			| Err(err) => {
				error!(error = %err, "No runtime to resubscribe on");
				return;
			}
		};
		info!(count = filters.len(), "Resubscribing after reconnect");
		runtime.spawn(async move {
			let Some(client) = client.upgrade() else {
				return;
			};
			for filter in &filters {
				if let Err(err) = client.subscribe(filter, subscription).await {
					error!(filter = %filter, error = %err, "Resubscribe failed");
				}
			}
		});
	}

	pub fn client(&self) -> &Arc<ConnectionClient<C>> {
		&self.client
	}

	pub fn is_started(&self) -> bool {
		self.started.load(Ordering::SeqCst)
	}

	/// Connects and retrieves every entity kind concurrently.
	pub async fn start(&self, options: &ConnectOptions) -> RouterResult<()> {
		if self.started.swap(true, Ordering::SeqCst) {
			return Err(RouterError::AlreadyStarted);
		}
		if let Err(err) = self.client.connect(options).await {
			self.started.store(false, Ordering::SeqCst);
			return Err(err.into());
		}
		let retrieved =
			match try_join_all(EntityKind::ALL.map(|kind| self.retrieve(kind))).await {
				| Ok(retrieved) => retrieved,
				| Err(err) => {
					// Connection stays up, a later start retries discovery
					self.started.store(false, Ordering::SeqCst);
					return Err(err);
				}
			};
		info!(
			entities = retrieved.iter().map(Vec::len).sum::<usize>(),
			"Application router started"
		);
		Ok(())
	}

	/// Fetches the entities of `kind`, caches them and subscribes their
	/// topics.
	pub async fn retrieve(
		&self,
		kind: EntityKind,
	) -> RouterResult<Vec<EntityRecord>> {
		if !self.is_started() {
			return Err(RouterError::NotStarted);
		}
		let records = self.data_source.fetch(kind).await?;
		debug!(kind = %kind, count = records.len(), "Entities retrieved");
		{
			let mut state = self.inner.lock_state();
			for record in &records {
				state.entities.insert((kind, record.id), record.data.clone());
			}
		}
		for record in &records {
			self.subscribe_entity(kind, record.id).await?;
		}
		Ok(records)
	}

	pub async fn subscribe_entity(
		&self,
		kind: EntityKind,
		id: EntityId,
	) -> RouterResult<()> {
		for filter in entity_topics(kind, id) {
			self.subscribe(&filter).await?;
		}
		Ok(())
	}

	/// Unsubscribes the entity's topics and drops it from the cache.
	pub async fn unsubscribe_entity(
		&self,
		kind: EntityKind,
		id: EntityId,
	) -> RouterResult<()> {
		for filter in entity_topics(kind, id) {
			self.unsubscribe(&filter).await?;
		}
		self.inner.lock_state().entities.remove(&(kind, id));
		Ok(())
	}

	/// Subscribes `filter` on the broker and tracks it for reconnects.
	/// Already tracked filters are not subscribed twice.
	pub async fn subscribe(&self, filter: &str) -> RouterResult<()> {
		TopicPattern::compile(filter)?;
		if self.inner.lock_state().filters.iter().any(|f| f == filter) {
			debug!(filter = %filter, "Filter already subscribed");
			return Ok(());
		}
		self.client.subscribe(filter, self.subscription).await?;
		let mut state = self.inner.lock_state();
		if !state.filters.iter().any(|f| f == filter) {
			state.filters.push(filter.to_string());
		}
		Ok(())
	}

	pub async fn unsubscribe(&self, filter: &str) -> RouterResult<()> {
		TopicPattern::compile(filter)?;
		self.inner.lock_state().filters.retain(|f| f != filter);
		self.client.unsubscribe(filter).await?;
		Ok(())
	}

	pub fn tracked_filters(&self) -> Vec<String> {
		self.inner.tracked_filters()
	}

	/// Last known data of an entity.
	pub fn entity(&self, kind: EntityKind, id: EntityId) -> Option<Value> {
		self.inner.lock_state().entities.get(&(kind, id)).cloned()
	}

	/// Cached entities of `kind`, ordered by id.
	pub fn entities(&self, kind: EntityKind) -> Vec<(EntityId, Value)> {
		let state = self.inner.lock_state();
		let mut entities: Vec<_> = state
			.entities
			.iter()
			.filter(|((k, _), _)| *k == kind)
			.map(|((_, id), data)| (*id, data.clone()))
			.collect();
		entities.sort_by_key(|(id, _)| *id);
		entities
	}

	pub fn observe(
		&self,
		topic: Option<&str>,
		subscriber: Subscriber<EntityUpdate>,
	) -> RegistryResult<()> {
		self.inner.updates.observe(topic, subscriber)
	}

	/// Observes `topic` with a callback receiving the payload deserialized
	/// into `T`. Payloads that do not fit `T` count as subscriber failures.
	///
	/// Returns the registered handle, for [`remove`](Self::remove).
	pub fn observe_typed<T, F>(
		&self,
		topic: Option<&str>,
		callback: F,
	) -> RegistryResult<Subscriber<EntityUpdate>>
	where
		T: DeserializeOwned + 'static,
		F: Fn(&str, T) + Send + Sync + 'static,
	{
		let subscriber = Subscriber::new(move |update: &EntityUpdate| {
			let data = serde_json::from_value::<T>(update.payload.clone())
				.map_err(SubscriberError::failed)?;
			callback(&update.topic, data);
			Ok(())
		});
		self.observe(topic, subscriber.clone())?;
		Ok(subscriber)
	}

	pub fn remove(
		&self,
		topic: Option<&str>,
		subscriber: &Subscriber<EntityUpdate>,
	) -> RegistryResult<()> {
		self.inner.updates.remove(topic, subscriber)
	}

	/// Local broadcast to UI components; nothing reaches the broker.
	pub fn broadcast(
		&self,
		update: &EntityUpdate,
		topic: Option<&str>,
	) -> BroadcastReport {
		self.inner.updates.broadcast(update, topic)
	}

	/// Publishes `data` as JSON on the broker.
	pub async fn publish<T: Serialize + ?Sized>(
		&self,
		topic: &str,
		data: &T,
		qos: QoS,
		retained: bool,
	) -> RouterResult<()> {
		let payload = serde_json::to_vec(data)?;
		self.client.publish(topic, payload, qos, retained).await?;
		Ok(())
	}

	/// Unsubscribes every tracked filter, drops cached entities and UI
	/// observers, then disconnects.
	pub async fn shutdown(self) -> RouterResult<()> {
		let filters = std::mem::take(&mut self.inner.lock_state().filters);
		for filter in &filters {
			if let Err(err) = self.client.unsubscribe(filter).await {
				warn!(filter = %filter, error = %err, "Failed to unsubscribe");
			}
		}
		self.inner.lock_state().entities.clear();
		self.inner.updates.reset();
		self.started.store(false, Ordering::SeqCst);
		info!(unsubscribed = filters.len(), "Application router shut down");
		self.client.disconnect().await?;
		Ok(())
	}
}

impl<C: Connector, D: DataSource> EventSource<EntityUpdate>
	for ApplicationRouter<C, D>
{
	fn observe(
		&self,
		topic: Option<&str>,
		subscriber: Subscriber<EntityUpdate>,
	) -> RegistryResult<()> {
		ApplicationRouter::observe(self, topic, subscriber)
	}

	fn remove(
		&self,
		topic: Option<&str>,
		subscriber: &Subscriber<EntityUpdate>,
	) -> RegistryResult<()> {
		ApplicationRouter::remove(self, topic, subscriber)
	}

	fn broadcast(
		&self,
		data: &EntityUpdate,
		topic: Option<&str>,
	) -> BroadcastReport {
		ApplicationRouter::broadcast(self, data, topic)
	}
}

impl<C: Connector, D: DataSource> Drop for ApplicationRouter<C, D> {
	fn drop(&mut self) {
		if let Err(err) = self.client.events().remove(None, &self.forwarder) {
			warn!(error = %err, "Failed to detach router from client events");
		}
		if self.is_started() {
			warn!(
				"ApplicationRouter dropped while started. Call shutdown() and \
				 await it before dropping."
			);
		}
	}
}
