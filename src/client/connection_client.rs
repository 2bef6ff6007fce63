use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use arcstr::ArcStr;
use bytes::Bytes;
use rumqttc::QoS;
use serde_json::Value;
use tracing::{debug, error, info, warn};

use super::config::{ConnectOptions, SubscriptionConfig};
use super::error::ConnectionClientError;
use super::event::{ConnectionEvent, EventKind};
use super::transport::{Connector, Transport, TransportHandlers};
use crate::message_serializer::{JsonSerializer, MessageSerializer, Payload};
use crate::routing::{BroadcastReport, EventSource, Subscriber, TopicObserver};
use crate::topic::{RegistryResult, TopicPattern, validation};

/// Lifecycle of a [`ConnectionClient`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
	#[default]
	Disconnected,
	Connecting,
	Connected,
}

/// Success/failure hooks for callers that still pass callbacks along with
/// their options.
#[derive(Default)]
pub struct ConnectCallbacks {
	pub on_success: Option<Box<dyn FnOnce() + Send>>,
	pub on_failure: Option<Box<dyn FnOnce(&ConnectionClientError) + Send>>,
}

/// State shared between the client and the handlers of its transport.
#[derive(Debug)]
pub(crate) struct ClientShared {
	events: TopicObserver<ConnectionEvent>,
	state: Mutex<ConnectionState>,
	session: AtomicU64,
	serializer: JsonSerializer,
}

impl ClientShared {
	fn new() -> Self {
		let events = TopicObserver::new();
		for kind in EventKind::ALL {
			if let Err(err) = events.create(kind.topic()) {
				error!(event = kind.topic(), error = %err, "Failed to create event channel");
			}
		}
		Self {
			events,
			state: Mutex::new(ConnectionState::Disconnected),
			session: AtomicU64::new(0),
			serializer: JsonSerializer,
		}
	}

	fn lock_state(&self) -> MutexGuard<'_, ConnectionState> {
		self.state.lock().unwrap_or_else(PoisonError::into_inner)
	}

	fn is_current(&self, session: u64) -> bool {
		let current = self.session.load(Ordering::SeqCst);
		if current != session {
			debug!(session, current, "Dropping callback from a stale transport");
		}
		current == session
	}

	fn emit(&self, event: ConnectionEvent) -> BroadcastReport {
		self.events.broadcast(&event, Some(event.kind().topic()))
	}

	pub(crate) fn handle_connected(
		&self,
		session: u64,
		reconnect: bool,
		uri: ArcStr,
	) {
		if !self.is_current(session) {
			return;
		}
		{
			let mut state = self.lock_state();
			let expected = if reconnect {
				ConnectionState::Disconnected
			} else {
				ConnectionState::Connecting
			};
			if *state != expected {
				debug!(state = ?*state, reconnect, "Ignoring connected callback");
				return;
			}
			*state = ConnectionState::Connected;
		}
		info!(uri = %uri, reconnect, "Connected to broker");
		self.emit(ConnectionEvent::Connected { reconnect, uri });
	}

	pub(crate) fn handle_connection_lost(
		&self,
		session: u64,
		error_code: i32,
		error_message: String,
	) {
		if !self.is_current(session) {
			return;
		}
		{
			let mut state = self.lock_state();
			if *state != ConnectionState::Connected {
				debug!(state = ?*state, "Connection lost while not connected");
				return;
			}
			*state = ConnectionState::Disconnected;
		}
		warn!(error_code, error_message = %error_message, "Connection to broker lost");
		self.emit(ConnectionEvent::ConnectionLost {
			error_code,
			error_message,
		});
	}

	pub(crate) fn handle_message_arrived(
		&self,
		session: u64,
		topic: ArcStr,
		raw_payload: Bytes,
	) {
		if !self.is_current(session) {
			return;
		}
		debug!(topic = %topic, payload_size = raw_payload.len(), "Message arrived");
		let decoded =
			MessageSerializer::<Value>::deserialize(&self.serializer, &raw_payload);
		let payload = match decoded {
			| Ok(value) => Payload::Json(value),
			| Err(err) => {
				warn!(
					topic = %topic,
					payload_size = raw_payload.len(),
					error = %err,
					"Payload is not JSON, forwarding raw text"
				);
				Payload::raw_lossy(&raw_payload)
			}
		};
		self.emit(ConnectionEvent::MessageArrived {
			topic,
			raw_payload,
			payload,
		});
	}

	pub(crate) fn handle_message_delivered(
		&self,
		session: u64,
		topic: ArcStr,
		raw_payload: Bytes,
	) {
		if !self.is_current(session) {
			return;
		}
		debug!(topic = %topic, "Message delivered");
		self.emit(ConnectionEvent::MessageDelivered { topic, raw_payload });
	}
}

/// Persistent broker connection exposed as an event source.
///
/// Events are broadcast on the topic of their [`EventKind`]; observing
/// `None` receives all four kinds. Subscribe, unsubscribe and publish pass
/// straight through to the transport and quietly do nothing while there is
/// none, so components tearing down after a disconnect stay harmless.
pub struct ConnectionClient<C: Connector> {
	connector: C,
	shared: Arc<ClientShared>,
	transport: Mutex<Option<Arc<C::Transport>>>,
}

impl<C: Connector> ConnectionClient<C> {
	pub fn new(connector: C) -> Self {
		Self {
			connector,
			shared: Arc::new(ClientShared::new()),
			transport: Mutex::new(None),
		}
	}

	fn lock_transport(&self) -> MutexGuard<'_, Option<Arc<C::Transport>>> {
		self.transport.lock().unwrap_or_else(PoisonError::into_inner)
	}

	/// Transport of a connected session. A transport left behind by a lost
	/// connection is not handed out.
	fn connected_transport(&self) -> Option<Arc<C::Transport>> {
		if self.state() != ConnectionState::Connected {
			return None;
		}
		self.lock_transport().clone()
	}

	pub fn state(&self) -> ConnectionState {
		*self.shared.lock_state()
	}

	pub fn is_connected(&self) -> bool {
		self.state() == ConnectionState::Connected
	}

	/// Lifecycle event channel.
	pub fn events(&self) -> &TopicObserver<ConnectionEvent> {
		&self.shared.events
	}

	/// Opens a transport and waits for the broker's answer.
	///
	/// Does nothing while already connected. A transport left behind by a
	/// lost connection is closed first.
	pub async fn connect(
		&self,
		options: &ConnectOptions,
	) -> Result<(), ConnectionClientError> {
		let session = {
			let mut state = self.shared.lock_state();
			match *state {
				| ConnectionState::Connected => {
					debug!("Already connected, connect is a no-op");
					return Ok(());
				}
				| ConnectionState::Connecting => {
					return Err(ConnectionClientError::ConnectInProgress);
				}
				| ConnectionState::Disconnected => {
					*state = ConnectionState::Connecting;
				}
			}
			self.shared.session.fetch_add(1, Ordering::SeqCst) + 1
		};

		let stale = self.lock_transport().take();
		if let Some(stale) = stale {
			info!("Closing transport left over from a lost connection");
			if let Err(err) = stale.disconnect().await {
				warn!(error = %err, "Failed to close stale transport");
			}
		}

		info!(uri = %options.uri(), client_id = %options.client_id, "Connecting to broker");
		let handlers = TransportHandlers::new(Arc::downgrade(&self.shared), session);
		match self.connector.open(options, handlers).await {
			| Ok(transport) => {
				*self.lock_transport() = Some(Arc::new(transport));
				self.shared
					.handle_connected(session, false, ArcStr::from(options.uri()));
				Ok(())
			}
			| Err(err) => {
				*self.shared.lock_state() = ConnectionState::Disconnected;
				error!(uri = %options.uri(), error = %err, "Failed to connect to broker");
				Err(err.into())
			}
		}
	}

	/// [`connect`](Self::connect), also reporting the outcome to `callbacks`.
	pub async fn connect_with_callbacks(
		&self,
		options: &ConnectOptions,
		callbacks: ConnectCallbacks,
	) -> Result<(), ConnectionClientError> {
		let result = self.connect(options).await;
		match &result {
			| Ok(()) => {
				if let Some(on_success) = callbacks.on_success {
					on_success();
				}
			}
			| Err(err) => {
				if let Some(on_failure) = callbacks.on_failure {
					on_failure(err);
				}
			}
		}
		result
	}

	/// Closes the transport. Does nothing when there is none.
	pub async fn disconnect(&self) -> Result<(), ConnectionClientError> {
		let Some(transport) = self.lock_transport().take() else {
			debug!("No transport, disconnect is a no-op");
			return Ok(());
		};
		{
			let mut state = self.shared.lock_state();
			self.shared.session.fetch_add(1, Ordering::SeqCst);
			*state = ConnectionState::Disconnected;
		}
		info!("Disconnecting from broker");
		transport.disconnect().await.map_err(|err| {
			warn!(error = %err, "Transport disconnect failed");
			err.into()
		})
	}

	pub async fn subscribe(
		&self,
		filter: &str,
		config: SubscriptionConfig,
	) -> Result<(), ConnectionClientError> {
		TopicPattern::compile(filter)?;
		let Some(transport) = self.connected_transport() else {
			warn!(
				filter = %filter,
				state = ?self.state(),
				"Not connected, subscribe skipped"
			);
			return Ok(());
		};
		debug!(filter = %filter, qos = ?config.qos, "Subscribing");
		transport.subscribe(filter, config.qos).await?;
		Ok(())
	}

	pub async fn unsubscribe(
		&self,
		filter: &str,
	) -> Result<(), ConnectionClientError> {
		TopicPattern::compile(filter)?;
		let Some(transport) = self.connected_transport() else {
			warn!(
				filter = %filter,
				state = ?self.state(),
				"Not connected, unsubscribe skipped"
			);
			return Ok(());
		};
		debug!(filter = %filter, "Unsubscribing");
		transport.unsubscribe(filter).await?;
		Ok(())
	}

	pub async fn publish(
		&self,
		topic: &str,
		payload: impl Into<Bytes>,
		qos: QoS,
		retained: bool,
	) -> Result<(), ConnectionClientError> {
		validation::validate_publish_topic(topic)?;
		let Some(transport) = self.connected_transport() else {
			warn!(
				topic = %topic,
				state = ?self.state(),
				"Not connected, message dropped"
			);
			return Ok(());
		};
		transport.publish(topic, payload.into(), qos, retained).await?;
		Ok(())
	}
}

impl<C: Connector> EventSource<ConnectionEvent> for ConnectionClient<C> {
	fn observe(
		&self,
		topic: Option<&str>,
		subscriber: Subscriber<ConnectionEvent>,
	) -> RegistryResult<()> {
		self.shared.events.observe(topic, subscriber)
	}

	fn remove(
		&self,
		topic: Option<&str>,
		subscriber: &Subscriber<ConnectionEvent>,
	) -> RegistryResult<()> {
		self.shared.events.remove(topic, subscriber)
	}

	fn broadcast(
		&self,
		data: &ConnectionEvent,
		topic: Option<&str>,
	) -> BroadcastReport {
		self.shared.events.broadcast(data, topic)
	}
}

impl<C: Connector> Drop for ConnectionClient<C> {
	fn drop(&mut self) {
		if self.lock_transport().is_some() {
			warn!(
				"ConnectionClient dropped while connected. Call disconnect() \
				 and await it before dropping."
			);
		}
	}
}
