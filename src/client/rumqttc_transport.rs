use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use arcstr::ArcStr;
use bytes::Bytes;
use rumqttc::Packet::{ConnAck, Disconnect, PubAck, PubRec, Publish};
use rumqttc::{AsyncClient, ConnectReturnCode, ConnectionError, EventLoop};
use rumqttc::{Event::Incoming, Event::Outgoing};
use rumqttc::{MqttOptions, QoS};
use tokio::task::JoinHandle;
use tokio::time;
use tracing::{debug, error, info, warn};

use super::config::{ClientSettings, ConnectOptions};
use super::error::TransportError;
use super::transport::{Connector, Transport, TransportHandlers};

type SharedTracker = Arc<Mutex<DeliveryTracker>>;

/// Pairs publications handed to rumqttc with the PUBLISH packets it writes.
///
/// rumqttc reports a write as `Outgoing::Publish(pkid)` only. Unacknowledged
/// QoS 1/2 packets are written again after a reconnect with the same pkid,
/// those writes are not new deliveries.
#[derive(Debug, Default)]
struct DeliveryTracker {
	// Queued on the client, not yet written. Tagged for cancellation.
	queued: VecDeque<(u64, ArcStr, Bytes)>,
	next_ticket: u64,
	// Written with a packet id, not yet acknowledged
	in_flight: HashSet<u16>,
	// In flight when the connection dropped, rumqttc writes them again
	replays: HashSet<u16>,
}

impl DeliveryTracker {
	fn queue(&mut self, topic: ArcStr, payload: Bytes) -> u64 {
		let ticket = self.next_ticket;
		self.next_ticket += 1;
		self.queued.push_back((ticket, topic, payload));
		ticket
	}

	/// Forgets a publication rumqttc refused to queue.
	fn cancel(&mut self, ticket: u64) {
		self.queued.retain(|(queued, ..)| *queued != ticket);
	}

	/// A PUBLISH packet went out. Returns the publication it delivered, or
	/// `None` for a replay.
	fn written(&mut self, pkid: u16) -> Option<(ArcStr, Bytes)> {
		if pkid != 0 && self.replays.remove(&pkid) {
			debug!(pkid, "Unacknowledged publication written again");
			return None;
		}
		let (_, topic, payload) = self.queued.pop_front()?;
		if pkid != 0 {
			self.in_flight.insert(pkid);
		}
		Some((topic, payload))
	}

	fn acknowledged(&mut self, pkid: u16) {
		self.in_flight.remove(&pkid);
		self.replays.remove(&pkid);
	}

	fn connection_reset(&mut self) {
		self.replays.clone_from(&self.in_flight);
	}
}

fn lock_tracker(tracker: &SharedTracker) -> MutexGuard<'_, DeliveryTracker> {
	tracker.lock().unwrap_or_else(PoisonError::into_inner)
}

/// [`Connector`] backed by a rumqttc event loop running in a tokio task.
#[derive(Debug, Clone, Default)]
pub struct RumqttcConnector {
	settings: ClientSettings,
}

impl RumqttcConnector {
	pub fn new(settings: ClientSettings) -> Self {
		Self { settings }
	}

	fn mqtt_options(
		options: &ConnectOptions,
	) -> Result<MqttOptions, TransportError> {
		let mut mqtt_options = MqttOptions::parse_url(options.to_url())?;
		if let Some(username) = &options.username {
			mqtt_options.set_credentials(
				username.clone(),
				options.password.clone().unwrap_or_default(),
			);
		}
		mqtt_options
			.set_keep_alive(Duration::from_secs(options.keep_alive_secs.max(1)));
		mqtt_options.set_clean_session(options.clean_session);
		Ok(mqtt_options)
	}

	/// Polls until the broker answers the CONNECT packet.
	async fn await_connack(
		event_loop: &mut EventLoop,
	) -> Result<(), TransportError> {
		loop {
			match event_loop.poll().await {
				| Ok(Incoming(ConnAck(ack))) => {
					return if ack.code == ConnectReturnCode::Success {
						Ok(())
					} else {
						Err(TransportError::rejected(format!("{:?}", ack.code)))
					};
				}
				| Ok(notification) => {
					debug!(notification = ?notification, "Notification before ConnAck");
				}
				| Err(ConnectionError::ConnectionRefused(code)) => {
					return Err(TransportError::rejected(format!("{code:?}")));
				}
				| Err(err) => return Err(TransportError::network(err.to_string())),
			}
		}
	}
}

impl Connector for RumqttcConnector {
	type Transport = RumqttcTransport;

	async fn open(
		&self,
		options: &ConnectOptions,
		handlers: TransportHandlers,
	) -> Result<RumqttcTransport, TransportError> {
		let mqtt_options = Self::mqtt_options(options)?;
		let (client, mut event_loop) =
			AsyncClient::new(mqtt_options, self.settings.event_loop_capacity);

		let timeout_millis = options.connect_timeout_millis;
		time::timeout(
			Duration::from_millis(timeout_millis),
			Self::await_connack(&mut event_loop),
		)
		.await
		.map_err(|_| TransportError::Timeout { timeout_millis })??;

		let tracker = SharedTracker::default();
		let uri = ArcStr::from(options.uri());
		let settings = self.settings.clone();
		let loop_tracker = Arc::clone(&tracker);
		let event_loop_handle = tokio::spawn(async move {
			run(event_loop, handlers, loop_tracker, uri, settings).await;
		});

		Ok(RumqttcTransport {
			client,
			tracker,
			publish_order: tokio::sync::Mutex::new(()),
			event_loop_handle: Mutex::new(Some(event_loop_handle)),
		})
	}
}

/// Open rumqttc connection.
#[derive(Debug)]
pub struct RumqttcTransport {
	client: AsyncClient,
	tracker: SharedTracker,
	// Keeps tracker order equal to the order requests reach rumqttc
	publish_order: tokio::sync::Mutex<()>,
	event_loop_handle: Mutex<Option<JoinHandle<()>>>,
}

impl RumqttcTransport {
	fn take_handle(&self) -> Option<JoinHandle<()>> {
		self.event_loop_handle
			.lock()
			.unwrap_or_else(PoisonError::into_inner)
			.take()
	}
}

impl Transport for RumqttcTransport {
	async fn subscribe(
		&self,
		filter: &str,
		qos: QoS,
	) -> Result<(), TransportError> {
		self.client.subscribe(filter, qos).await?;
		Ok(())
	}

	async fn unsubscribe(&self, filter: &str) -> Result<(), TransportError> {
		self.client.unsubscribe(filter).await?;
		Ok(())
	}

	async fn publish(
		&self,
		topic: &str,
		payload: Bytes,
		qos: QoS,
		retained: bool,
	) -> Result<(), TransportError> {
		let _order = self.publish_order.lock().await;
		let ticket =
			lock_tracker(&self.tracker).queue(ArcStr::from(topic), payload.clone());
		if let Err(err) =
			self.client.publish(topic, qos, retained, payload.to_vec()).await
		{
			lock_tracker(&self.tracker).cancel(ticket);
			return Err(err.into());
		}
		Ok(())
	}

	/// Sends DISCONNECT and waits for the event loop to wind down.
	async fn disconnect(&self) -> Result<(), TransportError> {
		let result = self.client.disconnect().await;
		if let Err(err) = &result {
			warn!(error = %err, "Failed to send MQTT Disconnect");
		}
		if let Some(handle) = self.take_handle() {
			if result.is_err() {
				handle.abort();
			} else if let Err(err) = handle.await {
				warn!(error = %err, "Event loop task failed");
			}
		}
		result.map_err(Into::into)
	}
}

impl Drop for RumqttcTransport {
	fn drop(&mut self) {
		if let Some(handle) = self.take_handle() {
			handle.abort();
		}
	}
}

fn error_code(err: &ConnectionError) -> i32 {
	match err {
		| ConnectionError::Io(_) => 1,
		| ConnectionError::ConnectionRefused(_) => 2,
		| ConnectionError::NetworkTimeout => 3,
		| ConnectionError::MqttState(_) => 4,
		| _ => -1,
	}
}

/// Event loop of one transport. Ends on DISCONNECT in either direction or
/// after too many consecutive errors.
async fn run(
	mut event_loop: EventLoop,
	handlers: TransportHandlers,
	tracker: SharedTracker,
	uri: ArcStr,
	settings: ClientSettings,
) {
	let mut error_count: u32 = 0;
	let initial_delay = Duration::from_millis(settings.initial_retry_delay_millis);
	let max_delay = Duration::from_millis(settings.max_retry_delay_millis);

	loop {
		match event_loop.poll().await {
			| Ok(Incoming(ConnAck(ack))) => {
				let outage = error_count > 0;
				error_count = 0;
				if ack.code == ConnectReturnCode::Success {
					if outage {
						info!(uri = %uri, "Reconnected to MQTT broker");
					}
					handlers.connected(true, uri.clone());
				} else {
					warn!(code = ?ack.code, "Broker refused reconnection");
				}
			}
			| Ok(Incoming(Publish(p))) => {
				error_count = 0;
				handlers.message_arrived(p.topic, p.payload);
			}
			| Ok(Outgoing(rumqttc::Outgoing::Publish(pkid))) => {
				let delivered = lock_tracker(&tracker).written(pkid);
				if let Some((topic, payload)) = delivered {
					handlers.message_delivered(topic, payload);
				}
			}
			| Ok(Incoming(PubAck(ack))) => {
				error_count = 0;
				lock_tracker(&tracker).acknowledged(ack.pkid);
			}
			| Ok(Incoming(PubRec(rec))) => {
				// QoS 2 publications are not written again once received
				error_count = 0;
				lock_tracker(&tracker).acknowledged(rec.pkid);
			}
			| Ok(Incoming(Disconnect)) => {
				info!("Received MQTT Disconnect packet from server");
				handlers.connection_lost(0, "Disconnected by broker");
				break;
			}
			| Ok(Outgoing(rumqttc::Outgoing::Disconnect)) => {
				info!("Sent MQTT Disconnect packet to server");
				break;
			}
			| Ok(notification) => {
				error_count = 0;
				debug!(notification = ?notification, "Received MQTT notification");
			}
			| Err(err) => {
				// rumqttc requeues unacknowledged publications on error
				lock_tracker(&tracker).connection_reset();
				error_count += 1;
				error!(error_count, error = %err, "MQTT event loop error");
				if error_count == 1 {
					handlers.connection_lost(error_code(&err), err.to_string());
				}

				if error_count >= settings.max_consecutive_errors {
					error!(
						error_count,
						max_errors = settings.max_consecutive_errors,
						"Too many consecutive errors, terminating event loop"
					);
					break;
				}

				let delay = initial_delay * 2_u32.pow((error_count - 1).min(10));
				let delay = delay.min(max_delay);
				warn!(delay = ?delay, error_count, "Retrying MQTT connection");
				time::sleep(delay).await;
			}
		}
	}
	info!("MQTT event loop terminated");
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_mqtt_options_from_connect_options() {
		let options = ConnectOptions::new("dispatch-1", "broker.local", 8883)
			.with_credentials("admin", "secret");
		let mqtt_options = RumqttcConnector::mqtt_options(&options).unwrap();
		assert_eq!(
			mqtt_options.broker_address(),
			("broker.local".to_string(), 8883)
		);
		assert_eq!(mqtt_options.client_id(), "dispatch-1");
		assert_eq!(
			mqtt_options.credentials(),
			Some(("admin".to_string(), "secret".to_string()))
		);
		assert!(mqtt_options.clean_session());
	}

	#[test]
	fn test_keep_alive_has_one_second_floor() {
		let mut options = ConnectOptions::localhost("dispatch-1");
		options.keep_alive_secs = 0;
		let mqtt_options = RumqttcConnector::mqtt_options(&options).unwrap();
		assert_eq!(mqtt_options.keep_alive(), Duration::from_secs(1));
	}

	#[test]
	fn test_error_codes() {
		assert_eq!(error_code(&ConnectionError::NetworkTimeout), 3);
		assert_eq!(error_code(&ConnectionError::RequestsDone), -1);
	}

	fn topic_of(delivered: Option<(ArcStr, Bytes)>) -> Option<String> {
		delivered.map(|(topic, _)| topic.to_string())
	}

	#[test]
	fn test_replayed_publish_is_not_a_new_delivery() {
		let mut tracker = DeliveryTracker::default();
		tracker.queue(ArcStr::from("a"), Bytes::from_static(b"1"));
		assert_eq!(topic_of(tracker.written(1)), Some("a".to_string()));

		tracker.queue(ArcStr::from("b"), Bytes::from_static(b"2"));
		tracker.queue(ArcStr::from("c"), Bytes::from_static(b"3"));
		tracker.connection_reset();

		// `a` is written again after the reconnect, then `b` and `c`
		assert_eq!(topic_of(tracker.written(1)), None);
		assert_eq!(topic_of(tracker.written(2)), Some("b".to_string()));
		assert_eq!(topic_of(tracker.written(3)), Some("c".to_string()));
		assert!(tracker.queued.is_empty());
	}

	#[test]
	fn test_acknowledged_publish_is_not_replayed() {
		let mut tracker = DeliveryTracker::default();
		tracker.queue(ArcStr::from("a"), Bytes::new());
		tracker.written(1);
		tracker.acknowledged(1);
		tracker.connection_reset();

		// Packet id reused for a fresh publication
		tracker.queue(ArcStr::from("b"), Bytes::new());
		assert_eq!(topic_of(tracker.written(1)), Some("b".to_string()));
	}

	#[test]
	fn test_qos0_publishes_are_delivered_in_order() {
		let mut tracker = DeliveryTracker::default();
		tracker.queue(ArcStr::from("a"), Bytes::new());
		tracker.queue(ArcStr::from("b"), Bytes::new());
		assert_eq!(topic_of(tracker.written(0)), Some("a".to_string()));
		tracker.connection_reset();
		assert!(tracker.replays.is_empty());
		assert_eq!(topic_of(tracker.written(0)), Some("b".to_string()));
		assert_eq!(topic_of(tracker.written(0)), None);
	}

	#[test]
	fn test_cancel_removes_only_its_own_publication() {
		let mut tracker = DeliveryTracker::default();
		let first = tracker.queue(ArcStr::from("a"), Bytes::new());
		tracker.queue(ArcStr::from("b"), Bytes::new());
		tracker.cancel(first);
		assert_eq!(topic_of(tracker.written(0)), Some("b".to_string()));
	}
}
