//! In-memory connector and data source shared by the integration tests
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use fleet_router::app::{DataSource, DataSourceError, EntityKind, EntityRecord};
use fleet_router::client::{
	ConnectOptions, Connector, Transport, TransportError, TransportHandlers,
};
use fleet_router::routing::Subscriber;
use fleet_router::QoS;

/// Everything the transport was asked to do, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
	Open { client_id: String },
	Subscribe { filter: String, qos: QoS },
	Unsubscribe { filter: String },
	Publish {
		topic: String,
		payload: Bytes,
		qos: QoS,
		retained: bool,
	},
	Disconnect,
}

#[derive(Default)]
struct MockState {
	calls: Mutex<Vec<Call>>,
	handlers: Mutex<Option<TransportHandlers>>,
	fail_next_open: AtomicBool,
	broken: AtomicBool,
}

impl MockState {
	fn record(&self, call: Call) -> Result<(), TransportError> {
		self.calls.lock().unwrap().push(call);
		if self.broken.load(Ordering::SeqCst) {
			return Err(TransportError::network("broken pipe"));
		}
		Ok(())
	}
}

/// Connector whose transports only record calls. Tests drive the raw
/// callbacks through [`MockConnector::handlers`].
#[derive(Clone, Default)]
pub struct MockConnector {
	state: Arc<MockState>,
}

impl MockConnector {
	pub fn calls(&self) -> Vec<Call> {
		self.state.calls.lock().unwrap().clone()
	}

	pub fn count(&self, predicate: impl Fn(&Call) -> bool) -> usize {
		self.calls().iter().filter(|call| predicate(call)).count()
	}

	pub fn subscribed_filters(&self) -> Vec<String> {
		self.calls()
			.into_iter()
			.filter_map(|call| match call {
				| Call::Subscribe { filter, .. } => Some(filter),
				| _ => None,
			})
			.collect()
	}

	/// Handlers passed to the most recent `open`.
	pub fn handlers(&self) -> TransportHandlers {
		self.state
			.handlers
			.lock()
			.unwrap()
			.clone()
			.expect("no transport was opened")
	}

	pub fn fail_next_open(&self) {
		self.state.fail_next_open.store(true, Ordering::SeqCst);
	}

	/// Makes every request on opened transports fail, like a dead socket.
	pub fn break_transport(&self) {
		self.state.broken.store(true, Ordering::SeqCst);
	}
}

impl Connector for MockConnector {
	type Transport = MockTransport;

	async fn open(
		&self,
		options: &ConnectOptions,
		handlers: TransportHandlers,
	) -> Result<MockTransport, TransportError> {
		self.state.calls.lock().unwrap().push(Call::Open {
			client_id: options.client_id.clone(),
		});
		if self.state.fail_next_open.swap(false, Ordering::SeqCst) {
			return Err(TransportError::rejected("not authorized"));
		}
		*self.state.handlers.lock().unwrap() = Some(handlers);
		Ok(MockTransport {
			state: Arc::clone(&self.state),
		})
	}
}

pub struct MockTransport {
	state: Arc<MockState>,
}

impl Transport for MockTransport {
	async fn subscribe(&self, filter: &str, qos: QoS) -> Result<(), TransportError> {
		self.state.record(Call::Subscribe {
			filter: filter.to_string(),
			qos,
		})
	}

	async fn unsubscribe(&self, filter: &str) -> Result<(), TransportError> {
		self.state.record(Call::Unsubscribe {
			filter: filter.to_string(),
		})
	}

	async fn publish(
		&self,
		topic: &str,
		payload: Bytes,
		qos: QoS,
		retained: bool,
	) -> Result<(), TransportError> {
		self.state.record(Call::Publish {
			topic: topic.to_string(),
			payload,
			qos,
			retained,
		})
	}

	async fn disconnect(&self) -> Result<(), TransportError> {
		self.state.calls.lock().unwrap().push(Call::Disconnect);
		Ok(())
	}
}

/// Data source serving fixed records per kind.
#[derive(Default)]
pub struct MockDataSource {
	records: HashMap<EntityKind, Vec<EntityRecord>>,
	failing: Option<EntityKind>,
}

impl MockDataSource {
	pub fn with(mut self, kind: EntityKind, records: Vec<EntityRecord>) -> Self {
		self.records.insert(kind, records);
		self
	}

	pub fn failing(mut self, kind: EntityKind) -> Self {
		self.failing = Some(kind);
		self
	}
}

impl DataSource for MockDataSource {
	async fn fetch(
		&self,
		kind: EntityKind,
	) -> Result<Vec<EntityRecord>, DataSourceError> {
		if self.failing == Some(kind) {
			return Err(DataSourceError::new(kind, "HTTP 500"));
		}
		Ok(self.records.get(&kind).cloned().unwrap_or_default())
	}
}

/// Subscriber that appends every value it sees.
pub fn recorder<T: Clone + Send + 'static>() -> (Arc<Mutex<Vec<T>>>, Subscriber<T>) {
	let seen = Arc::new(Mutex::new(Vec::new()));
	let sink = Arc::clone(&seen);
	let subscriber = Subscriber::from_fn(move |value: &T| {
		sink.lock().unwrap().push(value.clone());
	});
	(seen, subscriber)
}

pub fn options() -> ConnectOptions {
	ConnectOptions::localhost("test-client")
}
