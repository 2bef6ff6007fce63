//! Seam between the connection client and a concrete broker transport
//!
//! A [`Connector`] opens one transport per `connect`. While it runs, the
//! transport reports what happens on the wire through the
//! [`TransportHandlers`] it was opened with.

use std::future::Future;
use std::sync::Weak;

use arcstr::ArcStr;
use bytes::Bytes;
use rumqttc::QoS;

use super::config::ConnectOptions;
use super::connection_client::ClientShared;
use super::error::TransportError;

/// Opens transports.
pub trait Connector: Send + Sync + 'static {
	type Transport: Transport;

	/// Establishes the connection. Resolving `Ok` is the transport's
	/// success callback, `Err` its failure callback.
	fn open(
		&self,
		options: &ConnectOptions,
		handlers: TransportHandlers,
	) -> impl Future<Output = Result<Self::Transport, TransportError>> + Send;
}

/// An open broker connection.
pub trait Transport: Send + Sync + 'static {
	fn subscribe(
		&self,
		filter: &str,
		qos: QoS,
	) -> impl Future<Output = Result<(), TransportError>> + Send;

	fn unsubscribe(
		&self,
		filter: &str,
	) -> impl Future<Output = Result<(), TransportError>> + Send;

	fn publish(
		&self,
		topic: &str,
		payload: Bytes,
		qos: QoS,
		retained: bool,
	) -> impl Future<Output = Result<(), TransportError>> + Send;

	fn disconnect(&self) -> impl Future<Output = Result<(), TransportError>> + Send;
}

/// Raw callbacks a transport fires after it has been opened.
///
/// Bound to the session that opened the transport; once the client
/// disconnects or reconnects, calls through an old handle are dropped.
#[derive(Clone, Debug)]
pub struct TransportHandlers {
	shared: Weak<ClientShared>,
	session: u64,
}

impl TransportHandlers {
	pub(crate) fn new(shared: Weak<ClientShared>, session: u64) -> Self {
		Self { shared, session }
	}

	/// Broker acknowledged a connection after the initial one.
	pub fn connected(&self, reconnect: bool, uri: impl Into<ArcStr>) {
		if let Some(shared) = self.shared.upgrade() {
			shared.handle_connected(self.session, reconnect, uri.into());
		}
	}

	pub fn connection_lost(&self, error_code: i32, error_message: impl Into<String>) {
		if let Some(shared) = self.shared.upgrade() {
			shared.handle_connection_lost(
				self.session,
				error_code,
				error_message.into(),
			);
		}
	}

	pub fn message_arrived(&self, topic: impl Into<ArcStr>, payload: Bytes) {
		if let Some(shared) = self.shared.upgrade() {
			shared.handle_message_arrived(self.session, topic.into(), payload);
		}
	}

	pub fn message_delivered(&self, topic: impl Into<ArcStr>, payload: Bytes) {
		if let Some(shared) = self.shared.upgrade() {
			shared.handle_message_delivered(self.session, topic.into(), payload);
		}
	}
}
