use arcstr::ArcStr;
use bytes::Bytes;

use crate::message_serializer::Payload;

/// Kinds of connection events. Each kind is also the topic the event is
/// broadcast on, so observers can pick a single kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
	Connected,
	ConnectionLost,
	MessageArrived,
	MessageDelivered,
}

impl EventKind {
	pub const ALL: [EventKind; 4] = [
		EventKind::Connected,
		EventKind::ConnectionLost,
		EventKind::MessageArrived,
		EventKind::MessageDelivered,
	];

	pub fn topic(self) -> &'static str {
		match self {
			| EventKind::Connected => "connected",
			| EventKind::ConnectionLost => "connectionLost",
			| EventKind::MessageArrived => "messageArrived",
			| EventKind::MessageDelivered => "messageDelivered",
		}
	}
}

/// Broker callbacks normalized into discrete events.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEvent {
	/// Transport reported a successful (re)connection
	Connected { reconnect: bool, uri: ArcStr },
	/// Established connection dropped without the caller asking
	ConnectionLost {
		error_code: i32,
		error_message: String,
	},
	/// Inbound message; `payload` is JSON when it parsed, text otherwise
	MessageArrived {
		topic: ArcStr,
		raw_payload: Bytes,
		payload: Payload,
	},
	/// Outbound publication handed to the network
	MessageDelivered { topic: ArcStr, raw_payload: Bytes },
}

impl ConnectionEvent {
	pub fn kind(&self) -> EventKind {
		match self {
			| ConnectionEvent::Connected { .. } => EventKind::Connected,
			| ConnectionEvent::ConnectionLost { .. } => EventKind::ConnectionLost,
			| ConnectionEvent::MessageArrived { .. } => EventKind::MessageArrived,
			| ConnectionEvent::MessageDelivered { .. } => {
				EventKind::MessageDelivered
			}
		}
	}

	/// Message topic for message events.
	pub fn message_topic(&self) -> Option<&ArcStr> {
		match self {
			| ConnectionEvent::MessageArrived { topic, .. }
			| ConnectionEvent::MessageDelivered { topic, .. } => Some(topic),
			| _ => None,
		}
	}
}
