//! Configuration for broker connections

use rumqttc::{MqttOptions, OptionError, QoS};
use serde::Deserialize;

/// Transport-level behavior settings
#[derive(Debug, Clone)]
pub struct ClientSettings {
	/// Capacity of the rumqttc request channel
	pub event_loop_capacity: usize,
	/// Consecutive event loop errors before the transport gives up
	pub max_consecutive_errors: u32,
	/// First reconnect delay; doubles on every consecutive error
	pub initial_retry_delay_millis: u64,
	/// Upper bound for the reconnect delay
	pub max_retry_delay_millis: u64,
}

impl Default for ClientSettings {
	fn default() -> Self {
		Self {
			event_loop_capacity: 10,
			max_consecutive_errors: 10,
			initial_retry_delay_millis: 100,
			max_retry_delay_millis: 30_000,
		}
	}
}

/// Connection parameters for one session.
///
/// Usually handed over by the authentication layer, hence `Deserialize`;
/// every field but `host` and `client_id` has a default.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ConnectOptions {
	pub host: String,
	pub port: u16,
	pub client_id: String,
	pub username: Option<String>,
	pub password: Option<String>,
	pub use_ssl: bool,
	pub keep_alive_secs: u64,
	pub clean_session: bool,
	pub connect_timeout_millis: u64,
}

impl Default for ConnectOptions {
	fn default() -> Self {
		Self {
			host: "localhost".to_string(),
			port: 1883,
			client_id: String::new(),
			username: None,
			password: None,
			use_ssl: false,
			keep_alive_secs: 30,
			clean_session: true,
			connect_timeout_millis: 10_000,
		}
	}
}

impl ConnectOptions {
	/// Create options with default settings
	pub fn new(client_id: &str, host: &str, port: u16) -> Self {
		Self {
			host: host.to_string(),
			port,
			client_id: client_id.to_string(),
			..Self::default()
		}
	}

	/// Create options for localhost:1883
	pub fn localhost(client_id: &str) -> Self {
		Self::new(client_id, "localhost", 1883)
	}

	/// Parse options from an MQTT URL
	///
	/// Supports: tcp://, mqtt://, ssl://, mqtts://. The `client_id` query
	/// parameter is required.
	pub fn from_url(url: &str) -> Result<Self, OptionError> {
		let parsed = MqttOptions::parse_url(url)?;
		let (host, port) = parsed.broker_address();
		Ok(Self {
			host,
			port,
			client_id: parsed.client_id(),
			use_ssl: url.starts_with("mqtts://") || url.starts_with("ssl://"),
			keep_alive_secs: parsed.keep_alive().as_secs(),
			clean_session: parsed.clean_session(),
			..Self::default()
		})
	}

	pub fn with_credentials(
		mut self,
		username: impl Into<String>,
		password: impl Into<String>,
	) -> Self {
		self.username = Some(username.into());
		self.password = Some(password.into());
		self
	}

	pub fn with_ssl(mut self, use_ssl: bool) -> Self {
		self.use_ssl = use_ssl;
		self
	}

	/// Broker address without client parameters, reported in `Connected`.
	pub fn uri(&self) -> String {
		let scheme = if self.use_ssl { "mqtts" } else { "mqtt" };
		format!("{scheme}://{}:{}", self.host, self.port)
	}

	/// URL understood by [`MqttOptions::parse_url`].
	pub fn to_url(&self) -> String {
		format!("{}?client_id={}", self.uri(), self.client_id)
	}
}

/// Per-subscription settings
#[derive(Debug, Clone, Copy)]
pub struct SubscriptionConfig {
	pub qos: QoS,
}

impl Default for SubscriptionConfig {
	fn default() -> Self {
		Self {
			qos: QoS::AtLeastOnce,
		}
	}
}
