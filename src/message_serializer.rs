//! Payload encoding and decoding
//!
//! Broker payloads are JSON when they parse. The decode step returns an
//! explicit `Result`; callers pick their own fallback, usually
//! [`Payload::raw_lossy`].

use std::fmt::Debug;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

pub trait MessageSerializer<T>: Default + Clone + Send + Sync + 'static {
	type SerializeError: Debug + Send + Sync + 'static;
	type DeserializeError: Debug + Send + Sync + 'static;

	fn serialize(&self, data: &T) -> Result<Vec<u8>, Self::SerializeError>;
	fn deserialize(&self, bytes: &[u8]) -> Result<T, Self::DeserializeError>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct JsonSerializer;

impl<T> MessageSerializer<T> for JsonSerializer
where T: Serialize + DeserializeOwned + 'static
{
	type SerializeError = serde_json::Error;
	type DeserializeError = serde_json::Error;

	fn serialize(&self, data: &T) -> Result<Vec<u8>, Self::SerializeError> {
		serde_json::to_vec(data)
	}

	fn deserialize(&self, bytes: &[u8]) -> Result<T, Self::DeserializeError> {
		serde_json::from_slice(bytes)
	}
}

/// Payload is not valid JSON.
#[derive(Debug, Error)]
#[error("Payload is not valid JSON: {source}")]
pub struct PayloadDecodeError {
	#[from]
	source: serde_json::Error,
}

/// Decoded broker payload.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
	/// Payload parsed as JSON
	Json(Value),
	/// Payload that did not parse, as (lossy) UTF-8 text
	Raw(String),
}

impl Payload {
	/// Decodes `bytes` as JSON.
	pub fn decode(bytes: &[u8]) -> Result<Self, PayloadDecodeError> {
		let value =
			MessageSerializer::<Value>::deserialize(&JsonSerializer, bytes)?;
		Ok(Payload::Json(value))
	}

	/// Keeps `bytes` as text, replacing invalid UTF-8 sequences.
	pub fn raw_lossy(bytes: &[u8]) -> Self {
		Payload::Raw(String::from_utf8_lossy(bytes).into_owned())
	}

	pub fn as_json(&self) -> Option<&Value> {
		match self {
			| Payload::Json(value) => Some(value),
			| Payload::Raw(_) => None,
		}
	}

	/// JSON view of the payload; raw text becomes a JSON string.
	pub fn to_value(&self) -> Value {
		match self {
			| Payload::Json(value) => value.clone(),
			| Payload::Raw(text) => Value::String(text.clone()),
		}
	}
}

#[cfg(test)]
mod tests {
	use serde::Deserialize;
	use serde_json::json;

	use super::*;

	#[derive(Serialize, Deserialize, Debug, PartialEq)]
	struct Location {
		latitude: f64,
		longitude: f64,
	}

	#[test]
	fn test_json_serializer_roundtrip() {
		let serializer = JsonSerializer;
		let location = Location {
			latitude: 32.5,
			longitude: -117.0,
		};
		let bytes = serializer.serialize(&location).unwrap();
		let decoded: Location = serializer.deserialize(&bytes).unwrap();
		assert_eq!(decoded, location);
	}

	#[test]
	fn test_decode_json_payload() {
		let payload = Payload::decode(br#"{"status":"AV","id":3}"#).unwrap();
		assert_eq!(payload.as_json(), Some(&json!({"status": "AV", "id": 3})));
	}

	#[test]
	fn test_decode_failure_and_raw_fallback() {
		let bytes = b"not json at all";
		assert!(Payload::decode(bytes).is_err());

		let payload = Payload::raw_lossy(bytes);
		assert_eq!(payload, Payload::Raw("not json at all".to_string()));
		assert_eq!(payload.as_json(), None);
		assert_eq!(payload.to_value(), json!("not json at all"));
	}

	#[test]
	fn test_empty_payload_is_not_json() {
		assert!(Payload::decode(b"").is_err());
		assert_eq!(Payload::raw_lossy(b""), Payload::Raw(String::new()));
	}
}
