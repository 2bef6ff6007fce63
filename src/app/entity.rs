use std::fmt;

use serde::{Deserialize, Serialize};

/// Entity identifier as assigned by the backend.
pub type EntityId = u64;

/// Kinds of entities the router tracks.
#[derive(
	Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
	Ambulance,
	Hospital,
	Call,
}

impl EntityKind {
	pub const ALL: [EntityKind; 3] =
		[EntityKind::Ambulance, EntityKind::Hospital, EntityKind::Call];

	/// First topic segment of this kind.
	pub fn as_str(self) -> &'static str {
		match self {
			| EntityKind::Ambulance => "ambulance",
			| EntityKind::Hospital => "hospital",
			| EntityKind::Call => "call",
		}
	}

	pub fn from_segment(segment: &str) -> Option<Self> {
		Self::ALL.into_iter().find(|kind| kind.as_str() == segment)
	}
}

impl fmt::Display for EntityKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// `{kind}/{id}/data`
pub fn data_topic(kind: EntityKind, id: EntityId) -> String {
	format!("{kind}/{id}/data")
}

/// `{kind}/{id}/{subresource}/{sub_id}/status`; `sub_id` may be `+`.
pub fn subresource_status_topic(
	kind: EntityKind,
	id: EntityId,
	subresource: EntityKind,
	sub_id: &str,
) -> String {
	format!("{kind}/{id}/{subresource}/{sub_id}/status")
}

/// Broker filters a discovered entity is subscribed to.
pub fn entity_topics(kind: EntityKind, id: EntityId) -> Vec<String> {
	let mut topics = vec![data_topic(kind, id)];
	if kind == EntityKind::Ambulance {
		topics.push(subresource_status_topic(kind, id, EntityKind::Call, "+"));
	}
	topics
}

/// Splits a `{kind}/{id}/data` topic; `None` for anything else.
pub fn parse_data_topic(topic: &str) -> Option<(EntityKind, EntityId)> {
	let mut segments = topic.split('/');
	let kind = EntityKind::from_segment(segments.next()?)?;
	let id = segments.next()?.parse().ok()?;
	match (segments.next(), segments.next()) {
		| (Some("data"), None) => Some((kind, id)),
		| _ => None,
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_entity_topics() {
		assert_eq!(entity_topics(EntityKind::Hospital, 4), vec![
			"hospital/4/data".to_string()
		]);
		assert_eq!(entity_topics(EntityKind::Ambulance, 12), vec![
			"ambulance/12/data".to_string(),
			"ambulance/12/call/+/status".to_string(),
		]);
	}

	#[test]
	fn test_parse_data_topic() {
		assert_eq!(
			parse_data_topic("call/31/data"),
			Some((EntityKind::Call, 31))
		);
		assert_eq!(parse_data_topic("call/31/data/extra"), None);
		assert_eq!(parse_data_topic("ambulance/x/data"), None);
		assert_eq!(parse_data_topic("ambulance/2/call/5/status"), None);
		assert_eq!(parse_data_topic("base/2/data"), None);
	}

	#[test]
	fn test_kind_serde_uses_topic_segment() {
		let json = serde_json::to_string(&EntityKind::Ambulance).unwrap();
		assert_eq!(json, "\"ambulance\"");
		let kind: EntityKind = serde_json::from_str("\"hospital\"").unwrap();
		assert_eq!(kind, EntityKind::Hospital);
	}
}
