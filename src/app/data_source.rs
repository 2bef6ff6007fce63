use std::future::Future;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use super::entity::{EntityId, EntityKind};

/// One entity as returned by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityRecord {
	pub id: EntityId,
	#[serde(flatten)]
	pub data: Value,
}

impl EntityRecord {
	pub fn new(id: EntityId, data: Value) -> Self {
		Self { id, data }
	}
}

/// Failure reported by the data-fetch collaborator.
#[derive(Debug, Error)]
#[error("Failed to fetch {kind} records: {message}")]
pub struct DataSourceError {
	pub kind: EntityKind,
	pub message: String,
}

impl DataSourceError {
	pub fn new(kind: EntityKind, message: impl Into<String>) -> Self {
		Self {
			kind,
			message: message.into(),
		}
	}
}

/// HTTP-side collaborator that lists the entities visible to the user.
pub trait DataSource: Send + Sync + 'static {
	fn fetch(
		&self,
		kind: EntityKind,
	) -> impl Future<Output = Result<Vec<EntityRecord>, DataSourceError>> + Send;
}
