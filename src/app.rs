//! Application-level routing
//!
//! Ties the backend data source and the broker connection together and
//! re-broadcasts entity updates to UI components.

pub mod data_source;
pub mod entity;
pub mod error;
pub mod router;

pub use data_source::{DataSource, DataSourceError, EntityRecord};
pub use entity::{
	EntityId, EntityKind, data_topic, entity_topics, parse_data_topic,
	subresource_status_topic,
};
pub use error::{RouterError, RouterResult};
pub use router::{ApplicationRouter, EntityUpdate};
