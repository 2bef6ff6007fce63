//! Watches ambulance and hospital updates on a local broker.
//!
//! ```bash
//! RUST_LOG=fleet_router=debug cargo run --example fleet_monitor
//! ```
//!
//! Publish `{"status":"AV"}` to `ambulance/1/data` from any MQTT client to see
//! the update fan out.

use std::sync::Arc;
use std::time::Duration;

use fleet_router::prelude::*;
use fleet_router::{EntityRecord as Record, SubscriberError};
use serde::Deserialize;
use serde_json::json;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Backend stand-in serving a fixed fleet.
struct StaticFleet;

impl DataSource for StaticFleet {
	async fn fetch(&self, kind: EntityKind) -> Result<Vec<Record>, DataSourceError> {
		Ok(match kind {
			| EntityKind::Ambulance => vec![
				Record::new(1, json!({"identifier": "A-1", "status": "AV"})),
				Record::new(2, json!({"identifier": "A-2", "status": "UK"})),
			],
			| EntityKind::Hospital => {
				vec![Record::new(7, json!({"name": "General Hospital"}))]
			}
			| EntityKind::Call => Vec::new(),
		})
	}
}

#[derive(Debug, Deserialize)]
struct AmbulanceStatus {
	status: String,
}

fn setup_tracing() {
	let filter = tracing_subscriber::EnvFilter::try_from_default_env()
		.unwrap_or_else(|_| "info".into());
	tracing_subscriber::registry()
		.with(filter)
		.with(tracing_subscriber::fmt::layer().with_target(true).compact())
		.init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
	setup_tracing();

	let client_id = format!("fleet-monitor-{}", uuid::Uuid::new_v4().simple());
	let options = ConnectOptions::localhost(&client_id);

	let client = Arc::new(ConnectionClient::new(RumqttcConnector::default()));
	client.events().observe(
		Some("connectionLost"),
		Subscriber::from_fn(|event: &ConnectionEvent| {
			println!("connection lost: {event:?}");
		}),
	)?;

	let router = ApplicationRouter::new(Arc::clone(&client), StaticFleet)?;
	router.observe_typed(
		Some("ambulance/+/data"),
		|topic: &str, data: AmbulanceStatus| {
			println!("{topic}: ambulance is now {}", data.status);
		},
	)?;
	router.observe(
		Some("hospital/#"),
		Subscriber::new(|update: &EntityUpdate| {
			if update.payload.is_null() {
				return Err(SubscriberError::failed("empty hospital update"));
			}
			println!("{}: {}", update.topic, update.payload);
			Ok(())
		})
		.with_label("hospital_panel"),
	)?;

	router.start(&options).await?;
	println!("watching {} topics", router.tracked_filters().len());

	router
		.publish(
			"ambulance/1/data",
			&json!({"identifier": "A-1", "status": "PB"}),
			QoS::AtLeastOnce,
			false,
		)
		.await?;

	tokio::select! {
		_ = tokio::signal::ctrl_c() => {}
		_ = tokio::time::sleep(Duration::from_secs(60)) => {}
	}

	router.shutdown().await?;
	Ok(())
}
