//! Entity discovery, update fan-out and reconnect handling of the
//! application router.

mod common;

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use arcstr::ArcStr;
use bytes::Bytes;
use common::{Call, MockConnector, MockDataSource, options, recorder};
use fleet_router::app::{
	ApplicationRouter, EntityKind, EntityRecord, EntityUpdate, RouterError,
};
use fleet_router::client::ConnectionClient;
use fleet_router::routing::ALL_TOPICS;
use fleet_router::QoS;
use serde::Deserialize;
use serde_json::{Value, json};

type TestRouter = ApplicationRouter<MockConnector, MockDataSource>;

fn data_source() -> MockDataSource {
	MockDataSource::default()
		.with(EntityKind::Ambulance, vec![
			EntityRecord::new(1, json!({"status": "AV"})),
			EntityRecord::new(2, json!({"status": "PB"})),
		])
		.with(EntityKind::Hospital, vec![EntityRecord::new(
			7,
			json!({"name": "General"}),
		)])
		.with(EntityKind::Call, vec![EntityRecord::new(
			31,
			json!({"status": "P"}),
		)])
}

fn router_with(
	source: MockDataSource,
) -> (MockConnector, Arc<ConnectionClient<MockConnector>>, TestRouter) {
	let connector = MockConnector::default();
	let client = Arc::new(ConnectionClient::new(connector.clone()));
	let router = ApplicationRouter::new(Arc::clone(&client), source).unwrap();
	(connector, client, router)
}

async fn started_router()
-> (MockConnector, Arc<ConnectionClient<MockConnector>>, TestRouter) {
	let (connector, client, router) = router_with(data_source());
	router.start(&options()).await.unwrap();
	(connector, client, router)
}

fn expected_filters() -> BTreeSet<String> {
	[
		"ambulance/1/data",
		"ambulance/1/call/+/status",
		"ambulance/2/data",
		"ambulance/2/call/+/status",
		"hospital/7/data",
		"call/31/data",
	]
	.into_iter()
	.map(String::from)
	.collect()
}

#[tokio::test]
async fn test_start_subscribes_every_discovered_entity() {
	let (connector, client, router) = started_router().await;

	assert!(client.is_connected());
	assert!(router.is_started());
	let tracked: BTreeSet<String> = router.tracked_filters().into_iter().collect();
	assert_eq!(tracked, expected_filters());

	let subscribed = connector.subscribed_filters();
	assert_eq!(subscribed.len(), 6);
	assert_eq!(subscribed.into_iter().collect::<BTreeSet<_>>(), expected_filters());

	assert_eq!(
		router.entity(EntityKind::Hospital, 7),
		Some(json!({"name": "General"}))
	);
	assert_eq!(
		router
			.entities(EntityKind::Ambulance)
			.into_iter()
			.map(|(id, _)| id)
			.collect::<Vec<_>>(),
		vec![1, 2]
	);
	router.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_second_start_fails() {
	let (_connector, _client, router) = started_router().await;
	let err = router.start(&options()).await.unwrap_err();
	assert!(matches!(err, RouterError::AlreadyStarted));
	assert_eq!(err.error_type(), "already_started");
	router.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_retrieve_needs_start() {
	let (_connector, _client, router) = router_with(data_source());
	let err = router.retrieve(EntityKind::Call).await.unwrap_err();
	assert!(matches!(err, RouterError::NotStarted));
}

#[tokio::test]
async fn test_start_reports_data_source_failure() {
	let (connector, _client, router) =
		router_with(data_source().failing(EntityKind::Hospital));
	let err = router.start(&options()).await.unwrap_err();
	assert!(matches!(err, RouterError::DataSource(_)));
	assert!(!router.is_started());

	// Retry is not refused as a second start
	let err = router.start(&options()).await.unwrap_err();
	assert!(matches!(err, RouterError::DataSource(_)));
	assert_eq!(connector.count(|call| matches!(call, Call::Open { .. })), 1);
	router.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_start_reports_connect_failure() {
	let (connector, client, router) = router_with(data_source());
	connector.fail_next_open();
	let err = router.start(&options()).await.unwrap_err();
	assert!(matches!(err, RouterError::Client(_)));
	assert!(!router.is_started());
	assert!(!client.is_connected());
}

#[tokio::test]
async fn test_message_updates_cache_and_is_rebroadcast() {
	let (connector, _client, router) = started_router().await;
	let (ambulance_updates, subscriber) = recorder::<EntityUpdate>();
	router.observe(Some("ambulance/+/data"), subscriber).unwrap();
	let (all_updates, subscriber) = recorder::<EntityUpdate>();
	router.observe(None, subscriber).unwrap();

	let handlers = connector.handlers();
	handlers.message_arrived(
		"ambulance/2/data",
		Bytes::from_static(br#"{"status":"AH"}"#),
	);
	handlers.message_arrived(
		"ambulance/2/call/31/status",
		Bytes::from_static(b"ongoing"),
	);

	let expected = EntityUpdate {
		topic: ArcStr::from("ambulance/2/data"),
		payload: json!({"status": "AH"}),
	};
	assert_eq!(*ambulance_updates.lock().unwrap(), vec![expected.clone()]);
	assert_eq!(*all_updates.lock().unwrap(), vec![
		expected,
		EntityUpdate {
			topic: ArcStr::from("ambulance/2/call/31/status"),
			payload: Value::String("ongoing".to_string()),
		},
	]);
	assert_eq!(
		router.entity(EntityKind::Ambulance, 2),
		Some(json!({"status": "AH"}))
	);
	router.shutdown().await.unwrap();
}

#[derive(Debug, Deserialize, PartialEq)]
struct AmbulanceData {
	status: String,
}

#[tokio::test]
async fn test_observe_typed() {
	let (_connector, _client, router) = started_router().await;
	let seen = Arc::new(Mutex::new(Vec::new()));
	let sink = Arc::clone(&seen);
	let subscriber = router
		.observe_typed(
			Some("ambulance/+/data"),
			move |topic: &str, data: AmbulanceData| {
				sink.lock().unwrap().push((topic.to_string(), data));
			},
		)
		.unwrap();

	let report = router.broadcast(
		&EntityUpdate {
			topic: ArcStr::from("ambulance/1/data"),
			payload: json!({"status": "OS"}),
		},
		Some("ambulance/1/data"),
	);
	assert_eq!(report.delivered, 1);
	assert_eq!(*seen.lock().unwrap(), vec![(
		"ambulance/1/data".to_string(),
		AmbulanceData {
			status: "OS".to_string()
		}
	)]);

	let report = router.broadcast(
		&EntityUpdate {
			topic: ArcStr::from("ambulance/1/data"),
			payload: json!("not an object"),
		},
		Some("ambulance/1/data"),
	);
	assert_eq!(report.failed, 1);
	assert_eq!(seen.lock().unwrap().len(), 1);

	router.remove(Some("ambulance/+/data"), &subscriber).unwrap();
	let report = router.broadcast(
		&EntityUpdate {
			topic: ArcStr::from("ambulance/1/data"),
			payload: json!({"status": "AV"}),
		},
		Some("ambulance/1/data"),
	);
	assert_eq!(report.delivered, 0);
	router.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_reconnect_resubscribes_tracked_filters() {
	let (connector, client, router) = started_router().await;
	let handlers = connector.handlers();

	handlers.connection_lost(1, "socket closed");
	handlers.connected(true, "mqtt://localhost:1883");
	assert!(client.is_connected());

	tokio::time::sleep(Duration::from_millis(50)).await;
	assert_eq!(connector.subscribed_filters().len(), 12);
	router.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_subscribe_is_tracked_once() {
	let (connector, _client, router) = started_router().await;
	router.subscribe("hospital/7/data").await.unwrap();
	router.subscribe_entity(EntityKind::Hospital, 7).await.unwrap();
	assert_eq!(
		connector.count(|call| matches!(
			call,
			Call::Subscribe { filter, .. } if filter == "hospital/7/data"
		)),
		1
	);

	assert!(matches!(
		router.subscribe("hospital/#/data").await.unwrap_err(),
		RouterError::Topic(_)
	));
	router.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_unsubscribe_entity() {
	let (connector, _client, router) = started_router().await;
	router
		.unsubscribe_entity(EntityKind::Ambulance, 1)
		.await
		.unwrap();

	let tracked = router.tracked_filters();
	assert!(!tracked.iter().any(|f| f.starts_with("ambulance/1/")));
	assert_eq!(tracked.len(), 4);
	assert_eq!(router.entity(EntityKind::Ambulance, 1), None);
	assert!(connector.calls().contains(&Call::Unsubscribe {
		filter: "ambulance/1/call/+/status".to_string()
	}));
	router.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_publish_serializes_json() {
	let (connector, _client, router) = started_router().await;
	router
		.publish(
			"ambulance/1/data",
			&json!({"status": "AV"}),
			QoS::AtLeastOnce,
			false,
		)
		.await
		.unwrap();
	assert!(connector.calls().contains(&Call::Publish {
		topic: "ambulance/1/data".to_string(),
		payload: Bytes::from_static(br#"{"status":"AV"}"#),
		qos: QoS::AtLeastOnce,
		retained: false,
	}));
	router.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_shutdown_unsubscribes_and_disconnects() {
	let (connector, client, router) = started_router().await;
	let (updates, subscriber) = recorder::<EntityUpdate>();
	router.observe(None, subscriber).unwrap();
	let handlers = connector.handlers();

	router.shutdown().await.unwrap();

	let unsubscribed: BTreeSet<String> = connector
		.calls()
		.into_iter()
		.filter_map(|call| match call {
			| Call::Unsubscribe { filter } => Some(filter),
			| _ => None,
		})
		.collect();
	assert_eq!(unsubscribed, expected_filters());
	assert_eq!(connector.calls().last(), Some(&Call::Disconnect));
	assert!(!client.is_connected());

	// Router detached from the client
	assert_eq!(client.events().subscriber_count(), 0);
	handlers.message_arrived("ambulance/1/data", Bytes::from_static(b"{}"));
	assert!(updates.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_dropping_router_detaches_from_client() {
	let (_connector, client, router) = router_with(data_source());
	assert_eq!(client.events().subscriber_count(), 1);
	assert!(client.events().contains(ALL_TOPICS));
	drop(router);
	assert_eq!(client.events().subscriber_count(), 0);
}
