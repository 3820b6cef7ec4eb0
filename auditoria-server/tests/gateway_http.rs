use std::{sync::Arc, time::Duration};

use auditoria_core::{
    BusConnectionManager, Publisher, RetryPolicy, bus::MemoryBus,
    publisher::{PUBLISH_BUS_ERROR_MESSAGE, PUBLISH_OK_MESSAGE},
};
use auditoria_model::{DEFAULT_TOPIC, decode};
use auditoria_server::{infra::app_state::AppState, routes};
use axum::http::StatusCode;
use axum_test::TestServer;
use serde_json::{Value, json};

async fn server_with_bus(connect: bool) -> (TestServer, MemoryBus) {
    let bus = MemoryBus::new();
    let manager = Arc::new(BusConnectionManager::new(
        Arc::new(bus.connector("gateway-producer")),
        RetryPolicy::fixed(1, Duration::from_millis(1)),
    ));
    if connect {
        manager.connect_producer().await.unwrap();
    }
    let state = AppState::new(Publisher::new(manager, DEFAULT_TOPIC));
    let server = TestServer::new(routes::create_app(state)).unwrap();
    (server, bus)
}

#[tokio::test]
async fn health_endpoints_respond() {
    let (server, _) = server_with_bus(true).await;

    let response = server.get(routes::HEALTH).await;
    response.assert_status_ok();
    assert_eq!(response.text(), "OK");

    let response = server.get(routes::API_HEALTH).await;
    response.assert_status_ok();
    assert_eq!(response.text(), "Gateway Producer Operativo");
}

#[tokio::test]
async fn action_is_published_to_the_audit_topic() {
    let (server, bus) = server_with_bus(true).await;

    let response = server
        .post(routes::ACCIONES)
        .json(&json!({ "usuario": "alice", "accion": "descargar-reporte" }))
        .await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body, json!({ "success": true, "message": PUBLISH_OK_MESSAGE }));

    let messages = bus.messages(DEFAULT_TOPIC);
    assert_eq!(messages.len(), 1);
    let event = decode(&messages[0].payload).unwrap();
    assert_eq!(event.actor, "alice");
    assert_eq!(event.action, "descargar-reporte");
}

#[tokio::test]
async fn english_field_names_are_accepted() {
    let (server, bus) = server_with_bus(true).await;

    let response = server
        .post(routes::ACCIONES)
        .json(&json!({ "actor": "bob", "action": "login" }))
        .await;

    response.assert_status_ok();
    assert_eq!(response.json::<Value>()["success"], true);
    assert_eq!(bus.messages(DEFAULT_TOPIC).len(), 1);
}

#[tokio::test]
async fn empty_action_is_a_structured_failure() {
    let (server, bus) = server_with_bus(true).await;

    let response = server
        .post(routes::ACCIONES)
        .json(&json!({ "usuario": "alice", "accion": "  " }))
        .await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["success"], false);
    assert!(body["message"].as_str().unwrap().contains("accion"));
    assert!(bus.messages(DEFAULT_TOPIC).is_empty());
}

#[tokio::test]
async fn bus_outage_is_a_structured_failure() {
    let (server, bus) = server_with_bus(false).await;

    let response = server
        .post(routes::ACCIONES)
        .json(&json!({ "usuario": "alice", "accion": "login" }))
        .await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(
        body,
        json!({ "success": false, "message": PUBLISH_BUS_ERROR_MESSAGE })
    );
    assert!(bus.messages(DEFAULT_TOPIC).is_empty());
}

#[tokio::test]
async fn malformed_body_is_rejected_by_the_extractor() {
    let (server, bus) = server_with_bus(true).await;

    let response = server
        .post(routes::ACCIONES)
        .content_type("application/json")
        .bytes("{not json".into())
        .expect_failure()
        .await;

    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert_eq!(body["error"]["status"], 400);
    assert!(bus.messages(DEFAULT_TOPIC).is_empty());
}
