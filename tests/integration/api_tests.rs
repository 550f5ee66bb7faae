//! API integration tests
//!
//! Drive the router in-process against the in-memory backend.

use std::{sync::Arc, time::Duration};

use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;

use equipment_inventory::{
    api,
    config::AppConfig,
    remote::{DbPath, MemoryStore},
    repository::Repository,
    services::Services,
    AppState,
};

const ACCESS_KEY: &str = "letmein";

struct TestApp {
    router: Router,
    state: AppState,
    store: MemoryStore,
}

impl TestApp {
    async fn new() -> Self {
        let store = MemoryStore::with_data(json!({
            "equipmentTypes": {
                "t1": {"name": "Laptop"},
                "t2": {"name": "Printer"}
            },
            "equipmentStatuses": {
                "s1": {"name": "Active"},
                "s2": {"name": "Retired"}
            }
        }));

        let mut config = AppConfig::default();
        config.auth.access_key = ACCESS_KEY.to_string();
        config.identity.public_host = "inventory.example.org".to_string();

        let repository = Repository::new(Arc::new(store.clone()), &config.collections, 1);
        let services = Services::new(repository, &config);
        let state = AppState {
            config: Arc::new(config),
            services: Arc::new(services),
        };

        let app = Self {
            router: api::create_router(state.clone()),
            state,
            store,
        };
        app.wait_for_items(0).await;
        app
    }

    /// Wait until the live view holds `count` records
    async fn wait_for_items(&self, count: usize) {
        let mut rx = self.state.services.equipment.subscribe();
        tokio::time::timeout(
            Duration::from_secs(2),
            rx.wait_for(|view| view.loaded && view.records.len() == count),
        )
        .await
        .expect("equipment view did not update")
        .expect("equipment feed closed");
    }

    async fn request(&self, method: &str, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
        let mut builder = Request::builder()
            .method(method)
            .uri(format!("/api/v1{}", uri));
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string())),
            None => builder.body(Body::empty()),
        }
        .expect("Failed to build request");

        let response = self.router.clone().oneshot(request).await.expect("Request failed");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("Failed to read body");
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).expect("Failed to parse response")
        };
        (status, value)
    }

    /// Helper to get a session token
    async fn get_auth_token(&self) -> String {
        let (status, body) = self
            .request("POST", "/auth/login", None, Some(json!({"key": ACCESS_KEY})))
            .await;
        assert_eq!(status, StatusCode::OK);
        body["token"].as_str().expect("No token in response").to_string()
    }
}

fn laptop(name: &str) -> Value {
    json!({
        "name": name,
        "type": "Laptop",
        "location": "Lab1",
        "status": "Active",
        "model": "M1"
    })
}

#[tokio::test]
async fn test_health_check() {
    let app = TestApp::new().await;
    let (status, body) = app.request("GET", "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn test_ready_after_first_snapshot() {
    let app = TestApp::new().await;
    let (status, body) = app.request("GET", "/ready", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ready");
}

#[tokio::test]
async fn test_login() {
    let app = TestApp::new().await;
    let (status, body) = app
        .request("POST", "/auth/login", None, Some(json!({"key": ACCESS_KEY})))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["token"].is_string());
    assert_eq!(body["token_type"], "Bearer");
    assert!(body["expires_at"].is_string());
}

#[tokio::test]
async fn test_login_invalid_key() {
    let app = TestApp::new().await;
    let (status, body) = app
        .request("POST", "/auth/login", None, Some(json!({"key": "wrong"})))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "NotAuthorized");
}

#[tokio::test]
async fn test_equipment_requires_session() {
    let app = TestApp::new().await;
    let (status, _) = app.request("GET", "/equipment", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app.request("GET", "/equipment", Some("garbage"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_logout_closes_session() {
    let app = TestApp::new().await;
    let token = app.get_auth_token().await;

    let (status, body) = app.request("GET", "/auth/session", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["session_id"].is_string());

    let (status, _) = app.request("POST", "/auth/logout", Some(&token), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = app.request("GET", "/auth/session", Some(&token), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_reference_lists() {
    let app = TestApp::new().await;
    let token = app.get_auth_token().await;

    let mut types = app.state.services.references.subscribe(equipment_inventory::models::ReferenceCollection::Types);
    tokio::time::timeout(Duration::from_secs(2), types.wait_for(|items| items.len() == 2))
        .await
        .unwrap()
        .unwrap();

    let (status, body) = app.request("GET", "/equipment-types", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!([{"id": "t1", "name": "Laptop"}, {"id": "t2", "name": "Printer"}]));
}

#[tokio::test]
async fn test_create_and_get_equipment() {
    let app = TestApp::new().await;
    let token = app.get_auth_token().await;

    let (status, body) = app.request("POST", "/equipment", Some(&token), Some(laptop("X1"))).await;
    assert_eq!(status, StatusCode::CREATED);
    let id = body["id"].as_str().expect("No id in response").to_string();

    let (status, body) = app
        .request("GET", &format!("/equipment/{}", id), Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], id.as_str());
    assert_eq!(body["name"], "X1");
    assert_eq!(body["type"], "Laptop");
    assert_eq!(body["qr_url"], format!("https://inventory.example.org/equipment/{}", id));
}

#[tokio::test]
async fn test_create_with_missing_fields() {
    let app = TestApp::new().await;
    let token = app.get_auth_token().await;

    let (status, body) = app
        .request("POST", "/equipment", Some(&token), Some(json!({"name": "", "type": "Laptop"})))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["fields"]["name"], "Equipment name is required.");
    assert!(body["fields"]["location"].is_string());
    assert!(body["fields"].get("type").is_none());
    assert_eq!(app.store.write_count(), 0);
}

#[tokio::test]
async fn test_list_filters_and_search() {
    let app = TestApp::new().await;
    let token = app.get_auth_token().await;

    app.request("POST", "/equipment", Some(&token), Some(laptop("ThinkPad X1"))).await;
    app.request("POST", "/equipment", Some(&token), Some(laptop("MacBook Air"))).await;
    app.request(
        "POST",
        "/equipment",
        Some(&token),
        Some(json!({
            "name": "LaserJet",
            "type": "Printer",
            "location": "Office",
            "status": "Retired",
            "model": "400"
        })),
    )
    .await;
    app.wait_for_items(3).await;

    let (status, body) = app.request("GET", "/equipment", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 3);
    assert!(body.get("stale").is_none());

    let (_, body) = app.request("GET", "/equipment?type=Laptop&status=all", Some(&token), None).await;
    assert_eq!(body["total"], 2);

    let (_, body) = app.request("GET", "/equipment?search=macbook", Some(&token), None).await;
    assert_eq!(body["total"], 1);
    assert_eq!(body["items"][0]["name"], "MacBook Air");

    let (_, body) = app.request("GET", "/equipment?type=Scanner", Some(&token), None).await;
    assert_eq!(body["total"], 0);
}

#[tokio::test]
async fn test_update_replaces_record() {
    let app = TestApp::new().await;
    let token = app.get_auth_token().await;

    let mut draft = laptop("X1");
    draft["description"] = json!("spare");
    let (_, body) = app.request("POST", "/equipment", Some(&token), Some(draft)).await;
    let id = body["id"].as_str().unwrap().to_string();

    let mut edited = laptop("X1 Carbon");
    edited["status"] = json!("Retired");
    let (status, body) = app
        .request("PUT", &format!("/equipment/{}", id), Some(&token), Some(edited))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], id.as_str());

    let stored = app
        .store
        .get(&DbPath::parse("equipment").child(&id))
        .expect("record missing");
    assert_eq!(stored["name"], "X1 Carbon");
    assert_eq!(stored["status"], "Retired");
    assert_eq!(stored["description"], "");
}

#[tokio::test]
async fn test_delete_equipment() {
    let app = TestApp::new().await;
    let token = app.get_auth_token().await;

    let (_, body) = app.request("POST", "/equipment", Some(&token), Some(laptop("X1"))).await;
    let id = body["id"].as_str().unwrap().to_string();

    let (status, _) = app
        .request("DELETE", &format!("/equipment/{}", id), Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, body) = app
        .request("GET", &format!("/equipment/{}", id), Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "NoSuchEquipment");

    // Deleting again is not an error
    let (status, _) = app
        .request("DELETE", &format!("/equipment/{}", id), Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn test_write_failure_is_reported() {
    let app = TestApp::new().await;
    let token = app.get_auth_token().await;
    app.store.fail_writes(Some("offline"));

    let (status, body) = app.request("POST", "/equipment", Some(&token), Some(laptop("X1"))).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["error"], "TransportFailure");
}
