use std::path::PathBuf;

use chrono::{TimeZone, Utc};
use reqwest::StatusCode;
use serde_json::{Value, json};
use stow_it_now::persistence::load_state;
use stow_it_now::{Inventory, InventoryState, api};

struct TestServer {
    base_url: String,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn() -> Self {
        Self::spawn_with_state_file(None).await
    }

    async fn spawn_with_state_file(state_file: Option<PathBuf>) -> Self {
        // Same router as prod, simulated clock at 2024-12-31, ephemeral port.
        let epoch = Utc.with_ymd_and_hms(2024, 12, 31, 0, 0, 0).unwrap();
        let app = api::router(Inventory::new(InventoryState::new(epoch)), state_file);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { base_url, handle }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn post(&self, path: &str, body: Value) -> (StatusCode, Value) {
        let res = reqwest::Client::new()
            .post(self.url(path))
            .json(&body)
            .send()
            .await
            .unwrap();
        let status = res.status();
        (status, res.json().await.unwrap())
    }

    async fn get(&self, path: &str) -> (StatusCode, Value) {
        let res = reqwest::get(self.url(path)).await.unwrap();
        let status = res.status();
        (status, res.json().await.unwrap())
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn item(id: &str, dims: (f64, f64, f64), priority: i32, usage: u32, expiry: Option<&str>) -> Value {
    json!({
        "itemId": id,
        "name": format!("item-{}", id),
        "width": dims.0,
        "depth": dims.1,
        "height": dims.2,
        "priority": priority,
        "expiryDate": expiry,
        "usageLimit": usage,
        "preferredZone": "Storage"
    })
}

fn container(id: &str, zone: &str, dims: (f64, f64, f64)) -> Value {
    json!({
        "containerId": id,
        "zone": zone,
        "width": dims.0,
        "depth": dims.1,
        "height": dims.2
    })
}

#[tokio::test]
async fn placement_search_and_retrieve_round_trip() {
    let srv = TestServer::spawn().await;

    let (status, body) = srv
        .post(
            "/api/placement",
            json!({
                "containers": [container("contA", "Storage", (10.0, 10.0, 10.0))],
                "items": [item("I1", (2.0, 2.0, 2.0), 1, 5, None)]
            }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    let position = &body["placements"][0]["position"];
    assert_eq!(position["startCoordinates"], json!({"width": 0.0, "depth": 0.0, "height": 0.0}));
    assert_eq!(position["endCoordinates"], json!({"width": 2.0, "depth": 2.0, "height": 2.0}));

    let (status, body) = srv.get("/api/search?itemName=item-I1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["found"], true);
    assert_eq!(body["item"]["containerId"], "contA");
    assert_eq!(body["item"]["zone"], "Storage");
    assert_eq!(body["retrievalSteps"][0]["action"], "retrieve");

    let (status, body) = srv.post("/api/retrieve", json!({"itemId": "I1", "userId": "crew-1"})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["retrievalSteps"].as_array().unwrap().len(), 1);

    let (_, body) = srv.get("/api/search?itemId=I1").await;
    assert_eq!(body["item"]["status"], "unplaced");
    assert!(body["item"]["position"].is_null());

    let (status, body) = srv.get("/api/search?itemId=NOPE").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["found"], false);
}

#[tokio::test]
async fn blocked_item_is_retrieved_around_its_blocker() {
    let srv = TestServer::spawn().await;
    srv.post(
        "/api/placement",
        json!({
            "containers": [container("contA", "Storage", (4.0, 10.0, 4.0))],
            "items": [
                item("I4", (4.0, 2.0, 4.0), 9, 5, None),
                item("I5", (4.0, 2.0, 4.0), 1, 5, None)
            ]
        }),
    )
    .await;

    // I4 goes first (higher priority) and lands at the open face; move it back.
    let (status, body) = srv.post("/api/retrieve", json!({"itemId": "I4"})).await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    let (status, _) = srv
        .post(
            "/api/place",
            json!({
                "itemId": "I4",
                "containerId": "contA",
                "position": {
                    "startCoordinates": {"width": 0.0, "depth": 6.0, "height": 0.0},
                    "endCoordinates": {"width": 4.0, "depth": 8.0, "height": 4.0}
                }
            }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = srv.get("/api/search?itemId=I4").await;
    let actions: Vec<(String, String)> = body["retrievalSteps"]
        .as_array()
        .unwrap()
        .iter()
        .map(|s| (s["action"].as_str().unwrap().to_string(), s["itemId"].as_str().unwrap().to_string()))
        .collect();
    assert_eq!(
        actions,
        vec![
            ("remove".to_string(), "I5".to_string()),
            ("retrieve".to_string(), "I4".to_string()),
            ("placeBack".to_string(), "I5".to_string()),
        ]
    );
}

#[tokio::test]
async fn manual_placement_conflicts_are_reported() {
    let srv = TestServer::spawn().await;
    srv.post(
        "/api/placement",
        json!({
            "containers": [container("contA", "Storage", (10.0, 10.0, 10.0))],
            "items": [item("I1", (5.0, 5.0, 5.0), 1, 5, None)]
        }),
    )
    .await;
    srv.post(
        "/api/placement",
        json!({"items": [item("I2", (10.0, 10.0, 10.0), 1, 5, None)]}),
    )
    .await;

    let (status, body) = srv
        .post(
            "/api/place",
            json!({
                "itemId": "I2",
                "containerId": "contA",
                "position": {
                    "startCoordinates": {"width": 1.0, "depth": 0.0, "height": 0.0},
                    "endCoordinates": {"width": 11.0, "depth": 10.0, "height": 10.0}
                }
            }),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "invalid_geometry");

    let (status, body) = srv
        .post(
            "/api/place",
            json!({
                "itemId": "I2",
                "containerId": "contA",
                "position": {
                    "startCoordinates": {"width": 0.0, "depth": 0.0, "height": 0.0},
                    "endCoordinates": {"width": 10.0, "depth": 10.0, "height": 10.0}
                }
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "no_space");

    let (status, body) = srv.post("/api/retrieve", json!({"itemId": "GHOST"})).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn full_container_reports_failures_per_item() {
    let srv = TestServer::spawn().await;
    let (status, body) = srv
        .post(
            "/api/placement",
            json!({
                "containers": [container("contA", "Storage", (10.0, 10.0, 10.0))],
                "items": [
                    item("BIG", (10.0, 10.0, 10.0), 5, 5, None),
                    item("SMALL", (1.0, 1.0, 1.0), 5, 5, None),
                    item("HUGE", (20.0, 1.0, 1.0), 5, 5, None)
                ]
            }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], false);
    let failures: Vec<(&str, &str)> = body["failures"]
        .as_array()
        .unwrap()
        .iter()
        .map(|f| (f["itemId"].as_str().unwrap(), f["error"].as_str().unwrap()))
        .collect();
    assert_eq!(failures, vec![("HUGE", "invalid_geometry"), ("SMALL", "no_space")]);
}

#[tokio::test]
async fn simulation_drives_waste_through_undocking() {
    let srv = TestServer::spawn().await;
    srv.post(
        "/api/placement",
        json!({
            "containers": [
                container("contA", "Storage", (10.0, 10.0, 10.0)),
                container("dock", "Airlock", (5.0, 5.0, 5.0))
            ],
            "items": [
                item("I3", (2.0, 2.0, 2.0), 5, 1, Some("2025-01-01")),
                item("KEEP", (2.0, 2.0, 2.0), 1, 5, None)
            ]
        }),
    )
    .await;

    let (status, body) = srv
        .post(
            "/api/simulate/day",
            json!({"numOfDays": 1, "itemsToBeUsedPerDay": [{"itemId": "I3"}]}),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert!(body["newDate"].as_str().unwrap().starts_with("2025-01-01"));
    assert_eq!(body["changes"]["itemsUsed"][0]["remainingUses"], 0);
    assert_eq!(body["changes"]["itemsDepletedToday"][0]["itemId"], "I3");
    assert_eq!(body["changes"]["itemsExpired"][0]["name"], "item-I3");

    let (_, body) = srv.get("/api/waste/identify").await;
    assert_eq!(body["wasteItems"].as_array().unwrap().len(), 1);
    assert_eq!(body["wasteItems"][0]["reason"], "Expired");

    let (status, plan) = srv
        .post(
            "/api/waste/return-plan",
            json!({"undockingContainerId": "dock", "undockingDate": "2025-02-01"}),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{}", plan);
    assert_eq!(plan["returnPlan"][0]["toContainer"], "dock");
    assert_eq!(plan["returnManifest"]["totalVolume"], 8.0);
    assert_eq!(plan["returnManifest"]["undockingDate"], "2025-02-01");

    let (status, _) = srv
        .post("/api/waste/consolidate", json!({"undockingContainerId": "dock"}))
        .await;
    assert_eq!(status, StatusCode::OK);
    let (_, body) = srv.get("/api/search?itemId=I3").await;
    assert_eq!(body["item"]["containerId"], "dock");

    let (status, body) = srv
        .post("/api/waste/complete-undocking", json!({"undockingContainerId": "dock"}))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["itemsRemoved"], 1);

    let (_, body) = srv.get("/api/waste/identify").await;
    assert!(body["wasteItems"].as_array().unwrap().is_empty());
    let (status, _) = srv.post("/api/retrieve", json!({"itemId": "I3"})).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn simulation_input_errors() {
    let srv = TestServer::spawn().await;

    let (status, _) = srv.post("/api/simulate/day", json!({})).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (status, _) = srv
        .post(
            "/api/simulate/day",
            json!({"numDays": 1, "itemsToBeUsedPerDay": [{"itemId": "MISSING"}]}),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = srv
        .post("/api/simulate/day", json!({"toTimestamp": "2020-01-01T00:00:00Z"}))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let res = reqwest::Client::new()
        .post(srv.url("/api/simulate/day"))
        .header("content-type", "application/json")
        .body("{ not json")
        .send()
        .await
        .unwrap();
    assert!(res.status().is_client_error());
}

#[tokio::test]
async fn docs_are_served() {
    let srv = TestServer::spawn().await;
    let (status, doc) = srv.get("/docs/openapi.json").await;
    assert_eq!(status, StatusCode::OK);
    assert!(doc["paths"]["/api/placement"].is_object());

    let res = reqwest::get(srv.url("/docs")).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert!(res.text().await.unwrap().contains("swagger-ui"));
}

#[tokio::test]
async fn mutations_are_saved_to_the_state_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("inventory.json");
    let srv = TestServer::spawn_with_state_file(Some(path.clone())).await;

    let (status, _) = srv
        .post(
            "/api/placement",
            json!({
                "containers": [container("contA", "Storage", (10.0, 10.0, 10.0))],
                "items": [item("I1", (2.0, 2.0, 2.0), 1, 5, None)]
            }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let saved = load_state(&path).unwrap().expect("snapshot written");
    assert!(saved.placement_of(&"I1".into()).is_some());
}
