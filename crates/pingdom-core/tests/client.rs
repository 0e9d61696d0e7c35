use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::Router;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json};
use axum::routing::get;
use serde_json::json;

use pingdom_core::model::OutageWindow;
use pingdom_core::{ApiError, CheckFilter, ChecksApi, OutageApi, PingdomClient};

#[derive(Clone, Default)]
struct Seen {
    requests: Arc<Mutex<Vec<(String, HashMap<String, String>, Option<String>)>>>,
}

impl Seen {
    fn record(&self, path: &str, query: HashMap<String, String>, headers: &HeaderMap) {
        let auth = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        self.requests
            .lock()
            .unwrap()
            .push((path.to_string(), query, auth));
    }
}

async fn checks(
    State(seen): State<Seen>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Json<serde_json::Value> {
    seen.record("/checks", query, &headers);
    Json(json!({
        "checks": [{
            "id": 85975,
            "name": "My check 1",
            "hostname": "example.com",
            "resolution": 1,
            "lastresponsetime": 355,
            "status": "up",
            "tags": [{"name": "env:prod", "type": "u", "count": 2}]
        }],
        "counts": {"total": 1, "limited": 1, "filtered": 1}
    }))
}

async fn outages(
    State(seen): State<Seen>,
    Path(id): Path<i64>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> axum::response::Response {
    seen.record(&format!("/summary.outage/{}", id), query, &headers);
    if id == 404 {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({"error": {
                "statuscode": 404,
                "statusdesc": "Not Found",
                "errormessage": "Check not found"
            }})),
        )
            .into_response();
    }
    if id == 500 {
        return (StatusCode::OK, "not json").into_response();
    }
    Json(json!({"summary": {"states": [
        {"status": "up", "timefrom": 100, "timeto": 200},
        {"status": "down", "timefrom": 200, "timeto": 260}
    ]}}))
    .into_response()
}

async fn start() -> (PingdomClient, Seen) {
    let seen = Seen::default();
    let app = Router::new()
        .route("/api/3.1/checks", get(checks))
        .route("/api/3.1/summary.outage/{id}", get(outages))
        .with_state(seen.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    let client = PingdomClient::new("my_api_token", Duration::from_secs(5))
        .unwrap()
        .with_base_url(format!("http://{}/api/3.1/", addr));
    (client, seen)
}

#[tokio::test]
async fn list_checks_sends_filter_and_token() {
    let (client, seen) = start().await;
    let filter = CheckFilter {
        include_tags: true,
        tags: "prod,web".to_string(),
    };
    let checks = client.list_checks(&filter).await.unwrap();
    assert_eq!(checks.len(), 1);
    assert_eq!(checks[0].id, 85975);
    assert_eq!(checks[0].tags[0].name, "env:prod");

    let requests = seen.requests.lock().unwrap();
    let (path, query, auth) = &requests[0];
    assert_eq!(path, "/checks");
    assert_eq!(query.get("include_tags").map(String::as_str), Some("true"));
    assert_eq!(query.get("tags").map(String::as_str), Some("prod,web"));
    assert_eq!(auth.as_deref(), Some("Bearer my_api_token"));
}

#[tokio::test]
async fn list_checks_without_tag_filter() {
    let (client, seen) = start().await;
    client
        .list_checks(&CheckFilter {
            include_tags: true,
            tags: String::new(),
        })
        .await
        .unwrap();
    let requests = seen.requests.lock().unwrap();
    assert!(!requests[0].1.contains_key("tags"));
}

#[tokio::test]
async fn list_outages_passes_window() {
    let (client, seen) = start().await;
    let window = OutageWindow { from: 100, to: 700 };
    let states = client.list_outages(42, window).await.unwrap();
    assert_eq!(states.len(), 2);
    assert_eq!(states[1].status, "down");

    let requests = seen.requests.lock().unwrap();
    let (path, query, _) = &requests[0];
    assert_eq!(path, "/summary.outage/42");
    assert_eq!(query.get("from").map(String::as_str), Some("100"));
    assert_eq!(query.get("to").map(String::as_str), Some("700"));
}

#[tokio::test]
async fn api_error_envelope_surfaces() {
    let (client, _) = start().await;
    let err = client
        .list_outages(404, OutageWindow { from: 0, to: 1 })
        .await
        .unwrap_err();
    match err {
        ApiError::Api {
            status, message, ..
        } => {
            assert_eq!(status, 404);
            assert_eq!(message, "Check not found");
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[tokio::test]
async fn undecodable_body_is_decode_error() {
    let (client, _) = start().await;
    let err = client
        .list_outages(500, OutageWindow { from: 0, to: 1 })
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Decode(_)));
}

#[tokio::test]
async fn unreachable_server_is_http_error() {
    let client = PingdomClient::new("t", Duration::from_millis(500))
        .unwrap()
        .with_base_url("http://127.0.0.1:9");
    let err = client
        .list_checks(&CheckFilter::default())
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Http(_)));
}
