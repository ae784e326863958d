//! Integration tests for the drone catalog backend.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use tempfile::TempDir;

use crate::auth::rate_limit::RateLimiter;
use crate::config::{Config, LimiterConfig, LogFormat};
use crate::db::{init_database, Repository};
use crate::models::Permission;
use crate::{create_router, AppState};

const WRITER_TOKEN: &str = "writer-token-0123456789";
const READER_TOKEN: &str = "reader-token-0123456789";

/// Test fixture for integration tests.
struct TestFixture {
    client: Client,
    base_url: String,
    _temp_dir: TempDir,
}

impl TestFixture {
    async fn new() -> Self {
        Self::with_limiter(LimiterConfig {
            enabled: false,
            max_requests: 0,
            window: Duration::from_secs(1),
        })
        .await
    }

    async fn with_limiter(limiter: LimiterConfig) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let db_path = temp_dir.path().join("test.sqlite");

        // Initialize database
        let pool = init_database(&db_path).await.expect("Failed to init DB");
        let repo = Arc::new(Repository::new(pool, Duration::from_secs(3)));

        repo.insert_token(WRITER_TOKEN, "writer", &Permission::ALL, None)
            .await
            .expect("Failed to seed writer token");
        repo.insert_token(READER_TOKEN, "reader", &[Permission::DronesRead], None)
            .await
            .expect("Failed to seed reader token");

        let config = Config {
            bind_addr: "127.0.0.1:0".parse().unwrap(),
            db_path: PathBuf::from(&db_path),
            env: "testing".to_string(),
            log_level: "warn".to_string(),
            log_format: LogFormat::Pretty,
            query_timeout: Duration::from_secs(3),
            limiter: limiter.clone(),
            cors_trusted_origins: Vec::new(),
            bootstrap_token: None,
        };

        let state = AppState {
            repo,
            limiter: RateLimiter::new(&limiter),
            config: Arc::new(config),
        };

        let app = create_router(state);

        // Bind to random port
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind");
        let addr = listener.local_addr().expect("Failed to get addr");
        let base_url = format!("http://{}", addr);

        // Spawn server
        tokio::spawn(async move {
            axum::serve(
                listener,
                app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .await
            .unwrap();
        });

        // Wait for server to start
        tokio::time::sleep(Duration::from_millis(100)).await;

        TestFixture {
            client: Client::new(),
            base_url,
            _temp_dir: temp_dir,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Create a drone as the writer and return its JSON.
    async fn create(&self, body: Value) -> Value {
        let resp = self
            .client
            .post(self.url("/v1/drones"))
            .bearer_auth(WRITER_TOKEN)
            .json(&body)
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::CREATED);
        let body: Value = resp.json().await.unwrap();
        body["drone"].clone()
    }

    async fn get_json(&self, path: &str) -> (StatusCode, Value) {
        let resp = self
            .client
            .get(self.url(path))
            .bearer_auth(READER_TOKEN)
            .send()
            .await
            .unwrap();
        let status = resp.status();
        (status, resp.json().await.unwrap())
    }
}

#[tokio::test]
async fn test_healthcheck() {
    let fixture = TestFixture::new().await;

    let resp = fixture
        .client
        .get(fixture.url("/v1/healthcheck"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "available");
    assert_eq!(body["system_info"]["environment"], "testing");
    assert!(body["system_info"]["version"].is_string());
}

#[tokio::test]
async fn test_create_then_fetch() {
    let fixture = TestFixture::new().await;

    let resp = fixture
        .client
        .post(fixture.url("/v1/drones"))
        .bearer_auth(WRITER_TOKEN)
        .json(&json!({
            "title": "Dron 1",
            "year": 2024,
            "price": 500000,
            "categories": ["a", "b"]
        }))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::CREATED);
    let location = resp
        .headers()
        .get("location")
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    let created: Value = resp.json().await.unwrap();
    let id = created["drone"]["id"].as_i64().unwrap();
    assert_eq!(location, format!("/v1/drones/{}", id));

    let (status, fetched) = fixture.get_json(&location).await;
    assert_eq!(status, 200);
    assert_eq!(
        fetched,
        json!({
            "drone": {
                "id": id,
                "title": "Dron 1",
                "year": 2024,
                "price": "500000 tenge",
                "categories": ["a", "b"],
                "version": 1
            }
        })
    );
    assert_eq!(fetched, created);
}

#[tokio::test]
async fn test_create_validation_errors() {
    let fixture = TestFixture::new().await;

    let resp = fixture
        .client
        .post(fixture.url("/v1/drones"))
        .bearer_auth(WRITER_TOKEN)
        .json(&json!({
            "title": "",
            "year": 1700,
            "price": -1,
            "categories": ["a", "a"]
        }))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["title"], "must be provided");
    assert_eq!(body["error"]["year"], "must be greater than 1888");
    assert_eq!(body["error"]["price"], "must be a positive integer");
    assert_eq!(body["error"]["categories"], "must not contain duplicate values");

    // Omitted categories are reported, not rejected by the decoder
    let resp = fixture
        .client
        .post(fixture.url("/v1/drones"))
        .bearer_auth(WRITER_TOKEN)
        .json(&json!({ "title": "No categories", "year": 2020, "price": 5 }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["categories"], "must be provided");
}

#[tokio::test]
async fn test_malformed_bodies() {
    let fixture = TestFixture::new().await;

    let resp = fixture
        .client
        .post(fixture.url("/v1/drones"))
        .bearer_auth(WRITER_TOKEN)
        .header("content-type", "application/json")
        .body(r#"{"title": "broken""#)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "body contains badly-formed JSON");

    let resp = fixture
        .client
        .post(fixture.url("/v1/drones"))
        .bearer_auth(WRITER_TOKEN)
        .json(&json!({ "title": "x", "colour": "red" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let resp = fixture
        .client
        .post(fixture.url("/v1/drones"))
        .bearer_auth(WRITER_TOKEN)
        .json(&json!({ "title": "x", "year": "nineteen" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_not_found() {
    let fixture = TestFixture::new().await;

    let (status, body) = fixture.get_json("/v1/drones/9999").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "the requested resource could not be found");

    let (status, _) = fixture.get_json("/v1/drones/not-a-number").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = fixture.get_json("/v1/drones/0").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = fixture.get_json("/v1/nothing-here").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn test_method_not_allowed() {
    let fixture = TestFixture::new().await;

    let resp = fixture
        .client
        .put(fixture.url("/v1/drones/1"))
        .bearer_auth(WRITER_TOKEN)
        .json(&json!({}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::METHOD_NOT_ALLOWED);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(
        body["error"],
        "the PUT method is not supported for this resource"
    );
}

#[tokio::test]
async fn test_partial_update_and_versioning() {
    let fixture = TestFixture::new().await;
    let drone = fixture
        .create(json!({
            "title": "Original",
            "year": 2020,
            "price": 1000,
            "categories": ["camera"]
        }))
        .await;
    let id = drone["id"].as_i64().unwrap();

    let resp = fixture
        .client
        .patch(fixture.url(&format!("/v1/drones/{}", id)))
        .bearer_auth(WRITER_TOKEN)
        .json(&json!({ "price": 2500, "expected_version": 1 }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["drone"]["title"], "Original");
    assert_eq!(body["drone"]["price"], "2500 tenge");
    assert_eq!(body["drone"]["version"], 2);

    // Without an expected version the update applies to the current one
    let resp = fixture
        .client
        .patch(fixture.url(&format!("/v1/drones/{}", id)))
        .bearer_auth(WRITER_TOKEN)
        .json(&json!({ "title": "Renamed" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["drone"]["version"], 3);

    // A stale version is a conflict and leaves the record alone
    let resp = fixture
        .client
        .patch(fixture.url(&format!("/v1/drones/{}", id)))
        .bearer_auth(WRITER_TOKEN)
        .json(&json!({ "title": "Lost update", "expected_version": 1 }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CONFLICT);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(
        body["error"],
        "unable to update the record due to an edit conflict, please try again"
    );

    let (_, fetched) = fixture.get_json(&format!("/v1/drones/{}", id)).await;
    assert_eq!(fetched["drone"]["title"], "Renamed");
    assert_eq!(fetched["drone"]["version"], 3);
}

#[tokio::test]
async fn test_update_validation_and_missing() {
    let fixture = TestFixture::new().await;
    let drone = fixture
        .create(json!({
            "title": "Valid",
            "year": 2020,
            "price": 10,
            "categories": ["a"]
        }))
        .await;
    let id = drone["id"].as_i64().unwrap();

    let resp = fixture
        .client
        .patch(fixture.url(&format!("/v1/drones/{}", id)))
        .bearer_auth(WRITER_TOKEN)
        .json(&json!({ "categories": ["a", "b", "c", "d", "e", "f"] }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(
        body["error"]["categories"],
        "must not contain more than 5 categories"
    );

    let resp = fixture
        .client
        .patch(fixture.url("/v1/drones/424242"))
        .bearer_auth(WRITER_TOKEN)
        .json(&json!({ "title": "Ghost" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_delete_twice() {
    let fixture = TestFixture::new().await;
    let drone = fixture
        .create(json!({
            "title": "Short lived",
            "year": 2021,
            "price": 10,
            "categories": ["a"]
        }))
        .await;
    let url = fixture.url(&format!("/v1/drones/{}", drone["id"]));

    let resp = fixture
        .client
        .delete(&url)
        .bearer_auth(WRITER_TOKEN)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["message"], "drone successfully deleted");

    let resp = fixture
        .client
        .delete(&url)
        .bearer_auth(WRITER_TOKEN)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_list_pagination_and_filters() {
    let fixture = TestFixture::new().await;

    let (status, body) = fixture.get_json("/v1/drones").await;
    assert_eq!(status, 200);
    assert_eq!(body["drones"], json!([]));
    assert_eq!(body["metadata"]["total_records"], 0);
    assert_eq!(body["metadata"]["last_page"], 0);
    assert_eq!(body["metadata"]["current_page"], 0);

    for (title, year, price, categories) in [
        ("Mavic Air", 2020, 900, vec!["camera", "foldable"]),
        ("Mavic Pro", 2016, 1200, vec!["camera"]),
        ("Racer X", 2022, 300, vec!["fpv"]),
        ("Survey One", 2019, 5000, vec!["camera", "mapping"]),
        ("Cargo Lift", 2023, 8000, vec!["delivery"]),
    ] {
        fixture
            .create(json!({
                "title": title,
                "year": year,
                "price": price,
                "categories": categories
            }))
            .await;
    }

    let (_, body) = fixture.get_json("/v1/drones?page=2&page_size=2").await;
    assert_eq!(body["drones"].as_array().unwrap().len(), 2);
    assert_eq!(body["drones"][0]["title"], "Racer X");
    assert_eq!(body["metadata"]["current_page"], 2);
    assert_eq!(body["metadata"]["page_size"], 2);
    assert_eq!(body["metadata"]["first_page"], 1);
    assert_eq!(body["metadata"]["last_page"], 3);
    assert_eq!(body["metadata"]["total_records"], 5);

    // Past the last page: no drones, but the totals still describe the catalog
    let (status, body) = fixture.get_json("/v1/drones?page=4&page_size=2").await;
    assert_eq!(status, 200);
    assert_eq!(body["drones"], json!([]));
    assert_eq!(body["metadata"]["current_page"], 4);
    assert_eq!(body["metadata"]["last_page"], 3);
    assert_eq!(body["metadata"]["total_records"], 5);

    let (_, body) = fixture.get_json("/v1/drones?title=mavic&sort=-year").await;
    let titles: Vec<&str> = body["drones"]
        .as_array()
        .unwrap()
        .iter()
        .map(|d| d["title"].as_str().unwrap())
        .collect();
    assert_eq!(titles, vec!["Mavic Air", "Mavic Pro"]);

    let (_, body) = fixture
        .get_json("/v1/drones?categories=camera,mapping")
        .await;
    assert_eq!(body["drones"].as_array().unwrap().len(), 1);
    assert_eq!(body["drones"][0]["title"], "Survey One");

    let (_, body) = fixture.get_json("/v1/drones?sort=-price&page_size=1").await;
    assert_eq!(body["drones"][0]["title"], "Cargo Lift");
    assert_eq!(body["metadata"]["last_page"], 5);
}

#[tokio::test]
async fn test_list_rejects_bad_parameters() {
    let fixture = TestFixture::new().await;

    let (status, body) = fixture
        .get_json("/v1/drones?page=0&page_size=500&sort=created_at")
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"]["page"], "must be greater than zero");
    assert_eq!(body["error"]["page_size"], "must be a maximum of 100");
    assert_eq!(body["error"]["sort"], "invalid sort value");

    let (status, body) = fixture.get_json("/v1/drones?page=two").await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"]["page"], "must be an integer value");
}

#[tokio::test]
async fn test_authentication_required() {
    let fixture = TestFixture::new().await;

    let resp = fixture
        .client
        .get(fixture.url("/v1/drones"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(
        body["error"],
        "you must be authenticated to access this resource"
    );
}

#[tokio::test]
async fn test_invalid_token() {
    let fixture = TestFixture::new().await;

    let resp = fixture
        .client
        .get(fixture.url("/v1/drones"))
        .bearer_auth("not-a-real-token")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(resp.headers().get("www-authenticate").unwrap(), "Bearer");

    let resp = fixture
        .client
        .get(fixture.url("/v1/drones"))
        .header("authorization", "Basic dXNlcjpwYXNz")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_reader_cannot_write() {
    let fixture = TestFixture::new().await;

    let resp = fixture
        .client
        .post(fixture.url("/v1/drones"))
        .bearer_auth(READER_TOKEN)
        .json(&json!({
            "title": "Forbidden",
            "year": 2020,
            "price": 1,
            "categories": ["a"]
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    let (status, _) = fixture.get_json("/v1/drones").await;
    assert_eq!(status, 200);
}

#[tokio::test]
async fn test_rate_limit() {
    let fixture = TestFixture::with_limiter(LimiterConfig {
        enabled: true,
        max_requests: 2,
        window: Duration::from_secs(60),
    })
    .await;

    for _ in 0..2 {
        let resp = fixture
            .client
            .get(fixture.url("/v1/healthcheck"))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
    }

    let resp = fixture
        .client
        .get(fixture.url("/v1/healthcheck"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "rate limit exceeded");
}

#[tokio::test]
async fn test_cors_allows_any_origin_by_default() {
    let fixture = TestFixture::new().await;

    let resp = fixture
        .client
        .get(fixture.url("/v1/healthcheck"))
        .header("origin", "https://shop.example.com")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(
        resp.headers().get("access-control-allow-origin").unwrap(),
        "*"
    );
}
