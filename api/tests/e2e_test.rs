use rand::Rng;
use reqwest::StatusCode;
use serde_json::{json, Value};

// End-to-end tests against a running instance (and its Postgres database).
// Start the API first, then run with:
//
//   API_URL=http://localhost:8000 cargo test -p api -- --ignored
//
// The admission test requires the rate limiter to be enabled
// (DISABLE_RATE_LIMIT unset) with the default 12-per-1.2s budget.

fn api_url() -> String {
    std::env::var("API_URL").unwrap_or_else(|_| "http://localhost:8000".to_string())
}

struct TestClient {
    http: reqwest::Client,
    base: String,
    token: String,
}

impl TestClient {
    async fn authenticated() -> TestClient {
        let http = reqwest::Client::new();
        let base = api_url();
        let username = format!("e2e-user-{}", rand::thread_rng().gen::<u32>());

        let credentials = json!({"username": username, "password": "securepassword123"});
        let response = http
            .post(format!("{}/auth/register", base))
            .json(&credentials)
            .send()
            .await
            .expect("register request failed");
        assert_eq!(response.status(), StatusCode::CREATED);

        let response = http
            .post(format!("{}/auth/login", base))
            .json(&credentials)
            .send()
            .await
            .expect("login request failed");
        assert_eq!(response.status(), StatusCode::OK);

        let body: Value = response.json().await.expect("login body");
        let token = body["access_token"].as_str().expect("token").to_string();

        TestClient { http, base, token }
    }

    async fn register_server(&self, name: &str) -> reqwest::Response {
        self.http
            .post(format!("{}/servers", self.base))
            .bearer_auth(&self.token)
            .json(&json!({"server_name": name}))
            .send()
            .await
            .expect("server registration failed")
    }

    async fn post_reading(&self, payload: &Value) -> reqwest::Response {
        self.http
            .post(format!("{}/data", self.base))
            .json(payload)
            .send()
            .await
            .expect("reading submission failed")
    }

    async fn get_readings(&self, params: &[(&str, &str)]) -> reqwest::Response {
        self.http
            .get(format!("{}/data", self.base))
            .bearer_auth(&self.token)
            .query(params)
            .send()
            .await
            .expect("reading query failed")
    }

    fn fresh_name(&self, prefix: &str) -> String {
        format!("{} {}", prefix, rand::thread_rng().gen::<u32>())
    }
}

#[tokio::test]
#[ignore]
async fn test_reading_round_trip_and_validation() {
    let client = TestClient::authenticated().await;

    let response = client.register_server(&client.fresh_name("Dolly")).await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let server: Value = response.json().await.unwrap();
    let server_ulid = server["server_ulid"].as_str().unwrap().to_string();
    assert_eq!(server_ulid.len(), 26);

    // Round trip: every submitted field comes back, timestamp naive.
    let response = client
        .post_reading(&json!({
            "server_ulid": server_ulid,
            "timestamp": "2025-10-01T12:00:00Z",
            "temperature": 25.5,
            "humidity": 45.2,
            "voltage": 120.1,
            "current": 8.7
        }))
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = client
        .get_readings(&[("server_ulid", server_ulid.as_str())])
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let readings: Vec<Value> = response.json().await.unwrap();
    assert_eq!(readings.len(), 1);
    assert_eq!(readings[0]["server_ulid"], server_ulid);
    assert_eq!(readings[0]["timestamp"], "2025-10-01T12:00:00");
    assert_eq!(readings[0]["temperature"], 25.5);
    assert_eq!(readings[0]["humidity"], 45.2);
    assert_eq!(readings[0]["voltage"], 120.1);
    assert_eq!(readings[0]["current"], 8.7);

    // All sensor fields absent is rejected before any write.
    let response = client
        .post_reading(&json!({
            "server_ulid": server_ulid,
            "timestamp": "2025-10-01T12:00:01Z"
        }))
        .await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    // Humidity outside [0, 100] is rejected.
    let response = client
        .post_reading(&json!({
            "server_ulid": server_ulid,
            "timestamp": "2025-10-01T12:00:01Z",
            "humidity": 150.0
        }))
        .await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    // Unknown server is a referential failure, not a validation one.
    let response = client
        .post_reading(&json!({
            "server_ulid": "01HGYX7TBDFRX8HRJC5RF7Z3GY",
            "timestamp": "2025-10-01T12:00:00Z",
            "temperature": 20.0
        }))
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    // Inverted time range is rejected.
    let response = client
        .get_readings(&[
            ("start_time", "2025-10-01T12:00:00Z"),
            ("end_time", "2025-10-01T11:00:00Z"),
        ])
        .await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    // Queries without a token are rejected before business logic.
    let response = reqwest::Client::new()
        .get(format!("{}/data", api_url()))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
#[ignore]
async fn test_aggregation_and_sensor_projection() {
    let client = TestClient::authenticated().await;

    let response = client.register_server(&client.fresh_name("Dolly")).await;
    let server: Value = response.json().await.unwrap();
    let server_ulid = server["server_ulid"].as_str().unwrap().to_string();

    for (ts, temperature, humidity) in [
        ("2025-10-01T13:00:00Z", 25.0, 70.0),
        ("2025-10-01T14:00:00Z", 26.5, 71.0),
    ] {
        let response = client
            .post_reading(&json!({
                "server_ulid": server_ulid,
                "timestamp": ts,
                "temperature": temperature,
                "humidity": humidity
            }))
            .await;
        assert_eq!(response.status(), StatusCode::CREATED);
    }

    let response = client
        .get_readings(&[("server_ulid", server_ulid.as_str()), ("aggregation", "day")])
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let buckets: Vec<Value> = response.json().await.unwrap();
    assert_eq!(buckets.len(), 1);
    assert_eq!(buckets[0]["timestamp"], "2025-10-01T00:00:00");
    assert_eq!(buckets[0]["temperature"], 25.75);
    assert_eq!(buckets[0]["humidity"], 70.5);

    // Hour buckets keep the two readings apart.
    let response = client
        .get_readings(&[("server_ulid", server_ulid.as_str()), ("aggregation", "hour")])
        .await;
    let buckets: Vec<Value> = response.json().await.unwrap();
    assert_eq!(buckets.len(), 2);

    // A sensor filter narrows both raw and aggregated shapes to one field.
    let response = client
        .get_readings(&[
            ("server_ulid", server_ulid.as_str()),
            ("sensor_type", "temperature"),
        ])
        .await;
    let readings: Vec<Value> = response.json().await.unwrap();
    assert!(readings.iter().all(|r| r.get("humidity").is_none()));

    let response = client
        .get_readings(&[("server_ulid", server_ulid.as_str()), ("sensor_type", "wind")])
        .await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
#[ignore]
async fn test_health_and_ownership_scoping() {
    let client = TestClient::authenticated().await;

    let response = client.register_server(&client.fresh_name("Active")).await;
    let server: Value = response.json().await.unwrap();
    let active_ulid = server["server_ulid"].as_str().unwrap().to_string();

    let response = client.register_server(&client.fresh_name("Silent")).await;
    let server: Value = response.json().await.unwrap();
    let silent_ulid = server["server_ulid"].as_str().unwrap().to_string();

    let response = client
        .post_reading(&json!({
            "server_ulid": active_ulid,
            "timestamp": chrono::Utc::now().naive_utc().to_string().replace(' ', "T"),
            "temperature": 25.5
        }))
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = client
        .http
        .get(format!("{}/health/{}", client.base, active_ulid))
        .bearer_auth(&client.token)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let status: Value = response.json().await.unwrap();
    assert_eq!(status["status"], "online");

    // A server with zero readings reports offline.
    let response = client
        .http
        .get(format!("{}/health/{}", client.base, silent_ulid))
        .bearer_auth(&client.token)
        .send()
        .await
        .unwrap();
    let status: Value = response.json().await.unwrap();
    assert_eq!(status["status"], "offline");

    // Unknown server id is NotFound.
    let response = client
        .http
        .get(format!("{}/health/01HGYX7TBDFRX8HRJC5RF7Z3GY", client.base))
        .bearer_auth(&client.token)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    // /health/all is scoped to the acting user's servers.
    let other = TestClient::authenticated().await;
    let response = other.register_server(&other.fresh_name("Foreign")).await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = client
        .http
        .get(format!("{}/health/all", client.base))
        .bearer_auth(&client.token)
        .send()
        .await
        .unwrap();
    let statuses: Vec<Value> = response.json().await.unwrap();
    assert_eq!(statuses.len(), 2);
    let ulids: Vec<&str> = statuses
        .iter()
        .map(|s| s["server_ulid"].as_str().unwrap())
        .collect();
    assert!(ulids.contains(&active_ulid.as_str()));
    assert!(ulids.contains(&silent_ulid.as_str()));

    // Duplicate server names conflict across users too; uniqueness is global.
    let name = client.fresh_name("Shared");
    assert_eq!(client.register_server(&name).await.status(), StatusCode::CREATED);
    assert_eq!(other.register_server(&name).await.status(), StatusCode::CONFLICT);
}

#[tokio::test]
#[ignore]
async fn test_burst_admission_control() {
    let client = TestClient::authenticated().await;

    let response = client.register_server(&client.fresh_name("Bursty")).await;
    let server: Value = response.json().await.unwrap();
    let server_ulid = server["server_ulid"].as_str().unwrap().to_string();

    let device_id = format!("burst-dev-{}", rand::thread_rng().gen::<u32>());
    let mut rejected = 0;

    // 13 back-to-back submissions from one client identity: the budget is
    // 12 per 1.2 s, so at least one must be turned away.
    for i in 0..13 {
        let response = client
            .http
            .post(format!("{}/data", client.base))
            .header("X-Device-ID", &device_id)
            .json(&json!({
                "server_ulid": server_ulid,
                "timestamp": format!("2025-10-01T12:00:{:02}Z", i),
                "temperature": 20.0
            }))
            .send()
            .await
            .unwrap();

        match response.status() {
            StatusCode::CREATED => {}
            StatusCode::TOO_MANY_REQUESTS => rejected += 1,
            other => panic!("unexpected status {}", other),
        }
    }
    assert!(rejected >= 1, "burst should trip admission control");

    // A different client identity is unaffected by the burst.
    let response = client
        .http
        .post(format!("{}/data", client.base))
        .header("X-Device-ID", format!("{}-other", device_id))
        .json(&json!({
            "server_ulid": server_ulid,
            "timestamp": "2025-10-01T12:01:00Z",
            "temperature": 20.0
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
}
