mod readings;

use chrono::Utc;
use rand::Rng;
use readings::ReadingPayload;
use reqwest::StatusCode;
use serde_json::{json, Value};
use std::env;
use std::time::Duration;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() {
    let api_url = env::var("API_URL").unwrap_or_else(|_| "http://localhost:8000".to_string());
    let rate_hz: f64 = env::var("RATE_HZ")
        .unwrap_or_else(|_| "10".to_string())
        .parse::<f64>()
        .unwrap_or(10.0)
        .clamp(1.0, 10.0);
    let num_servers: usize = env::var("SERVERS")
        .unwrap_or_else(|_| "1".to_string())
        .parse()
        .unwrap_or(1);
    let username = env::var("SIM_USERNAME").unwrap_or_else(|_| "admin".to_string());
    let password = env::var("SIM_PASSWORD").unwrap_or_else(|_| "admin".to_string());

    // Initialize logging
    tracing_subscriber::fmt::init();

    info!("Starting sensor simulator");
    info!("API: {}, Rate: {} Hz, Servers: {}", api_url, rate_hz, num_servers);

    let client = reqwest::Client::new();

    let token = match authenticate(&client, &api_url, &username, &password).await {
        Ok(token) => token,
        Err(e) => {
            error!("Authentication failed: {}", e);
            std::process::exit(1);
        }
    };

    let mut server_ulids = Vec::with_capacity(num_servers);
    for _ in 0..num_servers {
        let name = format!("Dolly{}", rand::thread_rng().gen_range(1000..10000));
        match register_server(&client, &api_url, &token, &name).await {
            Ok(ulid) => {
                info!("Server {} registered with id {}", name, ulid);
                server_ulids.push(ulid);
            }
            Err(e) => warn!("Failed to register server {}: {}", name, e),
        }
    }

    if server_ulids.is_empty() {
        error!("No servers registered, nothing to send");
        std::process::exit(1);
    }

    let delay = Duration::from_secs_f64(1.0 / rate_hz);
    let mut ticker = tokio::time::interval(delay);
    let mut sent = 0u64;
    let mut rejected = 0u64;

    info!("Sending one reading per server every {:?}", delay);

    loop {
        ticker.tick().await;

        for server_ulid in &server_ulids {
            let payload = generate_reading(&mut rand::thread_rng(), server_ulid.clone());

            let response = client
                .post(format!("{}/data", api_url))
                .header("X-Device-ID", server_ulid)
                .json(&payload)
                .send()
                .await;

            match response {
                Ok(response) if response.status() == StatusCode::CREATED => {
                    sent += 1;
                }
                Ok(response) if response.status() == StatusCode::TOO_MANY_REQUESTS => {
                    rejected += 1;
                    warn!("Rate limited for server {}", server_ulid);
                }
                Ok(response) => {
                    warn!("Submission rejected with status {}", response.status());
                }
                Err(e) => {
                    warn!("Failed to send reading: {}", e);
                }
            }
        }

        if sent % 1000 == 0 && sent > 0 {
            info!("Sent {} readings ({} rate limited)", sent, rejected);
        }
    }
}

async fn authenticate(
    client: &reqwest::Client,
    api_url: &str,
    username: &str,
    password: &str,
) -> Result<String, reqwest::Error> {
    let credentials = json!({"username": username, "password": password});

    // Registration may 409 on reruns; login decides.
    let response = client
        .post(format!("{}/auth/register", api_url))
        .json(&credentials)
        .send()
        .await?;
    if response.status() == StatusCode::CONFLICT {
        info!("User {} already registered", username);
    }

    let body: Value = client
        .post(format!("{}/auth/login", api_url))
        .json(&credentials)
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;

    Ok(body["access_token"].as_str().unwrap_or_default().to_string())
}

async fn register_server(
    client: &reqwest::Client,
    api_url: &str,
    token: &str,
    name: &str,
) -> Result<String, reqwest::Error> {
    let body: Value = client
        .post(format!("{}/servers", api_url))
        .bearer_auth(token)
        .json(&json!({"server_name": name}))
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;

    Ok(body["server_ulid"].as_str().unwrap_or_default().to_string())
}

fn generate_reading(rng: &mut impl Rng, server_ulid: String) -> ReadingPayload {
    let temperature = if rng.gen_bool(0.05) {
        rng.gen_range(-50.0..100.0) // 5% outliers
    } else {
        rng.gen_range(15.0..35.0) // Normal range
    };

    // Optional channels drop out now and then, like flaky sensors do.
    let humidity = if rng.gen_bool(0.9) {
        Some(rng.gen_range(30.0..80.0))
    } else {
        None
    };

    let voltage = if rng.gen_bool(0.9) {
        Some(rng.gen_range(110.0..240.0))
    } else {
        None
    };

    let current = if rng.gen_bool(0.9) {
        Some(rng.gen_range(0.1..16.0))
    } else {
        None
    };

    ReadingPayload {
        server_ulid,
        timestamp: Utc::now().naive_utc(),
        temperature: Some(temperature),
        humidity,
        voltage,
        current,
    }
}
