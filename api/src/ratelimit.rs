use crate::errors::{Error, Result};
use crate::metrics::RATE_LIMITED_TOTAL;
use crate::rest::AppState;
use axum::{
    extract::{ConnectInfo, Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::warn;

const UNKNOWN_CLIENT: &str = "unknown";

/// Sliding-window admission controller for the ingestion path.
///
/// Each client key maps to the timestamps of its admitted requests within
/// the trailing window. A request is admitted while the window count,
/// including the request under evaluation, stays within `max_requests`;
/// rejected attempts are not recorded and do not count against future
/// admissions. With the default 12 requests per 1.2 s window this leaves
/// 20% headroom over the nominal 10 Hz device cadence.
pub struct RateLimiter {
    max_requests: usize,
    window: Duration,
    disabled: bool,
    // Single lock over the table; per-client admission must be atomic under
    // concurrent bursts or the window count drifts.
    //
    // TODO: idle client keys are never evicted; add a sweep if the lifetime
    // client population stops being small.
    history: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl RateLimiter {
    pub fn new(max_requests: usize, window: Duration, disabled: bool) -> Self {
        Self {
            max_requests,
            window,
            disabled,
            history: Mutex::new(HashMap::new()),
        }
    }

    /// Decides admission for one request from `client_id` at instant `now`.
    pub fn admit(&self, client_id: &str, now: Instant) -> bool {
        if self.disabled {
            return true;
        }

        let mut history = self
            .history
            .lock()
            .expect("rate limiter lock poisoned");
        let timestamps = history.entry(client_id.to_string()).or_default();

        while let Some(&oldest) = timestamps.front() {
            if now.duration_since(oldest) > self.window {
                timestamps.pop_front();
            } else {
                break;
            }
        }

        if timestamps.len() + 1 > self.max_requests {
            return false;
        }

        timestamps.push_back(now);
        true
    }
}

/// Resolves the client identity for admission control.
///
/// Precedence: explicit device header, first forwarded-for entry, peer
/// address, fallback constant. Spoofable by header manipulation; good enough
/// for abuse mitigation, never for authorization.
pub fn client_key(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    if let Some(device_id) = headers.get("x-device-id").and_then(|v| v.to_str().ok()) {
        if !device_id.is_empty() {
            return device_id.to_string();
        }
    }

    if let Some(forwarded) = headers.get("x-forwarded-for").and_then(|v| v.to_str().ok()) {
        if let Some(first) = forwarded.split(',').next() {
            let first = first.trim();
            if !first.is_empty() {
                return first.to_string();
            }
        }
    }

    peer.map(|addr| addr.ip().to_string())
        .unwrap_or_else(|| UNKNOWN_CLIENT.to_string())
}

/// Axum layer guarding the ingestion route; rejected requests never reach
/// the handler, so a throttled submission has no side effect on stored data.
pub async fn admission_layer(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response> {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0);
    let client = client_key(request.headers(), peer);

    if state.limiter.admit(&client, Instant::now()) {
        Ok(next.run(request).await)
    } else {
        RATE_LIMITED_TOTAL.inc();
        warn!("Rate limit exceeded for client {}", client);
        Err(Error::RateLimited(client))
    }
}
