use crate::aggregate;
use crate::auth::{self, AuthConfig, CurrentUser};
use crate::db;
use crate::errors::{Error, Result};
use crate::health;
use crate::metrics::{
    INVALID_READINGS_TOTAL, INGEST_LATENCY_SECONDS, QUERIES_TOTAL, READINGS_STORED_TOTAL,
    READINGS_TOTAL,
};
use crate::model::{
    HealthStatus, Reading, ReadingQueryParams, ReadingSubmission, ReadingView, RegisterServer,
    Server,
};
use crate::ratelimit::{admission_layer, RateLimiter};
use crate::validate;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    middleware,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Instant;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub limiter: Arc<RateLimiter>,
    pub auth: Arc<AuthConfig>,
}

pub fn create_router(state: AppState) -> Router {
    // Admission control guards the ingestion path only.
    Router::new()
        .route("/data", get(get_readings))
        .route(
            "/data",
            post(submit_reading).layer(middleware::from_fn_with_state(
                state.clone(),
                admission_layer,
            )),
        )
        .route("/servers", post(post_server))
        .route("/health/all", get(get_health_all))
        .route("/health/:server_id", get(get_server_health))
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .with_state(state)
}

async fn submit_reading(
    State(state): State<AppState>,
    Json(submission): Json<ReadingSubmission>,
) -> Result<(StatusCode, Json<Reading>)> {
    READINGS_TOTAL.inc();
    let start = Instant::now();

    let reading = validate::parse_submission(&submission).map_err(|e| {
        INVALID_READINGS_TOTAL.inc();
        e
    })?;

    let stored = db::insert_reading(&state.pool, &reading).await?;

    READINGS_STORED_TOTAL.inc();
    INGEST_LATENCY_SECONDS.observe(start.elapsed().as_secs_f64());

    Ok((StatusCode::CREATED, Json(stored)))
}

async fn get_readings(
    _user: CurrentUser,
    State(state): State<AppState>,
    Query(params): Query<ReadingQueryParams>,
) -> Result<Json<Vec<ReadingView>>> {
    QUERIES_TOTAL.inc();

    let filter = validate::parse_filter(params)?;
    let readings = db::fetch_readings(&state.pool, &filter).await?;

    // Raw rows or aggregated buckets, decided here once.
    let views = match filter.aggregation {
        Some(granularity) => aggregate::aggregate(&readings, granularity, filter.sensor_type)
            .into_iter()
            .map(ReadingView::Bucket)
            .collect(),
        None => readings
            .into_iter()
            .map(|reading| ReadingView::Raw(reading.project(filter.sensor_type)))
            .collect(),
    };

    Ok(Json(views))
}

async fn post_server(
    user: CurrentUser,
    State(state): State<AppState>,
    Json(payload): Json<RegisterServer>,
) -> Result<(StatusCode, Json<Server>)> {
    if payload.server_name.trim().is_empty() {
        return Err(Error::Validation(
            "server_name cannot be empty".to_string(),
        ));
    }

    let server = db::insert_server(&state.pool, &payload.server_name, user.0.id).await?;

    Ok((StatusCode::CREATED, Json(server)))
}

async fn get_health_all(
    user: CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<Vec<HealthStatus>>> {
    let rows = db::last_seen_by_owner(&state.pool, user.0.id).await?;
    let now = Utc::now().naive_utc();

    Ok(Json(health::evaluate(rows, now)))
}

async fn get_server_health(
    _user: CurrentUser,
    State(state): State<AppState>,
    Path(server_id): Path<String>,
) -> Result<Json<HealthStatus>> {
    let row = db::last_seen_for_server(&state.pool, &server_id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Server with id {}", server_id)))?;

    let now = Utc::now().naive_utc();
    Ok(Json(HealthStatus {
        status: health::classify(row.last_seen, now),
        server_ulid: row.server_ulid,
        server_name: row.server_name,
    }))
}
