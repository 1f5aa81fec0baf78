use crate::errors::{Error, Result};
use crate::metrics::DB_FAILURES_TOTAL;
use crate::model::{QueryFilter, Reading, Server, ServerLastSeen, User};
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use tracing::info;
use ulid::Ulid;

// Postgres SQLSTATE codes translated into the error taxonomy.
const UNIQUE_VIOLATION: &str = "23505";
const FOREIGN_KEY_VIOLATION: &str = "23503";
const CHECK_VIOLATION: &str = "23514";

pub async fn make_pool(database_url: &str) -> Result<PgPool> {
    info!("Connecting to database...");
    let pool = PgPoolOptions::new()
        .max_connections(20)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url)
        .await?;

    info!("Database connection established");
    info!("Running database migrations...");
    sqlx::migrate!("./migrations").run(&pool).await?;
    info!("Migrations completed");

    Ok(pool)
}

fn pg_code(err: &sqlx::Error) -> Option<String> {
    if let sqlx::Error::Database(db_err) = err {
        db_err.code().map(|code| code.into_owned())
    } else {
        None
    }
}

fn track_failure(err: sqlx::Error) -> Error {
    DB_FAILURES_TOTAL.inc();
    Error::Database(err)
}

pub async fn insert_user(pool: &PgPool, username: &str, password_hash: &str) -> Result<User> {
    sqlx::query_as::<_, User>(
        "INSERT INTO users (username, password) VALUES ($1, $2)
         RETURNING id, username, password",
    )
    .bind(username)
    .bind(password_hash)
    .fetch_one(pool)
    .await
    .map_err(|e| match pg_code(&e).as_deref() {
        Some(UNIQUE_VIOLATION) => Error::Conflict("User already registered".to_string()),
        _ => track_failure(e),
    })
}

pub async fn find_user_by_username(pool: &PgPool, username: &str) -> Result<Option<User>> {
    sqlx::query_as::<_, User>("SELECT id, username, password FROM users WHERE username = $1")
        .bind(username)
        .fetch_optional(pool)
        .await
        .map_err(track_failure)
}

/// Registers a server for `created_by`, minting its ULID at insert time.
/// Name uniqueness rides on the unique constraint, so concurrent writers
/// cannot race it.
pub async fn insert_server(pool: &PgPool, server_name: &str, created_by: i32) -> Result<Server> {
    let server_ulid = Ulid::new().to_string();

    sqlx::query_as::<_, Server>(
        "INSERT INTO server (id, server_name, created_by) VALUES ($1, $2, $3)
         RETURNING id AS server_ulid, server_name, created_by",
    )
    .bind(&server_ulid)
    .bind(server_name)
    .bind(created_by)
    .fetch_one(pool)
    .await
    .map_err(|e| match pg_code(&e).as_deref() {
        Some(UNIQUE_VIOLATION) => Error::Conflict("Server already exists".to_string()),
        _ => track_failure(e),
    })
}

/// Appends one validated reading. The write is all-or-nothing: referential
/// and check failures roll the row back and surface as taxonomy errors.
pub async fn insert_reading(pool: &PgPool, reading: &Reading) -> Result<Reading> {
    sqlx::query_as::<_, Reading>(
        "INSERT INTO reading (server_ulid, ts, temperature, humidity, voltage, current)
         VALUES ($1, $2, $3, $4, $5, $6)
         RETURNING server_ulid, ts AS timestamp, temperature, humidity, voltage, current",
    )
    .bind(&reading.server_ulid)
    .bind(reading.timestamp)
    .bind(reading.temperature)
    .bind(reading.humidity)
    .bind(reading.voltage)
    .bind(reading.current)
    .fetch_one(pool)
    .await
    .map_err(|e| match pg_code(&e).as_deref() {
        Some(FOREIGN_KEY_VIOLATION) => Error::ServerNotFound(reading.server_ulid.clone()),
        Some(CHECK_VIOLATION) => Error::Validation(
            "Reading violates sensor field constraints".to_string(),
        ),
        _ => track_failure(e),
    })
}

/// Fetches every reading matching the filter's predicates, ordered by
/// timestamp. The time range is inclusive on both ends.
pub async fn fetch_readings(pool: &PgPool, filter: &QueryFilter) -> Result<Vec<Reading>> {
    let mut conditions = Vec::new();
    let mut bind_count = 0;

    if filter.server_ulid.is_some() {
        bind_count += 1;
        conditions.push(format!("server_ulid = ${}", bind_count));
    }
    if filter.start_time.is_some() {
        bind_count += 1;
        conditions.push(format!("ts >= ${}", bind_count));
    }
    if filter.end_time.is_some() {
        bind_count += 1;
        conditions.push(format!("ts <= ${}", bind_count));
    }

    let where_clause = if conditions.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", conditions.join(" AND "))
    };

    let query = format!(
        "SELECT server_ulid, ts AS timestamp, temperature, humidity, voltage, current
         FROM reading
         {}
         ORDER BY ts",
        where_clause
    );

    let mut query_builder = sqlx::query_as::<_, Reading>(&query);
    if let Some(server_ulid) = &filter.server_ulid {
        query_builder = query_builder.bind(server_ulid);
    }
    if let Some(start) = filter.start_time {
        query_builder = query_builder.bind(start);
    }
    if let Some(end) = filter.end_time {
        query_builder = query_builder.bind(end);
    }

    query_builder.fetch_all(pool).await.map_err(track_failure)
}

/// Latest reading timestamp for every server owned by `created_by`. The
/// LEFT JOIN keeps zero-reading servers in the result with a null last_seen.
pub async fn last_seen_by_owner(pool: &PgPool, created_by: i32) -> Result<Vec<ServerLastSeen>> {
    sqlx::query_as::<_, ServerLastSeen>(
        "SELECT s.id AS server_ulid, s.server_name, MAX(r.ts) AS last_seen
         FROM server s
         LEFT JOIN reading r ON r.server_ulid = s.id
         WHERE s.created_by = $1
         GROUP BY s.id, s.server_name
         ORDER BY s.id",
    )
    .bind(created_by)
    .fetch_all(pool)
    .await
    .map_err(track_failure)
}

/// Latest reading timestamp for one server; `None` when the server itself
/// does not exist.
pub async fn last_seen_for_server(
    pool: &PgPool,
    server_ulid: &str,
) -> Result<Option<ServerLastSeen>> {
    sqlx::query_as::<_, ServerLastSeen>(
        "SELECT s.id AS server_ulid, s.server_name, MAX(r.ts) AS last_seen
         FROM server s
         LEFT JOIN reading r ON r.server_ulid = s.id
         WHERE s.id = $1
         GROUP BY s.id, s.server_name",
    )
    .bind(server_ulid)
    .fetch_optional(pool)
    .await
    .map_err(track_failure)
}
