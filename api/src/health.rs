use crate::model::{HealthStatus, ServerLastSeen, Status};
use chrono::{Duration, NaiveDateTime};

/// A server whose latest reading is older than this is reported offline.
pub const STALENESS_WINDOW_SECS: i64 = 10;

/// Classifies one server from its latest reading timestamp.
///
/// `now` is the evaluation instant taken at query time; a server with no
/// readings at all is always offline.
pub fn classify(last_seen: Option<NaiveDateTime>, now: NaiveDateTime) -> Status {
    match last_seen {
        Some(last_seen)
            if now.signed_duration_since(last_seen)
                <= Duration::seconds(STALENESS_WINDOW_SECS) =>
        {
            Status::Online
        }
        _ => Status::Offline,
    }
}

/// Turns last-seen rows into health statuses, evaluated against one shared
/// `now` so a single response is internally consistent.
pub fn evaluate(rows: Vec<ServerLastSeen>, now: NaiveDateTime) -> Vec<HealthStatus> {
    rows.into_iter()
        .map(|row| HealthStatus {
            status: classify(row.last_seen, now),
            server_ulid: row.server_ulid,
            server_name: row.server_name,
        })
        .collect()
}
