use chrono::NaiveDateTime;
use serde::Serialize;

/// One submission payload for POST /data. Absent fields are omitted from
/// the JSON body entirely.
#[derive(Debug, Clone, Serialize)]
pub struct ReadingPayload {
    pub server_ulid: String,
    pub timestamp: NaiveDateTime,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub humidity: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voltage: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current: Option<f64>,
}
