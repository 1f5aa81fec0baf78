use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Sensor channels a server can report on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SensorType {
    Temperature,
    Humidity,
    Current,
    Voltage,
}

impl FromStr for SensorType {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "temperature" => Ok(SensorType::Temperature),
            "humidity" => Ok(SensorType::Humidity),
            "current" => Ok(SensorType::Current),
            "voltage" => Ok(SensorType::Voltage),
            other => Err(format!("Invalid sensor type: {}", other)),
        }
    }
}

/// Granularity for time-bucketed averaging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Aggregation {
    Minute,
    Hour,
    Day,
}

impl FromStr for Aggregation {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "minute" => Ok(Aggregation::Minute),
            "hour" => Ok(Aggregation::Hour),
            "day" => Ok(Aggregation::Day),
            other => Err(format!("Invalid aggregation type: {}", other)),
        }
    }
}

/// One stored sample of up to four sensor fields from a server.
///
/// Timestamps are timezone-naive: any offset on the submitted instant is
/// stripped without conversion before the reading is stored.
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct Reading {
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

impl Reading {
    /// Keep only the requested sensor channel, blanking the other three.
    pub fn project(mut self, sensor: Option<SensorType>) -> Reading {
        if let Some(sensor) = sensor {
            let kept = self.value_of(sensor);
            self.temperature = None;
            self.humidity = None;
            self.voltage = None;
            self.current = None;
            self.set_value_of(sensor, kept);
        }
        self
    }

    pub fn value_of(&self, sensor: SensorType) -> Option<f64> {
        match sensor {
            SensorType::Temperature => self.temperature,
            SensorType::Humidity => self.humidity,
            SensorType::Current => self.current,
            SensorType::Voltage => self.voltage,
        }
    }

    fn set_value_of(&mut self, sensor: SensorType, value: Option<f64>) {
        match sensor {
            SensorType::Temperature => self.temperature = value,
            SensorType::Humidity => self.humidity = value,
            SensorType::Current => self.current = value,
            SensorType::Voltage => self.voltage = value,
        }
    }
}

/// Ingestion payload as it arrives on the wire. The timestamp stays a raw
/// string here so parse failures surface as validation errors, not as
/// framework-level deserialization rejections.
#[derive(Debug, Clone, Deserialize)]
pub struct ReadingSubmission {
    pub server_ulid: String,
    pub timestamp: String,
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub voltage: Option<f64>,
    pub current: Option<f64>,
}

/// Raw query parameters for GET /data, validated into a [`QueryFilter`].
#[derive(Debug, Default, Deserialize)]
pub struct ReadingQueryParams {
    pub server_ulid: Option<String>,
    pub sensor_type: Option<String>,
    pub aggregation: Option<String>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
}

/// Validated filter criteria consumed by the store, the aggregation engine
/// and the response projection.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryFilter {
    pub server_ulid: Option<String>,
    pub sensor_type: Option<SensorType>,
    pub aggregation: Option<Aggregation>,
    pub start_time: Option<NaiveDateTime>,
    pub end_time: Option<NaiveDateTime>,
}

/// A registered edge device identity, owned by the user that created it.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Server {
    pub server_ulid: String,
    pub server_name: String,
    #[serde(skip_serializing)]
    pub created_by: i32,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct User {
    pub id: i32,
    pub username: String,
    pub password: String,
}

/// Per-server latest reading timestamp; `None` when no reading was ever stored.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ServerLastSeen {
    pub server_ulid: String,
    pub server_name: String,
    pub last_seen: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Online,
    Offline,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Online => write!(f, "online"),
            Status::Offline => write!(f, "offline"),
        }
    }
}

/// Derived health of one server; recomputed on every query, never stored.
#[derive(Debug, Clone, Serialize)]
pub struct HealthStatus {
    pub server_ulid: String,
    pub server_name: String,
    pub status: Status,
}

/// One time bucket produced by the aggregation engine. A field stays absent
/// when every reading in the bucket had it absent.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregatedBucket {
    pub timestamp: NaiveDateTime,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub humidity: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voltage: Option<f64>,
}

/// Query result shape, decided once when the filter is evaluated: raw rows
/// or aggregated buckets, never inferred downstream.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ReadingView {
    Raw(Reading),
    Bucket(AggregatedBucket),
}

/// REST response wrapper for login.
#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
}

#[derive(Debug, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct RegisterServer {
    pub server_name: String,
}
