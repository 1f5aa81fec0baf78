use crate::errors::{Error, Result};
use crate::model::{QueryFilter, Reading, ReadingQueryParams, ReadingSubmission};
use chrono::{DateTime, NaiveDateTime};

const HUMIDITY_MIN: f64 = 0.0;
const HUMIDITY_MAX: f64 = 100.0;

/// Parses an ISO-8601 instant into a naive timestamp.
///
/// An explicit offset (including `Z`) is stripped without conversion: the
/// wall-clock fields are kept exactly as sent. `2025-10-01T12:00:00-03:00`
/// and `2025-10-01T12:00:00Z` both become `2025-10-01T12:00:00`.
pub fn parse_timestamp(value: &str) -> Result<NaiveDateTime> {
    if let Ok(instant) = DateTime::parse_from_rfc3339(value) {
        return Ok(instant.naive_local());
    }

    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f").map_err(|_| {
        Error::Validation(format!(
            "timestamp must be in a valid ISO8601 format: {}",
            value
        ))
    })
}

/// Validates an ingestion payload and converts it into a storable reading.
pub fn parse_submission(submission: &ReadingSubmission) -> Result<Reading> {
    if submission.temperature.is_none()
        && submission.humidity.is_none()
        && submission.voltage.is_none()
        && submission.current.is_none()
    {
        return Err(Error::Validation(
            "At least one reading value must be provided".to_string(),
        ));
    }

    if let Some(humidity) = submission.humidity {
        if !(HUMIDITY_MIN..=HUMIDITY_MAX).contains(&humidity) {
            return Err(Error::Validation(format!(
                "humidity {} out of range [{}, {}]",
                humidity, HUMIDITY_MIN, HUMIDITY_MAX
            )));
        }
    }

    if submission.server_ulid.is_empty() {
        return Err(Error::Validation("server_ulid cannot be empty".to_string()));
    }

    Ok(Reading {
        server_ulid: submission.server_ulid.clone(),
        timestamp: parse_timestamp(&submission.timestamp)?,
        temperature: submission.temperature,
        humidity: submission.humidity,
        voltage: submission.voltage,
        current: submission.current,
    })
}

/// Validates raw query parameters into a typed filter.
pub fn parse_filter(params: ReadingQueryParams) -> Result<QueryFilter> {
    let sensor_type = params
        .sensor_type
        .as_deref()
        .map(str::parse)
        .transpose()
        .map_err(Error::Validation)?;

    let aggregation = params
        .aggregation
        .as_deref()
        .map(str::parse)
        .transpose()
        .map_err(Error::Validation)?;

    let start_time = params
        .start_time
        .as_deref()
        .map(parse_timestamp)
        .transpose()?;
    let end_time = params.end_time.as_deref().map(parse_timestamp).transpose()?;

    if let (Some(start), Some(end)) = (start_time, end_time) {
        if start > end {
            return Err(Error::Validation(
                "Start time cannot be after end time".to_string(),
            ));
        }
    }

    Ok(QueryFilter {
        server_ulid: params.server_ulid,
        sensor_type,
        aggregation,
        start_time,
        end_time,
    })
}
