use crate::model::{AggregatedBucket, Aggregation, Reading, SensorType};
use chrono::{NaiveDateTime, Timelike};
use std::collections::BTreeMap;

/// Truncates a timestamp to the start of its minute, hour or calendar day.
///
/// Truncation operates on the stored wall-clock fields as-is; no timezone
/// conversion is applied before or after.
pub fn truncate(ts: NaiveDateTime, granularity: Aggregation) -> NaiveDateTime {
    let (hour, minute) = match granularity {
        Aggregation::Minute => (ts.hour(), ts.minute()),
        Aggregation::Hour => (ts.hour(), 0),
        Aggregation::Day => (0, 0),
    };
    ts.date()
        .and_hms_opt(hour, minute, 0)
        .expect("hour and minute taken from a valid timestamp")
}

#[derive(Debug, Default, Clone, Copy)]
struct FieldAcc {
    sum: f64,
    count: u32,
}

impl FieldAcc {
    fn push(&mut self, value: Option<f64>) {
        if let Some(value) = value {
            self.sum += value;
            self.count += 1;
        }
    }

    // Mean over the non-null values only; a field absent from every reading
    // in the bucket stays absent, it does not become zero.
    fn mean(&self) -> Option<f64> {
        if self.count == 0 {
            None
        } else {
            Some(self.sum / self.count as f64)
        }
    }
}

/// Groups readings by truncated timestamp and averages each sensor field.
///
/// Buckets are emitted in ascending bucket-start order and only for
/// truncated times that have at least one matching reading. When a sensor
/// filter is present, only that channel's average is populated.
pub fn aggregate(
    readings: &[Reading],
    granularity: Aggregation,
    sensor: Option<SensorType>,
) -> Vec<AggregatedBucket> {
    let mut groups: BTreeMap<NaiveDateTime, [FieldAcc; 4]> = BTreeMap::new();

    for reading in readings {
        let accs = groups.entry(truncate(reading.timestamp, granularity)).or_default();
        accs[0].push(reading.temperature);
        accs[1].push(reading.humidity);
        accs[2].push(reading.current);
        accs[3].push(reading.voltage);
    }

    groups
        .into_iter()
        .map(|(bucket_start, accs)| {
            let mut bucket = AggregatedBucket {
                timestamp: bucket_start,
                temperature: accs[0].mean(),
                humidity: accs[1].mean(),
                current: accs[2].mean(),
                voltage: accs[3].mean(),
            };
            if let Some(sensor) = sensor {
                let kept = match sensor {
                    SensorType::Temperature => bucket.temperature,
                    SensorType::Humidity => bucket.humidity,
                    SensorType::Current => bucket.current,
                    SensorType::Voltage => bucket.voltage,
                };
                bucket.temperature = None;
                bucket.humidity = None;
                bucket.current = None;
                bucket.voltage = None;
                match sensor {
                    SensorType::Temperature => bucket.temperature = kept,
                    SensorType::Humidity => bucket.humidity = kept,
                    SensorType::Current => bucket.current = kept,
                    SensorType::Voltage => bucket.voltage = kept,
                }
            }
            bucket
        })
        .collect()
}
