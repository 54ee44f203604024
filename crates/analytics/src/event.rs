// Copyright (C) 2025-present The Minutely Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//    http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or
// implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Data model shared by the input, the aggregation engine and the output.
//!
//! An [`Event`] is one JSON line of the input file:
//! ```jsonl
//! {"timestamp":"2018-12-26 18:11:08.509654","translation_id":"5aa5b2f39f7254a75aa5","source_language":"en","target_language":"fr","client_name":"airliberty","event_name":"translation_delivered","nr_words":30,"duration":20}
//! ```
//!
//! A [`MinuteResult`] is one JSON line of the output, its value field is named
//! after the metric that produced it:
//! ```jsonl
//! {"date":"2018-12-26 18:12:00","average_delivery_time":20.0}
//! ```

use crate::aggregation::{truncate_to_minute, Measurement, TimeSeriesData};
use chrono::{DateTime, NaiveDateTime, TimeDelta, Utc};
use serde::{ser::SerializeMap, Deserialize, Serialize, Serializer};

/// Format used when writing event timestamps
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

/// Format of the `date` field of the emitted results (second precision)
pub const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Parse an event timestamp.
///
/// RFC 3339 timestamps are converted to UTC, timestamps without an offset
/// (`2018-12-26 18:11:08.509654` or `2018-12-26T18:11:08`) are read as UTC.
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f"))
        .map(|naive| naive.and_utc())
}

mod timestamp_serde {
    use super::{parse_timestamp, TIMESTAMP_FORMAT};
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&ts.format(TIMESTAMP_FORMAT))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse_timestamp(&raw)
            .map_err(|err| serde::de::Error::custom(format!("invalid timestamp '{raw}': {err}")))
    }
}

#[derive(Debug, Clone, PartialEq, strum_macros::Display)]
pub enum EventError {
    #[strum(to_string = "duration must be a finite number, got {0}")]
    NonFiniteDuration(f64),

    #[strum(to_string = "duration must not be negative, got {0}")]
    NegativeDuration(f64),

    #[strum(to_string = "timestamp {0} is too far in the future to be aggregated")]
    TimestampOutOfRange(DateTime<Utc>),
}

impl std::error::Error for EventError {}

/// A translation delivery event.
///
/// Only `timestamp` and `duration` take part in the aggregation, the remaining
/// fields are required in the input but carried as opaque metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    #[serde(with = "timestamp_serde")]
    pub timestamp: DateTime<Utc>,
    pub translation_id: String,
    pub source_language: String,
    pub target_language: String,
    pub client_name: String,
    pub event_name: String,
    pub nr_words: u64,
    pub duration: f64,
}

impl Event {
    /// Create a `translation_delivered` event with empty metadata
    pub fn delivered(timestamp: DateTime<Utc>, duration: f64) -> Self {
        Self {
            timestamp,
            translation_id: String::new(),
            source_language: String::new(),
            target_language: String::new(),
            client_name: String::new(),
            event_name: "translation_delivered".to_string(),
            nr_words: 0,
            duration,
        }
    }

    /// Check the invariants serde can't express: the duration is a finite,
    /// non-negative number and the minute closed by the event is representable.
    pub fn validate(&self) -> Result<(), EventError> {
        if truncate_to_minute(self.timestamp)
            .checked_add_signed(TimeDelta::minutes(1))
            .is_none()
        {
            return Err(EventError::TimestampOutOfRange(self.timestamp));
        }
        if !self.duration.is_finite() {
            return Err(EventError::NonFiniteDuration(self.duration));
        }
        if self.duration < 0.0 {
            return Err(EventError::NegativeDuration(self.duration));
        }
        Ok(())
    }
}

impl TimeSeriesData for Event {
    fn get_ts(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

impl Measurement for Event {
    fn get_value(&self) -> f64 {
        self.duration
    }
}

/// The value of a metric for one minute.
///
/// `date` is the minute boundary being reported, `field` is the output field
/// name of the metric that computed `value` (e.g. `average_delivery_time`).
///
/// A `value` of `0` is ambiguous: it is reported both for a window without any
/// event and for a window whose events all took zero time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MinuteResult {
    pub date: DateTime<Utc>,
    pub value: f64,
    pub field: &'static str,
}

impl MinuteResult {
    pub const fn new(date: DateTime<Utc>, value: f64, field: &'static str) -> Self {
        Self { date, value, field }
    }
}

impl Serialize for MinuteResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(2))?;
        map.serialize_entry("date", &self.date.format(DATE_FORMAT).to_string())?;
        map.serialize_entry(self.field, &self.value)?;
        map.end()
    }
}
