//! The event model that flows through the elbtail pipeline.
//!
//! A parsed access log line becomes an [`Event`]: a timestamp, a flat map of named [`Value`]s and
//! the sample rate assigned by the sampler. Values are restricted to the three kinds a load
//! balancer log produces after typing: strings, integers and floats.

#![warn(missing_docs)]

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Name of the field holding the load balancer status code.
pub const ELB_STATUS_CODE: &str = "elb_status_code";

/// Name of the field holding the backend status code.
pub const BACKEND_STATUS_CODE: &str = "backend_status_code";

/// Name of the field holding the load balancer name.
pub const ELB: &str = "elb";

/// Name of the field holding the raw request line.
pub const REQUEST: &str = "request";

/// Alias for the field map of an event.
pub type Fields = BTreeMap<String, Value>;

/// A typed field value.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum Value {
    /// A signed integer value.
    I64(i64),
    /// A floating point value.
    F64(f64),
    /// A string value.
    String(String),
}

impl Value {
    /// Returns the string if this value is a string, otherwise `None`.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(string) => Some(string.as_str()),
            _ => None,
        }
    }

    /// Returns the integer if this value is an integer, otherwise `None`.
    ///
    /// Floats are not converted, even if they carry no fractional part.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::I64(value) => Some(*value),
            _ => None,
        }
    }

    /// Returns the float if this value is a float, otherwise `None`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::F64(value) => Some(*value),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::I64(value) => write!(f, "{value}"),
            Value::F64(value) => write!(f, "{value}"),
            Value::String(value) => f.pad(value),
        }
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::I64(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::F64(value)
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_owned())
    }
}

/// One parsed log record.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct Event {
    /// Time at which the load balancer handled the request.
    pub timestamp: DateTime<Utc>,
    /// Named field values.
    pub data: Fields,
    /// The sample rate this event represents.
    ///
    /// `1` until the sampler keeps the event, afterwards the rate it was kept at.
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u64,
}

fn default_sample_rate() -> u64 {
    1
}

impl Event {
    /// Creates an event without fields.
    pub fn new(timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            data: Fields::new(),
            sample_rate: default_sample_rate(),
        }
    }

    /// Returns the value of a field.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.data.get(name)
    }

    /// Sets a field, replacing a previous value with the same name.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.data.insert(name.into(), value.into());
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn test_value_accessors() {
        assert_eq!(Value::from(200).as_i64(), Some(200));
        assert_eq!(Value::from(200.0).as_i64(), None);
        assert_eq!(Value::from("200").as_i64(), None);
        assert_eq!(Value::from("my-elb").as_str(), Some("my-elb"));
        assert_eq!(Value::from(0.5).as_f64(), Some(0.5));
    }

    #[test]
    fn test_value_display() {
        assert_eq!(Value::from(503).to_string(), "503");
        assert_eq!(Value::from(0.000_04).to_string(), "0.00004");
        assert_eq!(Value::from("GET").to_string(), "GET");
    }

    #[test]
    fn test_value_serializes_untagged() {
        let mut event = Event::new(Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap());
        event.insert("status", 200);
        event.insert("duration", 0.25);
        event.insert("elb", "my-elb");

        let json = serde_json::to_value(&event.data).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"duration": 0.25, "elb": "my-elb", "status": 200})
        );
    }

    #[test]
    fn test_event_defaults_to_rate_one() {
        let event: Event =
            serde_json::from_str(r#"{"timestamp":"2024-01-02T03:04:05Z","data":{"a":1}}"#)
                .unwrap();
        assert_eq!(event.sample_rate, 1);
        assert_eq!(event.get("a"), Some(&Value::I64(1)));
    }
}
