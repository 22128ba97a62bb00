use std::fmt;

use chrono::{DateTime, Utc};
use elbtail_event::{Fields, Value};
use serde::Serialize;

/// An error returned when fields cannot be attached to a [`SinkEvent`].
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum FieldError {
    /// A field has an empty name.
    #[error("field name must not be empty")]
    EmptyName,
    /// A float field is infinite or NaN, which cannot be represented in JSON.
    #[error("field {0:?} has a non-finite value")]
    NonFinite(String),
}

/// An event as it is submitted to the backend.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SinkEvent {
    /// Time of the event.
    #[serde(rename = "time")]
    pub timestamp: DateTime<Utc>,
    /// The sample rate the event was kept at.
    #[serde(rename = "samplerate")]
    pub sample_rate: u64,
    /// The attached fields.
    pub data: Fields,
}

impl SinkEvent {
    /// Creates an empty event stamped with the current time and a sample rate of `1`.
    pub fn new() -> Self {
        Self {
            timestamp: Utc::now(),
            sample_rate: 1,
            data: Fields::new(),
        }
    }

    /// Attaches fields to the event.
    ///
    /// Invalid fields are skipped, all valid fields are attached. The first error encountered is
    /// returned.
    pub fn add<I>(&mut self, fields: I) -> Result<(), FieldError>
    where
        I: IntoIterator<Item = (String, Value)>,
    {
        let mut first_error = None;

        for (name, value) in fields {
            let error = if name.is_empty() {
                Some(FieldError::EmptyName)
            } else if matches!(value, Value::F64(f) if !f.is_finite()) {
                Some(FieldError::NonFinite(name))
            } else {
                self.data.insert(name, value);
                None
            };

            if first_error.is_none() {
                first_error = error;
            }
        }

        match first_error {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

impl Default for SinkEvent {
    fn default() -> Self {
        Self::new()
    }
}

/// An error returned when an event is not accepted for delivery.
///
/// The rejected event is returned with the error so it can be logged.
#[derive(Debug, thiserror::Error)]
pub enum SendError {
    /// The pending queue is full.
    #[error("pending queue is full, dropping event")]
    QueueOverflow(Box<SinkEvent>),
    /// The sink was closed.
    #[error("sink is closed")]
    Closed(Box<SinkEvent>),
}

impl SendError {
    /// Returns the event that was not accepted.
    pub fn event(&self) -> &SinkEvent {
        match self {
            Self::QueueOverflow(event) | Self::Closed(event) => event,
        }
    }
}

/// Renders the event as JSON for log messages.
pub struct EventDisplay<'a>(pub &'a SinkEvent);

impl fmt::Display for EventDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match serde_json::to_string(self.0) {
            Ok(json) => f.write_str(&json),
            Err(_) => write!(f, "{:?}", self.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use similar_asserts::assert_eq;

    use super::*;

    #[test]
    fn test_add_skips_invalid_fields() {
        let mut event = SinkEvent::new();
        let result = event.add([
            ("a".to_owned(), Value::I64(1)),
            (String::new(), Value::I64(2)),
            ("nan".to_owned(), Value::F64(f64::NAN)),
            ("b".to_owned(), Value::F64(0.5)),
        ]);

        assert_eq!(result, Err(FieldError::EmptyName));
        assert_eq!(event.data.len(), 2);
        assert_eq!(event.data.get("b"), Some(&Value::F64(0.5)));
    }

    #[test]
    fn test_add_valid_fields() {
        let mut event = SinkEvent::new();
        event
            .add([("elb".to_owned(), Value::from("my-elb"))])
            .unwrap();
        assert_eq!(event.data.get("elb"), Some(&Value::from("my-elb")));
    }

    #[test]
    fn test_wire_format() {
        let mut event = SinkEvent {
            timestamp: Utc.with_ymd_and_hms(2015, 5, 13, 23, 39, 43).unwrap(),
            sample_rate: 4,
            data: Fields::new(),
        };
        event.add([("status".to_owned(), Value::I64(200))]).unwrap();

        assert_eq!(
            EventDisplay(&event).to_string(),
            r#"{"time":"2015-05-13T23:39:43Z","samplerate":4,"data":{"status":200}}"#
        );
    }
}
