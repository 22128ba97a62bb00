use chrono::{DateTime, Utc};
use elbtail_event::{Event, Value};
use elbtail_statsd::metric;

use crate::statsd::ParserCounters;

/// Field names of the access log, in the order they appear on a line.
pub const FIELD_NAMES: [&str; 15] = [
    "timestamp",
    "elb",
    "client_authority",
    "backend_authority",
    "request_processing_time",
    "backend_processing_time",
    "response_processing_time",
    "elb_status_code",
    "backend_status_code",
    "received_bytes",
    "sent_bytes",
    "request",
    "user_agent",
    "ssl_cipher",
    "ssl_protocol",
];

/// Minimum number of tokens on a line, up to and including the request.
const REQUIRED_FIELDS: usize = 12;

/// Name of the field that carries the event time.
const TIMESTAMP_FIELD: &str = "timestamp";

/// Token that marks a field without value.
const NO_VALUE: &str = "-";

/// An error returned when a line does not match the access log grammar.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ParseError {
    /// The line ends before all required fields are present.
    #[error("expected at least {expected} fields, found {found}")]
    MissingFields {
        /// Number of required fields.
        expected: usize,
        /// Number of fields on the line.
        found: usize,
    },
    /// A quoted field is not closed before the end of the line.
    #[error("unterminated quoted field starting at byte {0}")]
    UnterminatedQuote(usize),
}

/// Parser for the classic load balancer access log format.
///
/// ```text
/// 2015-05-13T23:39:43.945958Z my-elb 192.168.131.39:2817 10.0.0.1:80 0.000073 0.001048 0.000057 200 200 0 29 "GET http://www.example.com:80/ HTTP/1.1" "curl/7.38.0" - -
/// ```
///
/// Values are typed: `-` means no value and the field is omitted, values containing a `.` become
/// floats if they parse as such, then integers are tried, and everything else stays a string.
#[derive(Clone, Copy, Debug, Default)]
pub struct ElbParser;

impl ElbParser {
    /// Creates a new parser.
    pub fn new() -> Self {
        Self
    }

    /// Parses a single line into an event.
    ///
    /// The `timestamp` field becomes the event time and is not part of the field map. If it is
    /// missing or invalid, the current time is used.
    pub fn parse_line(&self, line: &str) -> Result<Event, ParseError> {
        let tokens = tokenize(line)?;
        if tokens.len() < REQUIRED_FIELDS {
            return Err(ParseError::MissingFields {
                expected: REQUIRED_FIELDS,
                found: tokens.len(),
            });
        }

        let mut event = Event::new(Utc::now());
        let mut timestamp = None;

        for (name, token) in FIELD_NAMES.iter().zip(tokens) {
            if *name == TIMESTAMP_FIELD {
                timestamp = parse_timestamp(&token);
                continue;
            }

            if let Some(value) = typeify(token) {
                event.insert(*name, value);
            }
        }

        match timestamp {
            Some(timestamp) => event.timestamp = timestamp,
            None => {
                elbtail_log::debug!(line, "missing or invalid timestamp, using current time");
                metric!(counter(ParserCounters::TimestampFallback) += 1);
            }
        }

        Ok(event)
    }
}

fn parse_timestamp(token: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(token)
        .ok()
        .map(|timestamp| timestamp.with_timezone(&Utc))
}

/// Converts a raw token into a typed value.
fn typeify(token: String) -> Option<Value> {
    if token == NO_VALUE {
        return None;
    }

    if token.contains('.') {
        if let Ok(float) = token.parse::<f64>() {
            return Some(Value::F64(float));
        }
    }

    if let Ok(int) = token.parse::<i64>() {
        return Some(Value::I64(int));
    }

    Some(Value::String(token))
}

/// Splits a line into whitespace separated tokens.
///
/// Double quoted tokens may contain spaces. Within quotes, a backslash escapes the next
/// character.
fn tokenize(line: &str) -> Result<Vec<String>, ParseError> {
    let mut tokens = Vec::with_capacity(FIELD_NAMES.len());
    let mut chars = line.char_indices().peekable();

    while let Some(&(start, c)) = chars.peek() {
        if c == ' ' || c == '\t' {
            chars.next();
            continue;
        }

        let mut token = String::new();
        if c == '"' {
            chars.next();
            let mut closed = false;
            while let Some((_, c)) = chars.next() {
                match c {
                    '"' => {
                        closed = true;
                        break;
                    }
                    '\\' => match chars.next() {
                        Some((_, escaped)) => token.push(escaped),
                        None => break,
                    },
                    c => token.push(c),
                }
            }

            if !closed {
                return Err(ParseError::UnterminatedQuote(start));
            }
        } else {
            while let Some(&(_, c)) = chars.peek() {
                if c == ' ' || c == '\t' {
                    break;
                }
                token.push(c);
                chars.next();
            }
        }

        tokens.push(token);
    }

    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Timelike};
    use similar_asserts::assert_eq;

    use super::*;

    const LINE: &str = r#"2015-05-13T23:39:43.945958Z my-elb 192.168.131.39:2817 10.0.0.1:80 0.000073 0.001048 0.000057 200 503 0 29 "GET http://www.example.com:80/a/b?x=1 HTTP/1.1" "curl/7.38.0" - -"#;

    #[test]
    fn test_parse_full_line() {
        let event = ElbParser::new().parse_line(LINE).unwrap();

        let expected = Utc
            .with_ymd_and_hms(2015, 5, 13, 23, 39, 43)
            .unwrap()
            .with_nanosecond(945_958_000)
            .unwrap();
        assert_eq!(event.timestamp, expected);
        assert_eq!(event.sample_rate, 1);

        assert_eq!(event.get("elb"), Some(&Value::from("my-elb")));
        assert_eq!(
            event.get("client_authority"),
            Some(&Value::from("192.168.131.39:2817"))
        );
        assert_eq!(
            event.get("request_processing_time"),
            Some(&Value::F64(0.000073))
        );
        assert_eq!(event.get("elb_status_code"), Some(&Value::I64(200)));
        assert_eq!(event.get("backend_status_code"), Some(&Value::I64(503)));
        assert_eq!(event.get("received_bytes"), Some(&Value::I64(0)));
        assert_eq!(
            event.get("request"),
            Some(&Value::from("GET http://www.example.com:80/a/b?x=1 HTTP/1.1"))
        );
        assert_eq!(event.get("user_agent"), Some(&Value::from("curl/7.38.0")));
        assert_eq!(event.get("ssl_cipher"), None);
        assert_eq!(event.get("ssl_protocol"), None);
        assert_eq!(event.get("timestamp"), None);
    }

    #[test]
    fn test_dash_omits_field() {
        let line = r#"2015-05-13T23:39:43Z my-elb 1.2.3.4:5 - -1 -1 -1 504 - 0 0 "GET http://x/ HTTP/1.1" "-" - -"#;
        let event = ElbParser::new().parse_line(line).unwrap();

        assert_eq!(event.get("backend_authority"), None);
        assert_eq!(event.get("backend_status_code"), None);
        assert_eq!(event.get("user_agent"), None);
        assert_eq!(event.get("request_processing_time"), Some(&Value::I64(-1)));
    }

    #[test]
    fn test_typeify() {
        assert_eq!(typeify("-".to_owned()), None);
        assert_eq!(typeify("1.5".to_owned()), Some(Value::F64(1.5)));
        assert_eq!(typeify("42".to_owned()), Some(Value::I64(42)));
        assert_eq!(
            typeify("10.0.0.1:80".to_owned()),
            Some(Value::from("10.0.0.1:80"))
        );
        assert_eq!(typeify("HTTP/1.1".to_owned()), Some(Value::from("HTTP/1.1")));
        assert_eq!(typeify("abc".to_owned()), Some(Value::from("abc")));
    }

    #[test]
    fn test_tokenize_quotes() {
        let tokens = tokenize(r#"a  "b c" "d \"e\"" f"#).unwrap();
        assert_eq!(tokens, ["a", "b c", r#"d "e""#, "f"]);
    }

    #[test]
    fn test_tokenize_unterminated_quote() {
        assert_eq!(
            tokenize(r#"a "b c"#),
            Err(ParseError::UnterminatedQuote(2))
        );
    }

    #[test]
    fn test_short_line_is_error() {
        let err = ElbParser::new().parse_line("hello world").unwrap_err();
        assert_eq!(
            err,
            ParseError::MissingFields {
                expected: 12,
                found: 2
            }
        );
    }

    #[test]
    fn test_missing_optional_trailing_fields() {
        let line = r#"2015-05-13T23:39:43Z my-elb 1.2.3.4:5 10.0.0.1:80 0.1 0.2 0.3 200 200 1 2 "GET http://x/ HTTP/1.1""#;
        let event = ElbParser::new().parse_line(line).unwrap();
        assert_eq!(event.get("user_agent"), None);
        assert_eq!(event.get("sent_bytes"), Some(&Value::I64(2)));
    }

    #[test]
    fn test_extra_trailing_tokens_are_ignored() {
        let line = format!("{LINE} arn:aws:elasticloadbalancing:extra");
        let event = ElbParser::new().parse_line(&line).unwrap();
        assert_eq!(event.data.len(), 12);
    }

    #[test]
    fn test_invalid_timestamp_falls_back_to_now() {
        elbtail_log::init_test!();

        let before = Utc::now();
        let line = LINE.replacen("2015-05-13T23:39:43.945958Z", "yesterday", 1);
        let event = ElbParser::new().parse_line(&line).unwrap();
        assert!(event.timestamp >= before);
        assert_eq!(event.get("timestamp"), None);
    }
}
