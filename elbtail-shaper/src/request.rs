use elbtail_event::Event;
use serde::{Deserialize, Serialize};

use crate::{ShapeError, UrlShaper};

/// Controls how request lines are shaped.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct ShapingConfig {
    /// Name of the field that holds the request line.
    pub request_field: String,
    /// Path patterns such as `/users/:id`, tried in order.
    pub url_patterns: Vec<String>,
}

impl Default for ShapingConfig {
    fn default() -> Self {
        Self {
            request_field: elbtail_event::REQUEST.to_owned(),
            url_patterns: Vec::new(),
        }
    }
}

/// Decomposes the request line of an event into separate fields.
///
/// For a field `request` holding `GET /a/b?x=1 HTTP/1.1`, these fields are added:
///
/// | Field                      | Value           |
/// |----------------------------|-----------------|
/// | `request_method`           | `GET`           |
/// | `request_protocol_version` | `HTTP/1.1`      |
/// | `request_uri`              | `/a/b?x=1`      |
/// | `request_path`             | `/a/b`          |
/// | `request_query`            | `x=1`           |
/// | `request_shape`            | `/a/b?x=?`      |
/// | `request_queryshape`       | `x=?`           |
///
/// The query fields are only added if the query is not empty. Method and protocol version are
/// only known if the line consists of exactly three space separated tokens. Otherwise, the first
/// token is taken as the URL.
#[derive(Clone, Debug)]
pub struct RequestShaper {
    field: String,
    urls: UrlShaper,
}

impl RequestShaper {
    /// Creates a shaper from its configuration.
    pub fn new(config: &ShapingConfig) -> Result<Self, ShapeError> {
        Ok(Self {
            field: config.request_field.clone(),
            urls: UrlShaper::new(&config.url_patterns)?,
        })
    }

    /// Returns the name of the shaped field.
    pub fn field(&self) -> &str {
        &self.field
    }

    /// Adds the decomposed request fields to the event.
    ///
    /// Events without the request field, or with a non-string value in it, are left unchanged.
    /// If the URL cannot be decomposed, the error is returned and method and protocol version
    /// stay on the event.
    pub fn shape(&self, event: &mut Event) -> Result<(), ShapeError> {
        let Some(line) = event.get(&self.field).and_then(|v| v.as_str()) else {
            return Ok(());
        };
        let line = line.to_owned();

        let tokens: Vec<&str> = line.split(' ').collect();
        let url = match tokens.as_slice() {
            [method, url, version] => {
                event.insert(self.name("method"), *method);
                event.insert(self.name("protocol_version"), *version);
                *url
            }
            tokens => tokens[0],
        };

        let shape = self.urls.parse(url)?;

        event.insert(self.name("uri"), shape.uri);
        event.insert(self.name("path"), shape.path);
        if !shape.query.is_empty() {
            event.insert(self.name("query"), shape.query);
        }
        event.insert(self.name("shape"), shape.shape);
        if !shape.query_shape.is_empty() {
            event.insert(self.name("queryshape"), shape.query_shape);
        }

        Ok(())
    }

    fn name(&self, suffix: &str) -> String {
        format!("{}_{suffix}", self.field)
    }
}
