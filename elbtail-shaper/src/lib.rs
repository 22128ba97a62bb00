//! Shaping of request lines.
//!
//! The [`UrlShaper`] splits a URL into its path and query and computes a "shape" for both, which
//! groups URLs that only differ in identifiers or query values. The [`RequestShaper`] applies
//! this to the request line field of an event and stores the results as additional fields.

#![warn(missing_docs)]

mod request;
mod uri;

pub use self::request::*;
pub use self::uri::*;

/// An error returned when a URL or a shaping pattern cannot be processed.
#[derive(Debug, thiserror::Error)]
pub enum ShapeError {
    /// The value is neither an absolute path, an absolute URL nor `*`.
    #[error("invalid url {0:?}")]
    InvalidUrl(String, #[source] url::ParseError),
    /// The URL has no hierarchical path, such as `mailto:` URLs.
    #[error("url {0:?} has no path")]
    NoPath(String),
    /// A configured path pattern does not start with a slash.
    #[error("invalid url pattern {0:?}, patterns must start with a slash")]
    InvalidPattern(String),
}
