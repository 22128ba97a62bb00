use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use regex::Regex;
use url::Url;

use crate::ShapeError;

/// Placeholder for values in query shapes.
const PLACEHOLDER: &str = "?";

/// Placeholder for identifier segments in path shapes.
const SEGMENT_PLACEHOLDER: &str = "*";

/// Base for resolving absolute paths into URLs.
static BASE_URL: Lazy<Url> = Lazy::new(|| Url::parse("http://localhost/").unwrap());

/// Path segments that look like identifiers: integers with two or more digits, UUIDs and long
/// hexadecimal strings.
static IDENTIFIER_SEGMENT_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?x)
        ^(?:
            # Integer IDs with more than one digit.
            [0-9]{2,} |
            # UUIDs.
            [a-fA-F0-9]{8}-[a-fA-F0-9]{4}-[a-fA-F0-9]{4}-[a-fA-F0-9]{4}-[a-fA-F0-9]{12} |
            # Hashes and other long hexadecimal strings.
            [a-fA-F0-9]{16,}
        )$",
    )
    .unwrap()
});

/// The decomposition of a URL.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UrlShape {
    /// The input, unmodified.
    pub uri: String,
    /// The percent-encoded path.
    pub path: String,
    /// The raw query string without the leading `?`, empty if there is none.
    pub query: String,
    /// The path with identifiers replaced, or the matching pattern.
    pub path_shape: String,
    /// The sorted query keys with values replaced by `?`.
    pub query_shape: String,
    /// The path shape followed by the query shape, if there is one.
    pub shape: String,
}

/// A path pattern such as `/users/:id/posts`.
#[derive(Clone, Debug)]
struct PathPattern {
    raw: String,
    segments: Vec<PatternSegment>,
}

#[derive(Clone, Debug)]
enum PatternSegment {
    Literal(String),
    Param,
}

impl PathPattern {
    fn parse(raw: &str) -> Result<Self, ShapeError> {
        let Some(rest) = raw.strip_prefix('/') else {
            return Err(ShapeError::InvalidPattern(raw.to_owned()));
        };

        let segments = rest
            .split('/')
            .map(|segment| match segment.strip_prefix(':') {
                Some(_) => PatternSegment::Param,
                None => PatternSegment::Literal(segment.to_owned()),
            })
            .collect();

        Ok(Self {
            raw: raw.to_owned(),
            segments,
        })
    }

    fn matches(&self, path: &str) -> bool {
        let Some(rest) = path.strip_prefix('/') else {
            return false;
        };

        let mut segments = rest.split('/');
        for pattern in &self.segments {
            let Some(segment) = segments.next() else {
                return false;
            };

            let matches = match pattern {
                PatternSegment::Literal(literal) => literal == segment,
                PatternSegment::Param => !segment.is_empty(),
            };

            if !matches {
                return false;
            }
        }

        segments.next().is_none()
    }
}

/// Splits URLs into path and query and computes their shapes.
///
/// Accepted inputs are absolute paths (`/a/b?x=1`), absolute URLs (`http://host:80/a?x=1`) and
/// the literal `*` used by `OPTIONS` requests. Fragments are discarded.
///
/// The path shape is the first configured pattern that matches the path segment by segment.
/// Without a matching pattern, segments that look like identifiers are replaced by `*`. The
/// query shape lists every query key in sorted order with its values replaced by `?`, one entry
/// per value.
///
/// ```
/// use elbtail_shaper::UrlShaper;
///
/// let shaper = UrlShaper::new(&["/users/:id".to_owned()]).unwrap();
///
/// let shape = shaper.parse("/users/1234?b=2&a=1&b=3").unwrap();
/// assert_eq!(shape.path_shape, "/users/:id");
/// assert_eq!(shape.shape, "/users/:id?a=?&b=?&b=?");
/// ```
#[derive(Clone, Debug, Default)]
pub struct UrlShaper {
    patterns: Vec<PathPattern>,
}

impl UrlShaper {
    /// Creates a shaper with the given path patterns, tried in order.
    pub fn new(patterns: &[String]) -> Result<Self, ShapeError> {
        let patterns = patterns
            .iter()
            .map(|pattern| PathPattern::parse(pattern))
            .collect::<Result<_, _>>()?;

        Ok(Self { patterns })
    }

    /// Decomposes a URL into its parts and shapes.
    pub fn parse(&self, raw: &str) -> Result<UrlShape, ShapeError> {
        if raw == "*" {
            return Ok(UrlShape {
                uri: raw.to_owned(),
                path: raw.to_owned(),
                path_shape: raw.to_owned(),
                shape: raw.to_owned(),
                ..Default::default()
            });
        }

        let url = if raw.starts_with('/') {
            resolve_path(raw)
        } else {
            Url::parse(raw).map_err(|err| ShapeError::InvalidUrl(raw.to_owned(), err))?
        };

        if url.cannot_be_a_base() {
            return Err(ShapeError::NoPath(raw.to_owned()));
        }

        let path = url.path().to_owned();
        let query = url.query().unwrap_or_default().to_owned();
        let path_shape = self.path_shape(&path);
        let query_shape = query_shape(&url);

        let shape = if query_shape.is_empty() {
            path_shape.clone()
        } else {
            format!("{path_shape}?{query_shape}")
        };

        Ok(UrlShape {
            uri: raw.to_owned(),
            path,
            query,
            path_shape,
            query_shape,
            shape,
        })
    }

    fn path_shape(&self, path: &str) -> String {
        if let Some(pattern) = self.patterns.iter().find(|p| p.matches(path)) {
            return pattern.raw.clone();
        }

        path.split('/')
            .map(|segment| {
                if IDENTIFIER_SEGMENT_REGEX.is_match(segment) {
                    SEGMENT_PLACEHOLDER
                } else {
                    segment
                }
            })
            .collect::<Vec<_>>()
            .join("/")
    }
}

/// Resolves an absolute path against the placeholder host.
///
/// Setting path and query directly keeps paths starting with `//` from being read as a host.
fn resolve_path(raw: &str) -> Url {
    let without_fragment = raw.split_once('#').map_or(raw, |(before, _)| before);
    let (path, query) = match without_fragment.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (without_fragment, None),
    };

    let mut url = BASE_URL.clone();
    url.set_path(path);
    url.set_query(query);
    url
}

fn query_shape(url: &Url) -> String {
    let mut keys = BTreeMap::<String, usize>::new();
    for (key, _) in url.query_pairs() {
        *keys.entry(key.into_owned()).or_default() += 1;
    }

    let mut parts = Vec::new();
    for (key, count) in keys {
        for _ in 0..count {
            parts.push(format!("{key}={PLACEHOLDER}"));
        }
    }

    parts.join("&")
}
