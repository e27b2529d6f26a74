//! Minimal HTTP request/header model shared by the engine.
//!
//! The engine is independent of any particular server crate. A host (see
//! `serve`) converts its native request type into a [`Request`] before
//! calling into the render pipeline.

use std::collections::BTreeMap;

/// `304 Not Modified`: the pipeline emits status and headers only.
pub const NOT_MODIFIED: u16 = 304;

/// Default content type for rendered pages.
pub const DEFAULT_CONTENT_TYPE: &str = "text/html; charset=utf-8";

// ============================================================================
// Headers
// ============================================================================

/// Ordered header list with case-insensitive lookup.
///
/// Duplicate names are allowed (e.g. several `Set-Cookie` lines); `get`
/// returns the first value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    entries: Vec<(String, String)>,
}

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    /// First value for `name`, compared case-insensitively.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Replace every value of `name` with a single `value`.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        self.entries.retain(|(k, _)| !k.eq_ignore_ascii_case(&name));
        self.entries.push((name, value.into()));
    }

    /// Add a value without touching existing ones.
    pub fn append(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.entries.push((name.into(), value.into()));
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Headers {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut headers = Self::new();
        for (k, v) in iter {
            headers.append(k, v);
        }
        headers
    }
}

// ============================================================================
// Request
// ============================================================================

/// Route matched by the host router for this request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouteMatch {
    pub name: String,
    pub vars: BTreeMap<String, String>,
}

/// Inbound request as seen by the engine.
#[derive(Debug, Clone, Default)]
pub struct Request {
    pub method: String,
    /// Request target as received: path plus optional `?query`.
    pub uri: String,
    /// Value of the `Host` header (or the authority the host resolved).
    pub host: String,
    pub headers: Headers,
    /// Filled in by the host router, if any route matched.
    pub route: Option<RouteMatch>,
}

impl Request {
    pub fn new(method: impl Into<String>, uri: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            uri: uri.into(),
            ..Self::default()
        }
    }

    pub fn get(uri: impl Into<String>) -> Self {
        Self::new("GET", uri)
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.append(name, value);
        self
    }

    /// Add a cookie to the request's `Cookie` header.
    pub fn with_cookie(mut self, name: &str, value: &str) -> Self {
        let pair = format!("{name}={value}");
        let cookie = match self.headers.get("cookie") {
            Some(existing) if !existing.trim().is_empty() => format!("{existing}; {pair}"),
            _ => pair,
        };
        self.headers.set("Cookie", cookie);
        self
    }

    pub fn with_route(mut self, route: RouteMatch) -> Self {
        self.route = Some(route);
        self
    }

    /// Path component of the request target.
    pub fn path(&self) -> &str {
        self.uri.split(['?', '#']).next().unwrap_or("")
    }

    /// Raw query string without the leading `?`.
    pub fn raw_query(&self) -> Option<&str> {
        let (_, rest) = self.uri.split_once('?')?;
        Some(rest.split('#').next().unwrap_or(""))
    }

    /// Decoded query pairs in request order.
    pub fn query_pairs(&self) -> Vec<(String, String)> {
        match url::Url::parse(&format!("http://localhost{}", self.uri)) {
            Ok(parsed) => parsed.query_pairs().into_owned().collect(),
            Err(_) => Vec::new(),
        }
    }

    /// Decoded query grouped by key.
    pub fn query(&self) -> BTreeMap<String, Vec<String>> {
        let mut query: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (k, v) in self.query_pairs() {
            query.entry(k).or_default().push(v);
        }
        query
    }

    /// Value of the named cookie from the `Cookie` header.
    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.headers.get("cookie")?.split(';').find_map(|pair| {
            let (k, v) = pair.trim().split_once('=')?;
            (k == name).then_some(v)
        })
    }
}

/// Reason phrase for the status line.
pub fn reason_phrase(status: u16) -> &'static str {
    match status {
        200 => "OK",
        201 => "Created",
        204 => "No Content",
        301 => "Moved Permanently",
        302 => "Found",
        303 => "See Other",
        304 => "Not Modified",
        307 => "Temporary Redirect",
        308 => "Permanent Redirect",
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        405 => "Method Not Allowed",
        409 => "Conflict",
        410 => "Gone",
        422 => "Unprocessable Entity",
        429 => "Too Many Requests",
        500 => "Internal Server Error",
        501 => "Not Implemented",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        504 => "Gateway Timeout",
        _ => "",
    }
}
