//! Incoming HTTP request type.

use std::collections::HashMap;
use std::fmt;

use bytes::Bytes;
use http_body_util::{BodyExt, LengthLimitError, Limited};
use serde_json::Value;

use crate::method::Method;

/// Where the request body currently lives.
///
/// Straight off the wire it is an unread hyper stream. Tests construct
/// requests with in-memory bytes. Once read it is gone: a body can be
/// consumed exactly once.
pub(crate) enum BodySource {
    Stream(hyper::body::Incoming),
    Bytes(Bytes),
    Taken,
}

/// Failure while reading a request body.
#[derive(Debug)]
pub enum BodyError {
    /// The body exceeded the configured size limit.
    TooLarge,
    /// The body was already consumed by an earlier read.
    Consumed,
    /// The underlying stream failed, e.g. the client closed the connection
    /// mid-body.
    Read(String),
}

impl fmt::Display for BodyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TooLarge => f.write_str("request entity too large"),
            Self::Consumed => f.write_str("request body already consumed"),
            Self::Read(e) => write!(f, "request body read failed: {e}"),
        }
    }
}

impl std::error::Error for BodyError {}

/// An incoming HTTP request.
///
/// Beyond the wire data (method, path, query, headers, body) a request
/// carries the per-exchange state the framework threads through the
/// middleware chain: matched path parameters, an attribute bag for
/// middleware-to-handler communication, and the raw/parsed body fields the
/// built-in body middleware fill in.
pub struct Request {
    method: Method,
    path: String,
    query: Option<String>,
    headers: Vec<(String, String)>,
    body: BodySource,
    raw_body: Option<Bytes>,
    json: Option<Value>,
    params: Vec<(String, String)>,
    attributes: HashMap<String, Value>,
}

impl Request {
    /// Creates a request from scratch — the entry point for tests and for
    /// driving a [`Service`](crate::Service) without a socket.
    ///
    /// `path` may carry a query string (`"/search?q=x"`); it is split off.
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        let raw = path.into();
        let (path, query) = match raw.split_once('?') {
            Some((p, q)) => (p.to_owned(), Some(q.to_owned())),
            None => (raw, None),
        };

        Self {
            method,
            path,
            query,
            headers: Vec::new(),
            body: BodySource::Bytes(Bytes::new()),
            raw_body: None,
            json: None,
            params: Vec::new(),
            attributes: HashMap::new(),
        }
    }

    /// Adds a header. Builder-style, for tests and demos.
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_owned(), value.to_owned()));
        self
    }

    /// Sets an in-memory body. Builder-style, for tests and demos.
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = BodySource::Bytes(body.into());
        self
    }

    pub(crate) fn from_hyper(method: Method, req: hyper::Request<hyper::body::Incoming>) -> Self {
        let (parts, body) = req.into_parts();

        let headers = parts
            .headers
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_owned(), v.to_owned()))
            })
            .collect();

        Self {
            method,
            path: parts.uri.path().to_owned(),
            query: parts.uri.query().map(ToOwned::to_owned),
            headers,
            body: BodySource::Stream(body),
            raw_body: None,
            json: None,
            params: Vec::new(),
            attributes: HashMap::new(),
        }
    }

    pub fn method(&self) -> Method {
        self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn query(&self) -> Option<&str> {
        self.query.as_deref()
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Returns a path parameter by name.
    ///
    /// For a route `/users/{id}`, `req.param("id")` on `/users/42` returns
    /// `Some("42")`.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Returns a path parameter by declaration position.
    ///
    /// Parameters keep the order they appear in the route pattern, so
    /// `req.param_at(0)` on `/users/{id}/posts/{post}` is the `id` value.
    pub fn param_at(&self, index: usize) -> Option<&str> {
        self.params.get(index).map(|(_, v)| v.as_str())
    }

    /// All path parameters, in declaration order.
    pub fn params(&self) -> &[(String, String)] {
        &self.params
    }

    pub(crate) fn set_params(&mut self, params: Vec<(String, String)>) {
        self.params = params;
    }

    /// Stores an arbitrary value on the request, visible to everything later
    /// in the chain. The middleware-to-handler side channel.
    pub fn set_attribute(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.attributes.insert(key.into(), value.into());
    }

    pub fn attribute(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }

    /// Convenience for the common string-valued attribute.
    pub fn attribute_str(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).and_then(Value::as_str)
    }

    /// The raw body bytes, if a body-reading middleware ran.
    pub fn raw_body(&self) -> Option<&Bytes> {
        self.raw_body.as_ref()
    }

    pub fn set_raw_body(&mut self, body: Bytes) {
        self.raw_body = Some(body);
    }

    /// The parsed JSON body, if the JSON body middleware ran.
    pub fn json(&self) -> Option<&Value> {
        self.json.as_ref()
    }

    pub fn set_json(&mut self, value: Value) {
        self.json = Some(value);
    }

    /// Reads the body into memory, enforcing `limit` bytes.
    ///
    /// Consumes the body stream: a second call returns
    /// [`BodyError::Consumed`]. A client that disconnects mid-body surfaces
    /// as [`BodyError::Read`] — the read fails fast rather than hanging.
    pub async fn read_body(&mut self, limit: usize) -> Result<Bytes, BodyError> {
        match std::mem::replace(&mut self.body, BodySource::Taken) {
            BodySource::Taken => Err(BodyError::Consumed),
            BodySource::Bytes(bytes) => {
                if bytes.len() > limit {
                    return Err(BodyError::TooLarge);
                }
                Ok(bytes)
            }
            BodySource::Stream(incoming) => {
                match Limited::new(incoming, limit).collect().await {
                    Ok(collected) => Ok(collected.to_bytes()),
                    Err(e) if e.is::<LengthLimitError>() => Err(BodyError::TooLarge),
                    Err(e) => Err(BodyError::Read(e.to_string())),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_query_from_path() {
        let req = Request::new(Method::Get, "/search?q=rust");
        assert_eq!(req.path(), "/search");
        assert_eq!(req.query(), Some("q=rust"));
    }

    #[test]
    fn header_lookup_is_case_insensitive() {
        let req = Request::new(Method::Get, "/").with_header("Content-Type", "application/json");
        assert_eq!(req.header("content-type"), Some("application/json"));
        assert_eq!(req.header("accept"), None);
    }

    #[test]
    fn params_resolve_by_name_and_position() {
        let mut req = Request::new(Method::Get, "/users/42/posts/7");
        req.set_params(vec![
            ("id".to_owned(), "42".to_owned()),
            ("post".to_owned(), "7".to_owned()),
        ]);

        assert_eq!(req.param("id"), Some("42"));
        assert_eq!(req.param("post"), Some("7"));
        assert_eq!(req.param_at(0), Some("42"));
        assert_eq!(req.param_at(1), Some("7"));
        assert_eq!(req.param_at(2), None);
    }

    #[tokio::test]
    async fn body_reads_once_within_limit() {
        let mut req = Request::new(Method::Post, "/").with_body("hello");

        let body = req.read_body(1024).await.unwrap();
        assert_eq!(&body[..], b"hello");

        assert!(matches!(req.read_body(1024).await, Err(BodyError::Consumed)));
    }

    #[tokio::test]
    async fn body_over_limit_is_rejected() {
        let mut req = Request::new(Method::Post, "/").with_body("too many bytes");
        assert!(matches!(req.read_body(4).await, Err(BodyError::TooLarge)));
    }
}
