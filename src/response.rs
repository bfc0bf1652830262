//! Outgoing HTTP response type and the reply conventions.
//!
//! Unlike a build-and-return response value, [`Response`] is a mutable sink
//! that travels through the middleware chain. Middleware and handlers set the
//! status, add headers, write bytes, and *end* it. Once ended, every further
//! write is a checked no-op — the framework's one defensive idempotence
//! mechanism against double sends.

use bytes::Bytes;
use http::StatusCode;
use http_body_util::Full;
use serde_json::Value;

// ── Payload ──────────────────────────────────────────────────────────────────

/// A body a handler can hand to [`Response::send`] or return from a route.
///
/// `send` is polymorphic the same way for both variants: text goes out as
/// `text/html`, structured values are serialized as `application/json`.
pub enum Payload {
    Text(String),
    Json(Value),
}

impl From<&str> for Payload {
    fn from(s: &str) -> Self {
        Self::Text(s.to_owned())
    }
}

impl From<String> for Payload {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<Value> for Payload {
    fn from(v: Value) -> Self {
        Self::Json(v)
    }
}

// ── Response ─────────────────────────────────────────────────────────────────

/// An outgoing HTTP response.
///
/// ```rust
/// use rill::Response;
/// use http::StatusCode;
///
/// let mut res = Response::new();
/// res.set_status(StatusCode::CREATED);
/// res.set_header("location", "/users/42");
/// res.send(serde_json::json!({ "id": 42 }));
/// assert!(res.ended());
/// ```
pub struct Response {
    status: StatusCode,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
    ended: bool,
}

impl Response {
    pub fn new() -> Self {
        Self {
            status: StatusCode::OK,
            headers: Vec::new(),
            body: Vec::new(),
            ended: false,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn set_status(&mut self, status: StatusCode) {
        if !self.ended {
            self.status = status;
        }
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Sets a header, replacing any existing value under the same name.
    pub fn set_header(&mut self, name: &str, value: &str) {
        if self.ended {
            return;
        }
        match self.headers.iter_mut().find(|(k, _)| k.eq_ignore_ascii_case(name)) {
            Some((_, v)) => *v = value.to_owned(),
            None => self.headers.push((name.to_owned(), value.to_owned())),
        }
    }

    /// Appends raw bytes to the body without completing the response.
    pub fn write(&mut self, data: impl AsRef<[u8]>) {
        if !self.ended {
            self.body.extend_from_slice(data.as_ref());
        }
    }

    /// Marks the response complete. Every later write is a no-op.
    pub fn end(&mut self) {
        self.ended = true;
    }

    /// Whether the response has been fully written.
    pub fn ended(&self) -> bool {
        self.ended
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Content-negotiated send: text bodies go out as `text/html`, structured
    /// values as JSON. Writes the body and ends the response.
    pub fn send(&mut self, data: impl Into<Payload>) {
        match data.into() {
            Payload::Text(text) => self.send_with_header("text/html", text),
            Payload::Json(value) => self.send_with_header("application/json", value.to_string()),
        }
    }

    /// Serializes `value` and sends it as `application/json`.
    pub fn json(&mut self, value: Value) {
        self.send_with_header("application/json", value.to_string());
    }

    /// Sends `data` as `text/plain; charset=utf-8`.
    pub fn text(&mut self, data: impl Into<String>) {
        self.send_with_header("text/plain; charset=utf-8", data.into());
    }

    /// Sends `data` under an explicit content type and ends the response.
    pub fn send_with_header(&mut self, content_type: &str, data: impl AsRef<[u8]>) {
        if self.ended {
            return;
        }
        self.set_header("content-type", content_type);
        self.write(data);
        self.end();
    }

    pub(crate) fn into_hyper(self) -> http::Response<Full<Bytes>> {
        let mut builder = http::Response::builder().status(self.status);
        for (name, value) in &self.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        builder
            .body(Full::new(Bytes::from(self.body)))
            .unwrap_or_else(|e| {
                tracing::error!("malformed response headers: {e}");
                http::Response::builder()
                    .status(StatusCode::INTERNAL_SERVER_ERROR)
                    .body(Full::new(Bytes::new()))
                    .expect("bare 500 response is always valid")
            })
    }
}

impl Default for Response {
    fn default() -> Self {
        Self::new()
    }
}

// ── IntoReply ────────────────────────────────────────────────────────────────

/// Conversion for route-handler return values.
///
/// Routes return `(req, res, reply)`; when `reply` is non-empty and the
/// response has not been ended, the framework sends it automatically. Return
/// `()` from handlers that write the response themselves.
pub trait IntoReply {
    fn into_reply(self) -> Option<Payload>;
}

impl IntoReply for () {
    fn into_reply(self) -> Option<Payload> {
        None
    }
}

impl IntoReply for &'static str {
    fn into_reply(self) -> Option<Payload> {
        Some(self.into())
    }
}

impl IntoReply for String {
    fn into_reply(self) -> Option<Payload> {
        Some(self.into())
    }
}

impl IntoReply for Value {
    fn into_reply(self) -> Option<Payload> {
        Some(self.into())
    }
}

impl IntoReply for Payload {
    fn into_reply(self) -> Option<Payload> {
        Some(self)
    }
}

impl<T: Into<Payload>> IntoReply for Option<T> {
    fn into_reply(self) -> Option<Payload> {
        self.map(Into::into)
    }
}
