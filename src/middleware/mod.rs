//! Built-in middleware.
//!
//! The framework ships exactly two: a size-limited raw body reader and a
//! JSON variant on top of it. Everything else — CORS, auth, tracing — is a
//! few lines of application middleware; see the demos.

use http::StatusCode;
use serde_json::Value;

use crate::handler::{BoxFuture, Middleware};
use crate::queue::Next;
use crate::request::{BodyError, Request};
use crate::response::Response;

/// Default body size limit: 1 MB.
pub const DEFAULT_BODY_LIMIT: usize = 1_000_000;

/// Reads the request body into memory and stores it on the request as
/// [`raw_body`](Request::raw_body).
///
/// A body over the limit short-circuits the chain with `413`; a failed read
/// (client gone mid-body, body already consumed) with `400`.
///
/// ```rust
/// use rill::{App, Request, Response};
/// use rill::middleware::BodyReader;
///
/// let mut app = App::new();
/// app.post("/ingest", |req: Request, res: Response| async move {
///     let size = req.raw_body().map_or(0, |b| b.len());
///     (req, res, format!("got {size} bytes"))
/// })
/// .add(BodyReader::new());
/// ```
pub struct BodyReader {
    limit: usize,
}

impl BodyReader {
    pub fn new() -> Self {
        Self {
            limit: DEFAULT_BODY_LIMIT,
        }
    }

    pub fn with_limit(limit: usize) -> Self {
        Self { limit }
    }
}

impl Default for BodyReader {
    fn default() -> Self {
        Self::new()
    }
}

impl Middleware for BodyReader {
    fn call(&self, mut req: Request, res: Response, next: Next) -> BoxFuture<(Request, Response)> {
        let limit = self.limit;

        Box::pin(async move {
            match req.read_body(limit).await {
                Ok(bytes) => {
                    req.set_raw_body(bytes);
                    next.run(req, res).await
                }
                Err(err @ BodyError::TooLarge) => {
                    next.fail_with_status(req, res, err.to_string(), StatusCode::PAYLOAD_TOO_LARGE)
                        .await
                }
                Err(err) => {
                    next.fail_with_status(req, res, err.to_string(), StatusCode::BAD_REQUEST)
                        .await
                }
            }
        })
    }
}

/// [`BodyReader`] plus a JSON parse: the raw bytes land in
/// [`raw_body`](Request::raw_body) and the parsed value in
/// [`json`](Request::json). A body that is not valid JSON short-circuits
/// with `400`.
pub struct JsonBody {
    limit: usize,
}

impl JsonBody {
    pub fn new() -> Self {
        Self {
            limit: DEFAULT_BODY_LIMIT,
        }
    }

    pub fn with_limit(limit: usize) -> Self {
        Self { limit }
    }
}

impl Default for JsonBody {
    fn default() -> Self {
        Self::new()
    }
}

impl Middleware for JsonBody {
    fn call(&self, mut req: Request, res: Response, next: Next) -> BoxFuture<(Request, Response)> {
        let limit = self.limit;

        Box::pin(async move {
            let bytes = match req.read_body(limit).await {
                Ok(bytes) => bytes,
                Err(err @ BodyError::TooLarge) => {
                    return next
                        .fail_with_status(req, res, err.to_string(), StatusCode::PAYLOAD_TOO_LARGE)
                        .await;
                }
                Err(err) => {
                    return next
                        .fail_with_status(req, res, err.to_string(), StatusCode::BAD_REQUEST)
                        .await;
                }
            };

            match serde_json::from_slice::<Value>(&bytes) {
                Ok(value) => {
                    req.set_raw_body(bytes);
                    req.set_json(value);
                    next.run(req, res).await
                }
                Err(e) => {
                    next.fail_with_status(
                        req,
                        res,
                        format!("invalid json body: {e}"),
                        StatusCode::BAD_REQUEST,
                    )
                    .await
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::method::Method;
    use crate::queue::Queue;
    use std::sync::Arc;

    fn body_queue(mw: impl Middleware) -> Queue {
        Queue::new(
            vec![Arc::new(mw) as Arc<dyn Middleware>],
            |req: Request, mut res: Response| async move {
                let body = req
                    .raw_body()
                    .map(|b| String::from_utf8_lossy(b).into_owned())
                    .unwrap_or_default();
                res.text(body);
                (req, res)
            },
        )
    }

    #[tokio::test]
    async fn body_reader_stores_the_raw_body() {
        let queue = body_queue(BodyReader::new());
        let req = Request::new(Method::Post, "/").with_body("name=alice");

        let (_, res) = queue.handle(req, Response::new()).await;

        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(res.body(), b"name=alice");
    }

    #[tokio::test]
    async fn oversized_body_short_circuits_with_413() {
        let queue = body_queue(BodyReader::with_limit(4));
        let req = Request::new(Method::Post, "/").with_body("way past the limit");

        let (_, res) = queue.handle(req, Response::new()).await;

        assert_eq!(res.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(res.body(), b"request entity too large");
    }

    #[tokio::test]
    async fn json_body_parses_into_the_request() {
        let queue = Queue::new(
            vec![Arc::new(JsonBody::new()) as Arc<dyn Middleware>],
            |req: Request, mut res: Response| async move {
                let name = req
                    .json()
                    .and_then(|v| v["name"].as_str())
                    .unwrap_or("unknown")
                    .to_owned();
                res.text(name);
                (req, res)
            },
        );
        let req = Request::new(Method::Post, "/").with_body(r#"{"name":"alice"}"#);

        let (_, res) = queue.handle(req, Response::new()).await;

        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(res.body(), b"alice");
    }

    #[tokio::test]
    async fn invalid_json_short_circuits_with_400() {
        let queue = body_queue(JsonBody::new());
        let req = Request::new(Method::Post, "/").with_body("not json");

        let (_, res) = queue.handle(req, Response::new()).await;

        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert!(res.body().starts_with(b"invalid json body"));
    }
}
