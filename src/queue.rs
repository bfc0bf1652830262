//! The middleware dispatch queue and its error-propagation protocol.
//!
//! A [`Queue`] owns an ordered middleware list and one terminal handler,
//! built once and shared read-only across every in-flight request. The cursor
//! is threaded through the dispatch calls as a plain index — no per-request
//! state ever lives on the queue itself, which is why one instance serves any
//! number of concurrent requests without locks.
//!
//! Dispatch walks the list in insertion order. Each middleware decides the
//! fate of the exchange through its [`Next`] continuation: run the rest of
//! the chain, short-circuit into the error protocol, or complete the
//! response and let the chain halt.

use std::sync::Arc;

use http::StatusCode;
use serde_json::Value;
use tracing::debug;

use crate::handler::{BoxFuture, BoxedMiddleware, BoxedTerminal, Middleware, TerminalHandler};
use crate::request::Request;
use crate::response::Response;

// ── QueueError ───────────────────────────────────────────────────────────────

/// A callback-style error handler: gets a last look at the exchange before
/// the queue ends the response.
pub type ErrorHandler = Arc<dyn Fn(&mut Request, &mut Response) + Send + Sync>;

/// An error value passed to [`Next::fail`].
///
/// Deliberately not one rigid type: middleware report failures as a plain
/// message, a structured value, or a callback that writes the error response
/// itself. The dispatch over the three kinds is exhaustive — there is no
/// fourth shape.
pub enum QueueError {
    /// A plain message, sent as the response body (`text/html`).
    Message(String),
    /// A structured value, serialized as JSON.
    Structured(Value),
    /// A callback invoked with the exchange; if it does not end the
    /// response, the queue ends it with no body.
    Handler(ErrorHandler),
}

impl QueueError {
    /// Wraps a callback as an error value.
    pub fn handler(f: impl Fn(&mut Request, &mut Response) + Send + Sync + 'static) -> Self {
        Self::Handler(Arc::new(f))
    }
}

impl From<&str> for QueueError {
    fn from(msg: &str) -> Self {
        Self::Message(msg.to_owned())
    }
}

impl From<String> for QueueError {
    fn from(msg: String) -> Self {
        Self::Message(msg)
    }
}

impl From<Value> for QueueError {
    fn from(value: Value) -> Self {
        Self::Structured(value)
    }
}

// ── Queue ────────────────────────────────────────────────────────────────────

/// The ordered-dispatch engine executing a middleware list against one
/// terminal handler.
///
/// Cloning is cheap (the list and handler sit behind one `Arc`) and clones
/// dispatch through the same shared state.
#[derive(Clone)]
pub struct Queue {
    inner: Arc<QueueInner>,
}

struct QueueInner {
    stack: Vec<BoxedMiddleware>,
    terminal: BoxedTerminal,
}

impl Queue {
    /// Builds a queue from an ordered middleware list and the handler to
    /// invoke once the list is exhausted. The list is immutable from here on.
    pub fn new(middleware: Vec<Arc<dyn Middleware>>, terminal: impl TerminalHandler) -> Self {
        Self {
            inner: Arc::new(QueueInner {
                stack: middleware,
                terminal: Arc::new(terminal),
            }),
        }
    }

    /// Dispatches the exchange through the middleware chain from the start,
    /// ending at the terminal handler.
    pub fn handle(&self, req: Request, res: Response) -> BoxFuture<(Request, Response)> {
        self.dispatch(req, res, 0)
    }

    /// Dispatches from `index`. `Next` continuations re-enter here, each one
    /// bound to the following position.
    fn dispatch(&self, req: Request, res: Response, index: usize) -> BoxFuture<(Request, Response)> {
        match self.inner.stack.get(index) {
            Some(mw) => {
                let next = Next {
                    queue: self.clone(),
                    index: index + 1,
                };
                mw.call(req, res, next)
            }
            None => self.inner.terminal.call(req, res),
        }
    }

    /// The error-handling sub-protocol, shared by every `fail` path.
    ///
    /// If the response is already ended this is a no-op: the error arrived
    /// after the exchange completed, and the sent status and body stand.
    pub fn handle_error(
        mut req: Request,
        mut res: Response,
        err: QueueError,
        status: StatusCode,
    ) -> (Request, Response) {
        if res.ended() {
            return (req, res);
        }

        debug!(status = %status, "middleware chain short-circuited");
        res.set_status(status);

        match err {
            QueueError::Handler(cb) => {
                cb(&mut req, &mut res);

                if !res.ended() {
                    res.end();
                }
            }
            QueueError::Message(msg) => res.send(msg),
            QueueError::Structured(value) => res.send(value),
        }

        (req, res)
    }

    #[cfg(test)]
    pub(crate) fn shared_ptr(&self) -> *const () {
        Arc::as_ptr(&self.inner).cast()
    }
}

// ── Next ─────────────────────────────────────────────────────────────────────

/// The continuation handed to each middleware, bound to the position after
/// it in the chain.
///
/// `Next` is consumed by whichever exit the middleware takes, so a
/// middleware can continue (or fail) the chain at most once. Dropping it
/// without a call halts the chain silently.
pub struct Next {
    queue: Queue,
    index: usize,
}

impl Next {
    /// Continues the chain at the next position.
    pub async fn run(self, req: Request, res: Response) -> (Request, Response) {
        self.queue.dispatch(req, res, self.index).await
    }

    /// Short-circuits into the error protocol with the default `500` status.
    /// Middleware after the caller never execute, nor does the terminal
    /// handler.
    pub async fn fail(
        self,
        req: Request,
        res: Response,
        err: impl Into<QueueError>,
    ) -> (Request, Response) {
        Queue::handle_error(req, res, err.into(), StatusCode::INTERNAL_SERVER_ERROR)
    }

    /// Short-circuits with an explicit status, e.g. `413` from a body-limit
    /// middleware.
    pub async fn fail_with_status(
        self,
        req: Request,
        res: Response,
        err: impl Into<QueueError>,
        status: StatusCode,
    ) -> (Request, Response) {
        Queue::handle_error(req, res, err.into(), status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::method::Method;
    use serde_json::json;

    /// Middleware appending `tag` to the request's "trail" attribute.
    fn stamp(tag: &'static str) -> Arc<dyn Middleware> {
        Arc::new(move |mut req: Request, res: Response, next: Next| async move {
            let trail = req.attribute_str("trail").unwrap_or("").to_owned();
            req.set_attribute("trail", format!("{trail}{tag}"));
            next.run(req, res).await
        })
    }

    /// Terminal handler echoing the accumulated trail.
    async fn echo_trail(req: Request, mut res: Response) -> (Request, Response) {
        let trail = req.attribute_str("trail").unwrap_or("").to_owned();
        res.send(trail);
        (req, res)
    }

    fn stamped_queue(extra: Vec<Arc<dyn Middleware>>) -> Queue {
        let mut stack = vec![stamp("mw1"), stamp("mw2"), stamp("mw3")];
        stack.extend(extra);
        Queue::new(stack, echo_trail)
    }

    fn exchange() -> (Request, Response) {
        (Request::new(Method::Get, "/"), Response::new())
    }

    #[tokio::test]
    async fn empty_queue_goes_straight_to_terminal() {
        let queue = Queue::new(Vec::new(), |req: Request, mut res: Response| async move {
            res.send("worked");
            (req, res)
        });

        let (req, res) = exchange();
        let (_, res) = queue.handle(req, res).await;

        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(res.body(), b"worked");
    }

    #[tokio::test]
    async fn middleware_run_in_insertion_order() {
        let queue = stamped_queue(Vec::new());

        let (req, res) = exchange();
        let (_, res) = queue.handle(req, res).await;

        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(res.body(), b"mw1mw2mw3");
    }

    #[tokio::test]
    async fn string_error_short_circuits_with_500() {
        let queue = stamped_queue(vec![
            Arc::new(|req: Request, res: Response, next: Next| async move {
                next.fail(req, res, "Error test").await
            }),
            // must never run
            stamp("unreachable"),
        ]);

        let (req, res) = exchange();
        let (req, res) = queue.handle(req, res).await;

        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(res.body(), b"Error test");
        assert_eq!(res.header("content-type"), Some("text/html"));
        // the chain stopped at the failing middleware
        assert_eq!(req.attribute_str("trail"), Some("mw1mw2mw3"));
    }

    #[tokio::test]
    async fn error_status_can_be_overridden() {
        let queue = stamped_queue(vec![Arc::new(
            |req: Request, res: Response, next: Next| async move {
                next.fail_with_status(req, res, "Error test", StatusCode::PAYLOAD_TOO_LARGE)
                    .await
            },
        )]);

        let (req, res) = exchange();
        let (_, res) = queue.handle(req, res).await;

        assert_eq!(res.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(res.body(), b"Error test");
    }

    #[tokio::test]
    async fn structured_error_is_sent_as_json() {
        let queue = stamped_queue(vec![Arc::new(
            |req: Request, res: Response, next: Next| async move {
                next.fail(req, res, json!({ "error": "nope" })).await
            },
        )]);

        let (req, res) = exchange();
        let (_, res) = queue.handle(req, res).await;

        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(res.header("content-type"), Some("application/json"));
        assert_eq!(res.body(), br#"{"error":"nope"}"#);
    }

    #[tokio::test]
    async fn callback_error_that_ends_the_response() {
        let queue = stamped_queue(vec![Arc::new(
            |req: Request, res: Response, next: Next| async move {
                let cb = QueueError::handler(|_req, res| res.send("Error test"));
                next.fail(req, res, cb).await
            },
        )]);

        let (req, res) = exchange();
        let (_, res) = queue.handle(req, res).await;

        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(res.body(), b"Error test");
        assert!(res.ended());
    }

    #[tokio::test]
    async fn callback_error_without_end_is_ended_by_the_queue() {
        let queue = stamped_queue(vec![Arc::new(
            |req: Request, res: Response, next: Next| async move {
                let cb = QueueError::handler(|_req, res| res.write("Error test"));
                next.fail(req, res, cb).await
            },
        )]);

        let (req, res) = exchange();
        let (_, res) = queue.handle(req, res).await;

        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(res.body(), b"Error test");
        assert!(res.ended());
    }

    #[tokio::test]
    async fn error_after_completed_response_is_a_no_op() {
        let queue = stamped_queue(vec![Arc::new(
            |req: Request, mut res: Response, next: Next| async move {
                res.send("Res closed");
                next.fail(req, res, "Error test").await
            },
        )]);

        let (req, res) = exchange();
        let (_, res) = queue.handle(req, res).await;

        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(res.body(), b"Res closed");
    }

    #[tokio::test]
    async fn middleware_may_halt_the_chain_without_next() {
        let queue = Queue::new(
            vec![Arc::new(|req: Request, mut res: Response, _next: Next| async move {
                res.send("preflight");
                (req, res)
            })],
            |req: Request, mut res: Response| async move {
                res.send("terminal must not run");
                (req, res)
            },
        );

        let (req, res) = exchange();
        let (_, res) = queue.handle(req, res).await;

        assert_eq!(res.body(), b"preflight");
    }

    #[tokio::test]
    async fn one_queue_serves_concurrent_requests_independently() {
        let queue = stamped_queue(Vec::new());

        let a = queue.handle(Request::new(Method::Get, "/a"), Response::new());
        let b = queue.handle(Request::new(Method::Get, "/b"), Response::new());
        let ((_, res_a), (_, res_b)) = tokio::join!(a, b);

        assert_eq!(res_a.body(), b"mw1mw2mw3");
        assert_eq!(res_b.body(), b"mw1mw2mw3");
    }
}
