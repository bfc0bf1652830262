//! # rill
//!
//! A minimal middleware-first HTTP framework.
//!
//! ## The contract
//!
//! A request flows through exactly one pipeline: the global middleware
//! queue, then route resolution, then the matched route's own middleware
//! queue, then the route handler. Every stage gets the same three-way
//! choice — continue the chain, short-circuit into the error protocol, or
//! complete the response itself. The queue is the framework; routing is
//! delegated to [`matchit`] and the wire to [`hyper`].
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use rill::{App, Next, Request, Response};
//!
//! #[tokio::main]
//! async fn main() {
//!     let mut app = App::new();
//!
//!     // global middleware
//!     app.add(|mut req: Request, res: Response, next: Next| async move {
//!         req.set_attribute("trace-id", "abc123");
//!         next.run(req, res).await
//!     });
//!
//!     // routes return a value to have it sent, or write the response
//!     // themselves and return ()
//!     app.get("/users/{id}", |req: Request, res: Response| async move {
//!         let id = req.param("id").unwrap_or("unknown").to_owned();
//!         (req, res, serde_json::json!({ "id": id }))
//!     });
//!
//!     app.listen("0.0.0.0:3000").await.expect("server error");
//! }
//! ```
//!
//! ## Erroring out of a chain
//!
//! Middleware report failures through their [`Next`] continuation instead of
//! a return type: a plain message, a structured value (sent as JSON), or a
//! callback that writes the error response itself. Whatever happens, the
//! client gets a response — an error raised after the response has ended is
//! a no-op, never a double write.
//!
//! ```rust
//! use http::StatusCode;
//! use rill::{App, Next, Request, Response};
//!
//! let mut app = App::new();
//! app.add(|req: Request, res: Response, next: Next| async move {
//!     if req.header("authorization").is_none() {
//!         return next.fail_with_status(req, res, "missing token", StatusCode::UNAUTHORIZED).await;
//!     }
//!     next.run(req, res).await
//! });
//! ```

mod app;
mod error;
mod handler;
mod method;
mod queue;
mod request;
mod response;
mod route;
mod router;
mod server;

pub mod middleware;

pub use app::{App, AppOptions, GroupRef, RouteRef, Service, shared};
pub use error::Error;
pub use handler::{BoxFuture, Middleware, RouteHandler, TerminalHandler};
pub use method::Method;
pub use queue::{ErrorHandler, Next, Queue, QueueError};
pub use request::{BodyError, Request};
pub use response::{IntoReply, Payload, Response};
pub use server::Server;
