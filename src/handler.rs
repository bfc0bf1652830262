//! Handler traits and type erasure.
//!
//! # How async middleware and handlers are stored
//!
//! The queue needs to hold middleware of *different* concrete types in one
//! ordered list, and routes need to store user handlers of different types in
//! one table. Rust collections hold one concrete type, so both are stored as
//! **trait objects** behind `Arc`, with blanket impls bridging plain async
//! closures into the trait world.
//!
//! Everything flows by value: a middleware receives `(Request, Response,
//! Next)` owned and must hand the pair back, either by running the
//! continuation or by completing the response itself. That makes the futures
//! `'static` and `Send` with no lifetime gymnastics, and the type system
//! guarantees every chain returns the exchange to the server glue.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::queue::Next;
use crate::request::Request;
use crate::response::{IntoReply, Payload, Response};

/// A heap-allocated, type-erased future.
///
/// `Pin<Box<…>>` because the runtime polls futures in place; `Send` so tokio
/// may move them across worker threads.
pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send + 'static>>;

// ── Middleware ───────────────────────────────────────────────────────────────

/// A unit of request-processing logic invoked in sequence before the final
/// handler.
///
/// Usually written as a closure — the blanket impl covers any
/// `Fn(Request, Response, Next)` returning a future of the pair:
///
/// ```rust
/// use rill::{App, Next, Request, Response};
///
/// let mut app = App::new();
/// app.add(|mut req: Request, res: Response, next: Next| async move {
///     req.set_attribute("trace-id", "abc123");
///     next.run(req, res).await
/// });
/// ```
///
/// A middleware has three exits:
/// - `next.run(req, res)` — continue the chain;
/// - `next.fail(..)` / `next.fail_with_status(..)` — short-circuit into the
///   error protocol;
/// - return `(req, res)` without touching `next` — halt the chain silently
///   (used by CORS-preflight short-circuiting).
///
/// Implement the trait directly for configurable middleware structs; see
/// [`BodyReader`](crate::middleware::BodyReader).
pub trait Middleware: Send + Sync + 'static {
    fn call(&self, req: Request, res: Response, next: Next) -> BoxFuture<(Request, Response)>;
}

pub(crate) type BoxedMiddleware = Arc<dyn Middleware>;

impl<F, Fut> Middleware for F
where
    F: Fn(Request, Response, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = (Request, Response)> + Send + 'static,
{
    fn call(&self, req: Request, res: Response, next: Next) -> BoxFuture<(Request, Response)> {
        Box::pin(self(req, res, next))
    }
}

// ── Terminal handler ─────────────────────────────────────────────────────────

/// The function a [`Queue`](crate::Queue) invokes once its middleware list is
/// exhausted without error.
pub trait TerminalHandler: Send + Sync + 'static {
    fn call(&self, req: Request, res: Response) -> BoxFuture<(Request, Response)>;
}

pub(crate) type BoxedTerminal = Arc<dyn TerminalHandler>;

impl<F, Fut> TerminalHandler for F
where
    F: Fn(Request, Response) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = (Request, Response)> + Send + 'static,
{
    fn call(&self, req: Request, res: Response) -> BoxFuture<(Request, Response)> {
        Box::pin(self(req, res))
    }
}

// ── Route handler ────────────────────────────────────────────────────────────

/// Internal dispatch interface for user route handlers.
///
/// `#[doc(hidden)] pub` rather than `pub(crate)` because it appears in the
/// return type of the public `RouteHandler` trait's `into_boxed_handler`
/// method. External crates cannot usefully interact with it.
#[doc(hidden)]
pub trait ErasedRouteHandler: Send + Sync + 'static {
    fn call(&self, req: Request, res: Response) -> BoxFuture<(Request, Response, Option<Payload>)>;
}

#[doc(hidden)]
pub type BoxedRouteHandler = Arc<dyn ErasedRouteHandler>;

/// Implemented for every valid route handler.
///
/// You never implement this yourself. It is automatically satisfied for any
/// async closure of the shape:
///
/// ```text
/// |req: Request, res: Response| async move { (req, res, reply) }
/// ```
///
/// where `reply` is anything implementing [`IntoReply`]: `()` for handlers
/// that write the response themselves, or a string / JSON value to have it
/// sent automatically.
///
/// The trait is **sealed** (via the private `Sealed` supertrait): only the
/// blanket impl below can satisfy it, which keeps the API surface stable.
pub trait RouteHandler: private::Sealed + Send + Sync + 'static {
    #[doc(hidden)]
    fn into_boxed_handler(self) -> BoxedRouteHandler;
}

mod private {
    pub trait Sealed {}
}

impl<F, Fut, R> private::Sealed for F
where
    F: Fn(Request, Response) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = (Request, Response, R)> + Send + 'static,
    R: IntoReply + Send + 'static,
{
}

impl<F, Fut, R> RouteHandler for F
where
    F: Fn(Request, Response) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = (Request, Response, R)> + Send + 'static,
    R: IntoReply + Send + 'static,
{
    fn into_boxed_handler(self) -> BoxedRouteHandler {
        Arc::new(FnHandler(self))
    }
}

/// Newtype bridging a concrete handler into the trait-object world, mapping
/// its typed reply to the canonical `Option<Payload>`.
struct FnHandler<F>(F);

impl<F, Fut, R> ErasedRouteHandler for FnHandler<F>
where
    F: Fn(Request, Response) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = (Request, Response, R)> + Send + 'static,
    R: IntoReply + Send + 'static,
{
    fn call(&self, req: Request, res: Response) -> BoxFuture<(Request, Response, Option<Payload>)> {
        let fut = (self.0)(req, res);
        Box::pin(async move {
            let (req, res, reply) = fut.await;
            (req, res, reply.into_reply())
        })
    }
}
