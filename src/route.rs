//! Route wrapper: a per-route middleware queue around the user handler.
//!
//! A route's queue is built lazily on the first request that reaches it and
//! cached for the life of the service. `OnceLock` guards the construction, so
//! concurrent first requests on the multi-threaded runtime build it exactly
//! once.

use std::sync::{Arc, OnceLock};

use crate::handler::{BoxedMiddleware, BoxedRouteHandler};
use crate::queue::Queue;
use crate::request::Request;
use crate::response::Response;

pub(crate) struct Route {
    /// Group-level middleware first, then route-level, in registration order.
    middleware: Vec<BoxedMiddleware>,
    handler: BoxedRouteHandler,
    queue: OnceLock<Queue>,
}

impl Route {
    pub(crate) fn new(middleware: Vec<BoxedMiddleware>, handler: BoxedRouteHandler) -> Self {
        Self {
            middleware,
            handler,
            queue: OnceLock::new(),
        }
    }

    /// Dispatches the exchange through this route's queue, building it on
    /// first use.
    pub(crate) async fn handle(&self, req: Request, res: Response) -> (Request, Response) {
        let queue = self.queue.get_or_init(|| self.build_queue());
        queue.handle(req, res).await
    }

    /// Assembles the route queue. The terminal invokes the user handler and
    /// applies the return-value-as-response convention: a non-empty reply is
    /// sent automatically unless the handler already ended the response.
    fn build_queue(&self) -> Queue {
        let handler = Arc::clone(&self.handler);

        Queue::new(self.middleware.clone(), move |req: Request, res: Response| {
            let handler = Arc::clone(&handler);
            async move {
                let (req, mut res, reply) = handler.call(req, res).await;

                if let Some(payload) = reply {
                    if !res.ended() {
                        res.send(payload);
                    }
                }

                (req, res)
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::{Middleware, RouteHandler};
    use crate::method::Method;
    use crate::queue::Next;
    use http::StatusCode;

    fn route(handler: impl RouteHandler) -> Route {
        Route::new(Vec::new(), handler.into_boxed_handler())
    }

    async fn dispatch(route: &Route) -> Response {
        let (_, res) = route
            .handle(Request::new(Method::Get, "/"), Response::new())
            .await;
        res
    }

    #[tokio::test]
    async fn returned_value_is_sent_automatically() {
        let route = route(|req: Request, res: Response| async move { (req, res, "hello world") });

        let res = dispatch(&route).await;
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(res.body(), b"hello world");
        assert!(res.ended());
    }

    #[tokio::test]
    async fn handler_writing_directly_returns_unit() {
        let route = route(|req: Request, mut res: Response| async move {
            res.text("written by hand");
            (req, res, ())
        });

        let res = dispatch(&route).await;
        assert_eq!(res.body(), b"written by hand");
        assert_eq!(res.header("content-type"), Some("text/plain; charset=utf-8"));
    }

    #[tokio::test]
    async fn return_value_does_not_overwrite_an_ended_response() {
        let route = route(|req: Request, mut res: Response| async move {
            res.send("already sent");
            (req, res, "ignored")
        });

        let res = dispatch(&route).await;
        assert_eq!(res.body(), b"already sent");
    }

    #[tokio::test]
    async fn queue_is_built_once_and_reused() {
        let route = route(|req: Request, res: Response| async move { (req, res, "cached") });

        let res = dispatch(&route).await;
        assert_eq!(res.body(), b"cached");
        let first_ptr = route.queue.get().map(Queue::shared_ptr);

        let res = dispatch(&route).await;
        assert_eq!(res.body(), b"cached");
        let second_ptr = route.queue.get().map(Queue::shared_ptr);

        assert!(first_ptr.is_some());
        assert_eq!(first_ptr, second_ptr);
    }

    #[tokio::test]
    async fn route_middleware_runs_before_the_handler() {
        let mw: Arc<dyn Middleware> =
            Arc::new(|mut req: Request, res: Response, next: Next| async move {
                req.set_attribute("who", "middleware");
                next.run(req, res).await
            });

        let handler = |req: Request, res: Response| async move {
            let who = req.attribute_str("who").unwrap_or("nobody").to_owned();
            (req, res, who)
        };

        let route = Route::new(vec![mw], handler.into_boxed_handler());
        let (_, res) = route
            .handle(Request::new(Method::Get, "/"), Response::new())
            .await;

        assert_eq!(res.body(), b"middleware");
    }
}
