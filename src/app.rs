//! Application setup and request orchestration.
//!
//! [`App`] is the mutable setup surface: register global middleware, routes,
//! groups, and a custom 404 handler, then call [`App::build`]. Building
//! finalizes everything into an immutable [`Service`] — the object actually
//! shared across concurrent requests — whose global queue ends in route
//! resolution: match the path, attach the parameters, and hand the exchange
//! to the route's own queue.

use std::sync::{Arc, Mutex, OnceLock};

use http::StatusCode;
use tracing::debug;

use crate::error::Error;
use crate::handler::{BoxedMiddleware, BoxedRouteHandler, Middleware, RouteHandler};
use crate::method::Method;
use crate::queue::Queue;
use crate::request::Request;
use crate::response::Response;
use crate::route::Route;
use crate::router::Dispatcher;
use crate::server::Server;

// ── Options ──────────────────────────────────────────────────────────────────

/// Framework behavior toggles.
pub struct AppOptions {
    /// Strip a single trailing slash before dispatch (never for `"/"`).
    /// Default `true`.
    pub trim_trailing_slash: bool,
    /// Send an `x-powered-by: rill` response header. Default `true`.
    pub powered_by_header: bool,
}

impl Default for AppOptions {
    fn default() -> Self {
        Self {
            trim_trailing_slash: true,
            powered_by_header: true,
        }
    }
}

// ── Setup entries ────────────────────────────────────────────────────────────

struct RouteEntry {
    methods: Vec<Method>,
    path: String,
    handler: BoxedRouteHandler,
    middleware: Vec<BoxedMiddleware>,
    groups: Vec<usize>,
}

struct GroupEntry {
    middleware: Vec<BoxedMiddleware>,
}

/// Handle to a registered route, for attaching route-level middleware:
/// `app.get("/users", handler).add(auth)`.
pub struct RouteRef<'a> {
    entry: &'a mut RouteEntry,
}

impl RouteRef<'_> {
    pub fn add(self, middleware: impl Middleware) -> Self {
        self.entry.middleware.push(Arc::new(middleware));
        self
    }
}

/// Handle to a route group, for attaching middleware that applies to every
/// route registered inside the group (including nested groups).
pub struct GroupRef<'a> {
    entry: &'a mut GroupEntry,
}

impl GroupRef<'_> {
    pub fn add(self, middleware: impl Middleware) -> Self {
        self.entry.middleware.push(Arc::new(middleware));
        self
    }
}

// ── App ──────────────────────────────────────────────────────────────────────

/// The application under construction.
///
/// ```rust
/// use rill::{App, Request, Response};
///
/// let mut app = App::new();
/// app.get("/hello/{name}", |req: Request, res: Response| async move {
///     let greeting = format!("hello {}", req.param("name").unwrap_or("you"));
///     (req, res, greeting)
/// });
/// let service = app.build();
/// ```
pub struct App {
    routes: Vec<RouteEntry>,
    groups: Vec<GroupEntry>,
    middleware: Vec<BoxedMiddleware>,
    handler_404: Option<BoxedRouteHandler>,
    options: AppOptions,
    // registration context while inside `group` closures
    group_stack: Vec<usize>,
    prefix: String,
}

impl App {
    pub fn new() -> Self {
        Self::with_options(AppOptions::default())
    }

    pub fn with_options(options: AppOptions) -> Self {
        Self {
            routes: Vec::new(),
            groups: Vec::new(),
            middleware: Vec::new(),
            handler_404: None,
            options,
            group_stack: Vec::new(),
            prefix: String::new(),
        }
    }

    /// Appends a middleware to the global queue. First registered, first run.
    pub fn add(&mut self, middleware: impl Middleware) -> &mut Self {
        self.middleware.push(Arc::new(middleware));
        self
    }

    /// Registers `handler` for every method in `methods` under `path`
    /// (prefixed by the enclosing groups). Path parameters use `{name}`
    /// syntax.
    pub fn map(
        &mut self,
        methods: &[Method],
        path: &str,
        handler: impl RouteHandler,
    ) -> RouteRef<'_> {
        let mut full = format!("{}{}", self.prefix, path);
        if full.is_empty() {
            full.push('/');
        }

        let idx = self.routes.len();
        self.routes.push(RouteEntry {
            methods: methods.to_vec(),
            path: full,
            handler: handler.into_boxed_handler(),
            middleware: Vec::new(),
            groups: self.group_stack.clone(),
        });

        RouteRef {
            entry: &mut self.routes[idx],
        }
    }

    pub fn get(&mut self, path: &str, handler: impl RouteHandler) -> RouteRef<'_> {
        self.map(&[Method::Get], path, handler)
    }

    pub fn post(&mut self, path: &str, handler: impl RouteHandler) -> RouteRef<'_> {
        self.map(&[Method::Post], path, handler)
    }

    /// Legacy route answering both GET and POST.
    pub fn getpost(&mut self, path: &str, handler: impl RouteHandler) -> RouteRef<'_> {
        self.map(&[Method::Get, Method::Post], path, handler)
    }

    pub fn put(&mut self, path: &str, handler: impl RouteHandler) -> RouteRef<'_> {
        self.map(&[Method::Put], path, handler)
    }

    pub fn patch(&mut self, path: &str, handler: impl RouteHandler) -> RouteRef<'_> {
        self.map(&[Method::Patch], path, handler)
    }

    pub fn head(&mut self, path: &str, handler: impl RouteHandler) -> RouteRef<'_> {
        self.map(&[Method::Head], path, handler)
    }

    pub fn delete(&mut self, path: &str, handler: impl RouteHandler) -> RouteRef<'_> {
        self.map(&[Method::Delete], path, handler)
    }

    pub fn options(&mut self, path: &str, handler: impl RouteHandler) -> RouteRef<'_> {
        self.map(&[Method::Options], path, handler)
    }

    /// Registers `handler` under every routable method.
    pub fn any(&mut self, path: &str, handler: impl RouteHandler) -> RouteRef<'_> {
        self.map(&Method::ALL, path, handler)
    }

    /// Creates a route group. Routes registered inside `setup` share the
    /// prefix and any middleware later attached to the returned handle.
    /// Groups nest.
    pub fn group(&mut self, prefix: &str, setup: impl FnOnce(&mut App)) -> GroupRef<'_> {
        let id = self.groups.len();
        self.groups.push(GroupEntry {
            middleware: Vec::new(),
        });

        let saved_prefix = self.prefix.len();
        self.prefix.push_str(prefix);
        self.group_stack.push(id);

        setup(self);

        self.group_stack.pop();
        self.prefix.truncate(saved_prefix);

        GroupRef {
            entry: &mut self.groups[id],
        }
    }

    /// Installs a custom 404 handler. It follows the same
    /// return-value-as-response convention as route handlers.
    pub fn set_404(&mut self, handler: impl RouteHandler) {
        self.handler_404 = Some(handler.into_boxed_handler());
    }

    /// Finalizes the middleware and route tables into an immutable
    /// [`Service`]. The app is drained: register everything first, build
    /// once.
    pub fn build(&mut self) -> Service {
        let entries = std::mem::take(&mut self.routes);
        let groups = std::mem::take(&mut self.groups);
        let global = std::mem::take(&mut self.middleware);
        let handler_404 = self.handler_404.take();

        let mut dispatcher = Dispatcher::new();
        let mut routes = Vec::with_capacity(entries.len());

        for (id, entry) in entries.into_iter().enumerate() {
            for method in &entry.methods {
                dispatcher.insert(*method, &entry.path, id);
            }

            // group middleware wrap route middleware
            let mut middleware = Vec::new();
            for group in &entry.groups {
                middleware.extend(groups[*group].middleware.iter().cloned());
            }
            middleware.extend(entry.middleware);

            routes.push(Route::new(middleware, entry.handler));
        }

        let inner = Arc::new(ServiceInner {
            dispatcher,
            routes,
            handler_404,
            trim_trailing_slash: self.options.trim_trailing_slash,
            powered_by_header: self.options.powered_by_header,
        });

        let route_resolver = Arc::clone(&inner);
        let queue = Queue::new(global, move |req: Request, res: Response| {
            let inner = Arc::clone(&route_resolver);
            async move { inner.handle_route(req, res).await }
        });

        Service { inner, queue }
    }

    /// Builds the service and serves it on `addr` until shutdown.
    pub async fn listen(&mut self, addr: &str) -> Result<(), Error> {
        Server::bind(addr)?.serve(self.build()).await
    }
}

impl Default for App {
    fn default() -> Self {
        Self::new()
    }
}

// ── Shared instance ──────────────────────────────────────────────────────────

static SHARED: OnceLock<Mutex<App>> = OnceLock::new();

/// The process-wide application instance, lazily created on first use.
///
/// A convenience for small scripts; [`App::new`] is the primary API and the
/// one to use anywhere testability matters.
///
/// ```rust,no_run
/// # async fn run() -> Result<(), rill::Error> {
/// use rill::{Request, Response};
///
/// let mut app = rill::shared().lock().unwrap();
/// app.get("/", |req: Request, res: Response| async move { (req, res, "Hello World") });
/// app.listen("127.0.0.1:3000").await
/// # }
/// ```
pub fn shared() -> &'static Mutex<App> {
    SHARED.get_or_init(|| Mutex::new(App::new()))
}

// ── Service ──────────────────────────────────────────────────────────────────

/// A built application: the immutable object shared across concurrent
/// requests. Obtained from [`App::build`]; handed to
/// [`Server::serve`](crate::Server::serve) or driven directly in tests.
#[derive(Clone)]
pub struct Service {
    inner: Arc<ServiceInner>,
    queue: Queue,
}

impl Service {
    /// Runs one exchange: framework header, global middleware queue, then —
    /// as the global queue's terminal — route resolution and the route's own
    /// queue.
    pub async fn handle(&self, req: Request, mut res: Response) -> (Request, Response) {
        if self.inner.powered_by_header {
            res.set_header("x-powered-by", "rill");
        }

        self.queue.handle(req, res).await
    }
}

struct ServiceInner {
    dispatcher: Dispatcher,
    routes: Vec<Route>,
    handler_404: Option<BoxedRouteHandler>,
    trim_trailing_slash: bool,
    powered_by_header: bool,
}

impl ServiceInner {
    async fn handle_route(&self, mut req: Request, mut res: Response) -> (Request, Response) {
        let path = {
            let p = req.path();
            if self.trim_trailing_slash && p != "/" && p.ends_with('/') {
                p[..p.len() - 1].to_owned()
            } else {
                p.to_owned()
            }
        };

        match self.dispatcher.dispatch(req.method(), &path) {
            Some((id, params)) => {
                res.set_status(StatusCode::OK);
                req.set_params(params);
                self.routes[id].handle(req, res).await
            }
            None => self.handle_404(req, res).await,
        }
    }

    async fn handle_404(&self, req: Request, mut res: Response) -> (Request, Response) {
        debug!(method = %req.method(), path = %req.path(), "no route matched");
        res.set_status(StatusCode::NOT_FOUND);

        match &self.handler_404 {
            Some(handler) => {
                let (req, mut res, reply) = handler.call(req, res).await;

                if let Some(payload) = reply {
                    if !res.ended() {
                        res.send(payload);
                    }
                }

                (req, res)
            }
            None => {
                res.end();
                (req, res)
            }
        }
    }
}
