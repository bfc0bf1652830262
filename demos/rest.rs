//! REST-style demo: CORS middleware, nested route groups, body parsing.
//!
//! Run with:
//!   RUST_LOG=info cargo run --example rest
//!
//! Try:
//!   curl http://localhost:3000/api/v1/posts
//!   curl -X POST http://localhost:3000/api/v1/posts \
//!        -H 'content-type: application/json' \
//!        -d '{"title":"hello"}'
//!   curl -X PUT http://localhost:3000/api/v1/posts/7 \
//!        -H 'content-type: application/json' \
//!        -d '{"title":"edited"}'
//!   curl -X OPTIONS -i http://localhost:3000/api/v1/posts

use rill::middleware::JsonBody;
use rill::{App, Method, Next, Request, Response};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let mut app = App::new();

    // simple CORS; preflights are answered here and the chain halts
    app.add(|req: Request, mut res: Response, next: Next| async move {
        res.set_header("access-control-allow-origin", "*");
        res.set_header("access-control-allow-credentials", "true");
        res.set_header(
            "access-control-allow-headers",
            "X-Requested-With, Content-Type, Accept, Origin, Authorization",
        );

        if req.method() == Method::Options {
            res.set_header(
                "access-control-allow-methods",
                "GET, POST, PUT, DELETE, OPTIONS",
            );
            res.send("");
            return (req, res);
        }

        next.run(req, res).await
    });

    app.set_404(|req: Request, res: Response| async move { (req, res, "Page not found") });

    app.get("/", |req: Request, res: Response| async move {
        (req, res, "Hello World")
    });

    app.group("/api/v1", |app| {
        app.group("/posts", |app| {
            app.get("", |req: Request, res: Response| async move {
                (req, res, "get all posts")
            });

            app.post("", |req: Request, res: Response| async move {
                let title = req
                    .json()
                    .and_then(|v| v["title"].as_str())
                    .unwrap_or("untitled")
                    .to_owned();
                (req, res, format!("new post created: {title}"))
            })
            .add(JsonBody::new());

            app.group("/{id}", |app| {
                app.get("", |req: Request, res: Response| async move {
                    let text = format!("Post: {}", req.param("id").unwrap_or("?"));
                    (req, res, text)
                });

                app.put("", |req: Request, res: Response| async move {
                    let text = format!("Post: {} edited", req.param("id").unwrap_or("?"));
                    (req, res, text)
                })
                .add(JsonBody::new());

                app.delete("", |req: Request, res: Response| async move {
                    let text = format!("Post: {} deleted", req.param("id").unwrap_or("?"));
                    (req, res, text)
                });
            });
        });
    });

    app.listen("127.0.0.1:3000").await.expect("server error");
}
