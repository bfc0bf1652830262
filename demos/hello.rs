//! Smallest possible rill app, using the process-wide shared instance.
//!
//! Run with:
//!   RUST_LOG=info cargo run --example hello
//!
//! Try:
//!   curl http://localhost:3000/

use rill::{Request, Response};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let mut app = rill::shared().lock().unwrap();

    app.get("/", |req: Request, res: Response| async move {
        (req, res, "Hello World")
    });

    app.listen("127.0.0.1:3000").await.expect("server error");
}
