//! Common test utilities for xrpc-proxy integration tests
//!
//! Provides a real axum upstream on an ephemeral port so forwarding is
//! tested over an actual socket.

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, Method, Request, StatusCode};
use axum::routing::{get, post};
use axum::Router;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

/// A request the upstream received
#[derive(Debug, Clone)]
pub struct Received {
    pub method: Method,
    pub content_type: Option<String>,
    pub body: String,
}

/// REST service the proxy forwards to
pub struct MockUpstream {
    pub addr: SocketAddr,
    received: mpsc::UnboundedReceiver<Received>,
}

impl MockUpstream {
    /// Start the upstream on `127.0.0.1:0`
    pub async fn start() -> Self {
        let (tx, received) = mpsc::unbounded_channel();
        let app = Router::new()
            .route("/", get(|| async { "root" }))
            .route("/users", get(|| async { "users" }))
            .route(
                "/user/:id",
                get(|Path(id): Path<String>| async move { format!("user {}", id) }),
            )
            .route("/echo", post(echo))
            .route(
                "/fail",
                get(|| async { (StatusCode::SERVICE_UNAVAILABLE, "down") }),
            )
            .with_state(tx);

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Self { addr, received }
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Next request recorded by `/echo`
    pub async fn next_received(&mut self) -> Option<Received> {
        self.received.recv().await
    }
}

async fn echo(
    State(tx): State<mpsc::UnboundedSender<Received>>,
    method: Method,
    headers: HeaderMap,
    body: String,
) -> String {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(String::from);
    let _ = tx.send(Received {
        method,
        content_type,
        body: body.clone(),
    });
    body
}

/// Address nothing listens on
pub async fn closed_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

/// A `text/xml` POST of `body` to `uri`
pub fn xml_post(uri: &str, body: String) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "text/xml")
        .body(Body::from(body))
        .unwrap()
}

/// Response body as text
pub async fn body_text(response: axum::response::Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), 1 << 20)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}
