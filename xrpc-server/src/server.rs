//! The XML-RPC route and a standalone HTTP server
//!
//! [`router`] assembles the pieces into an axum [`Router`]: the
//! [`xml_rpc`] step in front of a `POST` route on the engine's configured
//! path, answered by [`handle_call`]. Every answer is `200 OK` with
//! `Content-Type: text/xml`, faults included.
//!
//! [`XmlRpcServer`] binds that router to a TCP socket for programs that do
//! not already run an axum application.
//!
//! # Examples
//!
//! ```rust,no_run
//! use xrpc_server::{from_fn, Engine, XmlRpcServer};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let engine = Engine::builder()
//!         .handler("echo", from_fn(|params, reply| {
//!             reply.ok(params);
//!             Ok(())
//!         }))
//!         .build()?;
//!
//!     let server = XmlRpcServer::bind("127.0.0.1:3000", engine).await?;
//!     println!("listening on {}", server.local_addr()?);
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

use crate::dispatch::{Engine, Exchange};
use crate::middleware::{xml_rpc, XmlRpcBody};
use axum::{
    extract::{Request, State},
    http::{header, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::post,
    Router,
};
use std::future::Future;
use std::net::SocketAddr;
use tokio::net::{TcpListener, ToSocketAddrs};
use xrpc_core::{Error, ParseError, Result};

/// Router serving the engine's methods on its configured path
pub fn router(engine: Engine) -> Router {
    let path = engine.config().route_path();
    Router::new()
        .route(&path, post(handle_call))
        .layer(middleware::from_fn_with_state(engine.clone(), xml_rpc))
        .with_state(engine)
}

/// Route step: dispatch the decoded body and answer with XML
///
/// A request that never went through [`xml_rpc`] (wrong `Content-Type`)
/// carries no parse outcome and is answered with fault `-32700`.
pub async fn handle_call(State(engine): State<Engine>, request: Request) -> Response {
    let (mut parts, _body) = request.into_parts();
    let call = match parts.extensions.remove::<XmlRpcBody>() {
        Some(body) => body.into_inner(),
        None => Err(ParseError::Malformed(
            "request body was not processed as text/xml".to_string(),
        )),
    };

    let exchange = engine.call(call, parts.headers).await;
    xml_response(exchange)
}

/// Serialize an exchange as a `text/xml` response
///
/// When the exchange carries an invocation failure it is attached to the
/// response extensions, so outer layers can observe it.
pub fn xml_response(exchange: Exchange) -> Response {
    let body = exchange.to_xml();
    let mut response = (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/xml")],
        body,
    )
        .into_response();
    if let Some(failure) = exchange.invocation_error {
        response.extensions_mut().insert(failure);
    }
    response
}

/// HTTP server bound to a TCP socket
pub struct XmlRpcServer {
    listener: TcpListener,
    router: Router,
}

impl XmlRpcServer {
    /// Bind a listener serving [`router`] for `engine`
    pub async fn bind(addr: impl ToSocketAddrs, engine: Engine) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| Error::Io(e.to_string()))?;
        Ok(Self::from_listener(listener, router(engine)))
    }

    /// Serve an arbitrary router, e.g. one the endpoint was merged into
    pub fn from_listener(listener: TcpListener, router: Router) -> Self {
        Self { listener, router }
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Serve until the process exits or serving fails
    #[tracing::instrument(skip(self), name = "server.run")]
    pub async fn run(self) -> Result<()> {
        self.run_until(std::future::pending()).await
    }

    /// Serve until `shutdown` resolves, then drain in-flight requests
    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = self.local_addr().map_err(|e| Error::Io(e.to_string()))?;
        tracing::info!(addr = %addr, "XML-RPC server ready");

        axum::serve(self.listener, self.router)
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| Error::Io(e.to_string()))?;

        tracing::info!(addr = %addr, "XML-RPC server stopped");
        Ok(())
    }
}

impl std::fmt::Debug for XmlRpcServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("XmlRpcServer")
            .field("addr", &self.listener.local_addr().ok())
            .finish_non_exhaustive()
    }
}
