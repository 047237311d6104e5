//! XML-RPC endpoint for axum applications
//!
//! This crate turns a tree of method handlers into an XML-RPC endpoint. It
//! decodes `text/xml` request bodies incrementally as they stream in,
//! resolves the method path against the registry, invokes the handler, and
//! answers with a `methodResponse` document or a fault.
//!
//! # Core Features
//!
//! - **Streaming Decode**: Bodies are parsed chunk by chunk; no full-body
//!   buffering is needed before parsing starts
//! - **Method Tree**: Nested namespaces resolved from `a.b` or `a[b]` paths
//! - **Completion Continuation**: Handlers answer through a [`Responder`],
//!   synchronously or from a later task, exactly once
//! - **Faults**: Parse failures, unknown methods and handler errors all map
//!   to standard fault codes
//! - **Pass-through**: Requests that are not `text/xml` reach downstream
//!   routes untouched
//! - **Observability**: OpenTelemetry traces and metrics
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use serde::Deserialize;
//! use xrpc_server::{from_typed_fn, Engine, XmlRpcServer};
//!
//! #[derive(Deserialize)]
//! struct AddParams { a: i32, b: i32 }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let engine = Engine::builder()
//!         .path("/RPC2")
//!         .handler("math.add", from_typed_fn(|p: AddParams| async move {
//!             Ok(p.a + p.b)
//!         }))
//!         .build()?;
//!
//!     XmlRpcServer::bind("127.0.0.1:3000", engine).await?.run().await?;
//!     Ok(())
//! }
//! ```
//!
//! # Request Flow
//!
//! 1. [`xml_rpc`] checks `Content-Type`; anything but `text/xml` passes
//!    through
//! 2. The body is streamed through a [`Parser`](xrpc_core::Parser); the
//!    outcome is stored as an [`XmlRpcBody`] extension and the raw body is
//!    re-attached
//! 3. [`handle_call`] hands the outcome to [`Engine::dispatch`]
//! 4. The single [`Exchange`] is serialized as a `200 OK` `text/xml` answer
//!
//! # Embedding
//!
//! [`router`] returns a plain axum [`Router`](axum::Router), so the endpoint
//! can be merged into an existing application:
//!
//! ```rust
//! use axum::{routing::get, Router};
//! use xrpc_server::{router, Engine};
//!
//! # fn example() -> xrpc_core::Result<()> {
//! let engine = Engine::builder().path("/rpc").build()?;
//! let app: Router = Router::new()
//!     .route("/health", get(|| async { "ok" }))
//!     .merge(router(engine));
//! # Ok(())
//! # }
//! ```

pub mod builder;
pub mod dispatch;
pub mod handler;
pub mod metrics;
pub mod middleware;
pub mod registry;
pub mod server;

pub use builder::EngineBuilder;
pub use dispatch::{Engine, EngineConfig, ErrorHook, Exchange, InvocationFailure};
pub use handler::{
    from_async_fn, from_context_fn, from_fn, from_typed_fn, CallContext, ExchangeSink, Handler,
    HandlerError, HandlerResult, Responder, NO_RESPONSE_MESSAGE,
};
pub use metrics::ServerMetrics;
pub use middleware::{is_xml_rpc, xml_rpc, XmlRpcBody};
pub use registry::{normalize_path, MethodProvider, Registry, RegistryBuilder, RegistryNode};
pub use server::{handle_call, router, xml_response, XmlRpcServer};
