//! XRPC - XML-RPC for axum
//!
//! This is the main convenience crate that re-exports all XRPC sub-crates.
//! Use this crate if you want a single dependency for the wire engine, the
//! axum endpoint and the REST proxy.
//!
//! # Architecture
//!
//! XRPC is organized into modular crates:
//!
//! - **xrpc-core**: Value model, streaming parser, serializer, faults,
//!   observability
//! - **xrpc-server**: Method registry, dispatch, the `text/xml` request step
//!   and the axum route
//! - **xrpc-proxy**: REST routes exposed as forwarding XML-RPC actions
//!
//! # Quick Start - Server
//!
//! ```rust,no_run
//! use xrpc::server::{from_fn, Engine};
//! use xrpc::XmlRpcServer;
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
//!     XmlRpcServer::bind("127.0.0.1:3000", engine).await?.run().await?;
//!     Ok(())
//! }
//! ```
//!
//! # Quick Start - Parsing
//!
//! ```rust
//! use xrpc::{Parser, Value};
//!
//! let mut parser = Parser::new();
//! parser.feed("<methodCall><methodName>sum</meth").unwrap();
//! parser.feed("odName><params><param><value><int>4</int></value></param></params>").unwrap();
//! parser.feed("</methodCall>").unwrap();
//!
//! let call = parser.finish().unwrap();
//! assert_eq!(call.method_name, "sum");
//! assert_eq!(call.params, vec![Value::Integer(4)]);
//! ```

// Re-export all public APIs from sub-crates
pub use xrpc_core as core;
pub use xrpc_proxy as proxy;
pub use xrpc_server as server;

// Convenience re-exports of the most commonly used types
pub use xrpc_core::{Fault, MethodCall, MethodResponse, Parser, Value};
pub use xrpc_proxy::XmlRpcProxy;
pub use xrpc_server::{Engine, XmlRpcServer};
