//! REST routes exposed as XML-RPC actions
//!
//! This crate puts an XML-RPC face on a REST service. Each configured route
//! becomes an action whose name is derived from the HTTP method and path
//! template (`GET /user/:id` → `getUserId`); calling the action forwards the
//! call to the upstream route over HTTP.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use axum::Router;
//! use xrpc_proxy::{ProxyConfig, ProxyRoute, XmlRpcProxy};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let proxy = XmlRpcProxy::new(
//!         ProxyConfig::new("http://127.0.0.1:8080")?,
//!         vec![
//!             ProxyRoute::get("/"),
//!             ProxyRoute::get("/users"),
//!             ProxyRoute::get("/user/:id"),
//!         ],
//!     )?;
//!
//!     // XML-RPC endpoint on /rpc
//!     let app: Router = proxy.mount(Router::new())?;
//!     let listener = tokio::net::TcpListener::bind("127.0.0.1:3000").await?;
//!     axum::serve(listener, app).await?;
//!     Ok(())
//! }
//! ```

pub mod naming;
pub mod proxy;

pub use naming::action_name;
pub use proxy::{
    ProxyConfig, ProxyError, ProxyRoute, XmlRpcProxy, DEFAULT_PROXY_PATH, DEFAULT_TIMEOUT,
};
