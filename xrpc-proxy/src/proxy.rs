//! XML-RPC actions forwarded to REST routes
//!
//! An [`XmlRpcProxy`] turns an explicit list of REST routes into XML-RPC
//! actions, one per route, named with [`action_name`]. Calling an action
//! forwards the call to the upstream service:
//!
//! 1. `:param` segments of the route path are filled from the members of
//!    the call's single struct param
//! 2. The call is re-serialized as a `methodCall` document and sent with the
//!    route's HTTP method and `Content-Type: text/xml`
//! 3. A `2xx` answer completes the call with the response body as a string
//!
//! | Outcome | Answer |
//! |---|---|
//! | `2xx` | body text as `<string>` |
//! | other status | fault, code = HTTP status |
//! | missing path member | fault `-32602` |
//! | connection failure / timeout | fault `-32300` |
//!
//! # Examples
//!
//! ```rust,no_run
//! use axum::Router;
//! use xrpc_proxy::{ProxyConfig, ProxyRoute, XmlRpcProxy};
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let proxy = XmlRpcProxy::new(
//!     ProxyConfig::new("http://127.0.0.1:8080")?,
//!     vec![ProxyRoute::get("/users"), ProxyRoute::get("/user/:id")],
//! )?;
//!
//! assert!(proxy.registry().contains("getUserId"));
//! let app: Router = proxy.mount(Router::new())?;
//! # Ok(())
//! # }
//! ```

use crate::naming::action_name;
use reqwest::{header, Client, Method, Url};
use std::time::Duration;
use thiserror::Error;
use tracing::Instrument;
use xrpc_core::{codec, Fault, MethodCall, Value};
use xrpc_server::{
    router, CallContext, Engine, Handler, HandlerResult, Registry, RegistryBuilder, Responder,
};

/// Default mount path of the proxy endpoint
pub const DEFAULT_PROXY_PATH: &str = "/rpc";

/// Default timeout for one forwarded request
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Errors raised while configuring a proxy
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("Invalid upstream URL {url}: {reason}")]
    InvalidUpstream { url: String, reason: String },

    #[error("Failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

/// Proxy settings
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    /// Route the proxy endpoint is mounted on
    pub path: String,
    /// Base URL route paths are appended to
    pub upstream: Url,
    /// Timeout for one forwarded request
    pub timeout: Duration,
}

impl ProxyConfig {
    /// Settings forwarding to `upstream`, with the default path and timeout
    pub fn new(upstream: &str) -> Result<Self, ProxyError> {
        let url = Url::parse(upstream).map_err(|e| ProxyError::InvalidUpstream {
            url: upstream.to_string(),
            reason: e.to_string(),
        })?;
        if url.cannot_be_a_base() {
            return Err(ProxyError::InvalidUpstream {
                url: upstream.to_string(),
                reason: "URL cannot carry a path".to_string(),
            });
        }

        Ok(Self {
            path: DEFAULT_PROXY_PATH.to_string(),
            upstream: url,
            timeout: DEFAULT_TIMEOUT,
        })
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// One REST route exposed as an action
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyRoute {
    pub method: Method,
    /// Path template, `:name` marks a parameter segment
    pub path: String,
}

impl ProxyRoute {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// Action name this route is registered under
    pub fn action(&self) -> String {
        action_name(self.method.as_str(), &self.path)
    }
}

/// REST routes exposed as XML-RPC actions
#[derive(Debug, Clone)]
pub struct XmlRpcProxy {
    config: ProxyConfig,
    routes: Vec<ProxyRoute>,
    client: Client,
}

impl XmlRpcProxy {
    /// Create a proxy with a client honoring `config.timeout`
    pub fn new(config: ProxyConfig, routes: Vec<ProxyRoute>) -> Result<Self, ProxyError> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self::with_client(config, routes, client))
    }

    /// Create a proxy sending through an existing client
    pub fn with_client(config: ProxyConfig, routes: Vec<ProxyRoute>, client: Client) -> Self {
        Self {
            config,
            routes,
            client,
        }
    }

    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }

    pub fn routes(&self) -> &[ProxyRoute] {
        &self.routes
    }

    /// Registry with one forwarding action per route
    pub fn registry(&self) -> Registry {
        self.actions().build()
    }

    /// Engine serving the actions on the proxy path
    pub fn engine(&self) -> xrpc_core::Result<Engine> {
        Engine::builder()
            .path(self.config.path.clone())
            .registry(self.actions())
            .build()
    }

    /// Add the proxy endpoint to an application
    pub fn mount(&self, app: axum::Router) -> xrpc_core::Result<axum::Router> {
        Ok(app.merge(router(self.engine()?)))
    }

    fn actions(&self) -> RegistryBuilder {
        let mut actions = RegistryBuilder::new();
        for (rule, route) in self.routes.iter().enumerate() {
            let action = route.action();
            tracing::info!(
                rule,
                method = %route.method,
                path = %route.path,
                action = %action,
                "Configuring proxy rule"
            );
            actions = actions.handler(
                &action,
                Box::new(Forward {
                    route: route.clone(),
                    upstream: self.config.upstream.clone(),
                    client: self.client.clone(),
                }),
            );
        }
        actions
    }
}

/// Handler forwarding one action to its route
struct Forward {
    route: ProxyRoute,
    upstream: Url,
    client: Client,
}

impl Handler for Forward {
    fn call(&self, ctx: CallContext, _params: Value, reply: Responder) -> HandlerResult {
        let url = match self.url(&ctx.params) {
            Ok(url) => url,
            Err(fault) => {
                reply.fault(fault);
                return Ok(());
            }
        };

        let body = codec::render_call(&MethodCall::new(ctx.method.as_str(), ctx.params));
        let request = self
            .client
            .request(self.route.method.clone(), url.clone())
            .header(header::CONTENT_TYPE, "text/xml")
            .body(body);

        let span = tracing::info_span!(
            "xml_rpc.proxy",
            action = %ctx.method,
            method = %self.route.method,
            url = %url
        );
        let runtime = tokio::runtime::Handle::try_current()?;
        runtime.spawn(
            async move {
                reply.complete(forward(request).await);
            }
            .instrument(span),
        );
        Ok(())
    }
}

impl Forward {
    /// Upstream URL with `:param` segments filled in
    fn url(&self, params: &[Value]) -> Result<Url, Fault> {
        let members = match params {
            [Value::Struct(members)] => Some(members),
            _ => None,
        };

        let mut segments = Vec::new();
        for segment in self.route.path.split('/').filter(|s| !s.is_empty()) {
            let Some(name) = segment.strip_prefix(':') else {
                segments.push(segment.to_string());
                continue;
            };
            let value = members
                .and_then(|m| m.get(name))
                .ok_or_else(|| Fault::invalid_params(format!("missing route parameter {}", name)))?;
            segments.push(segment_text(name, value)?);
        }

        let mut url = self.upstream.clone();
        url.path_segments_mut()
            .map_err(|_| transport_fault("upstream URL cannot carry a path"))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }
}

fn segment_text(name: &str, value: &Value) -> Result<String, Fault> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Integer(i) => Ok(i.to_string()),
        Value::Double(d) => Ok(d.to_string()),
        Value::Boolean(b) => Ok(if *b { "1" } else { "0" }.to_string()),
        other => Err(Fault::invalid_params(format!(
            "route parameter {} cannot be a {}",
            name,
            other.kind()
        ))),
    }
}

fn transport_fault(error: impl std::fmt::Display) -> Fault {
    xrpc_core::Error::Transport(error.to_string()).to_fault()
}

async fn forward(request: reqwest::RequestBuilder) -> Result<Value, Fault> {
    let response = request.send().await.map_err(|e| {
        tracing::warn!(error = %e, "Upstream request failed");
        transport_fault(e)
    })?;

    let status = response.status();
    if !status.is_success() {
        tracing::debug!(status = status.as_u16(), "Upstream answered with an error status");
        return Err(Fault::new(
            i32::from(status.as_u16()),
            format!("upstream answered {}", status),
        ));
    }

    let body = response
        .text()
        .await
        .map_err(transport_fault)?;
    tracing::debug!(status = status.as_u16(), bytes = body.len(), "Upstream answered");
    Ok(Value::String(body))
}

#[cfg(test)]
mod tests {
    use super::*;
    use xrpc_core::Struct;

    fn forward_to(path: &str) -> Forward {
        Forward {
            route: ProxyRoute::get(path),
            upstream: Url::parse("http://127.0.0.1:9/api/").unwrap(),
            client: Client::new(),
        }
    }

    #[test]
    fn test_config_defaults() {
        let config = ProxyConfig::new("http://127.0.0.1:8080").unwrap();
        assert_eq!(config.path, "/rpc");
        assert_eq!(config.timeout, DEFAULT_TIMEOUT);
        assert!(ProxyConfig::new("not a url").is_err());
        assert!(ProxyConfig::new("mailto:someone@example.com").is_err());
    }

    #[test]
    fn test_route_actions() {
        assert_eq!(ProxyRoute::get("/user/:id").action(), "getUserId");
        assert_eq!(ProxyRoute::delete("/posts/:id").action(), "deletePostsId");
        assert_eq!(ProxyRoute::post("/").action(), "postAll");
    }

    #[test]
    fn test_url_fills_parameters() {
        let members: Struct = [("id", Value::from(7))].into_iter().collect();
        let url = forward_to("/user/:id").url(&[Value::Struct(members)]).unwrap();
        assert_eq!(url.as_str(), "http://127.0.0.1:9/api/user/7");
    }

    #[test]
    fn test_url_escapes_parameters() {
        let members: Struct = [("name", Value::from("a b/c"))].into_iter().collect();
        let url = forward_to("/tags/:name").url(&[Value::Struct(members)]).unwrap();
        assert_eq!(url.as_str(), "http://127.0.0.1:9/api/tags/a%20b%2Fc");
    }

    #[test]
    fn test_url_missing_parameter() {
        let fault = forward_to("/user/:id").url(&[]).unwrap_err();
        assert_eq!(fault.code, -32602);
        assert!(fault.message.contains("id"));
    }

    #[test]
    fn test_url_rejects_compound_parameter() {
        let members: Struct = [("id", Value::Array(vec![]))].into_iter().collect();
        let fault = forward_to("/user/:id").url(&[Value::Struct(members)]).unwrap_err();
        assert_eq!(fault.code, -32602);
    }

    #[test]
    fn test_transport_fault() {
        let fault = transport_fault("connection refused");
        assert_eq!(fault.code, xrpc_core::fault_codes::TRANSPORT_ERROR);
        assert_eq!(fault.message, "connection refused");
    }

    #[test]
    fn test_url_without_parameters() {
        let url = forward_to("/").url(&[]).unwrap();
        assert_eq!(url.as_str(), "http://127.0.0.1:9/api");
    }
}
