//! Dispatch of decoded calls to handlers
//!
//! The [`Engine`] owns everything a request needs after its body has been
//! parsed: the frozen registry, the engine settings, optional metrics, and
//! the hook invocation errors are reported to. It is cheap to clone and is
//! shared by every request.
//!
//! # Dispatch
//!
//! [`Engine::dispatch`] takes the parse outcome and delivers exactly one
//! [`Exchange`] to a sink:
//!
//! 1. Parse failed → fault `-32700`
//! 2. Method path does not resolve → fault `-32601`
//! 3. Otherwise the handler is invoked with the params and a responder
//!    - it completes the responder → that response
//!    - it raises (returns `Err` or panics) before completing → fault
//!      `-32500` "Unexpected exception …", and the failure is reported
//!    - it drops the responder → fault `-32500`
//!
//! A handler may complete its responder after `call` has returned, from any
//! task; the sink then fires at that point. `dispatch` itself never blocks.
//!
//! # Error Channel
//!
//! Every invocation failure is passed to the `on_invocation_error` hook,
//! even when the handler had already completed and the client got its
//! response. The default hook logs at `error` level.

use crate::builder::EngineBuilder;
use crate::handler::{no_response_fault, CallContext, CompletionSlot, ExchangeSink, Responder};
use crate::metrics::ServerMetrics;
use crate::registry::Registry;
use axum::http::HeaderMap;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::oneshot;
use xrpc_core::parser::{DEFAULT_MAX_BYTES, DEFAULT_MAX_DEPTH};
use xrpc_core::{Error, Fault, MethodCall, MethodResponse, ParseError, Parser};

/// Hook receiving invocation failures
pub type ErrorHook = Arc<dyn Fn(&InvocationFailure) + Send + Sync>;

/// A handler raised instead of completing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvocationFailure {
    /// Method path of the failed call
    pub method: String,
    /// Display form of the raised error or panic payload
    pub message: String,
}

impl InvocationFailure {
    pub fn new(method: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for InvocationFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.method, self.message)
    }
}

impl std::error::Error for InvocationFailure {}

/// The single outcome of one dispatched call
#[derive(Debug, Clone, PartialEq)]
pub struct Exchange {
    /// Response to send to the client
    pub response: MethodResponse,
    /// Set when the response is a fault caused by a handler failure
    pub invocation_error: Option<InvocationFailure>,
}

impl Exchange {
    /// An exchange answered with a fault
    pub fn fault(fault: Fault) -> Self {
        Self {
            response: MethodResponse::Fault(fault),
            invocation_error: None,
        }
    }

    /// Response document
    pub fn to_xml(&self) -> String {
        self.response.to_xml()
    }
}

/// Engine settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Route the XML-RPC endpoint is mounted on
    pub path: String,
    /// Bound on array/struct nesting in request bodies
    pub max_depth: usize,
    /// Bound on accumulated request body text
    pub max_body_bytes: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            path: "/".to_string(),
            max_depth: DEFAULT_MAX_DEPTH,
            max_body_bytes: DEFAULT_MAX_BYTES,
        }
    }
}

impl EngineConfig {
    /// Defaults overlaid with `XRPC_PATH`, `XRPC_MAX_DEPTH` and
    /// `XRPC_MAX_BODY_BYTES`
    ///
    /// Values that do not parse are ignored with a warning.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(path) = std::env::var("XRPC_PATH") {
            config.path = path;
        }
        if let Some(depth) = env_parse("XRPC_MAX_DEPTH") {
            config.max_depth = depth;
        }
        if let Some(bytes) = env_parse("XRPC_MAX_BODY_BYTES") {
            config.max_body_bytes = bytes;
        }
        config
    }

    /// Mount path with the leading `/` axum requires
    pub fn route_path(&self) -> String {
        if self.path.starts_with('/') {
            self.path.clone()
        } else {
            format!("/{}", self.path)
        }
    }

    /// A fresh parser with these limits
    pub fn parser(&self) -> Parser {
        Parser::with_limits(self.max_depth, self.max_body_bytes)
    }
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(key = %key, value = %raw, "Ignoring unparsable setting");
            None
        }
    }
}

pub(crate) fn log_invocation_error(failure: &InvocationFailure) {
    tracing::error!(method = %failure.method, error = %failure.message, "Handler raised");
}

struct EngineInner {
    registry: Registry,
    config: EngineConfig,
    metrics: Option<Arc<ServerMetrics>>,
    on_error: ErrorHook,
}

/// Shared XML-RPC dispatcher
#[derive(Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

impl Engine {
    pub fn builder() -> EngineBuilder {
        EngineBuilder::new()
    }

    pub(crate) fn from_parts(
        registry: Registry,
        config: EngineConfig,
        metrics: Option<Arc<ServerMetrics>>,
        on_error: ErrorHook,
    ) -> Self {
        Self {
            inner: Arc::new(EngineInner {
                registry,
                config,
                metrics,
                on_error,
            }),
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.inner.registry
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    pub fn metrics(&self) -> Option<&ServerMetrics> {
        self.inner.metrics.as_deref()
    }

    /// A parser configured with this engine's limits
    pub fn parser(&self) -> Parser {
        self.inner.config.parser()
    }

    /// Dispatch one parse outcome, delivering its exchange to `sink`
    pub fn dispatch(
        &self,
        call: Result<MethodCall, ParseError>,
        headers: HeaderMap,
        sink: ExchangeSink,
    ) {
        let started = Instant::now();
        let label = call
            .as_ref()
            .map(|c| c.method_name.clone())
            .unwrap_or_default();
        let metrics = self.inner.metrics.clone();
        let sink: ExchangeSink = Box::new(move |exchange: Exchange| {
            if let Some(metrics) = metrics {
                metrics.record_response(&label, &exchange.response, started.elapsed());
            }
            if let Some(fault) = exchange.response.fault() {
                tracing::debug!(method = %label, code = fault.code, "Answering with fault");
            }
            sink(exchange);
        });

        let call = match call {
            Ok(call) => call,
            Err(error) => {
                tracing::debug!(error = %error, "Request body did not parse");
                sink(Exchange::fault(Error::Parse(error).to_fault()));
                return;
            }
        };

        let span = tracing::info_span!("xml_rpc.dispatch", method = %call.method_name);
        let _enter = span.enter();

        let Some(handler) = self.inner.registry.resolve(&call.method_name) else {
            tracing::debug!("Method not found");
            sink(Exchange::fault(
                Error::Resolution(call.method_name.clone()).to_fault(),
            ));
            return;
        };

        let params = call.handler_params();
        let ctx = CallContext::new(call.method_name.as_str())
            .with_headers(headers)
            .with_params(call.params);
        let slot = CompletionSlot::new(sink);
        let reply = Responder::new(slot.clone(), call.method_name.as_str());

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| handler.call(ctx, params, reply)));
        let failure = match outcome {
            Ok(Ok(())) => None,
            Ok(Err(error)) => Some(InvocationFailure::new(&call.method_name, error.to_string())),
            Err(payload) => Some(InvocationFailure::new(
                &call.method_name,
                panic_message(payload.as_ref()),
            )),
        };

        if let Some(failure) = &failure {
            (self.inner.on_error)(failure);
        }
        slot.settle(failure);
    }

    /// Dispatch and wait for the exchange
    pub async fn call(&self, call: Result<MethodCall, ParseError>, headers: HeaderMap) -> Exchange {
        let (tx, rx) = oneshot::channel();
        self.dispatch(
            call,
            headers,
            Box::new(move |exchange| {
                let _ = tx.send(exchange);
            }),
        );
        rx.await
            .unwrap_or_else(|_| Exchange::fault(no_response_fault()))
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.inner.config)
            .field("registry", &self.inner.registry)
            .finish_non_exhaustive()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "handler panicked".to_string()
    }
}
