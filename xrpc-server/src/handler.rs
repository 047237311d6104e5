//! Handler trait and completion continuation for XML-RPC methods
//!
//! A handler is invoked with the call's params and a [`Responder`]. It
//! completes the call by consuming the responder, either before returning or
//! later from another task. Returning `Err` from [`Handler::call`] is the
//! "handler raised" path and is turned into an application fault by the
//! dispatcher.
//!
//! # Exactly One Response
//!
//! Every responder method takes `self`, so a call can be completed at most
//! once. A responder that is dropped without completing still produces a
//! response: the client gets fault `-32500` ("handler finished without a
//! response"). Together these make every request end in exactly one
//! response.
//!
//! # Creating Handlers
//!
//! 1. **from_fn**: a closure receiving params and the responder
//! 2. **from_context_fn**: like `from_fn`, plus the [`CallContext`]
//! 3. **from_async_fn**: an async closure returning `Result<Value, Fault>`
//! 4. **from_typed_fn**: an async closure over serde types
//!
//! # Examples
//!
//! ```rust
//! use xrpc_core::{Fault, Value};
//! use xrpc_server::{from_async_fn, from_fn, from_typed_fn};
//! use serde::Deserialize;
//!
//! // Callback style
//! let echo = from_fn(|params, reply| {
//!     reply.ok(params);
//!     Ok(())
//! });
//!
//! // Async style
//! let ping = from_async_fn(|_params| async { Ok(Value::from("pong")) });
//!
//! // Typed params
//! #[derive(Deserialize)]
//! struct Add { a: i32, b: i32 }
//!
//! let add = from_typed_fn(|p: Add| async move {
//!     p.a.checked_add(p.b).ok_or_else(|| Fault::new(1, "overflow"))
//! });
//! ```

use crate::dispatch::{Exchange, InvocationFailure};
use axum::http::HeaderMap;
use serde::{de::DeserializeOwned, Serialize};
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use xrpc_core::{fault_codes, from_value, to_value, Fault, MethodResponse, Value};

/// Error a handler raises instead of completing
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Return type of [`Handler::call`]
///
/// `Ok(())` means the handler accepted the call; the response is whatever
/// the responder is completed with. `Err` means the handler raised.
pub type HandlerResult = Result<(), HandlerError>;

/// Receives the single [`Exchange`] of a dispatched call
pub type ExchangeSink = Box<dyn FnOnce(Exchange) + Send>;

/// Fault message when a responder is dropped without completing
pub const NO_RESPONSE_MESSAGE: &str = "handler finished without a response";

pub(crate) fn no_response_fault() -> Fault {
    Fault::new(fault_codes::APPLICATION_ERROR, NO_RESPONSE_MESSAGE)
}

/// Per-call information passed to handlers
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    /// Method path as sent by the client
    pub method: String,
    /// Headers of the HTTP request that carried the call
    pub headers: HeaderMap,
    /// Params exactly as they appeared in the call, in order
    pub params: Vec<Value>,
}

impl CallContext {
    pub fn new(method: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            headers: HeaderMap::new(),
            params: Vec::new(),
        }
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_params(mut self, params: Vec<Value>) -> Self {
        self.params = params;
        self
    }

    /// A header value, if present and valid UTF-8
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

/// Trait for XML-RPC method handlers
///
/// Handlers are stored behind `Arc` in the registry and may be invoked
/// concurrently, so they must be `Send + Sync`.
///
/// ```rust
/// use xrpc_server::{CallContext, Handler, HandlerResult, Responder};
/// use xrpc_core::Value;
///
/// struct WhoAmI;
///
/// impl Handler for WhoAmI {
///     fn call(&self, ctx: CallContext, _params: Value, reply: Responder) -> HandlerResult {
///         let agent = ctx.header("user-agent").unwrap_or("unknown").to_string();
///         reply.ok(agent);
///         Ok(())
///     }
/// }
/// ```
pub trait Handler: Send + Sync {
    /// Handle one call
    ///
    /// `params` is the single param when the call carried exactly one,
    /// otherwise an `Array` of all params in order.
    fn call(&self, ctx: CallContext, params: Value, reply: Responder) -> HandlerResult;
}

pub(crate) struct Completion {
    sink: Option<ExchangeSink>,
    invoking: bool,
    abandoned: bool,
}

/// Shared completion state of one call
///
/// The responder and the dispatcher both hold it; whichever takes the sink
/// first sends the response.
#[derive(Clone)]
pub(crate) struct CompletionSlot(Arc<Mutex<Completion>>);

impl CompletionSlot {
    pub(crate) fn new(sink: ExchangeSink) -> Self {
        Self(Arc::new(Mutex::new(Completion {
            sink: Some(sink),
            invoking: true,
            abandoned: false,
        })))
    }

    fn lock(&self) -> MutexGuard<'_, Completion> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Called once the handler's `call` has returned or unwound
    ///
    /// Decides whether the dispatcher must still answer: after a raised
    /// error, or when the responder was dropped while the handler ran.
    pub(crate) fn settle(&self, failure: Option<InvocationFailure>) -> Option<Exchange> {
        let sink = {
            let mut state = self.lock();
            state.invoking = false;
            if failure.is_none() && !state.abandoned {
                return None;
            }
            state.sink.take()
        }?;

        let exchange = match failure {
            Some(failure) => Exchange {
                response: MethodResponse::Fault(Fault::application_error(&failure.message)),
                invocation_error: Some(failure),
            },
            None => Exchange::fault(no_response_fault()),
        };
        sink(exchange.clone());
        Some(exchange)
    }

    fn take(&self) -> Option<ExchangeSink> {
        self.lock().sink.take()
    }
}

/// Completion continuation handed to every handler
///
/// Consumed by whichever method completes the call.
pub struct Responder {
    slot: CompletionSlot,
    method: String,
}

impl Responder {
    pub(crate) fn new(slot: CompletionSlot, method: impl Into<String>) -> Self {
        Self {
            slot,
            method: method.into(),
        }
    }

    /// Method path this responder answers
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Complete with one result value
    pub fn ok(self, value: impl Into<Value>) {
        self.send(MethodResponse::single(value.into()));
    }

    /// Complete with several result params
    pub fn ok_many(self, values: Vec<Value>) {
        self.send(MethodResponse::Success(values));
    }

    /// Complete with any serde value
    ///
    /// Values with no XML-RPC representation become an unsupported type
    /// fault (`-32603`).
    pub fn serialize<T: Serialize + ?Sized>(self, value: &T) {
        match to_value(value) {
            Ok(value) => self.ok(value),
            Err(e) => self.fault(e.to_fault()),
        }
    }

    /// Complete with a fault
    pub fn fault(self, fault: Fault) {
        self.send(MethodResponse::Fault(fault));
    }

    /// Complete with an error, reported as fault code `0`
    pub fn err(self, error: impl std::fmt::Display) {
        self.fault(Fault::new(0, error.to_string()));
    }

    /// Complete with an error carrying its own code
    pub fn err_with_code(self, code: i32, message: impl Into<String>) {
        self.fault(Fault::new(code, message));
    }

    /// Complete from a `Result`
    pub fn complete(self, result: Result<Value, Fault>) {
        match result {
            Ok(value) => self.ok(value),
            Err(fault) => self.fault(fault),
        }
    }

    fn send(self, response: MethodResponse) {
        if let Some(sink) = self.slot.take() {
            sink(Exchange {
                response,
                invocation_error: None,
            });
        }
    }
}

impl Drop for Responder {
    fn drop(&mut self) {
        let sink = {
            let mut state = self.slot.lock();
            if state.sink.is_none() {
                return;
            }
            if state.invoking {
                state.abandoned = true;
                return;
            }
            state.sink.take()
        };

        if let Some(sink) = sink {
            tracing::warn!(method = %self.method, "Responder dropped without a response");
            sink(Exchange::fault(no_response_fault()));
        }
    }
}

impl std::fmt::Debug for Responder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Responder")
            .field("method", &self.method)
            .finish()
    }
}

/// Handler wrapping a callback-style closure
pub struct FnHandler<F>
where
    F: Fn(CallContext, Value, Responder) -> HandlerResult + Send + Sync,
{
    func: F,
}

impl<F> Handler for FnHandler<F>
where
    F: Fn(CallContext, Value, Responder) -> HandlerResult + Send + Sync,
{
    fn call(&self, ctx: CallContext, params: Value, reply: Responder) -> HandlerResult {
        (self.func)(ctx, params, reply)
    }
}

/// Create a handler from a closure receiving params and the responder
pub fn from_fn<F>(func: F) -> Box<dyn Handler>
where
    F: Fn(Value, Responder) -> HandlerResult + Send + Sync + 'static,
{
    Box::new(FnHandler {
        func: move |_ctx: CallContext, params: Value, reply: Responder| func(params, reply),
    })
}

/// Create a handler from a closure that also receives the call context
pub fn from_context_fn<F>(func: F) -> Box<dyn Handler>
where
    F: Fn(CallContext, Value, Responder) -> HandlerResult + Send + Sync + 'static,
{
    Box::new(FnHandler { func })
}

/// Create a handler from an async closure
///
/// The returned future runs on the current tokio runtime and completes the
/// call with its output.
pub fn from_async_fn<F, Fut>(func: F) -> Box<dyn Handler>
where
    F: Fn(Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, Fault>> + Send + 'static,
{
    from_fn(move |params, reply| {
        let runtime = tokio::runtime::Handle::try_current()?;
        let fut = func(params);
        runtime.spawn(async move {
            reply.complete(fut.await);
        });
        Ok(())
    })
}

/// Create a handler from an async closure over serde types
///
/// Params that do not deserialize into `P` are answered with fault
/// `-32602` without calling `func`.
///
/// ```rust
/// use serde::{Deserialize, Serialize};
/// use xrpc_server::from_typed_fn;
///
/// #[derive(Deserialize)]
/// struct Lookup { id: i32 }
///
/// #[derive(Serialize)]
/// struct User { id: i32, name: String }
///
/// let handler = from_typed_fn(|p: Lookup| async move {
///     Ok(User { id: p.id, name: format!("user{}", p.id) })
/// });
/// ```
pub fn from_typed_fn<P, R, F, Fut>(func: F) -> Box<dyn Handler>
where
    P: DeserializeOwned + Send + 'static,
    R: Serialize + Send + 'static,
    F: Fn(P) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, Fault>> + Send + 'static,
{
    from_fn(move |params, reply| {
        let params: P = match from_value(&params) {
            Ok(params) => params,
            Err(e) => {
                reply.fault(Fault::invalid_params(e.to_string()));
                return Ok(());
            }
        };

        let runtime = tokio::runtime::Handle::try_current()?;
        let fut = func(params);
        runtime.spawn(async move {
            match fut.await {
                Ok(result) => reply.serialize(&result),
                Err(fault) => reply.fault(fault),
            }
        });
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use tokio::sync::oneshot;

    fn slot() -> (CompletionSlot, oneshot::Receiver<Exchange>) {
        let (tx, rx) = oneshot::channel();
        let slot = CompletionSlot::new(Box::new(move |exchange| {
            let _ = tx.send(exchange);
        }));
        (slot, rx)
    }

    #[test]
    fn test_ok_completes_once() {
        let (slot, mut rx) = slot();
        Responder::new(slot.clone(), "m").ok(7);
        assert!(slot.settle(None).is_none());

        let exchange = rx.try_recv().unwrap();
        assert_eq!(exchange.response, MethodResponse::single(Value::Integer(7)));
        assert!(exchange.invocation_error.is_none());
    }

    #[test]
    fn test_err_uses_code_zero() {
        let (slot, mut rx) = slot();
        Responder::new(slot, "m").err("nope");
        let exchange = rx.try_recv().unwrap();
        assert_eq!(exchange.response, MethodResponse::Fault(Fault::new(0, "nope")));
    }

    #[test]
    fn test_err_with_code_keeps_code() {
        let (slot, mut rx) = slot();
        Responder::new(slot, "m").err_with_code(4, "Too many parameters.");
        let exchange = rx.try_recv().unwrap();
        assert_eq!(
            exchange.response,
            MethodResponse::Fault(Fault::new(4, "Too many parameters."))
        );
    }

    #[test]
    fn test_dropped_during_invocation_is_settled_by_dispatcher() {
        let (slot, mut rx) = slot();
        drop(Responder::new(slot.clone(), "m"));
        assert!(rx.try_recv().is_err());

        let settled = slot.settle(None).unwrap();
        assert_eq!(
            settled.response.fault().map(|f| f.code),
            Some(xrpc_core::fault_codes::APPLICATION_ERROR)
        );
        assert!(rx.try_recv().is_ok());
    }

    #[test]
    fn test_dropped_after_invocation_sends_fault() {
        let (slot, mut rx) = slot();
        let reply = Responder::new(slot.clone(), "m");
        assert!(slot.settle(None).is_none());
        assert!(rx.try_recv().is_err());

        drop(reply);
        let exchange = rx.try_recv().unwrap();
        assert_eq!(
            exchange.response.fault().map(|f| f.message.as_str()),
            Some(NO_RESPONSE_MESSAGE)
        );
    }

    #[test]
    fn test_failure_after_completion_keeps_response() {
        let (slot, mut rx) = slot();
        Responder::new(slot.clone(), "m").ok("done");
        let failure = InvocationFailure::new("m", "late error");
        assert!(slot.settle(Some(failure)).is_none());

        let exchange = rx.try_recv().unwrap();
        assert!(exchange.response.is_success());
    }

    #[test]
    fn test_serialize_rejects_null() {
        let (slot, mut rx) = slot();
        Responder::new(slot, "m").serialize(&Option::<i32>::None);
        let exchange = rx.try_recv().unwrap();
        assert_eq!(
            exchange.response.fault().map(|f| f.code),
            Some(xrpc_core::fault_codes::UNSUPPORTED_TYPE)
        );
    }

    #[derive(Deserialize)]
    struct AddParams {
        a: i32,
        b: i32,
    }

    #[tokio::test]
    async fn test_typed_handler() {
        let handler = from_typed_fn(|p: AddParams| async move { Ok(p.a + p.b) });
        let (slot, rx) = slot();
        let params: xrpc_core::Struct = vec![("a", Value::from(5)), ("b", Value::from(3))]
            .into_iter()
            .collect();

        handler
            .call(
                CallContext::new("add"),
                Value::Struct(params),
                Responder::new(slot.clone(), "add"),
            )
            .unwrap();
        slot.settle(None);

        let exchange = rx.await.unwrap();
        assert_eq!(exchange.response, MethodResponse::single(Value::Integer(8)));
    }

    #[tokio::test]
    async fn test_typed_handler_invalid_params() {
        let handler = from_typed_fn(|p: AddParams| async move { Ok(p.a + p.b) });
        let (slot, rx) = slot();

        handler
            .call(
                CallContext::new("add"),
                Value::from("not a struct"),
                Responder::new(slot.clone(), "add"),
            )
            .unwrap();
        slot.settle(None);

        let exchange = rx.await.unwrap();
        assert_eq!(
            exchange.response.fault().map(|f| f.code),
            Some(xrpc_core::fault_codes::INVALID_PARAMS)
        );
    }

    #[test]
    fn test_async_handler_without_runtime_raises() {
        let handler = from_async_fn(|v| async move { Ok(v) });
        let (slot, _rx) = slot();
        let result = handler.call(
            CallContext::new("echo"),
            Value::from(1),
            Responder::new(slot, "echo"),
        );
        assert!(result.is_err());
    }
}
