//! The `text/xml` request-processing step
//!
//! [`xml_rpc`] is an axum middleware. For every request whose
//! `Content-Type` is `text/xml` it streams the body through a fresh
//! [`Parser`](xrpc_core::Parser) chunk by chunk as the chunks arrive, then
//! stores the outcome as an [`XmlRpcBody`] request extension and passes the
//! request on with its original body re-attached. Any other request passes
//! through untouched.
//!
//! Parse failures are not answered here: the outcome is stored and the route
//! step answers it with fault `-32700`. Only a broken body stream (the
//! client went away mid-upload) ends the request early, with `400` and
//! without dispatch.
//!
//! # Examples
//!
//! Mounting the step in front of a hand-written route:
//!
//! ```rust
//! use axum::{middleware, routing::post, Extension, Router};
//! use xrpc_server::{xml_rpc, Engine, XmlRpcBody};
//!
//! # fn example() -> xrpc_core::Result<()> {
//! let engine = Engine::builder().build()?;
//!
//! let app: Router = Router::new()
//!     .route("/inspect", post(|Extension(body): Extension<XmlRpcBody>| async move {
//!         match body.call() {
//!             Ok(call) => call.method_name.clone(),
//!             Err(e) => e.to_string(),
//!         }
//!     }))
//!     .layer(middleware::from_fn_with_state(engine, xml_rpc));
//! # Ok(())
//! # }
//! ```

use crate::dispatch::Engine;
use axum::{
    body::Body,
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use futures::StreamExt;
use xrpc_core::{content_type_applies, MethodCall, ParseError};

/// Parse outcome of an XML-RPC request body
#[derive(Debug, Clone, PartialEq)]
pub struct XmlRpcBody(pub Result<MethodCall, ParseError>);

impl XmlRpcBody {
    /// The decoded call, or why the body did not parse
    pub fn call(&self) -> Result<&MethodCall, &ParseError> {
        self.0.as_ref()
    }

    pub fn into_inner(self) -> Result<MethodCall, ParseError> {
        self.0
    }
}

/// Whether a request's `Content-Type` selects XML-RPC processing
pub fn is_xml_rpc(request: &Request) -> bool {
    request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(content_type_applies)
}

/// Axum middleware that decodes `text/xml` bodies into [`XmlRpcBody`]
pub async fn xml_rpc(State(engine): State<Engine>, request: Request, next: Next) -> Response {
    if !is_xml_rpc(&request) {
        if let Some(metrics) = engine.metrics() {
            metrics.record_passthrough();
        }
        return next.run(request).await;
    }

    let (mut parts, body) = request.into_parts();
    let limit = engine.config().max_body_bytes;
    let mut parser = engine.parser();
    let mut decoder = Utf8Decoder::default();
    let mut raw: Vec<u8> = Vec::new();
    let mut failure: Option<ParseError> = None;

    let mut stream = body.into_data_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(e) => {
                tracing::warn!(error = %e, "Request body stream failed, dropping request");
                return StatusCode::BAD_REQUEST.into_response();
            }
        };

        // Oversized bodies are not re-attached
        if raw.len() + chunk.len() > limit {
            failure.get_or_insert(ParseError::TooLarge { limit });
            raw.clear();
            break;
        }
        raw.extend_from_slice(&chunk);

        if failure.is_some() {
            continue;
        }
        let fed = decoder.decode(&chunk).and_then(|text| parser.feed(&text));
        if let Err(e) = fed {
            failure = Some(e);
        }
    }

    let outcome = match failure {
        Some(e) => Err(e),
        None => decoder.finish().and_then(|_| parser.finish()),
    };

    if let Some(metrics) = engine.metrics() {
        metrics.record_body(raw.len());
    }
    match &outcome {
        Ok(call) => tracing::debug!(
            method = %call.method_name,
            params = call.params.len(),
            bytes = raw.len(),
            "XML-RPC body decoded"
        ),
        Err(e) => tracing::debug!(error = %e, bytes = raw.len(), "XML-RPC body rejected"),
    }

    parts.extensions.insert(XmlRpcBody(outcome));
    next.run(Request::from_parts(parts, Body::from(raw))).await
}

/// Decodes UTF-8 across chunk boundaries
///
/// A multi-byte sequence split between two chunks is held back until the
/// rest of it arrives.
#[derive(Debug, Default)]
struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    fn decode(&mut self, chunk: &[u8]) -> Result<String, ParseError> {
        self.pending.extend_from_slice(chunk);
        let valid = match std::str::from_utf8(&self.pending) {
            Ok(_) => self.pending.len(),
            Err(e) if e.error_len().is_none() => e.valid_up_to(),
            Err(e) => return Err(ParseError::Malformed(format!("invalid UTF-8: {}", e))),
        };

        let rest = self.pending.split_off(valid);
        let text = String::from_utf8(std::mem::replace(&mut self.pending, rest))
            .map_err(|e| ParseError::Malformed(format!("invalid UTF-8: {}", e)))?;
        Ok(text)
    }

    fn finish(&self) -> Result<(), ParseError> {
        if self.pending.is_empty() {
            Ok(())
        } else {
            Err(ParseError::Malformed(
                "body ends inside a UTF-8 sequence".to_string(),
            ))
        }
    }
}
