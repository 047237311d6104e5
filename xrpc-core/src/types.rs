//! XML-RPC message envelopes
//!
//! A request is always a [`MethodCall`]; the answer is a [`MethodResponse`],
//! which is either a list of result params or a [`Fault`].
//!
//! # Params
//!
//! The base XML-RPC specification allows exactly one `<param>` in a
//! response. `MethodResponse::Success` holds a list anyway so callers that
//! want to return several values are not rejected; every element becomes its
//! own `<param>`.
//!
//! # Examples
//!
//! ```rust
//! use xrpc_core::{MethodCall, MethodResponse, Value};
//!
//! let call = MethodCall::new("echo", vec![Value::from("hi")]);
//! assert_eq!(call.method_name, "echo");
//!
//! let response = MethodResponse::single(Value::from("hi"));
//! assert!(response.is_success());
//! ```

use crate::codec;
use crate::error::Fault;
use crate::value::Value;

/// A decoded `<methodCall>`
#[derive(Debug, Clone, PartialEq)]
pub struct MethodCall {
    /// Dot/bracket method path, e.g. `blogger.getUsersBlogs`
    pub method_name: String,
    /// Positional params in document order
    pub params: Vec<Value>,
}

impl MethodCall {
    /// Create a method call
    pub fn new(method_name: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            method_name: method_name.into(),
            params,
        }
    }

    /// Params in the shape handlers receive them
    ///
    /// A single param is passed as-is; zero or several are passed as an
    /// `Array` in their original order.
    pub fn handler_params(&self) -> Value {
        match self.params.as_slice() {
            [single] => single.clone(),
            _ => Value::Array(self.params.clone()),
        }
    }

    /// Render as a `<methodCall>` document
    pub fn to_xml(&self) -> String {
        codec::render_call(self)
    }
}

/// A `<methodResponse>` document, either params or a fault
#[derive(Debug, Clone, PartialEq)]
pub enum MethodResponse {
    /// Result params
    Success(Vec<Value>),
    /// Fault with code and message
    Fault(Fault),
}

impl MethodResponse {
    /// A success response carrying one param
    pub fn single(value: Value) -> Self {
        MethodResponse::Success(vec![value])
    }

    pub fn is_success(&self) -> bool {
        matches!(self, MethodResponse::Success(_))
    }

    pub fn is_fault(&self) -> bool {
        matches!(self, MethodResponse::Fault(_))
    }

    /// The fault, if this is one
    pub fn fault(&self) -> Option<&Fault> {
        match self {
            MethodResponse::Fault(fault) => Some(fault),
            MethodResponse::Success(_) => None,
        }
    }

    /// The first result param, if this is a success
    pub fn value(&self) -> Option<&Value> {
        match self {
            MethodResponse::Success(params) => params.first(),
            MethodResponse::Fault(_) => None,
        }
    }

    /// Render as a `<methodResponse>` document
    pub fn to_xml(&self) -> String {
        match self {
            MethodResponse::Success(params) => codec::render_response(params),
            MethodResponse::Fault(fault) => codec::render_fault(fault),
        }
    }
}

impl From<Fault> for MethodResponse {
    fn from(fault: Fault) -> Self {
        MethodResponse::Fault(fault)
    }
}
