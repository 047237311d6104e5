//! Core XML-RPC wire engine for xrpc
//!
//! This crate is the transport-agnostic half of xrpc. It includes:
//!
//! - **Value model**: the eight XML-RPC value kinds ([`Value`], [`Struct`])
//! - **Parser**: an incremental, chunk-fed `<methodCall>` decoder ([`Parser`])
//! - **Codec**: the `<methodResponse>` / fault / `<methodCall>` serializer
//! - **Error handling**: error categories and the fault code table
//! - **Observability**: OpenTelemetry and `tracing` bootstrap
//!
//! The `xrpc-server` crate mounts these pieces behind axum; `xrpc-proxy`
//! reuses them to forward calls to REST upstreams.
//!
//! # Example
//!
//! ```rust
//! use xrpc_core::{codec, Parser, Value};
//!
//! let mut parser = Parser::new();
//! parser
//!     .feed("<methodCall><methodName>add</methodName><params>")
//!     .unwrap();
//! parser
//!     .feed("<param><value><int>2</int></value></param></params></methodCall>")
//!     .unwrap();
//! let call = parser.finish().unwrap();
//! assert_eq!(call.handler_params(), Value::Integer(2));
//!
//! let xml = codec::render_response(&[Value::from(4)]);
//! assert!(xml.contains("<int>4</int>"));
//! ```

pub mod codec;
pub mod error;
pub mod observability;
pub mod parser;
pub mod types;
pub mod value;

pub use error::{fault_codes, Error, Fault, ParseError, Result};
pub use observability::{init_observability, shutdown_observability, ObservabilityConfig};
pub use parser::{content_type_applies, parse_method_call, Parser};
pub use types::{MethodCall, MethodResponse};
pub use value::{from_value, to_value, Struct, Value};
