//! Error types for xrpc
//!
//! This module provides error handling for XML-RPC operations.
//! It defines three error types:
//!
//! - **Error**: Application-level errors for internal use (uses thiserror)
//! - **ParseError**: Why a request body could not become a `MethodCall`
//! - **Fault**: Wire-format errors as sent in a `<fault>` response
//!
//! # Error Categories
//!
//! Every `Error` variant belongs to one stage of a request exchange and maps
//! to exactly one fault code via [`Error::to_fault`]:
//!
//! - `Parse` → `-32700` (request body not well formed)
//! - `Resolution` → `-32601` (method path not in the registry)
//! - `Invocation` → `-32500` (handler raised an error or panicked)
//! - `HandlerReported` → the handler's own code and message
//! - `Serialization` → `-32603` (value has no XML-RPC representation)
//!
//! # Fault Codes
//!
//! The codes follow the XML-RPC fault code interoperability table, see
//! [`fault_codes`].
//!
//! # Examples
//!
//! ```rust
//! use xrpc_core::{Error, Fault, fault_codes};
//!
//! let error = Error::Resolution("blogger.getUsersBlogs".into());
//! let fault = error.to_fault();
//! assert_eq!(fault.code, fault_codes::METHOD_NOT_FOUND);
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type for xrpc operations
pub type Result<T> = std::result::Result<T, Error>;

/// Fault codes from the XML-RPC fault code interoperability table
pub mod fault_codes {
    /// Parse error, request not well formed
    pub const PARSE_ERROR: i32 = -32700;
    /// Parse error, unsupported encoding
    pub const UNSUPPORTED_ENCODING: i32 = -32701;
    /// Server error, invalid XML-RPC (not conforming to spec)
    pub const INVALID_XMLRPC: i32 = -32600;
    /// Server error, requested method not found
    pub const METHOD_NOT_FOUND: i32 = -32601;
    /// Server error, invalid method parameters
    pub const INVALID_PARAMS: i32 = -32602;
    /// Server error, a value had no XML-RPC representation
    pub const UNSUPPORTED_TYPE: i32 = -32603;
    /// Application error
    pub const APPLICATION_ERROR: i32 = -32500;
    /// Transport error
    pub const TRANSPORT_ERROR: i32 = -32300;
}

/// Application-level error type for xrpc operations
///
/// Errors never cross a request boundary: each is confined to the exchange
/// in which it occurred and becomes a fault sent to that client.
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// The request body could not be parsed into a method call
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    /// The method path did not resolve to a handler
    #[error("Method not found: {0}")]
    Resolution(String),

    /// The handler raised an error while being invoked
    #[error("Unexpected exception: {0}")]
    Invocation(String),

    /// The handler completed with an explicit fault
    #[error("Handler fault: {0}")]
    HandlerReported(Fault),

    /// A value could not be represented in XML-RPC
    #[error("Unsupported type: {0}")]
    Serialization(String),

    /// Input/output error
    #[error("IO error: {0}")]
    Io(String),

    /// Outbound transport error (used by the proxy)
    #[error("Transport error: {0}")]
    Transport(String),

    /// Invalid settings or failed startup wiring
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Map this error onto the fault sent to the client
    pub fn to_fault(&self) -> Fault {
        match self {
            Error::Parse(_) => Fault::parse_error(),
            Error::Resolution(method) => Fault::method_not_found(method),
            Error::Invocation(msg) => Fault::application_error(msg),
            Error::HandlerReported(fault) => fault.clone(),
            Error::Serialization(msg) => Fault::unsupported_type(msg),
            Error::Io(msg) => Fault::new(fault_codes::APPLICATION_ERROR, msg.clone()),
            Error::Transport(msg) => Fault::transport_error(msg),
            Error::Config(msg) => Fault::new(fault_codes::APPLICATION_ERROR, msg.clone()),
        }
    }
}

/// Reasons a request body failed to parse
///
/// Once a parser reports one of these it stays failed; every later call on
/// the same parser returns the same error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// The XML itself is not well formed
    #[error("malformed XML: {0}")]
    Malformed(String),

    /// An element appeared where it is not allowed
    #[error("unexpected element <{element}> in {context}")]
    UnexpectedElement {
        /// Tag name of the offending element
        element: String,
        /// Where it was found
        context: String,
    },

    /// A closing tag does not match the open element
    #[error("expected </{expected}>, found </{found}>")]
    MismatchedEnd {
        /// Tag that is open
        expected: String,
        /// Tag that was closed
        found: String,
    },

    /// Character data where only markup is allowed
    #[error("unexpected text in {context}")]
    UnexpectedText {
        /// Where the text was found
        context: String,
    },

    /// `<methodCall>` closed without a `<methodName>`
    #[error("methodCall has no methodName")]
    MissingMethodName,

    /// An element closed without a required child
    #[error("<{element}> is missing <{child}>")]
    MissingElement {
        /// Element that closed
        element: String,
        /// Child it required
        child: String,
    },

    /// A scalar leaf holds text that is not valid for its type
    #[error("invalid <{kind}> value {text:?}")]
    InvalidScalar {
        /// Scalar tag, e.g. `int`
        kind: String,
        /// Text content that failed to convert
        text: String,
    },

    /// A struct repeats a member name
    #[error("duplicate struct member {0:?}")]
    DuplicateMember(String),

    /// Array/struct nesting exceeds the configured bound
    #[error("nesting deeper than {limit} levels")]
    TooDeep {
        /// Configured maximum depth
        limit: usize,
    },

    /// The body exceeds the configured size bound
    #[error("request body larger than {limit} bytes")]
    TooLarge {
        /// Configured maximum size in bytes
        limit: usize,
    },

    /// Input ended before the document was complete
    #[error("document ended before </methodCall>")]
    Incomplete,

    /// `finish` was already called on this parser
    #[error("parser already finished")]
    AlreadyFinished,
}

/// XML-RPC fault as sent in a `<fault>` response
///
/// # Examples
///
/// ```rust
/// use xrpc_core::Fault;
///
/// let fault = Fault::method_not_found("missing.method");
/// assert_eq!(fault.code, -32601);
/// assert!(fault.message.contains("missing.method"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fault {
    /// Numeric fault code (`faultCode`)
    pub code: i32,

    /// Human-readable description (`faultString`)
    pub message: String,
}

impl Fault {
    /// Create a fault with any code and message
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Create a parse error fault (-32700)
    pub fn parse_error() -> Self {
        Self::new(
            fault_codes::PARSE_ERROR,
            "Parse Error. Request data not well formed.",
        )
    }

    /// Create an unsupported encoding fault (-32701)
    pub fn unsupported_encoding(msg: impl Into<String>) -> Self {
        Self::new(fault_codes::UNSUPPORTED_ENCODING, msg)
    }

    /// Create a method not found fault (-32601)
    pub fn method_not_found(method: impl AsRef<str>) -> Self {
        Self::new(
            fault_codes::METHOD_NOT_FOUND,
            format!("requested method {} not found", method.as_ref()),
        )
    }

    /// Create an invalid params fault (-32602)
    pub fn invalid_params(msg: impl Into<String>) -> Self {
        Self::new(fault_codes::INVALID_PARAMS, msg)
    }

    /// Create an unsupported type fault (-32603)
    pub fn unsupported_type(msg: impl AsRef<str>) -> Self {
        Self::new(
            fault_codes::UNSUPPORTED_TYPE,
            format!("Unsupported type: {}", msg.as_ref()),
        )
    }

    /// Create an application error fault (-32500)
    ///
    /// Used when a handler raises instead of completing; the message of the
    /// raised error is interpolated.
    pub fn application_error(msg: impl AsRef<str>) -> Self {
        Self::new(
            fault_codes::APPLICATION_ERROR,
            format!("Unexpected exception {}", msg.as_ref()),
        )
    }

    /// Create a transport error fault (-32300)
    pub fn transport_error(msg: impl Into<String>) -> Self {
        Self::new(fault_codes::TRANSPORT_ERROR, msg)
    }
}

impl std::fmt::Display for Fault {
    /// Formats as "[code] message" for logs
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for Fault {}

impl From<Fault> for Error {
    fn from(fault: Fault) -> Self {
        Error::HandlerReported(fault)
    }
}
