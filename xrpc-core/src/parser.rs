//! Incremental parser for `<methodCall>` documents
//!
//! A [`Parser`] is fed the request body one text chunk at a time, in arrival
//! order, and then finished exactly once:
//!
//! ```rust
//! use xrpc_core::{Parser, Value};
//!
//! let mut parser = Parser::new();
//! parser.feed("<?xml version=\"1.0\"?><methodCall><methodName>ec").unwrap();
//! parser.feed("ho</methodName><params><param><value><i4>4").unwrap();
//! parser.feed("2</i4></value></param></params></methodCall>").unwrap();
//!
//! let call = parser.finish().unwrap();
//! assert_eq!(call.method_name, "echo");
//! assert_eq!(call.params, vec![Value::Integer(42)]);
//! ```
//!
//! # Incremental Processing
//!
//! Each `feed` appends to a buffer and hands every complete piece of markup
//! to the element state machine: everything before the last `<` in the
//! buffer is complete, because text always ends where the next tag begins.
//! Constructs that are still open (a comment containing `<`, an unterminated
//! tag) make the tokenizer stop early and wait for more input. Consumed text
//! is dropped from the buffer. The result is the same for any split of the
//! body into chunks.
//!
//! Only the newly appended text is searched on each `feed`. A chunk without
//! a `<` never reaches the tokenizer, and a stalled construct is retried only
//! once its closing delimiter (`-->`, `]]>`, `?>` or `>`) shows up, so the
//! total work stays linear in the body size.
//!
//! # State Machine
//!
//! The machine keeps a stack of open elements. Each element only admits the
//! children XML-RPC allows at that position:
//!
//! ```text
//! methodCall → methodName, params
//! params     → param*
//! param      → value
//! value      → text | int | i4 | double | boolean | string
//!                   | dateTime.iso8601 | base64 | array | struct
//! array      → data
//! data       → value*
//! struct     → member*
//! member     → name, value
//! ```
//!
//! Completed children are folded into their parent when they close, so the
//! `Value` tree is built bottom-up without recursion.
//!
//! # Failure
//!
//! The first error puts the parser into a permanent failed state. Every
//! later `feed` or `finish` returns that same error; nothing is resumed.
//! `finish` on a parser that already finished returns
//! [`ParseError::AlreadyFinished`].

use crate::error::ParseError;
use crate::types::MethodCall;
use crate::value::{Struct, Value};
use base64::prelude::BASE64_STANDARD;
use base64::Engine;
use quick_xml::events::Event;
use quick_xml::Reader;

/// Default bound on array/struct nesting
pub const DEFAULT_MAX_DEPTH: usize = 128;

/// Default bound on the accumulated body size (10 MiB)
pub const DEFAULT_MAX_BYTES: usize = 10 * 1024 * 1024;

/// Whether a `Content-Type` header selects XML-RPC processing
///
/// Only `text/xml` applies. Parameters after `;` are ignored, as are case
/// and surrounding whitespace.
///
/// ```rust
/// use xrpc_core::parser::content_type_applies;
///
/// assert!(content_type_applies("text/xml; charset=utf-8"));
/// assert!(!content_type_applies("application/json"));
/// ```
pub fn content_type_applies(content_type: &str) -> bool {
    content_type
        .split(';')
        .next()
        .map(str::trim)
        .is_some_and(|mime| mime.eq_ignore_ascii_case("text/xml"))
}

/// Parse a complete `<methodCall>` document in one step
pub fn parse_method_call(document: &str) -> Result<MethodCall, ParseError> {
    let mut parser = Parser::new();
    parser.feed(document)?;
    parser.finish()
}

#[derive(Debug)]
enum Status {
    Open,
    Failed(ParseError),
    Finished,
}

/// Per-request parse state
///
/// Owned by exactly one request and discarded with it; dropping a parser
/// before `finish` abandons the request without side effects.
#[derive(Debug)]
pub struct Parser {
    buffer: String,
    /// Offset of the last `<` in `buffer`
    boundary: Option<usize>,
    stall: Option<Stall>,
    received: usize,
    max_bytes: usize,
    machine: Machine,
    status: Status,
    #[cfg(test)]
    tokenized: usize,
}

/// Construct at the head of the buffer that the tokenizer could not close
#[derive(Debug)]
struct Stall {
    close: &'static str,
    scan_from: usize,
}

impl Stall {
    fn at_head_of(buffer: &str, end: usize) -> Self {
        let close = if buffer.starts_with("<!--") {
            "-->"
        } else if buffer.starts_with("<![CDATA[") {
            "]]>"
        } else if buffer.starts_with("<?") {
            "?>"
        } else {
            ">"
        };
        Self {
            close,
            scan_from: end.saturating_sub(close.len() - 1),
        }
    }

    /// Whether the closing delimiter appears before `end`
    ///
    /// Each byte is searched once; a miss moves the scan start up to `end`.
    fn closes_before(&mut self, buffer: &str, end: usize) -> bool {
        let window = buffer.as_bytes().get(self.scan_from..end).unwrap_or_default();
        if window
            .windows(self.close.len())
            .any(|w| w == self.close.as_bytes())
        {
            return true;
        }
        self.scan_from = self
            .scan_from
            .max(end.saturating_sub(self.close.len() - 1));
        false
    }
}

impl Parser {
    /// Create a parser with default limits
    pub fn new() -> Self {
        Self::with_limits(DEFAULT_MAX_DEPTH, DEFAULT_MAX_BYTES)
    }

    /// Create a parser with explicit nesting and size limits
    pub fn with_limits(max_depth: usize, max_bytes: usize) -> Self {
        Self {
            buffer: String::new(),
            boundary: None,
            stall: None,
            received: 0,
            max_bytes,
            machine: Machine::new(max_depth),
            status: Status::Open,
            #[cfg(test)]
            tokenized: 0,
        }
    }

    /// Append the next chunk of the body
    pub fn feed(&mut self, chunk: &str) -> Result<(), ParseError> {
        self.ensure_open()?;

        let chunk = if self.received == 0 {
            chunk.strip_prefix('\u{feff}').unwrap_or(chunk)
        } else {
            chunk
        };
        self.received += chunk.len();
        if self.received > self.max_bytes {
            return Err(self.fail(ParseError::TooLarge {
                limit: self.max_bytes,
            }));
        }
        let appended = self.buffer.len();
        self.buffer.push_str(chunk);

        let opened = match chunk.rfind('<') {
            Some(offset) => {
                self.boundary = Some(appended + offset);
                true
            }
            None => false,
        };
        let Some(end) = self.boundary else {
            return Ok(());
        };
        if let Some(stall) = self.stall.as_mut() {
            if !stall.closes_before(&self.buffer, end) {
                return Ok(());
            }
        } else if !opened {
            return Ok(());
        }
        self.drain(end, false).map_err(|e| self.fail(e))
    }

    /// Signal the end of the body and return the decoded call
    pub fn finish(&mut self) -> Result<MethodCall, ParseError> {
        self.ensure_open()?;

        let end = self.buffer.len();
        if let Err(e) = self.drain(end, true) {
            return Err(self.fail(e));
        }
        match self.machine.call.take() {
            Some(call) => {
                self.status = Status::Finished;
                Ok(call)
            }
            None => Err(self.fail(ParseError::Incomplete)),
        }
    }

    /// Whether the parser has hit an unrecoverable error
    pub fn is_failed(&self) -> bool {
        matches!(self.status, Status::Failed(_))
    }

    /// Whether `finish` has already returned a call
    pub fn is_finished(&self) -> bool {
        matches!(self.status, Status::Finished)
    }

    fn ensure_open(&self) -> Result<(), ParseError> {
        match &self.status {
            Status::Open => Ok(()),
            Status::Failed(e) => Err(e.clone()),
            Status::Finished => Err(ParseError::AlreadyFinished),
        }
    }

    fn fail(&mut self, error: ParseError) -> ParseError {
        tracing::debug!(error = %error, "XML-RPC body rejected");
        self.status = Status::Failed(error.clone());
        self.buffer.clear();
        error
    }

    /// Run the buffer up to `end` through the tokenizer
    ///
    /// With `last` unset, an unterminated construct ends the pass quietly and
    /// its text stays buffered for the next call.
    fn drain(&mut self, end: usize, last: bool) -> Result<(), ParseError> {
        #[cfg(test)]
        {
            self.tokenized += end;
        }
        let mut reader = Reader::from_str(&self.buffer[..end]);
        let config = reader.config_mut();
        config.check_end_names = false;
        config.allow_unmatched_ends = true;

        let mut consumed = 0;
        let mut stalled = false;
        loop {
            match reader.read_event() {
                Ok(Event::Eof) => break,
                Ok(event) => {
                    self.machine.handle(event)?;
                    consumed = reader.buffer_position() as usize;
                }
                Err(quick_xml::Error::Syntax(_)) if !last => {
                    stalled = true;
                    break;
                }
                Err(e) => return Err(ParseError::Malformed(e.to_string())),
            }
        }

        self.buffer.drain(..consumed);
        self.boundary = self
            .boundary
            .and_then(|boundary| boundary.checked_sub(consumed));
        self.stall = if stalled {
            Some(Stall::at_head_of(&self.buffer, end - consumed))
        } else {
            None
        };
        Ok(())
    }
}

impl Default for Parser {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scalar {
    Int,
    Double,
    Boolean,
    String,
    DateTime,
    Base64,
}

impl Scalar {
    fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "int" | "i4" => Some(Scalar::Int),
            "double" => Some(Scalar::Double),
            "boolean" => Some(Scalar::Boolean),
            "string" => Some(Scalar::String),
            "dateTime.iso8601" => Some(Scalar::DateTime),
            "base64" => Some(Scalar::Base64),
            _ => None,
        }
    }

    fn convert(self, tag: &str, text: String) -> Result<Value, ParseError> {
        let invalid = |text: &str| ParseError::InvalidScalar {
            kind: tag.to_string(),
            text: text.to_string(),
        };
        match self {
            Scalar::Int => text
                .trim()
                .parse::<i32>()
                .map(Value::Integer)
                .map_err(|_| invalid(&text)),
            Scalar::Double => text
                .trim()
                .parse::<f64>()
                .map(Value::Double)
                .map_err(|_| invalid(&text)),
            Scalar::Boolean => match text.trim() {
                "0" => Ok(Value::Boolean(false)),
                "1" => Ok(Value::Boolean(true)),
                _ => Err(invalid(&text)),
            },
            Scalar::String => Ok(Value::String(text)),
            Scalar::DateTime => Ok(Value::DateTime(text.trim().to_string())),
            Scalar::Base64 => {
                let compact: String = text.chars().filter(|c| !c.is_ascii_whitespace()).collect();
                BASE64_STANDARD
                    .decode(compact.as_bytes())
                    .map(Value::Binary)
                    .map_err(|_| invalid(&text))
            }
        }
    }
}

#[derive(Debug)]
enum Frame {
    MethodCall {
        name: Option<String>,
        params: Option<Vec<Value>>,
    },
    MethodName(String),
    Params(Vec<Value>),
    Param(Option<Value>),
    Value {
        text: String,
        typed: Option<Value>,
    },
    Scalar {
        kind: Scalar,
        tag: &'static str,
        text: String,
    },
    Array(Option<Vec<Value>>),
    Data(Vec<Value>),
    Struct(Struct),
    Member {
        name: Option<String>,
        value: Option<Value>,
    },
    Name(String),
}

impl Frame {
    fn tag(&self) -> &'static str {
        match self {
            Frame::MethodCall { .. } => "methodCall",
            Frame::MethodName(_) => "methodName",
            Frame::Params(_) => "params",
            Frame::Param(_) => "param",
            Frame::Value { .. } => "value",
            Frame::Scalar { tag, .. } => *tag,
            Frame::Array(_) => "array",
            Frame::Data(_) => "data",
            Frame::Struct(_) => "struct",
            Frame::Member { .. } => "member",
            Frame::Name(_) => "name",
        }
    }

    fn empty_value() -> Self {
        Frame::Value {
            text: String::new(),
            typed: None,
        }
    }
}

/// Canonical tag name for scalar frames so `tag()` can stay `'static`
fn scalar_tag(tag: &str) -> &'static str {
    match tag {
        "i4" => "i4",
        "int" => "int",
        "double" => "double",
        "boolean" => "boolean",
        "string" => "string",
        "dateTime.iso8601" => "dateTime.iso8601",
        _ => "base64",
    }
}

#[derive(Debug)]
struct Machine {
    stack: Vec<Frame>,
    depth: usize,
    max_depth: usize,
    call: Option<MethodCall>,
}

impl Machine {
    fn new(max_depth: usize) -> Self {
        Self {
            stack: Vec::new(),
            depth: 0,
            max_depth,
            call: None,
        }
    }

    fn handle(&mut self, event: Event<'_>) -> Result<(), ParseError> {
        match event {
            Event::Start(e) => self.start(utf8(e.name().into_inner())?),
            Event::Empty(e) => {
                let name = utf8(e.name().into_inner())?;
                self.start(name)?;
                self.end(name)
            }
            Event::End(e) => self.end(utf8(e.name().into_inner())?),
            Event::Text(t) => {
                let text = t
                    .unescape()
                    .map_err(|e| ParseError::Malformed(e.to_string()))?;
                self.text(&text)
            }
            Event::CData(c) => self.text(utf8(&c)?),
            _ => Ok(()),
        }
    }

    fn start(&mut self, name: &str) -> Result<(), ParseError> {
        let unexpected = |context: &str| ParseError::UnexpectedElement {
            element: name.to_string(),
            context: context.to_string(),
        };

        let Some(top) = self.stack.last_mut() else {
            if self.call.is_none() && name == "methodCall" {
                self.stack.push(Frame::MethodCall {
                    name: None,
                    params: None,
                });
                return Ok(());
            }
            return Err(unexpected("document"));
        };

        let frame = match top {
            Frame::MethodCall { name: None, params: None } if name == "methodName" => {
                Frame::MethodName(String::new())
            }
            Frame::MethodCall { name: Some(_), params: None } if name == "params" => {
                Frame::Params(Vec::new())
            }
            Frame::Params(_) if name == "param" => Frame::Param(None),
            Frame::Param(None) | Frame::Data(_) if name == "value" => Frame::empty_value(),
            Frame::Member { name: Some(_), value: None } if name == "value" => Frame::empty_value(),
            Frame::Member { name: None, value: None } if name == "name" => Frame::Name(String::new()),
            Frame::Struct(_) if name == "member" => Frame::Member {
                name: None,
                value: None,
            },
            Frame::Array(None) if name == "data" => Frame::Data(Vec::new()),
            Frame::Value { text, typed: None } => {
                if !is_blank(text) {
                    return Err(ParseError::UnexpectedText {
                        context: "value".to_string(),
                    });
                }
                text.clear();
                match name {
                    "array" => Frame::Array(None),
                    "struct" => Frame::Struct(Struct::new()),
                    _ => match Scalar::from_tag(name) {
                        Some(kind) => Frame::Scalar {
                            kind,
                            tag: scalar_tag(name),
                            text: String::new(),
                        },
                        None => return Err(unexpected("value")),
                    },
                }
            }
            other => return Err(unexpected(other.tag())),
        };

        if matches!(frame, Frame::Array(_) | Frame::Struct(_)) {
            self.depth += 1;
            if self.depth > self.max_depth {
                return Err(ParseError::TooDeep {
                    limit: self.max_depth,
                });
            }
        }
        self.stack.push(frame);
        Ok(())
    }

    fn text(&mut self, content: &str) -> Result<(), ParseError> {
        match self.stack.last_mut() {
            Some(Frame::MethodName(text))
            | Some(Frame::Name(text))
            | Some(Frame::Scalar { text, .. })
            | Some(Frame::Value { text, typed: None }) => {
                text.push_str(content);
                Ok(())
            }
            _ if is_blank(content) => Ok(()),
            Some(frame) => Err(ParseError::UnexpectedText {
                context: frame.tag().to_string(),
            }),
            None => Err(ParseError::UnexpectedText {
                context: "document".to_string(),
            }),
        }
    }

    fn end(&mut self, name: &str) -> Result<(), ParseError> {
        let frame = self.stack.pop().ok_or_else(|| ParseError::UnexpectedElement {
            element: format!("/{}", name),
            context: "document".to_string(),
        })?;
        if frame.tag() != name {
            return Err(ParseError::MismatchedEnd {
                expected: frame.tag().to_string(),
                found: name.to_string(),
            });
        }

        let missing = |element: &str, child: &str| ParseError::MissingElement {
            element: element.to_string(),
            child: child.to_string(),
        };

        match frame {
            Frame::MethodCall { name, params } => {
                let method_name = name.ok_or(ParseError::MissingMethodName)?;
                self.call = Some(MethodCall {
                    method_name,
                    params: params.unwrap_or_default(),
                });
            }
            Frame::MethodName(text) => {
                if let Some(Frame::MethodCall { name, .. }) = self.stack.last_mut() {
                    *name = Some(text.trim().to_string());
                }
            }
            Frame::Params(values) => {
                if let Some(Frame::MethodCall { params, .. }) = self.stack.last_mut() {
                    *params = Some(values);
                }
            }
            Frame::Param(value) => {
                let value = value.ok_or_else(|| missing("param", "value"))?;
                if let Some(Frame::Params(values)) = self.stack.last_mut() {
                    values.push(value);
                }
            }
            Frame::Value { text, typed } => {
                let value = typed.unwrap_or(Value::String(text));
                match self.stack.last_mut() {
                    Some(Frame::Param(slot)) => *slot = Some(value),
                    Some(Frame::Data(values)) => values.push(value),
                    Some(Frame::Member { value: slot, .. }) => *slot = Some(value),
                    _ => {}
                }
            }
            Frame::Scalar { kind, tag, text } => {
                let value = kind.convert(tag, text)?;
                self.set_typed(value);
            }
            Frame::Array(data) => {
                self.depth -= 1;
                let values = data.ok_or_else(|| missing("array", "data"))?;
                self.set_typed(Value::Array(values));
            }
            Frame::Data(values) => {
                if let Some(Frame::Array(slot)) = self.stack.last_mut() {
                    *slot = Some(values);
                }
            }
            Frame::Struct(members) => {
                self.depth -= 1;
                self.set_typed(Value::Struct(members));
            }
            Frame::Member { name, value } => {
                let name = name.ok_or_else(|| missing("member", "name"))?;
                let value = value.ok_or_else(|| missing("member", "value"))?;
                if let Some(Frame::Struct(members)) = self.stack.last_mut() {
                    if members.contains(&name) {
                        return Err(ParseError::DuplicateMember(name));
                    }
                    members.insert(name, value);
                }
            }
            Frame::Name(text) => {
                if let Some(Frame::Member { name, .. }) = self.stack.last_mut() {
                    *name = Some(text);
                }
            }
        }
        Ok(())
    }

    fn set_typed(&mut self, value: Value) {
        if let Some(Frame::Value { typed, .. }) = self.stack.last_mut() {
            *typed = Some(value);
        }
    }
}

fn is_blank(text: &str) -> bool {
    text.chars().all(|c| c.is_ascii_whitespace())
}

fn utf8(bytes: &[u8]) -> Result<&str, ParseError> {
    std::str::from_utf8(bytes).map_err(|e| ParseError::Malformed(e.to_string()))
}
