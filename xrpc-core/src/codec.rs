//! Serializer for XML-RPC documents
//!
//! This module renders [`Value`]s into the XML-RPC wire format. It is the
//! inverse of the tag mapping the [`parser`](crate::parser) accepts:
//!
//! | Value | Element |
//! |---|---|
//! | `Integer` | `<int>` |
//! | `Double` | `<double>` |
//! | `Boolean` | `<boolean>0</boolean>` / `<boolean>1</boolean>` |
//! | `String` | `<string>` |
//! | `DateTime` | `<dateTime.iso8601>` |
//! | `Binary` | `<base64>` (standard alphabet, padded) |
//! | `Array` | `<array><data><value>…</value></data></array>` |
//! | `Struct` | `<struct><member><name>…</name><value>…</value></member></struct>` |
//!
//! Output carries no insignificant whitespace. Text content is XML-escaped,
//! and carriage returns are written as `&#13;` so that end-of-line
//! normalization on the receiving side leaves them intact.
//! Doubles use Rust's shortest round-trip decimal form, which never switches
//! to scientific notation.
//!
//! Rendering is total: every `Value` has a representation, so none of these
//! functions can fail.
//!
//! # Examples
//!
//! ```rust
//! use xrpc_core::{codec, Fault, Value};
//!
//! let xml = codec::render_response(&[Value::from(42)]);
//! assert_eq!(
//!     xml,
//!     "<?xml version=\"1.0\"?><methodResponse><params><param><value><int>42</int></value></param></params></methodResponse>"
//! );
//!
//! let fault = codec::render_fault(&Fault::new(4, "Too many parameters."));
//! assert!(fault.contains("<name>faultCode</name><value><int>4</int></value>"));
//! ```

use crate::error::Fault;
use crate::types::MethodCall;
use crate::value::Value;
use base64::prelude::BASE64_STANDARD;
use base64::Engine;
use quick_xml::escape::escape;
use std::borrow::Cow;

const XML_DECL: &str = "<?xml version=\"1.0\"?>";

/// Render a successful `<methodResponse>` with one `<param>` per value
pub fn render_response(params: &[Value]) -> String {
    let mut out = String::with_capacity(128);
    out.push_str(XML_DECL);
    out.push_str("<methodResponse>");
    write_params(&mut out, params);
    out.push_str("</methodResponse>");
    out
}

/// Render a `<methodResponse>` carrying a fault struct
pub fn render_fault(fault: &Fault) -> String {
    let mut out = String::with_capacity(256);
    out.push_str(XML_DECL);
    out.push_str("<methodResponse><fault><value><struct>");
    out.push_str("<member><name>faultCode</name><value><int>");
    out.push_str(&fault.code.to_string());
    out.push_str("</int></value></member>");
    out.push_str("<member><name>faultString</name><value><string>");
    out.push_str(&escape_text(&fault.message));
    out.push_str("</string></value></member>");
    out.push_str("</struct></value></fault></methodResponse>");
    out
}

/// Render a `<methodCall>` document
///
/// Used to re-send a decoded call to another endpoint.
pub fn render_call(call: &MethodCall) -> String {
    let mut out = String::with_capacity(128);
    out.push_str(XML_DECL);
    out.push_str("<methodCall><methodName>");
    out.push_str(&escape_text(&call.method_name));
    out.push_str("</methodName>");
    write_params(&mut out, &call.params);
    out.push_str("</methodCall>");
    out
}

/// Render a single `<value>` element
pub fn render_value(value: &Value) -> String {
    let mut out = String::new();
    write_value(&mut out, value);
    out
}

fn write_params(out: &mut String, params: &[Value]) {
    out.push_str("<params>");
    for param in params {
        out.push_str("<param>");
        write_value(out, param);
        out.push_str("</param>");
    }
    out.push_str("</params>");
}

fn write_value(out: &mut String, value: &Value) {
    out.push_str("<value>");
    match value {
        Value::Integer(i) => write_scalar(out, "int", &i.to_string()),
        Value::Double(d) => write_scalar(out, "double", &d.to_string()),
        Value::Boolean(b) => write_scalar(out, "boolean", if *b { "1" } else { "0" }),
        Value::String(s) => write_scalar(out, "string", &escape_text(s)),
        Value::DateTime(s) => write_scalar(out, "dateTime.iso8601", &escape_text(s)),
        Value::Binary(bytes) => write_scalar(out, "base64", &BASE64_STANDARD.encode(bytes)),
        Value::Array(items) => {
            out.push_str("<array><data>");
            for item in items {
                write_value(out, item);
            }
            out.push_str("</data></array>");
        }
        Value::Struct(members) => {
            out.push_str("<struct>");
            for (name, member) in members.iter() {
                out.push_str("<member><name>");
                out.push_str(&escape_text(name));
                out.push_str("</name>");
                write_value(out, member);
                out.push_str("</member>");
            }
            out.push_str("</struct>");
        }
    }
    out.push_str("</value>");
}

fn escape_text(text: &str) -> Cow<'_, str> {
    let escaped = escape(text);
    if escaped.contains('\r') {
        Cow::Owned(escaped.replace('\r', "&#13;"))
    } else {
        escaped
    }
}

fn write_scalar(out: &mut String, tag: &str, text: &str) {
    out.push('<');
    out.push_str(tag);
    out.push('>');
    out.push_str(text);
    out.push_str("</");
    out.push_str(tag);
    out.push('>');
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Struct;

    #[test]
    fn test_render_fault_exact() {
        let xml = render_fault(&Fault::new(-32601, "requested method x not found"));
        assert_eq!(
            xml,
            "<?xml version=\"1.0\"?><methodResponse><fault><value><struct>\
             <member><name>faultCode</name><value><int>-32601</int></value></member>\
             <member><name>faultString</name><value><string>requested method x not found</string></value></member>\
             </struct></value></fault></methodResponse>"
        );
    }

    #[test]
    fn test_render_scalars() {
        assert_eq!(render_value(&Value::Integer(-7)), "<value><int>-7</int></value>");
        assert_eq!(
            render_value(&Value::Boolean(true)),
            "<value><boolean>1</boolean></value>"
        );
        assert_eq!(
            render_value(&Value::Boolean(false)),
            "<value><boolean>0</boolean></value>"
        );
        assert_eq!(
            render_value(&Value::Binary(b"hello".to_vec())),
            "<value><base64>aGVsbG8=</base64></value>"
        );
        assert_eq!(
            render_value(&Value::DateTime("19980717T14:08:55".into())),
            "<value><dateTime.iso8601>19980717T14:08:55</dateTime.iso8601></value>"
        );
    }

    #[test]
    fn test_render_double_never_scientific() {
        assert_eq!(render_value(&Value::Double(1.5)), "<value><double>1.5</double></value>");
        assert_eq!(
            render_value(&Value::Double(1e21)),
            "<value><double>1000000000000000000000</double></value>"
        );
        assert_eq!(
            render_value(&Value::Double(1e-7)),
            "<value><double>0.0000001</double></value>"
        );
    }

    #[test]
    fn test_render_escapes_text() {
        let xml = render_value(&Value::from("a < b & \"c\""));
        assert_eq!(
            xml,
            "<value><string>a &lt; b &amp; &quot;c&quot;</string></value>"
        );

        let fault = render_fault(&Fault::new(1, "<oops>"));
        assert!(fault.contains("&lt;oops&gt;"));
    }

    #[test]
    fn test_render_keeps_carriage_returns() {
        assert_eq!(
            render_value(&Value::from("a\r\nb")),
            "<value><string>a&#13;\nb</string></value>"
        );

        let members: Struct = vec![("k\r", Value::from(1))].into_iter().collect();
        assert!(render_value(&Value::Struct(members)).contains("<name>k&#13;</name>"));

        let fault = render_fault(&Fault::new(1, "line\rbreak"));
        assert!(fault.contains("<string>line&#13;break</string>"));

        let call = MethodCall::new("m", vec![Value::from("x\r\ny\r")]);
        let parsed = crate::parser::parse_method_call(&render_call(&call)).unwrap();
        assert_eq!(parsed.params, vec![Value::from("x\r\ny\r")]);
    }

    #[test]
    fn test_render_nested() {
        let inner: Struct = vec![("test", Value::from(999))].into_iter().collect();
        let value = Value::Array(vec![Value::Struct(inner), Value::Array(vec![])]);
        assert_eq!(
            render_value(&value),
            "<value><array><data>\
             <value><struct><member><name>test</name><value><int>999</int></value></member></struct></value>\
             <value><array><data></data></array></value>\
             </data></array></value>"
        );
    }

    #[test]
    fn test_render_response_several_params() {
        let xml = render_response(&[Value::from(1), Value::from("two")]);
        assert!(xml.starts_with("<?xml version=\"1.0\"?><methodResponse><params>"));
        assert!(xml.contains("<param><value><int>1</int></value></param><param><value><string>two</string></value></param>"));
    }

    #[test]
    fn test_render_call() {
        let call = MethodCall::new("a.b", vec![Value::from(true)]);
        assert_eq!(
            render_call(&call),
            "<?xml version=\"1.0\"?><methodCall><methodName>a.b</methodName>\
             <params><param><value><boolean>1</boolean></value></param></params></methodCall>"
        );
    }
}
