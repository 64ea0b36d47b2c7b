//! XML-RPC encoding of hub calls and decoding of hub responses.
//!
//! Values are exchanged as `serde_json::Value` so they can be stored in
//! cassettes unchanged. Mapping:
//!
//! | XML-RPC | JSON |
//! |---|---|
//! | `int`, `i4`, `i8` | integer |
//! | `double` | float |
//! | `boolean` | bool |
//! | `string`, untyped, `base64` | string |
//! | `dateTime.iso8601` | `YYYY-MM-DDTHH:MM:SS` string |
//! | `nil` | null |
//! | `array` / `struct` | array / object |

use std::borrow::Cow;
use std::fmt::Write as _;

use chrono::NaiveDateTime;
use quick_xml::escape::escape;
use quick_xml::events::Event;
use quick_xml::Reader;
use serde_json::{Map, Number, Value};

use crate::cassette::format::CallArgs;
use crate::error::Fault;

/// Marker key the hub uses to recognise a trailing keyword-argument struct.
const KWARGS_MARKER: &str = "__starstar";

/// Fault kind for responses that are not valid XML-RPC.
pub const PROTOCOL_ERROR: &str = "ProtocolError";

/// Renders a `methodCall` document.
#[must_use]
pub fn encode_call(method: &str, call: &CallArgs) -> String {
    let mut out = String::from("<?xml version=\"1.0\"?>\n<methodCall><methodName>");
    out.push_str(&escape(method));
    out.push_str("</methodName><params>");
    for arg in &call.args {
        out.push_str("<param>");
        encode_value(&mut out, arg);
        out.push_str("</param>");
    }
    if !call.kwargs.is_empty() {
        let mut kwargs: Map<String, Value> =
            call.kwargs.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        kwargs.insert(KWARGS_MARKER.to_owned(), Value::Bool(true));
        out.push_str("<param>");
        encode_value(&mut out, &Value::Object(kwargs));
        out.push_str("</param>");
    }
    out.push_str("</params></methodCall>\n");
    out
}

fn encode_value(out: &mut String, value: &Value) {
    out.push_str("<value>");
    match value {
        Value::Null => out.push_str("<nil/>"),
        Value::Bool(b) => {
            let _ = write!(out, "<boolean>{}</boolean>", u8::from(*b));
        }
        Value::Number(n) => match n.as_i64() {
            Some(i) if i32::try_from(i).is_ok() => {
                let _ = write!(out, "<int>{i}</int>");
            }
            Some(i) => {
                let _ = write!(out, "<i8>{i}</i8>");
            }
            None => {
                let _ = write!(out, "<double>{}</double>", n.as_f64().unwrap_or_default());
            }
        },
        Value::String(s) => {
            out.push_str("<string>");
            out.push_str(&escape(s.as_str()));
            out.push_str("</string>");
        }
        Value::Array(items) => {
            out.push_str("<array><data>");
            for item in items {
                encode_value(out, item);
            }
            out.push_str("</data></array>");
        }
        Value::Object(members) => {
            out.push_str("<struct>");
            for (name, member) in members {
                out.push_str("<member><name>");
                out.push_str(&escape(name.as_str()));
                out.push_str("</name>");
                encode_value(out, member);
                out.push_str("</member>");
            }
            out.push_str("</struct>");
        }
    }
    out.push_str("</value>");
}

/// Minimal element tree; XML-RPC needs nothing beyond names, children and text.
#[derive(Debug, Default)]
struct Node {
    name: String,
    children: Vec<Node>,
    text: String,
}

impl Node {
    fn named(name: String) -> Self {
        Self { name, ..Self::default() }
    }

    fn child(&self, name: &str) -> Option<&Node> {
        self.children.iter().find(|c| c.name == name)
    }
}

fn protocol_error(message: impl Into<String>) -> Fault {
    Fault::new(PROTOCOL_ERROR, message)
}

fn parse_tree(xml: &str) -> Result<Node, Fault> {
    let mut reader = Reader::from_str(xml);
    let mut stack: Vec<Node> = Vec::new();
    let mut root: Option<Node> = None;

    loop {
        let event = reader.read_event().map_err(|e| {
            protocol_error(format!("malformed XML at byte {}: {e}", reader.buffer_position()))
        })?;
        match event {
            Event::Start(start) => {
                let name = String::from_utf8_lossy(start.local_name().as_ref()).into_owned();
                stack.push(Node::named(name));
            }
            Event::Empty(empty) => {
                let name = String::from_utf8_lossy(empty.local_name().as_ref()).into_owned();
                let node = Node::named(name);
                match stack.last_mut() {
                    Some(parent) => parent.children.push(node),
                    None => root = Some(node),
                }
            }
            Event::End(_) => {
                let node = stack.pop().ok_or_else(|| protocol_error("unbalanced closing tag"))?;
                match stack.last_mut() {
                    Some(parent) => parent.children.push(node),
                    None => root = Some(node),
                }
            }
            Event::Text(text) => {
                if let Some(node) = stack.last_mut() {
                    let text =
                        text.unescape().map_err(|e| protocol_error(format!("bad text: {e}")))?;
                    node.text.push_str(&text);
                }
            }
            Event::CData(data) => {
                if let Some(node) = stack.last_mut() {
                    node.text.push_str(&String::from_utf8_lossy(&data.into_inner()));
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !stack.is_empty() {
        return Err(protocol_error("document ended inside an element"));
    }
    root.ok_or_else(|| protocol_error("empty document"))
}

/// Decodes a `methodResponse` document.
///
/// # Errors
///
/// Returns the hub's fault (kind mapped from its fault code) or a
/// [`PROTOCOL_ERROR`] fault when the document is not a valid response.
pub fn decode_response(xml: &str) -> Result<Value, Fault> {
    let root = parse_tree(xml)?;
    if root.name != "methodResponse" {
        return Err(protocol_error(format!("expected methodResponse, found <{}>", root.name)));
    }

    if let Some(fault) = root.child("fault") {
        let value = fault
            .child("value")
            .ok_or_else(|| protocol_error("fault without value"))
            .and_then(decode_value)?;
        let code = value.get("faultCode").and_then(Value::as_i64).unwrap_or_default();
        let message = value.get("faultString").and_then(Value::as_str).unwrap_or_default();
        return Err(Fault::new(fault_kind(code), message));
    }

    root.child("params")
        .and_then(|params| params.child("param"))
        .and_then(|param| param.child("value"))
        .ok_or_else(|| protocol_error("response without params"))
        .and_then(decode_value)
}

fn decode_value(node: &Node) -> Result<Value, Fault> {
    let Some(typed) = node.children.first() else {
        return Ok(Value::String(node.text.clone()));
    };
    let text = typed.text.trim();
    let value = match typed.name.as_str() {
        "int" | "i4" | "i8" => {
            let n: i64 = text.parse().map_err(|_| protocol_error(format!("bad integer `{text}`")))?;
            Value::from(n)
        }
        "double" => {
            let f: f64 = text.parse().map_err(|_| protocol_error(format!("bad double `{text}`")))?;
            Number::from_f64(f).map_or(Value::Null, Value::Number)
        }
        "boolean" => match text {
            "1" => Value::Bool(true),
            "0" => Value::Bool(false),
            other => return Err(protocol_error(format!("bad boolean `{other}`"))),
        },
        "string" => Value::String(typed.text.clone()),
        "base64" => Value::String(text.to_owned()),
        "dateTime.iso8601" => Value::String(normalize_datetime(text).into_owned()),
        "nil" => Value::Null,
        "array" => {
            let data = typed.child("data").ok_or_else(|| protocol_error("array without data"))?;
            Value::Array(data.children.iter().map(decode_value).collect::<Result<_, _>>()?)
        }
        "struct" => {
            let mut members = Map::new();
            for member in &typed.children {
                let name =
                    member.child("name").ok_or_else(|| protocol_error("member without name"))?;
                let value =
                    member.child("value").ok_or_else(|| protocol_error("member without value"))?;
                members.insert(name.text.clone(), decode_value(value)?);
            }
            Value::Object(members)
        }
        other => return Err(protocol_error(format!("unsupported type <{other}>"))),
    };
    Ok(value)
}

fn normalize_datetime(text: &str) -> Cow<'_, str> {
    ["%Y%m%dT%H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y%m%dT%H%M%S"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
        .map_or(Cow::Borrowed(text), |dt| Cow::Owned(dt.format("%Y-%m-%dT%H:%M:%S").to_string()))
}

/// Names the hub's numeric fault codes.
#[must_use]
pub fn fault_kind(code: i64) -> Cow<'static, str> {
    let name = match code {
        1000 => "GenericError",
        1001 => "LockError",
        1002 => "AuthError",
        1003 => "TagError",
        1004 => "ActionNotAllowed",
        1005 => "BuildError",
        1006 => "AuthLockError",
        1007 => "AuthExpired",
        1008 => "SequenceError",
        1009 => "RetryError",
        1014 => "ServerOffline",
        1019 => "ParameterError",
        other => return Cow::Owned(format!("Fault{other}")),
    };
    Cow::Borrowed(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn encodes_positional_and_keyword_arguments() {
        let call = CallArgs::positional([json!("f25"), json!(null)]).kwarg("latest", true);
        let xml = encode_call("listTagged", &call);
        assert_eq!(
            xml,
            "<?xml version=\"1.0\"?>\n<methodCall><methodName>listTagged</methodName><params>\
             <param><value><string>f25</string></value></param>\
             <param><value><nil/></value></param>\
             <param><value><struct>\
             <member><name>__starstar</name><value><boolean>1</boolean></value></member>\
             <member><name>latest</name><value><boolean>1</boolean></value></member>\
             </struct></value></param>\
             </params></methodCall>\n"
        );
    }

    #[test]
    fn escapes_markup_in_strings() {
        let xml = encode_call("echo", &CallArgs::positional([json!("a<b & c>")]));
        assert!(xml.contains("<string>a&lt;b &amp; c&gt;</string>"));
    }

    #[test]
    fn large_integers_use_i8() {
        let xml = encode_call("getTaskInfo", &CallArgs::positional([json!(5_000_000_000_i64)]));
        assert!(xml.contains("<i8>5000000000</i8>"));
    }

    #[test]
    fn decodes_nested_response() {
        let xml = "<?xml version='1.0'?>
<methodResponse>
<params>
<param>
<value><struct>
<member><name>id</name><value><int>123</int></value></member>
<member><name>method</name><value><string>build</string></value></member>
<member><name>label</name><value> untyped text </value></member>
<member><name>weight</name><value><double>0.5</double></value></member>
<member><name>waiting</name><value><boolean>0</boolean></value></member>
<member><name>parent</name><value><nil/></value></member>
<member><name>create_time</name>
<value><dateTime.iso8601>20160811T10:12:41</dateTime.iso8601></value></member>
<member><name>arches</name><value><array><data>
<value><string>x86_64</string></value>
<value><string>i386</string></value>
</data></array></value></member>
</struct></value>
</param>
</params>
</methodResponse>";
        let value = decode_response(xml).unwrap();
        assert_eq!(
            value,
            json!({
                "id": 123,
                "method": "build",
                "label": " untyped text ",
                "weight": 0.5,
                "waiting": false,
                "parent": null,
                "create_time": "2016-08-11T10:12:41",
                "arches": ["x86_64", "i386"],
            })
        );
    }

    #[test]
    fn decodes_fault_with_named_kind() {
        let xml = "<?xml version='1.0'?>
<methodResponse><fault><value><struct>
<member><name>faultCode</name><value><int>1000</int></value></member>
<member><name>faultString</name><value><string>No such task: 124</string></value></member>
</struct></value></fault></methodResponse>";
        let fault = decode_response(xml).unwrap_err();
        assert_eq!(fault, Fault::new("GenericError", "No such task: 124"));
    }

    #[test]
    fn unknown_fault_codes_keep_the_number() {
        assert_eq!(fault_kind(4242), "Fault4242");
        assert_eq!(fault_kind(1002), "AuthError");
    }

    #[test]
    fn garbage_is_a_protocol_error() {
        for bad in ["", "<html><body>502</body></html>", "<methodResponse><params>"] {
            let fault = decode_response(bad).unwrap_err();
            assert_eq!(fault.kind, PROTOCOL_ERROR, "input: {bad:?}");
        }
    }
}
