//! Reply extraction from the backend's JSON response shapes.
//!
//! The backend answers in one of several shapes (`reply` as a string, a
//! number, or a structured value, else `message`, else `text`). Extraction
//! is an ordered list of probes tried in sequence; the first match wins.

use serde_json::Value;

type Probe = fn(&Value) -> Option<String>;

/// Probe order for the primary endpoint.
const PRIMARY_PROBES: &[Probe] = &[
    reply_string,
    reply_number,
    reply_structured,
    message_field,
    text_field,
];

/// Probe order for the demo endpoint, which only answers with `reply` or
/// `message`.
const DEMO_PROBES: &[Probe] = &[reply_string, reply_number, reply_structured, message_field];

/// Extract the reply string from a primary-endpoint body.
pub fn extract_reply(body: &Value) -> Option<String> {
    run(PRIMARY_PROBES, body)
}

/// Extract the reply string from a demo-endpoint body.
pub fn extract_demo_reply(body: &Value) -> Option<String> {
    run(DEMO_PROBES, body)
}

fn run(chain: &[Probe], body: &Value) -> Option<String> {
    chain.iter().find_map(|probe| probe(body))
}

fn reply_string(body: &Value) -> Option<String> {
    body.get("reply").and_then(|v| v.as_str()).map(|s| s.to_string())
}

fn reply_number(body: &Value) -> Option<String> {
    match body.get("reply") {
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    }
}

/// A structured `reply` (object or array) passes through stringified.
fn reply_structured(body: &Value) -> Option<String> {
    let v = body.get("reply")?;
    if v.is_object() || v.is_array() {
        serde_json::to_string(v).ok()
    } else {
        None
    }
}

fn message_field(body: &Value) -> Option<String> {
    body.get("message").and_then(|v| v.as_str()).map(|s| s.to_string())
}

fn text_field(body: &Value) -> Option<String> {
    body.get("text").and_then(|v| v.as_str()).map(|s| s.to_string())
}
