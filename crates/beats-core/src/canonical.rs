//! Canonical JSON emission.
//!
//! Receipts are signed over canonical JSON and memos are written as canonical
//! JSON: object keys sorted lexicographically (byte order), no insignificant
//! whitespace, minimal string escaping. Any third party that rebuilds the
//! same value tree obtains the same bytes, which is what makes detached
//! receipt signatures independently verifiable.
//!
//! Arrays preserve element order; only object keys are sorted.

use std::fmt::Write as _;

use serde_json::{Map, Number, Value};

/// Renders a JSON value in canonical form.
#[must_use]
pub fn to_canonical_string(value: &Value) -> String {
    let mut output = String::new();
    emit_value(value, &mut output);
    output
}

/// Canonical form as UTF-8 bytes, ready for signing.
#[must_use]
pub fn to_canonical_bytes(value: &Value) -> Vec<u8> {
    to_canonical_string(value).into_bytes()
}

fn emit_value(value: &Value, output: &mut String) {
    match value {
        Value::Null => output.push_str("null"),
        Value::Bool(b) => output.push_str(if *b { "true" } else { "false" }),
        Value::Number(n) => emit_number(n, output),
        Value::String(s) => emit_string(s, output),
        Value::Array(items) => {
            output.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    output.push(',');
                }
                emit_value(item, output);
            }
            output.push(']');
        },
        Value::Object(obj) => emit_object(obj, output),
    }
}

fn emit_number(n: &Number, output: &mut String) {
    if let Some(i) = n.as_i64() {
        let _ = write!(output, "{i}");
    } else if let Some(u) = n.as_u64() {
        let _ = write!(output, "{u}");
    } else {
        // Payloads are integer-only; fall back to serde's rendering for
        // anything else rather than panic inside a signing path.
        output.push_str(&n.to_string());
    }
}

/// Minimal escaping: only `"`, `\`, and control characters U+0000..U+001F,
/// with the conventional short escapes where JSON defines them.
fn emit_string(s: &str, output: &mut String) {
    output.push('"');
    for c in s.chars() {
        match c {
            '"' => output.push_str("\\\""),
            '\\' => output.push_str("\\\\"),
            '\u{0008}' => output.push_str("\\b"),
            '\u{000C}' => output.push_str("\\f"),
            '\n' => output.push_str("\\n"),
            '\r' => output.push_str("\\r"),
            '\t' => output.push_str("\\t"),
            c if ('\u{0000}'..='\u{001F}').contains(&c) => {
                let _ = write!(output, "\\u{:04x}", c as u32);
            },
            c => output.push(c),
        }
    }
    output.push('"');
}

fn emit_object(obj: &Map<String, Value>, output: &mut String) {
    let mut keys: Vec<&String> = obj.keys().collect();
    keys.sort();

    output.push('{');
    for (i, key) in keys.iter().enumerate() {
        if i > 0 {
            output.push(',');
        }
        emit_string(key, output);
        output.push(':');
        emit_value(&obj[*key], output);
    }
    output.push('}');
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn sorts_keys_lexicographically() {
        let a = json!({"a": 1, "b": 2});
        let b = json!({"b": 2, "a": 1});
        assert_eq!(to_canonical_string(&a), to_canonical_string(&b));
        assert_eq!(to_canonical_string(&a), r#"{"a":1,"b":2}"#);
    }

    #[test]
    fn sorts_nested_objects() {
        let v = json!({"z": {"c": 3, "a": 1}, "a": [1, {"y": 2, "x": 1}]});
        assert_eq!(
            to_canonical_string(&v),
            r#"{"a":[1,{"x":1,"y":2}],"z":{"a":1,"c":3}}"#
        );
    }

    #[test]
    fn no_whitespace() {
        let v = json!({"key": "value", "n": 42});
        assert_eq!(to_canonical_string(&v), r#"{"key":"value","n":42}"#);
    }

    #[test]
    fn escapes_specials_minimally() {
        let v = json!({"t": "a\"b\\c\nd"});
        assert_eq!(to_canonical_string(&v), r#"{"t":"a\"b\\c\nd"}"#);
    }

    #[test]
    fn arrays_preserve_order() {
        let v = json!([3, 1, 2]);
        assert_eq!(to_canonical_string(&v), "[3,1,2]");
    }

    #[test]
    fn idempotent_through_reparse() {
        let v = json!({"beat_index": 7, "hash": "ab", "type": "anchor"});
        let first = to_canonical_string(&v);
        let reparsed: Value = serde_json::from_str(&first).unwrap();
        assert_eq!(first, to_canonical_string(&reparsed));
    }
}
