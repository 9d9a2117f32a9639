use std::fmt::Write as _;

use serde_json::Value;

/// Serializes a JSON value with sorted object keys, `", "` / `": "` separators
/// and ASCII-only string escapes.
///
/// This is the layout other AWS SDKs hash when naming their assume-role cache
/// entries, so keys derived from it stay interoperable with those caches.
pub(crate) fn to_canonical_string(value: &Value) -> String {
    let mut out = String::new();
    write_value(&mut out, value);
    out
}

fn write_value(out: &mut String, value: &Value) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(true) => out.push_str("true"),
        Value::Bool(false) => out.push_str("false"),
        Value::Number(n) => {
            let _ = write!(out, "{n}");
        }
        Value::String(s) => write_string(out, s),
        Value::Array(items) => {
            out.push('[');
            for (idx, item) in items.iter().enumerate() {
                if idx > 0 {
                    out.push_str(", ");
                }
                write_value(out, item);
            }
            out.push(']');
        }
        Value::Object(map) => {
            let mut entries = map.iter().collect::<Vec<_>>();
            entries.sort_by(|a, b| a.0.cmp(b.0));

            out.push('{');
            for (idx, (key, item)) in entries.into_iter().enumerate() {
                if idx > 0 {
                    out.push_str(", ");
                }
                write_string(out, key);
                out.push_str(": ");
                write_value(out, item);
            }
            out.push('}');
        }
    }
}

fn write_string(out: &mut String, s: &str) {
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\u{08}' => out.push_str("\\b"),
            '\u{0c}' => out.push_str("\\f"),
            c if (c as u32) < 0x20 || (c as u32) > 0x7e => {
                let mut units = [0u16; 2];
                for unit in c.encode_utf16(&mut units) {
                    let _ = write!(out, "\\u{unit:04x}");
                }
            }
            c => out.push(c),
        }
    }
    out.push('"');
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn sorts_keys_and_uses_spaced_separators() {
        let value = json!({"RoleSessionName": "s", "RoleArn": "myrole"});
        assert_eq!(
            to_canonical_string(&value),
            r#"{"RoleArn": "myrole", "RoleSessionName": "s"}"#
        );
    }

    #[test]
    fn nested_objects_and_arrays_are_canonical() {
        let value = json!({"b": [1, {"y": true, "x": null}], "a": 2});
        assert_eq!(
            to_canonical_string(&value),
            r#"{"a": 2, "b": [1, {"x": null, "y": true}]}"#
        );
    }

    #[test]
    fn escapes_non_ascii_as_utf16_units() {
        let value = json!("caf\u{e9} \u{1f600}\n");
        assert_eq!(
            to_canonical_string(&value),
            r#""caf\u00e9 \ud83d\ude00\n""#
        );
    }
}
