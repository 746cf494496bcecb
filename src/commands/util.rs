use nu_protocol::{LabeledError, Record, Span, Value};

use crate::error::Error;

/// Convert an operation's JSON output into a Nushell value.
///
/// Objects become records, arrays become lists, and integers that do not fit
/// in an `i64` fall back to floats.
pub fn json_to_value(json: &serde_json::Value, span: Span) -> Value {
    match json {
        serde_json::Value::Null => Value::nothing(span),
        serde_json::Value::Bool(b) => Value::bool(*b, span),
        serde_json::Value::Number(n) => match n.as_i64() {
            Some(i) => Value::int(i, span),
            None => Value::float(n.as_f64().unwrap_or(f64::NAN), span),
        },
        serde_json::Value::String(s) => Value::string(s.as_str(), span),
        serde_json::Value::Array(items) => Value::list(
            items.iter().map(|item| json_to_value(item, span)).collect(),
            span,
        ),
        serde_json::Value::Object(map) => {
            let mut record = Record::new();
            for (key, value) in map {
                record.push(key.as_str(), json_to_value(value, span));
            }
            Value::record(record, span)
        }
    }
}

/// Attach the call span to a crate error.
pub fn labeled(error: Error, span: Span) -> LabeledError {
    LabeledError::new(error.to_string()).with_label("topic-state operation failed", span)
}
