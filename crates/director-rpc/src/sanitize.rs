//! Redaction of bulk or sensitive fields before a message reaches the log.

use serde::Serialize;
use serde_json::{Map, Value};

pub const REDACTED: &str = "<redacted>";

/// Methods whose arguments carry blob contents.
const BULK_DATA_METHODS: &[&str] = &["upload_blob"];
const SENSITIVE_FIELDS: &[&str] = &["checksum", "payload"];

/// Renders `message` as JSON for logging.
///
/// For bulk-data methods, `checksum` and `payload` are replaced with
/// [`REDACTED`] both at the top level and inside each object argument. The
/// redaction happens on an owned copy; `message` is never touched.
pub fn sanitize<T: Serialize + ?Sized>(message: &T) -> Result<String, serde_json::Error> {
    let mut value = serde_json::to_value(message)?;
    if carries_bulk_data(&value) {
        redact(&mut value);
    }
    serde_json::to_string(&value)
}

fn carries_bulk_data(value: &Value) -> bool {
    value
        .get("method")
        .and_then(Value::as_str)
        .is_some_and(|method| BULK_DATA_METHODS.contains(&method))
}

fn redact(value: &mut Value) {
    let Some(fields) = value.as_object_mut() else {
        return;
    };
    redact_fields(fields);
    if let Some(Value::Array(arguments)) = fields.get_mut("arguments") {
        arguments
            .iter_mut()
            .filter_map(Value::as_object_mut)
            .for_each(redact_fields);
    }
}

fn redact_fields(fields: &mut Map<String, Value>) {
    for name in SENSITIVE_FIELDS {
        if let Some(field) = fields.get_mut(*name) {
            *field = Value::String(REDACTED.to_string());
        }
    }
}
