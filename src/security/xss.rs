//! Markup escaping for client-supplied strings
//!
//! Every string argument of an inbound event is escaped before it reaches
//! the registry, so names echoed back to consoles can never open a tag.
//! Structured blobs (info, xml, settings) stay opaque: only a blob that is
//! itself a bare string gets escaped.

use serde_json::Value;

/// Characters rewritten by `encode_angle_brackets`
const ANGLE_ENTITIES: &[(&str, &str)] = &[("<", "&lt;"), (">", "&gt;")];

/// Escape angle brackets so the value cannot be rendered as markup
pub fn encode_angle_brackets(input: &str) -> String {
    let mut result = input.to_string();

    for (char, entity) in ANGLE_ENTITIES {
        result = result.replace(char, entity);
    }

    result
}

/// Sanitize a positional argument: strings are escaped, anything else passes through
pub fn sanitize_value(value: Value) -> Value {
    match value {
        Value::String(s) => Value::String(encode_angle_brackets(&s)),
        other => other,
    }
}
