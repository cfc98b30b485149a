//! Strip vendor-only JSON Schema metadata from tool parameter schemas.

use serde_json::Value;

/// Keys removed at every schema level the sanitizer visits.
const STRIPPED_KEYS: [&str; 3] = ["additionalProperties", "$schema", "title"];

/// Remove `additionalProperties`, `$schema` and `title` from `schema` and from
/// every nested schema reachable through `properties.*` and `items`.
///
/// Non-object values are returned as-is. Applying it twice is the same as
/// applying it once.
pub fn sanitize_schema(schema: Value) -> Value {
    let Value::Object(mut map) = schema else {
        return schema;
    };

    for key in STRIPPED_KEYS {
        map.remove(key);
    }

    if let Some(Value::Object(properties)) = map.get_mut("properties") {
        for property in properties.values_mut() {
            *property = sanitize_schema(property.take());
        }
    }

    if let Some(items) = map.get_mut("items") {
        *items = match items.take() {
            Value::Array(tuple) => Value::Array(tuple.into_iter().map(sanitize_schema).collect()),
            single => sanitize_schema(single),
        };
    }

    Value::Object(map)
}
