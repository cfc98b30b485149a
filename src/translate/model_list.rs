//! Re-add the external prefix to a models-listing response.

use serde_json::Value;

/// For each entry in `data`, set `id = prefix + id` and
/// `display_name = prefix + (display_name or id)`. A body without a `data`
/// array comes back unchanged, as do entries that have no string `id`.
pub fn prefix_model_list(body: Value, prefix: &str) -> Value {
    let Value::Object(mut root) = body else {
        return body;
    };

    if let Some(Value::Array(entries)) = root.get_mut("data") {
        *entries = std::mem::take(entries)
            .into_iter()
            .map(|entry| prefix_entry(entry, prefix))
            .collect();
    }

    Value::Object(root)
}

fn prefix_entry(entry: Value, prefix: &str) -> Value {
    let Value::Object(mut model) = entry else {
        return entry;
    };
    let Some(id) = model.get("id").and_then(Value::as_str).map(str::to_owned) else {
        return Value::Object(model);
    };

    let display_name = model
        .get("display_name")
        .and_then(Value::as_str)
        .filter(|name| !name.is_empty())
        .unwrap_or(id.as_str())
        .to_owned();

    model.insert("id".to_string(), Value::String(format!("{prefix}{id}")));
    model.insert(
        "display_name".to_string(),
        Value::String(format!("{prefix}{display_name}")),
    );
    Value::Object(model)
}
