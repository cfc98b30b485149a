//! Demonstrate using the translation layer without a server.
//!
//! Usage:
//!   `cargo run --example translate_only`

use proxy_router::translate::model_list::prefix_model_list;
use proxy_router::translate::{ModelRouter, RequestPipeline};
use serde_json::json;

fn main() -> anyhow::Result<()> {
    let pipeline = RequestPipeline::new(ModelRouter::new("cus-", ["claude"]));

    // What an Anthropic-style client sends
    let inbound = json!({
        "model": "cus-gpt-4o",
        "stream": true,
        "tools": [{
            "name": "get_weather",
            "description": "Get current weather for a city",
            "input_schema": {
                "$schema": "http://json-schema.org/draft-07/schema#",
                "type": "object",
                "additionalProperties": false,
                "properties": {"city": {"type": "string", "title": "City"}},
                "required": ["city"]
            }
        }],
        "tool_choice": {"type": "auto"},
        "messages": [
            {
                "role": "user",
                "content": [
                    {"type": "text", "text": "What is in this picture?"},
                    {"type": "image", "source": {"type": "base64", "media_type": "image/png", "data": "iVBORw0KGgo="}}
                ]
            },
            {
                "role": "assistant",
                "content": [{"type": "tool_use", "id": "toolu_1", "name": "get_weather", "input": {"city": "Paris"}}]
            },
            {
                "role": "user",
                "content": [
                    {"type": "tool_result", "tool_use_id": "toolu_1", "content": [{"type": "text", "text": "18C, cloudy"}]},
                    {"type": "text", "text": "And should I bring an umbrella?"}
                ]
            }
        ]
    });

    let out = pipeline.rewrite(inbound.to_string().as_bytes())?;
    let outbound: serde_json::Value = serde_json::from_slice(&out.body)?;

    println!("=== Routed model ===");
    println!(
        "{} (family: {}, vision header: {})",
        out.route.internal_id,
        out.route.family.as_str(),
        out.vision
    );
    println!();
    println!("=== Outbound request ===");
    println!("{}", serde_json::to_string_pretty(&outbound)?);

    // Same request to an image-stripping model
    let mut claude = inbound.clone();
    claude["model"] = json!("cus-claude-3-opus");
    let out = pipeline.rewrite(claude.to_string().as_bytes())?;
    let outbound: serde_json::Value = serde_json::from_slice(&out.body)?;

    println!();
    println!("=== Image-stripping family ===");
    println!("{}", serde_json::to_string_pretty(&outbound["messages"][0])?);

    // What the gateway returns for /models, and what the client sees
    let models = json!({
        "object": "list",
        "data": [
            {"id": "gpt-4o", "display_name": "GPT-4o"},
            {"id": "claude-3-opus"}
        ]
    });

    println!();
    println!("=== Models list ===");
    println!(
        "{}",
        serde_json::to_string_pretty(&prefix_model_list(models, pipeline.router().prefix()))?
    );

    Ok(())
}
