//! Rewrite the message list into upstream shape.
//!
//! A user message carrying `tool_result` blocks is split: each result becomes
//! its own `role: "tool"` message (in block order), followed by at most one
//! user message with whatever other parts were there. All other messages keep
//! their place and only have their parts rewritten. Entries that are not
//! message objects are forwarded untouched without affecting the others.

use serde_json::Value;

use super::content::map_part;
use super::model::ModelFamily;
use super::types::{ContentPart, Message, MessageContent, MessageEntry, Role};

/// Content used when rewriting leaves a message with no parts.
pub const EMPTY_CONTENT: &str = " ";

pub fn transform_messages(messages: Vec<MessageEntry>, family: ModelFamily) -> Vec<MessageEntry> {
    let mut out = Vec::with_capacity(messages.len());
    for (index, entry) in messages.into_iter().enumerate() {
        match entry {
            MessageEntry::Message(message) => out.extend(
                transform_message(message, family)
                    .into_iter()
                    .map(MessageEntry::Message),
            ),
            MessageEntry::Raw(raw) => {
                tracing::warn!(index, "Message is not a usable object, passing through untouched");
                out.push(MessageEntry::Raw(raw));
            }
        }
    }
    out
}

/// One input message expands to zero, one or more output messages.
fn transform_message(message: Message, family: ModelFamily) -> Vec<Message> {
    let Message {
        role,
        content,
        extra,
    } = message;

    match content {
        Some(MessageContent::Parts(parts))
            if role == Some(Role::User) && parts.iter().any(ContentPart::is_tool_result) =>
        {
            split_tool_results(parts, family)
        }
        Some(MessageContent::Parts(parts)) => {
            let mapped: Vec<ContentPart> =
                parts.into_iter().map(|part| map_part(part, family)).collect();
            let content = if mapped.is_empty() {
                MessageContent::Text(EMPTY_CONTENT.to_string())
            } else {
                MessageContent::Parts(mapped)
            };
            vec![Message {
                role,
                content: Some(content),
                extra,
            }]
        }
        content => vec![Message {
            role,
            content,
            extra,
        }],
    }
}

fn split_tool_results(parts: Vec<ContentPart>, family: ModelFamily) -> Vec<Message> {
    let mut out = Vec::new();
    let mut remaining = Vec::new();

    for part in parts {
        match part {
            ContentPart::ToolResult {
                tool_use_id,
                content,
                ..
            } => out.push(Message::tool_output(tool_use_id, stringify_tool_content(content))),
            other => remaining.push(map_part(other, family)),
        }
    }

    if !remaining.is_empty() {
        out.push(Message::user_parts(remaining));
    }

    out
}

/// Strings are used as-is; anything else is sent as compact JSON.
fn stringify_tool_content(content: Option<Value>) -> String {
    match content {
        Some(Value::String(text)) => text,
        Some(other) => other.to_string(),
        None => String::new(),
    }
}
