//! Typed view of an inbound chat-completion body.
//!
//! Every known field is parsed into a tagged type, and every field this crate
//! does not interpret is carried verbatim in an `extra`/`rest` map so the
//! upstream sees exactly what the client sent.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::error::{ProxyError, Result};

/// Untyped remainder of a JSON object.
pub type Fields = Map<String, Value>;

// ---------------------------------------------------------------------------
// Request
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ChatRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub messages: Option<Vec<MessageEntry>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<Tool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<ToolChoice>,
    #[serde(flatten)]
    pub extra: Fields,
}

impl ChatRequest {
    /// Parse a raw body. Only invalid JSON or a non-object body is an error.
    pub fn from_slice(body: &[u8]) -> Result<Self> {
        let value: Value = serde_json::from_slice(body)?;
        Self::from_value(value)
    }

    pub fn from_value(value: Value) -> Result<Self> {
        let Value::Object(mut extra) = value else {
            return Err(ProxyError::translation(
                "request body must be a JSON object",
            ));
        };

        let model = take_typed(&mut extra, "model");
        let messages = take_typed(&mut extra, "messages");
        let tools = take_typed(&mut extra, "tools");
        let tool_choice = take_typed(&mut extra, "tool_choice");

        Ok(Self {
            model,
            messages,
            tools,
            tool_choice,
            extra,
        })
    }

    pub fn to_vec(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}

/// Pull `key` out of `fields` as a `T`. A value of the wrong shape stays in
/// `fields` untouched and the feature it drives is skipped.
fn take_typed<T: DeserializeOwned>(fields: &mut Fields, key: &str) -> Option<T> {
    let raw = fields.remove(key)?;
    match T::deserialize(&raw) {
        Ok(typed) => Some(typed),
        Err(e) => {
            tracing::warn!(field = key, error = %e, "Unexpected field shape, passing through untouched");
            fields.insert(key.to_string(), raw);
            None
        }
    }
}

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Role {
    User,
    Assistant,
    System,
    Tool,
    Other(String),
}

impl From<String> for Role {
    fn from(role: String) -> Self {
        match role.as_str() {
            "user" => Role::User,
            "assistant" => Role::Assistant,
            "system" => Role::System,
            "tool" => Role::Tool,
            _ => Role::Other(role),
        }
    }
}

impl From<Role> for String {
    fn from(role: Role) -> Self {
        match role {
            Role::User => "user".to_string(),
            Role::Assistant => "assistant".to_string(),
            Role::System => "system".to_string(),
            Role::Tool => "tool".to_string(),
            Role::Other(other) => other,
        }
    }
}

/// One element of `messages`. Elements that are not message objects (or
/// carry a non-string `role`) are kept verbatim so the rest still gets rewritten.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageEntry {
    Message(Message),
    Raw(Value),
}

impl MessageEntry {
    pub fn parts(&self) -> &[ContentPart] {
        match self {
            MessageEntry::Message(message) => message.parts(),
            MessageEntry::Raw(_) => &[],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    #[serde(
        default,
        deserialize_with = "present_content",
        skip_serializing_if = "Option::is_none"
    )]
    pub content: Option<MessageContent>,
    #[serde(flatten)]
    pub extra: Fields,
}

/// `None` only when the key is missing; an explicit `null` is kept as `Raw`.
fn present_content<'de, D>(deserializer: D) -> std::result::Result<Option<MessageContent>, D::Error>
where
    D: Deserializer<'de>,
{
    MessageContent::deserialize(deserializer).map(Some)
}

impl Message {
    pub fn user_parts(parts: Vec<ContentPart>) -> Self {
        Self {
            role: Some(Role::User),
            content: Some(MessageContent::Parts(parts)),
            extra: Fields::new(),
        }
    }

    /// Upstream-style tool output message. The call id is forwarded as given,
    /// whatever its JSON type.
    pub fn tool_output(tool_call_id: Option<Value>, content: String) -> Self {
        let mut extra = Fields::new();
        if let Some(id) = tool_call_id {
            extra.insert("tool_call_id".to_string(), id);
        }
        Self {
            role: Some(Role::Tool),
            content: Some(MessageContent::Text(content)),
            extra,
        }
    }

    pub fn parts(&self) -> &[ContentPart] {
        match &self.content {
            Some(MessageContent::Parts(parts)) => parts,
            _ => &[],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
    Raw(Value),
}

// ---------------------------------------------------------------------------
// Content parts
// ---------------------------------------------------------------------------

/// One element of a structured `content` array. `rest` holds every field the
/// variant does not name, minus `type` (except for `Other`, which keeps it).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "Value", into = "Value")]
pub enum ContentPart {
    Text {
        text: String,
        rest: Fields,
    },
    /// `type == "image"`, or any part whose `source.type` is `base64`.
    /// When `tagged` is false the part's own `type` is still in `rest`.
    Image {
        tagged: bool,
        source: Option<ImageSource>,
        rest: Fields,
    },
    ImageUrl {
        rest: Fields,
    },
    ToolResult {
        tool_use_id: Option<Value>,
        content: Option<Value>,
        rest: Fields,
    },
    ToolUse {
        rest: Fields,
    },
    Other {
        rest: Fields,
    },
    /// A non-object element, forwarded as-is.
    Raw(Value),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageSource {
    #[serde(rename = "type")]
    pub source_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    #[serde(flatten)]
    pub extra: Fields,
}

impl ImageSource {
    pub fn is_base64(&self) -> bool {
        self.source_type == "base64"
    }

    /// `data:<media_type>;base64,<data>` when the source is usable inline data.
    pub fn data_uri(&self) -> Option<String> {
        if !self.is_base64() {
            return None;
        }
        let media_type = self.media_type.as_deref()?;
        let data = self.data.as_deref()?;
        Some(format!("data:{media_type};base64,{data}"))
    }
}

impl From<ImageSource> for Value {
    fn from(source: ImageSource) -> Self {
        let mut map = source.extra;
        map.insert("type".to_string(), Value::String(source.source_type));
        if let Some(media_type) = source.media_type {
            map.insert("media_type".to_string(), Value::String(media_type));
        }
        if let Some(data) = source.data {
            map.insert("data".to_string(), Value::String(data));
        }
        Value::Object(map)
    }
}

impl ContentPart {
    pub fn text(text: impl Into<String>) -> Self {
        ContentPart::Text {
            text: text.into(),
            rest: Fields::new(),
        }
    }

    pub fn image_url(url: impl Into<String>) -> Self {
        let mut rest = Fields::new();
        rest.insert(
            "image_url".to_string(),
            serde_json::json!({ "url": url.into() }),
        );
        ContentPart::ImageUrl { rest }
    }

    pub fn is_tool_result(&self) -> bool {
        matches!(self, ContentPart::ToolResult { .. })
    }

    pub fn is_image_url(&self) -> bool {
        matches!(self, ContentPart::ImageUrl { .. })
    }

    pub fn rest_mut(&mut self) -> Option<&mut Fields> {
        match self {
            ContentPart::Text { rest, .. }
            | ContentPart::Image { rest, .. }
            | ContentPart::ImageUrl { rest }
            | ContentPart::ToolResult { rest, .. }
            | ContentPart::ToolUse { rest }
            | ContentPart::Other { rest } => Some(rest),
            ContentPart::Raw(_) => None,
        }
    }

    pub fn without_cache_control(mut self) -> Self {
        if let Some(rest) = self.rest_mut() {
            rest.remove("cache_control");
        }
        self
    }
}

impl From<Value> for ContentPart {
    fn from(value: Value) -> Self {
        match value {
            Value::Object(fields) => ContentPart::from_fields(fields),
            other => ContentPart::Raw(other),
        }
    }
}

impl ContentPart {
    fn from_fields(mut rest: Fields) -> Self {
        let part_type = rest.get("type").and_then(Value::as_str).map(str::to_owned);
        let has_base64_source = rest
            .get("source")
            .and_then(|s| s.get("type"))
            .and_then(Value::as_str)
            == Some("base64");

        match part_type.as_deref() {
            Some("text") if rest.get("text").is_some_and(Value::is_string) => {
                rest.remove("type");
                let text = match rest.remove("text") {
                    Some(Value::String(text)) => text,
                    _ => String::new(),
                };
                ContentPart::Text { text, rest }
            }
            Some("image") => {
                rest.remove("type");
                let source = take_source(&mut rest);
                ContentPart::Image {
                    tagged: true,
                    source,
                    rest,
                }
            }
            _ if has_base64_source => {
                let source = take_source(&mut rest);
                ContentPart::Image {
                    tagged: false,
                    source,
                    rest,
                }
            }
            Some("image_url") => {
                rest.remove("type");
                ContentPart::ImageUrl { rest }
            }
            Some("tool_result") => {
                rest.remove("type");
                let tool_use_id = rest.remove("tool_use_id");
                let content = rest.remove("content");
                ContentPart::ToolResult {
                    tool_use_id,
                    content,
                    rest,
                }
            }
            Some("tool_use") => {
                rest.remove("type");
                ContentPart::ToolUse { rest }
            }
            _ => ContentPart::Other { rest },
        }
    }
}

fn take_source(rest: &mut Fields) -> Option<ImageSource> {
    let raw = rest.remove("source")?;
    match ImageSource::deserialize(&raw) {
        Ok(source) => Some(source),
        Err(_) => {
            rest.insert("source".to_string(), raw);
            None
        }
    }
}

impl From<ContentPart> for Value {
    fn from(part: ContentPart) -> Self {
        let rest = match part {
            ContentPart::Raw(value) => return value,
            ContentPart::Text { text, mut rest } => {
                rest.insert("type".to_string(), Value::from("text"));
                rest.insert("text".to_string(), Value::String(text));
                rest
            }
            ContentPart::Image {
                tagged,
                source,
                mut rest,
            } => {
                if tagged {
                    rest.insert("type".to_string(), Value::from("image"));
                }
                if let Some(source) = source {
                    rest.insert("source".to_string(), Value::from(source));
                }
                rest
            }
            ContentPart::ImageUrl { mut rest } => {
                rest.insert("type".to_string(), Value::from("image_url"));
                rest
            }
            ContentPart::ToolResult {
                tool_use_id,
                content,
                mut rest,
            } => {
                rest.insert("type".to_string(), Value::from("tool_result"));
                if let Some(id) = tool_use_id {
                    rest.insert("tool_use_id".to_string(), id);
                }
                if let Some(content) = content {
                    rest.insert("content".to_string(), content);
                }
                rest
            }
            ContentPart::ToolUse { mut rest } => {
                rest.insert("type".to_string(), Value::from("tool_use"));
                rest
            }
            ContentPart::Other { rest } => rest,
        };
        Value::Object(rest)
    }
}

// ---------------------------------------------------------------------------
// Tools
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum Tool {
    /// Already upstream shaped: `{type: "function", function: {...}}`.
    Function(FunctionTool),
    /// Client shaped: `{name, description, input_schema | parameters}`.
    Source(SourceTool),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionTool {
    #[serde(rename = "type")]
    pub tool_type: String,
    pub function: FunctionSpec,
    #[serde(flatten)]
    pub extra: Fields,
}

impl FunctionTool {
    pub fn new(function: FunctionSpec) -> Self {
        Self {
            tool_type: "function".to_string(),
            function,
            extra: Fields::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FunctionSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Value>,
    #[serde(flatten)]
    pub extra: Fields,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceTool {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_schema: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Value>,
    #[serde(flatten)]
    pub extra: Fields,
}

impl TryFrom<Fields> for Tool {
    type Error = serde_json::Error;

    fn try_from(fields: Fields) -> std::result::Result<Self, Self::Error> {
        let upstream_shaped = fields.get("type").and_then(Value::as_str) == Some("function")
            && fields.get("function").is_some_and(Value::is_object);

        let value = Value::Object(fields);
        if upstream_shaped {
            FunctionTool::deserialize(&value).map(Tool::Function)
        } else {
            SourceTool::deserialize(&value).map(Tool::Source)
        }
    }
}

impl<'de> Deserialize<'de> for Tool {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let fields = Fields::deserialize(deserializer)?;
        Tool::try_from(fields).map_err(serde::de::Error::custom)
    }
}

impl Serialize for Tool {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Tool::Function(tool) => tool.serialize(serializer),
            Tool::Source(tool) => tool.serialize(serializer),
        }
    }
}

// ---------------------------------------------------------------------------
// Tool choice
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ToolChoice {
    /// `"auto"`, `"none"`, `"required"` or any other string.
    Mode(String),
    /// `{type: ...}`, including `{type: "function", function: {name}}`.
    Selector(ToolSelector),
    Raw(Value),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSelector {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub choice_type: Option<String>,
    #[serde(flatten)]
    pub extra: Fields,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimpleChoice {
    Auto,
    None,
    Required,
}

impl SimpleChoice {
    pub fn from_type(choice_type: &str) -> Option<Self> {
        match choice_type {
            "auto" => Some(SimpleChoice::Auto),
            "none" => Some(SimpleChoice::None),
            "required" => Some(SimpleChoice::Required),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SimpleChoice::Auto => "auto",
            SimpleChoice::None => "none",
            SimpleChoice::Required => "required",
        }
    }
}
