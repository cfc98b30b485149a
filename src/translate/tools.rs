//! Tool definitions and tool-choice selectors in upstream shape.

use serde_json::Value;

use super::schema::sanitize_schema;
use super::types::{FunctionSpec, FunctionTool, SimpleChoice, Tool, ToolChoice};

/// Bring every tool into `{type: "function", function: {...}}` shape with a
/// sanitized `parameters` schema. Order is kept and nothing is dropped.
pub fn transform_tools(tools: Option<Vec<Tool>>) -> Option<Vec<Tool>> {
    tools.map(|tools| {
        tools
            .into_iter()
            .map(|tool| Tool::Function(to_function_tool(tool)))
            .collect()
    })
}

pub fn to_function_tool(tool: Tool) -> FunctionTool {
    match tool {
        Tool::Function(mut tool) => {
            tool.function.parameters = tool.function.parameters.map(sanitize_schema);
            tool
        }
        Tool::Source(source) => {
            let schema = source
                .input_schema
                .or(source.parameters)
                .unwrap_or_else(|| Value::Object(Default::default()));

            FunctionTool::new(FunctionSpec {
                name: source.name,
                description: source.description,
                parameters: Some(sanitize_schema(schema)),
                extra: Default::default(),
            })
        }
    }
}

/// Collapse `{type: "auto"|"none"|"required"}` into the bare string. Every
/// other choice, including an explicit function selector, is left alone.
pub fn normalize_tool_choice(choice: Option<ToolChoice>) -> Option<ToolChoice> {
    choice.map(|choice| match choice {
        ToolChoice::Selector(selector) => {
            match selector.choice_type.as_deref().and_then(SimpleChoice::from_type) {
                Some(simple) => {
                    tracing::info!(tool_choice = simple.as_str(), "Collapsing structured tool_choice");
                    ToolChoice::Mode(simple.as_str().to_string())
                }
                None => ToolChoice::Selector(selector),
            }
        }
        other => other,
    })
}
