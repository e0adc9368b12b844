//! Tool declarations for the provider schemas.

use crate::gemini::types::{GeminiFunctionDeclaration, GeminiTool};
use gemlink_abstraction::ToolDefinition;
use serde_json::Value;

/// Removes every `additionalProperties` key from a JSON schema, at any depth.
///
/// Gemini rejects function parameter schemas that contain it.
pub fn remove_additional_properties(schema: &mut Value) {
    match schema {
        Value::Object(map) => {
            map.remove("additionalProperties");
            for value in map.values_mut() {
                remove_additional_properties(value);
            }
        }
        Value::Array(items) => {
            for item in items {
                remove_additional_properties(item);
            }
        }
        _ => {}
    }
}

/// Converts a tool definition to a Gemini function declaration.
pub fn to_function_declaration(tool: &ToolDefinition) -> GeminiFunctionDeclaration {
    let mut parameters = tool.parameters.clone();
    remove_additional_properties(&mut parameters);
    GeminiFunctionDeclaration {
        name: tool.name.clone(),
        description: tool.description.clone(),
        parameters: (!parameters.is_null()).then_some(parameters),
    }
}

/// Groups tool definitions into the request's `tools` array.
///
/// All declarations share one tool entry; no tools yields an empty array.
pub fn to_gemini_tools(tools: &[ToolDefinition]) -> Vec<GeminiTool> {
    if tools.is_empty() {
        return Vec::new();
    }
    vec![GeminiTool { function_declarations: tools.iter().map(to_function_declaration).collect() }]
}
