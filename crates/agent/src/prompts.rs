//! Prompt text used by the planner.

use hearth_core::memory::MemoryEntry;
use hearth_core::provider::ToolDefinition;
use hearth_core::tool::ToolResult;

/// The response contract appended to every planning prompt.
pub const PLAN_CONTRACT: &str = r#"## Response format

Respond with exactly one JSON object and nothing else: no prose, no code fences.

To answer the user directly:
{"type": "final", "content": "<your reply>"}

To use one of the tools listed above:
{"type": "tool_call", "tool": "<tool name>", "args": { ... }}

Only call tools from the list. Use "final" when no tool is needed."#;

const SUMMARIZER_INSTRUCTIONS: &str = "You just ran a tool on the user's behalf. \
Explain the result to the user in plain, friendly language. Do not output JSON. \
If the tool failed, apologize briefly and say what went wrong.";

/// Render memories as a bulleted section. Empty input renders nothing.
pub fn memory_section(memories: &[MemoryEntry]) -> String {
    if memories.is_empty() {
        return String::new();
    }
    let lines: String = memories
        .iter()
        .map(|m| format!("- {}\n", m.content))
        .collect();
    format!("## What you remember about the user\n{lines}")
}

/// Render the tool catalog: name, description, parameter schema, examples.
pub fn tool_section(tools: &[ToolDefinition]) -> String {
    if tools.is_empty() {
        return "## Tools\nNo tools are available. Always answer with \"final\".".into();
    }
    let mut out = String::from("## Tools\n");
    for tool in tools {
        out.push_str(&format!(
            "\n### {}\n{}\nParameters: {}\n",
            tool.name, tool.description, tool.parameters
        ));
        for example in &tool.examples {
            out.push_str(&format!(
                "Example: {{\"type\": \"tool_call\", \"tool\": \"{}\", \"args\": {}}}\n",
                tool.name, example
            ));
        }
    }
    out
}

/// System prompt for the summarizer call.
pub fn summarizer_system(base: &str) -> String {
    format!("{base}\n\n{SUMMARIZER_INSTRUCTIONS}")
}

/// User prompt for the summarizer call.
pub fn summarizer_prompt(user_content: &str, tool: &str, result: &ToolResult) -> String {
    let result_json = serde_json::to_string(result).unwrap_or_else(|_| "{}".into());
    let outcome = if result.ok { "succeeded" } else { "failed" };
    format!(
        "The user said: {user_content}\n\
         Tool used: {tool}\n\
         The tool {outcome}. Result: {result_json}\n\n\
         Write the reply to the user."
    )
}

/// Base persona prompt, annotated with the error that caused the fallback.
pub fn fallback_system(base: &str, error: Option<&str>) -> String {
    match error {
        Some(e) => format!("{base}\n\nNote: {e}"),
        None => base.to_string(),
    }
}

/// The reply used when even plain chat fails.
pub fn last_resort_reply(error: &str, content: &str) -> String {
    format!(
        "I'm sorry, I couldn't process that right now ({error}). \
         Here is an echo of your message: {content}"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn tool_section_lists_schema_and_examples() {
        let tools = vec![ToolDefinition {
            name: "clock".into(),
            description: "Current time".into(),
            parameters: json!({"type": "object", "properties": {}}),
            examples: vec![json!({})],
        }];
        let text = tool_section(&tools);
        assert!(text.contains("### clock"));
        assert!(text.contains("Current time"));
        assert!(text.contains(r#""type":"object""#));
        assert!(text.contains(r#""tool": "clock""#));
    }

    #[test]
    fn empty_memories_render_nothing() {
        assert!(memory_section(&[]).is_empty());
        let text = memory_section(&[MemoryEntry::new("u1", "User's name is Ada")]);
        assert!(text.contains("- User's name is Ada"));
    }

    #[test]
    fn summarizer_prompt_names_tool_and_result() {
        let result = ToolResult::success(json!({"time": "12:00"}));
        let prompt = summarizer_prompt("What time is it?", "clock", &result);
        assert!(prompt.contains("Tool used: clock"));
        assert!(prompt.contains(r#"{"ok":true,"data":{"time":"12:00"}}"#));

        let failed = summarizer_prompt("hi", "clock", &ToolResult::failure("boom"));
        assert!(failed.contains("failed"));
        assert!(failed.contains("boom"));
    }

    #[test]
    fn fallback_system_appends_note() {
        assert_eq!(fallback_system("Be kind.", None), "Be kind.");
        assert_eq!(
            fallback_system("Be kind.", Some("bad plan")),
            "Be kind.\n\nNote: bad plan"
        );
    }

    #[test]
    fn last_resort_echoes_content() {
        let reply = last_resort_reply("network down", "hello there");
        assert!(reply.contains("echo of your message"));
        assert!(reply.ends_with("hello there"));
        assert!(reply.contains("(network down)"));
    }
}
