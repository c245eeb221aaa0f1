//! Plan parsing.
//!
//! The model is asked for exactly one JSON object. Anything that does not
//! match one of the two plan shapes is rejected; the planner never guesses.

use serde_json::{Map, Value};
use thiserror::Error;

/// The model's decision for one turn.
#[derive(Debug, Clone, PartialEq)]
pub enum Plan {
    /// Reply to the user with this text.
    Final { content: String },
    /// Run a tool, then narrate its result.
    ToolCall { tool: String, args: Value },
}

#[derive(Debug, Error, PartialEq)]
pub enum PlanError {
    #[error("plan is not valid JSON: {0}")]
    InvalidJson(String),

    #[error("plan has no \"type\" field")]
    MissingType,

    #[error("unknown plan type: {0}")]
    UnknownType(String),

    #[error("malformed {kind} plan: {reason}")]
    InvalidShape { kind: &'static str, reason: String },
}

/// Parse raw model output into a [`Plan`].
pub fn parse_plan(raw: &str) -> Result<Plan, PlanError> {
    let value: Value =
        serde_json::from_str(raw.trim()).map_err(|e| PlanError::InvalidJson(e.to_string()))?;
    let Value::Object(map) = value else {
        return Err(PlanError::MissingType);
    };
    let kind = match map.get("type") {
        Some(Value::String(s)) => s.as_str(),
        Some(other) => return Err(PlanError::UnknownType(other.to_string())),
        None => return Err(PlanError::MissingType),
    };

    match kind {
        "final" => {
            let content = string_field(&map, "content", "final")?;
            Ok(Plan::Final { content })
        }
        "tool_call" => {
            let tool = string_field(&map, "tool", "tool_call")?;
            let args = match map.get("args") {
                None | Some(Value::Null) => Value::Object(Map::new()),
                Some(v @ Value::Object(_)) => v.clone(),
                Some(_) => {
                    return Err(PlanError::InvalidShape {
                        kind: "tool_call",
                        reason: "\"args\" must be an object".into(),
                    });
                }
            };
            Ok(Plan::ToolCall { tool, args })
        }
        other => Err(PlanError::UnknownType(other.to_string())),
    }
}

fn string_field(map: &Map<String, Value>, field: &str, kind: &'static str) -> Result<String, PlanError> {
    match map.get(field) {
        Some(Value::String(s)) => Ok(s.clone()),
        _ => Err(PlanError::InvalidShape {
            kind,
            reason: format!("\"{field}\" must be a string"),
        }),
    }
}
