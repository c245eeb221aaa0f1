//! Clock tool: tells the assistant what time it is.

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, Utc};
use hearth_core::context::ToolExecutionContext;
use hearth_core::error::ToolError;
use hearth_core::tool::Tool;
use serde_json::{Value, json};

const MAX_OFFSET_MINUTES: i64 = 14 * 60;

pub struct ClockTool;

impl ClockTool {
    fn offset_label(minutes: i32) -> String {
        if minutes == 0 {
            return "UTC".into();
        }
        let sign = if minutes < 0 { '-' } else { '+' };
        let abs = minutes.abs();
        format!("UTC{sign}{:02}:{:02}", abs / 60, abs % 60)
    }

    /// Render `now` at the given UTC offset.
    pub fn render(now: DateTime<Utc>, offset_minutes: i32) -> Result<Value, ToolError> {
        let offset = FixedOffset::east_opt(offset_minutes * 60).ok_or_else(|| {
            ToolError::InvalidArguments(format!("utc_offset_minutes out of range: {offset_minutes}"))
        })?;
        let local = now.with_timezone(&offset);
        Ok(json!({
            "ok": true,
            "data": {
                "time": local.format("%H:%M").to_string(),
                "iso": local.to_rfc3339(),
                "timezone": Self::offset_label(offset_minutes),
            }
        }))
    }
}

#[async_trait]
impl Tool for ClockTool {
    fn name(&self) -> &str {
        "clock"
    }

    fn description(&self) -> &str {
        "Get the current time."
    }

    fn long_description(&self) -> &str {
        "Returns the current wall-clock time as HH:MM plus a full ISO-8601 timestamp. \
         Pass utc_offset_minutes to get the time in another timezone; defaults to UTC."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "utc_offset_minutes": {
                    "type": "integer",
                    "description": "Offset from UTC in minutes, e.g. 120 for UTC+02:00",
                    "minimum": -MAX_OFFSET_MINUTES,
                    "maximum": MAX_OFFSET_MINUTES
                }
            }
        })
    }

    fn examples(&self) -> Vec<Value> {
        vec![json!({}), json!({"utc_offset_minutes": 60})]
    }

    async fn execute(&self, args: Value, _ctx: &ToolExecutionContext) -> Result<Value, ToolError> {
        let offset = match args.get("utc_offset_minutes") {
            None | Some(Value::Null) => 0,
            Some(v) => v
                .as_i64()
                .filter(|m| m.abs() <= MAX_OFFSET_MINUTES)
                .ok_or_else(|| {
                    ToolError::InvalidArguments(
                        "utc_offset_minutes must be an integer between -840 and 840".into(),
                    )
                })?,
        };
        Self::render(Utc::now(), offset as i32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use hearth_core::message::SourceDescriptor;

    #[test]
    fn render_utc() {
        let now = Utc.with_ymd_and_hms(2026, 3, 14, 9, 5, 0).unwrap();
        let out = ClockTool::render(now, 0).unwrap();
        assert_eq!(out["ok"], true);
        assert_eq!(out["data"]["time"], "09:05");
        assert_eq!(out["data"]["timezone"], "UTC");
    }

    #[test]
    fn render_with_negative_offset() {
        let now = Utc.with_ymd_and_hms(2026, 3, 14, 1, 30, 0).unwrap();
        let out = ClockTool::render(now, -150).unwrap();
        assert_eq!(out["data"]["time"], "23:00");
        assert_eq!(out["data"]["timezone"], "UTC-02:30");
        assert!(out["data"]["iso"].as_str().unwrap().starts_with("2026-03-13T23:00"));
    }

    #[tokio::test]
    async fn rejects_bad_offset() {
        let ctx = ToolExecutionContext::new("u1", "c1", SourceDescriptor::cli());
        let err = ClockTool
            .execute(json!({"utc_offset_minutes": "soon"}), &ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));

        let err = ClockTool
            .execute(json!({"utc_offset_minutes": 5000}), &ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }

    #[tokio::test]
    async fn default_is_utc_envelope() {
        let ctx = ToolExecutionContext::new("u1", "c1", SourceDescriptor::cli());
        let out = ClockTool.execute(json!({}), &ctx).await.unwrap();
        assert_eq!(out["ok"], true);
        assert_eq!(out["data"]["time"].as_str().unwrap().len(), 5);
    }
}
