//! `hearth run-tool`: execute one tool directly and print its result.

use std::time::Duration;

use hearth::Runtime;
use hearth_config::AppConfig;
use hearth_core::context::ToolExecutionContext;
use hearth_core::message::{SourceDescriptor, SourceKind};
use hearth_core::tool::ToolCall;

pub async fn run(
    config: &AppConfig,
    name: &str,
    args: &str,
    user: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let args: serde_json::Value =
        serde_json::from_str(args).map_err(|e| format!("--args is not valid JSON: {e}"))?;

    let runtime = Runtime::build(config).await?;
    let source = SourceDescriptor::new(SourceKind::Cli, "run-tool");
    let ctx = ToolExecutionContext::new(user, "cli", source);
    let result = runtime.engine.execute(ToolCall::new(name, args), &ctx).await;
    println!("{}", serde_json::to_string_pretty(&result)?);

    // Jobs queued by the tool run in this process only.
    runtime.drain(Duration::from_secs(30)).await;
    if !result.ok {
        return Err(result.error.unwrap_or_else(|| "tool failed".into()).into());
    }
    Ok(())
}
