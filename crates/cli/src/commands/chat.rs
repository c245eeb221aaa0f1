//! `hearth chat`: single-message or interactive chat.

use std::io::Write;
use std::time::Duration;

use hearth::Runtime;
use hearth_config::AppConfig;
use hearth_core::message::{SourceDescriptor, SourceMessage};
use tokio::io::{AsyncBufReadExt, BufReader};

const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

pub async fn run(
    config: &AppConfig,
    message: Option<String>,
    conversation: String,
    user: String,
) -> Result<(), Box<dyn std::error::Error>> {
    let runtime = Runtime::build(config).await?;

    if let Some(content) = message {
        let msg = SourceMessage::new(SourceDescriptor::cli(), &user, &conversation, content);
        let reply = runtime.planner.handle_source_message(msg).await;
        println!("{}", reply.content);
        runtime.drain(DRAIN_TIMEOUT).await;
        return Ok(());
    }

    println!();
    println!("  {} (model: {})", config.identity.name, config.default_model);
    println!("  Conversation: {conversation}");
    println!("  Type 'exit' to quit.");
    println!();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("  You > ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let content = line.trim();
        if content.is_empty() {
            continue;
        }
        if content.eq_ignore_ascii_case("exit") || content.eq_ignore_ascii_case("quit") {
            break;
        }

        let msg = SourceMessage::new(SourceDescriptor::cli(), &user, &conversation, content);
        let reply = runtime.planner.handle_source_message(msg).await;
        println!();
        for line in reply.content.lines() {
            println!("  {} > {line}", config.identity.name);
        }
        println!();
    }

    let pending = runtime.drain(DRAIN_TIMEOUT).await;
    if pending > 0 {
        eprintln!("  {pending} background job(s) did not finish");
    }
    println!("  Goodbye!");
    Ok(())
}
