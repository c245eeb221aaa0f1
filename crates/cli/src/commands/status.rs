//! `hearth status`: show the effective configuration and probe the model server.

use hearth_config::AppConfig;
use hearth_providers::router::build_from_config;

pub async fn run(config: &AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    println!("Hearth Status");
    println!("=============");
    println!("  Config dir:   {}", AppConfig::config_dir().display());
    println!("  Assistant:    {}", config.identity.name);
    println!("  Provider:     {}", config.default_provider);
    println!("  Model:        {}", config.default_model);
    println!("  Temperature:  {}", config.default_temperature);
    println!("  Max tokens:   {}", config.default_max_tokens);
    println!(
        "  API key:      {}",
        if config.api_key.is_some() { "set" } else { "not set" }
    );
    println!("  Storage:      {}", config.storage.backend);
    match config.storage.backend.as_str() {
        "sqlite" => println!("  Database:     {}", config.storage.database_path().display()),
        "file" => println!("  Tool state:   {}", config.storage.tool_state_file().display()),
        _ => {}
    }
    println!(
        "  Planner:      history={} memories={} serialized={}",
        config.planner.history_limit,
        config.planner.memory_limit,
        config.planner.serialize_conversations
    );
    println!(
        "  Compaction:   every {} messages, keep {} recent",
        config.workers.compaction_threshold, config.workers.compaction_keep_recent
    );
    match config.workers.max_concurrent_jobs {
        Some(n) => println!("  Job limit:    {n} concurrent"),
        None => println!("  Job limit:    unbounded"),
    }

    if let Some(provider) = build_from_config(config).default() {
        match provider.health_check().await {
            Ok(true) => {
                let models = provider.list_models().await.unwrap_or_default();
                println!("  Reachable:    yes ({} models)", models.len());
                if !models.is_empty() && !models.contains(&config.default_model) {
                    println!("  Warning:      '{}' is not served", config.default_model);
                }
            }
            Ok(false) => println!("  Reachable:    no (server answered with an error)"),
            Err(e) => println!("  Reachable:    no ({e})"),
        }
    }

    let config_path = AppConfig::config_dir().join("config.toml");
    if config_path.exists() {
        println!("\n  Config file found");
    } else {
        println!("\n  No config file at {}; defaults in use", config_path.display());
    }
    Ok(())
}
