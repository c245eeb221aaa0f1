//! `hearth tools`: list tools and change their enablement.

use hearth::Runtime;
use hearth_config::AppConfig;

pub async fn list(config: &AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let runtime = Runtime::build(config).await?;

    println!("{:<16} {:<9} DESCRIPTION", "NAME", "STATE");
    for tool in runtime.registry.list_all() {
        let state = match (tool.enabled, tool.protected) {
            (_, true) => "protected",
            (true, false) => "enabled",
            (false, false) => "disabled",
        };
        println!(
            "{:<16} {:<9} {}",
            tool.definition.name, state, tool.definition.description
        );
    }
    Ok(())
}

pub async fn set_enabled(
    config: &AppConfig,
    name: &str,
    enabled: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let runtime = Runtime::build(config).await?;
    if enabled {
        runtime.registry.enable(name).await?;
        println!("Enabled {name}");
    } else {
        runtime.registry.disable(name).await?;
        println!("Disabled {name}");
    }
    Ok(())
}
