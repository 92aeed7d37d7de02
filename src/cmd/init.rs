//! Project initialization: `leadflow init`.

use anyhow::{Context, Result};
use console::style;

use leadflow::board::IdentityProvider;
use leadflow::config::{LeadflowConfig, LeadflowToml};

pub async fn cmd_init(config: &LeadflowConfig) -> Result<()> {
    let leadflow_dir = config.leadflow_dir();
    std::fs::create_dir_all(&leadflow_dir)
        .with_context(|| format!("Failed to create {}", leadflow_dir.display()))?;

    let config_path = config.config_path();
    if config_path.exists() {
        println!("Config already present at {}", config_path.display());
    } else {
        let mut toml = LeadflowToml::default();
        toml.session.owner = config.identity().current_owner();
        toml.save(&config_path)?;
        println!("Created {}", config_path.display());
    }

    let engine = super::open_engine(config)?;
    println!("Database ready at {}", config.db_path().display());

    let Some(owner) = config.identity().current_owner() else {
        println!();
        println!(
            "{} no owner set; pass --owner or set [session] owner to seed stages.",
            style("Note:").yellow()
        );
        return Ok(());
    };

    let stages = engine.ensure_default_stages(&owner).await?;
    println!();
    println!("Stages for {}:", style(&owner).bold());
    for stage in &stages {
        println!(
            "  {} {} {}",
            stage.icon,
            style(&stage.name).fg(super::term_color(stage.color)),
            style(format!("[{}]", stage.key)).dim()
        );
    }
    println!();
    println!("Next steps:");
    println!("  1. Run `leadflow leads add \"<name>\"` to add a lead");
    println!("  2. Run `leadflow board` to see the pipeline");

    Ok(())
}
