//! Configuration view and validation commands: `leadflow config`.

use anyhow::Result;

use leadflow::config::{LeadflowConfig, LeadflowToml};

use super::super::ConfigCommands;

pub fn cmd_config(config: &LeadflowConfig, command: Option<ConfigCommands>) -> Result<()> {
    let leadflow_dir = config.leadflow_dir();
    let config_path = config.config_path();

    match command {
        None | Some(ConfigCommands::Show) => {
            println!();
            println!("Leadflow Configuration");
            println!("======================");
            println!();

            if config_path.exists() {
                println!("Config file: {}", config_path.display());
            } else {
                println!("No leadflow.toml found at {}", config_path.display());
                println!("Using default configuration.");
            }
            println!();

            let toml = &config.toml;
            println!("[storage]");
            if let Some(path) = &toml.storage.db_path {
                println!("  db_path = \"{}\"", path);
            }
            println!("[session]");
            if let Some(owner) = &toml.session.owner {
                println!("  owner = \"{}\"", owner);
            }
            println!("[board]");
            if let Some(key) = &toml.board.intake_stage {
                println!("  intake_stage = \"{}\"", key);
            }
            println!("  seed_defaults = {}", toml.board.seed_defaults);
            println!("[logging]");
            println!("  level = \"{}\"", toml.logging.level);
            println!("  file = {}", toml.logging.file);
            println!();

            println!("Effective values (with env/CLI overrides):");
            println!("  db_path = \"{}\"", config.db_path().display());
            println!("  owner = \"{}\"", config.owner().unwrap_or(""));
            println!("  log_level = \"{}\"", config.log_level());
            if let Some(file) = config.log_file() {
                println!("  log_file = \"{}\"", file.display());
            }
            println!();

            if !config_path.exists() {
                println!("Run 'leadflow config init' to create a leadflow.toml file.");
                println!();
            }
        }
        Some(ConfigCommands::Validate) => {
            println!();
            println!("Validating configuration...");
            println!();

            if !config_path.exists() {
                println!("No leadflow.toml found. Using defaults (valid).");
                return Ok(());
            }

            let toml = LeadflowToml::load(&config_path)?;
            let warnings = toml.validate();

            if warnings.is_empty() {
                println!("Configuration is valid.");
            } else {
                println!("Configuration warnings:");
                for warning in warnings {
                    println!("  - {}", warning);
                }
            }
            println!();
        }
        Some(ConfigCommands::Init) => {
            if config_path.exists() {
                println!("leadflow.toml already exists at {}", config_path.display());
                println!("Delete it first if you want to recreate it.");
                return Ok(());
            }

            if !leadflow_dir.exists() {
                std::fs::create_dir_all(&leadflow_dir)?;
            }

            LeadflowToml::default().save(&config_path)?;

            println!("Created leadflow.toml at {}", config_path.display());
            println!();
            println!("You can now customize:");
            println!("  - [storage] db_path");
            println!("  - [session] owner");
            println!("  - [board] intake_stage, seed_defaults");
            println!("  - [logging] level, file");
            println!();
        }
    }

    Ok(())
}
