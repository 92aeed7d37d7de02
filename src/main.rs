use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use leadflow::config::{CliOverrides, LeadflowConfig};

mod cmd;

#[derive(Parser)]
#[command(name = "leadflow")]
#[command(version, about = "Sales pipeline board: stages, leads, and their history")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true)]
    pub project_dir: Option<PathBuf>,

    /// Owner whose board to use. Overrides LEADFLOW_OWNER and leadflow.toml.
    #[arg(long, global = true)]
    pub owner: Option<String>,

    /// SQLite database path. Overrides LEADFLOW_DB and leadflow.toml.
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create .leadflow/, the database, and the owner's default stages
    Init,
    /// Show the board, one section per stage
    Board {
        /// Print the grouped board as JSON
        #[arg(long)]
        json: bool,
    },
    /// Manage pipeline stages
    Stages {
        #[command(subcommand)]
        command: Option<StagesCommands>,
    },
    /// Manage leads
    Leads {
        #[command(subcommand)]
        command: LeadsCommands,
    },
    /// View or validate configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand, Clone)]
pub enum StagesCommands {
    /// List stages in board order
    List,
    /// Add a stage; its key is derived from the name
    Add {
        name: String,
        #[arg(long, default_value = "📌")]
        icon: String,
        /// One of: blue, cyan, purple, orange, yellow, green, red, pink
        #[arg(long, default_value = "blue")]
        color: String,
        /// Board position (defaults to after the last stage)
        #[arg(long)]
        position: Option<i32>,
    },
    /// Rename a stage; leads follow the new key
    Rename {
        /// Stage key or name
        stage: String,
        name: String,
    },
    /// Change a stage's color and optionally its icon
    Recolor {
        stage: String,
        color: String,
        #[arg(long)]
        icon: Option<String>,
    },
    /// Remove a stage
    Remove {
        stage: String,
        /// Stage that receives this stage's leads
        #[arg(long)]
        reassign_to: Option<String>,
    },
    /// Set the board order; list every stage key
    Reorder {
        #[arg(required = true)]
        stages: Vec<String>,
    },
}

#[derive(Subcommand, Clone)]
pub enum LeadsCommands {
    /// Add a lead to the intake stage (or --stage)
    Add {
        name: String,
        #[arg(long)]
        company: Option<String>,
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        phone: Option<String>,
        #[arg(long, default_value = "0")]
        value: f64,
        #[arg(long)]
        next_action: Option<String>,
        #[arg(long)]
        stage: Option<String>,
    },
    /// Edit lead fields
    Edit {
        /// Lead id or id prefix
        lead: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        company: Option<String>,
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        phone: Option<String>,
        #[arg(long)]
        value: Option<f64>,
        #[arg(long)]
        next_action: Option<String>,
    },
    /// Move a lead to another stage
    Move { lead: String, stage: String },
    /// Delete a lead
    Remove { lead: String },
    /// Record an interaction (note, call, email, meeting, message)
    Note {
        lead: String,
        description: String,
        #[arg(long, default_value = "note")]
        kind: String,
        #[arg(long, default_value = "")]
        next_step: String,
    },
    /// Search leads by name, company, email, or phone
    Search { term: String },
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Validate configuration and show any warnings
    Validate,
    /// Initialize a default leadflow.toml file
    Init,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let project_dir = match cli.project_dir.clone() {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to get current directory")?,
    };

    let config = LeadflowConfig::new(
        project_dir,
        CliOverrides {
            owner: cli.owner.clone(),
            db_path: cli.db.clone(),
            verbose: cli.verbose,
        },
    )?;
    let _log_guard =
        leadflow::logging::init_logging(config.log_level(), config.log_file().as_deref())?;

    match &cli.command {
        Commands::Init => cmd::cmd_init(&config).await?,
        Commands::Board { json } => cmd::cmd_board(&config, *json).await?,
        Commands::Stages { command } => cmd::cmd_stages(&config, command.clone()).await?,
        Commands::Leads { command } => cmd::cmd_leads(&config, command.clone()).await?,
        Commands::Config { command } => cmd::cmd_config(&config, command.clone())?,
    }

    Ok(())
}
