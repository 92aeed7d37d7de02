//! Project configuration read from `.leadflow/leadflow.toml`.
//!
//! Values are layered: file → environment (`.env` is loaded first) → CLI.
//!
//! ```toml
//! [storage]
//! db_path = ".leadflow/leadflow.db"
//!
//! [session]
//! owner = "ana@example.com"
//!
//! [board]
//! intake_stage = "lead"
//! seed_defaults = true
//!
//! [logging]
//! level = "warn"
//! file = false
//! ```
//!
//! | Env var          | Overrides              |
//! |------------------|------------------------|
//! | `LEADFLOW_DB`    | `storage.db_path`      |
//! | `LEADFLOW_OWNER` | `session.owner`        |
//! | `LEADFLOW_LOG`   | `logging.level`        |

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::board::engine::EngineOptions;
use crate::board::identity::StaticIdentity;
use crate::board::slug::slugify;

pub const LEADFLOW_DIR: &str = ".leadflow";
pub const CONFIG_FILE: &str = "leadflow.toml";
pub const DEFAULT_DB_FILE: &str = "leadflow.db";
pub const LOG_FILE: &str = "leadflow.log";

pub fn get_leadflow_dir(project_dir: &Path) -> PathBuf {
    project_dir.join(LEADFLOW_DIR)
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// SQLite file, relative to the project directory unless absolute
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub db_path: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Owner whose board the CLI operates on
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoardConfig {
    /// Stage key new leads land in
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intake_stage: Option<String>,
    /// Seed the six default stages for owners with none
    #[serde(default = "default_true")]
    pub seed_defaults: bool,
}

impl Default for BoardConfig {
    fn default() -> Self {
        Self {
            intake_stage: None,
            seed_defaults: default_true(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset
    #[serde(default = "default_level")]
    pub level: String,
    /// Also write to `.leadflow/logs/leadflow.log`
    #[serde(default)]
    pub file: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            file: false,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_level() -> String {
    "warn".to_string()
}

/// The complete leadflow.toml structure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LeadflowToml {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub board: BoardConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl LeadflowToml {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse leadflow.toml")
    }

    /// Load `.leadflow/leadflow.toml`, or defaults if it doesn't exist.
    pub fn load_or_default(leadflow_dir: &Path) -> Result<Self> {
        let config_path = leadflow_dir.join(CONFIG_FILE);
        if config_path.exists() {
            Self::load(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize leadflow.toml")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Return human-readable warnings; an empty list means the file is valid.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if let Some(path) = &self.storage.db_path
            && path.trim().is_empty()
        {
            warnings.push("storage.db_path is empty".to_string());
        }

        if let Some(owner) = &self.session.owner
            && owner.trim().is_empty()
        {
            warnings.push("session.owner is blank; no board will load".to_string());
        }

        if let Some(key) = &self.board.intake_stage
            && slugify(key) != *key
        {
            warnings.push(format!(
                "board.intake_stage '{}' is not a stage key (did you mean '{}'?)",
                key,
                slugify(key)
            ));
        }

        if tracing_subscriber::EnvFilter::try_new(&self.logging.level).is_err() {
            warnings.push(format!(
                "Invalid logging.level '{}': expected a level such as 'info' or a filter like 'leadflow=debug'",
                self.logging.level
            ));
        }

        warnings
    }
}

/// Values given on the command line; they win over file and environment.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub owner: Option<String>,
    pub db_path: Option<PathBuf>,
    pub verbose: bool,
}

/// Effective configuration after layering file, environment and CLI.
#[derive(Debug, Clone)]
pub struct LeadflowConfig {
    pub project_dir: PathBuf,
    pub toml: LeadflowToml,
    db_path: PathBuf,
    owner: Option<String>,
    log_level: String,
}

impl LeadflowConfig {
    /// Load config for `project_dir`, reading `.env` and the process environment.
    pub fn new(project_dir: PathBuf, cli: CliOverrides) -> Result<Self> {
        let env_file = project_dir.join(".env");
        if env_file.exists() {
            dotenvy::from_path(&env_file)
                .with_context(|| format!("Failed to load {}", env_file.display()))?;
        }
        let toml = LeadflowToml::load_or_default(&get_leadflow_dir(&project_dir))?;
        Ok(Self::resolve(project_dir, toml, cli, |key| {
            std::env::var(key).ok()
        }))
    }

    /// Layer `toml`, the variables returned by `env`, and `cli`.
    pub fn resolve(
        project_dir: PathBuf,
        toml: LeadflowToml,
        cli: CliOverrides,
        env: impl Fn(&str) -> Option<String>,
    ) -> Self {
        let env = |key: &str| env(key).filter(|v| !v.trim().is_empty());

        let db_path = cli
            .db_path
            .or_else(|| env("LEADFLOW_DB").map(PathBuf::from))
            .or_else(|| toml.storage.db_path.as_ref().map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(LEADFLOW_DIR).join(DEFAULT_DB_FILE));
        let db_path = if db_path.is_absolute() {
            db_path
        } else {
            project_dir.join(db_path)
        };

        let owner = cli
            .owner
            .or_else(|| env("LEADFLOW_OWNER"))
            .or_else(|| toml.session.owner.clone());

        let log_level = if cli.verbose {
            "leadflow=debug,info".to_string()
        } else {
            env("LEADFLOW_LOG").unwrap_or_else(|| toml.logging.level.clone())
        };

        Self {
            project_dir,
            toml,
            db_path,
            owner,
            log_level,
        }
    }

    pub fn leadflow_dir(&self) -> PathBuf {
        get_leadflow_dir(&self.project_dir)
    }

    pub fn config_path(&self) -> PathBuf {
        self.leadflow_dir().join(CONFIG_FILE)
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    pub fn owner(&self) -> Option<&str> {
        self.owner.as_deref()
    }

    pub fn log_level(&self) -> &str {
        &self.log_level
    }

    /// Log file path when file logging is enabled.
    pub fn log_file(&self) -> Option<PathBuf> {
        self.toml
            .logging
            .file
            .then(|| self.leadflow_dir().join("logs").join(LOG_FILE))
    }

    pub fn identity(&self) -> StaticIdentity {
        StaticIdentity::new(self.owner.clone())
    }

    pub fn engine_options(&self) -> EngineOptions {
        EngineOptions {
            intake_stage: self.toml.board.intake_stage.clone(),
            seed_defaults: self.toml.board.seed_defaults,
        }
    }
}
