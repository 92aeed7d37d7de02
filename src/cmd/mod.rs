//! CLI command implementations.
//!
//! Each submodule owns one or more related `Commands` variants:
//!
//! | Module    | Commands handled                                     |
//! |-----------|------------------------------------------------------|
//! | `init`    | `Init`                                               |
//! | `board`   | `Board`                                              |
//! | `stages`  | `Stages` (list, add, rename, recolor, remove, reorder) |
//! | `leads`   | `Leads` (add, edit, move, remove, note, search)      |
//! | `config`  | `Config`                                             |

pub mod board;
pub mod config;
pub mod init;
pub mod leads;
pub mod stages;

pub use board::cmd_board;
pub use config::cmd_config;
pub use init::cmd_init;
pub use leads::cmd_leads;
pub use stages::cmd_stages;

use std::sync::Arc;

use anyhow::{Context, Result, bail};
use console::{Color, style};
use leadflow::board::models::{Lead, Stage, StageColor};
use leadflow::board::slug::slugify;
use leadflow::board::{DbHandle, IdentityProvider, LeadStore, SyncEngine, SystemClock};
use leadflow::config::LeadflowConfig;
use uuid::Uuid;

/// An engine with the configured owner's board loaded.
pub struct Session {
    pub engine: SyncEngine,
    pub owner: String,
}

/// Open the database (creating it if needed) and build an engine over it.
pub fn open_engine(config: &LeadflowConfig) -> Result<SyncEngine> {
    let db_path = config.db_path();
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let db = DbHandle::open(db_path)?;
    Ok(SyncEngine::with_options(
        Arc::new(db),
        Arc::new(SystemClock),
        config.engine_options(),
    ))
}

pub async fn open_session(config: &LeadflowConfig) -> Result<Session> {
    let engine = open_engine(config)?;
    let identity = config.identity();
    if engine.open_session(&identity).await?.is_none() {
        bail!(
            "No owner set. Pass --owner, set LEADFLOW_OWNER, or add [session] owner to {}",
            config.config_path().display()
        );
    }
    let owner = identity.current_owner().unwrap_or_default();
    Ok(Session { engine, owner })
}

/// Find a stage by key, by the slug of `reference`, or by name.
pub fn find_stage<'a>(stages: &'a [Stage], reference: &str) -> Result<&'a Stage> {
    let slug = slugify(reference);
    stages
        .iter()
        .find(|s| s.key == reference)
        .or_else(|| stages.iter().find(|s| s.key == slug))
        .or_else(|| {
            stages
                .iter()
                .find(|s| s.name.eq_ignore_ascii_case(reference.trim()))
        })
        .with_context(|| format!("No stage matches '{}'", reference))
}

/// Find a lead by full id or by an unambiguous id prefix. The stage is
/// `None` for a lead not on any stage.
pub fn find_lead<'a>(
    store: &'a LeadStore,
    reference: &str,
) -> Result<(Option<&'a Stage>, &'a Lead)> {
    if let Ok(id) = Uuid::parse_str(reference) {
        return store
            .find(id)
            .map(|(stage, card)| (stage, &card.lead))
            .with_context(|| format!("No lead with id {}", id));
    }

    let prefix = reference.trim().to_lowercase();
    if prefix.is_empty() {
        bail!("Lead reference is empty");
    }
    let matches: Vec<(Option<&Stage>, &Lead)> = store
        .cards()
        .map(|(stage, card)| (stage, &card.lead))
        .filter(|(_, lead)| lead.id.to_string().starts_with(&prefix))
        .collect();
    match matches.as_slice() {
        [one] => Ok(*one),
        [] => bail!("No lead id starts with '{}'", reference),
        _ => bail!(
            "'{}' matches {} leads; use more of the id",
            reference,
            matches.len()
        ),
    }
}

pub fn parse_color(value: &str) -> Result<StageColor> {
    value.trim().to_lowercase().parse::<StageColor>().map_err(|e| {
        let valid: Vec<&str> = StageColor::ALL.iter().map(|c| c.as_str()).collect();
        anyhow::anyhow!("{}. Valid colors: {}", e, valid.join(", "))
    })
}

pub fn term_color(color: StageColor) -> Color {
    match color {
        StageColor::Blue => Color::Blue,
        StageColor::Cyan => Color::Cyan,
        StageColor::Purple => Color::Magenta,
        StageColor::Orange => Color::Color256(208),
        StageColor::Yellow => Color::Yellow,
        StageColor::Green => Color::Green,
        StageColor::Red => Color::Red,
        StageColor::Pink => Color::Color256(205),
    }
}

pub fn short_id(id: Uuid) -> String {
    id.simple().to_string()[..8].to_string()
}

/// `1234567.5` → `1,234,567.50`
pub fn format_value(value: f64) -> String {
    let fixed = format!("{:.2}", value.abs());
    let (int_part, frac_part) = fixed.split_once('.').unwrap_or((fixed.as_str(), "00"));
    let mut grouped = String::new();
    for (i, ch) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    let sign = if value < 0.0 { "-" } else { "" };
    format!("{}{}.{}", sign, grouped, frac_part)
}

pub fn print_stage_header(stage: &Stage, lead_count: usize, total: f64) {
    println!(
        "{} {}  {}",
        stage.icon,
        style(&stage.name).bold().fg(term_color(stage.color)),
        style(format!(
            "[{}] {} lead(s), {}",
            stage.key,
            lead_count,
            format_value(total)
        ))
        .dim()
    );
}

pub fn print_lead_line(lead: &Lead, age_in_days: Option<i64>) {
    let mut line = format!(
        "  {}  {}",
        style(short_id(lead.id)).dim(),
        style(&lead.name).bold()
    );
    if let Some(company) = &lead.company {
        line.push_str(&format!("  {}", company));
    }
    line.push_str(&format!("  {}", format_value(lead.estimated_value)));
    if let Some(days) = age_in_days {
        line.push_str(&format!("  {}", style(format!("{}d", days)).dim()));
    }
    if let Some(next) = &lead.next_action {
        line.push_str(&format!("  {} {}", style("→").cyan(), next));
    }
    println!("{}", line);
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn stage(key: &str, name: &str) -> Stage {
        Stage {
            id: Uuid::new_v4(),
            owner_id: "u1".into(),
            key: key.into(),
            name: name.into(),
            icon: "📥".into(),
            color: StageColor::Blue,
            position: 0,
            is_default: true,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_format_value() {
        assert_eq!(format_value(0.0), "0.00");
        assert_eq!(format_value(5000.0), "5,000.00");
        assert_eq!(format_value(1234567.5), "1,234,567.50");
        assert_eq!(format_value(999.999), "1,000.00");
    }

    #[test]
    fn test_find_stage_by_key_slug_or_name() {
        let stages = vec![stage("lead", "Lead Gerado"), stage("negotiation", "Negociação")];
        assert_eq!(find_stage(&stages, "lead").unwrap().key, "lead");
        assert_eq!(find_stage(&stages, "Lead Gerado").unwrap().key, "lead");
        assert_eq!(find_stage(&stages, "negociação").unwrap().key, "negotiation");
        assert!(find_stage(&stages, "closed").is_err());
    }

    #[test]
    fn test_parse_color() {
        assert_eq!(parse_color(" Purple ").unwrap(), StageColor::Purple);
        let err = parse_color("teal").unwrap_err().to_string();
        assert!(err.contains("Valid colors: blue"));
    }

    #[test]
    fn test_short_id_is_prefix() {
        let id = Uuid::new_v4();
        assert!(id.to_string().starts_with(&short_id(id)));
    }
}
