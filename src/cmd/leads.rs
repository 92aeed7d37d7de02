//! Lead commands: `leadflow leads`.

use anyhow::{Result, bail};
use console::style;

use leadflow::board::models::{InteractionKind, LeadPatch, NewLead};
use leadflow::config::LeadflowConfig;

use super::super::LeadsCommands;

pub async fn cmd_leads(config: &LeadflowConfig, command: LeadsCommands) -> Result<()> {
    let session = super::open_session(config).await?;
    let engine = &session.engine;
    let owner = session.owner.as_str();

    match command {
        LeadsCommands::Add {
            name,
            company,
            email,
            phone,
            value,
            next_action,
            stage,
        } => {
            let stage_key = match stage {
                Some(reference) => {
                    let stages = engine.list_stages(owner).await?;
                    Some(super::find_stage(&stages, &reference)?.key.clone())
                }
                None => None,
            };
            let lead = engine
                .create_lead(
                    owner,
                    NewLead {
                        name,
                        company,
                        email,
                        contact_number: phone,
                        estimated_value: value,
                        next_action,
                        stage_key,
                    },
                )
                .await?;
            println!(
                "{} {} in {} ({})",
                style("Added").green(),
                style(&lead.name).bold(),
                lead.stage_key,
                super::short_id(lead.id)
            );
        }
        LeadsCommands::Edit {
            lead,
            name,
            company,
            email,
            phone,
            value,
            next_action,
        } => {
            let patch = LeadPatch {
                name,
                company,
                email,
                contact_number: phone,
                estimated_value: value,
                next_action,
                stage_key: None,
            };
            if patch.is_empty() {
                bail!("Nothing to change. Pass at least one field, e.g. --name or --value.");
            }
            let store = engine.snapshot().await;
            let (_, found) = super::find_lead(&store, &lead)?;
            let updated = engine.update_lead(found.id, patch).await?;
            println!("{}", style("Updated").green());
            super::print_lead_line(&updated, None);
        }
        LeadsCommands::Move { lead, stage } => {
            let store = engine.snapshot().await;
            let (from, found) = super::find_lead(&store, &lead)?;
            let stages = store.stages();
            let to = super::find_stage(&stages, &stage)?;
            let (from_key, from_name) = match from {
                Some(from) => (from.key.as_str(), from.name.as_str()),
                None => (found.stage_key.as_str(), found.stage_key.as_str()),
            };
            if from_key == to.key {
                println!("{} is already in {}", found.name, to.name);
                return Ok(());
            }
            engine.change_stage(found.id, from_key, &to.key).await?;
            println!(
                "{} {}: {} → {}",
                style("Moved").green(),
                style(&found.name).bold(),
                from_name,
                to.name
            );
        }
        LeadsCommands::Remove { lead } => {
            let store = engine.snapshot().await;
            let (_, found) = super::find_lead(&store, &lead)?;
            engine.delete_lead(found.id).await?;
            println!("{} {}", style("Removed").green(), style(&found.name).bold());
        }
        LeadsCommands::Note {
            lead,
            description,
            kind,
            next_step,
        } => {
            let kind: InteractionKind = kind.parse().map_err(|e: String| anyhow::anyhow!(e))?;
            let store = engine.snapshot().await;
            let (_, found) = super::find_lead(&store, &lead)?;
            let updated = engine
                .add_interaction(found.id, kind, &description, &next_step)
                .await?;
            println!(
                "{} {} for {} ({} total)",
                style("Recorded").green(),
                kind.as_str(),
                style(&updated.name).bold(),
                updated.interactions.len()
            );
        }
        LeadsCommands::Search { term } => {
            let store = engine.snapshot().await;
            let hits = store.search(&term);
            if hits.is_empty() {
                println!("No leads match '{}'", term);
            }
            for (stage, card) in hits {
                match stage {
                    Some(stage) => print!("{} {:<14}", stage.icon, stage.key),
                    None => print!("  {:<14}", "-"),
                }
                super::print_lead_line(&card.lead, Some(card.age_in_days));
            }
        }
    }

    Ok(())
}
