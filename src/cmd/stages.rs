//! Stage management: `leadflow stages`.

use anyhow::{Result, bail};
use console::style;
use uuid::Uuid;

use leadflow::board::models::{NewStage, StagePatch};
use leadflow::config::LeadflowConfig;

use super::super::StagesCommands;

pub async fn cmd_stages(config: &LeadflowConfig, command: Option<StagesCommands>) -> Result<()> {
    let session = super::open_session(config).await?;
    let engine = &session.engine;
    let owner = session.owner.as_str();
    let stages = engine.list_stages(owner).await?;

    match command {
        None | Some(StagesCommands::List) => {
            let summary = engine.snapshot().await.summary();
            for stage in &stages {
                let (count, total) = summary
                    .stages
                    .iter()
                    .find(|s| s.key == stage.key)
                    .map(|s| (s.lead_count, s.total_value))
                    .unwrap_or((0, 0.0));
                print!("{:>3}  ", stage.position);
                super::print_stage_header(stage, count, total);
            }
            if stages.is_empty() {
                println!("No stages. Run `leadflow stages add <name>`.");
            }
        }
        Some(StagesCommands::Add {
            name,
            icon,
            color,
            position,
        }) => {
            let stage = engine
                .create_stage(
                    owner,
                    NewStage {
                        name,
                        icon,
                        color: super::parse_color(&color)?,
                        position,
                    },
                )
                .await?;
            println!(
                "{} stage {} {}",
                style("Added").green(),
                style(&stage.name).bold(),
                style(format!("[{}]", stage.key)).dim()
            );
        }
        Some(StagesCommands::Rename { stage, name }) => {
            let target = super::find_stage(&stages, &stage)?;
            let update = engine
                .update_stage(
                    target.id,
                    StagePatch {
                        name: Some(name),
                        ..StagePatch::default()
                    },
                )
                .await?;
            println!(
                "{} {} → {}",
                style("Renamed").green(),
                target.name,
                style(&update.stage.name).bold()
            );
            if update.key_changed() {
                println!(
                    "  key {} → {}, {} lead(s) moved with it",
                    update.previous_key, update.stage.key, update.leads_moved
                );
            }
        }
        Some(StagesCommands::Recolor { stage, color, icon }) => {
            let target = super::find_stage(&stages, &stage)?;
            let update = engine
                .update_stage(
                    target.id,
                    StagePatch {
                        color: Some(super::parse_color(&color)?),
                        icon,
                        ..StagePatch::default()
                    },
                )
                .await?;
            println!(
                "{} {} is now {} ({})",
                style("Updated").green(),
                style(&update.stage.name).fg(super::term_color(update.stage.color)),
                update.stage.color,
                update.stage.color.hex()
            );
        }
        Some(StagesCommands::Remove { stage, reassign_to }) => {
            let target = super::find_stage(&stages, &stage)?;
            let reassign_id = match reassign_to {
                Some(reference) => Some(super::find_stage(&stages, &reference)?.id),
                None => None,
            };
            let deletion = engine.delete_stage(target.id, reassign_id).await?;
            println!(
                "{} stage {}",
                style("Removed").green(),
                style(&deletion.deleted.name).bold()
            );
            if let Some(to) = deletion.reassigned_to {
                println!("  {} lead(s) moved to {}", deletion.leads_moved, to);
            }
        }
        Some(StagesCommands::Reorder { stages: order }) => {
            let mut ids: Vec<Uuid> = Vec::with_capacity(order.len());
            for reference in &order {
                let id = super::find_stage(&stages, reference)?.id;
                if ids.contains(&id) {
                    bail!("Stage '{}' listed twice", reference);
                }
                ids.push(id);
            }
            let reordered = engine.reorder_stages(owner, &ids).await?;
            println!("{} stage order:", style("New").green());
            for stage in &reordered {
                println!("  {:>3}  {} {}", stage.position, stage.icon, stage.name);
            }
        }
    }

    Ok(())
}
