//! Board view: `leadflow board`.

use anyhow::{Context, Result};
use console::style;

use leadflow::config::LeadflowConfig;

pub async fn cmd_board(config: &LeadflowConfig, json: bool) -> Result<()> {
    let session = super::open_session(config).await?;
    let store = session.engine.snapshot().await;

    if json {
        let out = serde_json::to_string_pretty(&store).context("Failed to serialize board")?;
        println!("{}", out);
        return Ok(());
    }

    let summary = store.summary();
    println!();
    println!(
        "{}  {}",
        style(format!("Pipeline for {}", session.owner)).bold().cyan(),
        style(format!(
            "{} lead(s), {}",
            summary.lead_count,
            super::format_value(summary.total_value)
        ))
        .dim()
    );
    println!();

    if store.buckets().is_empty() {
        println!("No stages yet. Run `leadflow stages add <name>` or `leadflow init`.");
    }

    for (bucket, totals) in store.buckets().iter().zip(&summary.stages) {
        super::print_stage_header(&bucket.stage, totals.lead_count, totals.total_value);
        if bucket.leads.is_empty() {
            println!("  {}", style("(empty)").dim());
        }
        for card in &bucket.leads {
            super::print_lead_line(&card.lead, Some(card.age_in_days));
        }
        println!();
    }

    if !store.unplaced().is_empty() {
        println!("{}", style("Not on any stage").yellow());
        for card in store.unplaced() {
            super::print_lead_line(&card.lead, Some(card.age_in_days));
        }
        println!();
    }

    Ok(())
}
