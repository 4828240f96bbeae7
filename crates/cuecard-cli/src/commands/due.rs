//! The `cuecard due` command.

use std::path::PathBuf;

use anyhow::Result;
use serde::Serialize;

use cuecard_core::config::load_config_from;
use cuecard_core::dates::{local_day, todays_date, SystemClock};
use cuecard_core::Scheduler;

use crate::deck::{load_deck, Card, DoublingPolicy};

#[derive(Debug, Serialize)]
struct DueEntry<'a> {
    position: usize,
    id: &'a str,
    front: &'a str,
    next_review: String,
}

pub fn execute(deck_path: PathBuf, config_path: Option<PathBuf>, format: String) -> Result<()> {
    let config = load_config_from(config_path.as_deref())?;
    let deck = load_deck(&deck_path)?;
    let today = todays_date(&SystemClock);
    let total = deck.prompts.len();

    let scheduler: Scheduler<Card, bool> =
        Scheduler::with_prompts(config.options(DoublingPolicy { today }), deck.prompts)?;
    let context = scheduler.context();

    let entries: Vec<DueEntry<'_>> = context
        .review_queue()
        .iter()
        .enumerate()
        .filter_map(|(i, id)| {
            let prompt = context.prompts().get(id)?;
            Some(DueEntry {
                position: i + 1,
                id: &prompt.id,
                front: &prompt.data.front,
                next_review: local_day(prompt.next_review_date).to_string(),
            })
        })
        .collect();

    match format.as_str() {
        "json" => println!("{}", serde_json::to_string_pretty(&entries)?),
        "table" => print_table(&deck.deck.name, &entries, total),
        other => anyhow::bail!("unknown format: {other} (expected table or json)"),
    }

    Ok(())
}

fn print_table(name: &str, entries: &[DueEntry<'_>], total: usize) {
    use comfy_table::{Cell, Table};

    if entries.is_empty() {
        println!("{name}: nothing due today ({total} prompts).");
        return;
    }

    let mut table = Table::new();
    table.set_header(vec!["#", "Id", "Front", "Due since"]);
    for entry in entries {
        table.add_row(vec![
            Cell::new(entry.position),
            Cell::new(entry.id),
            Cell::new(entry.front),
            Cell::new(&entry.next_review),
        ]);
    }

    println!("{name}: {} of {total} prompts due", entries.len());
    println!("{table}");
}
