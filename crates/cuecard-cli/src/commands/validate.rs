//! The `cuecard validate` command.

use std::path::PathBuf;

use anyhow::Result;

use crate::deck::{load_deck, validate_deck};

pub fn execute(deck_path: PathBuf) -> Result<()> {
    let deck = load_deck(&deck_path)?;
    println!("Deck: {} ({} prompts)", deck.deck.name, deck.prompts.len());

    let warnings = validate_deck(&deck);
    for w in &warnings {
        let prefix = w
            .prompt_id
            .as_ref()
            .map(|id| format!("  [{id}]"))
            .unwrap_or_else(|| "  ".to_string());
        println!("{prefix} WARNING: {}", w.message);
    }

    if warnings.is_empty() {
        println!("Deck valid.");
    } else {
        println!("\n{} warning(s) found.", warnings.len());
    }

    Ok(())
}
