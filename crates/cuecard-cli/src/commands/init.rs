//! The `cuecard init` command.

use std::path::Path;

use anyhow::{Context, Result};

use cuecard_core::dates::{change_date, todays_date, SystemClock};
use cuecard_core::Prompt;

use crate::deck::{save_deck, Card, Deck, DeckHeader};

pub fn execute() -> Result<()> {
    if Path::new("cuecard.toml").exists() {
        println!("cuecard.toml already exists, skipping.");
    } else {
        std::fs::write("cuecard.toml", SAMPLE_CONFIG)?;
        println!("Created cuecard.toml");
    }

    let deck_path = Path::new("deck.toml");
    if deck_path.exists() {
        println!("deck.toml already exists, skipping.");
    } else {
        save_deck(deck_path, &starter_deck()?)?;
        println!("Created deck.toml");
    }

    println!("\nNext steps:");
    println!("  1. Add your own cards to deck.toml");
    println!("  2. Run: cuecard due --deck deck.toml");
    println!("  3. Run: cuecard review --deck deck.toml --save");

    Ok(())
}

/// Three cards due today or earlier and one that comes up in two days.
fn starter_deck() -> Result<Deck> {
    let today = todays_date(&SystemClock);
    let card = |id: &str, days: i64, front: &str, back: &str| -> Result<Prompt<Card>> {
        let date = change_date(today, days).context("starter deck date out of range")?;
        Ok(Prompt::new(id, date, Card::new(front, back)))
    };

    Ok(Deck {
        deck: DeckHeader {
            name: "Starter".into(),
            description: "A few capitals to try cuecard with".into(),
        },
        prompts: vec![
            card("france", -5, "Capital of France?", "Paris")?,
            card("japan", 0, "Capital of Japan?", "Tokyo")?,
            card("peru", 2, "Capital of Peru?", "Lima")?,
            card("kenya", -1, "Capital of Kenya?", "Nairobi")?,
        ],
    })
}

const SAMPLE_CONFIG: &str = r#"# cuecard configuration

# Milliseconds before an unanswered card counts as missed. 0 or unset disables it.
time_to_answer_ms = 30000

# Review order: "shuffle" or "due-date".
order = "shuffle"

# Fixed seed for a reproducible shuffle.
# seed = 42

# Adding a card whose id is already stored: "reject", "keep-existing" or "replace".
on_duplicate = "reject"
"#;
