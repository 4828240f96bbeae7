//! Deck files: a TOML header plus one `[[prompts]]` table per card.
//!
//! ```toml
//! [deck]
//! name = "Capitals"
//!
//! [[prompts]]
//! id = "fr"
//! next_review_date = "2026-10-18T00:00:00Z"
//! front = "Capital of France?"
//! back = "Paris"
//! iteration = 2
//! ```
//!
//! Review dates must be quoted RFC 3339 strings.

use std::collections::HashSet;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use cuecard_core::dates::change_date;
use cuecard_core::{AnswerPolicy, AnswerStatistics, Prompt};

fn default_iteration() -> u32 {
    2
}

/// The card payload carried by every prompt in a deck.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Card {
    pub front: String,
    pub back: String,
    /// Days to push the review out after the next right answer.
    #[serde(default = "default_iteration")]
    pub iteration: u32,
}

impl Card {
    pub fn new(front: impl Into<String>, back: impl Into<String>) -> Self {
        Self {
            front: front.into(),
            back: back.into(),
            iteration: default_iteration(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeckHeader {
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Deck {
    pub deck: DeckHeader,
    #[serde(default)]
    pub prompts: Vec<Prompt<Card>>,
}

/// Load a deck from a TOML file.
pub fn load_deck(path: &Path) -> Result<Deck> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read deck: {}", path.display()))?;
    parse_deck_str(&content, path)
}

/// Parse a deck from a TOML string. `source` is only used in error messages.
pub fn parse_deck_str(content: &str, source: &Path) -> Result<Deck> {
    toml::from_str(content).with_context(|| format!("failed to parse deck: {}", source.display()))
}

/// Write a deck back to disk, replacing the file.
pub fn save_deck(path: &Path, deck: &Deck) -> Result<()> {
    let content = toml::to_string_pretty(deck).context("failed to serialize deck")?;
    std::fs::write(path, content)
        .with_context(|| format!("failed to write deck: {}", path.display()))?;
    tracing::debug!(path = %path.display(), prompts = deck.prompts.len(), "deck saved");
    Ok(())
}

/// A warning from deck validation.
#[derive(Debug, Clone)]
pub struct DeckWarning {
    pub prompt_id: Option<String>,
    pub message: String,
}

/// Check a deck for problems the scheduler would reject or a reviewer would trip over.
pub fn validate_deck(deck: &Deck) -> Vec<DeckWarning> {
    let mut warnings = Vec::new();

    let mut seen = HashSet::new();
    for prompt in &deck.prompts {
        if !seen.insert(prompt.id.as_str()) {
            warnings.push(DeckWarning {
                prompt_id: Some(prompt.id.clone()),
                message: format!("duplicate prompt id: {}", prompt.id),
            });
        }
    }

    for prompt in &deck.prompts {
        if prompt.id.trim().is_empty() {
            warnings.push(DeckWarning {
                prompt_id: None,
                message: "prompt with an empty id".into(),
            });
        }
        if prompt.data.front.trim().is_empty() {
            warnings.push(DeckWarning {
                prompt_id: Some(prompt.id.clone()),
                message: "front is empty".into(),
            });
        }
        if prompt.data.back.trim().is_empty() {
            warnings.push(DeckWarning {
                prompt_id: Some(prompt.id.clone()),
                message: "back is empty".into(),
            });
        }
        if prompt.data.iteration == 0 {
            warnings.push(DeckWarning {
                prompt_id: Some(prompt.id.clone()),
                message: "iteration is 0, right answers will not move the review date".into(),
            });
        }
        if prompt.data.iteration > MAX_INTERVAL_DAYS {
            warnings.push(DeckWarning {
                prompt_id: Some(prompt.id.clone()),
                message: format!(
                    "iteration {} is above {MAX_INTERVAL_DAYS}, reviews will be capped at {MAX_INTERVAL_DAYS} days",
                    prompt.data.iteration
                ),
            });
        }
    }

    warnings
}

/// Longest interval a right answer can push a card out, about a century.
pub const MAX_INTERVAL_DAYS: u32 = 36_500;

/// Right answers push the review out by `iteration` days and square the
/// interval, up to [`MAX_INTERVAL_DAYS`]; wrong or missing answers make the
/// card due again today.
#[derive(Debug, Clone, Copy)]
pub struct DoublingPolicy {
    pub today: DateTime<Utc>,
}

impl AnswerPolicy<Card, bool> for DoublingPolicy {
    fn process_answer(
        &self,
        prompt: &Prompt<Card>,
        answer: Option<bool>,
        statistics: AnswerStatistics,
    ) -> anyhow::Result<Prompt<Card>> {
        let mut prompt = prompt.clone();
        if answer == Some(true) {
            let interval = prompt.data.iteration.min(MAX_INTERVAL_DAYS);
            let next = change_date(prompt.next_review_date, i64::from(interval)).with_context(|| {
                format!(
                    "next review for '{}' is out of range ({} + {interval} days)",
                    prompt.id, prompt.next_review_date
                )
            })?;
            prompt.next_review_date = next;
            prompt.data.iteration = interval.saturating_pow(2).min(MAX_INTERVAL_DAYS);
        } else {
            prompt.next_review_date = self.today;
        }
        tracing::debug!(
            id = %prompt.id,
            ?answer,
            time_ms = statistics.time_ms,
            next = %prompt.next_review_date,
            "answer scored"
        );
        Ok(prompt)
    }
}
