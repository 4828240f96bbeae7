//! The `cuecard review` command.

use std::io::{BufRead, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use tokio::sync::mpsc;

use cuecard_core::config::load_config_from;
use cuecard_core::dates::{local_day, todays_date, SystemClock};
use cuecard_core::{Event, ReviewService, Scheduler, StateValue};

use crate::deck::{load_deck, save_deck, Card, DoublingPolicy};

#[derive(Debug, Default)]
struct Tally {
    right: usize,
    wrong: usize,
    missed: usize,
}

pub async fn execute(
    deck_path: PathBuf,
    config_path: Option<PathBuf>,
    time_to_answer_ms: Option<u64>,
    save: bool,
) -> Result<()> {
    let mut config = load_config_from(config_path.as_deref())?;
    if let Some(ms) = time_to_answer_ms {
        config.time_to_answer_ms = Some(ms);
    }

    let mut deck = load_deck(&deck_path)?;
    let today = todays_date(&SystemClock);
    let scheduler: Scheduler<Card, bool> = Scheduler::with_prompts(
        config.options(DoublingPolicy { today }),
        deck.prompts.clone(),
    )?;

    let service = ReviewService::spawn(scheduler);
    tracing::info!(
        deck = %deck.deck.name,
        service = %service.id(),
        timeout = ?config.time_to_answer(),
        "starting review"
    );

    let mut updates = service.subscribe();
    let mut input = spawn_stdin_reader();
    let mut tally = Tally::default();

    service.send(Event::Start).await?;

    loop {
        let observed = updates.borrow_and_update().clone();
        match observed.state {
            StateValue::SessionPrompt => {
                let Some(prompt) = observed.current_prompt else {
                    break;
                };
                println!("\n[{}] {}", prompt.id, prompt.data.front);
                print!("Did you remember it? [y/n] ");
                std::io::stdout().flush()?;

                tokio::select! {
                    line = input.recv() => {
                        let Some(line) = line else {
                            println!("\nInput closed, stopping the session.");
                            break;
                        };
                        let answer = parse_answer(&line.context("failed to read answer")?);
                        let transition = service.send(Event::Answer(Some(answer))).await?;
                        match (transition.answer.is_some(), answer) {
                            // The timeout won the race.
                            (false, _) => tally.missed += 1,
                            (true, true) => tally.right += 1,
                            (true, false) => tally.wrong += 1,
                        }
                    }
                    changed = updates.changed() => {
                        changed.context("review service stopped")?;
                        if let Some(error) = updates.borrow().last_error.clone() {
                            anyhow::bail!("answer timeout for '{}' failed: {error}", prompt.id);
                        }
                        tally.missed += 1;
                        println!("\nTime's up.");
                    }
                }
            }
            StateValue::SessionFeedback => {
                if let Some(outcome) = observed.last_answer {
                    let snapshot = service.snapshot().await?;
                    if let Some(card) = snapshot.prompts.get(&outcome.id) {
                        println!("Answer: {}", card.data.back);
                        if outcome.requeued {
                            println!("Still due today, it will come back.");
                        } else {
                            println!("Next review: {}", local_day(card.next_review_date));
                        }
                    }
                }
                service.send(Event::Prompt).await?;
            }
            StateValue::Completed => {
                println!(
                    "\nSession complete: {} right, {} wrong, {} timed out.",
                    tally.right, tally.wrong, tally.missed
                );
                break;
            }
            StateValue::Idle => break,
        }
    }

    let snapshot = service.snapshot().await?;
    service.shutdown().await?;

    if save {
        for prompt in &mut deck.prompts {
            if let Some(updated) = snapshot.prompts.get(&prompt.id) {
                *prompt = updated.clone();
            }
        }
        save_deck(&deck_path, &deck)?;
        println!("Saved {}", deck_path.display());
    }

    Ok(())
}

/// `y` or `yes` in any case counts as remembered; anything else does not.
fn parse_answer(line: &str) -> bool {
    matches!(line.trim().to_lowercase().as_str(), "y" | "yes")
}

/// Forward stdin lines from a plain thread so a pending read never holds
/// up runtime shutdown.
fn spawn_stdin_reader() -> mpsc::Receiver<std::io::Result<String>> {
    let (tx, rx) = mpsc::channel(1);
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            if tx.blocking_send(line).is_err() {
                break;
            }
        }
    });
    rx
}
