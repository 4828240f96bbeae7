//! Review queue construction.
//!
//! The queue is always rebuilt from the whole store: due prompts are
//! filtered, pre-sorted by review date, and then handed to the configured
//! [`ReviewOrder`].

use std::collections::HashSet;
use std::sync::Mutex;

use chrono::NaiveDate;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::dates::is_due;
use crate::error::ScheduleError;
use crate::model::{Prompt, PromptId};
use crate::store::PromptStore;

/// Strategy that decides the order due prompts are presented in.
///
/// Implementations receive the due prompts sorted by ascending review date
/// and must return a permutation of their ids.
pub trait ReviewOrder<D>: Send + Sync {
    fn order(&self, due: &[&Prompt<D>]) -> anyhow::Result<Vec<PromptId>>;
}

impl<D, F> ReviewOrder<D> for F
where
    F: Fn(&[&Prompt<D>]) -> anyhow::Result<Vec<PromptId>> + Send + Sync,
{
    fn order(&self, due: &[&Prompt<D>]) -> anyhow::Result<Vec<PromptId>> {
        self(due)
    }
}

/// Uniform random permutation (Fisher-Yates).
#[derive(Debug, Default)]
pub struct Shuffle {
    seeded: Option<Mutex<StdRng>>,
}

impl Shuffle {
    /// Shuffle with the thread-local RNG.
    pub fn new() -> Self {
        Self::default()
    }

    /// Shuffle with a deterministic RNG.
    pub fn seeded(seed: u64) -> Self {
        Self {
            seeded: Some(Mutex::new(StdRng::seed_from_u64(seed))),
        }
    }
}

impl<D> ReviewOrder<D> for Shuffle {
    fn order(&self, due: &[&Prompt<D>]) -> anyhow::Result<Vec<PromptId>> {
        let mut ids: Vec<PromptId> = due.iter().map(|p| p.id.clone()).collect();
        match &self.seeded {
            Some(rng) => {
                let mut rng = rng
                    .lock()
                    .map_err(|_| anyhow::anyhow!("shuffle rng lock poisoned"))?;
                ids.shuffle(&mut *rng);
            }
            None => ids.shuffle(&mut rand::thread_rng()),
        }
        Ok(ids)
    }
}

/// Keep the earliest-due-first order.
#[derive(Debug, Clone, Copy, Default)]
pub struct DueDateOrder;

impl<D> ReviewOrder<D> for DueDateOrder {
    fn order(&self, due: &[&Prompt<D>]) -> anyhow::Result<Vec<PromptId>> {
        Ok(due.iter().map(|p| p.id.clone()).collect())
    }
}

/// Prompts due on `today`, sorted by ascending review date. The sort is
/// stable, so prompts sharing a date keep id order.
pub fn due_prompts<D>(store: &PromptStore<D>, today: NaiveDate) -> Vec<&Prompt<D>> {
    let mut due: Vec<&Prompt<D>> = store
        .iter()
        .filter(|p| is_due(p.next_review_date, today))
        .collect();
    due.sort_by_key(|p| p.next_review_date);
    due
}

/// Build the review queue for `today`.
pub fn build_review_queue<D>(
    store: &PromptStore<D>,
    order: &dyn ReviewOrder<D>,
    today: NaiveDate,
) -> Result<Vec<PromptId>, ScheduleError> {
    let due = due_prompts(store, today);
    let queue = order.order(&due).map_err(ScheduleError::OrderPolicy)?;

    check_permutation(&due, &queue)?;

    tracing::debug!(due = queue.len(), total = store.len(), "review queue rebuilt");
    Ok(queue)
}

fn check_permutation<D>(due: &[&Prompt<D>], queue: &[PromptId]) -> Result<(), ScheduleError> {
    let mut expected: HashSet<&str> = due.iter().map(|p| p.id.as_str()).collect();
    let unexpected = queue.iter().find(|id| !expected.remove(id.as_str())).cloned();
    if unexpected.is_none() && expected.is_empty() {
        return Ok(());
    }

    let missing = match unexpected {
        Some(_) => None,
        None => due
            .iter()
            .find(|p| expected.contains(p.id.as_str()))
            .map(|p| p.id.clone()),
    };
    Err(ScheduleError::InvalidOrdering {
        expected: due.len(),
        actual: queue.len(),
        unexpected,
        missing,
    })
}
