//! Answer processing pipeline.
//!
//! Turns a raw answer plus timing statistics into an updated prompt, writes
//! it back to the store, and requeues it when it is still due.

use std::collections::VecDeque;

use chrono::{DateTime, NaiveDate, Utc};

use crate::dates::is_due;
use crate::error::ScheduleError;
use crate::model::{AnswerStatistics, Prompt, PromptData, PromptId};
use crate::store::PromptStore;

/// Host policy that computes a prompt's next state from an answer.
///
/// `answer` is `None` when the answer timeout elapsed. The returned prompt
/// is expected to carry a new `next_review_date`.
pub trait AnswerPolicy<D, A>: Send + Sync {
    fn process_answer(
        &self,
        prompt: &Prompt<D>,
        answer: Option<A>,
        statistics: AnswerStatistics,
    ) -> anyhow::Result<Prompt<D>>;
}

impl<D, A, F> AnswerPolicy<D, A> for F
where
    F: Fn(&Prompt<D>, Option<A>, AnswerStatistics) -> anyhow::Result<Prompt<D>> + Send + Sync,
{
    fn process_answer(
        &self,
        prompt: &Prompt<D>,
        answer: Option<A>,
        statistics: AnswerStatistics,
    ) -> anyhow::Result<Prompt<D>> {
        self(prompt, answer, statistics)
    }
}

/// What the pipeline did with an answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnswerOutcome {
    pub id: PromptId,
    pub statistics: AnswerStatistics,
    /// The prompt was still due and went back on the queue tail.
    pub requeued: bool,
}

/// Inputs of one pipeline run.
pub(crate) struct AnswerInput<'a, D, A> {
    pub prompt: &'a Prompt<D>,
    pub answer: Option<A>,
    pub first_displayed: DateTime<Utc>,
    pub now: DateTime<Utc>,
    pub today: NaiveDate,
}

/// Milliseconds from `first_displayed` to `now`, clamped at zero.
pub fn answer_statistics(first_displayed: DateTime<Utc>, now: DateTime<Utc>) -> AnswerStatistics {
    let elapsed = (now - first_displayed).num_milliseconds().max(0);
    AnswerStatistics {
        time_ms: elapsed as u64,
    }
}

/// Run the policy and apply its result.
///
/// The policy runs before anything is written, so a failing policy leaves
/// `store` and `queue` untouched. The queue is not re-sorted; a requeued id
/// is appended to the tail.
pub(crate) fn process_answer<D: PromptData, A>(
    policy: &dyn AnswerPolicy<D, A>,
    store: &mut PromptStore<D>,
    queue: &mut VecDeque<PromptId>,
    input: AnswerInput<'_, D, A>,
) -> Result<AnswerOutcome, ScheduleError> {
    let id = input.prompt.id.clone();
    let statistics = answer_statistics(input.first_displayed, input.now);

    let mut updated = policy
        .process_answer(input.prompt, input.answer, statistics)
        .map_err(|error| ScheduleError::AnswerPolicy {
            id: id.clone(),
            error,
        })?;

    if updated.id != id {
        tracing::debug!(%id, returned = %updated.id, "answer policy changed prompt id, keeping original");
        updated.id = id.clone();
    }

    let requeued = is_due(updated.next_review_date, input.today);
    tracing::debug!(
        %id,
        time_ms = statistics.time_ms,
        next_review_date = %updated.next_review_date,
        requeued,
        "answer processed"
    );

    store.put(updated);
    if requeued {
        queue.push_back(id.clone());
    }

    Ok(AnswerOutcome {
        id,
        statistics,
        requeued,
    })
}
