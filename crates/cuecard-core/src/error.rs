//! Scheduler error types.
//!
//! Every error leaves the scheduler exactly as it was before the event that
//! raised it. Events delivered in a state that does not handle them are not
//! errors; they are ignored.

use thiserror::Error;

use crate::model::PromptId;

/// Errors that can occur while applying an event to the scheduler.
#[derive(Debug, Error)]
pub enum ScheduleError {
    /// An added prompt reuses an id from the same batch or from the store.
    #[error("duplicate prompts with id '{id}'")]
    DuplicateIdentifier { id: PromptId },

    /// A patch produced a record the host payload type cannot represent.
    #[error("patch for prompt '{id}' does not fit the prompt type: {source}")]
    InvalidPatch {
        id: PromptId,
        #[source]
        source: serde_json::Error,
    },

    /// The ordering strategy did not return a permutation of its input.
    #[error(
        "review order must return a permutation of {expected} due ids, got {actual} ids{}",
        ordering_detail(.unexpected, .missing)
    )]
    InvalidOrdering {
        expected: usize,
        actual: usize,
        /// First returned id that is not due or is repeated.
        unexpected: Option<PromptId>,
        /// First due id left out, when every returned id was valid.
        missing: Option<PromptId>,
    },

    /// The host answer policy failed.
    #[error("answer policy failed for prompt '{id}': {error:#}")]
    AnswerPolicy { id: PromptId, error: anyhow::Error },

    /// The host ordering strategy failed.
    #[error("review order failed: {0:#}")]
    OrderPolicy(anyhow::Error),
}

fn ordering_detail(unexpected: &Option<PromptId>, missing: &Option<PromptId>) -> String {
    match (unexpected, missing) {
        (Some(id), _) => format!(": '{id}' is not due or appears twice"),
        (None, Some(id)) => format!(": due id '{id}' is missing"),
        (None, None) => String::new(),
    }
}

impl ScheduleError {
    /// Returns `true` if the error came from a host-supplied policy rather
    /// than from the scheduler's own checks.
    pub fn is_policy_failure(&self) -> bool {
        matches!(
            self,
            ScheduleError::AnswerPolicy { .. } | ScheduleError::OrderPolicy(_)
        )
    }
}

/// Errors returned by a running [`ReviewService`](crate::service::ReviewService).
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The event was applied and failed.
    #[error(transparent)]
    Schedule(#[from] ScheduleError),

    /// The service task is no longer running.
    #[error("review service stopped")]
    Stopped,
}
