//! cuecard-core: review scheduling core.
//!
//! This crate defines the prompt model, the due-date queue builder, the
//! answer processing pipeline, and the review session state machine that
//! ties them together. Hosts supply the answer policy and render the state.

pub mod answer;
pub mod config;
pub mod dates;
pub mod error;
pub mod machine;
pub mod model;
pub mod queue;
pub mod service;
pub mod store;

pub use answer::{AnswerOutcome, AnswerPolicy};
pub use error::{ScheduleError, ServiceError};
pub use machine::{
    Effect, Event, ReviewContext, Scheduler, SchedulerOptions, SchedulerSnapshot, StateValue,
    TimeoutToken, Transition,
};
pub use model::{AnswerStatistics, Prompt, PromptData, PromptId, PromptPatch};
pub use queue::{DueDateOrder, ReviewOrder, Shuffle};
pub use service::{Observed, ReviewService};
pub use store::{AddConflict, PromptStore};
