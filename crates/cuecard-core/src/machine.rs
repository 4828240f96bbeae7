//! Review session state machine.
//!
//! The machine is an explicit finite-state machine: a [`StateValue`] tag
//! plus a [`ReviewContext`]. [`Scheduler::send`] applies one [`Event`] to
//! completion and returns the resulting [`Transition`], including any timer
//! [`Effect`]s the host has to carry out.
//!
//! ```text
//! idle --START--> session.prompt --ANSWER--> session.feedback
//!                      ^    |                      |
//!                      |    +--(review complete)---+--> completed --RESTART--> idle
//!                      +-------------PROMPT--------+
//! ```

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::answer::{process_answer, AnswerInput, AnswerOutcome, AnswerPolicy};
use crate::dates::{local_day, Clock, SystemClock};
use crate::error::ScheduleError;
use crate::model::{Prompt, PromptData, PromptId, PromptPatch};
use crate::queue::{build_review_queue, ReviewOrder, Shuffle};
use crate::store::{AddConflict, PromptStore};

// ---------------------------------------------------------------------------
// States, events, effects
// ---------------------------------------------------------------------------

/// Observable machine state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StateValue {
    Idle,
    SessionPrompt,
    SessionFeedback,
    Completed,
}

impl StateValue {
    /// `true` for both `session.*` states.
    pub fn in_session(self) -> bool {
        matches!(self, StateValue::SessionPrompt | StateValue::SessionFeedback)
    }
}

impl fmt::Display for StateValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StateValue::Idle => write!(f, "idle"),
            StateValue::SessionPrompt => write!(f, "session.prompt"),
            StateValue::SessionFeedback => write!(f, "session.feedback"),
            StateValue::Completed => write!(f, "completed"),
        }
    }
}

/// Identifies one armed answer timeout. A fired timeout only counts while
/// its token is still pending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TimeoutToken(u64);

impl TimeoutToken {
    pub(crate) const fn new(sequence: u64) -> Self {
        Self(sequence)
    }
}

impl fmt::Display for TimeoutToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "timeout#{}", self.0)
    }
}

/// Events the host delivers to the machine.
#[derive(Debug, Clone)]
pub enum Event<D, A> {
    Start,
    AddPrompts(Vec<Prompt<D>>),
    UpdatePrompts(Vec<PromptPatch>),
    RemovePrompts(Vec<PromptId>),
    /// `None` is treated the same as a timed-out answer.
    Answer(Option<A>),
    /// The timer armed by [`Effect::ScheduleAnswerTimeout`] fired.
    AnswerTimeout(TimeoutToken),
    Prompt,
    Restart,
}

impl<D, A> Event<D, A> {
    pub fn name(&self) -> &'static str {
        match self {
            Event::Start => "START",
            Event::AddPrompts(_) => "ADD_PROMPTS",
            Event::UpdatePrompts(_) => "UPDATE_PROMPTS",
            Event::RemovePrompts(_) => "REMOVE_PROMPTS",
            Event::Answer(_) => "ANSWER",
            Event::AnswerTimeout(_) => "ANSWER_TIMEOUT",
            Event::Prompt => "PROMPT",
            Event::Restart => "RESTART",
        }
    }
}

/// Side effects the host must carry out after a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    /// Deliver `Event::AnswerTimeout(token)` after `after` unless cancelled.
    ScheduleAnswerTimeout { token: TimeoutToken, after: Duration },
    /// The timer for `token` must not fire any more.
    CancelAnswerTimeout { token: TimeoutToken },
}

/// Result of applying one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub from: StateValue,
    pub to: StateValue,
    /// `false` when the current state does not handle the event.
    pub handled: bool,
    pub effects: Vec<Effect>,
    /// Set when the event ran the answer pipeline.
    pub answer: Option<AnswerOutcome>,
}

impl Transition {
    fn ignored(state: StateValue) -> Self {
        Self {
            from: state,
            to: state,
            handled: false,
            effects: Vec::new(),
            answer: None,
        }
    }

    pub fn changed(&self) -> bool {
        self.from != self.to
    }
}

// ---------------------------------------------------------------------------
// Context
// ---------------------------------------------------------------------------

/// The prompt currently on screen.
#[derive(Debug, Clone, PartialEq)]
struct Presentation<D> {
    prompt: Prompt<D>,
    first_displayed: DateTime<Utc>,
    timeout: Option<TimeoutToken>,
}

/// Everything the machine owns besides its state tag.
#[derive(Debug, Clone, PartialEq)]
pub struct ReviewContext<D> {
    prompts: PromptStore<D>,
    review_queue: VecDeque<PromptId>,
    presented: Option<Presentation<D>>,
}

impl<D> Default for ReviewContext<D> {
    fn default() -> Self {
        Self {
            prompts: PromptStore::default(),
            review_queue: VecDeque::new(),
            presented: None,
        }
    }
}

impl<D> ReviewContext<D> {
    pub fn prompts(&self) -> &PromptStore<D> {
        &self.prompts
    }

    pub fn review_queue(&self) -> &VecDeque<PromptId> {
        &self.review_queue
    }

    pub fn current_prompt(&self) -> Option<&Prompt<D>> {
        self.presented.as_ref().map(|p| &p.prompt)
    }

    pub fn prompt_first_displayed(&self) -> Option<DateTime<Utc>> {
        self.presented.as_ref().map(|p| p.first_displayed)
    }

    pub fn pending_timeout(&self) -> Option<TimeoutToken> {
        self.presented.as_ref().and_then(|p| p.timeout)
    }

    /// Guard: nothing left to present.
    pub fn is_review_complete(&self) -> bool {
        self.review_queue.is_empty() && self.presented.is_none()
    }
}

/// Serializable store + queue, enough to rebuild a machine in `idle`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound(
    serialize = "D: Serialize",
    deserialize = "D: serde::de::DeserializeOwned"
))]
pub struct SchedulerSnapshot<D> {
    pub prompts: PromptStore<D>,
    #[serde(default)]
    pub review_queue: Vec<PromptId>,
}

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// Policies and settings supplied at construction.
pub struct SchedulerOptions<D, A> {
    process_answer: Box<dyn AnswerPolicy<D, A>>,
    order: Box<dyn ReviewOrder<D>>,
    time_to_answer: Option<Duration>,
    on_duplicate: AddConflict,
    clock: Arc<dyn Clock>,
}

impl<D: 'static, A: 'static> SchedulerOptions<D, A> {
    /// Options with the given answer policy, shuffled order, no answer
    /// timeout, and duplicate ids rejected.
    pub fn new(process_answer: impl AnswerPolicy<D, A> + 'static) -> Self {
        Self {
            process_answer: Box::new(process_answer),
            order: Box::new(Shuffle::new()),
            time_to_answer: None,
            on_duplicate: AddConflict::default(),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_order(mut self, order: impl ReviewOrder<D> + 'static) -> Self {
        self.order = Box::new(order);
        self
    }

    pub fn with_boxed_order(mut self, order: Box<dyn ReviewOrder<D>>) -> Self {
        self.order = order;
        self
    }

    pub fn with_time_to_answer(mut self, time_to_answer: Option<Duration>) -> Self {
        self.time_to_answer = time_to_answer;
        self
    }

    pub fn with_add_conflict(mut self, on_duplicate: AddConflict) -> Self {
        self.on_duplicate = on_duplicate;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}

impl<D, A> SchedulerOptions<D, A> {
    pub fn time_to_answer(&self) -> Option<Duration> {
        self.time_to_answer
    }

    pub fn add_conflict(&self) -> AddConflict {
        self.on_duplicate
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }
}

impl<D, A> fmt::Debug for SchedulerOptions<D, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchedulerOptions")
            .field("time_to_answer", &self.time_to_answer)
            .field("on_duplicate", &self.on_duplicate)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

/// The review session state machine.
pub struct Scheduler<D, A> {
    state: StateValue,
    context: ReviewContext<D>,
    options: SchedulerOptions<D, A>,
    next_token: u64,
}

impl<D: PromptData, A> Scheduler<D, A> {
    pub fn new(options: SchedulerOptions<D, A>) -> Self {
        Self {
            state: StateValue::Idle,
            context: ReviewContext::default(),
            options,
            next_token: 0,
        }
    }

    /// A machine seeded with `prompts`, with its queue already built.
    pub fn with_prompts(
        options: SchedulerOptions<D, A>,
        prompts: Vec<Prompt<D>>,
    ) -> Result<Self, ScheduleError> {
        let mut scheduler = Self::new(options);
        scheduler.add_prompts(prompts)?;
        Ok(scheduler)
    }

    /// Rebuild an idle machine from a snapshot. Queue entries whose prompt
    /// is missing from the snapshot are dropped.
    pub fn restore(options: SchedulerOptions<D, A>, snapshot: SchedulerSnapshot<D>) -> Self {
        let SchedulerSnapshot {
            prompts,
            review_queue,
        } = snapshot;
        let review_queue = review_queue
            .into_iter()
            .filter(|id| prompts.contains(id))
            .collect();
        let mut scheduler = Self::new(options);
        scheduler.context.prompts = prompts;
        scheduler.context.review_queue = review_queue;
        scheduler
    }

    pub fn snapshot(&self) -> SchedulerSnapshot<D> {
        SchedulerSnapshot {
            prompts: self.context.prompts.clone(),
            review_queue: self.context.review_queue.iter().cloned().collect(),
        }
    }

    pub fn state(&self) -> StateValue {
        self.state
    }

    pub fn context(&self) -> &ReviewContext<D> {
        &self.context
    }

    pub fn options(&self) -> &SchedulerOptions<D, A> {
        &self.options
    }

    pub fn is_review_complete(&self) -> bool {
        self.context.is_review_complete()
    }

    /// Apply one event.
    ///
    /// Events the current state does not handle are ignored. On error the
    /// machine is left exactly as it was before the event.
    pub fn send(&mut self, event: Event<D, A>) -> Result<Transition, ScheduleError> {
        use StateValue::{Completed, Idle, SessionFeedback, SessionPrompt};

        let from = self.state;
        let name = event.name();
        let mut effects = Vec::new();
        let mut answer = None;

        match (from, event) {
            (Idle, Event::Start) => {
                tracing::info!(due = self.context.review_queue.len(), "review session started");
                self.enter_prompt(&mut effects);
            }
            (Idle | Completed, Event::AddPrompts(prompts)) => self.add_prompts(prompts)?,
            (Idle | Completed, Event::UpdatePrompts(patches)) => self.update_prompts(&patches)?,
            (Idle | Completed, Event::RemovePrompts(ids)) => self.remove_prompts(&ids)?,
            (SessionPrompt, Event::Answer(given)) => {
                let Some(outcome) = self.answer(given, &mut effects)? else {
                    return Ok(self.ignore(name));
                };
                answer = Some(outcome);
            }
            (SessionPrompt, Event::AnswerTimeout(token))
                if self.context.pending_timeout() == Some(token) =>
            {
                tracing::debug!(%token, "answer timed out");
                let Some(outcome) = self.answer(None, &mut effects)? else {
                    return Ok(self.ignore(name));
                };
                answer = Some(outcome);
            }
            (SessionFeedback, Event::Prompt) => self.enter_prompt(&mut effects),
            (Completed, Event::Restart) => self.state = Idle,
            _ => return Ok(self.ignore(name)),
        }

        tracing::debug!(event = name, %from, to = %self.state, "transition");
        Ok(Transition {
            from,
            to: self.state,
            handled: true,
            effects,
            answer,
        })
    }

    fn ignore(&self, event: &str) -> Transition {
        tracing::debug!(event, state = %self.state, "event not handled in this state, ignoring");
        Transition::ignored(self.state)
    }

    fn today(&self) -> NaiveDate {
        local_day(self.options.clock.now())
    }

    fn rebuild_queue(&self, prompts: &PromptStore<D>) -> Result<VecDeque<PromptId>, ScheduleError> {
        build_review_queue(prompts, self.options.order.as_ref(), self.today()).map(VecDeque::from)
    }

    // Store mutations stage on a copy so a failing rebuild leaves the
    // context untouched.

    fn add_prompts(&mut self, incoming: Vec<Prompt<D>>) -> Result<(), ScheduleError> {
        let mut prompts = self.context.prompts.clone();
        let added = prompts.add(incoming, self.options.on_duplicate)?;
        let review_queue = self.rebuild_queue(&prompts)?;
        tracing::debug!(added, due = review_queue.len(), "prompts added");
        self.commit(prompts, review_queue);
        Ok(())
    }

    fn update_prompts(&mut self, patches: &[PromptPatch]) -> Result<(), ScheduleError> {
        let mut prompts = self.context.prompts.clone();
        let updated = prompts.update(patches)?;
        let review_queue = self.rebuild_queue(&prompts)?;
        tracing::debug!(updated, due = review_queue.len(), "prompts updated");
        self.commit(prompts, review_queue);
        Ok(())
    }

    fn remove_prompts(&mut self, ids: &[PromptId]) -> Result<(), ScheduleError> {
        let mut prompts = self.context.prompts.clone();
        let removed = prompts.remove(ids);
        let review_queue = self.rebuild_queue(&prompts)?;
        tracing::debug!(removed, due = review_queue.len(), "prompts removed");
        self.commit(prompts, review_queue);
        Ok(())
    }

    fn commit(&mut self, prompts: PromptStore<D>, review_queue: VecDeque<PromptId>) {
        self.context.prompts = prompts;
        self.context.review_queue = review_queue;
    }

    /// Enter `session.prompt`: complete the session or present the queue head.
    fn enter_prompt(&mut self, effects: &mut Vec<Effect>) {
        self.state = StateValue::SessionPrompt;

        if self.context.is_review_complete() {
            self.complete();
            return;
        }

        while let Some(id) = self.context.review_queue.pop_front() {
            let Some(prompt) = self.context.prompts.get(&id).cloned() else {
                tracing::warn!(%id, "queued prompt no longer stored, skipping");
                continue;
            };

            let timeout = self.options.time_to_answer.map(|after| {
                let token = self.issue_token();
                effects.push(Effect::ScheduleAnswerTimeout { token, after });
                token
            });

            tracing::debug!(%id, remaining = self.context.review_queue.len(), "presenting prompt");
            self.context.presented = Some(Presentation {
                prompt,
                first_displayed: self.options.clock.now(),
                timeout,
            });
            return;
        }

        self.complete();
    }

    fn complete(&mut self) {
        self.state = StateValue::Completed;
        tracing::info!(prompts = self.context.prompts.len(), "review session completed");
    }

    fn issue_token(&mut self) -> TimeoutToken {
        self.next_token += 1;
        TimeoutToken::new(self.next_token)
    }

    /// Run the answer pipeline on the current prompt and move to feedback.
    /// Returns `None` when there is no current prompt.
    fn answer(
        &mut self,
        given: Option<A>,
        effects: &mut Vec<Effect>,
    ) -> Result<Option<AnswerOutcome>, ScheduleError> {
        let today = self.today();
        let now = self.options.clock.now();
        let Some(presented) = self.context.presented.as_ref() else {
            return Ok(None);
        };

        let outcome = process_answer(
            self.options.process_answer.as_ref(),
            &mut self.context.prompts,
            &mut self.context.review_queue,
            AnswerInput {
                prompt: &presented.prompt,
                answer: given,
                first_displayed: presented.first_displayed,
                now,
                today,
            },
        )?;

        if let Some(presented) = self.context.presented.take() {
            if let Some(token) = presented.timeout {
                effects.push(Effect::CancelAnswerTimeout { token });
            }
        }
        self.state = StateValue::SessionFeedback;
        Ok(Some(outcome))
    }
}

impl<D, A> fmt::Debug for Scheduler<D, A>
where
    D: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("state", &self.state)
            .field("context", &self.context)
            .field("options", &self.options)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dates::{change_date, todays_date, ManualClock};
    use crate::model::AnswerStatistics;
    use crate::queue::DueDateOrder;
    use chrono::TimeZone;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Card {
        front: String,
        back: String,
        iteration: u32,
    }

    fn clock() -> ManualClock {
        ManualClock::new(Utc.with_ymd_and_hms(2026, 6, 15, 12, 0, 0).unwrap())
    }

    fn card(clock: &ManualClock, id: &str, days: i64) -> Prompt<Card> {
        Prompt::new(
            id,
            change_date(todays_date(clock), days).unwrap(),
            Card {
                front: "Front".into(),
                back: "Back".into(),
                iteration: 2,
            },
        )
    }

    fn scheduler(clock: &ManualClock) -> Scheduler<Card, bool> {
        let today = todays_date(clock);
        let policy = move |prompt: &Prompt<Card>,
                           answer: Option<bool>,
                           _: AnswerStatistics|
              -> anyhow::Result<Prompt<Card>> {
            let mut prompt = prompt.clone();
            if answer == Some(true) {
                prompt.next_review_date =
                    change_date(prompt.next_review_date, prompt.data.iteration as i64).unwrap();
                prompt.data.iteration = prompt.data.iteration.saturating_pow(2);
            } else {
                prompt.next_review_date = today;
            }
            Ok(prompt)
        };
        Scheduler::new(
            SchedulerOptions::new(policy)
                .with_order(DueDateOrder)
                .with_clock(Arc::new(clock.clone())),
        )
    }

    #[test]
    fn starts_idle_and_empty() {
        let machine = scheduler(&clock());
        assert_eq!(machine.state(), StateValue::Idle);
        assert!(machine.context().prompts().is_empty());
        assert!(machine.context().current_prompt().is_none());
        assert!(machine.is_review_complete());
    }

    #[test]
    fn start_with_empty_queue_completes_immediately() {
        let mut machine = scheduler(&clock());
        let transition = machine.send(Event::Start).unwrap();
        assert_eq!(transition.to, StateValue::Completed);
        assert!(machine.context().current_prompt().is_none());
    }

    #[test]
    fn start_presents_queue_head() {
        let clock = clock();
        let mut machine = scheduler(&clock);
        machine
            .send(Event::AddPrompts(vec![card(&clock, "a", -1), card(&clock, "b", -4)]))
            .unwrap();

        machine.send(Event::Start).unwrap();

        assert_eq!(machine.state(), StateValue::SessionPrompt);
        assert_eq!(machine.context().current_prompt().unwrap().id, "b");
        assert_eq!(machine.context().review_queue(), &VecDeque::from(vec!["a".to_string()]));
        assert_eq!(machine.context().prompt_first_displayed(), Some(clock.now()));
    }

    #[test]
    fn answer_reports_elapsed_time_and_clears_prompt() {
        let clock = clock();
        let mut machine = scheduler(&clock);
        machine.send(Event::AddPrompts(vec![card(&clock, "a", 0)])).unwrap();
        machine.send(Event::Start).unwrap();

        clock.advance(Duration::from_millis(1200));
        let transition = machine.send(Event::Answer(Some(true))).unwrap();

        assert_eq!(transition.to, StateValue::SessionFeedback);
        let outcome = transition.answer.unwrap();
        assert_eq!(outcome.statistics.time_ms, 1200);
        assert!(!outcome.requeued);
        assert!(machine.context().current_prompt().is_none());
        assert!(machine.context().prompt_first_displayed().is_none());
    }

    #[test]
    fn full_session_walks_every_due_prompt() {
        let clock = clock();
        let mut machine = scheduler(&clock);
        machine
            .send(Event::AddPrompts(vec![
                card(&clock, "a", -1),
                card(&clock, "b", 0),
                card(&clock, "later", 3),
            ]))
            .unwrap();

        let mut seen = Vec::new();
        machine.send(Event::Start).unwrap();
        while machine.state() == StateValue::SessionPrompt {
            seen.push(machine.context().current_prompt().unwrap().id.clone());
            machine.send(Event::Answer(Some(true))).unwrap();
            machine.send(Event::Prompt).unwrap();
        }

        assert_eq!(seen, vec!["a", "b"]);
        assert_eq!(machine.state(), StateValue::Completed);

        machine.send(Event::Restart).unwrap();
        assert_eq!(machine.state(), StateValue::Idle);
    }

    #[test]
    fn events_outside_their_state_are_ignored() {
        let clock = clock();
        let mut machine = scheduler(&clock);

        for event in [Event::Answer(Some(true)), Event::Prompt, Event::Restart] {
            let transition = machine.send(event).unwrap();
            assert!(!transition.handled);
            assert_eq!(machine.state(), StateValue::Idle);
        }

        machine.send(Event::AddPrompts(vec![card(&clock, "a", 0)])).unwrap();
        machine.send(Event::Start).unwrap();

        let before = machine.context().clone();
        for event in [
            Event::Start,
            Event::Prompt,
            Event::Restart,
            Event::AddPrompts(vec![card(&clock, "b", 0)]),
            Event::RemovePrompts(vec!["a".into()]),
            Event::UpdatePrompts(vec![PromptPatch::new("a").set("front", "X")]),
        ] {
            let transition = machine.send(event).unwrap();
            assert!(!transition.handled);
        }
        assert_eq!(machine.state(), StateValue::SessionPrompt);
        assert_eq!(machine.context(), &before);
    }

    #[test]
    fn timeout_is_scheduled_and_cancelled_by_answer() {
        let clock = clock();
        let today = todays_date(&clock);
        let policy = move |p: &Prompt<Card>,
                           _: Option<bool>,
                           _: AnswerStatistics|
              -> anyhow::Result<Prompt<Card>> {
            let mut p = p.clone();
            p.next_review_date = change_date(today, 1).unwrap();
            Ok(p)
        };
        let mut machine: Scheduler<Card, bool> = Scheduler::new(
            SchedulerOptions::new(policy)
                .with_order(DueDateOrder)
                .with_clock(Arc::new(clock.clone()))
                .with_time_to_answer(Some(Duration::from_secs(10))),
        );
        machine.send(Event::AddPrompts(vec![card(&clock, "a", 0)])).unwrap();

        let started = machine.send(Event::Start).unwrap();
        let (token, after) = match started.effects.as_slice() {
            [Effect::ScheduleAnswerTimeout { token, after }] => (*token, *after),
            other => panic!("expected one scheduled timeout, got {other:?}"),
        };
        assert_eq!(after, Duration::from_secs(10));
        assert_eq!(machine.context().pending_timeout(), Some(token));

        let answered = machine.send(Event::Answer(Some(false))).unwrap();
        assert_eq!(answered.effects, vec![Effect::CancelAnswerTimeout { token }]);

        // A late timer must not count as a second answer.
        let late = machine.send(Event::AnswerTimeout(token)).unwrap();
        assert!(!late.handled);
        assert_eq!(machine.state(), StateValue::SessionFeedback);
    }

    #[test]
    fn timeout_answers_with_none() {
        let clock = clock();
        let mut machine: Scheduler<Card, bool> = Scheduler::new(
            SchedulerOptions::new(
                |p: &Prompt<Card>, a: Option<bool>, _: AnswerStatistics| -> anyhow::Result<Prompt<Card>> {
                    anyhow::ensure!(a.is_none(), "timeout must not carry an answer");
                    let mut p = p.clone();
                    p.next_review_date = change_date(p.next_review_date, 30).unwrap();
                    Ok(p)
                },
            )
            .with_clock(Arc::new(clock.clone()))
            .with_time_to_answer(Some(Duration::from_secs(5))),
        );
        machine.send(Event::AddPrompts(vec![card(&clock, "a", 0)])).unwrap();
        machine.send(Event::Start).unwrap();

        let stale = TimeoutToken::new(999);
        assert!(!machine.send(Event::AnswerTimeout(stale)).unwrap().handled);
        assert_eq!(machine.state(), StateValue::SessionPrompt);

        let token = machine.context().pending_timeout().unwrap();
        let transition = machine.send(Event::AnswerTimeout(token)).unwrap();
        assert!(transition.handled);
        assert_eq!(transition.to, StateValue::SessionFeedback);
        assert!(!transition.answer.unwrap().requeued);
    }

    #[test]
    fn each_presentation_gets_a_fresh_token() {
        let clock = clock();
        let today = todays_date(&clock);
        let mut machine: Scheduler<Card, bool> = Scheduler::new(
            SchedulerOptions::new(
                move |p: &Prompt<Card>, _: Option<bool>, _: AnswerStatistics| -> anyhow::Result<Prompt<Card>> {
                    let mut p = p.clone();
                    p.next_review_date = today;
                    Ok(p)
                },
            )
            .with_clock(Arc::new(clock.clone()))
            .with_time_to_answer(Some(Duration::from_secs(1))),
        );
        machine.send(Event::AddPrompts(vec![card(&clock, "a", 0)])).unwrap();
        machine.send(Event::Start).unwrap();
        let first = machine.context().pending_timeout().unwrap();
        machine.send(Event::Answer(None)).unwrap();
        machine.send(Event::Prompt).unwrap();
        let second = machine.context().pending_timeout().unwrap();

        assert_ne!(first, second);
        assert!(!machine.send(Event::AnswerTimeout(first)).unwrap().handled);
        assert!(machine.send(Event::AnswerTimeout(second)).unwrap().handled);
    }

    #[test]
    fn failing_policy_keeps_prompt_presented() {
        let clock = clock();
        let mut machine: Scheduler<Card, bool> = Scheduler::new(
            SchedulerOptions::new(
                |_: &Prompt<Card>, _: Option<bool>, _: AnswerStatistics| -> anyhow::Result<Prompt<Card>> {
                    anyhow::bail!("policy exploded")
                },
            )
            .with_clock(Arc::new(clock.clone())),
        );
        machine.send(Event::AddPrompts(vec![card(&clock, "a", 0)])).unwrap();
        machine.send(Event::Start).unwrap();
        let before = machine.context().clone();

        let err = machine.send(Event::Answer(Some(true))).unwrap_err();

        assert!(err.is_policy_failure());
        assert_eq!(machine.state(), StateValue::SessionPrompt);
        assert_eq!(machine.context(), &before);
    }

    #[test]
    fn failing_order_leaves_store_untouched() {
        let clock = clock();
        let mut machine: Scheduler<Card, bool> = Scheduler::new(
            SchedulerOptions::new(
                |p: &Prompt<Card>, _: Option<bool>, _: AnswerStatistics| -> anyhow::Result<Prompt<Card>> {
                    Ok(p.clone())
                },
            )
            .with_order(|due: &[&Prompt<Card>]| -> anyhow::Result<Vec<PromptId>> {
                anyhow::ensure!(due.len() < 2, "too many prompts");
                Ok(due.iter().map(|p| p.id.clone()).collect())
            })
            .with_clock(Arc::new(clock.clone())),
        );
        machine.send(Event::AddPrompts(vec![card(&clock, "a", 0)])).unwrap();

        let err = machine
            .send(Event::AddPrompts(vec![card(&clock, "b", 0)]))
            .unwrap_err();

        assert!(matches!(err, ScheduleError::OrderPolicy(_)));
        assert_eq!(machine.context().prompts().len(), 1);
        assert_eq!(machine.context().review_queue().len(), 1);
    }

    #[test]
    fn prompts_can_change_after_completion() {
        let clock = clock();
        let mut machine = scheduler(&clock);
        machine.send(Event::Start).unwrap();
        assert_eq!(machine.state(), StateValue::Completed);

        machine.send(Event::AddPrompts(vec![card(&clock, "a", 0)])).unwrap();
        assert_eq!(machine.context().review_queue().len(), 1);

        machine.send(Event::RemovePrompts(vec!["a".into()])).unwrap();
        assert!(machine.context().review_queue().is_empty());
        assert_eq!(machine.state(), StateValue::Completed);
    }

    #[test]
    fn restore_drops_dangling_queue_entries() {
        let clock = clock();
        let machine = Scheduler::<Card, bool>::with_prompts(
            SchedulerOptions::new(
                |p: &Prompt<Card>, _: Option<bool>, _: AnswerStatistics| -> anyhow::Result<Prompt<Card>> {
                    Ok(p.clone())
                },
            )
            .with_clock(Arc::new(clock.clone())),
            vec![card(&clock, "a", 0)],
        )
        .unwrap();
        let mut snapshot = machine.snapshot();
        snapshot.review_queue.push("ghost".into());

        let restored = Scheduler::restore(
            SchedulerOptions::new(
                |p: &Prompt<Card>, _: Option<bool>, _: AnswerStatistics| -> anyhow::Result<Prompt<Card>> {
                    Ok(p.clone())
                },
            ),
            snapshot,
        );
        assert_eq!(restored.context().review_queue(), &VecDeque::from(vec!["a".to_string()]));
    }

    #[test]
    fn state_value_display() {
        assert_eq!(StateValue::Idle.to_string(), "idle");
        assert_eq!(StateValue::SessionPrompt.to_string(), "session.prompt");
        assert_eq!(StateValue::SessionFeedback.to_string(), "session.feedback");
        assert_eq!(StateValue::Completed.to_string(), "completed");
        assert!(StateValue::SessionFeedback.in_session());
        assert!(!StateValue::Completed.in_session());
    }
}
