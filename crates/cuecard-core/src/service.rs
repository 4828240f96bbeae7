//! Async driver for a [`Scheduler`].
//!
//! The service owns the machine on a tokio task, applies events one at a
//! time, arms the answer timeout requested through [`Effect`]s, and
//! publishes the observable state on a `watch` channel.

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::Instrument;
use uuid::Uuid;

use crate::answer::AnswerOutcome;
use crate::error::{ScheduleError, ServiceError};
use crate::machine::{Effect, Event, Scheduler, SchedulerSnapshot, StateValue, TimeoutToken, Transition};
use crate::model::{Prompt, PromptData, PromptId};

const COMMAND_BUFFER: usize = 32;

/// What a host renders from.
#[derive(Debug, Clone, PartialEq)]
pub struct Observed<D> {
    pub state: StateValue,
    pub current_prompt: Option<Prompt<D>>,
    pub prompt_first_displayed: Option<DateTime<Utc>>,
    pub review_queue: Vec<PromptId>,
    /// Outcome of the most recent answer, kept until the next one.
    pub last_answer: Option<AnswerOutcome>,
    /// Set when a fired answer timeout could not be applied. The prompt
    /// stays current with no timer armed; cleared by the next handled event.
    pub last_error: Option<String>,
}

impl<D: PromptData> Observed<D> {
    fn capture<A>(scheduler: &Scheduler<D, A>, last_answer: Option<AnswerOutcome>) -> Self {
        let context = scheduler.context();
        Self {
            state: scheduler.state(),
            current_prompt: context.current_prompt().cloned(),
            prompt_first_displayed: context.prompt_first_displayed(),
            review_queue: context.review_queue().iter().cloned().collect(),
            last_answer,
            last_error: None,
        }
    }
}

enum Command<D, A> {
    Send {
        event: Event<D, A>,
        reply: oneshot::Sender<Result<Transition, ScheduleError>>,
    },
    Snapshot {
        reply: oneshot::Sender<SchedulerSnapshot<D>>,
    },
}

/// Handle to a scheduler running on a tokio task.
pub struct ReviewService<D, A> {
    id: Uuid,
    commands: mpsc::Sender<Command<D, A>>,
    observed: watch::Receiver<Observed<D>>,
    task: JoinHandle<Scheduler<D, A>>,
}

impl<D: PromptData, A: Send + 'static> ReviewService<D, A> {
    /// Move `scheduler` onto a new task. Must be called inside a tokio runtime.
    pub fn spawn(scheduler: Scheduler<D, A>) -> Self {
        let id = Uuid::new_v4();
        let (commands, receiver) = mpsc::channel(COMMAND_BUFFER);
        let (publisher, observed) = watch::channel(Observed::capture(&scheduler, None));

        let span = tracing::info_span!("review_service", service = %id);
        let task = tokio::spawn(run(scheduler, receiver, publisher).instrument(span));

        Self {
            id,
            commands,
            observed,
            task,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Deliver an event and wait for it to be applied.
    pub async fn send(&self, event: Event<D, A>) -> Result<Transition, ServiceError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(Command::Send { event, reply })
            .await
            .map_err(|_| ServiceError::Stopped)?;
        let transition = response.await.map_err(|_| ServiceError::Stopped)??;
        Ok(transition)
    }

    pub async fn snapshot(&self) -> Result<SchedulerSnapshot<D>, ServiceError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(Command::Snapshot { reply })
            .await
            .map_err(|_| ServiceError::Stopped)?;
        response.await.map_err(|_| ServiceError::Stopped)
    }

    /// Latest published state.
    pub fn observed(&self) -> Observed<D> {
        self.observed.borrow().clone()
    }

    /// A receiver that wakes on every handled event, including timeouts.
    pub fn subscribe(&self) -> watch::Receiver<Observed<D>> {
        self.observed.clone()
    }

    /// Stop the task and hand the machine back.
    pub async fn shutdown(self) -> Result<Scheduler<D, A>, ServiceError> {
        drop(self.commands);
        self.task.await.map_err(|e| {
            tracing::error!("review service task failed: {e}");
            ServiceError::Stopped
        })
    }
}

async fn run<D: PromptData, A>(
    mut scheduler: Scheduler<D, A>,
    mut commands: mpsc::Receiver<Command<D, A>>,
    publisher: watch::Sender<Observed<D>>,
) -> Scheduler<D, A> {
    let mut timer: Option<(TimeoutToken, Instant)> = None;
    let mut last_answer = None;

    loop {
        let deadline = timer.map(|(_, at)| at);

        tokio::select! {
            biased;

            command = commands.recv() => {
                let Some(command) = command else { break };
                match command {
                    Command::Send { event, reply } => {
                        let result = scheduler.send(event);
                        if let Ok(transition) = &result {
                            record(&scheduler, transition, &mut timer, &mut last_answer, &publisher);
                        }
                        // The caller may have stopped waiting; the event still applied.
                        let _ = reply.send(result);
                    }
                    Command::Snapshot { reply } => {
                        let _ = reply.send(scheduler.snapshot());
                    }
                }
            }

            _ = sleep_until(deadline) => {
                let Some((token, _)) = timer.take() else { continue };
                match scheduler.send(Event::AnswerTimeout(token)) {
                    Ok(transition) => {
                        record(&scheduler, &transition, &mut timer, &mut last_answer, &publisher);
                    }
                    Err(e) => {
                        tracing::error!(%token, "answer timeout failed: {e}");
                        publisher.send_replace(Observed {
                            last_error: Some(e.to_string()),
                            ..Observed::capture(&scheduler, last_answer.clone())
                        });
                    }
                }
            }
        }
    }

    tracing::debug!(state = %scheduler.state(), "review service stopped");
    scheduler
}

fn record<D: PromptData, A>(
    scheduler: &Scheduler<D, A>,
    transition: &Transition,
    timer: &mut Option<(TimeoutToken, Instant)>,
    last_answer: &mut Option<AnswerOutcome>,
    publisher: &watch::Sender<Observed<D>>,
) {
    if !transition.handled {
        return;
    }
    apply_effects(&transition.effects, timer);
    if transition.answer.is_some() {
        last_answer.clone_from(&transition.answer);
    }
    publisher.send_replace(Observed::capture(scheduler, last_answer.clone()));
}

fn apply_effects(effects: &[Effect], timer: &mut Option<(TimeoutToken, Instant)>) {
    for effect in effects {
        match *effect {
            Effect::ScheduleAnswerTimeout { token, after } => {
                *timer = Some((token, Instant::now() + after));
            }
            Effect::CancelAnswerTimeout { token } => {
                if matches!(timer, Some((armed, _)) if *armed == token) {
                    *timer = None;
                }
            }
        }
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}
