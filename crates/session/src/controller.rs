//! The turn loop — one session's top-level state machine.
//!
//! A controller owns one generation of one session: its context log, its
//! pending queue, and its preference set. Nothing else touches them; all
//! outside contact goes through the signal mailbox. The loop suspends in
//! `AwaitingWork`, drains pending messages into the log, runs
//! Thought/Action/Observation rounds until a text outcome, delivers the
//! text, and decides whether to checkpoint-and-restart.
//!
//! Step failures are soft: they become error entries in the log and the
//! loop retries with the annotated context. The one fatal condition is a
//! model response that is neither text nor a tool call.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use palaver_core::error::SessionError;
use palaver_core::{
    Checkpoint, ContextEntry, ContextLog, DeliverySink, DomainEvent, Error, EventBus, Role,
    SessionPrefs, SessionQuery, SessionSignal,
};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::budget::BudgetMonitor;
use crate::compactor::Compactor;
use crate::executor::ActionExecutor;
use crate::observer::ObservationStep;
use crate::queue::PendingQueue;
use crate::thought::{ThoughtOutcome, ThoughtStep};

/// Tunables for one session's turn loop.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Token ceiling that triggers compaction after a text outcome
    pub token_ceiling: usize,

    /// Turn count per generation that triggers a restart regardless of
    /// budget (stands in for a host-suggested restart)
    pub restart_after_turns: u32,

    /// How many recent entries the observation step sees
    pub observation_window: usize,

    /// Raw tool results at or under this many bytes skip condensation
    pub observation_passthrough: usize,

    /// Timeout the controller enforces around each tool execution
    pub tool_timeout: Duration,

    /// Transport retries for each model call site
    pub thought_retries: u32,

    /// Backoff between transport retries
    pub retry_backoff: Duration,

    /// Pause after a recoverable step failure before re-reasoning, so a
    /// hard-down collaborator degrades to a slow retry loop
    pub error_backoff: Duration,

    /// Max tokens per model response
    pub max_response_tokens: Option<u32>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            token_ceiling: 16_000,
            restart_after_turns: 40,
            observation_window: 6,
            observation_passthrough: 600,
            tool_timeout: Duration::from_secs(60),
            thought_retries: 2,
            retry_backoff: Duration::from_millis(500),
            error_backoff: Duration::from_secs(2),
            max_response_tokens: None,
        }
    }
}

/// Everything that outlives a single generation.
///
/// A fresh controller is built per generation from a [`Checkpoint`] plus
/// these deps; the deps are handed back when the generation ends so the
/// respawn harness can carry them forward.
pub struct SessionDeps {
    pub session_id: String,
    pub signals: mpsc::UnboundedReceiver<SessionSignal>,
    pub prefs: SessionPrefs,
    /// Correlation id → answering assistant text (best-effort)
    pub answered: HashMap<String, String>,
    pub thought: ThoughtStep,
    pub executor: ActionExecutor,
    pub observer: ObservationStep,
    pub compactor: Compactor,
    pub budget: BudgetMonitor,
    pub sink: Arc<dyn DeliverySink>,
    pub events: Arc<EventBus>,
    pub config: SessionConfig,
}

/// How a generation ended.
pub enum GenerationOutcome {
    /// Checkpoint taken — respawn a fresh controller from it
    Restart(Checkpoint),

    /// Clean terminal state — the session is done
    Exited,
}

/// One generation of one session's turn loop.
pub struct SessionController {
    deps: SessionDeps,
    generation: u64,
    log: ContextLog,
    queue: PendingQueue,
    exit_requested: bool,
    checkpoint_requested: bool,
    turns: u32,
}

impl SessionController {
    /// Build a fresh controller from a generation boundary snapshot.
    pub fn from_checkpoint(deps: SessionDeps, checkpoint: Checkpoint) -> Self {
        Self {
            generation: checkpoint.generation,
            log: ContextLog::seeded_from(checkpoint.compacted),
            queue: PendingQueue::reseed(checkpoint.pending),
            exit_requested: checkpoint.exit_requested,
            checkpoint_requested: false,
            turns: 0,
            deps,
        }
    }

    /// Run this generation to its end.
    ///
    /// Returns the deps alongside the outcome so the harness can respawn.
    /// The only error path is the fatal malformed-response condition.
    pub async fn run(mut self) -> Result<(GenerationOutcome, SessionDeps), Error> {
        info!(
            session = %self.deps.session_id,
            generation = self.generation,
            seeded = self.log.len(),
            pending = self.queue.len(),
            "Generation started"
        );

        loop {
            // AwaitingWork — suspend until there is something to do.
            self.await_work().await;

            if self.checkpoint_requested {
                self.checkpoint_requested = false;
                if let Some(checkpoint) = self.take_checkpoint().await {
                    return Ok((GenerationOutcome::Restart(checkpoint), self.deps));
                }
                // Compaction failed; checkpoint deferred, keep working.
            }

            if self.exit_requested && self.queue.is_empty() {
                info!(session = %self.deps.session_id, "Session exited");
                self.deps.events.publish(DomainEvent::SessionExited {
                    session_id: self.deps.session_id.clone(),
                    generation: self.generation,
                    timestamp: Utc::now(),
                });
                return Ok((GenerationOutcome::Exited, self.deps));
            }

            if self.queue.is_empty() {
                // Woken for a deferred checkpoint with nothing queued.
                continue;
            }

            // DrainingQueue — everything pending, in arrival order.
            let drained = self.queue.drain_all();
            debug!(count = drained.len(), "Draining pending messages");
            let correlation_ids: Vec<String> =
                drained.iter().map(|m| m.correlation_id.clone()).collect();
            for message in &drained {
                self.log
                    .append(ContextEntry::user_text(message.attributed_text()));
            }

            // Reasoning / ActingOnTool until a text outcome.
            let (text, tool_rounds) = self.run_turn().await?;

            for id in correlation_ids {
                self.deps.answered.insert(id, text.clone());
            }

            // Best-effort delivery; failures never reach the context log.
            if let Err(e) = self
                .deps
                .sink
                .publish(&self.deps.session_id, Role::Assistant, &text)
                .await
            {
                warn!(session = %self.deps.session_id, error = %e, "Delivery sink failed");
            }

            self.turns += 1;
            self.deps.events.publish(DomainEvent::TurnCompleted {
                session_id: self.deps.session_id.clone(),
                generation: self.generation,
                tool_rounds,
                timestamp: Utc::now(),
            });

            // Budget check after every assistant text outcome.
            let status = self.deps.budget.check(&self.log);
            if status.exceeded || self.turns >= self.deps.config.restart_after_turns {
                debug!(
                    estimated = status.estimated,
                    ceiling = status.ceiling,
                    turns = self.turns,
                    "Restart condition met"
                );
                if let Some(checkpoint) = self.take_checkpoint().await {
                    return Ok((GenerationOutcome::Restart(checkpoint), self.deps));
                }
                // Deferred; the generation continues until the next
                // opportunity.
            }

            // If messages arrived mid-turn the queue is already non-empty
            // and await_work returns immediately — no suspension between
            // a text outcome and draining newer messages.
        }
    }

    // ── Waiting & signals ─────────────────────────────────────────────

    /// Suspend until a pending message exists or exit/checkpoint was
    /// requested. A closed mailbox counts as an exit request.
    async fn await_work(&mut self) {
        self.drain_signals();
        while !self.has_work() {
            match self.deps.signals.recv().await {
                Some(signal) => self.handle_signal(signal),
                None => {
                    debug!(session = %self.deps.session_id, "Mailbox closed, exiting");
                    self.exit_requested = true;
                    return;
                }
            }
        }
    }

    fn has_work(&self) -> bool {
        !self.queue.is_empty() || self.exit_requested || self.checkpoint_requested
    }

    /// Observe everything already delivered, in order, without blocking.
    /// Called between steps so mid-turn signals queue up rather than
    /// interrupting an in-flight call.
    fn drain_signals(&mut self) {
        while let Ok(signal) = self.deps.signals.try_recv() {
            self.handle_signal(signal);
        }
    }

    fn handle_signal(&mut self, signal: SessionSignal) {
        match signal {
            SessionSignal::Deliver(message) => {
                self.deps.events.publish(DomainEvent::MessageQueued {
                    session_id: self.deps.session_id.clone(),
                    correlation_id: message.correlation_id.clone(),
                    timestamp: Utc::now(),
                });
                self.queue.enqueue(message);
            }
            SessionSignal::Exit => self.exit_requested = true,
            SessionSignal::ForceCheckpoint => self.checkpoint_requested = true,
            SessionSignal::SetModel(model) => {
                debug!(session = %self.deps.session_id, model = %model, "Model switched");
                self.deps.prefs.model = model;
            }
            SessionSignal::SetFlag { name, value } => {
                self.deps.prefs.flags.insert(name, value);
            }
            SessionSignal::Query(query) => self.answer_query(query),
        }
    }

    fn answer_query(&self, query: SessionQuery) {
        match query {
            SessionQuery::RecentContext { limit, reply } => {
                let _ = reply.send(self.log.last_n(limit).to_vec());
            }
            SessionQuery::ResponseFor {
                correlation_id,
                reply,
            } => {
                let _ = reply.send(self.deps.answered.get(&correlation_id).cloned());
            }
        }
    }

    // ── The turn ──────────────────────────────────────────────────────

    /// Alternate Reasoning and ActingOnTool until a text outcome.
    /// Returns the final text and the number of action rounds taken.
    async fn run_turn(&mut self) -> Result<(String, usize), Error> {
        let manifest = self.deps.executor.manifest();
        let mut tool_rounds = 0usize;

        loop {
            // Signals that arrived mid-step are observed here, in order;
            // messages stay queued until the next drain.
            self.drain_signals();

            debug!(
                session = %self.deps.session_id,
                entries = self.log.len(),
                "Reasoning"
            );
            let outcome = match self
                .deps
                .thought
                .infer(&self.log, &self.deps.prefs, &manifest)
                .await
            {
                Ok(outcome) => outcome,
                Err(Error::Session(SessionError::MalformedResponse(detail))) => {
                    // Fatal and non-retryable: retrying an ambiguous
                    // response is not expected to change its shape.
                    error!(
                        session = %self.deps.session_id,
                        detail = %detail,
                        "Malformed model response, terminating session"
                    );
                    return Err(SessionError::MalformedResponse(detail).into());
                }
                Err(e) => {
                    self.record_step_failure("thought", format!("model call failed: {e}"))
                        .await;
                    continue;
                }
            };

            match outcome {
                ThoughtOutcome::Text(text) => {
                    self.log.append(ContextEntry::assistant_text(&text));
                    return Ok((text, tool_rounds));
                }
                ThoughtOutcome::Action { name, arguments } => {
                    self.log
                        .append(ContextEntry::action_request(&name, &arguments));
                    tool_rounds += 1;

                    let Some(raw) = self.execute_action(&name, arguments).await else {
                        continue;
                    };

                    let window = self
                        .log
                        .last_n(self.deps.config.observation_window)
                        .to_vec();
                    match self
                        .deps
                        .observer
                        .condense(&window, &raw, &self.deps.prefs)
                        .await
                    {
                        Ok(note) => self.log.append(ContextEntry::observation(note)),
                        Err(e) => {
                            self.record_step_failure(
                                "observation",
                                format!("observation failed: {e}"),
                            )
                            .await;
                            continue;
                        }
                    }
                    // Back to Reasoning without waiting for new input.
                }
            }
        }
    }

    /// Execute one action with the caller-enforced timeout.
    /// Failures are recorded as error entries and yield `None`.
    async fn execute_action(&mut self, name: &str, arguments: serde_json::Value) -> Option<String> {
        let started = std::time::Instant::now();
        let result = tokio::time::timeout(
            self.deps.config.tool_timeout,
            self.deps.executor.execute(name, arguments),
        )
        .await;
        let duration_ms = started.elapsed().as_millis() as u64;

        let (success, raw) = match result {
            Ok(Ok(raw)) => (true, Some(raw)),
            Ok(Err(e)) => {
                self.record_step_failure("action", format!("action '{name}' failed: {e}"))
                    .await;
                (false, None)
            }
            Err(_) => {
                self.record_step_failure(
                    "action",
                    format!(
                        "action '{name}' timed out after {}s",
                        self.deps.config.tool_timeout.as_secs()
                    ),
                )
                .await;
                (false, None)
            }
        };

        self.deps.events.publish(DomainEvent::ToolExecuted {
            session_id: self.deps.session_id.clone(),
            tool_name: name.to_string(),
            success,
            duration_ms,
            timestamp: Utc::now(),
        });

        raw
    }

    /// Record a recoverable step failure and pace the retry.
    async fn record_step_failure(&mut self, step: &str, message: String) {
        warn!(
            session = %self.deps.session_id,
            step,
            message = %message,
            "Recoverable step failure"
        );
        self.deps.events.publish(DomainEvent::StepFailed {
            session_id: self.deps.session_id.clone(),
            step: step.to_string(),
            error_message: message.clone(),
            timestamp: Utc::now(),
        });
        self.log.append(ContextEntry::error_note(message));
        if !self.deps.config.error_backoff.is_zero() {
            tokio::time::sleep(self.deps.config.error_backoff).await;
        }
    }

    // ── Checkpointing ─────────────────────────────────────────────────

    /// Compact the log and snapshot the generation boundary.
    ///
    /// Returns `None` when compaction fails — the checkpoint is deferred
    /// and the current generation continues. Failed forced checkpoints
    /// are dropped; the budget check re-triggers compaction on the next
    /// turn.
    async fn take_checkpoint(&mut self) -> Option<Checkpoint> {
        match self
            .deps
            .compactor
            .compact(&self.log, &self.deps.prefs)
            .await
        {
            Ok(compacted) => {
                let pending = self.queue.drain_all();
                info!(
                    session = %self.deps.session_id,
                    generation = self.generation,
                    entries = self.log.len(),
                    compacted = compacted.len(),
                    pending = pending.len(),
                    "Checkpoint taken"
                );
                self.deps.events.publish(DomainEvent::CheckpointTaken {
                    session_id: self.deps.session_id.clone(),
                    generation: self.generation,
                    entries_compacted: self.log.len(),
                    pending_carried: pending.len(),
                    timestamp: Utc::now(),
                });
                Some(Checkpoint {
                    compacted,
                    pending,
                    exit_requested: self.exit_requested,
                    generation: self.generation + 1,
                })
            }
            Err(e) => {
                warn!(
                    session = %self.deps.session_id,
                    error = %e,
                    "Compaction failed, deferring checkpoint"
                );
                None
            }
        }
    }
}
