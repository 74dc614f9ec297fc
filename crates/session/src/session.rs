//! Session lifecycle — handles, the respawn harness, and the manager.
//!
//! A session is one long-lived tokio task running generation after
//! generation of the turn loop. The task exclusively owns all session
//! state; callers talk to it through a cloneable [`SessionHandle`] that
//! wraps the signal mailbox.

use std::collections::HashMap;
use std::sync::Arc;

use palaver_core::{
    Checkpoint, ContextEntry, DeliverySink, EventBus, PendingMessage, Provider, Result,
    SessionPrefs, SessionQuery, SessionSignal, ToolRegistry,
};
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::budget::{BudgetMonitor, HeuristicEstimator};
use crate::compactor::Compactor;
use crate::controller::{GenerationOutcome, SessionConfig, SessionController, SessionDeps};
use crate::executor::ActionExecutor;
use crate::observer::ObservationStep;
use crate::thought::ThoughtStep;

/// A cloneable, fire-and-forget surface onto one session.
///
/// Sends never fail visibly: once a session has exited, signals are
/// silently dropped and queries come back empty.
#[derive(Clone)]
pub struct SessionHandle {
    session_id: String,
    tx: mpsc::UnboundedSender<SessionSignal>,
}

impl SessionHandle {
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Enqueue a user message; returns the generated correlation id.
    pub fn deliver_message(&self, author: &str, text: &str) -> String {
        let message = PendingMessage::new(author, text);
        let correlation_id = message.correlation_id.clone();
        self.deliver(message);
        correlation_id
    }

    /// Enqueue a pre-built message (caller controls the correlation id).
    pub fn deliver(&self, message: PendingMessage) {
        let _ = self.tx.send(SessionSignal::Deliver(message));
    }

    /// Request a cooperative exit.
    pub fn request_exit(&self) {
        let _ = self.tx.send(SessionSignal::Exit);
    }

    /// Request a checkpoint-and-restart at the next opportunity.
    pub fn request_checkpoint(&self) {
        let _ = self.tx.send(SessionSignal::ForceCheckpoint);
    }

    /// Switch the active model; takes effect on the next reasoning step.
    pub fn set_model(&self, model: &str) {
        let _ = self.tx.send(SessionSignal::SetModel(model.to_string()));
    }

    /// Set a session feature flag.
    pub fn set_flag(&self, name: &str, value: bool) {
        let _ = self.tx.send(SessionSignal::SetFlag {
            name: name.to_string(),
            value,
        });
    }

    /// Whether the session task has ended (exited or terminated).
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// The last `limit` entries of the current generation. Best-effort:
    /// empty if the session is gone.
    pub async fn recent_context(&self, limit: usize) -> Vec<ContextEntry> {
        let (reply, rx) = oneshot::channel();
        if self
            .tx
            .send(SessionSignal::Query(SessionQuery::RecentContext {
                limit,
                reply,
            }))
            .is_err()
        {
            return Vec::new();
        }
        rx.await.unwrap_or_default()
    }

    /// The assistant text that answered a submitted message, if any yet.
    pub async fn response_for(&self, correlation_id: &str) -> Option<String> {
        let (reply, rx) = oneshot::channel();
        if self
            .tx
            .send(SessionSignal::Query(SessionQuery::ResponseFor {
                correlation_id: correlation_id.to_string(),
                reply,
            }))
            .is_err()
        {
            return None;
        }
        rx.await.ok().flatten()
    }
}

/// Build the per-session dependency bundle from shared collaborators.
pub fn build_deps(
    session_id: impl Into<String>,
    signals: mpsc::UnboundedReceiver<SessionSignal>,
    provider: Arc<dyn Provider>,
    tools: Arc<ToolRegistry>,
    sink: Arc<dyn DeliverySink>,
    events: Arc<EventBus>,
    prefs: SessionPrefs,
    config: SessionConfig,
) -> SessionDeps {
    SessionDeps {
        session_id: session_id.into(),
        signals,
        prefs,
        answered: HashMap::new(),
        thought: ThoughtStep::new(
            provider.clone(),
            config.thought_retries,
            config.retry_backoff,
            config.max_response_tokens,
        ),
        executor: ActionExecutor::new(tools),
        observer: ObservationStep::new(
            provider.clone(),
            config.observation_passthrough,
            config.thought_retries,
            config.retry_backoff,
        ),
        compactor: Compactor::new(provider, config.thought_retries, config.retry_backoff),
        budget: BudgetMonitor::new(Arc::new(HeuristicEstimator), config.token_ceiling),
        sink,
        events,
        config,
    }
}

/// The generation respawn harness.
///
/// Runs controllers back to back: each checkpoint tears the old frame
/// down and seeds a fresh one, carrying the deps (mailbox, preferences,
/// answered map) across the boundary. No pending message is lost.
pub async fn run_session(deps: SessionDeps) -> Result<()> {
    let mut deps = deps;
    let mut checkpoint = Checkpoint::initial();
    loop {
        let controller = SessionController::from_checkpoint(deps, checkpoint);
        let (outcome, returned) = controller.run().await?;
        deps = returned;
        match outcome {
            GenerationOutcome::Restart(next) => checkpoint = next,
            GenerationOutcome::Exited => return Ok(()),
        }
    }
}

/// Spawn a session task and return its handle.
pub fn spawn_session(
    session_id: impl Into<String>,
    provider: Arc<dyn Provider>,
    tools: Arc<ToolRegistry>,
    sink: Arc<dyn DeliverySink>,
    events: Arc<EventBus>,
    prefs: SessionPrefs,
    config: SessionConfig,
) -> (SessionHandle, JoinHandle<Result<()>>) {
    let session_id = session_id.into();
    let (tx, rx) = mpsc::unbounded_channel();
    let deps = build_deps(
        session_id.clone(),
        rx,
        provider,
        tools,
        sink,
        events,
        prefs,
        config,
    );
    let id_for_task = session_id.clone();
    let join = tokio::spawn(async move {
        let result = run_session(deps).await;
        if let Err(e) = &result {
            warn!(session = %id_for_task, error = %e, "Session terminated abnormally");
        }
        result
    });
    (SessionHandle { session_id, tx }, join)
}

/// Creates sessions on first contact and routes callers to them.
///
/// Sessions are keyed by conversation identifier. An exited session is
/// not revived: a fresh inbound message under the same identifier starts
/// an entirely new one.
pub struct SessionManager {
    provider: Arc<dyn Provider>,
    tools: Arc<ToolRegistry>,
    sink: Arc<dyn DeliverySink>,
    events: Arc<EventBus>,
    prefs: SessionPrefs,
    config: SessionConfig,
    sessions: Mutex<HashMap<String, SessionHandle>>,
}

impl SessionManager {
    pub fn new(
        provider: Arc<dyn Provider>,
        tools: Arc<ToolRegistry>,
        sink: Arc<dyn DeliverySink>,
        events: Arc<EventBus>,
        prefs: SessionPrefs,
        config: SessionConfig,
    ) -> Self {
        Self {
            provider,
            tools,
            sink,
            events,
            prefs,
            config,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// The handle for a conversation, creating the session on first use
    /// or after a previous one exited.
    pub async fn handle_for(&self, conversation_id: &str) -> SessionHandle {
        let mut sessions = self.sessions.lock().await;
        if let Some(handle) = sessions.get(conversation_id)
            && !handle.is_closed()
        {
            return handle.clone();
        }

        info!(conversation = %conversation_id, "Starting session");
        let (handle, _join) = spawn_session(
            conversation_id,
            self.provider.clone(),
            self.tools.clone(),
            self.sink.clone(),
            self.events.clone(),
            self.prefs.clone(),
            self.config.clone(),
        );
        sessions.insert(conversation_id.to_string(), handle.clone());
        handle
    }

    /// Request a cooperative exit on every live session.
    pub async fn shutdown_all(&self) {
        for handle in self.sessions.lock().await.values() {
            handle.request_exit();
        }
    }

    /// Number of sessions that have not yet exited.
    pub async fn active_count(&self) -> usize {
        self.sessions
            .lock()
            .await
            .values()
            .filter(|h| !h.is_closed())
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{RecordingSink, ScriptedProvider};

    fn manager(provider: Arc<ScriptedProvider>) -> SessionManager {
        SessionManager::new(
            provider,
            Arc::new(ToolRegistry::new()),
            Arc::new(RecordingSink::new()),
            Arc::new(EventBus::default()),
            SessionPrefs::new("mock-model", 0.7),
            SessionConfig {
                error_backoff: std::time::Duration::ZERO,
                retry_backoff: std::time::Duration::ZERO,
                ..SessionConfig::default()
            },
        )
    }

    #[tokio::test]
    async fn handle_for_reuses_live_sessions() {
        let mgr = manager(ScriptedProvider::always_text("pong"));
        let a = mgr.handle_for("chat-1").await;
        let b = mgr.handle_for("chat-1").await;
        assert_eq!(a.session_id(), b.session_id());
        assert_eq!(mgr.active_count().await, 1);

        let other = mgr.handle_for("chat-2").await;
        assert_eq!(other.session_id(), "chat-2");
        assert_eq!(mgr.active_count().await, 2);

        mgr.shutdown_all().await;
    }

    #[tokio::test]
    async fn exited_sessions_are_replaced_on_next_contact() {
        let mgr = manager(ScriptedProvider::always_text("pong"));
        let first = mgr.handle_for("chat-1").await;
        first.request_exit();

        // Wait for the exit to land.
        let mut tries = 0;
        while !first.is_closed() && tries < 100 {
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            tries += 1;
        }
        assert!(first.is_closed());

        // A fresh inbound under the same identifier starts a new session.
        let second = mgr.handle_for("chat-1").await;
        assert!(!second.is_closed());
        mgr.shutdown_all().await;
    }

    #[tokio::test]
    async fn queries_on_dead_sessions_come_back_empty() {
        let provider = ScriptedProvider::always_text("pong");
        let (handle, join) = spawn_session(
            "s1",
            provider,
            Arc::new(ToolRegistry::new()),
            Arc::new(RecordingSink::new()),
            Arc::new(EventBus::default()),
            SessionPrefs::new("mock-model", 0.7),
            SessionConfig::default(),
        );
        handle.request_exit();
        join.await.unwrap().unwrap();

        assert!(handle.recent_context(5).await.is_empty());
        assert!(handle.response_for("nope").await.is_none());
    }
}
