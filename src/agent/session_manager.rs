//! Session manager: one conversation per id, turns serialised per session.
//!
//! Each session sits behind a handle with a FIFO turn lock. A turn runs on a
//! working copy and is committed only if the session was not reset in the
//! meantime. Persistence is spawned after commit and never awaited by the
//! caller; a per-session write guard keeps stale snapshots from overwriting
//! newer ones. Sessions idle past the configured timeout are evicted from
//! memory and reloaded from the store on next use.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::agent::executor::TurnExecutor;
use crate::agent::session::{ConversationSession, SessionPhase, SessionSnapshot, SessionState};
use crate::agent::turn::Turn;
use crate::config::AgentConfig;
use crate::error::{DatabaseError, Error, SessionError};
use crate::llm::{LlmProvider, ToolDefinition};
use crate::store::HistoryStore;
use crate::tools::ToolRegistry;

/// Collaborators injected into the session manager.
#[derive(Clone)]
pub struct AgentDeps {
    pub llm: Arc<dyn LlmProvider>,
    pub tools: Arc<ToolRegistry>,
    pub history: Arc<dyn HistoryStore>,
}

struct SessionHandle {
    /// Held for the whole of a turn; tokio's mutex queues waiters in order.
    turn_lock: Mutex<()>,
    /// Last committed state.
    session: RwLock<ConversationSession>,
    closed: AtomicBool,
    /// Number of turns last written to the history store.
    persisted_len: Mutex<usize>,
    last_active: Mutex<Instant>,
}

impl SessionHandle {
    fn new(session: ConversationSession) -> Self {
        let persisted = session.len();
        Self {
            turn_lock: Mutex::new(()),
            session: RwLock::new(session),
            closed: AtomicBool::new(false),
            persisted_len: Mutex::new(persisted),
            last_active: Mutex::new(Instant::now()),
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    async fn touch(&self) {
        *self.last_active.lock().await = Instant::now();
    }

    /// Safe to drop from memory: idle long enough, no turn queued or running,
    /// and every committed turn already written.
    fn is_evictable(&self, idle_timeout: Duration) -> bool {
        let (Ok(_turn), Ok(persisted), Ok(session), Ok(last_active)) = (
            self.turn_lock.try_lock(),
            self.persisted_len.try_lock(),
            self.session.try_read(),
            self.last_active.try_lock(),
        ) else {
            return false;
        };
        let evictable = last_active.elapsed() >= idle_timeout && *persisted >= session.len();
        if evictable {
            // Set while the turn lock is still held so a queued caller reloads.
            self.closed.store(true, Ordering::SeqCst);
        }
        evictable
    }
}

pub struct SessionManager {
    executor: Arc<TurnExecutor>,
    history: Arc<dyn HistoryStore>,
    system_prompt: String,
    tool_schema: Vec<ToolDefinition>,
    idle_timeout: Duration,
    sessions: RwLock<HashMap<String, Arc<SessionHandle>>>,
}

impl SessionManager {
    pub fn new(config: AgentConfig, deps: AgentDeps) -> Self {
        let system_prompt = config.system_prompt.clone();
        let idle_timeout = config.session_idle_timeout;
        let executor = TurnExecutor::new(deps.llm, deps.tools, config);
        let tool_schema = executor.tool_definitions();
        Self {
            executor: Arc::new(executor),
            history: deps.history,
            system_prompt,
            tool_schema,
            idle_timeout,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Snapshot of the session, loading or creating it if needed.
    pub async fn get_or_create(&self, id: &str) -> Result<SessionSnapshot, Error> {
        let handle = self.handle(id).await?;
        let session = handle.session.read().await;
        Ok(session.snapshot())
    }

    /// Snapshot of the session without opening it in memory.
    ///
    /// Unknown ids yield an empty snapshot and are not retained.
    pub async fn snapshot(&self, id: &str) -> Result<SessionSnapshot, Error> {
        let handle = self.sessions.read().await.get(id).cloned();
        match handle {
            Some(handle) => Ok(handle.session.read().await.snapshot()),
            None => Ok(self.load_session(id).await?.snapshot()),
        }
    }

    /// Committed turns of a session without opening it.
    pub async fn history(&self, id: &str) -> Result<Vec<Turn>, Error> {
        Ok(self.snapshot(id).await?.turns)
    }

    /// Run one user message through the agent and return the final turn.
    ///
    /// Concurrent calls for the same id are processed one at a time, in
    /// arrival order. If the session is reset while the turn runs, the turn's
    /// result is discarded and `SessionError::Closed` is returned.
    pub async fn submit_message(&self, id: &str, text: &str) -> Result<Turn, Error> {
        let (turn, _) = self.submit_with_state(id, text).await?;
        Ok(turn)
    }

    /// Like `submit_message`, also returning the session state the turn
    /// committed.
    pub async fn submit_with_state(
        &self,
        id: &str,
        text: &str,
    ) -> Result<(Turn, SessionState), Error> {
        let text = text.trim();
        if text.is_empty() {
            return Err(SessionError::EmptyMessage.into());
        }

        loop {
            let handle = self.handle(id).await?;
            let _turn = handle.turn_lock.lock().await;
            if handle.is_closed() {
                // Reset while queued: the next lookup yields a fresh session.
                continue;
            }

            let mut working = handle.session.read().await.clone();
            let turn = self.executor.run_turn(&mut working, text).await;

            let (snapshot, state) = {
                let mut committed = handle.session.write().await;
                if handle.is_closed() {
                    tracing::info!(session_id = %id, "Session reset during turn, result discarded");
                    return Err(SessionError::Closed { id: id.to_string() }.into());
                }
                *committed = working;
                (committed.history().to_vec(), committed.state.clone())
            };
            handle.touch().await;

            self.spawn_persist(id, Arc::clone(&handle), snapshot);
            return Ok((turn, state));
        }
    }

    /// Discard a session and its stored history.
    ///
    /// A turn still running for it finishes but is never committed.
    pub async fn reset_session(&self, id: &str) -> Result<(), Error> {
        // Held until the stored history is gone so a concurrent lookup can't
        // resurrect it.
        let mut sessions = self.sessions.write().await;
        if let Some(handle) = sessions.remove(id) {
            handle.closed.store(true, Ordering::SeqCst);
            handle.session.write().await.state.phase = SessionPhase::Closed;
            let _persist = handle.persisted_len.lock().await;
            self.history.delete_history(id).await?;
        } else {
            self.history.delete_history(id).await?;
        }
        drop(sessions);
        tracing::info!(session_id = %id, "Session reset");
        Ok(())
    }

    /// Number of sessions currently held in memory.
    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Evict sessions idle for longer than the configured timeout.
    ///
    /// Sessions with a queued or running turn, or with turns not yet written
    /// to the store, are kept. Returns the number evicted.
    pub async fn prune_idle(&self) -> usize {
        let idle_timeout = self.idle_timeout;
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|id, handle| {
            let evict = handle.is_evictable(idle_timeout);
            if evict {
                tracing::debug!(session_id = %id, "Evicted idle session");
            }
            !evict
        });
        let evicted = before - sessions.len();
        if evicted > 0 {
            tracing::info!(evicted, remaining = sessions.len(), "Pruned idle sessions");
        }
        evicted
    }

    /// Prune idle sessions periodically until the task is aborted.
    pub fn spawn_pruner(self: &Arc<Self>) -> JoinHandle<()> {
        let manager = Arc::clone(self);
        let period = self
            .idle_timeout
            .clamp(Duration::from_secs(1), Duration::from_secs(600));
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.tick().await; // Skip immediate first tick
            loop {
                interval.tick().await;
                manager.prune_idle().await;
            }
        })
    }

    async fn handle(&self, id: &str) -> Result<Arc<SessionHandle>, Error> {
        let existing = self.sessions.read().await.get(id).cloned();
        if let Some(handle) = existing {
            handle.touch().await;
            return Ok(handle);
        }

        let session = self.load_session(id).await?;
        let mut sessions = self.sessions.write().await;
        let handle = sessions
            .entry(id.to_string())
            .or_insert_with(|| Arc::new(SessionHandle::new(session)));
        Ok(Arc::clone(handle))
    }

    async fn load_session(&self, id: &str) -> Result<ConversationSession, Error> {
        let fresh = || {
            ConversationSession::new(id, self.system_prompt.clone(), self.tool_schema.clone())
        };
        match self.history.load_history(id).await {
            Ok(Some(turns)) => {
                tracing::debug!(session_id = %id, turns = turns.len(), "Resumed session");
                Ok(ConversationSession::resume(
                    id,
                    self.system_prompt.clone(),
                    self.tool_schema.clone(),
                    turns,
                ))
            }
            Ok(None) => Ok(fresh()),
            Err(DatabaseError::Serialization(reason)) => {
                let err = SessionError::Corrupted {
                    id: id.to_string(),
                    reason,
                };
                tracing::warn!(
                    session_id = %id,
                    phase = %SessionPhase::Errored,
                    "{}; starting a fresh session",
                    err
                );
                Ok(fresh())
            }
            Err(e) => Err(e.into()),
        }
    }

    fn spawn_persist(&self, id: &str, handle: Arc<SessionHandle>, turns: Vec<Turn>) {
        let store = Arc::clone(&self.history);
        let id = id.to_string();
        tokio::spawn(async move {
            let mut persisted = handle.persisted_len.lock().await;
            if handle.is_closed() || turns.len() <= *persisted {
                return;
            }
            match store.save_history(&id, &turns).await {
                Ok(()) => *persisted = turns.len(),
                Err(e) => tracing::warn!(session_id = %id, "Failed to persist history: {}", e),
            }
        });
    }
}
