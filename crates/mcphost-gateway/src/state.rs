use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use mcphost_agents::TurnOrchestrator;
use mcphost_common::Transcript;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Conversation used when a request names none.
pub const DEFAULT_CONVERSATION: &str = "default";

pub const DEFAULT_MAX_CONVERSATIONS: usize = 1000;
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(60 * 60);

struct Session {
    transcript: Arc<Mutex<Transcript>>,
    last_used: Instant,
}

impl Session {
    /// A request handler holds a clone while its turn runs.
    fn in_use(&self) -> bool {
        Arc::strong_count(&self.transcript) > 1
    }
}

/// State shared by every request handler.
pub struct AppState {
    pub orchestrator: Arc<TurnOrchestrator>,
    /// Turns kept per conversation before each new prompt.
    pub message_window: usize,
    /// One transcript per conversation id. Each sits behind its own lock so turns
    /// in one conversation run serially without blocking the others.
    sessions: DashMap<String, Session>,
    max_conversations: usize,
    idle_timeout: Duration,
    /// Cancelled on shutdown; in-flight turns observe a child token.
    pub shutdown: CancellationToken,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    pub fn new(orchestrator: Arc<TurnOrchestrator>, message_window: usize) -> Self {
        Self {
            orchestrator,
            message_window,
            sessions: DashMap::new(),
            max_conversations: DEFAULT_MAX_CONVERSATIONS,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            shutdown: CancellationToken::new(),
        }
    }

    pub fn with_shutdown(mut self, shutdown: CancellationToken) -> Self {
        self.shutdown = shutdown;
        self
    }

    /// Bound the number of live conversations and how long an untouched one is
    /// kept. A zero cap is raised to one.
    pub fn with_limits(mut self, max_conversations: usize, idle_timeout: Duration) -> Self {
        self.max_conversations = max_conversations.max(1);
        self.idle_timeout = idle_timeout;
        self
    }

    pub fn idle_timeout(&self) -> Duration {
        self.idle_timeout
    }

    /// The transcript for `conversation_id`, created empty on first use.
    ///
    /// Creating one when the table is full first drops idle conversations, then
    /// the least recently used one not running a turn. `None` if every slot is
    /// busy.
    pub fn session(&self, conversation_id: &str) -> Option<Arc<Mutex<Transcript>>> {
        let now = Instant::now();
        if let Some(mut session) = self.sessions.get_mut(conversation_id) {
            session.last_used = now;
            return Some(Arc::clone(&session.transcript));
        }

        if self.sessions.len() >= self.max_conversations {
            self.evict_idle_at(now);
        }
        if self.sessions.len() >= self.max_conversations && !self.evict_oldest() {
            return None;
        }

        let session = self
            .sessions
            .entry(conversation_id.to_string())
            .or_insert_with(|| Session {
                transcript: Arc::default(),
                last_used: now,
            });
        Some(Arc::clone(&session.transcript))
    }

    /// Forget a conversation. Returns whether it existed.
    pub fn remove_session(&self, conversation_id: &str) -> bool {
        self.sessions.remove(conversation_id).is_some()
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Drop conversations untouched for longer than the idle timeout.
    pub fn evict_idle(&self) -> usize {
        self.evict_idle_at(Instant::now())
    }

    pub(crate) fn evict_idle_at(&self, now: Instant) -> usize {
        let before = self.sessions.len();
        self.sessions.retain(|_, session| {
            session.in_use() || now.saturating_duration_since(session.last_used) < self.idle_timeout
        });
        let evicted = before.saturating_sub(self.sessions.len());
        if evicted > 0 {
            info!(evicted, remaining = self.sessions.len(), "evicted idle conversations");
        }
        evicted
    }

    fn evict_oldest(&self) -> bool {
        let oldest = self
            .sessions
            .iter()
            .filter(|entry| !entry.value().in_use())
            .min_by_key(|entry| entry.value().last_used)
            .map(|entry| entry.key().clone());

        match oldest {
            Some(id) => {
                let removed = self
                    .sessions
                    .remove_if(&id, |_, session| !session.in_use())
                    .is_some();
                if removed {
                    debug!(conversation = %id, "evicted least recently used conversation");
                }
                removed
            }
            None => false,
        }
    }
}
