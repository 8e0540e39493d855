//! Per-browser chat sessions.
//!
//! Each page load gets a session id (UUID v4) embedded in the form; the
//! server keeps one [`ChatWidget`] per id so conversations stay separate.
//!
//! # Example
//!
//! ```rust,ignore
//! let store = WidgetStore::new(Arc::new(RagbotClient::new("http://127.0.0.1:8000")?));
//! let (id, widget) = store.get_or_create(None);
//! widget.ask("What is drip irrigation?").await;
//! assert!(store.get(&id).is_some());
//! ```

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};

use uuid::Uuid;

use crate::client::AnswerService;
use crate::widget::ChatWidget;

#[derive(Debug)]
struct Entry {
    widget: Arc<ChatWidget>,
    last_activity: Instant,
}

/// Thread-safe map of session id to chat widget.
#[derive(Clone)]
pub struct WidgetStore {
    service: Arc<dyn AnswerService>,
    sessions: Arc<RwLock<HashMap<Uuid, Entry>>>,
}

impl std::fmt::Debug for WidgetStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WidgetStore")
            .field("sessions", &self.len())
            .finish_non_exhaustive()
    }
}

impl WidgetStore {
    /// Create an empty store whose widgets all talk to `service`.
    pub fn new(service: Arc<dyn AnswerService>) -> Self {
        Self {
            service,
            sessions: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Look up a session, creating it when the id is missing, malformed, or unknown.
    ///
    /// A well-formed but unknown id is kept, so a page that outlives a
    /// server restart carries on under the same id.
    pub fn get_or_create(&self, id: Option<&str>) -> (Uuid, Arc<ChatWidget>) {
        let id = id
            .and_then(|raw| Uuid::parse_str(raw.trim()).ok())
            .unwrap_or_else(Uuid::new_v4);

        let mut guard = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        let entry = guard.entry(id).or_insert_with(|| {
            tracing::debug!(name: "session.created", session_id = %id, "Chat session created");
            Entry {
                widget: Arc::new(ChatWidget::new(Arc::clone(&self.service))),
                last_activity: Instant::now(),
            }
        });
        entry.last_activity = Instant::now();
        (id, Arc::clone(&entry.widget))
    }

    /// Get a session by ID.
    #[must_use]
    pub fn get(&self, id: &Uuid) -> Option<Arc<ChatWidget>> {
        let guard = self.sessions.read().unwrap_or_else(PoisonError::into_inner);
        guard.get(id).map(|entry| Arc::clone(&entry.widget))
    }

    /// Remove a session by ID.
    pub fn remove(&self, id: &Uuid) -> Option<Arc<ChatWidget>> {
        let mut guard = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        guard.remove(id).map(|entry| entry.widget)
    }

    /// Get the number of active sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Check if there are no sessions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove sessions that have been inactive longer than `idle`.
    ///
    /// Sessions with a request in flight are kept. Returns the number removed.
    pub fn cleanup_idle(&self, idle: Duration) -> usize {
        let mut guard = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        let before = guard.len();
        guard.retain(|_, entry| {
            entry.last_activity.elapsed() < idle || entry.widget.snapshot().is_loading()
        });
        before - guard.len()
    }
}
