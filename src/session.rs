//! Per-caller sessions holding the documents ingested so far.

use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, Instant};
use time::OffsetDateTime;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Opaque session identifier.
pub type SessionId = String;

/// Documents accumulated by one caller.
#[derive(Debug, Clone)]
pub struct Session {
    id: SessionId,
    documents: BTreeMap<String, String>,
    created_at: OffsetDateTime,
    last_used: Instant,
}

impl Session {
    /// Create an empty session with a fresh identifier.
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            documents: BTreeMap::new(),
            created_at: OffsetDateTime::now_utc(),
            last_used: Instant::now(),
        }
    }

    /// Session identifier.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Creation time.
    pub fn created_at(&self) -> OffsetDateTime {
        self.created_at
    }

    /// Time elapsed since the session was last read or written through the registry.
    pub fn idle_for(&self) -> Duration {
        self.last_used.elapsed()
    }

    /// Add documents; a key already held by the session keeps its first text.
    ///
    /// Returns how many keys were new to the session.
    pub fn add_documents<I>(&mut self, documents: I) -> usize
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut added = 0;
        for (key, text) in documents {
            if let std::collections::btree_map::Entry::Vacant(entry) = self.documents.entry(key) {
                entry.insert(text);
                added += 1;
            }
        }
        added
    }

    /// Documents keyed by source key.
    pub fn documents(&self) -> &BTreeMap<String, String> {
        &self.documents
    }

    /// Sorted source keys.
    pub fn document_names(&self) -> Vec<String> {
        self.documents.keys().cloned().collect()
    }

    /// Whether the session holds no documents.
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Drop every document while keeping the identifier.
    pub fn clear(&mut self) {
        self.documents.clear();
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

/// Default number of live sessions kept before the least recently used one is evicted.
pub const DEFAULT_MAX_SESSIONS: usize = 1024;
/// Default idle period after which a session is dropped.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(3600);

/// Concurrent map of live sessions.
///
/// Sessions are never expired by a background task. Each `create` first drops sessions idle for
/// longer than the idle timeout, then evicts the least recently used session while the registry
/// is at capacity.
#[derive(Debug)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<SessionId, Session>>,
    max_sessions: usize,
    idle_timeout: Duration,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::with_limits(DEFAULT_MAX_SESSIONS, DEFAULT_IDLE_TIMEOUT)
    }
}

impl SessionRegistry {
    /// Create an empty registry with the default limits.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty registry holding at most `max_sessions` sessions (at least one).
    pub fn with_limits(max_sessions: usize, idle_timeout: Duration) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            max_sessions: max_sessions.max(1),
            idle_timeout,
        }
    }

    /// Register a new session and return its identifier.
    pub async fn create(&self) -> SessionId {
        let session = Session::new();
        let id = session.id.clone();
        let mut sessions = self.sessions.write().await;
        self.evict(&mut sessions, Instant::now());
        sessions.insert(id.clone(), session);
        tracing::debug!(session_id = %id, live = sessions.len(), "Session created");
        id
    }

    /// Snapshot of a session; counts as a use.
    pub async fn get(&self, id: &str) -> Option<Session> {
        self.with_session(id, |session| session.clone()).await
    }

    /// Run `f` against a session under the registry write lock.
    pub async fn with_session<R>(&self, id: &str, f: impl FnOnce(&mut Session) -> R) -> Option<R> {
        let mut sessions = self.sessions.write().await;
        sessions.get_mut(id).map(|session| {
            session.last_used = Instant::now();
            f(session)
        })
    }

    fn evict(&self, sessions: &mut HashMap<SessionId, Session>, now: Instant) {
        let before = sessions.len();
        sessions.retain(|_, session| {
            now.saturating_duration_since(session.last_used) <= self.idle_timeout
        });
        let expired = before - sessions.len();

        let mut evicted = 0;
        while sessions.len() >= self.max_sessions {
            let Some(oldest) = sessions
                .values()
                .min_by_key(|session| session.last_used)
                .map(|session| session.id.clone())
            else {
                break;
            };
            sessions.remove(&oldest);
            evicted += 1;
        }

        if expired + evicted > 0 {
            tracing::info!(expired, evicted, live = sessions.len(), "Sessions pruned");
        }
    }

    /// Clear a session's documents. Returns `false` for unknown ids.
    pub async fn reset(&self, id: &str) -> bool {
        self.with_session(id, Session::clear).await.is_some()
    }

    /// Forget a session entirely. Returns `false` for unknown ids.
    pub async fn remove(&self, id: &str) -> bool {
        self.sessions.write().await.remove(id).is_some()
    }

    /// Number of live sessions.
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Whether no sessions are registered.
    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn docs(entries: &[(&str, &str)]) -> Vec<(String, String)> {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn session_keeps_first_text_and_sorts_names() {
        let mut session = Session::new();
        assert!(session.is_empty());

        let added = session.add_documents(docs(&[("b.pdf", "beta"), ("a.pdf", "alpha")]));
        let again = session.add_documents(docs(&[("a.pdf", "changed")]));

        assert_eq!((added, again), (2, 0));
        assert_eq!(session.document_names(), vec!["a.pdf", "b.pdf"]);
        assert_eq!(session.documents()["a.pdf"], "alpha");
    }

    #[tokio::test]
    async fn registry_isolates_sessions() {
        let registry = SessionRegistry::new();
        let first = registry.create().await;
        let second = registry.create().await;
        assert_ne!(first, second);

        registry
            .with_session(&first, |session| {
                session.add_documents(docs(&[("a.txt", "alpha")]))
            })
            .await
            .expect("known session");

        assert_eq!(registry.get(&first).await.expect("first").document_names().len(), 1);
        assert!(registry.get(&second).await.expect("second").is_empty());
    }

    #[tokio::test]
    async fn capacity_evicts_least_recently_used_session() {
        let registry = SessionRegistry::with_limits(2, DEFAULT_IDLE_TIMEOUT);
        let first = registry.create().await;
        let second = registry.create().await;
        registry.get(&first).await.expect("touch first");

        let third = registry.create().await;

        assert_eq!(registry.len().await, 2);
        assert!(registry.get(&first).await.is_some());
        assert!(registry.get(&second).await.is_none());
        assert!(registry.get(&third).await.is_some());
    }

    #[tokio::test]
    async fn idle_sessions_are_dropped_on_create() {
        let registry = SessionRegistry::with_limits(10, Duration::from_secs(60));
        let stale = registry.create().await;
        let fresh = registry.create().await;

        let later = Instant::now() + Duration::from_secs(61);
        registry
            .with_session(&fresh, |session| session.last_used = later)
            .await
            .expect("fresh");
        {
            let mut sessions = registry.sessions.write().await;
            registry.evict(&mut sessions, later);
        }

        assert!(registry.get(&stale).await.is_none());
        assert!(registry.get(&fresh).await.is_some());
    }

    #[tokio::test]
    async fn reset_keeps_id_and_remove_forgets_it() {
        let registry = SessionRegistry::new();
        let id = registry.create().await;
        registry
            .with_session(&id, |session| session.add_documents(docs(&[("a.txt", "x")])))
            .await;

        assert!(registry.reset(&id).await);
        assert!(registry.get(&id).await.expect("still present").is_empty());
        assert!(registry.remove(&id).await);
        assert!(registry.get(&id).await.is_none());
        assert!(!registry.reset(&id).await);
        assert!(registry.is_empty().await);
    }
}
