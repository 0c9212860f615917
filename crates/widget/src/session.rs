use std::sync::Arc;

use chatline_storage::{KeyValueStore, SESSION_ID_KEY, SessionId, StorageResult};

/// Owns the one session identifier a widget instance sends with every message.
///
/// The persisted entry and the in-memory value are kept in step; when a write fails the
/// in-memory value still moves so the conversation can continue for this instance.
pub struct SessionManager {
    store: Arc<dyn KeyValueStore>,
    current: SessionId,
}

impl SessionManager {
    pub fn load(store: Arc<dyn KeyValueStore>) -> StorageResult<Self> {
        let current = get_or_create(store.as_ref())?;
        Ok(Self { store, current })
    }

    pub fn current(&self) -> &SessionId {
        &self.current
    }

    /// Adopts the identifier returned by the backend. Returns true when it changed.
    pub fn rotate(&mut self, returned: &str) -> bool {
        let Ok(returned) = SessionId::parse(returned) else {
            tracing::debug!("backend returned a blank session id; keeping the current one");
            return false;
        };

        let changed = returned != self.current;
        if changed {
            tracing::info!(previous = %self.current, current = %returned, "adopting backend session id");
        }
        self.persist(&returned, "rotate");
        self.current = returned;
        changed
    }

    /// Drops the persisted identifier and replaces it with a freshly minted one.
    pub fn reset(&mut self) -> SessionId {
        if let Err(error) = self.store.remove(SESSION_ID_KEY) {
            tracing::warn!(error = %error, "failed to remove persisted session id");
        }

        let fresh = SessionId::generate();
        tracing::info!(previous = %self.current, current = %fresh, "session id reset");
        self.persist(&fresh, "reset");
        self.current = fresh.clone();
        fresh
    }

    fn persist(&self, session_id: &SessionId, operation: &'static str) {
        if let Err(error) = self.store.set(SESSION_ID_KEY, session_id.as_str()) {
            tracing::warn!(operation, error = %error, "failed to persist session id");
        }
    }
}

/// Reads the persisted identifier, minting and storing a new one when none exists.
pub fn get_or_create(store: &dyn KeyValueStore) -> StorageResult<SessionId> {
    if let Some(raw) = store.get(SESSION_ID_KEY)?
        && let Ok(existing) = SessionId::parse(&raw)
    {
        return Ok(existing);
    }

    let fresh = SessionId::generate();
    store.set(SESSION_ID_KEY, fresh.as_str())?;
    tracing::debug!(session_id = %fresh, "created new chat session id");
    Ok(fresh)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatline_storage::MemoryStore;

    fn stored(store: &MemoryStore) -> Option<String> {
        store.get(SESSION_ID_KEY).expect("read store")
    }

    #[test]
    fn get_or_create_mints_once_and_then_reads_back() {
        let store = MemoryStore::new();

        let first = get_or_create(&store).expect("create");
        assert!(first.is_uuid_v4());
        assert_eq!(stored(&store).as_deref(), Some(first.as_str()));

        let second = get_or_create(&store).expect("read");
        assert_eq!(first, second);
    }

    #[test]
    fn blank_persisted_value_is_replaced() {
        let store = MemoryStore::with_entry(SESSION_ID_KEY, "  ");
        let id = get_or_create(&store).expect("create");
        assert!(id.is_uuid_v4());
        assert_eq!(stored(&store).as_deref(), Some(id.as_str()));
    }

    #[test]
    fn rotate_adopts_and_persists_backend_id() {
        let store = Arc::new(MemoryStore::with_entry(SESSION_ID_KEY, "s1"));
        let mut manager = SessionManager::load(store.clone()).expect("load");
        assert_eq!(manager.current().as_str(), "s1");

        assert!(manager.rotate("s2"));
        assert_eq!(manager.current().as_str(), "s2");
        assert_eq!(stored(&store).as_deref(), Some("s2"));

        assert!(!manager.rotate("s2"));
        assert!(!manager.rotate(""));
        assert_eq!(manager.current().as_str(), "s2");
    }

    #[test]
    fn reset_replaces_persisted_id() {
        let store = Arc::new(MemoryStore::with_entry(SESSION_ID_KEY, "poisoned"));
        let mut manager = SessionManager::load(store.clone()).expect("load");

        let fresh = manager.reset();
        assert_ne!(fresh.as_str(), "poisoned");
        assert!(fresh.is_uuid_v4());
        assert_eq!(manager.current(), &fresh);
        assert_eq!(stored(&store).as_deref(), Some(fresh.as_str()));
    }
}
