pub mod error;
pub mod ids;
pub mod memory;
pub mod sqlite;

pub use error::{StorageError, StorageResult};
pub use ids::SessionId;
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// Key under which the active chat session identifier is persisted.
pub const SESSION_ID_KEY: &str = "chat_session_id";

/// Durable key/value entries scoped to a single origin.
///
/// Implementations are bound to one origin at construction, so two stores opened for
/// different origins never observe each other's entries. Writes are last-writer-wins.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> StorageResult<Option<String>>;
    fn set(&self, key: &str, value: &str) -> StorageResult<()>;
    fn remove(&self, key: &str) -> StorageResult<()>;
}
