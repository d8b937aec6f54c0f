pub mod mirror;
pub mod storage;

pub use mirror::{PersistedSession, SessionMirror, SessionState, UserProfile, SESSION_STORAGE_KEY};
pub use storage::{FileStorage, MemoryStorage, SessionStorage, StorageError};
