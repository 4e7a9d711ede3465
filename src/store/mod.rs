//! Session continuity store: records, persistence, and continuity logic.

pub mod continuity;
pub mod record;
pub mod repository;
pub mod sqlite;

pub use continuity::SessionStore;
pub use record::{did_resume_fail, ConversationKey, SessionRecord};
pub use repository::{MemoryRepository, SessionRepository};
pub use sqlite::SqliteRepository;
