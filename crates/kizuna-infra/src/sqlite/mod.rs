//! SQLite repository implementations.

pub mod conversation;
pub mod diary;
pub mod fact;
pub mod lock;
pub mod memory;
pub mod pool;
pub mod proactive;
pub mod state;

pub use conversation::SqliteConversationRepository;
pub use diary::{SqliteDiaryRepository, SqliteProfileRepository};
pub use fact::SqliteFactRepository;
pub use lock::SqliteAdvisoryLock;
pub use memory::SqliteHighlightStore;
pub use pool::{DatabasePool, default_database_url};
pub use proactive::SqliteProactiveRepository;
pub use state::SqliteUserStateRepository;
