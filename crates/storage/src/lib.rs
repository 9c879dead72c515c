pub mod db;
pub mod overlay;

pub use db::{create_db, create_memory_db, DbPool};
pub use overlay::{MemoryOverlayStore, OverlayStore, SqliteOverlayStore, StorageError, OVERLAY_KEY};
