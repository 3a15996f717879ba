// TodoStore - Ordered todo list with write-through key-value persistence

pub mod config;
pub mod filter;
pub mod record;
pub mod slot;
pub mod sqlite;
pub mod store;

// Re-export main types for convenience
pub use config::{Backend, Config};
pub use filter::FilterMode;
pub use record::{Todo, now_ms};
pub use slot::{FileSlot, MemorySlot, Slot};
pub use sqlite::SqliteSlot;
pub use store::{Stats, Store};
