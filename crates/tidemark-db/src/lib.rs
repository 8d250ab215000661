pub mod control;
pub mod memory_store;
pub mod sqlite_store;

pub use control::{ControlRecord, ControlStore, control_id};
pub use memory_store::MemoryControlStore;
pub use sqlite_store::SqliteControlStore;
