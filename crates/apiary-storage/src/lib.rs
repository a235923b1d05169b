//! # apiary-storage
//!
//! Persistence backends implementing the [`apiary_core::traits::Storage`]
//! contract: an in-memory map for tests and ephemeral runs, and a
//! SQLite-backed store for durable bot memory.

mod memory;
mod sqlite;

pub use memory::MemoryStorage;
pub use sqlite::SqliteStorage;
