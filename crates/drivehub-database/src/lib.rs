//! # drivehub-database
//!
//! PostgreSQL connection management, the store traits the task processor
//! is written against, their sqlx-backed repositories, and in-memory
//! stores for embedded runs and tests.

pub mod connection;
pub mod memory;
pub mod migration;
pub mod repositories;
pub mod store;

pub use connection::DatabasePool;
pub use memory::{MemoryConnectionStore, MemoryTaskStore};
pub use store::{ConnectionStore, TaskStore};
