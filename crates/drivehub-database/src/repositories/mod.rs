//! Concrete PostgreSQL repository implementations.

pub mod connection;
pub mod task;

pub use connection::ConnectionRepository;
pub use task::TaskRepository;
