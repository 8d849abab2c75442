//! Queued cloud file operation entities.

pub mod model;
pub mod status;

pub use model::{NewTask, Task};
pub use status::{OperationKind, TaskStatus};
