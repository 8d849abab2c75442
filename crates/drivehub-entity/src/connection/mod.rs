//! Cloud account connection entities.

pub mod model;
pub mod provider;

pub use model::CloudConnection;
pub use provider::CloudProvider;
