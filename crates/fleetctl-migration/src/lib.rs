//! Ordered, resumable migrations over the fleet resource state store.
//!
//! Unlike a conventional SQL migration tool, there is no file format and
//! no separate tracking database: a migration is a Rust type implementing
//! [`Migration`], and progress is a `DbVersion` singleton living in the
//! same store every other fleetctl resource lives in. See
//! [`manager::MigrationManager`] for the runner.

pub mod error;
pub mod manager;
pub mod migration;

pub use error::{Error, Result};
pub use manager::{MigrationManager, MigrationRunConfig};
pub use migration::{Migration, Tombstone};
