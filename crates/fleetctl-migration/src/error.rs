//! Error types for the migration manager.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Store(#[from] fleetctl_store::StoreError),

    #[error("migration {0} registered more than once")]
    Duplicate(u32),

    #[error("migration sequence has a gap: expected {expected}, found {found}")]
    Gap { expected: u32, found: u32 },

    #[error(
        "persisted DbVersion {persisted} is ahead of the highest registered migration {highest_known}; refusing to run (downgrade)"
    )]
    Downgrade { persisted: u32, highest_known: u32 },
}

pub type Result<T> = std::result::Result<T, Error>;
