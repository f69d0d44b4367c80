//! Error handling and types

use thiserror::Error;

/// Errors surfaced by queue and group plumbing
///
/// Usage-contract violations (such as an unmatched `leave()`) are not part of
/// this enum: they panic at the call site.
#[derive(Error, Debug)]
pub enum DispatchError {
    /// The backing work queue no longer accepts items
    #[error("Work queue closed: {0}")]
    QueueClosed(#[from] compio_sync::QueueClosed),

    /// The main execution context could not be started
    #[error("Main execution context unavailable: {0}")]
    MainContext(std::io::Error),

    /// The global concurrent execution context could not be started
    #[error("Global execution context unavailable: {0}")]
    GlobalContext(std::io::Error),
}

pub type Result<T> = std::result::Result<T, DispatchError>;
