//! Error types

use thiserror::Error;

/// Returned when work is submitted to a [`FifoQueue`](crate::FifoQueue) that
/// has been closed
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("work queue is closed and no longer accepts items")]
pub struct QueueClosed;
