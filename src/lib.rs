//! dispatch-async: dispatch-style queues, groups and semaphores without blocking waits
//!
//! This library reproduces the observable semantics of a classic dispatch API
//! (serial and concurrent queues, a main queue, completion groups, counting
//! semaphores) on top of cooperative suspension, so it works where there is
//! only one execution context and a thread-blocking wait would freeze it.
//!
//! - [`Semaphore`] - counting semaphore with FIFO hand-off to waiters
//! - [`FifoQueue`] - strictly ordered single-drain work queue
//! - [`Group`] - enter/leave/notify/wait, applied in call order
//! - [`Queue`] - main, serial and concurrent queues with target forwarding

pub mod cli;
pub mod error;
pub mod global_context;
pub mod group;
pub mod main_context;
pub mod queue;
pub mod stress;

// Re-export commonly used types
pub use compio_sync::{yield_now, FifoQueue, QueueClosed, Semaphore, SemaphorePermit};
pub use error::{DispatchError, Result};
pub use group::Group;
pub use queue::{Queue, QueueBuilder, QueueKind};
