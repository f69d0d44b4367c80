//! Cooperative synchronization primitives for compio runtime
//!
//! This crate provides the leaf building blocks used by `dispatch-async`. Both
//! primitives suspend instead of blocking, so they work on a single-threaded
//! [compio](https://github.com/compio-rs/compio) runtime without ever tying up
//! the worker that drives it.
//!
//! # Primitives
//!
//! - [`Semaphore`] - Counting semaphore whose waiters resume strictly FIFO
//! - [`FifoQueue`] - Unbounded work queue with a single in-order drain worker
//! - [`yield_now`] - Reschedule the current task behind every other ready one
//!
//! # Example
//!
//! ```rust,no_run
//! use compio_sync::{FifoQueue, Semaphore};
//!
//! #[compio::main]
//! async fn main() {
//!     let sem = Semaphore::new(0);
//!     let queue = FifoQueue::new();
//!
//!     let signal = sem.clone();
//!     queue.enqueue_fn(move || signal.release()).unwrap();
//!
//!     // Resumes once the queued item has run
//!     sem.acquire().await;
//! }
//! ```

mod error;
mod fifo;
mod semaphore;
mod yield_now;

pub use error::QueueClosed;
pub use fifo::{panic_message, FifoQueue, WorkItem};
pub use semaphore::{Semaphore, SemaphorePermit};
pub use yield_now::yield_now;

#[cfg(test)]
pub(crate) mod test_support {
    /// Give spawned tasks a few turns on the compio executor
    pub(crate) async fn settle() {
        for _ in 0..16 {
            crate::yield_now().await;
        }
    }
}
