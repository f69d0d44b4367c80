//! Strictly ordered, single-drain work queue
//!
//! A [`FifoQueue`] owns exactly one drain worker. Items are pushed onto an
//! unbounded multi-producer channel and the worker runs them one at a time, in
//! arrival order, awaiting each item to completion (including any suspension
//! inside it) before taking the next. Ordering comes from the shape of the drain
//! loop itself, so nothing on the execution side needs a lock.
//!
//! # Example
//!
//! ```rust,no_run
//! use compio_sync::FifoQueue;
//!
//! # async fn example() -> Result<(), compio_sync::QueueClosed> {
//! let queue = FifoQueue::new();
//! queue.enqueue(async { println!("first") })?;
//! queue.enqueue_fn(|| println!("second"))?;
//! # Ok(())
//! # }
//! ```

use std::any::Any;
use std::io;
use std::panic::AssertUnwindSafe;
use std::thread;

use futures::channel::mpsc;
use futures::future::BoxFuture;
use futures::{FutureExt, StreamExt};
use tracing::{debug, error, trace};

use crate::error::QueueClosed;

/// A deferred unit of work accepted by [`FifoQueue`]
pub type WorkItem = BoxFuture<'static, ()>;

/// Unbounded FIFO job runner with a single drain worker
///
/// `enqueue` never suspends and may be called from any number of producers.
/// Dropping the queue (or calling [`close`](Self::close)) stops intake; items
/// already buffered still run before the worker exits.
pub struct FifoQueue {
    sender: mpsc::UnboundedSender<WorkItem>,
}

impl FifoQueue {
    /// Create a queue whose drain worker runs on the current compio runtime
    ///
    /// # Panics
    ///
    /// Panics if called outside a compio runtime.
    #[must_use]
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded();
        compio::runtime::spawn(drain(receiver)).detach();
        debug!("fifo queue created on current runtime");
        Self { sender }
    }

    /// Create a queue whose drain worker gets a named OS thread and a compio
    /// runtime of its own for the rest of the process
    ///
    /// # Errors
    ///
    /// Returns an error if the thread cannot be spawned. If the runtime fails
    /// to start on that thread the failure is logged and the queue reports
    /// itself closed.
    pub fn on_dedicated_thread(name: impl Into<String>) -> io::Result<Self> {
        let (sender, receiver) = mpsc::unbounded();
        let name = name.into();
        let thread_name = name.clone();

        thread::Builder::new().name(thread_name).spawn(move || {
            match compio::runtime::Runtime::new() {
                Ok(runtime) => runtime.block_on(drain(receiver)),
                Err(e) => error!("failed to start runtime for drain thread {}: {}", name, e),
            }
        })?;

        Ok(Self { sender })
    }

    /// Append an async item to the queue
    ///
    /// # Errors
    ///
    /// Returns [`QueueClosed`] if the queue no longer accepts work; the item is
    /// dropped without running.
    pub fn enqueue<F>(&self, item: F) -> Result<(), QueueClosed>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        self.sender
            .unbounded_send(item.boxed())
            .map_err(|_| QueueClosed)?;
        trace!("fifo item enqueued");
        Ok(())
    }

    /// Append a synchronous item to the queue
    ///
    /// # Errors
    ///
    /// Returns [`QueueClosed`] if the queue no longer accepts work.
    pub fn enqueue_fn<F>(&self, item: F) -> Result<(), QueueClosed>
    where
        F: FnOnce() + Send + 'static,
    {
        self.enqueue(async move { item() })
    }

    /// Stop accepting new items; buffered items still drain
    pub fn close(&self) {
        self.sender.close_channel();
    }

    /// Whether further submissions will be rejected
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

impl Default for FifoQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for FifoQueue {
    fn drop(&mut self) {
        self.close();
    }
}

/// The drain loop: take the next item, run it to completion, repeat
async fn drain(mut receiver: mpsc::UnboundedReceiver<WorkItem>) {
    debug!("fifo drain worker started");
    while let Some(item) = receiver.next().await {
        if let Err(payload) = AssertUnwindSafe(item).catch_unwind().await {
            error!("fifo work item panicked: {}", panic_message(payload.as_ref()));
        }
    }
    debug!("fifo drain worker exiting");
}

/// Best-effort text of a panic payload, for logging
#[must_use]
pub fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "<non-string panic payload>"
    }
}
