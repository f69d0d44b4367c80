//! The process-wide concurrent execution context
//!
//! Work for [`Queue::global`](crate::Queue::global) and for every untargeted
//! concurrent queue is spawned on one compio runtime that owns a dedicated
//! thread for the rest of the process. Submitting therefore works from any
//! thread, with or without a runtime of its own, and the work outlives the
//! runtime it was submitted from.

use std::io;
use std::sync::OnceLock;

use compio_sync::FifoQueue;

use crate::error::{DispatchError, Result};
use crate::main_context::dedicated;

/// Name of the thread that hosts the global execution context
pub const GLOBAL_THREAD_NAME: &str = "dispatch-global";

static GLOBAL: OnceLock<io::Result<FifoQueue>> = OnceLock::new();

/// Spawn `work` as an independent task on the global execution context
///
/// The context's FIFO only carries the spawn request; the items themselves are
/// separate tasks with no ordering between them.
pub(crate) fn submit<F>(work: F) -> Result<()>
where
    F: FnOnce() + Send + 'static,
{
    let context = dedicated(&GLOBAL, GLOBAL_THREAD_NAME).map_err(DispatchError::GlobalContext)?;
    context.enqueue_fn(move || {
        compio::runtime::spawn(async move { work() }).detach();
    })?;
    Ok(())
}
