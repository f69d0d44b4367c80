//! The designated main execution context
//!
//! Main-queue work runs on one process-wide drain worker that lives on its own
//! thread with its own compio runtime, started lazily the first time the main
//! queue is used. While a main-queue item runs, [`is_main`] reports `true`.

use std::cell::Cell;
use std::io;
use std::sync::OnceLock;

use compio_sync::FifoQueue;
use tracing::debug;

use crate::error::{DispatchError, Result};

/// Name of the thread that hosts the main execution context
pub const MAIN_THREAD_NAME: &str = "dispatch-main";

static MAIN: OnceLock<io::Result<FifoQueue>> = OnceLock::new();

thread_local! {
    static ON_MAIN: Cell<bool> = const { Cell::new(false) };
}

fn context() -> Result<&'static FifoQueue> {
    dedicated(&MAIN, MAIN_THREAD_NAME).map_err(DispatchError::MainContext)
}

/// Start (once) and return a drain worker on its own named thread
///
/// A failed start is cached like a successful one; every caller gets a copy of
/// the original error.
pub(crate) fn dedicated(
    cell: &'static OnceLock<io::Result<FifoQueue>>,
    name: &'static str,
) -> io::Result<&'static FifoQueue> {
    let started = cell.get_or_init(|| {
        debug!("starting execution context on thread {}", name);
        FifoQueue::on_dedicated_thread(name)
    });
    match started {
        Ok(fifo) => Ok(fifo),
        Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
    }
}

/// Schedule `work` on the main execution context
pub(crate) fn submit<F>(work: F) -> Result<()>
where
    F: FnOnce() + Send + 'static,
{
    context()?.enqueue_fn(move || {
        let _flag = MainFlag::raise();
        work();
    })?;
    Ok(())
}

/// Whether the calling code is currently running as main-queue work
#[must_use]
pub fn is_main() -> bool {
    ON_MAIN.with(Cell::get)
}

/// Raises the on-main flag and restores the previous value on drop, panics included
struct MainFlag {
    previous: bool,
}

impl MainFlag {
    fn raise() -> Self {
        Self {
            previous: ON_MAIN.with(|flag| flag.replace(true)),
        }
    }
}

impl Drop for MainFlag {
    fn drop(&mut self) {
        ON_MAIN.with(|flag| flag.set(self.previous));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::panic;

    #[test]
    fn test_flag_is_scoped_and_restored() {
        assert!(!is_main());
        {
            let _outer = MainFlag::raise();
            assert!(is_main());
            {
                let _inner = MainFlag::raise();
                assert!(is_main());
            }
            // Reentrant scope restores the outer value, not `false`
            assert!(is_main());
        }
        assert!(!is_main());
    }

    #[test]
    fn test_flag_restored_after_panic() {
        let outcome = panic::catch_unwind(|| {
            let _flag = MainFlag::raise();
            panic!("work failed");
        });
        assert!(outcome.is_err());
        assert!(!is_main());
    }

    #[compio::test]
    async fn test_submitted_work_sees_main_flag_on_main_thread() {
        let (done, finished) = futures::channel::oneshot::channel();
        submit(move || {
            let thread = std::thread::current().name().map(str::to_owned);
            let _ = done.send((is_main(), thread));
        })
        .unwrap();

        let (on_main, thread) = finished.await.unwrap();
        assert!(on_main);
        assert_eq!(thread.as_deref(), Some(MAIN_THREAD_NAME));
        assert!(!is_main());
    }
}
