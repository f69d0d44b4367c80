//! Dispatch-style queues
//!
//! A [`Queue`] is one of three kinds:
//!
//! - **Main**: serial, and every item runs on the single process-wide main
//!   execution context with [`Queue::is_main_context`] raised
//! - **Serial**: items run in submission order, one at a time, on a private
//!   [`FifoQueue`]
//! - **Concurrent**: every item is spawned as an independent task with no
//!   ordering relative to the others, on the process-wide global execution
//!   context
//!
//! A queue may be built with a *target*; submissions are then forwarded along
//! the target chain until a queue without a target is reached. The target has
//! to exist before the queue that names it, so a queue can never target itself
//! and chains built through this API are always finite.
//!
//! # Example
//!
//! ```rust,no_run
//! use dispatch_async::Queue;
//!
//! # async fn example() {
//! let serial = Queue::serial("db-writes");
//! serial.dispatch(|| println!("first"));
//! serial.dispatch(|| println!("second"));
//!
//! Queue::global().dispatch(|| println!("anywhere"));
//! Queue::main().dispatch(|| assert!(dispatch_async::Queue::is_main_context()));
//! # }
//! ```

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, OnceLock};

use compio_sync::{panic_message, FifoQueue};
use tracing::{debug, error};

use crate::error::Result;
use crate::{global_context, main_context};

/// How a queue executes the work submitted to it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueKind {
    /// The process-wide main queue
    Main,
    /// In-order, non-overlapping execution
    Serial,
    /// Independent execution with no ordering guarantees
    Concurrent,
}

/// A labeled work queue with main, serial or concurrent semantics
///
/// Cloning yields another handle to the same queue; identity is by reference
/// (see [`Queue::ptr_eq`]).
#[derive(Clone)]
pub struct Queue {
    inner: Arc<QueueInner>,
}

struct QueueInner {
    /// Diagnostic label
    label: Option<String>,
    kind: QueueKind,
    route: Route,
}

/// Where submitted work goes
enum Route {
    /// Forward to another queue
    Target(Queue),
    /// The main execution context
    Main,
    /// A fresh task per item on the global execution context
    Spawn,
    /// This queue's private FIFO
    Serial(FifoQueue),
}

impl Queue {
    /// The process-wide main queue
    ///
    /// Its work runs on a dedicated main execution context that is started on
    /// first use and lives for the rest of the process.
    #[must_use]
    pub fn main() -> &'static Queue {
        static MAIN: OnceLock<Queue> = OnceLock::new();
        MAIN.get_or_init(|| Self::from_parts(Some("main".to_owned()), QueueKind::Main, None))
    }

    /// The process-wide concurrent queue
    ///
    /// Usable from any thread: its work is spawned on the global execution
    /// context, a dedicated thread started on first use.
    #[must_use]
    pub fn global() -> &'static Queue {
        static GLOBAL: OnceLock<Queue> = OnceLock::new();
        GLOBAL.get_or_init(|| {
            Self::from_parts(Some("global".to_owned()), QueueKind::Concurrent, None)
        })
    }

    /// Start building a queue with a label, concurrency and target of choice
    #[must_use]
    pub fn builder() -> QueueBuilder {
        QueueBuilder::default()
    }

    /// A serial queue with the given label
    ///
    /// The queue's drain worker is a task on the creating compio runtime and
    /// stops with it; submissions after that runtime exits are rejected.
    ///
    /// # Panics
    ///
    /// Panics if called outside a compio runtime.
    #[must_use]
    pub fn serial(label: impl Into<String>) -> Self {
        Self::builder().label(label).build()
    }

    /// A concurrent queue with the given label
    ///
    /// Needs no runtime; its work runs on the global execution context.
    #[must_use]
    pub fn concurrent(label: impl Into<String>) -> Self {
        Self::builder().label(label).concurrent().build()
    }

    fn from_parts(label: Option<String>, kind: QueueKind, target: Option<Queue>) -> Self {
        let route = match (target, kind) {
            (Some(target), _) => Route::Target(target),
            (None, QueueKind::Main) => Route::Main,
            (None, QueueKind::Concurrent) => Route::Spawn,
            (None, QueueKind::Serial) => Route::Serial(FifoQueue::new()),
        };
        debug!(
            "created {:?} queue {}",
            kind,
            label.as_deref().unwrap_or("<unlabeled>")
        );
        Self {
            inner: Arc::new(QueueInner { label, kind, route }),
        }
    }

    /// Submit `work` without waiting for it to run
    ///
    /// Never suspends the caller. Failures of the underlying execution
    /// context are logged; use [`try_dispatch`](Self::try_dispatch) to observe
    /// them instead.
    pub fn dispatch<F>(&self, work: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if let Err(e) = self.try_dispatch(work) {
            error!("failed to dispatch onto queue {}: {}", self.display_label(), e);
        }
    }

    /// Submit `work`, reporting whether the executing queue accepted it
    ///
    /// # Errors
    ///
    /// Returns an error if the main or global execution context could not be
    /// started, or the backing work queue has been closed.
    pub fn try_dispatch<F>(&self, work: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        match &self.inner.route {
            Route::Target(target) => target.try_dispatch(work),
            Route::Main => main_context::submit(work),
            Route::Spawn => {
                let label = self.inner.label.clone();
                global_context::submit(move || run_isolated(label.as_deref(), work))
            }
            Route::Serial(fifo) => Ok(fifo.enqueue_fn(work)?),
        }
    }

    /// The queue that ultimately executes work submitted here
    #[must_use]
    pub fn effective_queue(&self) -> &Queue {
        let mut queue = self;
        while let Some(target) = queue.target() {
            queue = target;
        }
        queue
    }

    /// Whether the calling code is running as main-queue work
    #[must_use]
    pub fn is_main_context() -> bool {
        main_context::is_main()
    }

    /// Diagnostic label, if one was given
    #[must_use]
    pub fn label(&self) -> Option<&str> {
        self.inner.label.as_deref()
    }

    /// Main, serial or concurrent
    #[must_use]
    pub fn kind(&self) -> QueueKind {
        self.inner.kind
    }

    /// The queue this one forwards to, if any
    #[must_use]
    pub fn target(&self) -> Option<&Queue> {
        match &self.inner.route {
            Route::Target(target) => Some(target),
            _ => None,
        }
    }

    /// Whether both handles refer to the same queue
    #[must_use]
    pub fn ptr_eq(&self, other: &Queue) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    fn display_label(&self) -> &str {
        self.label().unwrap_or("<unlabeled>")
    }
}

/// Run concurrent work, logging a panic instead of losing it in a detached task
fn run_isolated<F: FnOnce()>(label: Option<&str>, work: F) {
    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(work)) {
        error!(
            "work on queue {} panicked: {}",
            label.unwrap_or("<unlabeled>"),
            panic_message(payload.as_ref())
        );
    }
}

impl fmt::Debug for Queue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Queue")
            .field("label", &self.inner.label)
            .field("kind", &self.inner.kind)
            .field("target", &self.target().map(Queue::label))
            .finish()
    }
}

/// Builder for [`Queue`]: `construct(label?, concurrent?, target?)`
#[derive(Default)]
pub struct QueueBuilder {
    label: Option<String>,
    concurrent: bool,
    target: Option<Queue>,
}

impl QueueBuilder {
    /// Name the queue for logs and `Debug` output
    #[must_use]
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Make the queue concurrent instead of serial
    #[must_use]
    pub fn concurrent(mut self) -> Self {
        self.concurrent = true;
        self
    }

    /// Forward everything submitted to the new queue onto `target`
    #[must_use]
    pub fn target(mut self, target: &Queue) -> Self {
        self.target = Some(target.clone());
        self
    }

    /// Create the queue
    ///
    /// # Panics
    ///
    /// An untargeted serial queue spawns its drain worker on the current
    /// runtime, so building one outside a compio runtime panics. Other queues
    /// need no runtime.
    #[must_use]
    pub fn build(self) -> Queue {
        let kind = if self.concurrent {
            QueueKind::Concurrent
        } else {
            QueueKind::Serial
        };
        Queue::from_parts(self.label, kind, self.target)
    }
}
