//! Completion groups
//!
//! A [`Group`] counts outstanding units of work. `enter()` and `leave()` move
//! the count up and down, `notify()` registers an action for the next time the
//! count is zero, and `wait()` suspends until it is.
//!
//! # Ordering
//!
//! Callers may race `enter`, `leave` and `notify` from independent tasks. None
//! of them touch the count directly: each call becomes one work item on the
//! group's private [`FifoQueue`], and only that queue's drain worker mutates the
//! count and the handler list. Effects are therefore applied in exactly the
//! order the calls were issued, whatever order unrelated suspensions resolve in.
//!
//! `wait()` does not occupy a slot on that queue while it waits. It registers a
//! one-shot wake handler like any other `notify` and suspends on it, so the
//! funnel keeps processing enters and leaves in the meantime.
//!
//! # Example
//!
//! ```rust,no_run
//! use dispatch_async::{Group, Queue};
//!
//! # async fn example() {
//! let group = Group::new();
//! for i in 0..3 {
//!     group.enter();
//!     let member = group.clone();
//!     Queue::global().dispatch(move || {
//!         println!("unit {i} done");
//!         member.leave();
//!     });
//! }
//! group.notify(Queue::main(), || println!("all units done"));
//! group.wait().await;
//! # }
//! ```

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use compio_sync::FifoQueue;
use futures::channel::oneshot;
use tracing::{error, trace, warn};

use crate::queue::Queue;

/// Enter/leave counter with wait and notify, applied in call order
///
/// Cloning yields another handle to the same group.
#[derive(Clone)]
pub struct Group {
    inner: Arc<GroupInner>,
}

struct GroupInner {
    /// Enters minus leaves as issued by callers. Held while the matching item
    /// is pushed onto `funnel`, so issue order and application order agree and
    /// an unmatched `leave()` is caught at its call site.
    issued: Mutex<usize>,
    /// Single drain worker that owns every mutation of `state`
    funnel: FifoQueue,
    state: Arc<Mutex<GroupState>>,
}

/// Only ever locked from the funnel's drain worker
#[derive(Default)]
struct GroupState {
    pending: usize,
    handlers: Vec<Handler>,
}

/// Deferred action waiting for the next zero-crossing
enum Handler {
    /// Run `action` on `queue`
    Dispatch {
        queue: Queue,
        action: Box<dyn FnOnce() + Send>,
    },
    /// Resume a caller suspended in `wait()`
    Wake(oneshot::Sender<()>),
}

impl Handler {
    fn fire(self) {
        match self {
            Self::Dispatch { queue, action } => queue.dispatch(action),
            Self::Wake(waiter) => {
                // The waiter may have given up; nothing to resume then
                let _ = waiter.send(());
            }
        }
    }
}

impl GroupState {
    /// Take every registered handler if the count is at zero
    fn take_ready(&mut self) -> Vec<Handler> {
        if self.pending == 0 {
            std::mem::take(&mut self.handlers)
        } else {
            Vec::new()
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Group {
    /// Create an idle group
    ///
    /// The group's drain worker is a task on the creating compio runtime.
    /// `enter`, `leave` and `notify` may be called from anywhere, but once that
    /// runtime exits they are dropped with an error log and `wait` returns
    /// without the count reaching zero.
    ///
    /// # Panics
    ///
    /// Panics if called outside a compio runtime.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(GroupInner {
                issued: Mutex::new(0),
                funnel: FifoQueue::new(),
                state: Arc::new(Mutex::new(GroupState::default())),
            }),
        }
    }

    /// Record one more outstanding unit of work
    ///
    /// Must be paired with a later [`leave`](Self::leave).
    pub fn enter(&self) {
        let mut issued = lock(&self.inner.issued);
        *issued += 1;
        self.apply(|state| {
            state.pending += 1;
        });
    }

    /// Mark one outstanding unit of work as finished
    ///
    /// # Panics
    ///
    /// Panics if there is no matching `enter()`: more leaves than enters is a
    /// caller bug and is not clamped.
    pub fn leave(&self) {
        let mut issued = lock(&self.inner.issued);
        assert!(*issued > 0, "leave() called more times than enter()");
        *issued -= 1;
        self.apply(|state| {
            state.pending -= 1;
            if state.pending == 0 {
                trace!(handlers = state.handlers.len(), "group reached zero");
            }
        });
    }

    /// Run `action` on `queue` once the group is next idle
    ///
    /// If nothing is outstanding when the registration is applied, the action
    /// is dispatched right away. Each registration fires exactly once.
    pub fn notify<F>(&self, queue: &Queue, action: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.register(Handler::Dispatch {
            queue: queue.clone(),
            action: Box::new(action),
        });
    }

    /// Suspend until every entered unit of work has left
    ///
    /// Returns as soon as the funnel sees a zero count; calls issued before
    /// this one are accounted for, later ones are not.
    pub async fn wait(&self) {
        let (waker, woken) = oneshot::channel();
        self.register(Handler::Wake(waker));
        if woken.await.is_err() {
            warn!("group drain worker stopped before wait() could be resumed");
        }
    }

    fn register(&self, handler: Handler) {
        let _issued = lock(&self.inner.issued);
        self.apply(move |state| {
            state.handlers.push(handler);
        });
    }

    /// Push a mutation onto the funnel; caller holds the `issued` lock
    ///
    /// Handlers made ready by the mutation fire after the state lock is dropped.
    fn apply<F>(&self, mutation: F)
    where
        F: FnOnce(&mut GroupState) + Send + 'static,
    {
        let state = Arc::clone(&self.inner.state);
        let submitted = self.inner.funnel.enqueue_fn(move || {
            let ready = {
                let mut state = lock(&state);
                mutation(&mut *state);
                state.take_ready()
            };
            for handler in ready {
                handler.fire();
            }
        });
        if let Err(e) = submitted {
            error!("group operation dropped: {}", e);
        }
    }
}

impl Default for Group {
    fn default() -> Self {
        Self::new()
    }
}
