//! Counting semaphore with FIFO hand-off for compio
//!
//! Unlike a concurrency limiter, this semaphore follows classic counting
//! semantics: the count may start at zero, `release()` may be called without a
//! matching `acquire()`, and while callers are suspended the count is negative
//! (its magnitude is the number of suspended waiters).
//!
//! # Example
//!
//! ```rust,no_run
//! use compio_sync::Semaphore;
//!
//! # async fn example() {
//! let semaphore = Semaphore::new(1);
//!
//! let answer = semaphore
//!     .with_lock(|| async {
//!         // Only one caller at a time runs here
//!         42
//!     })
//!     .await;
//! assert_eq!(answer, 42);
//! # }
//! ```

use std::collections::VecDeque;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::channel::oneshot;
use tracing::{debug, trace, warn};

/// A cooperative counting semaphore with FIFO-fair waiters
///
/// `acquire()` never blocks an OS thread: when no permit is available the
/// caller parks a oneshot wake handle in the waiter list and suspends.
/// `release()` hands its unit directly to the oldest waiter, so a later
/// `acquire()` can never overtake a caller that is already queued.
///
/// # Design
///
/// - **Single exclusive region**: the count and the waiter list live behind one
///   mutex, so decrement+enqueue and increment+dequeue are each atomic
/// - **FIFO waiters**: waiters resume in the order they suspended
/// - **Cloneable**: clones share the same count and waiters
#[derive(Clone)]
pub struct Semaphore {
    /// Shared state between all clones of this semaphore
    inner: Arc<Mutex<SemaphoreState>>,
}

/// Count and waiters, only ever touched under the semaphore's mutex
struct SemaphoreState {
    /// Available permits when positive, negated waiter count when negative
    count: isize,
    /// Wake handles of suspended callers, oldest first
    waiters: VecDeque<oneshot::Sender<()>>,
}

impl Semaphore {
    /// Create a semaphore holding `value` permits
    ///
    /// A value of zero is valid and makes the first `acquire()` suspend until
    /// someone calls `release()`, which is the usual signalling pattern.
    ///
    /// # Example
    ///
    /// ```rust
    /// use compio_sync::Semaphore;
    ///
    /// let sem = Semaphore::new(0);
    /// assert_eq!(sem.value(), 0);
    /// assert!(!sem.try_acquire());
    /// ```
    #[must_use]
    pub fn new(value: usize) -> Self {
        let count = isize::try_from(value).unwrap_or(isize::MAX);
        Self {
            inner: Arc::new(Mutex::new(SemaphoreState {
                count,
                waiters: VecDeque::new(),
            })),
        }
    }

    fn state(&self) -> MutexGuard<'_, SemaphoreState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Take one permit, suspending until one is handed over if none is free
    ///
    /// Suspension is not cancellable by this primitive, but the returned
    /// future may be dropped while suspended (for example when raced against
    /// a timer). If that happens before a `release()` reaches it, the release
    /// skips the abandoned waiter; if it happens after, the handed-over unit is
    /// released again. Either way no permit is lost.
    pub async fn acquire(&self) {
        let receiver = {
            let mut state = self.state();
            state.count -= 1;
            if state.count >= 0 {
                return;
            }
            let (sender, receiver) = oneshot::channel();
            state.waiters.push_back(sender);
            trace!(waiters = state.waiters.len(), "semaphore acquire suspended");
            receiver
        };

        Handoff {
            semaphore: self,
            receiver: Some(receiver),
        }
        .wait()
        .await;
    }

    /// Take one permit only if it is available right now
    ///
    /// Never suspends and never drives the count negative.
    #[must_use]
    pub fn try_acquire(&self) -> bool {
        let mut state = self.state();
        if state.count > 0 {
            state.count -= 1;
            true
        } else {
            false
        }
    }

    /// Return one permit, resuming the oldest waiter if there is one
    ///
    /// Calling this without an outstanding `acquire()` is legal and simply
    /// raises the number of available permits.
    pub fn release(&self) {
        let mut state = self.state();
        state.count += 1;
        while let Some(waiter) = state.waiters.pop_front() {
            if waiter.send(()).is_ok() {
                return;
            }
            // The waiter's acquire future was dropped: undo its decrement and
            // offer the unit to the next one in line.
            warn!("semaphore waiter abandoned before its permit was handed over");
            state.count += 1;
        }
    }

    /// Acquire a permit that is released again when the guard drops
    pub async fn acquire_permit(&self) -> SemaphorePermit<'_> {
        self.acquire().await;
        SemaphorePermit { semaphore: self }
    }

    /// Run `body` while holding a permit
    ///
    /// The permit is released on every exit path, including a panic inside
    /// `body` or the returned future being dropped. The body's output,
    /// `Result` or otherwise, is passed through untouched.
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// use compio_sync::Semaphore;
    ///
    /// # async fn example() {
    /// let sem = Semaphore::new(1);
    /// let outcome: Result<(), &str> = sem.with_lock(|| async { Err("boom") }).await;
    /// assert_eq!(outcome, Err("boom"));
    /// assert_eq!(sem.value(), 1);
    /// # }
    /// ```
    pub async fn with_lock<F, Fut, T>(&self, body: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let _permit = self.acquire_permit().await;
        body().await
    }

    /// Current count: free permits if positive, minus the waiter count if negative
    ///
    /// Diagnostic only; the value may change right after it is read.
    #[must_use]
    pub fn value(&self) -> isize {
        self.state().count
    }

    /// Number of callers currently suspended in `acquire()`
    #[must_use]
    pub fn waiter_count(&self) -> usize {
        self.state().waiters.len()
    }
}

/// A suspended `acquire()` waiting for its unit
///
/// Dropped mid-wait, it closes the channel so later releases skip it, and
/// passes on a unit that was already sent but never observed.
struct Handoff<'a> {
    semaphore: &'a Semaphore,
    receiver: Option<oneshot::Receiver<()>>,
}

impl Handoff<'_> {
    async fn wait(mut self) {
        if let Some(receiver) = self.receiver.as_mut() {
            // The sender sits in `waiters` until `release` fires it, and the
            // semaphore borrow keeps the state alive meanwhile
            let _ = receiver.await;
        }
        self.receiver = None;
    }
}

impl Drop for Handoff<'_> {
    fn drop(&mut self) {
        let Some(mut receiver) = self.receiver.take() else {
            return;
        };
        receiver.close();
        if let Ok(Some(())) = receiver.try_recv() {
            debug!("semaphore waiter dropped after hand-off, passing the permit on");
            self.semaphore.release();
        }
    }
}

/// RAII guard that calls `release()` on drop
///
/// Returned by [`Semaphore::acquire_permit`] and used by
/// [`Semaphore::with_lock`].
pub struct SemaphorePermit<'a> {
    semaphore: &'a Semaphore,
}

impl Drop for SemaphorePermit<'_> {
    fn drop(&mut self) {
        self.semaphore.release();
    }
}
