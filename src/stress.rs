//! Stress scenarios for the dispatch primitives
//!
//! Each scenario drives one primitive hard enough to expose ordering or
//! exactly-once bugs, checks its outcome, and reports how long it took. They
//! are adapted from libdispatch's own `dispatch_pingpong` and `dispatch_group`
//! stress tests and are shared by the `dispatch-stress` binary and the
//! integration tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use anyhow::{ensure, Context, Result};
use compio_sync::{yield_now, Semaphore};
use futures::channel::oneshot;
use tracing::{debug, info};

use crate::cli::Scenario;
use crate::group::Group;
use crate::queue::Queue;

/// Outcome of one scenario run
#[derive(Debug, Clone)]
pub struct StressReport {
    pub scenario: Scenario,
    /// Number of hand-offs, work items or tasks the scenario pushed through
    pub operations: usize,
    pub duration: Duration,
}

/// Run one scenario and check its invariants
///
/// # Errors
///
/// Returns an error if the scenario observes a broken invariant.
pub async fn run_scenario(scenario: Scenario, iterations: usize, tasks: usize) -> Result<StressReport> {
    let start = Instant::now();
    let operations = match scenario {
        Scenario::PingPong => ping_pong(iterations).await?,
        Scenario::Group => group_stress(iterations).await?,
        Scenario::Semaphore => semaphore_contention(tasks).await?,
        Scenario::Serial => serial_ordering(tasks).await?,
        Scenario::All => anyhow::bail!("`all` expands to the individual scenarios"),
    };
    let report = StressReport {
        scenario,
        operations,
        duration: start.elapsed(),
    };
    info!(
        "{:?}: {} operations in {:?}",
        report.scenario, report.operations, report.duration
    );
    Ok(report)
}

/// Two serial queues hand a token back and forth `iterations` times
///
/// Returns the number of increments observed, which must be
/// `2 * iterations + 1` (the final ping ends the chain).
///
/// # Errors
///
/// Returns an error if the chain stalls or the count is off.
pub async fn ping_pong(iterations: usize) -> Result<usize> {
    struct Rally {
        ping: Queue,
        pong: Queue,
        counter: AtomicUsize,
        total: usize,
    }

    fn ping(rally: Arc<Rally>, iteration: usize, done: oneshot::Sender<()>) {
        let queue = rally.ping.clone();
        queue.dispatch(move || {
            rally.counter.fetch_add(1, Ordering::Relaxed);
            if iteration < rally.total {
                pong(rally, iteration + 1, done);
            } else {
                let _ = done.send(());
            }
        });
    }

    fn pong(rally: Arc<Rally>, iteration: usize, done: oneshot::Sender<()>) {
        let queue = rally.pong.clone();
        queue.dispatch(move || {
            rally.counter.fetch_add(1, Ordering::Relaxed);
            ping(rally, iteration, done);
        });
    }

    let rally = Arc::new(Rally {
        ping: Queue::serial("ping"),
        pong: Queue::serial("pong"),
        counter: AtomicUsize::new(0),
        total: iterations,
    });

    let (done, finished) = oneshot::channel();
    ping(Arc::clone(&rally), 0, done);
    finished.await.context("ping-pong chain was dropped")?;

    let count = rally.counter.load(Ordering::Relaxed);
    ensure!(
        count == iterations * 2 + 1,
        "ping-pong counted {count} hand-offs, expected {}",
        iterations * 2 + 1
    );
    Ok(count)
}

/// Enter the group once per work item spread over a concurrent queue, leave
/// from a serial isolation queue, then check that `wait` saw every leave and
/// that a notify registered afterwards fires exactly once
///
/// # Errors
///
/// Returns an error if the counter or the notify hit count is wrong.
pub async fn group_stress(iterations: usize) -> Result<usize> {
    let work_queue = Queue::concurrent("group-stress-work");
    let isolation = Queue::serial("group-stress-isolation");
    let group = Group::new();
    let counter = Arc::new(AtomicUsize::new(0));

    for i in 0..iterations {
        group.enter();
        let isolation = isolation.clone();
        let group = group.clone();
        let counter = Arc::clone(&counter);
        work_queue.dispatch(move || {
            // A small math workload, like the sin() loop in dispatch_group.c
            let mut x = (i % 314) as f64 / 100.0;
            for _ in 0..2_000 {
                x = x.sin();
            }
            std::hint::black_box(x);

            isolation.dispatch(move || {
                counter.fetch_add(1, Ordering::Relaxed);
                group.leave();
            });
        });
    }

    group.wait().await;
    let completed = counter.load(Ordering::Relaxed);
    ensure!(
        completed == iterations,
        "group wait returned after {completed} of {iterations} leaves"
    );

    let hits = Arc::new(AtomicUsize::new(0));
    let (done, notified) = oneshot::channel();
    let notify_hits = Arc::clone(&hits);
    group.notify(Queue::main(), move || {
        notify_hits.fetch_add(1, Ordering::SeqCst);
        let _ = done.send(());
    });
    notified.await.context("notify handler was dropped")?;

    // Another crossing must leave the consumed handler alone
    group.enter();
    group.leave();
    group.wait().await;
    ensure!(
        hits.load(Ordering::SeqCst) == 1,
        "notify fired {} times",
        hits.load(Ordering::SeqCst)
    );
    debug!("group stress finished with {completed} leaves");
    Ok(completed)
}

/// `tasks` tasks do a read-yield-write increment under a binary semaphore
///
/// # Errors
///
/// Returns an error if any increment was lost.
pub async fn semaphore_contention(tasks: usize) -> Result<usize> {
    let semaphore = Semaphore::new(1);
    let shared = Arc::new(Mutex::new(0_usize));
    let group = Group::new();

    for _ in 0..tasks {
        group.enter();
        let semaphore = semaphore.clone();
        let shared = Arc::clone(&shared);
        let group = group.clone();
        compio::runtime::spawn(async move {
            semaphore
                .with_lock(|| async {
                    let seen = *lock(&shared);
                    // Yield inside the critical section so that a broken lock
                    // lets another task read the same value
                    yield_now().await;
                    *lock(&shared) = seen + 1;
                })
                .await;
            group.leave();
        })
        .detach();
    }

    group.wait().await;
    let total = *lock(&shared);
    ensure!(total == tasks, "semaphore let {} of {tasks} increments through", total);
    ensure!(
        semaphore.value() == 1,
        "semaphore ended at {} instead of 1",
        semaphore.value()
    );
    Ok(total)
}

/// `tasks` racing tasks submit labelled items to one serial queue; the
/// execution order must equal the submission order
///
/// # Errors
///
/// Returns an error if the two orders differ.
pub async fn serial_ordering(tasks: usize) -> Result<usize> {
    let queue = Queue::serial("serial-ordering");
    let submitted = Arc::new(Mutex::new(Vec::with_capacity(tasks)));
    let executed = Arc::new(Mutex::new(Vec::with_capacity(tasks)));
    let group = Group::new();

    for i in 0..tasks {
        group.enter();
        let queue = queue.clone();
        let submitted = Arc::clone(&submitted);
        let executed = Arc::clone(&executed);
        let group = group.clone();
        compio::runtime::spawn(async move {
            if i % 3 == 0 {
                yield_now().await;
            }
            // Submission is recorded under the same lock it happens under
            let mut order = lock(&submitted);
            order.push(i);
            queue.dispatch(move || {
                lock(&executed).push(i);
                group.leave();
            });
        })
        .detach();
    }

    group.wait().await;
    let submitted = lock(&submitted).clone();
    let executed = lock(&executed).clone();
    ensure!(executed.len() == tasks, "only {} of {tasks} items ran", executed.len());
    ensure!(
        executed == submitted,
        "serial queue ran {executed:?} but items were submitted as {submitted:?}"
    );
    Ok(executed.len())
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

