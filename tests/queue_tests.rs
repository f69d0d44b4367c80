#![allow(clippy::unwrap_used, clippy::expect_used)]
//! Queue hierarchy: main, global, serial, concurrent and target forwarding

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use dispatch_async::main_context::MAIN_THREAD_NAME;
use dispatch_async::{Group, Queue, QueueKind};
use futures::channel::oneshot;

#[path = "common/mod.rs"]
mod test_utils;
use test_utils::test_timeout_guard;

#[compio::test]
async fn test_main_queue_runs_on_main_context() {
    let (done, finished) = oneshot::channel();
    Queue::main().dispatch(move || {
        let thread = std::thread::current().name().map(str::to_owned);
        done.send((Queue::is_main_context(), thread)).unwrap();
    });

    let (on_main, thread) = finished.await.unwrap();
    assert!(on_main);
    assert_eq!(thread.as_deref(), Some(MAIN_THREAD_NAME));
}

#[compio::test]
async fn test_global_queue_is_not_main() {
    let (done, finished) = oneshot::channel();
    Queue::global().dispatch(move || done.send(Queue::is_main_context()).unwrap());
    assert!(!finished.await.unwrap());
}

#[test]
fn test_global_and_concurrent_dispatch_from_plain_threads() {
    let _timeout = test_timeout_guard(Duration::from_secs(30));
    let (done, finished) = std::sync::mpsc::channel();

    let submitters: Vec<_> = (0..4)
        .map(|i| {
            let done = done.clone();
            std::thread::spawn(move || {
                let on_global = done.clone();
                Queue::global().dispatch(move || on_global.send(i).unwrap());
                Queue::concurrent("from-thread").dispatch(move || done.send(i + 100).unwrap());
            })
        })
        .collect();
    for submitter in submitters {
        submitter.join().unwrap();
    }
    drop(done);

    let mut seen: Vec<_> = finished.iter().collect();
    seen.sort_unstable();
    assert_eq!(seen, vec![0, 1, 2, 3, 100, 101, 102, 103]);
}

#[test]
fn test_global_work_outlives_submitting_runtime() {
    let _timeout = test_timeout_guard(Duration::from_secs(30));
    let (done, finished) = std::sync::mpsc::channel();

    compio::runtime::Runtime::new().unwrap().block_on(async move {
        Queue::global().dispatch(move || done.send(()).unwrap());
    });

    finished.recv_timeout(Duration::from_secs(10)).unwrap();
}

#[compio::test]
async fn test_main_queue_preserves_submission_order() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let (done, finished) = oneshot::channel();

    for i in 0..50 {
        let seen = seen.clone();
        Queue::main().dispatch(move || seen.lock().unwrap().push(i));
    }
    Queue::main().dispatch(move || done.send(()).unwrap());
    finished.await.unwrap();

    assert_eq!(*seen.lock().unwrap(), (0..50).collect::<Vec<_>>());
}

#[compio::test]
async fn test_concurrent_queue_completes_every_item() {
    let _timeout = test_timeout_guard(Duration::from_secs(60));
    let queue = Queue::concurrent("workers");
    let group = Group::new();
    let completed = Arc::new(AtomicUsize::new(0));

    for _ in 0..200 {
        group.enter();
        let group = group.clone();
        let completed = completed.clone();
        queue.dispatch(move || {
            completed.fetch_add(1, Ordering::SeqCst);
            group.leave();
        });
    }

    group.wait().await;
    assert_eq!(completed.load(Ordering::SeqCst), 200);
}

#[compio::test]
async fn test_target_forwards_to_serial_queue() {
    let executor = Queue::serial("executor");
    let alias_a = Queue::builder().label("a").target(&executor).build();
    let alias_b = Queue::builder()
        .label("b")
        .concurrent()
        .target(&alias_a)
        .build();
    let seen = Arc::new(Mutex::new(Vec::new()));

    // Interleaved submissions through both aliases share the executor's FIFO
    for i in 0..10 {
        let seen = seen.clone();
        let alias = if i % 2 == 0 { &alias_a } else { &alias_b };
        alias.dispatch(move || seen.lock().unwrap().push(i));
    }
    let (done, finished) = oneshot::channel();
    executor.dispatch(move || done.send(()).unwrap());
    finished.await.unwrap();

    assert_eq!(*seen.lock().unwrap(), (0..10).collect::<Vec<_>>());
    assert!(alias_b.effective_queue().ptr_eq(&executor));
    assert_eq!(alias_b.kind(), QueueKind::Concurrent);
}

#[compio::test]
async fn test_serial_work_never_overlaps() {
    let queue = Queue::serial("exclusive");
    let active = Arc::new(AtomicUsize::new(0));
    let overlaps = Arc::new(AtomicUsize::new(0));

    for _ in 0..100 {
        let active = active.clone();
        let overlaps = overlaps.clone();
        queue.dispatch(move || {
            if active.fetch_add(1, Ordering::SeqCst) != 0 {
                overlaps.fetch_add(1, Ordering::SeqCst);
            }
            std::thread::sleep(Duration::from_micros(10));
            active.fetch_sub(1, Ordering::SeqCst);
        });
    }
    let (done, finished) = oneshot::channel();
    queue.dispatch(move || done.send(()).unwrap());
    finished.await.unwrap();

    assert_eq!(overlaps.load(Ordering::SeqCst), 0);
}

#[compio::test]
async fn test_panicking_work_does_not_poison_serial_queue() {
    let queue = Queue::serial("resilient");
    let (done, finished) = oneshot::channel();

    queue.dispatch(|| panic!("work item failed"));
    queue.dispatch(move || done.send("still running").unwrap());

    assert_eq!(finished.await.unwrap(), "still running");
}

#[compio::test]
async fn test_try_dispatch_accepts_work() {
    let queue = Queue::serial("checked");
    let (done, finished) = oneshot::channel();
    queue.try_dispatch(move || done.send(()).unwrap()).unwrap();
    finished.await.unwrap();
}
