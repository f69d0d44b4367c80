//! Cooperative yield point

use std::future::poll_fn;
use std::task::Poll;

/// Suspend once, letting every other ready task on the executor run first
///
/// The waker is fired before returning `Pending`, so the caller is rescheduled
/// straight away rather than waiting on any event.
pub async fn yield_now() {
    let mut yielded = false;
    poll_fn(|cx| {
        if yielded {
            Poll::Ready(())
        } else {
            yielded = true;
            cx.waker().wake_by_ref();
            Poll::Pending
        }
    })
    .await;
}
