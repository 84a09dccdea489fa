//! Set-once completion for conditional reads.
//!
//! A [`WaitFuture`] is the caller-facing handle of one pending wait. Its
//! shared [`WaitCell`] accepts exactly one resolution; later attempts are
//! ignored, so a reactor callback and the owning caller can never race on
//! the outcome. The optional completion callback fires once, at resolution,
//! on both the success and failure branches.

use crate::error::StreamError;
use parking_lot::Mutex;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, Waker};

/// Outcome of a wait: the available byte count on success.
pub type WaitOutcome = Result<usize, StreamError>;

/// Callback invoked exactly once when a wait resolves.
pub type CompletionCallback = Box<dyn FnOnce(&WaitOutcome) + Send>;

/// Shared set-once resolution slot.
///
/// The resolving side of a [`WaitFuture`]: held by whatever drives the wait
/// (a dispatch hook, a blocking read loop, an external feeder).
pub struct WaitCell {
    state: Mutex<CellState>,
}

struct CellState {
    /// Set by the winning `resolve` before anything else; closes the slot
    /// to later attempts without yet making the resolution observable.
    claimed: bool,
    /// Set in the same critical section that stores the outcome, so
    /// `is_done` never reports a resolution whose outcome is not yet
    /// available to `try_take`.
    resolved: bool,
    outcome: Option<WaitOutcome>,
    callback: Option<CompletionCallback>,
    waker: Option<Waker>,
}

impl WaitCell {
    fn new(callback: Option<CompletionCallback>) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(CellState {
                claimed: false,
                resolved: false,
                outcome: None,
                callback,
                waker: None,
            }),
        })
    }

    /// Resolves the cell. Returns false if it was already resolved; the
    /// second outcome is dropped.
    ///
    /// The caller never observes a half-resolved cell: the claim is
    /// internal, the callback runs while the wait still reads as pending,
    /// and `resolved` is set in the same critical section that stores the
    /// outcome.
    pub fn resolve(&self, outcome: WaitOutcome) -> bool {
        let callback = {
            let mut state = self.state.lock();
            if state.claimed {
                return false;
            }
            state.claimed = true;
            state.callback.take()
        };
        // Callback runs outside the lock: it may inspect the future.
        if let Some(callback) = callback {
            callback(&outcome);
        }
        let waker = {
            let mut state = self.state.lock();
            state.outcome = Some(outcome);
            state.resolved = true;
            state.waker.take()
        };
        if let Some(waker) = waker {
            waker.wake();
        }
        true
    }

    /// True once the cell has been resolved.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.state.lock().resolved
    }
}

/// Handle to one pending wait; resolves with the available byte count.
///
/// Implements [`Future`]; the outcome is delivered once, through either
/// `poll` or [`try_take`](Self::try_take).
pub struct WaitFuture {
    cell: Arc<WaitCell>,
}

impl WaitFuture {
    /// Creates an unresolved future plus the cell that resolves it.
    #[must_use]
    pub fn pending(callback: Option<CompletionCallback>) -> (Self, Arc<WaitCell>) {
        let cell = WaitCell::new(callback);
        (Self { cell: cell.clone() }, cell)
    }

    /// Creates a future resolved on the spot, firing the callback now.
    #[must_use]
    pub fn ready(outcome: WaitOutcome, callback: Option<CompletionCallback>) -> Self {
        let (future, cell) = Self::pending(callback);
        cell.resolve(outcome);
        future
    }

    /// True once the wait has resolved (successfully or not).
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.cell.is_done()
    }

    /// Takes the outcome if resolved and not yet delivered.
    #[must_use]
    pub fn try_take(&self) -> Option<WaitOutcome> {
        self.cell.state.lock().outcome.take()
    }
}

impl Future for WaitFuture {
    type Output = WaitOutcome;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut state = self.cell.state.lock();
        if let Some(outcome) = state.outcome.take() {
            return Poll::Ready(outcome);
        }
        state.waker = Some(cx.waker().clone());
        Poll::Pending
    }
}

impl std::fmt::Debug for WaitFuture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WaitFuture")
            .field("done", &self.is_done())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::task::Wake;

    struct NoopWaker;

    impl Wake for NoopWaker {
        fn wake(self: Arc<Self>) {}
    }

    fn noop_waker() -> Waker {
        Waker::from(Arc::new(NoopWaker))
    }

    fn init_test(name: &str) {
        crate::test_utils::init_test_logging();
        crate::test_phase!(name);
    }

    #[test]
    fn resolves_exactly_once() {
        init_test("resolves_exactly_once");
        let (future, cell) = WaitFuture::pending(None);
        let first = cell.resolve(Ok(4));
        crate::assert_with_log!(first, "first resolve", true, first);
        let second = cell.resolve(Ok(99));
        crate::assert_with_log!(!second, "second resolve rejected", false, second);
        let outcome = future.try_take();
        let got_four = matches!(outcome, Some(Ok(4)));
        crate::assert_with_log!(got_four, "outcome is first", true, got_four);
        crate::test_complete!("resolves_exactly_once");
    }

    #[test]
    fn callback_fires_once_on_failure() {
        init_test("callback_fires_once_on_failure");
        let fired = Arc::new(AtomicUsize::new(0));
        let fired_in_cb = fired.clone();
        let (_future, cell) = WaitFuture::pending(Some(Box::new(move |outcome| {
            assert!(outcome.is_err());
            fired_in_cb.fetch_add(1, Ordering::SeqCst);
        })));
        cell.resolve(Err(StreamError::eof()));
        cell.resolve(Err(StreamError::eof()));
        let count = fired.load(Ordering::SeqCst);
        crate::assert_with_log!(count == 1, "callback count", 1, count);
        crate::test_complete!("callback_fires_once_on_failure");
    }

    #[test]
    fn outcome_is_visible_as_soon_as_done() {
        init_test("outcome_is_visible_as_soon_as_done");
        // A slow completion callback must not open a window where the wait
        // reads as done before its outcome can be taken.
        for round in 0..100 {
            let (future, cell) = WaitFuture::pending(Some(Box::new(|_| {
                std::thread::sleep(std::time::Duration::from_millis(1));
            })));
            let resolver = std::thread::spawn(move || {
                cell.resolve(Ok(3));
            });
            while !future.is_done() {
                std::hint::spin_loop();
            }
            let outcome = future.try_take();
            let present = matches!(outcome, Some(Ok(3)));
            crate::assert_with_log!(present, "outcome present once done", round, present);
            resolver.join().expect("resolver thread");
        }
        crate::test_complete!("outcome_is_visible_as_soon_as_done");
    }

    #[test]
    fn ready_future_is_done_immediately() {
        init_test("ready_future_is_done_immediately");
        let future = WaitFuture::ready(Ok(7), None);
        crate::assert_with_log!(future.is_done(), "done", true, future.is_done());
        let outcome = future.try_take();
        let got = matches!(outcome, Some(Ok(7)));
        crate::assert_with_log!(got, "outcome", true, got);
        crate::test_complete!("ready_future_is_done_immediately");
    }

    #[test]
    fn poll_wakes_after_resolution() {
        init_test("poll_wakes_after_resolution");
        let (mut future, cell) = WaitFuture::pending(None);
        let waker = noop_waker();
        let mut cx = Context::from_waker(&waker);
        let pending = Pin::new(&mut future).poll(&mut cx).is_pending();
        crate::assert_with_log!(pending, "pending before resolve", true, pending);
        cell.resolve(Ok(2));
        let ready = matches!(Pin::new(&mut future).poll(&mut cx), Poll::Ready(Ok(2)));
        crate::assert_with_log!(ready, "ready after resolve", true, ready);
        crate::test_complete!("poll_wakes_after_resolution");
    }
}
