//! Atomic counters used as dependency and completion signals between jobs.

use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, OnceLock, Weak};

/// Receives a wake-check after every counter mutation.
///
/// Implemented by the scheduler's shared state; the indirection keeps the
/// counter free of any direct dependency on the wait list.
pub(crate) trait CounterObserver: Send + Sync {
    fn counter_changed(&self, counter: &Counter);
}

struct CounterInner {
    value: AtomicI64,
    /// Installed when the counter is first registered with a scheduler
    /// (parked on, attached as a completion signal, or batch-initialized).
    /// Until then nothing can be waiting on it, so the post-mutation
    /// wake-check has nothing to scan.
    observer: OnceLock<Weak<dyn CounterObserver>>,
}

/// An atomically mutable signed value observed by the wait list.
///
/// The value only changes through [`increment`](Counter::increment) and
/// [`decrement`](Counter::decrement), and every change is followed by a
/// wake-check against the wait list. Cloning yields another handle to the
/// same underlying value; the scheduler itself never creates or destroys
/// counters.
#[derive(Clone)]
pub struct Counter {
    inner: Arc<CounterInner>,
}

impl Counter {
    pub fn new(initial: i64) -> Self {
        Counter {
            inner: Arc::new(CounterInner {
                value: AtomicI64::new(initial),
                observer: OnceLock::new(),
            }),
        }
    }

    /// Adds `delta` to the value, then runs the wake-check.
    ///
    /// Release ordering on the write: effects published before the mutation
    /// are visible to any thread that observes the new value.
    pub fn increment(&self, delta: i64) {
        self.inner.value.fetch_add(delta, Ordering::Release);
        self.notify();
    }

    /// Subtracts `delta` from the value, then runs the wake-check.
    pub fn decrement(&self, delta: i64) {
        self.inner.value.fetch_sub(delta, Ordering::Release);
        self.notify();
    }

    /// Current value, with acquire ordering.
    pub fn get(&self) -> i64 {
        self.inner.value.load(Ordering::Acquire)
    }

    /// Identity of the underlying allocation; the wait-list key component.
    pub(crate) fn id(&self) -> usize {
        Arc::as_ptr(&self.inner) as usize
    }

    /// Hooks this counter up to a scheduler. Idempotent for the same
    /// scheduler; linking one counter to two schedulers is a logic error.
    pub(crate) fn link(&self, observer: Weak<dyn CounterObserver>) {
        let installed = self.inner.observer.get_or_init(|| observer.clone());
        debug_assert!(
            std::ptr::eq(
                Weak::as_ptr(installed) as *const (),
                Weak::as_ptr(&observer) as *const (),
            ),
            "counter linked to two different schedulers"
        );
    }

    /// The wake-check: asks the wait list to move every job whose key matches
    /// this counter's current value back to the ready queues. Runs after
    /// every mutation, unconditionally, so no interleaving of registrations
    /// and mutations can strand a waiter.
    fn notify(&self) {
        if let Some(observer) = self.inner.observer.get().and_then(Weak::upgrade) {
            observer.counter_changed(self);
        }
    }
}

impl fmt::Debug for Counter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Counter").field("value", &self.get()).finish()
    }
}
