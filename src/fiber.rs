//! Fibers: switchable stacks of execution multiplexed onto worker threads.
//!
//! Context switching is delegated to `corosensei`, which provides the
//! save/restore-and-swap-stack semantics (including the entry-point stack
//! alignment rules) behind a portable interface.

use crate::closure::JobClosure;
use crate::context::JobContext;
use crate::counter::Counter;
use crate::job_system::Shared;
use corosensei::stack::DefaultStack;
use corosensei::{Coroutine, CoroutineResult, Yielder};

/// Index of a fiber's slot inside the pool.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FiberId(pub(crate) usize);

/// Raw pointer to the scheduler's shared state, handed into the trampoline.
/// Valid for as long as any worker thread is running.
#[derive(Clone, Copy)]
pub(crate) struct SharedPtr(pub(crate) *const Shared);

unsafe impl Send for SharedPtr {}

pub(crate) enum FiberInput {
    /// Bind a job to the fiber and run its body from the top.
    Start {
        body: JobClosure,
        shared: SharedPtr,
        fiber: FiberId,
        name: &'static str,
    },
    /// Continue a suspended body at its last yield point.
    Resume,
}

pub(crate) enum FiberYield {
    /// The body returned; the fiber is ready for reuse.
    Finished,
    /// The body suspended until `counter` reaches `target`.
    Wait { counter: Counter, target: i64 },
    /// Cooperative reschedule with no dependency attached.
    Reschedule,
}

/// What the scheduling loop observes after switching into a fiber.
pub(crate) enum FiberExit {
    Finished,
    Waiting { counter: Counter, target: i64 },
    Rescheduled,
}

/// A reusable stackful execution context.
///
/// The coroutine runs a trampoline loop: each `Start` input binds a job,
/// runs its body, and yields `Finished`; the loop then parks awaiting the
/// next job. The coroutine never returns, so a released fiber resumes at
/// the top of the loop instead of unwinding.
pub struct Fiber {
    /// The `'static` lifetime is a promise that the stack outlives the
    /// coroutine; the field order below makes the coroutine drop first.
    coroutine: Option<Coroutine<FiberInput, FiberYield, (), &'static mut DefaultStack>>,

    /// Exclusively owned for the fiber's whole lifetime; never resized,
    /// moved, or shared.
    #[allow(dead_code)]
    stack: Box<DefaultStack>,
}

unsafe impl Send for Fiber {}

impl Fiber {
    /// Allocates the fiber's stack and parks the trampoline at its entry.
    /// Stack allocation failure is fatal.
    pub(crate) fn new(stack_size: usize) -> Self {
        let mut stack =
            Box::new(DefaultStack::new(stack_size).expect("failed to allocate fiber stack"));

        // SAFETY: `coroutine` is declared before `stack`, so it drops first;
        // the stack stays alive for the coroutine's entire lifetime.
        let stack_ref = unsafe {
            std::mem::transmute::<&mut DefaultStack, &'static mut DefaultStack>(stack.as_mut())
        };

        let coroutine = Coroutine::with_stack(stack_ref, move |yielder, mut input: FiberInput| {
            use std::panic::{catch_unwind, AssertUnwindSafe};

            loop {
                if let FiberInput::Start {
                    body,
                    shared,
                    fiber,
                    name,
                } = input
                {
                    let ctx = JobContext::new(shared, yielder as *const _, fiber, name);

                    // A panic must not cross the context-switch boundary.
                    if let Err(payload) = catch_unwind(AssertUnwindSafe(|| body.invoke(&ctx))) {
                        tracing::error!(
                            job = name,
                            "job body panicked: {}",
                            panic_message(&payload)
                        );
                    }
                }

                input = yielder.suspend(FiberYield::Finished);
            }
        });

        Fiber {
            coroutine: Some(coroutine),
            stack,
        }
    }

    /// Switches the calling thread into the fiber until it finishes or
    /// suspends.
    ///
    /// The caller's stack and locals are exactly as they were once this
    /// returns; the fiber resumes at its last yield point, or at the
    /// trampoline entry on first use.
    pub(crate) fn resume(&mut self, input: FiberInput) -> FiberExit {
        let Some(coroutine) = self.coroutine.as_mut() else {
            return FiberExit::Finished;
        };

        match coroutine.resume(input) {
            CoroutineResult::Yield(FiberYield::Finished) => FiberExit::Finished,
            CoroutineResult::Yield(FiberYield::Wait { counter, target }) => {
                FiberExit::Waiting { counter, target }
            }
            CoroutineResult::Yield(FiberYield::Reschedule) => FiberExit::Rescheduled,
            // The trampoline loops forever; a plain return only happens if
            // the coroutine was already torn down.
            CoroutineResult::Return(()) => FiberExit::Finished,
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "unknown panic payload"
    }
}
