//! The context handed to every running job body.

use crate::bridge::GpuTimeline;
use crate::counter::Counter;
use crate::fiber::{FiberId, FiberInput, FiberYield, SharedPtr};
use crate::job::JobDeclaration;
use crate::job_system::{Shared, SubmitError};
use corosensei::Yielder;
use std::sync::Arc;

/// Capabilities available from inside a job body.
///
/// A `JobContext` only exists while a worker has switched into the job's
/// fiber, which is what makes the suspension calls below well-defined:
/// there is always a scheduling loop to switch back to. The context is
/// passed to the body by reference and cannot escape it.
pub struct JobContext {
    shared: *const Shared,
    yielder: *const Yielder<FiberInput, FiberYield>,
    fiber: FiberId,
    name: &'static str,
}

impl JobContext {
    pub(crate) fn new(
        shared: SharedPtr,
        yielder: *const Yielder<FiberInput, FiberYield>,
        fiber: FiberId,
        name: &'static str,
    ) -> Self {
        JobContext {
            shared: shared.0,
            yielder,
            fiber,
            name,
        }
    }

    /// A context with dangling scheduler pointers, for unit tests whose
    /// bodies never suspend or submit.
    #[cfg(test)]
    pub(crate) fn null_for_tests() -> Self {
        JobContext {
            shared: std::ptr::null(),
            yielder: std::ptr::null(),
            fiber: FiberId(0),
            name: "test",
        }
    }

    fn shared(&self) -> &Shared {
        // SAFETY: the worker that switched into this fiber holds an
        // Arc<Shared>, and the body cannot outlive the switch.
        unsafe { &*self.shared }
    }

    fn suspend(&self, request: FiberYield) {
        // SAFETY: the yielder belongs to the running coroutine and stays
        // valid until the body returns.
        let input = unsafe { (*self.yielder).suspend(request) };
        debug_assert!(matches!(input, FiberInput::Resume));
    }

    /// Suspends this job until `counter` reaches `target`.
    ///
    /// Returns immediately if the target already holds. Otherwise the fiber
    /// yields back to the worker's scheduling loop and is parked in the
    /// wait list; a later counter mutation that satisfies the condition
    /// moves it to a resume queue, and the next free worker switches back
    /// in right here.
    pub fn wait_for(&self, counter: &Counter, target: i64) {
        if counter.get() == target {
            return;
        }
        counter.link(self.shared().observer());
        tracing::trace!(job = self.name, fiber = self.fiber.0, "suspending on counter");
        self.suspend(FiberYield::Wait {
            counter: counter.clone(),
            target,
        });
    }

    /// Registers a GPU timeline wait that will decrement `counter` once
    /// `timeline` reaches `value`, then suspends until `counter` reaches
    /// `target`.
    pub fn wait_for_gpu(
        &self,
        counter: &Counter,
        target: i64,
        timeline: Arc<dyn GpuTimeline>,
        value: u64,
    ) {
        self.shared().submit_gpu_wait(timeline, value, counter.clone());
        self.wait_for(counter, target);
    }

    /// Submits a nested job from inside a running body.
    pub fn run(&self, declaration: JobDeclaration) -> Result<(), SubmitError> {
        self.shared().submit(declaration)
    }

    /// Cooperatively reschedules this job, letting other ready work run on
    /// this worker first.
    pub fn yield_now(&self) {
        self.suspend(FiberYield::Reschedule);
    }

    /// Debug name of the running job.
    pub fn job_name(&self) -> &'static str {
        self.name
    }
}
