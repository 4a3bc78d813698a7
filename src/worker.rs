//! Worker threads: each runs a cooperative-fiber scheduling loop.

use crate::fiber::{FiberExit, FiberInput, SharedPtr};
use crate::job::{Affinity, Job};
use crate::job_system::Shared;
use crate::WorkerPinning;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Per-worker scheduling state, threaded through the loop explicitly rather
/// than stashed in thread-locals.
pub(crate) struct WorkerState {
    pub id: usize,
    pub preferred: Affinity,
}

/// Workers 0..2 prefer the three concrete resource classes so those lanes
/// always have a dedicated drainer; everyone else takes work as it comes.
pub(crate) fn preferred_affinity(id: usize) -> Affinity {
    match id {
        0 => Affinity::Graphics,
        1 => Affinity::Compute,
        2 => Affinity::Transfer,
        _ => Affinity::Any,
    }
}

pub(crate) fn spawn_worker(
    shared: Arc<Shared>,
    state: WorkerState,
    pinning: WorkerPinning,
) -> JoinHandle<()> {
    let id = state.id;
    thread::Builder::new()
        .name(format!("weft-worker-{id}"))
        .spawn(move || {
            if pinning == WorkerPinning::Linear {
                if let Some(core_ids) = core_affinity::get_core_ids() {
                    if let Some(core) = core_ids.get(id) {
                        core_affinity::set_for_current(*core);
                    }
                }
            }
            run_loop(shared, state);
        })
        .expect("failed to spawn worker thread")
}

/// The scheduling loop. Pops ready work, switches into its fiber, and files
/// the outcome: released on finish, parked on suspension, requeued on a
/// cooperative yield. Never sleep-blocks; an empty pass spins briefly and
/// yields the OS thread so the pool stays responsive.
fn run_loop(shared: Arc<Shared>, state: WorkerState) {
    tracing::debug!(worker = state.id, affinity = ?state.preferred, "worker started");
    let shared_ptr = SharedPtr(Arc::as_ptr(&shared));

    while !shared.shutdown.load(Ordering::Relaxed) {
        match shared.queues.pop(state.preferred) {
            Some(job) => dispatch(&shared, shared_ptr, job),
            None => {
                for _ in 0..64 {
                    std::hint::spin_loop();
                }
                thread::yield_now();
            }
        }
    }

    tracing::debug!(worker = state.id, "worker stopped");
}

fn dispatch(shared: &Shared, shared_ptr: SharedPtr, mut job: Job) {
    // A wake can race with a later counter mutation, so a popped job may no
    // longer be runnable. Park it again rather than running it early.
    if let Some((counter, target)) = job.wait.clone() {
        if counter.get() != target {
            if let Err(back) = shared.wait_list.park(job, &counter, target, &shared.queues) {
                // Satisfied between the check and the park: keep it runnable.
                shared.queues.push_retrying(back);
            }
            return;
        }
    }

    let (fiber, input) = match job.fiber {
        // A resumed job switches back into its already-initialized fiber.
        Some(fiber) => (fiber, FiberInput::Resume),
        None => {
            let fiber = shared.fiber_pool.acquire();
            let body = job.body.take().expect("fresh job has no body");
            (
                fiber,
                FiberInput::Start {
                    body,
                    shared: shared_ptr,
                    fiber,
                    name: job.name,
                },
            )
        }
    };
    job.fiber = Some(fiber);

    // SAFETY: this worker holds the slot claim for `fiber`, either fresh
    // from `acquire` or carried by the resumed job.
    let exit = unsafe { shared.fiber_pool.with_fiber(fiber, |f| f.resume(input)) };

    match exit {
        FiberExit::Finished => {
            if let Some(completion) = job.completion.take() {
                completion.decrement(1);
            }
            shared.fiber_pool.release(fiber);
        }
        FiberExit::Waiting { counter, target } => {
            // The fiber stays claimed; the job carries it through the wait
            // list and back for the resume.
            job.wait = Some((counter.clone(), target));
            if let Err(back) = shared.wait_list.park(job, &counter, target, &shared.queues) {
                shared.queues.push_retrying(back);
            }
        }
        FiberExit::Rescheduled => {
            shared.queues.push_retrying(job);
        }
    }
}
