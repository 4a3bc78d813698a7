//! The scheduler: shared state, worker threads, and the public submission
//! and synchronization surface.

use crate::bridge::{
    spawn_gpu_poller, spawn_io_service, GpuTimeline, GpuWaitTable, IoCallback, IoRequest,
};
use crate::counter::{Counter, CounterObserver};
use crate::fiber_pool::FiberPool;
use crate::job::{Job, JobDeclaration, Priority};
use crate::queue::QueueSet;
use crate::wait_list::WaitList;
use crate::worker::{preferred_affinity, spawn_worker, WorkerState};
use crate::WorkerPinning;
use crossbeam::channel::Sender;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use thiserror::Error;

/// Submission failures surfaced to callers. The scheduler never retries on a
/// submitter's behalf.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SubmitError {
    /// The target queue is at capacity; retry, drop, or escalate.
    #[error("job queue is full")]
    QueueFull,
    /// The bridge service the request was addressed to is not running.
    #[error("bridge service is not running")]
    ServiceUnavailable,
}

#[derive(Debug, Error)]
#[error("{panicked} scheduler thread(s) panicked")]
pub struct ShutdownError {
    pub panicked: usize,
}

/// Tuning knobs for a [`JobSystem`].
#[derive(Clone, Debug)]
pub struct JobSystemConfig {
    /// Worker thread count. Defaults to `max(1, cores - 2)`, reserving
    /// headroom for the submitting thread and the bridge services.
    pub worker_threads: Option<usize>,
    /// Stack size for each fiber in bytes. Default: 512KB.
    pub fiber_stack_size: usize,
    /// Number of fibers pre-allocated at startup. Default: 128.
    pub fiber_pool_capacity: usize,
    /// Capacity of each individual priority/affinity queue. Default: 1024.
    pub queue_capacity: usize,
    pub pinning: WorkerPinning,
}

impl Default for JobSystemConfig {
    fn default() -> Self {
        JobSystemConfig {
            worker_threads: None,
            fiber_stack_size: 512 * 1024,
            fiber_pool_capacity: 128,
            queue_capacity: 1024,
            pinning: WorkerPinning::None,
        }
    }
}

/// State shared by workers, bridge services, and submitters.
pub(crate) struct Shared {
    pub(crate) queues: QueueSet,
    pub(crate) wait_list: WaitList,
    pub(crate) fiber_pool: FiberPool,
    pub(crate) gpu_waits: GpuWaitTable,
    pub(crate) shutdown: AtomicBool,
    self_weak: Weak<Shared>,
}

impl Shared {
    /// The wake hook installed into counters on first registration.
    pub(crate) fn observer(&self) -> Weak<dyn CounterObserver> {
        let weak: Weak<dyn CounterObserver> = self.self_weak.clone();
        weak
    }

    pub(crate) fn submit(&self, declaration: JobDeclaration) -> Result<(), SubmitError> {
        if let Some(completion) = &declaration.completion {
            completion.link(self.observer());
        }
        self.queues
            .push(Job::new(declaration))
            .map_err(|_| SubmitError::QueueFull)
    }

    /// Bridge-side submission: the job cannot be handed back, so a full
    /// queue is waited out instead of reported.
    pub(crate) fn submit_retrying(&self, declaration: JobDeclaration) {
        if let Some(completion) = &declaration.completion {
            completion.link(self.observer());
        }
        self.queues.push_retrying(Job::new(declaration));
    }

    pub(crate) fn submit_when(
        &self,
        declaration: JobDeclaration,
        counter: &Counter,
        target: i64,
    ) -> Result<(), SubmitError> {
        if let Some(completion) = &declaration.completion {
            completion.link(self.observer());
        }
        counter.link(self.observer());

        let mut job = Job::new(declaration);
        job.wait = Some((counter.clone(), target));
        self.wait_list
            .park(job, counter, target, &self.queues)
            .map_err(|_| SubmitError::QueueFull)
    }

    pub(crate) fn submit_gpu_wait(
        &self,
        timeline: Arc<dyn GpuTimeline>,
        value: u64,
        counter: Counter,
    ) {
        counter.link(self.observer());
        self.gpu_waits.register(timeline, value, counter);
    }
}

impl CounterObserver for Shared {
    fn counter_changed(&self, counter: &Counter) {
        self.wait_list.on_counter_changed(counter, &self.queues);
    }
}

/// The scheduler handle.
///
/// Owns the fiber pool, queue set, wait list, worker threads, and bridge
/// services. Constructed explicitly and passed to call sites; there is no
/// process-wide singleton.
///
/// ```no_run
/// use weft::{Counter, JobDeclaration, JobSystem};
///
/// let system = JobSystem::new();
/// let done = Counter::new(1);
///
/// system
///     .run(JobDeclaration::new(|_ctx| println!("hello from a fiber"))
///         .with_completion(done.clone()))
///     .unwrap();
///
/// system.wait_for(&done, 0);
/// system.shutdown().unwrap();
/// ```
pub struct JobSystem {
    shared: Arc<Shared>,
    workers: Vec<JoinHandle<()>>,
    io_tx: Option<Sender<IoRequest>>,
    io_thread: Option<JoinHandle<()>>,
    gpu_thread: Option<JoinHandle<()>>,
}

impl JobSystem {
    /// Starts a scheduler with the default configuration.
    pub fn new() -> Self {
        Self::with_config(JobSystemConfig::default())
    }

    /// Starts worker threads and bridge services per `config`.
    pub fn with_config(config: JobSystemConfig) -> Self {
        let worker_count = config.worker_threads.unwrap_or_else(|| {
            let cores = thread::available_parallelism().map(|n| n.get()).unwrap_or(4);
            cores.saturating_sub(2).max(1)
        });

        let shared = Arc::new_cyclic(|weak| Shared {
            queues: QueueSet::new(config.queue_capacity),
            wait_list: WaitList::new(),
            fiber_pool: FiberPool::new(config.fiber_pool_capacity, config.fiber_stack_size),
            gpu_waits: GpuWaitTable::new(),
            shutdown: AtomicBool::new(false),
            self_weak: weak.clone(),
        });

        let workers = (0..worker_count)
            .map(|id| {
                spawn_worker(
                    Arc::clone(&shared),
                    WorkerState {
                        id,
                        preferred: preferred_affinity(id),
                    },
                    config.pinning,
                )
            })
            .collect();

        let (io_tx, io_thread) = spawn_io_service(Arc::clone(&shared));
        let gpu_thread = spawn_gpu_poller(Arc::clone(&shared));

        tracing::info!(workers = worker_count, "job system started");

        JobSystem {
            shared,
            workers,
            io_tx: Some(io_tx),
            io_thread: Some(io_thread),
            gpu_thread: Some(gpu_thread),
        }
    }

    /// Fire-and-forget submission; the job is enqueued immediately.
    pub fn run(&self, declaration: JobDeclaration) -> Result<(), SubmitError> {
        self.shared.submit(declaration)
    }

    /// Submission gated on `counter` reaching `target`: the job is parked in
    /// the wait list and becomes runnable only once the condition holds.
    pub fn run_when(
        &self,
        declaration: JobDeclaration,
        counter: &Counter,
        target: i64,
    ) -> Result<(), SubmitError> {
        self.shared.submit_when(declaration, counter, target)
    }

    /// Submits `jobs` as a batch completing into `counter`.
    ///
    /// The counter is driven up by `jobs.len()` and each job decrements it
    /// by one on completion, so waiting for the counter's starting value
    /// waits for all of them:
    ///
    /// ```no_run
    /// use weft::{Counter, JobDeclaration, JobSystem};
    ///
    /// let system = JobSystem::new();
    /// let all_done = Counter::new(0);
    /// let jobs = (0..8)
    ///     .map(|_| JobDeclaration::new(|_ctx| { /* work */ }))
    ///     .collect();
    ///
    /// system.run_batch(jobs, &all_done).unwrap();
    /// system.wait_for(&all_done, 0);
    /// ```
    pub fn run_batch(
        &self,
        jobs: Vec<JobDeclaration>,
        counter: &Counter,
    ) -> Result<(), SubmitError> {
        counter.link(self.shared.observer());

        let total = jobs.len() as i64;
        counter.increment(total);

        let mut submitted = 0;
        for declaration in jobs {
            match self.shared.submit(declaration.with_completion(counter.clone())) {
                Ok(()) => submitted += 1,
                Err(err) => {
                    // Roll the unsubmitted share back out of the counter so
                    // waiters are not stranded on jobs that never ran.
                    counter.decrement(total - submitted);
                    return Err(err);
                }
            }
        }
        Ok(())
    }

    /// Blocks the calling thread until `counter` reaches `target`.
    ///
    /// This is a busy-poll with a cooperative yield, usable from non-worker
    /// threads (typically the main thread at a frame boundary). It is kept a
    /// spin deliberately: workers run on their own OS threads, so the poll
    /// starves nothing, and an OS blocking wait would add wakeup latency to
    /// frame-critical sections.
    ///
    /// The waiting thread does not execute jobs. If every worker fiber is
    /// parked on a chain that can only be advanced by this thread's
    /// submission, the wait cannot make progress; keep dependency chains
    /// worker-resolvable.
    pub fn wait_for(&self, counter: &Counter, target: i64) {
        while counter.get() != target {
            for _ in 0..64 {
                std::hint::spin_loop();
            }
            thread::yield_now();
        }
    }

    /// Hands a file read to the I/O service. The callback runs as a normal
    /// job at `priority` once the read completes.
    pub fn request_io(
        &self,
        path: PathBuf,
        callback: IoCallback,
        priority: Priority,
    ) -> Result<(), SubmitError> {
        let sender = self.io_tx.as_ref().ok_or(SubmitError::ServiceUnavailable)?;
        sender
            .send(IoRequest {
                path,
                callback,
                priority,
            })
            .map_err(|_| SubmitError::ServiceUnavailable)
    }

    /// Registers a GPU timeline wait: once `timeline` reaches `value`, the
    /// poll service decrements `counter` by one.
    pub fn submit_gpu_wait(&self, timeline: Arc<dyn GpuTimeline>, value: u64, counter: Counter) {
        self.shared.submit_gpu_wait(timeline, value, counter);
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    pub fn fiber_pool_capacity(&self) -> usize {
        self.shared.fiber_pool.capacity()
    }

    pub fn fibers_in_use(&self) -> usize {
        self.shared.fiber_pool.in_use()
    }

    pub fn fibers_available(&self) -> usize {
        self.shared.fiber_pool.available()
    }

    /// (in-use, free) fiber counts taken in a single pass over the pool.
    pub fn fiber_usage(&self) -> (usize, usize) {
        self.shared.fiber_pool.usage()
    }

    /// Stops the scheduler and joins all of its threads.
    ///
    /// Jobs still queued or parked in the wait list when the stop flag is
    /// observed never run; shutdown does not flush pending work.
    pub fn shutdown(mut self) -> Result<(), ShutdownError> {
        let panicked = self.stop();
        tracing::info!("job system stopped");
        if panicked > 0 {
            Err(ShutdownError { panicked })
        } else {
            Ok(())
        }
    }

    fn stop(&mut self) -> usize {
        self.shared.shutdown.store(true, Ordering::Relaxed);
        // Disconnects the io service's receiver so its blocking recv ends.
        drop(self.io_tx.take());

        let mut panicked = 0;
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                panicked += 1;
            }
        }
        if let Some(thread) = self.io_thread.take() {
            if thread.join().is_err() {
                panicked += 1;
            }
        }
        if let Some(thread) = self.gpu_thread.take() {
            if thread.join().is_err() {
                panicked += 1;
            }
        }
        panicked
    }
}

impl Drop for JobSystem {
    fn drop(&mut self) {
        self.stop();
    }
}

impl Default for JobSystem {
    fn default() -> Self {
        Self::new()
    }
}
