//! # weft: fiber-based cooperative job scheduler
//!
//! A fixed pool of worker threads executes large numbers of lightweight,
//! independently schedulable jobs with explicit dependency ordering. A job
//! that must wait on another suspends its fiber (a switchable stack of
//! execution) instead of blocking the OS thread, and a lock-free wait list
//! wakes it when the counter it depends on reaches the awaited value.
//!
//! ## Architecture
//!
//! - **Fibers**: reusable stackful execution contexts, pooled at startup
//!   and multiplexed cooperatively onto the worker threads
//! - **Counters**: atomic dependency/completion signals; every mutation
//!   triggers a wake-check of the wait list
//! - **Queue set**: bounded lock-free MPMC queues layered by priority and
//!   resource affinity, with resumed work favored over fresh submissions
//! - **Wait list**: a lock-free bucket map from (counter, target value) to
//!   suspended jobs
//!
//! ## Example
//!
//! ```no_run
//! use weft::{Counter, JobDeclaration, JobSystem};
//!
//! let system = JobSystem::new();
//! let done = Counter::new(1);
//!
//! system
//!     .run(JobDeclaration::new(|ctx| {
//!         println!("hello from job {}", ctx.job_name());
//!     })
//!     .with_completion(done.clone()))
//!     .unwrap();
//!
//! system.wait_for(&done, 0);
//! system.shutdown().unwrap();
//! ```

pub mod bridge;
pub mod bucket_map;
pub mod closure;
pub mod context;
pub mod counter;
pub mod fiber;
pub mod fiber_pool;
pub mod job;
pub mod job_system;
pub mod stack;

mod queue;
mod wait_list;
mod worker;

use serde::{Deserialize, Serialize};

/// Strategy for pinning worker threads to CPU cores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum WorkerPinning {
    /// Standard OS scheduling.
    #[default]
    None,
    /// Worker i runs on logical processor i.
    Linear,
}

pub use bridge::{GpuTimeline, IoCallback};
pub use closure::{JobClosure, JOB_CLOSURE_CAPACITY};
pub use context::JobContext;
pub use counter::Counter;
pub use fiber::FiberId;
pub use fiber_pool::FiberPool;
pub use job::{Affinity, JobDeclaration, Priority};
pub use job_system::{JobSystem, JobSystemConfig, ShutdownError, SubmitError};
