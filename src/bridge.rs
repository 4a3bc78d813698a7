//! Bridges to the I/O and GPU-poll services.
//!
//! The services themselves live outside the scheduler. The contract here is
//! narrow: each service eventually re-enters the counter/job machinery
//! exactly the way an ordinary submitter would, so completion counters and
//! dependencies compose with bridged work unchanged.

use crate::context::JobContext;
use crate::counter::Counter;
use crate::job::{JobDeclaration, Priority};
use crate::job_system::Shared;
use crossbeam::channel::{self, Receiver, Sender};
use std::io;
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Completion callback for a file read; runs as a normal job.
pub type IoCallback = Box<dyn FnOnce(&JobContext, io::Result<Vec<u8>>) + Send + 'static>;

pub(crate) struct IoRequest {
    pub path: PathBuf,
    pub callback: IoCallback,
    pub priority: Priority,
}

/// A monotonically increasing GPU-side value, e.g. a timeline semaphore.
pub trait GpuTimeline: Send + Sync {
    fn value(&self) -> u64;
}

struct GpuWaitEntry {
    timeline: Arc<dyn GpuTimeline>,
    value: u64,
    counter: Counter,
}

/// Pending GPU waits, scanned by the poll service.
///
/// Mutex-protected: this is the bridge edge, not the lock-free core.
pub(crate) struct GpuWaitTable {
    entries: Mutex<Vec<GpuWaitEntry>>,
}

impl GpuWaitTable {
    pub fn new() -> Self {
        GpuWaitTable {
            entries: Mutex::new(Vec::new()),
        }
    }

    pub fn register(&self, timeline: Arc<dyn GpuTimeline>, value: u64, counter: Counter) {
        self.entries
            .lock()
            .expect("gpu wait table poisoned")
            .push(GpuWaitEntry {
                timeline,
                value,
                counter,
            });
    }

    /// Decrements the counter of every entry whose timeline has reached its
    /// value and drops the entry.
    fn poll(&self) {
        let mut entries = self.entries.lock().expect("gpu wait table poisoned");
        entries.retain(|entry| {
            if entry.timeline.value() >= entry.value {
                entry.counter.decrement(1);
                false
            } else {
                true
            }
        });
    }
}

/// Starts the I/O service thread. Requests arrive over the returned sender;
/// each read's callback is submitted back as a normal job at the request's
/// priority. The thread exits when the sender side is dropped.
pub(crate) fn spawn_io_service(shared: Arc<Shared>) -> (Sender<IoRequest>, JoinHandle<()>) {
    let (tx, rx): (Sender<IoRequest>, Receiver<IoRequest>) = channel::unbounded();

    let handle = thread::Builder::new()
        .name("weft-io".into())
        .spawn(move || {
            for request in rx.iter() {
                if shared.shutdown.load(Ordering::Relaxed) {
                    break;
                }
                let result = std::fs::read(&request.path);
                let callback = request.callback;
                shared.submit_retrying(
                    JobDeclaration::new(move |ctx| callback(ctx, result))
                        .with_priority(request.priority)
                        .named("io-completion"),
                );
            }
            tracing::debug!("io service stopped");
        })
        .expect("failed to spawn io service thread");

    (tx, handle)
}

/// Starts the GPU poll service thread, which scans the wait table until the
/// scheduler shuts down.
pub(crate) fn spawn_gpu_poller(shared: Arc<Shared>) -> JoinHandle<()> {
    thread::Builder::new()
        .name("weft-gpu-poll".into())
        .spawn(move || {
            while !shared.shutdown.load(Ordering::Relaxed) {
                shared.gpu_waits.poll();
                thread::sleep(Duration::from_micros(100));
            }
            tracing::debug!("gpu poll service stopped");
        })
        .expect("failed to spawn gpu poll thread")
}
