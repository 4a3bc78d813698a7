//! Priority- and affinity-layered bounded job queues.

use crate::job::{Affinity, Job, Priority};
use crossbeam::queue::ArrayQueue;

const PRIORITY_LEVELS: usize = 3;
const AFFINITY_LANES: usize = 4;

fn priority_index(priority: Priority) -> usize {
    match priority {
        Priority::High => 0,
        Priority::Normal => 1,
        Priority::Low => 2,
    }
}

fn lane_index(affinity: Affinity) -> usize {
    match affinity {
        Affinity::Any => 0,
        Affinity::Graphics => 1,
        Affinity::Compute => 2,
        Affinity::Transfer => 3,
    }
}

/// One affinity lane: a regular and a resume queue per priority level.
struct Lane {
    resume: [ArrayQueue<Job>; PRIORITY_LEVELS],
    regular: [ArrayQueue<Job>; PRIORITY_LEVELS],
}

impl Lane {
    fn new(capacity: usize) -> Self {
        Lane {
            resume: std::array::from_fn(|_| ArrayQueue::new(capacity)),
            regular: std::array::from_fn(|_| ArrayQueue::new(capacity)),
        }
    }
}

/// The full queue set: four affinity lanes, each split by priority and by
/// regular (fresh submissions) versus resume (suspended work becoming ready
/// again).
///
/// Pop order drains resume queues before regular ones, which bounds the
/// number of simultaneously live fibers: in-flight work finishes before new
/// work is admitted. Equal-priority jobs come out approximately FIFO, not
/// strictly, since multiple workers pop concurrently.
pub(crate) struct QueueSet {
    lanes: [Lane; AFFINITY_LANES],
}

impl QueueSet {
    pub fn new(capacity: usize) -> Self {
        QueueSet {
            lanes: std::array::from_fn(|_| Lane::new(capacity)),
        }
    }

    /// Routes by affinity, priority, and whether the job already has a bound
    /// fiber. Hands the job back when the target queue is full; the caller
    /// owns the retry-or-drop decision.
    pub fn push(&self, job: Job) -> Result<(), Job> {
        let lane = &self.lanes[lane_index(job.affinity)];
        let level = priority_index(job.priority);
        let queue = if job.fiber.is_some() {
            &lane.resume[level]
        } else {
            &lane.regular[level]
        };
        queue.push(job)
    }

    /// Requeues a woken job, retrying until space frees up. Only used on the
    /// wake path, where the job cannot be handed back to any caller.
    pub fn push_retrying(&self, mut job: Job) {
        loop {
            match self.push(job) {
                Ok(()) => return,
                Err(back) => {
                    job = back;
                    tracing::warn!(job = job.name, "queue full on wake path, retrying");
                    std::thread::yield_now();
                }
            }
        }
    }

    /// Pops the next job for a worker preferring `affinity`: resume queues
    /// before regular queues, high priority before low, the preferred lane
    /// before `Any` before the remaining lanes.
    pub fn pop(&self, preferred: Affinity) -> Option<Job> {
        let order = Self::lane_order(preferred);

        for lane in order {
            for level in 0..PRIORITY_LEVELS {
                if let Some(job) = self.lanes[lane].resume[level].pop() {
                    return Some(job);
                }
            }
        }
        for lane in order {
            for level in 0..PRIORITY_LEVELS {
                if let Some(job) = self.lanes[lane].regular[level].pop() {
                    return Some(job);
                }
            }
        }
        None
    }

    fn lane_order(preferred: Affinity) -> [usize; AFFINITY_LANES] {
        let first = lane_index(preferred);
        let mut order = [first; AFFINITY_LANES];
        let mut filled = 1;
        for lane in 0..AFFINITY_LANES {
            if lane != first {
                order[filled] = lane;
                filled += 1;
            }
        }
        order
    }
}
