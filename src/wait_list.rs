//! Registry of jobs suspended on unmet counter conditions.

use crate::bucket_map::BucketMap;
use crate::counter::Counter;
use crate::job::Job;
use crate::queue::QueueSet;

/// Key a suspended job is filed under: the counter's identity plus the value
/// the counter must reach.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct WaitKey {
    counter: usize,
    target: i64,
}

const WAIT_BUCKETS: usize = 64;

pub(crate) struct WaitList {
    map: BucketMap<WaitKey, Job>,
}

impl WaitList {
    pub fn new() -> Self {
        WaitList {
            map: BucketMap::new(WAIT_BUCKETS),
        }
    }

    /// Parks `job` until `counter` reaches `target`.
    ///
    /// A counter that already satisfies the target short-circuits straight
    /// to the queues (the job is never in the registry at all), and the
    /// error hands the job back if that direct push finds a full queue.
    ///
    /// After inserting, the counter is checked once more: a mutation landing
    /// between the caller's check and the insertion would never observe the
    /// entry, so the inserter wakes the key itself.
    pub fn park(
        &self,
        job: Job,
        counter: &Counter,
        target: i64,
        queues: &QueueSet,
    ) -> Result<(), Job> {
        if counter.get() == target {
            return queues.push(job);
        }

        self.map.insert(
            WaitKey {
                counter: counter.id(),
                target,
            },
            job,
        );

        if counter.get() == target {
            self.on_counter_changed(counter, queues);
        }
        Ok(())
    }

    /// Wakes every job keyed by `counter` at its current value, moving each
    /// to its resume queue (already has a fiber) or regular queue (never
    /// started). Entries in the same bucket with a different key are
    /// threaded back unchanged.
    pub fn on_counter_changed(&self, counter: &Counter, queues: &QueueSet) {
        let key = WaitKey {
            counter: counter.id(),
            target: counter.get(),
        };
        for woken in self.map.steal_matching(&key, |k| *k == key) {
            queues.push_retrying(woken);
        }
    }
}
