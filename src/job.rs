//! Job declarations and the internal scheduling record.

use crate::closure::JobClosure;
use crate::context::JobContext;
use crate::counter::Counter;
use crate::fiber::FiberId;
use serde::{Deserialize, Serialize};

/// Scheduling priority of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
}

/// Resource class a job prefers to run near, e.g. a GPU queue family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Affinity {
    #[default]
    Any,
    Graphics,
    Compute,
    Transfer,
}

/// Everything needed to submit one schedulable unit of work.
///
/// Immutable once submitted. The body is captured inline (see
/// [`JobClosure`]); submission itself never allocates.
///
/// ```no_run
/// use weft::{Counter, JobDeclaration, Priority};
///
/// let done = Counter::new(1);
/// let job = JobDeclaration::new(|_ctx| { /* work */ })
///     .with_priority(Priority::High)
///     .with_completion(done.clone())
///     .named("prepare-frame");
/// ```
pub struct JobDeclaration {
    pub(crate) body: JobClosure,
    pub(crate) priority: Priority,
    pub(crate) affinity: Affinity,
    pub(crate) completion: Option<Counter>,
    pub(crate) name: &'static str,
}

impl JobDeclaration {
    pub fn new<F>(body: F) -> Self
    where
        F: FnOnce(&JobContext) + Send + 'static,
    {
        JobDeclaration {
            body: JobClosure::new(body),
            priority: Priority::Normal,
            affinity: Affinity::Any,
            completion: None,
            name: "unnamed",
        }
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_affinity(mut self, affinity: Affinity) -> Self {
        self.affinity = affinity;
        self
    }

    /// Attaches a counter that is decremented by one when the body finishes.
    /// Dependents wait on this counter to order themselves after the job.
    pub fn with_completion(mut self, counter: Counter) -> Self {
        self.completion = Some(counter);
        self
    }

    /// Debug name, shown in logs.
    pub fn named(mut self, name: &'static str) -> Self {
        self.name = name;
        self
    }
}

/// The internal scheduling record built from a declaration.
///
/// Moved by value between the queues and the wait list; there is never more
/// than one live copy of a job.
pub(crate) struct Job {
    pub(crate) name: &'static str,
    pub(crate) priority: Priority,
    pub(crate) affinity: Affinity,
    pub(crate) completion: Option<Counter>,
    /// `None` once the body has been handed to a fiber.
    pub(crate) body: Option<JobClosure>,
    /// Bound fiber of a job that has already started executing.
    pub(crate) fiber: Option<FiberId>,
    /// Unmet dependency, re-checked by workers before dispatch.
    pub(crate) wait: Option<(Counter, i64)>,
}

impl std::fmt::Debug for Job {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Job")
            .field("name", &self.name)
            .field("priority", &self.priority)
            .field("affinity", &self.affinity)
            .field("has_completion", &self.completion.is_some())
            .field("has_body", &self.body.is_some())
            .field("fiber", &self.fiber)
            .field("has_wait", &self.wait.is_some())
            .finish()
    }
}

impl Job {
    pub(crate) fn new(declaration: JobDeclaration) -> Self {
        Job {
            name: declaration.name,
            priority: declaration.priority,
            affinity: declaration.affinity,
            completion: declaration.completion,
            body: Some(declaration.body),
            fiber: None,
            wait: None,
        }
    }

    /// Runnable right now: no dependency, or the dependency already holds.
    pub(crate) fn is_ready(&self) -> bool {
        match &self.wait {
            None => true,
            Some((counter, target)) => counter.get() == *target,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn declaration_defaults() {
        let declaration = JobDeclaration::new(|_ctx| {});
        assert_eq!(declaration.priority, Priority::Normal);
        assert_eq!(declaration.affinity, Affinity::Any);
        assert!(declaration.completion.is_none());
        assert_eq!(declaration.name, "unnamed");
    }

    #[test]
    fn builder_applies_all_fields() {
        let counter = Counter::new(1);
        let declaration = JobDeclaration::new(|_ctx| {})
            .with_priority(Priority::High)
            .with_affinity(Affinity::Transfer)
            .with_completion(counter.clone())
            .named("upload");

        assert_eq!(declaration.priority, Priority::High);
        assert_eq!(declaration.affinity, Affinity::Transfer);
        assert_eq!(declaration.name, "upload");
        assert_eq!(declaration.completion.as_ref().unwrap().id(), counter.id());
    }

    #[test]
    fn readiness_tracks_the_wait_condition() {
        let mut job = Job::new(JobDeclaration::new(|_ctx| {}));
        assert!(job.is_ready());

        let gate = Counter::new(2);
        job.wait = Some((gate.clone(), 0));
        assert!(!job.is_ready());

        gate.decrement(2);
        assert!(job.is_ready());
    }
}
