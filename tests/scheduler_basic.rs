use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use weft::{Counter, JobDeclaration, JobSystem, JobSystemConfig, Priority};

fn test_system(workers: usize) -> JobSystem {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();

    JobSystem::with_config(JobSystemConfig {
        worker_threads: Some(workers),
        fiber_stack_size: 128 * 1024,
        fiber_pool_capacity: 16,
        queue_capacity: 256,
        ..Default::default()
    })
}

#[test]
fn single_job_runs_to_completion() {
    let system = test_system(2);
    let executed = Arc::new(AtomicUsize::new(0));
    let executed_probe = executed.clone();
    let done = Counter::new(1);

    system
        .run(
            JobDeclaration::new(move |_ctx| {
                executed_probe.fetch_add(1, Ordering::SeqCst);
            })
            .with_completion(done.clone())
            .named("happy-path"),
        )
        .unwrap();

    system.wait_for(&done, 0);
    assert_eq!(executed.load(Ordering::SeqCst), 1);
    system.shutdown().expect("shutdown failed");
}

#[test]
fn batch_of_independent_jobs_completes() {
    let system = test_system(4);
    let executed = Arc::new(AtomicUsize::new(0));
    let all_done = Counter::new(0);

    let num_jobs = 50;
    let jobs: Vec<_> = (0..num_jobs)
        .map(|_| {
            let executed_probe = executed.clone();
            JobDeclaration::new(move |_ctx| {
                executed_probe.fetch_add(1, Ordering::SeqCst);
            })
        })
        .collect();

    system.run_batch(jobs, &all_done).unwrap();
    system.wait_for(&all_done, 0);

    assert_eq!(executed.load(Ordering::SeqCst), num_jobs);
    assert_eq!(all_done.get(), 0);
    system.shutdown().expect("shutdown failed");
}

#[test]
fn empty_batch_is_immediately_complete() {
    let system = test_system(1);
    let all_done = Counter::new(0);

    system.run_batch(Vec::new(), &all_done).unwrap();
    system.wait_for(&all_done, 0);
    system.shutdown().expect("shutdown failed");
}

#[test]
fn jobs_run_at_every_priority() {
    let system = test_system(2);
    let executed = Arc::new(AtomicUsize::new(0));
    let done = Counter::new(3);

    for priority in [Priority::Low, Priority::Normal, Priority::High] {
        let executed_probe = executed.clone();
        system
            .run(
                JobDeclaration::new(move |_ctx| {
                    executed_probe.fetch_add(1, Ordering::SeqCst);
                })
                .with_priority(priority)
                .with_completion(done.clone()),
            )
            .unwrap();
    }

    system.wait_for(&done, 0);
    assert_eq!(executed.load(Ordering::SeqCst), 3);
    system.shutdown().expect("shutdown failed");
}

#[test]
fn nested_submission_from_inside_a_job() {
    let system = test_system(2);
    let executed = Arc::new(AtomicUsize::new(0));
    let done = Counter::new(2);

    let executed_probe = executed.clone();
    let inner_done = done.clone();
    system
        .run(
            JobDeclaration::new(move |ctx| {
                executed_probe.fetch_add(1, Ordering::SeqCst);

                let executed_inner = executed_probe.clone();
                ctx.run(
                    JobDeclaration::new(move |_ctx| {
                        executed_inner.fetch_add(1, Ordering::SeqCst);
                    })
                    .with_completion(inner_done.clone())
                    .named("child"),
                )
                .unwrap();
            })
            .with_completion(done.clone())
            .named("parent"),
        )
        .unwrap();

    system.wait_for(&done, 0);
    assert_eq!(executed.load(Ordering::SeqCst), 2);
    system.shutdown().expect("shutdown failed");
}

#[test]
fn panicking_job_still_signals_completion() {
    let system = test_system(2);
    let done = Counter::new(1);

    system
        .run(
            JobDeclaration::new(|_ctx| panic!("intentional test panic"))
                .with_completion(done.clone())
                .named("panicky"),
        )
        .unwrap();

    // The panic is contained in the fiber; the completion counter fires so
    // dependents are not stranded.
    system.wait_for(&done, 0);
    system.shutdown().expect("shutdown failed");
}

#[test]
fn shutdown_without_work_does_not_hang() {
    let system = test_system(3);
    assert_eq!(system.worker_count(), 3);
    system.shutdown().expect("shutdown failed");
}
