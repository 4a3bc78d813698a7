use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use weft::{Counter, GpuTimeline, JobDeclaration, JobSystem, JobSystemConfig, Priority};

fn test_system(workers: usize) -> JobSystem {
    JobSystem::with_config(JobSystemConfig {
        worker_threads: Some(workers),
        fiber_stack_size: 128 * 1024,
        fiber_pool_capacity: 16,
        queue_capacity: 256,
        ..Default::default()
    })
}

struct MockTimeline {
    value: AtomicU64,
}

impl GpuTimeline for MockTimeline {
    fn value(&self) -> u64 {
        self.value.load(Ordering::Acquire)
    }
}

#[test]
fn io_request_runs_callback_with_file_contents() {
    let system = test_system(2);

    let path = std::env::temp_dir().join("weft-io-bridge-test.bin");
    std::fs::write(&path, b"payload-bytes").unwrap();

    let matched = Arc::new(AtomicBool::new(false));
    let matched_probe = matched.clone();
    let done = Counter::new(1);
    let done_signal = done.clone();

    system
        .request_io(
            path.clone(),
            Box::new(move |_ctx, result| {
                let bytes = result.expect("read failed");
                matched_probe.store(bytes == b"payload-bytes", Ordering::SeqCst);
                done_signal.decrement(1);
            }),
            Priority::Normal,
        )
        .unwrap();

    system.wait_for(&done, 0);
    assert!(matched.load(Ordering::SeqCst));

    std::fs::remove_file(&path).ok();
    system.shutdown().expect("shutdown failed");
}

#[test]
fn io_request_reports_read_errors_to_the_callback() {
    let system = test_system(2);

    let errored = Arc::new(AtomicBool::new(false));
    let errored_probe = errored.clone();
    let done = Counter::new(1);
    let done_signal = done.clone();

    system
        .request_io(
            std::env::temp_dir().join("weft-io-bridge-missing-file"),
            Box::new(move |_ctx, result| {
                errored_probe.store(result.is_err(), Ordering::SeqCst);
                done_signal.decrement(1);
            }),
            Priority::Low,
        )
        .unwrap();

    system.wait_for(&done, 0);
    assert!(errored.load(Ordering::SeqCst));
    system.shutdown().expect("shutdown failed");
}

#[test]
fn gpu_wait_decrements_once_timeline_reaches_value() {
    let system = test_system(2);

    let timeline = Arc::new(MockTimeline {
        value: AtomicU64::new(0),
    });
    let fence = Counter::new(1);

    system.submit_gpu_wait(timeline.clone(), 5, fence.clone());

    // Below the target value, the counter must hold.
    thread::sleep(Duration::from_millis(20));
    assert_eq!(fence.get(), 1);

    timeline.value.store(5, Ordering::Release);
    system.wait_for(&fence, 0);
    system.shutdown().expect("shutdown failed");
}

#[test]
fn in_job_gpu_wait_suspends_until_the_timeline_advances() {
    let system = test_system(2);

    let timeline = Arc::new(MockTimeline {
        value: AtomicU64::new(0),
    });
    let done = Counter::new(1);

    let timeline_for_job = timeline.clone();
    system
        .run(
            JobDeclaration::new(move |ctx| {
                let fence = Counter::new(1);
                ctx.wait_for_gpu(&fence, 0, timeline_for_job.clone(), 3);
            })
            .with_completion(done.clone())
            .named("gpu-gated"),
        )
        .unwrap();

    // The job is parked on the fence; advance the timeline from outside.
    thread::sleep(Duration::from_millis(20));
    assert_eq!(done.get(), 1);

    timeline.value.store(3, Ordering::Release);
    system.wait_for(&done, 0);
    system.shutdown().expect("shutdown failed");
}

#[test]
fn gpu_wait_satisfied_at_registration_fires_promptly() {
    let system = test_system(1);

    let timeline = Arc::new(MockTimeline {
        value: AtomicU64::new(10),
    });
    let fence = Counter::new(1);

    system.submit_gpu_wait(timeline, 7, fence.clone());
    system.wait_for(&fence, 0);
    system.shutdown().expect("shutdown failed");
}
