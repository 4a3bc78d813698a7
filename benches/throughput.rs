//! Throughput benchmark using criterion.
//!
//! Measures batch submission and completion of many tiny jobs, which
//! stresses the queue set and the completion-counter wake path.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use weft::{Counter, JobDeclaration, JobSystem, JobSystemConfig};

const JOB_COUNT: usize = 100_000;

fn bench_batch_throughput(c: &mut Criterion) {
    let workers = num_cpus::get().saturating_sub(2).max(1);
    let system = JobSystem::with_config(JobSystemConfig {
        worker_threads: Some(workers),
        queue_capacity: 1 << 17,
        ..Default::default()
    });

    // Warmup
    for _ in 0..100 {
        let done = Counter::new(1);
        system
            .run(JobDeclaration::new(|_ctx| {}).with_completion(done.clone()))
            .unwrap();
        system.wait_for(&done, 0);
    }

    let mut group = c.benchmark_group("throughput");
    group.throughput(Throughput::Elements(JOB_COUNT as u64));
    group.sample_size(10); // Each iteration is expensive.

    group.bench_function(BenchmarkId::new("batch_tiny_jobs", workers), |b| {
        b.iter(|| {
            let done = Counter::new(0);
            let jobs: Vec<_> = (0..JOB_COUNT)
                .map(|_| JobDeclaration::new(|_ctx| {}))
                .collect();
            system.run_batch(jobs, &done).unwrap();
            system.wait_for(&done, 0);
        });
    });

    group.finish();
    system.shutdown().expect("shutdown failed");
}

criterion_group!(benches, bench_batch_throughput);
criterion_main!(benches);
