#[macro_use]
extern crate criterion;

use criterion::{black_box, Criterion};
use forrad_config::ForradConfig;
use forrad_simulator::Simulator;

/// Simulation throughput with and without budget pressure.
fn benchmark_simulation_throughput(c: &mut Criterion) {
    let mut config = ForradConfig::default();
    config.simulator.task_count = 8;
    config.simulator.ops_per_task = 2_000;

    c.bench_function("simulation_unbounded", |b| {
        let simulator = Simulator::new(&config);
        b.iter(|| black_box(simulator.run()))
    });

    config.quota.shared_pool_max_size = 4096;
    c.bench_function("simulation_backpressure", |b| {
        let simulator = Simulator::new(&config);
        b.iter(|| black_box(simulator.run()))
    });
}

criterion_group!(benches, benchmark_simulation_throughput);
criterion_main!(benches);
