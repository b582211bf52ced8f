use criterion::{black_box, criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};
use park_sim::engine::run_simulation_summary;
use park_sim::layout::GridSpec;
use park_sim::models::{ArrivalProfile, LayoutSource, PolicyKind, SimConfig};

const AISLES: u32 = 6;
const AISLE_LENGTH: u32 = 20;
const HORIZON: u64 = 600;

fn build_config(policy: PolicyKind) -> SimConfig {
    SimConfig {
        seed: 7,
        policy,
        max_wait: 10,
        layout: LayoutSource::Grid {
            grid: GridSpec {
                aisles: AISLES,
                aisle_length: AISLE_LENGTH,
                ..GridSpec::default()
            },
        },
        arrivals: ArrivalProfile::Poisson {
            rate_per_hour: 120.0,
            horizon: Some(HORIZON),
            max_vehicles: None,
        },
        ..SimConfig::default()
    }
}

fn bench_engine(c: &mut Criterion) {
    let mut group = c.benchmark_group("engine");
    let size_label = format!("{}x{}/{}min", AISLES, AISLE_LENGTH, HORIZON);

    for policy in PolicyKind::ALL {
        group.bench_with_input(
            BenchmarkId::new(policy.to_string(), &size_label),
            &policy,
            |b, &policy| {
                b.iter_batched(
                    || build_config(policy),
                    |config| {
                        let result =
                            run_simulation_summary(&config).expect("simulation should succeed");
                        black_box(result);
                    },
                    BatchSize::SmallInput,
                );
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_engine);
criterion_main!(benches);
