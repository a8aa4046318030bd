//! Hovel Benchmark Suite
//!
//! Targets:
//!   npc_plan_tick_single ............ < 1μs
//!   house_decay_pure_1000 ........... < 20μs
//!   house_tick_100_cached ........... < 20ms (in-memory SQLite)

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use hovel_core::config::{BehaviorOdds, DecayRates, HouseConfig};
use hovel_core::house::decay;
use hovel_core::npc::{plan_tick, RngRolls};
use hovel_core::{HouseSimulation, HouseStats, NpcStats, OwnerId, SqliteStore};

fn random_npc(rng: &mut StdRng) -> NpcStats {
    NpcStats {
        hunger: rng.gen_range(0..=100),
        energy: rng.gen_range(0..=100),
        paranoia: rng.gen_range(0..=100),
        trust: rng.gen_range(0..=100),
        aggression: rng.gen_range(0..=100),
    }
}

/// Benchmark: behaviour selection for one squatter.
fn bench_plan_tick(c: &mut Criterion) {
    let odds = BehaviorOdds::default();
    let mut rng = StdRng::seed_from_u64(42);
    let stats = random_npc(&mut rng);
    let mut rolls = RngRolls(StdRng::seed_from_u64(7));

    c.bench_function("npc_plan_tick_single", |b| {
        b.iter(|| {
            let plan = plan_tick(black_box(&stats), black_box(&odds), &mut rolls);
            black_box(plan);
        });
    });
}

/// Benchmark: pure decay over 1000 houses.
fn bench_decay(c: &mut Criterion) {
    let rates = DecayRates::default();
    let mut rng = StdRng::seed_from_u64(1);
    let houses: Vec<HouseStats> = (0..1000)
        .map(|_| HouseStats {
            power: rng.gen_range(0..=100),
            ..HouseStats::default()
        })
        .collect();

    c.bench_function("house_decay_pure_1000", |b| {
        b.iter(|| {
            for stats in &houses {
                black_box(decay(black_box(stats), 20, &rates));
            }
        });
    });
}

/// Benchmark: a full house tick with 100 cached houses writing through.
fn bench_house_tick(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().expect("runtime");
    let store = Arc::new(SqliteStore::open_in_memory().expect("open"));
    let houses = HouseSimulation::new(store, HouseConfig::default());
    runtime.block_on(async {
        for i in 0..100 {
            let owner = OwnerId::new(format!("user-{i}"));
            houses.initialize_house(&owner, "bench").await.expect("init");
        }
    });

    c.bench_function("house_tick_100_cached", |b| {
        b.to_async(&runtime).iter(|| async {
            black_box(houses.handle_tick().await);
        });
    });
}

criterion_group!(benches, bench_plan_tick, bench_decay, bench_house_tick);
criterion_main!(benches);
