//! Property-Based Tests for Hovel Core
//!
//! Uses `proptest` to check the stat invariants under arbitrary input:
//! clamp-on-write, decay floors, and behaviour selection never leaving the
//! [0, 100] range.

use proptest::prelude::*;

use hovel_core::config::{BehaviorOdds, DecayRates};
use hovel_core::house::decay;
use hovel_core::npc::{plan_tick, ScriptedRolls};
use hovel_core::{clamp_stat, HouseStats, HouseStatsPatch, NpcStats, NpcStatsPatch, STAT_MAX};

// ---------------------------------------------------------------------------
// Strategy helpers
// ---------------------------------------------------------------------------

fn arb_stat() -> impl Strategy<Value = u8> {
    0..=STAT_MAX
}

fn arb_house_stats() -> impl Strategy<Value = HouseStats> {
    (arb_stat(), arb_stat(), arb_stat(), arb_stat(), arb_stat(), arb_stat()).prop_map(
        |(integrity, heat, food, water, noise, power)| HouseStats {
            integrity,
            heat,
            food,
            water,
            noise,
            power,
        },
    )
}

fn arb_npc_stats() -> impl Strategy<Value = NpcStats> {
    (arb_stat(), arb_stat(), arb_stat(), arb_stat(), arb_stat()).prop_map(
        |(hunger, energy, paranoia, trust, aggression)| NpcStats {
            hunger,
            energy,
            paranoia,
            trust,
            aggression,
        },
    )
}

fn arb_field() -> impl Strategy<Value = Option<i64>> {
    proptest::option::of(any::<i64>())
}

fn arb_patch() -> impl Strategy<Value = HouseStatsPatch> {
    (arb_field(), arb_field(), arb_field(), arb_field(), arb_field(), arb_field()).prop_map(
        |(integrity, heat, food, water, noise, power)| HouseStatsPatch {
            integrity,
            heat,
            food,
            water,
            noise,
            power,
        },
    )
}

fn house_fields(s: &HouseStats) -> [u8; 6] {
    [s.integrity, s.heat, s.food, s.water, s.noise, s.power]
}

fn npc_fields(s: &NpcStats) -> [u8; 5] {
    [s.hunger, s.energy, s.paranoia, s.trust, s.aggression]
}

// ---------------------------------------------------------------------------
// Property: clamp-on-write
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn clamp_always_in_range(v in any::<i64>()) {
        let c = clamp_stat(v);
        prop_assert!(c <= STAT_MAX);
        if (0..=100).contains(&v) {
            prop_assert_eq!(i64::from(c), v);
        }
    }

    #[test]
    fn merged_patch_stays_in_range(base in arb_house_stats(), patch in arb_patch()) {
        let merged = base.merged(&patch);
        for v in house_fields(&merged) {
            prop_assert!(v <= STAT_MAX);
        }
        if patch.food.is_none() {
            prop_assert_eq!(merged.food, base.food);
        }
    }

    #[test]
    fn npc_patch_stays_in_range(
        base in arb_npc_stats(),
        hunger in proptest::option::of(any::<i64>()),
        trust in proptest::option::of(any::<i64>()),
    ) {
        let patch = NpcStatsPatch { hunger, trust, ..NpcStatsPatch::default() };
        let applied = patch.apply(base);
        for v in npc_fields(&applied) {
            prop_assert!(v <= STAT_MAX);
        }
        prop_assert_eq!(applied.energy, base.energy);
    }
}

// ---------------------------------------------------------------------------
// Property: decay floors at zero and only integrity depends on power
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn decay_never_increases_and_floors(stats in arb_house_stats()) {
        let after = decay(&stats, 20, &DecayRates::default());
        for (before, after) in house_fields(&stats).into_iter().zip(house_fields(&after)) {
            prop_assert!(after <= before);
        }
        if stats.power >= 20 {
            prop_assert_eq!(after.integrity, stats.integrity);
        } else {
            prop_assert_eq!(after.integrity, stats.integrity.saturating_sub(2));
        }
    }

    #[test]
    fn repeated_unpowered_decay(heat in arb_stat(), ticks in 0u32..60) {
        let mut stats = HouseStats { heat, power: 0, ..HouseStats::default() };
        for _ in 0..ticks {
            stats = decay(&stats, 20, &DecayRates::default());
        }
        let expected = i64::from(heat) - 3 * i64::from(ticks);
        prop_assert_eq!(i64::from(stats.heat), expected.max(0));
    }
}

// ---------------------------------------------------------------------------
// Property: behaviour selection stays in range
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn plan_tick_stays_in_range(
        stats in arb_npc_stats(),
        rolls in proptest::collection::vec(0.0..1.0f64, 0..12),
    ) {
        let mut source = ScriptedRolls::new(rolls);
        let plan = plan_tick(&stats, &BehaviorOdds::default(), &mut source);
        for v in npc_fields(&plan.stats) {
            prop_assert!(v <= STAT_MAX);
        }
        if plan.fired.eat {
            // One bite is at most 20 and never below zero; no hunger drift.
            prop_assert!(plan.stats.hunger <= stats.hunger);
            prop_assert!(stats.hunger - plan.stats.hunger <= 20);
        } else {
            prop_assert_eq!(plan.stats.hunger, (stats.hunger + 3).min(STAT_MAX));
        }
    }
}
