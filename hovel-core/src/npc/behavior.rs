//! Squatter behaviour selection.
//!
//! Pure and synchronous: given a squatter's stats at the start of a tick and
//! a [`RollSource`], [`plan_tick`] decides which behaviours fire, applies
//! their effects and the passive drift, and returns the result as a
//! [`BehaviorPlan`]. The NPC simulation then persists the plan.
//!
//! Roll order is fixed so scripted sources are reproducible:
//!
//! 1. one roll each for eat, fight, hoard, repair, leave (always consumed);
//! 2. fight's paranoia coin, only if fight fired;
//! 3. paranoia creep, only if the squatter is not soothed;
//! 4. trust wobble, only if neither repair nor fight fired, then its
//!    direction coin if the wobble hit.
//!
//! Drift conditions read the start-of-tick stats; drift deltas land on top
//! of the behaviour effects.

use std::collections::VecDeque;
use std::fmt;

use rand::Rng;

use crate::config::BehaviorOdds;
use crate::types::{shift_stat, NpcStats, STAT_MAX};

const EAT_HUNGER_CAP: u8 = 20;

/// Source of uniform rolls in [0, 1).
pub trait RollSource: Send {
    /// Next roll.
    fn roll(&mut self) -> f64;

    /// `true` with probability `p`.
    fn chance(&mut self, p: f64) -> bool {
        self.roll() < p
    }
}

/// [`RollSource`] backed by any RNG.
#[derive(Debug)]
pub struct RngRolls<R>(pub R);

impl<R: Rng + Send> RollSource for RngRolls<R> {
    fn roll(&mut self) -> f64 {
        self.0.gen_range(0.0..1.0)
    }
}

/// Replays a fixed list of rolls, then returns 0.99 forever.
#[derive(Debug, Clone, Default)]
pub struct ScriptedRolls(VecDeque<f64>);

impl ScriptedRolls {
    /// Rolls to replay, in order.
    pub fn new(rolls: impl IntoIterator<Item = f64>) -> Self {
        Self(rolls.into_iter().collect())
    }

    /// Rolls not yet consumed.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.0.len()
    }
}

impl RollSource for ScriptedRolls {
    fn roll(&mut self) -> f64 {
        self.0.pop_front().unwrap_or(0.99)
    }
}

/// One squatter behaviour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Behavior {
    /// Eat from the stores.
    Eat,
    /// Pick a fight with a housemate.
    Fight,
    /// Stash supplies.
    Hoard,
    /// Patch up the house.
    Repair,
    /// Walk out for good.
    Leave,
}

impl Behavior {
    /// Every behaviour in roll order.
    pub const ALL: [Self; 5] = [Self::Eat, Self::Fight, Self::Hoard, Self::Repair, Self::Leave];

    fn label(self) -> &'static str {
        match self {
            Self::Eat => "eat",
            Self::Fight => "fight",
            Self::Hoard => "hoard",
            Self::Repair => "repair",
            Self::Leave => "leave",
        }
    }
}

/// Which behaviours fired this tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BehaviorSet {
    /// Ate.
    pub eat: bool,
    /// Fought.
    pub fight: bool,
    /// Hoarded.
    pub hoard: bool,
    /// Repaired the house.
    pub repair: bool,
    /// Left the house.
    pub leave: bool,
}

impl BehaviorSet {
    /// Whether `behavior` fired.
    #[must_use]
    pub fn contains(&self, behavior: Behavior) -> bool {
        match behavior {
            Behavior::Eat => self.eat,
            Behavior::Fight => self.fight,
            Behavior::Hoard => self.hoard,
            Behavior::Repair => self.repair,
            Behavior::Leave => self.leave,
        }
    }

    /// Whether nothing fired.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

impl fmt::Display for BehaviorSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("idle");
        }
        let names: Vec<&str> = Behavior::ALL
            .into_iter()
            .filter(|b| self.contains(*b))
            .map(Behavior::label)
            .collect();
        f.write_str(&names.join("+"))
    }
}

/// Trigger probability of each behaviour.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BehaviorChances {
    /// Eat.
    pub eat: f64,
    /// Fight.
    pub fight: f64,
    /// Hoard.
    pub hoard: f64,
    /// Repair.
    pub repair: f64,
    /// Leave.
    pub leave: f64,
}

fn frac(stat: u8) -> f64 {
    f64::from(stat) / f64::from(STAT_MAX)
}

/// Trigger probabilities for `stats`.
#[must_use]
pub fn chances(stats: &NpcStats, odds: &BehaviorOdds) -> BehaviorChances {
    let eat = if stats.hunger > odds.starving_threshold {
        odds.eat_when_starving
    } else {
        frac(stats.hunger) * odds.eat_scale
    };
    let fight = frac(stats.aggression) * (1.0 - frac(stats.trust)) * odds.fight_scale;
    let hoard = frac(stats.paranoia) * odds.hoard_scale;
    let repair = frac(stats.trust) * frac(stats.energy) * odds.repair_scale;

    let spooked = stats.paranoia > odds.leave_paranoia_threshold;
    let estranged = stats.trust < odds.leave_trust_threshold;
    let leave = match (spooked, estranged) {
        (true, true) => odds.leave_both_thresholds,
        (true, false) | (false, true) => odds.leave_one_threshold,
        (false, false) => 0.0,
    };

    BehaviorChances {
        eat,
        fight,
        hoard,
        repair,
        leave,
    }
}

/// Outcome of one squatter's tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BehaviorPlan {
    /// Behaviours that fired.
    pub fired: BehaviorSet,
    /// Stats after effects and drift.
    pub stats: NpcStats,
}

impl BehaviorPlan {
    /// The squatter shores up its house this tick.
    #[must_use]
    pub fn reinforces_house(&self) -> bool {
        self.fired.repair
    }

    /// The squatter walks out this tick.
    #[must_use]
    pub fn departs(&self) -> bool {
        self.fired.leave
    }
}

/// Decide and apply one tick of behaviour for a squatter.
pub fn plan_tick(start: &NpcStats, odds: &BehaviorOdds, rolls: &mut dyn RollSource) -> BehaviorPlan {
    let p = chances(start, odds);
    let fired = BehaviorSet {
        eat: rolls.chance(p.eat),
        fight: rolls.chance(p.fight),
        hoard: rolls.chance(p.hoard),
        repair: rolls.chance(p.repair),
        leave: rolls.chance(p.leave),
    };

    let mut s = *start;

    if fired.eat {
        let bite = s.hunger.min(EAT_HUNGER_CAP);
        s.hunger -= bite;
        s.energy = shift_stat(s.energy, -5);
    }
    if fired.fight {
        s.aggression = shift_stat(s.aggression, 10);
        s.energy = shift_stat(s.energy, -15);
        if rolls.chance(odds.fight_paranoia_chance) {
            s.paranoia = shift_stat(s.paranoia, 5);
        }
    }
    if fired.hoard {
        s.paranoia = shift_stat(s.paranoia, 8);
        s.energy = shift_stat(s.energy, -3);
    }
    if fired.repair {
        s.energy = shift_stat(s.energy, -12);
        s.paranoia = shift_stat(s.paranoia, -5);
    }

    // Passive drift.
    if !fired.eat {
        s.hunger = shift_stat(s.hunger, 3);
    }
    if start.energy < STAT_MAX {
        s.energy = shift_stat(s.energy, 2);
    }
    if start.trust > 60 && start.aggression < 40 {
        s.paranoia = shift_stat(s.paranoia, -1);
    } else if rolls.chance(odds.paranoia_creep_chance) {
        s.paranoia = shift_stat(s.paranoia, 1);
    }
    if fired.repair {
        s.trust = shift_stat(s.trust, 1);
    } else if fired.fight {
        s.trust = shift_stat(s.trust, -1);
    } else if rolls.chance(odds.trust_wobble_chance) {
        let delta = if rolls.chance(0.5) { 1 } else { -1 };
        s.trust = shift_stat(s.trust, delta);
    }
    if fired.fight {
        s.aggression = shift_stat(s.aggression, 2);
    } else if fired.repair {
        s.aggression = shift_stat(s.aggression, -1);
    }

    BehaviorPlan { fired, stats: s }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn stats(hunger: u8, energy: u8, paranoia: u8, trust: u8, aggression: u8) -> NpcStats {
        NpcStats {
            hunger,
            energy,
            paranoia,
            trust,
            aggression,
        }
    }

    #[test]
    fn eat_when_starving_scenario() {
        let start = stats(100, 100, 0, 100, 0);
        let mut rolls = ScriptedRolls::new([0.1, 0.99, 0.99, 0.99, 0.99]);
        let plan = plan_tick(&start, &BehaviorOdds::default(), &mut rolls);
        assert!(plan.fired.eat);
        assert!(!plan.fired.repair);
        assert_eq!(plan.stats.hunger, 80, "no +3 drift after eating");
        assert_eq!(plan.stats.energy, 95, "no +2 drift from a full start");
        assert_eq!(plan.stats.paranoia, 0);
        assert_eq!(plan.stats.trust, 100);
    }

    #[test]
    fn eat_never_goes_below_zero() {
        let start = stats(15, 50, 50, 50, 50);
        let mut rolls = ScriptedRolls::new([0.0, 0.99, 0.99, 0.99, 0.99]);
        let plan = plan_tick(&start, &BehaviorOdds::default(), &mut rolls);
        assert!(plan.fired.eat);
        assert_eq!(plan.stats.hunger, 0);
    }

    #[test]
    fn chance_table() {
        let odds = BehaviorOdds::default();
        let c = chances(&stats(71, 50, 50, 50, 50), &odds);
        assert!((c.eat - 0.7).abs() < 1e-9);
        let c = chances(&stats(70, 50, 50, 50, 50), &odds);
        assert!((c.eat - 0.35).abs() < 1e-9);
        let c = chances(&stats(0, 100, 100, 0, 100), &odds);
        assert!((c.fight - 0.6).abs() < 1e-9);
        assert!((c.hoard - 0.5).abs() < 1e-9);
        assert!(c.repair.abs() < 1e-9);
        assert!((c.leave - 0.6).abs() < 1e-9);
        let c = chances(&stats(0, 50, 81, 50, 0), &odds);
        assert!((c.leave - 0.3).abs() < 1e-9);
        let c = chances(&stats(0, 50, 80, 20, 0), &odds);
        assert!(c.leave.abs() < 1e-9, "thresholds are strict");
    }

    #[test]
    fn fight_roll_order() {
        // fight fires, paranoia coin hits, creep misses; trust drops via fight.
        let start = stats(0, 50, 50, 0, 100);
        let mut rolls = ScriptedRolls::new([0.99, 0.0, 0.99, 0.99, 0.99, 0.1, 0.99]);
        let plan = plan_tick(&start, &BehaviorOdds::default(), &mut rolls);
        assert_eq!(plan.fired.to_string(), "fight");
        assert_eq!(plan.stats.aggression, 100);
        assert_eq!(plan.stats.paranoia, 55);
        assert_eq!(plan.stats.energy, 37);
        assert_eq!(plan.stats.trust, 0);
        assert_eq!(plan.stats.hunger, 3);
        assert_eq!(rolls.remaining(), 0);
    }

    #[test]
    fn repair_soothes_and_builds_trust() {
        let start = stats(0, 100, 30, 100, 50);
        let mut rolls = ScriptedRolls::new([0.99, 0.99, 0.99, 0.0, 0.99, 0.99]);
        let plan = plan_tick(&start, &BehaviorOdds::default(), &mut rolls);
        assert!(plan.reinforces_house());
        assert!(!plan.departs());
        assert_eq!(plan.stats.energy, 88);
        assert_eq!(plan.stats.paranoia, 25);
        assert_eq!(plan.stats.trust, 100);
        assert_eq!(plan.stats.aggression, 49);
    }

    #[test]
    fn quiet_tick_wobbles_trust() {
        let start = stats(0, 0, 0, 50, 50);
        // five misses, creep miss, wobble hit, direction down.
        let mut rolls = ScriptedRolls::new([0.99, 0.99, 0.99, 0.99, 0.99, 0.99, 0.0, 0.9]);
        let plan = plan_tick(&start, &BehaviorOdds::default(), &mut rolls);
        assert!(plan.fired.is_empty());
        assert_eq!(plan.stats.trust, 49);
        assert_eq!(plan.stats.energy, 2);
        assert_eq!(plan.stats.hunger, 3);
    }

    #[test]
    fn seeded_rng_keeps_stats_in_range() {
        let mut rolls = RngRolls(StdRng::seed_from_u64(99));
        let odds = BehaviorOdds::default();
        let mut s = stats(100, 0, 100, 0, 100);
        for _ in 0..500 {
            s = plan_tick(&s, &odds, &mut rolls).stats;
            for v in [s.hunger, s.energy, s.paranoia, s.trust, s.aggression] {
                assert!(v <= STAT_MAX);
            }
        }
    }
}
