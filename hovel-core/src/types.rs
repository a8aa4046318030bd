//! Core type definitions for the hovel simulation.
//!
//! Every bounded stat is a `u8` in `[STAT_MIN, STAT_MAX]`. Values only ever
//! enter the model through [`clamp_stat`], so out-of-range arithmetic is
//! clamped on write rather than rejected.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lower bound of every bounded stat.
pub const STAT_MIN: u8 = 0;
/// Upper bound of every bounded stat.
pub const STAT_MAX: u8 = 100;

/// Clamp an arbitrary integer into the stat range.
#[must_use]
pub fn clamp_stat(value: i64) -> u8 {
    // The clamp keeps the value inside 0..=100, so the cast is lossless.
    value.clamp(i64::from(STAT_MIN), i64::from(STAT_MAX)) as u8
}

/// Apply a signed delta to a stat, clamping the result.
#[must_use]
pub fn shift_stat(value: u8, delta: i64) -> u8 {
    clamp_stat(i64::from(value) + delta)
}

// ---------------------------------------------------------------------------
// Identity Types
// ---------------------------------------------------------------------------

/// External user identifier a house (or station, or faction membership) is keyed by.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OwnerId(pub String);

impl OwnerId {
    /// Wrap a raw user id.
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Borrow the raw id.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

macro_rules! row_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub i64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

row_id!(
    /// Row id of a house.
    HouseId
);
row_id!(
    /// Row id of an NPC.
    NpcId
);
row_id!(
    /// Row id of a faction.
    FactionId
);
row_id!(
    /// Row id of a radio station.
    StationId
);
row_id!(
    /// Row id of an urban myth.
    MythId
);

// ---------------------------------------------------------------------------
// House
// ---------------------------------------------------------------------------

/// The six bounded house stats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HouseStats {
    /// Structural integrity.
    pub integrity: u8,
    /// Warmth.
    pub heat: u8,
    /// Food stock.
    pub food: u8,
    /// Water stock.
    pub water: u8,
    /// How much attention the house is drawing.
    pub noise: u8,
    /// Generator charge.
    pub power: u8,
}

impl Default for HouseStats {
    fn default() -> Self {
        Self {
            integrity: 100,
            heat: 100,
            food: 100,
            water: 100,
            noise: 0,
            power: 100,
        }
    }
}

impl HouseStats {
    /// Return a copy with `patch` merged in.
    #[must_use]
    pub fn merged(mut self, patch: &HouseStatsPatch) -> Self {
        let clamped = patch.clamped();
        if let Some(v) = clamped.integrity {
            self.integrity = v;
        }
        if let Some(v) = clamped.heat {
            self.heat = v;
        }
        if let Some(v) = clamped.food {
            self.food = v;
        }
        if let Some(v) = clamped.water {
            self.water = v;
        }
        if let Some(v) = clamped.noise {
            self.noise = v;
        }
        if let Some(v) = clamped.power {
            self.power = v;
        }
        self
    }
}

impl fmt::Display for HouseStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "integrity {} | heat {} | food {} | water {} | noise {} | power {}",
            self.integrity, self.heat, self.food, self.water, self.noise, self.power
        )
    }
}

/// A partial house-stat update. Fields may be any integer; they are
/// clamped before they reach the cache or the store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HouseStatsPatch {
    /// New integrity.
    pub integrity: Option<i64>,
    /// New heat.
    pub heat: Option<i64>,
    /// New food.
    pub food: Option<i64>,
    /// New water.
    pub water: Option<i64>,
    /// New noise.
    pub noise: Option<i64>,
    /// New power.
    pub power: Option<i64>,
}

/// A [`HouseStatsPatch`] after clamping.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClampedHousePatch {
    /// New integrity.
    pub integrity: Option<u8>,
    /// New heat.
    pub heat: Option<u8>,
    /// New food.
    pub food: Option<u8>,
    /// New water.
    pub water: Option<u8>,
    /// New noise.
    pub noise: Option<u8>,
    /// New power.
    pub power: Option<u8>,
}

impl HouseStatsPatch {
    /// Whether the patch touches no field at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Clamp every provided field into the stat range.
    #[must_use]
    pub fn clamped(&self) -> ClampedHousePatch {
        ClampedHousePatch {
            integrity: self.integrity.map(clamp_stat),
            heat: self.heat.map(clamp_stat),
            food: self.food.map(clamp_stat),
            water: self.water.map(clamp_stat),
            noise: self.noise.map(clamp_stat),
            power: self.power.map(clamp_stat),
        }
    }

    /// Patch that sets every field to the given stats.
    #[must_use]
    pub fn from_stats(stats: &HouseStats) -> Self {
        Self {
            integrity: Some(i64::from(stats.integrity)),
            heat: Some(i64::from(stats.heat)),
            food: Some(i64::from(stats.food)),
            water: Some(i64::from(stats.water)),
            noise: Some(i64::from(stats.noise)),
            power: Some(i64::from(stats.power)),
        }
    }
}

/// Snapshot of a house as seen by callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct House {
    /// Row id.
    pub id: HouseId,
    /// Owning user.
    pub owner: OwnerId,
    /// Display name, e.g. "House of alice".
    pub name: String,
    /// Current stats.
    pub stats: HouseStats,
    /// Last successful write.
    pub updated_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// NPC
// ---------------------------------------------------------------------------

/// Location marker written when a squatter walks out.
pub const LEFT_HOUSE_LOCATION: &str = "left_house";

/// The five bounded behavioural stats of an NPC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NpcStats {
    /// 0 = sated, 100 = starving.
    pub hunger: u8,
    /// Stamina.
    pub energy: u8,
    /// Suspicion of everyone else in the house.
    pub paranoia: u8,
    /// Trust in the household.
    pub trust: u8,
    /// Readiness to pick a fight.
    pub aggression: u8,
}

impl Default for NpcStats {
    fn default() -> Self {
        Self {
            hunger: 50,
            energy: 50,
            paranoia: 50,
            trust: 50,
            aggression: 50,
        }
    }
}

impl NpcStats {
    /// Build stats from raw integers, clamping each one.
    #[must_use]
    pub fn clamped(hunger: i64, energy: i64, paranoia: i64, trust: i64, aggression: i64) -> Self {
        Self {
            hunger: clamp_stat(hunger),
            energy: clamp_stat(energy),
            paranoia: clamp_stat(paranoia),
            trust: clamp_stat(trust),
            aggression: clamp_stat(aggression),
        }
    }
}

impl fmt::Display for NpcStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "hunger {} | energy {} | paranoia {} | trust {} | aggression {}",
            self.hunger, self.energy, self.paranoia, self.trust, self.aggression
        )
    }
}

/// Partial NPC stat update; clamped on write.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NpcStatsPatch {
    /// New hunger.
    pub hunger: Option<i64>,
    /// New energy.
    pub energy: Option<i64>,
    /// New paranoia.
    pub paranoia: Option<i64>,
    /// New trust.
    pub trust: Option<i64>,
    /// New aggression.
    pub aggression: Option<i64>,
}

impl NpcStatsPatch {
    /// Merge into `stats`, clamping every provided field.
    #[must_use]
    pub fn apply(&self, mut stats: NpcStats) -> NpcStats {
        if let Some(v) = self.hunger {
            stats.hunger = clamp_stat(v);
        }
        if let Some(v) = self.energy {
            stats.energy = clamp_stat(v);
        }
        if let Some(v) = self.paranoia {
            stats.paranoia = clamp_stat(v);
        }
        if let Some(v) = self.trust {
            stats.trust = clamp_stat(v);
        }
        if let Some(v) = self.aggression {
            stats.aggression = clamp_stat(v);
        }
        stats
    }
}

/// Snapshot of an NPC.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Npc {
    /// Row id.
    pub id: NpcId,
    /// Full name.
    pub name: String,
    /// NPC kind, "squatter" for spawned ones.
    pub kind: String,
    /// Personality archetype.
    pub personality: String,
    /// House the NPC lives in; `None` once it has left.
    pub house: Option<HouseId>,
    /// Free-form location marker.
    pub location: String,
    /// Line the NPC greets people with.
    pub dialogue: String,
    /// Behavioural stats.
    pub stats: NpcStats,
}

/// Everything needed to create an NPC row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NpcDraft {
    /// Full name.
    pub name: String,
    /// NPC kind.
    pub kind: String,
    /// Personality archetype.
    pub personality: String,
    /// Initial house.
    pub house: Option<HouseId>,
    /// Initial location marker.
    pub location: String,
    /// Greeting line.
    pub dialogue: String,
    /// Initial stats (already clamped by construction).
    pub stats: NpcStats,
}

// ---------------------------------------------------------------------------
// Time
// ---------------------------------------------------------------------------

/// One scheduler tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickEvent {
    /// Monotonic tick counter since the scheduler was created (starts at 1).
    pub sequence: u64,
    /// Wall-clock time the tick fired.
    pub fired_at: DateTime<Utc>,
}

impl TickEvent {
    /// A tick stamped with the current time.
    #[must_use]
    pub fn now(sequence: u64) -> Self {
        Self {
            sequence,
            fired_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamp_bounds() {
        assert_eq!(clamp_stat(-5), 0);
        assert_eq!(clamp_stat(42), 42);
        assert_eq!(clamp_stat(1_000), 100);
        assert_eq!(clamp_stat(i64::MIN), 0);
        assert_eq!(clamp_stat(i64::MAX), 100);
    }

    #[test]
    fn shift_saturates() {
        assert_eq!(shift_stat(3, -5), 0);
        assert_eq!(shift_stat(98, 5), 100);
        assert_eq!(shift_stat(50, 0), 50);
    }

    #[test]
    fn house_defaults_match_new_house() {
        let stats = HouseStats::default();
        assert_eq!(stats.integrity, 100);
        assert_eq!(stats.noise, 0);
        assert_eq!(stats.power, 100);
    }

    #[test]
    fn patch_merge_clamps_and_keeps_untouched_fields() {
        let patch = HouseStatsPatch {
            heat: Some(-40),
            noise: Some(250),
            ..HouseStatsPatch::default()
        };
        let merged = HouseStats::default().merged(&patch);
        assert_eq!(merged.heat, 0);
        assert_eq!(merged.noise, 100);
        assert_eq!(merged.food, 100);
    }

    #[test]
    fn npc_patch_clamps() {
        let patch = NpcStatsPatch {
            trust: Some(300),
            hunger: Some(-1),
            ..NpcStatsPatch::default()
        };
        let stats = patch.apply(NpcStats::default());
        assert_eq!(stats.trust, 100);
        assert_eq!(stats.hunger, 0);
        assert_eq!(stats.energy, 50);
    }
}
