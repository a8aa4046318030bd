//! Configuration for the hovel simulation.
//!
//! Maps directly to `hovel.toml`. Every field has a serde default, so an
//! empty file (or no file at all) yields the stock game balance.

use serde::{Deserialize, Serialize};

use crate::error::{HovelError, Result};
use crate::types::{HouseStats, NpcStats};

/// Top-level configuration, loadable from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HovelConfig {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,
    /// Tick cadence.
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    /// SQLite store.
    #[serde(default)]
    pub store: StoreConfig,
    /// House defaults and decay rates.
    #[serde(default)]
    pub house: HouseConfig,
    /// Squatter behaviour tuning.
    #[serde(default)]
    pub npc: NpcConfig,
    /// Faction starting state.
    #[serde(default)]
    pub faction: FactionConfig,
    /// Radio economy.
    #[serde(default)]
    pub radio: RadioConfig,
    /// Urban myth investigation.
    #[serde(default)]
    pub myth: MythConfig,
}

impl HovelConfig {
    /// Load configuration from a TOML string.
    ///
    /// # Errors
    /// Returns `HovelError::Config` if the TOML is invalid or fails validation.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let config: Self = toml::from_str(toml_str).map_err(|e| HovelError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Reject settings the simulation cannot run with.
    ///
    /// # Errors
    /// Returns `HovelError::Config` naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        if self.scheduler.tick_interval_secs == 0 {
            return Err(HovelError::Config(
                "scheduler.tick_interval_secs must be at least 1".into(),
            ));
        }
        if self.npc.max_concurrent_updates == 0 {
            return Err(HovelError::Config(
                "npc.max_concurrent_updates must be at least 1".into(),
            ));
        }
        let h = &self.house.initial;
        let n = &self.npc.default_stats;
        let stats = [
            h.integrity, h.heat, h.food, h.water, h.noise, h.power,
            n.hunger, n.energy, n.paranoia, n.trust, n.aggression,
        ];
        if stats.iter().any(|&v| v > crate::types::STAT_MAX) {
            return Err(HovelError::Config(
                "house.initial and npc.default_stats must stay within [0, 100]".into(),
            ));
        }
        let odds = &self.npc.odds;
        let named = [
            ("eat_when_starving", odds.eat_when_starving),
            ("eat_scale", odds.eat_scale),
            ("fight_scale", odds.fight_scale),
            ("hoard_scale", odds.hoard_scale),
            ("repair_scale", odds.repair_scale),
            ("leave_one_threshold", odds.leave_one_threshold),
            ("leave_both_thresholds", odds.leave_both_thresholds),
            ("fight_paranoia_chance", odds.fight_paranoia_chance),
            ("paranoia_creep_chance", odds.paranoia_creep_chance),
            ("trust_wobble_chance", odds.trust_wobble_chance),
        ];
        for (name, p) in named {
            if !(0.0..=1.0).contains(&p) {
                return Err(HovelError::Config(format!(
                    "npc.odds.{name} must be within [0, 1], got {p}"
                )));
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Sub-configs
// ---------------------------------------------------------------------------

/// General process settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Log level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Log format: "pretty" or "json".
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

/// Tick cadence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Seconds between ticks.
    #[serde(default = "default_300")]
    pub tick_interval_secs: u64,
    /// Fire on UTC multiples of the interval (cron-style) instead of
    /// one interval after start.
    #[serde(default = "default_true")]
    pub align_to_wall_clock: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: 300,
            align_to_wall_clock: true,
        }
    }
}

/// SQLite store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Database file; ":memory:" for a throwaway store.
    #[serde(default = "default_db_path")]
    pub path: String,
    /// Use WAL mode for concurrent reads.
    #[serde(default = "default_true")]
    pub wal_mode: bool,
    /// How long a writer waits on a locked database.
    #[serde(default = "default_5000")]
    pub busy_timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            wal_mode: true,
            busy_timeout_ms: 5000,
        }
    }
}

/// House defaults and per-tick decay.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HouseConfig {
    /// Stats of a freshly created house.
    #[serde(default)]
    pub initial: HouseStats,
    /// Integrity only crumbles while power is below this.
    #[serde(default = "default_20_u8")]
    pub low_power_threshold: u8,
    /// Per-tick losses.
    #[serde(default)]
    pub decay: DecayRates,
    /// Integrity restored by `/house repair` with no amount.
    #[serde(default = "default_10_u8")]
    pub default_repair_amount: u8,
    /// Parallel house writes per tick.
    #[serde(default = "default_16")]
    pub max_concurrent_updates: usize,
}

impl Default for HouseConfig {
    fn default() -> Self {
        Self {
            initial: HouseStats::default(),
            low_power_threshold: 20,
            decay: DecayRates::default(),
            default_repair_amount: 10,
            max_concurrent_updates: 16,
        }
    }
}

/// Per-tick house stat losses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecayRates {
    /// Integrity lost while power is low.
    #[serde(default = "default_2_u8")]
    pub integrity_low_power: u8,
    /// Heat lost while the generator has any charge.
    #[serde(default = "default_1_u8")]
    pub heat_powered: u8,
    /// Heat lost with a dead generator.
    #[serde(default = "default_3_u8")]
    pub heat_unpowered: u8,
    /// Food eaten.
    #[serde(default = "default_2_u8")]
    pub food: u8,
    /// Water drunk.
    #[serde(default = "default_2_u8")]
    pub water: u8,
    /// Noise settling.
    #[serde(default = "default_1_u8")]
    pub noise: u8,
    /// Generator drain.
    #[serde(default = "default_1_u8")]
    pub power: u8,
}

impl Default for DecayRates {
    fn default() -> Self {
        Self {
            integrity_low_power: 2,
            heat_powered: 1,
            heat_unpowered: 3,
            food: 2,
            water: 2,
            noise: 1,
            power: 1,
        }
    }
}

/// Squatter behaviour tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NpcConfig {
    /// Starting stats for settled squatters, see
    /// [`NpcSimulation::spawn_settled`](crate::npc::NpcSimulation::spawn_settled).
    #[serde(default)]
    pub default_stats: NpcStats,
    /// Integrity a repairing squatter adds to its house.
    #[serde(default = "default_5_u8")]
    pub repair_integrity_gain: u8,
    /// Parallel NPC writes per tick.
    #[serde(default = "default_16")]
    pub max_concurrent_updates: usize,
    /// Behaviour probabilities.
    #[serde(default)]
    pub odds: BehaviorOdds,
}

impl Default for NpcConfig {
    fn default() -> Self {
        Self {
            default_stats: NpcStats::default(),
            repair_integrity_gain: 5,
            max_concurrent_updates: 16,
            odds: BehaviorOdds::default(),
        }
    }
}

/// Probability constants for behaviour selection and drift.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BehaviorOdds {
    /// Hunger above which eating uses the flat probability.
    #[serde(default = "default_70_u8")]
    pub starving_threshold: u8,
    /// Flat eat probability when starving.
    #[serde(default = "default_0_7")]
    pub eat_when_starving: f64,
    /// Multiplier on hunger/100 otherwise.
    #[serde(default = "default_0_5")]
    pub eat_scale: f64,
    /// Multiplier on aggression × distrust.
    #[serde(default = "default_0_6")]
    pub fight_scale: f64,
    /// Multiplier on paranoia.
    #[serde(default = "default_0_5")]
    pub hoard_scale: f64,
    /// Multiplier on trust × energy.
    #[serde(default = "default_0_4")]
    pub repair_scale: f64,
    /// Paranoia above which a squatter considers leaving.
    #[serde(default = "default_80_u8")]
    pub leave_paranoia_threshold: u8,
    /// Trust below which a squatter considers leaving.
    #[serde(default = "default_20_u8")]
    pub leave_trust_threshold: u8,
    /// Leave probability when one threshold is crossed.
    #[serde(default = "default_0_3")]
    pub leave_one_threshold: f64,
    /// Leave probability when both are crossed.
    #[serde(default = "default_0_6")]
    pub leave_both_thresholds: f64,
    /// Chance a fight also raises paranoia.
    #[serde(default = "default_0_5")]
    pub fight_paranoia_chance: f64,
    /// Chance paranoia creeps up by one when not soothed.
    #[serde(default = "default_0_3")]
    pub paranoia_creep_chance: f64,
    /// Chance trust wobbles by one on a quiet tick.
    #[serde(default = "default_0_2")]
    pub trust_wobble_chance: f64,
}

impl Default for BehaviorOdds {
    fn default() -> Self {
        Self {
            starving_threshold: 70,
            eat_when_starving: 0.7,
            eat_scale: 0.5,
            fight_scale: 0.6,
            hoard_scale: 0.5,
            repair_scale: 0.4,
            leave_paranoia_threshold: 80,
            leave_trust_threshold: 20,
            leave_one_threshold: 0.3,
            leave_both_thresholds: 0.6,
            fight_paranoia_chance: 0.5,
            paranoia_creep_chance: 0.3,
            trust_wobble_chance: 0.2,
        }
    }
}

/// Faction starting state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FactionConfig {
    /// Every resource counter of a new faction starts here.
    #[serde(default = "default_100_i64")]
    pub starting_resources: i64,
}

impl Default for FactionConfig {
    fn default() -> Self {
        Self {
            starting_resources: 100,
        }
    }
}

/// Radio economy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RadioConfig {
    /// Minimum seconds between broadcasts.
    #[serde(default = "default_300")]
    pub broadcast_cooldown_secs: u64,
    /// Listener gain at signal 50, equipment level 2.
    #[serde(default = "default_10_f64")]
    pub base_listeners: f64,
    /// Power each broadcast burns.
    #[serde(default = "default_10_i64")]
    pub broadcast_power_cost: i64,
    /// Parts per current equipment level to upgrade.
    #[serde(default = "default_20_i64")]
    pub upgrade_cost_per_level: i64,
    /// Parts to boost the signal.
    #[serde(default = "default_15_i64")]
    pub signal_improvement_cost: i64,
    /// Signal gained by a paid boost.
    #[serde(default = "default_5_i64")]
    pub signal_improvement: i64,
}

impl Default for RadioConfig {
    fn default() -> Self {
        Self {
            broadcast_cooldown_secs: 300,
            base_listeners: 10.0,
            broadcast_power_cost: 10,
            upgrade_cost_per_level: 20,
            signal_improvement_cost: 15,
            signal_improvement: 5,
        }
    }
}

/// Urban myth investigation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MythConfig {
    /// Progress at which a myth counts as solved.
    #[serde(default = "default_100_i64")]
    pub solve_threshold: i64,
}

impl Default for MythConfig {
    fn default() -> Self {
        Self {
            solve_threshold: 100,
        }
    }
}

// ---------------------------------------------------------------------------
// Serde default helpers
// ---------------------------------------------------------------------------

fn default_true() -> bool { true }
fn default_log_level() -> String { "info".to_string() }
fn default_log_format() -> String { "pretty".to_string() }
fn default_db_path() -> String { "hovel.db".to_string() }
fn default_0_2() -> f64 { 0.2 }
fn default_0_3() -> f64 { 0.3 }
fn default_0_4() -> f64 { 0.4 }
fn default_0_5() -> f64 { 0.5 }
fn default_0_6() -> f64 { 0.6 }
fn default_0_7() -> f64 { 0.7 }
fn default_10_f64() -> f64 { 10.0 }
fn default_1_u8() -> u8 { 1 }
fn default_2_u8() -> u8 { 2 }
fn default_3_u8() -> u8 { 3 }
fn default_5_u8() -> u8 { 5 }
fn default_10_u8() -> u8 { 10 }
fn default_20_u8() -> u8 { 20 }
fn default_70_u8() -> u8 { 70 }
fn default_80_u8() -> u8 { 80 }
fn default_16() -> usize { 16 }
fn default_5_i64() -> i64 { 5 }
fn default_10_i64() -> i64 { 10 }
fn default_15_i64() -> i64 { 15 }
fn default_20_i64() -> i64 { 20 }
fn default_100_i64() -> i64 { 100 }
fn default_300() -> u64 { 300 }
fn default_5000() -> u64 { 5000 }

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_gives_defaults() {
        let config = HovelConfig::from_toml("").expect("parse");
        assert_eq!(config.scheduler.tick_interval_secs, 300);
        assert!(config.scheduler.align_to_wall_clock);
        assert_eq!(config.house.low_power_threshold, 20);
        assert_eq!(config.radio.broadcast_cooldown_secs, 300);
        assert!((config.npc.odds.eat_when_starving - 0.7).abs() < f64::EPSILON);
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config = HovelConfig::from_toml(
            r#"
            [scheduler]
            tick_interval_secs = 60

            [house.decay]
            food = 4
            "#,
        )
        .expect("parse");
        assert_eq!(config.scheduler.tick_interval_secs, 60);
        assert_eq!(config.house.decay.food, 4);
        assert_eq!(config.house.decay.water, 2);
    }

    #[test]
    fn zero_interval_rejected() {
        let err = HovelConfig::from_toml("[scheduler]\ntick_interval_secs = 0\n").unwrap_err();
        assert!(matches!(err, HovelError::Config(_)));
    }

    #[test]
    fn probability_out_of_range_rejected() {
        let err = HovelConfig::from_toml("[npc.odds]\nfight_scale = 1.5\n").unwrap_err();
        assert!(err.to_string().contains("fight_scale"));
    }

    #[test]
    fn from_file_reads_toml() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("hovel.toml");
        std::fs::write(&path, "[store]\npath = \"world.db\"\n").expect("write");
        let config = HovelConfig::from_file(&path).expect("load");
        assert_eq!(config.store.path, "world.db");
    }
}
