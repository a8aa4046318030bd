//! Pirate radio stations.
//!
//! One station per owner. Broadcasting gains listeners and burns power;
//! spare parts buy equipment levels and signal strength. No counter ever
//! goes negative: power saturates at zero, parts refuse to overdraw.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::RadioConfig;
use crate::error::{HovelError, Result};
use crate::store::RadioStore;
use crate::types::{OwnerId, StationId};

const INITIAL_SIGNAL: i64 = 50;
const INITIAL_EQUIPMENT: i64 = 1;
const INITIAL_POWER: i64 = 100;
const INITIAL_PARTS: i64 = 50;
const MAX_SIGNAL: i64 = 100;
const SIGNAL_DRIFT_CHANCE: f64 = 0.3;

/// Snapshot of a station and its resources.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Station {
    /// Row id.
    pub id: StationId,
    /// Owning user.
    pub owner: OwnerId,
    /// Owner's display name.
    pub owner_name: String,
    /// Station name.
    pub name: String,
    /// 0..=100.
    pub signal_strength: i64,
    /// Accumulated audience.
    pub listeners: i64,
    /// Starts at 1.
    pub equipment_level: i64,
    /// Last broadcast, if any.
    pub last_broadcast: Option<DateTime<Utc>>,
    /// Switched-off stations cannot broadcast.
    pub is_active: bool,
    /// Transmitter charge.
    pub power: i64,
    /// Spare parts.
    pub parts: i64,
    /// Parts spent on upgrades so far.
    pub currency_spent: i64,
}

/// Everything needed to create a station row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StationDraft {
    /// Owning user.
    pub owner: OwnerId,
    /// Owner's display name.
    pub owner_name: String,
    /// Station name.
    pub name: String,
    /// Starting signal.
    pub signal_strength: i64,
    /// Starting equipment level.
    pub equipment_level: i64,
    /// Starting power.
    pub power: i64,
    /// Starting parts.
    pub parts: i64,
}

/// Result of a broadcast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BroadcastOutcome {
    /// Station after the broadcast.
    pub station: Station,
    /// New listeners gained.
    pub listener_gain: i64,
    /// Signal gained from a lucky atmospheric bounce.
    pub signal_gain: i64,
}

/// Listeners won by one broadcast.
///
/// `floor(base × signal/50 × level × 0.5 × luck)`, with `luck` drawn from
/// [0.8, 1.2). Never negative.
#[must_use]
pub fn listener_gain(base: f64, signal: i64, level: i64, luck: f64) -> i64 {
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
    let gain = (base * (signal as f64 / 50.0) * level as f64 * 0.5 * luck).floor() as i64;
    gain.max(0)
}

/// Radio subsystem.
pub struct RadioSystem {
    store: Arc<dyn RadioStore>,
    config: RadioConfig,
    rng: Mutex<StdRng>,
}

impl RadioSystem {
    /// New subsystem with an entropy-seeded RNG.
    pub fn new(store: Arc<dyn RadioStore>, config: RadioConfig) -> Self {
        Self::with_rng(store, config, StdRng::from_entropy())
    }

    /// New subsystem with an explicit RNG (seeded in tests).
    pub fn with_rng(store: Arc<dyn RadioStore>, config: RadioConfig, rng: StdRng) -> Self {
        Self {
            store,
            config,
            rng: Mutex::new(rng),
        }
    }

    /// Set up a station for `owner`.
    ///
    /// # Errors
    /// `AlreadyExists` if the owner already runs one, `InvalidInput` for a
    /// blank name.
    pub async fn create(&self, owner: &OwnerId, owner_name: &str, name: &str) -> Result<Station> {
        let name = name.trim();
        if name.is_empty() {
            return Err(HovelError::InvalidInput("station name cannot be empty".into()));
        }
        if self.store.load_station_by_owner(owner).await?.is_some() {
            return Err(HovelError::AlreadyExists {
                kind: "radio station",
                key: owner.to_string(),
            });
        }
        let draft = StationDraft {
            owner: owner.clone(),
            owner_name: owner_name.to_string(),
            name: name.to_string(),
            signal_strength: INITIAL_SIGNAL,
            equipment_level: INITIAL_EQUIPMENT,
            power: INITIAL_POWER,
            parts: INITIAL_PARTS,
        };
        let station = self.store.create_station(&draft).await?;
        info!(station = %station.id, owner = %owner, name = %station.name, "radio station on air");
        Ok(station)
    }

    /// Station owned by `owner`.
    ///
    /// # Errors
    /// Store failures only.
    pub async fn get_by_owner(&self, owner: &OwnerId) -> Result<Option<Station>> {
        self.store.load_station_by_owner(owner).await
    }

    /// Station by id.
    ///
    /// # Errors
    /// Store failures only.
    pub async fn get(&self, id: StationId) -> Result<Option<Station>> {
        self.store.load_station(id).await
    }

    /// Every station, most listeners first.
    ///
    /// # Errors
    /// Store failures only.
    pub async fn list(&self) -> Result<Vec<Station>> {
        self.store.list_stations().await
    }

    /// Put `message` on air.
    ///
    /// # Errors
    /// `NotFound` without a station, `Inactive` for a switched-off one,
    /// `InvalidInput` for an empty message, `Cooldown` within
    /// `broadcast_cooldown_secs` of the previous broadcast.
    pub async fn broadcast(&self, owner: &OwnerId, message: &str, now: DateTime<Utc>) -> Result<BroadcastOutcome> {
        let station = self.require(owner).await?;
        if !station.is_active {
            return Err(HovelError::Inactive(format!("{} is off the air", station.name)));
        }
        if message.trim().is_empty() {
            return Err(HovelError::InvalidInput("broadcast message cannot be empty".into()));
        }
        if let Some(last) = station.last_broadcast {
            let elapsed = (now - last).num_seconds().max(0).unsigned_abs();
            let cooldown = self.config.broadcast_cooldown_secs;
            if elapsed < cooldown {
                return Err(HovelError::Cooldown {
                    remaining_secs: cooldown - elapsed,
                });
            }
        }

        let (luck, signal_gain) = {
            let mut rng = self.rng.lock();
            let luck = rng.gen_range(0.8..1.2);
            let signal_gain = if rng.gen_bool(SIGNAL_DRIFT_CHANCE) {
                rng.gen_range(1..=3)
            } else {
                0
            };
            (luck, signal_gain)
        };
        let gain = listener_gain(
            self.config.base_listeners,
            station.signal_strength,
            station.equipment_level,
            luck,
        );

        self.store
            .record_broadcast(station.id, gain, self.config.broadcast_power_cost, signal_gain, now)
            .await?;
        let station = self.require_id(station.id).await?;
        debug!(
            station = %station.id,
            listener_gain = gain,
            signal_gain,
            power = station.power,
            "broadcast"
        );
        Ok(BroadcastOutcome {
            station,
            listener_gain: gain,
            signal_gain,
        })
    }

    /// Buy the next equipment level for `level × upgrade_cost_per_level` parts.
    ///
    /// # Errors
    /// `NotFound` without a station, `InsufficientParts` if short.
    pub async fn upgrade_equipment(&self, owner: &OwnerId) -> Result<Station> {
        let station = self.require(owner).await?;
        let upgraded = self
            .store
            .upgrade_equipment(station.id, self.config.upgrade_cost_per_level)
            .await?;
        info!(station = %upgraded.id, level = upgraded.equipment_level, parts = upgraded.parts, "equipment upgraded");
        Ok(upgraded)
    }

    /// Buy `signal_improvement` signal (capped at 100).
    ///
    /// # Errors
    /// `NotFound` without a station, `InsufficientParts` if short,
    /// `InvalidInput` if the signal is already at maximum.
    pub async fn improve_signal(&self, owner: &OwnerId) -> Result<Station> {
        let station = self.require(owner).await?;
        if station.signal_strength >= MAX_SIGNAL {
            return Err(HovelError::InvalidInput("signal is already at maximum".into()));
        }
        let improved = self
            .store
            .boost_signal(
                station.id,
                self.config.signal_improvement_cost,
                self.config.signal_improvement,
            )
            .await?;
        info!(station = %improved.id, signal = improved.signal_strength, parts = improved.parts, "signal improved");
        Ok(improved)
    }

    async fn require(&self, owner: &OwnerId) -> Result<Station> {
        self.store
            .load_station_by_owner(owner)
            .await?
            .ok_or_else(|| HovelError::not_found("radio station", owner))
    }

    async fn require_id(&self, id: StationId) -> Result<Station> {
        self.store
            .load_station(id)
            .await?
            .ok_or_else(|| HovelError::not_found("radio station", id))
    }
}

impl std::fmt::Debug for RadioSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RadioSystem")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SqliteStore;
    use chrono::Duration;

    fn radio() -> RadioSystem {
        let store = Arc::new(SqliteStore::open_in_memory().expect("open"));
        RadioSystem::with_rng(store, RadioConfig::default(), StdRng::seed_from_u64(7))
    }

    #[test]
    fn listener_gain_formula() {
        // signal 50, level 1: 10 × 1 × 1 × 0.5 = 5 at neutral luck.
        assert_eq!(listener_gain(10.0, 50, 1, 1.0), 5);
        assert_eq!(listener_gain(10.0, 100, 2, 1.0), 20);
        assert_eq!(listener_gain(10.0, 50, 1, 0.8), 4);
        assert_eq!(listener_gain(10.0, 0, 3, 1.2), 0);
    }

    #[tokio::test]
    async fn new_station_defaults() {
        let radio = radio();
        let s = radio.create(&OwnerId::new("u1"), "alice", "Rat FM").await.expect("create");
        assert_eq!((s.signal_strength, s.equipment_level, s.power, s.parts), (50, 1, 100, 50));
        assert_eq!(s.listeners, 0);
        assert!(s.is_active);

        let err = radio.create(&OwnerId::new("u1"), "alice", "Rat FM 2").await.unwrap_err();
        assert!(matches!(err, HovelError::AlreadyExists { .. }));
    }

    #[tokio::test]
    async fn broadcast_respects_cooldown() {
        let radio = radio();
        let owner = OwnerId::new("u1");
        radio.create(&owner, "alice", "Rat FM").await.expect("create");
        let t0 = Utc::now();

        let first = radio.broadcast(&owner, "testing", t0).await.expect("first");
        assert!((4..=6).contains(&first.listener_gain));
        assert_eq!(first.station.power, 90);
        assert!(first.station.signal_strength <= 53);

        let err = radio
            .broadcast(&owner, "again", t0 + Duration::seconds(120))
            .await
            .unwrap_err();
        assert!(matches!(err, HovelError::Cooldown { remaining_secs: 180 }));

        radio
            .broadcast(&owner, "again", t0 + Duration::seconds(300))
            .await
            .expect("after cooldown");
    }

    #[tokio::test]
    async fn power_saturates_at_zero() {
        let store = Arc::new(SqliteStore::open_in_memory().expect("open"));
        let config = RadioConfig {
            broadcast_cooldown_secs: 0,
            broadcast_power_cost: 40,
            ..RadioConfig::default()
        };
        let radio = RadioSystem::with_rng(store, config, StdRng::seed_from_u64(1));
        let owner = OwnerId::new("u1");
        radio.create(&owner, "alice", "Rat FM").await.expect("create");
        let t0 = Utc::now();
        for i in 0..4 {
            radio
                .broadcast(&owner, "static", t0 + Duration::seconds(i))
                .await
                .expect("broadcast");
        }
        let station = radio.get_by_owner(&owner).await.expect("get").expect("Some");
        assert_eq!(station.power, 0);
    }

    #[tokio::test]
    async fn upgrades_spend_parts_and_refuse_overdraw() {
        let radio = radio();
        let owner = OwnerId::new("u1");
        radio.create(&owner, "alice", "Rat FM").await.expect("create");

        let s = radio.upgrade_equipment(&owner).await.expect("level 2");
        assert_eq!((s.equipment_level, s.parts), (2, 30));

        let err = radio.upgrade_equipment(&owner).await.unwrap_err();
        assert!(matches!(
            err,
            HovelError::InsufficientParts {
                needed: 40,
                available: 30
            }
        ));

        let s = radio.improve_signal(&owner).await.expect("signal");
        assert_eq!((s.signal_strength, s.parts), (55, 15));
        let s = radio.improve_signal(&owner).await.expect("signal");
        assert_eq!((s.signal_strength, s.parts), (60, 0));
        let err = radio.improve_signal(&owner).await.unwrap_err();
        assert!(matches!(err, HovelError::InsufficientParts { .. }));
    }

    #[tokio::test]
    async fn missing_station_is_not_found() {
        let radio = radio();
        let err = radio
            .broadcast(&OwnerId::new("ghost"), "hello", Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, HovelError::NotFound { .. }));
    }
}
