//! House simulation.
//!
//! Owns the write-through cache of houses keyed by owner and the per-tick
//! decay pass. The cache starts empty and fills lazily as owners touch their
//! house; only cached houses decay.
//!
//! Every mutation writes the store first and updates the cached copy only
//! after the write succeeds, holding that house's mutex throughout. The
//! cache therefore never shows unpersisted state, and overlapping ticks,
//! commands and NPC repairs serialise per house.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::config::{DecayRates, HouseConfig};
use crate::error::{HovelError, Result};
use crate::scheduler::{TickHandler, TickReport};
use crate::store::HouseStore;
use crate::types::{
    shift_stat, House, HouseId, HouseStats, HouseStatsPatch, OwnerId, TickEvent,
};

/// Narrow capability over houses by id.
///
/// Handed to the NPC simulation so squatters can check and shore up their
/// house without touching the house cache or store directly.
#[async_trait]
pub trait HouseRepairs: Send + Sync {
    /// Whether a house with this id exists.
    async fn exists(&self, house: HouseId) -> Result<bool>;

    /// Atomically add `amount` integrity (clamped to [0,100]). Returns the
    /// new integrity, or `None` if the house does not exist.
    async fn reinforce(&self, house: HouseId, amount: i64) -> Result<Option<u8>>;
}

/// Reply to a successful `/house repair`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepairOutcome {
    /// Human-readable confirmation.
    pub message: String,
    /// Stats after the repair.
    pub stats: HouseStats,
}

/// One tick of decay applied to `stats`.
///
/// Integrity crumbles only while power is below `low_power_threshold`.
/// Heat drains faster with a dead generator. Everything floors at zero.
#[must_use]
pub fn decay(stats: &HouseStats, low_power_threshold: u8, rates: &DecayRates) -> HouseStats {
    let integrity = if stats.power < low_power_threshold && stats.integrity > 0 {
        shift_stat(stats.integrity, -i64::from(rates.integrity_low_power))
    } else {
        stats.integrity
    };
    let heat_loss = if stats.power > 0 {
        rates.heat_powered
    } else {
        rates.heat_unpowered
    };
    HouseStats {
        integrity,
        heat: shift_stat(stats.heat, -i64::from(heat_loss)),
        food: shift_stat(stats.food, -i64::from(rates.food)),
        water: shift_stat(stats.water, -i64::from(rates.water)),
        noise: shift_stat(stats.noise, -i64::from(rates.noise)),
        power: shift_stat(stats.power, -i64::from(rates.power)),
    }
}

/// House subsystem.
pub struct HouseSimulation {
    store: Arc<dyn HouseStore>,
    config: HouseConfig,
    cache: DashMap<OwnerId, Arc<Mutex<House>>>,
    owners: DashMap<HouseId, OwnerId>,
}

impl HouseSimulation {
    /// New simulation with an empty cache.
    pub fn new(store: Arc<dyn HouseStore>, config: HouseConfig) -> Self {
        Self {
            store,
            config,
            cache: DashMap::new(),
            owners: DashMap::new(),
        }
    }

    fn cached(&self, owner: &OwnerId) -> Option<Arc<Mutex<House>>> {
        self.cache.get(owner).map(|entry| Arc::clone(entry.value()))
    }

    fn remember(&self, house: House) -> Arc<Mutex<House>> {
        self.owners.insert(house.id, house.owner.clone());
        let entry = self
            .cache
            .entry(house.owner.clone())
            .or_insert_with(|| Arc::new(Mutex::new(house)));
        Arc::clone(entry.value())
    }

    /// Cached entry for `owner`, loading it from the store on first touch.
    async fn touch(&self, owner: &OwnerId) -> Result<Option<Arc<Mutex<House>>>> {
        if let Some(entry) = self.cached(owner) {
            return Ok(Some(entry));
        }
        Ok(self.store.load_house(owner).await?.map(|house| self.remember(house)))
    }

    /// Return the owner's house, creating it with the configured defaults
    /// if none exists yet. Idempotent per owner.
    ///
    /// # Errors
    /// Store failures only.
    pub async fn initialize_house(&self, owner: &OwnerId, display_name: &str) -> Result<House> {
        if let Some(entry) = self.touch(owner).await? {
            return Ok(entry.lock().await.clone());
        }
        let name = format!("House of {display_name}");
        let house = self.store.create_house(owner, &name, &self.config.initial).await?;
        info!(owner = %owner, house = %house.id, "house initialised");
        let entry = self.remember(house);
        let snapshot = entry.lock().await.clone();
        Ok(snapshot)
    }

    /// Current snapshot, loading into the cache on first touch.
    ///
    /// # Errors
    /// Store failures only.
    pub async fn get_snapshot(&self, owner: &OwnerId) -> Result<Option<House>> {
        match self.touch(owner).await? {
            Some(entry) => Ok(Some(entry.lock().await.clone())),
            None => Ok(None),
        }
    }

    /// Merge `patch` (clamped) into a cached house and persist the same
    /// fields.
    ///
    /// # Errors
    /// `NotFound` if the owner has no cached house, store failures
    /// otherwise. On failure the cache is left untouched.
    pub async fn update_stats(&self, owner: &OwnerId, patch: &HouseStatsPatch) -> Result<House> {
        let entry = self
            .cached(owner)
            .ok_or_else(|| HovelError::not_found("house", owner))?;
        let mut house = entry.lock().await;
        if patch.is_empty() {
            return Ok(house.clone());
        }
        let merged = house.stats.merged(patch);
        let written_at = self.store.update_house_stats(house.id, &patch.clamped()).await?;
        house.stats = merged;
        house.updated_at = written_at;
        debug!(owner = %owner, stats = %house.stats, "house stats updated");
        Ok(house.clone())
    }

    /// Add `amount` integrity, capped at 100.
    ///
    /// # Errors
    /// `InvalidInput` for a non-positive amount, `NotFound` if the owner
    /// has no house.
    pub async fn repair(&self, owner: &OwnerId, amount: i64) -> Result<RepairOutcome> {
        if amount <= 0 {
            return Err(HovelError::InvalidInput(format!(
                "repair amount must be positive, got {amount}"
            )));
        }
        let entry = self
            .touch(owner)
            .await?
            .ok_or_else(|| HovelError::not_found("house", owner))?;
        let mut house = entry.lock().await;
        let before = house.stats.integrity;
        let after = self
            .store
            .increment_integrity(house.id, amount)
            .await?
            .ok_or_else(|| HovelError::not_found("house", house.id))?;
        house.stats.integrity = after;
        info!(owner = %owner, before, after, "house repaired");
        Ok(RepairOutcome {
            message: format!(
                "Repaired {}: integrity {before} -> {after} (+{})",
                house.name,
                after.saturating_sub(before)
            ),
            stats: house.stats,
        })
    }

    /// Owners currently in the cache (the set the tick decays).
    #[must_use]
    pub fn cached_owners(&self) -> Vec<OwnerId> {
        self.cache.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Apply one tick of decay to every cached house, concurrently. A
    /// failing house is logged and skipped; the rest still decay.
    pub async fn handle_tick(&self) -> TickReport {
        let start = Instant::now();
        let houses: Vec<(OwnerId, Arc<Mutex<House>>)> = self
            .cache
            .iter()
            .map(|entry| (entry.key().clone(), Arc::clone(entry.value())))
            .collect();

        let permits = Arc::new(Semaphore::new(self.config.max_concurrent_updates.max(1)));
        let mut tasks = JoinSet::new();
        for (owner, entry) in houses {
            let store = Arc::clone(&self.store);
            let permits = Arc::clone(&permits);
            let threshold = self.config.low_power_threshold;
            let rates = self.config.decay.clone();
            tasks.spawn(async move {
                let _permit = permits.acquire_owned().await.ok();
                let mut house = entry.lock().await;
                let next = decay(&house.stats, threshold, &rates);
                let patch = HouseStatsPatch::from_stats(&next).clamped();
                let result = store.update_house_stats(house.id, &patch).await;
                if let Ok(written_at) = result {
                    house.stats = next;
                    house.updated_at = written_at;
                }
                (owner, result.map(|_| ()))
            });
        }

        let mut report = TickReport::default();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, Ok(()))) => report.processed += 1,
                Ok((owner, Err(err))) => {
                    report.failed += 1;
                    warn!(owner = %owner, error = %err, "house decay failed");
                }
                Err(join) => {
                    report.failed += 1;
                    warn!(error = %join, "house decay task panicked");
                }
            }
        }

        info!(
            processed = report.processed,
            failed = report.failed,
            elapsed_ms = start.elapsed().as_millis(),
            "house tick complete"
        );
        report
    }
}

#[async_trait]
impl HouseRepairs for HouseSimulation {
    async fn exists(&self, house: HouseId) -> Result<bool> {
        if self.owners.contains_key(&house) {
            return Ok(true);
        }
        Ok(self.store.load_house_by_id(house).await?.is_some())
    }

    async fn reinforce(&self, house: HouseId, amount: i64) -> Result<Option<u8>> {
        let entry = self
            .owners
            .get(&house)
            .and_then(|owner| self.cached(owner.value()));
        let Some(entry) = entry else {
            return self.store.increment_integrity(house, amount).await;
        };
        let mut cached = entry.lock().await;
        let value = self.store.increment_integrity(house, amount).await?;
        if let Some(integrity) = value {
            cached.stats.integrity = integrity;
        }
        Ok(value)
    }
}

#[async_trait]
impl TickHandler for HouseSimulation {
    fn name(&self) -> &str {
        "house-decay"
    }

    async fn on_tick(&self, _tick: TickEvent) -> Result<TickReport> {
        Ok(self.handle_tick().await)
    }
}

impl std::fmt::Debug for HouseSimulation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HouseSimulation")
            .field("cached", &self.cache.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SqliteStore;

    fn sim() -> (HouseSimulation, Arc<SqliteStore>) {
        let store = Arc::new(SqliteStore::open_in_memory().expect("open"));
        (HouseSimulation::new(store.clone(), HouseConfig::default()), store)
    }

    fn stats(integrity: u8, heat: u8, power: u8) -> HouseStats {
        HouseStats {
            integrity,
            heat,
            power,
            ..HouseStats::default()
        }
    }

    #[test]
    fn decay_low_power_scenario() {
        let rates = DecayRates::default();
        let before = HouseStats {
            integrity: 5,
            heat: 50,
            food: 40,
            water: 30,
            noise: 0,
            power: 10,
        };
        let after = decay(&before, 20, &rates);
        assert_eq!(after.integrity, 3);
        assert_eq!(after.heat, 49);
        assert_eq!(after.food, 38);
        assert_eq!(after.water, 28);
        assert_eq!(after.noise, 0);
        assert_eq!(after.power, 9);
    }

    #[test]
    fn integrity_threshold_is_strict() {
        let rates = DecayRates::default();
        assert_eq!(decay(&stats(50, 50, 19), 20, &rates).integrity, 48);
        assert_eq!(decay(&stats(50, 50, 20), 20, &rates).integrity, 50);
        assert_eq!(decay(&stats(0, 50, 0), 20, &rates).integrity, 0);
        assert_eq!(decay(&stats(1, 50, 0), 20, &rates).integrity, 0);
    }

    #[test]
    fn dead_generator_chills_faster() {
        let rates = DecayRates::default();
        assert_eq!(decay(&stats(100, 50, 0), 20, &rates).heat, 47);
        assert_eq!(decay(&stats(100, 2, 0), 20, &rates).heat, 0);
        assert_eq!(decay(&stats(100, 50, 1), 20, &rates).heat, 49);
    }

    #[tokio::test]
    async fn initialize_is_idempotent() {
        let (houses, _) = sim();
        let owner = OwnerId::new("u1");
        let first = houses.initialize_house(&owner, "alice").await.expect("init");
        assert_eq!(first.name, "House of alice");
        assert_eq!(first.stats, HouseStats::default());
        let second = houses.initialize_house(&owner, "bob").await.expect("init again");
        assert_eq!(first, second);
        assert_eq!(houses.cached_owners(), vec![owner]);
    }

    #[tokio::test]
    async fn update_requires_cached_house() {
        let (houses, store) = sim();
        let owner = OwnerId::new("u1");
        store
            .create_house(&owner, "House of alice", &HouseStats::default())
            .await
            .expect("seed");
        let err = houses
            .update_stats(&owner, &HouseStatsPatch::default())
            .await
            .unwrap_err();
        assert!(matches!(err, HovelError::NotFound { .. }));
    }

    #[tokio::test]
    async fn update_clamps_and_writes_through() {
        let (houses, store) = sim();
        let owner = OwnerId::new("u1");
        houses.initialize_house(&owner, "alice").await.expect("init");
        let patch = HouseStatsPatch {
            food: Some(-30),
            noise: Some(900),
            ..HouseStatsPatch::default()
        };
        let updated = houses.update_stats(&owner, &patch).await.expect("update");
        assert_eq!(updated.stats.food, 0);
        assert_eq!(updated.stats.noise, 100);
        let stored = store.load_house(&owner).await.expect("load").expect("Some");
        assert_eq!(stored.stats, updated.stats);
    }

    #[tokio::test]
    async fn repair_caps_at_100_and_rejects_zero() {
        let (houses, _) = sim();
        let owner = OwnerId::new("u1");
        houses.initialize_house(&owner, "alice").await.expect("init");
        houses
            .update_stats(
                &owner,
                &HouseStatsPatch {
                    integrity: Some(95),
                    ..HouseStatsPatch::default()
                },
            )
            .await
            .expect("update");

        let outcome = houses.repair(&owner, 10).await.expect("repair");
        assert_eq!(outcome.stats.integrity, 100);
        assert!(outcome.message.contains("95 -> 100"));

        let err = houses.repair(&owner, 0).await.unwrap_err();
        assert!(matches!(err, HovelError::InvalidInput(_)));
        let err = houses.repair(&OwnerId::new("nobody"), 5).await.unwrap_err();
        assert!(matches!(err, HovelError::NotFound { .. }));
    }

    #[tokio::test]
    async fn tick_only_decays_cached_houses() {
        let (houses, store) = sim();
        let touched = OwnerId::new("u1");
        let untouched = OwnerId::new("u2");
        houses.initialize_house(&touched, "alice").await.expect("init");
        store
            .create_house(&untouched, "House of bob", &HouseStats::default())
            .await
            .expect("seed");

        let report = houses.handle_tick().await;
        assert_eq!(report, TickReport { processed: 1, failed: 0 });

        let a = store.load_house(&touched).await.expect("load").expect("Some");
        let b = store.load_house(&untouched).await.expect("load").expect("Some");
        assert_eq!(a.stats.food, 98);
        assert_eq!(b.stats.food, 100);
        let cached = houses.get_snapshot(&touched).await.expect("get").expect("Some");
        assert_eq!(cached.stats, a.stats);
    }

    #[tokio::test]
    async fn reinforce_updates_cache_and_store() {
        let (houses, store) = sim();
        let owner = OwnerId::new("u1");
        let house = houses.initialize_house(&owner, "alice").await.expect("init");
        houses
            .update_stats(
                &owner,
                &HouseStatsPatch {
                    integrity: Some(40),
                    ..HouseStatsPatch::default()
                },
            )
            .await
            .expect("update");
        assert_eq!(houses.reinforce(house.id, 5).await.expect("reinforce"), Some(45));
        let cached = houses.get_snapshot(&owner).await.expect("get").expect("Some");
        assert_eq!(cached.stats.integrity, 45);
        let stored = store.load_house(&owner).await.expect("load").expect("Some");
        assert_eq!(stored.stats.integrity, 45);
        assert_eq!(houses.reinforce(HouseId(999), 5).await.expect("missing"), None);
    }
}
