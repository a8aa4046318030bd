//! NPC behaviour simulation.
//!
//! Squatters live in houses. Every tick, each squatter still attached to a
//! house rolls its behaviours ([`behavior::plan_tick`]) and the result is
//! written back in a single store call per squatter. Repairing squatters
//! shore up their house through the [`HouseRepairs`] capability; leaving
//! squatters lose their house reference and drop out of later ticks.
//!
//! NPC stats are not cached; the store is read at the start of every tick.

pub mod behavior;
pub mod squatter;

pub use behavior::{plan_tick, Behavior, BehaviorPlan, BehaviorSet, RngRolls, RollSource, ScriptedRolls};
pub use squatter::{random_squatter, squatter_with_stats};

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::config::NpcConfig;
use crate::error::{HovelError, Result};
use crate::house::HouseRepairs;
use crate::scheduler::{TickHandler, TickReport};
use crate::store::NpcStore;
use crate::types::{HouseId, Npc, NpcDraft, NpcId, NpcStatsPatch, TickEvent};

/// NPC subsystem.
pub struct NpcSimulation {
    store: Arc<dyn NpcStore>,
    houses: Arc<dyn HouseRepairs>,
    config: NpcConfig,
    rolls: Mutex<Box<dyn RollSource>>,
    rng: Mutex<StdRng>,
}

impl NpcSimulation {
    /// New simulation with entropy-seeded randomness.
    pub fn new(store: Arc<dyn NpcStore>, houses: Arc<dyn HouseRepairs>, config: NpcConfig) -> Self {
        Self::with_rolls(
            store,
            houses,
            config,
            Box::new(RngRolls(StdRng::from_entropy())),
            StdRng::from_entropy(),
        )
    }

    /// New simulation with explicit behaviour rolls and spawn RNG.
    pub fn with_rolls(
        store: Arc<dyn NpcStore>,
        houses: Arc<dyn HouseRepairs>,
        config: NpcConfig,
        rolls: Box<dyn RollSource>,
        rng: StdRng,
    ) -> Self {
        Self {
            store,
            houses,
            config,
            rolls: Mutex::new(rolls),
            rng: Mutex::new(rng),
        }
    }

    async fn require_house(&self, house: HouseId) -> Result<()> {
        if self.houses.exists(house).await? {
            Ok(())
        } else {
            Err(HovelError::not_found("house", house))
        }
    }

    /// Spawn a random squatter into `house`.
    ///
    /// # Errors
    /// `NotFound` if the house does not exist.
    pub async fn spawn(&self, house: HouseId) -> Result<Npc> {
        self.require_house(house).await?;
        let draft = random_squatter(house, &mut *self.rng.lock());
        let npc = self.store.create_npc(&draft).await?;
        info!(npc = %npc.id, house = %house, name = %npc.name, personality = %npc.personality, "squatter moved in");
        Ok(npc)
    }

    /// Spawn a squatter into `house` starting from the configured
    /// `npc.default_stats` instead of rolled ones.
    ///
    /// # Errors
    /// `NotFound` if the house does not exist.
    pub async fn spawn_settled(&self, house: HouseId) -> Result<Npc> {
        self.require_house(house).await?;
        let draft = squatter_with_stats(house, self.config.default_stats, &mut *self.rng.lock());
        let npc = self.store.create_npc(&draft).await?;
        info!(npc = %npc.id, house = %house, name = %npc.name, stats = %npc.stats, "settled squatter moved in");
        Ok(npc)
    }

    /// Create an NPC from an explicit draft.
    ///
    /// # Errors
    /// `NotFound` if the draft names a house that does not exist.
    pub async fn spawn_with(&self, draft: NpcDraft) -> Result<Npc> {
        if let Some(house) = draft.house {
            self.require_house(house).await?;
        }
        let npc = self.store.create_npc(&draft).await?;
        info!(npc = %npc.id, name = %npc.name, "npc created");
        Ok(npc)
    }

    /// NPC by id.
    ///
    /// # Errors
    /// Store failures only.
    pub async fn get(&self, id: NpcId) -> Result<Option<Npc>> {
        self.store.load_npc(id).await
    }

    /// NPCs currently living in `house`.
    ///
    /// # Errors
    /// Store failures only.
    pub async fn list_by_house(&self, house: HouseId) -> Result<Vec<Npc>> {
        self.store.list_npcs_in_house(house).await
    }

    /// Merge `patch` (clamped) into an NPC's stats.
    ///
    /// # Errors
    /// `NotFound` for an unknown id.
    pub async fn update_stats(&self, id: NpcId, patch: &NpcStatsPatch) -> Result<Npc> {
        let mut npc = self
            .store
            .load_npc(id)
            .await?
            .ok_or_else(|| HovelError::not_found("npc", id))?;
        npc.stats = patch.apply(npc.stats);
        self.store.update_npc_stats(id, &npc.stats).await?;
        Ok(npc)
    }

    /// Run one tick of behaviour for every housed squatter.
    ///
    /// Plans are rolled up front, then persisted concurrently. One
    /// squatter's failure is logged and does not affect the others.
    ///
    /// # Errors
    /// Only if the squatter list itself cannot be read.
    pub async fn handle_tick(&self) -> Result<TickReport> {
        let start = Instant::now();
        let npcs = self.store.list_housed_npcs().await?;

        let planned: Vec<(Npc, BehaviorPlan)> = {
            let mut rolls = self.rolls.lock();
            npcs.into_iter()
                .map(|npc| {
                    let plan = plan_tick(&npc.stats, &self.config.odds, &mut **rolls);
                    (npc, plan)
                })
                .collect()
        };

        let permits = Arc::new(Semaphore::new(self.config.max_concurrent_updates.max(1)));
        let gain = i64::from(self.config.repair_integrity_gain);
        let mut tasks = JoinSet::new();
        for (npc, plan) in planned {
            let store = Arc::clone(&self.store);
            let houses = Arc::clone(&self.houses);
            let permits = Arc::clone(&permits);
            tasks.spawn(async move {
                let _permit = permits.acquire_owned().await.ok();
                let result = apply_plan(store.as_ref(), houses.as_ref(), &npc, &plan, gain).await;
                (npc.id, result)
            });
        }

        let mut report = TickReport::default();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, Ok(()))) => report.processed += 1,
                Ok((id, Err(err))) => {
                    report.failed += 1;
                    warn!(npc = %id, error = %err, "npc tick failed");
                }
                Err(join) => {
                    report.failed += 1;
                    warn!(error = %join, "npc tick task panicked");
                }
            }
        }

        info!(
            processed = report.processed,
            failed = report.failed,
            elapsed_ms = start.elapsed().as_millis(),
            "npc tick complete"
        );
        Ok(report)
    }
}

async fn apply_plan(
    store: &dyn NpcStore,
    houses: &dyn HouseRepairs,
    npc: &Npc,
    plan: &BehaviorPlan,
    gain: i64,
) -> Result<()> {
    store.apply_npc_tick(npc.id, &plan.stats, plan.departs()).await?;
    debug!(npc = %npc.id, fired = %plan.fired, stats = %plan.stats, "npc ticked");

    if let Some(house) = npc.house {
        // The squatter's own row is already committed; a failed repair
        // does not fail its tick.
        if plan.reinforces_house() {
            match houses.reinforce(house, gain).await {
                Ok(integrity) => debug!(npc = %npc.id, house = %house, ?integrity, "squatter repaired house"),
                Err(err) => warn!(npc = %npc.id, house = %house, error = %err, "squatter repair failed"),
            }
        }
        if plan.departs() {
            info!(npc = %npc.id, house = %house, name = %npc.name, "squatter left");
        }
    }
    Ok(())
}

#[async_trait]
impl TickHandler for NpcSimulation {
    fn name(&self) -> &str {
        "npc-behaviour"
    }

    async fn on_tick(&self, _tick: TickEvent) -> Result<TickReport> {
        self.handle_tick().await
    }
}

impl std::fmt::Debug for NpcSimulation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NpcSimulation")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
