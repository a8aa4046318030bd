//! Process-wide game context.
//!
//! Built once at start-up and passed explicitly to the command layer. Owns
//! one instance of each subsystem over a single shared store.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::info;

use crate::config::HovelConfig;
use crate::error::Result;
use crate::faction::FactionSystem;
use crate::house::HouseSimulation;
use crate::myth::MythSystem;
use crate::npc::NpcSimulation;
use crate::radio::RadioSystem;
use crate::scheduler::{HandlerOutcome, Subscription, TickScheduler};
use crate::store::{EntityStore, SqliteStore};

/// Every subsystem, wired together.
pub struct GameContext {
    config: HovelConfig,
    scheduler: TickScheduler,
    houses: Arc<HouseSimulation>,
    npcs: Arc<NpcSimulation>,
    factions: FactionSystem,
    radio: RadioSystem,
    myths: MythSystem,
    subscriptions: Mutex<Vec<Subscription>>,
}

impl GameContext {
    /// Wire every subsystem over `store`.
    pub fn new<S: EntityStore + 'static>(config: HovelConfig, store: Arc<S>) -> Self {
        let houses = Arc::new(HouseSimulation::new(store.clone(), config.house.clone()));
        let npcs = Arc::new(NpcSimulation::new(
            store.clone(),
            houses.clone(),
            config.npc.clone(),
        ));
        Self {
            scheduler: TickScheduler::new(&config.scheduler),
            factions: FactionSystem::new(store.clone(), config.faction.clone()),
            radio: RadioSystem::new(store.clone(), config.radio.clone()),
            myths: MythSystem::new(store, config.myth.clone()),
            houses,
            npcs,
            config,
            subscriptions: Mutex::new(Vec::new()),
        }
    }

    /// Open the SQLite store named in `config.store` and wire everything.
    ///
    /// # Errors
    /// Store failures opening the database.
    pub fn open(config: HovelConfig) -> Result<Self> {
        let store = Arc::new(SqliteStore::from_config(&config.store)?);
        Ok(Self::new(config, store))
    }

    /// Register the house and NPC tick handlers (once) and start the
    /// scheduler. Returns `false` if it was already running. Must be called
    /// from within a tokio runtime.
    pub fn start(&self) -> bool {
        {
            let mut subs = self.subscriptions.lock();
            if subs.is_empty() {
                subs.push(self.scheduler.subscribe(self.houses.clone()));
                subs.push(self.scheduler.subscribe(self.npcs.clone()));
            }
        }
        let started = self.scheduler.start();
        if started {
            info!(
                interval_secs = self.config.scheduler.tick_interval_secs,
                "game context started"
            );
        }
        started
    }

    /// Stop the scheduler and drop the tick subscriptions. In-flight ticks
    /// finish.
    pub fn shutdown(&self) {
        self.scheduler.stop();
        let subs: Vec<Subscription> = self.subscriptions.lock().drain(..).collect();
        let removed = subs
            .into_iter()
            .map(Subscription::unsubscribe)
            .filter(|removed| *removed)
            .count();
        info!(removed, "game context shut down");
    }

    /// Run one tick now through every subscribed handler.
    pub async fn tick(&self) -> Vec<HandlerOutcome> {
        self.scheduler.fire().await
    }

    /// Loaded configuration.
    #[must_use]
    pub fn config(&self) -> &HovelConfig {
        &self.config
    }

    /// Tick scheduler.
    #[must_use]
    pub fn scheduler(&self) -> &TickScheduler {
        &self.scheduler
    }

    /// House simulation.
    #[must_use]
    pub fn houses(&self) -> &Arc<HouseSimulation> {
        &self.houses
    }

    /// NPC simulation.
    #[must_use]
    pub fn npcs(&self) -> &Arc<NpcSimulation> {
        &self.npcs
    }

    /// Faction subsystem.
    #[must_use]
    pub fn factions(&self) -> &FactionSystem {
        &self.factions
    }

    /// Radio subsystem.
    #[must_use]
    pub fn radio(&self) -> &RadioSystem {
        &self.radio
    }

    /// Myth subsystem.
    #[must_use]
    pub fn myths(&self) -> &MythSystem {
        &self.myths
    }
}

impl std::fmt::Debug for GameContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GameContext")
            .field("scheduler", &self.scheduler)
            .field("houses", &self.houses)
            .finish_non_exhaustive()
    }
}
