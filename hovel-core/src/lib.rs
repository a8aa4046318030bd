//! # Hovel Core Library
//!
//! Tick-driven simulation core for a survival chat game. Every user owns a
//! house that slowly falls apart; squatters move in, eat, bicker, hoard,
//! patch the roof and sometimes walk out. Factions, pirate radio stations
//! and urban myths round out the world.
//!
//! - **Scheduler** ([`scheduler`]): fixed-cadence ticks fanned out to
//!   independent handlers.
//! - **Houses** ([`house`]): write-through cache over the store, per-tick
//!   decay.
//! - **Squatters** ([`npc`]): probabilistic behaviour selection with a
//!   pluggable roll source.
//! - **Factions, radio, myths** ([`faction`], [`radio`], [`myth`]):
//!   CRUD over the store with monotonic counters.
//!
//! Every bounded stat is clamped to [0, 100] on write.

#![deny(clippy::unwrap_used)]
#![deny(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod context;
pub mod error;
pub mod faction;
pub mod house;
pub mod myth;
pub mod npc;
pub mod radio;
pub mod scheduler;
pub mod store;
pub mod types;

pub use config::HovelConfig;
pub use context::GameContext;
pub use error::{HovelError, Result};
pub use house::{HouseRepairs, HouseSimulation, RepairOutcome};
pub use npc::NpcSimulation;
pub use scheduler::{Subscription, TickHandler, TickReport, TickScheduler};
pub use store::{EntityStore, SqliteStore};
pub use types::*;
