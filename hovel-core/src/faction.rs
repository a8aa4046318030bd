//! Factions: named groups of users pooling resources.
//!
//! Membership is exclusive (one faction per user) and resource counters
//! only ever grow through [`FactionSystem::add_resources`].

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::FactionConfig;
use crate::error::{HovelError, Result};
use crate::store::FactionStore;
use crate::types::{FactionId, OwnerId};

/// Rank inside a faction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FactionRole {
    /// Founder.
    Leader,
    /// Everyone else.
    Member,
}

impl FactionRole {
    /// Column value.
    #[must_use]
    pub fn as_db(self) -> &'static str {
        match self {
            Self::Leader => "leader",
            Self::Member => "member",
        }
    }

    /// Parse a column value; unknown roles read as `Member`.
    #[must_use]
    pub fn from_db(raw: &str) -> Self {
        match raw {
            "leader" => Self::Leader,
            _ => Self::Member,
        }
    }
}

/// One membership row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FactionMember {
    /// Member user.
    pub user: OwnerId,
    /// Rank.
    pub role: FactionRole,
}

/// Pooled faction resources. Never negative.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FactionResources {
    /// Food stock.
    pub food: i64,
    /// Building materials.
    pub materials: i64,
    /// Currency.
    pub currency: i64,
    /// Energy cells.
    pub energy: i64,
}

impl FactionResources {
    /// Every counter set to `amount`.
    #[must_use]
    pub fn uniform(amount: i64) -> Self {
        Self {
            food: amount,
            materials: amount,
            currency: amount,
            energy: amount,
        }
    }
}

/// Amounts to add to a faction's resources.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceDelta {
    /// Food to add.
    pub food: i64,
    /// Materials to add.
    pub materials: i64,
    /// Currency to add.
    pub currency: i64,
    /// Energy to add.
    pub energy: i64,
}

impl ResourceDelta {
    fn first_negative(&self) -> Option<(&'static str, i64)> {
        [
            ("food", self.food),
            ("materials", self.materials),
            ("currency", self.currency),
            ("energy", self.energy),
        ]
        .into_iter()
        .find(|(_, v)| *v < 0)
    }
}

/// Snapshot of a faction with its members.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Faction {
    /// Row id.
    pub id: FactionId,
    /// Unique name.
    pub name: String,
    /// Free-form description.
    pub description: String,
    /// Founding user.
    pub leader: OwnerId,
    /// Influence score.
    pub power_level: i64,
    /// Claimed territory, empty if none.
    pub territory: String,
    /// Founding time.
    pub created_at: DateTime<Utc>,
    /// Pooled resources.
    pub resources: FactionResources,
    /// Members, founder first.
    pub members: Vec<FactionMember>,
}

impl Faction {
    /// Number of members.
    #[must_use]
    pub fn member_count(&self) -> usize {
        self.members.len()
    }
}

/// Faction subsystem. Holds a read cache of factions by id that is
/// refreshed from the store after every write.
pub struct FactionSystem {
    store: Arc<dyn FactionStore>,
    config: FactionConfig,
    cache: DashMap<FactionId, Faction>,
}

impl FactionSystem {
    /// New subsystem over `store`.
    pub fn new(store: Arc<dyn FactionStore>, config: FactionConfig) -> Self {
        Self {
            store,
            config,
            cache: DashMap::new(),
        }
    }

    /// Found a faction led by `leader`.
    ///
    /// # Errors
    /// `InvalidInput` for a blank name, `AlreadyExists` if the name is
    /// taken or the leader already belongs to a faction.
    pub async fn create(&self, name: &str, leader: &OwnerId) -> Result<Faction> {
        let name = name.trim();
        if name.is_empty() {
            return Err(HovelError::InvalidInput("faction name cannot be empty".into()));
        }
        if self.store.faction_of_member(leader).await?.is_some() {
            return Err(HovelError::AlreadyExists {
                kind: "faction membership",
                key: leader.to_string(),
            });
        }
        let resources = FactionResources::uniform(self.config.starting_resources);
        let faction = self.store.create_faction(name, leader, &resources).await?;
        info!(faction = %faction.id, name = %faction.name, leader = %leader, "faction founded");
        self.cache.insert(faction.id, faction.clone());
        Ok(faction)
    }

    /// Add `user` to `faction` as a regular member.
    ///
    /// # Errors
    /// `AlreadyExists` if the user is in any faction, `NotFound` if the
    /// faction does not exist.
    pub async fn join(&self, user: &OwnerId, faction: FactionId) -> Result<Faction> {
        if self.store.faction_of_member(user).await?.is_some() {
            return Err(HovelError::AlreadyExists {
                kind: "faction membership",
                key: user.to_string(),
            });
        }
        if self.get(faction).await?.is_none() {
            return Err(HovelError::not_found("faction", faction));
        }
        self.store.add_member(faction, user, FactionRole::Member).await?;
        info!(faction = %faction, user = %user, "joined faction");
        self.refresh(faction).await
    }

    /// Remove `user` from their faction, returning the faction they left.
    ///
    /// # Errors
    /// `NotFound` if the user is not in a faction.
    pub async fn leave(&self, user: &OwnerId) -> Result<Faction> {
        let faction = self
            .store
            .remove_member(user)
            .await?
            .ok_or_else(|| HovelError::not_found("faction membership", user))?;
        info!(faction = %faction, user = %user, "left faction");
        self.refresh(faction).await
    }

    /// Faction by id, served from the cache when possible.
    ///
    /// # Errors
    /// Store failures only.
    pub async fn get(&self, id: FactionId) -> Result<Option<Faction>> {
        if let Some(cached) = self.cache.get(&id) {
            return Ok(Some(cached.clone()));
        }
        let loaded = self.store.load_faction(id).await?;
        if let Some(faction) = &loaded {
            self.cache.insert(id, faction.clone());
        }
        Ok(loaded)
    }

    /// Faction by exact name.
    ///
    /// # Errors
    /// Store failures only.
    pub async fn get_by_name(&self, name: &str) -> Result<Option<Faction>> {
        let loaded = self.store.load_faction_by_name(name.trim()).await?;
        if let Some(faction) = &loaded {
            self.cache.insert(faction.id, faction.clone());
        }
        Ok(loaded)
    }

    /// The faction `user` belongs to.
    ///
    /// # Errors
    /// Store failures only.
    pub async fn faction_of(&self, user: &OwnerId) -> Result<Option<Faction>> {
        match self.store.faction_of_member(user).await? {
            Some(id) => self.get(id).await,
            None => Ok(None),
        }
    }

    /// Every faction.
    ///
    /// # Errors
    /// Store failures only.
    pub async fn list(&self) -> Result<Vec<Faction>> {
        let factions = self.store.list_factions().await?;
        for faction in &factions {
            self.cache.insert(faction.id, faction.clone());
        }
        Ok(factions)
    }

    /// Contribute resources.
    ///
    /// # Errors
    /// `InvalidInput` if any amount is negative, `NotFound` for an unknown
    /// faction.
    pub async fn add_resources(&self, id: FactionId, delta: ResourceDelta) -> Result<Faction> {
        if let Some((field, value)) = delta.first_negative() {
            return Err(HovelError::InvalidInput(format!(
                "{field} contribution must not be negative, got {value}"
            )));
        }
        self.store.add_faction_resources(id, &delta).await?;
        debug!(faction = %id, ?delta, "resources added");
        self.refresh(id).await
    }

    /// Claim a territory.
    ///
    /// # Errors
    /// `NotFound` for an unknown faction.
    pub async fn set_territory(&self, id: FactionId, territory: &str) -> Result<Faction> {
        self.store.set_territory(id, territory.trim()).await?;
        info!(faction = %id, territory = territory.trim(), "territory claimed");
        self.refresh(id).await
    }

    async fn refresh(&self, id: FactionId) -> Result<Faction> {
        let faction = self
            .store
            .load_faction(id)
            .await?
            .ok_or_else(|| HovelError::not_found("faction", id))?;
        self.cache.insert(id, faction.clone());
        Ok(faction)
    }
}

impl std::fmt::Debug for FactionSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FactionSystem")
            .field("cached", &self.cache.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SqliteStore;

    fn system() -> FactionSystem {
        let store = Arc::new(SqliteStore::open_in_memory().expect("open"));
        FactionSystem::new(store, FactionConfig::default())
    }

    #[tokio::test]
    async fn founder_leads_with_starting_resources() {
        let factions = system();
        let rats = factions.create("Rats", &OwnerId::new("u1")).await.expect("create");
        assert_eq!(rats.member_count(), 1);
        assert_eq!(rats.members[0].role, FactionRole::Leader);
        assert_eq!(rats.resources, FactionResources::uniform(100));
    }

    #[tokio::test]
    async fn names_are_unique() {
        let factions = system();
        factions.create("Rats", &OwnerId::new("u1")).await.expect("create");
        let err = factions.create("Rats", &OwnerId::new("u2")).await.unwrap_err();
        assert!(matches!(err, HovelError::AlreadyExists { kind: "faction", .. }));
    }

    #[tokio::test]
    async fn one_faction_per_user() {
        let factions = system();
        let rats = factions.create("Rats", &OwnerId::new("u1")).await.expect("create");
        let crows = factions.create("Crows", &OwnerId::new("u2")).await.expect("create");
        let joined = factions.join(&OwnerId::new("u3"), rats.id).await.expect("join");
        assert_eq!(joined.member_count(), 2);

        let err = factions.join(&OwnerId::new("u3"), crows.id).await.unwrap_err();
        assert!(matches!(err, HovelError::AlreadyExists { .. }));

        let left = factions.leave(&OwnerId::new("u3")).await.expect("leave");
        assert_eq!(left.member_count(), 1);
        factions.join(&OwnerId::new("u3"), crows.id).await.expect("rejoin elsewhere");
    }

    #[tokio::test]
    async fn negative_contributions_rejected() {
        let factions = system();
        let rats = factions.create("Rats", &OwnerId::new("u1")).await.expect("create");
        let delta = ResourceDelta {
            currency: -1,
            ..ResourceDelta::default()
        };
        let err = factions.add_resources(rats.id, delta).await.unwrap_err();
        assert!(matches!(err, HovelError::InvalidInput(_)));

        let delta = ResourceDelta {
            food: 25,
            ..ResourceDelta::default()
        };
        let updated = factions.add_resources(rats.id, delta).await.expect("add");
        assert_eq!(updated.resources.food, 125);
        assert_eq!(factions.get(rats.id).await.expect("get").expect("Some").resources.food, 125);
    }

    #[tokio::test]
    async fn leaving_without_faction_is_not_found() {
        let factions = system();
        let err = factions.leave(&OwnerId::new("nobody")).await.unwrap_err();
        assert!(matches!(err, HovelError::NotFound { .. }));
    }
}
