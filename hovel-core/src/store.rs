//! Entity store adapter.
//!
//! Each subsystem talks to persistence through a narrow async trait
//! ([`HouseStore`], [`NpcStore`], [`FactionStore`], [`RadioStore`],
//! [`MythStore`]). [`SqliteStore`] implements all of them over a single
//! SQLite database. The schema is intentionally simple, one row per entity
//! plus a stats/resources side table:
//!
//! ```sql
//! houses(id, owner_id UNIQUE, name, description, created_at)
//! house_stats(house_id UNIQUE, integrity, heat, food, water, noise, power, updated_at)
//! npcs(id, name, kind, personality, house_id NULL, location, dialogue, created_at, updated_at)
//! npc_stats(npc_id UNIQUE, hunger, energy, paranoia, trust, aggression, updated_at)
//! factions / faction_members / faction_resources
//! radio_stations / radio_resources
//! urban_myths
//! ```
//!
//! - WAL mode for concurrent reads while the tick writes.
//! - Statements run on the blocking pool; the connection sits behind a
//!   mutex, so every method is one serialised unit of work.
//! - Cross-entity increments (`increment_integrity`, `record_broadcast`,
//!   `advance_myth`) are single SQL statements, never read-modify-write.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OpenFlags, OptionalExtension, Row};
use tracing::{debug, info};

use crate::config::StoreConfig;
use crate::error::{HovelError, Result};
use crate::faction::{Faction, FactionMember, FactionResources, FactionRole, ResourceDelta};
use crate::myth::{Myth, MythDraft, MythStatus};
use crate::radio::{Station, StationDraft};
use crate::types::{
    clamp_stat, ClampedHousePatch, FactionId, House, HouseId, HouseStats, MythId, Npc, NpcDraft,
    NpcId, NpcStats, OwnerId, StationId, LEFT_HOUSE_LOCATION,
};

// ---------------------------------------------------------------------------
// Store traits
// ---------------------------------------------------------------------------

/// Persistence operations for houses.
#[async_trait]
pub trait HouseStore: Send + Sync {
    /// Load the house owned by `owner`.
    async fn load_house(&self, owner: &OwnerId) -> Result<Option<House>>;

    /// Load a house by row id.
    async fn load_house_by_id(&self, id: HouseId) -> Result<Option<House>>;

    /// Create a house for `owner` with `stats`, or return the existing one
    /// untouched. Never creates a second row for the same owner.
    async fn create_house(&self, owner: &OwnerId, name: &str, stats: &HouseStats) -> Result<House>;

    /// Write the provided fields. Returns the write timestamp.
    async fn update_house_stats(&self, id: HouseId, patch: &ClampedHousePatch) -> Result<DateTime<Utc>>;

    /// Atomically add `delta` to integrity (clamped to [0,100]) and return
    /// the new value, or `None` if the house does not exist.
    async fn increment_integrity(&self, id: HouseId, delta: i64) -> Result<Option<u8>>;
}

/// Persistence operations for NPCs.
#[async_trait]
pub trait NpcStore: Send + Sync {
    /// Insert an NPC and its stats row.
    async fn create_npc(&self, draft: &NpcDraft) -> Result<Npc>;

    /// Load an NPC by id.
    async fn load_npc(&self, id: NpcId) -> Result<Option<Npc>>;

    /// All NPCs currently living in `house`.
    async fn list_npcs_in_house(&self, house: HouseId) -> Result<Vec<Npc>>;

    /// All NPCs with a house reference.
    async fn list_housed_npcs(&self) -> Result<Vec<Npc>>;

    /// Overwrite the stats row.
    async fn update_npc_stats(&self, id: NpcId, stats: &NpcStats) -> Result<()>;

    /// One tick's worth of changes for one NPC in a single transaction:
    /// new stats and, if `departed`, a cleared house reference.
    async fn apply_npc_tick(&self, id: NpcId, stats: &NpcStats, departed: bool) -> Result<()>;
}

/// Persistence operations for factions.
#[async_trait]
pub trait FactionStore: Send + Sync {
    /// Create a faction with its leader and starting resources.
    async fn create_faction(
        &self,
        name: &str,
        leader: &OwnerId,
        resources: &FactionResources,
    ) -> Result<Faction>;

    /// Load by id, members included.
    async fn load_faction(&self, id: FactionId) -> Result<Option<Faction>>;

    /// Load by unique name.
    async fn load_faction_by_name(&self, name: &str) -> Result<Option<Faction>>;

    /// The faction `user` belongs to, if any.
    async fn faction_of_member(&self, user: &OwnerId) -> Result<Option<FactionId>>;

    /// Add `user` to `faction`.
    async fn add_member(&self, faction: FactionId, user: &OwnerId, role: FactionRole) -> Result<()>;

    /// Remove `user` from whatever faction they are in.
    async fn remove_member(&self, user: &OwnerId) -> Result<Option<FactionId>>;

    /// Every faction.
    async fn list_factions(&self) -> Result<Vec<Faction>>;

    /// Add non-negative amounts to the resource counters.
    async fn add_faction_resources(&self, faction: FactionId, delta: &ResourceDelta) -> Result<()>;

    /// Replace the territory description.
    async fn set_territory(&self, faction: FactionId, territory: &str) -> Result<()>;
}

/// Persistence operations for radio stations.
#[async_trait]
pub trait RadioStore: Send + Sync {
    /// Create a station and its resources row.
    async fn create_station(&self, draft: &StationDraft) -> Result<Station>;

    /// Load the station owned by `owner`.
    async fn load_station_by_owner(&self, owner: &OwnerId) -> Result<Option<Station>>;

    /// Load by id.
    async fn load_station(&self, id: StationId) -> Result<Option<Station>>;

    /// Every station, most listeners first.
    async fn list_stations(&self) -> Result<Vec<Station>>;

    /// Apply a broadcast: listeners up, power down (floored at 0), signal up
    /// (capped at 100), cooldown stamp.
    async fn record_broadcast(
        &self,
        id: StationId,
        listener_gain: i64,
        power_cost: i64,
        signal_gain: i64,
        at: DateTime<Utc>,
    ) -> Result<()>;

    /// Spend `level × cost_per_level` parts for one equipment level.
    async fn upgrade_equipment(&self, id: StationId, cost_per_level: i64) -> Result<Station>;

    /// Spend `cost` parts for `gain` signal (capped at 100).
    async fn boost_signal(&self, id: StationId, cost: i64, gain: i64) -> Result<Station>;
}

/// Persistence operations for urban myths.
#[async_trait]
pub trait MythStore: Send + Sync {
    /// Insert an active myth.
    async fn create_myth(&self, draft: &MythDraft) -> Result<Myth>;

    /// Load by id.
    async fn load_myth(&self, id: MythId) -> Result<Option<Myth>>;

    /// Myths filtered by status, newest first.
    async fn list_myths(&self, status: Option<MythStatus>) -> Result<Vec<Myth>>;

    /// A random active myth.
    async fn random_active_myth(&self) -> Result<Option<Myth>>;

    /// Add progress (capped at `threshold`) and clues to an active myth,
    /// solving it once the threshold is reached. Returns `false` if no
    /// active myth matched.
    async fn advance_myth(&self, id: MythId, progress: i64, clues: i64, threshold: i64) -> Result<bool>;

    /// Close an active myth whose progress has reached `threshold`.
    /// `false` when the myth is missing, already solved, or short of it.
    async fn mark_myth_solved(&self, id: MythId, threshold: i64) -> Result<bool>;
}

/// One backend serving every subsystem.
pub trait EntityStore: HouseStore + NpcStore + FactionStore + RadioStore + MythStore {}

impl<T> EntityStore for T where T: HouseStore + NpcStore + FactionStore + RadioStore + MythStore {}

// ---------------------------------------------------------------------------
// SqliteStore
// ---------------------------------------------------------------------------

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS houses (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    owner_id    TEXT NOT NULL UNIQUE,
    name        TEXT NOT NULL,
    description TEXT,
    created_at  TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS house_stats (
    house_id   INTEGER NOT NULL UNIQUE REFERENCES houses(id) ON DELETE CASCADE,
    integrity  INTEGER NOT NULL DEFAULT 100,
    heat       INTEGER NOT NULL DEFAULT 100,
    food       INTEGER NOT NULL DEFAULT 100,
    water      INTEGER NOT NULL DEFAULT 100,
    noise      INTEGER NOT NULL DEFAULT 0,
    power      INTEGER NOT NULL DEFAULT 100,
    updated_at TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS npcs (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    name        TEXT NOT NULL,
    kind        TEXT NOT NULL,
    personality TEXT NOT NULL,
    house_id    INTEGER REFERENCES houses(id) ON DELETE SET NULL,
    location    TEXT NOT NULL,
    dialogue    TEXT NOT NULL,
    created_at  TEXT NOT NULL,
    updated_at  TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS npcs_by_house ON npcs(house_id);
CREATE TABLE IF NOT EXISTS npc_stats (
    npc_id     INTEGER NOT NULL UNIQUE REFERENCES npcs(id) ON DELETE CASCADE,
    hunger     INTEGER NOT NULL DEFAULT 50,
    energy     INTEGER NOT NULL DEFAULT 50,
    paranoia   INTEGER NOT NULL DEFAULT 50,
    trust      INTEGER NOT NULL DEFAULT 50,
    aggression INTEGER NOT NULL DEFAULT 50,
    updated_at TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS factions (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    name        TEXT NOT NULL UNIQUE,
    description TEXT NOT NULL,
    leader_id   TEXT NOT NULL,
    power_level INTEGER NOT NULL DEFAULT 0,
    territory   TEXT NOT NULL DEFAULT '',
    created_at  TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS faction_members (
    faction_id INTEGER NOT NULL REFERENCES factions(id) ON DELETE CASCADE,
    user_id    TEXT NOT NULL UNIQUE,
    role       TEXT NOT NULL DEFAULT 'member',
    joined_at  TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS faction_resources (
    faction_id INTEGER NOT NULL UNIQUE REFERENCES factions(id) ON DELETE CASCADE,
    food       INTEGER NOT NULL DEFAULT 0 CHECK (food >= 0),
    materials  INTEGER NOT NULL DEFAULT 0 CHECK (materials >= 0),
    currency   INTEGER NOT NULL DEFAULT 0 CHECK (currency >= 0),
    energy     INTEGER NOT NULL DEFAULT 0 CHECK (energy >= 0)
);
CREATE TABLE IF NOT EXISTS radio_stations (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    owner_id        TEXT NOT NULL UNIQUE,
    owner_name      TEXT NOT NULL,
    station_name    TEXT NOT NULL,
    signal_strength INTEGER NOT NULL DEFAULT 50,
    listeners       INTEGER NOT NULL DEFAULT 0 CHECK (listeners >= 0),
    equipment_level INTEGER NOT NULL DEFAULT 1,
    last_broadcast  TEXT,
    is_active       INTEGER NOT NULL DEFAULT 1,
    created_at      TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS radio_resources (
    station_id     INTEGER NOT NULL UNIQUE REFERENCES radio_stations(id) ON DELETE CASCADE,
    power          INTEGER NOT NULL DEFAULT 100 CHECK (power >= 0),
    parts          INTEGER NOT NULL DEFAULT 50 CHECK (parts >= 0),
    currency_spent INTEGER NOT NULL DEFAULT 0
);
CREATE TABLE IF NOT EXISTS urban_myths (
    id             INTEGER PRIMARY KEY AUTOINCREMENT,
    location       TEXT NOT NULL,
    phenomenon     TEXT NOT NULL,
    witness_report TEXT NOT NULL,
    status         TEXT NOT NULL DEFAULT 'active',
    difficulty     INTEGER NOT NULL DEFAULT 1,
    clues_found    INTEGER NOT NULL DEFAULT 0 CHECK (clues_found >= 0),
    progress       INTEGER NOT NULL DEFAULT 0 CHECK (progress >= 0),
    created_at     TEXT NOT NULL,
    updated_at     TEXT NOT NULL
);
";

const HOUSE_COLUMNS: &str = "h.id, h.owner_id, h.name, hs.integrity, hs.heat, hs.food, hs.water, \
     hs.noise, hs.power, hs.updated_at";

const NPC_COLUMNS: &str = "n.id, n.name, n.kind, n.personality, n.house_id, n.location, n.dialogue, \
     ns.hunger, ns.energy, ns.paranoia, ns.trust, ns.aggression";

const FACTION_COLUMNS: &str = "f.id, f.name, f.description, f.leader_id, f.power_level, f.territory, \
     f.created_at, fr.food, fr.materials, fr.currency, fr.energy";

const STATION_COLUMNS: &str = "rs.id, rs.owner_id, rs.owner_name, rs.station_name, rs.signal_strength, \
     rs.listeners, rs.equipment_level, rs.last_broadcast, rs.is_active, rr.power, rr.parts, \
     rr.currency_spent";

const MYTH_COLUMNS: &str = "id, location, phenomenon, witness_report, status, difficulty, clues_found, \
     progress, created_at";

/// SQLite-backed implementation of every store trait.
///
/// Cloning is cheap and shares the connection.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
    db_path: PathBuf,
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore")
            .field("db_path", &self.db_path)
            .finish_non_exhaustive()
    }
}

impl SqliteStore {
    /// Open (or create) the database at `path`.
    ///
    /// The schema is created if missing. WAL mode is enabled when
    /// `config.wal_mode` is `true`.
    ///
    /// # Errors
    ///
    /// Returns [`HovelError::Store`] on SQLite failures.
    pub fn open<P: AsRef<Path>>(path: P, config: &StoreConfig) -> Result<Self> {
        let db_path = path.as_ref().to_path_buf();
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;

        let conn = Connection::open_with_flags(&db_path, flags)?;

        if config.wal_mode {
            conn.execute_batch("PRAGMA journal_mode = WAL;")?;
        }
        conn.execute_batch("PRAGMA synchronous = NORMAL;")?;
        conn.busy_timeout(Duration::from_millis(config.busy_timeout_ms))?;

        let store = Self::from_connection(conn, db_path)?;
        info!(
            path = %store.db_path.display(),
            wal = config.wal_mode,
            "hovel store opened"
        );
        Ok(store)
    }

    /// Open the store described by `config`, honouring `":memory:"`.
    ///
    /// # Errors
    ///
    /// Returns [`HovelError::Store`] on SQLite failures.
    pub fn from_config(config: &StoreConfig) -> Result<Self> {
        if config.path == ":memory:" {
            Self::open_in_memory()
        } else {
            Self::open(&config.path, config)
        }
    }

    /// Open an in-memory database (useful for tests).
    ///
    /// # Errors
    ///
    /// Returns [`HovelError::Store`] on SQLite failures.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn, PathBuf::from(":memory:"))
    }

    fn from_connection(conn: Connection, db_path: PathBuf) -> Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            db_path,
        })
    }

    /// Path to the database file (or `:memory:`).
    #[must_use]
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// Run `op` against the connection on the blocking pool.
    async fn call<T, F>(&self, label: &'static str, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let start = Instant::now();
            let mut guard = conn.lock();
            let out = op(&mut guard);
            debug!(op = label, elapsed_us = start.elapsed().as_micros(), ok = out.is_ok(), "store call");
            out
        })
        .await?
    }

    /// Run an integrity check on the database.
    ///
    /// # Errors
    ///
    /// Returns [`HovelError::Store`] if the check query itself fails.
    pub async fn integrity_check(&self) -> Result<bool> {
        self.call("integrity_check", |conn| {
            let result: String = conn.query_row("PRAGMA integrity_check", [], |row| row.get(0))?;
            Ok(result == "ok")
        })
        .await
    }
}

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

fn now_text() -> (DateTime<Utc>, String) {
    let now = Utc::now();
    (now, now.to_rfc3339())
}

fn parse_ts(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e)))
}

fn house_from_row(row: &Row<'_>) -> rusqlite::Result<House> {
    let updated: String = row.get(9)?;
    Ok(House {
        id: HouseId(row.get(0)?),
        owner: OwnerId(row.get(1)?),
        name: row.get(2)?,
        stats: HouseStats {
            integrity: clamp_stat(row.get(3)?),
            heat: clamp_stat(row.get(4)?),
            food: clamp_stat(row.get(5)?),
            water: clamp_stat(row.get(6)?),
            noise: clamp_stat(row.get(7)?),
            power: clamp_stat(row.get(8)?),
        },
        updated_at: parse_ts(9, &updated)?,
    })
}

fn npc_from_row(row: &Row<'_>) -> rusqlite::Result<Npc> {
    let house: Option<i64> = row.get(4)?;
    Ok(Npc {
        id: NpcId(row.get(0)?),
        name: row.get(1)?,
        kind: row.get(2)?,
        personality: row.get(3)?,
        house: house.map(HouseId),
        location: row.get(5)?,
        dialogue: row.get(6)?,
        stats: NpcStats::clamped(row.get(7)?, row.get(8)?, row.get(9)?, row.get(10)?, row.get(11)?),
    })
}

fn faction_from_row(row: &Row<'_>) -> rusqlite::Result<Faction> {
    let created: String = row.get(6)?;
    Ok(Faction {
        id: FactionId(row.get(0)?),
        name: row.get(1)?,
        description: row.get(2)?,
        leader: OwnerId(row.get(3)?),
        power_level: row.get(4)?,
        territory: row.get(5)?,
        created_at: parse_ts(6, &created)?,
        resources: FactionResources {
            food: row.get(7)?,
            materials: row.get(8)?,
            currency: row.get(9)?,
            energy: row.get(10)?,
        },
        members: Vec::new(),
    })
}

fn station_from_row(row: &Row<'_>) -> rusqlite::Result<Station> {
    let last: Option<String> = row.get(7)?;
    let last_broadcast = match last {
        Some(raw) => Some(parse_ts(7, &raw)?),
        None => None,
    };
    Ok(Station {
        id: StationId(row.get(0)?),
        owner: OwnerId(row.get(1)?),
        owner_name: row.get(2)?,
        name: row.get(3)?,
        signal_strength: row.get(4)?,
        listeners: row.get(5)?,
        equipment_level: row.get(6)?,
        last_broadcast,
        is_active: row.get(8)?,
        power: row.get(9)?,
        parts: row.get(10)?,
        currency_spent: row.get(11)?,
    })
}

fn myth_from_row(row: &Row<'_>) -> rusqlite::Result<Myth> {
    let status: String = row.get(4)?;
    let created: String = row.get(8)?;
    Ok(Myth {
        id: MythId(row.get(0)?),
        location: row.get(1)?,
        phenomenon: row.get(2)?,
        witness_report: row.get(3)?,
        status: MythStatus::from_db(&status),
        difficulty: row.get(5)?,
        clues_found: row.get(6)?,
        progress: row.get(7)?,
        created_at: parse_ts(8, &created)?,
    })
}

fn select_house_by_owner(conn: &Connection, owner: &str) -> rusqlite::Result<Option<House>> {
    conn.query_row(
        &format!(
            "SELECT {HOUSE_COLUMNS} FROM houses h JOIN house_stats hs ON hs.house_id = h.id \
             WHERE h.owner_id = ?1"
        ),
        params![owner],
        house_from_row,
    )
    .optional()
}

fn select_npc(conn: &Connection, id: i64) -> rusqlite::Result<Option<Npc>> {
    conn.query_row(
        &format!("SELECT {NPC_COLUMNS} FROM npcs n JOIN npc_stats ns ON ns.npc_id = n.id WHERE n.id = ?1"),
        params![id],
        npc_from_row,
    )
    .optional()
}

fn select_faction(conn: &Connection, clause: &str, key: &dyn rusqlite::ToSql) -> rusqlite::Result<Option<Faction>> {
    let faction = conn
        .query_row(
            &format!(
                "SELECT {FACTION_COLUMNS} FROM factions f \
                 JOIN faction_resources fr ON fr.faction_id = f.id WHERE {clause}"
            ),
            [key],
            faction_from_row,
        )
        .optional()?;
    let Some(mut faction) = faction else {
        return Ok(None);
    };
    faction.members = select_members(conn, faction.id.0)?;
    Ok(Some(faction))
}

fn select_members(conn: &Connection, faction: i64) -> rusqlite::Result<Vec<FactionMember>> {
    let mut stmt = conn.prepare_cached(
        "SELECT user_id, role FROM faction_members WHERE faction_id = ?1 ORDER BY joined_at, rowid",
    )?;
    let rows = stmt.query_map(params![faction], |row| {
        let role: String = row.get(1)?;
        Ok(FactionMember {
            user: OwnerId(row.get(0)?),
            role: FactionRole::from_db(&role),
        })
    })?;
    rows.collect()
}

fn select_station(conn: &Connection, clause: &str, key: &dyn rusqlite::ToSql) -> rusqlite::Result<Option<Station>> {
    conn.query_row(
        &format!(
            "SELECT {STATION_COLUMNS} FROM radio_stations rs \
             JOIN radio_resources rr ON rr.station_id = rs.id WHERE {clause}"
        ),
        [key],
        station_from_row,
    )
    .optional()
}

fn select_myth(conn: &Connection, id: i64) -> rusqlite::Result<Option<Myth>> {
    conn.query_row(
        &format!("SELECT {MYTH_COLUMNS} FROM urban_myths WHERE id = ?1"),
        params![id],
        myth_from_row,
    )
    .optional()
}

// ---------------------------------------------------------------------------
// HouseStore
// ---------------------------------------------------------------------------

#[async_trait]
impl HouseStore for SqliteStore {
    async fn load_house(&self, owner: &OwnerId) -> Result<Option<House>> {
        let owner = owner.0.clone();
        self.call("load_house", move |conn| Ok(select_house_by_owner(conn, &owner)?))
            .await
    }

    async fn load_house_by_id(&self, id: HouseId) -> Result<Option<House>> {
        self.call("load_house_by_id", move |conn| {
            Ok(conn
                .query_row(
                    &format!(
                        "SELECT {HOUSE_COLUMNS} FROM houses h \
                         JOIN house_stats hs ON hs.house_id = h.id WHERE h.id = ?1"
                    ),
                    params![id.0],
                    house_from_row,
                )
                .optional()?)
        })
        .await
    }

    async fn create_house(&self, owner: &OwnerId, name: &str, stats: &HouseStats) -> Result<House> {
        let owner = owner.0.clone();
        let name = name.to_string();
        let stats = *stats;
        self.call("create_house", move |conn| {
            let (_, now) = now_text();
            let tx = conn.transaction()?;
            let inserted = tx.execute(
                "INSERT INTO houses (owner_id, name, description, created_at) VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(owner_id) DO NOTHING",
                params![owner, name, format!("House owned by {owner}"), now],
            )?;
            if inserted == 1 {
                let house_id = tx.last_insert_rowid();
                tx.execute(
                    "INSERT INTO house_stats (house_id, integrity, heat, food, water, noise, power, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                    params![
                        house_id,
                        stats.integrity,
                        stats.heat,
                        stats.food,
                        stats.water,
                        stats.noise,
                        stats.power,
                        now
                    ],
                )?;
            }
            let house = select_house_by_owner(&tx, &owner)?
                .ok_or_else(|| HovelError::Store(format!("house row for {owner} vanished mid-create")))?;
            tx.commit()?;
            Ok(house)
        })
        .await
    }

    async fn update_house_stats(&self, id: HouseId, patch: &ClampedHousePatch) -> Result<DateTime<Utc>> {
        let fields: Vec<(&'static str, u8)> = [
            ("integrity", patch.integrity),
            ("heat", patch.heat),
            ("food", patch.food),
            ("water", patch.water),
            ("noise", patch.noise),
            ("power", patch.power),
        ]
        .into_iter()
        .filter_map(|(col, v)| v.map(|v| (col, v)))
        .collect();

        self.call("update_house_stats", move |conn| {
            let (at, now) = now_text();
            let mut set: Vec<String> = fields
                .iter()
                .enumerate()
                .map(|(i, (col, _))| format!("{col} = ?{}", i + 1))
                .collect();
            let mut values: Vec<Value> = fields.iter().map(|(_, v)| Value::Integer(i64::from(*v))).collect();
            set.push(format!("updated_at = ?{}", values.len() + 1));
            values.push(Value::Text(now));
            values.push(Value::Integer(id.0));

            let sql = format!(
                "UPDATE house_stats SET {} WHERE house_id = ?{}",
                set.join(", "),
                values.len()
            );
            let changed = conn.execute(&sql, params_from_iter(values.iter()))?;
            if changed == 0 {
                return Err(HovelError::not_found("house", id));
            }
            Ok(at)
        })
        .await
    }

    async fn increment_integrity(&self, id: HouseId, delta: i64) -> Result<Option<u8>> {
        self.call("increment_integrity", move |conn| {
            let (_, now) = now_text();
            let value: Option<i64> = conn
                .query_row(
                    "UPDATE house_stats SET integrity = MIN(100, MAX(0, integrity + ?1)), updated_at = ?2
                     WHERE house_id = ?3 RETURNING integrity",
                    params![delta, now, id.0],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(value.map(clamp_stat))
        })
        .await
    }
}

// ---------------------------------------------------------------------------
// NpcStore
// ---------------------------------------------------------------------------

#[async_trait]
impl NpcStore for SqliteStore {
    async fn create_npc(&self, draft: &NpcDraft) -> Result<Npc> {
        let draft = draft.clone();
        self.call("create_npc", move |conn| {
            let (_, now) = now_text();
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT INTO npcs (name, kind, personality, house_id, location, dialogue, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
                params![
                    draft.name,
                    draft.kind,
                    draft.personality,
                    draft.house.map(|h| h.0),
                    draft.location,
                    draft.dialogue,
                    now
                ],
            )?;
            let id = tx.last_insert_rowid();
            let s = draft.stats;
            tx.execute(
                "INSERT INTO npc_stats (npc_id, hunger, energy, paranoia, trust, aggression, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![id, s.hunger, s.energy, s.paranoia, s.trust, s.aggression, now],
            )?;
            let npc = select_npc(&tx, id)?
                .ok_or_else(|| HovelError::Store(format!("npc {id} vanished mid-create")))?;
            tx.commit()?;
            Ok(npc)
        })
        .await
    }

    async fn load_npc(&self, id: NpcId) -> Result<Option<Npc>> {
        self.call("load_npc", move |conn| Ok(select_npc(conn, id.0)?)).await
    }

    async fn list_npcs_in_house(&self, house: HouseId) -> Result<Vec<Npc>> {
        self.call("list_npcs_in_house", move |conn| {
            let mut stmt = conn.prepare_cached(&format!(
                "SELECT {NPC_COLUMNS} FROM npcs n JOIN npc_stats ns ON ns.npc_id = n.id \
                 WHERE n.house_id = ?1 ORDER BY n.id"
            ))?;
            let rows = stmt.query_map(params![house.0], npc_from_row)?;
            Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
        })
        .await
    }

    async fn list_housed_npcs(&self) -> Result<Vec<Npc>> {
        self.call("list_housed_npcs", |conn| {
            let mut stmt = conn.prepare_cached(&format!(
                "SELECT {NPC_COLUMNS} FROM npcs n JOIN npc_stats ns ON ns.npc_id = n.id \
                 WHERE n.house_id IS NOT NULL ORDER BY n.id"
            ))?;
            let rows = stmt.query_map([], npc_from_row)?;
            Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
        })
        .await
    }

    async fn update_npc_stats(&self, id: NpcId, stats: &NpcStats) -> Result<()> {
        let s = *stats;
        self.call("update_npc_stats", move |conn| {
            let (_, now) = now_text();
            let changed = conn.execute(
                "UPDATE npc_stats SET hunger = ?1, energy = ?2, paranoia = ?3, trust = ?4,
                 aggression = ?5, updated_at = ?6 WHERE npc_id = ?7",
                params![s.hunger, s.energy, s.paranoia, s.trust, s.aggression, now, id.0],
            )?;
            if changed == 0 {
                return Err(HovelError::not_found("npc", id));
            }
            Ok(())
        })
        .await
    }

    async fn apply_npc_tick(&self, id: NpcId, stats: &NpcStats, departed: bool) -> Result<()> {
        let s = *stats;
        self.call("apply_npc_tick", move |conn| {
            let (_, now) = now_text();
            let tx = conn.transaction()?;
            let changed = tx.execute(
                "UPDATE npc_stats SET hunger = ?1, energy = ?2, paranoia = ?3, trust = ?4,
                 aggression = ?5, updated_at = ?6 WHERE npc_id = ?7",
                params![s.hunger, s.energy, s.paranoia, s.trust, s.aggression, now, id.0],
            )?;
            if changed == 0 {
                return Err(HovelError::not_found("npc", id));
            }
            if departed {
                tx.execute(
                    "UPDATE npcs SET house_id = NULL, location = ?1, updated_at = ?2 WHERE id = ?3",
                    params![LEFT_HOUSE_LOCATION, now, id.0],
                )?;
            }
            tx.commit()?;
            Ok(())
        })
        .await
    }
}

// ---------------------------------------------------------------------------
// FactionStore
// ---------------------------------------------------------------------------

#[async_trait]
impl FactionStore for SqliteStore {
    async fn create_faction(
        &self,
        name: &str,
        leader: &OwnerId,
        resources: &FactionResources,
    ) -> Result<Faction> {
        let name = name.to_string();
        let leader = leader.0.clone();
        let r = *resources;
        self.call("create_faction", move |conn| {
            let (_, now) = now_text();
            let tx = conn.transaction()?;
            let taken: bool = tx.query_row(
                "SELECT EXISTS(SELECT 1 FROM factions WHERE name = ?1)",
                params![name],
                |row| row.get(0),
            )?;
            if taken {
                return Err(HovelError::AlreadyExists {
                    kind: "faction",
                    key: name,
                });
            }
            tx.execute(
                "INSERT INTO factions (name, description, leader_id, created_at) VALUES (?1, ?2, ?3, ?4)",
                params![name, format!("Faction {name}"), leader, now],
            )?;
            let id = tx.last_insert_rowid();
            tx.execute(
                "INSERT INTO faction_members (faction_id, user_id, role, joined_at) VALUES (?1, ?2, ?3, ?4)",
                params![id, leader, FactionRole::Leader.as_db(), now],
            )?;
            tx.execute(
                "INSERT INTO faction_resources (faction_id, food, materials, currency, energy)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![id, r.food, r.materials, r.currency, r.energy],
            )?;
            let faction = select_faction(&tx, "f.id = ?1", &id)?
                .ok_or_else(|| HovelError::Store(format!("faction {id} vanished mid-create")))?;
            tx.commit()?;
            Ok(faction)
        })
        .await
    }

    async fn load_faction(&self, id: FactionId) -> Result<Option<Faction>> {
        self.call("load_faction", move |conn| Ok(select_faction(conn, "f.id = ?1", &id.0)?))
            .await
    }

    async fn load_faction_by_name(&self, name: &str) -> Result<Option<Faction>> {
        let name = name.to_string();
        self.call("load_faction_by_name", move |conn| {
            Ok(select_faction(conn, "f.name = ?1", &name)?)
        })
        .await
    }

    async fn faction_of_member(&self, user: &OwnerId) -> Result<Option<FactionId>> {
        let user = user.0.clone();
        self.call("faction_of_member", move |conn| {
            let id: Option<i64> = conn
                .query_row(
                    "SELECT faction_id FROM faction_members WHERE user_id = ?1",
                    params![user],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(id.map(FactionId))
        })
        .await
    }

    async fn add_member(&self, faction: FactionId, user: &OwnerId, role: FactionRole) -> Result<()> {
        let user = user.0.clone();
        self.call("add_member", move |conn| {
            let (_, now) = now_text();
            let inserted = conn.execute(
                "INSERT INTO faction_members (faction_id, user_id, role, joined_at) VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(user_id) DO NOTHING",
                params![faction.0, user, role.as_db(), now],
            )?;
            if inserted == 0 {
                return Err(HovelError::AlreadyExists {
                    kind: "faction membership",
                    key: user,
                });
            }
            Ok(())
        })
        .await
    }

    async fn remove_member(&self, user: &OwnerId) -> Result<Option<FactionId>> {
        let user = user.0.clone();
        self.call("remove_member", move |conn| {
            let id: Option<i64> = conn
                .query_row(
                    "DELETE FROM faction_members WHERE user_id = ?1 RETURNING faction_id",
                    params![user],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(id.map(FactionId))
        })
        .await
    }

    async fn list_factions(&self) -> Result<Vec<Faction>> {
        self.call("list_factions", |conn| {
            let mut factions = {
                let mut stmt = conn.prepare_cached(&format!(
                    "SELECT {FACTION_COLUMNS} FROM factions f \
                     JOIN faction_resources fr ON fr.faction_id = f.id ORDER BY f.id"
                ))?;
                let rows = stmt.query_map([], faction_from_row)?;
                rows.collect::<rusqlite::Result<Vec<_>>>()?
            };
            for faction in &mut factions {
                faction.members = select_members(conn, faction.id.0)?;
            }
            Ok(factions)
        })
        .await
    }

    async fn add_faction_resources(&self, faction: FactionId, delta: &ResourceDelta) -> Result<()> {
        let d = *delta;
        self.call("add_faction_resources", move |conn| {
            let changed = conn.execute(
                "UPDATE faction_resources SET food = food + ?1, materials = materials + ?2,
                 currency = currency + ?3, energy = energy + ?4 WHERE faction_id = ?5",
                params![d.food, d.materials, d.currency, d.energy, faction.0],
            )?;
            if changed == 0 {
                return Err(HovelError::not_found("faction", faction));
            }
            Ok(())
        })
        .await
    }

    async fn set_territory(&self, faction: FactionId, territory: &str) -> Result<()> {
        let territory = territory.to_string();
        self.call("set_territory", move |conn| {
            let changed = conn.execute(
                "UPDATE factions SET territory = ?1 WHERE id = ?2",
                params![territory, faction.0],
            )?;
            if changed == 0 {
                return Err(HovelError::not_found("faction", faction));
            }
            Ok(())
        })
        .await
    }
}

// ---------------------------------------------------------------------------
// RadioStore
// ---------------------------------------------------------------------------

#[async_trait]
impl RadioStore for SqliteStore {
    async fn create_station(&self, draft: &StationDraft) -> Result<Station> {
        let draft = draft.clone();
        self.call("create_station", move |conn| {
            let (_, now) = now_text();
            let tx = conn.transaction()?;
            let inserted = tx.execute(
                "INSERT INTO radio_stations (owner_id, owner_name, station_name, signal_strength,
                 equipment_level, created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(owner_id) DO NOTHING",
                params![
                    draft.owner.0,
                    draft.owner_name,
                    draft.name,
                    draft.signal_strength,
                    draft.equipment_level,
                    now
                ],
            )?;
            if inserted == 0 {
                return Err(HovelError::AlreadyExists {
                    kind: "radio station",
                    key: draft.owner.0,
                });
            }
            let id = tx.last_insert_rowid();
            tx.execute(
                "INSERT INTO radio_resources (station_id, power, parts, currency_spent) VALUES (?1, ?2, ?3, 0)",
                params![id, draft.power, draft.parts],
            )?;
            let station = select_station(&tx, "rs.id = ?1", &id)?
                .ok_or_else(|| HovelError::Store(format!("station {id} vanished mid-create")))?;
            tx.commit()?;
            Ok(station)
        })
        .await
    }

    async fn load_station_by_owner(&self, owner: &OwnerId) -> Result<Option<Station>> {
        let owner = owner.0.clone();
        self.call("load_station_by_owner", move |conn| {
            Ok(select_station(conn, "rs.owner_id = ?1", &owner)?)
        })
        .await
    }

    async fn load_station(&self, id: StationId) -> Result<Option<Station>> {
        self.call("load_station", move |conn| Ok(select_station(conn, "rs.id = ?1", &id.0)?))
            .await
    }

    async fn list_stations(&self) -> Result<Vec<Station>> {
        self.call("list_stations", |conn| {
            let mut stmt = conn.prepare_cached(&format!(
                "SELECT {STATION_COLUMNS} FROM radio_stations rs \
                 JOIN radio_resources rr ON rr.station_id = rs.id ORDER BY rs.listeners DESC, rs.id"
            ))?;
            let rows = stmt.query_map([], station_from_row)?;
            Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
        })
        .await
    }

    async fn record_broadcast(
        &self,
        id: StationId,
        listener_gain: i64,
        power_cost: i64,
        signal_gain: i64,
        at: DateTime<Utc>,
    ) -> Result<()> {
        self.call("record_broadcast", move |conn| {
            let tx = conn.transaction()?;
            let changed = tx.execute(
                "UPDATE radio_stations SET listeners = listeners + MAX(0, ?1),
                 signal_strength = MIN(100, signal_strength + MAX(0, ?2)), last_broadcast = ?3
                 WHERE id = ?4",
                params![listener_gain, signal_gain, at.to_rfc3339(), id.0],
            )?;
            if changed == 0 {
                return Err(HovelError::not_found("radio station", id));
            }
            tx.execute(
                "UPDATE radio_resources SET power = MAX(0, power - ?1) WHERE station_id = ?2",
                params![power_cost, id.0],
            )?;
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn upgrade_equipment(&self, id: StationId, cost_per_level: i64) -> Result<Station> {
        self.call("upgrade_equipment", move |conn| {
            let tx = conn.transaction()?;
            let station = select_station(&tx, "rs.id = ?1", &id.0)?
                .ok_or_else(|| HovelError::not_found("radio station", id))?;
            let cost = station.equipment_level * cost_per_level;
            if station.parts < cost {
                return Err(HovelError::InsufficientParts {
                    needed: cost,
                    available: station.parts,
                });
            }
            tx.execute(
                "UPDATE radio_resources SET parts = parts - ?1, currency_spent = currency_spent + ?1
                 WHERE station_id = ?2",
                params![cost, id.0],
            )?;
            tx.execute(
                "UPDATE radio_stations SET equipment_level = equipment_level + 1 WHERE id = ?1",
                params![id.0],
            )?;
            let updated = select_station(&tx, "rs.id = ?1", &id.0)?
                .ok_or_else(|| HovelError::not_found("radio station", id))?;
            tx.commit()?;
            Ok(updated)
        })
        .await
    }

    async fn boost_signal(&self, id: StationId, cost: i64, gain: i64) -> Result<Station> {
        self.call("boost_signal", move |conn| {
            let tx = conn.transaction()?;
            let station = select_station(&tx, "rs.id = ?1", &id.0)?
                .ok_or_else(|| HovelError::not_found("radio station", id))?;
            if station.parts < cost {
                return Err(HovelError::InsufficientParts {
                    needed: cost,
                    available: station.parts,
                });
            }
            tx.execute(
                "UPDATE radio_resources SET parts = parts - ?1, currency_spent = currency_spent + ?1
                 WHERE station_id = ?2",
                params![cost, id.0],
            )?;
            tx.execute(
                "UPDATE radio_stations SET signal_strength = MIN(100, signal_strength + ?1) WHERE id = ?2",
                params![gain, id.0],
            )?;
            let updated = select_station(&tx, "rs.id = ?1", &id.0)?
                .ok_or_else(|| HovelError::not_found("radio station", id))?;
            tx.commit()?;
            Ok(updated)
        })
        .await
    }
}

// ---------------------------------------------------------------------------
// MythStore
// ---------------------------------------------------------------------------

#[async_trait]
impl MythStore for SqliteStore {
    async fn create_myth(&self, draft: &MythDraft) -> Result<Myth> {
        let draft = draft.clone();
        self.call("create_myth", move |conn| {
            let (_, now) = now_text();
            conn.execute(
                "INSERT INTO urban_myths (location, phenomenon, witness_report, status, difficulty,
                 clues_found, progress, created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?5, 0, 0, ?6, ?6)",
                params![
                    draft.location,
                    draft.phenomenon,
                    draft.witness_report,
                    MythStatus::Active.as_db(),
                    draft.difficulty,
                    now
                ],
            )?;
            let id = conn.last_insert_rowid();
            select_myth(conn, id)?.ok_or_else(|| HovelError::Store(format!("myth {id} vanished mid-create")))
        })
        .await
    }

    async fn load_myth(&self, id: MythId) -> Result<Option<Myth>> {
        self.call("load_myth", move |conn| Ok(select_myth(conn, id.0)?)).await
    }

    async fn list_myths(&self, status: Option<MythStatus>) -> Result<Vec<Myth>> {
        self.call("list_myths", move |conn| {
            let myths = match status {
                Some(status) => {
                    let mut stmt = conn.prepare_cached(&format!(
                        "SELECT {MYTH_COLUMNS} FROM urban_myths WHERE status = ?1 ORDER BY created_at DESC, id DESC"
                    ))?;
                    let rows = stmt.query_map(params![status.as_db()], myth_from_row)?;
                    rows.collect::<rusqlite::Result<Vec<_>>>()?
                }
                None => {
                    let mut stmt = conn.prepare_cached(&format!(
                        "SELECT {MYTH_COLUMNS} FROM urban_myths ORDER BY created_at DESC, id DESC"
                    ))?;
                    let rows = stmt.query_map([], myth_from_row)?;
                    rows.collect::<rusqlite::Result<Vec<_>>>()?
                }
            };
            Ok(myths)
        })
        .await
    }

    async fn random_active_myth(&self) -> Result<Option<Myth>> {
        self.call("random_active_myth", |conn| {
            Ok(conn
                .query_row(
                    &format!(
                        "SELECT {MYTH_COLUMNS} FROM urban_myths WHERE status = ?1 ORDER BY RANDOM() LIMIT 1"
                    ),
                    params![MythStatus::Active.as_db()],
                    myth_from_row,
                )
                .optional()?)
        })
        .await
    }

    async fn advance_myth(&self, id: MythId, progress: i64, clues: i64, threshold: i64) -> Result<bool> {
        self.call("advance_myth", move |conn| {
            let (_, now) = now_text();
            // SET expressions read the pre-update row, so the CASE sees the old progress.
            let changed = conn.execute(
                "UPDATE urban_myths SET
                    progress = MIN(?1, progress + MAX(0, ?2)),
                    clues_found = clues_found + MAX(0, ?3),
                    status = CASE WHEN progress + MAX(0, ?2) >= ?1 THEN ?4 ELSE status END,
                    updated_at = ?5
                 WHERE id = ?6 AND status = ?7",
                params![
                    threshold,
                    progress,
                    clues,
                    MythStatus::Solved.as_db(),
                    now,
                    id.0,
                    MythStatus::Active.as_db()
                ],
            )?;
            Ok(changed > 0)
        })
        .await
    }

    async fn mark_myth_solved(&self, id: MythId, threshold: i64) -> Result<bool> {
        self.call("mark_myth_solved", move |conn| {
            let (_, now) = now_text();
            let changed = conn.execute(
                "UPDATE urban_myths SET status = ?1, updated_at = ?3
                 WHERE id = ?4 AND status = ?5 AND progress >= ?2",
                params![
                    MythStatus::Solved.as_db(),
                    threshold,
                    now,
                    id.0,
                    MythStatus::Active.as_db()
                ],
            )?;
            Ok(changed > 0)
        })
        .await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
