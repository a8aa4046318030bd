//! Urban myths: strange sightings users investigate until solved.
//!
//! Progress and clue counts only grow. Reaching the solve threshold flips
//! the myth to [`MythStatus::Solved`], after which it can no longer be
//! investigated.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::MythConfig;
use crate::error::{HovelError, Result};
use crate::store::MythStore;
use crate::types::MythId;

/// Hardest rating a myth can carry.
pub const MAX_DIFFICULTY: i64 = 3;

/// Investigation state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MythStatus {
    /// Still open.
    Active,
    /// Closed.
    Solved,
}

impl MythStatus {
    /// Column value.
    #[must_use]
    pub fn as_db(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Solved => "solved",
        }
    }

    /// Parse a column value; unknown values read as `Active`.
    #[must_use]
    pub fn from_db(raw: &str) -> Self {
        match raw {
            "solved" => Self::Solved,
            _ => Self::Active,
        }
    }
}

impl fmt::Display for MythStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_db())
    }
}

/// A sighting to record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MythDraft {
    /// Where it was seen.
    pub location: String,
    /// What was seen.
    pub phenomenon: String,
    /// Witness account.
    pub witness_report: String,
    /// 1 (easy) to [`MAX_DIFFICULTY`].
    pub difficulty: i64,
}

/// Snapshot of a myth.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Myth {
    /// Row id.
    pub id: MythId,
    /// Where it was seen.
    pub location: String,
    /// What was seen.
    pub phenomenon: String,
    /// Witness account.
    pub witness_report: String,
    /// Investigation state.
    pub status: MythStatus,
    /// Difficulty rating.
    pub difficulty: i64,
    /// Clues uncovered.
    pub clues_found: i64,
    /// Percent solved.
    pub progress: i64,
    /// When it was discovered.
    pub created_at: DateTime<Utc>,
}

/// Result of one investigation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Investigation {
    /// Myth afterwards.
    pub myth: Myth,
    /// Progress actually gained (after capping).
    pub progress_gain: i64,
    /// Clues gained.
    pub clue_gain: i64,
    /// Whether this investigation solved it.
    pub solved_now: bool,
}

/// Myth subsystem.
pub struct MythSystem {
    store: Arc<dyn MythStore>,
    config: MythConfig,
    rng: Mutex<StdRng>,
}

impl MythSystem {
    /// New subsystem with an entropy-seeded RNG.
    pub fn new(store: Arc<dyn MythStore>, config: MythConfig) -> Self {
        Self::with_rng(store, config, StdRng::from_entropy())
    }

    /// New subsystem with an explicit RNG.
    pub fn with_rng(store: Arc<dyn MythStore>, config: MythConfig, rng: StdRng) -> Self {
        Self {
            store,
            config,
            rng: Mutex::new(rng),
        }
    }

    /// Record a new active myth.
    ///
    /// # Errors
    /// `InvalidInput` for blank text fields or a difficulty outside
    /// `1..=MAX_DIFFICULTY`.
    pub async fn discover(&self, draft: MythDraft) -> Result<Myth> {
        if draft.location.trim().is_empty() || draft.phenomenon.trim().is_empty() {
            return Err(HovelError::InvalidInput(
                "a myth needs a location and a phenomenon".into(),
            ));
        }
        if !(1..=MAX_DIFFICULTY).contains(&draft.difficulty) {
            return Err(HovelError::InvalidInput(format!(
                "difficulty must be between 1 and {MAX_DIFFICULTY}, got {}",
                draft.difficulty
            )));
        }
        let myth = self.store.create_myth(&draft).await?;
        info!(myth = %myth.id, location = %myth.location, "myth discovered");
        Ok(myth)
    }

    /// Record a sighting with a rolled difficulty in `1..=MAX_DIFFICULTY`.
    ///
    /// # Errors
    /// As [`MythSystem::discover`].
    pub async fn report(&self, location: &str, phenomenon: &str, witness_report: &str) -> Result<Myth> {
        let difficulty = self.rng.lock().gen_range(1..=MAX_DIFFICULTY);
        self.discover(MythDraft {
            location: location.trim().to_owned(),
            phenomenon: phenomenon.trim().to_owned(),
            witness_report: witness_report.trim().to_owned(),
            difficulty,
        })
        .await
    }

    /// Myth by id.
    ///
    /// # Errors
    /// Store failures only.
    pub async fn get(&self, id: MythId) -> Result<Option<Myth>> {
        self.store.load_myth(id).await
    }

    /// A random myth still open.
    ///
    /// # Errors
    /// Store failures only.
    pub async fn random_active(&self) -> Result<Option<Myth>> {
        self.store.random_active_myth().await
    }

    /// Myths, optionally filtered by status.
    ///
    /// # Errors
    /// Store failures only.
    pub async fn list(&self, status: Option<MythStatus>) -> Result<Vec<Myth>> {
        self.store.list_myths(status).await
    }

    /// Add progress and clues. Progress is capped at the solve threshold;
    /// reaching it solves the myth.
    ///
    /// # Errors
    /// `InvalidInput` for negative gains or a solved myth, `NotFound` for an
    /// unknown id.
    pub async fn investigate(&self, id: MythId, progress_gain: i64, clue_gain: i64) -> Result<Investigation> {
        if progress_gain < 0 || clue_gain < 0 {
            return Err(HovelError::InvalidInput(
                "investigation cannot undo progress".into(),
            ));
        }
        let before = self.require(id).await?;
        if before.status == MythStatus::Solved {
            return Err(HovelError::InvalidInput(format!("myth {id} is already solved")));
        }
        let threshold = self.config.solve_threshold;
        if !self.store.advance_myth(id, progress_gain, clue_gain, threshold).await? {
            // Solved by someone else between the read and the write.
            return Err(HovelError::InvalidInput(format!("myth {id} is already solved")));
        }
        let myth = self.require(id).await?;
        let solved_now = myth.status == MythStatus::Solved;
        if solved_now {
            info!(myth = %id, clues = myth.clues_found, "myth solved");
        }
        Ok(Investigation {
            progress_gain: myth.progress - before.progress,
            clue_gain: myth.clues_found - before.clues_found,
            myth,
            solved_now,
        })
    }

    /// Investigate with rolled gains: 10..=30 progress and 1..=3 clues.
    ///
    /// # Errors
    /// As [`MythSystem::investigate`].
    pub async fn investigate_rolled(&self, id: MythId) -> Result<Investigation> {
        let (progress, clues) = {
            let mut rng = self.rng.lock();
            (rng.gen_range(10..=30), rng.gen_range(1..=3))
        };
        self.investigate(id, progress, clues).await
    }

    /// Close an active myth whose progress has reached the solve threshold.
    ///
    /// # Errors
    /// `NotFound` for an unknown id, `InvalidInput` when the myth is already
    /// solved or still short of the threshold.
    pub async fn mark_solved(&self, id: MythId) -> Result<Myth> {
        let myth = self.require(id).await?;
        if myth.status == MythStatus::Solved {
            return Err(HovelError::InvalidInput(format!("myth {id} has already been solved")));
        }
        let threshold = self.config.solve_threshold;
        if myth.progress < threshold {
            return Err(HovelError::InvalidInput(format!(
                "myth {id} is only {}% investigated, {}% more needed",
                myth.progress,
                threshold - myth.progress
            )));
        }
        if !self.store.mark_myth_solved(id, threshold).await? {
            return Err(HovelError::InvalidInput(format!("myth {id} has already been solved")));
        }
        info!(myth = %id, "myth marked solved");
        self.require(id).await
    }

    async fn require(&self, id: MythId) -> Result<Myth> {
        self.store
            .load_myth(id)
            .await?
            .ok_or_else(|| HovelError::not_found("myth", id))
    }
}

impl fmt::Debug for MythSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MythSystem")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SqliteStore;

    fn myths() -> MythSystem {
        let store = Arc::new(SqliteStore::open_in_memory().expect("open"));
        MythSystem::with_rng(store, MythConfig::default(), StdRng::seed_from_u64(3))
    }

    fn sighting() -> MythDraft {
        MythDraft {
            location: "the old tram depot".into(),
            phenomenon: "a humming light".into(),
            witness_report: "it followed me home".into(),
            difficulty: 2,
        }
    }

    #[tokio::test]
    async fn progress_caps_and_solves() {
        let myths = myths();
        let myth = myths.discover(sighting()).await.expect("discover");
        assert_eq!(myth.status, MythStatus::Active);

        let step = myths.investigate(myth.id, 70, 2).await.expect("investigate");
        assert_eq!(step.myth.progress, 70);
        assert!(!step.solved_now);

        let step = myths.investigate(myth.id, 50, 1).await.expect("investigate");
        assert_eq!(step.myth.progress, 100);
        assert_eq!(step.progress_gain, 30);
        assert_eq!(step.myth.clues_found, 3);
        assert!(step.solved_now);
        assert_eq!(step.myth.status, MythStatus::Solved);

        let err = myths.investigate(myth.id, 10, 1).await.unwrap_err();
        assert!(matches!(err, HovelError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn rolled_investigation_stays_in_range() {
        let myths = myths();
        let myth = myths.discover(sighting()).await.expect("discover");
        let step = myths.investigate_rolled(myth.id).await.expect("roll");
        assert!((10..=30).contains(&step.progress_gain));
        assert!((1..=3).contains(&step.clue_gain));
    }

    #[tokio::test]
    async fn negative_gain_rejected() {
        let myths = myths();
        let myth = myths.discover(sighting()).await.expect("discover");
        let err = myths.investigate(myth.id, -5, 0).await.unwrap_err();
        assert!(matches!(err, HovelError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn list_filters_by_status() {
        let myths = myths();
        let a = myths.discover(sighting()).await.expect("a");
        myths.discover(sighting()).await.expect("b");
        myths.investigate(a.id, 100, 1).await.expect("solve");

        assert_eq!(myths.list(Some(MythStatus::Solved)).await.expect("solved").len(), 1);
        assert_eq!(myths.list(Some(MythStatus::Active)).await.expect("active").len(), 1);
        assert_eq!(myths.list(None).await.expect("all").len(), 2);
        let random = myths.random_active().await.expect("random").expect("Some");
        assert_ne!(random.id, a.id);
    }

    #[tokio::test]
    async fn solve_needs_full_progress() {
        let myths = myths();
        let myth = myths.discover(sighting()).await.expect("discover");
        let err = myths.mark_solved(myth.id).await.unwrap_err();
        assert!(matches!(err, HovelError::InvalidInput(ref msg) if msg.contains("100% more")));

        myths.investigate(myth.id, 40, 1).await.expect("investigate");
        let err = myths.mark_solved(myth.id).await.unwrap_err();
        assert!(matches!(err, HovelError::InvalidInput(ref msg) if msg.contains("60% more")));
        let still = myths.get(myth.id).await.expect("get").expect("Some");
        assert_eq!((still.progress, still.status), (40, MythStatus::Active));
    }

    #[tokio::test]
    async fn solve_closes_a_myth_at_full_progress_once() {
        let store = Arc::new(SqliteStore::open_in_memory().expect("open"));
        let myths = MythSystem::with_rng(store.clone(), MythConfig::default(), StdRng::seed_from_u64(3));
        let myth = myths.discover(sighting()).await.expect("discover");
        // Reached 100 under a stricter threshold, so it is still open.
        assert!(store.advance_myth(myth.id, 100, 2, 150).await.expect("advance"));

        let solved = myths.mark_solved(myth.id).await.expect("solve");
        assert_eq!((solved.progress, solved.status), (100, MythStatus::Solved));

        let err = myths.mark_solved(myth.id).await.unwrap_err();
        assert!(matches!(err, HovelError::InvalidInput(ref msg) if msg.contains("already been solved")));
    }

    #[tokio::test]
    async fn reported_myths_roll_a_bounded_difficulty() {
        let myths = myths();
        for _ in 0..12 {
            let myth = myths
                .report(" the old tram depot ", "a humming light", "")
                .await
                .expect("report");
            assert!((1..=MAX_DIFFICULTY).contains(&myth.difficulty), "rolled {}", myth.difficulty);
            assert_eq!(myth.location, "the old tram depot");
        }
        let mut hard = sighting();
        hard.difficulty = MAX_DIFFICULTY + 1;
        assert!(matches!(myths.discover(hard).await, Err(HovelError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn unknown_myth_is_not_found() {
        let myths = myths();
        let err = myths.mark_solved(MythId(9)).await.unwrap_err();
        assert!(matches!(err, HovelError::NotFound { .. }));
    }
}
