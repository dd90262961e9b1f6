//! SQLite persistence for pets and caretaker stats.
//!
//! One `pets` row per guild, one `caretaker_stats` row per (guild, user), and
//! a `leaderboard_archive` of completed lifecycles. All reads funnel through
//! [`PetStore::get_or_create`], which ticks the record before returning it,
//! so callers always see up-to-date state. A row that cannot be read back is
//! replaced by a fresh egg rather than surfaced as an error.

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::migrate::MigrateDatabase;
use sqlx::sqlite::SqlitePool;
use sqlx::{FromRow, Sqlite};
use thiserror::Error;
use tracing::warn;

use crate::pet::{PetRecord, TickOutcome};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),
    #[error("corrupt value in column {column}: {value}")]
    Corrupt { column: &'static str, value: String },
}

// ---------------------------------------------------------------------------
// Row shapes
// ---------------------------------------------------------------------------

/// Raw `pets` row; timestamps stay text until [`PetRecord`] conversion.
#[derive(Debug, FromRow)]
struct PetRow {
    guild_id: String,
    name: String,
    hunger: i64,
    happiness: i64,
    birth_time: String,
    love_today: i64,
    love_reset_date: String,
    last_fed_at: String,
    resting_since: Option<String>,
    last_active_at: String,
    nudged: i64,
    home_channel_id: Option<String>,
    updated_at: String,
}

impl TryFrom<PetRow> for PetRecord {
    type Error = StoreError;

    fn try_from(row: PetRow) -> Result<Self, StoreError> {
        Ok(PetRecord {
            guild_id: row.guild_id,
            name: row.name,
            hunger: row.hunger,
            happiness: row.happiness,
            birth_time: parse_ts("birth_time", &row.birth_time)?,
            love_today: row.love_today,
            love_reset_date: parse_date("love_reset_date", &row.love_reset_date)?,
            last_fed_at: parse_ts("last_fed_at", &row.last_fed_at)?,
            resting_since: row
                .resting_since
                .as_deref()
                .map(|v| parse_ts("resting_since", v))
                .transpose()?,
            last_active_at: parse_ts("last_active_at", &row.last_active_at)?,
            nudged: row.nudged != 0,
            home_channel_id: row.home_channel_id,
            updated_at: parse_ts("updated_at", &row.updated_at)?,
        })
    }
}

fn parse_ts(column: &'static str, value: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| StoreError::Corrupt {
            column,
            value: value.to_string(),
        })
}

fn parse_date(column: &'static str, value: &str) -> Result<NaiveDate, StoreError> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d").map_err(|_| StoreError::Corrupt {
        column,
        value: value.to_string(),
    })
}

/// One caretaker's counters for the current day.
#[derive(Debug, Clone, FromRow)]
pub struct CaretakerTotal {
    pub user_id: String,
    pub feeds: i64,
    pub plays: i64,
}

impl CaretakerTotal {
    pub fn total(&self) -> i64 {
        self.feeds + self.plays
    }
}

/// Which counter a care action credits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CareAction {
    Feed,
    Play,
}

// ---------------------------------------------------------------------------
// PetStore
// ---------------------------------------------------------------------------

/// Handle to the pet database. Cheap to clone (pool is `Arc` internally).
#[derive(Clone)]
pub struct PetStore {
    pool: SqlitePool,
}

impl PetStore {
    /// Open (creating if necessary) the database at `url` and ensure the
    /// schema exists.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        if !Sqlite::database_exists(url).await.unwrap_or(false) {
            Sqlite::create_database(url).await?;
        }
        let pool = SqlitePool::connect(url).await?;
        Self::ensure_schema(&pool).await?;
        Ok(Self { pool })
    }

    /// An isolated in-memory store for tests. The single-connection pool
    /// keeps every query on the same in-memory database.
    #[cfg(test)]
    pub async fn in_memory() -> Result<Self, StoreError> {
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        Self::ensure_schema(&pool).await?;
        Ok(Self { pool })
    }

    async fn ensure_schema(pool: &SqlitePool) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS pets (
                guild_id        TEXT PRIMARY KEY,
                name            TEXT NOT NULL,
                hunger          INTEGER NOT NULL,
                happiness       INTEGER NOT NULL,
                birth_time      TEXT NOT NULL,
                love_today      INTEGER NOT NULL,
                love_reset_date TEXT NOT NULL,
                last_fed_at     TEXT NOT NULL,
                resting_since   TEXT,
                last_active_at  TEXT NOT NULL,
                nudged          INTEGER NOT NULL,
                home_channel_id TEXT,
                updated_at      TEXT NOT NULL
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS caretaker_stats (
                guild_id        TEXT NOT NULL,
                user_id         TEXT NOT NULL,
                feeds           INTEGER NOT NULL,
                plays           INTEGER NOT NULL,
                first_action_at TEXT NOT NULL,
                last_action_at  TEXT NOT NULL,
                last_reset      TEXT NOT NULL,
                PRIMARY KEY (guild_id, user_id)
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS leaderboard_archive (
                guild_id       TEXT NOT NULL,
                cycle_ended_at TEXT NOT NULL,
                user_id        TEXT NOT NULL,
                total          INTEGER NOT NULL
            )
            "#,
        )
        .execute(pool)
        .await?;

        Ok(())
    }

    // ------------------------------------------------------------------
    // Pets
    // ------------------------------------------------------------------

    /// Fetch the guild's pet, ticked up to `now`, creating a fresh egg when
    /// the guild has none (or its row is unreadable). The ticked state and
    /// any tick side effects (daily caretaker reset, rebirth snapshot) are
    /// persisted before returning.
    pub async fn get_or_create(
        &self,
        guild_id: &str,
        now: DateTime<Utc>,
    ) -> Result<PetRecord, StoreError> {
        let row: Option<PetRow> = sqlx::query_as("SELECT * FROM pets WHERE guild_id = ?")
            .bind(guild_id)
            .fetch_optional(&self.pool)
            .await?;

        let mut pet = match row {
            Some(row) => match PetRecord::try_from(row) {
                Ok(pet) => pet,
                Err(e) => {
                    warn!(guild_id, error = %e, "unreadable pet record, hatching a fresh egg");
                    PetRecord::hatch(guild_id, now)
                }
            },
            None => PetRecord::hatch(guild_id, now),
        };

        let outcome = pet.tick(now);
        self.apply_outcome(guild_id, outcome, now).await?;
        self.save(&pet).await?;
        Ok(pet)
    }

    /// Upsert the pet row.
    pub async fn save(&self, pet: &PetRecord) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO pets (
                guild_id, name, hunger, happiness, birth_time, love_today,
                love_reset_date, last_fed_at, resting_since, last_active_at,
                nudged, home_channel_id, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(guild_id) DO UPDATE SET
                name            = excluded.name,
                hunger          = excluded.hunger,
                happiness       = excluded.happiness,
                birth_time      = excluded.birth_time,
                love_today      = excluded.love_today,
                love_reset_date = excluded.love_reset_date,
                last_fed_at     = excluded.last_fed_at,
                resting_since   = excluded.resting_since,
                last_active_at  = excluded.last_active_at,
                nudged          = excluded.nudged,
                home_channel_id = excluded.home_channel_id,
                updated_at      = excluded.updated_at
            "#,
        )
        .bind(&pet.guild_id)
        .bind(&pet.name)
        .bind(pet.hunger)
        .bind(pet.happiness)
        .bind(pet.birth_time.to_rfc3339())
        .bind(pet.love_today)
        .bind(pet.love_reset_date.format("%Y-%m-%d").to_string())
        .bind(pet.last_fed_at.to_rfc3339())
        .bind(pet.resting_since.map(|t| t.to_rfc3339()))
        .bind(pet.last_active_at.to_rfc3339())
        .bind(pet.nudged as i64)
        .bind(&pet.home_channel_id)
        .bind(pet.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Every guild that has a pet (for the ticker's sweep).
    pub async fn guild_ids(&self) -> Result<Vec<String>, StoreError> {
        let rows: Vec<(String,)> = sqlx::query_as("SELECT guild_id FROM pets")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    /// Record that the inactivity reminder went out.
    pub async fn mark_nudged(&self, guild_id: &str) -> Result<(), StoreError> {
        sqlx::query("UPDATE pets SET nudged = 1 WHERE guild_id = ?")
            .bind(guild_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn apply_outcome(
        &self,
        guild_id: &str,
        outcome: TickOutcome,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        if outcome.reborn {
            self.archive_caretakers(guild_id, now).await?;
        } else if outcome.daily_reset {
            self.reset_daily_caretakers(guild_id, now.date_naive()).await?;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Caretakers
    // ------------------------------------------------------------------

    /// Credit a feed or play to the caller's daily counters.
    pub async fn record_care(
        &self,
        guild_id: &str,
        user_id: &str,
        action: CareAction,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let today = now.date_naive().format("%Y-%m-%d").to_string();

        let row: Option<(i64, i64, String, String)> = sqlx::query_as(
            "SELECT feeds, plays, first_action_at, last_reset
             FROM caretaker_stats WHERE guild_id = ? AND user_id = ?",
        )
        .bind(guild_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        let (mut feeds, mut plays, mut first_action_at) = match row {
            Some((feeds, plays, first, last_reset)) if last_reset == today => {
                (feeds, plays, first)
            }
            // First action of a new day (or ever): counters start over.
            _ => (0, 0, now.to_rfc3339()),
        };

        // A row zeroed by the ticker's daily sweep keeps last_reset == today;
        // its first action still starts the day's clock.
        if feeds + plays == 0 {
            first_action_at = now.to_rfc3339();
        }

        match action {
            CareAction::Feed => feeds += 1,
            CareAction::Play => plays += 1,
        }

        sqlx::query(
            r#"
            INSERT INTO caretaker_stats (
                guild_id, user_id, feeds, plays, first_action_at,
                last_action_at, last_reset
            )
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(guild_id, user_id) DO UPDATE SET
                feeds           = excluded.feeds,
                plays           = excluded.plays,
                first_action_at = excluded.first_action_at,
                last_action_at  = excluded.last_action_at,
                last_reset      = excluded.last_reset
            "#,
        )
        .bind(guild_id)
        .bind(user_id)
        .bind(feeds)
        .bind(plays)
        .bind(first_action_at)
        .bind(now.to_rfc3339())
        .bind(today)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Today's top caretakers: total descending, ties broken by earliest
    /// contribution, then user id for a total order.
    pub async fn top_caretakers(
        &self,
        guild_id: &str,
        limit: i64,
    ) -> Result<Vec<CaretakerTotal>, StoreError> {
        let rows = sqlx::query_as::<_, CaretakerTotal>(
            "SELECT user_id, feeds, plays
             FROM caretaker_stats
             WHERE guild_id = ? AND feeds + plays > 0
             ORDER BY feeds + plays DESC, first_action_at ASC, user_id ASC
             LIMIT ?",
        )
        .bind(guild_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Recently active caretakers, for the reminder mention.
    pub async fn recent_caretakers(
        &self,
        guild_id: &str,
        limit: i64,
    ) -> Result<Vec<String>, StoreError> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT user_id FROM caretaker_stats
             WHERE guild_id = ?
             ORDER BY last_action_at DESC
             LIMIT ?",
        )
        .bind(guild_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    /// Zero the day-counters of every caretaker row not already reset today.
    async fn reset_daily_caretakers(
        &self,
        guild_id: &str,
        today: NaiveDate,
    ) -> Result<(), StoreError> {
        let today = today.format("%Y-%m-%d").to_string();
        sqlx::query(
            "UPDATE caretaker_stats
             SET feeds = 0, plays = 0, last_reset = ?
             WHERE guild_id = ? AND last_reset != ?",
        )
        .bind(&today)
        .bind(guild_id)
        .bind(&today)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Snapshot the cycle's totals into the leaderboard of record, then clear
    /// the live caretaker rows.
    async fn archive_caretakers(
        &self,
        guild_id: &str,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO leaderboard_archive (guild_id, cycle_ended_at, user_id, total)
             SELECT guild_id, ?, user_id, feeds + plays
             FROM caretaker_stats
             WHERE guild_id = ? AND feeds + plays > 0",
        )
        .bind(now.to_rfc3339())
        .bind(guild_id)
        .execute(&self.pool)
        .await?;

        sqlx::query("DELETE FROM caretaker_stats WHERE guild_id = ?")
            .bind(guild_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Archived totals for a guild (most recent cycle first).
    #[allow(dead_code)]
    pub async fn archived_totals(
        &self,
        guild_id: &str,
    ) -> Result<Vec<(String, String, i64)>, StoreError> {
        let rows: Vec<(String, String, i64)> = sqlx::query_as(
            "SELECT cycle_ended_at, user_id, total
             FROM leaderboard_archive
             WHERE guild_id = ?
             ORDER BY cycle_ended_at DESC, total DESC",
        )
        .bind(guild_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
