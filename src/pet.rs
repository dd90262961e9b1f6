//! The pet lifecycle state machine.
//!
//! A [`PetRecord`] is one guild's shared mascot. Everything time-dependent is
//! derived from stored timestamps, never from tick counts: [`PetRecord::tick`]
//! brings a record up to date for a given `now`, and calling it twice with the
//! same `now` is a no-op. The ticker and every command handler run the same
//! tick before doing anything else, so delayed or missed ticks self-correct.
//!
//! Stage is not stored at all. It is a pure function of days since
//! `birth_time`, clamped at the final day, which makes the offline catch-up
//! policy a direct jump by construction.

use chrono::{DateTime, Duration, NaiveDate, Utc};

// ---------------------------------------------------------------------------
// Tunables
// ---------------------------------------------------------------------------

pub const STAT_MAX: i64 = 100;
pub const HATCH_HUNGER: i64 = 100;
pub const HATCH_HAPPINESS: i64 = 80;

/// Stat restored by one feed / one play.
pub const FEED_AMOUNT: i64 = 15;
pub const PLAY_AMOUNT: i64 = 10;

/// Daily love at or above this makes the care path Good.
pub const LOVE_THRESHOLD: i64 = 3;

/// One hunger point drains per 300 s awake, one happiness point per 600 s.
const HUNGER_DECAY_SECS: i64 = 300;
const HAPPINESS_DECAY_SECS: i64 = 600;

/// Last evolution stage; elapsed days clamp here.
pub const FINAL_DAY: i64 = 6;
/// After a full clamped day at the final stage the lifecycle rolls over.
const REBIRTH_DAYS: i64 = 8;

/// Going unfed for longer than this sends the pet to rest.
const REST_AFTER_SECS: i64 = 24 * 3600;
/// How long a rest lasts.
const REST_DURATION_SECS: i64 = 3600;

pub const DEFAULT_NAME: &str = "Unnamed Mascot";
pub const NAME_MAX_CHARS: usize = 32;

/// Days of guild-wide silence before the reminder nudge.
pub const REMINDER_AFTER_DAYS: i64 = 7;

// ---------------------------------------------------------------------------
// Stage + care path
// ---------------------------------------------------------------------------

/// Evolution stage, derived from days since birth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    Egg,
    Day1,
    Day2,
    Day3,
    Day4,
    Day5,
    Day6,
}

impl Stage {
    pub fn from_days(days: i64) -> Self {
        match days.clamp(0, FINAL_DAY) {
            0 => Stage::Egg,
            1 => Stage::Day1,
            2 => Stage::Day2,
            3 => Stage::Day3,
            4 => Stage::Day4,
            5 => Stage::Day5,
            _ => Stage::Day6,
        }
    }

    pub fn index(self) -> i64 {
        match self {
            Stage::Egg => 0,
            Stage::Day1 => 1,
            Stage::Day2 => 2,
            Stage::Day3 => 3,
            Stage::Day4 => 4,
            Stage::Day5 => 5,
            Stage::Day6 => 6,
        }
    }

    pub fn label(self) -> String {
        match self {
            Stage::Egg => "Egg".to_string(),
            other => format!("Day {}", other.index()),
        }
    }
}

/// Coarse daily care classification, recomputed on read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CarePath {
    Good,
    Bad,
}

impl CarePath {
    pub fn label(self) -> &'static str {
        match self {
            CarePath::Good => "Good",
            CarePath::Bad => "Bad",
        }
    }
}

// ---------------------------------------------------------------------------
// Tick outcome
// ---------------------------------------------------------------------------

/// Side effects a tick asks the store to carry out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickOutcome {
    /// The UTC day rolled over: caretaker day-counters must reset.
    pub daily_reset: bool,
    /// The lifecycle completed: caretaker totals must be archived and
    /// cleared.
    pub reborn: bool,
}

// ---------------------------------------------------------------------------
// PetRecord
// ---------------------------------------------------------------------------

/// One guild's mascot. Persisted as a single row; see `store`.
#[derive(Debug, Clone, PartialEq)]
pub struct PetRecord {
    pub guild_id: String,
    pub name: String,
    pub hunger: i64,
    pub happiness: i64,
    pub birth_time: DateTime<Utc>,
    pub love_today: i64,
    pub love_reset_date: NaiveDate,
    pub last_fed_at: DateTime<Utc>,
    pub resting_since: Option<DateTime<Utc>>,
    pub last_active_at: DateTime<Utc>,
    pub nudged: bool,
    pub home_channel_id: Option<String>,
    /// Decay anchor: the instant the record was last brought up to date.
    pub updated_at: DateTime<Utc>,
}

impl PetRecord {
    /// A brand new egg for a guild that has never had a pet (or whose record
    /// could not be read back).
    pub fn hatch(guild_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            guild_id: guild_id.into(),
            name: DEFAULT_NAME.to_string(),
            hunger: HATCH_HUNGER,
            happiness: HATCH_HAPPINESS,
            birth_time: now,
            love_today: 0,
            love_reset_date: now.date_naive(),
            last_fed_at: now,
            resting_since: None,
            last_active_at: now,
            nudged: false,
            home_channel_id: None,
            updated_at: now,
        }
    }

    // ------------------------------------------------------------------
    // Derived state
    // ------------------------------------------------------------------

    pub fn elapsed_days(&self, now: DateTime<Utc>) -> i64 {
        ((now - self.birth_time).num_seconds() / 86_400).max(0)
    }

    pub fn stage(&self, now: DateTime<Utc>) -> Stage {
        Stage::from_days(self.elapsed_days(now))
    }

    /// Eggs have no care path yet.
    pub fn care_path(&self, now: DateTime<Utc>) -> Option<CarePath> {
        if self.stage(now) == Stage::Egg {
            None
        } else if self.love_today >= LOVE_THRESHOLD {
            Some(CarePath::Good)
        } else {
            Some(CarePath::Bad)
        }
    }

    pub fn is_resting(&self) -> bool {
        self.resting_since.is_some()
    }

    /// Whether the inactivity reminder should go out for this guild.
    pub fn reminder_due(&self, now: DateTime<Utc>) -> bool {
        !self.nudged
            && self.home_channel_id.is_some()
            && now - self.last_active_at > Duration::days(REMINDER_AFTER_DAYS)
    }

    // ------------------------------------------------------------------
    // The tick
    // ------------------------------------------------------------------

    /// Bring the record up to date for `now`.
    ///
    /// Idempotent for equal `now`. Returns the bookkeeping the store must
    /// perform (daily caretaker reset, rebirth snapshot).
    pub fn tick(&mut self, now: DateTime<Utc>) -> TickOutcome {
        let mut outcome = TickOutcome::default();

        // Daily rollover, at most once per UTC day. The `<` comparison keeps
        // a backwards clock step from re-triggering it.
        let today = now.date_naive();
        if self.love_reset_date < today {
            self.love_today = 0;
            self.love_reset_date = today;
            outcome.daily_reset = true;
        }

        // Resting: decay stays paused until the rest is over.
        if let Some(since) = self.resting_since {
            if now - since < Duration::seconds(REST_DURATION_SECS) {
                self.updated_at = now;
                return outcome;
            }
            // Wake up. The nap opens a fresh feeding window (otherwise an
            // unfed pet would fall straight back asleep), and the decay
            // anchor skips the slept hour.
            self.resting_since = None;
            self.last_fed_at = now;
            self.updated_at = (since + Duration::seconds(REST_DURATION_SECS)).max(self.updated_at);
        }

        // Lifecycle rollover. Day 6 is reached after 6 elapsed days and held,
        // clamped, through day 7; one more day completes the cycle.
        if self.elapsed_days(now) >= REBIRTH_DAYS {
            self.rebirth(now);
            outcome.reborn = true;
            return outcome;
        }

        // Decay, charged whenever an absolute epoch boundary passes between
        // the anchor and now. Exact under arbitrary tick spacing.
        self.hunger = (self.hunger - epoch_steps(self.updated_at, now, HUNGER_DECAY_SECS)).max(0);
        self.happiness =
            (self.happiness - epoch_steps(self.updated_at, now, HAPPINESS_DECAY_SECS)).max(0);

        // A missed feeding window sends the pet to rest.
        if now - self.last_fed_at > Duration::seconds(REST_AFTER_SECS) {
            self.resting_since = Some(now);
        }

        self.updated_at = now;
        outcome
    }

    fn rebirth(&mut self, now: DateTime<Utc>) {
        self.birth_time = now;
        self.hunger = HATCH_HUNGER;
        self.happiness = HATCH_HAPPINESS;
        self.love_today = 0;
        self.love_reset_date = now.date_naive();
        self.last_fed_at = now;
        self.resting_since = None;
        self.updated_at = now;
        // Name, caretaker activity, and the home channel survive the rebirth.
    }

    // ------------------------------------------------------------------
    // Actions
    // ------------------------------------------------------------------

    pub fn feed(&mut self, now: DateTime<Utc>) {
        self.hunger = (self.hunger + FEED_AMOUNT).min(STAT_MAX);
        self.love_today += 1;
        self.last_fed_at = now;
        self.mark_active(now);
    }

    pub fn play(&mut self, now: DateTime<Utc>) {
        self.happiness = (self.happiness + PLAY_AMOUNT).min(STAT_MAX);
        self.love_today += 1;
        self.mark_active(now);
    }

    fn mark_active(&mut self, now: DateTime<Utc>) {
        self.last_active_at = now;
        self.nudged = false;
    }
}

// ---------------------------------------------------------------------------
// Name validation
// ---------------------------------------------------------------------------

/// Trim and validate a rename input. `None` means the input is rejected and
/// the caller should reply with a validation message.
pub fn normalize_name(input: &str) -> Option<String> {
    let trimmed = input.trim();
    if trimmed.is_empty() || trimmed.chars().count() > NAME_MAX_CHARS {
        None
    } else {
        Some(trimmed.to_string())
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Number of `period_secs` epoch boundaries crossed between `from` and `to`.
fn epoch_steps(from: DateTime<Utc>, to: DateTime<Utc>, period_secs: i64) -> i64 {
    if to <= from {
        return 0;
    }
    to.timestamp().div_euclid(period_secs) - from.timestamp().div_euclid(period_secs)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
