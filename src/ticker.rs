//! The decay ticker.
//!
//! A background task that sweeps every stored pet on a fixed interval so
//! decay, evolution, and daily rollovers progress even when nobody is
//! talking to the bot. The sweep itself only touches the store; reminders it
//! deems due are returned to the caller and posted separately, which keeps
//! the decision logic testable without a live HTTP client.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::http::DiscordHttpClient;
use crate::store::{PetStore, StoreError};
use crate::types::{AllowedMentions, CreateMessage};

/// How often the sweep runs. The state machine is time-driven, so a missed
/// interval only delays effects, it never loses them.
pub const TICK_INTERVAL: Duration = Duration::from_secs(300);

/// How many caretakers a reminder mentions.
const REMINDER_MENTIONS: i64 = 5;

// ---------------------------------------------------------------------------
// Reminder
// ---------------------------------------------------------------------------

/// A due inactivity reminder, ready to be posted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reminder {
    pub guild_id: String,
    pub channel_id: String,
    pub pet_name: String,
    pub caretaker_ids: Vec<String>,
}

impl Reminder {
    fn content(&self) -> String {
        let mentions = self
            .caretaker_ids
            .iter()
            .map(|id| format!("<@{}>", id))
            .collect::<Vec<_>>()
            .join(" ");
        if mentions.is_empty() {
            format!("{} misses you! Come check in.", self.pet_name)
        } else {
            format!("{} {} misses you! Come check in.", mentions, self.pet_name)
        }
    }
}

// ---------------------------------------------------------------------------
// The loop
// ---------------------------------------------------------------------------

/// Run the ticker forever. Storage failures are logged and retried on the
/// next interval; they never take the process down.
pub async fn run(store: PetStore, http: DiscordHttpClient) {
    let mut interval = tokio::time::interval(TICK_INTERVAL);
    info!(interval_s = TICK_INTERVAL.as_secs(), "decay ticker started");

    loop {
        interval.tick().await;
        let now = Utc::now();

        match sweep(&store, now).await {
            Ok(reminders) => {
                for reminder in reminders {
                    send_reminder(&http, &store, &reminder).await;
                }
            }
            Err(e) => warn!(error = %e, "tick sweep failed, retrying next interval"),
        }
    }
}

/// Tick every stored pet up to `now` (persisting the result) and collect the
/// inactivity reminders that are due.
pub async fn sweep(store: &PetStore, now: DateTime<Utc>) -> Result<Vec<Reminder>, StoreError> {
    let mut reminders = Vec::new();

    for guild_id in store.guild_ids().await? {
        // get_or_create runs the tick and applies daily/rebirth bookkeeping.
        let pet = match store.get_or_create(&guild_id, now).await {
            Ok(pet) => pet,
            Err(e) => {
                warn!(guild_id = %guild_id, error = %e, "skipping guild this tick");
                continue;
            }
        };

        if pet.reminder_due(now) {
            let Some(channel_id) = pet.home_channel_id.clone() else {
                continue;
            };
            let caretaker_ids = store.recent_caretakers(&guild_id, REMINDER_MENTIONS).await?;
            reminders.push(Reminder {
                guild_id,
                channel_id,
                pet_name: pet.name,
                caretaker_ids,
            });
        }
    }

    debug!(due = reminders.len(), "tick sweep complete");
    Ok(reminders)
}

/// Post one reminder. The nudge flag is only set after Discord accepts the
/// message, so a failed send retries on the next sweep.
async fn send_reminder(http: &DiscordHttpClient, store: &PetStore, reminder: &Reminder) {
    let msg = CreateMessage::new()
        .content(reminder.content())
        .allowed_mentions(AllowedMentions::users(reminder.caretaker_ids.clone()));

    match http.create_message(&reminder.channel_id, &msg).await {
        Ok(_) => {
            info!(guild_id = %reminder.guild_id, "sent inactivity reminder");
            if let Err(e) = store.mark_nudged(&reminder.guild_id).await {
                warn!(guild_id = %reminder.guild_id, error = %e, "failed to record nudge");
            }
        }
        Err(e) => {
            warn!(guild_id = %reminder.guild_id, error = %e, "failed to send reminder");
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::CareAction;
    use chrono::{Duration as ChronoDuration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 10, 12, 0, 0).unwrap()
    }

    async fn store() -> PetStore {
        PetStore::in_memory().await.expect("in-memory store")
    }

    #[tokio::test]
    async fn sweep_advances_every_guild() {
        let store = store().await;
        let born = t0();

        store.get_or_create("g1", born).await.unwrap();
        store.get_or_create("g2", born).await.unwrap();

        let later = born + ChronoDuration::hours(2);
        sweep(&store, later).await.unwrap();

        for guild in ["g1", "g2"] {
            let pet = store.get_or_create(guild, later).await.unwrap();
            assert_eq!(pet.updated_at, later);
            assert!(pet.hunger < crate::pet::HATCH_HUNGER);
        }
    }

    #[tokio::test]
    async fn quiet_guilds_are_not_reminded_early() {
        let store = store().await;
        let now = t0();

        let mut pet = store.get_or_create("g1", now).await.unwrap();
        pet.home_channel_id = Some("chan-1".to_string());
        pet.last_active_at = now - ChronoDuration::days(6);
        store.save(&pet).await.unwrap();

        assert!(sweep(&store, now).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn inactive_guild_is_reminded_exactly_once() {
        let store = store().await;
        let now = t0();

        store
            .record_care("g1", "42", CareAction::Feed, now - ChronoDuration::days(8))
            .await
            .unwrap();
        let mut pet = store.get_or_create("g1", now).await.unwrap();
        pet.home_channel_id = Some("chan-1".to_string());
        pet.last_active_at = now - ChronoDuration::days(8);
        store.save(&pet).await.unwrap();

        let due = sweep(&store, now).await.unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].channel_id, "chan-1");
        assert_eq!(due[0].caretaker_ids, vec!["42".to_string()]);

        // The flag set after a successful send keeps it from repeating.
        store.mark_nudged("g1").await.unwrap();
        assert!(sweep(&store, now + ChronoDuration::hours(1))
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn activity_rearms_the_reminder() {
        let store = store().await;
        let now = t0();

        let mut pet = store.get_or_create("g1", now).await.unwrap();
        pet.home_channel_id = Some("chan-1".to_string());
        pet.last_active_at = now - ChronoDuration::days(8);
        pet.nudged = true;
        store.save(&pet).await.unwrap();
        assert!(sweep(&store, now).await.unwrap().is_empty());

        // Someone feeds the pet: the flag clears, and a later quiet week
        // produces a fresh reminder.
        let mut pet = store.get_or_create("g1", now).await.unwrap();
        pet.feed(now);
        store.save(&pet).await.unwrap();

        let much_later = now + ChronoDuration::days(8);
        let due = sweep(&store, much_later).await.unwrap();
        assert_eq!(due.len(), 1);
    }

    #[test]
    fn reminder_copy_mentions_known_caretakers() {
        let reminder = Reminder {
            guild_id: "g1".into(),
            channel_id: "c1".into(),
            pet_name: "Pebble".into(),
            caretaker_ids: vec!["1".into(), "2".into()],
        };
        assert_eq!(reminder.content(), "<@1> <@2> Pebble misses you! Come check in.");

        let lonely = Reminder {
            caretaker_ids: Vec::new(),
            ..reminder
        };
        assert_eq!(lonely.content(), "Pebble misses you! Come check in.");
    }
}
